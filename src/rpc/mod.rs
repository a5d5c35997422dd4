//! Alibaba Cloud RPC-style API transport
//!
//! KMS and STS both speak the RPC dialect: every parameter travels in the query
//! string of a `POST /`, the request is signed with HMAC-SHA1 over the sorted
//! parameters, and the answer is a JSON document. Errors come back as
//! `{"Code", "Message", "RequestId"}` together with an HTTP error status.

pub mod signature;

use std::collections::BTreeMap;

use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::credentials::Credential;
use crate::error::{Error, Result};

use self::signature::{canonicalized_query, percent_encode, sign, SIGNATURE_METHOD, SIGNATURE_VERSION};

const METHOD: &str = "POST";

/// Parsed answer of an RPC call that did not carry an error document
#[derive(Debug, Clone)]
pub struct RpcResponse<T> {
    /// HTTP status code of the exchange
    pub status: u16,

    /// Decoded body; `None` when the status was not a success and the body was not an error document
    pub body: Option<T>,

    /// Raw response text, kept for diagnostics
    pub raw: String,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(rename = "Code")]
    code: Option<String>,
    #[serde(rename = "Message", default)]
    message: String,
    #[serde(rename = "RequestId", default)]
    request_id: String,
}

/// Client for one RPC product endpoint
#[derive(Debug, Clone)]
pub struct RpcClient {
    http: reqwest::Client,
    endpoint: String,
    version: String,
    region_id: Option<String>,
}

impl RpcClient {
    /// Creates a client for `endpoint`; a bare host name gets `https://`
    pub fn new(http: reqwest::Client, endpoint: &str, version: impl Into<String>) -> Self {
        Self {
            http,
            endpoint: normalize_endpoint(endpoint),
            version: version.into(),
            region_id: None,
        }
    }

    /// Sends `RegionId` with every request
    pub fn with_region_id(mut self, region_id: impl Into<String>) -> Self {
        let region_id = region_id.into();
        self.region_id = (!region_id.is_empty()).then_some(region_id);
        self
    }

    /// Base URL requests are sent to
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Region sent with requests, if any
    pub fn region_id(&self) -> Option<&str> {
        self.region_id.as_deref()
    }

    /// Calls `action`, signing with `credential` or anonymously when it is `None`
    pub async fn call<T: DeserializeOwned>(
        &self,
        action: &str,
        params: BTreeMap<String, String>,
        credential: Option<&Credential>,
    ) -> Result<RpcResponse<T>> {
        let query = self.signed_query(action, params, credential);
        let url = format!("{}/?{}", self.endpoint, query);

        let response = self
            .http
            .post(url)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await?;
        let status = response.status();
        let raw = response.text().await?;

        if status.is_success() {
            let body = serde_json::from_str(&raw)?;
            return Ok(RpcResponse {
                status: status.as_u16(),
                body: Some(body),
                raw,
            });
        }

        if let Ok(ErrorBody {
            code: Some(code),
            message,
            request_id,
        }) = serde_json::from_str::<ErrorBody>(&raw)
        {
            return Err(Error::Api {
                status: status.as_u16(),
                code,
                message,
                request_id,
            });
        }

        Ok(RpcResponse {
            status: status.as_u16(),
            body: None,
            raw,
        })
    }

    fn signed_query(
        &self,
        action: &str,
        mut params: BTreeMap<String, String>,
        credential: Option<&Credential>,
    ) -> String {
        params.insert("Action".into(), action.into());
        params.insert("Format".into(), "JSON".into());
        params.insert("Version".into(), self.version.clone());
        params.insert(
            "Timestamp".into(),
            Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string(),
        );
        params.insert("SignatureNonce".into(), uuid::Uuid::new_v4().to_string());
        if let Some(region_id) = &self.region_id {
            params.insert("RegionId".into(), region_id.clone());
        }

        let Some(credential) = credential else {
            return canonicalized_query(&params);
        };

        params.insert("AccessKeyId".into(), credential.access_key_id.clone());
        params.insert("SignatureMethod".into(), SIGNATURE_METHOD.into());
        params.insert("SignatureVersion".into(), SIGNATURE_VERSION.into());
        if let Some(token) = credential.security_token.as_deref() {
            params.insert("SecurityToken".into(), token.to_string());
        }

        let signature = sign(METHOD, &params, credential.access_key_secret());
        format!(
            "{}&Signature={}",
            canonicalized_query(&params),
            percent_encode(&signature)
        )
    }
}

fn normalize_endpoint(endpoint: &str) -> String {
    let endpoint = endpoint.trim().trim_end_matches('/');
    if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
        endpoint.to_string()
    } else {
        format!("https://{}", endpoint)
    }
}
