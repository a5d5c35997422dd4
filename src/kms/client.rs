use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use zeroize::Zeroizing;

use crate::credentials::ProvideCredentials;
use crate::error::{Error, Result};
use crate::rpc::RpcClient;

/// KMS API version spoken by [`RpcKmsClient`]
pub const KMS_API_VERSION: &str = "2016-01-20";

/// Additional authenticated data bound to a ciphertext
pub type EncryptionContext = BTreeMap<String, String>;

/// Parameters of a KMS `Encrypt` call
#[derive(Clone, PartialEq, Eq)]
pub struct EncryptRequest {
    /// ARN, key id or alias of the master key
    pub key_id: String,

    /// Base64 encoded data key
    pub plaintext: Zeroizing<String>,

    /// Sent only when non-empty
    pub encryption_context: Option<EncryptionContext>,
}

impl fmt::Debug for EncryptRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncryptRequest")
            .field("key_id", &self.key_id)
            .field("plaintext", &"** redacted **")
            .field("encryption_context", &self.encryption_context)
            .finish()
    }
}

/// Parameters of a KMS `Decrypt` call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecryptRequest {
    pub ciphertext_blob: String,
    pub encryption_context: Option<EncryptionContext>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct EncryptResponseBody {
    #[serde(rename = "CiphertextBlob")]
    pub ciphertext_blob: String,
    #[serde(rename = "KeyId", default)]
    pub key_id: String,
    #[serde(rename = "KeyVersionId", default)]
    pub key_version_id: String,
    #[serde(rename = "RequestId", default)]
    pub request_id: String,
}

/// Result of an `Encrypt` exchange that reached the service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptResponse {
    pub status_code: u16,
    pub body: Option<EncryptResponseBody>,
}

#[derive(Clone, Default, PartialEq, Eq, Deserialize)]
pub struct DecryptResponseBody {
    /// Base64 encoded data key
    #[serde(rename = "Plaintext")]
    pub plaintext: String,
    #[serde(rename = "KeyId", default)]
    pub key_id: String,
    #[serde(rename = "KeyVersionId", default)]
    pub key_version_id: String,
    #[serde(rename = "RequestId", default)]
    pub request_id: String,
}

impl fmt::Debug for DecryptResponseBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecryptResponseBody")
            .field("plaintext", &"** redacted **")
            .field("key_id", &self.key_id)
            .field("key_version_id", &self.key_version_id)
            .field("request_id", &self.request_id)
            .finish()
    }
}

/// Result of a `Decrypt` exchange that reached the service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecryptResponse {
    pub status_code: u16,
    pub body: Option<DecryptResponseBody>,
}

/// Alibaba Cloud KMS client trait
#[async_trait]
pub trait KmsClient: Send + Sync + fmt::Debug {
    /// Encrypts a base64 encoded plaintext under a KMS key
    async fn encrypt(&self, request: EncryptRequest) -> Result<EncryptResponse>;

    /// Decrypts a ciphertext blob produced by `encrypt`
    async fn decrypt(&self, request: DecryptRequest) -> Result<DecryptResponse>;

    /// Returns the region for this client, "" when only an endpoint is known
    fn region(&self) -> &str;
}

/// KMS client speaking the RPC API over HTTPS
#[derive(Debug, Clone)]
pub struct RpcKmsClient {
    rpc: RpcClient,
    credentials: Arc<dyn ProvideCredentials>,
    region: String,
}

impl RpcKmsClient {
    /// Creates a client for `region`, or for `endpoint` when one is given.
    ///
    /// Without a custom endpoint the regional one (`kms.<region>.aliyuncs.com`)
    /// is used, so at least one of the two must be known.
    pub fn new(
        http: reqwest::Client,
        credentials: Arc<dyn ProvideCredentials>,
        region: &str,
        endpoint: Option<&str>,
    ) -> Result<Self> {
        let endpoint = match endpoint.filter(|e| !e.is_empty()) {
            Some(endpoint) => endpoint.to_string(),
            None if !region.is_empty() => regional_endpoint(region),
            None => {
                return Err(Error::InvalidConfig(
                    "neither a KMS region nor a KMS endpoint is configured".into(),
                ))
            }
        };

        Ok(Self {
            rpc: RpcClient::new(http, &endpoint, KMS_API_VERSION).with_region_id(region),
            credentials,
            region: region.to_string(),
        })
    }

    /// Base URL requests are sent to
    pub fn endpoint(&self) -> &str {
        self.rpc.endpoint()
    }
}

/// Public KMS endpoint of a region
pub fn regional_endpoint(region: &str) -> String {
    format!("kms.{}.aliyuncs.com", region)
}

fn context_param(
    params: &mut BTreeMap<String, String>,
    context: Option<&EncryptionContext>,
) -> Result<()> {
    if let Some(context) = context.filter(|c| !c.is_empty()) {
        params.insert(
            "EncryptionContext".to_string(),
            serde_json::to_string(context)?,
        );
    }
    Ok(())
}

#[async_trait]
impl KmsClient for RpcKmsClient {
    async fn encrypt(&self, request: EncryptRequest) -> Result<EncryptResponse> {
        let credential = self.credentials.provide_credentials().await?;

        let mut params = BTreeMap::new();
        params.insert("KeyId".to_string(), request.key_id);
        params.insert("Plaintext".to_string(), request.plaintext.as_str().to_string());
        context_param(&mut params, request.encryption_context.as_ref())?;

        let response = self
            .rpc
            .call::<EncryptResponseBody>("Encrypt", params, Some(&credential))
            .await?;

        Ok(EncryptResponse {
            status_code: response.status,
            body: response.body,
        })
    }

    async fn decrypt(&self, request: DecryptRequest) -> Result<DecryptResponse> {
        let credential = self.credentials.provide_credentials().await?;

        let mut params = BTreeMap::new();
        params.insert("CiphertextBlob".to_string(), request.ciphertext_blob);
        context_param(&mut params, request.encryption_context.as_ref())?;

        let response = self
            .rpc
            .call::<DecryptResponseBody>("Decrypt", params, Some(&credential))
            .await?;

        Ok(DecryptResponse {
            status_code: response.status,
            body: response.body,
        })
    }

    fn region(&self) -> &str {
        &self.region
    }
}
