//! Assume-role providers backed by Alibaba Cloud STS

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use super::{Credential, ProvideCredentials};
use crate::env::{self, Environment};
use crate::error::{Error, Result};
use crate::rpc::RpcClient;

/// Public STS endpoint
pub const DEFAULT_STS_ENDPOINT: &str = "sts.aliyuncs.com";

const STS_API_VERSION: &str = "2015-04-01";
const DEFAULT_SESSION_NAME: &str = "aliyunkms-sops";
const DEFAULT_DURATION_SECONDS: u64 = 3600;

/// Settings shared by both assume-role providers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssumeRoleOptions {
    pub session_name: String,
    pub policy: Option<String>,
    pub duration_seconds: u64,
    pub sts_endpoint: String,
}

impl Default for AssumeRoleOptions {
    fn default() -> Self {
        Self {
            session_name: DEFAULT_SESSION_NAME.to_string(),
            policy: None,
            duration_seconds: DEFAULT_DURATION_SECONDS,
            sts_endpoint: DEFAULT_STS_ENDPOINT.to_string(),
        }
    }
}

impl AssumeRoleOptions {
    fn params(&self, role_arn: &str) -> BTreeMap<String, String> {
        let mut params = BTreeMap::new();
        params.insert("RoleArn".to_string(), role_arn.to_string());
        params.insert("RoleSessionName".to_string(), self.session_name.clone());
        params.insert(
            "DurationSeconds".to_string(),
            self.duration_seconds.to_string(),
        );
        if let Some(policy) = &self.policy {
            params.insert("Policy".to_string(), policy.clone());
        }
        params
    }
}

#[derive(Debug, Deserialize)]
struct AssumeRoleResponse {
    #[serde(rename = "Credentials")]
    credentials: StsCredentials,
}

#[derive(Debug, Deserialize)]
struct StsCredentials {
    #[serde(rename = "AccessKeyId")]
    access_key_id: String,
    #[serde(rename = "AccessKeySecret")]
    access_key_secret: String,
    #[serde(rename = "SecurityToken")]
    security_token: String,
    #[serde(rename = "Expiration", default)]
    expiration: Option<String>,
}

impl From<StsCredentials> for Credential {
    fn from(sts: StsCredentials) -> Self {
        let credential = Credential::new(sts.access_key_id, sts.access_key_secret)
            .with_security_token(sts.security_token);
        match sts.expiration.as_deref().and_then(parse_expiration) {
            Some(expiration) => credential.with_expiration(expiration),
            None => credential,
        }
    }
}

pub(crate) fn parse_expiration(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

async fn assume_role(
    client: &RpcClient,
    action: &str,
    params: BTreeMap<String, String>,
    credential: Option<&Credential>,
) -> Result<Credential> {
    let response = client
        .call::<AssumeRoleResponse>(action, params, credential)
        .await?;

    match response.body {
        Some(body) => Ok(body.credentials.into()),
        None => Err(Error::Credential(format!(
            "{} failed with status code {}: {}",
            action, response.status, response.raw
        ))),
    }
}

/// Assumes a RAM role with credentials from another provider
#[derive(Debug, Clone)]
pub struct RamRoleArnProvider {
    http: reqwest::Client,
    source: Arc<dyn ProvideCredentials>,
    role_arn: String,
    options: AssumeRoleOptions,
}

impl RamRoleArnProvider {
    pub fn new(
        http: reqwest::Client,
        source: Arc<dyn ProvideCredentials>,
        role_arn: impl Into<String>,
    ) -> Self {
        Self {
            http,
            source,
            role_arn: role_arn.into(),
            options: AssumeRoleOptions::default(),
        }
    }

    pub fn with_options(mut self, options: AssumeRoleOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> &AssumeRoleOptions {
        &self.options
    }
}

#[async_trait]
impl ProvideCredentials for RamRoleArnProvider {
    async fn provide_credentials(&self) -> Result<Credential> {
        let source = self.source.provide_credentials().await?;
        let client = RpcClient::new(self.http.clone(), &self.options.sts_endpoint, STS_API_VERSION);

        assume_role(
            &client,
            "AssumeRole",
            self.options.params(&self.role_arn),
            Some(&source),
        )
        .await
    }

    fn name(&self) -> &'static str {
        "ram role arn"
    }
}

/// Exchanges an OIDC token (e.g. from an ACK service account) for role credentials
#[derive(Debug, Clone)]
pub struct OidcRoleArnProvider {
    http: reqwest::Client,
    role_arn: String,
    oidc_provider_arn: String,
    oidc_token_file: String,
    options: AssumeRoleOptions,
}

impl OidcRoleArnProvider {
    pub fn new(
        http: reqwest::Client,
        role_arn: impl Into<String>,
        oidc_provider_arn: impl Into<String>,
        oidc_token_file: impl Into<String>,
    ) -> Self {
        Self {
            http,
            role_arn: role_arn.into(),
            oidc_provider_arn: oidc_provider_arn.into(),
            oidc_token_file: oidc_token_file.into(),
            options: AssumeRoleOptions::default(),
        }
    }

    /// Built only when role ARN, provider ARN and token file are all set
    pub fn from_env(env: &dyn Environment, http: reqwest::Client) -> Option<Self> {
        let provider = Self::new(
            http,
            env.non_empty(env::ROLE_ARN)?,
            env.non_empty(env::OIDC_PROVIDER_ARN)?,
            env.non_empty(env::OIDC_TOKEN_FILE)?,
        );
        let mut options = AssumeRoleOptions::default();
        if let Some(name) = env.non_empty(env::ROLE_SESSION_NAME) {
            options.session_name = name;
        }
        Some(provider.with_options(options))
    }

    pub fn with_options(mut self, options: AssumeRoleOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> &AssumeRoleOptions {
        &self.options
    }
}

#[async_trait]
impl ProvideCredentials for OidcRoleArnProvider {
    async fn provide_credentials(&self) -> Result<Credential> {
        let token = tokio::fs::read_to_string(&self.oidc_token_file)
            .await
            .map_err(|e| {
                Error::Credential(format!(
                    "failed to read OIDC token file {}: {}",
                    self.oidc_token_file, e
                ))
            })?;

        let mut params = self.options.params(&self.role_arn);
        params.insert("OIDCProviderArn".to_string(), self.oidc_provider_arn.clone());
        params.insert("OIDCToken".to_string(), token.trim().to_string());

        let client = RpcClient::new(self.http.clone(), &self.options.sts_endpoint, STS_API_VERSION);
        assume_role(&client, "AssumeRoleWithOIDC", params, None).await
    }

    fn name(&self) -> &'static str {
        "oidc role arn"
    }
}
