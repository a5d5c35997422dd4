use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;

use crate::credentials::{resolve_env_credentials, CredentialConfig, CredentialSource};
use crate::env::{self, Environment, ProcessEnv};
use crate::error::{Error, Result};
use crate::kms::client::{KmsClient, RpcKmsClient};
use crate::log::Logger;
use crate::region::resolve_region;

/// Creates the KMS client a master key talks to
#[async_trait]
pub trait ClientFactory: Send + Sync + fmt::Debug {
    /// Returns a client able to reach the key identified by `arn`.
    ///
    /// Failures are logged through `logger` with the ARN before being returned.
    async fn create_client(&self, arn: &str, logger: &dyn Logger) -> Result<Arc<dyn KmsClient>>;
}

/// Builds an [`RpcKmsClient`] from the environment on every call.
///
/// Credentials come from the file named by `ALIBABA_CLOUD_KMS_SOPS_CONFIG_FILE`
/// when it is set, otherwise from the default credential chain. The region is
/// taken from the ARN or the region variables, and
/// `ALIBABACLOUD_KMS_SOPS_ENDPOINT` overrides the regional endpoint.
#[derive(Debug, Clone)]
pub struct DefaultClientFactory {
    env: Arc<dyn Environment>,
    http: reqwest::Client,
    env_session_token: bool,
}

impl DefaultClientFactory {
    /// Factory reading an arbitrary environment
    pub fn new(env: Arc<dyn Environment>) -> Self {
        Self {
            env,
            http: reqwest::Client::new(),
            env_session_token: false,
        }
    }

    /// Factory reading the process environment
    pub fn from_env() -> Self {
        Self::new(Arc::new(ProcessEnv))
    }

    /// Uses a preconfigured HTTP client (proxies, timeouts, test servers)
    pub fn with_http_client(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self
    }

    /// When enabled, a complete STS triple in the environment is used ahead of
    /// the default credential chain
    pub fn with_env_session_token(mut self, enabled: bool) -> Self {
        self.env_session_token = enabled;
        self
    }

    /// Decides where credentials for `arn` come from
    pub async fn credential_source(&self, arn: &str, logger: &dyn Logger) -> Result<CredentialSource> {
        if let Some(path) = self.env.var(env::KMS_SOPS_CONFIG_FILE) {
            let path = PathBuf::from(path);
            let config = read_config_file(&path).await.map_err(|e| {
                logger.infof(arn, format_args!("{}", e));
                e
            })?;
            logger.debugf(
                arn,
                format_args!("found kms sops config file {}", path.display()),
            );
            return Ok(CredentialSource::ConfigFile { path, config });
        }

        if self.env_session_token {
            if let Some(config) = resolve_env_credentials(self.env.as_ref()) {
                return Ok(CredentialSource::SessionToken(config));
            }
        }

        Ok(CredentialSource::DefaultChain)
    }
}

impl Default for DefaultClientFactory {
    fn default() -> Self {
        Self::from_env()
    }
}

async fn read_config_file(path: &Path) -> Result<CredentialConfig> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| Error::ConfigFile {
            path: path.to_path_buf(),
            source,
        })?;

    serde_json::from_str(&content).map_err(|source| Error::ConfigParse {
        path: path.to_path_buf(),
        source,
    })
}

#[async_trait]
impl ClientFactory for DefaultClientFactory {
    async fn create_client(&self, arn: &str, logger: &dyn Logger) -> Result<Arc<dyn KmsClient>> {
        let source = self.credential_source(arn, logger).await?;
        logger.debugf(arn, format_args!("using {}", source.describe()));

        let credentials = source
            .into_provider(self.env.clone(), self.http.clone())
            .map_err(|e| {
                logger.infof(arn, format_args!("failed to create credential provider: {}", e));
                e
            })?;

        let region = resolve_region(arn, self.env.as_ref());
        let endpoint = self.env.non_empty(env::KMS_SOPS_ENDPOINT);

        let client = RpcKmsClient::new(self.http.clone(), credentials, &region, endpoint.as_deref())
            .map_err(|e| {
                logger.infof(arn, format_args!("failed to create kms client: {}", e));
                e
            })?;

        Ok(Arc::new(client))
    }
}

/// Hands out the same client for every key
#[derive(Debug, Clone)]
pub struct StaticClientFactory {
    client: Arc<dyn KmsClient>,
}

impl StaticClientFactory {
    pub fn new(client: Arc<dyn KmsClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ClientFactory for StaticClientFactory {
    async fn create_client(&self, _arn: &str, _logger: &dyn Logger) -> Result<Arc<dyn KmsClient>> {
        Ok(self.client.clone())
    }
}
