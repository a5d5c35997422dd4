//! ECS instance RAM role credentials from the instance metadata service

use async_trait::async_trait;
use serde::Deserialize;

use super::sts::parse_expiration;
use super::{Credential, ProvideCredentials};
use crate::error::{Error, Result};

/// Instance metadata service address
pub const ECS_METADATA_ENDPOINT: &str = "http://100.100.100.200";

const SECURITY_CREDENTIALS_PATH: &str = "/latest/meta-data/ram/security-credentials/";

#[derive(Debug, Deserialize)]
struct MetadataCredentials {
    #[serde(rename = "Code")]
    code: String,
    #[serde(rename = "AccessKeyId", default)]
    access_key_id: String,
    #[serde(rename = "AccessKeySecret", default)]
    access_key_secret: String,
    #[serde(rename = "SecurityToken", default)]
    security_token: String,
    #[serde(rename = "Expiration", default)]
    expiration: Option<String>,
}

/// Fetches temporary credentials for the RAM role attached to an ECS instance
#[derive(Debug, Clone)]
pub struct EcsRamRoleProvider {
    http: reqwest::Client,
    role_name: Option<String>,
    endpoint: String,
}

impl EcsRamRoleProvider {
    /// `role_name` is discovered from the metadata service when `None`
    pub fn new(http: reqwest::Client, role_name: Option<String>) -> Self {
        Self {
            http,
            role_name,
            endpoint: ECS_METADATA_ENDPOINT.to_string(),
        }
    }

    /// Points the provider at another metadata endpoint
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into().trim_end_matches('/').to_string();
        self
    }

    async fn get_text(&self, url: &str) -> Result<String> {
        let response = self.http.get(url).send().await?;
        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(Error::Credential(format!(
                "instance metadata request {} failed with status code {}",
                url,
                status.as_u16()
            )));
        }
        Ok(text)
    }

    async fn role_name(&self) -> Result<String> {
        if let Some(role_name) = &self.role_name {
            return Ok(role_name.clone());
        }

        let url = format!("{}{}", self.endpoint, SECURITY_CREDENTIALS_PATH);
        let role_name = self.get_text(&url).await?.trim().to_string();
        if role_name.is_empty() {
            return Err(Error::Credential(
                "no RAM role attached to this instance".into(),
            ));
        }
        Ok(role_name)
    }
}

#[async_trait]
impl ProvideCredentials for EcsRamRoleProvider {
    async fn provide_credentials(&self) -> Result<Credential> {
        let role_name = self.role_name().await?;
        let url = format!("{}{}{}", self.endpoint, SECURITY_CREDENTIALS_PATH, role_name);

        let metadata: MetadataCredentials = serde_json::from_str(&self.get_text(&url).await?)?;
        if metadata.code != "Success" {
            return Err(Error::Credential(format!(
                "instance metadata returned code {} for role {}",
                metadata.code, role_name
            )));
        }

        let credential = Credential::new(metadata.access_key_id, metadata.access_key_secret)
            .with_security_token(metadata.security_token);
        Ok(match metadata.expiration.as_deref().and_then(parse_expiration) {
            Some(expiration) => credential.with_expiration(expiration),
            None => credential,
        })
    }

    fn name(&self) -> &'static str {
        "ecs ram role"
    }
}
