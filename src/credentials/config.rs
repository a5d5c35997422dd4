use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::{
    AssumeRoleOptions, Credential, EcsRamRoleProvider, OidcRoleArnProvider, ProvideCredentials,
    RamRoleArnProvider, StaticProvider,
};
use crate::error::{Error, Result};

/// Credential type named by the `type` field of a credential config
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum CredentialKind {
    AccessKey,
    Sts,
    EcsRamRole,
    RamRoleArn,
    OidcRoleArn,
    /// A type this crate cannot use (e.g. `rsa_key_pair`, `bearer`)
    Other(String),
}

impl CredentialKind {
    pub fn as_str(&self) -> &str {
        match self {
            CredentialKind::AccessKey => "access_key",
            CredentialKind::Sts => "sts",
            CredentialKind::EcsRamRole => "ecs_ram_role",
            CredentialKind::RamRoleArn => "ram_role_arn",
            CredentialKind::OidcRoleArn => "oidc_role_arn",
            CredentialKind::Other(name) => name,
        }
    }
}

impl From<String> for CredentialKind {
    fn from(value: String) -> Self {
        match value.as_str() {
            "access_key" => CredentialKind::AccessKey,
            "sts" => CredentialKind::Sts,
            "ecs_ram_role" => CredentialKind::EcsRamRole,
            "ram_role_arn" => CredentialKind::RamRoleArn,
            "oidc_role_arn" => CredentialKind::OidcRoleArn,
            _ => CredentialKind::Other(value),
        }
    }
}

impl From<CredentialKind> for String {
    fn from(kind: CredentialKind) -> Self {
        kind.as_str().to_string()
    }
}

impl fmt::Display for CredentialKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A full credential configuration, as stored in the JSON file named by
/// `ALIBABA_CLOUD_KMS_SOPS_CONFIG_FILE`
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialConfig {
    #[serde(rename = "type")]
    pub kind: CredentialKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_key_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_key_secret: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub security_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role_arn: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role_session_name: Option<String>,
    /// ECS RAM role name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oidc_provider_arn: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oidc_token_file_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy: Option<String>,
    /// Lifetime of assumed-role sessions, in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role_session_expiration: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sts_endpoint: Option<String>,
}

impl fmt::Debug for CredentialConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redacted = |v: &Option<String>| v.as_ref().map(|_| "** redacted **");
        f.debug_struct("CredentialConfig")
            .field("kind", &self.kind)
            .field("access_key_id", &self.access_key_id)
            .field("access_key_secret", &redacted(&self.access_key_secret))
            .field("security_token", &redacted(&self.security_token))
            .field("role_arn", &self.role_arn)
            .field("role_session_name", &self.role_session_name)
            .field("role_name", &self.role_name)
            .field("oidc_provider_arn", &self.oidc_provider_arn)
            .field("oidc_token_file_path", &self.oidc_token_file_path)
            .field("role_session_expiration", &self.role_session_expiration)
            .field("sts_endpoint", &self.sts_endpoint)
            .finish()
    }
}

impl CredentialConfig {
    /// An empty configuration of the given kind
    pub fn new(kind: CredentialKind) -> Self {
        Self {
            kind,
            access_key_id: None,
            access_key_secret: None,
            security_token: None,
            role_arn: None,
            role_session_name: None,
            role_name: None,
            oidc_provider_arn: None,
            oidc_token_file_path: None,
            policy: None,
            role_session_expiration: None,
            sts_endpoint: None,
        }
    }

    /// A temporary (STS) credential configuration
    pub fn sts(
        access_key_id: impl Into<String>,
        access_key_secret: impl Into<String>,
        security_token: impl Into<String>,
    ) -> Self {
        Self {
            access_key_id: Some(access_key_id.into()),
            access_key_secret: Some(access_key_secret.into()),
            security_token: Some(security_token.into()),
            ..Self::new(CredentialKind::Sts)
        }
    }

    /// Builds the provider this configuration describes
    pub fn into_provider(self, http: reqwest::Client) -> Result<Arc<dyn ProvideCredentials>> {
        match self.kind {
            CredentialKind::AccessKey => {
                let credential = Credential::new(
                    required(self.access_key_id, "access_key_id", &self.kind)?,
                    required(self.access_key_secret, "access_key_secret", &self.kind)?,
                );
                Ok(Arc::new(StaticProvider::new(credential)))
            }
            CredentialKind::Sts => {
                let credential = Credential::new(
                    required(self.access_key_id, "access_key_id", &self.kind)?,
                    required(self.access_key_secret, "access_key_secret", &self.kind)?,
                )
                .with_security_token(required(
                    self.security_token,
                    "security_token",
                    &self.kind,
                )?);
                Ok(Arc::new(StaticProvider::new(credential)))
            }
            CredentialKind::EcsRamRole => Ok(Arc::new(EcsRamRoleProvider::new(
                http,
                self.role_name.filter(|r| !r.is_empty()),
            ))),
            CredentialKind::RamRoleArn => {
                let mut credential = Credential::new(
                    required(self.access_key_id, "access_key_id", &self.kind)?,
                    required(self.access_key_secret, "access_key_secret", &self.kind)?,
                );
                if let Some(token) = self.security_token.filter(|t| !t.is_empty()) {
                    credential = credential.with_security_token(token);
                }
                let provider = RamRoleArnProvider::new(
                    http,
                    Arc::new(StaticProvider::new(credential)),
                    required(self.role_arn, "role_arn", &self.kind)?,
                )
                .with_options(session_options(
                    self.role_session_name,
                    self.policy,
                    self.role_session_expiration,
                    self.sts_endpoint,
                ));
                Ok(Arc::new(provider))
            }
            CredentialKind::OidcRoleArn => {
                let provider = OidcRoleArnProvider::new(
                    http,
                    required(self.role_arn, "role_arn", &self.kind)?,
                    required(self.oidc_provider_arn, "oidc_provider_arn", &self.kind)?,
                    required(self.oidc_token_file_path, "oidc_token_file_path", &self.kind)?,
                )
                .with_options(session_options(
                    self.role_session_name,
                    self.policy,
                    self.role_session_expiration,
                    self.sts_endpoint,
                ));
                Ok(Arc::new(provider))
            }
            CredentialKind::Other(name) => Err(Error::Credential(format!(
                "unsupported credential type: {}",
                name
            ))),
        }
    }
}

fn session_options(
    session_name: Option<String>,
    policy: Option<String>,
    duration_seconds: Option<u64>,
    sts_endpoint: Option<String>,
) -> AssumeRoleOptions {
    let mut options = AssumeRoleOptions::default();
    if let Some(name) = session_name.filter(|v| !v.is_empty()) {
        options.session_name = name;
    }
    options.policy = policy.filter(|v| !v.is_empty());
    if let Some(seconds) = duration_seconds.filter(|s| *s > 0) {
        options.duration_seconds = seconds;
    }
    if let Some(endpoint) = sts_endpoint.filter(|v| !v.is_empty()) {
        options.sts_endpoint = endpoint;
    }
    options
}

fn required(value: Option<String>, field: &str, kind: &CredentialKind) -> Result<String> {
    value.filter(|v| !v.is_empty()).ok_or_else(|| {
        Error::Credential(format!("{} is required for credential type {}", field, kind))
    })
}
