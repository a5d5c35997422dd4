//! Credential resolution for Alibaba Cloud API calls
//!
//! A [`CredentialSource`] says where credentials come from: an explicit session
//! token pulled from the environment, a JSON config file the user pointed at, or
//! the default provider chain. Each source turns into a [`ProvideCredentials`]
//! implementation that the KMS client asks before every call.

mod config;
mod ecs;
mod profile;
mod provider;
mod sts;

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use zeroize::Zeroizing;

use crate::env::{self, Environment};
use crate::error::Result;

pub use config::{CredentialConfig, CredentialKind};
pub use ecs::{EcsRamRoleProvider, ECS_METADATA_ENDPOINT};
pub use profile::ProfileProvider;
pub use provider::{DefaultCredentialsChain, EnvironmentProvider, ProvideCredentials, StaticProvider};
pub use sts::{AssumeRoleOptions, OidcRoleArnProvider, RamRoleArnProvider, DEFAULT_STS_ENDPOINT};

/// A resolved access key, optionally with an STS security token
#[derive(Clone)]
pub struct Credential {
    /// Access key id
    pub access_key_id: String,

    access_key_secret: Zeroizing<String>,

    /// STS security token, present for temporary credentials
    pub security_token: Option<String>,

    /// When temporary credentials stop working
    pub expiration: Option<DateTime<Utc>>,
}

impl Credential {
    /// Creates a long-lived access key credential
    pub fn new(access_key_id: impl Into<String>, access_key_secret: impl Into<String>) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            access_key_secret: Zeroizing::new(access_key_secret.into()),
            security_token: None,
            expiration: None,
        }
    }

    /// Adds an STS security token
    pub fn with_security_token(mut self, token: impl Into<String>) -> Self {
        self.security_token = Some(token.into());
        self
    }

    /// Sets the expiry of temporary credentials
    pub fn with_expiration(mut self, expiration: DateTime<Utc>) -> Self {
        self.expiration = Some(expiration);
        self
    }

    /// Access key secret
    pub fn access_key_secret(&self) -> &str {
        &self.access_key_secret
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("access_key_id", &self.access_key_id)
            .field("access_key_secret", &"** redacted **")
            .field("security_token", &self.security_token.as_ref().map(|_| "** redacted **"))
            .field("expiration", &self.expiration)
            .finish()
    }
}

/// Looks for a complete STS credential triple in the environment.
///
/// The legacy `ALICLOUD_*` family is tried before the `ALIBABA_CLOUD_*` family.
/// A family only counts when all three variables are present.
pub fn resolve_env_credentials(env: &dyn Environment) -> Option<CredentialConfig> {
    resolve_triple(
        env,
        env::ALICLOUD_ACCESS_KEY,
        env::ALICLOUD_SECRET_KEY,
        env::ALICLOUD_SECURITY_TOKEN,
    )
    .or_else(|| {
        resolve_triple(
            env,
            env::ACCESS_KEY_ID,
            env::ACCESS_KEY_SECRET,
            env::SECURITY_TOKEN,
        )
    })
}

fn resolve_triple(
    env: &dyn Environment,
    access_key_id: &str,
    access_key_secret: &str,
    security_token: &str,
) -> Option<CredentialConfig> {
    let (Some(access_key_id), Some(access_key_secret), Some(security_token)) = (
        env.var(access_key_id),
        env.var(access_key_secret),
        env.var(security_token),
    ) else {
        return None;
    };

    Some(CredentialConfig::sts(
        access_key_id,
        access_key_secret,
        security_token,
    ))
}

/// Where a KMS client gets its credentials from
#[derive(Debug, Clone)]
pub enum CredentialSource {
    /// An STS triple resolved from the environment
    SessionToken(CredentialConfig),

    /// A configuration loaded from the file named by `ALIBABA_CLOUD_KMS_SOPS_CONFIG_FILE`
    ConfigFile {
        path: PathBuf,
        config: CredentialConfig,
    },

    /// Environment, OIDC, CLI profile, then instance metadata
    DefaultChain,
}

impl CredentialSource {
    /// Turns the source into a provider; fails when a configuration is unusable
    pub fn into_provider(
        self,
        env: Arc<dyn Environment>,
        http: reqwest::Client,
    ) -> Result<Arc<dyn ProvideCredentials>> {
        match self {
            CredentialSource::SessionToken(config) | CredentialSource::ConfigFile { config, .. } => {
                config.into_provider(http)
            }
            CredentialSource::DefaultChain => {
                Ok(Arc::new(DefaultCredentialsChain::from_env(env, http)))
            }
        }
    }

    /// Short name used in log lines
    pub fn describe(&self) -> &'static str {
        match self {
            CredentialSource::SessionToken(_) => "environment session token",
            CredentialSource::ConfigFile { .. } => "config file",
            CredentialSource::DefaultChain => "default credential chain",
        }
    }
}
