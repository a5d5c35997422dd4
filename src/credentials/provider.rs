use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use super::{
    resolve_env_credentials, Credential, EcsRamRoleProvider, OidcRoleArnProvider, ProfileProvider,
};
use crate::env::{self, Environment};
use crate::error::{Error, Result};

/// Source of credentials for signing API calls
#[async_trait]
pub trait ProvideCredentials: Send + Sync + fmt::Debug {
    /// Returns credentials, or `Error::CredentialNotFound` when this provider
    /// has nothing configured
    async fn provide_credentials(&self) -> Result<Credential>;

    /// Provider name used in log lines
    fn name(&self) -> &'static str;
}

/// Always returns the same credential
#[derive(Debug, Clone)]
pub struct StaticProvider {
    credential: Credential,
}

impl StaticProvider {
    pub fn new(credential: Credential) -> Self {
        Self { credential }
    }
}

#[async_trait]
impl ProvideCredentials for StaticProvider {
    async fn provide_credentials(&self) -> Result<Credential> {
        Ok(self.credential.clone())
    }

    fn name(&self) -> &'static str {
        "static"
    }
}

/// Credentials from environment variables.
///
/// A complete STS triple (legacy `ALICLOUD_*` family first) wins; otherwise the
/// `ALIBABA_CLOUD_ACCESS_KEY_ID` / `ALIBABA_CLOUD_ACCESS_KEY_SECRET` pair is
/// used as a long-lived access key.
#[derive(Debug, Clone)]
pub struct EnvironmentProvider {
    env: Arc<dyn Environment>,
}

impl EnvironmentProvider {
    pub fn new(env: Arc<dyn Environment>) -> Self {
        Self { env }
    }
}

#[async_trait]
impl ProvideCredentials for EnvironmentProvider {
    async fn provide_credentials(&self) -> Result<Credential> {
        if let Some(config) = resolve_env_credentials(self.env.as_ref()) {
            let mut credential = Credential::new(
                config.access_key_id.unwrap_or_default(),
                config.access_key_secret.unwrap_or_default(),
            );
            if let Some(token) = config.security_token.filter(|t| !t.is_empty()) {
                credential = credential.with_security_token(token);
            }
            return Ok(credential);
        }

        match (
            self.env.var(env::ACCESS_KEY_ID),
            self.env.var(env::ACCESS_KEY_SECRET),
        ) {
            (Some(id), Some(secret)) if !id.is_empty() && !secret.is_empty() => {
                Ok(Credential::new(id, secret))
            }
            (Some(_), Some(_)) => Err(Error::Credential(format!(
                "{} or {} is empty",
                env::ACCESS_KEY_ID,
                env::ACCESS_KEY_SECRET
            ))),
            _ => Err(Error::CredentialNotFound(
                "no access key in the environment".into(),
            )),
        }
    }

    fn name(&self) -> &'static str {
        "environment"
    }
}

/// Tries providers in order until one yields credentials.
///
/// `CredentialNotFound` moves on to the next provider; any other error stops
/// the chain.
#[derive(Debug, Clone)]
pub struct DefaultCredentialsChain {
    providers: Vec<Arc<dyn ProvideCredentials>>,
}

impl DefaultCredentialsChain {
    /// Chain over explicit providers
    pub fn new(providers: Vec<Arc<dyn ProvideCredentials>>) -> Self {
        Self { providers }
    }

    /// Environment, OIDC, CLI profile, then ECS instance metadata
    pub fn from_env(env: Arc<dyn Environment>, http: reqwest::Client) -> Self {
        let mut providers: Vec<Arc<dyn ProvideCredentials>> =
            vec![Arc::new(EnvironmentProvider::new(env.clone()))];

        if let Some(oidc) = OidcRoleArnProvider::from_env(env.as_ref(), http.clone()) {
            providers.push(Arc::new(oidc));
        }

        providers.push(Arc::new(ProfileProvider::new(env.clone(), http.clone())));

        if let Some(role_name) = env.non_empty(env::ECS_METADATA) {
            providers.push(Arc::new(EcsRamRoleProvider::new(http, Some(role_name))));
        }

        Self { providers }
    }

    /// Names of the providers in the order they are tried
    pub fn provider_names(&self) -> Vec<&'static str> {
        self.providers.iter().map(|p| p.name()).collect()
    }
}

#[async_trait]
impl ProvideCredentials for DefaultCredentialsChain {
    async fn provide_credentials(&self) -> Result<Credential> {
        for provider in &self.providers {
            match provider.provide_credentials().await {
                Ok(credential) => return Ok(credential),
                Err(Error::CredentialNotFound(_)) => {}
                Err(e) => return Err(e),
            }
        }

        Err(Error::CredentialNotFound(
            "no credential found in the default chain".into(),
        ))
    }

    fn name(&self) -> &'static str {
        "default chain"
    }
}
