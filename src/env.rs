//! Environment lookup
//!
//! Everything this crate reads from the environment goes through the
//! [`Environment`] trait, so tests can pass a [`MapEnv`] instead of mutating
//! the process environment.

use std::collections::HashMap;
use std::fmt;

/// Path to a JSON credential configuration; wins over every other credential source
pub const KMS_SOPS_CONFIG_FILE: &str = "ALIBABA_CLOUD_KMS_SOPS_CONFIG_FILE";

/// Region override, used when the ARN carries no region
pub const KMS_SOPS_REGION_ID: &str = "ALIBABACLOUD_KMS_SOPS_REGION_ID";

/// Generic region override, used after [`KMS_SOPS_REGION_ID`]
pub const REGION_ID: &str = "ALIBABACLOUD_REGION_ID";

/// Custom KMS endpoint
pub const KMS_SOPS_ENDPOINT: &str = "ALIBABACLOUD_KMS_SOPS_ENDPOINT";

pub const ACCESS_KEY_ID: &str = "ALIBABA_CLOUD_ACCESS_KEY_ID";
pub const ACCESS_KEY_SECRET: &str = "ALIBABA_CLOUD_ACCESS_KEY_SECRET";
pub const SECURITY_TOKEN: &str = "ALIBABA_CLOUD_SECURITY_TOKEN";

pub const ALICLOUD_ACCESS_KEY: &str = "ALICLOUD_ACCESS_KEY";
pub const ALICLOUD_SECRET_KEY: &str = "ALICLOUD_SECRET_KEY";
pub const ALICLOUD_SECURITY_TOKEN: &str = "ALICLOUD_SECURITY_TOKEN";

pub const ROLE_ARN: &str = "ALIBABA_CLOUD_ROLE_ARN";
pub const OIDC_PROVIDER_ARN: &str = "ALIBABA_CLOUD_OIDC_PROVIDER_ARN";
pub const OIDC_TOKEN_FILE: &str = "ALIBABA_CLOUD_OIDC_TOKEN_FILE";
pub const ROLE_SESSION_NAME: &str = "ALIBABA_CLOUD_ROLE_SESSION_NAME";

pub const PROFILE: &str = "ALIBABA_CLOUD_PROFILE";
pub const CLI_CONFIG_FILE: &str = "ALIBABA_CLOUD_CONFIG_FILE";

pub const ECS_METADATA: &str = "ALIBABA_CLOUD_ECS_METADATA";

/// Read-only view of environment variables
pub trait Environment: Send + Sync + fmt::Debug {
    /// Returns the value of `name` if it is set, including when set to ""
    fn var(&self, name: &str) -> Option<String>;

    /// Returns the value of `name` only when it is set and non-empty
    fn non_empty(&self, name: &str) -> Option<String> {
        self.var(name).filter(|v| !v.is_empty())
    }
}

/// The real process environment
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessEnv;

impl Environment for ProcessEnv {
    fn var(&self, name: &str) -> Option<String> {
        std::env::var_os(name).map(|v| v.to_string_lossy().into_owned())
    }
}

/// A fixed set of variables
#[derive(Debug, Default, Clone)]
pub struct MapEnv {
    vars: HashMap<String, String>,
}

impl MapEnv {
    /// Creates an empty environment
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a variable
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.vars.insert(name.into(), value.into());
        self
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for MapEnv {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            vars: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

impl Environment for MapEnv {
    fn var(&self, name: &str) -> Option<String> {
        self.vars.get(name).cloned()
    }
}
