//! Credentials from the Aliyun CLI configuration (`~/.aliyun/config.json`)

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;

use super::{
    AssumeRoleOptions, Credential, EcsRamRoleProvider, ProvideCredentials, RamRoleArnProvider,
    StaticProvider,
};
use crate::env::{self, Environment};
use crate::error::{Error, Result};

#[derive(Debug, Deserialize)]
struct CliConfig {
    #[serde(default)]
    current: String,
    #[serde(default)]
    profiles: Vec<CliProfile>,
}

#[derive(Debug, Deserialize)]
struct CliProfile {
    name: String,
    #[serde(default)]
    mode: String,
    #[serde(default)]
    access_key_id: String,
    #[serde(default)]
    access_key_secret: String,
    #[serde(default)]
    sts_token: String,
    #[serde(default)]
    ram_role_name: String,
    #[serde(default)]
    ram_role_arn: String,
    #[serde(default)]
    ram_session_name: String,
    #[serde(default)]
    expired_seconds: u64,
}

/// Reads a profile from the Aliyun CLI configuration file.
///
/// The file is `ALIBABA_CLOUD_CONFIG_FILE` or `~/.aliyun/config.json`; the
/// profile is `ALIBABA_CLOUD_PROFILE` or the file's `current` entry.
#[derive(Debug, Clone)]
pub struct ProfileProvider {
    env: Arc<dyn Environment>,
    http: reqwest::Client,
}

impl ProfileProvider {
    pub fn new(env: Arc<dyn Environment>, http: reqwest::Client) -> Self {
        Self { env, http }
    }

    fn config_path(&self) -> Option<PathBuf> {
        if let Some(path) = self.env.non_empty(env::CLI_CONFIG_FILE) {
            return Some(PathBuf::from(path));
        }
        self.env
            .non_empty("HOME")
            .or_else(|| self.env.non_empty("USERPROFILE"))
            .map(|home| PathBuf::from(home).join(".aliyun").join("config.json"))
    }

    fn profile_provider(&self, profile: CliProfile) -> Result<Arc<dyn ProvideCredentials>> {
        let access_key = || {
            if profile.access_key_id.is_empty() || profile.access_key_secret.is_empty() {
                return Err(Error::Credential(format!(
                    "profile {} has no access key",
                    profile.name
                )));
            }
            Ok(Credential::new(
                profile.access_key_id.clone(),
                profile.access_key_secret.clone(),
            ))
        };

        match profile.mode.as_str() {
            "AK" => Ok(Arc::new(StaticProvider::new(access_key()?))),
            "StsToken" => Ok(Arc::new(StaticProvider::new(
                access_key()?.with_security_token(profile.sts_token.clone()),
            ))),
            "RamRoleArn" => {
                let mut options = AssumeRoleOptions::default();
                if !profile.ram_session_name.is_empty() {
                    options.session_name = profile.ram_session_name.clone();
                }
                if profile.expired_seconds > 0 {
                    options.duration_seconds = profile.expired_seconds;
                }
                let source = Arc::new(StaticProvider::new(access_key()?));
                Ok(Arc::new(
                    RamRoleArnProvider::new(self.http.clone(), source, profile.ram_role_arn.clone())
                        .with_options(options),
                ))
            }
            "EcsRamRole" => Ok(Arc::new(EcsRamRoleProvider::new(
                self.http.clone(),
                Some(profile.ram_role_name.clone()).filter(|r| !r.is_empty()),
            ))),
            other => Err(Error::Credential(format!(
                "unsupported mode {:?} in profile {}",
                other, profile.name
            ))),
        }
    }
}

#[async_trait]
impl ProvideCredentials for ProfileProvider {
    async fn provide_credentials(&self) -> Result<Credential> {
        let Some(path) = self.config_path() else {
            return Err(Error::CredentialNotFound("no home directory".into()));
        };

        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::CredentialNotFound(format!(
                    "{} does not exist",
                    path.display()
                )));
            }
            Err(e) => return Err(e.into()),
        };

        let config: CliConfig = serde_json::from_str(&content)?;
        let name = self.env.non_empty(env::PROFILE).unwrap_or(config.current);
        let profile = config
            .profiles
            .into_iter()
            .find(|p| p.name == name)
            .ok_or_else(|| {
                Error::Credential(format!("profile {} not found in {}", name, path.display()))
            })?;

        self.profile_provider(profile)?.provide_credentials().await
    }

    fn name(&self) -> &'static str {
        "profile"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::MapEnv;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const CLI_CONFIG: &str = r#"{
        "current": "default",
        "profiles": [
            {"name": "default", "mode": "AK", "access_key_id": "id", "access_key_secret": "secret"},
            {"name": "sts", "mode": "StsToken", "access_key_id": "sts-id", "access_key_secret": "sts-secret", "sts_token": "token"},
            {"name": "odd", "mode": "ChainableRamRoleArn"}
        ]
    }"#;

    fn write_config() -> NamedTempFile {
        let mut file = tempfile::Builder::new()
            .prefix("aliyunkms-cli-")
            .suffix(".json")
            .tempfile()
            .unwrap();
        file.write_all(CLI_CONFIG.as_bytes()).unwrap();
        file
    }

    fn provider(env: MapEnv) -> ProfileProvider {
        ProfileProvider::new(Arc::new(env), reqwest::Client::new())
    }

    #[tokio::test]
    async fn test_current_profile_is_used_by_default() {
        let file = write_config();
        let env = MapEnv::new().with(env::CLI_CONFIG_FILE, file.path().to_string_lossy());

        let credential = provider(env).provide_credentials().await.unwrap();
        assert_eq!(credential.access_key_id, "id");
        assert!(credential.security_token.is_none());
    }

    #[tokio::test]
    async fn test_profile_env_selects_profile() {
        let file = write_config();
        let env = MapEnv::new()
            .with(env::CLI_CONFIG_FILE, file.path().to_string_lossy())
            .with(env::PROFILE, "sts");

        let credential = provider(env).provide_credentials().await.unwrap();
        assert_eq!(credential.access_key_id, "sts-id");
        assert_eq!(credential.security_token.as_deref(), Some("token"));
    }

    #[tokio::test]
    async fn test_unknown_profile_and_mode_are_errors() {
        let file = write_config();
        let base = MapEnv::new().with(env::CLI_CONFIG_FILE, file.path().to_string_lossy());

        let missing = provider(base.clone().with(env::PROFILE, "nope"))
            .provide_credentials()
            .await;
        assert!(matches!(missing, Err(Error::Credential(ref msg)) if msg.contains("not found")));

        let odd = provider(base.with(env::PROFILE, "odd")).provide_credentials().await;
        assert!(matches!(odd, Err(Error::Credential(ref msg)) if msg.contains("unsupported mode")));
    }

    #[tokio::test]
    async fn test_missing_file_is_not_found() {
        let env = MapEnv::new().with(env::CLI_CONFIG_FILE, "/nonexistent/aliyunkms/config.json");

        let result = provider(env).provide_credentials().await;
        assert!(matches!(result, Err(Error::CredentialNotFound(_))));
    }

    #[test]
    fn test_config_path_defaults_to_home() {
        let env = MapEnv::new().with("HOME", "/home/sops");

        assert_eq!(
            provider(env).config_path(),
            Some(PathBuf::from("/home/sops/.aliyun/config.json"))
        );
        assert_eq!(provider(MapEnv::new()).config_path(), None);
    }
}
