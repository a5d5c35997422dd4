use std::io::Write;
use std::sync::Arc;

use tempfile::NamedTempFile;

use super::mock::ARN;
use crate::credentials::{CredentialKind, CredentialSource};
use crate::env::{self, MapEnv};
use crate::error::Error;
use crate::kms::{ClientFactory, DefaultClientFactory, MasterKeyBuilder};
use crate::log::MemoryLogger;

fn write_temp(content: &str) -> NamedTempFile {
    let mut file = tempfile::Builder::new()
        .prefix("aliyunkms-sops-")
        .suffix(".json")
        .tempfile()
        .unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

fn factory(env: MapEnv) -> DefaultClientFactory {
    DefaultClientFactory::new(Arc::new(env))
}

#[tokio::test]
async fn test_missing_config_file_is_fatal() {
    let env = MapEnv::new().with(env::KMS_SOPS_CONFIG_FILE, "/nonexistent/aliyunkms/sops.json");
    let logger = MemoryLogger::new();

    let result = factory(env).create_client(ARN, &logger).await;

    assert!(matches!(result, Err(Error::ConfigFile { .. })));
    assert!(logger.contains(ARN, "failed to read kms sops config file"));
}

#[tokio::test]
async fn test_malformed_config_file_is_fatal() {
    let file = write_temp("{ not json");
    let env = MapEnv::new().with(env::KMS_SOPS_CONFIG_FILE, file.path().to_string_lossy());
    let logger = MemoryLogger::new();

    let result = factory(env).create_client(ARN, &logger).await;

    assert!(matches!(result, Err(Error::ConfigParse { .. })));
    assert!(logger.contains(ARN, "failed to parse kms sops config file"));
}

#[tokio::test]
async fn test_config_file_wins_over_environment() {
    let file = write_temp(
        r#"{"type": "access_key", "access_key_id": "file-id", "access_key_secret": "file-secret"}"#,
    );
    let env = MapEnv::new()
        .with(env::KMS_SOPS_CONFIG_FILE, file.path().to_string_lossy())
        .with(env::ACCESS_KEY_ID, "env-id")
        .with(env::ACCESS_KEY_SECRET, "env-secret")
        .with(env::SECURITY_TOKEN, "env-token");
    let logger = MemoryLogger::new();

    let source = factory(env.clone())
        .with_env_session_token(true)
        .credential_source(ARN, &logger)
        .await
        .unwrap();

    match source {
        CredentialSource::ConfigFile { path: found, config } => {
            assert_eq!(found.as_path(), file.path());
            assert_eq!(config.kind, CredentialKind::AccessKey);
            assert_eq!(config.access_key_id.as_deref(), Some("file-id"));
        }
        other => panic!("unexpected source: {:?}", other),
    }
    assert!(logger.contains(ARN, "found kms sops config file"));

    let client = factory(env).create_client(ARN, &logger).await.unwrap();
    assert_eq!(client.region(), "cn-hangzhou");
}

#[tokio::test]
async fn test_unsupported_credential_type_is_an_error() {
    let file = write_temp(r#"{"type": "rsa_key_pair"}"#);
    let env = MapEnv::new().with(env::KMS_SOPS_CONFIG_FILE, file.path().to_string_lossy());
    let logger = MemoryLogger::new();

    let result = factory(env).create_client(ARN, &logger).await;

    assert!(matches!(result, Err(Error::Credential(ref msg)) if msg.contains("rsa_key_pair")));
    assert!(logger.contains(ARN, "failed to create credential provider"));
}

#[tokio::test]
async fn test_empty_config_file_variable_is_fatal() {
    let env = MapEnv::new()
        .with(env::KMS_SOPS_CONFIG_FILE, "")
        .with(env::ACCESS_KEY_ID, "env-id")
        .with(env::ACCESS_KEY_SECRET, "env-secret");
    let logger = MemoryLogger::new();

    let result = factory(env.clone()).credential_source(ARN, &logger).await;
    assert!(matches!(result, Err(Error::ConfigFile { ref path, .. }) if path.as_os_str().is_empty()));

    let result = factory(env).create_client(ARN, &logger).await;
    assert!(matches!(result, Err(Error::ConfigFile { .. })));
    assert!(logger.contains(ARN, "failed to read kms sops config file"));
}

#[tokio::test]
async fn test_session_token_source_is_opt_in() {
    let env = MapEnv::new()
        .with(env::ALICLOUD_ACCESS_KEY, "id")
        .with(env::ALICLOUD_SECRET_KEY, "secret")
        .with(env::ALICLOUD_SECURITY_TOKEN, "token");
    let logger = MemoryLogger::new();

    let default = factory(env.clone())
        .credential_source(ARN, &logger)
        .await
        .unwrap();
    assert!(matches!(default, CredentialSource::DefaultChain));

    let session = factory(env)
        .with_env_session_token(true)
        .credential_source(ARN, &logger)
        .await
        .unwrap();
    match session {
        CredentialSource::SessionToken(config) => {
            assert_eq!(config.kind, CredentialKind::Sts);
            assert_eq!(config.security_token.as_deref(), Some("token"));
        }
        other => panic!("unexpected source: {:?}", other),
    }
}

#[tokio::test]
async fn test_region_falls_back_to_environment() {
    let env = MapEnv::new()
        .with(env::KMS_SOPS_REGION_ID, "cn-beijing")
        .with(env::REGION_ID, "cn-shanghai");

    let client = factory(env)
        .create_client("key-hzz64a3dbd1prbfsnnvpe", &MemoryLogger::new())
        .await
        .unwrap();

    assert_eq!(client.region(), "cn-beijing");
}

#[tokio::test]
async fn test_custom_endpoint_without_region() {
    let env = MapEnv::new().with(env::KMS_SOPS_ENDPOINT, "kst-hzz6xxx.cryptoservice.kms.aliyuncs.com");

    let client = factory(env)
        .create_client("alias/sops", &MemoryLogger::new())
        .await
        .unwrap();

    assert_eq!(client.region(), "");
}

#[tokio::test]
async fn test_no_region_and_no_endpoint_fails() {
    let logger = MemoryLogger::new();

    let result = factory(MapEnv::new()).create_client("alias/sops", &logger).await;

    assert!(matches!(result, Err(Error::InvalidConfig(_))));
    assert!(logger.contains("alias/sops", "failed to create kms client"));
}

#[tokio::test]
async fn test_master_key_surfaces_factory_errors() {
    let env = MapEnv::new().with(env::KMS_SOPS_CONFIG_FILE, "/nonexistent/aliyunkms/sops.json");
    let logger = Arc::new(MemoryLogger::new());
    let mut key = MasterKeyBuilder::new()
        .with_client_factory(Arc::new(factory(env)))
        .with_logger(logger.clone())
        .build(ARN);

    let err = key.encrypt(b"data key").await.unwrap_err();

    assert!(matches!(err, Error::ConfigFile { .. }));
    assert!(key.encrypted_data_key().is_empty());
    assert!(logger.contains(ARN, "failed to create kms client for encrypt"));
}
