//! # Alibaba Cloud KMS master keys
//!
//! `aliyunkms` lets a secrets-encryption tool keep its data-encryption key
//! wrapped by an Alibaba Cloud KMS key instead of storing it in the clear.
//!
//! Each [`kms::AliyunKmsMasterKey`] holds one KMS key reference (an ARN such as
//! `acs:kms:cn-hangzhou:1192853035118460:key/key-hzz64a3dbd1prbfsnnvpe`, or a
//! bare key id / alias), the ciphertext KMS returned for the data key, an
//! encryption context and a creation date used for rotation checks. On every
//! encrypt or decrypt the key asks its [`kms::ClientFactory`] for a client,
//! resolving credentials, region and endpoint from the environment:
//!
//! - credentials come from the JSON file named by
//!   `ALIBABA_CLOUD_KMS_SOPS_CONFIG_FILE`, or else from the default chain
//!   (environment variables, OIDC role, Aliyun CLI profile, ECS RAM role)
//! - the region is the one embedded in the ARN, then
//!   `ALIBABACLOUD_KMS_SOPS_REGION_ID`, then `ALIBABACLOUD_REGION_ID`
//! - `ALIBABACLOUD_KMS_SOPS_ENDPOINT` replaces the regional endpoint
//!
//! ## Basic Usage
//!
//! ```rust,no_run
//! use aliyunkms::kms::{master_keys_from_arn_string, EncryptionContext, MasterKeyRecord};
//!
//! # async fn example() -> aliyunkms::Result<()> {
//! let mut keys = master_keys_from_arn_string(
//!     "acs:kms:cn-hangzhou:1192853035118460:key/key-hzz64a3dbd1prbfsnnvpe",
//!     EncryptionContext::new(),
//! );
//!
//! let data_key = vec![0u8; 32];
//! keys[0].encrypt_if_needed(&data_key).await?;
//!
//! // Persist the key next to the encrypted document
//! let stored = keys[0].to_map();
//!
//! // Later: restore it and unwrap the data key
//! let record = MasterKeyRecord::from_map(&stored)?;
//! let key = aliyunkms::kms::MasterKeyBuilder::new().build_from_record(record);
//! assert_eq!(key.decrypt().await?, data_key);
//! # Ok(())
//! # }
//! ```

pub mod credentials;
pub mod env;
pub mod error;
pub mod kms;
pub mod log;
pub mod region;
pub mod rpc;

pub use error::{Error, Result};
pub use kms::{AliyunKmsMasterKey, MasterKeyBuilder, MasterKeyRecord};

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::fmt;

/// Interface a host tool uses to drive any kind of master key
#[async_trait]
pub trait MasterKey: Send + Sync + fmt::Display + fmt::Debug {
    /// Identifier the host stores to know which kind of key this is
    fn type_identifier(&self) -> &'static str;

    /// Wraps `data_key` and keeps the ciphertext
    async fn encrypt(&mut self, data_key: &[u8]) -> Result<()>;

    /// Wraps `data_key` only if no ciphertext is held yet
    async fn encrypt_if_needed(&mut self, data_key: &[u8]) -> Result<()>;

    /// Unwraps the held ciphertext
    async fn decrypt(&self) -> Result<Vec<u8>>;

    /// Ciphertext currently held, "" if none
    fn encrypted_data_key(&self) -> &str;

    fn set_encrypted_data_key(&mut self, encrypted_key: String);

    /// Whether the key is old enough to be replaced
    fn needs_rotation(&self) -> bool;

    /// Serializable form of the key
    fn to_map(&self) -> Map<String, Value>;
}

#[async_trait]
impl MasterKey for AliyunKmsMasterKey {
    fn type_identifier(&self) -> &'static str {
        AliyunKmsMasterKey::type_identifier(self)
    }

    async fn encrypt(&mut self, data_key: &[u8]) -> Result<()> {
        AliyunKmsMasterKey::encrypt(self, data_key).await
    }

    async fn encrypt_if_needed(&mut self, data_key: &[u8]) -> Result<()> {
        AliyunKmsMasterKey::encrypt_if_needed(self, data_key).await
    }

    async fn decrypt(&self) -> Result<Vec<u8>> {
        AliyunKmsMasterKey::decrypt(self).await
    }

    fn encrypted_data_key(&self) -> &str {
        AliyunKmsMasterKey::encrypted_data_key(self)
    }

    fn set_encrypted_data_key(&mut self, encrypted_key: String) {
        AliyunKmsMasterKey::set_encrypted_data_key(self, encrypted_key);
    }

    fn needs_rotation(&self) -> bool {
        AliyunKmsMasterKey::needs_rotation(self)
    }

    fn to_map(&self) -> Map<String, Value> {
        AliyunKmsMasterKey::to_map(self)
    }
}
