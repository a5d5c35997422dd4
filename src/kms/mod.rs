//! Alibaba Cloud KMS master keys
//!
//! An [`AliyunKmsMasterKey`] wraps one data key with one KMS key. Keys get
//! their [`KmsClient`] from a [`ClientFactory`] on every call, so credentials
//! and region are always resolved from the current environment.
//!
//! # Examples
//!
//! ```no_run
//! use aliyunkms::kms::master_keys_from_arn_string;
//! use aliyunkms::kms::EncryptionContext;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut context = EncryptionContext::new();
//!     context.insert("app".to_string(), "billing".to_string());
//!
//!     let mut keys = master_keys_from_arn_string(
//!         "acs:kms:cn-hangzhou:1192853035118460:key/key-hzz64a3dbd1prbfsnnvpe",
//!         context,
//!     );
//!
//!     let data_key = [7u8; 32];
//!     for key in &mut keys {
//!         key.encrypt_if_needed(&data_key).await?;
//!     }
//!
//!     assert_eq!(keys[0].decrypt().await?, data_key);
//!     Ok(())
//! }
//! ```

mod client;
mod factory;
mod master_key;
mod record;


pub use client::{
    regional_endpoint, DecryptRequest, DecryptResponse, DecryptResponseBody, EncryptRequest,
    EncryptResponse, EncryptResponseBody, EncryptionContext, KmsClient, RpcKmsClient,
    KMS_API_VERSION,
};
pub use factory::{ClientFactory, DefaultClientFactory, StaticClientFactory};
pub use master_key::{
    master_keys_from_arn_string, AliyunKmsMasterKey, MasterKeyBuilder, KEY_TYPE_IDENTIFIER,
    ROTATION_TTL,
};
pub use record::MasterKeyRecord;
