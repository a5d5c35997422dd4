use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Utc};
use metrics::{counter, histogram};
use serde_json::{Map, Value};
use zeroize::{Zeroize, Zeroizing};

use crate::error::{Error, Result};
use crate::kms::client::{DecryptRequest, EncryptRequest, EncryptionContext, KmsClient};
use crate::kms::factory::{ClientFactory, DefaultClientFactory};
use crate::kms::record::MasterKeyRecord;
use crate::log::{LogFacade, Logger};

/// Key type identifier stored by the host for this kind of master key
pub const KEY_TYPE_IDENTIFIER: &str = "aliyun_kms";

/// Age after which a master key should be rotated (180 days)
pub const ROTATION_TTL: Duration = Duration::from_secs(60 * 60 * 24 * 30 * 6);

const STATUS_OK: u16 = 200;

/// A data key wrapped by one Alibaba Cloud KMS key
#[derive(Debug, Clone)]
pub struct AliyunKmsMasterKey {
    arn: String,
    encrypted_key: String,
    creation_date: DateTime<Utc>,
    encryption_context: Arc<EncryptionContext>,
    client_factory: Arc<dyn ClientFactory>,
    logger: Arc<dyn Logger>,
}

impl AliyunKmsMasterKey {
    /// Key with default collaborators, created now
    pub fn new(arn: impl Into<String>, encryption_context: EncryptionContext) -> Self {
        MasterKeyBuilder::new()
            .with_context(encryption_context)
            .build(arn)
    }

    /// ARN (or key id / alias) of the KMS key
    pub fn arn(&self) -> &str {
        &self.arn
    }

    /// When this key was created
    pub fn creation_date(&self) -> DateTime<Utc> {
        self.creation_date
    }

    /// Context sent with every KMS call
    pub fn encryption_context(&self) -> &EncryptionContext {
        &self.encryption_context
    }

    /// Ciphertext blob of the wrapped data key, "" when not yet encrypted
    pub fn encrypted_data_key(&self) -> &str {
        &self.encrypted_key
    }

    /// Replaces the stored ciphertext
    pub fn set_encrypted_data_key(&mut self, encrypted_key: impl Into<String>) {
        self.encrypted_key = encrypted_key.into();
    }

    /// Key type identifier, always [`KEY_TYPE_IDENTIFIER`]
    pub fn type_identifier(&self) -> &'static str {
        KEY_TYPE_IDENTIFIER
    }

    fn request_context(&self) -> Option<EncryptionContext> {
        (!self.encryption_context.is_empty()).then(|| self.encryption_context.as_ref().clone())
    }

    async fn client(&self, operation: &str) -> Result<Arc<dyn KmsClient>> {
        self.client_factory
            .create_client(&self.arn, self.logger.as_ref())
            .await
            .map_err(|e| {
                self.logger.infof(
                    &self.arn,
                    format_args!("failed to create kms client for {}: {}", operation, e),
                );
                e
            })
    }

    /// Wraps `data_key` with KMS and stores the returned ciphertext.
    ///
    /// A non-200 answer yields [`Error::EncryptDataKey`] and leaves the stored
    /// ciphertext as it was.
    pub async fn encrypt(&mut self, data_key: &[u8]) -> Result<()> {
        let start = Instant::now();
        let result = self.encrypt_data_key(data_key).await;
        histogram!("aliyunkms.encrypt.time", start.elapsed());

        match result {
            Ok(ciphertext_blob) => {
                counter!("aliyunkms.encrypt", 1);
                self.encrypted_key = ciphertext_blob;
                self.logger
                    .debugf(&self.arn, format_args!("wrote data key with aliyunkms"));
                Ok(())
            }
            Err(e) => {
                counter!("aliyunkms.encrypt.error", 1);
                Err(e)
            }
        }
    }

    async fn encrypt_data_key(&self, data_key: &[u8]) -> Result<String> {
        let client = self.client("encrypt").await?;

        let request = EncryptRequest {
            key_id: self.arn.clone(),
            plaintext: Zeroizing::new(STANDARD.encode(data_key)),
            encryption_context: self.request_context(),
        };

        let response = client.encrypt(request).await.map_err(|e| {
            self.logger
                .infof(&self.arn, format_args!("failed to encrypt via aliyunkms: {}", e));
            e
        })?;

        if response.status_code != STATUS_OK {
            self.logger.infof(
                &self.arn,
                format_args!(
                    "failed to encrypt via aliyunkms, status code: {}, response: {:?}",
                    response.status_code, response.body
                ),
            );
            return Err(Error::EncryptDataKey {
                status: response.status_code,
            });
        }

        match response.body {
            Some(body) => Ok(body.ciphertext_blob),
            None => {
                self.logger.infof(
                    &self.arn,
                    format_args!("aliyunkms encrypt response has no body"),
                );
                Err(Error::EncryptDataKey {
                    status: response.status_code,
                })
            }
        }
    }

    /// Encrypts only when no ciphertext is stored yet
    pub async fn encrypt_if_needed(&mut self, data_key: &[u8]) -> Result<()> {
        if self.encrypted_key.is_empty() {
            return self.encrypt(data_key).await;
        }
        Ok(())
    }

    /// Unwraps the stored ciphertext and returns the raw data key
    pub async fn decrypt(&self) -> Result<Vec<u8>> {
        let start = Instant::now();
        let result = self.decrypt_data_key().await;
        histogram!("aliyunkms.decrypt.time", start.elapsed());

        match result {
            Ok(data_key) => {
                counter!("aliyunkms.decrypt", 1);
                self.logger
                    .debugf(&self.arn, format_args!("decrypted data key with aliyunkms"));
                Ok(data_key)
            }
            Err(e) => {
                counter!("aliyunkms.decrypt.error", 1);
                Err(e)
            }
        }
    }

    async fn decrypt_data_key(&self) -> Result<Vec<u8>> {
        let client = self.client("decrypt").await?;

        let request = DecryptRequest {
            ciphertext_blob: self.encrypted_key.clone(),
            encryption_context: self.request_context(),
        };

        let response = client.decrypt(request).await.map_err(|e| {
            self.logger
                .infof(&self.arn, format_args!("failed to decrypt via aliyunkms: {}", e));
            e
        })?;

        if response.status_code != STATUS_OK {
            self.logger.infof(
                &self.arn,
                format_args!(
                    "failed to decrypt via aliyunkms, status code: {}, response: {:?}",
                    response.status_code, response.body
                ),
            );
            return Err(Error::DecryptDataKey {
                status: response.status_code,
            });
        }

        let Some(mut body) = response.body else {
            self.logger.infof(
                &self.arn,
                format_args!("aliyunkms decrypt response has no body"),
            );
            return Err(Error::DecryptDataKey {
                status: response.status_code,
            });
        };

        let decoded = STANDARD.decode(body.plaintext.as_bytes());
        body.plaintext.zeroize();

        decoded.map_err(|e| {
            self.logger.infof(
                &self.arn,
                format_args!("failed to base64 decode aliyunkms plaintext: {}", e),
            );
            Error::Base64(e)
        })
    }

    /// True once the key is older than [`ROTATION_TTL`]
    pub fn needs_rotation(&self) -> bool {
        Utc::now()
            .signed_duration_since(self.creation_date)
            .to_std()
            .map(|age| age > ROTATION_TTL)
            .unwrap_or(false)
    }

    /// Typed form of the key for storage
    pub fn to_record(&self) -> MasterKeyRecord {
        MasterKeyRecord {
            arn: self.arn.clone(),
            created_at: self.creation_date,
            enc: self.encrypted_key.clone(),
            context: self.encryption_context.as_ref().clone(),
        }
    }

    /// Generic map form of the key for storage
    pub fn to_map(&self) -> Map<String, Value> {
        self.to_record().to_map()
    }
}

impl fmt::Display for AliyunKmsMasterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.arn)
    }
}

/// Builder for [`AliyunKmsMasterKey`] values sharing a context and collaborators
///
/// ```
/// use aliyunkms::kms::MasterKeyBuilder;
///
/// let keys = MasterKeyBuilder::new()
///     .with_context_entry("app", "billing")
///     .build_from_arn_string(
///         "acs:kms:cn-hangzhou:1192853035118460:key/key-a,acs:kms:cn-shanghai:1192853035118460:key/key-b",
///     );
///
/// assert_eq!(keys.len(), 2);
/// assert_eq!(keys[1].arn(), "acs:kms:cn-shanghai:1192853035118460:key/key-b");
/// ```
#[derive(Debug, Clone, Default)]
pub struct MasterKeyBuilder {
    encryption_context: EncryptionContext,
    client_factory: Option<Arc<dyn ClientFactory>>,
    logger: Option<Arc<dyn Logger>>,
    creation_date: Option<DateTime<Utc>>,
}

impl MasterKeyBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the encryption context
    pub fn with_context(mut self, context: EncryptionContext) -> Self {
        self.encryption_context = context;
        self
    }

    /// Adds one encryption context entry
    pub fn with_context_entry(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.encryption_context.insert(key.into(), value.into());
        self
    }

    /// Uses a custom client factory, e.g. one handing out a mock client
    pub fn with_client_factory(mut self, factory: Arc<dyn ClientFactory>) -> Self {
        self.client_factory = Some(factory);
        self
    }

    pub fn with_logger(mut self, logger: Arc<dyn Logger>) -> Self {
        self.logger = Some(logger);
        self
    }

    /// Fixes the creation date instead of using the time of `build`
    pub fn with_creation_date(mut self, creation_date: DateTime<Utc>) -> Self {
        self.creation_date = Some(creation_date);
        self
    }

    fn collaborators(&self) -> (Arc<dyn ClientFactory>, Arc<dyn Logger>) {
        let factory = self
            .client_factory
            .clone()
            .unwrap_or_else(|| Arc::new(DefaultClientFactory::from_env()));
        let logger = self
            .logger
            .clone()
            .unwrap_or_else(|| Arc::new(LogFacade::new()));
        (factory, logger)
    }

    fn assemble(
        &self,
        arn: String,
        encryption_context: Arc<EncryptionContext>,
        collaborators: &(Arc<dyn ClientFactory>, Arc<dyn Logger>),
    ) -> AliyunKmsMasterKey {
        AliyunKmsMasterKey {
            arn,
            encrypted_key: String::new(),
            creation_date: self.creation_date.unwrap_or_else(Utc::now),
            encryption_context,
            client_factory: collaborators.0.clone(),
            logger: collaborators.1.clone(),
        }
    }

    /// Builds a single key for `arn`
    pub fn build(&self, arn: impl Into<String>) -> AliyunKmsMasterKey {
        let context = Arc::new(self.encryption_context.clone());
        self.assemble(arn.into(), context, &self.collaborators())
    }

    /// Builds one key per comma-separated ARN, in input order.
    ///
    /// An empty string yields no keys. Segments are taken as-is, without trimming.
    /// All keys share one encryption context and one set of collaborators.
    pub fn build_from_arn_string(&self, arns: &str) -> Vec<AliyunKmsMasterKey> {
        if arns.is_empty() {
            return Vec::new();
        }

        let context = Arc::new(self.encryption_context.clone());
        let collaborators = self.collaborators();
        arns.split(',')
            .map(|arn| self.assemble(arn.to_string(), context.clone(), &collaborators))
            .collect()
    }

    /// Restores a key from its stored record, keeping its ciphertext, creation
    /// date and context
    pub fn build_from_record(&self, record: MasterKeyRecord) -> AliyunKmsMasterKey {
        let collaborators = self.collaborators();
        AliyunKmsMasterKey {
            arn: record.arn,
            encrypted_key: record.enc,
            creation_date: record.created_at,
            encryption_context: Arc::new(record.context),
            client_factory: collaborators.0,
            logger: collaborators.1,
        }
    }
}

/// Splits a comma-separated ARN list into master keys sharing `context`
pub fn master_keys_from_arn_string(
    arns: &str,
    context: EncryptionContext,
) -> Vec<AliyunKmsMasterKey> {
    MasterKeyBuilder::new()
        .with_context(context)
        .build_from_arn_string(arns)
}
