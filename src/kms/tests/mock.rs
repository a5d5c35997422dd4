use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use crate::error::{Error, Result};
use crate::kms::{
    DecryptRequest, DecryptResponse, DecryptResponseBody, EncryptRequest, EncryptResponse,
    EncryptResponseBody, KmsClient, MasterKeyBuilder, StaticClientFactory,
};
use crate::log::MemoryLogger;

pub(super) const ARN: &str = "acs:kms:cn-hangzhou:1192853035118460:key/key-hzz64a3dbd1prbfsnnvpe";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Behavior {
    Ok,
    Status(u16),
    ApiError,
    BadPlaintext,
}

/// Mock KMS client for testing.
///
/// The "ciphertext" is the plaintext plus the serialized context, so decrypt
/// only succeeds with the context used to encrypt.
#[derive(Debug)]
pub(super) struct MockKmsClient {
    behavior: Behavior,
    pub(super) encrypt_calls: Mutex<Vec<EncryptRequest>>,
    pub(super) decrypt_calls: Mutex<Vec<DecryptRequest>>,
}

impl MockKmsClient {
    pub(super) fn new() -> Self {
        Self::with_behavior(Behavior::Ok)
    }

    pub(super) fn with_behavior(behavior: Behavior) -> Self {
        Self {
            behavior,
            encrypt_calls: Mutex::new(Vec::new()),
            decrypt_calls: Mutex::new(Vec::new()),
        }
    }

    pub(super) fn encrypt_count(&self) -> usize {
        self.encrypt_calls.lock().unwrap().len()
    }

    pub(super) fn decrypt_count(&self) -> usize {
        self.decrypt_calls.lock().unwrap().len()
    }

    fn api_error() -> Error {
        Error::Api {
            status: 404,
            code: "Forbidden.KeyNotFound".into(),
            message: "The specified Key is not found.".into(),
            request_id: "mock-request".into(),
        }
    }

    fn context_tag(context: &Option<crate::kms::EncryptionContext>) -> String {
        context
            .as_ref()
            .map(|c| serde_json::to_string(c).unwrap())
            .unwrap_or_default()
    }
}

#[async_trait]
impl KmsClient for MockKmsClient {
    async fn encrypt(&self, request: EncryptRequest) -> Result<EncryptResponse> {
        let tag = Self::context_tag(&request.encryption_context);
        let blob = format!("mock:{}|{}", request.plaintext.as_str(), tag);
        self.encrypt_calls.lock().unwrap().push(request);

        match self.behavior {
            Behavior::Status(status) => Ok(EncryptResponse {
                status_code: status,
                body: None,
            }),
            Behavior::ApiError => Err(Self::api_error()),
            Behavior::Ok | Behavior::BadPlaintext => Ok(EncryptResponse {
                status_code: 200,
                body: Some(EncryptResponseBody {
                    ciphertext_blob: blob,
                    key_id: "key-hzz64a3dbd1prbfsnnvpe".into(),
                    ..EncryptResponseBody::default()
                }),
            }),
        }
    }

    async fn decrypt(&self, request: DecryptRequest) -> Result<DecryptResponse> {
        let tag = Self::context_tag(&request.encryption_context);
        let parsed = request
            .ciphertext_blob
            .strip_prefix("mock:")
            .and_then(|rest| rest.split_once('|'))
            .map(|(plaintext, blob_tag)| (plaintext.to_string(), blob_tag == tag));
        self.decrypt_calls.lock().unwrap().push(request);

        match self.behavior {
            Behavior::Status(status) => Ok(DecryptResponse {
                status_code: status,
                body: None,
            }),
            Behavior::ApiError => Err(Self::api_error()),
            Behavior::BadPlaintext => Ok(DecryptResponse {
                status_code: 200,
                body: Some(DecryptResponseBody {
                    plaintext: "***not base64***".into(),
                    ..DecryptResponseBody::default()
                }),
            }),
            Behavior::Ok => match parsed {
                Some((plaintext, true)) => Ok(DecryptResponse {
                    status_code: 200,
                    body: Some(DecryptResponseBody {
                        plaintext,
                        ..DecryptResponseBody::default()
                    }),
                }),
                _ => Ok(DecryptResponse {
                    status_code: 400,
                    body: None,
                }),
            },
        }
    }

    fn region(&self) -> &str {
        "cn-hangzhou"
    }
}

/// A builder wired to `client` and a capturing logger
pub(super) fn builder_with(
    client: Arc<MockKmsClient>,
    logger: Arc<MemoryLogger>,
) -> MasterKeyBuilder {
    MasterKeyBuilder::new()
        .with_client_factory(Arc::new(StaticClientFactory::new(client)))
        .with_logger(logger)
}

pub(super) fn encoded(data: &[u8]) -> String {
    STANDARD.encode(data)
}
