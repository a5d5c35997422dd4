use std::path::PathBuf;

use thiserror::Error;

/// Result type for aliyunkms operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while wrapping or unwrapping data keys with Alibaba Cloud KMS
#[derive(Error, Debug)]
pub enum Error {
    /// KMS answered an encrypt call with a non-success status code
    #[error("EncryptDataKeyError")]
    EncryptDataKey {
        /// Status code reported for the call
        status: u16,
    },

    /// KMS answered a decrypt call with a non-success status code
    #[error("DecryptDataKeyError")]
    DecryptDataKey {
        /// Status code reported for the call
        status: u16,
    },

    /// The credential config file named by the environment could not be read
    #[error("failed to read kms sops config file {}: {source}", path.display())]
    ConfigFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The credential config file named by the environment is not valid JSON
    #[error("failed to parse kms sops config file {}: {source}", path.display())]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// A credential configuration is unusable
    #[error("credential error: {0}")]
    Credential(String),

    /// A credential provider has nothing configured; the default chain moves on
    #[error("no credential found: {0}")]
    CredentialNotFound(String),

    /// Client construction failed because of missing or invalid settings
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The API returned an error document
    #[error("{code}: {message} (status: {status}, request id: {request_id})")]
    Api {
        status: u16,
        code: String,
        message: String,
        request_id: String,
    },

    /// Errors raised by the HTTP transport
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Errors related to JSON serialization/deserialization
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A base64 payload returned by the service could not be decoded
    #[error("base64 decode error: {0}")]
    Base64(#[from] base64::DecodeError),

    /// A stored master key document is missing fields or malformed
    #[error("invalid master key record: {0}")]
    InvalidRecord(String),

    /// Errors related to I/O operations
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Returns true for the two "service said no" sentinels
    pub fn is_data_key_error(&self) -> bool {
        matches!(self, Error::EncryptDataKey { .. } | Error::DecryptDataKey { .. })
    }
}
