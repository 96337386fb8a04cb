//! Error taxonomy shared across the ingestion runtime, following the category split in
//! the system's error handling design: config-fatal, integrity, validation, and upstream-format.

use thiserror::Error;

/// Fatal at process startup: a missing master secret or DSN aborts before the runtime
/// does anything else.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("master secret file not found at {0}")]
    MasterSecretMissing(String),
    #[error("master secret file at {0} is empty")]
    MasterSecretEmpty(String),
    #[error("DSN not provided (set DSN)")]
    DsnMissing,
    #[error("invalid SECRET_MODE {0:?}, expected one of auto, local, aws")]
    InvalidSecretMode(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Integrity failures: the file hash or the AEAD tag didn't match. These mean the code
/// or credentials cannot be trusted and must not be instantiated.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SecretsError {
    #[error("file hash mismatch: code has been modified since registration")]
    HashMismatch,
    #[error("AEAD tag verification failed: wrong hash, tampered ciphertext, or wrong master secret")]
    DecryptFailed,
    #[error("credential payload was not valid UTF-8 JSON")]
    MalformedPayload(#[source] serde_json::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Validation failures surfaced as 4xx at the HTTP boundary; no persistence side effects.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ValidationError {
    #[error("unknown category {0:?}")]
    UnknownCategory(String),
    #[error("unknown field {category}.{field}")]
    UnknownField { category: String, field: String },
    #[error("field {category}.{field} expected type {expected}, got {actual}")]
    TypeMismatch {
        category: String,
        field: String,
        expected: &'static str,
        actual: &'static str,
    },
    #[error("field {category}.{field} value {value} out of bounds [{min}, {max}]")]
    OutOfBounds {
        category: String,
        field: String,
        value: f64,
        min: f64,
        max: f64,
    },
    #[error("unknown class_name/class_type registration")]
    UnknownProvider,
    #[error("empty secrets payload")]
    EmptySecrets,
    #[error("unsupported class_type {0:?}")]
    UnsupportedClassType(String),
}

/// Errors a provider's data surface can raise. Upstream (transient) failures are logged
/// and swallowed by the job wrapper; they are never treated as integrity failures.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ProviderError {
    #[error("unsupported interval {0:?}")]
    UnsupportedInterval(String),
    #[error("symbol discovery not implemented")]
    Unsupported,
    #[error("upstream error: {0}")]
    Upstream(#[source] anyhow::Error),
    #[error("operation timed out")]
    Timeout,
}
