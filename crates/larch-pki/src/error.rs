use thiserror::Error;

/// PKI error types
#[derive(Error, Debug)]
pub enum PkiError {
    /// Extension key does not name a known extension kind
    #[error("Unknown extension kind: {0}")]
    UnknownExtensionKind(String),

    /// Extension value literal could not be parsed
    #[error("Malformed extension value for {key}: {reason}")]
    MalformedExtensionValue { key: String, reason: String },

    /// Extension cannot be encoded for signing
    #[error("Unsupported extension value: {0}")]
    UnsupportedExtensionValue(String),

    /// Neither a common name nor a subject alternative name is present
    #[error("Certificate has no common name and no subject alternative name")]
    NoIdentity,

    /// Common name is not a valid hostname
    #[error("Invalid common name: {0}")]
    InvalidCommonName(String),

    /// CRL scope argument is not one of the known scopes
    #[error("Invalid CRL scope: {0}")]
    InvalidScope(String),

    /// Named profile does not exist
    #[error("Profile not found: {0}")]
    ProfileNotFound(String),

    /// Certificate authority lookup miss
    #[error("Certificate authority not found: {0}")]
    CaNotFound(String),

    /// Certificate lookup miss
    #[error("Certificate not found: {0}")]
    CertificateNotFound(String),

    /// Model-level validation failure
    #[error("Validation error: {0}")]
    Validation(String),

    /// CSR parsing or verification failure
    #[error("CSR error: {0}")]
    Csr(String),

    /// Certificate building or signing failure
    #[error("Certificate error: {0}")]
    Certificate(String),

    /// Issuance aborted by a pre-issue hook
    #[error("Issuance rejected: {0}")]
    IssuanceRejected(String),

    /// Backing store failure
    #[error("Storage error: {0}")]
    Storage(String),

    /// Key loading or signing error
    #[error("Key error: {0}")]
    Key(#[from] larch_key::Error),

    /// ASN.1 encode/decode error
    #[error("DER error: {0}")]
    Der(#[from] der::Error),

    /// JSON (de)serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for PKI operations
pub type Result<T> = std::result::Result<T, PkiError>;
