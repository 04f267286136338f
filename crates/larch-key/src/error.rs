use thiserror::Error;

/// Error type for key loading and signing operations
#[derive(Error, Debug)]
pub enum Error {
    /// Key material could not be parsed
    #[error("Parse error: {0}")]
    ParseError(String),

    /// The key is encrypted and no password was supplied
    #[error("Private key is encrypted, a password is required")]
    PasswordRequired,

    /// Decryption of an encrypted key failed
    #[error("Could not decrypt private key (wrong password?)")]
    WrongPassword,

    /// Unsupported key algorithm
    #[error("Unsupported key algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// Unknown digest algorithm name
    #[error("Unknown digest algorithm: {0}")]
    UnknownDigest(String),

    /// Key export failed
    #[error("Export error: {0}")]
    ExportError(String),

    /// IO error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Result type alias for key operations
pub type Result<T> = std::result::Result<T, Error>;
