pub mod algorithm;
pub mod error;
pub mod key;

// Re-export core functionality
pub use algorithm::DigestAlgorithm;
pub use error::{Error, Result};
pub use key::SigningKey;
