//! Revocation status distribution: CRL generation with a byte cache
//! and an OCSP responder.

pub mod cache;
pub mod crl;
pub mod ocsp;

pub use cache::{cache_key, CrlCache, MemoryCrlCache};
pub use crl::{cache_crls, crl_to_pem, generate_crl, CrlOptions};
pub use ocsp::OcspResponder;
