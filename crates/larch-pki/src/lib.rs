//! X.509 certificate authority engine: profile driven issuance, CA
//! hierarchy management, CRL generation and an OCSP responder over a
//! shared data model.

pub mod builder;
pub mod ca;
pub mod config;
pub mod csr;
pub mod error;
pub mod extensions;
pub mod models;
pub mod profile;
pub mod status;
pub mod store;
pub mod subject;
pub mod types;

pub use builder::{build_and_sign, certificate_to_pem, CertificateParams};
pub use ca::{init_intermediate, init_root, CaOptions};
pub use config::{CrlOverride, CrlProfile, OcspResponderConfig, ProfileConfig};
pub use csr::Csr;
pub use error::{PkiError, Result};
pub use extensions::{Extension, ExtensionMap, ExtensionValue, GeneralName};
pub use models::{Certificate, CertificateAuthority, RevocationState, Watcher};
pub use profile::{IssueOptions, PreIssueContext, PreIssueHook, Profile, Profiles};
pub use status::{cache_crls, generate_crl, CrlCache, CrlOptions, MemoryCrlCache, OcspResponder};
pub use store::{MemoryRegistry, Registry};
pub use subject::Subject;
pub use types::{CrlScope, Encoding, RevocationReason};

/// The most commonly used types and entry points
pub mod prelude {
    pub use crate::{
        ca::{init_intermediate, init_root, CaOptions},
        csr::Csr,
        error::{PkiError, Result},
        profile::{IssueOptions, Profile, Profiles},
        status::{generate_crl, CrlOptions, OcspResponder},
        store::{MemoryRegistry, Registry},
        subject::Subject,
        types::{CrlScope, Encoding, RevocationReason},
    };
}
