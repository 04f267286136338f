//! Configuration structures consumed from the embedding application:
//! issuance profiles, CRL distribution profiles and OCSP responder
//! settings.

use std::{collections::BTreeMap, path::PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use larch_key::DigestAlgorithm;

use crate::{subject::Subject, types::{CrlScope, Encoding}};

fn default_true() -> bool {
    true
}

fn default_expiry_days() -> i64 {
    365
}

/// One named issuance profile as configured. Deprecated fields are
/// migrated into `extensions` when the profile is constructed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileConfig {
    pub name: String,
    #[serde(default)]
    pub subject: Subject,
    #[serde(default)]
    pub algorithm: DigestAlgorithm,
    #[serde(default = "default_expiry_days")]
    pub expires_days: i64,
    /// Extension key to JSON literal, parsed by the extension model
    #[serde(default)]
    pub extensions: BTreeMap<String, Value>,
    #[serde(default = "default_true")]
    pub cn_in_san: bool,
    #[serde(default = "default_true")]
    pub add_crl_url: bool,
    #[serde(default = "default_true")]
    pub add_ocsp_url: bool,
    #[serde(default = "default_true")]
    pub add_issuer_url: bool,
    #[serde(default = "default_true")]
    pub add_issuer_alternative_name: bool,
    /// Issuer name override; defaults to the signing CA's subject
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issuer_name: Option<Subject>,
    #[serde(default)]
    pub description: String,

    // deprecated aliases, accepted for backward compatibility
    #[serde(default, rename = "keyUsage", skip_serializing_if = "Option::is_none")]
    pub legacy_key_usage: Option<Value>,
    #[serde(default, rename = "extendedKeyUsage", skip_serializing_if = "Option::is_none")]
    pub legacy_extended_key_usage: Option<Value>,
    #[serde(default, rename = "TLSFeature", skip_serializing_if = "Option::is_none")]
    pub legacy_tls_feature: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub desc: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ocsp_no_check: Option<bool>,
}

impl ProfileConfig {
    pub fn new(name: impl Into<String>) -> Self {
        ProfileConfig {
            name: name.into(),
            subject: Subject::default(),
            algorithm: DigestAlgorithm::default(),
            expires_days: default_expiry_days(),
            extensions: BTreeMap::new(),
            cn_in_san: true,
            add_crl_url: true,
            add_ocsp_url: true,
            add_issuer_url: true,
            add_issuer_alternative_name: true,
            issuer_name: None,
            description: String::new(),
            legacy_key_usage: None,
            legacy_extended_key_usage: None,
            legacy_tls_feature: None,
            desc: None,
            ocsp_no_check: None,
        }
    }
}

fn default_crl_expires() -> u64 {
    86400
}

fn default_encodings() -> Vec<Encoding> {
    vec![Encoding::Der]
}

/// Per-CA override within a CRL distribution profile
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CrlOverride {
    /// Leave this CA out of batch cache refresh entirely
    #[serde(default)]
    pub skip: bool,
    /// Password for the CA key, when it differs from the default
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encodings: Option<Vec<Encoding>>,
}

/// One CRL distribution profile: scope, encodings, digest, expiry and
/// per-CA overrides
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrlProfile {
    #[serde(default)]
    pub scope: CrlScope,
    /// Cache TTL and nextUpdate offset, in seconds
    #[serde(default = "default_crl_expires")]
    pub expires: u64,
    #[serde(default)]
    pub digest: DigestAlgorithm,
    #[serde(default = "default_encodings")]
    pub encodings: Vec<Encoding>,
    /// Keyed by CA serial
    #[serde(default)]
    pub overrides: BTreeMap<String, CrlOverride>,
}

impl Default for CrlProfile {
    fn default() -> Self {
        CrlProfile {
            scope: CrlScope::Full,
            expires: default_crl_expires(),
            digest: DigestAlgorithm::default(),
            encodings: default_encodings(),
            overrides: BTreeMap::new(),
        }
    }
}

fn default_ocsp_expires() -> u64 {
    600
}

/// Settings for one OCSP responder endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OcspResponderConfig {
    /// Serial or name of the CA whose certificates are answered for
    pub ca: String,
    /// Delegated responder key (distinct from the CA key)
    pub responder_key_path: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub responder_key_password: Option<String>,
    /// Path to a PEM or DER certificate file, or the serial of a
    /// stored certificate under the CA; the path form wins when the
    /// file exists
    pub responder_cert: String,
    /// nextUpdate offset in seconds
    #[serde(default = "default_ocsp_expires")]
    pub expires: u64,
    /// Answer for child CAs instead of leaf certificates
    #[serde(default)]
    pub ca_mode: bool,
}
