use serde::{Deserialize, Serialize};
use x509_cert::{ext::pkix::CrlReason, serial_number::SerialNumber};

use crate::error::{PkiError, Result};

/// Reason a certificate or CA was revoked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RevocationReason {
    Unspecified,
    KeyCompromise,
    CaCompromise,
    AffiliationChanged,
    Superseded,
    CessationOfOperation,
    CertificateHold,
    PrivilegeWithdrawn,
    AaCompromise,
    RemoveFromCrl,
}

impl RevocationReason {
    /// Map to the X.509 CRL reason code used in CRL entries and OCSP
    pub fn to_crl_reason(self) -> CrlReason {
        match self {
            RevocationReason::Unspecified => CrlReason::Unspecified,
            RevocationReason::KeyCompromise => CrlReason::KeyCompromise,
            RevocationReason::CaCompromise => CrlReason::CaCompromise,
            RevocationReason::AffiliationChanged => CrlReason::AffiliationChanged,
            RevocationReason::Superseded => CrlReason::Superseded,
            RevocationReason::CessationOfOperation => CrlReason::CessationOfOperation,
            RevocationReason::CertificateHold => CrlReason::CertificateHold,
            RevocationReason::PrivilegeWithdrawn => CrlReason::PrivilegeWithdrawn,
            RevocationReason::AaCompromise => CrlReason::AaCompromise,
            RevocationReason::RemoveFromCrl => CrlReason::RemoveFromCRL,
        }
    }
}

impl Default for RevocationReason {
    fn default() -> Self {
        RevocationReason::Unspecified
    }
}

/// Output encoding for CRLs and certificates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Encoding {
    Der,
    Pem,
}

impl Encoding {
    pub fn name(&self) -> &'static str {
        match self {
            Encoding::Der => "DER",
            Encoding::Pem => "PEM",
        }
    }
}

/// Which revoked entries a CRL covers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CrlScope {
    /// Revoked certificates and revoked child CAs
    Full,
    /// Revoked child CAs only
    Ca,
    /// Revoked leaf certificates only
    User,
    /// Always empty: attribute certificates are not modeled
    Attribute,
}

impl CrlScope {
    /// Scope suffix used in cache and counter keys; the full scope has
    /// no suffix.
    pub fn name(&self) -> Option<&'static str> {
        match self {
            CrlScope::Full => None,
            CrlScope::Ca => Some("ca"),
            CrlScope::User => Some("user"),
            CrlScope::Attribute => Some("attribute"),
        }
    }
}

impl Default for CrlScope {
    fn default() -> Self {
        CrlScope::Full
    }
}

impl std::str::FromStr for CrlScope {
    type Err = PkiError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "" | "full" => Ok(CrlScope::Full),
            "ca" => Ok(CrlScope::Ca),
            "user" => Ok(CrlScope::User),
            "attribute" => Ok(CrlScope::Attribute),
            other => Err(PkiError::InvalidScope(other.to_string())),
        }
    }
}

/// Generate a fresh certificate serial: 16 random bytes with the sign bit
/// cleared, formatted as uppercase hex with leading zeros stripped.
pub fn generate_serial() -> Result<String> {
    let mut bytes = [0u8; 16];
    getrandom::fill(&mut bytes).map_err(|e| PkiError::Certificate(e.to_string()))?;
    bytes[0] &= 0x7f;
    Ok(format_serial(&bytes))
}

/// Format serial bytes as the canonical uppercase hex string
pub fn format_serial(bytes: &[u8]) -> String {
    let hex = hex::encode_upper(bytes);
    let trimmed = hex.trim_start_matches('0');
    if trimmed.is_empty() {
        "0".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Parse a canonical hex serial back into an ASN.1 serial number
pub fn parse_serial(serial: &str) -> Result<SerialNumber> {
    let normalized = serial.trim().to_ascii_uppercase();
    let padded = if normalized.len() % 2 == 1 {
        format!("0{normalized}")
    } else {
        normalized
    };
    let mut bytes = hex::decode(&padded)
        .map_err(|e| PkiError::Validation(format!("invalid serial {serial}: {e}")))?;
    // a set sign bit would encode as negative, prepend a zero octet
    if bytes.first().is_some_and(|b| b & 0x80 != 0) {
        bytes.insert(0, 0);
    }
    SerialNumber::new(&bytes).map_err(PkiError::Der)
}
