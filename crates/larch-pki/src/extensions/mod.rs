//! Typed X.509 extension model.
//!
//! Extensions carry a stable string key, a criticality flag and a typed
//! value. A certificate-to-be is a key-indexed map of extensions; merging
//! replaces by key except for the cumulative kinds (subject/issuer
//! alternative names, CRL distribution points, authority information
//! access) where values are appended.

mod encode;
mod general_name;

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

pub use general_name::{is_valid_hostname, GeneralName};

use crate::error::{PkiError, Result};

/// Stable extension keys
pub mod keys {
    pub const BASIC_CONSTRAINTS: &str = "basic_constraints";
    pub const KEY_USAGE: &str = "key_usage";
    pub const EXTENDED_KEY_USAGE: &str = "extended_key_usage";
    pub const SUBJECT_ALTERNATIVE_NAME: &str = "subject_alternative_name";
    pub const ISSUER_ALTERNATIVE_NAME: &str = "issuer_alternative_name";
    pub const AUTHORITY_KEY_IDENTIFIER: &str = "authority_key_identifier";
    pub const SUBJECT_KEY_IDENTIFIER: &str = "subject_key_identifier";
    pub const CRL_DISTRIBUTION_POINTS: &str = "crl_distribution_points";
    pub const AUTHORITY_INFORMATION_ACCESS: &str = "authority_information_access";
    pub const NAME_CONSTRAINTS: &str = "name_constraints";
    pub const TLS_FEATURE: &str = "tls_feature";
    pub const OCSP_NO_CHECK: &str = "ocsp_no_check";
    pub const PRECERTIFICATE_SIGNED_CERTIFICATE_TIMESTAMPS: &str =
        "precertificate_signed_certificate_timestamps";
}

/// Key usage bits
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyUsageFlag {
    DigitalSignature,
    ContentCommitment,
    KeyEncipherment,
    DataEncipherment,
    KeyAgreement,
    KeyCertSign,
    CrlSign,
    EncipherOnly,
    DecipherOnly,
}

/// TLS feature extension entries (RFC 7633)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TlsFeatureKind {
    StatusRequest,
    StatusRequestV2,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BasicConstraintsValue {
    pub ca: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path_length: Option<u8>,
}

/// One CRL distribution point, a list of full-name general names
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistributionPointSpec {
    pub full_name: Vec<GeneralName>,
}

/// Authority information access: OCSP responders and issuer certificate URLs
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessDescriptions {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ocsp: Vec<GeneralName>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub issuers: Vec<GeneralName>,
}

impl AccessDescriptions {
    pub fn is_empty(&self) -> bool {
        self.ocsp.is_empty() && self.issuers.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameConstraintsValue {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub permitted: Vec<GeneralName>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub excluded: Vec<GeneralName>,
}

/// Semantically typed extension value
#[derive(Debug, Clone)]
pub enum ExtensionValue {
    BasicConstraints(BasicConstraintsValue),
    KeyUsage(BTreeSet<KeyUsageFlag>),
    /// Dotted OID strings, normalized from well-known purpose names
    ExtendedKeyUsage(Vec<String>),
    SubjectAlternativeName(Vec<GeneralName>),
    IssuerAlternativeName(Vec<GeneralName>),
    /// Raw key identifier octets of the issuing CA
    AuthorityKeyIdentifier(Vec<u8>),
    SubjectKeyIdentifier(Vec<u8>),
    CrlDistributionPoints(Vec<DistributionPointSpec>),
    AuthorityInformationAccess(AccessDescriptions),
    NameConstraints(NameConstraintsValue),
    TlsFeature(BTreeSet<TlsFeatureKind>),
    OcspNoCheck,
    /// Receive-only: opaque bytes lifted from an issued certificate.
    /// Cannot be re-encoded for signing and never compares equal.
    SignedCertificateTimestamps(Vec<u8>),
}

/// Equality is structural except for SCTs, whose encoding cannot be
/// round-tripped; two SCT extensions never compare equal.
impl PartialEq for ExtensionValue {
    fn eq(&self, other: &Self) -> bool {
        use ExtensionValue::*;
        match (self, other) {
            (BasicConstraints(a), BasicConstraints(b)) => a == b,
            (KeyUsage(a), KeyUsage(b)) => a == b,
            (ExtendedKeyUsage(a), ExtendedKeyUsage(b)) => a == b,
            (SubjectAlternativeName(a), SubjectAlternativeName(b)) => a == b,
            (IssuerAlternativeName(a), IssuerAlternativeName(b)) => a == b,
            (AuthorityKeyIdentifier(a), AuthorityKeyIdentifier(b)) => a == b,
            (SubjectKeyIdentifier(a), SubjectKeyIdentifier(b)) => a == b,
            (CrlDistributionPoints(a), CrlDistributionPoints(b)) => a == b,
            (AuthorityInformationAccess(a), AuthorityInformationAccess(b)) => a == b,
            (NameConstraints(a), NameConstraints(b)) => a == b,
            (TlsFeature(a), TlsFeature(b)) => a == b,
            (OcspNoCheck, OcspNoCheck) => true,
            (SignedCertificateTimestamps(_), SignedCertificateTimestamps(_)) => false,
            _ => false,
        }
    }
}

impl ExtensionValue {
    /// Stable string key for this extension kind
    pub fn key(&self) -> &'static str {
        match self {
            ExtensionValue::BasicConstraints(_) => keys::BASIC_CONSTRAINTS,
            ExtensionValue::KeyUsage(_) => keys::KEY_USAGE,
            ExtensionValue::ExtendedKeyUsage(_) => keys::EXTENDED_KEY_USAGE,
            ExtensionValue::SubjectAlternativeName(_) => keys::SUBJECT_ALTERNATIVE_NAME,
            ExtensionValue::IssuerAlternativeName(_) => keys::ISSUER_ALTERNATIVE_NAME,
            ExtensionValue::AuthorityKeyIdentifier(_) => keys::AUTHORITY_KEY_IDENTIFIER,
            ExtensionValue::SubjectKeyIdentifier(_) => keys::SUBJECT_KEY_IDENTIFIER,
            ExtensionValue::CrlDistributionPoints(_) => keys::CRL_DISTRIBUTION_POINTS,
            ExtensionValue::AuthorityInformationAccess(_) => keys::AUTHORITY_INFORMATION_ACCESS,
            ExtensionValue::NameConstraints(_) => keys::NAME_CONSTRAINTS,
            ExtensionValue::TlsFeature(_) => keys::TLS_FEATURE,
            ExtensionValue::OcspNoCheck => keys::OCSP_NO_CHECK,
            ExtensionValue::SignedCertificateTimestamps(_) => {
                keys::PRECERTIFICATE_SIGNED_CERTIFICATE_TIMESTAMPS
            }
        }
    }

    /// Cumulative kinds support `append`; everything else is replace-only
    pub fn is_cumulative(&self) -> bool {
        matches!(
            self,
            ExtensionValue::SubjectAlternativeName(_)
                | ExtensionValue::IssuerAlternativeName(_)
                | ExtensionValue::CrlDistributionPoints(_)
                | ExtensionValue::AuthorityInformationAccess(_)
        )
    }

    /// Append `other` to a cumulative value; existing entries are kept
    /// and order is preserved.
    pub fn append(&mut self, other: ExtensionValue) -> Result<()> {
        match (self, other) {
            (
                ExtensionValue::SubjectAlternativeName(mine),
                ExtensionValue::SubjectAlternativeName(theirs),
            ) => mine.extend(theirs),
            (
                ExtensionValue::IssuerAlternativeName(mine),
                ExtensionValue::IssuerAlternativeName(theirs),
            ) => mine.extend(theirs),
            (
                ExtensionValue::CrlDistributionPoints(mine),
                ExtensionValue::CrlDistributionPoints(theirs),
            ) => mine.extend(theirs),
            (
                ExtensionValue::AuthorityInformationAccess(mine),
                ExtensionValue::AuthorityInformationAccess(theirs),
            ) => {
                mine.ocsp.extend(theirs.ocsp);
                mine.issuers.extend(theirs.issuers);
            }
            (mine, _) => {
                return Err(PkiError::UnsupportedExtensionValue(format!(
                    "{} is not cumulative",
                    mine.key()
                )))
            }
        }
        Ok(())
    }
}

/// One X.509 extension: criticality plus a typed value
#[derive(Debug, Clone, PartialEq)]
pub struct Extension {
    pub critical: bool,
    pub value: ExtensionValue,
}

impl Extension {
    /// Wrap a value with its conventional criticality
    pub fn new(value: ExtensionValue) -> Self {
        let critical = default_criticality(value.key());
        Extension { critical, value }
    }

    pub fn key(&self) -> &'static str {
        self.value.key()
    }

    /// Parse from a JSON literal: either a bare payload or a
    /// `{"critical": ..., "value": ...}` wrapper.
    pub fn parse(key: &str, raw: &Value) -> Result<Self> {
        let (critical, payload) = match raw {
            Value::Object(map) if map.contains_key("value") => (
                map.get("critical").and_then(Value::as_bool),
                map.get("value").cloned().unwrap_or(Value::Null),
            ),
            other => (None, other.clone()),
        };
        let value = parse_value(key, payload)?;
        Ok(Extension {
            critical: critical.unwrap_or_else(|| default_criticality(key)),
            value,
        })
    }

    /// JSON-safe form: `{"critical": ..., "value": ...}`
    pub fn serialize(&self) -> Value {
        json!({
            "critical": self.critical,
            "value": serialize_value(&self.value),
        })
    }

    /// Append a cumulative value to this extension
    pub fn append(&mut self, other: ExtensionValue) -> Result<()> {
        self.value.append(other)
    }
}

/// The extension set of a certificate-to-be, keyed by extension key
pub type ExtensionMap = BTreeMap<String, Extension>;

/// Merge an extension into the map: cumulative kinds append to an
/// existing entry of the same kind, everything else replaces by key.
pub fn append_or_insert(map: &mut ExtensionMap, value: ExtensionValue) -> Result<()> {
    let key = value.key().to_string();
    match map.get_mut(&key) {
        Some(existing) if value.is_cumulative() => existing.append(value),
        _ => {
            map.insert(key, Extension::new(value));
            Ok(())
        }
    }
}

/// Conventional criticality per extension kind
pub fn default_criticality(key: &str) -> bool {
    matches!(key, keys::BASIC_CONSTRAINTS | keys::KEY_USAGE | keys::NAME_CONSTRAINTS)
}

fn parse_value(key: &str, payload: Value) -> Result<ExtensionValue> {
    fn from_json<T: serde::de::DeserializeOwned>(key: &str, payload: Value) -> Result<T> {
        serde_json::from_value(payload).map_err(|e| PkiError::MalformedExtensionValue {
            key: key.to_string(),
            reason: e.to_string(),
        })
    }

    match key {
        keys::BASIC_CONSTRAINTS => Ok(ExtensionValue::BasicConstraints(from_json(key, payload)?)),
        keys::KEY_USAGE => Ok(ExtensionValue::KeyUsage(from_json(key, payload)?)),
        keys::EXTENDED_KEY_USAGE => {
            let names: Vec<String> = from_json(key, payload)?;
            let oids = names
                .iter()
                .map(|name| encode::eku_oid(name))
                .collect::<Result<Vec<_>>>()?;
            Ok(ExtensionValue::ExtendedKeyUsage(oids))
        }
        keys::SUBJECT_ALTERNATIVE_NAME => {
            Ok(ExtensionValue::SubjectAlternativeName(from_json(key, payload)?))
        }
        keys::ISSUER_ALTERNATIVE_NAME => {
            Ok(ExtensionValue::IssuerAlternativeName(from_json(key, payload)?))
        }
        keys::AUTHORITY_KEY_IDENTIFIER => {
            let hex_str: String = from_json(key, payload)?;
            Ok(ExtensionValue::AuthorityKeyIdentifier(parse_hex(key, &hex_str)?))
        }
        keys::SUBJECT_KEY_IDENTIFIER => {
            let hex_str: String = from_json(key, payload)?;
            Ok(ExtensionValue::SubjectKeyIdentifier(parse_hex(key, &hex_str)?))
        }
        keys::CRL_DISTRIBUTION_POINTS => {
            Ok(ExtensionValue::CrlDistributionPoints(from_json(key, payload)?))
        }
        keys::AUTHORITY_INFORMATION_ACCESS => {
            Ok(ExtensionValue::AuthorityInformationAccess(from_json(key, payload)?))
        }
        keys::NAME_CONSTRAINTS => Ok(ExtensionValue::NameConstraints(from_json(key, payload)?)),
        keys::TLS_FEATURE => Ok(ExtensionValue::TlsFeature(from_json(key, payload)?)),
        keys::OCSP_NO_CHECK => match payload {
            Value::Null | Value::Bool(true) | Value::Object(_) => Ok(ExtensionValue::OcspNoCheck),
            _ => Err(PkiError::MalformedExtensionValue {
                key: key.to_string(),
                reason: "expected null or true".to_string(),
            }),
        },
        keys::PRECERTIFICATE_SIGNED_CERTIFICATE_TIMESTAMPS => {
            let hex_str: String = from_json(key, payload)?;
            Ok(ExtensionValue::SignedCertificateTimestamps(parse_hex(key, &hex_str)?))
        }
        other => Err(PkiError::UnknownExtensionKind(other.to_string())),
    }
}

fn parse_hex(key: &str, s: &str) -> Result<Vec<u8>> {
    hex::decode(s).map_err(|e| PkiError::MalformedExtensionValue {
        key: key.to_string(),
        reason: e.to_string(),
    })
}

fn serialize_value(value: &ExtensionValue) -> Value {
    fn to_json<T: Serialize>(v: &T) -> Value {
        serde_json::to_value(v).unwrap_or(Value::Null)
    }

    match value {
        ExtensionValue::BasicConstraints(v) => to_json(v),
        ExtensionValue::KeyUsage(v) => to_json(v),
        ExtensionValue::ExtendedKeyUsage(v) => to_json(v),
        ExtensionValue::SubjectAlternativeName(v) => to_json(v),
        ExtensionValue::IssuerAlternativeName(v) => to_json(v),
        ExtensionValue::AuthorityKeyIdentifier(v) => Value::String(hex::encode(v)),
        ExtensionValue::SubjectKeyIdentifier(v) => Value::String(hex::encode(v)),
        ExtensionValue::CrlDistributionPoints(v) => to_json(v),
        ExtensionValue::AuthorityInformationAccess(v) => to_json(v),
        ExtensionValue::NameConstraints(v) => to_json(v),
        ExtensionValue::TlsFeature(v) => to_json(v),
        ExtensionValue::OcspNoCheck => Value::Bool(true),
        ExtensionValue::SignedCertificateTimestamps(v) => Value::String(hex::encode(v)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_basic_constraints() {
        let ext = Extension::parse(
            keys::BASIC_CONSTRAINTS,
            &json!({"ca": true, "path_length": 1}),
        )
        .unwrap();
        assert!(ext.critical);
        assert_eq!(
            ext.value,
            ExtensionValue::BasicConstraints(BasicConstraintsValue {
                ca: true,
                path_length: Some(1),
            })
        );
    }

    #[test]
    fn test_parse_wrapped_criticality() {
        let ext = Extension::parse(
            keys::KEY_USAGE,
            &json!({"critical": false, "value": ["digital_signature", "key_encipherment"]}),
        )
        .unwrap();
        assert!(!ext.critical);
        match &ext.value {
            ExtensionValue::KeyUsage(flags) => {
                assert!(flags.contains(&KeyUsageFlag::DigitalSignature));
                assert_eq!(flags.len(), 2);
            }
            other => panic!("unexpected value: {other:?}"),
        }
    }

    #[test]
    fn test_unknown_kind() {
        assert!(matches!(
            Extension::parse("certificate_policies", &json!(null)),
            Err(PkiError::UnknownExtensionKind(_))
        ));
    }

    #[test]
    fn test_malformed_value() {
        assert!(matches!(
            Extension::parse(keys::BASIC_CONSTRAINTS, &json!("nope")),
            Err(PkiError::MalformedExtensionValue { .. })
        ));
    }

    #[test]
    fn test_serialize_round_trip() {
        let literals = [
            (keys::BASIC_CONSTRAINTS, json!({"ca": false})),
            (keys::KEY_USAGE, json!(["digital_signature"])),
            (keys::EXTENDED_KEY_USAGE, json!(["server_auth", "client_auth"])),
            (keys::SUBJECT_ALTERNATIVE_NAME, json!(["DNS:example.com"])),
            (
                keys::CRL_DISTRIBUTION_POINTS,
                json!([{"full_name": ["URI:http://crl.example.com/ca.crl"]}]),
            ),
            (
                keys::AUTHORITY_INFORMATION_ACCESS,
                json!({"ocsp": ["URI:http://ocsp.example.com"]}),
            ),
            (keys::TLS_FEATURE, json!(["status_request"])),
            (keys::OCSP_NO_CHECK, json!(true)),
        ];
        for (key, literal) in literals {
            let ext = Extension::parse(key, &literal).unwrap();
            let round = Extension::parse(key, &ext.serialize()).unwrap();
            assert_eq!(ext, round, "round-trip mismatch for {key}");
        }
    }

    #[test]
    fn test_sct_never_equal() {
        let a = Extension::parse(
            keys::PRECERTIFICATE_SIGNED_CERTIFICATE_TIMESTAMPS,
            &json!("0400"),
        )
        .unwrap();
        let b = a.clone();
        assert_ne!(a, b);
    }

    #[test]
    fn test_append_preserves_order() {
        let mut ext = Extension::parse(
            keys::CRL_DISTRIBUTION_POINTS,
            &json!([{"full_name": ["URI:http://one.example.com"]}]),
        )
        .unwrap();
        ext.append(ExtensionValue::CrlDistributionPoints(vec![
            DistributionPointSpec {
                full_name: vec!["URI:http://two.example.com".parse().unwrap()],
            },
        ]))
        .unwrap();
        match &ext.value {
            ExtensionValue::CrlDistributionPoints(points) => {
                assert_eq!(points.len(), 2);
                assert_eq!(
                    points[0].full_name[0],
                    "URI:http://one.example.com".parse().unwrap()
                );
            }
            other => panic!("unexpected value: {other:?}"),
        }
    }

    #[test]
    fn test_append_rejects_replace_only_kinds() {
        let mut ext = Extension::parse(keys::BASIC_CONSTRAINTS, &json!({"ca": false})).unwrap();
        let err = ext.append(ExtensionValue::OcspNoCheck);
        assert!(matches!(err, Err(PkiError::UnsupportedExtensionValue(_))));
    }
}
