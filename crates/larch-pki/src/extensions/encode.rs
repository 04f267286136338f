//! DER encoding and decoding of the typed extension model.

use std::str::FromStr;

use const_oid::{
    db::{rfc5280, rfc6960},
    ObjectIdentifier,
};
use der::{
    asn1::{Null, OctetString},
    Decode, Encode,
};
use x509_cert::ext::pkix::{
    constraints::name::GeneralSubtree,
    crl::dp::DistributionPoint,
    name::DistributionPointName,
    AccessDescription, AuthorityInfoAccessSyntax, AuthorityKeyIdentifier, BasicConstraints,
    CrlDistributionPoints, ExtendedKeyUsage, IssuerAltName, KeyUsage, KeyUsages, NameConstraints,
    SubjectAltName, SubjectKeyIdentifier,
};

use super::{
    keys, AccessDescriptions, BasicConstraintsValue, DistributionPointSpec, Extension,
    ExtensionValue, GeneralName, KeyUsageFlag, NameConstraintsValue, TlsFeatureKind,
};
use crate::error::{PkiError, Result};

/// id-pe-tlsfeature (RFC 7633)
pub const ID_PE_TLS_FEATURE: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.3.6.1.5.5.7.1.24");

/// SCT list extension (RFC 6962)
pub const ID_CT_PRECERT_SCTS: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.3.6.1.4.1.11129.2.4.2");

impl ExtensionValue {
    /// X.509 extension OID for this kind
    pub fn oid(&self) -> ObjectIdentifier {
        match self {
            ExtensionValue::BasicConstraints(_) => rfc5280::ID_CE_BASIC_CONSTRAINTS,
            ExtensionValue::KeyUsage(_) => rfc5280::ID_CE_KEY_USAGE,
            ExtensionValue::ExtendedKeyUsage(_) => rfc5280::ID_CE_EXT_KEY_USAGE,
            ExtensionValue::SubjectAlternativeName(_) => rfc5280::ID_CE_SUBJECT_ALT_NAME,
            ExtensionValue::IssuerAlternativeName(_) => rfc5280::ID_CE_ISSUER_ALT_NAME,
            ExtensionValue::AuthorityKeyIdentifier(_) => rfc5280::ID_CE_AUTHORITY_KEY_IDENTIFIER,
            ExtensionValue::SubjectKeyIdentifier(_) => rfc5280::ID_CE_SUBJECT_KEY_IDENTIFIER,
            ExtensionValue::CrlDistributionPoints(_) => rfc5280::ID_CE_CRL_DISTRIBUTION_POINTS,
            ExtensionValue::AuthorityInformationAccess(_) => rfc5280::ID_PE_AUTHORITY_INFO_ACCESS,
            ExtensionValue::NameConstraints(_) => rfc5280::ID_CE_NAME_CONSTRAINTS,
            ExtensionValue::TlsFeature(_) => ID_PE_TLS_FEATURE,
            ExtensionValue::OcspNoCheck => rfc6960::ID_PKIX_OCSP_NOCHECK,
            ExtensionValue::SignedCertificateTimestamps(_) => ID_CT_PRECERT_SCTS,
        }
    }

    /// DER-encode the extension value for inclusion in a certificate
    pub fn to_der_value(&self) -> Result<Vec<u8>> {
        let der = match self {
            ExtensionValue::BasicConstraints(v) => BasicConstraints {
                ca: v.ca,
                path_len_constraint: v.path_length,
            }
            .to_der()?,
            ExtensionValue::KeyUsage(flags) => {
                let mut iter = flags.iter();
                let first = iter.next().ok_or_else(|| {
                    PkiError::UnsupportedExtensionValue("empty key usage".to_string())
                })?;
                let mut usage = KeyUsage(key_usage_bit(*first).into());
                for flag in iter {
                    usage.0 |= key_usage_bit(*flag);
                }
                usage.to_der()?
            }
            ExtensionValue::ExtendedKeyUsage(oids) => {
                let oids = oids
                    .iter()
                    .map(|s| {
                        ObjectIdentifier::from_str(s).map_err(|e| {
                            PkiError::UnsupportedExtensionValue(format!("bad OID {s}: {e}"))
                        })
                    })
                    .collect::<Result<Vec<_>>>()?;
                ExtendedKeyUsage(oids).to_der()?
            }
            ExtensionValue::SubjectAlternativeName(names) => {
                SubjectAltName(to_x509_names(names)?).to_der()?
            }
            ExtensionValue::IssuerAlternativeName(names) => {
                IssuerAltName(to_x509_names(names)?).to_der()?
            }
            ExtensionValue::AuthorityKeyIdentifier(key_id) => AuthorityKeyIdentifier {
                key_identifier: Some(OctetString::new(key_id.clone())?),
                authority_cert_issuer: None,
                authority_cert_serial_number: None,
            }
            .to_der()?,
            ExtensionValue::SubjectKeyIdentifier(key_id) => {
                SubjectKeyIdentifier(OctetString::new(key_id.clone())?).to_der()?
            }
            ExtensionValue::CrlDistributionPoints(points) => {
                let points = points
                    .iter()
                    .map(|point| {
                        Ok(DistributionPoint {
                            distribution_point: Some(DistributionPointName::FullName(
                                to_x509_names(&point.full_name)?,
                            )),
                            reasons: None,
                            crl_issuer: None,
                        })
                    })
                    .collect::<Result<Vec<_>>>()?;
                CrlDistributionPoints(points).to_der()?
            }
            ExtensionValue::AuthorityInformationAccess(access) => {
                let mut descriptions = Vec::new();
                for name in &access.ocsp {
                    descriptions.push(AccessDescription {
                        access_method: rfc5280::ID_AD_OCSP,
                        access_location: name.to_x509()?,
                    });
                }
                for name in &access.issuers {
                    descriptions.push(AccessDescription {
                        access_method: rfc5280::ID_AD_CA_ISSUERS,
                        access_location: name.to_x509()?,
                    });
                }
                AuthorityInfoAccessSyntax(descriptions).to_der()?
            }
            ExtensionValue::NameConstraints(v) => NameConstraints {
                permitted_subtrees: to_subtrees(&v.permitted)?,
                excluded_subtrees: to_subtrees(&v.excluded)?,
            }
            .to_der()?,
            ExtensionValue::TlsFeature(features) => {
                let values: Vec<u64> = features.iter().map(|f| tls_feature_code(*f)).collect();
                values.to_der()?
            }
            ExtensionValue::OcspNoCheck => Null.to_der()?,
            ExtensionValue::SignedCertificateTimestamps(_) => {
                return Err(PkiError::UnsupportedExtensionValue(
                    "precertificate SCTs cannot be re-encoded for signing".to_string(),
                ))
            }
        };
        Ok(der)
    }
}

impl Extension {
    /// Produce the (critical, DER value) pair consumed by the builder
    pub fn for_signing(&self) -> Result<(bool, Vec<u8>)> {
        Ok((self.critical, self.value.to_der_value()?))
    }

    /// Build the x509-cert extension structure
    pub fn to_x509(&self) -> Result<x509_cert::ext::Extension> {
        let (critical, value) = self.for_signing()?;
        Ok(x509_cert::ext::Extension {
            extn_id: self.value.oid(),
            critical,
            extn_value: OctetString::new(value)?,
        })
    }

    /// Ingest a decoded certificate extension. SCTs are captured as
    /// opaque receive-only bytes; unknown OIDs are an error.
    pub fn from_der(oid: ObjectIdentifier, critical: bool, bytes: &[u8]) -> Result<Self> {
        let value = match oid {
            oid if oid == rfc5280::ID_CE_BASIC_CONSTRAINTS => {
                let bc = BasicConstraints::from_der(bytes)?;
                ExtensionValue::BasicConstraints(BasicConstraintsValue {
                    ca: bc.ca,
                    path_length: bc.path_len_constraint,
                })
            }
            oid if oid == rfc5280::ID_CE_KEY_USAGE => {
                let usage = KeyUsage::from_der(bytes)?;
                let flags = ALL_KEY_USAGE_FLAGS
                    .iter()
                    .copied()
                    .filter(|flag| usage.0.contains(key_usage_bit(*flag)))
                    .collect();
                ExtensionValue::KeyUsage(flags)
            }
            oid if oid == rfc5280::ID_CE_EXT_KEY_USAGE => {
                let eku = ExtendedKeyUsage::from_der(bytes)?;
                ExtensionValue::ExtendedKeyUsage(
                    eku.0.iter().map(|oid| oid.to_string()).collect(),
                )
            }
            oid if oid == rfc5280::ID_CE_SUBJECT_ALT_NAME => {
                let san = SubjectAltName::from_der(bytes)?;
                ExtensionValue::SubjectAlternativeName(from_x509_names(&san.0)?)
            }
            oid if oid == rfc5280::ID_CE_ISSUER_ALT_NAME => {
                let ian = IssuerAltName::from_der(bytes)?;
                ExtensionValue::IssuerAlternativeName(from_x509_names(&ian.0)?)
            }
            oid if oid == rfc5280::ID_CE_AUTHORITY_KEY_IDENTIFIER => {
                let aki = AuthorityKeyIdentifier::from_der(bytes)?;
                let key_id = aki
                    .key_identifier
                    .ok_or_else(|| PkiError::Validation("AKI without key identifier".to_string()))?;
                ExtensionValue::AuthorityKeyIdentifier(key_id.as_bytes().to_vec())
            }
            oid if oid == rfc5280::ID_CE_SUBJECT_KEY_IDENTIFIER => {
                let ski = SubjectKeyIdentifier::from_der(bytes)?;
                ExtensionValue::SubjectKeyIdentifier(ski.0.as_bytes().to_vec())
            }
            oid if oid == rfc5280::ID_CE_CRL_DISTRIBUTION_POINTS => {
                let points = CrlDistributionPoints::from_der(bytes)?;
                let specs = points
                    .0
                    .iter()
                    .map(|point| {
                        let names = match &point.distribution_point {
                            Some(DistributionPointName::FullName(names)) => {
                                from_x509_names(names)?
                            }
                            _ => Vec::new(),
                        };
                        Ok(DistributionPointSpec { full_name: names })
                    })
                    .collect::<Result<Vec<_>>>()?;
                ExtensionValue::CrlDistributionPoints(specs)
            }
            oid if oid == rfc5280::ID_PE_AUTHORITY_INFO_ACCESS => {
                let aia = AuthorityInfoAccessSyntax::from_der(bytes)?;
                let mut access = AccessDescriptions::default();
                for description in &aia.0 {
                    let name = GeneralName::from_x509(&description.access_location)?;
                    if description.access_method == rfc5280::ID_AD_OCSP {
                        access.ocsp.push(name);
                    } else if description.access_method == rfc5280::ID_AD_CA_ISSUERS {
                        access.issuers.push(name);
                    } else {
                        return Err(PkiError::Validation(format!(
                            "unsupported access method: {}",
                            description.access_method
                        )));
                    }
                }
                ExtensionValue::AuthorityInformationAccess(access)
            }
            oid if oid == rfc5280::ID_CE_NAME_CONSTRAINTS => {
                let nc = NameConstraints::from_der(bytes)?;
                ExtensionValue::NameConstraints(NameConstraintsValue {
                    permitted: from_subtrees(nc.permitted_subtrees.as_deref())?,
                    excluded: from_subtrees(nc.excluded_subtrees.as_deref())?,
                })
            }
            oid if oid == ID_PE_TLS_FEATURE => {
                let codes: Vec<u64> = Vec::from_der(bytes)?;
                let features = codes
                    .into_iter()
                    .map(|code| match code {
                        5 => Ok(TlsFeatureKind::StatusRequest),
                        17 => Ok(TlsFeatureKind::StatusRequestV2),
                        other => Err(PkiError::Validation(format!(
                            "unknown TLS feature: {other}"
                        ))),
                    })
                    .collect::<Result<_>>()?;
                ExtensionValue::TlsFeature(features)
            }
            oid if oid == rfc6960::ID_PKIX_OCSP_NOCHECK => {
                Null::from_der(bytes)?;
                ExtensionValue::OcspNoCheck
            }
            oid if oid == ID_CT_PRECERT_SCTS => ExtensionValue::SignedCertificateTimestamps(bytes.to_vec()),
            other => return Err(PkiError::UnknownExtensionKind(other.to_string())),
        };
        Ok(Extension { critical, value })
    }
}

const ALL_KEY_USAGE_FLAGS: [KeyUsageFlag; 9] = [
    KeyUsageFlag::DigitalSignature,
    KeyUsageFlag::ContentCommitment,
    KeyUsageFlag::KeyEncipherment,
    KeyUsageFlag::DataEncipherment,
    KeyUsageFlag::KeyAgreement,
    KeyUsageFlag::KeyCertSign,
    KeyUsageFlag::CrlSign,
    KeyUsageFlag::EncipherOnly,
    KeyUsageFlag::DecipherOnly,
];

fn key_usage_bit(flag: KeyUsageFlag) -> KeyUsages {
    match flag {
        KeyUsageFlag::DigitalSignature => KeyUsages::DigitalSignature,
        KeyUsageFlag::ContentCommitment => KeyUsages::NonRepudiation,
        KeyUsageFlag::KeyEncipherment => KeyUsages::KeyEncipherment,
        KeyUsageFlag::DataEncipherment => KeyUsages::DataEncipherment,
        KeyUsageFlag::KeyAgreement => KeyUsages::KeyAgreement,
        KeyUsageFlag::KeyCertSign => KeyUsages::KeyCertSign,
        KeyUsageFlag::CrlSign => KeyUsages::CRLSign,
        KeyUsageFlag::EncipherOnly => KeyUsages::EncipherOnly,
        KeyUsageFlag::DecipherOnly => KeyUsages::DecipherOnly,
    }
}

fn tls_feature_code(kind: TlsFeatureKind) -> u64 {
    match kind {
        TlsFeatureKind::StatusRequest => 5,
        TlsFeatureKind::StatusRequestV2 => 17,
    }
}

/// Resolve an extended-key-usage purpose name or dotted OID string
pub(super) fn eku_oid(name: &str) -> Result<String> {
    let oid = match name {
        "server_auth" => rfc5280::ID_KP_SERVER_AUTH,
        "client_auth" => rfc5280::ID_KP_CLIENT_AUTH,
        "code_signing" => rfc5280::ID_KP_CODE_SIGNING,
        "email_protection" => rfc5280::ID_KP_EMAIL_PROTECTION,
        "time_stamping" => rfc5280::ID_KP_TIME_STAMPING,
        "ocsp_signing" => rfc5280::ID_KP_OCSP_SIGNING,
        dotted => ObjectIdentifier::from_str(dotted).map_err(|_| {
            PkiError::MalformedExtensionValue {
                key: keys::EXTENDED_KEY_USAGE.to_string(),
                reason: format!("unknown purpose: {dotted}"),
            }
        })?,
    };
    Ok(oid.to_string())
}

fn to_x509_names(
    names: &[GeneralName],
) -> Result<Vec<x509_cert::ext::pkix::name::GeneralName>> {
    names.iter().map(GeneralName::to_x509).collect()
}

fn from_x509_names(
    names: &[x509_cert::ext::pkix::name::GeneralName],
) -> Result<Vec<GeneralName>> {
    names.iter().map(GeneralName::from_x509).collect()
}

fn to_subtrees(names: &[GeneralName]) -> Result<Option<Vec<GeneralSubtree>>> {
    if names.is_empty() {
        return Ok(None);
    }
    let subtrees = names
        .iter()
        .map(|name| {
            Ok(GeneralSubtree {
                base: name.to_x509()?,
                minimum: 0,
                maximum: None,
            })
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(Some(subtrees))
}

fn from_subtrees(subtrees: Option<&[GeneralSubtree]>) -> Result<Vec<GeneralName>> {
    subtrees
        .unwrap_or_default()
        .iter()
        .map(|subtree| GeneralName::from_x509(&subtree.base))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_basic_constraints_der_round_trip() {
        let ext = Extension::parse(keys::BASIC_CONSTRAINTS, &json!({"ca": true, "path_length": 0}))
            .unwrap();
        let (critical, der) = ext.for_signing().unwrap();
        assert!(critical);
        let round = Extension::from_der(rfc5280::ID_CE_BASIC_CONSTRAINTS, critical, &der).unwrap();
        assert_eq!(ext, round);
    }

    #[test]
    fn test_key_usage_der_round_trip() {
        let ext = Extension::parse(
            keys::KEY_USAGE,
            &json!(["key_cert_sign", "crl_sign", "digital_signature"]),
        )
        .unwrap();
        let (critical, der) = ext.for_signing().unwrap();
        let round = Extension::from_der(rfc5280::ID_CE_KEY_USAGE, critical, &der).unwrap();
        assert_eq!(ext, round);
    }

    #[test]
    fn test_san_der_round_trip() {
        let ext = Extension::parse(
            keys::SUBJECT_ALTERNATIVE_NAME,
            &json!(["DNS:example.com", "IP:10.1.2.3"]),
        )
        .unwrap();
        let (critical, der) = ext.for_signing().unwrap();
        let round = Extension::from_der(rfc5280::ID_CE_SUBJECT_ALT_NAME, critical, &der).unwrap();
        assert_eq!(ext, round);
    }

    #[test]
    fn test_aia_der_ordering() {
        let ext = Extension::parse(
            keys::AUTHORITY_INFORMATION_ACCESS,
            &json!({
                "ocsp": ["URI:http://ocsp.example.com"],
                "issuers": ["URI:http://issuer.example.com/ca.der"],
            }),
        )
        .unwrap();
        let (critical, der) = ext.for_signing().unwrap();
        let round =
            Extension::from_der(rfc5280::ID_PE_AUTHORITY_INFO_ACCESS, critical, &der).unwrap();
        assert_eq!(ext, round);
    }

    #[test]
    fn test_sct_cannot_sign() {
        let ext = Extension::from_der(ID_CT_PRECERT_SCTS, false, &[0x04, 0x00]).unwrap();
        assert!(matches!(
            ext.for_signing(),
            Err(PkiError::UnsupportedExtensionValue(_))
        ));
    }

    #[test]
    fn test_empty_key_usage_rejected() {
        let value = ExtensionValue::KeyUsage(Default::default());
        assert!(value.to_der_value().is_err());
    }
}
