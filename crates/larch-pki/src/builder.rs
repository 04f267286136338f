//! Low-level certificate assembly: TBS construction and Ed25519 signing.

use std::time::Duration;

use der::{
    asn1::{BitString, GeneralizedTime, UtcTime},
    Encode,
};
use pkcs8::spki::SubjectPublicKeyInfoOwned;
use time::OffsetDateTime;
use x509_cert::{
    certificate::{TbsCertificate, Version},
    ext::Extension as X509Extension,
    name::Name,
    time::{Time, Validity},
    Certificate,
};

use larch_key::SigningKey;

use crate::{
    error::{PkiError, Result},
    extensions::ExtensionMap,
    types::parse_serial,
};

/// Everything needed to assemble one certificate
pub struct CertificateParams {
    pub serial: String,
    pub subject: Name,
    pub issuer: Name,
    pub subject_public_key: SubjectPublicKeyInfoOwned,
    pub not_before: OffsetDateTime,
    pub not_after: OffsetDateTime,
    pub extensions: ExtensionMap,
}

/// Build the TBS structure, sign it with the issuer key and return the
/// certificate DER.
pub fn build_and_sign(params: &CertificateParams, issuer_key: &SigningKey) -> Result<Vec<u8>> {
    if params.not_before >= params.not_after {
        return Err(PkiError::Certificate(
            "notBefore must precede notAfter".to_string(),
        ));
    }

    let mut extensions = Vec::<X509Extension>::new();
    for ext in params.extensions.values() {
        extensions.push(ext.to_x509()?);
    }

    let signature_algorithm = issuer_key.signature_algorithm();
    let tbs_certificate = TbsCertificate {
        version: Version::V3,
        serial_number: parse_serial(&params.serial)?,
        signature: signature_algorithm.clone(),
        issuer: params.issuer.clone(),
        validity: Validity {
            not_before: encode_time(params.not_before)?,
            not_after: encode_time(params.not_after)?,
        },
        subject: params.subject.clone(),
        subject_public_key_info: params.subject_public_key.clone(),
        issuer_unique_id: None,
        subject_unique_id: None,
        extensions: if extensions.is_empty() {
            None
        } else {
            Some(extensions)
        },
    };

    let tbs_der = tbs_certificate.to_der()?;
    let signature = issuer_key.sign(&tbs_der);

    let certificate = Certificate {
        tbs_certificate,
        signature_algorithm,
        signature: BitString::from_bytes(&signature)?,
    };
    certificate.to_der().map_err(PkiError::Der)
}

/// UTCTime up to 2049, GeneralizedTime beyond, per RFC 5280
pub fn encode_time(t: OffsetDateTime) -> Result<Time> {
    let timestamp = t.unix_timestamp();
    if timestamp < 0 {
        return Err(PkiError::Certificate(
            "timestamps before the epoch are not supported".to_string(),
        ));
    }
    let duration = Duration::from_secs(timestamp as u64);
    let time = if t.year() < 2050 {
        Time::UtcTime(UtcTime::from_unix_duration(duration)?)
    } else {
        Time::GeneralTime(GeneralizedTime::from_unix_duration(duration)?)
    };
    Ok(time)
}

/// Wrap DER certificate bytes in a PEM block
pub fn certificate_to_pem(der: &[u8]) -> String {
    pem::encode(&pem::Pem::new("CERTIFICATE", der.to_vec()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use der::Decode;
    use serde_json::json;
    use time::Duration as TimeDuration;

    use crate::{
        extensions::{keys, Extension},
        subject::Subject,
        types::generate_serial,
    };

    fn params(key: &SigningKey) -> CertificateParams {
        let now = OffsetDateTime::now_utc();
        let subject = Subject::with_common_name("test.example.com");
        let mut extensions = ExtensionMap::new();
        let ext = Extension::parse(keys::BASIC_CONSTRAINTS, &json!({"ca": false})).unwrap();
        extensions.insert(ext.key().to_string(), ext);
        CertificateParams {
            serial: generate_serial().unwrap(),
            subject: subject.to_name().unwrap(),
            issuer: Subject::with_common_name("ca.example.com").to_name().unwrap(),
            subject_public_key: key.spki().unwrap(),
            not_before: now,
            not_after: now + TimeDuration::days(365),
            extensions,
        }
    }

    #[test]
    fn test_build_and_parse() {
        let key = SigningKey::generate().unwrap();
        let der = build_and_sign(&params(&key), &key).unwrap();
        let cert = Certificate::from_der(&der).unwrap();
        assert_eq!(cert.tbs_certificate.version, Version::V3);
        assert_eq!(
            cert.signature_algorithm.oid,
            const_oid::db::rfc8410::ID_ED_25519
        );
        let exts = cert.tbs_certificate.extensions.unwrap();
        assert_eq!(exts.len(), 1);
        assert_eq!(
            exts[0].extn_id,
            const_oid::db::rfc5280::ID_CE_BASIC_CONSTRAINTS
        );
    }

    #[test]
    fn test_inverted_validity_rejected() {
        let key = SigningKey::generate().unwrap();
        let mut p = params(&key);
        p.not_after = p.not_before - TimeDuration::days(1);
        assert!(matches!(
            build_and_sign(&p, &key),
            Err(PkiError::Certificate(_))
        ));
    }
}
