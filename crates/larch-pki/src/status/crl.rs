//! Certificate revocation list generation and the cache refresh job.

use der::{
    asn1::{OctetString, Uint},
    Encode,
};
use time::{Duration, OffsetDateTime};
use tracing::{error, info};
use x509_cert::{
    crl::{CertificateList, RevokedCert, TbsCertList},
    ext::pkix::{
        name::DistributionPointName, AuthorityKeyIdentifier, CrlNumber, IssuingDistributionPoint,
    },
};

use const_oid::db::rfc5280;
use larch_key::DigestAlgorithm;

use crate::{
    builder::encode_time,
    config::CrlProfile,
    error::Result,
    extensions::GeneralName,
    models::{CertificateAuthority, RevocationState},
    status::cache::{cache_key, CrlCache},
    store::Registry,
    types::{parse_serial, CrlScope, Encoding},
};

/// Parameters for one CRL generation
#[derive(Debug, Clone, Default)]
pub struct CrlOptions {
    pub scope: CrlScope,
    /// Distinguishes independently numbered CRL streams of the same CA
    /// and scope
    pub counter_key: String,
    /// Explicit issuing distribution point names; when absent they are
    /// derived from the CA's CRL URLs
    pub full_name: Option<Vec<GeneralName>>,
    pub digest: DigestAlgorithm,
    /// Validity in seconds
    pub expires: u64,
    pub password: Option<String>,
}

impl CrlOptions {
    pub fn new(scope: CrlScope, counter_key: impl Into<String>) -> Self {
        CrlOptions {
            scope,
            counter_key: counter_key.into(),
            expires: 86400,
            ..Default::default()
        }
    }
}

/// Generate and sign a CRL for `ca`, returning DER bytes. The CRL
/// number is drawn from a monotonic counter scoped to the CA, the
/// scope, and the counter key, starting at zero.
pub fn generate_crl(
    registry: &dyn Registry,
    ca: &CertificateAuthority,
    options: &CrlOptions,
) -> Result<Vec<u8>> {
    let revoked = collect_entries(registry, ca, options.scope)?;

    let now = OffsetDateTime::now_utc();
    let next_update = now + Duration::seconds(options.expires as i64);

    let mut extensions = Vec::new();
    extensions.push(crl_number_extension(registry, ca, options)?);
    if let Some(idp) = issuing_distribution_point(ca, options)? {
        extensions.push(idp);
    }
    if let Some(key_id) = ca.key_identifier()? {
        let aki = AuthorityKeyIdentifier {
            key_identifier: Some(OctetString::new(key_id)?),
            authority_cert_issuer: None,
            authority_cert_serial_number: None,
        };
        extensions.push(raw_extension(
            rfc5280::ID_CE_AUTHORITY_KEY_IDENTIFIER,
            false,
            aki.to_der()?,
        )?);
    }

    let signing_key = ca.signing_key(options.password.as_deref())?;
    let tbs = TbsCertList {
        version: x509_cert::certificate::Version::V2,
        signature: signing_key.signature_algorithm(),
        issuer: ca.subject_name()?,
        this_update: encode_time(now)?,
        next_update: Some(encode_time(next_update)?),
        revoked_certificates: if revoked.is_empty() { None } else { Some(revoked) },
        crl_extensions: Some(extensions),
    };

    let tbs_der = tbs.to_der()?;
    let signature = signing_key.sign(&tbs_der);
    let crl = CertificateList {
        tbs_cert_list: tbs,
        signature_algorithm: signing_key.signature_algorithm(),
        signature: der::asn1::BitString::from_bytes(&signature)?,
    };
    Ok(crl.to_der()?)
}

/// PEM rendering of a DER CRL
pub fn crl_to_pem(der: &[u8]) -> String {
    pem::encode(&pem::Pem::new("X509 CRL", der.to_vec()))
}

fn collect_entries(
    registry: &dyn Registry,
    ca: &CertificateAuthority,
    scope: CrlScope,
) -> Result<Vec<RevokedCert>> {
    let mut entries = Vec::new();
    if matches!(scope, CrlScope::Full | CrlScope::User) {
        for cert in registry.revoked_certificates(&ca.serial)? {
            entries.push(revoked_entry(&cert.serial, &cert.revocation)?);
        }
    }
    if matches!(scope, CrlScope::Full | CrlScope::Ca) {
        for child in registry.revoked_child_cas(&ca.serial)? {
            entries.push(revoked_entry(&child.serial, &child.revocation)?);
        }
    }
    // attribute scope is always empty
    Ok(entries)
}

fn revoked_entry(serial: &str, revocation: &RevocationState) -> Result<RevokedCert> {
    let mut extensions = Vec::new();
    if let Some(reason) = revocation.reason {
        extensions.push(raw_extension(
            rfc5280::ID_CE_CRL_REASONS,
            false,
            reason.to_crl_reason().to_der()?,
        )?);
    }
    if let Some(compromised_at) = revocation.compromised_at {
        let ts = compromised_at.unix_timestamp();
        if ts >= 0 {
            let invalidity = der::asn1::GeneralizedTime::from_unix_duration(
                std::time::Duration::from_secs(ts as u64),
            )?;
            extensions.push(raw_extension(
                rfc5280::ID_CE_INVALIDITY_DATE,
                false,
                invalidity.to_der()?,
            )?);
        }
    }
    Ok(RevokedCert {
        serial_number: parse_serial(serial)?,
        revocation_date: encode_time(
            revocation.revoked_at.unwrap_or_else(OffsetDateTime::now_utc),
        )?,
        crl_entry_extensions: if extensions.is_empty() { None } else { Some(extensions) },
    })
}

fn crl_number_extension(
    registry: &dyn Registry,
    ca: &CertificateAuthority,
    options: &CrlOptions,
) -> Result<x509_cert::ext::Extension> {
    let mut counter = format!("{}_crl", ca.serial);
    if let Some(scope) = options.scope.name() {
        counter.push('_');
        counter.push_str(scope);
    }
    if !options.counter_key.is_empty() {
        counter.push('_');
        counter.push_str(&options.counter_key);
    }
    let number = registry.next_crl_number(&counter)?;
    let bytes = number.to_be_bytes();
    let trimmed: &[u8] = match bytes.iter().position(|b| *b != 0) {
        Some(start) => &bytes[start..],
        None => &[0],
    };
    let crl_number = CrlNumber(Uint::new(trimmed)?);
    raw_extension(rfc5280::ID_CE_CRL_NUMBER, false, crl_number.to_der()?)
}

/// The issuing distribution point is critical; it is written whenever
/// the scope is restricted or a distribution name is known.
fn issuing_distribution_point(
    ca: &CertificateAuthority,
    options: &CrlOptions,
) -> Result<Option<x509_cert::ext::Extension>> {
    let full_name = match &options.full_name {
        Some(names) => names.clone(),
        None => ca
            .distribution_point_urls()
            .iter()
            .map(|url| GeneralName::Uri(url.to_string()))
            .collect(),
    };

    let scoped = options.scope != CrlScope::Full;
    if full_name.is_empty() && !scoped {
        return Ok(None);
    }

    let distribution_point = if full_name.is_empty() {
        None
    } else {
        let names = full_name
            .iter()
            .map(GeneralName::to_x509)
            .collect::<Result<Vec<_>>>()?;
        Some(DistributionPointName::FullName(names))
    };

    let idp = IssuingDistributionPoint {
        distribution_point,
        only_contains_user_certs: options.scope == CrlScope::User,
        only_contains_ca_certs: options.scope == CrlScope::Ca,
        only_some_reasons: None,
        indirect_crl: false,
        only_contains_attribute_certs: options.scope == CrlScope::Attribute,
    };
    Ok(Some(raw_extension(
        rfc5280::ID_CE_ISSUING_DISTRIBUTION_POINT,
        true,
        idp.to_der()?,
    )?))
}

fn raw_extension(
    extn_id: der::asn1::ObjectIdentifier,
    critical: bool,
    value: Vec<u8>,
) -> Result<x509_cert::ext::Extension> {
    Ok(x509_cert::ext::Extension {
        extn_id,
        critical,
        extn_value: OctetString::new(value)?,
    })
}

/// Refresh cached CRLs for every CA and every configured CRL profile.
/// Failures are logged per CA and never abort the run; a failed slot is
/// simply left unset.
pub fn cache_crls(
    registry: &dyn Registry,
    cache: &dyn CrlCache,
    profiles: &[(String, CrlProfile)],
) -> Result<()> {
    for ca in registry.cas()? {
        for (name, profile) in profiles {
            if let Err(err) = cache_ca_crls(registry, cache, &ca, name, profile) {
                error!(ca = %ca.name, profile = %name, %err, "CRL refresh failed");
            }
        }
    }
    Ok(())
}

fn cache_ca_crls(
    registry: &dyn Registry,
    cache: &dyn CrlCache,
    ca: &CertificateAuthority,
    name: &str,
    profile: &CrlProfile,
) -> Result<()> {
    let overrides = profile.overrides.get(&ca.serial);
    if overrides.map(|o| o.skip).unwrap_or(false) {
        return Ok(());
    }

    let mut options = CrlOptions::new(profile.scope, name.to_string());
    options.digest = profile.digest;
    options.expires = profile.expires;
    options.password = overrides.and_then(|o| o.password.clone());

    let der = generate_crl(registry, ca, &options)?;
    let encodings = overrides
        .and_then(|o| o.encodings.clone())
        .unwrap_or_else(|| profile.encodings.clone());
    let ttl = Duration::seconds(profile.expires as i64);
    for encoding in encodings {
        let bytes = match encoding {
            Encoding::Der => der.clone(),
            Encoding::Pem => crl_to_pem(&der).into_bytes(),
        };
        let key = cache_key(&ca.serial, profile.digest, encoding, profile.scope);
        cache.set(&key, bytes, ttl)?;
    }
    info!(ca = %ca.name, profile = %name, "cached CRLs");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use der::Decode;
    use larch_key::SigningKey;

    use crate::{
        ca::{init_root, CaOptions},
        config::CrlOverride,
        csr::Csr,
        status::cache::MemoryCrlCache,
        store::{MemoryRegistry, Registry},
        subject::Subject,
        types::RevocationReason,
    };

    fn setup(dir: &std::path::Path) -> (MemoryRegistry, std::sync::Arc<CertificateAuthority>) {
        let registry = MemoryRegistry::new();
        let mut options = CaOptions::new(
            "root",
            Subject::with_common_name("ca.example.com"),
            dir.join("root.key"),
        );
        options.crl_url = Some("http://crl.example.com/ca.crl".to_string());
        let ca = init_root(&registry, options).unwrap();
        (registry, ca)
    }

    fn issue_and_revoke(
        registry: &MemoryRegistry,
        ca: &CertificateAuthority,
        cn: &str,
    ) -> crate::models::Certificate {
        let key = SigningKey::generate().unwrap();
        let csr = Csr::build(&key, &Subject::with_common_name(cn)).unwrap();
        let profile =
            crate::profile::Profile::from_config(&crate::config::ProfileConfig::new("t")).unwrap();
        let mut cert = profile
            .create_cert(registry, ca, &csr, &Default::default(), &[])
            .unwrap();
        let compromised = OffsetDateTime::now_utc() - Duration::hours(1);
        cert.revoke(RevocationReason::KeyCompromise, None, Some(compromised))
            .unwrap();
        registry.save_certificate(cert.clone()).unwrap();
        cert
    }

    fn crl_number(der_bytes: &[u8]) -> u64 {
        let crl = CertificateList::from_der(der_bytes).unwrap();
        let extensions = crl.tbs_cert_list.crl_extensions.unwrap();
        let ext = extensions
            .iter()
            .find(|e| e.extn_id == rfc5280::ID_CE_CRL_NUMBER)
            .unwrap();
        let number = CrlNumber::from_der(ext.extn_value.as_bytes()).unwrap();
        let mut value = 0u64;
        for byte in number.0.as_bytes() {
            value = value << 8 | u64::from(*byte);
        }
        value
    }

    #[test]
    fn test_crl_numbers_count_from_zero() {
        let dir = tempfile::tempdir().unwrap();
        let (registry, ca) = setup(dir.path());
        let options = CrlOptions::new(CrlScope::Full, "default");
        for expected in 0..3 {
            let der_bytes = generate_crl(&registry, &ca, &options).unwrap();
            assert_eq!(crl_number(&der_bytes), expected);
        }

        // a different counter key numbers independently
        let other = CrlOptions::new(CrlScope::Full, "other");
        let der_bytes = generate_crl(&registry, &ca, &other).unwrap();
        assert_eq!(crl_number(&der_bytes), 0);
    }

    #[test]
    fn test_revoked_entry_carries_reason() {
        let dir = tempfile::tempdir().unwrap();
        let (registry, ca) = setup(dir.path());
        let cert = issue_and_revoke(&registry, &ca, "leaf.example.com");

        let der_bytes =
            generate_crl(&registry, &ca, &CrlOptions::new(CrlScope::Full, "default")).unwrap();
        let crl = CertificateList::from_der(&der_bytes).unwrap();
        let revoked = crl.tbs_cert_list.revoked_certificates.unwrap();
        assert_eq!(revoked.len(), 1);
        assert_eq!(revoked[0].serial_number, parse_serial(&cert.serial).unwrap());
        let entry_extensions = revoked[0].crl_entry_extensions.as_ref().unwrap();
        assert_eq!(entry_extensions[0].extn_id, rfc5280::ID_CE_CRL_REASONS);
        assert_eq!(entry_extensions[1].extn_id, rfc5280::ID_CE_INVALIDITY_DATE);
    }

    #[test]
    fn test_user_scope_excludes_child_cas() {
        let dir = tempfile::tempdir().unwrap();
        let (registry, ca) = setup(dir.path());
        issue_and_revoke(&registry, &ca, "leaf.example.com");

        let mut child_options = CaOptions::new(
            "child",
            Subject::with_common_name("child.example.com"),
            dir.path().join("child.key"),
        );
        child_options.pathlen = Some(0);
        let child =
            crate::ca::init_intermediate(&registry, &ca.serial, None, child_options).unwrap();
        let mut child_ca = (*child).clone();
        child_ca
            .revoke(RevocationReason::CessationOfOperation, None)
            .unwrap();
        registry.save_ca(child_ca).unwrap();

        let user = generate_crl(&registry, &ca, &CrlOptions::new(CrlScope::User, "u")).unwrap();
        let crl = CertificateList::from_der(&user).unwrap();
        assert_eq!(crl.tbs_cert_list.revoked_certificates.unwrap().len(), 1);

        let full = generate_crl(&registry, &ca, &CrlOptions::new(CrlScope::Full, "f")).unwrap();
        let crl = CertificateList::from_der(&full).unwrap();
        assert_eq!(crl.tbs_cert_list.revoked_certificates.unwrap().len(), 2);

        let attribute =
            generate_crl(&registry, &ca, &CrlOptions::new(CrlScope::Attribute, "a")).unwrap();
        let crl = CertificateList::from_der(&attribute).unwrap();
        assert!(crl.tbs_cert_list.revoked_certificates.is_none());
    }

    #[test]
    fn test_idp_from_ca_urls() {
        let dir = tempfile::tempdir().unwrap();
        let (registry, ca) = setup(dir.path());
        let der_bytes =
            generate_crl(&registry, &ca, &CrlOptions::new(CrlScope::Full, "d")).unwrap();
        let crl = CertificateList::from_der(&der_bytes).unwrap();
        let extensions = crl.tbs_cert_list.crl_extensions.unwrap();
        let idp = extensions
            .iter()
            .find(|e| e.extn_id == rfc5280::ID_CE_ISSUING_DISTRIBUTION_POINT)
            .unwrap();
        assert!(idp.critical);
        let decoded = IssuingDistributionPoint::from_der(idp.extn_value.as_bytes()).unwrap();
        assert!(matches!(
            decoded.distribution_point,
            Some(DistributionPointName::FullName(names)) if names.len() == 1
        ));
    }

    #[test]
    fn test_cache_crls_idempotent_and_skippable() {
        let dir = tempfile::tempdir().unwrap();
        let (registry, ca) = setup(dir.path());
        let cache = MemoryCrlCache::new();
        let profiles = vec![("default".to_string(), CrlProfile::default())];

        cache_crls(&registry, &cache, &profiles).unwrap();
        let key = cache_key(
            &ca.serial,
            DigestAlgorithm::default(),
            Encoding::Der,
            CrlScope::Full,
        );
        let first = cache.get(&key).unwrap().unwrap();
        assert_eq!(crl_number(&first), 0);

        // running again replaces the slot with the next CRL
        cache_crls(&registry, &cache, &profiles).unwrap();
        let second = cache.get(&key).unwrap().unwrap();
        assert_eq!(crl_number(&second), 1);

        // a skipped CA leaves its slot unset
        let cache = MemoryCrlCache::new();
        let mut profile = CrlProfile::default();
        profile.overrides.insert(
            ca.serial.clone(),
            CrlOverride {
                skip: true,
                password: None,
                encodings: None,
            },
        );
        let profiles = vec![("default".to_string(), profile)];
        cache_crls(&registry, &cache, &profiles).unwrap();
        assert!(cache.get(&key).unwrap().is_none());
    }

    #[test]
    fn test_cache_crls_survives_bad_ca() {
        let dir = tempfile::tempdir().unwrap();
        let (registry, ca) = setup(dir.path());

        // a CA whose key file is gone must not abort the whole run
        let mut broken = (*ca).clone();
        broken.serial = "00FF".to_string();
        broken.name = "broken".to_string();
        broken.key_path = dir.path().join("missing.key");
        broken.evict_key();
        registry.save_ca(broken).unwrap();

        let cache = MemoryCrlCache::new();
        let profiles = vec![("default".to_string(), CrlProfile::default())];
        cache_crls(&registry, &cache, &profiles).unwrap();

        let good = cache_key(
            &ca.serial,
            DigestAlgorithm::default(),
            Encoding::Der,
            CrlScope::Full,
        );
        let bad = cache_key(
            "00FF",
            DigestAlgorithm::default(),
            Encoding::Der,
            CrlScope::Full,
        );
        assert!(cache.get(&good).unwrap().is_some());
        assert!(cache.get(&bad).unwrap().is_none());
    }
}
