//! Issuance profiles: named templates combining a subject skeleton,
//! digest algorithm, expiry and extension defaults, plus the pipeline
//! that turns a profile, a CA and a CSR into a signed certificate.

use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
};

use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use time::{Duration, OffsetDateTime};
use tracing::warn;

use larch_key::DigestAlgorithm;

use crate::{
    builder::{build_and_sign, CertificateParams},
    config::ProfileConfig,
    csr::Csr,
    error::{PkiError, Result},
    extensions::{
        keys, AccessDescriptions, BasicConstraintsValue, DistributionPointSpec, Extension,
        ExtensionMap, ExtensionValue, GeneralName,
    },
    models::{Certificate, CertificateAuthority},
    store::Registry,
    subject::Subject,
    types::generate_serial,
};

/// A read-only issuance template. Construct with [`Profile::from_config`]
/// or resolve through a [`Profiles`] registry.
#[derive(Debug, Clone, PartialEq)]
pub struct Profile {
    pub name: String,
    pub subject: Subject,
    pub algorithm: DigestAlgorithm,
    pub expires: Duration,
    pub extensions: ExtensionMap,
    pub cn_in_san: bool,
    pub add_crl_url: bool,
    pub add_ocsp_url: bool,
    pub add_issuer_url: bool,
    pub add_issuer_alternative_name: bool,
    pub issuer_name: Option<Subject>,
    pub description: String,
}

impl Profile {
    /// Build a profile from configuration. Deprecated fields are
    /// migrated into the canonical extension map with a warning, so the
    /// issuance path never sees them.
    pub fn from_config(config: &ProfileConfig) -> Result<Self> {
        let mut raw_extensions = config.extensions.clone();

        let deprecated = [
            ("keyUsage", keys::KEY_USAGE, config.legacy_key_usage.clone()),
            (
                "extendedKeyUsage",
                keys::EXTENDED_KEY_USAGE,
                config.legacy_extended_key_usage.clone(),
            ),
            ("TLSFeature", keys::TLS_FEATURE, config.legacy_tls_feature.clone()),
        ];
        for (legacy, canonical, value) in deprecated {
            if let Some(value) = value {
                warn!(profile = %config.name, field = legacy,
                    "deprecated profile field, use extensions.{canonical}");
                raw_extensions.entry(canonical.to_string()).or_insert(value);
            }
        }
        if config.ocsp_no_check == Some(true) {
            warn!(profile = %config.name,
                "deprecated profile field ocsp_no_check, use extensions.ocsp_no_check");
            raw_extensions
                .entry(keys::OCSP_NO_CHECK.to_string())
                .or_insert(Value::Bool(true));
        }

        let mut description = config.description.clone();
        if let Some(desc) = &config.desc {
            warn!(profile = %config.name, "deprecated profile field desc, use description");
            if description.is_empty() {
                description = desc.clone();
            }
        }

        let mut extensions = ExtensionMap::new();
        for (key, literal) in &raw_extensions {
            let ext = Extension::parse(key, literal)?;
            extensions.insert(key.clone(), ext);
        }
        // issued certificates are end entities unless the profile says otherwise
        extensions
            .entry(keys::BASIC_CONSTRAINTS.to_string())
            .or_insert_with(|| {
                Extension::new(ExtensionValue::BasicConstraints(BasicConstraintsValue {
                    ca: false,
                    path_length: None,
                }))
            });

        Ok(Profile {
            name: config.name.clone(),
            subject: config.subject.clone(),
            algorithm: config.algorithm,
            expires: Duration::days(config.expires_days),
            extensions,
            cn_in_san: config.cn_in_san,
            add_crl_url: config.add_crl_url,
            add_ocsp_url: config.add_ocsp_url,
            add_issuer_url: config.add_issuer_url,
            add_issuer_alternative_name: config.add_issuer_alternative_name,
            issuer_name: config.issuer_name.clone(),
            description,
        })
    }

    /// JSON form used by admin surfaces
    pub fn serialize(&self) -> Value {
        let extensions: serde_json::Map<String, Value> = self
            .extensions
            .iter()
            .map(|(key, ext)| (key.clone(), ext.serialize()))
            .collect();
        json!({
            "cn_in_san": self.cn_in_san,
            "description": self.description,
            "subject": self.subject,
            "extensions": extensions,
        })
    }

    /// Run the issuance pipeline: compose extensions from the profile,
    /// caller overrides and CA-derived values, validate identity, call
    /// the pre-issue hooks and sign.
    pub fn create_cert(
        &self,
        registry: &dyn Registry,
        ca: &CertificateAuthority,
        csr: &Csr,
        options: &IssueOptions,
        hooks: &[&dyn PreIssueHook],
    ) -> Result<Certificate> {
        csr.verify()?;

        // 1. start from the requester's subject with the profile's
        //    fields layered on top, and the profile's extensions
        let mut extensions = self.extensions.clone();
        let mut subject = Subject::from_name(csr.subject_name());
        subject.update_from(&self.subject);

        // 2. caller extension overrides replace by key, cumulative or not
        for ext in &options.extensions {
            extensions.insert(ext.key().to_string(), ext.clone());
        }

        // 3. caller subject overrides, field by field
        if let Some(overrides) = &options.subject {
            subject.update_from(overrides);
        }

        // 4. CA-derived values
        self.update_from_ca(ca, options, &mut extensions)?;

        // 5. common name and subject alternative name synchronization
        let cn_in_san = options.cn_in_san.unwrap_or(self.cn_in_san);
        self.sync_common_name(cn_in_san, &mut subject, &mut extensions)?;

        // 6. the certificate must identify something
        let has_san = matches!(
            extensions.get(keys::SUBJECT_ALTERNATIVE_NAME),
            Some(Extension { value: ExtensionValue::SubjectAlternativeName(names), .. })
                if !names.is_empty()
        );
        if subject.common_name.is_none() && !has_san {
            return Err(PkiError::NoIdentity);
        }

        // 7. pre-issue observers may abort
        let expires = options.expires.unwrap_or(self.expires);
        let not_before = OffsetDateTime::now_utc();
        let not_after = not_before + expires;
        let algorithm = options.algorithm.unwrap_or(self.algorithm);
        let context = PreIssueContext {
            ca,
            csr,
            subject: &subject,
            algorithm,
            expires: not_after,
            extensions: &extensions,
        };
        for hook in hooks {
            hook.before_issue(&context)?;
        }

        // 8. build and sign
        let spki = csr.public_key().clone();
        if !extensions.contains_key(keys::SUBJECT_KEY_IDENTIFIER) {
            let digest = Sha256::digest(spki.subject_public_key.raw_bytes());
            extensions.insert(
                keys::SUBJECT_KEY_IDENTIFIER.to_string(),
                Extension::new(ExtensionValue::SubjectKeyIdentifier(digest[..20].to_vec())),
            );
        }

        let issuer = match &self.issuer_name {
            Some(issuer) => issuer.to_name()?,
            None => ca.subject_name()?,
        };
        let serial = generate_serial()?;
        let signing_key = ca.signing_key(options.password.as_deref())?;
        let der = build_and_sign(
            &CertificateParams {
                serial: serial.clone(),
                subject: subject.to_name()?,
                issuer,
                subject_public_key: spki,
                not_before,
                not_after,
                extensions,
            },
            &signing_key,
        )?;

        let cert = Certificate::new(serial, ca.serial.clone(), der, csr.to_der()?);
        registry.save_certificate(cert.clone())?;
        Ok(cert)
    }

    /// Append CA-sourced extension values unless suppressed by flags
    fn update_from_ca(
        &self,
        ca: &CertificateAuthority,
        options: &IssueOptions,
        extensions: &mut ExtensionMap,
    ) -> Result<()> {
        // an explicit caller override wins over the CA-derived value
        if !extensions.contains_key(keys::AUTHORITY_KEY_IDENTIFIER) {
            if let Some(key_id) = ca.key_identifier()? {
                extensions.insert(
                    keys::AUTHORITY_KEY_IDENTIFIER.to_string(),
                    Extension::new(ExtensionValue::AuthorityKeyIdentifier(key_id)),
                );
            }
        }

        if options.add_crl_url.unwrap_or(self.add_crl_url) {
            let urls = ca.issuance_crl_urls();
            if !urls.is_empty() {
                let full_name = urls
                    .iter()
                    .map(|url| GeneralName::Uri(url.to_string()))
                    .collect();
                crate::extensions::append_or_insert(
                    extensions,
                    ExtensionValue::CrlDistributionPoints(vec![DistributionPointSpec {
                        full_name,
                    }]),
                )?;
            }
        }

        let mut access = AccessDescriptions::default();
        if options.add_ocsp_url.unwrap_or(self.add_ocsp_url) {
            if let Some(url) = &ca.ocsp_url {
                access.ocsp.push(GeneralName::Uri(url.clone()));
            }
        }
        if options.add_issuer_url.unwrap_or(self.add_issuer_url) {
            if let Some(url) = &ca.issuer_url {
                access.issuers.push(GeneralName::Uri(url.clone()));
            }
        }
        if !access.is_empty() {
            crate::extensions::append_or_insert(
                extensions,
                ExtensionValue::AuthorityInformationAccess(access),
            )?;
        }

        if options
            .add_issuer_alternative_name
            .unwrap_or(self.add_issuer_alternative_name)
        {
            if let Some(raw) = &ca.issuer_alt_name {
                let names = split_quoted(raw)
                    .iter()
                    .map(|entry| entry.parse::<GeneralName>())
                    .collect::<Result<Vec<_>>>()?;
                if !names.is_empty() {
                    crate::extensions::append_or_insert(
                        extensions,
                        ExtensionValue::IssuerAlternativeName(names),
                    )?;
                }
            }
        }
        Ok(())
    }

    /// When the subject has a common name and `cn_in_san` is set, mirror
    /// it into the SAN; when it has none, backfill it from the SAN's
    /// first DNS entry.
    fn sync_common_name(
        &self,
        cn_in_san: bool,
        subject: &mut Subject,
        extensions: &mut ExtensionMap,
    ) -> Result<()> {
        match &subject.common_name {
            Some(cn) if cn_in_san => {
                let name = GeneralName::from_common_name(cn)?;
                let already_present = matches!(
                    extensions.get(keys::SUBJECT_ALTERNATIVE_NAME),
                    Some(Extension {
                        value: ExtensionValue::SubjectAlternativeName(names), ..
                    }) if names.contains(&name)
                );
                if !already_present {
                    crate::extensions::append_or_insert(
                        extensions,
                        ExtensionValue::SubjectAlternativeName(vec![name]),
                    )?;
                }
            }
            Some(_) => {}
            None => {
                if let Some(Extension {
                    value: ExtensionValue::SubjectAlternativeName(names),
                    ..
                }) = extensions.get(keys::SUBJECT_ALTERNATIVE_NAME)
                {
                    if let Some(GeneralName::Dns(host)) = names
                        .iter()
                        .find(|name| matches!(name, GeneralName::Dns(_)))
                    {
                        subject.common_name = Some(host.clone());
                    }
                }
            }
        }
        Ok(())
    }
}

/// Per-call issuance overrides; call parameters take precedence over
/// profile defaults, which take precedence over CA defaults.
#[derive(Debug, Clone, Default)]
pub struct IssueOptions {
    pub subject: Option<Subject>,
    pub expires: Option<Duration>,
    pub algorithm: Option<DigestAlgorithm>,
    pub extensions: Vec<Extension>,
    pub cn_in_san: Option<bool>,
    pub add_crl_url: Option<bool>,
    pub add_ocsp_url: Option<bool>,
    pub add_issuer_url: Option<bool>,
    pub add_issuer_alternative_name: Option<bool>,
    /// Password for the CA's private key
    pub password: Option<String>,
}

/// Everything an observer sees before signing
pub struct PreIssueContext<'a> {
    pub ca: &'a CertificateAuthority,
    pub csr: &'a Csr,
    pub subject: &'a Subject,
    pub algorithm: DigestAlgorithm,
    pub expires: OffsetDateTime,
    pub extensions: &'a ExtensionMap,
}

/// Pre-issue observer; an error aborts issuance before signing
pub trait PreIssueHook: Send + Sync {
    fn before_issue(&self, context: &PreIssueContext<'_>) -> Result<()>;
}

/// Named profile registry with a per-process cache of constructed
/// profiles. `reset` must be called after configuration changes.
pub struct Profiles {
    configs: RwLock<HashMap<String, ProfileConfig>>,
    cache: RwLock<HashMap<String, Arc<Profile>>>,
    default_name: String,
}

impl Profiles {
    pub fn new(
        configs: impl IntoIterator<Item = ProfileConfig>,
        default_name: impl Into<String>,
    ) -> Self {
        let configs = configs
            .into_iter()
            .map(|config| (config.name.clone(), config))
            .collect();
        Profiles {
            configs: RwLock::new(configs),
            cache: RwLock::new(HashMap::new()),
            default_name: default_name.into(),
        }
    }

    /// Resolve a named profile, memoizing the constructed instance
    pub fn get(&self, name: &str) -> Result<Arc<Profile>> {
        if let Ok(cache) = self.cache.read() {
            if let Some(profile) = cache.get(name) {
                return Ok(Arc::clone(profile));
            }
        }
        let config = {
            let configs = self
                .configs
                .read()
                .map_err(|_| PkiError::Storage("failed to acquire lock".to_string()))?;
            configs
                .get(name)
                .cloned()
                .ok_or_else(|| PkiError::ProfileNotFound(name.to_string()))?
        };
        let profile = Arc::new(Profile::from_config(&config)?);
        if let Ok(mut cache) = self.cache.write() {
            cache.insert(name.to_string(), Arc::clone(&profile));
        }
        Ok(profile)
    }

    /// The configured default profile
    pub fn default_profile(&self) -> Result<Arc<Profile>> {
        self.get(&self.default_name)
    }

    /// Replace the configuration and drop all memoized profiles
    pub fn replace(&self, configs: impl IntoIterator<Item = ProfileConfig>) -> Result<()> {
        let mut guard = self
            .configs
            .write()
            .map_err(|_| PkiError::Storage("failed to acquire lock".to_string()))?;
        *guard = configs
            .into_iter()
            .map(|config| (config.name.clone(), config))
            .collect();
        drop(guard);
        self.reset();
        Ok(())
    }

    /// Drop memoized profiles; the next lookup reconstructs from
    /// configuration
    pub fn reset(&self) {
        if let Ok(mut cache) = self.cache.write() {
            cache.clear();
        }
    }
}

/// Split a comma-separated list, honoring single and double quotes and
/// stripping surrounding whitespace
fn split_quoted(raw: &str) -> Vec<String> {
    let mut entries = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    for c in raw.chars() {
        match (c, quote) {
            (q, Some(open)) if q == open => quote = None,
            ('\'' | '"', None) => quote = Some(c),
            (',', None) => {
                let entry = current.trim().to_string();
                if !entry.is_empty() {
                    entries.push(entry);
                }
                current.clear();
            }
            _ => current.push(c),
        }
    }
    let entry = current.trim().to_string();
    if !entry.is_empty() {
        entries.push(entry);
    }
    entries
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    use larch_key::SigningKey;

    use crate::{
        ca::{init_root, CaOptions},
        store::MemoryRegistry,
    };

    fn setup(dir: &std::path::Path) -> (MemoryRegistry, Arc<CertificateAuthority>) {
        let registry = MemoryRegistry::new();
        let mut options = CaOptions::new(
            "root",
            Subject::with_common_name("ca.example.com"),
            dir.join("root.key"),
        );
        options.crl_url =
            Some("http://crl.example.com/a.crl http://crl.example.com/b.crl".to_string());
        options.ocsp_url = Some("http://ocsp.example.com".to_string());
        options.issuer_url = Some("http://issuer.example.com/ca.der".to_string());
        options.issuer_alt_name = Some("https://ca.example.com, DNS:alt.example.com".to_string());
        let ca = init_root(&registry, options).unwrap();
        (registry, ca)
    }

    fn webserver_profile() -> Profile {
        let mut config = ProfileConfig::new("webserver");
        config.extensions.insert(
            keys::KEY_USAGE.to_string(),
            json!(["digital_signature", "key_encipherment"]),
        );
        config.extensions.insert(
            keys::EXTENDED_KEY_USAGE.to_string(),
            json!(["server_auth"]),
        );
        Profile::from_config(&config).unwrap()
    }

    fn leaf_csr() -> Csr {
        let key = SigningKey::generate().unwrap();
        Csr::build(&key, &Subject::with_common_name("leaf.example.com")).unwrap()
    }

    fn extension<'a>(cert: &'a Certificate, key: &str) -> Option<Extension> {
        let parsed = cert.parse().unwrap();
        let extensions = parsed.tbs_certificate.extensions?;
        let mut found = None;
        for ext in extensions {
            if let Ok(decoded) = Extension::from_der(ext.extn_id, ext.critical, ext.extn_value.as_bytes()) {
                if decoded.key() == key {
                    found = Some(decoded);
                }
            }
        }
        found
    }

    #[test]
    fn test_cn_in_san_true_mirrors_cn() {
        let dir = tempfile::tempdir().unwrap();
        let (registry, ca) = setup(dir.path());
        let cert = webserver_profile()
            .create_cert(&registry, &ca, &leaf_csr(), &IssueOptions::default(), &[])
            .unwrap();

        let san = extension(&cert, keys::SUBJECT_ALTERNATIVE_NAME).unwrap();
        match san.value {
            ExtensionValue::SubjectAlternativeName(names) => {
                assert!(names.contains(&GeneralName::Dns("leaf.example.com".to_string())));
            }
            other => panic!("unexpected value: {other:?}"),
        }
    }

    #[test]
    fn test_cn_in_san_false_omits_san() {
        let dir = tempfile::tempdir().unwrap();
        let (registry, ca) = setup(dir.path());
        let options = IssueOptions {
            cn_in_san: Some(false),
            ..Default::default()
        };
        let cert = webserver_profile()
            .create_cert(&registry, &ca, &leaf_csr(), &options, &[])
            .unwrap();
        assert!(extension(&cert, keys::SUBJECT_ALTERNATIVE_NAME).is_none());
    }

    #[test]
    fn test_csr_subject_is_the_base() {
        let dir = tempfile::tempdir().unwrap();
        let (registry, ca) = setup(dir.path());
        let mut profile = webserver_profile();
        profile.subject = Subject {
            organization: Some("Example Org".to_string()),
            ..Default::default()
        };

        let cert = profile
            .create_cert(&registry, &ca, &leaf_csr(), &IssueOptions::default(), &[])
            .unwrap();
        let parsed = cert.parse().unwrap();
        let subject = Subject::from_name(&parsed.tbs_certificate.subject);
        assert_eq!(subject.common_name.as_deref(), Some("leaf.example.com"));
        assert_eq!(subject.organization.as_deref(), Some("Example Org"));
    }

    #[test]
    fn test_no_identity_fails() {
        let dir = tempfile::tempdir().unwrap();
        let (registry, ca) = setup(dir.path());
        let key = SigningKey::generate().unwrap();
        let csr = Csr::build(
            &key,
            &Subject {
                organization: Some("Example".to_string()),
                ..Default::default()
            },
        )
        .unwrap();
        let options = IssueOptions {
            subject: Some(Subject {
                organization: Some("Example".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        };
        let mut profile = webserver_profile();
        profile.subject = Subject::default();
        let err = profile.create_cert(&registry, &ca, &csr, &options, &[]);
        assert!(matches!(err, Err(PkiError::NoIdentity)));
    }

    #[test]
    fn test_crl_urls_append_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let (registry, ca) = setup(dir.path());
        let cert = webserver_profile()
            .create_cert(&registry, &ca, &leaf_csr(), &IssueOptions::default(), &[])
            .unwrap();

        let crldp = extension(&cert, keys::CRL_DISTRIBUTION_POINTS).unwrap();
        match crldp.value {
            ExtensionValue::CrlDistributionPoints(points) => {
                assert_eq!(points.len(), 1);
                assert_eq!(
                    points[0].full_name,
                    vec![
                        GeneralName::Uri("http://crl.example.com/a.crl".to_string()),
                        GeneralName::Uri("http://crl.example.com/b.crl".to_string()),
                    ]
                );
            }
            other => panic!("unexpected value: {other:?}"),
        }
    }

    #[test]
    fn test_aia_from_ca() {
        let dir = tempfile::tempdir().unwrap();
        let (registry, ca) = setup(dir.path());
        let cert = webserver_profile()
            .create_cert(&registry, &ca, &leaf_csr(), &IssueOptions::default(), &[])
            .unwrap();

        let aia = extension(&cert, keys::AUTHORITY_INFORMATION_ACCESS).unwrap();
        match aia.value {
            ExtensionValue::AuthorityInformationAccess(access) => {
                assert_eq!(access.ocsp.len(), 1);
                assert_eq!(access.issuers.len(), 1);
            }
            other => panic!("unexpected value: {other:?}"),
        }
    }

    #[test]
    fn test_issuer_alt_name_appended_by_default() {
        let dir = tempfile::tempdir().unwrap();
        let (registry, ca) = setup(dir.path());
        let cert = webserver_profile()
            .create_cert(&registry, &ca, &leaf_csr(), &IssueOptions::default(), &[])
            .unwrap();

        let ian = extension(&cert, keys::ISSUER_ALTERNATIVE_NAME).unwrap();
        match ian.value {
            ExtensionValue::IssuerAlternativeName(names) => {
                assert_eq!(names.len(), 2);
                assert_eq!(names[1], GeneralName::Dns("alt.example.com".to_string()));
            }
            other => panic!("unexpected value: {other:?}"),
        }
    }

    #[test]
    fn test_aki_override_survives() {
        let dir = tempfile::tempdir().unwrap();
        let (registry, ca) = setup(dir.path());
        let override_id = vec![0xAAu8; 20];
        let options = IssueOptions {
            extensions: vec![Extension::new(ExtensionValue::AuthorityKeyIdentifier(
                override_id.clone(),
            ))],
            ..Default::default()
        };
        let cert = webserver_profile()
            .create_cert(&registry, &ca, &leaf_csr(), &options, &[])
            .unwrap();

        let aki = extension(&cert, keys::AUTHORITY_KEY_IDENTIFIER).unwrap();
        match aki.value {
            ExtensionValue::AuthorityKeyIdentifier(id) => assert_eq!(id, override_id),
            other => panic!("unexpected value: {other:?}"),
        }
    }

    #[test]
    fn test_hook_can_abort() {
        struct Deny;
        impl PreIssueHook for Deny {
            fn before_issue(&self, _: &PreIssueContext<'_>) -> Result<()> {
                Err(PkiError::IssuanceRejected("policy says no".to_string()))
            }
        }

        let dir = tempfile::tempdir().unwrap();
        let (registry, ca) = setup(dir.path());
        let err = webserver_profile().create_cert(
            &registry,
            &ca,
            &leaf_csr(),
            &IssueOptions::default(),
            &[&Deny],
        );
        assert!(matches!(err, Err(PkiError::IssuanceRejected(_))));
        assert!(registry.certificates_of(&ca.serial).unwrap().is_empty());
    }

    #[test]
    fn test_ski_derived_when_absent() {
        let dir = tempfile::tempdir().unwrap();
        let (registry, ca) = setup(dir.path());
        let key = SigningKey::generate().unwrap();
        let csr = Csr::build(&key, &Subject::with_common_name("x.example.com")).unwrap();
        let cert = webserver_profile()
            .create_cert(&registry, &ca, &csr, &IssueOptions::default(), &[])
            .unwrap();

        let ski = extension(&cert, keys::SUBJECT_KEY_IDENTIFIER).unwrap();
        assert!(!ski.critical);
        match ski.value {
            ExtensionValue::SubjectKeyIdentifier(id) => {
                assert_eq!(id, key.subject_key_identifier().to_vec());
            }
            other => panic!("unexpected value: {other:?}"),
        }
    }

    #[test]
    fn test_deprecated_fields_migrate() {
        let mut config = ProfileConfig::new("legacy");
        config.legacy_key_usage = Some(json!(["digital_signature"]));
        config.ocsp_no_check = Some(true);
        config.desc = Some("legacy description".to_string());
        let profile = Profile::from_config(&config).unwrap();

        assert!(profile.extensions.contains_key(keys::KEY_USAGE));
        assert!(profile.extensions.contains_key(keys::OCSP_NO_CHECK));
        assert_eq!(profile.description, "legacy description");
    }

    #[test]
    fn test_serialize_resolves_back() {
        let profile = webserver_profile();
        let serialized = profile.serialize();
        let extensions = serialized["extensions"].as_object().unwrap();
        let mut resolved = ExtensionMap::new();
        for (key, literal) in extensions {
            resolved.insert(key.clone(), Extension::parse(key, literal).unwrap());
        }
        assert_eq!(profile.extensions, resolved);
    }

    #[test]
    fn test_profiles_cache_and_reset() {
        let profiles = Profiles::new([ProfileConfig::new("webserver")], "webserver");
        let first = profiles.get("webserver").unwrap();
        let second = profiles.get("webserver").unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        profiles.reset();
        let third = profiles.get("webserver").unwrap();
        assert!(!Arc::ptr_eq(&first, &third));

        assert!(matches!(
            profiles.get("missing"),
            Err(PkiError::ProfileNotFound(_))
        ));
        assert!(profiles.default_profile().is_ok());
    }

    #[test]
    fn test_split_quoted() {
        assert_eq!(
            split_quoted("https://a.example.com, DNS:b.example.com"),
            vec!["https://a.example.com", "DNS:b.example.com"]
        );
        assert_eq!(
            split_quoted("'a, with comma', plain"),
            vec!["a, with comma", "plain"]
        );
        assert!(split_quoted("  ").is_empty());
    }
}
