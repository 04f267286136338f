//! CA provisioning: root creation and intermediate issuance.

use std::{path::PathBuf, sync::Arc};

use time::{Duration, OffsetDateTime};

use larch_key::SigningKey;

use crate::{
    builder::{build_and_sign, CertificateParams},
    error::{PkiError, Result},
    extensions::{append_or_insert, BasicConstraintsValue, ExtensionMap, ExtensionValue, KeyUsageFlag},
    models::CertificateAuthority,
    store::Registry,
    subject::Subject,
    types::generate_serial,
};

/// Parameters for provisioning a certificate authority
#[derive(Debug, Clone)]
pub struct CaOptions {
    pub name: String,
    pub subject: Subject,
    pub pathlen: Option<u8>,
    pub validity_days: i64,
    /// Where the PKCS#8 private key is written
    pub key_path: PathBuf,
    /// Encrypt the key at rest when set
    pub password: Option<String>,
    pub crl_url: Option<String>,
    pub ocsp_url: Option<String>,
    pub issuer_url: Option<String>,
    pub issuer_alt_name: Option<String>,
}

impl CaOptions {
    pub fn new(name: impl Into<String>, subject: Subject, key_path: impl Into<PathBuf>) -> Self {
        CaOptions {
            name: name.into(),
            subject,
            pathlen: None,
            validity_days: 3650,
            key_path: key_path.into(),
            password: None,
            crl_url: None,
            ocsp_url: None,
            issuer_url: None,
            issuer_alt_name: None,
        }
    }
}

/// Create a self-signed root CA and register it
pub fn init_root(
    registry: &dyn Registry,
    options: CaOptions,
) -> Result<Arc<CertificateAuthority>> {
    let key = SigningKey::generate()?;
    key.save(&options.key_path, options.password.as_deref())?;

    let serial = generate_serial()?;
    let key_id = key.subject_key_identifier().to_vec();
    let extensions = ca_extensions(options.pathlen, key_id.clone(), key_id)?;

    let name = options.subject.to_name()?;
    let now = OffsetDateTime::now_utc();
    let der = build_and_sign(
        &CertificateParams {
            serial: serial.clone(),
            subject: name.clone(),
            issuer: name,
            subject_public_key: key.spki()?,
            not_before: now,
            not_after: now + Duration::days(options.validity_days),
            extensions,
        },
        &key,
    )?;

    register(registry, serial, der, options, None)
}

/// Issue an intermediate CA under `parent_serial` and register it.
/// Path length constraints of every ancestor are enforced before
/// signing.
pub fn init_intermediate(
    registry: &dyn Registry,
    parent_serial: &str,
    parent_password: Option<&str>,
    options: CaOptions,
) -> Result<Arc<CertificateAuthority>> {
    let parent = registry.ca_by_serial(parent_serial)?;
    check_pathlen(registry, &parent)?;

    let key = SigningKey::generate()?;
    key.save(&options.key_path, options.password.as_deref())?;

    let serial = generate_serial()?;
    let parent_key_id = parent
        .key_identifier()?
        .unwrap_or_else(|| key.subject_key_identifier().to_vec());
    let extensions = ca_extensions(
        options.pathlen,
        key.subject_key_identifier().to_vec(),
        parent_key_id,
    )?;

    let parent_key = parent.signing_key(parent_password)?;
    let now = OffsetDateTime::now_utc();
    let der = build_and_sign(
        &CertificateParams {
            serial: serial.clone(),
            subject: options.subject.to_name()?,
            issuer: parent.subject_name()?,
            subject_public_key: key.spki()?,
            not_before: now,
            not_after: now + Duration::days(options.validity_days),
            extensions,
        },
        &parent_key,
    )?;

    register(registry, serial, der, options, Some(parent_serial.to_string()))
}

/// Walk the ancestor chain: an ancestor at distance `d` above the new
/// CA must allow at least `d` CA certificates beneath it.
fn check_pathlen(registry: &dyn Registry, parent: &CertificateAuthority) -> Result<()> {
    let mut distance: u8 = 1;
    let mut current = registry.ca_by_serial(&parent.serial)?;
    loop {
        if let Some(pathlen) = current.pathlen {
            if pathlen < distance {
                return Err(PkiError::Validation(format!(
                    "path length constraint of CA {} ({}) exceeded",
                    current.name, pathlen
                )));
            }
        }
        match current.parent_serial.clone() {
            Some(serial) => {
                current = registry.ca_by_serial(&serial)?;
                distance += 1;
            }
            None => return Ok(()),
        }
    }
}

fn ca_extensions(
    pathlen: Option<u8>,
    subject_key_id: Vec<u8>,
    authority_key_id: Vec<u8>,
) -> Result<ExtensionMap> {
    let mut extensions = ExtensionMap::new();
    append_or_insert(
        &mut extensions,
        ExtensionValue::BasicConstraints(BasicConstraintsValue {
            ca: true,
            path_length: pathlen,
        }),
    )?;
    append_or_insert(
        &mut extensions,
        ExtensionValue::KeyUsage(
            [
                KeyUsageFlag::DigitalSignature,
                KeyUsageFlag::KeyCertSign,
                KeyUsageFlag::CrlSign,
            ]
            .into_iter()
            .collect(),
        ),
    )?;
    append_or_insert(&mut extensions, ExtensionValue::SubjectKeyIdentifier(subject_key_id))?;
    append_or_insert(
        &mut extensions,
        ExtensionValue::AuthorityKeyIdentifier(authority_key_id),
    )?;
    Ok(extensions)
}

fn register(
    registry: &dyn Registry,
    serial: String,
    certificate_der: Vec<u8>,
    options: CaOptions,
    parent_serial: Option<String>,
) -> Result<Arc<CertificateAuthority>> {
    let mut ca = CertificateAuthority::new(
        serial.clone(),
        options.name,
        certificate_der,
        options.key_path,
    );
    ca.parent_serial = parent_serial;
    ca.pathlen = options.pathlen;
    ca.crl_url = options.crl_url;
    ca.ocsp_url = options.ocsp_url;
    ca.issuer_url = options.issuer_url;
    ca.issuer_alt_name = options.issuer_alt_name;
    registry.save_ca(ca)?;
    registry.ca_by_serial(&serial)
}
