//! Shared data model: certificate authorities, issued certificates and
//! revocation state.

use std::{
    path::{Path, PathBuf},
    sync::{Arc, RwLock},
};

use der::Decode;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use larch_key::SigningKey;

use crate::{
    error::{PkiError, Result},
    extensions::Extension,
    types::RevocationReason,
};

/// Notification recipient attached to a certificate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Watcher {
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Revocation state shared by CAs and certificates
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevocationState {
    pub revoked: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<RevocationReason>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "rfc3339_opt")]
    pub revoked_at: Option<OffsetDateTime>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "rfc3339_opt")]
    pub compromised_at: Option<OffsetDateTime>,
}

mod rfc3339_opt {
    pub use time::serde::rfc3339::option::{deserialize, serialize};
}

impl RevocationState {
    /// Mark as revoked. Timestamps default to now; future-dated
    /// timestamps are rejected.
    pub fn revoke(
        &mut self,
        reason: RevocationReason,
        revoked_at: Option<OffsetDateTime>,
        compromised_at: Option<OffsetDateTime>,
    ) -> Result<()> {
        let now = OffsetDateTime::now_utc();
        let revoked_at = revoked_at.unwrap_or(now);
        if revoked_at > now {
            return Err(PkiError::Validation(
                "revocation timestamp must not be in the future".to_string(),
            ));
        }
        if compromised_at.is_some_and(|t| t > now) {
            return Err(PkiError::Validation(
                "compromise timestamp must not be in the future".to_string(),
            ));
        }
        self.revoked = true;
        self.reason = Some(reason);
        self.revoked_at = Some(revoked_at);
        self.compromised_at = compromised_at;
        Ok(())
    }

    /// Clear revocation (certificate hold released)
    pub fn unrevoke(&mut self) {
        *self = RevocationState::default();
    }
}

/// A long-lived signing identity. CAs form a tree through
/// `parent_serial`; a root has no parent. CAs are never deleted, only
/// revoked.
#[derive(Debug)]
pub struct CertificateAuthority {
    /// Uppercase hex serial, unique
    pub serial: String,
    pub name: String,
    pub certificate_der: Vec<u8>,
    /// Path to the (possibly encrypted) PKCS#8 private key
    pub key_path: PathBuf,
    pub parent_serial: Option<String>,
    /// Limits how many intermediate CAs may chain beneath this one
    pub pathlen: Option<u8>,
    pub revocation: RevocationState,
    /// Whitespace-separated CRL distribution URLs for issued certificates;
    /// newline-separated for the CRL issuing distribution point
    pub crl_url: Option<String>,
    pub ocsp_url: Option<String>,
    pub issuer_url: Option<String>,
    /// Comma-separated issuer alternative name entries
    pub issuer_alt_name: Option<String>,
    // decrypted once per process, evictable
    key_cache: RwLock<Option<Arc<SigningKey>>>,
}

impl Clone for CertificateAuthority {
    fn clone(&self) -> Self {
        let cached = self.key_cache.read().ok().and_then(|guard| guard.clone());
        CertificateAuthority {
            serial: self.serial.clone(),
            name: self.name.clone(),
            certificate_der: self.certificate_der.clone(),
            key_path: self.key_path.clone(),
            parent_serial: self.parent_serial.clone(),
            pathlen: self.pathlen,
            revocation: self.revocation.clone(),
            crl_url: self.crl_url.clone(),
            ocsp_url: self.ocsp_url.clone(),
            issuer_url: self.issuer_url.clone(),
            issuer_alt_name: self.issuer_alt_name.clone(),
            key_cache: RwLock::new(cached),
        }
    }
}

impl CertificateAuthority {
    pub fn new(
        serial: String,
        name: String,
        certificate_der: Vec<u8>,
        key_path: impl AsRef<Path>,
    ) -> Self {
        CertificateAuthority {
            serial,
            name,
            certificate_der,
            key_path: key_path.as_ref().to_path_buf(),
            parent_serial: None,
            pathlen: None,
            revocation: RevocationState::default(),
            crl_url: None,
            ocsp_url: None,
            issuer_url: None,
            issuer_alt_name: None,
            key_cache: RwLock::new(None),
        }
    }

    /// Load (and cache) the signing key. The decrypted key is held for
    /// the process lifetime; `evict_key` drops it.
    pub fn signing_key(&self, password: Option<&str>) -> Result<Arc<SigningKey>> {
        if let Ok(guard) = self.key_cache.read() {
            if let Some(key) = guard.as_ref() {
                return Ok(Arc::clone(key));
            }
        }
        let key = Arc::new(SigningKey::load(&self.key_path, password)?);
        if let Ok(mut guard) = self.key_cache.write() {
            *guard = Some(Arc::clone(&key));
        }
        Ok(key)
    }

    /// Drop the cached key; the next use reloads from disk
    pub fn evict_key(&self) {
        if let Ok(mut guard) = self.key_cache.write() {
            *guard = None;
        }
    }

    /// Parse the CA certificate
    pub fn certificate(&self) -> Result<x509_cert::Certificate> {
        x509_cert::Certificate::from_der(&self.certificate_der).map_err(PkiError::Der)
    }

    /// The CA's own subject name, used as issuer on issued certificates
    pub fn subject_name(&self) -> Result<x509_cert::name::Name> {
        Ok(self.certificate()?.tbs_certificate.subject)
    }

    /// Key identifier from the CA certificate's subject key identifier
    /// extension, if present
    pub fn key_identifier(&self) -> Result<Option<Vec<u8>>> {
        let cert = self.certificate()?;
        let Some(extensions) = cert.tbs_certificate.extensions else {
            return Ok(None);
        };
        for ext in &extensions {
            if ext.extn_id == const_oid::db::rfc5280::ID_CE_SUBJECT_KEY_IDENTIFIER {
                let parsed = Extension::from_der(ext.extn_id, ext.critical, ext.extn_value.as_bytes())?;
                if let crate::extensions::ExtensionValue::SubjectKeyIdentifier(id) = parsed.value {
                    return Ok(Some(id));
                }
            }
        }
        Ok(None)
    }

    /// CRL URLs as appended to issued certificates (whitespace-separated)
    pub fn issuance_crl_urls(&self) -> Vec<&str> {
        self.crl_url
            .as_deref()
            .map(|urls| urls.split_whitespace().collect())
            .unwrap_or_default()
    }

    /// CRL URLs for the issuing distribution point (newline-separated)
    pub fn distribution_point_urls(&self) -> Vec<&str> {
        self.crl_url
            .as_deref()
            .map(|urls| {
                urls.split('\n')
                    .map(str::trim)
                    .filter(|url| !url.is_empty())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn revoke(&mut self, reason: RevocationReason, at: Option<OffsetDateTime>) -> Result<()> {
        self.revocation.revoke(reason, at, None)
    }
}

/// An issued leaf or intermediate credential. The signed bytes never
/// change after creation; only revocation state and watchers do.
#[derive(Debug, Clone)]
pub struct Certificate {
    pub serial: String,
    pub ca_serial: String,
    pub certificate_der: Vec<u8>,
    pub csr_der: Vec<u8>,
    pub revocation: RevocationState,
    pub watchers: Vec<Watcher>,
}

impl Certificate {
    pub fn new(
        serial: String,
        ca_serial: String,
        certificate_der: Vec<u8>,
        csr_der: Vec<u8>,
    ) -> Self {
        Certificate {
            serial,
            ca_serial,
            certificate_der,
            csr_der,
            revocation: RevocationState::default(),
            watchers: Vec::new(),
        }
    }

    pub fn parse(&self) -> Result<x509_cert::Certificate> {
        x509_cert::Certificate::from_der(&self.certificate_der).map_err(PkiError::Der)
    }

    /// PEM form of the signed certificate
    pub fn to_pem(&self) -> String {
        pem::encode(&pem::Pem::new("CERTIFICATE", self.certificate_der.clone()))
    }

    /// Add a watcher, deduplicated by email (the display name of an
    /// existing watcher is updated instead)
    pub fn add_watcher(&mut self, watcher: Watcher) {
        if let Some(existing) = self.watchers.iter_mut().find(|w| w.email == watcher.email) {
            existing.name = watcher.name;
        } else {
            self.watchers.push(watcher);
        }
    }

    pub fn revoke(
        &mut self,
        reason: RevocationReason,
        revoked_at: Option<OffsetDateTime>,
        compromised_at: Option<OffsetDateTime>,
    ) -> Result<()> {
        self.revocation.revoke(reason, revoked_at, compromised_at)
    }

    pub fn unrevoke(&mut self) {
        self.revocation.unrevoke();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::Duration;

    #[test]
    fn test_future_revocation_rejected() {
        let mut state = RevocationState::default();
        let future = OffsetDateTime::now_utc() + Duration::hours(1);
        assert!(matches!(
            state.revoke(RevocationReason::KeyCompromise, Some(future), None),
            Err(PkiError::Validation(_))
        ));
        assert!(!state.revoked);

        assert!(matches!(
            state.revoke(RevocationReason::KeyCompromise, None, Some(future)),
            Err(PkiError::Validation(_))
        ));
        assert!(!state.revoked);
    }

    #[test]
    fn test_revoke_and_unrevoke() {
        let mut state = RevocationState::default();
        state
            .revoke(RevocationReason::CertificateHold, None, None)
            .unwrap();
        assert!(state.revoked);
        assert_eq!(state.reason, Some(RevocationReason::CertificateHold));
        assert!(state.revoked_at.is_some());

        state.unrevoke();
        assert_eq!(state, RevocationState::default());
    }

    #[test]
    fn test_watcher_dedup_by_email() {
        let mut cert = Certificate::new(
            "AB".to_string(),
            "CD".to_string(),
            Vec::new(),
            Vec::new(),
        );
        cert.add_watcher(Watcher {
            email: "ops@example.com".to_string(),
            name: None,
        });
        cert.add_watcher(Watcher {
            email: "ops@example.com".to_string(),
            name: Some("Ops".to_string()),
        });
        assert_eq!(cert.watchers.len(), 1);
        assert_eq!(cert.watchers[0].name.as_deref(), Some("Ops"));
    }

    #[test]
    fn test_crl_url_splitting() {
        let mut ca = CertificateAuthority::new(
            "AB".to_string(),
            "root".to_string(),
            Vec::new(),
            "/tmp/none.key",
        );
        ca.crl_url = Some("http://one.example.com/ca.crl http://two.example.com/ca.crl".to_string());
        assert_eq!(ca.issuance_crl_urls().len(), 2);
        ca.crl_url = Some("http://one.example.com/ca.crl\nhttp://two.example.com/ca.crl\n".to_string());
        assert_eq!(ca.distribution_point_urls().len(), 2);
    }
}
