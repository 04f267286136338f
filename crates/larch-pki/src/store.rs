//! Persistence contract consumed by the issuance pipeline, CRL generator
//! and OCSP responder, plus an in-memory implementation for tests and
//! embedders without a database.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, RwLock},
};

use crate::{
    error::{PkiError, Result},
    models::{Certificate, CertificateAuthority},
};

/// Storage operations the engine requires: serial-indexed CAs forming a
/// parent tree, CA-scoped certificates, and atomic CRL-number counters.
pub trait Registry: Send + Sync {
    /// Look up a CA by serial
    fn ca_by_serial(&self, serial: &str) -> Result<Arc<CertificateAuthority>>;

    /// All registered CAs
    fn cas(&self) -> Result<Vec<Arc<CertificateAuthority>>>;

    /// Insert or replace a CA
    fn save_ca(&self, ca: CertificateAuthority) -> Result<()>;

    /// Look up a certificate by serial under a CA
    fn certificate(&self, ca_serial: &str, serial: &str) -> Result<Certificate>;

    /// All certificates issued by a CA
    fn certificates_of(&self, ca_serial: &str) -> Result<Vec<Certificate>>;

    /// Insert or replace a certificate
    fn save_certificate(&self, cert: Certificate) -> Result<()>;

    /// Increment-and-read the named CRL counter. The first call for a
    /// counter yields 0; increments are atomic so concurrent callers
    /// observe strictly increasing, unique values.
    fn next_crl_number(&self, counter: &str) -> Result<u64>;

    /// Look up a CA by serial or, failing that, by name
    fn ca_by_serial_or_name(&self, ident: &str) -> Result<Arc<CertificateAuthority>> {
        if let Ok(ca) = self.ca_by_serial(ident) {
            return Ok(ca);
        }
        self.cas()?
            .into_iter()
            .find(|ca| ca.name == ident)
            .ok_or_else(|| PkiError::CaNotFound(ident.to_string()))
    }

    /// Walk parent links up to the root of a CA's tree
    fn root_of(&self, serial: &str) -> Result<Arc<CertificateAuthority>> {
        let mut current = self.ca_by_serial(serial)?;
        while let Some(parent_serial) = current.parent_serial.clone() {
            current = self.ca_by_serial(&parent_serial)?;
        }
        Ok(current)
    }

    /// Direct child CAs of a CA
    fn child_cas(&self, serial: &str) -> Result<Vec<Arc<CertificateAuthority>>> {
        Ok(self
            .cas()?
            .into_iter()
            .filter(|ca| ca.parent_serial.as_deref() == Some(serial))
            .collect())
    }

    /// Revoked certificates under a CA
    fn revoked_certificates(&self, ca_serial: &str) -> Result<Vec<Certificate>> {
        Ok(self
            .certificates_of(ca_serial)?
            .into_iter()
            .filter(|cert| cert.revocation.revoked)
            .collect())
    }

    /// Revoked child CAs of a CA
    fn revoked_child_cas(&self, serial: &str) -> Result<Vec<Arc<CertificateAuthority>>> {
        Ok(self
            .child_cas(serial)?
            .into_iter()
            .filter(|ca| ca.revocation.revoked)
            .collect())
    }
}

/// In-memory registry backed by locked maps
pub struct MemoryRegistry {
    cas: RwLock<HashMap<String, Arc<CertificateAuthority>>>,
    certificates: RwLock<HashMap<(String, String), Certificate>>,
    counters: Mutex<HashMap<String, u64>>,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        MemoryRegistry {
            cas: RwLock::new(HashMap::new()),
            certificates: RwLock::new(HashMap::new()),
            counters: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for MemoryRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn lock_err<T>(_: T) -> PkiError {
    PkiError::Storage("failed to acquire lock".to_string())
}

impl Registry for MemoryRegistry {
    fn ca_by_serial(&self, serial: &str) -> Result<Arc<CertificateAuthority>> {
        let cas = self.cas.read().map_err(lock_err)?;
        cas.get(serial)
            .cloned()
            .ok_or_else(|| PkiError::CaNotFound(serial.to_string()))
    }

    fn cas(&self) -> Result<Vec<Arc<CertificateAuthority>>> {
        let cas = self.cas.read().map_err(lock_err)?;
        Ok(cas.values().cloned().collect())
    }

    fn save_ca(&self, ca: CertificateAuthority) -> Result<()> {
        let mut cas = self.cas.write().map_err(lock_err)?;
        cas.insert(ca.serial.clone(), Arc::new(ca));
        Ok(())
    }

    fn certificate(&self, ca_serial: &str, serial: &str) -> Result<Certificate> {
        let certs = self.certificates.read().map_err(lock_err)?;
        certs
            .get(&(ca_serial.to_string(), serial.to_string()))
            .cloned()
            .ok_or_else(|| PkiError::CertificateNotFound(serial.to_string()))
    }

    fn certificates_of(&self, ca_serial: &str) -> Result<Vec<Certificate>> {
        let certs = self.certificates.read().map_err(lock_err)?;
        let mut result: Vec<Certificate> = certs
            .iter()
            .filter(|((ca, _), _)| ca == ca_serial)
            .map(|(_, cert)| cert.clone())
            .collect();
        result.sort_by(|a, b| a.serial.cmp(&b.serial));
        Ok(result)
    }

    fn save_certificate(&self, cert: Certificate) -> Result<()> {
        let mut certs = self.certificates.write().map_err(lock_err)?;
        certs.insert((cert.ca_serial.clone(), cert.serial.clone()), cert);
        Ok(())
    }

    fn next_crl_number(&self, counter: &str) -> Result<u64> {
        let mut counters = self.counters.lock().map_err(lock_err)?;
        let slot = counters.entry(counter.to_string()).or_insert(0);
        let current = *slot;
        *slot += 1;
        Ok(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CertificateAuthority;

    fn ca(serial: &str, name: &str, parent: Option<&str>) -> CertificateAuthority {
        let mut ca = CertificateAuthority::new(
            serial.to_string(),
            name.to_string(),
            Vec::new(),
            "/tmp/none.key",
        );
        ca.parent_serial = parent.map(str::to_string);
        ca
    }

    #[test]
    fn test_counter_starts_at_zero_and_increments() {
        let registry = MemoryRegistry::new();
        assert_eq!(registry.next_crl_number("crl_AB_all").unwrap(), 0);
        assert_eq!(registry.next_crl_number("crl_AB_all").unwrap(), 1);
        assert_eq!(registry.next_crl_number("crl_AB_all").unwrap(), 2);
        // independent counter starts over
        assert_eq!(registry.next_crl_number("crl_AB_user").unwrap(), 0);
    }

    #[test]
    fn test_parent_tree_walk() {
        let registry = MemoryRegistry::new();
        registry.save_ca(ca("01", "root", None)).unwrap();
        registry.save_ca(ca("02", "intermediate", Some("01"))).unwrap();
        registry.save_ca(ca("03", "leaf-ca", Some("02"))).unwrap();

        let root = registry.root_of("03").unwrap();
        assert_eq!(root.serial, "01");
        let children = registry.child_cas("01").unwrap();
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].serial, "02");
    }

    #[test]
    fn test_lookup_by_serial_or_name() {
        let registry = MemoryRegistry::new();
        registry.save_ca(ca("01", "root", None)).unwrap();
        assert_eq!(registry.ca_by_serial_or_name("01").unwrap().name, "root");
        assert_eq!(registry.ca_by_serial_or_name("root").unwrap().serial, "01");
        assert!(matches!(
            registry.ca_by_serial_or_name("missing"),
            Err(PkiError::CaNotFound(_))
        ));
    }
}
