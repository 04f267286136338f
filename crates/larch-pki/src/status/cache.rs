//! CRL byte cache keyed by CA serial, digest, encoding and scope.

use std::{collections::HashMap, sync::Mutex};

use time::{Duration, OffsetDateTime};

use larch_key::DigestAlgorithm;

use crate::{
    error::{PkiError, Result},
    types::{CrlScope, Encoding},
};

/// Cache key for one rendered CRL. The full scope carries no suffix so
/// keys written before scoped CRLs existed stay valid.
pub fn cache_key(
    serial: &str,
    digest: DigestAlgorithm,
    encoding: Encoding,
    scope: CrlScope,
) -> String {
    let mut key = format!("crl_{serial}_{}_{}", digest.name(), encoding.name());
    if let Some(suffix) = scope.name() {
        key.push('_');
        key.push_str(suffix);
    }
    key
}

/// Byte cache with per-entry expiry
pub trait CrlCache: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;
    fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;
}

/// In-process cache; entries past their expiry read as absent
pub struct MemoryCrlCache {
    entries: Mutex<HashMap<String, (Vec<u8>, OffsetDateTime)>>,
}

impl MemoryCrlCache {
    pub fn new() -> Self {
        MemoryCrlCache {
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Drop entries whose expiry has passed, returning how many were
    /// removed
    pub fn cleanup_expired(&self) -> Result<usize> {
        let mut entries = self.entries.lock().map_err(lock_err)?;
        let now = OffsetDateTime::now_utc();
        let before = entries.len();
        entries.retain(|_, (_, expires)| *expires > now);
        Ok(before - entries.len())
    }
}

impl Default for MemoryCrlCache {
    fn default() -> Self {
        Self::new()
    }
}

fn lock_err<T>(_: T) -> PkiError {
    PkiError::Storage("failed to acquire lock".to_string())
}

impl CrlCache for MemoryCrlCache {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let entries = self.entries.lock().map_err(lock_err)?;
        match entries.get(key) {
            Some((value, expires)) if *expires > OffsetDateTime::now_utc() => {
                Ok(Some(value.clone()))
            }
            _ => Ok(None),
        }
    }

    fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<()> {
        let mut entries = self.entries.lock().map_err(lock_err)?;
        entries.insert(key.to_string(), (value, OffsetDateTime::now_utc() + ttl));
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let mut entries = self.entries.lock().map_err(lock_err)?;
        entries.remove(key);
        Ok(())
    }
}
