use std::path::Path;

use const_oid::db::rfc8410::ID_ED_25519;
use der::asn1::BitString;
use ed25519_dalek::{Signer, Verifier};
use pkcs8::{
    spki::{AlgorithmIdentifierOwned, SubjectPublicKeyInfoOwned},
    DecodePrivateKey, EncodePrivateKey, LineEnding,
};
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};

/// PEM label of an encrypted PKCS#8 blob
const ENCRYPTED_PEM_LABEL: &str = "ENCRYPTED PRIVATE KEY";

/// Ed25519 signing key backing a certificate authority or OCSP responder
pub struct SigningKey {
    inner: ed25519_dalek::SigningKey,
}

impl SigningKey {
    /// Generate a fresh key from the system RNG
    pub fn generate() -> Result<Self> {
        let mut seed = [0u8; 32];
        getrandom::fill(&mut seed).map_err(|e| Error::ParseError(e.to_string()))?;
        Ok(Self {
            inner: ed25519_dalek::SigningKey::from_bytes(&seed),
        })
    }

    /// Parse an unencrypted PKCS#8 PEM document
    pub fn from_pkcs8_pem(pem: &str) -> Result<Self> {
        let inner = ed25519_dalek::SigningKey::from_pkcs8_pem(pem)
            .map_err(|e| Error::ParseError(e.to_string()))?;
        Ok(Self { inner })
    }

    /// Parse unencrypted PKCS#8 DER bytes
    pub fn from_pkcs8_der(der: &[u8]) -> Result<Self> {
        let inner = ed25519_dalek::SigningKey::from_pkcs8_der(der)
            .map_err(|e| Error::ParseError(e.to_string()))?;
        Ok(Self { inner })
    }

    /// Parse an encrypted PKCS#8 PEM document
    pub fn from_pkcs8_encrypted_pem(pem: &str, password: &str) -> Result<Self> {
        let inner = ed25519_dalek::SigningKey::from_pkcs8_encrypted_pem(pem, password)
            .map_err(|_| Error::WrongPassword)?;
        Ok(Self { inner })
    }

    /// Load a key from a PEM file, decrypting it when a password is given.
    ///
    /// An encrypted key with no password fails with [`Error::PasswordRequired`];
    /// a password passed for a plaintext key is ignored.
    pub fn load(path: &Path, password: Option<&str>) -> Result<Self> {
        let pem = std::fs::read_to_string(path)?;
        if pem.contains(ENCRYPTED_PEM_LABEL) {
            match password {
                Some(pw) => Self::from_pkcs8_encrypted_pem(&pem, pw),
                None => Err(Error::PasswordRequired),
            }
        } else {
            Self::from_pkcs8_pem(&pem)
        }
    }

    /// Serialize to unencrypted PKCS#8 PEM
    pub fn to_pkcs8_pem(&self) -> Result<String> {
        let pem = self
            .inner
            .to_pkcs8_pem(LineEnding::LF)
            .map_err(|e| Error::ExportError(e.to_string()))?;
        Ok(pem.to_string())
    }

    /// Serialize to encrypted PKCS#8 PEM
    pub fn to_pkcs8_encrypted_pem(&self, password: &str) -> Result<String> {
        let pem = self
            .inner
            .to_pkcs8_encrypted_pem(&mut rand_core::OsRng, password, LineEnding::LF)
            .map_err(|e| Error::ExportError(e.to_string()))?;
        Ok(pem.to_string())
    }

    /// Write the key to `path` as PEM, encrypted when a password is given
    pub fn save(&self, path: &Path, password: Option<&str>) -> Result<()> {
        let pem = match password {
            Some(pw) => self.to_pkcs8_encrypted_pem(pw)?,
            None => self.to_pkcs8_pem()?,
        };
        std::fs::write(path, pem)?;
        Ok(())
    }

    /// Sign `message`, returning the 64-byte Ed25519 signature
    pub fn sign(&self, message: &[u8]) -> Vec<u8> {
        self.inner.sign(message).to_bytes().to_vec()
    }

    /// Verify a signature made by this key
    pub fn verify(&self, message: &[u8], signature: &[u8]) -> bool {
        let Ok(sig) = ed25519_dalek::Signature::from_slice(signature) else {
            return false;
        };
        self.inner.verifying_key().verify(message, &sig).is_ok()
    }

    /// Raw 32-byte public key
    pub fn public_key_bytes(&self) -> [u8; 32] {
        self.inner.verifying_key().to_bytes()
    }

    /// AlgorithmIdentifier for Ed25519 signatures (no parameters)
    pub fn signature_algorithm(&self) -> AlgorithmIdentifierOwned {
        AlgorithmIdentifierOwned {
            oid: ID_ED_25519,
            parameters: None,
        }
    }

    /// SubjectPublicKeyInfo for the public half
    pub fn spki(&self) -> Result<SubjectPublicKeyInfoOwned> {
        let subject_public_key = BitString::from_bytes(&self.public_key_bytes())
            .map_err(|e| Error::ExportError(e.to_string()))?;
        Ok(SubjectPublicKeyInfoOwned {
            algorithm: self.signature_algorithm(),
            subject_public_key,
        })
    }

    /// Subject key identifier per RFC 7093 method 1: SHA-256 of the
    /// public key bit string, truncated to 160 bits
    pub fn subject_key_identifier(&self) -> [u8; 20] {
        let digest = Sha256::digest(self.public_key_bytes());
        let mut ski = [0u8; 20];
        ski.copy_from_slice(&digest[..20]);
        ski
    }
}

impl std::fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningKey")
            .field("public_key", &hex::encode(self.public_key_bytes()))
            .finish()
    }
}
