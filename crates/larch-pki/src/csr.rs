//! Certificate signing requests: parsing, verification and construction.

use der::{Decode, Encode};
use ed25519_dalek::Verifier;
use pkcs8::spki::{AlgorithmIdentifierOwned, SubjectPublicKeyInfoOwned};
use x509_cert::request::{CertReq, CertReqInfo, Version};

use larch_key::SigningKey;

use crate::{
    error::{PkiError, Result},
    subject::Subject,
};

/// A certificate signing request. Only Ed25519 requests are accepted.
#[derive(Debug, Clone)]
pub struct Csr {
    inner: CertReq,
}

impl Csr {
    /// Build and sign a CSR for a key and subject
    pub fn build(key: &SigningKey, subject: &Subject) -> Result<Self> {
        let info = CertReqInfo {
            version: Version::V1,
            subject: subject.to_name()?,
            public_key: key.spki().map_err(PkiError::Key)?,
            attributes: Default::default(),
        };
        let info_der = info.to_der()?;
        let signature = key.sign(&info_der);
        let inner = CertReq {
            info,
            algorithm: key.signature_algorithm(),
            signature: der::asn1::BitString::from_bytes(&signature)?,
        };
        Ok(Csr { inner })
    }

    /// Parse from PEM (`CERTIFICATE REQUEST` or `NEW CERTIFICATE REQUEST`)
    pub fn from_pem(pem: &str) -> Result<Self> {
        let block = pem::parse(pem).map_err(|e| PkiError::Csr(format!("invalid PEM: {e}")))?;
        if block.tag() != "CERTIFICATE REQUEST" && block.tag() != "NEW CERTIFICATE REQUEST" {
            return Err(PkiError::Csr(format!("unexpected PEM tag: {}", block.tag())));
        }
        Self::from_der(block.contents())
    }

    /// Parse from DER bytes
    pub fn from_der(der: &[u8]) -> Result<Self> {
        let inner = CertReq::from_der(der).map_err(|e| PkiError::Csr(e.to_string()))?;
        Ok(Csr { inner })
    }

    pub fn to_der(&self) -> Result<Vec<u8>> {
        self.inner.to_der().map_err(PkiError::Der)
    }

    pub fn to_pem(&self) -> Result<String> {
        Ok(pem::encode(&pem::Pem::new(
            "CERTIFICATE REQUEST",
            self.to_der()?,
        )))
    }

    /// The requested subject name
    pub fn subject_name(&self) -> &x509_cert::name::Name {
        &self.inner.info.subject
    }

    /// The requester's public key
    pub fn public_key(&self) -> &SubjectPublicKeyInfoOwned {
        &self.inner.info.public_key
    }

    /// Signature algorithm of the request
    pub fn algorithm(&self) -> &AlgorithmIdentifierOwned {
        &self.inner.algorithm
    }

    /// Extract raw Ed25519 public key bytes from the request
    pub fn ed25519_public_key(&self) -> Result<[u8; 32]> {
        let spki = self.public_key();
        if spki.algorithm.oid != const_oid::db::rfc8410::ID_ED_25519 {
            return Err(PkiError::Csr(format!(
                "unsupported public key algorithm: {}",
                spki.algorithm.oid
            )));
        }
        let bytes = spki.subject_public_key.raw_bytes();
        bytes.try_into().map_err(|_| {
            PkiError::Csr(format!("invalid Ed25519 public key length: {}", bytes.len()))
        })
    }

    /// Verify the request's self-signature
    pub fn verify(&self) -> Result<()> {
        let info_der = self.inner.info.to_der()?;
        let signature = ed25519_dalek::Signature::from_slice(self.inner.signature.raw_bytes())
            .map_err(|e| PkiError::Csr(format!("invalid signature: {e}")))?;
        let key = ed25519_dalek::VerifyingKey::from_bytes(&self.ed25519_public_key()?)
            .map_err(|e| PkiError::Csr(format!("invalid public key: {e}")))?;
        key.verify(&info_der, &signature)
            .map_err(|_| PkiError::Csr("signature verification failed".to_string()))
    }
}
