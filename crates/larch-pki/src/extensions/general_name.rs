//! Typed general names used by SAN, IAN, CRLDP, AIA and name constraints.

use std::{fmt, net::IpAddr, str::FromStr};

use der::asn1::{Ia5String, OctetString};
use serde::{Deserialize, Serialize};
use x509_cert::ext::pkix::name::GeneralName as X509GeneralName;

use crate::{
    error::{PkiError, Result},
    subject::Subject,
};

/// A general name, parsed from the `DNS:` / `URI:` / `email:` / `IP:` /
/// `dirname:` prefixed literal form. A bare literal is treated as a DNS name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum GeneralName {
    Dns(String),
    Uri(String),
    Email(String),
    Ip(IpAddr),
    DirectoryName(Subject),
}

impl GeneralName {
    /// Parse a common name into a general name for SAN inclusion.
    /// IP literals become IP names, everything else must be a valid
    /// hostname (wildcard prefix allowed).
    pub fn from_common_name(cn: &str) -> Result<Self> {
        if let Ok(ip) = cn.parse::<IpAddr>() {
            return Ok(GeneralName::Ip(ip));
        }
        if is_valid_hostname(cn) {
            Ok(GeneralName::Dns(cn.to_string()))
        } else {
            Err(PkiError::InvalidCommonName(cn.to_string()))
        }
    }

    /// Convert to the x509-cert representation for signing
    pub fn to_x509(&self) -> Result<X509GeneralName> {
        let name = match self {
            GeneralName::Dns(host) => X509GeneralName::DnsName(ia5(host)?),
            GeneralName::Uri(uri) => X509GeneralName::UniformResourceIdentifier(ia5(uri)?),
            GeneralName::Email(addr) => X509GeneralName::Rfc822Name(ia5(addr)?),
            GeneralName::Ip(addr) => {
                let octets = match addr {
                    IpAddr::V4(v4) => v4.octets().to_vec(),
                    IpAddr::V6(v6) => v6.octets().to_vec(),
                };
                X509GeneralName::IpAddress(OctetString::new(octets).map_err(PkiError::Der)?)
            }
            GeneralName::DirectoryName(subject) => {
                X509GeneralName::DirectoryName(subject.to_name()?)
            }
        };
        Ok(name)
    }

    /// Convert from a decoded x509-cert general name
    pub fn from_x509(name: &X509GeneralName) -> Result<Self> {
        match name {
            X509GeneralName::DnsName(host) => Ok(GeneralName::Dns(host.to_string())),
            X509GeneralName::UniformResourceIdentifier(uri) => {
                Ok(GeneralName::Uri(uri.to_string()))
            }
            X509GeneralName::Rfc822Name(addr) => Ok(GeneralName::Email(addr.to_string())),
            X509GeneralName::IpAddress(octets) => {
                let bytes = octets.as_bytes();
                let addr = match bytes.len() {
                    4 => {
                        let mut v4 = [0u8; 4];
                        v4.copy_from_slice(bytes);
                        IpAddr::from(v4)
                    }
                    16 => {
                        let mut v6 = [0u8; 16];
                        v6.copy_from_slice(bytes);
                        IpAddr::from(v6)
                    }
                    n => {
                        return Err(PkiError::Validation(format!(
                            "invalid IP address length: {n}"
                        )))
                    }
                };
                Ok(GeneralName::Ip(addr))
            }
            other => Err(PkiError::Validation(format!(
                "unsupported general name: {other:?}"
            ))),
        }
    }
}

fn ia5(s: &str) -> Result<Ia5String> {
    Ia5String::new(s).map_err(PkiError::Der)
}

/// ASCII letter-digit-hyphen hostname check, one leading wildcard label
/// permitted.
pub fn is_valid_hostname(host: &str) -> bool {
    let host = host.strip_prefix("*.").unwrap_or(host);
    if host.is_empty() || host.len() > 253 {
        return false;
    }
    host.split('.').all(|label| {
        !label.is_empty()
            && label.len() <= 63
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
    })
}

impl fmt::Display for GeneralName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GeneralName::Dns(host) => write!(f, "DNS:{host}"),
            GeneralName::Uri(uri) => write!(f, "URI:{uri}"),
            GeneralName::Email(addr) => write!(f, "email:{addr}"),
            GeneralName::Ip(addr) => write!(f, "IP:{addr}"),
            GeneralName::DirectoryName(subject) => write!(f, "dirname:{subject}"),
        }
    }
}

impl FromStr for GeneralName {
    type Err = PkiError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if let Some(host) = s.strip_prefix("DNS:") {
            return Ok(GeneralName::Dns(host.trim().to_string()));
        }
        if let Some(uri) = s.strip_prefix("URI:") {
            return Ok(GeneralName::Uri(uri.trim().to_string()));
        }
        if let Some(addr) = s.strip_prefix("email:") {
            return Ok(GeneralName::Email(addr.trim().to_string()));
        }
        if let Some(ip) = s.strip_prefix("IP:") {
            let addr = ip
                .trim()
                .parse::<IpAddr>()
                .map_err(|e| PkiError::Validation(format!("invalid IP name {ip}: {e}")))?;
            return Ok(GeneralName::Ip(addr));
        }
        if let Some(dn) = s.strip_prefix("dirname:") {
            return Ok(GeneralName::DirectoryName(dn.parse()?));
        }
        // bare literal, treated as DNS
        Ok(GeneralName::Dns(s.to_string()))
    }
}

impl From<GeneralName> for String {
    fn from(name: GeneralName) -> String {
        name.to_string()
    }
}

impl TryFrom<String> for GeneralName {
    type Error = PkiError;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}
