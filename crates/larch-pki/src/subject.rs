//! Distinguished-name handling for profiles and issuance.

use std::{fmt, str::FromStr};

use der::asn1::{ObjectIdentifier, SetOfVec, Utf8StringRef};
use serde::{Deserialize, Serialize};
use x509_cert::{
    attr::AttributeTypeAndValue,
    name::{Name, RelativeDistinguishedName},
};

use crate::error::{PkiError, Result};

const OID_COUNTRY: &str = "2.5.4.6";
const OID_STATE: &str = "2.5.4.8";
const OID_LOCALITY: &str = "2.5.4.7";
const OID_ORGANIZATION: &str = "2.5.4.10";
const OID_ORG_UNIT: &str = "2.5.4.11";
const OID_COMMON_NAME: &str = "2.5.4.3";
const OID_EMAIL: &str = "1.2.840.113549.1.9.1";

/// Certificate subject. Fields are emitted in the conventional
/// C, ST, L, O, OU, CN, emailAddress order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subject {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locality: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organizational_unit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub common_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

impl Subject {
    /// Subject with only a common name set
    pub fn with_common_name(cn: impl Into<String>) -> Self {
        Subject {
            common_name: Some(cn.into()),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.country.is_none()
            && self.state.is_none()
            && self.locality.is_none()
            && self.organization.is_none()
            && self.organizational_unit.is_none()
            && self.common_name.is_none()
            && self.email.is_none()
    }

    /// Field-by-field update: fields set in `overrides` replace this
    /// subject's fields, unset fields are inherited.
    pub fn update_from(&mut self, overrides: &Subject) {
        macro_rules! take {
            ($field:ident) => {
                if overrides.$field.is_some() {
                    self.$field = overrides.$field.clone();
                }
            };
        }
        take!(country);
        take!(state);
        take!(locality);
        take!(organization);
        take!(organizational_unit);
        take!(common_name);
        take!(email);
    }

    /// Build the X.509 distinguished name
    /// Extract the known attribute fields from an X.509 name; unknown
    /// attribute types are ignored.
    pub fn from_name(name: &Name) -> Subject {
        let mut subject = Subject::default();
        for rdn in name.0.iter() {
            for atv in rdn.0.iter() {
                let Some(value) = decode_attribute_value(&atv.value) else {
                    continue;
                };
                let value = Some(value);
                match atv.oid.to_string().as_str() {
                    OID_COUNTRY => subject.country = value,
                    OID_STATE => subject.state = value,
                    OID_LOCALITY => subject.locality = value,
                    OID_ORGANIZATION => subject.organization = value,
                    OID_ORG_UNIT => subject.organizational_unit = value,
                    OID_COMMON_NAME => subject.common_name = value,
                    OID_EMAIL => subject.email = value,
                    _ => {}
                }
            }
        }
        subject
    }

    pub fn to_name(&self) -> Result<Name> {
        let mut rdns = Vec::new();
        push_rdn(&mut rdns, OID_COUNTRY, self.country.as_deref())?;
        push_rdn(&mut rdns, OID_STATE, self.state.as_deref())?;
        push_rdn(&mut rdns, OID_LOCALITY, self.locality.as_deref())?;
        push_rdn(&mut rdns, OID_ORGANIZATION, self.organization.as_deref())?;
        push_rdn(&mut rdns, OID_ORG_UNIT, self.organizational_unit.as_deref())?;
        push_rdn(&mut rdns, OID_COMMON_NAME, self.common_name.as_deref())?;
        push_rdn(&mut rdns, OID_EMAIL, self.email.as_deref())?;
        Ok(x509_cert::name::RdnSequence(rdns))
    }
}

fn decode_attribute_value(value: &der::Any) -> Option<String> {
    if let Ok(s) = value.decode_as::<Utf8StringRef>() {
        return Some(s.as_str().to_string());
    }
    if let Ok(s) = value.decode_as::<der::asn1::PrintableStringRef>() {
        return Some(s.as_str().to_string());
    }
    if let Ok(s) = value.decode_as::<der::asn1::Ia5StringRef>() {
        return Some(s.as_str().to_string());
    }
    None
}

fn push_rdn(
    rdns: &mut Vec<RelativeDistinguishedName>,
    oid: &str,
    value: Option<&str>,
) -> Result<()> {
    let Some(value) = value else {
        return Ok(());
    };
    let oid = ObjectIdentifier::from_str(oid)
        .map_err(|e| PkiError::Validation(format!("invalid OID {oid}: {e}")))?;
    let value = Utf8StringRef::new(value)
        .map_err(|e| PkiError::Validation(format!("invalid attribute value: {e}")))?;
    let mut set = SetOfVec::new();
    set.insert(AttributeTypeAndValue {
        oid,
        value: der::Any::from(value),
    })
    .map_err(PkiError::Der)?;
    rdns.push(RelativeDistinguishedName(set));
    Ok(())
}

impl fmt::Display for Subject {
    /// Slash-separated form, e.g. `/C=US/O=Example/CN=example.com`
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let fields = [
            ("C", &self.country),
            ("ST", &self.state),
            ("L", &self.locality),
            ("O", &self.organization),
            ("OU", &self.organizational_unit),
            ("CN", &self.common_name),
            ("emailAddress", &self.email),
        ];
        for (key, value) in fields {
            if let Some(value) = value {
                write!(f, "/{key}={value}")?;
            }
        }
        Ok(())
    }
}

impl FromStr for Subject {
    type Err = PkiError;

    /// Parse the slash-separated form
    fn from_str(s: &str) -> Result<Self> {
        let mut subject = Subject::default();
        for part in s.split('/').filter(|p| !p.trim().is_empty()) {
            let (key, value) = part
                .split_once('=')
                .ok_or_else(|| PkiError::Validation(format!("invalid subject field: {part}")))?;
            let value = Some(value.trim().to_string());
            match key.trim() {
                "C" => subject.country = value,
                "ST" => subject.state = value,
                "L" => subject.locality = value,
                "O" => subject.organization = value,
                "OU" => subject.organizational_unit = value,
                "CN" => subject.common_name = value,
                "emailAddress" | "E" => subject.email = value,
                other => {
                    return Err(PkiError::Validation(format!(
                        "unknown subject field: {other}"
                    )))
                }
            }
        }
        Ok(subject)
    }
}
