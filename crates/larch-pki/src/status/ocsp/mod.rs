//! OCSP responder answering for one CA with a delegated signing key.
//! Every request, however broken, gets a protocol-valid response.

pub mod wire;

use std::sync::Arc;

use der::{
    asn1::{BitString, GeneralizedTime, Null, OctetString},
    Decode, Encode,
};
use time::{Duration, OffsetDateTime};
use tracing::{debug, warn};

use const_oid::db::rfc6960;
use larch_key::SigningKey;

use crate::{
    config::OcspResponderConfig,
    error::Result,
    models::{CertificateAuthority, RevocationState},
    store::Registry,
    types::format_serial,
};

use wire::{
    BasicOcspResponse, CertStatus, OcspRequest, OcspResponse, OcspResponseStatus, ResponderId,
    ResponseBytes, ResponseData, RevokedInfo, SingleResponse,
};

/// Encoding of `OCSPResponse { responseStatus internalError }`, used
/// when even the response encoder fails.
const INTERNAL_ERROR_DER: [u8; 5] = [0x30, 0x03, 0x0a, 0x01, 0x02];

pub struct OcspResponder {
    registry: Arc<dyn Registry>,
    ca: Arc<CertificateAuthority>,
    responder_key: SigningKey,
    responder_cert: x509_cert::Certificate,
    expires: Duration,
    ca_mode: bool,
}

impl OcspResponder {
    /// Load the delegated key and responder certificate up front so a
    /// misconfigured endpoint fails at startup, not per request.
    pub fn new(registry: Arc<dyn Registry>, config: &OcspResponderConfig) -> Result<Self> {
        let ca = registry.ca_by_serial_or_name(&config.ca)?;
        let responder_key = SigningKey::load(
            &config.responder_key_path,
            config.responder_key_password.as_deref(),
        )?;
        let responder_cert = load_responder_cert(registry.as_ref(), &ca, &config.responder_cert)?;
        Ok(OcspResponder {
            registry,
            ca,
            responder_key,
            responder_cert,
            expires: Duration::seconds(config.expires as i64),
            ca_mode: config.ca_mode,
        })
    }

    /// Answer one DER-encoded OCSP request. Never returns an error:
    /// failures map to malformedRequest or internalError responses.
    pub fn handle(&self, request: &[u8]) -> Vec<u8> {
        let status = match self.respond(request) {
            Ok(bytes) => return bytes,
            Err(status) => status,
        };
        match OcspResponse::status_only(status).to_der() {
            Ok(bytes) => bytes,
            Err(_) => INTERNAL_ERROR_DER.to_vec(),
        }
    }

    fn respond(&self, request: &[u8]) -> std::result::Result<Vec<u8>, OcspResponseStatus> {
        let request = OcspRequest::from_der(request).map_err(|err| {
            debug!(%err, "undecodable OCSP request");
            OcspResponseStatus::MalformedRequest
        })?;
        let tbs = &request.tbs_request;

        if tbs.request_list.len() != 1 {
            debug!(count = tbs.request_list.len(), "OCSP request must carry one request");
            return Err(OcspResponseStatus::MalformedRequest);
        }
        let single = &tbs.request_list[0];

        // the nonce is the only request extension understood here
        let mut nonce = None;
        if let Some(extensions) = &tbs.request_extensions {
            for ext in extensions {
                if ext.extn_id == rfc6960::ID_PKIX_OCSP_NONCE {
                    nonce = Some(ext.clone());
                } else if ext.critical {
                    debug!(oid = %ext.extn_id, "unknown critical OCSP request extension");
                    return Err(OcspResponseStatus::MalformedRequest);
                }
            }
        }

        let serial = format_serial(single.req_cert.serial_number.as_bytes());
        let revocation = self.lookup(&serial).map_err(|err| {
            // no distinction between unknown and unreadable leaks here
            warn!(ca = %self.ca.name, %err, "OCSP lookup failed");
            OcspResponseStatus::InternalError
        })?;

        let cert_status = match revocation {
            RevocationState { revoked: true, reason, revoked_at, .. } => {
                CertStatus::Revoked(RevokedInfo {
                    revocation_time: generalized_time(
                        revoked_at.unwrap_or_else(OffsetDateTime::now_utc),
                    )?,
                    revocation_reason: reason.map(|r| r.to_crl_reason()),
                })
            }
            _ => CertStatus::Good(Null),
        };

        let now = OffsetDateTime::now_utc();
        let single_response = SingleResponse {
            cert_id: single.req_cert.clone(),
            cert_status,
            this_update: generalized_time(now)?,
            next_update: Some(generalized_time(now + self.expires)?),
            single_extensions: None,
        };

        let tbs_response_data = ResponseData {
            version: 0,
            responder_id: ResponderId::ByKey(
                OctetString::new(self.responder_key.subject_key_identifier().to_vec())
                    .map_err(internal)?,
            ),
            produced_at: generalized_time(now)?,
            responses: vec![single_response],
            response_extensions: nonce.map(|ext| vec![ext]),
        };

        let tbs_der = tbs_response_data.to_der().map_err(internal)?;
        let signature = self.responder_key.sign(&tbs_der);
        let basic = BasicOcspResponse {
            tbs_response_data,
            signature_algorithm: self.responder_key.signature_algorithm(),
            signature: BitString::from_bytes(&signature).map_err(internal)?,
            certs: Some(vec![self.responder_cert.clone()]),
        };

        let response = OcspResponse {
            response_status: OcspResponseStatus::Successful,
            response_bytes: Some(ResponseBytes {
                response_type: rfc6960::ID_PKIX_OCSP_BASIC,
                response: OctetString::new(basic.to_der().map_err(internal)?)
                    .map_err(internal)?,
            }),
        };
        response.to_der().map_err(internal)
    }

    fn lookup(&self, serial: &str) -> Result<RevocationState> {
        if self.ca_mode {
            let child = self.registry.ca_by_serial(serial)?;
            if child.parent_serial.as_deref() != Some(self.ca.serial.as_str()) {
                return Err(crate::error::PkiError::CaNotFound(serial.to_string()));
            }
            Ok(child.revocation.clone())
        } else {
            let cert = self.registry.certificate(&self.ca.serial, serial)?;
            Ok(cert.revocation)
        }
    }
}

/// Resolve the configured responder certificate: an existing file path
/// (PEM or DER) wins, otherwise it names a stored serial under the CA.
fn load_responder_cert(
    registry: &dyn Registry,
    ca: &CertificateAuthority,
    ident: &str,
) -> Result<x509_cert::Certificate> {
    let path = std::path::Path::new(ident);
    if path.exists() {
        let bytes = std::fs::read(path)?;
        let der = if bytes.starts_with(b"-----") {
            let block = pem::parse(&bytes)
                .map_err(|e| crate::error::PkiError::Certificate(format!("invalid PEM: {e}")))?;
            if block.tag() != "CERTIFICATE" {
                return Err(crate::error::PkiError::Certificate(format!(
                    "unexpected PEM tag: {}",
                    block.tag()
                )));
            }
            block.contents().to_vec()
        } else {
            bytes
        };
        return Ok(x509_cert::Certificate::from_der(&der)?);
    }
    registry.certificate(&ca.serial, ident)?.parse()
}

fn internal<E: std::fmt::Display>(err: E) -> OcspResponseStatus {
    warn!(%err, "failed to build OCSP response");
    OcspResponseStatus::InternalError
}

fn generalized_time(
    t: OffsetDateTime,
) -> std::result::Result<GeneralizedTime, OcspResponseStatus> {
    let ts = t.unix_timestamp();
    if ts < 0 {
        return Err(internal("timestamp before epoch"));
    }
    GeneralizedTime::from_unix_duration(std::time::Duration::from_secs(ts as u64))
        .map_err(internal)
}
