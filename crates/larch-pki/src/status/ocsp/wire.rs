//! DER structures for the OCSP subset this responder speaks, modeled
//! with the same derive machinery the certificate types use.

use der::{
    asn1::{BitString, GeneralizedTime, Null, OctetString},
    Any, Choice, Enumerated, Sequence,
};
use x509_cert::{
    ext::{pkix::CrlReason, Extensions},
    name::Name,
    serial_number::SerialNumber,
    spki::AlgorithmIdentifierOwned,
    Certificate,
};

/// OCSPRequest (RFC 6960 section 4.1.1). An optional request signature
/// is tolerated but never verified.
#[derive(Clone, Debug, Sequence)]
pub struct OcspRequest {
    pub tbs_request: TbsRequest,
    #[asn1(context_specific = "0", tag_mode = "EXPLICIT", optional = "true")]
    pub optional_signature: Option<Any>,
}

#[derive(Clone, Debug, Sequence)]
pub struct TbsRequest {
    #[asn1(context_specific = "0", tag_mode = "EXPLICIT", default = "Default::default")]
    pub version: u8,
    #[asn1(context_specific = "1", tag_mode = "EXPLICIT", optional = "true")]
    pub requestor_name: Option<Any>,
    pub request_list: Vec<Request>,
    #[asn1(context_specific = "2", tag_mode = "EXPLICIT", optional = "true")]
    pub request_extensions: Option<Extensions>,
}

#[derive(Clone, Debug, Sequence)]
pub struct Request {
    pub req_cert: CertId,
    #[asn1(context_specific = "0", tag_mode = "EXPLICIT", optional = "true")]
    pub single_request_extensions: Option<Extensions>,
}

/// Issuer hash pair plus serial; opaque to the responder beyond the
/// serial, which keys the lookup.
#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
pub struct CertId {
    pub hash_algorithm: AlgorithmIdentifierOwned,
    pub issuer_name_hash: OctetString,
    pub issuer_key_hash: OctetString,
    pub serial_number: SerialNumber,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Enumerated)]
#[asn1(type = "ENUMERATED")]
#[repr(u32)]
pub enum OcspResponseStatus {
    Successful = 0,
    MalformedRequest = 1,
    InternalError = 2,
    TryLater = 3,
    SigRequired = 5,
    Unauthorized = 6,
}

#[derive(Clone, Debug, Sequence)]
pub struct OcspResponse {
    pub response_status: OcspResponseStatus,
    #[asn1(context_specific = "0", tag_mode = "EXPLICIT", optional = "true")]
    pub response_bytes: Option<ResponseBytes>,
}

impl OcspResponse {
    /// A bare status response with no response body
    pub fn status_only(status: OcspResponseStatus) -> Self {
        OcspResponse {
            response_status: status,
            response_bytes: None,
        }
    }
}

#[derive(Clone, Debug, Sequence)]
pub struct ResponseBytes {
    pub response_type: der::asn1::ObjectIdentifier,
    pub response: OctetString,
}

#[derive(Clone, Debug, Sequence)]
pub struct BasicOcspResponse {
    pub tbs_response_data: ResponseData,
    pub signature_algorithm: AlgorithmIdentifierOwned,
    pub signature: BitString,
    #[asn1(context_specific = "0", tag_mode = "EXPLICIT", optional = "true")]
    pub certs: Option<Vec<Certificate>>,
}

#[derive(Clone, Debug, Sequence)]
pub struct ResponseData {
    #[asn1(context_specific = "0", tag_mode = "EXPLICIT", default = "Default::default")]
    pub version: u8,
    pub responder_id: ResponderId,
    pub produced_at: GeneralizedTime,
    pub responses: Vec<SingleResponse>,
    #[asn1(context_specific = "1", tag_mode = "EXPLICIT", optional = "true")]
    pub response_extensions: Option<Extensions>,
}

#[derive(Clone, Debug, Choice)]
pub enum ResponderId {
    #[asn1(context_specific = "1", tag_mode = "EXPLICIT", constructed = "true")]
    ByName(Name),
    #[asn1(context_specific = "2", tag_mode = "EXPLICIT", constructed = "true")]
    ByKey(OctetString),
}

#[derive(Clone, Debug, Sequence)]
pub struct SingleResponse {
    pub cert_id: CertId,
    pub cert_status: CertStatus,
    pub this_update: GeneralizedTime,
    #[asn1(context_specific = "0", tag_mode = "EXPLICIT", optional = "true")]
    pub next_update: Option<GeneralizedTime>,
    #[asn1(context_specific = "1", tag_mode = "EXPLICIT", optional = "true")]
    pub single_extensions: Option<Extensions>,
}

/// Status is good or revoked; unknown is never produced because an
/// unmatched serial is treated as an internal error.
#[derive(Clone, Debug, Choice)]
pub enum CertStatus {
    #[asn1(context_specific = "0", tag_mode = "IMPLICIT")]
    Good(Null),
    #[asn1(context_specific = "1", tag_mode = "IMPLICIT", constructed = "true")]
    Revoked(RevokedInfo),
    #[asn1(context_specific = "2", tag_mode = "IMPLICIT")]
    Unknown(Null),
}

#[derive(Clone, Debug, Sequence)]
pub struct RevokedInfo {
    pub revocation_time: GeneralizedTime,
    #[asn1(context_specific = "0", tag_mode = "EXPLICIT", optional = "true")]
    pub revocation_reason: Option<CrlReason>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use der::{Decode, Encode};

    fn cert_id(serial: &[u8]) -> CertId {
        CertId {
            hash_algorithm: AlgorithmIdentifierOwned {
                oid: const_oid::db::rfc5912::ID_SHA_256,
                parameters: None,
            },
            issuer_name_hash: OctetString::new(vec![0u8; 32]).unwrap(),
            issuer_key_hash: OctetString::new(vec![1u8; 32]).unwrap(),
            serial_number: SerialNumber::new(serial).unwrap(),
        }
    }

    #[test]
    fn test_request_round_trip() {
        let request = OcspRequest {
            tbs_request: TbsRequest {
                version: 0,
                requestor_name: None,
                request_list: vec![Request {
                    req_cert: cert_id(&[0x0A, 0x0B]),
                    single_request_extensions: None,
                }],
                request_extensions: None,
            },
            optional_signature: None,
        };
        let der_bytes = request.to_der().unwrap();
        let parsed = OcspRequest::from_der(&der_bytes).unwrap();
        assert_eq!(parsed.tbs_request.request_list.len(), 1);
        assert_eq!(parsed.tbs_request.request_list[0].req_cert, cert_id(&[0x0A, 0x0B]));
    }

    #[test]
    fn test_status_only_response() {
        let response = OcspResponse::status_only(OcspResponseStatus::MalformedRequest);
        let der_bytes = response.to_der().unwrap();
        let parsed = OcspResponse::from_der(&der_bytes).unwrap();
        assert_eq!(parsed.response_status, OcspResponseStatus::MalformedRequest);
        assert!(parsed.response_bytes.is_none());
    }

    #[test]
    fn test_garbage_rejected() {
        assert!(OcspRequest::from_der(&[0x02, 0x01, 0x00]).is_err());
    }
}
