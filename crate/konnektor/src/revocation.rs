//! Revocation evidence for signer certificates: either synthesized
//! offline and signed by the matched trust anchor, or fetched from a live
//! OCSP responder under a caller-supplied timeout.

use std::time::Duration;

use der::{
    DateTime, Decode, Encode,
    asn1::{Any, BitString, GeneralizedTime, Null, OctetString},
};
use openssl::{
    hash::MessageDigest,
    pkey::{Id, PKeyRef, Private},
    sign::{Signer, Verifier},
};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use soft_konnektor_cards::TrustedIssuer;
use tracing::{debug, warn};
use x509_cert::{Certificate, spki::AlgorithmIdentifierOwned};

use crate::{
    asn1::{
        ocsp::{
            BasicOcspResponse, CertId, CertStatus, OcspRequest, OcspResponse, OcspResponseStatus,
            Request, ResponderId, ResponseData, SingleResponse, TbsRequest,
        },
        oid, unix_now,
    },
    error::{KonnektorError, result::KonnektorResult},
    kon_ensure,
    operations::RevocationStatus,
};

/// Where revocation evidence comes from.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub enum RevocationSource {
    /// Synthesize CA-signed OCSP tokens offline; the default, and the only
    /// mode that needs no network at all.
    #[default]
    Synthesized,
    /// Ask a live OCSP responder. The timeout bounds the single network
    /// call; hitting it surfaces as `RevocationSourceUnavailable`.
    Responder { url: String, timeout: Duration },
}

pub(crate) fn obtain_basic_response(
    source: &RevocationSource,
    certificate: &Certificate,
    issuer: &TrustedIssuer,
    validity: Duration,
) -> KonnektorResult<BasicOcspResponse> {
    match source {
        RevocationSource::Synthesized => synthesize_basic_response(certificate, issuer, validity),
        RevocationSource::Responder { url, timeout } => {
            fetch_basic_response(certificate, issuer, url, *timeout)
        }
    }
}

/// Produce a CA-signed `good` response for the certificate, valid for
/// `validity` from now.
pub(crate) fn synthesize_basic_response(
    certificate: &Certificate,
    issuer: &TrustedIssuer,
    validity: Duration,
) -> KonnektorResult<BasicOcspResponse> {
    let issuer_cert = Certificate::from_der(&issuer.certificate.to_der()?)?;
    let now = unix_now()?;

    let tbs_response_data = ResponseData {
        responder_id: ResponderId::ByName(issuer_cert.tbs_certificate.subject.clone()),
        produced_at: generalized_time(now)?,
        responses: vec![SingleResponse {
            cert_id: cert_id(certificate, &issuer_cert)?,
            cert_status: CertStatus::Good(Null),
            this_update: generalized_time(now)?,
            next_update: Some(generalized_time(now + validity)?),
            single_extensions: None,
        }],
        response_extensions: None,
    };

    let tbs_der = tbs_response_data.to_der()?;
    let mut signer = Signer::new(MessageDigest::sha256(), &issuer.private_key)?;
    let signature = signer.sign_oneshot_to_vec(&tbs_der)?;
    debug!(
        "synthesized OCSP token for certificate serial {:?} under {}",
        certificate.tbs_certificate.serial_number, issuer.name
    );

    Ok(BasicOcspResponse {
        tbs_response_data,
        signature_algorithm: responder_signature_algorithm(&issuer.private_key),
        signature: BitString::from_bytes(&signature)?,
        certs: None,
    })
}

/// POST a DER OCSP request to a responder and unwrap the basic response.
pub(crate) fn fetch_basic_response(
    certificate: &Certificate,
    issuer: &TrustedIssuer,
    url: &str,
    timeout: Duration,
) -> KonnektorResult<BasicOcspResponse> {
    let issuer_cert = Certificate::from_der(&issuer.certificate.to_der()?)?;
    let request = OcspRequest {
        tbs_request: TbsRequest {
            request_list: vec![Request {
                req_cert: cert_id(certificate, &issuer_cert)?,
            }],
        },
    };

    let unavailable =
        |e: &dyn std::fmt::Display| KonnektorError::RevocationSourceUnavailable(format!("{url}: {e}"));

    let client = reqwest::blocking::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| unavailable(&e))?;
    let response = client
        .post(url)
        .header("Content-Type", "application/ocsp-request")
        .body(request.to_der()?)
        .send()
        .map_err(|e| unavailable(&e))?;
    let body = response.bytes().map_err(|e| unavailable(&e))?;

    let envelope = OcspResponse::from_der(&body).map_err(|e| unavailable(&e))?;
    kon_ensure!(
        envelope.response_status == OcspResponseStatus::Successful,
        KonnektorError::RevocationSourceUnavailable(format!(
            "{url}: responder answered {:?}",
            envelope.response_status
        ))
    );
    let response_bytes = envelope.response_bytes.ok_or_else(|| {
        KonnektorError::RevocationSourceUnavailable(format!("{url}: empty successful response"))
    })?;
    kon_ensure!(
        response_bytes.response_type == oid::ID_PKIX_OCSP_BASIC,
        KonnektorError::RevocationSourceUnavailable(format!(
            "{url}: unexpected response type {}",
            response_bytes.response_type
        ))
    );
    BasicOcspResponse::from_der(response_bytes.response.as_bytes()).map_err(|e| unavailable(&e))
}

/// Read the status a token asserts for a certificate, provided the token
/// is signed by the expected issuer and actually speaks about the
/// certificate's serial.
pub(crate) fn token_status(
    token: &BasicOcspResponse,
    certificate: &Certificate,
    issuer: &TrustedIssuer,
) -> RevocationStatus {
    let verified = token
        .tbs_response_data
        .to_der()
        .map_err(KonnektorError::from)
        .and_then(|tbs| verify_token_signature(token, &tbs, issuer));
    match verified {
        Ok(true) => {}
        Ok(false) => {
            warn!("OCSP token signature does not verify under {}", issuer.name);
            return RevocationStatus::Unavailable;
        }
        Err(e) => {
            warn!("OCSP token not interpretable: {e}");
            return RevocationStatus::Unavailable;
        }
    }

    token
        .tbs_response_data
        .responses
        .iter()
        .find(|r| r.cert_id.serial_number == certificate.tbs_certificate.serial_number)
        .map_or(RevocationStatus::Unavailable, |r| match &r.cert_status {
            CertStatus::Good(_) => RevocationStatus::Good,
            CertStatus::Revoked(_) => RevocationStatus::Revoked,
            CertStatus::Unknown(_) => RevocationStatus::Unknown,
        })
}

fn verify_token_signature(
    token: &BasicOcspResponse,
    tbs_der: &[u8],
    issuer: &TrustedIssuer,
) -> KonnektorResult<bool> {
    let algorithm = token.signature_algorithm.oid;
    kon_ensure!(
        algorithm == oid::SHA_256_WITH_RSA_ENCRYPTION || algorithm == oid::ECDSA_WITH_SHA_256,
        KonnektorError::Certificate(format!("unexpected OCSP signature algorithm {algorithm}"))
    );
    let public_key = issuer.certificate.public_key()?;
    let mut verifier = Verifier::new(MessageDigest::sha256(), &public_key)?;
    Ok(verifier
        .verify_oneshot(token.signature.raw_bytes(), tbs_der)
        .unwrap_or(false))
}

/// RFC 6960 CertID with SHA-256 issuer hashes.
fn cert_id(certificate: &Certificate, issuer_cert: &Certificate) -> KonnektorResult<CertId> {
    let name_hash = Sha256::digest(issuer_cert.tbs_certificate.subject.to_der()?);
    let key_hash = Sha256::digest(
        issuer_cert
            .tbs_certificate
            .subject_public_key_info
            .subject_public_key
            .raw_bytes(),
    );
    Ok(CertId {
        hash_algorithm: crate::asn1::cades::sha256_algorithm_identifier(),
        issuer_name_hash: OctetString::new(name_hash.as_slice())?,
        issuer_key_hash: OctetString::new(key_hash.as_slice())?,
        serial_number: certificate.tbs_certificate.serial_number.clone(),
    })
}

fn responder_signature_algorithm(key: &PKeyRef<Private>) -> AlgorithmIdentifierOwned {
    match key.id() {
        Id::EC => AlgorithmIdentifierOwned {
            oid: oid::ECDSA_WITH_SHA_256,
            parameters: None,
        },
        _ => AlgorithmIdentifierOwned {
            oid: oid::SHA_256_WITH_RSA_ENCRYPTION,
            parameters: Some(Any::null()),
        },
    }
}

fn generalized_time(unix: Duration) -> KonnektorResult<GeneralizedTime> {
    Ok(GeneralizedTime::from_date_time(DateTime::from_unix_duration(unix)?))
}
