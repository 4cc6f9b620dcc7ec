use cms::{
    cert::CertificateChoices,
    content_info::ContentInfo,
    signed_data::{SignedData, SignerIdentifier, SignerInfo},
};
use der::{
    Decode, Encode,
    asn1::{Any, OctetString, SetOfVec},
};
use openssl::{
    hash::MessageDigest,
    rsa::Padding,
    sign::{RsaPssSaltlen, Verifier},
    x509::X509,
};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};
use x509_cert::{Certificate, attr::Attribute};
use x509_parser::prelude::{FromDer, X509Certificate};

use crate::{
    asn1::{
        cades::{RevocationValues, SigningCertificateV2},
        oid,
    },
    error::{KonnektorError, result::KonnektorResult},
    kon_ensure,
    konnektor::{Konnektor, RevocationPolicy},
    operations::{RevocationStatus, VerificationResult},
    revocation,
};

pub(crate) fn verify(
    konnektor: &Konnektor,
    signed_document: &[u8],
) -> KonnektorResult<VerificationResult> {
    let content_info = ContentInfo::from_der(signed_document)
        .map_err(|e| KonnektorError::MalformedSignature(format!("not a CMS structure: {e}")))?;
    kon_ensure!(
        content_info.content_type == oid::ID_SIGNED_DATA,
        KonnektorError::MalformedSignature(format!(
            "expected signed-data, found content type {}",
            content_info.content_type
        ))
    );
    let signed_data = content_info
        .content
        .decode_as::<SignedData>()
        .map_err(|e| KonnektorError::MalformedSignature(format!("broken signed-data: {e}")))?;

    // exactly one signature per document; multi-signature documents are
    // out of scope
    let signers = signed_data.signer_infos.0.as_slice();
    kon_ensure!(
        signers.len() == 1,
        KonnektorError::MalformedSignature(format!(
            "expected exactly one signature, found {}",
            signers.len()
        ))
    );
    let signer_info = &signers[0];

    let econtent = signed_data
        .encap_content_info
        .econtent
        .as_ref()
        .ok_or_else(|| {
            KonnektorError::MalformedSignature("detached signature without content".to_owned())
        })?;
    let document = econtent
        .decode_as::<OctetString>()
        .map_err(|e| KonnektorError::MalformedSignature(format!("broken eContent: {e}")))?
        .as_bytes()
        .to_vec();

    // The signer brings its own certificate; it is trusted for this one
    // verification only.
    let certificate = find_signer_certificate(&signed_data, &signer_info.sid)?;
    let cert_der = certificate.to_der()?;
    let x509 = X509::from_der(&cert_der)?;

    let signed_attrs = signer_info.signed_attrs.as_ref().ok_or_else(|| {
        KonnektorError::MalformedSignature("no signed attributes present".to_owned())
    })?;

    let mut valid = true;

    let document_digest = Sha256::digest(&document);
    match message_digest_attribute(signed_attrs) {
        Some(expected) if expected == document_digest.as_slice() => {}
        _ => {
            debug!("message-digest attribute does not match the content");
            valid = false;
        }
    }

    if let Some(expected) = signing_certificate_hash(signed_attrs) {
        if expected != Sha256::digest(&cert_der).as_slice() {
            debug!("signing-certificate-v2 does not match the embedded certificate");
            valid = false;
        }
    }

    if !signature_verifies(&x509, signer_info, signed_attrs)? {
        debug!("signature value does not verify");
        valid = false;
    }

    let (_, parsed) = X509Certificate::from_der(&cert_der)
        .map_err(|e| KonnektorError::MalformedSignature(format!("broken signer certificate: {e}")))?;
    if !parsed.validity().is_valid() {
        debug!("signer certificate is outside its validity period");
        valid = false;
    }
    let signer_name = parsed
        .subject()
        .iter_common_name()
        .next()
        .and_then(|cn| cn.as_str().ok())
        .map_or_else(|| parsed.subject().to_string(), ToOwned::to_owned);

    let revocation = revocation_status(konnektor, signer_info, &certificate, &x509);
    if konnektor.config().revocation_policy == RevocationPolicy::Strict
        && matches!(
            revocation,
            RevocationStatus::Revoked | RevocationStatus::Unknown | RevocationStatus::Unavailable
        )
    {
        debug!("strict revocation policy: status {revocation:?} invalidates the signature");
        valid = false;
    }

    Ok(VerificationResult {
        valid,
        signer_name,
        document,
        revocation,
    })
}

fn find_signer_certificate(
    signed_data: &SignedData,
    sid: &SignerIdentifier,
) -> KonnektorResult<Certificate> {
    let SignerIdentifier::IssuerAndSerialNumber(ias) = sid else {
        return Err(KonnektorError::MalformedSignature(
            "signer is not identified by issuer and serial".to_owned(),
        ));
    };
    let certificates = signed_data.certificates.as_ref().ok_or_else(|| {
        KonnektorError::MalformedSignature("no certificates embedded".to_owned())
    })?;
    certificates
        .0
        .iter()
        .filter_map(|choice| match choice {
            CertificateChoices::Certificate(certificate) => Some(certificate),
            _ => None,
        })
        .find(|certificate| {
            certificate.tbs_certificate.issuer == ias.issuer
                && certificate.tbs_certificate.serial_number == ias.serial_number
        })
        .cloned()
        .ok_or_else(|| {
            KonnektorError::MalformedSignature("signer certificate not embedded".to_owned())
        })
}

fn message_digest_attribute(signed_attrs: &SetOfVec<Attribute>) -> Option<Vec<u8>> {
    attribute_value(signed_attrs, oid::ID_MESSAGE_DIGEST)
        .and_then(|value| value.decode_as::<OctetString>().ok())
        .map(|octets| octets.as_bytes().to_vec())
}

fn signing_certificate_hash(signed_attrs: &SetOfVec<Attribute>) -> Option<Vec<u8>> {
    attribute_value(signed_attrs, oid::ID_AA_SIGNING_CERTIFICATE_V2)
        .and_then(|value| value.decode_as::<SigningCertificateV2>().ok())
        .and_then(|binding| {
            binding
                .certs
                .first()
                .map(|id| id.cert_hash.as_bytes().to_vec())
        })
}

fn attribute_value<'a>(
    attrs: &'a SetOfVec<Attribute>,
    oid: der::asn1::ObjectIdentifier,
) -> Option<&'a Any> {
    attrs
        .iter()
        .find(|attribute| attribute.oid == oid)
        .and_then(|attribute| attribute.values.iter().next())
}

/// Check the signature value over the DER-encoded signed attributes.
///
/// A cryptographically invalid signature is reported as `false`, never as
/// an error: "the signature is invalid" is an expected outcome.
fn signature_verifies(
    x509: &X509,
    signer_info: &SignerInfo,
    signed_attrs: &SetOfVec<Attribute>,
) -> KonnektorResult<bool> {
    let message = signed_attrs.to_der()?;
    let public_key = x509.public_key()?;
    let algorithm = signer_info.signature_algorithm.oid;

    let mut verifier = Verifier::new(MessageDigest::sha256(), &public_key)?;
    if algorithm == oid::ID_RSASSA_PSS {
        verifier.set_rsa_padding(Padding::PKCS1_PSS)?;
        verifier.set_rsa_pss_saltlen(RsaPssSaltlen::DIGEST_LENGTH)?;
        verifier.set_rsa_mgf1_md(MessageDigest::sha256())?;
    } else if algorithm != oid::RSA_ENCRYPTION
        && algorithm != oid::SHA_256_WITH_RSA_ENCRYPTION
        && algorithm != oid::ECDSA_WITH_SHA_256
    {
        return Err(KonnektorError::MalformedSignature(format!(
            "unsupported signature algorithm {algorithm}"
        )));
    }

    Ok(verifier
        .verify_oneshot(signer_info.signature.as_bytes(), &message)
        .unwrap_or(false))
}

/// OCSP status for the signer certificate: evidence embedded by the
/// signer wins, otherwise the configured revocation source is asked.
/// Failures are recorded, not raised; the policy decides what they mean.
fn revocation_status(
    konnektor: &Konnektor,
    signer_info: &SignerInfo,
    certificate: &Certificate,
    x509: &X509,
) -> RevocationStatus {
    let Some(issuer) = konnektor.trust_anchors().issuer_of(x509) else {
        debug!("signer certificate chains to no trust anchor, skipping OCSP");
        return RevocationStatus::NotChecked;
    };

    if let Some(token) = embedded_token(signer_info) {
        return revocation::token_status(&token, certificate, issuer);
    }

    match revocation::obtain_basic_response(
        &konnektor.config().revocation_source,
        certificate,
        issuer,
        konnektor.config().ocsp_validity,
    ) {
        Ok(token) => revocation::token_status(&token, certificate, issuer),
        Err(e) => {
            warn!("OCSP status unavailable: {e}");
            RevocationStatus::Unavailable
        }
    }
}

fn embedded_token(signer_info: &SignerInfo) -> Option<crate::asn1::ocsp::BasicOcspResponse> {
    signer_info
        .unsigned_attrs
        .as_ref()
        .and_then(|attrs| attribute_value(attrs, oid::ID_AA_ETS_REVOCATION_VALUES))
        .and_then(|value| value.decode_as::<RevocationValues>().ok())
        .and_then(|values| values.ocsp_vals)
        .and_then(|mut tokens| {
            if tokens.is_empty() {
                None
            } else {
                Some(tokens.remove(0))
            }
        })
}
