use cms::{
    cert::*,
    content_info::{CmsVersion, ContentInfo},
    signed_data::*,
};
use der::{
    Decode, Encode,
    asn1::{Any, OctetString, SetOfVec},
};
use openssl::sign::Signer;
use sha2::{Digest, Sha256};
use soft_konnektor_cards::CertificateSlot;
use tracing::{debug, warn};
use x509_cert::{Certificate, attr::Attribute};

use crate::{
    asn1::{cades, oid},
    error::{KonnektorError, result::KonnektorResult},
    kon_bail,
    konnektor::{Konnektor, RevocationPolicy},
    operations::{SignRequest, SignResponse},
    revocation,
};

pub(crate) fn sign(konnektor: &Konnektor, request: &SignRequest) -> KonnektorResult<SignResponse> {
    let card = konnektor.registry().resolve(&request.card_handle)?;
    let slot = card.slot(request.purpose, request.cryptosystem)?;
    debug!(
        "signing {} bytes with the {} ({}) slot of card {}",
        request.document.len(),
        request.purpose,
        request.cryptosystem,
        card.iccsn()
    );

    let cert_der = slot.certificate.to_der()?;
    let certificate = Certificate::from_der(&cert_der)?;

    let encap_content_info = EncapsulatedContentInfo {
        econtent_type: oid::ID_DATA,
        econtent: Some(Any::encode_from(&OctetString::new(
            request.document.as_slice(),
        )?)?),
    };

    let document_digest = Sha256::digest(&request.document);
    debug!("document digest {}", hex::encode(document_digest.as_slice()));
    let signed_attrs = cades::signed_attributes(&document_digest, &cert_der)?;
    let signature = sign_attributes(slot, &signed_attrs)?;

    let signer_info = SignerInfo {
        version: CmsVersion::V1,
        sid: SignerIdentifier::IssuerAndSerialNumber(IssuerAndSerialNumber {
            issuer: certificate.tbs_certificate.issuer.clone(),
            serial_number: certificate.tbs_certificate.serial_number.clone(),
        }),
        digest_alg: cades::sha256_algorithm_identifier(),
        signed_attrs: Some(signed_attrs),
        signature_algorithm: cades::signature_algorithm_identifier(request.cryptosystem)?,
        signature: OctetString::new(signature)?,
        unsigned_attrs: None,
    };

    let mut digest_algorithms = SetOfVec::new();
    digest_algorithms.insert(cades::sha256_algorithm_identifier())?;
    let mut certificates = SetOfVec::new();
    certificates.insert(CertificateChoices::Certificate(certificate.clone()))?;
    let mut signer_infos = SetOfVec::new();
    signer_infos.insert(signer_info)?;

    let signed_data = SignedData {
        version: CmsVersion::V1,
        digest_algorithms,
        encap_content_info,
        certificates: Some(CertificateSet(certificates)),
        crls: None,
        signer_infos: SignerInfos(signer_infos),
    };

    let mut document = ContentInfo {
        content_type: oid::ID_SIGNED_DATA,
        content: Any::encode_from(&signed_data)?,
    };

    if request.include_revocation_info {
        document = embed_revocation_values(konnektor, request, slot, &certificate, document)?;
    }

    Ok(SignResponse {
        signed_document: document.to_der()?,
    })
}

/// Sign the DER of the signed attribute set (its `SET OF` form, per
/// RFC 5652) with the slot key, using the scheme the slot's cryptosystem
/// maps to.
fn sign_attributes(
    slot: &CertificateSlot,
    signed_attrs: &SetOfVec<Attribute>,
) -> KonnektorResult<Vec<u8>> {
    let message = signed_attrs.to_der()?;
    let scheme = slot.cryptosystem.signature_scheme();

    let mut signer = Signer::new(scheme.digest, &slot.private_key)?;
    if let Some(padding) = scheme.rsa_padding {
        signer.set_rsa_padding(padding)?;
    }
    if let Some(salt_len) = scheme.pss_salt_len {
        signer.set_rsa_pss_saltlen(salt_len)?;
        signer.set_rsa_mgf1_md(scheme.digest)?;
    }
    Ok(signer.sign_oneshot_to_vec(&message)?)
}

/// Obtain an OCSP token for the signer certificate and splice it into the
/// unsigned attributes, leaving the signature value untouched.
///
/// An unknown issuer always fails qualified signatures; for other
/// certificate classes the revocation policy decides between failing and
/// proceeding without evidence.
fn embed_revocation_values(
    konnektor: &Konnektor,
    request: &SignRequest,
    slot: &CertificateSlot,
    certificate: &Certificate,
    document: ContentInfo,
) -> KonnektorResult<ContentInfo> {
    let Some(issuer) = konnektor.trust_anchors().issuer_of(&slot.certificate) else {
        let may_skip = konnektor.config().revocation_policy == RevocationPolicy::Lenient
            && !request.purpose.is_qualified();
        if !may_skip {
            kon_bail!(KonnektorError::RevocationSourceUnavailable(format!(
                "issuer of the {} certificate of card handle {} is not a trusted issuer",
                request.purpose, request.card_handle
            )));
        }
        warn!(
            "issuer of the non-qualified {} certificate is unknown, signing without revocation info",
            request.purpose
        );
        return Ok(document);
    };

    let token = revocation::obtain_basic_response(
        &konnektor.config().revocation_source,
        certificate,
        issuer,
        konnektor.config().ocsp_validity,
    )?;
    cades::splice_revocation_values(document, token)
}
