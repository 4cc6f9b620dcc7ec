//! CAdES-BES attribute values (RFC 5126 / RFC 5035) and the unsigned
//! attribute surgery for revocation evidence.

use cms::{
    content_info::ContentInfo,
    signed_data::{SignedData, SignerInfos},
};
use der::{
    Decode, Sequence,
    asn1::{Any, ObjectIdentifier, OctetString, SetOfVec, UtcTime},
};
use sha2::{Digest, Sha256};
use x509_cert::{attr::Attribute, spki::AlgorithmIdentifierOwned};

use crate::{
    asn1::{ocsp::BasicOcspResponse, oid, unix_now},
    error::{KonnektorError, result::KonnektorResult},
    kon_ensure,
};

/// ESS signing-certificate-v2: binds the signer certificate to the signed
/// attributes via its SHA-256 hash. The `hashAlgorithm` field is omitted,
/// which means SHA-256 per RFC 5035.
#[derive(Sequence, Debug, Clone)]
pub struct SigningCertificateV2 {
    pub certs: Vec<EssCertIdV2>,
}

#[derive(Sequence, Debug, Clone)]
pub struct EssCertIdV2 {
    #[asn1(optional = "true")]
    pub hash_algorithm: Option<AlgorithmIdentifierOwned>,
    pub cert_hash: OctetString,
}

/// CAdES revocation-values unsigned attribute, OCSP arm only. The CRL arm
/// is never produced by the simulator.
#[derive(Sequence, Debug, Clone)]
pub struct RevocationValues {
    #[asn1(context_specific = "1", tag_mode = "EXPLICIT", optional = "true")]
    pub ocsp_vals: Option<Vec<BasicOcspResponse>>,
}

pub(crate) fn sha256_algorithm_identifier() -> AlgorithmIdentifierOwned {
    AlgorithmIdentifierOwned {
        oid: oid::ID_SHA_256,
        parameters: None,
    }
}

/// RSASSA-PSS-params for SHA-256, MGF1 with SHA-256 and a 32 byte salt
/// (RFC 4055):
///
/// ```text
/// SEQUENCE {
///   [0] { SEQUENCE { OID sha256, NULL } }
///   [1] { SEQUENCE { OID mgf1, SEQUENCE { OID sha256, NULL } } }
///   [2] { INTEGER 32 }
/// }
/// ```
const RSA_PSS_SHA256_PARAMS: &[u8] = &[
    0x30, 0x34, 0xa0, 0x0f, 0x30, 0x0d, 0x06, 0x09, 0x60, 0x86, 0x48, 0x01, 0x65, 0x03, 0x04,
    0x02, 0x01, 0x05, 0x00, 0xa1, 0x1c, 0x30, 0x1a, 0x06, 0x09, 0x2a, 0x86, 0x48, 0x86, 0xf7,
    0x0d, 0x01, 0x01, 0x08, 0x30, 0x0d, 0x06, 0x09, 0x60, 0x86, 0x48, 0x01, 0x65, 0x03, 0x04,
    0x02, 0x01, 0x05, 0x00, 0xa2, 0x03, 0x02, 0x01, 0x20,
];

/// The SignerInfo signature algorithm identifier for a cryptosystem.
pub(crate) fn signature_algorithm_identifier(
    cryptosystem: soft_konnektor_cards::Cryptosystem,
) -> KonnektorResult<AlgorithmIdentifierOwned> {
    use soft_konnektor_cards::Cryptosystem;
    Ok(match cryptosystem {
        Cryptosystem::Rsa2048 => AlgorithmIdentifierOwned {
            oid: oid::RSA_ENCRYPTION,
            parameters: Some(Any::null()),
        },
        Cryptosystem::RsaPss2048 => AlgorithmIdentifierOwned {
            oid: oid::ID_RSASSA_PSS,
            parameters: Some(Any::from_der(RSA_PSS_SHA256_PARAMS)?),
        },
        Cryptosystem::Ecc256 => AlgorithmIdentifierOwned {
            oid: oid::ECDSA_WITH_SHA_256,
            parameters: None,
        },
    })
}

fn attribute(oid: ObjectIdentifier, value: Any) -> KonnektorResult<Attribute> {
    let mut values = SetOfVec::new();
    values.insert(value)?;
    Ok(Attribute { oid, values })
}

/// The CAdES-BES signed attribute set for a document digest and signer
/// certificate: content-type, message-digest, signing-time and
/// signing-certificate-v2.
pub(crate) fn signed_attributes(
    document_digest: &[u8],
    signer_certificate_der: &[u8],
) -> KonnektorResult<SetOfVec<Attribute>> {
    let signing_time = UtcTime::from_unix_duration(unix_now()?)?;
    let certificate_binding = SigningCertificateV2 {
        certs: vec![EssCertIdV2 {
            hash_algorithm: None,
            cert_hash: OctetString::new(Sha256::digest(signer_certificate_der).as_slice())?,
        }],
    };

    let mut attrs = SetOfVec::new();
    attrs.insert(attribute(
        oid::ID_CONTENT_TYPE,
        Any::encode_from(&oid::ID_DATA)?,
    )?)?;
    attrs.insert(attribute(
        oid::ID_MESSAGE_DIGEST,
        Any::encode_from(&OctetString::new(document_digest)?)?,
    )?)?;
    attrs.insert(attribute(
        oid::ID_SIGNING_TIME,
        Any::encode_from(&signing_time)?,
    )?)?;
    attrs.insert(attribute(
        oid::ID_AA_SIGNING_CERTIFICATE_V2,
        Any::encode_from(&certificate_binding)?,
    )?)?;
    Ok(attrs)
}

/// Attach an `id-aa-ets-revocationValues` unsigned attribute carrying the
/// OCSP token to the single signer of an already-signed document.
///
/// Unsigned attributes are outside the signed byte range, so the existing
/// signature value is untouched.
pub(crate) fn splice_revocation_values(
    document: ContentInfo,
    token: BasicOcspResponse,
) -> KonnektorResult<ContentInfo> {
    kon_ensure!(
        document.content_type == oid::ID_SIGNED_DATA,
        KonnektorError::MalformedSignature("not a signed-data structure".to_owned())
    );
    let mut signed_data = document.content.decode_as::<SignedData>()?;

    let mut signers = signed_data.signer_infos.0.into_vec();
    kon_ensure!(
        signers.len() == 1,
        KonnektorError::MalformedSignature(format!(
            "expected exactly one signer, found {}",
            signers.len()
        ))
    );
    let mut signer = signers.remove(0);

    let values = RevocationValues {
        ocsp_vals: Some(vec![token]),
    };
    let mut unsigned = signer.unsigned_attrs.take().unwrap_or_default();
    unsigned.insert(attribute(
        oid::ID_AA_ETS_REVOCATION_VALUES,
        Any::encode_from(&values)?,
    )?)?;
    signer.unsigned_attrs = Some(unsigned);

    let mut signer_infos = SetOfVec::new();
    signer_infos.insert(signer)?;
    signed_data.signer_infos = SignerInfos(signer_infos);

    Ok(ContentInfo {
        content_type: oid::ID_SIGNED_DATA,
        content: Any::encode_from(&signed_data)?,
    })
}
