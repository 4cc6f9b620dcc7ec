#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::sync::Arc;

use chrono::Utc;
use cms::{content_info::ContentInfo, signed_data::SignedData};
use der::{Decode, asn1::ObjectIdentifier};
use soft_konnektor::{
    DecryptRequest, EncryptRequest, Konnektor, KonnektorConfig, KonnektorError, RevocationPolicy,
    RevocationStatus, SignRequest, asn1::cades::RevocationValues,
};
use soft_konnektor_cards::{
    CardFactory, CardHandle, CardOwner, CardSpec, CardType, Cryptosystem, SlotPurpose, Smartcard,
    SmartcardRegistry, TrustAnchors,
};
use x509_parser::prelude::{FromDer, X509Certificate};

const DOCUMENT: &[u8] = b"Rezept 2026-08-08: Ibuprofen 600mg, 1-0-1, 20 Stk.";

struct TestBench {
    konnektor: Konnektor,
    anchors: Arc<TrustAnchors>,
}

fn bench_with(config: KonnektorConfig) -> TestBench {
    soft_konnektor_logger::log_init("info");
    let anchors = Arc::new(TrustAnchors::generate().expect("trust anchors"));
    let registry = Arc::new(SmartcardRegistry::new());
    TestBench {
        konnektor: Konnektor::new(registry, anchors.clone(), config),
        anchors,
    }
}

fn bench() -> TestBench {
    bench_with(KonnektorConfig::default())
}

fn practitioner_card(anchors: &TrustAnchors, cryptosystem: Cryptosystem) -> Smartcard {
    CardFactory::new(anchors)
        .issue(
            CardSpec::new(CardType::Hba, CardOwner::named("Dr. Anna Osterberg"))
                .with_slot(SlotPurpose::QualifiedSignature, cryptosystem),
        )
        .expect("practitioner card")
}

fn institution_card(anchors: &TrustAnchors) -> Smartcard {
    CardFactory::new(anchors)
        .issue(
            CardSpec::new(CardType::SmcB, CardOwner::named("Apotheke am Nordufer"))
                .with_slot(SlotPurpose::OrganizationalSignature, Cryptosystem::Rsa2048)
                .with_slot(SlotPurpose::Encryption, Cryptosystem::Rsa2048)
                .with_slot(SlotPurpose::Authentication, Cryptosystem::Ecc256),
        )
        .expect("institution card")
}

fn sign_request(handle: &CardHandle, cryptosystem: Cryptosystem) -> SignRequest {
    SignRequest {
        card_handle: handle.clone(),
        purpose: SlotPurpose::QualifiedSignature,
        cryptosystem,
        document: DOCUMENT.to_vec(),
        include_revocation_info: false,
    }
}

#[test]
fn test_sign_then_verify_recovers_the_document() {
    let bench = bench();
    for cryptosystem in [
        Cryptosystem::Rsa2048,
        Cryptosystem::RsaPss2048,
        Cryptosystem::Ecc256,
    ] {
        let card = practitioner_card(&bench.anchors, cryptosystem);
        let handle = bench.konnektor.insert_smartcard(card);

        let signed = bench
            .konnektor
            .sign(&sign_request(&handle, cryptosystem))
            .unwrap_or_else(|e| panic!("sign with {cryptosystem}: {e}"));
        let result = bench
            .konnektor
            .verify(&signed.signed_document)
            .unwrap_or_else(|e| panic!("verify with {cryptosystem}: {e}"));

        assert!(result.valid, "{cryptosystem} signature must verify");
        assert_eq!(result.document, DOCUMENT);
        assert_eq!(result.signer_name, "Dr. Anna Osterberg");
        assert_eq!(result.revocation, RevocationStatus::Good);
    }
}

#[test]
fn test_tampered_payload_is_invalid() {
    let bench = bench();
    let handle = bench
        .konnektor
        .insert_smartcard(practitioner_card(&bench.anchors, Cryptosystem::Ecc256));

    let mut signed = bench
        .konnektor
        .sign(&sign_request(&handle, Cryptosystem::Ecc256))
        .expect("sign")
        .signed_document;

    // flip one byte inside the embedded document
    let at = signed
        .windows(DOCUMENT.len())
        .position(|window| window == DOCUMENT)
        .expect("payload embedded in the signed document");
    signed[at + 3] ^= 0x01;

    let result = bench.konnektor.verify(&signed).expect("verify");
    assert!(!result.valid, "tampered payload must not verify");
}

#[test]
fn test_cryptosystem_is_never_substituted() {
    let bench = bench();
    let handle = bench
        .konnektor
        .insert_smartcard(practitioner_card(&bench.anchors, Cryptosystem::Rsa2048));

    // the card only holds an RSA-2048 QES slot
    let fault = bench
        .konnektor
        .sign(&sign_request(&handle, Cryptosystem::Ecc256))
        .unwrap_err();
    assert!(matches!(
        fault.error,
        KonnektorError::CertificateNotFound(_)
    ));

    let signed = bench
        .konnektor
        .sign(&sign_request(&handle, Cryptosystem::Rsa2048))
        .expect("sign");
    let result = bench.konnektor.verify(&signed.signed_document).expect("verify");
    assert!(result.valid);
    assert_eq!(result.document, DOCUMENT);
}

#[test]
fn test_qes_request_on_a_non_qes_card() {
    let bench = bench();
    let handle = bench
        .konnektor
        .insert_smartcard(institution_card(&bench.anchors));

    let fault = bench
        .konnektor
        .sign(&sign_request(&handle, Cryptosystem::Rsa2048))
        .unwrap_err();
    assert!(matches!(
        fault.error,
        KonnektorError::CertificateNotFound(_)
    ));
}

#[test]
fn test_encryption_round_trip() {
    let bench = bench();
    let handle = bench
        .konnektor
        .insert_smartcard(institution_card(&bench.anchors));

    let ciphertext = bench
        .konnektor
        .encrypt(&EncryptRequest {
            card_handle: handle.clone(),
            recipient_certificate: None,
            cryptosystem: Cryptosystem::Rsa2048,
            plaintext: DOCUMENT.to_vec(),
        })
        .expect("encrypt");
    assert_ne!(ciphertext, DOCUMENT);

    let plaintext = bench
        .konnektor
        .decrypt(&DecryptRequest {
            card_handle: handle.clone(),
            ciphertext,
        })
        .expect("decrypt");
    assert_eq!(plaintext, DOCUMENT);
}

#[test]
fn test_encryption_with_an_explicit_recipient_certificate() {
    let bench = bench();
    let recipient_handle = bench
        .konnektor
        .insert_smartcard(institution_card(&bench.anchors));
    let sender_handle = bench
        .konnektor
        .insert_smartcard(institution_card(&bench.anchors));

    let recipient_certificate = bench
        .konnektor
        .read_card_certificate(
            &recipient_handle,
            SlotPurpose::Encryption,
            Cryptosystem::Rsa2048,
        )
        .expect("recipient certificate");

    let ciphertext = bench
        .konnektor
        .encrypt(&EncryptRequest {
            card_handle: sender_handle.clone(),
            recipient_certificate: Some(recipient_certificate),
            cryptosystem: Cryptosystem::Rsa2048,
            plaintext: DOCUMENT.to_vec(),
        })
        .expect("encrypt");

    // only the recipient card can open it
    let plaintext = bench
        .konnektor
        .decrypt(&DecryptRequest {
            card_handle: recipient_handle,
            ciphertext: ciphertext.clone(),
        })
        .expect("decrypt");
    assert_eq!(plaintext, DOCUMENT);

    let fault = bench
        .konnektor
        .decrypt(&DecryptRequest {
            card_handle: sender_handle,
            ciphertext,
        })
        .unwrap_err();
    assert!(matches!(fault.error, KonnektorError::OpenSsl(_)));
}

#[test]
fn test_encryption_rejects_other_cryptosystems() {
    let bench = bench();
    let handle = bench
        .konnektor
        .insert_smartcard(institution_card(&bench.anchors));

    let fault = bench
        .konnektor
        .encrypt(&EncryptRequest {
            card_handle: handle.clone(),
            recipient_certificate: None,
            cryptosystem: Cryptosystem::Ecc256,
            plaintext: DOCUMENT.to_vec(),
        })
        .unwrap_err();
    assert!(matches!(
        fault.error,
        KonnektorError::UnsupportedCryptosystem(_)
    ));

    // distinct failure when the combination is supported but the slot is
    // absent
    let no_enc_slot = bench
        .konnektor
        .insert_smartcard(practitioner_card(&bench.anchors, Cryptosystem::Rsa2048));
    let fault = bench
        .konnektor
        .encrypt(&EncryptRequest {
            card_handle: no_enc_slot,
            recipient_certificate: None,
            cryptosystem: Cryptosystem::Rsa2048,
            plaintext: DOCUMENT.to_vec(),
        })
        .unwrap_err();
    assert!(matches!(
        fault.error,
        KonnektorError::CertificateNotFound(_)
    ));
}

#[test]
fn test_unknown_handles_fault_on_every_operation() {
    let bench = bench();
    let bogus = CardHandle::from("EGK-999");

    let fault = bench
        .konnektor
        .sign(&sign_request(&bogus, Cryptosystem::Rsa2048))
        .unwrap_err();
    assert!(matches!(fault.error, KonnektorError::UnknownCardHandle(_)));
    assert_eq!(fault.record.message_id, "EGK-999");
    assert!(fault.record.timestamp <= Utc::now());

    let fault = bench
        .konnektor
        .encrypt(&EncryptRequest {
            card_handle: bogus.clone(),
            recipient_certificate: None,
            cryptosystem: Cryptosystem::Rsa2048,
            plaintext: DOCUMENT.to_vec(),
        })
        .unwrap_err();
    assert!(matches!(fault.error, KonnektorError::UnknownCardHandle(_)));

    let fault = bench
        .konnektor
        .decrypt(&DecryptRequest {
            card_handle: bogus,
            ciphertext: vec![0x30, 0x00],
        })
        .unwrap_err();
    assert!(matches!(fault.error, KonnektorError::UnknownCardHandle(_)));
}

#[test]
fn test_revocation_info_is_embedded_and_verifies() {
    let bench = bench();
    let handle = bench
        .konnektor
        .insert_smartcard(practitioner_card(&bench.anchors, Cryptosystem::Rsa2048));

    let mut request = sign_request(&handle, Cryptosystem::Rsa2048);
    request.include_revocation_info = true;
    let signed = bench.konnektor.sign(&request).expect("sign").signed_document;

    // the token must sit in the unsigned attributes of the single signer
    let content_info = ContentInfo::from_der(&signed).unwrap();
    let signed_data = content_info.content.decode_as::<SignedData>().unwrap();
    let signer_info = &signed_data.signer_infos.0.as_slice()[0];
    let revocation_values_oid = ObjectIdentifier::new_unwrap("1.2.840.113549.1.9.16.2.24");
    let attribute = signer_info
        .unsigned_attrs
        .as_ref()
        .expect("unsigned attributes")
        .iter()
        .find(|a| a.oid == revocation_values_oid)
        .expect("revocation-values attribute");
    let values = attribute
        .values
        .iter()
        .next()
        .unwrap()
        .decode_as::<RevocationValues>()
        .unwrap();
    assert_eq!(values.ocsp_vals.expect("ocsp values").len(), 1);

    // splicing must not have broken the signature
    let result = bench.konnektor.verify(&signed).expect("verify");
    assert!(result.valid);
    assert_eq!(result.revocation, RevocationStatus::Good);
    assert_eq!(result.document, DOCUMENT);
}

#[test]
fn test_unknown_issuer_fails_qualified_revocation_requests() {
    let bench = bench();
    let foreign = TrustAnchors::generate().expect("foreign anchors");
    let handle = bench
        .konnektor
        .insert_smartcard(practitioner_card(&foreign, Cryptosystem::Rsa2048));

    let mut request = sign_request(&handle, Cryptosystem::Rsa2048);
    request.include_revocation_info = true;
    let fault = bench.konnektor.sign(&request).unwrap_err();
    assert!(matches!(
        fault.error,
        KonnektorError::RevocationSourceUnavailable(_)
    ));
}

#[test]
fn test_unknown_issuer_policy_for_organizational_signatures() {
    let foreign = TrustAnchors::generate().expect("foreign anchors");

    // default policy: requested evidence that cannot be obtained aborts
    // the signature, organizational or not
    let standard = bench();
    let handle = standard
        .konnektor
        .insert_smartcard(institution_card(&foreign));
    let request = SignRequest {
        card_handle: handle,
        purpose: SlotPurpose::OrganizationalSignature,
        cryptosystem: Cryptosystem::Rsa2048,
        document: DOCUMENT.to_vec(),
        include_revocation_info: true,
    };
    let fault = standard.konnektor.sign(&request).unwrap_err();
    assert!(matches!(
        fault.error,
        KonnektorError::RevocationSourceUnavailable(_)
    ));

    // lenient policy: the signature is produced, just without evidence
    let lenient = bench_with(KonnektorConfig {
        revocation_policy: RevocationPolicy::Lenient,
        ..KonnektorConfig::default()
    });
    let handle = lenient
        .konnektor
        .insert_smartcard(institution_card(&foreign));
    let request = SignRequest {
        card_handle: handle,
        ..request
    };
    let signed = lenient.konnektor.sign(&request).expect("lenient sign");
    let result = lenient
        .konnektor
        .verify(&signed.signed_document)
        .expect("verify");
    assert!(result.valid);
    assert_eq!(result.revocation, RevocationStatus::NotChecked);
}

#[test]
fn test_unreachable_responder_is_informational_unless_strict() {
    let source = soft_konnektor::RevocationSource::Responder {
        url: "http://127.0.0.1:1/ocsp".to_owned(),
        timeout: std::time::Duration::from_secs(1),
    };

    let standard = bench_with(KonnektorConfig {
        revocation_source: source.clone(),
        ..KonnektorConfig::default()
    });
    let handle = standard
        .konnektor
        .insert_smartcard(practitioner_card(&standard.anchors, Cryptosystem::Ecc256));
    let signed = standard
        .konnektor
        .sign(&sign_request(&handle, Cryptosystem::Ecc256))
        .expect("sign")
        .signed_document;

    // the status check fails, but it stays informational
    let result = standard.konnektor.verify(&signed).expect("verify");
    assert!(result.valid);
    assert_eq!(result.revocation, RevocationStatus::Unavailable);

    // under the strict policy the same situation invalidates the result
    let strict = bench_with(KonnektorConfig {
        revocation_policy: RevocationPolicy::Strict,
        revocation_source: source,
        ..KonnektorConfig::default()
    });
    let handle = strict
        .konnektor
        .insert_smartcard(practitioner_card(&strict.anchors, Cryptosystem::Ecc256));
    let signed = strict
        .konnektor
        .sign(&sign_request(&handle, Cryptosystem::Ecc256))
        .expect("sign")
        .signed_document;
    let result = strict.konnektor.verify(&signed).expect("verify");
    assert!(!result.valid);
    assert_eq!(result.revocation, RevocationStatus::Unavailable);
}

#[test]
fn test_garbage_input_is_a_malformed_signature_fault() {
    let bench = bench();
    let fault = bench.konnektor.verify(b"not a signature").unwrap_err();
    assert!(matches!(
        fault.error,
        KonnektorError::MalformedSignature(_)
    ));
    assert_eq!(fault.record.message_id, "VerifyDocument");
}

#[test]
fn test_read_card_certificate_exposes_the_subject() {
    let bench = bench();
    let handle = bench
        .konnektor
        .insert_smartcard(institution_card(&bench.anchors));

    let der = bench
        .konnektor
        .read_card_certificate(&handle, SlotPurpose::Authentication, Cryptosystem::Ecc256)
        .expect("certificate");
    let (_, certificate) = X509Certificate::from_der(&der).expect("parseable X.509");
    let common_name = certificate
        .subject()
        .iter_common_name()
        .next()
        .and_then(|cn| cn.as_str().ok())
        .expect("subject CN");
    assert_eq!(common_name, "Apotheke am Nordufer");
}

#[test]
fn test_unimplemented_operations_are_typed_faults() {
    let bench = bench();
    let handle = bench
        .konnektor
        .insert_smartcard(institution_card(&bench.anchors));

    let fault = bench.konnektor.verify_pin(&handle).unwrap_err();
    assert!(matches!(fault.error, KonnektorError::Unsupported(_)));

    let fault = bench.konnektor.external_authenticate(&handle).unwrap_err();
    assert!(matches!(fault.error, KonnektorError::Unsupported(_)));
}
