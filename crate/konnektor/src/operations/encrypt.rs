use openssl::{
    cms::{CMSOptions, CmsContentInfo},
    stack::Stack,
    symm::Cipher,
    x509::X509,
};
use soft_konnektor_cards::{Cryptosystem, SlotPurpose};
use tracing::{debug, warn};

use crate::{
    error::{KonnektorError, result::KonnektorResult},
    kon_bail,
    konnektor::Konnektor,
    operations::{DecryptRequest, EncryptRequest},
};

/// CMS envelope encryption against the recipient certificate.
///
/// Only RSA-2048 key transport is implemented; any other requested
/// cryptosystem is rejected before the slot is even looked up, so callers
/// can tell "unsupported combination" from "wrong key" and from "no such
/// slot".
pub(crate) fn encrypt(konnektor: &Konnektor, request: &EncryptRequest) -> KonnektorResult<Vec<u8>> {
    if request.cryptosystem != Cryptosystem::Rsa2048 {
        kon_bail!(KonnektorError::UnsupportedCryptosystem(format!(
            "document encryption is only implemented for {}, not {}",
            Cryptosystem::Rsa2048,
            request.cryptosystem
        )));
    }

    let card = konnektor.registry().resolve(&request.card_handle)?;
    let recipient = match &request.recipient_certificate {
        Some(der) => X509::from_der(der)
            .map_err(|e| KonnektorError::Certificate(format!("broken recipient certificate: {e}")))?,
        None => card
            .slot(SlotPurpose::Encryption, Cryptosystem::Rsa2048)?
            .certificate
            .clone(),
    };
    debug!(
        "encrypting {} bytes for recipient {:?}",
        request.plaintext.len(),
        recipient.subject_name()
    );

    let mut recipients = Stack::new()?;
    recipients.push(recipient)?;

    let flags = CMSOptions::BINARY;
    let envelope = CmsContentInfo::encrypt(
        &recipients,
        &request.plaintext,
        Cipher::aes_256_gcm(),
        flags,
    )
    .or_else(|e| {
        // pre-3.2 OpenSSL cannot build AuthEnvelopedData
        warn!("AES-256-GCM authenticated envelope unavailable ({e}), falling back to AES-256-CBC");
        CmsContentInfo::encrypt(&recipients, &request.plaintext, Cipher::aes_256_cbc(), flags)
    })?;
    Ok(envelope.to_der()?)
}

/// Decrypt a CMS envelope with the card's encryption slot.
pub(crate) fn decrypt(konnektor: &Konnektor, request: &DecryptRequest) -> KonnektorResult<Vec<u8>> {
    let card = konnektor.registry().resolve(&request.card_handle)?;
    let slot = card.slot(SlotPurpose::Encryption, Cryptosystem::Rsa2048)?;

    let envelope = CmsContentInfo::from_der(&request.ciphertext)
        .map_err(|e| KonnektorError::Encoding(format!("not a CMS envelope: {e}")))?;
    Ok(envelope.decrypt(&slot.private_key, &slot.certificate)?)
}
