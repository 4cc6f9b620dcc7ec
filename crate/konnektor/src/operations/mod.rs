use soft_konnektor_cards::{CardHandle, Cryptosystem, SlotPurpose};

pub(crate) mod encrypt;
pub(crate) mod sign;
pub(crate) mod verify;

/// Request for a card-bound CAdES signature.
#[derive(Debug, Clone)]
pub struct SignRequest {
    pub card_handle: CardHandle,
    pub purpose: SlotPurpose,
    pub cryptosystem: Cryptosystem,
    pub document: Vec<u8>,
    /// Embed an OCSP token for the signer certificate into the signature.
    pub include_revocation_info: bool,
}

#[derive(Debug, Clone)]
pub struct SignResponse {
    /// DER of the enveloping CMS signed-data structure.
    pub signed_document: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct EncryptRequest {
    pub card_handle: CardHandle,
    /// DER recipient certificate; when absent, the handle's own
    /// encryption slot is the recipient.
    pub recipient_certificate: Option<Vec<u8>>,
    pub cryptosystem: Cryptosystem,
    pub plaintext: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct DecryptRequest {
    pub card_handle: CardHandle,
    pub ciphertext: Vec<u8>,
}

/// Outcome of signature verification.
///
/// `document` carries the recovered eContent and is only meaningful when
/// `valid` is true. An invalid signature is a normal result, not a fault.
#[derive(Debug, Clone)]
pub struct VerificationResult {
    pub valid: bool,
    pub signer_name: String,
    pub document: Vec<u8>,
    pub revocation: RevocationStatus,
}

/// OCSP outcome recorded during verification. Informational under the
/// lenient revocation policy; counted against validity under the strict
/// one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevocationStatus {
    Good,
    Revoked,
    Unknown,
    Unavailable,
    /// The signer certificate does not chain to a trust anchor, so there
    /// was nothing to ask.
    NotChecked,
}
