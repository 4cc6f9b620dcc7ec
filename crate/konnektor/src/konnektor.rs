use std::{sync::Arc, time::Duration};

use serde::{Deserialize, Serialize};
use soft_konnektor_cards::{
    CardHandle, Cryptosystem, SlotPurpose, Smartcard, SmartcardRegistry, TrustAnchors,
};

use crate::{
    error::{KonnektorError, result::KonnektorResult},
    fault::Fault,
    operations::{
        self, DecryptRequest, EncryptRequest, SignRequest, SignResponse, VerificationResult,
    },
    revocation::RevocationSource,
};

/// How strictly missing revocation evidence is treated.
///
/// The real device logs and proceeds in some of these situations;
/// whether that is intentional leniency or a gap is a policy question,
/// so it is configuration here rather than hard-coded behaviour.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RevocationPolicy {
    /// Requested evidence that cannot be obtained is skipped with a
    /// warning for non-qualified certificates; verification validity
    /// ignores the OCSP status entirely.
    Lenient,
    /// Requested evidence that cannot be obtained aborts signing for
    /// every certificate class; verification records the OCSP status
    /// without letting it flip validity.
    #[default]
    Standard,
    /// Like `Standard` for signing; additionally a revoked, unknown or
    /// unavailable OCSP status invalidates verification.
    Strict,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct KonnektorConfig {
    pub revocation_policy: RevocationPolicy,
    pub revocation_source: RevocationSource,
    /// Validity window stamped into synthesized OCSP tokens.
    pub ocsp_validity: Duration,
}

impl Default for KonnektorConfig {
    fn default() -> Self {
        Self {
            revocation_policy: RevocationPolicy::default(),
            revocation_source: RevocationSource::default(),
            ocsp_validity: Duration::from_secs(24 * 60 * 60),
        }
    }
}

/// The simulated Konnektor: card terminal plus signing, verification and
/// encryption services sharing one registry and one trust-anchor set.
///
/// Every operation is a synchronous call on the caller's thread; the
/// struct holds no mutable state of its own, so concurrent use needs no
/// coordination.
pub struct Konnektor {
    registry: Arc<SmartcardRegistry>,
    trust_anchors: Arc<TrustAnchors>,
    config: KonnektorConfig,
}

impl Konnektor {
    #[must_use]
    pub fn new(
        registry: Arc<SmartcardRegistry>,
        trust_anchors: Arc<TrustAnchors>,
        config: KonnektorConfig,
    ) -> Self {
        Self {
            registry,
            trust_anchors,
            config,
        }
    }

    pub(crate) fn registry(&self) -> &SmartcardRegistry {
        &self.registry
    }

    pub(crate) fn trust_anchors(&self) -> &TrustAnchors {
        &self.trust_anchors
    }

    pub(crate) fn config(&self) -> &KonnektorConfig {
        &self.config
    }

    /// Insert a smartcard, yielding the session handle for all further
    /// operations on it.
    pub fn insert_smartcard(&self, card: Smartcard) -> CardHandle {
        self.registry.insert(card)
    }

    /// Read a certificate from an inserted card as DER.
    pub fn read_card_certificate(
        &self,
        card_handle: &CardHandle,
        purpose: SlotPurpose,
        cryptosystem: Cryptosystem,
    ) -> Result<Vec<u8>, Fault> {
        self.read_card_certificate_inner(card_handle, purpose, cryptosystem)
            .map_err(|e| Fault::report(card_handle.as_str(), e))
    }

    fn read_card_certificate_inner(
        &self,
        card_handle: &CardHandle,
        purpose: SlotPurpose,
        cryptosystem: Cryptosystem,
    ) -> KonnektorResult<Vec<u8>> {
        let card = self.registry.resolve(card_handle)?;
        let slot = card.slot(purpose, cryptosystem)?;
        Ok(slot.certificate.to_der()?)
    }

    /// Produce a CAdES enveloping signature with a card-bound key.
    pub fn sign(&self, request: &SignRequest) -> Result<SignResponse, Fault> {
        operations::sign::sign(self, request)
            .map_err(|e| Fault::report(request.card_handle.as_str(), e))
    }

    /// Validate a signed document and recover its content.
    pub fn verify(&self, signed_document: &[u8]) -> Result<VerificationResult, Fault> {
        operations::verify::verify(self, signed_document)
            .map_err(|e| Fault::report("VerifyDocument", e))
    }

    /// Encrypt a document for a recipient certificate.
    pub fn encrypt(&self, request: &EncryptRequest) -> Result<Vec<u8>, Fault> {
        operations::encrypt::encrypt(self, request)
            .map_err(|e| Fault::report(request.card_handle.as_str(), e))
    }

    /// Decrypt a document with the card's encryption key.
    pub fn decrypt(&self, request: &DecryptRequest) -> Result<Vec<u8>, Fault> {
        operations::encrypt::decrypt(self, request)
            .map_err(|e| Fault::report(request.card_handle.as_str(), e))
    }

    /// PIN verification needs a card terminal; the simulator has none.
    pub fn verify_pin(&self, card_handle: &CardHandle) -> Result<(), Fault> {
        Err(Fault::report(
            card_handle.as_str(),
            KonnektorError::Unsupported("VerifyPin".to_owned()),
        ))
    }

    /// Card-to-card authentication is deliberately not implemented.
    pub fn external_authenticate(&self, card_handle: &CardHandle) -> Result<Vec<u8>, Fault> {
        Err(Fault::report(
            card_handle.as_str(),
            KonnektorError::Unsupported("ExternalAuthenticate".to_owned()),
        ))
    }
}
