use std::collections::HashMap;

use openssl::{
    pkey::{PKey, Private},
    x509::X509,
};
use serde::{Deserialize, Serialize};
use strum_macros::Display;

use crate::{
    Cryptosystem, SlotPurpose,
    error::{CardsError, result::CardsResult},
};

/// The card classes of the simulated telematics infrastructure.
#[derive(Serialize, Deserialize, Display, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CardType {
    /// Insurance card (elektronische Gesundheitskarte).
    #[strum(serialize = "EGK")]
    Egk,
    /// Practitioner card (Heilberufsausweis).
    #[strum(serialize = "HBA")]
    Hba,
    /// Institution card (Security Module Card Typ B).
    #[strum(serialize = "SMC-B")]
    SmcB,
}

impl CardType {
    pub(crate) fn handle_prefix(self) -> &'static str {
        match self {
            Self::Egk => "EGK",
            Self::Hba => "HBA",
            Self::SmcB => "SMC-B",
        }
    }
}

/// Holder metadata personalized into a card.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct CardOwner {
    pub name: String,
    pub street: Option<String>,
    pub city: Option<String>,
    /// KVNR; only meaningful on insurance cards.
    pub insurance_number: Option<String>,
}

impl CardOwner {
    #[must_use]
    pub fn named(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            ..Self::default()
        }
    }
}

/// One certificate slot of a simulated card: the X.509 certificate, the
/// matching private key and the cryptosystem both were generated for.
pub struct CertificateSlot {
    pub cryptosystem: Cryptosystem,
    pub certificate: X509,
    pub private_key: PKey<Private>,
}

/// A simulated smartcard.
///
/// Immutable once built; the registry holds the only owning references,
/// private keys never leave the slot they live in.
pub struct Smartcard {
    card_type: CardType,
    iccsn: String,
    owner: CardOwner,
    slots: HashMap<(SlotPurpose, Cryptosystem), CertificateSlot>,
}

impl Smartcard {
    pub(crate) fn new(
        card_type: CardType,
        iccsn: String,
        owner: CardOwner,
        slots: HashMap<(SlotPurpose, Cryptosystem), CertificateSlot>,
    ) -> Self {
        Self {
            card_type,
            iccsn,
            owner,
            slots,
        }
    }

    #[must_use]
    pub fn card_type(&self) -> CardType {
        self.card_type
    }

    #[must_use]
    pub fn iccsn(&self) -> &str {
        &self.iccsn
    }

    #[must_use]
    pub fn owner(&self) -> &CardOwner {
        &self.owner
    }

    /// Look up the slot for a purpose/cryptosystem pair.
    ///
    /// Absence is an explicit `CertificateNotFound`; the card never
    /// substitutes another slot.
    pub fn slot(
        &self,
        purpose: SlotPurpose,
        cryptosystem: Cryptosystem,
    ) -> CardsResult<&CertificateSlot> {
        self.slots.get(&(purpose, cryptosystem)).ok_or_else(|| {
            CardsError::CertificateNotFound(format!(
                "{} card {} holds no {purpose} slot for {cryptosystem}",
                self.card_type, self.iccsn
            ))
        })
    }
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CardFactory, CardSpec, TrustAnchors};

    #[test]
    fn test_insurance_card_keeps_its_owner_metadata() {
        let anchors = TrustAnchors::generate().unwrap();
        let owner = CardOwner {
            name: "Mia Florentine Funke".to_owned(),
            street: Some("Kastanienallee 71".to_owned()),
            city: Some("Berlin".to_owned()),
            insurance_number: Some("X110465770".to_owned()),
        };
        let card = CardFactory::new(&anchors)
            .issue(
                CardSpec::new(CardType::Egk, owner)
                    .with_iccsn("80276001000000004447")
                    .with_slot(SlotPurpose::Authentication, Cryptosystem::Ecc256),
            )
            .unwrap();

        assert!(card.card_type() == CardType::Egk);
        assert_eq!(card.iccsn(), "80276001000000004447");
        assert_eq!(card.owner().insurance_number.as_deref(), Some("X110465770"));
    }

    #[test]
    fn test_missing_slot_is_certificate_not_found() {
        let anchors = TrustAnchors::generate().unwrap();
        let card = CardFactory::new(&anchors)
            .issue(
                CardSpec::new(CardType::Hba, CardOwner::named("Dr. Theo Lanz"))
                    .with_slot(SlotPurpose::OrganizationalSignature, Cryptosystem::Ecc256),
            )
            .unwrap();

        let err = card
            .slot(SlotPurpose::QualifiedSignature, Cryptosystem::Ecc256)
            .unwrap_err();
        assert!(matches!(err, CardsError::CertificateNotFound(_)));
    }
}
