use std::{
    cmp::Ordering,
    collections::HashMap,
    sync::atomic::{AtomicU64, Ordering as AtomicOrdering},
};

use openssl::{
    asn1::{Asn1Integer, Asn1Time},
    bn::BigNum,
    hash::MessageDigest,
    pkey::{PKey, Private},
    x509::{
        X509, X509Builder, X509Name, X509NameBuilder,
        extension::{BasicConstraints, KeyUsage},
    },
};
use tracing::debug;

use crate::{
    CardOwner, CardType, CertificateSlot, Cryptosystem, SlotPurpose, Smartcard, cards_ensure,
    error::result::CardsResult,
};

/// A simulated issuing CA: certificate, private key and trust class.
///
/// The private key stays here on purpose: besides issuing card
/// certificates it signs the OCSP tokens synthesized for them.
pub struct TrustedIssuer {
    pub name: String,
    pub certificate: X509,
    pub private_key: PKey<Private>,
    /// Whether certificates from this CA are of the qualified (QES) class.
    pub qualified: bool,
}

impl TrustedIssuer {
    fn generate(common_name: &str, qualified: bool) -> CardsResult<Self> {
        // CAs are ECC P-256: fast to mint and what current TI CAs use.
        let key = Cryptosystem::Ecc256.generate_keypair()?;
        let name = ca_name(common_name)?;

        let mut builder = X509Builder::new()?;
        builder.set_version(2)?;
        builder.set_subject_name(&name)?;
        builder.set_issuer_name(&name)?;
        builder.set_pubkey(&key)?;
        builder.set_serial_number(random_serial()?.as_ref())?;
        builder.set_not_before(Asn1Time::days_from_now(0)?.as_ref())?;
        builder.set_not_after(Asn1Time::days_from_now(3650)?.as_ref())?;
        builder.append_extension(BasicConstraints::new().critical().ca().build()?)?;
        builder.append_extension(KeyUsage::new().critical().key_cert_sign().crl_sign().build()?)?;
        builder.sign(&key, MessageDigest::sha256())?;

        Ok(Self {
            name: common_name.to_owned(),
            certificate: builder.build(),
            private_key: key,
            qualified,
        })
    }

    /// Whether this CA issued the given certificate: the issuer name must
    /// match and the certificate signature must verify under the CA key.
    #[must_use]
    pub fn issued(&self, certificate: &X509) -> bool {
        matches!(
            certificate
                .issuer_name()
                .try_cmp(self.certificate.subject_name()),
            Ok(Ordering::Equal)
        ) && certificate.verify(&self.private_key).unwrap_or(false)
    }
}

/// The fixed set of issuers the simulator trusts.
pub struct TrustAnchors {
    hba_ca: TrustedIssuer,
    smcb_ca: TrustedIssuer,
    egk_ca: TrustedIssuer,
}

impl TrustAnchors {
    /// Generate a fresh anchor set: one qualified practitioner CA plus the
    /// institution and insurance CAs.
    pub fn generate() -> CardsResult<Self> {
        Ok(Self {
            hba_ca: TrustedIssuer::generate("SOFTKON.HBA-qCA1 TEST-ONLY", true)?,
            smcb_ca: TrustedIssuer::generate("SOFTKON.SMCB-CA1 TEST-ONLY", false)?,
            egk_ca: TrustedIssuer::generate("SOFTKON.EGK-CA1 TEST-ONLY", false)?,
        })
    }

    #[must_use]
    pub fn issuers(&self) -> [&TrustedIssuer; 3] {
        [&self.hba_ca, &self.smcb_ca, &self.egk_ca]
    }

    /// Find the anchor a certificate was issued by.
    #[must_use]
    pub fn issuer_of(&self, certificate: &X509) -> Option<&TrustedIssuer> {
        self.issuers().into_iter().find(|ca| ca.issued(certificate))
    }

    /// The CA that personalizes a slot: qualified purposes always go to the
    /// qualified CA, everything else is issued per card class.
    #[must_use]
    pub fn anchor_for(&self, card_type: CardType, purpose: SlotPurpose) -> &TrustedIssuer {
        if purpose.is_qualified() {
            return &self.hba_ca;
        }
        match card_type {
            CardType::Hba => &self.hba_ca,
            CardType::SmcB => &self.smcb_ca,
            CardType::Egk => &self.egk_ca,
        }
    }
}

/// Description of a card to personalize: class, holder and the slots it
/// should carry.
pub struct CardSpec {
    card_type: CardType,
    owner: CardOwner,
    iccsn: Option<String>,
    slots: Vec<(SlotPurpose, Cryptosystem)>,
}

impl CardSpec {
    #[must_use]
    pub fn new(card_type: CardType, owner: CardOwner) -> Self {
        Self {
            card_type,
            owner,
            iccsn: None,
            slots: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_iccsn(mut self, iccsn: &str) -> Self {
        self.iccsn = Some(iccsn.to_owned());
        self
    }

    #[must_use]
    pub fn with_slot(mut self, purpose: SlotPurpose, cryptosystem: Cryptosystem) -> Self {
        self.slots.push((purpose, cryptosystem));
        self
    }
}

/// Issues simulated cards against an anchor set.
///
/// Building a factory around anchors that are NOT registered with the
/// simulator yields cards whose issuer is unknown, which is exactly what
/// the revocation failure paths need.
pub struct CardFactory<'a> {
    anchors: &'a TrustAnchors,
    iccsn_counter: AtomicU64,
}

impl<'a> CardFactory<'a> {
    #[must_use]
    pub fn new(anchors: &'a TrustAnchors) -> Self {
        Self {
            anchors,
            iccsn_counter: AtomicU64::new(1),
        }
    }

    /// Personalize a card: per slot, generate a keypair of the requested
    /// cryptosystem and have the matching CA sign an end-entity
    /// certificate for it.
    pub fn issue(&self, spec: CardSpec) -> CardsResult<Smartcard> {
        let iccsn = match spec.iccsn {
            Some(iccsn) => {
                cards_ensure!(
                    iccsn.chars().all(|c| c.is_ascii_digit()),
                    "ICCSN must be numeric: {iccsn}"
                );
                iccsn
            }
            None => self.next_iccsn(),
        };

        let mut slots = HashMap::with_capacity(spec.slots.len());
        for (purpose, cryptosystem) in spec.slots {
            let key = cryptosystem.generate_keypair()?;
            let ca = self.anchors.anchor_for(spec.card_type, purpose);
            let certificate =
                issue_end_entity(ca, &spec.owner, spec.card_type, purpose, &key)?;
            debug!(
                "personalized {purpose} ({cryptosystem}) slot for {} card {iccsn}, issuer {}",
                spec.card_type, ca.name
            );
            slots.insert(
                (purpose, cryptosystem),
                CertificateSlot {
                    cryptosystem,
                    certificate,
                    private_key: key,
                },
            );
        }

        Ok(Smartcard::new(spec.card_type, iccsn, spec.owner, slots))
    }

    fn next_iccsn(&self) -> String {
        let n = self.iccsn_counter.fetch_add(1, AtomicOrdering::Relaxed);
        // 20 digits: major industry identifier 80276 (German healthcare),
        // a fixed issuer part, then a running serial.
        format!("80276001{n:012}")
    }
}

fn issue_end_entity(
    ca: &TrustedIssuer,
    owner: &CardOwner,
    card_type: CardType,
    purpose: SlotPurpose,
    key: &PKey<Private>,
) -> CardsResult<X509> {
    let mut builder = X509Builder::new()?;
    builder.set_version(2)?;
    builder.set_subject_name(subject_name(owner, card_type)?.as_ref())?;
    builder.set_issuer_name(ca.certificate.subject_name())?;
    builder.set_pubkey(key)?;
    let serial = random_serial()?;
    builder.set_serial_number(serial.as_ref())?;
    builder.set_not_before(Asn1Time::days_from_now(0)?.as_ref())?;
    builder.set_not_after(Asn1Time::days_from_now(1095)?.as_ref())?;
    builder.append_extension(BasicConstraints::new().build()?)?;

    let mut usage = KeyUsage::new();
    usage.critical();
    match purpose {
        SlotPurpose::Authentication => {
            usage.digital_signature();
        }
        SlotPurpose::QualifiedSignature => {
            usage.non_repudiation();
        }
        SlotPurpose::OrganizationalSignature => {
            usage.digital_signature();
            usage.non_repudiation();
        }
        SlotPurpose::Encryption => {
            usage.key_encipherment();
            usage.data_encipherment();
        }
    }
    builder.append_extension(usage.build()?)?;

    builder.sign(&ca.private_key, MessageDigest::sha256())?;
    Ok(builder.build())
}

fn ca_name(common_name: &str) -> CardsResult<X509Name> {
    let mut builder = X509NameBuilder::new()?;
    builder.append_entry_by_text("C", "DE")?;
    builder.append_entry_by_text("O", "Soft Konnektor NOT-VALID")?;
    builder.append_entry_by_text("CN", common_name)?;
    Ok(builder.build())
}

fn subject_name(owner: &CardOwner, card_type: CardType) -> CardsResult<X509Name> {
    let mut builder = X509NameBuilder::new()?;
    builder.append_entry_by_text("C", "DE")?;
    builder.append_entry_by_text("O", &format!("{card_type} TEST-ONLY"))?;
    if let Some(city) = &owner.city {
        builder.append_entry_by_text("L", city)?;
    }
    builder.append_entry_by_text("CN", &owner.name)?;
    Ok(builder.build())
}

fn random_serial() -> CardsResult<Asn1Integer> {
    let mut bytes = [0_u8; 16];
    openssl::rand::rand_bytes(&mut bytes)?;
    // clear the top bit so the serial stays positive
    bytes[0] &= 0x7f;
    let bn = BigNum::from_slice(&bytes)?;
    Ok(Asn1Integer::from_bn(&bn)?)
}
