use openssl::{
    ec::{EcGroup, EcKey},
    hash::MessageDigest,
    nid::Nid,
    pkey::{PKey, Private},
    rsa::{Padding, Rsa},
    sign::RsaPssSaltlen,
};
use serde::{Deserialize, Serialize};
use strum_macros::Display;

use crate::error::result::CardsResult;

/// Cryptosystem families a simulated smartcard can hold key material for.
///
/// The set is closed: healthcare cards expose RSA-2048 (PKCS#1 v1.5),
/// RSA-PSS-2048 and 256-bit ECC slots, nothing else.
#[derive(Serialize, Deserialize, Display, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Cryptosystem {
    #[strum(serialize = "RSA-2048")]
    Rsa2048,
    #[strum(serialize = "RSA-PSS-2048")]
    RsaPss2048,
    #[strum(serialize = "ECC-256")]
    Ecc256,
}

/// Parameters of the signature scheme a cryptosystem maps to.
pub struct SignatureScheme {
    pub digest: MessageDigest,
    pub rsa_padding: Option<Padding>,
    pub pss_salt_len: Option<RsaPssSaltlen>,
}

impl Cryptosystem {
    /// The signature scheme used for card-bound signatures with this
    /// cryptosystem. Derived from the slot alone, never from the document
    /// being signed.
    #[must_use]
    pub fn signature_scheme(self) -> SignatureScheme {
        match self {
            Self::Rsa2048 => SignatureScheme {
                digest: MessageDigest::sha256(),
                rsa_padding: Some(Padding::PKCS1),
                pss_salt_len: None,
            },
            Self::RsaPss2048 => SignatureScheme {
                digest: MessageDigest::sha256(),
                rsa_padding: Some(Padding::PKCS1_PSS),
                pss_salt_len: Some(RsaPssSaltlen::DIGEST_LENGTH),
            },
            Self::Ecc256 => SignatureScheme {
                digest: MessageDigest::sha256(),
                rsa_padding: None,
                pss_salt_len: None,
            },
        }
    }

    /// Generate a fresh keypair of this family.
    pub fn generate_keypair(self) -> CardsResult<PKey<Private>> {
        match self {
            Self::Rsa2048 | Self::RsaPss2048 => {
                let rsa = Rsa::generate(2048)?;
                Ok(PKey::from_rsa(rsa)?)
            }
            Self::Ecc256 => {
                let group = EcGroup::from_curve_name(Nid::X9_62_PRIME256V1)?;
                let ec_key = EcKey::generate(&group)?;
                Ok(PKey::from_ec_key(ec_key)?)
            }
        }
    }
}

/// Certificate purposes a card can expose slots for.
#[derive(Serialize, Deserialize, Display, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SlotPurpose {
    #[strum(serialize = "C.AUT")]
    Authentication,
    #[strum(serialize = "C.QES")]
    QualifiedSignature,
    #[strum(serialize = "C.OSIG")]
    OrganizationalSignature,
    #[strum(serialize = "C.ENC")]
    Encryption,
}

impl SlotPurpose {
    /// Qualified signatures are person-bound and legally binding;
    /// everything else is organizational or technical.
    #[must_use]
    pub fn is_qualified(self) -> bool {
        matches!(self, Self::QualifiedSignature)
    }
}
