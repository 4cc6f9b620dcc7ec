//! Simulated smartcards for the software Konnektor: card model, test PKI
//! and the session-handle registry.

pub use card::{CardOwner, CardType, CertificateSlot, Smartcard};
pub use cryptosystem::{Cryptosystem, SignatureScheme, SlotPurpose};
pub use error::{CardsError, result::CardsResultHelper};
pub use pki::{CardFactory, CardSpec, TrustAnchors, TrustedIssuer};
pub use registry::{CardHandle, SmartcardRegistry};

mod card;
mod cryptosystem;
mod error;
mod pki;
mod registry;
