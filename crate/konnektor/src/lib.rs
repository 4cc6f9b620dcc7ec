//! Software Konnektor simulator.
//!
//! Stands in for the PKI-backed gateway device of the telematics
//! infrastructure and the smartcards it controls: callers insert
//! simulated cards, resolve opaque session handles and request CAdES
//! signing, signature verification and CMS envelope encryption against
//! card-bound key material, with failures reported in the fault
//! vocabulary of the real device.

pub use error::{KonnektorError, result::KonnektorResultHelper};
pub use fault::{Fault, FaultRecord};
pub use konnektor::{Konnektor, KonnektorConfig, RevocationPolicy};
pub use operations::{
    DecryptRequest, EncryptRequest, RevocationStatus, SignRequest, SignResponse,
    VerificationResult,
};
pub use revocation::RevocationSource;

pub mod asn1;
mod error;
mod fault;
mod konnektor;
mod operations;
mod revocation;

pub mod reexport {
    pub use soft_konnektor_cards;
}
