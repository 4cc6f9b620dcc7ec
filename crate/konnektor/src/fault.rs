use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::error::KonnektorError;

/// Uniform failure record in the vocabulary of the simulated device.
///
/// Carries the message id of the failed operation context and the wall
/// clock at construction, nothing else: a real Konnektor never exposes
/// stack traces or internal state to its clients.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct FaultRecord {
    pub message_id: String,
    pub timestamp: DateTime<Utc>,
}

impl FaultRecord {
    /// Pure fault-record construction; every failure path of the
    /// simulator funnels through here so the fault shape stays uniform.
    #[must_use]
    pub fn new(message_id: impl Into<String>) -> Self {
        Self {
            message_id: message_id.into(),
            timestamp: Utc::now(),
        }
    }
}

/// A failed Konnektor operation: the taxonomy entry plus its uniform
/// fault record.
#[derive(Error, Debug)]
#[error("{error} ({})", .record.message_id)]
pub struct Fault {
    pub record: FaultRecord,
    pub error: KonnektorError,
}

impl Fault {
    pub(crate) fn report(message_id: impl Into<String>, error: KonnektorError) -> Self {
        let record = FaultRecord::new(message_id);
        warn!("{}: {error}", record.message_id);
        Self { record, error }
    }
}
