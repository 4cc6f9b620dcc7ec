use std::{
    collections::HashMap,
    fmt,
    sync::{
        Arc, RwLock,
        atomic::{AtomicU64, Ordering},
    },
};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    Smartcard,
    error::{CardsError, result::CardsResult},
};

/// Opaque session token identifying one inserted smartcard.
///
/// Never persisted; it dies with the simulator process.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
pub struct CardHandle(String);

impl CardHandle {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CardHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CardHandle {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl From<String> for CardHandle {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// In-memory catalogue of inserted smartcards and their session handles.
///
/// The map is write-once-per-insert and read-many. The registry maps
/// handles to cards and nothing else: leaking a handle reveals which card
/// it names, not any key material.
pub struct SmartcardRegistry {
    cards: RwLock<HashMap<CardHandle, Arc<Smartcard>>>,
    insert_counter: AtomicU64,
}

impl SmartcardRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self {
            cards: RwLock::new(HashMap::new()),
            insert_counter: AtomicU64::new(0),
        }
    }

    /// Insert a card, yielding a fresh handle.
    ///
    /// Re-inserting the same card yields a new, independently resolvable
    /// handle, mirroring a physical remove/reinsert.
    pub fn insert(&self, card: Smartcard) -> CardHandle {
        self.insert_shared(Arc::new(card))
    }

    pub fn insert_shared(&self, card: Arc<Smartcard>) -> CardHandle {
        let n = self.insert_counter.fetch_add(1, Ordering::Relaxed) + 1;
        let handle = CardHandle(format!("{}-{n}", card.card_type().handle_prefix()));
        debug!(
            "inserted {} card {} as {handle}",
            card.card_type(),
            card.iccsn()
        );
        self.cards
            .write()
            .expect("card registry lock poisoned")
            .insert(handle.clone(), card);
        handle
    }

    /// Resolve a handle to the card it identifies.
    pub fn resolve(&self, handle: &CardHandle) -> CardsResult<Arc<Smartcard>> {
        self.cards
            .read()
            .expect("card registry lock poisoned")
            .get(handle)
            .cloned()
            .ok_or_else(|| CardsError::UnknownCardHandle(handle.to_string()))
    }
}

impl Default for SmartcardRegistry {
    fn default() -> Self {
        Self::new()
    }
}
