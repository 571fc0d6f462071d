use std::sync::Arc;

use anyhow::{Context, Result};
use keyring::Entry;
use tracing::debug;

use super::storage::{SlotStorage, SlotWrite, StoredSlot};
use crate::clock::Clock;

const SERVICE_NAME: &str = "sessionkit";

/// Slots stored in the OS keychain, one keychain entry per slot.
///
/// Each entry holds the slot value and its expiry as JSON. Batches are
/// applied entry by entry; the keychain offers no multi-entry transaction.
pub struct KeyringStorage {
    service: String,
    clock: Arc<dyn Clock>,
}

impl KeyringStorage {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self::with_service(SERVICE_NAME, clock)
    }

    /// Use a custom keychain service name (one per API profile)
    pub fn with_service(service: impl Into<String>, clock: Arc<dyn Clock>) -> Self {
        Self {
            service: service.into(),
            clock,
        }
    }

    fn entry(&self, key: &str) -> Result<Entry> {
        Entry::new(&self.service, key).context("Failed to create keyring entry")
    }
}

impl SlotStorage for KeyringStorage {
    fn get(&self, key: &str) -> Option<String> {
        let raw = self.entry(key).ok()?.get_password().ok()?;
        let slot: StoredSlot = serde_json::from_str(&raw).ok()?;
        slot.is_live(self.clock.now()).then_some(slot.value)
    }

    fn apply(&self, writes: &[SlotWrite]) -> Result<()> {
        let now = self.clock.now();
        for write in writes {
            let entry = self.entry(write.key())?;
            match write {
                SlotWrite::Set { value, max_age, .. } => {
                    let slot = StoredSlot::new(value.clone(), *max_age, now);
                    let raw = serde_json::to_string(&slot)?;
                    entry
                        .set_password(&raw)
                        .context("Failed to store credential in keychain")?;
                }
                SlotWrite::Remove { key } => match entry.delete_credential() {
                    Ok(()) => {}
                    Err(keyring::Error::NoEntry) => {
                        debug!(slot = key, "Keychain slot already absent");
                    }
                    Err(e) => {
                        return Err(e).context("Failed to delete credential from keychain");
                    }
                },
            }
        }
        Ok(())
    }
}
