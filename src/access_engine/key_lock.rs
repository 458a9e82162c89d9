//! Per-key mutual exclusion
//!
//! Flows touching the same tag or plate are serialized; flows on different
//! keys never wait on each other. Entries are dropped once no flow holds or
//! awaits them.

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Lock key for an RFID tag
pub fn tag_key(rfid_tag: &str) -> String {
    format!("tag:{}", rfid_tag)
}

/// Lock key for a normalized plate
pub fn plate_key(plate: &str) -> String {
    format!("plate:{}", plate)
}

/// Held lock on one key
pub struct KeyGuard {
    _guard: OwnedMutexGuard<()>,
}

/// Table of per-key async mutexes
#[derive(Default)]
pub struct KeyedLocks {
    table: Mutex<HashMap<String, Weak<Mutex<()>>>>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive ownership of `key`
    pub async fn lock(&self, key: &str) -> KeyGuard {
        let mutex = {
            let mut table = self.table.lock().await;
            table.retain(|_, slot| slot.strong_count() > 0);

            match table.get(key).and_then(Weak::upgrade) {
                Some(existing) => existing,
                None => {
                    let created = Arc::new(Mutex::new(()));
                    table.insert(key.to_string(), Arc::downgrade(&created));
                    created
                }
            }
        };

        KeyGuard {
            _guard: mutex.lock_owned().await,
        }
    }

    #[cfg(test)]
    async fn live_keys(&self) -> usize {
        let table = self.table.lock().await;
        table.values().filter(|slot| slot.strong_count() > 0).count()
    }
}
