use dashmap::DashMap;
use metrics::counter;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio::time::{timeout_at, Instant};
use tracing::warn;
use uuid::Uuid;

use crate::errors::ServiceError;

/// Per-item advisory locks serializing check-then-write booking sections.
///
/// Every operation that reads availability and then writes reservation
/// lines or the physical ledger must hold the locks for all items it
/// touches. Locks are always acquired in sorted ID order so two
/// operations over overlapping item sets cannot deadlock.
#[derive(Debug)]
pub struct ItemLockRegistry {
    locks: DashMap<Uuid, Arc<Mutex<()>>>,
    wait_timeout: Duration,
}

/// Holds the acquired guards; dropping it releases every lock.
#[derive(Debug)]
pub struct ItemLockGuard {
    _guards: Vec<OwnedMutexGuard<()>>,
}

impl ItemLockRegistry {
    pub fn new(wait_timeout: Duration) -> Self {
        Self {
            locks: DashMap::new(),
            wait_timeout,
        }
    }

    /// Acquires the locks for every item in `item_ids` (deduplicated,
    /// sorted). The whole acquisition shares one deadline; exceeding it
    /// yields `Conflict` rather than waiting indefinitely.
    pub async fn lock_items(&self, item_ids: &[Uuid]) -> Result<ItemLockGuard, ServiceError> {
        let mut ids: Vec<Uuid> = item_ids.to_vec();
        ids.sort();
        ids.dedup();

        let deadline = Instant::now() + self.wait_timeout;
        let mut guards = Vec::with_capacity(ids.len());

        for id in ids {
            let lock = self
                .locks
                .entry(id)
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone();

            match timeout_at(deadline, lock.lock_owned()).await {
                Ok(guard) => guards.push(guard),
                Err(_) => {
                    counter!("rentstock_locks.wait_timeouts", 1);
                    warn!(item_id = %id, "timed out waiting for item lock");
                    return Err(ServiceError::Conflict(format!(
                        "timed out waiting for lock on item {}",
                        id
                    )));
                }
            }
        }

        Ok(ItemLockGuard { _guards: guards })
    }
}
