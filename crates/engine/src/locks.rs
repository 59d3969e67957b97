//! Per-wallet locks held for the whole lock + read + write + audit sequence.
//!
//! Every operation acquires the locks of all wallets it touches before opening
//! its transaction, always in ascending wallet-id order, so two transfers in
//! opposite directions cannot deadlock. The guards are released on drop,
//! after commit or rollback.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use uuid::Uuid;

#[derive(Debug, Default)]
pub(crate) struct WalletLocks {
    slots: Mutex<HashMap<Uuid, Arc<AsyncMutex<()>>>>,
}

/// Guards for a set of wallets. Dropping it unlocks them.
#[derive(Debug)]
pub(crate) struct WalletGuard {
    _guards: Vec<OwnedMutexGuard<()>>,
}

impl WalletLocks {
    fn slot(&self, id: Uuid) -> Arc<AsyncMutex<()>> {
        let mut slots = self
            .slots
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        slots.entry(id).or_default().clone()
    }

    /// Locks `ids` in ascending order. Duplicates are locked once.
    pub(crate) async fn acquire(&self, ids: &[Uuid]) -> WalletGuard {
        let mut ordered = ids.to_vec();
        ordered.sort_unstable();
        ordered.dedup();

        let mut guards = Vec::with_capacity(ordered.len());
        for id in ordered {
            guards.push(self.slot(id).lock_owned().await);
        }
        WalletGuard { _guards: guards }
    }
}
