//! Per-owner storage bookkeeping.

use super::models::{OwnerId, StorageUsage};
use super::store::LibraryStore;
use anyhow::{anyhow, Result};
use std::sync::Arc;
use tracing::debug;

/// Tracks how much space each owner consumes against their quota.
///
/// Charges are additive only. Space is given back by the track deletion flow,
/// never by ingestion.
#[derive(Clone)]
pub struct StorageAccountant {
    store: Arc<dyn LibraryStore>,
    default_quota_mb: f64,
}

impl StorageAccountant {
    pub fn new(store: Arc<dyn LibraryStore>, default_quota_mb: f64) -> Self {
        Self {
            store,
            default_quota_mb,
        }
    }

    /// Make sure the owner has a ledger row, created with the default quota.
    pub fn ensure_owner(&self, owner: OwnerId) -> Result<()> {
        self.store.ensure_owner(owner, self.default_quota_mb)
    }

    pub fn usage(&self, owner: OwnerId) -> Result<StorageUsage> {
        self.store
            .get_storage_usage(owner)?
            .ok_or_else(|| anyhow!("No storage ledger for owner {}", owner))
    }

    /// Whether adding `delta_mb` would push the owner over quota.
    pub fn would_exceed(&self, owner: OwnerId, delta_mb: f64) -> Result<bool> {
        Ok(self.usage(owner)?.would_exceed(delta_mb))
    }

    pub fn charge(&self, owner: OwnerId, delta_mb: f64) -> Result<()> {
        self.store.add_storage_used(owner, delta_mb)?;
        debug!("Charged owner {} {:.2} MB", owner, delta_mb);
        Ok(())
    }

    /// Charge only if the owner stays within quota. The check and the
    /// increment are a single statement, so concurrent charges cannot
    /// overshoot.
    pub fn charge_within_quota(&self, owner: OwnerId, delta_mb: f64) -> Result<bool> {
        let charged = self.store.add_storage_used_within_quota(owner, delta_mb)?;
        if charged {
            debug!("Charged owner {} {:.2} MB", owner, delta_mb);
        } else {
            debug!(
                "Refused to charge owner {} {:.2} MB: quota exceeded",
                owner, delta_mb
            );
        }
        Ok(charged)
    }
}
