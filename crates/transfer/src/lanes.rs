//! Per-upload serialization.
//!
//! Each upload identifier gets a [`Lane`]. Chunk writers hold the lane's
//! shared guard, so chunks of one upload are written in parallel; the
//! completeness check and assembly hold the exclusive guard, so at most one
//! assembly runs per upload and no write lands mid-merge. Lanes of different
//! uploads never contend.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard, TryLockError};

use resumable_protocol::UploadId;

use crate::TransferError;

/// Concurrency gate for a single upload.
#[derive(Debug, Default)]
pub struct Lane {
    gate: RwLock<()>,
    slots: Mutex<HashMap<u32, Arc<Mutex<()>>>>,
}

impl Lane {
    /// Guard held while writing a chunk.
    pub fn share(&self) -> Result<RwLockReadGuard<'_, ()>, TransferError> {
        self.gate.read().map_err(|e| poisoned(&e))
    }

    /// Guard held while the working area is checked, merged and removed.
    pub fn exclusive(&self) -> Result<RwLockWriteGuard<'_, ()>, TransferError> {
        self.gate.write().map_err(|e| poisoned(&e))
    }

    /// Like [`exclusive`](Self::exclusive) but returns `None` instead of
    /// waiting when the upload is busy.
    pub fn try_exclusive(&self) -> Result<Option<RwLockWriteGuard<'_, ()>>, TransferError> {
        match self.gate.try_write() {
            Ok(guard) => Ok(Some(guard)),
            Err(TryLockError::WouldBlock) => Ok(None),
            Err(TryLockError::Poisoned(e)) => Err(poisoned(&e)),
        }
    }

    /// Mutex serializing writers of one chunk index, so a payload and its
    /// sidecar always come from the same request.
    pub fn slot(&self, index: u32) -> Result<Arc<Mutex<()>>, TransferError> {
        let mut slots = self.slots.lock().map_err(|e| poisoned(&e))?;
        Ok(Arc::clone(slots.entry(index).or_default()))
    }
}

/// Registry of live lanes keyed by upload identifier.
#[derive(Debug, Default)]
pub struct UploadLanes {
    lanes: Mutex<HashMap<UploadId, Arc<Lane>>>,
}

impl UploadLanes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the lane for `id`, creating it if needed.
    pub fn lane(&self, id: &UploadId) -> Result<Arc<Lane>, TransferError> {
        let mut lanes = self.lanes.lock().map_err(|e| poisoned(&e))?;
        Ok(Arc::clone(lanes.entry(id.clone()).or_default()))
    }

    /// Drops the lane for `id` once nobody but the registry holds it.
    ///
    /// Callers drop their own `Arc<Lane>` first.
    pub fn release(&self, id: &UploadId) {
        let Ok(mut lanes) = self.lanes.lock() else {
            return;
        };
        if lanes.get(id).is_some_and(|lane| Arc::strong_count(lane) == 1) {
            lanes.remove(id);
        }
    }

    /// Number of lanes currently registered.
    pub fn len(&self) -> usize {
        self.lanes.lock().map(|l| l.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub(crate) fn poisoned<E: std::fmt::Display>(e: &E) -> TransferError {
    TransferError::LanePoisoned(e.to_string())
}
