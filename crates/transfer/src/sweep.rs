//! Reclamation of abandoned working areas.
//!
//! Uploads that never complete leave their chunks behind, and so do chunks
//! that arrive after their upload was assembled. The sweeper deletes working
//! areas untouched for longer than `max_age`, along with retiring areas whose
//! deletion failed earlier.

use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use resumable_protocol::{RETIRED_MARKER, UploadId};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::TransferError;
use crate::lanes::UploadLanes;
use crate::layout::Layout;

/// Counts from a single sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Stale working areas deleted.
    pub removed: usize,
    /// Leftover retiring areas deleted.
    pub retired: usize,
    /// Stale working areas left alone because a request was using them.
    pub skipped_busy: usize,
}

impl SweepReport {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

#[derive(Debug)]
pub struct Sweeper {
    layout: Layout,
    lanes: Arc<UploadLanes>,
    max_age: Duration,
}

impl Sweeper {
    /// Prefer [`UploadCoordinator::sweeper`](crate::UploadCoordinator::sweeper),
    /// which shares the coordinator's lanes.
    pub fn new(layout: Layout, lanes: Arc<UploadLanes>, max_age: Duration) -> Self {
        Self {
            layout,
            lanes,
            max_age,
        }
    }

    pub fn max_age(&self) -> Duration {
        self.max_age
    }

    /// Scans the scratch root once. Per-entry failures are logged and the
    /// scan continues.
    pub fn sweep_once(&self) -> Result<SweepReport, TransferError> {
        let mut report = SweepReport::default();

        let entries = match fs::read_dir(self.layout.scratch_root()) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(report),
            Err(e) => return Err(e.into()),
        };

        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let path = entry.path();
            if !self.is_stale(&path) {
                continue;
            }
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };

            if name.contains(RETIRED_MARKER) {
                if remove_area(&path) {
                    report.retired += 1;
                }
                continue;
            }

            let Ok(id) = UploadId::parse(name) else {
                tracing::debug!(path = %path.display(), "ignoring foreign directory");
                continue;
            };
            self.sweep_working_area(&id, &path, &mut report)?;
        }

        Ok(report)
    }

    fn sweep_working_area(
        &self,
        id: &UploadId,
        path: &Path,
        report: &mut SweepReport,
    ) -> Result<(), TransferError> {
        let lane = self.lanes.lane(id)?;
        match lane.try_exclusive()? {
            // A chunk may have landed between the scan and taking the guard.
            Some(_guard) if !self.is_stale(path) => {}
            Some(_guard) => {
                if remove_area(path) {
                    tracing::info!(upload_id = %id, "removed abandoned upload");
                    report.removed += 1;
                }
            }
            None => report.skipped_busy += 1,
        }
        drop(lane);
        self.lanes.release(id);
        Ok(())
    }

    fn is_stale(&self, path: &Path) -> bool {
        fs::metadata(path)
            .and_then(|m| m.modified())
            .ok()
            .and_then(|modified| modified.elapsed().ok())
            .is_some_and(|age| age >= self.max_age)
    }

    /// Runs [`sweep_once`](Self::sweep_once) every `interval` on a blocking
    /// thread until `cancel` fires.
    pub fn start(self: Arc<Self>, interval: Duration, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let sweeper = Arc::clone(&self);
                        match tokio::task::spawn_blocking(move || sweeper.sweep_once()).await {
                            Ok(Ok(report)) if report.is_empty() => {}
                            Ok(Ok(report)) => tracing::info!(
                                removed = report.removed,
                                retired = report.retired,
                                skipped_busy = report.skipped_busy,
                                "sweep finished"
                            ),
                            Ok(Err(e)) => tracing::warn!("sweep failed: {e}"),
                            Err(e) => tracing::error!("sweep task failed: {e}"),
                        }
                    }
                    _ = cancel.cancelled() => {
                        tracing::debug!("sweeper stopped");
                        break;
                    }
                }
            }
        })
    }
}

fn remove_area(path: &Path) -> bool {
    match fs::remove_dir_all(path) {
        Ok(()) => true,
        Err(e) if e.kind() == ErrorKind::NotFound => false,
        Err(e) => {
            tracing::warn!(path = %path.display(), "failed to remove working area: {e}");
            false
        }
    }
}
