use std::sync::Arc;
use std::time::Duration;

use resumable_protocol::{ChunkRef, ChunkUpload};
use serde::{Deserialize, Serialize};

use crate::TransferError;
use crate::assembly::{AssemblyEngine, AssemblyOutcome, CompletionPolicy};
use crate::lanes::{Lane, UploadLanes, poisoned};
use crate::layout::Layout;
use crate::oracle::{ProbeMode, ResumeOracle};
use crate::store::{ChunkStore, StoredChunk};
use crate::sweep::Sweeper;

/// Tunables for the transfer core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferOptions {
    #[serde(default)]
    pub completion: CompletionPolicy,
    #[serde(default)]
    pub probe: ProbeMode,
    #[serde(default = "default_remove_chunks")]
    pub remove_chunks_on_completion: bool,
}

fn default_remove_chunks() -> bool {
    true
}

impl Default for TransferOptions {
    fn default() -> Self {
        Self {
            completion: CompletionPolicy::default(),
            probe: ProbeMode::default(),
            remove_chunks_on_completion: default_remove_chunks(),
        }
    }
}

/// What happened to a delivered chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiveOutcome {
    pub stored: StoredChunk,
    pub assembly: AssemblyOutcome,
}

/// Entry point for probe and chunk-delivery requests.
///
/// Owns the store, the oracle, the assembly engine and the lane registry
/// that serializes them per upload.
#[derive(Debug)]
pub struct UploadCoordinator {
    store: ChunkStore,
    oracle: ResumeOracle,
    engine: AssemblyEngine,
    lanes: Arc<UploadLanes>,
}

impl UploadCoordinator {
    pub fn new(layout: Layout, options: TransferOptions) -> Self {
        let store = ChunkStore::new(layout);
        let oracle = ResumeOracle::new(store.clone(), options.probe);
        let mut engine = AssemblyEngine::new(store.clone(), options.completion);
        if !options.remove_chunks_on_completion {
            engine = engine.keep_chunks();
        }
        Self {
            store,
            oracle,
            engine,
            lanes: Arc::new(UploadLanes::new()),
        }
    }

    pub fn layout(&self) -> &Layout {
        self.store.layout()
    }

    /// Answers a resume probe. Never creates or modifies anything.
    pub fn probe(&self, chunk: &ChunkRef) -> Result<bool, TransferError> {
        self.oracle
            .chunk_exists(&chunk.upload_id, &chunk.filename, chunk.index)
    }

    /// Stores one chunk, then assembles the upload if it is now complete.
    ///
    /// Blocks on filesystem I/O; async callers run it on a blocking thread.
    pub fn receive(
        &self,
        upload: &ChunkUpload,
        payload: &[u8],
    ) -> Result<ReceiveOutcome, TransferError> {
        let id = upload.upload_id();
        let lane = self.lanes.lane(id)?;
        let result = self.receive_in_lane(&lane, upload, payload);
        drop(lane);
        self.lanes.release(id);
        result
    }

    fn receive_in_lane(
        &self,
        lane: &Lane,
        upload: &ChunkUpload,
        payload: &[u8],
    ) -> Result<ReceiveOutcome, TransferError> {
        let index = upload.chunk.index;

        let stored = {
            let _shared = lane.share()?;
            let slot = lane.slot(index)?;
            let _slot = slot.lock().map_err(|e| poisoned(&e))?;
            self.store
                .store_chunk(upload.upload_id(), upload.filename(), index, payload)?
        };

        let assembly = {
            let _exclusive = lane.exclusive()?;
            self.engine.try_complete(upload)?
        };

        Ok(ReceiveOutcome { stored, assembly })
    }

    /// Builds a sweeper sharing this coordinator's lanes, so it never removes
    /// a working area that a request is using.
    pub fn sweeper(&self, max_age: Duration) -> Sweeper {
        Sweeper::new(self.store.layout().clone(), Arc::clone(&self.lanes), max_age)
    }

    /// Number of uploads with a request in flight.
    pub fn active_uploads(&self) -> usize {
        self.lanes.len()
    }
}
