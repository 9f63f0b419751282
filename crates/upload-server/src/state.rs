use std::sync::Arc;

use resumable_transfer::UploadCoordinator;

/// Shared state handed to every request.
#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<UploadCoordinator>,
}

impl AppState {
    pub fn new(coordinator: Arc<UploadCoordinator>) -> Self {
        Self { coordinator }
    }
}
