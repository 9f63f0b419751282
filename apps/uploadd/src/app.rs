//! Application orchestrator: wires the coordinator, HTTP server and sweeper.

use std::sync::Arc;

use resumable_server::UploadServer;
use resumable_transfer::UploadCoordinator;
use tokio_util::sync::CancellationToken;

use crate::config::Config;

/// Runs the daemon until Ctrl-C or a server failure.
pub async fn run(config: Config) -> anyhow::Result<()> {
    let cancel = CancellationToken::new();

    std::fs::create_dir_all(&config.scratch_dir)?;
    std::fs::create_dir_all(&config.upload_dir)?;

    let coordinator = Arc::new(UploadCoordinator::new(
        config.layout(),
        config.transfer_options(),
    ));

    // -- Sweeper --
    let sweeper = match config.sweep_schedule() {
        Some((interval, max_age)) => {
            tracing::info!(
                interval_secs = interval.as_secs(),
                max_age_secs = max_age.as_secs(),
                "sweeping abandoned uploads"
            );
            let sweeper = Arc::new(coordinator.sweeper(max_age));
            Some(sweeper.start(interval, cancel.child_token()))
        }
        None => {
            tracing::info!("sweeper disabled");
            None
        }
    };

    // -- HTTP server --
    let server = UploadServer::new(config.server_config(), Arc::clone(&coordinator));
    let server_run = Arc::clone(&server);
    let mut server_task = tokio::spawn(async move { server_run.run().await });

    tracing::info!(
        completion = ?config.completion,
        probe = ?config.probe,
        "daemon ready"
    );

    // -- Main loop: wait for shutdown --
    let finished = tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("SIGINT received, shutting down");
            None
        }
        finished = &mut server_task => Some(finished),
    };

    // -- Graceful shutdown --
    server.shutdown();
    let result = match finished {
        Some(result) => result,
        None => server_task.await,
    };
    cancel.cancel();
    if let Some(handle) = sweeper {
        if let Err(e) = handle.await {
            tracing::warn!("sweeper task failed: {e}");
        }
    }

    result??;
    Ok(())
}
