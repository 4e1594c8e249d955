//! lifecycle.rs — C8 Lifecycle Coordinator
//!
//! Installs the interrupt handler, owns the top-level wait group, and
//! returns once discovery, the cutover advisor, and the signal task have
//! all joined (spec.md §4.8). `JoinSet` plays the same "internal wait
//! group" role it does in `pipeline::discovery` — here sized exactly three,
//! never growing.

use crate::appconfig::{CutoverConfig, RetryConfig, TimingsConfig};
use crate::cutover::run_cutover_advisor;
use crate::dynamo::client::DynamoStreamsClient;
use crate::dynamo::shard::StreamIdentifier;
use crate::pipeline::discovery::process_stream;
use crate::pipeline::state::SharedStreamState;
use crate::pipeline::TableContext;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::info;

/// Runs the pipeline to completion: C3 (discovery), C7 (cutover advisor),
/// and the signal handler, joined via a three-member wait group. Returns
/// once all three tasks have exited — discovery exits after its final
/// drain pass, the cutover advisor exits on observing `UserExit`, and the
/// signal task exits immediately after flipping the flag.
pub async fn run(
    state: Arc<SharedStreamState>,
    dynamo: Arc<dyn DynamoStreamsClient>,
    stream_id: StreamIdentifier,
    table: TableContext,
    timings: TimingsConfig,
    retry: RetryConfig,
    cutover: CutoverConfig,
) {
    let mut tasks: JoinSet<()> = JoinSet::new();

    tasks.spawn(install_signal_handler(state.clone()));

    tasks.spawn({
        let state = state.clone();
        run_cutover_advisor(state, cutover)
    });

    tasks.spawn({
        let state = state.clone();
        process_stream(state, dynamo, stream_id, table, timings, retry)
    });

    while let Some(result) = tasks.join_next().await {
        if let Err(e) = result {
            tracing::error!("lifecycle task panicked or was cancelled: {e}");
        }
    }

    info!("pipeline run complete");
}

/// Traps interrupt (both platforms) and terminate (unix only), atomically
/// setting `UserExit`. Never calls `std::process::exit` itself: clean
/// shutdown happens because every loop polls `SharedStreamState::user_exit`.
async fn install_signal_handler(state: Arc<SharedStreamState>) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut terminate = signal(SignalKind::terminate())
            .expect("failed to install SIGTERM handler");

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = terminate.recv() => {}
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }

    info!("shutdown signal received, draining in-flight shards");
    state.set_user_exit();
}
