//! The accept loop (Section 5 of the design): a single task feeds a
//! spawner, one task per live TCP conversation, bounded so that peak
//! Argon2id memory cannot blow past the number of cores (Section 5:
//! "an implementation SHOULD run Argon2 on a bounded worker pool").
//!
//! Shutdown stops accepting immediately and gives in-flight conversations a
//! grace period to finish before the process exits (Section 5).

use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::{broadcast, Semaphore};
use tokio::task::JoinSet;

use crate::connection::handle_connection_with_deadline;
use crate::state::ServerState;

/// Grace period given to in-flight conversations once shutdown begins
/// (Section 5 of the design: default 10 s).
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// How often the validation pipeline's rate-limit and seen-challenge tables
/// are swept for idle entries (Section 5's "background sweep").
const SWEEP_INTERVAL: Duration = Duration::from_secs(30);

/// Run the accept loop until `shutdown_rx` fires, then drain in-flight
/// connections for up to [`SHUTDOWN_GRACE`] before returning.
pub async fn serve(
    state: Arc<ServerState>,
    listener: TcpListener,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    let worker_capacity = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4);
    let semaphore = Arc::new(Semaphore::new(worker_capacity));
    tracing::info!(worker_capacity, "accept loop starting");

    let mut tasks = JoinSet::new();
    let mut sweep_tick = tokio::time::interval(SWEEP_INTERVAL);

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, remote_addr)) => {
                        let permit = match semaphore.clone().try_acquire_owned() {
                            Ok(permit) => permit,
                            Err(_) => {
                                // Worker pool saturated: an admission-control
                                // refusal, not a client failure (Section 5).
                                tracing::warn!(%remote_addr, "refusing connection, worker pool saturated");
                                drop(stream);
                                continue;
                            }
                        };
                        let state = state.clone();
                        let deadline = state.config.connection_timeout;
                        tasks.spawn(async move {
                            handle_connection_with_deadline(state, stream, remote_addr, deadline).await;
                            drop(permit);
                        });
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "accept failed");
                    }
                }
            }
            _ = sweep_tick.tick() => {
                state.pipeline.sweep();
            }
            _ = shutdown_rx.recv() => {
                tracing::info!("shutdown signal received, draining in-flight connections");
                break;
            }
        }
    }

    let drain = async {
        while tasks.join_next().await.is_some() {}
    };
    if tokio::time::timeout(SHUTDOWN_GRACE, drain).await.is_err() {
        tracing::warn!("shutdown grace period elapsed with connections still in flight");
        tasks.abort_all();
    }
}
