//! Frame fan-out to every registered connection.
//!
//! [`broadcast`] delivers one pre-serialized message to a registry snapshot
//! and prunes the handles that failed. [`run_broadcast_loop`] is the body of
//! the background task owned by [`super::StreamController`].

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures_util::future::join_all;
use tokio_util::sync::CancellationToken;

use crate::domain::{ConnectionRegistry, FrameGenerator};
use crate::ws::messages::ServerMessage;

/// How long a stop waits for writes already handed to sinks.
const STOP_GRACE: Duration = Duration::from_millis(250);

/// Outcome of one fan-out pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Connections that accepted the message.
    pub delivered: usize,
    /// Connections removed from the registry after a failed delivery.
    pub pruned: usize,
}

/// Delivers `text` to every handle in a registry snapshot.
///
/// Deliveries run concurrently. A failure only affects its own handle: the
/// handle is removed from the registry once all deliveries have settled.
pub async fn broadcast(registry: &ConnectionRegistry, text: &str) -> BroadcastReport {
    let targets = registry.snapshot().await;
    if targets.is_empty() {
        return BroadcastReport::default();
    }

    let results = join_all(
        targets
            .iter()
            .map(|handle| async move { (handle.id(), handle.deliver(text).await) }),
    )
    .await;

    let mut failed = Vec::new();
    for (id, result) in results {
        if let Err(err) = result {
            tracing::debug!(connection_id = %id, error = %err, "delivery failed, pruning connection");
            failed.push(id);
        }
    }
    let pruned = registry.remove_all(&failed).await;

    BroadcastReport {
        delivered: targets.len() - failed.len(),
        pruned,
    }
}

/// Generates and broadcasts frames until `cancel` fires.
///
/// Cancellation is observed at the top of every iteration, while deliveries
/// are in flight, and during the pause between frames. Deliveries already in
/// flight get up to [`STOP_GRACE`] to finish so a cancelled write does not
/// leave a frame parked in a socket buffer.
pub(crate) async fn run_broadcast_loop(
    registry: Arc<ConnectionRegistry>,
    generator: Arc<Mutex<FrameGenerator>>,
    interval: Duration,
    cancel: CancellationToken,
) {
    tracing::info!(interval = ?interval, "broadcast loop started");
    let mut frames: u64 = 0;

    while !cancel.is_cancelled() {
        let frame = generator
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .generate_next();
        let timestamp = frame.timestamp;

        match serde_json::to_string(&ServerMessage::from(frame)) {
            Ok(text) => {
                let delivery = broadcast(&registry, &text);
                tokio::pin!(delivery);
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => {
                        if tokio::time::timeout(STOP_GRACE, &mut delivery).await.is_err() {
                            tracing::warn!(timestamp, "in-flight frame abandoned on stop");
                        }
                        break;
                    }
                    report = &mut delivery => {
                        frames += 1;
                        if report.pruned > 0 {
                            tracing::info!(
                                timestamp,
                                pruned = report.pruned,
                                delivered = report.delivered,
                                "dropped unreachable connections"
                            );
                        }
                    }
                }
            }
            Err(err) => tracing::error!(timestamp, error = %err, "failed to encode frame"),
        }

        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            () = tokio::time::sleep(interval) => {}
        }
    }

    tracing::info!(frames, "broadcast loop stopped");
}
