//! Start/stop state machine for the broadcast stream.
//!
//! [`StreamController`] owns at most one background broadcast task. Both
//! transitions are serialized by an async mutex, so concurrent `start()`
//! calls from many connections still spawn a single loop, and `stop()`
//! returns only after the loop has exited.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::broadcast::run_broadcast_loop;
use crate::domain::{ConnectionRegistry, FrameGenerator};

/// The running loop and the token that stops it.
#[derive(Debug)]
struct RunningLoop {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// Owner of the streaming state (Idle or Streaming) and the loop task.
///
/// # Invariants
///
/// - `is_active()` is `true` exactly while a loop task is held.
/// - At most one loop task exists at any time.
#[derive(Debug)]
pub struct StreamController {
    registry: Arc<ConnectionRegistry>,
    generator: Arc<Mutex<FrameGenerator>>,
    interval: Duration,
    active: AtomicBool,
    running: tokio::sync::Mutex<Option<RunningLoop>>,
}

impl StreamController {
    /// Creates an idle controller broadcasting to `registry`.
    #[must_use]
    pub fn new(registry: Arc<ConnectionRegistry>, generator: FrameGenerator) -> Self {
        let interval = generator.sample_interval();
        Self {
            registry,
            generator: Arc::new(Mutex::new(generator)),
            interval,
            active: AtomicBool::new(false),
            running: tokio::sync::Mutex::new(None),
        }
    }

    /// Moves Idle → Streaming by spawning the broadcast loop.
    ///
    /// Returns `false` without side effects if already streaming.
    pub async fn start(&self) -> bool {
        let mut running = self.running.lock().await;
        if running.is_some() {
            return false;
        }

        let cancel = CancellationToken::new();
        let task = tokio::spawn(run_broadcast_loop(
            Arc::clone(&self.registry),
            Arc::clone(&self.generator),
            self.interval,
            cancel.clone(),
        ));
        *running = Some(RunningLoop { cancel, task });
        self.active.store(true, Ordering::SeqCst);

        tracing::info!("streaming started");
        true
    }

    /// Moves Streaming → Idle.
    ///
    /// Cancels the loop, interrupting any pending sleep, and waits for the
    /// task to exit. Deliveries already in flight are allowed to finish
    /// first. Returns `false` without side effects if already idle.
    pub async fn stop(&self) -> bool {
        let mut running = self.running.lock().await;
        self.stop_locked(&mut running).await
    }

    /// Stops the stream only if the registry is empty.
    ///
    /// The emptiness check and the stop happen under the same lock as
    /// [`start`](Self::start), so a connection that registers and starts
    /// the stream concurrently is never left with a dead stream.
    pub async fn stop_if_unattended(&self) -> bool {
        let mut running = self.running.lock().await;
        if running.is_none() || !self.registry.is_empty().await {
            return false;
        }
        self.stop_locked(&mut running).await
    }

    async fn stop_locked(&self, running: &mut Option<RunningLoop>) -> bool {
        let Some(RunningLoop { cancel, task }) = running.take() else {
            return false;
        };

        self.active.store(false, Ordering::SeqCst);
        cancel.cancel();
        if let Err(err) = task.await {
            tracing::warn!(error = %err, "broadcast loop ended abnormally");
        }

        tracing::info!("streaming stopped");
        true
    }

    /// Returns `true` while streaming.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Pause between frames.
    #[must_use]
    pub const fn sample_interval(&self) -> Duration {
        self.interval
    }

    /// Rewinds the frame generator's clock to `0.0`.
    pub fn reset_clock(&self) {
        self.generator
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .reset();
    }
}

impl Drop for StreamController {
    fn drop(&mut self) {
        if let Some(running) = self.running.get_mut().take() {
            running.cancel.cancel();
        }
    }
}
