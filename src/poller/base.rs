//! Generic poller lifecycle (spec 4.5): a poll loop and a cleanup loop
//! running on their own interval, both cancellable from one `stop()` call.
//! Grounded on the teacher's `ChainSync`/`HybridSync` pair in
//! `indexer/sync.rs` and `indexer/hybrid_sync.rs` - an `Arc`-shared struct
//! whose `start` spawns background tasks and whose atomics track run
//! state - generalized here into a reusable shell so every typed poller
//! (4.6-4.8) only has to implement the two cycle bodies.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// One data type's poll cycle and cleanup cycle. Implementors hold their
/// own `Store`, `AgentRegistry`, `AgentClient`, and (where relevant)
/// `FrameDictionary`; `BasePoller` only drives the timing.
#[async_trait]
pub trait PollCycle: Send + Sync + 'static {
    fn name(&self) -> &str;

    /// Runs one poll cycle across every pollable agent. Errors are logged
    /// by the caller and never stop the loop (spec 7: a cycle failure is
    /// never fatal to the process).
    async fn poll_once(&self) -> anyhow::Result<()>;

    /// Runs one retention sweep. Defaults to a no-op for pollers that
    /// don't own their own cleanup (the dispatcher in gap recovery, say).
    async fn cleanup_once(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Owns the two background tasks for one [`PollCycle`]. `start`/`stop` are
/// idempotent: calling `start` twice without an intervening `stop` is a
/// no-op, and `stop` before any `start` is also a no-op.
pub struct BasePoller<C: PollCycle> {
    cycle: Arc<C>,
    poll_interval: Duration,
    cleanup_interval: Duration,
    started: AtomicBool,
    cancel: CancellationToken,
    handles: Mutex<Option<(JoinHandle<()>, JoinHandle<()>)>>,
}

impl<C: PollCycle> BasePoller<C> {
    pub fn new(cycle: Arc<C>, poll_interval: Duration, cleanup_interval: Duration) -> Self {
        Self {
            cycle,
            poll_interval,
            cleanup_interval,
            started: AtomicBool::new(false),
            cancel: CancellationToken::new(),
            handles: Mutex::new(None),
        }
    }

    pub async fn start(&self) {
        if self
            .started
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            warn!(poller = self.cycle.name(), "start called while already running, ignoring");
            return;
        }

        info!(poller = self.cycle.name(), "starting poller");

        let poll_handle = {
            let cycle = Arc::clone(&self.cycle);
            let cancel = self.cancel.clone();
            let interval = self.poll_interval;
            tokio::spawn(async move { run_loop(cycle, cancel, interval, LoopKind::Poll).await })
        };

        let cleanup_handle = {
            let cycle = Arc::clone(&self.cycle);
            let cancel = self.cancel.clone();
            let interval = self.cleanup_interval;
            tokio::spawn(async move { run_loop(cycle, cancel, interval, LoopKind::Cleanup).await })
        };

        *self.handles.lock().await = Some((poll_handle, cleanup_handle));
    }

    /// Cancels both loops and waits for them to finish their current
    /// iteration. A no-op if the poller was never started.
    pub async fn stop(&self) {
        if !self.started.swap(false, Ordering::SeqCst) {
            return;
        }

        self.cancel.cancel();

        if let Some((poll_handle, cleanup_handle)) = self.handles.lock().await.take() {
            let _ = poll_handle.await;
            let _ = cleanup_handle.await;
        }

        info!(poller = self.cycle.name(), "stopped poller");
    }
}

#[derive(Clone, Copy)]
enum LoopKind {
    Poll,
    Cleanup,
}

impl LoopKind {
    fn as_str(&self) -> &'static str {
        match self {
            LoopKind::Poll => "poll",
            LoopKind::Cleanup => "cleanup",
        }
    }
}

async fn run_loop<C: PollCycle>(cycle: Arc<C>, cancel: CancellationToken, interval: Duration, kind: LoopKind) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                break;
            }
            _ = ticker.tick() => {
                let result = match kind {
                    LoopKind::Poll => cycle.poll_once().await,
                    LoopKind::Cleanup => cycle.cleanup_once().await,
                };
                if let Err(err) = result {
                    error!(poller = cycle.name(), kind = kind.as_str(), error = %err, "cycle failed");
                }
            }
        }
    }
}
