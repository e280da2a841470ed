//! Inactivity monitor.
//!
//! Independent of token expiry: a fixed idle budget, reset by every user
//! interaction, that forces sign-out when it runs dry. Spawned fresh on
//! sign-in and torn down on sign-out, so it can never fire for a signed-out
//! user or straddle two principals.

use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::lifecycle::SessionHandle;
use crate::store::SignOutReason;

/// Interaction-signal sender handed to the UI layer.
///
/// Pointer, key, scroll and touch events all funnel into [`touch`].
///
/// [`touch`]: ActivityTracker::touch
#[derive(Clone)]
pub struct ActivityTracker {
    signals: mpsc::UnboundedSender<()>,
}

impl ActivityTracker {
    /// Record a user interaction, resetting the idle timer.
    pub fn touch(&self) {
        let _ = self.signals.send(());
    }
}

/// Running monitor. Dropping the handle aborts the task; prefer
/// [`shutdown`] for a clean stop on sign-out.
///
/// [`shutdown`]: InactivityMonitor::shutdown
pub struct InactivityMonitor {
    shutdown: Option<oneshot::Sender<()>>,
    join: Option<JoinHandle<()>>,
}

impl InactivityMonitor {
    /// Spawn a monitor for the currently signed-in principal.
    pub fn spawn(session: SessionHandle, budget: Duration) -> (ActivityTracker, InactivityMonitor) {
        let (signal_tx, signal_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let join = tokio::spawn(monitor_loop(session, budget, signal_rx, shutdown_rx));

        (
            ActivityTracker { signals: signal_tx },
            InactivityMonitor {
                shutdown: Some(shutdown_tx),
                join: Some(join),
            },
        )
    }

    /// Tear the monitor down and wait for it to stop.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(join) = self.join.take() {
            let _ = join.await;
        }
    }
}

impl Drop for InactivityMonitor {
    fn drop(&mut self) {
        if let Some(join) = self.join.take() {
            join.abort();
        }
    }
}

async fn monitor_loop(
    session: SessionHandle,
    budget: Duration,
    mut signals: mpsc::UnboundedReceiver<()>,
    mut shutdown: oneshot::Receiver<()>,
) {
    let mut snapshots = session.subscribe();
    let mut deadline = Instant::now() + budget;

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            signal = signals.recv() => match signal {
                Some(()) => {
                    deadline = Instant::now() + budget;
                }
                // Every tracker dropped; no more activity can arrive.
                None => break,
            },
            changed = snapshots.changed() => {
                if changed.is_err() || !snapshots.borrow().is_authenticated() {
                    debug!("session no longer authenticated; inactivity monitor stopping");
                    break;
                }
            }
            _ = tokio::time::sleep_until(deadline) => {
                info!(idle_budget_secs = budget.as_secs(), "inactivity budget exhausted");
                session.sign_out(SignOutReason::Expired);
                break;
            }
        }
    }
}
