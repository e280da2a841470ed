//! Expiry notifier.
//!
//! Read-only observer over session snapshots. A warning is surfaced only
//! when refresh has genuinely failed **and** expiry is imminent; a session
//! nearing expiry while refresh is healthy resolves transparently and must
//! not alarm the user. When remaining time reaches zero the notifier defers
//! to the lifecycle manager's own expiry transition.

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_stream::{StreamExt, wrappers::WatchStream};

use crate::config::SessionConfig;
use crate::lifecycle::SessionSnapshot;

/// What the UI should show.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotifierState {
    Hidden,
    Warning {
        /// Seconds until expiry.
        remaining_secs: i64,
        /// `m:ss` countdown for display.
        countdown: String,
    },
}

/// Warning evaluation over session snapshots.
///
/// Pure apart from the dismissal memory: dismissing suppresses the warning
/// for the remainder of that session (epoch) only.
#[derive(Debug)]
pub struct ExpiryNotifier {
    warning_window: chrono::Duration,
    dismissed_epoch: Option<u64>,
}

impl ExpiryNotifier {
    pub fn new(config: &SessionConfig) -> Self {
        Self {
            warning_window: chrono::Duration::from_std(config.warning_window)
                .unwrap_or_else(|_| chrono::Duration::minutes(3)),
            dismissed_epoch: None,
        }
    }

    /// Suppress the warning for the given session epoch.
    pub fn dismiss(&mut self, epoch: u64) {
        self.dismissed_epoch = Some(epoch);
    }

    /// Recompute the warning state for `snapshot` at `now`.
    pub fn evaluate(&self, snapshot: &SessionSnapshot, now: DateTime<Utc>) -> NotifierState {
        if self.dismissed_epoch == Some(snapshot.epoch) {
            return NotifierState::Hidden;
        }

        let Some(session) = &snapshot.session else {
            return NotifierState::Hidden;
        };

        if !snapshot.refresh_failed {
            return NotifierState::Hidden;
        }

        let remaining = session.expires_at - now;
        if remaining <= chrono::Duration::zero() || remaining >= self.warning_window {
            // At or past zero the lifecycle manager handles expiry itself.
            return NotifierState::Hidden;
        }

        let remaining_secs = remaining.num_seconds();
        NotifierState::Warning {
            remaining_secs,
            countdown: format!("{}:{:02}", remaining_secs / 60, remaining_secs % 60),
        }
    }
}

/// Handle to a running notifier task.
pub struct NotifierHandle {
    dismissals: mpsc::UnboundedSender<u64>,
    states: watch::Receiver<NotifierState>,
    join: JoinHandle<()>,
}

impl NotifierHandle {
    /// Dismiss the warning for the given session epoch.
    pub fn dismiss(&self, epoch: u64) {
        let _ = self.dismissals.send(epoch);
    }

    pub fn state(&self) -> NotifierState {
        self.states.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<NotifierState> {
        self.states.clone()
    }
}

impl Drop for NotifierHandle {
    fn drop(&mut self) {
        self.join.abort();
    }
}

impl ExpiryNotifier {
    /// Spawn the once-a-second recompute loop over a snapshot subscription.
    pub fn spawn(
        mut self,
        snapshots: watch::Receiver<SessionSnapshot>,
        config: &SessionConfig,
    ) -> NotifierHandle {
        let (dismiss_tx, mut dismiss_rx) = mpsc::unbounded_channel::<u64>();
        let initial = self.evaluate(&snapshots.borrow(), Utc::now());
        let (state_tx, state_rx) = watch::channel(initial);

        let tick = config.notifier_tick;
        let mut stream = WatchStream::new(snapshots);

        let join = tokio::spawn(async move {
            let mut interval = tokio::time::interval(tick);
            let mut current: Option<SessionSnapshot> = None;
            loop {
                tokio::select! {
                    _ = interval.tick() => {}
                    snapshot = stream.next() => match snapshot {
                        Some(snapshot) => current = Some(snapshot),
                        // Lifecycle manager gone; nothing left to observe.
                        None => break,
                    },
                    dismissed = dismiss_rx.recv() => match dismissed {
                        Some(epoch) => self.dismiss(epoch),
                        // Handle dropped; the abort in Drop is on its way.
                        None => break,
                    },
                }

                if let Some(snapshot) = &current {
                    let next = self.evaluate(snapshot, Utc::now());
                    state_tx.send_if_modified(|state| {
                        if *state == next {
                            false
                        } else {
                            *state = next.clone();
                            true
                        }
                    });
                }
            }
        });

        NotifierHandle {
            dismissals: dismiss_tx,
            states: state_rx,
            join,
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration as ChronoDuration, Utc};

    use advisorly_core::UserId;

    use super::*;
    use crate::lifecycle::SessionPhase;
    use crate::test_support::session_for;

    fn snapshot_with(minutes_left: i64, refresh_failed: bool, epoch: u64) -> SessionSnapshot {
        SessionSnapshot {
            phase: SessionPhase::Authenticated,
            session: Some(session_for(
                UserId::new(),
                Utc::now() + ChronoDuration::minutes(minutes_left),
            )),
            profile: None,
            refresh_failed,
            epoch,
        }
    }

    fn notifier() -> ExpiryNotifier {
        ExpiryNotifier::new(&SessionConfig::default())
    }

    #[test]
    fn healthy_session_near_expiry_never_warns() {
        let snapshot = snapshot_with(4, false, 1);
        assert_eq!(
            notifier().evaluate(&snapshot, Utc::now()),
            NotifierState::Hidden
        );

        // Even inside the warning window, healthy refresh means no alarm.
        let snapshot = snapshot_with(2, false, 1);
        assert_eq!(
            notifier().evaluate(&snapshot, Utc::now()),
            NotifierState::Hidden
        );
    }

    #[test]
    fn failed_refresh_outside_window_stays_hidden() {
        let snapshot = snapshot_with(4, true, 1);
        assert_eq!(
            notifier().evaluate(&snapshot, Utc::now()),
            NotifierState::Hidden
        );
    }

    #[test]
    fn failed_refresh_inside_window_warns_with_decreasing_countdown() {
        let snapshot = snapshot_with(2, true, 1);
        let n = notifier();

        let start = Utc::now();
        let mut last = i64::MAX;
        for elapsed in [0, 30, 60, 90] {
            let now = start + ChronoDuration::seconds(elapsed);
            match n.evaluate(&snapshot, now) {
                NotifierState::Warning { remaining_secs, .. } => {
                    assert!(remaining_secs < last);
                    last = remaining_secs;
                }
                NotifierState::Hidden => panic!("expected a warning at t+{elapsed}s"),
            }
        }
    }

    #[test]
    fn countdown_formats_minutes_and_seconds() {
        let session = session_for(UserId::new(), Utc::now() + ChronoDuration::seconds(125));
        let expires_at = session.expires_at;
        let snapshot = SessionSnapshot {
            phase: SessionPhase::Authenticated,
            session: Some(session),
            profile: None,
            refresh_failed: true,
            epoch: 1,
        };

        let now = expires_at - ChronoDuration::seconds(125);
        match notifier().evaluate(&snapshot, now) {
            NotifierState::Warning { countdown, .. } => assert_eq!(countdown, "2:05"),
            NotifierState::Hidden => panic!("expected a warning"),
        }
    }

    #[test]
    fn zero_remaining_defers_to_the_lifecycle_manager() {
        let snapshot = snapshot_with(2, true, 1);
        let at_expiry = snapshot.session.as_ref().unwrap().expires_at;
        assert_eq!(
            notifier().evaluate(&snapshot, at_expiry),
            NotifierState::Hidden
        );
    }

    #[test]
    fn dismissal_is_scoped_to_the_session_epoch() {
        let mut n = notifier();
        let snapshot = snapshot_with(2, true, 7);

        n.dismiss(7);
        assert_eq!(n.evaluate(&snapshot, Utc::now()), NotifierState::Hidden);

        // A subsequent session (new epoch) warns again.
        let next_session = snapshot_with(2, true, 8);
        assert!(matches!(
            n.evaluate(&next_session, Utc::now()),
            NotifierState::Warning { .. }
        ));
    }
}
