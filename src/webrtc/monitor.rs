//! Connectivity monitor
//!
//! Consumes the transport's connectivity subscription. There is no polling:
//! the monitor wakes on every reported ICE state, on a deadline timer and on a
//! progress ticker used only for logging.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::session::Session;
use super::signaling::{ConnectionState, IceConnectivity};
use crate::events::{EventBus, SessionEvent, Subscription};

/// How often "still waiting" is reported while connecting
pub const PROGRESS_INTERVAL: Duration = Duration::from_secs(5);

/// Result of waiting for connectivity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorOutcome {
    /// `connected` or `completed` was reported (the concrete value is kept)
    Connected(IceConnectivity),
    /// The engine reported failure or went away
    Failed,
    /// The deadline passed first
    TimedOut,
    /// The session was interrupted
    Cancelled,
}

pub struct ConnectionMonitor {
    connectivity: Subscription<IceConnectivity>,
    events: Arc<EventBus>,
    progress_interval: Duration,
}

impl ConnectionMonitor {
    pub fn new(connectivity: Subscription<IceConnectivity>, events: Arc<EventBus>) -> Self {
        Self {
            connectivity,
            events,
            progress_interval: PROGRESS_INTERVAL,
        }
    }

    pub fn with_progress_interval(mut self, interval: Duration) -> Self {
        self.progress_interval = interval;
        self
    }

    /// Wait until the session connects, fails, times out or is cancelled
    pub async fn wait_for_connection(
        &mut self,
        session: &Session,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> MonitorOutcome {
        info!("Waiting up to {:?} for connection", timeout);
        let started = Instant::now();
        let deadline = tokio::time::sleep(timeout);
        tokio::pin!(deadline);
        let mut progress = tokio::time::interval_at(
            tokio::time::Instant::now() + self.progress_interval,
            self.progress_interval,
        );

        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    info!("Stopped waiting for connection: interrupted");
                    return MonitorOutcome::Cancelled;
                }

                state = self.connectivity.recv() => {
                    let Some(state) = state else {
                        error!("Transport closed while connecting");
                        session.advance(ConnectionState::Failed);
                        return MonitorOutcome::Failed;
                    };
                    self.observe(state);

                    if state.is_connected() {
                        info!(
                            "Connection established in {:.1}s ({})",
                            started.elapsed().as_secs_f64(),
                            state
                        );
                        session.advance(ConnectionState::Connected);
                        return MonitorOutcome::Connected(state);
                    }
                    if state.is_failed() || state == IceConnectivity::Closed {
                        error!("ICE connection {}", state);
                        session.advance(ConnectionState::Failed);
                        return MonitorOutcome::Failed;
                    }
                }

                _ = &mut deadline => {
                    warn!("Connection not established within {:?}", timeout);
                    session.advance(ConnectionState::Failed);
                    return MonitorOutcome::TimedOut;
                }

                _ = progress.tick() => {
                    let elapsed_secs = started.elapsed().as_secs();
                    info!("Waiting for connection... {}s", elapsed_secs);
                    self.events
                        .publish(SessionEvent::WaitingProgress { elapsed_secs });
                }
            }
        }
    }

    /// Watch an established connection
    ///
    /// Returns the terminal state once the engine reports `failed` or
    /// `closed` (or goes away), `None` when cancelled first.
    pub async fn watch_for_failure(
        &mut self,
        session: &Session,
        cancel: &CancellationToken,
    ) -> Option<IceConnectivity> {
        loop {
            let state = tokio::select! {
                biased;
                _ = cancel.cancelled() => return None,
                state = self.connectivity.recv() => state,
            };

            let Some(state) = state else {
                warn!("Transport stopped reporting connectivity");
                return Some(IceConnectivity::Closed);
            };
            self.observe(state);

            match state {
                IceConnectivity::Failed => {
                    error!("ICE connection failed");
                    session.advance(ConnectionState::Failed);
                    return Some(state);
                }
                IceConnectivity::Closed => {
                    warn!("ICE connection closed by peer");
                    return Some(state);
                }
                IceConnectivity::Disconnected => {
                    warn!("ICE connection disconnected, waiting for recovery");
                }
                _ => {}
            }
        }
    }

    fn observe(&self, state: IceConnectivity) {
        debug!("ICE connection state: {}", state);
        self.events.publish(SessionEvent::IceStateChanged { state });
    }
}
