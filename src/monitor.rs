//! Connection liveness monitoring.
//!
//! The server beacons a `ping` frame every few seconds; a connection that
//! goes [`STALE_THRESHOLD`] without one is presumed dead and reopened. The
//! monitor itself is a pure state machine: it records timestamps and hands
//! back decisions; the connection task owns the actual timers and turns
//! [`poll_interval`](ConnectionMonitor::poll_interval) into armed deadlines.
//!
//! The poll cadence follows `round(clamp(5 · ln(attempts + 1), 3, 30))`
//! seconds: the first checks come quickly, repeated failures back the
//! polling off logarithmically until it saturates at 30 s.

use std::time::{Duration, Instant};

/// A connection with no server ping for this long is considered stale.
pub const STALE_THRESHOLD: Duration = Duration::from_secs(6);

/// How long to wait after the page becomes visible before checking whether
/// the socket needs a reopen. Absorbs rapid tab toggling.
pub const VISIBILITY_DEBOUNCE: Duration = Duration::from_millis(200);

const POLL_INTERVAL_MIN_SECS: f64 = 3.0;
const POLL_INTERVAL_MAX_SECS: f64 = 30.0;
const POLL_INTERVAL_MULTIPLIER: f64 = 5.0;

/// Host page visibility, fed in by the embedding application via
/// [`Consumer::visibility_changed`](crate::Consumer::visibility_changed).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Visible,
    Hidden,
}

/// Outcome of a staleness poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StaleCheck {
    /// A ping arrived recently enough; nothing to do.
    Fresh,
    /// Stale, but a disconnect was recorded within the threshold; the
    /// socket is already known-down and its own reopen is pending.
    SkipReopen,
    /// Stale; the connection should be reopened.
    Reopen,
}

/// Tracks connection liveness and decides when a reopen is due.
#[derive(Debug, Default)]
pub(crate) struct ConnectionMonitor {
    pub(crate) reconnect_attempts: u32,
    pub(crate) started_at: Option<Instant>,
    pub(crate) stopped_at: Option<Instant>,
    pub(crate) pinged_at: Option<Instant>,
    pub(crate) disconnected_at: Option<Instant>,
}

impl ConnectionMonitor {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Begin monitoring. Idempotent; returns whether the monitor actually
    /// transitioned from stopped to running.
    pub(crate) fn start(&mut self) -> bool {
        if self.is_running() {
            return false;
        }
        self.started_at = Some(Instant::now());
        self.stopped_at = None;
        log::debug!(
            "[cable-link] ConnectionMonitor started, stale threshold {:?}",
            STALE_THRESHOLD
        );
        true
    }

    /// Stop monitoring. Idempotent; returns whether the monitor was
    /// running.
    pub(crate) fn stop(&mut self) -> bool {
        if !self.is_running() {
            return false;
        }
        self.stopped_at = Some(Instant::now());
        log::debug!("[cable-link] ConnectionMonitor stopped");
        true
    }

    pub(crate) fn is_running(&self) -> bool {
        self.started_at.is_some() && self.stopped_at.is_none()
    }

    /// Record a server ping.
    pub(crate) fn record_ping(&mut self) {
        self.pinged_at = Some(Instant::now());
    }

    /// Record a live session (server `welcome`): the reconnect counter
    /// resets and any pending disconnect bookkeeping is cleared.
    pub(crate) fn record_connect(&mut self) {
        self.reconnect_attempts = 0;
        self.pinged_at = Some(Instant::now());
        self.disconnected_at = None;
    }

    /// Record a socket close.
    pub(crate) fn record_disconnect(&mut self) {
        self.disconnected_at = Some(Instant::now());
    }

    /// Time until the next staleness poll, on the logarithmic backoff
    /// curve. Always within `[3 s, 30 s]`.
    pub(crate) fn poll_interval(&self) -> Duration {
        let attempts = f64::from(self.reconnect_attempts);
        let seconds = (POLL_INTERVAL_MULTIPLIER * (attempts + 1.0).ln())
            .clamp(POLL_INTERVAL_MIN_SECS, POLL_INTERVAL_MAX_SECS);
        Duration::from_millis((seconds * 1000.0).round() as u64)
    }

    /// Whether the connection has gone without a ping for longer than
    /// [`STALE_THRESHOLD`]. Before the first ping the clock runs from
    /// `started_at`.
    pub(crate) fn connection_stale(&self) -> bool {
        match self.pinged_at.or(self.started_at) {
            Some(refreshed_at) => refreshed_at.elapsed() > STALE_THRESHOLD,
            None => false,
        }
    }

    fn disconnected_recently(&self) -> bool {
        match self.disconnected_at {
            Some(disconnected_at) => disconnected_at.elapsed() < STALE_THRESHOLD,
            None => false,
        }
    }

    /// One poll tick: decide whether the connection needs reopening. A
    /// stale tick always counts as a reconnect attempt, even when the
    /// reopen is skipped because the socket just closed on its own.
    pub(crate) fn reconnect_if_stale(&mut self) -> StaleCheck {
        if !self.connection_stale() {
            return StaleCheck::Fresh;
        }
        self.reconnect_attempts += 1;
        if self.disconnected_recently() {
            StaleCheck::SkipReopen
        } else {
            StaleCheck::Reopen
        }
    }
}
