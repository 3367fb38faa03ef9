//! Read deadline tracking
//!
//! Decides how long the read loop may block on the next inbound message.
//! With a heartbeat, the deadline is `last pong + pong_wait` and only pongs
//! move it; data frames do not keep a connection alive. Without one, every
//! read gets a fresh per-read timeout, or none at all.

use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    /// Deadline fixed until the next pong
    Pong { wait: Duration },
    /// Fresh timeout for every read
    PerRead { timeout: Duration },
    Unbounded,
}

#[derive(Debug)]
pub(crate) struct ReadDeadline {
    mode: Mode,
    deadline: Option<Instant>,
    last_pong: Option<Instant>,
}

impl ReadDeadline {
    /// Heartbeat mode; the first deadline is `pong_wait` from now
    pub(crate) fn pong(pong_wait: Duration) -> Self {
        Self {
            mode: Mode::Pong { wait: pong_wait },
            deadline: Some(Instant::now() + pong_wait),
            last_pong: None,
        }
    }

    /// Per-read timeout, `None` disables
    pub(crate) fn per_read(timeout: Option<Duration>) -> Self {
        let mode = match timeout {
            Some(timeout) => Mode::PerRead { timeout },
            None => Mode::Unbounded,
        };
        Self {
            mode,
            deadline: None,
            last_pong: None,
        }
    }

    /// Pick the mode for a connection
    pub(crate) fn for_connection(
        framed: bool,
        ping_interval: Option<Duration>,
        pong_wait: Duration,
        read_timeout: Option<Duration>,
    ) -> Self {
        if framed && ping_interval.is_some() {
            Self::pong(pong_wait)
        } else {
            Self::per_read(read_timeout)
        }
    }

    pub(crate) fn is_heartbeat(&self) -> bool {
        matches!(self.mode, Mode::Pong { .. })
    }

    /// Deadline for the read about to start
    pub(crate) fn next_read(&mut self) -> Option<Instant> {
        match self.mode {
            Mode::Pong { .. } => self.deadline,
            Mode::PerRead { timeout } => Some(Instant::now() + timeout),
            Mode::Unbounded => None,
        }
    }

    /// A pong arrived; push the deadline out by `pong_wait`
    pub(crate) fn record_pong(&mut self) {
        let now = Instant::now();
        self.last_pong = Some(now);
        if let Mode::Pong { wait } = self.mode {
            self.deadline = Some(now + wait);
        }
    }

    pub(crate) fn time_since_last_pong(&self) -> Option<Duration> {
        self.last_pong.map(|at| at.elapsed())
    }

    /// The limit that was exceeded, in milliseconds, for error reporting
    pub(crate) fn limit_ms(&self) -> u64 {
        match self.mode {
            Mode::Pong { wait } => wait.as_millis() as u64,
            Mode::PerRead { timeout } => timeout.as_millis() as u64,
            Mode::Unbounded => 0,
        }
    }
}
