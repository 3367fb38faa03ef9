use std::fmt;

/// Lifecycle of a [`ClientSession`](crate::core::client::ClientSession)
///
/// ```text
/// Disconnected -> Connecting -> Connected -> Reconnecting -> Connecting -> ...
///       ^______________|____________|______________|
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

impl SessionState {
    /// Whether the state machine allows moving from `self` to `next`
    ///
    /// Every state may fall back to `Disconnected`.
    pub fn can_transition_to(self, next: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, next),
            (_, Disconnected)
                | (Disconnected, Connecting)
                | (Reconnecting, Connecting)
                | (Connecting, Connected)
                | (Connecting, Reconnecting)
                | (Connected, Reconnecting)
        )
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionState::Disconnected => "disconnected",
            SessionState::Connecting => "connecting",
            SessionState::Connected => "connected",
            SessionState::Reconnecting => "reconnecting",
        };
        f.write_str(s)
    }
}

/// Lifecycle of one [`Connection`](crate::core::connection::Connection), forward only
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ConnState {
    Open,
    Closing,
    Closed,
}

impl fmt::Display for ConnState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnState::Open => "open",
            ConnState::Closing => "closing",
            ConnState::Closed => "closed",
        };
        f.write_str(s)
    }
}
