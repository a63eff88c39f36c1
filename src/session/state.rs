use std::fmt;

/// Lifecycle of a [`Session`](super::Session).
///
/// ```text
/// Disconnected ─connect()─► Connecting ─handshake ok─► Ready
///      ▲                        │                        │
///      └────────failure─────────┘                        │
///      │                                   disconnect() or link loss
///      └──────────── Disconnecting ◄─────────────────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Ready,
    Disconnecting,
}

impl ConnectionState {
    #[inline]
    pub fn is_ready(&self) -> bool {
        matches!(self, ConnectionState::Ready)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Ready => "ready",
            ConnectionState::Disconnecting => "disconnecting",
        };
        f.write_str(name)
    }
}
