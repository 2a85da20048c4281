use thiserror::Error;

/// Hub error taxonomy. None of these are fatal to the process: commands
/// report failure to the issuer, bad frames are dropped, connection faults
/// surface as an offline status.
#[derive(Debug, Error)]
pub enum HubError {
    /// Command target has no live session. No side effect, nothing queued.
    #[error("agent {0} is not connected")]
    NotConnected(String),

    /// Inbound frame failed parsing or range validation; prior snapshot kept.
    #[error("malformed metric frame: {0}")]
    MalformedFrame(String),

    /// Outbound command channel stalled; the connection is treated as dead.
    #[error("command delivery to agent {0} timed out")]
    SendTimeout(String),

    /// Agent presented a bad secret; refused before registration.
    #[error("agent authentication rejected")]
    AuthRejected,
}
