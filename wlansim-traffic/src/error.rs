use thiserror::Error;

/// Errors raised by the traffic layer.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TrafficError {
    /// A `route_macs` call referenced a worker connection the handler does
    /// not have. The whole call is rejected, nothing is applied.
    #[error("invalid connection id {id}, handler has {num_connections} worker connections")]
    InvalidConnectionId { id: usize, num_connections: usize },

    /// A worker or wire channel is closed. Loops treat this as a signal to
    /// stop cleanly.
    #[error("channel closed: {0}")]
    ChannelClosed(&'static str),

    /// The handler reported an internal failure for a remote call.
    #[error("remote call failed: {0}")]
    Remote(String),
}
