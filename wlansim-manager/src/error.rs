use thiserror::Error;
use wlansim_core::{CoreError, MacAddr};
use wlansim_traffic::TrafficError;

#[derive(Debug, Error)]
pub enum ManagerError {
    /// Malformed input to a validated API; nothing was applied.
    #[error("invalid {field}: {value:?}")]
    InvalidArgument { field: &'static str, value: String },

    #[error("device {0} already exists")]
    DuplicateMac(MacAddr),

    #[error("no access points to attach clients to")]
    NoAccessPoints,

    #[error("worker channel closed")]
    WorkerClosed,

    #[error("unexpected worker response")]
    UnexpectedResponse,

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Traffic(#[from] TrafficError),
}
