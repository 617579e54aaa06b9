use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServicesError {
    /// The device's connection to the traffic layer is gone.
    #[error("device connection closed")]
    ConnectionClosed,
}
