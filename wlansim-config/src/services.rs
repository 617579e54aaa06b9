//! Protocol service tuning: retransmission backoff per service.

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::validation;

/// Backoff parameters for one service's retransmission schedule.
#[derive(Debug, Serialize, Deserialize, Validate, Clone, Copy)]
pub struct BackoffConfig {
    /// Backoff slot time in seconds; retry `i` waits ~`slot_time^(i+1)`.
    #[serde(default = "default_slot_time")]
    #[validate(custom(function = validation::validate_slot_time))]
    pub slot_time: f64,

    /// Timeouts before the attempt counter wraps back to zero.
    #[serde(default = "default_max_retries")]
    #[validate(range(min = 1, max = 16))]
    pub max_retries: u32,
}

fn default_slot_time() -> f64 {
    2.0
}

fn default_max_retries() -> u32 {
    3
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            slot_time: default_slot_time(),
            max_retries: default_max_retries(),
        }
    }
}

/// Per-service configuration.
#[derive(Debug, Default, Serialize, Deserialize, Validate, Clone, Copy)]
pub struct ServicesConfig {
    #[validate(nested)]
    #[serde(default)]
    pub association: BackoffConfig,

    #[validate(nested)]
    #[serde(default)]
    pub dhcp: BackoffConfig,
}
