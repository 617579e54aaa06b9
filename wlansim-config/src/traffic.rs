//! Traffic-layer configuration: ports and worker sizing.

use serde::{Deserialize, Serialize};
use validator::Validate;

/// Traffic handler parameters.
#[derive(Debug, Serialize, Deserialize, Validate, Clone)]
pub struct TrafficConfig {
    /// Capture port indices, one traffic handler each.
    #[validate(length(min = 1))]
    #[serde(default = "default_ports")]
    pub ports: Vec<u8>,

    /// Worker processes per handler. Defaults to the CPU count minus the
    /// three handler threads, never below one.
    #[serde(default = "default_num_workers")]
    #[validate(range(min = 1, max = 256))]
    pub num_workers: usize,

    /// Wire/worker poll interval in milliseconds.
    #[serde(default = "default_poll_interval_ms")]
    #[validate(range(min = 1, max = 1000))]
    pub poll_interval_ms: u64,
}

fn default_ports() -> Vec<u8> {
    vec![0]
}

fn default_num_workers() -> usize {
    num_cpus::get().saturating_sub(3).max(1)
}

fn default_poll_interval_ms() -> u64 {
    1
}

impl Default for TrafficConfig {
    fn default() -> Self {
        Self {
            ports: default_ports(),
            num_workers: default_num_workers(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}
