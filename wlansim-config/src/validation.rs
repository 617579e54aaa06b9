//! Custom validation functions for configuration.
//!
//! Shared validation logic used across multiple configuration modules.

use std::net::Ipv4Addr;

use validator::ValidationError;

/// Validate the textual MAC form `xx:xx:xx:xx:xx:xx` (lowercase or
/// uppercase hex).
pub fn validate_mac(value: &str) -> Result<(), ValidationError> {
    let re = regex::Regex::new("^([0-9a-fA-F]{2}:){5}[0-9a-fA-F]{2}$")
        .map_err(|_| ValidationError::new("invalid_regex"))?;
    if re.is_match(value) {
        Ok(())
    } else {
        Err(ValidationError::new("invalid_mac"))
    }
}

/// Validate a dotted-quad IPv4 address.
pub fn validate_ipv4(value: &str) -> Result<(), ValidationError> {
    value
        .parse::<Ipv4Addr>()
        .map(|_| ())
        .map_err(|_| ValidationError::new("invalid_ipv4"))
}

/// Validate that a backoff slot time is positive and sane.
pub fn validate_slot_time(value: f64) -> Result<(), ValidationError> {
    if value > 0.0 && value <= 60.0 {
        Ok(())
    } else {
        Err(ValidationError::new("invalid_slot_time"))
    }
}
