use std::fmt::Write;
use std::path::PathBuf;

use thiserror::Error;
use validator::ValidationErrors;

/// Failure to load or validate a simulator configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("configuration file not found: {0}")]
    FileNotFound(PathBuf),

    /// One or more fields failed validation; the config is rejected as a
    /// whole.
    #[error("invalid configuration:\n{}", field_errors(.0))]
    Validation(#[from] ValidationErrors),

    #[error("configuration parsing failed: {0}")]
    Parsing(#[from] figment::Error),
}

fn field_errors(errors: &ValidationErrors) -> String {
    let mut out = String::new();
    for (field, errors) in errors.field_errors() {
        for error in errors {
            let reason = error
                .message
                .as_ref()
                .map(|m| m.to_string())
                .unwrap_or_else(|| error.code.to_string());
            let _ = writeln!(out, "  {field}: {reason}");
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use validator::ValidationError;

    #[test]
    fn validation_errors_name_the_field() {
        let mut errors = ValidationErrors::new();
        errors.add("ap_mac", ValidationError::new("invalid_mac"));
        let message = ConfigError::from(errors).to_string();
        assert!(message.contains("ap_mac"), "{message}");
        assert!(message.contains("invalid_mac"), "{message}");
    }
}
