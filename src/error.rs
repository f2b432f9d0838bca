use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExperimentError {
    #[error("Test not found: {0}")]
    NotFound(String),

    #[error("Test already exists: {0}")]
    AlreadyExists(String),

    #[error("Invalid status transition: test is {0}")]
    InvalidStatus(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid modification on {target}: {reason}")]
    InvalidModification { target: String, reason: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ExperimentError>;

impl ExperimentError {
    /// True for errors caused by the caller's input rather than the environment.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            ExperimentError::NotFound(_)
                | ExperimentError::AlreadyExists(_)
                | ExperimentError::InvalidStatus(_)
                | ExperimentError::Validation(_)
                | ExperimentError::InvalidModification { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_error_message_includes_reason() {
        let e = ExperimentError::Validation("trafficSplit must sum to 100, got 90".to_string());
        assert_eq!(
            e.to_string(),
            "Validation error: trafficSplit must sum to 100, got 90"
        );
    }

    #[test]
    fn io_errors_convert_and_are_not_client_errors() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk gone");
        let e: ExperimentError = io.into();
        assert!(matches!(e, ExperimentError::Io(_)));
        assert!(!e.is_client_error());
    }

    #[test]
    fn invalid_modification_is_client_error() {
        let e = ExperimentError::InvalidModification {
            target: "email".to_string(),
            reason: "value must be an object".to_string(),
        };
        assert!(e.is_client_error());
        assert!(e.to_string().contains("email"));
    }
}
