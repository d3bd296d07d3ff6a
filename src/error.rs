use crate::record::RecordType;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SheafError {
    #[error("Record type '{record_type}' is not handled by connection '{connection}'")]
    NotHandled {
        record_type: RecordType,
        connection: String,
    },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Backend error on connection '{connection}': {message}")]
    Backend { connection: String, message: String },

    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

pub type Result<T> = std::result::Result<T, SheafError>;

impl SheafError {
    pub fn unknown_connection(name: &str) -> Self {
        SheafError::Configuration(format!("The connection '{}' is not configured", name))
    }

    pub fn backend(connection: &str, message: impl Into<String>) -> Self {
        SheafError::Backend {
            connection: connection.to_string(),
            message: message.into(),
        }
    }

    /// True for errors that leave an index stale rather than signalling misuse.
    pub fn is_backend_failure(&self) -> bool {
        matches!(
            self,
            SheafError::Backend { .. } | SheafError::Io(_) | SheafError::Json(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_handled_message() {
        let err = SheafError::NotHandled {
            record_type: RecordType::from("bar"),
            connection: "whoosh".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Record type 'bar' is not handled by connection 'whoosh'"
        );
        assert!(!err.is_backend_failure());
    }

    #[test]
    fn test_unknown_connection_is_configuration_error() {
        let err = SheafError::unknown_connection("nope");
        assert!(matches!(err, SheafError::Configuration(ref m) if m.contains("nope")));
    }

    #[test]
    fn test_backend_failure() {
        let err = SheafError::backend("default", "disk full");
        assert!(err.is_backend_failure());
        assert_eq!(err.to_string(), "Backend error on connection 'default': disk full");
    }
}
