//! Error types for the weather fetch pipeline.

use thiserror::Error;

/// Errors that abort a fetch.
///
/// Missing fields, unparsable intercepted bodies and selector-wait timeouts
/// are not errors; they surface as `null` fields in the snapshot.
#[derive(Debug, Error)]
pub enum ScrapeError {
    /// Chrome could not be started or the page could not be opened
    #[error("Browser launch failed: {0}")]
    Launch(String),

    /// Navigation to the source page failed
    #[error("Navigation failed: {0}")]
    Navigation(String),

    /// Navigation did not finish within its budget
    #[error("Navigation timed out after {0}s")]
    Timeout(u64),

    /// A script could not be evaluated in the page
    #[error("Script evaluation failed: {0}")]
    Evaluation(String),

    /// Invalid runtime configuration
    #[error("Config error: {0}")]
    Config(String),

    /// The background fetch task panicked or was cancelled
    #[error("Fetch task failed: {0}")]
    Task(String),
}

impl From<chromiumoxide::error::CdpError> for ScrapeError {
    fn from(err: chromiumoxide::error::CdpError) -> Self {
        ScrapeError::Evaluation(err.to_string())
    }
}

impl From<serde_json::Error> for ScrapeError {
    fn from(err: serde_json::Error) -> Self {
        ScrapeError::Evaluation(format!("unexpected script result: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_keeps_underlying_message() {
        let err = ScrapeError::Navigation("net::ERR_NAME_NOT_RESOLVED".into());
        assert_eq!(
            err.to_string(),
            "Navigation failed: net::ERR_NAME_NOT_RESOLVED"
        );
    }

    #[test]
    fn test_task_display() {
        let err = ScrapeError::Task("task 7 panicked".into());
        assert_eq!(err.to_string(), "Fetch task failed: task 7 panicked");
    }

    #[test]
    fn test_timeout_display() {
        assert_eq!(
            ScrapeError::Timeout(60).to_string(),
            "Navigation timed out after 60s"
        );
    }
}
