use std::fmt;

/// Custom error type for ghsync operations
#[derive(Debug)]
pub enum SyncError {
    /// Retryable HTTP or connection failure that survived every retry
    TransientNetwork(String),
    /// Non-retryable HTTP failure (4xx other than 429, unexpected payloads)
    FatalRequest {
        status: Option<u16>,
        url: String,
        message: String,
    },
    /// Watermark query failed; callers degrade to a full load
    WatermarkLookup(String),
    /// Table metadata could not be read; callers degrade to pass-through
    SchemaIntrospection(String),
    /// Append, create or drop on the destination failed
    DestinationWrite(String),
    /// Configuration errors
    Config(String),
    /// Database connection or query errors
    Database(String),
    /// HTTP client errors outside of the retry loop
    Http(reqwest::Error),
    /// JSON parsing errors
    Json(serde_json::Error),
    /// Generic errors with message
    Generic(String),
}

impl fmt::Display for SyncError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncError::TransientNetwork(msg) => write!(f, "Transient network error: {}", msg),
            SyncError::FatalRequest { status: Some(status), url, message } => {
                write!(f, "Request to {} failed with status {}: {}", url, status, message)
            }
            SyncError::FatalRequest { status: None, url, message } => {
                write!(f, "Request to {} failed: {}", url, message)
            }
            SyncError::WatermarkLookup(msg) => write!(f, "Watermark lookup error: {}", msg),
            SyncError::SchemaIntrospection(msg) => write!(f, "Schema introspection error: {}", msg),
            SyncError::DestinationWrite(msg) => write!(f, "Destination write error: {}", msg),
            SyncError::Config(msg) => write!(f, "Configuration error: {}", msg),
            SyncError::Database(msg) => write!(f, "Database error: {}", msg),
            SyncError::Http(err) => write!(f, "HTTP error: {}", err),
            SyncError::Json(err) => write!(f, "JSON error: {}", err),
            SyncError::Generic(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for SyncError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SyncError::Http(err) => Some(err),
            SyncError::Json(err) => Some(err),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::Json(err)
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(err: reqwest::Error) -> Self {
        SyncError::Http(err)
    }
}

impl From<sqlx::Error> for SyncError {
    fn from(err: sqlx::Error) -> Self {
        SyncError::Database(err.to_string())
    }
}

impl From<std::num::ParseIntError> for SyncError {
    fn from(err: std::num::ParseIntError) -> Self {
        SyncError::Config(err.to_string())
    }
}

impl From<reqwest::header::InvalidHeaderValue> for SyncError {
    fn from(err: reqwest::header::InvalidHeaderValue) -> Self {
        SyncError::Config(err.to_string())
    }
}

impl From<url::ParseError> for SyncError {
    fn from(err: url::ParseError) -> Self {
        SyncError::Config(err.to_string())
    }
}

/// Result type alias for ghsync operations
pub type Result<T> = std::result::Result<T, SyncError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_request_display_with_status() {
        let err = SyncError::FatalRequest {
            status: Some(404),
            url: "https://api.github.com/repos/a/b/issues".to_string(),
            message: "Not Found".to_string(),
        };
        let text = err.to_string();
        assert!(text.contains("404"));
        assert!(text.contains("/repos/a/b/issues"));
    }

    #[test]
    fn test_destination_write_display() {
        let err = SyncError::DestinationWrite("append to GITHUB_ISSUES: disk full".into());
        assert_eq!(err.to_string(), "Destination write error: append to GITHUB_ISSUES: disk full");
    }

    #[test]
    fn test_parse_int_error_is_config() {
        let err: SyncError = "abc".parse::<u32>().unwrap_err().into();
        assert!(matches!(err, SyncError::Config(_)));
    }
}
