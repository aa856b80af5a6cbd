//! Error types for the console core
//!
//! `ApiError` covers everything that can go wrong talking to the fleet API
//! (transport failure, non-2xx answer, undecodable body). `ConsoleError` wraps
//! it together with local failures (validation, configuration).

/// Failures of a single call against the fleet API
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ApiError {
    /// Request never got an HTTP answer (connect refused, timeout, reset...)
    #[error("transport error: {0}")]
    Transport(String),
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("not found: {0}")]
    NotFound(String),
    #[error("invalid response body: {0}")]
    Decode(String),
}

impl ApiError {
    pub fn is_transport(&self) -> bool {
        matches!(self, ApiError::Transport(_))
    }

    pub fn status_code(&self) -> Option<u16> {
        match self {
            ApiError::Status { status, .. } => Some(*status),
            ApiError::NotFound(_) => Some(404),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ApiError::Decode(err.to_string())
        } else if let Some(status) = err.status() {
            ApiError::Status { status: status.as_u16(), body: err.to_string() }
        } else {
            ApiError::Transport(err.to_string())
        }
    }
}

/// Errors surfaced by the console operations
#[derive(Debug, thiserror::Error)]
pub enum ConsoleError {
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error("invalid inverter configuration: {0}")]
    InvalidConfig(String),
    #[error("unknown inverter: {0}")]
    UnknownInverter(String),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(ApiError::NotFound("7".into()).status_code(), Some(404));
        assert_eq!(
            ApiError::Status { status: 503, body: "busy".into() }.status_code(),
            Some(503)
        );
        assert_eq!(ApiError::Transport("refused".into()).status_code(), None);
        assert!(ApiError::Transport("refused".into()).is_transport());
    }

    #[test]
    fn test_console_error_wraps_api_error() {
        let err: ConsoleError = ApiError::Decode("eof".into()).into();
        assert_eq!(err.to_string(), "invalid response body: eof");
    }
}
