use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PackagerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Already exists: {0}")]
    Conflict(String),

    #[error("Probe failed: {0}")]
    ProbeFailed(String),

    #[error("Transcoding failed: {0}")]
    Engine(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unrecognized content type: {0}")]
    UnrecognizedContentType(String),
}

/// Caller-facing failure category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorKind {
    Validation,
    Conflict,
    ProbeFailure,
    EngineFailure,
    NotFound,
    Internal,
}

impl PackagerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PackagerError::Validation(_) => ErrorKind::Validation,
            PackagerError::Conflict(_) => ErrorKind::Conflict,
            PackagerError::ProbeFailed(_) => ErrorKind::ProbeFailure,
            PackagerError::Engine(_) => ErrorKind::EngineFailure,
            PackagerError::NotFound(_) => ErrorKind::NotFound,
            PackagerError::Io(_)
            | PackagerError::Toml(_)
            | PackagerError::Config(_)
            | PackagerError::UnrecognizedContentType(_) => ErrorKind::Internal,
        }
    }
}

impl ErrorKind {
    /// Stable code used in structured error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "ValidationError",
            ErrorKind::Conflict => "Conflict",
            ErrorKind::ProbeFailure => "ProbeFailed",
            ErrorKind::EngineFailure => "TranscodingFailed",
            ErrorKind::NotFound => "NotFound",
            ErrorKind::Internal => "InternalServerError",
        }
    }
}

pub type Result<T> = std::result::Result<T, PackagerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_mapping() {
        assert_eq!(PackagerError::Validation("x".into()).kind(), ErrorKind::Validation);
        assert_eq!(PackagerError::Conflict("x".into()).kind(), ErrorKind::Conflict);
        assert_eq!(PackagerError::ProbeFailed("x".into()).kind(), ErrorKind::ProbeFailure);
        assert_eq!(PackagerError::Engine("x".into()).kind(), ErrorKind::EngineFailure);
        assert_eq!(PackagerError::NotFound("x".into()).kind(), ErrorKind::NotFound);
        assert_eq!(
            PackagerError::UnrecognizedContentType("x".into()).kind(),
            ErrorKind::Internal
        );
    }

    #[test]
    fn test_toml_error_is_internal() {
        let err: PackagerError = toml::from_str::<toml::Value>("= broken").unwrap_err().into();
        assert_eq!(err.kind(), ErrorKind::Internal);
    }

    #[test]
    fn test_engine_message_is_preserved() {
        let err = PackagerError::Engine("ffmpeg exited with status 1: boom".into());
        assert!(err.to_string().contains("boom"));
        assert_eq!(err.kind().code(), "TranscodingFailed");
    }
}
