//! Error types shared by the model client and speech output.

/// Errors from the tutor's remote and local collaborators.
#[derive(Debug, thiserror::Error)]
pub enum TutorError {
    /// Network failure or a non-success status from a provider.
    #[error("transport error{}: {message}", status.map(|s| format!(" ({})", s)).unwrap_or_default())]
    Transport { status: Option<u16>, message: String },
    /// The provider answered but the reply was missing its expected structure.
    #[error("malformed response: {0}")]
    MalformedResponse(String),
    /// Local or remote audio could not be produced or played.
    #[error("playback error: {0}")]
    Playback(String),
    /// A remote path was requested without its credential.
    #[error("{0} is not configured")]
    Unconfigured(&'static str),
}

impl TutorError {
    pub fn status(status: u16, message: impl Into<String>) -> Self {
        TutorError::Transport {
            status: Some(status),
            message: message.into(),
        }
    }

    /// Status code carried by a transport error, if any.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            TutorError::Transport { status, .. } => *status,
            _ => None,
        }
    }
}

impl From<reqwest::Error> for TutorError {
    fn from(err: reqwest::Error) -> Self {
        // URLs may carry credentials in their query string
        let err = err.without_url();
        TutorError::Transport {
            status: err.status().map(|s| s.as_u16()),
            message: err.to_string(),
        }
    }
}

impl From<std::io::Error> for TutorError {
    fn from(err: std::io::Error) -> Self {
        TutorError::Playback(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_display_with_status() {
        let err = TutorError::status(500, "Internal Server Error");
        assert_eq!(err.to_string(), "transport error (500): Internal Server Error");
        assert_eq!(err.status_code(), Some(500));
    }

    #[test]
    fn test_transport_display_without_status() {
        let err = TutorError::Transport {
            status: None,
            message: "connection refused".to_string(),
        };
        assert_eq!(err.to_string(), "transport error: connection refused");
        assert_eq!(err.status_code(), None);
    }

    #[test]
    fn test_other_variants_display() {
        assert_eq!(
            TutorError::MalformedResponse("no candidates".to_string()).to_string(),
            "malformed response: no candidates"
        );
        assert_eq!(
            TutorError::Playback("player exited".to_string()).to_string(),
            "playback error: player exited"
        );
        assert_eq!(
            TutorError::Unconfigured("Gemini API key").to_string(),
            "Gemini API key is not configured"
        );
        assert_eq!(TutorError::Playback(String::new()).status_code(), None);
    }

    #[test]
    fn test_from_io_error_is_playback() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "say not found");
        let err: TutorError = io.into();
        assert!(matches!(err, TutorError::Playback(_)));
        assert!(err.to_string().contains("say not found"));
    }
}
