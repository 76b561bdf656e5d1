//! Error taxonomy for the reply pipeline.
//!
//! Failures are scoped: a bad bounding box skips one face, a broken
//! recognizer response or a failed upload abandons one reply, a rejected
//! credential stops the process. Nothing in here is allowed to take the
//! stream loop down except [`BotError::Authentication`].

use thiserror::Error;

/// Reply pipeline errors
#[derive(Error, Debug)]
pub enum BotError {
    /// Degenerate face bounding box. Recoverable per-face: skip the face.
    #[error("invalid face geometry: bounding box {width}x{height}")]
    InvalidGeometry { width: f64, height: f64 },

    /// Recognizer response missing required fields or unparsable.
    /// Recoverable per-reply: abandon this reply, keep the stream.
    #[error("malformed recognizer response: {0}")]
    MalformedResponse(String),

    /// A recognition, download, upload, or post call failed or timed out.
    /// Recoverable per-reply; retries are left to outer supervision.
    #[error("transient service failure: {0}")]
    Transient(String),

    /// Credentials rejected by the platform. Fatal: a broken session must
    /// not keep consuming the stream.
    #[error("authentication rejected: {0}")]
    Authentication(String),

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, BotError>;

impl BotError {
    /// Whether this error should stop the whole process.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Authentication(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn authentication_is_fatal() {
        assert!(BotError::Authentication("401".into()).is_fatal());
    }

    #[test]
    fn per_face_and_per_reply_errors_are_not_fatal() {
        assert!(!BotError::InvalidGeometry {
            width: 0.0,
            height: 10.0
        }
        .is_fatal());
        assert!(!BotError::MalformedResponse("missing faces".into()).is_fatal());
        assert!(!BotError::Transient("timeout".into()).is_fatal());
    }

    #[test]
    fn geometry_error_reports_extents() {
        let err = BotError::InvalidGeometry {
            width: 0.0,
            height: 42.0,
        };
        let msg = err.to_string();
        assert!(msg.contains("0x42"));
    }
}
