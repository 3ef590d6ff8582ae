//! Error types for polling and rendering.

use thiserror::Error;

// ============================================================================
// PollError
// ============================================================================

/// An error reported by a polling target.
///
/// Targets signal failure by returning `Err` from
/// [`PollTarget::fetch`](crate::PollTarget::fetch). The message is expected to
/// be descriptive enough for display (for example, parsed from an HTTP error
/// body by the collaborator that implements the target). Poll errors never
/// stop the timer; they are recorded on the client and routed to the delegate.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct PollError {
    /// Human-readable description of the failure.
    pub message: String,
}

impl PollError {
    /// Creates a poll error with the given message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<String> for PollError {
    fn from(message: String) -> Self {
        Self { message }
    }
}

impl From<&str> for PollError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

// ============================================================================
// RenderError
// ============================================================================

/// An error encountered while composing or encoding an icon.
///
/// Render errors are terminal to a single badge update: the renderer falls
/// back to clearing the displayed image rather than propagating further.
#[derive(Debug, Error)]
pub enum RenderError {
    /// The base image file could not be read.
    #[error("failed to read image: {0}")]
    Io(#[from] std::io::Error),

    /// The image bytes could not be decoded or encoded.
    #[error("image codec error: {0}")]
    Codec(#[from] image::ImageError),

    /// A `data:` URI was malformed or its payload was not valid base64.
    #[error("invalid image data URI")]
    InvalidDataUri,

    /// The base64 payload of a data URI could not be decoded.
    #[error("base64 decode error: {0}")]
    Base64(#[from] base64::DecodeError),

    /// No base image is available to compose.
    #[error("no base image available")]
    NoBaseImage,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn poll_error_displays_message() {
        let err = PollError::new("Unauthorized");
        assert_eq!(err.to_string(), "Unauthorized");
    }

    #[test]
    fn poll_error_from_str() {
        let err: PollError = "timed out".into();
        assert_eq!(err.message, "timed out");
    }

    #[test]
    fn render_error_wraps_io() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: RenderError = io.into();
        assert!(err.to_string().contains("missing"));
    }
}
