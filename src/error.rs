//! Error types for image editing.

/// Coarse classification of an [`EditError`].
///
/// The presentation layer only needs to know which bucket a failure falls in:
/// [`ErrorKind::InvalidCredential`] prompts for a new key, everything else is
/// shown as a message and leaves the credential alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Missing image, blank instruction or unsupported upload.
    InvalidRequest,
    /// The credential was rejected or is absent.
    InvalidCredential,
    /// The model declined to produce an image.
    GenerationBlocked,
    /// The model answered without an image and without a reason.
    EmptyResponse,
    /// Network, HTTP or payload failure.
    Transport,
    /// Local configuration or host problem.
    Config,
}

/// Errors that can occur while editing an image.
#[derive(Debug, thiserror::Error)]
pub enum EditError {
    /// No image selected, blank instruction, or similar caller mistake.
    #[error("{0}")]
    InvalidRequest(String),

    /// The uploaded file is not a PNG, JPEG or WEBP image.
    #[error("unsupported image: {0}")]
    UnsupportedImage(String),

    /// The upstream service rejected the credential.
    #[error("invalid API key: {0}")]
    InvalidCredential(String),

    /// No credential could be obtained.
    #[error("no API key available")]
    MissingCredential,

    /// The model declined to return an image (safety, policy, ...).
    #[error("Image generation was blocked due to: {0}.")]
    GenerationBlocked(String),

    /// The response carried no image part and no blocking reason.
    #[error("No image was generated. The response from the API was empty or did not contain image data.")]
    EmptyResponse,

    /// API returned an error response.
    #[error("API error: {status} - {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Upstream message, verbatim when available.
        message: String,
        /// Upstream status string (e.g. `INVALID_ARGUMENT`).
        code: Option<String>,
        /// Machine-readable reason from the error details (e.g. `API_KEY_INVALID`).
        reason: Option<String>,
    },

    /// Network or HTTP error.
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Failed to decode base64 data.
    #[error("failed to decode: {0}")]
    Decode(String),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Required configuration is missing.
    #[error("configuration error: {0}")]
    Config(String),

    /// The local settings file exists but cannot be parsed.
    #[error("stored settings at {} are unreadable: {message}", .path.display())]
    CorruptStore {
        /// Location of the settings file.
        path: std::path::PathBuf,
        /// Parser message.
        message: String,
    },

    /// The host key manager never became reachable.
    #[error("{0}")]
    HostUnavailable(String),

    /// I/O error (e.g., reading an upload or saving a result).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl EditError {
    /// Returns the classification of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidRequest(_) | Self::UnsupportedImage(_) => ErrorKind::InvalidRequest,
            Self::InvalidCredential(_) | Self::MissingCredential => ErrorKind::InvalidCredential,
            Self::GenerationBlocked(_) => ErrorKind::GenerationBlocked,
            Self::EmptyResponse => ErrorKind::EmptyResponse,
            Self::Api { .. } | Self::Network(_) | Self::Decode(_) | Self::Json(_) => {
                ErrorKind::Transport
            }
            Self::Config(_) | Self::CorruptStore { .. } | Self::HostUnavailable(_) | Self::Io(_) => {
                ErrorKind::Config
            }
        }
    }

    /// Returns true if this is a network/HTTP/payload failure.
    pub fn is_transport(&self) -> bool {
        self.kind() == ErrorKind::Transport
    }

    /// The message to show a user, without the variant prefix for upstream errors.
    pub fn user_message(&self) -> String {
        match self {
            Self::Api { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }
}

/// Result type alias for image editing operations.
pub type Result<T> = std::result::Result<T, EditError>;

/// Trims an upstream error body to something displayable.
///
/// HTML error pages are replaced by a short placeholder and very long bodies
/// are truncated on a character boundary.
pub(crate) fn sanitize_error_message(text: &str) -> String {
    const MAX_LEN: usize = 500;

    let trimmed = text.trim();
    if trimmed.starts_with("<!DOCTYPE") || trimmed.starts_with("<html") {
        return "upstream returned an HTML error page".into();
    }
    if trimmed.chars().count() <= MAX_LEN {
        return trimmed.to_string();
    }
    let mut out: String = trimmed.chars().take(MAX_LEN).collect();
    out.push_str("...");
    out
}
