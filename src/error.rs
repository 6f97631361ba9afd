// Typed errors with thiserror. Every error carries a user-facing message for the UI.

use thiserror::Error;

/// Generic message shown when analysis fails for an unrecognised reason,
/// including compositing failures.
pub const ANALYSIS_FAILED_MESSAGE: &str = "Analysis failed. The AI could not process this file; \
     make sure the image or video is clear and in a supported format.";

/// Engine error types.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Unsupported file type: {name}")]
    UnsupportedFile { name: String },

    #[error("Video too large: {size} bytes exceeds the {limit} byte limit")]
    VideoTooLarge { size: u64, limit: u64 },

    #[error("No media loaded")]
    NoMedia,

    #[error("An analysis is already running")]
    Busy,

    #[error("Drawing surface unavailable for a {width}x{height} raster")]
    SurfaceUnavailable { width: u32, height: u32 },

    #[error("Image decode error: {0}")]
    ImageDecode(String),

    #[error("Image encode error: {0}")]
    Encode(String),

    #[error(transparent)]
    Analysis(#[from] AnalysisError),

    #[error("Export error: {0}")]
    Export(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl EngineError {
    /// Message suitable for direct display.
    pub fn user_message(&self) -> String {
        match self {
            EngineError::UnsupportedFile { .. } => {
                "Unsupported file format. Please upload a JPG/PNG image or an MP4/MOV video."
                    .to_string()
            }
            EngineError::VideoTooLarge { limit, .. } => format!(
                "Video file too large (>{}MB). Please upload a shorter clip.",
                limit / (1024 * 1024)
            ),
            EngineError::NoMedia => "Please upload a track image or video first.".to_string(),
            EngineError::Busy => "An analysis is already in progress.".to_string(),
            EngineError::SurfaceUnavailable { .. }
            | EngineError::ImageDecode(_)
            | EngineError::Encode(_) => ANALYSIS_FAILED_MESSAGE.to_string(),
            EngineError::Analysis(err) => err.user_message().to_string(),
            EngineError::Export(_) => "PDF export failed, please try again.".to_string(),
            other => other.to_string(),
        }
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        EngineError::Serialization(err.to_string())
    }
}

impl From<image::ImageError> for EngineError {
    fn from(err: image::ImageError) -> Self {
        match err {
            image::ImageError::Encoding(e) => EngineError::Encode(e.to_string()),
            other => EngineError::ImageDecode(other.to_string()),
        }
    }
}

/// Failures surfaced by the remote analysis backend.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AnalysisError {
    /// Request rejected as malformed or media unrecognisable (HTTP 400-like).
    #[error("Bad media: {0}")]
    BadMedia(String),

    /// Service temporarily unavailable (HTTP 503-like).
    #[error("Service busy: {0}")]
    ServiceBusy(String),

    /// Content blocked by the provider's safety filters.
    #[error("Blocked by safety filter: {0}")]
    SafetyBlocked(String),

    #[error("Analysis failed: {0}")]
    Failed(String),
}

impl AnalysisError {
    /// Classify a raw failure message by the markers providers put in them.
    pub fn classify(message: impl Into<String>) -> Self {
        let message = message.into();
        if message.contains("400") {
            AnalysisError::BadMedia(message)
        } else if message.contains("503") {
            AnalysisError::ServiceBusy(message)
        } else if message.to_ascii_lowercase().contains("safety") {
            AnalysisError::SafetyBlocked(message)
        } else {
            AnalysisError::Failed(message)
        }
    }

    pub fn user_message(&self) -> &'static str {
        match self {
            AnalysisError::BadMedia(_) => {
                "The image format is invalid or could not be recognised; please try another image."
            }
            AnalysisError::ServiceBusy(_) => {
                "The AI service is temporarily busy, please try again later."
            }
            AnalysisError::SafetyBlocked(_) => {
                "The image content was blocked by the system; please make sure it complies with the content policy."
            }
            AnalysisError::Failed(_) => ANALYSIS_FAILED_MESSAGE,
        }
    }
}
