// Local upload validation. Runs before any network call; failures never touch analysis status.

use tracing::warn;

use crate::error::EngineError;
use crate::types::{MediaKind, UploadLimits};

const VIDEO_EXTENSIONS: [&str; 6] = ["mp4", "mov", "webm", "avi", "mkv", "m4v"];
const IMAGE_EXTENSIONS: [&str; 6] = ["jpg", "jpeg", "png", "webp", "gif", "bmp"];

/// Classify an upload as image or video, rejecting unsupported types and oversized videos.
///
/// MIME types are often missing or generic (`application/octet-stream`), so the
/// file extension is accepted as an alternative. Video wins when both match.
pub fn validate_upload(
    name: &str,
    mime: &str,
    size: u64,
    limits: &UploadLimits,
) -> Result<MediaKind, EngineError> {
    let extension = extension_of(name);
    let has_extension = |list: &[&str]| extension.as_deref().is_some_and(|ext| list.contains(&ext));

    if mime.starts_with("video/") || has_extension(&VIDEO_EXTENSIONS) {
        if size > limits.max_video_bytes {
            warn!(name, size, limit = limits.max_video_bytes, "video rejected: too large");
            return Err(EngineError::VideoTooLarge {
                size,
                limit: limits.max_video_bytes,
            });
        }
        return Ok(MediaKind::Video);
    }

    if mime.starts_with("image/") || has_extension(&IMAGE_EXTENSIONS) {
        return Ok(MediaKind::Image);
    }

    warn!(name, mime, "upload rejected: unsupported type");
    Err(EngineError::UnsupportedFile {
        name: name.to_string(),
    })
}

/// MIME type to send upstream: the declared one when specific, else a guess from the name.
pub fn media_mime(name: &str, declared: &str, kind: MediaKind) -> String {
    if !declared.is_empty() && declared != "application/octet-stream" {
        return declared.to_string();
    }
    match mime_guess::from_path(name).first() {
        Some(guess) => guess.essence_str().to_string(),
        None => match kind {
            MediaKind::Image => "image/jpeg".to_string(),
            MediaKind::Video => "video/mp4".to_string(),
        },
    }
}

fn extension_of(name: &str) -> Option<String> {
    let (_, ext) = name.rsplit_once('.')?;
    Some(ext.to_ascii_lowercase())
}
