//! Container/codec negotiation for recordings

use crate::platform::MediaBackend;

/// Candidates probed after the user's preferred codec, best first
pub const CODEC_CANDIDATES: &[&str] = &[
    "video/mp4;codecs=h264",
    "video/mp4;codecs=avc1",
    "video/mp4",
    "video/webm;codecs=vp9,opus",
    "video/webm;codecs=vp8,opus",
    "video/webm;codecs=vp9",
    "video/webm;codecs=vp8",
    "video/webm",
];

/// Preference-ordered candidate list, preferred codec first and without duplicates
pub fn candidate_list(preferred: Option<&str>) -> Vec<String> {
    let mut candidates: Vec<String> = Vec::with_capacity(CODEC_CANDIDATES.len() + 1);
    if let Some(preferred) = preferred.map(str::trim).filter(|p| !p.is_empty()) {
        candidates.push(preferred.to_string());
    }
    for candidate in CODEC_CANDIDATES {
        if !candidates.iter().any(|c| c == candidate) {
            candidates.push(candidate.to_string());
        }
    }
    candidates
}

/// First candidate the platform can record; `None` means the platform default
pub fn negotiate(backend: &dyn MediaBackend, preferred: Option<&str>) -> Option<String> {
    let chosen = candidate_list(preferred)
        .into_iter()
        .find(|candidate| backend.is_type_supported(candidate));

    match &chosen {
        Some(mime) => log::info!("Using MIME type for recording: {}", mime),
        None => log::info!("Using MIME type for recording: (platform default)"),
    }
    chosen
}

/// File extension for a mime type
pub fn extension_for(mime_type: &str) -> &'static str {
    let essence = mime_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_lowercase();

    match essence.as_str() {
        "video/mp4" => "mp4",
        "video/webm" => "webm",
        "video/x-motion-jpeg" | "video/x-mjpeg" => "mjpeg",
        "image/jpeg" => "jpg",
        "image/png" => "png",
        _ if essence.starts_with("video/") => "video",
        _ => "bin",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_candidate_list_puts_preference_first() {
        let list = candidate_list(Some("video/webm;codecs=vp9"));
        assert_eq!(list[0], "video/webm;codecs=vp9");
        assert_eq!(list.len(), CODEC_CANDIDATES.len());
        assert_eq!(list.iter().filter(|c| *c == "video/webm;codecs=vp9").count(), 1);
    }

    #[test]
    fn test_candidate_list_without_preference() {
        let list = candidate_list(None);
        assert_eq!(list[0], "video/mp4;codecs=h264");
        assert_eq!(candidate_list(Some("  ")).len(), CODEC_CANDIDATES.len());
    }

    #[test]
    fn test_extensions() {
        assert_eq!(extension_for("video/mp4;codecs=h264"), "mp4");
        assert_eq!(extension_for("video/webm;codecs=vp8,opus"), "webm");
        assert_eq!(extension_for("video/x-motion-jpeg"), "mjpeg");
        assert_eq!(extension_for("image/jpeg"), "jpg");
        assert_eq!(extension_for("application/octet-stream"), "bin");
    }
}
