//! SourceClassifier - human readable labels for stream sources
//!
//! Pure function over the effective source string and an optional uploaded
//! file name. First matching rule wins:
//!
//! 1. `youtube.com` / `youtu.be` anywhere -> "YouTube Stream"
//! 2. `rtsp://` prefix -> "RTSP Camera"
//! 3. `http://` / `https://` prefix -> "Online Video - <last segment>"
//! 4. uploaded file name present -> "Local Video - <uploaded name>"
//! 5. otherwise -> "Local Video - <last path segment>"

/// Label for a stream source
pub fn classify(source: &str, uploaded_name: Option<&str>) -> String {
    let lower = source.trim().to_lowercase();

    if lower.contains("youtube.com") || lower.contains("youtu.be") {
        return "YouTube Stream".to_string();
    }

    if lower.starts_with("rtsp://") {
        return "RTSP Camera".to_string();
    }

    if lower.starts_with("http://") || lower.starts_with("https://") {
        let last = last_segment(source.trim(), &['/']).unwrap_or("Online Video");
        return format!("Online Video - {}", last);
    }

    if let Some(name) = uploaded_name.filter(|n| !n.is_empty()) {
        return format!("Local Video - {}", name);
    }

    let last = last_segment(source.trim(), &['/', '\\']).unwrap_or("Local Video");
    format!("Local Video - {}", last)
}

/// Final non-empty segment after the last separator
fn last_segment<'a>(source: &'a str, separators: &[char]) -> Option<&'a str> {
    source
        .rsplit(|c| separators.contains(&c))
        .next()
        .filter(|s| !s.is_empty())
}
