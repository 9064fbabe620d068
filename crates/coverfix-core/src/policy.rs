//! Skip rules for candidate covers
//!
//! Rule 1: no cover value, or the value does not look like a URL. Skipped
//! silently. Rule 2: a direct video reference, meaning the path portion
//! ends in a video extension and no processing-parameter marker appears
//! anywhere in the URL. Skipped with an explicit notice. A URL carrying
//! the marker is image-convertible and is NOT skipped.
//!
//! The boundary conditions (extension case, query-string ordering) are
//! policy, not hardcoded assumptions: extensions match the path portion
//! before `?`/`#` ASCII case-insensitively, the marker matches anywhere.

use serde::{Deserialize, Serialize};

/// What to do with a record's cover
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoverDisposition {
    /// Fetch the resource and derive dimensions
    Fetch,
    /// Skip: no value, or not a URL (rule 1)
    MissingUrl,
    /// Skip: direct video reference (rule 2)
    DirectVideo,
}

/// Configurable skip policy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkipPolicy {
    /// Substring a value must carry to count as a URL
    pub url_marker: String,
    /// Path extensions treated as direct video
    pub video_extensions: Vec<String>,
    /// Processing-parameter marker that makes a video URL image-convertible
    pub processing_marker: String,
}

impl Default for SkipPolicy {
    fn default() -> Self {
        Self {
            url_marker: "http".to_string(),
            video_extensions: vec![".mp4".to_string()],
            processing_marker: "x-oss-process".to_string(),
        }
    }
}

impl SkipPolicy {
    /// Classify a record's cover value
    #[must_use]
    pub fn classify(&self, cover: Option<&str>) -> CoverDisposition {
        let Some(cover) = cover else {
            return CoverDisposition::MissingUrl;
        };
        if cover.is_empty() || !cover.contains(&self.url_marker) {
            return CoverDisposition::MissingUrl;
        }
        if self.is_direct_video(cover) {
            return CoverDisposition::DirectVideo;
        }
        CoverDisposition::Fetch
    }

    fn is_direct_video(&self, url: &str) -> bool {
        if url.contains(&self.processing_marker) {
            return false;
        }
        let path = url.split(['?', '#']).next().unwrap_or(url);
        let path = path.to_ascii_lowercase();
        self.video_extensions
            .iter()
            .any(|ext| path.ends_with(ext.as_str()))
    }
}
