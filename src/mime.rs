//! Content sniffing and the accepted-format allow-list.
//!
//! The client-declared part `Content-Type` is never trusted. The upload is
//! identified from its leading bytes via the `image` crate's magic-number
//! table, and only formats on the allow-list pass.

use serde::{Deserialize, Serialize};

pub const IMAGE_PNG: &str = "image/png";
pub const IMAGE_JPEG: &str = "image/jpeg";

/// Identify a buffer by its magic number. `None` for anything unrecognized,
/// including an empty buffer.
pub fn sniff(bytes: &[u8]) -> Option<&'static str> {
    if bytes.is_empty() {
        return None;
    }
    image::guess_format(bytes).ok().map(|f| f.to_mime_type())
}

/// MIME types the pipeline accepts, compared case-insensitively.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MimeAllowList(Vec<String>);

impl MimeAllowList {
    pub fn new<I, S>(types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(types.into_iter().map(Into::into).collect())
    }

    /// Parse a comma-separated list, dropping blank entries.
    pub fn from_csv(list: &str) -> Self {
        Self::new(
            list.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string),
        )
    }

    pub fn allows(&self, mime: &str) -> bool {
        self.0.iter().any(|m| m.trim().eq_ignore_ascii_case(mime))
    }

    pub fn entries(&self) -> &[String] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Default for MimeAllowList {
    fn default() -> Self {
        Self::new([IMAGE_PNG, IMAGE_JPEG])
    }
}

/// True when the bytes sniff as a type on the allow-list.
pub fn validate(bytes: &[u8], allowed: &MimeAllowList) -> bool {
    sniff(bytes).is_some_and(|mime| allowed.allows(mime))
}
