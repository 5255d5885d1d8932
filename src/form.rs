//! Form extraction: part stream → [`UploadPayload`].
//!
//! Scans every part once. The file part named by [`FormFields::upload`]
//! becomes the payload's binary content; parts whose names match one of the
//! scalar fields are read as text; everything else is skipped unread.
//!
//! ## Duplicate uploads
//!
//! The first `upload` file part wins. Later ones are left unread and logged,
//! so the payload content is assigned at most once per request.

use crate::multipart::{MultipartError, PartStream};
use tracing::{debug, warn};

/// Form field names the extractor recognizes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormFields {
    /// File field carrying the image.
    pub upload: String,
    /// Optional destination path.
    pub path: String,
    /// Optional comma-separated tags.
    pub tags: String,
}

impl Default for FormFields {
    fn default() -> Self {
        Self {
            upload: "upload".to_string(),
            path: "upload-path".to_string(),
            tags: "upload-tags".to_string(),
        }
    }
}

/// Everything the form carried that the pipeline cares about.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadPayload {
    /// File content; empty when no upload part was present.
    pub upload: Vec<u8>,
    /// Client filename of the upload part.
    pub filename: Option<String>,
    pub path: Option<String>,
    pub tags: Option<String>,
}

impl UploadPayload {
    pub fn has_upload(&self) -> bool {
        self.filename.is_some()
    }

    /// Tags split on commas, trimmed, empties dropped.
    pub fn tag_list(&self) -> Vec<&str> {
        self.tags
            .as_deref()
            .map(|tags| {
                tags.split(',')
                    .map(str::trim)
                    .filter(|t| !t.is_empty())
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Consume the stream to its end and assemble the payload.
pub fn extract(
    stream: &mut PartStream,
    fields: &FormFields,
) -> Result<UploadPayload, MultipartError> {
    let mut payload = UploadPayload::default();

    while let Some(mut part) = stream.next_part()? {
        let Some(name) = part.form_name().map(str::to_string) else {
            debug!("skipping part without a form name");
            continue;
        };

        let filename = part.file_name().map(str::to_string);
        if let (true, Some(filename)) = (name == fields.upload, filename) {
            if payload.has_upload() {
                warn!(filename = %filename, "ignoring additional upload part");
                continue;
            }
            payload.upload = part.read_bytes()?;
            debug!(filename = %filename, bytes = payload.upload.len(), "read upload part");
            payload.filename = Some(filename);
            continue;
        }

        let value = part.read_text()?;
        if name == fields.path {
            payload.path = Some(value);
        } else if name == fields.tags {
            payload.tags = Some(value);
        } else {
            debug!(field = %name, "ignoring unrecognized field");
        }
    }

    Ok(payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::multipart::MultipartWriter;

    const PNG_MAGIC: &[u8] = b"\x89PNG\r\n\x1a\n\0\0";

    fn extract_body(body: Vec<u8>) -> Result<UploadPayload, MultipartError> {
        let mut stream = PartStream::new(body, "X");
        extract(&mut stream, &FormFields::default())
    }

    #[test]
    fn extracts_upload_and_scalars() {
        let body = MultipartWriter::new("X")
            .field("upload-path", "/albums/cats")
            .field("upload-tags", "cat, cute,,")
            .file("upload", "cat.png", "image/png", PNG_MAGIC)
            .finish();

        let payload = extract_body(body).unwrap();
        assert_eq!(payload.upload, PNG_MAGIC);
        assert_eq!(payload.filename.as_deref(), Some("cat.png"));
        assert_eq!(payload.path.as_deref(), Some("/albums/cats"));
        assert_eq!(payload.tag_list(), vec!["cat", "cute"]);
    }

    #[test]
    fn missing_upload_yields_empty_payload() {
        let body = MultipartWriter::new("X")
            .field("something-else", "value")
            .finish();

        let payload = extract_body(body).unwrap();
        assert!(payload.upload.is_empty());
        assert!(!payload.has_upload());
        assert_eq!(payload, UploadPayload::default());
    }

    #[test]
    fn upload_field_without_filename_is_not_a_file() {
        let body = MultipartWriter::new("X")
            .field("upload", "just text")
            .finish();

        let payload = extract_body(body).unwrap();
        assert!(payload.upload.is_empty());
        assert!(payload.filename.is_none());
    }

    #[test]
    fn extended_filename_marks_the_upload() {
        let body = b"--X\r\n\
Content-Disposition: form-data; name=\"upload\"; filename*=UTF-8''cat.png\r\n\
\r\n\
\x89PNG\r\n\x1a\n\0\0\r\n\
--X--\r\n";

        let payload = extract_body(body.to_vec()).unwrap();
        assert_eq!(payload.filename.as_deref(), Some("cat.png"));
        assert_eq!(payload.upload, PNG_MAGIC);
    }

    #[test]
    fn file_under_other_name_is_ignored() {
        let body = MultipartWriter::new("X")
            .file("avatar", "me.png", "image/png", PNG_MAGIC)
            .finish();

        let payload = extract_body(body).unwrap();
        assert!(payload.upload.is_empty());
    }

    #[test]
    fn first_upload_wins() {
        let body = MultipartWriter::new("X")
            .file("upload", "first.png", "image/png", b"first")
            .file("upload", "second.png", "image/png", b"second")
            .finish();

        let payload = extract_body(body).unwrap();
        assert_eq!(payload.upload, b"first");
        assert_eq!(payload.filename.as_deref(), Some("first.png"));
    }

    #[test]
    fn nameless_parts_are_skipped() {
        let body = b"--X\r\nContent-Type: text/plain\r\n\r\norphan\r\n--X\r\n\
                     Content-Disposition: form-data; name=\"upload\"; filename=\"a.png\"\r\n\r\n\
                     data\r\n--X--\r\n"
            .to_vec();

        let payload = extract_body(body).unwrap();
        assert_eq!(payload.upload, b"data");
    }

    #[test]
    fn custom_field_names() {
        let fields = FormFields {
            upload: "image".to_string(),
            path: "dest".to_string(),
            tags: "labels".to_string(),
        };
        let body = MultipartWriter::new("X")
            .field("dest", "/out")
            .file("image", "a.jpg", "image/jpeg", b"\xFF\xD8\xFF")
            .finish();
        let mut stream = PartStream::new(body, "X");

        let payload = extract(&mut stream, &fields).unwrap();
        assert_eq!(payload.upload, b"\xFF\xD8\xFF");
        assert_eq!(payload.path.as_deref(), Some("/out"));
    }

    #[test]
    fn truncated_upload_is_an_error() {
        let body = b"--X\r\nContent-Disposition: form-data; name=\"upload\"; filename=\"a.png\"\r\n\r\n\
                     \x89PNG never closed"
            .to_vec();

        assert!(matches!(extract_body(body), Err(MultipartError::Io(_))));
    }

    #[test]
    fn truncated_ignored_part_is_still_an_error() {
        let body = b"--X\r\nContent-Disposition: form-data; name=\"other\"\r\n\r\nnever closed".to_vec();
        assert!(extract_body(body).is_err());
    }

    #[test]
    fn extraction_is_deterministic() {
        let body = MultipartWriter::new("X")
            .field("upload-tags", "a")
            .file("upload", "a.png", "image/png", PNG_MAGIC)
            .finish();

        let first = extract_body(body.clone()).unwrap();
        let second = extract_body(body).unwrap();
        assert_eq!(first, second);
    }
}
