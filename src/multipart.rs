//! Forward-only `multipart/form-data` reader (and a small writer).
//!
//! [`PartStream`] walks an in-memory body one part at a time. Each call to
//! [`PartStream::next_part`] hands out a [`Part`] that mutably borrows the
//! stream, so a part can only be read while it is the current one: the
//! single-pass contract is enforced by the borrow checker rather than at
//! runtime. Advancing skips whatever the caller did not read.
//!
//! ## Wire format
//!
//! ```text
//! preamble (ignored)
//! --BOUNDARY\r\n
//! Content-Disposition: form-data; name="upload"; filename="cat.png"\r\n
//! Content-Type: image/png\r\n
//! \r\n
//! <content>\r\n
//! --BOUNDARY--\r\n
//! epilogue (ignored)
//! ```
//!
//! Bare `\n` line endings are accepted too; the first delimiter line fixes
//! the mode for the rest of the body. Content ends at the first
//! `<newline>--BOUNDARY` followed by `-`, whitespace, or a newline.
//!
//! ## Failure modes
//!
//! A body with no delimiter at all, a header block cut short, or a stray
//! line between parts is an error from `next_part`. A part whose closing
//! delimiter never arrives is *truncated*: its bytes can still be read, but
//! the read ends with an `UnexpectedEof` I/O error and the stream refuses
//! to advance.

use crate::decode::{is_token_byte, parse_media_type};
use crate::headers::{CONTENT_DISPOSITION, CONTENT_TYPE, HeaderMap};
use memchr::memmem;
use std::io::{self, Read};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MultipartError {
    #[error("multipart: unexpected end of body")]
    UnexpectedEof,
    #[error("multipart: unexpected line {0:?}")]
    UnexpectedLine(String),
    #[error("multipart: malformed part header {0:?}")]
    MalformedHeader(String),
    #[error("multipart: {0}")]
    Io(#[from] io::Error),
}

const CRLF: &[u8] = b"\r\n";
const LF: &[u8] = b"\n";

/// Single-pass sequence of parts over a decoded body.
#[derive(Debug)]
pub struct PartStream {
    body: Vec<u8>,
    pos: usize,
    boundary: String,
    /// `--` + boundary
    dash_boundary: Vec<u8>,
    newline: &'static [u8],
    parts_read: usize,
    truncated: bool,
    done: bool,
}

impl PartStream {
    pub fn new(body: Vec<u8>, boundary: &str) -> Self {
        let mut dash_boundary = Vec::with_capacity(boundary.len() + 2);
        dash_boundary.extend_from_slice(b"--");
        dash_boundary.extend_from_slice(boundary.as_bytes());
        Self {
            body,
            pos: 0,
            boundary: boundary.to_string(),
            dash_boundary,
            newline: CRLF,
            parts_read: 0,
            truncated: false,
            done: false,
        }
    }

    pub fn boundary(&self) -> &str {
        &self.boundary
    }

    /// Number of parts handed out so far.
    pub fn parts_read(&self) -> usize {
        self.parts_read
    }

    /// Advance to the next part. `Ok(None)` is the natural end of the body.
    pub fn next_part(&mut self) -> Result<Option<Part<'_>>, MultipartError> {
        if self.done {
            return Ok(None);
        }
        if self.truncated {
            return Err(MultipartError::UnexpectedEof);
        }

        loop {
            let (start, end, eof) = self.line_bounds();
            self.pos = end;
            let line = &self.body[start..end];

            if is_final_boundary(line, &self.dash_boundary) {
                self.done = true;
                return Ok(None);
            }
            if eof {
                return Err(MultipartError::UnexpectedEof);
            }
            if let Some(newline) =
                delimiter_newline(line, &self.dash_boundary, self.newline, self.parts_read == 0)
            {
                self.newline = newline;
                break;
            }
            if self.parts_read == 0 {
                // Preamble
                continue;
            }
            if line == self.newline {
                continue;
            }
            return Err(MultipartError::UnexpectedLine(
                String::from_utf8_lossy(line).into_owned(),
            ));
        }

        let headers = self.read_headers()?;
        let content_start = self.pos;
        let (content_end, truncated) = match self.find_delimiter(content_start) {
            Some(at) => (at, false),
            None => (self.body.len(), true),
        };
        self.pos = content_end;
        self.truncated = truncated;
        self.parts_read += 1;

        Ok(Some(Part::new(
            headers,
            &self.body[content_start..content_end],
            truncated,
        )))
    }

    /// Start, end (past the newline), and whether the line hit end of body.
    fn line_bounds(&self) -> (usize, usize, bool) {
        let start = self.pos;
        match memchr::memchr(b'\n', &self.body[start..]) {
            Some(i) => (start, start + i + 1, false),
            None => (start, self.body.len(), true),
        }
    }

    fn read_headers(&mut self) -> Result<HeaderMap, MultipartError> {
        let mut headers = HeaderMap::new();
        let mut last_name: Option<String> = None;

        loop {
            let (start, end, eof) = self.line_bounds();
            if eof {
                return Err(MultipartError::UnexpectedEof);
            }
            self.pos = end;
            let line = trim_newline(&self.body[start..end]);
            if line.is_empty() {
                return Ok(headers);
            }

            let text = String::from_utf8_lossy(line);
            if text.starts_with([' ', '\t']) {
                match &last_name {
                    Some(name) if headers.extend_value(name, text.trim()) => continue,
                    _ => return Err(MultipartError::MalformedHeader(text.into_owned())),
                }
            }

            let Some((name, value)) = text.split_once(':') else {
                return Err(MultipartError::MalformedHeader(text.into_owned()));
            };
            let name = name.trim();
            if name.is_empty() {
                return Err(MultipartError::MalformedHeader(text.into_owned()));
            }
            headers.insert(name, value.trim());
            last_name = Some(name.to_string());
        }
    }

    /// Index of the newline that precedes the next delimiter, if any.
    fn find_delimiter(&self, from: usize) -> Option<usize> {
        let rest = &self.body[from..];

        // Empty content: the delimiter directly follows the header block.
        if rest.starts_with(&self.dash_boundary)
            && ends_delimiter(rest.get(self.dash_boundary.len()).copied())
        {
            return Some(from);
        }

        let mut needle = Vec::with_capacity(self.newline.len() + self.dash_boundary.len());
        needle.extend_from_slice(self.newline);
        needle.extend_from_slice(&self.dash_boundary);
        let finder = memmem::Finder::new(&needle);

        let mut search = from;
        while let Some(i) = finder.find(&self.body[search..]) {
            let at = search + i;
            if ends_delimiter(self.body.get(at + needle.len()).copied()) {
                return Some(at);
            }
            search = at + 1;
        }
        None
    }
}

/// One part of the stream. Implements [`Read`] over its content.
#[derive(Debug)]
pub struct Part<'a> {
    headers: HeaderMap,
    name: Option<String>,
    filename: Option<String>,
    data: &'a [u8],
    read: usize,
    truncated: bool,
}

impl<'a> Part<'a> {
    fn new(headers: HeaderMap, data: &'a [u8], truncated: bool) -> Self {
        let (name, filename) = parse_disposition(&headers);
        Self {
            headers,
            name,
            filename,
            data,
            read: 0,
            truncated,
        }
    }

    /// Form field name, only for `form-data` dispositions.
    pub fn form_name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Client-supplied filename reduced to its last path component.
    pub fn file_name(&self) -> Option<&str> {
        self.filename.as_deref()
    }

    /// Client-declared content type. Untrusted.
    pub fn content_type(&self) -> Option<&str> {
        self.headers.get_opt(CONTENT_TYPE)
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Read the remaining content into memory.
    pub fn read_bytes(&mut self) -> Result<Vec<u8>, MultipartError> {
        let mut buf = Vec::with_capacity(self.data.len() - self.read);
        self.read_to_end(&mut buf)?;
        Ok(buf)
    }

    /// Read the remaining content as text, replacing invalid UTF-8.
    pub fn read_text(&mut self) -> Result<String, MultipartError> {
        let bytes = self.read_bytes()?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

impl Read for Part<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let remaining = &self.data[self.read..];
        if remaining.is_empty() {
            if self.truncated && !buf.is_empty() {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "part truncated before closing boundary",
                ));
            }
            return Ok(0);
        }
        let n = remaining.len().min(buf.len());
        buf[..n].copy_from_slice(&remaining[..n]);
        self.read += n;
        Ok(n)
    }
}

/// Builds a CRLF `multipart/form-data` body.
#[derive(Debug, Clone)]
pub struct MultipartWriter {
    boundary: String,
    body: Vec<u8>,
}

impl MultipartWriter {
    pub fn new(boundary: impl Into<String>) -> Self {
        Self {
            boundary: boundary.into(),
            body: Vec::new(),
        }
    }

    pub fn boundary(&self) -> &str {
        &self.boundary
    }

    /// `Content-Type` header value announcing this writer's boundary.
    pub fn content_type(&self) -> String {
        if !self.boundary.is_empty() && self.boundary.bytes().all(is_token_byte) {
            format!("multipart/form-data; boundary={}", self.boundary)
        } else {
            format!("multipart/form-data; boundary=\"{}\"", self.boundary)
        }
    }

    pub fn field(mut self, name: &str, value: &str) -> Self {
        self.open_part(&format!("form-data; name=\"{name}\""), None);
        self.body.extend_from_slice(value.as_bytes());
        self.body.extend_from_slice(CRLF);
        self
    }

    pub fn file(mut self, name: &str, filename: &str, content_type: &str, data: &[u8]) -> Self {
        self.open_part(
            &format!("form-data; name=\"{name}\"; filename=\"{filename}\""),
            Some(content_type),
        );
        self.body.extend_from_slice(data);
        self.body.extend_from_slice(CRLF);
        self
    }

    /// Close the body with the final delimiter.
    pub fn finish(mut self) -> Vec<u8> {
        self.body.extend_from_slice(b"--");
        self.body.extend_from_slice(self.boundary.as_bytes());
        self.body.extend_from_slice(b"--\r\n");
        self.body
    }

    fn open_part(&mut self, disposition: &str, content_type: Option<&str>) {
        self.body.extend_from_slice(b"--");
        self.body.extend_from_slice(self.boundary.as_bytes());
        self.body.extend_from_slice(CRLF);
        self.body.extend_from_slice(b"Content-Disposition: ");
        self.body.extend_from_slice(disposition.as_bytes());
        self.body.extend_from_slice(CRLF);
        if let Some(ct) = content_type {
            self.body.extend_from_slice(b"Content-Type: ");
            self.body.extend_from_slice(ct.as_bytes());
            self.body.extend_from_slice(CRLF);
        }
        self.body.extend_from_slice(CRLF);
    }
}

fn parse_disposition(headers: &HeaderMap) -> (Option<String>, Option<String>) {
    let Some(raw) = headers.get_opt(CONTENT_DISPOSITION) else {
        return (None, None);
    };
    let Ok(disposition) = parse_media_type(raw) else {
        return (None, None);
    };

    let name = if disposition.essence == "form-data" {
        disposition
            .param("name")
            .filter(|n| !n.is_empty())
            .map(str::to_string)
    } else {
        None
    };
    let filename = disposition
        .param("filename")
        .and_then(|f| f.trim_end_matches(['/', '\\']).rsplit(['/', '\\']).next())
        .filter(|f| !f.is_empty())
        .map(str::to_string);

    (name, filename)
}

/// If `line` opens a part, the newline style it uses.
fn delimiter_newline(
    line: &[u8],
    dash_boundary: &[u8],
    current: &'static [u8],
    first: bool,
) -> Option<&'static [u8]> {
    let rest = skip_lwsp(line.strip_prefix(dash_boundary)?);
    if first && rest == LF {
        return Some(LF);
    }
    (rest == current).then_some(current)
}

fn is_final_boundary(line: &[u8], dash_boundary: &[u8]) -> bool {
    let Some(rest) = line
        .strip_prefix(dash_boundary)
        .and_then(|r| r.strip_prefix(b"--"))
    else {
        return false;
    };
    let rest = skip_lwsp(rest);
    rest.is_empty() || rest == CRLF || rest == LF
}

fn ends_delimiter(next: Option<u8>) -> bool {
    matches!(next, None | Some(b'-' | b' ' | b'\t' | b'\r' | b'\n'))
}

fn skip_lwsp(mut bytes: &[u8]) -> &[u8] {
    while let [b' ' | b'\t', rest @ ..] = bytes {
        bytes = rest;
    }
    bytes
}

fn trim_newline(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(LF).unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stream(body: &[u8]) -> PartStream {
        PartStream::new(body.to_vec(), "X")
    }

    #[test]
    fn reads_fields_and_files_in_order() {
        let body = MultipartWriter::new("X")
            .field("upload-path", "/albums/cats")
            .file("upload", "cat.png", "image/png", b"\x89PNG\r\n\x1a\n..")
            .finish();
        let mut parts = stream(&body);

        let mut first = parts.next_part().unwrap().unwrap();
        assert_eq!(first.form_name(), Some("upload-path"));
        assert_eq!(first.file_name(), None);
        assert_eq!(first.read_text().unwrap(), "/albums/cats");

        let mut second = parts.next_part().unwrap().unwrap();
        assert_eq!(second.form_name(), Some("upload"));
        assert_eq!(second.file_name(), Some("cat.png"));
        assert_eq!(second.content_type(), Some("image/png"));
        assert_eq!(second.read_bytes().unwrap(), b"\x89PNG\r\n\x1a\n..");

        assert!(parts.next_part().unwrap().is_none());
        assert!(parts.next_part().unwrap().is_none());
        assert_eq!(parts.parts_read(), 2);
    }

    #[test]
    fn content_may_contain_boundary_lookalikes() {
        let body = b"--X\r\nContent-Disposition: form-data; name=\"a\"\r\n\r\n\
                     line\r\n--Xnot-a-delimiter\r\n--X\r\n\
                     Content-Disposition: form-data; name=\"b\"\r\n\r\n2\r\n--X--\r\n";
        let mut parts = stream(body);

        let mut a = parts.next_part().unwrap().unwrap();
        assert_eq!(a.read_text().unwrap(), "line\r\n--Xnot-a-delimiter");
        let mut b = parts.next_part().unwrap().unwrap();
        assert_eq!(b.read_text().unwrap(), "2");
        assert!(parts.next_part().unwrap().is_none());
    }

    #[test]
    fn unread_content_is_skipped_on_advance() {
        let body = MultipartWriter::new("X")
            .file("upload", "a.png", "image/png", &[7u8; 64])
            .field("upload-tags", "a,b")
            .finish();
        let mut parts = stream(&body);

        let first = parts.next_part().unwrap().unwrap();
        assert_eq!(first.form_name(), Some("upload"));
        let mut second = parts.next_part().unwrap().unwrap();
        assert_eq!(second.read_text().unwrap(), "a,b");
    }

    #[test]
    fn preamble_and_epilogue_are_ignored() {
        let body = b"This is a preamble.\r\n--X\r\n\
                     Content-Disposition: form-data; name=\"a\"\r\n\r\n1\r\n--X--\r\nepilogue";
        let mut parts = stream(body);
        let mut a = parts.next_part().unwrap().unwrap();
        assert_eq!(a.read_text().unwrap(), "1");
        assert!(parts.next_part().unwrap().is_none());
    }

    #[test]
    fn bare_lf_bodies_are_accepted() {
        let body = b"--X\nContent-Disposition: form-data; name=\"a\"\n\nvalue\n--X\n\
                     Content-Disposition: form-data; name=\"b\"\n\n\n--X--\n";
        let mut parts = stream(body);
        let mut a = parts.next_part().unwrap().unwrap();
        assert_eq!(a.read_text().unwrap(), "value");
        let mut b = parts.next_part().unwrap().unwrap();
        assert_eq!(b.read_text().unwrap(), "");
        assert!(parts.next_part().unwrap().is_none());
    }

    #[test]
    fn empty_content_directly_before_delimiter() {
        let body = b"--X\r\nContent-Disposition: form-data; name=\"a\"\r\n\r\n--X--\r\n";
        let mut parts = stream(body);
        let mut a = parts.next_part().unwrap().unwrap();
        assert_eq!(a.read_bytes().unwrap(), b"");
        assert!(parts.next_part().unwrap().is_none());
    }

    #[test]
    fn final_delimiter_without_trailing_newline() {
        let body = b"--X\r\nContent-Disposition: form-data; name=\"a\"\r\n\r\n1\r\n--X--";
        let mut parts = stream(body);
        assert!(parts.next_part().unwrap().is_some());
        assert!(parts.next_part().unwrap().is_none());
    }

    #[test]
    fn body_without_parts_is_empty_stream() {
        let mut parts = stream(b"--X--\r\n");
        assert!(parts.next_part().unwrap().is_none());
        assert_eq!(parts.parts_read(), 0);
    }

    #[test]
    fn empty_body_is_unexpected_eof() {
        let mut parts = stream(b"");
        assert!(matches!(
            parts.next_part(),
            Err(MultipartError::UnexpectedEof)
        ));
    }

    #[test]
    fn body_without_delimiters_is_unexpected_eof() {
        let mut parts = stream(b"just some text\r\nwith lines\r\n");
        assert!(matches!(
            parts.next_part(),
            Err(MultipartError::UnexpectedEof)
        ));
    }

    #[test]
    fn truncated_part_fails_on_read_and_advance() {
        let body = b"--X\r\nContent-Disposition: form-data; name=\"upload\"; filename=\"a.png\"\r\n\r\n\x89PNG-partial";
        let mut parts = stream(body);
        let mut part = parts.next_part().unwrap().unwrap();

        let err = part.read_bytes().unwrap_err();
        assert!(matches!(err, MultipartError::Io(e) if e.kind() == io::ErrorKind::UnexpectedEof));
        assert!(matches!(
            parts.next_part(),
            Err(MultipartError::UnexpectedEof)
        ));
    }

    #[test]
    fn truncated_header_block_is_unexpected_eof() {
        let body = b"--X\r\nContent-Disposition: form-data; name=\"a\"";
        let mut parts = stream(body);
        assert!(matches!(
            parts.next_part(),
            Err(MultipartError::UnexpectedEof)
        ));
    }

    #[test]
    fn header_without_colon_is_malformed() {
        let body = b"--X\r\nnot a header\r\n\r\n1\r\n--X--\r\n";
        let mut parts = stream(body);
        assert!(matches!(
            parts.next_part(),
            Err(MultipartError::MalformedHeader(h)) if h == "not a header"
        ));
    }

    #[test]
    fn part_headers_are_exposed_normalized() {
        let body = b"--X\r\nContent-Disposition: form-data; name=\"a\"\r\n\
X-Trace: abc\r\nCONTENT-TYPE: text/plain\r\n\r\n1\r\n--X--\r\n";
        let mut parts = stream(body);
        let part = parts.next_part().unwrap().unwrap();

        let names: Vec<&str> = part.headers().iter().map(|(name, _)| name).collect();
        assert_eq!(names, vec!["content-disposition", "content-type", "x-trace"]);
        assert_eq!(part.headers().get("X-TRACE").trim(), "abc");
        assert_eq!(part.content_type().map(str::trim), Some("text/plain"));
    }

    #[test]
    fn folded_header_lines_are_joined() {
        let body = b"--X\r\nContent-Disposition: form-data;\r\n name=\"folded\"\r\n\r\n1\r\n--X--\r\n";
        let mut parts = stream(body);
        let part = parts.next_part().unwrap().unwrap();
        assert_eq!(part.form_name(), Some("folded"));
    }

    #[test]
    fn stray_line_between_parts_is_rejected() {
        let body = b"--X\r\nContent-Disposition: form-data; name=\"a\"\r\n\r\n1\r\n--X-\r\n";
        let mut parts = stream(body);
        parts.next_part().unwrap().unwrap();
        assert!(matches!(
            parts.next_part(),
            Err(MultipartError::UnexpectedLine(_))
        ));
    }

    #[test]
    fn filename_is_reduced_to_base_name() {
        let body = MultipartWriter::new("X")
            .file("upload", "/home/me/cat.jpg", "image/jpeg", b"x")
            .file("upload", "../../etc/passwd", "text/plain", b"y")
            .file("upload", "", "image/png", b"z")
            .finish();
        let mut parts = stream(&body);

        assert_eq!(
            parts.next_part().unwrap().unwrap().file_name(),
            Some("cat.jpg")
        );
        assert_eq!(
            parts.next_part().unwrap().unwrap().file_name(),
            Some("passwd")
        );
        assert_eq!(parts.next_part().unwrap().unwrap().file_name(), None);
    }

    #[test]
    fn non_form_data_disposition_has_no_name() {
        let body = b"--X\r\nContent-Disposition: attachment; name=\"a\"; filename=\"f.png\"\r\n\r\n1\r\n--X--\r\n";
        let mut parts = stream(body);
        let part = parts.next_part().unwrap().unwrap();
        assert_eq!(part.form_name(), None);
        assert_eq!(part.file_name(), Some("f.png"));
    }

    #[test]
    fn part_without_disposition_has_no_name() {
        let body = b"--X\r\nContent-Type: text/plain\r\n\r\n1\r\n--X--\r\n";
        let mut parts = stream(body);
        let part = parts.next_part().unwrap().unwrap();
        assert_eq!(part.form_name(), None);
        assert_eq!(part.file_name(), None);
    }

    #[test]
    fn writer_quotes_non_token_boundaries() {
        assert_eq!(
            MultipartWriter::new("abc").content_type(),
            "multipart/form-data; boundary=abc"
        );
        assert_eq!(
            MultipartWriter::new("a b").content_type(),
            "multipart/form-data; boundary=\"a b\""
        );
    }
}
