//! Request body decoding.
//!
//! Turns the raw envelope body into a forward-only [`PartStream`]:
//!
//! 1. parse the declared `Content-Type` into a media type and parameters
//! 2. require a `multipart/*` media type
//! 3. require a non-empty `boundary` parameter
//! 4. base64-decode the body when the platform flagged it
//! 5. hand the bytes and boundary to the part reader
//!
//! The boundary comes from the declared header only, exactly once per
//! request; nothing is ever re-derived from the body.

use crate::multipart::PartStream;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use percent_encoding::percent_decode_str;
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("invalid content type: {0}")]
    InvalidContentType(String),
    #[error("content type invalid: {0} is not multipart")]
    NotMultipart(String),
    #[error("multipart boundary missing from content type")]
    MissingBoundary,
    #[error("body is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),
}

/// A parsed media type such as `multipart/form-data; boundary=X`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaType {
    /// Lowercased `type/subtype` (or bare token for dispositions).
    pub essence: String,
    /// Parameters keyed by lowercased name.
    pub params: BTreeMap<String, String>,
}

impl MediaType {
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn is_multipart(&self) -> bool {
        self.essence.trim().starts_with("multipart/")
    }
}

/// Parse a media-type header value (`Content-Type`, `Content-Disposition`).
///
/// Parameter values may be tokens or quoted strings. An empty unquoted value
/// parses as `""`; callers decide whether that is acceptable.
///
/// RFC 2231 extended parameters are decoded and stored under their plain
/// name: `filename*=UTF-8''cat.png` and the continuation form
/// `filename*0*=UTF-8''ca; filename*1=t.png` both yield `filename`. An
/// extended value replaces a plain one of the same name. Charsets other than
/// `utf-8` and `us-ascii` are not decoded and the parameter is dropped.
pub fn parse_media_type(value: &str) -> Result<MediaType, DecodeError> {
    let invalid = |why: &str| DecodeError::InvalidContentType(format!("{why} in {value:?}"));

    let (essence, mut rest) = match value.find(';') {
        Some(i) => (&value[..i], &value[i..]),
        None => (value, ""),
    };
    let essence = essence.trim().to_ascii_lowercase();
    if !is_valid_essence(&essence) {
        return Err(invalid("malformed media type"));
    }

    let mut params = BTreeMap::new();
    loop {
        rest = rest.trim_start();
        let Some(after) = rest.strip_prefix(';') else {
            if rest.is_empty() {
                break;
            }
            return Err(invalid("expected ';' between parameters"));
        };
        let after = after.trim_start();
        if after.is_empty() {
            // Trailing ';'
            break;
        }

        let name_len = after.bytes().take_while(|&b| is_token_byte(b)).count();
        if name_len == 0 {
            return Err(invalid("missing parameter name"));
        }
        let name = after[..name_len].to_ascii_lowercase();
        let Some(after_eq) = after[name_len..].trim_start().strip_prefix('=') else {
            return Err(invalid("parameter without '='"));
        };
        let after_eq = after_eq.trim_start();

        let (param_value, remaining) = if after_eq.starts_with('"') {
            parse_quoted(after_eq).ok_or_else(|| invalid("unterminated quoted string"))?
        } else {
            let len = after_eq.bytes().take_while(|&b| is_token_byte(b)).count();
            (after_eq[..len].to_string(), &after_eq[len..])
        };

        if params.insert(name, param_value).is_some() {
            return Err(invalid("duplicate parameter"));
        }
        rest = remaining;
    }

    Ok(MediaType {
        essence,
        params: resolve_extended(params),
    })
}

/// Decode the request body into a part stream.
///
/// `body` is the envelope body as bytes; `content_type` is the raw header
/// value (empty when the header is absent).
pub fn decode(body: &[u8], content_type: &str, is_base64: bool) -> Result<PartStream, DecodeError> {
    let media = parse_media_type(content_type)?;
    if !media.is_multipart() {
        return Err(DecodeError::NotMultipart(media.essence));
    }

    let boundary = match media.param("boundary") {
        Some(b) if !b.is_empty() => b.to_string(),
        _ => return Err(DecodeError::MissingBoundary),
    };

    let bytes = if is_base64 {
        decode_base64(body)?
    } else {
        body.to_vec()
    };

    Ok(PartStream::new(bytes, &boundary))
}

/// Standard-alphabet base64 with line breaks ignored.
fn decode_base64(body: &[u8]) -> Result<Vec<u8>, base64::DecodeError> {
    if memchr::memchr2(b'\r', b'\n', body).is_some() {
        let joined: Vec<u8> = body
            .iter()
            .copied()
            .filter(|b| !matches!(b, b'\r' | b'\n'))
            .collect();
        STANDARD.decode(joined)
    } else {
        STANDARD.decode(body)
    }
}

/// Returns the unescaped value and the text after the closing quote.
fn parse_quoted(input: &str) -> Option<(String, &str)> {
    let mut out = String::new();
    let mut chars = input.char_indices().skip(1);
    while let Some((i, c)) = chars.next() {
        match c {
            '"' => return Some((out, &input[i + 1..])),
            '\\' => out.push(chars.next()?.1),
            _ => out.push(c),
        }
    }
    None
}

/// Fold `name*` and `name*N[*]` parameters into `name`.
fn resolve_extended(raw: BTreeMap<String, String>) -> BTreeMap<String, String> {
    let mut params = BTreeMap::new();
    let mut extended: BTreeMap<String, BTreeMap<String, String>> = BTreeMap::new();
    for (key, value) in raw {
        match key.split_once('*') {
            Some((base, _)) if !base.is_empty() => {
                extended
                    .entry(base.to_string())
                    .or_default()
                    .insert(key, value);
            }
            _ => {
                params.insert(key, value);
            }
        }
    }

    for (base, pieces) in extended {
        if let Some(value) = pieces.get(&format!("{base}*")) {
            if let Some(decoded) = decode_extended(value).and_then(|b| String::from_utf8(b).ok()) {
                params.insert(base, decoded);
            }
            continue;
        }
        if let Some(joined) = join_continuations(&base, &pieces) {
            params.insert(base, joined);
        }
    }
    params
}

/// Concatenate `base*0`, `base*1`, ... until the first gap. Encoded pieces
/// (`base*N*`) are percent-decoded; only the first carries a charset.
fn join_continuations(base: &str, pieces: &BTreeMap<String, String>) -> Option<String> {
    let mut bytes = Vec::new();
    let mut found = false;
    for n in 0.. {
        let plain = format!("{base}*{n}");
        if let Some(value) = pieces.get(&plain) {
            bytes.extend_from_slice(value.as_bytes());
        } else if let Some(value) = pieces.get(&format!("{plain}*")) {
            let decoded = if n == 0 {
                decode_extended(value)
            } else {
                unescape_percent(value)
            };
            bytes.extend(decoded.unwrap_or_default());
        } else {
            break;
        }
        found = true;
    }
    found.then(|| String::from_utf8_lossy(&bytes).into_owned())
}

/// Decode `charset'language'pct-encoded`.
fn decode_extended(value: &str) -> Option<Vec<u8>> {
    let mut pieces = value.splitn(3, '\'');
    let (charset, _language, encoded) = (pieces.next()?, pieces.next()?, pieces.next()?);
    let bytes = unescape_percent(encoded)?;
    match charset.to_ascii_lowercase().as_str() {
        "utf-8" => Some(bytes),
        "us-ascii" if bytes.is_ascii() => Some(bytes),
        _ => None,
    }
}

/// Strict `%XX` unescaping: a `%` without two hex digits is an error.
fn unescape_percent(value: &str) -> Option<Vec<u8>> {
    let well_formed = value
        .split('%')
        .skip(1)
        .all(|chunk| chunk.len() >= 2 && chunk.as_bytes()[..2].iter().all(u8::is_ascii_hexdigit));
    well_formed.then(|| percent_decode_str(value).collect())
}

fn is_valid_essence(essence: &str) -> bool {
    let mut pieces = essence.splitn(2, '/');
    let top = pieces.next().unwrap_or("");
    let valid = |s: &str| !s.is_empty() && s.bytes().all(is_token_byte);
    match pieces.next() {
        Some(sub) => valid(top) && valid(sub),
        None => valid(top),
    }
}

/// RFC 2045 token characters.
pub(crate) fn is_token_byte(b: u8) -> bool {
    b.is_ascii_graphic() && !b"()<>@,;:\\\"/[]?=".contains(&b)
}
