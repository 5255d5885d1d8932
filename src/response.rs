//! Response envelope construction.

use crate::envelope::ResponseEnvelope;
use crate::mime;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use std::collections::BTreeMap;

pub const OCTET_STREAM: &str = "application/octet-stream";

/// Response header carrying the sniffed type.
pub const CONTENT_TYPE_HEADER: &str = "Content-Type";

/// Content type of the final bytes, by sniffing.
pub fn content_type_of(bytes: &[u8]) -> &'static str {
    mime::sniff(bytes).unwrap_or(OCTET_STREAM)
}

/// 200 envelope carrying `bytes` as standard base64.
pub fn encode(bytes: &[u8]) -> ResponseEnvelope {
    let mut headers = BTreeMap::new();
    headers.insert(
        CONTENT_TYPE_HEADER.to_string(),
        content_type_of(bytes).to_string(),
    );
    ResponseEnvelope {
        status_code: 200,
        headers,
        body: STANDARD.encode(bytes),
        is_base64_encoded: true,
    }
}

/// 400 envelope whose body is the error message.
pub fn reject(message: impl std::fmt::Display) -> ResponseEnvelope {
    ResponseEnvelope {
        status_code: 400,
        headers: BTreeMap::new(),
        body: message.to_string(),
        is_base64_encoded: false,
    }
}
