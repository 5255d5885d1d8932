//! Request pipeline: envelope in, envelope out.
//!
//! ```text
//! headers → decode → extract → validate mime → transform → size gate → encode
//! ```
//!
//! Stages run strictly in order and the first failure short-circuits. Every
//! failure becomes a [`PipelineError`], which carries a flat [`ErrorKind`]
//! and renders to a 400 envelope via [`PipelineError::to_response`].
//!
//! Nothing here is shared between requests: a [`Pipeline`] holds only
//! immutable settings and the transform, so one instance serves every
//! invocation of a warm process.

use crate::config::AppConfig;
use crate::decode::{self, DecodeError};
use crate::envelope::{RequestEnvelope, ResponseEnvelope};
use crate::form::{self, FormFields, UploadPayload};
use crate::headers::{CONTENT_TYPE, normalize_headers};
use crate::imaging::{ImageTransform, RustTransform, TransformError};
use crate::limits::ResponseCeiling;
use crate::mime::{self, MimeAllowList};
use crate::multipart::MultipartError;
use crate::response;
use std::fmt;
use thiserror::Error;
use tracing::{debug, info, info_span, warn};

/// The eight ways a request can fail. All map to status 400.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidContentType,
    NotMultipart,
    MissingBoundary,
    Base64DecodeError,
    PartReadError,
    UnsupportedMimeType,
    TransformFailure,
    SizeLimitExceeded,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InvalidContentType => "InvalidContentType",
            Self::NotMultipart => "NotMultipart",
            Self::MissingBoundary => "MissingBoundary",
            Self::Base64DecodeError => "Base64DecodeError",
            Self::PartReadError => "PartReadError",
            Self::UnsupportedMimeType => "UnsupportedMimeType",
            Self::TransformFailure => "TransformFailure",
            Self::SizeLimitExceeded => "SizeLimitExceeded",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error(transparent)]
    PartRead(#[from] MultipartError),
    #[error("invalid file type")]
    UnsupportedMimeType { sniffed: Option<&'static str> },
    #[error("failed to compress image: {0}")]
    Transform(#[from] TransformError),
    #[error("image size exceeded - can not process request")]
    SizeLimitExceeded { bytes: usize, ceiling_mb: f64 },
}

impl PipelineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Decode(DecodeError::InvalidContentType(_)) => ErrorKind::InvalidContentType,
            Self::Decode(DecodeError::NotMultipart(_)) => ErrorKind::NotMultipart,
            Self::Decode(DecodeError::MissingBoundary) => ErrorKind::MissingBoundary,
            Self::Decode(DecodeError::Base64(_)) => ErrorKind::Base64DecodeError,
            Self::PartRead(_) => ErrorKind::PartReadError,
            Self::UnsupportedMimeType { .. } => ErrorKind::UnsupportedMimeType,
            Self::Transform(_) => ErrorKind::TransformFailure,
            Self::SizeLimitExceeded { .. } => ErrorKind::SizeLimitExceeded,
        }
    }

    /// The 400 envelope for this error; body is the error message.
    pub fn to_response(&self) -> ResponseEnvelope {
        response::reject(self)
    }
}

/// Transform output that passed the size gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformedImage {
    pub bytes: Vec<u8>,
    /// Sniffed from `bytes`, `application/octet-stream` if unknown.
    pub content_type: &'static str,
}

/// What a request carries, without transforming it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inspection {
    /// Declared `Content-Type` header value.
    pub content_type: String,
    pub boundary: String,
    pub parts: usize,
    pub payload: UploadPayload,
    pub sniffed: Option<&'static str>,
    /// Whether the upload would pass the mime check.
    pub accepted: bool,
}

/// Settings plus transform; reusable across requests.
pub struct Pipeline<T: ImageTransform = RustTransform> {
    fields: FormFields,
    allowed: MimeAllowList,
    ceiling: ResponseCeiling,
    transform: T,
}

impl Pipeline<RustTransform> {
    /// Production pipeline with the pure-Rust re-encoder.
    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(config, RustTransform::new(config.transform_params()))
    }
}

impl<T: ImageTransform> Pipeline<T> {
    pub fn new(config: &AppConfig, transform: T) -> Self {
        Self {
            fields: config.form_fields(),
            allowed: config.mime.allowed.clone(),
            ceiling: config.ceiling(),
            transform,
        }
    }

    pub fn transform(&self) -> &T {
        &self.transform
    }

    /// Run every stage and return the transformed image.
    pub fn process(&self, request: &RequestEnvelope) -> Result<TransformedImage, PipelineError> {
        let headers = normalize_headers(&request.headers);
        self.process_body(
            request.body.as_bytes(),
            headers.get(CONTENT_TYPE),
            request.is_base64_encoded,
        )
    }

    /// Run every stage on a body given as raw bytes.
    ///
    /// `content_type` is the declared header value, `""` when absent.
    pub fn process_body(
        &self,
        body: &[u8],
        content_type: &str,
        is_base64: bool,
    ) -> Result<TransformedImage, PipelineError> {
        let span = info_span!("request", body_len = body.len(), base64 = is_base64);
        let _guard = span.enter();

        let mut stream = logged(
            decode::decode(body, content_type, is_base64),
            "failed to decode request body",
        )?;
        let payload = logged(
            form::extract(&mut stream, &self.fields),
            "failed to extract form data",
        )?;
        debug!(
            parts = stream.parts_read(),
            upload = payload.upload.len(),
            "extracted form data"
        );

        let sniffed = mime::sniff(&payload.upload);
        if !mime::validate(&payload.upload, &self.allowed) {
            return logged(
                Err(PipelineError::UnsupportedMimeType { sniffed }),
                "upload is invalid type",
            );
        }

        let bytes = logged(
            self.transform.transform(&payload.upload),
            "failed to compress image",
        )?;

        if !self.ceiling.fits(bytes.len()) {
            return logged(
                Err(PipelineError::SizeLimitExceeded {
                    bytes: bytes.len(),
                    ceiling_mb: self.ceiling.megabytes(),
                }),
                "compressed image exceeds response ceiling",
            );
        }

        info!(
            input = payload.upload.len(),
            output = bytes.len(),
            mime = sniffed.unwrap_or_default(),
            "image processed"
        );
        Ok(TransformedImage {
            content_type: response::content_type_of(&bytes),
            bytes,
        })
    }

    /// Success envelope or the error that stopped the pipeline.
    pub fn handle(&self, request: &RequestEnvelope) -> Result<ResponseEnvelope, PipelineError> {
        let image = self.process(request)?;
        Ok(response::encode(&image.bytes))
    }

    /// Always an envelope: 200 on success, the error's 400 otherwise.
    ///
    /// For hosts that must reply to the client even when the request failed.
    /// The failing stage has already logged the error.
    pub fn respond(&self, request: &RequestEnvelope) -> ResponseEnvelope {
        match self.handle(request) {
            Ok(response) => response,
            Err(err) => {
                debug!(kind = %err.kind(), "responding with 400");
                err.to_response()
            }
        }
    }

    /// Decode, extract and sniff without transforming.
    pub fn inspect(&self, request: &RequestEnvelope) -> Result<Inspection, PipelineError> {
        let headers = normalize_headers(&request.headers);
        let content_type = headers.get(CONTENT_TYPE);

        let mut stream = decode::decode(
            request.body.as_bytes(),
            content_type,
            request.is_base64_encoded,
        )?;
        let payload = form::extract(&mut stream, &self.fields)?;
        let sniffed = mime::sniff(&payload.upload);

        Ok(Inspection {
            content_type: content_type.to_string(),
            boundary: stream.boundary().to_string(),
            parts: stream.parts_read(),
            accepted: mime::validate(&payload.upload, &self.allowed),
            payload,
            sniffed,
        })
    }
}

/// Log a failing stage once, with its kind, and convert the error.
fn logged<V, E>(result: Result<V, E>, stage: &str) -> Result<V, PipelineError>
where
    E: Into<PipelineError>,
{
    result.map_err(|e| {
        let err = e.into();
        warn!(kind = %err.kind(), error = %err, "{}", stage);
        err
    })
}
