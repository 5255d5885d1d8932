//! # upload-shrink
//!
//! A stateless request handler that takes an HTTP request carrying a
//! multipart file upload, checks that the upload really is an image it
//! accepts, shrinks it, and returns the result inline as a base64 body, as
//! long as the result fits under the hosting platform's response ceiling.
//!
//! # Architecture: Linear Pipeline
//!
//! Every request runs the same fixed sequence of stages. The first failure
//! stops the pipeline and becomes a 400 response carrying the error message:
//!
//! ```text
//! 1. Normalize   headers      →  case-insensitive lookup
//! 2. Decode      body         →  multipart part stream (base64 unwrapped)
//! 3. Extract     part stream  →  upload bytes + scalar form fields
//! 4. Validate    upload bytes →  sniffed type on the allow-list?
//! 5. Transform   upload bytes →  re-encoded bytes
//! 6. Gate        output size  →  fits the response ceiling?
//! 7. Encode      output bytes →  200 envelope, base64 body
//! ```
//!
//! No stage retries and no state survives a request, so a warm process can
//! serve any number of invocations from one [`pipeline::Pipeline`].
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`headers`] | Case-insensitive header lookup for envelopes and part headers |
//! | [`envelope`] | API Gateway proxy request/response JSON types |
//! | [`decode`] | `Content-Type` parsing and body decoding into a part stream |
//! | [`multipart`] | Forward-only multipart reader and a body writer |
//! | [`form`] | Upload payload extraction from the part stream |
//! | [`mime`] | Magic-number sniffing and the accepted-type allow-list |
//! | [`imaging`] | Transform trait and the pure-Rust re-encoder |
//! | [`limits`] | Response size ceiling |
//! | [`response`] | Success and failure envelope construction |
//! | [`pipeline`] | Stage sequencing, error kinds, per-request tracing span |
//! | [`config`] | Layered `config.toml` loading, env overrides, validation |
//! | [`host`] | Once-per-process bootstrap: tracing, library path, Lambda runtime |
//! | [`output`] | CLI report formatting |
//!
//! # Design Decisions
//!
//! ## Sniff, Never Trust
//!
//! The part's declared `Content-Type` and the filename extension are ignored.
//! Acceptance is decided from the upload's leading bytes only, so a renamed
//! script never reaches the image decoder.
//!
//! ## First Upload Wins
//!
//! A form with several `upload` file parts keeps the first and skips the
//! rest. The choice is deterministic and means a late part cannot replace
//! content that was already inspected.
//!
//! ## One Result Type
//!
//! [`pipeline::Pipeline::handle`] returns either the success envelope or a
//! [`pipeline::PipelineError`]; the error renders its own 400 envelope.
//! Hosts that must always answer the client use
//! [`pipeline::Pipeline::respond`].
//!
//! ## Pure-Rust Imaging
//!
//! Decoding and re-encoding use the `image` crate's pure-Rust codecs. The
//! binary carries no system image libraries, which keeps the Lambda bundle
//! a single self-contained executable. PNGs are written as indexed colour
//! by default, and an upload that re-encoding would not shrink is returned
//! with only its metadata cut out.

pub mod config;
pub mod decode;
pub mod envelope;
pub mod form;
pub mod headers;
pub mod host;
pub mod imaging;
pub mod limits;
pub mod mime;
pub mod multipart;
pub mod output;
pub mod pipeline;
pub mod response;

pub use envelope::{RequestEnvelope, ResponseEnvelope};
pub use pipeline::{ErrorKind, Pipeline, PipelineError};

#[cfg(test)]
pub(crate) mod test_helpers;
