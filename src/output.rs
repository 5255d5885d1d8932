//! CLI output formatting.
//!
//! # Output Format
//!
//! ## Inspect
//!
//! ```text
//! Request
//!     Content-Type: multipart/form-data; boundary=X
//!     Boundary: X
//!     Parts: 3
//! Upload
//!     Filename: cat.png
//!     Size: 12.3 KiB (12595 bytes)
//!     Sniffed: image/png (accepted)
//! Fields
//!     upload-path: /albums/cats
//!     upload-tags: cat, cute
//! ```
//!
//! ## Invoke summary
//!
//! ```text
//! 200 image/png
//!     Body: 9.8 KiB (10012 bytes)
//! ```
//!
//! ```text
//! 400 UnsupportedMimeType
//!     invalid file type
//! ```
//!
//! # Architecture
//!
//! Each report has a `format_*` function (returns `Vec<String>`) for
//! testability and a `print_*` wrapper that does the I/O. Format functions
//! are pure. Summaries go to stderr so the envelope JSON on stdout can be
//! piped.

use crate::envelope::ResponseEnvelope;
use crate::form::FormFields;
use crate::pipeline::{Inspection, PipelineError};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;

/// Return indentation string: 4 spaces per depth level.
fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

/// Human-readable byte count with the exact figure alongside.
///
/// ```text
/// 512 bytes
/// 12.3 KiB (12595 bytes)
/// 6.0 MiB (6291456 bytes)
/// ```
fn format_size(bytes: usize) -> String {
    const KIB: f64 = 1024.0;
    const MIB: f64 = 1024.0 * 1024.0;
    let b = bytes as f64;
    if b < KIB {
        format!("{bytes} bytes")
    } else if b < MIB {
        format!("{:.1} KiB ({bytes} bytes)", b / KIB)
    } else {
        format!("{:.1} MiB ({bytes} bytes)", b / MIB)
    }
}

// ============================================================================
// inspect
// ============================================================================

/// Format an inspection report.
pub fn format_inspect_report(report: &Inspection, fields: &FormFields) -> Vec<String> {
    let pad = indent(1);
    let mut lines = vec![
        "Request".to_string(),
        format!("{pad}Content-Type: {}", report.content_type),
        format!("{pad}Boundary: {}", report.boundary),
        format!("{pad}Parts: {}", report.parts),
    ];

    lines.push("Upload".to_string());
    match &report.payload.filename {
        Some(name) => {
            lines.push(format!("{pad}Filename: {name}"));
            lines.push(format!(
                "{pad}Size: {}",
                format_size(report.payload.upload.len())
            ));
        }
        None => lines.push(format!("{pad}(no '{}' file part)", fields.upload)),
    }
    let verdict = if report.accepted { "accepted" } else { "rejected" };
    lines.push(format!(
        "{pad}Sniffed: {} ({verdict})",
        report.sniffed.unwrap_or("unknown")
    ));

    let scalars = [
        (&fields.path, &report.payload.path),
        (&fields.tags, &report.payload.tags),
    ];
    if scalars.iter().any(|(_, v)| v.is_some()) {
        lines.push("Fields".to_string());
        for (name, value) in scalars {
            if let Some(value) = value {
                lines.push(format!("{pad}{name}: {value}"));
            }
        }
    }

    lines
}

pub fn print_inspect_report(report: &Inspection, fields: &FormFields) {
    for line in format_inspect_report(report, fields) {
        println!("{}", line);
    }
}

// ============================================================================
// invoke
// ============================================================================

/// Format a one-glance summary of a response envelope.
///
/// `error` is the pipeline error behind a 400, when known.
pub fn format_response_summary(
    response: &ResponseEnvelope,
    error: Option<&PipelineError>,
) -> Vec<String> {
    let pad = indent(1);
    if response.is_success() {
        let content_type = response
            .headers
            .get("Content-Type")
            .map(String::as_str)
            .unwrap_or("-");
        let body = if response.is_base64_encoded {
            STANDARD
                .decode(&response.body)
                .map(|bytes| format_size(bytes.len()))
                .unwrap_or_else(|_| "(invalid base64)".to_string())
        } else {
            format_size(response.body.len())
        };
        vec![
            format!("{} {content_type}", response.status_code),
            format!("{pad}Body: {body}"),
        ]
    } else {
        let label = error.map(|e| e.kind().to_string()).unwrap_or_default();
        vec![
            format!("{} {label}", response.status_code).trim_end().to_string(),
            format!("{pad}{}", response.body),
        ]
    }
}

pub fn print_response_summary(response: &ResponseEnvelope, error: Option<&PipelineError>) {
    for line in format_response_summary(response, error) {
        eprintln!("{}", line);
    }
}
