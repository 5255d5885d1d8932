//! Service configuration module.
//!
//! Handles loading, validating, and merging `config.toml`. Configuration is
//! layered: stock defaults, then an optional user file, then environment
//! overrides. The result is validated once at startup; a bad configuration
//! stops the process before it ever serves a request.
//!
//! ## Config File Location
//!
//! The file is optional. It is looked up in this order:
//!
//! 1. the `--config <FILE>` flag
//! 2. the `UPLOAD_SHRINK_CONFIG` environment variable
//!
//! With neither set, stock defaults are used. A file that is named but does
//! not exist is an error.
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! [limits]
//! response_ceiling_mb = 6.0   # Largest response body, in MiB
//!
//! [mime]
//! allowed = ["image/png", "image/jpeg"]
//!
//! [form]
//! upload_field = "upload"     # File part carrying the image
//! path_field = "upload-path"
//! tags_field = "upload-tags"
//!
//! [transform]
//! jpeg_quality = 80           # 1-100
//! png_compression = "default" # fast | default | best
//! png_palette = true          # Indexed-colour PNG output
//! # max_dimension = 2048      # Downsize longer edge (omit to keep size)
//!
//! [host]
//! library_path_from_exe = true
//! log_format = "pretty"       # pretty | json
//! ```
//!
//! ## Environment Overrides
//!
//! | Variable | Overrides |
//! |---|---|
//! | `UPLOAD_SHRINK_CEILING_MB` | `limits.response_ceiling_mb` |
//! | `UPLOAD_SHRINK_ALLOWED_MIME` | `mime.allowed` (comma-separated) |
//!
//! Unknown keys are rejected to catch typos early.

use crate::form::FormFields;
use crate::imaging::{PngCompression, Quality, TransformParams};
use crate::limits::{DEFAULT_CEILING_MB, ResponseCeiling};
use crate::mime::MimeAllowList;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const CONFIG_ENV: &str = "UPLOAD_SHRINK_CONFIG";
pub const CEILING_ENV: &str = "UPLOAD_SHRINK_CEILING_MB";
pub const ALLOWED_MIME_ENV: &str = "UPLOAD_SHRINK_ALLOWED_MIME";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Config file not found: {}", .0.display())]
    NotFound(PathBuf),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Invalid value for {var}: {value:?}")]
    Env { var: &'static str, value: String },
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Service configuration loaded from `config.toml`.
///
/// All fields have defaults matching the reference deployment. User files
/// need only specify the values they want to override.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    /// Response size ceiling.
    pub limits: LimitsConfig,
    /// Accepted upload formats.
    pub mime: MimeConfig,
    /// Multipart form field names.
    pub form: FormConfig,
    /// Re-encode parameters.
    pub transform: TransformConfig,
    /// Process bootstrap settings.
    pub host: HostConfig,
}

impl AppConfig {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let ceiling = self.limits.response_ceiling_mb;
        if !ceiling.is_finite() || ceiling <= 0.0 {
            return Err(ConfigError::Validation(
                "limits.response_ceiling_mb must be a positive number".into(),
            ));
        }
        if self.mime.allowed.is_empty() {
            return Err(ConfigError::Validation(
                "mime.allowed must not be empty".into(),
            ));
        }
        for entry in self.mime.allowed.entries() {
            let is_image = entry
                .trim()
                .split_once('/')
                .is_some_and(|(top, sub)| top.eq_ignore_ascii_case("image") && !sub.is_empty());
            if !is_image {
                return Err(ConfigError::Validation(format!(
                    "mime.allowed entry {entry:?} is not an image/<subtype> type"
                )));
            }
        }
        if !(1..=100).contains(&self.transform.jpeg_quality) {
            return Err(ConfigError::Validation(
                "transform.jpeg_quality must be 1-100".into(),
            ));
        }
        if self.transform.max_dimension == Some(0) {
            return Err(ConfigError::Validation(
                "transform.max_dimension must be greater than 0".into(),
            ));
        }
        let fields = [
            &self.form.upload_field,
            &self.form.path_field,
            &self.form.tags_field,
        ];
        if fields.iter().any(|f| f.is_empty()) {
            return Err(ConfigError::Validation(
                "form field names must not be empty".into(),
            ));
        }
        if fields[0] == fields[1] || fields[0] == fields[2] || fields[1] == fields[2] {
            return Err(ConfigError::Validation(
                "form field names must be distinct".into(),
            ));
        }
        Ok(())
    }

    pub fn ceiling(&self) -> ResponseCeiling {
        ResponseCeiling::new(self.limits.response_ceiling_mb)
    }

    pub fn form_fields(&self) -> FormFields {
        FormFields {
            upload: self.form.upload_field.clone(),
            path: self.form.path_field.clone(),
            tags: self.form.tags_field.clone(),
        }
    }

    pub fn transform_params(&self) -> TransformParams {
        TransformParams {
            jpeg_quality: Quality::new(self.transform.jpeg_quality),
            png_compression: self.transform.png_compression,
            png_palette: self.transform.png_palette,
            max_dimension: self.transform.max_dimension,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LimitsConfig {
    /// Largest transformed image, in MiB, that may be returned inline.
    pub response_ceiling_mb: f64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            response_ceiling_mb: DEFAULT_CEILING_MB,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MimeConfig {
    pub allowed: MimeAllowList,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FormConfig {
    pub upload_field: String,
    pub path_field: String,
    pub tags_field: String,
}

impl Default for FormConfig {
    fn default() -> Self {
        let fields = FormFields::default();
        Self {
            upload_field: fields.upload,
            path_field: fields.path,
            tags_field: fields.tags,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TransformConfig {
    /// JPEG re-encode quality (1-100).
    pub jpeg_quality: u32,
    pub png_compression: PngCompression,
    /// Write PNGs with an indexed palette (quantized past 256 colours).
    pub png_palette: bool,
    /// Downsize so the longer edge is at most this many pixels.
    pub max_dimension: Option<u32>,
}

impl Default for TransformConfig {
    fn default() -> Self {
        let params = TransformParams::default();
        Self {
            jpeg_quality: params.jpeg_quality.value(),
            png_compression: params.png_compression,
            png_palette: params.png_palette,
            max_dimension: params.max_dimension,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HostConfig {
    /// Prepend the executable's directory to `LD_LIBRARY_PATH` at startup.
    pub library_path_from_exe: bool,
    pub log_format: LogFormat,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            library_path_from_exe: true,
            log_format: LogFormat::default(),
        }
    }
}

/// Log output style.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable, for terminals.
    #[default]
    Pretty,
    /// One JSON object per line, for CloudWatch.
    Json,
}

// =============================================================================
// Config loading, merging, and validation
// =============================================================================

/// Returns the stock default config as a `toml::Value::Table`.
///
/// This is the canonical representation of all default values, used as the
/// base layer for merging user overrides on top.
pub fn stock_defaults_value() -> toml::Value {
    toml::Value::try_from(AppConfig::default()).expect("default config must serialize")
}

/// Recursively merge `overlay` on top of `base`.
///
/// - Tables are merged key-by-key (overlay keys override base keys).
/// - Non-table values in overlay replace base values entirely.
/// - Keys in base that are not in overlay are preserved.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Load a config file as a raw TOML value.
///
/// Returns `Err(NotFound)` if the file does not exist and `Err(Toml)` if it
/// contains invalid TOML.
pub fn load_raw_config(path: &Path) -> Result<toml::Value, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::NotFound(path.to_path_buf()));
    }
    let content = fs::read_to_string(path)?;
    let value: toml::Value = toml::from_str(&content)?;
    Ok(value)
}

/// Merge an optional overlay onto a base value, then deserialize.
///
/// Validation is left to the caller so environment overrides can be applied
/// to the merged result first.
pub fn resolve_config(
    base: toml::Value,
    overlay: Option<toml::Value>,
) -> Result<AppConfig, ConfigError> {
    let merged = match overlay {
        Some(ov) => merge_toml(base, ov),
        None => base,
    };
    Ok(merged.try_into()?)
}

/// Apply `UPLOAD_SHRINK_*` overrides read through `lookup`.
pub fn apply_env_overrides(
    config: &mut AppConfig,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<(), ConfigError> {
    if let Some(value) = lookup(CEILING_ENV) {
        config.limits.response_ceiling_mb =
            value.trim().parse().map_err(|_| ConfigError::Env {
                var: CEILING_ENV,
                value: value.clone(),
            })?;
    }
    if let Some(value) = lookup(ALLOWED_MIME_ENV) {
        config.mime.allowed = MimeAllowList::from_csv(&value);
    }
    Ok(())
}

/// Which config file to read: the explicit flag, else `UPLOAD_SHRINK_CONFIG`.
pub fn config_path(
    flag: Option<&Path>,
    lookup: impl Fn(&str) -> Option<String>,
) -> Option<PathBuf> {
    flag.map(Path::to_path_buf).or_else(|| {
        lookup(CONFIG_ENV)
            .filter(|p| !p.trim().is_empty())
            .map(PathBuf::from)
    })
}

/// Resolve the full configuration with an injectable environment.
pub fn load_config_with(
    flag: Option<&Path>,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<AppConfig, ConfigError> {
    let overlay = config_path(flag, &lookup)
        .map(|path| load_raw_config(&path))
        .transpose()?;
    let mut config = resolve_config(stock_defaults_value(), overlay)?;
    apply_env_overrides(&mut config, &lookup)?;
    config.validate()?;
    Ok(config)
}

/// Resolve the full configuration from the process environment.
///
/// Merges the user file (if any) on top of stock defaults, applies
/// environment overrides, rejects unknown keys, and validates the result.
pub fn load_config(flag: Option<&Path>) -> Result<AppConfig, ConfigError> {
    load_config_with(flag, |key| std::env::var(key).ok())
}

/// Returns a fully-commented stock `config.toml` with all keys and explanations.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# upload-shrink Configuration
# ===========================
# All settings are optional. Remove or comment out any you don't need.
# Values shown below are the defaults.
#
# Point the service at this file with --config <FILE> or the
# UPLOAD_SHRINK_CONFIG environment variable.
#
# Unknown keys will cause an error.

# ---------------------------------------------------------------------------
# Limits
# ---------------------------------------------------------------------------
[limits]
# Largest transformed image that may be returned inline, in MiB
# (1 MiB = 1048576 bytes). Lambda caps synchronous responses at 6 MB.
# Env override: UPLOAD_SHRINK_CEILING_MB
response_ceiling_mb = 6.0

# ---------------------------------------------------------------------------
# Accepted formats
# ---------------------------------------------------------------------------
[mime]
# Sniffed content types accepted for upload. The client-declared type is
# never trusted. Env override: UPLOAD_SHRINK_ALLOWED_MIME (comma-separated)
allowed = ["image/png", "image/jpeg"]

# ---------------------------------------------------------------------------
# Form fields
# ---------------------------------------------------------------------------
[form]
# File part carrying the image. The first such part wins.
upload_field = "upload"
# Optional scalar fields passed through alongside the upload.
path_field = "upload-path"
tags_field = "upload-tags"

# ---------------------------------------------------------------------------
# Transform
# ---------------------------------------------------------------------------
[transform]
# JPEG re-encode quality (1 = smallest, 100 = best).
jpeg_quality = 80

# PNG zlib effort: "fast", "default" or "best".
png_compression = "default"

# Write PNGs as indexed colour. Images with more than 256 colours are
# quantized, which is lossy. Set to false for lossless truecolour output.
png_palette = true

# Downsize so the longer edge is at most this many pixels.
# Omit or comment out to keep the original dimensions.
# max_dimension = 2048

# ---------------------------------------------------------------------------
# Host
# ---------------------------------------------------------------------------
[host]
# Prepend the executable's directory to LD_LIBRARY_PATH once at startup,
# so shared libraries bundled next to the binary are found.
library_path_from_exe = true

# "pretty" for terminals, "json" for CloudWatch. RUST_LOG sets the filter.
log_format = "pretty"
"##
}
