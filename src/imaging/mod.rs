//! Image transform: pure Rust, no system libraries.
//!
//! | Operation | Crate / function |
//! |---|---|
//! | **Detect** | `image::guess_format` |
//! | **Downsize** | Lanczos3 via `resize_exact` |
//! | **Re-encode JPEG** | `JpegEncoder::new_with_quality` |
//! | **Re-encode PNG** | palette: NeuQuant + indexed `png::Encoder`; truecolour: `PngEncoder`, adaptive filter |
//! | **Strip** | chunk / segment walk, when re-encoding does not shrink |
//!
//! The module is split into:
//! - **Calculations**: Pure functions for dimension math (unit testable)
//! - **Parameters**: Data structures describing the re-encode
//! - **Backend**: [`ImageTransform`] trait + [`TransformError`]
//! - **Palette**: exact or quantized indexed-colour PNG output
//! - **Strip**: metadata removal on encoded bytes
//! - **Rust backend**: [`RustTransform`], the production implementation

pub mod backend;
mod calculations;
mod palette;
mod params;
pub mod rust_backend;
mod strip;

pub use backend::{ImageTransform, TransformError};
pub use calculations::fit_within;
pub use params::{PngCompression, Quality, TransformParams};
pub use rust_backend::RustTransform;
