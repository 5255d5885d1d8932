//! Response size gate.
//!
//! Lambda caps a synchronous response payload; a transformed image that
//! would not fit once returned is rejected rather than truncated.

/// Bytes per megabyte as the platform counts them.
pub const BYTES_PER_MB: f64 = 1_048_576.0;

/// Ceiling of the reference deployment.
pub const DEFAULT_CEILING_MB: f64 = 6.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResponseCeiling {
    megabytes: f64,
}

impl ResponseCeiling {
    pub fn new(megabytes: f64) -> Self {
        Self { megabytes }
    }

    pub fn megabytes(self) -> f64 {
        self.megabytes
    }

    /// `len / 1 MiB <= ceiling`.
    pub fn fits(self, len: usize) -> bool {
        len as f64 / BYTES_PER_MB <= self.megabytes
    }
}

impl Default for ResponseCeiling {
    fn default() -> Self {
        Self::new(DEFAULT_CEILING_MB)
    }
}
