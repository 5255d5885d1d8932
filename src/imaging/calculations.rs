//! Pure calculation functions for image dimensions.
//!
//! All functions here are pure and testable without any I/O or images.

/// Dimensions that fit `source` within a `max_edge` square, preserving aspect.
///
/// Images already within bounds are returned unchanged; this never upscales.
/// Neither edge is rounded down to zero.
///
/// # Examples
/// ```
/// # use upload_shrink::imaging::fit_within;
/// // 4000x3000 landscape capped at 2000 → 2000x1500
/// assert_eq!(fit_within((4000, 3000), 2000), (2000, 1500));
///
/// // Already small enough
/// assert_eq!(fit_within((640, 480), 2000), (640, 480));
/// ```
pub fn fit_within(source: (u32, u32), max_edge: u32) -> (u32, u32) {
    let (src_w, src_h) = source;
    let longer_edge = src_w.max(src_h);

    if longer_edge <= max_edge || max_edge == 0 {
        return source;
    }

    let ratio = max_edge as f64 / longer_edge as f64;
    if src_w >= src_h {
        // Landscape or square
        let h = (src_h as f64 * ratio).round() as u32;
        (max_edge, h.max(1))
    } else {
        // Portrait
        let w = (src_w as f64 * ratio).round() as u32;
        (w.max(1), max_edge)
    }
}
