//! # Image Resize Module
//!
//! Questo modulo contiene la geometria del ridimensionamento: calcolo delle
//! dimensioni di output, fattore di downsample in fase di decodifica e
//! controllo del budget di memoria dei buffer.
//!
//! ## Caratteristiche
//! - **Solo downscale**: `scale = min(maxW/w, maxH/h, 1.0)`, mai upscaling
//! - **Aspect ratio preservato**: arrotondamento al pixel più vicino
//! - **Downsample factor**: potenza di due (1, 2, 4, 8) scelta sui bounds
//!   completi, così il decoder emette un buffer già ridotto
//! - **Budget memoria**: stima dei byte di un buffer RGBA prima di allocarlo

use image::imageops::FilterType;

/// Largest factor the JPEG decoder can apply while decoding
pub const MAX_DOWNSAMPLE_FACTOR: u32 = 8;

/// Filter for the final resize pass
pub const RESIZE_FILTER: FilterType = FilterType::Lanczos3;

/// Scale factor that fits `width x height` inside the optional bounds.
///
/// A missing bound does not constrain its axis; the result never exceeds 1.0.
pub fn fit_scale(width: u32, height: u32, max_width: Option<u32>, max_height: Option<u32>) -> f64 {
    if width == 0 || height == 0 {
        return 1.0;
    }

    let width_ratio = max_width.map_or(1.0, |w| w as f64 / width as f64);
    let height_ratio = max_height.map_or(1.0, |h| h as f64 / height as f64);

    width_ratio.min(height_ratio).min(1.0)
}

/// Output dimensions for `width x height` fitted inside the optional bounds
pub fn fit_within(width: u32, height: u32, max_width: Option<u32>, max_height: Option<u32>) -> (u32, u32) {
    let scale = fit_scale(width, height, max_width, max_height);
    if scale >= 1.0 {
        return (width, height);
    }

    let mut new_width = ((width as f64 * scale).round() as u32).max(1);
    let mut new_height = ((height as f64 * scale).round() as u32).max(1);

    if let Some(max) = max_width {
        new_width = new_width.min(max.max(1));
    }
    if let Some(max) = max_height {
        new_height = new_height.min(max.max(1));
    }

    (new_width, new_height)
}

/// Largest power-of-two divisor that keeps the decoded buffer at least as
/// large as the target on both axes.
pub fn downsample_factor(width: u32, height: u32, target_width: u32, target_height: u32) -> u32 {
    let mut factor = 1;

    while factor < MAX_DOWNSAMPLE_FACTOR {
        let next = factor * 2;
        if width / next < target_width.max(1) || height / next < target_height.max(1) {
            break;
        }
        factor = next;
    }

    factor
}

/// Size in bytes of an RGBA8 buffer of the given dimensions
pub fn buffer_bytes(width: u32, height: u32) -> u64 {
    width as u64 * height as u64 * 4
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fit_within_downscales_preserving_aspect() {
        assert_eq!(fit_within(4000, 3000, Some(800), Some(600)), (800, 600));
        assert_eq!(fit_within(4000, 2000, Some(800), Some(600)), (800, 400));
        assert_eq!(fit_within(1000, 3000, Some(800), Some(600)), (200, 600));
    }

    #[test]
    fn test_fit_within_never_upscales() {
        assert_eq!(fit_within(640, 480, Some(800), Some(600)), (640, 480));
        assert_eq!(fit_within(640, 480, None, None), (640, 480));
    }

    #[test]
    fn test_fit_within_single_bound() {
        assert_eq!(fit_within(2000, 1000, Some(500), None), (500, 250));
        assert_eq!(fit_within(2000, 1000, None, Some(100)), (200, 100));
    }

    #[test]
    fn test_fit_within_tiny_bounds_keep_one_pixel() {
        assert_eq!(fit_within(3000, 10, Some(1), Some(1)), (1, 1));
    }

    #[test]
    fn test_downsample_factor() {
        assert_eq!(downsample_factor(4000, 3000, 800, 600), 4);
        assert_eq!(downsample_factor(4000, 3000, 4000, 3000), 1);
        assert_eq!(downsample_factor(4000, 3000, 2000, 1500), 2);
        assert_eq!(downsample_factor(8000, 6000, 100, 75), MAX_DOWNSAMPLE_FACTOR);
    }

    #[test]
    fn test_buffer_bytes() {
        assert_eq!(buffer_bytes(10, 10), 400);
        assert_eq!(buffer_bytes(0, 10), 0);
    }
}
