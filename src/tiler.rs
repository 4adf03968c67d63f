//! Tile geometry for the repeating text overlay.
//!
//! Positions are computed in the rotated drawing frame: the text is laid out
//! axis-aligned on a grid, and the renderer maps every tile through the
//! rotation when stamping, which makes the pattern appear slanted in the
//! final image. To keep the corners of the unrotated surface covered, the
//! grid overscans by a margin proportional to `|sin(angle)|`.
//!
//! The computation is pure and reproducible: the same inputs always yield
//! the same position list, independent of any drawing call.

use crate::config::WatermarkConfig;

/// Smallest step the tiling loops will take, in pixels. Guards loop
/// termination when intervals and text width degenerate to zero.
pub const MIN_STEP: f32 = 1.0;

/// A single text draw position in the rotated drawing frame.
///
/// `y` marks the text baseline; glyphs extend upward from it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TilePoint {
    pub x: f32,
    pub y: f32,
}

/// Extra overscan needed so rotated tiles still reach the surface corners.
///
/// Returns `(margin_x, margin_y)` where `margin_x = |sin| * height` and
/// `margin_y = |sin| * width`. An angle of zero degenerates both to 0.
pub fn rotation_margins(width: f32, height: f32, angle_radians: f32) -> (f32, f32) {
    let sin = angle_radians.sin().abs();
    (sin * height, sin * width)
}

/// Compute every draw position for a surface of the given pixel dimensions.
///
/// The horizontal step is `horizontal_interval + text_width`, the vertical
/// step is `vertical_interval`; both are clamped to [`MIN_STEP`] so the
/// loops always terminate.
pub fn tile_positions(
    surface_width: u32,
    surface_height: u32,
    text_width: f32,
    config: &WatermarkConfig,
) -> Vec<TilePoint> {
    let width = surface_width as f32;
    let height = surface_height as f32;
    let angle = config.rotation_degrees.to_radians();
    let (margin_x, margin_y) = rotation_margins(width, height, angle);

    let step_x = (config.horizontal_interval + text_width).max(MIN_STEP);
    let step_y = config.vertical_interval.max(MIN_STEP);

    let mut positions = Vec::new();
    let mut x = -margin_x;
    while x < width + margin_x {
        let mut y = -margin_y;
        while y < height + margin_y {
            positions.push(TilePoint { x, y });
            y += step_y;
        }
        x += step_x;
    }
    positions
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn config(horizontal: f32, vertical: f32, rotation: f32) -> WatermarkConfig {
        WatermarkConfig {
            horizontal_interval: horizontal,
            vertical_interval: vertical,
            rotation_degrees: rotation,
            ..Default::default()
        }
    }

    #[test]
    fn test_zero_rotation_reduces_to_plain_grid() {
        let positions = tile_positions(200, 100, 50.0, &config(50.0, 50.0, 0.0));
        assert!(!positions.is_empty());
        // No overscan: the grid starts exactly at the origin
        assert_eq!(positions[0], TilePoint { x: 0.0, y: 0.0 });
        assert!(positions.iter().all(|p| p.x >= 0.0 && p.y >= 0.0));
        assert!(positions.iter().all(|p| p.x < 200.0 && p.y < 100.0));
    }

    #[test]
    fn test_rotated_grid_overscans_by_sine_margins() {
        let cfg = config(50.0, 50.0, -30.0);
        let positions = tile_positions(200, 200, 100.0, &cfg);

        let angle = (-30.0f32).to_radians();
        let (margin_x, margin_y) = rotation_margins(200.0, 200.0, angle);
        assert!((margin_x - 100.0).abs() < 0.01); // sin(30) * 200
        assert!((margin_y - 100.0).abs() < 0.01);

        let min_x = positions.iter().map(|p| p.x).fold(f32::INFINITY, f32::min);
        let min_y = positions.iter().map(|p| p.y).fold(f32::INFINITY, f32::min);
        assert_eq!(min_x, -margin_x);
        assert_eq!(min_y, -margin_y);
    }

    // Test: the grid covers the overscanned area with no gap wider than a step
    #[rstest]
    #[case(-30.0)]
    #[case(30.0)]
    #[case(-45.0)]
    #[case(60.0)]
    #[case(0.0)]
    fn test_coverage_has_no_gaps(#[case] rotation: f32) {
        let cfg = config(50.0, 50.0, rotation);
        let text_width = 120.0;
        let (w, h) = (640u32, 480u32);
        let positions = tile_positions(w, h, text_width, &cfg);
        assert!(!positions.is_empty());

        let angle = rotation.to_radians();
        let (margin_x, margin_y) = rotation_margins(w as f32, h as f32, angle);
        let step_x = cfg.horizontal_interval + text_width;
        let step_y = cfg.vertical_interval;

        let max_x = positions
            .iter()
            .map(|p| p.x)
            .fold(f32::NEG_INFINITY, f32::max);
        let max_y = positions
            .iter()
            .map(|p| p.y)
            .fold(f32::NEG_INFINITY, f32::max);

        // One more step from the last column/row would leave the overscan
        // area, so every interior point is within a step of some position
        assert!(max_x + step_x >= w as f32 + margin_x);
        assert!(max_y + step_y >= h as f32 + margin_y);

        // Adjacent columns and rows are exactly one step apart
        let mut xs: Vec<f32> = positions.iter().map(|p| p.x).collect();
        xs.sort_by(|a, b| a.partial_cmp(b).unwrap());
        xs.dedup();
        for pair in xs.windows(2) {
            assert!((pair[1] - pair[0] - step_x).abs() < 0.01);
        }
    }

    #[test]
    fn test_degenerate_steps_are_clamped_and_terminate() {
        // Zero interval with zero text width would never advance unclamped
        let positions = tile_positions(16, 16, 0.0, &config(0.0, 0.0, -30.0));
        assert!(!positions.is_empty());
        // The clamp keeps the position count finite and sane
        assert!(positions.len() < 10_000);
    }

    #[test]
    fn test_positions_are_reproducible() {
        let cfg = config(50.0, 50.0, -30.0);
        let a = tile_positions(300, 200, 80.0, &cfg);
        let b = tile_positions(300, 200, 80.0, &cfg);
        assert_eq!(a, b);
    }

    #[test]
    fn test_opposite_angles_produce_same_grid() {
        // Margins depend on |sin|, so mirrored angles tile identically
        let a = tile_positions(320, 240, 90.0, &config(40.0, 40.0, -30.0));
        let b = tile_positions(320, 240, 90.0, &config(40.0, 40.0, 30.0));
        assert_eq!(a, b);
    }

    #[test]
    fn test_single_pixel_surface() {
        let positions = tile_positions(1, 1, 10.0, &config(10.0, 10.0, -30.0));
        assert!(!positions.is_empty());
    }
}
