//! Text measurement and rasterization.
//!
//! The watermark text is rasterized once per render into a transparent RGBA
//! tile, which the renderer then stamps across the target image. Two
//! typefaces are supported:
//!
//! - **Bitmap**: an embedded 8x8 bitmap font scaled with nearest neighbor.
//!   Always available and fully deterministic.
//! - **Vector**: a TTF/OTF font loaded from disk, rendered with anti-aliased
//!   glyph outlines.
//!
//! Color strings accept hex (`#RGB`, `#RRGGBB`, `#RRGGBBAA`) and CSS
//! `rgb()`/`rgba()` forms, since alpha is how watermark subtlety is usually
//! expressed.

use crate::error::WatermarkError;
use ab_glyph::{point, Font, FontVec, PxScale, ScaleFont};
use font8x8::{UnicodeFonts, BASIC_FONTS};
use image::{Rgba, RgbaImage};
use std::path::Path;

/// Common font locations probed by [`Typeface::system`].
const SYSTEM_FONT_PATHS: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/System/Library/Fonts/Helvetica.ttc",
    "C:\\Windows\\Fonts\\arial.ttf",
];

/// Parsed RGBA color.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    /// Opaque white.
    pub fn white() -> Self {
        Self::new(255, 255, 255, 255)
    }

    /// Opaque black.
    pub fn black() -> Self {
        Self::new(0, 0, 0, 255)
    }
}

/// Parse a CSS-style color string.
///
/// Supports `#RGB`, `#RRGGBB` and `#RRGGBBAA` hex forms plus
/// `rgb(r, g, b)` and `rgba(r, g, b, a)` where `a` is a 0.0..=1.0 float.
pub fn parse_color(input: &str) -> Result<Color, WatermarkError> {
    let trimmed = input.trim();
    if let Some(hex) = trimmed.strip_prefix('#') {
        return parse_hex(hex);
    }
    if trimmed.starts_with("rgb(") || trimmed.starts_with("rgba(") {
        return parse_rgb_function(trimmed);
    }
    Err(WatermarkError::Config(format!(
        "unsupported color syntax: {trimmed}"
    )))
}

fn parse_hex(hex: &str) -> Result<Color, WatermarkError> {
    let digit = |s: &str| {
        u8::from_str_radix(s, 16)
            .map_err(|_| WatermarkError::Config(format!("invalid hex digit in color: {s}")))
    };
    match hex.len() {
        3 => {
            // Each digit doubles: 0xF -> 0xFF
            let r = digit(&hex[0..1])?;
            let g = digit(&hex[1..2])?;
            let b = digit(&hex[2..3])?;
            Ok(Color::new(r * 17, g * 17, b * 17, 255))
        }
        6 => Ok(Color::new(
            digit(&hex[0..2])?,
            digit(&hex[2..4])?,
            digit(&hex[4..6])?,
            255,
        )),
        8 => Ok(Color::new(
            digit(&hex[0..2])?,
            digit(&hex[2..4])?,
            digit(&hex[4..6])?,
            digit(&hex[6..8])?,
        )),
        _ => Err(WatermarkError::Config(format!(
            "hex color must have 3, 6 or 8 digits, got {}",
            hex.len()
        ))),
    }
}

fn parse_rgb_function(input: &str) -> Result<Color, WatermarkError> {
    let open = input
        .find('(')
        .ok_or_else(|| WatermarkError::Config(format!("malformed color: {input}")))?;
    let close = input
        .rfind(')')
        .ok_or_else(|| WatermarkError::Config(format!("malformed color: {input}")))?;
    let parts: Vec<&str> = input[open + 1..close].split(',').map(str::trim).collect();
    if parts.len() != 3 && parts.len() != 4 {
        return Err(WatermarkError::Config(format!(
            "rgb()/rgba() expects 3 or 4 components, got {}",
            parts.len()
        )));
    }

    let channel = |s: &str| -> Result<u8, WatermarkError> {
        s.parse::<f32>()
            .map(|v| v.clamp(0.0, 255.0).round() as u8)
            .map_err(|_| WatermarkError::Config(format!("invalid color channel: {s}")))
    };
    let r = channel(parts[0])?;
    let g = channel(parts[1])?;
    let b = channel(parts[2])?;
    let a = if parts.len() == 4 {
        let alpha = parts[3]
            .parse::<f32>()
            .map_err(|_| WatermarkError::Config(format!("invalid alpha: {}", parts[3])))?;
        (alpha.clamp(0.0, 1.0) * 255.0).round() as u8
    } else {
        255
    };
    Ok(Color::new(r, g, b, a))
}

/// Blend `top` over `bottom` with standard alpha compositing.
pub(crate) fn blend_over(bottom: Rgba<u8>, top: Rgba<u8>) -> Rgba<u8> {
    let top_alpha = top[3] as f32 / 255.0;
    let bottom_alpha = bottom[3] as f32 / 255.0;

    let out_alpha = top_alpha + bottom_alpha * (1.0 - top_alpha);
    if out_alpha < 0.001 {
        return Rgba([0, 0, 0, 0]);
    }

    let blend = |t: u8, b: u8| -> u8 {
        let t = t as f32 / 255.0;
        let b = b as f32 / 255.0;
        let result = (t * top_alpha + b * bottom_alpha * (1.0 - top_alpha)) / out_alpha;
        (result * 255.0) as u8
    };

    Rgba([
        blend(top[0], bottom[0]),
        blend(top[1], bottom[1]),
        blend(top[2], bottom[2]),
        (out_alpha * 255.0) as u8,
    ])
}

/// A typeface the watermark text can be measured and rasterized with.
pub enum Typeface {
    /// Embedded 8x8 bitmap font, scaled with nearest neighbor.
    Bitmap,
    /// Vector font parsed from TTF/OTF data.
    Vector(FontVec),
}

impl std::fmt::Debug for Typeface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bitmap => f.write_str("Typeface::Bitmap"),
            Self::Vector(_) => f.write_str("Typeface::Vector"),
        }
    }
}

impl Default for Typeface {
    fn default() -> Self {
        Self::Bitmap
    }
}

impl Typeface {
    /// The embedded bitmap face.
    pub fn bitmap() -> Self {
        Self::Bitmap
    }

    /// Parse a vector face from raw TTF/OTF bytes.
    pub fn from_bytes(data: Vec<u8>) -> Result<Self, WatermarkError> {
        FontVec::try_from_vec(data)
            .map(Self::Vector)
            .map_err(|_| WatermarkError::Config("failed to parse font data".to_string()))
    }

    /// Load a vector face from a font file.
    pub fn from_file(path: &Path) -> Result<Self, WatermarkError> {
        let data = std::fs::read(path).map_err(|e| {
            WatermarkError::Config(format!("failed to read font {}: {}", path.display(), e))
        })?;
        Self::from_bytes(data)
    }

    /// Probe common system font locations, falling back to the embedded
    /// bitmap face when none is usable.
    pub fn system() -> Self {
        for path in SYSTEM_FONT_PATHS {
            if let Ok(data) = std::fs::read(path) {
                if let Ok(face) = Self::from_bytes(data) {
                    tracing::info!(font = %path, "loaded system font");
                    return face;
                }
            }
        }
        tracing::debug!("no system font found, using embedded bitmap font");
        Self::Bitmap
    }

    /// Pixel dimensions of `text` rendered at `font_size`.
    pub fn measure(&self, text: &str, font_size: f32) -> (u32, u32) {
        match self {
            Self::Bitmap => {
                let scale = bitmap_scale(font_size);
                let glyph = 8 * scale;
                let gap = scale;
                let count = text.chars().count() as u32;
                let width = if count == 0 {
                    0
                } else {
                    count * (glyph + gap) - gap
                };
                (width.max(1), glyph.max(1))
            }
            Self::Vector(font) => {
                let scale = PxScale::from(font_size);
                let scaled = font.as_scaled(scale);

                let mut width = 0.0f32;
                let mut prev: Option<ab_glyph::GlyphId> = None;
                for c in text.chars() {
                    let id = scaled.glyph_id(c);
                    if let Some(prev) = prev {
                        width += scaled.kern(prev, id);
                    }
                    width += scaled.h_advance(id);
                    prev = Some(id);
                }

                let padding = 2;
                (
                    width.ceil() as u32 + padding,
                    scaled.height().ceil() as u32 + padding,
                )
            }
        }
    }

    /// Rasterize `text` into a transparent RGBA tile.
    ///
    /// The tile's alpha carries the color's alpha so the renderer can blend
    /// it directly; an empty string yields a blank 1x1 tile.
    pub fn rasterize(&self, text: &str, font_size: f32, color: Color) -> RgbaImage {
        let (width, height) = self.measure(text, font_size);
        let mut tile = RgbaImage::new(width.max(1), height.max(1));

        match self {
            Self::Bitmap => {
                let scale = bitmap_scale(font_size);
                let mut cursor_x = 0u32;
                for ch in text.chars() {
                    let glyph = BASIC_FONTS
                        .get(ch)
                        .unwrap_or_else(|| BASIC_FONTS.get('?').unwrap());
                    for (row, bits) in glyph.iter().enumerate() {
                        for col in 0..8u32 {
                            if (bits >> col) & 1 == 0 {
                                continue;
                            }
                            // Scale each set bit up with nearest neighbor
                            for dx in 0..scale {
                                for dy in 0..scale {
                                    let x = cursor_x + col * scale + dx;
                                    let y = row as u32 * scale + dy;
                                    if x < tile.width() && y < tile.height() {
                                        tile.put_pixel(
                                            x,
                                            y,
                                            Rgba([color.r, color.g, color.b, color.a]),
                                        );
                                    }
                                }
                            }
                        }
                    }
                    cursor_x += 8 * scale + scale;
                }
            }
            Self::Vector(font) => {
                let scale = PxScale::from(font_size);
                let scaled = font.as_scaled(scale);
                let baseline_y = scaled.ascent();

                let mut cursor_x = 0.0f32;
                let mut prev: Option<ab_glyph::GlyphId> = None;
                for c in text.chars() {
                    let id = scaled.glyph_id(c);
                    if let Some(prev) = prev {
                        cursor_x += scaled.kern(prev, id);
                    }
                    let glyph = id.with_scale_and_position(scale, point(cursor_x, baseline_y));
                    if let Some(outlined) = font.outline_glyph(glyph) {
                        let bounds = outlined.px_bounds();
                        outlined.draw(|px, py, coverage| {
                            let x = px as i32 + bounds.min.x as i32;
                            let y = py as i32 + bounds.min.y as i32;
                            if x >= 0
                                && y >= 0
                                && (x as u32) < tile.width()
                                && (y as u32) < tile.height()
                            {
                                let alpha = (coverage * color.a as f32) as u8;
                                let pixel = Rgba([color.r, color.g, color.b, alpha]);
                                let existing = *tile.get_pixel(x as u32, y as u32);
                                tile.put_pixel(x as u32, y as u32, blend_over(existing, pixel));
                            }
                        });
                    }
                    cursor_x += scaled.h_advance(id);
                    prev = Some(id);
                }
            }
        }

        tile
    }
}

/// Nearest-neighbor scale factor for the 8px bitmap font.
fn bitmap_scale(font_size: f32) -> u32 {
    ((font_size / 8.0).round() as u32).max(1)
}
