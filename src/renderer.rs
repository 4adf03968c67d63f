//! Watermark rendering.
//!
//! The renderer owns the drawing surface lifecycle: it copies the decoded
//! source image onto an RGBA canvas at its natural dimensions, stamps the
//! rasterized text tile at every position the tiler produces (mapping each
//! tile through the rotation transform), encodes the composited canvas to
//! PNG and registers the bytes with the resource store. The returned
//! `blob:` identifier is directly usable as a new image source.
//!
//! Pixel work and encoding run on the blocking thread pool; the canvas
//! buffer is owned by the worker closure and released on every exit path.

use crate::config::WatermarkConfig;
use crate::error::WatermarkError;
use crate::glyph::{blend_over, parse_color, Typeface};
use crate::resource::ResourceStore;
use crate::tiler::{tile_positions, TilePoint};
use image::{DynamicImage, ImageOutputFormat, RgbaImage};
use std::io::Cursor;
use std::sync::Arc;

/// Composites the repeating text overlay and produces loadable resources.
#[derive(Clone)]
pub struct Renderer {
    typeface: Arc<Typeface>,
    store: ResourceStore,
}

impl std::fmt::Debug for Renderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Renderer")
            .field("typeface", &self.typeface)
            .finish()
    }
}

impl Renderer {
    pub fn new(typeface: Typeface, store: ResourceStore) -> Self {
        Self {
            typeface: Arc::new(typeface),
            store,
        }
    }

    /// Overlay `text` across `source` and register the encoded result.
    ///
    /// The source image is never mutated; all drawing happens on an output
    /// canvas sized to the source's natural dimensions.
    ///
    /// # Returns
    ///
    /// The `blob:` identifier of the encoded PNG.
    pub async fn render(
        &self,
        source: &DynamicImage,
        text: &str,
        config: &WatermarkConfig,
    ) -> Result<String, WatermarkError> {
        let color = parse_color(&config.color)?;
        let typeface = Arc::clone(&self.typeface);
        let image = source.clone();
        let text = text.to_string();
        let config = config.clone();

        let encoded = tokio::task::spawn_blocking(move || -> Result<Vec<u8>, WatermarkError> {
            let mut canvas = image.to_rgba8();
            let tile = typeface.rasterize(&text, config.font_size, color);
            let positions =
                tile_positions(canvas.width(), canvas.height(), tile.width() as f32, &config);
            stamp_tiles(
                &mut canvas,
                &tile,
                &positions,
                config.rotation_degrees.to_radians(),
            );

            let mut out = Vec::new();
            DynamicImage::ImageRgba8(canvas)
                .write_to(&mut Cursor::new(&mut out), ImageOutputFormat::Png)
                .map_err(|e| WatermarkError::Encode(e.to_string()))?;
            Ok(out)
        })
        .await
        .map_err(|e| WatermarkError::Render(format!("render worker failed: {e}")))??;

        Ok(self.store.create(encoded))
    }

    /// The store the renderer registers encoded output with.
    pub fn store(&self) -> &ResourceStore {
        &self.store
    }
}

/// Stamp the text tile at every position, rotated about the canvas origin.
///
/// Positions are baseline anchors in the rotated frame: a tile's bottom edge
/// sits at the position's `y`, glyphs extend upward from it.
fn stamp_tiles(canvas: &mut RgbaImage, tile: &RgbaImage, positions: &[TilePoint], angle: f32) {
    let (cos, sin) = (angle.cos(), angle.sin());
    let width = canvas.width() as i32;
    let height = canvas.height() as i32;
    let tile_height = tile.height() as f32;

    for position in positions {
        for (px, py, pixel) in tile.enumerate_pixels() {
            if pixel[3] == 0 {
                continue;
            }
            let fx = position.x + px as f32;
            let fy = position.y - tile_height + py as f32;
            let tx = (fx * cos - fy * sin).round() as i32;
            let ty = (fx * sin + fy * cos).round() as i32;
            if tx < 0 || ty < 0 || tx >= width || ty >= height {
                continue;
            }
            let dst = canvas.get_pixel_mut(tx as u32, ty as u32);
            *dst = blend_over(*dst, *pixel);
        }
    }
}
