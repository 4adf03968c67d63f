//! Engine wiring and the public entry point.
//!
//! A [`WatermarkEngine`] owns the pipeline collaborators (loader, renderer,
//! cache, processor, observer) and exposes the two public operations:
//!
//! - [`WatermarkEngine::add_watermark`]: watermark every image currently in
//!   a document, then keep watching it for inserted images and source
//!   swaps. Idempotent for already-processed images.
//! - [`WatermarkEngine::process_image`]: watermark a single element.
//!
//! Defaults are deliberately boring: the embedded bitmap typeface, the
//! default source loader against a fresh resource store and a bounded
//! cache. The builder swaps any of them out.

use crate::cache::{CacheConfig, WatermarkCache};
use crate::config::{WatermarkConfig, WatermarkOptions};
use crate::dom::{Document, Element};
use crate::error::WatermarkError;
use crate::glyph::Typeface;
use crate::loader::{DefaultSourceLoader, SourceLoader};
use crate::observer::{ChangeObserver, WatchHandle};
use crate::processor::{ImageProcessor, ProcessingOutcome};
use crate::renderer::Renderer;
use crate::resource::ResourceStore;
use std::sync::Arc;
use tracing::info;

/// Builder for a [`WatermarkEngine`].
#[derive(Default)]
pub struct WatermarkEngineBuilder {
    defaults: Option<WatermarkConfig>,
    cache: Option<CacheConfig>,
    typeface: Option<Typeface>,
    loader: Option<Arc<dyn SourceLoader>>,
    store: Option<ResourceStore>,
}

impl WatermarkEngineBuilder {
    /// Default configuration merged under every call's options.
    pub fn defaults(mut self, config: WatermarkConfig) -> Self {
        self.defaults = Some(config);
        self
    }

    /// Sizing and expiry of the source-to-resource cache.
    pub fn cache(mut self, config: CacheConfig) -> Self {
        self.cache = Some(config);
        self
    }

    /// Typeface the overlay text is rasterized with.
    pub fn typeface(mut self, typeface: Typeface) -> Self {
        self.typeface = Some(typeface);
        self
    }

    /// Custom source loader (for hosts with their own asset pipeline).
    pub fn loader(mut self, loader: Arc<dyn SourceLoader>) -> Self {
        self.loader = Some(loader);
        self
    }

    /// Resource store to register watermarked output with.
    pub fn resource_store(mut self, store: ResourceStore) -> Self {
        self.store = Some(store);
        self
    }

    pub fn build(self) -> Result<WatermarkEngine, WatermarkError> {
        let store = self.store.unwrap_or_default();
        let loader: Arc<dyn SourceLoader> = match self.loader {
            Some(loader) => loader,
            None => Arc::new(DefaultSourceLoader::new(store.clone())?),
        };
        let renderer = Renderer::new(self.typeface.unwrap_or_default(), store.clone());
        let cache = WatermarkCache::new(self.cache.unwrap_or_default());
        let processor = Arc::new(ImageProcessor::new(loader, renderer, cache));

        Ok(WatermarkEngine {
            observer: ChangeObserver::new(Arc::clone(&processor)),
            processor,
            store,
            defaults: self.defaults.unwrap_or_default().normalized(),
        })
    }
}

/// The watermarking pipeline behind the public entry points.
pub struct WatermarkEngine {
    processor: Arc<ImageProcessor>,
    observer: ChangeObserver,
    store: ResourceStore,
    defaults: WatermarkConfig,
}

impl std::fmt::Debug for WatermarkEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatermarkEngine")
            .field("defaults", &self.defaults)
            .finish()
    }
}

impl WatermarkEngine {
    pub fn builder() -> WatermarkEngineBuilder {
        WatermarkEngineBuilder::default()
    }

    /// An engine with all-default collaborators.
    pub fn new() -> Result<Self, WatermarkError> {
        Self::builder().build()
    }

    /// Watermark every image currently in `document`, then keep watching it.
    ///
    /// The mutation subscription is created before the initial pass, so an
    /// image inserted while the pass runs is still picked up (the marker
    /// and cache checks make the occasional double delivery harmless).
    pub async fn add_watermark(
        &self,
        document: &Document,
        text: &str,
        options: Option<WatermarkOptions>,
    ) -> WatchHandle {
        let config = options.unwrap_or_default().merged_over(&self.defaults);
        let receiver = document.subscribe();

        let images = document.images();
        info!(images = images.len(), "watermarking current document");
        futures::future::join_all(
            images
                .iter()
                .map(|image| self.processor.process_image(image, text, &config)),
        )
        .await;

        self.observer.watch_stream(receiver, text.to_string(), config)
    }

    /// Watermark a single element, resolving to its final effective source.
    pub async fn process_image(
        &self,
        element: &Element,
        text: &str,
        options: Option<WatermarkOptions>,
    ) -> String {
        let config = options.unwrap_or_default().merged_over(&self.defaults);
        self.processor.process_image(element, text, &config).await
    }

    /// Like [`Self::process_image`] but reporting what happened.
    pub async fn process_with_outcome(
        &self,
        element: &Element,
        text: &str,
        options: Option<WatermarkOptions>,
    ) -> ProcessingOutcome {
        let config = options.unwrap_or_default().merged_over(&self.defaults);
        self.processor
            .process_with_outcome(element, text, &config)
            .await
    }

    /// The store holding watermarked output payloads.
    pub fn resource_store(&self) -> &ResourceStore {
        &self.store
    }

    /// The cache mapping original sources to watermarked resources.
    pub fn cache(&self) -> &WatermarkCache {
        self.processor.cache()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::IMAGE_TAG;
    use crate::processor::WATERMARKED_CLASS;
    use base64::engine::general_purpose::STANDARD as BASE64;
    use base64::Engine as _;
    use image::{DynamicImage, ImageOutputFormat, Rgba, RgbaImage};
    use std::io::Cursor;

    fn png_data_url(width: u32, height: u32) -> String {
        let buffer = RgbaImage::from_pixel(width, height, Rgba([60, 70, 80, 255]));
        let mut bytes = Vec::new();
        DynamicImage::ImageRgba8(buffer)
            .write_to(&mut Cursor::new(&mut bytes), ImageOutputFormat::Png)
            .unwrap();
        format!("data:image/png;base64,{}", BASE64.encode(&bytes))
    }

    fn options() -> Option<WatermarkOptions> {
        Some(WatermarkOptions {
            ignore_min_size: Some(1),
            ..Default::default()
        })
    }

    #[tokio::test]
    async fn test_add_watermark_processes_existing_images() {
        let engine = WatermarkEngine::new().unwrap();
        let document = Document::new();

        let first = document.create_element(IMAGE_TAG);
        first.set_src(png_data_url(32, 32));
        let second = document.create_element(IMAGE_TAG);
        second.set_src(png_data_url(40, 40));
        document.root().append_child(&first);
        document.root().append_child(&second);

        let handle = engine.add_watermark(&document, "WM", options()).await;
        assert!(first.has_class(WATERMARKED_CLASS));
        assert!(second.has_class(WATERMARKED_CLASS));
        assert!(first.src().unwrap().starts_with("blob:"));
        handle.stop();
    }

    #[tokio::test]
    async fn test_add_watermark_is_idempotent() {
        let engine = WatermarkEngine::new().unwrap();
        let document = Document::new();
        let img = document.create_element(IMAGE_TAG);
        img.set_src(png_data_url(32, 32));
        document.root().append_child(&img);

        let first = engine.add_watermark(&document, "WM", options()).await;
        let after_first = img.src().unwrap();
        first.stop();

        let second = engine.add_watermark(&document, "WM", options()).await;
        assert_eq!(img.src().unwrap(), after_first);
        second.stop();
    }

    #[tokio::test]
    async fn test_process_image_merges_options_over_defaults() {
        let engine = WatermarkEngine::builder()
            .defaults(WatermarkConfig {
                ignore_min_size: 1000,
                ..Default::default()
            })
            .build()
            .unwrap();
        let document = Document::new();
        let img = document.create_element(IMAGE_TAG);
        img.set_src(png_data_url(64, 64));

        // Without overrides the engine default threshold skips this image
        let outcome = engine.process_with_outcome(&img, "WM", None).await;
        assert_eq!(
            outcome,
            ProcessingOutcome::Skipped(crate::processor::SkipReason::BelowSizeThreshold)
        );

        // A per-call override lowers the threshold
        let outcome = engine.process_with_outcome(&img, "WM", options()).await;
        assert!(matches!(outcome, ProcessingOutcome::Rendered(_)));
    }

    #[tokio::test]
    async fn test_shared_store_exposes_output_bytes() {
        let engine = WatermarkEngine::new().unwrap();
        let document = Document::new();
        let img = document.create_element(IMAGE_TAG);
        img.set_src(png_data_url(32, 32));

        let resolved = engine.process_image(&img, "WM", options()).await;
        let bytes = engine.resource_store().get(&resolved).unwrap();
        assert!(image::load_from_memory(&bytes).is_ok());
    }
}
