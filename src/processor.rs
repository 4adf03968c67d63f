//! Per-image watermark processing.
//!
//! The processor drives a single image element through its lifecycle:
//! eligibility checks, cache lookup, coalesced decode and render, and the
//! final commit back onto the element. Every path resolves; callers can
//! treat processing as fire-and-forget and inspect the outcome only when
//! they care why nothing changed.
//!
//! Check order for an element:
//! 1. an ignore class on the element skips it untouched
//! 2. an empty source skips it
//! 3. the marker class means a previous pass already finished
//! 4. a cache hit applies the recorded resource without rendering
//! 5. otherwise the source is decoded and rendered (coalesced per source)
//!
//! A failed element gains no marker, so a later source mutation or a fresh
//! pass retries it naturally.

use crate::cache::WatermarkCache;
use crate::coalesce::{RenderCoalescer, RenderSlot};
use crate::config::WatermarkConfig;
use crate::dom::Element;
use crate::loader::SourceLoader;
use crate::renderer::Renderer;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Class name marking elements that already carry a watermark.
pub const WATERMARKED_CLASS: &str = "has-watermark";

/// Why an element was left untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    IgnoredByClass,
    EmptySource,
    AlreadyWatermarked,
    BelowSizeThreshold,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::IgnoredByClass => write!(f, "ignored by class"),
            Self::EmptySource => write!(f, "empty source"),
            Self::AlreadyWatermarked => write!(f, "already watermarked"),
            Self::BelowSizeThreshold => write!(f, "below size threshold"),
        }
    }
}

/// Why processing gave up on an element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    /// The source could not be loaded or decoded
    Decode(String),
    /// The overlay could not be rendered or encoded
    Render(String),
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Decode(msg) => write!(f, "load error: {}", msg),
            Self::Render(msg) => write!(f, "render error: {}", msg),
        }
    }
}

/// Terminal result of processing one element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessingOutcome {
    /// Element left untouched on purpose
    Skipped(SkipReason),
    /// A previously rendered resource was applied
    Cached(String),
    /// A fresh render was produced and applied
    Rendered(String),
    /// Processing failed; element left untouched
    Failed(FailureReason),
}

impl ProcessingOutcome {
    /// The resource applied to the element, when one was.
    pub fn resource(&self) -> Option<&str> {
        match self {
            Self::Cached(id) | Self::Rendered(id) => Some(id),
            _ => None,
        }
    }
}

/// Orchestrates one image's watermark lifecycle.
pub struct ImageProcessor {
    loader: Arc<dyn SourceLoader>,
    renderer: Renderer,
    cache: WatermarkCache,
    coalescer: RenderCoalescer,
}

impl std::fmt::Debug for ImageProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageProcessor")
            .field("cache", &self.cache)
            .finish()
    }
}

impl ImageProcessor {
    pub fn new(loader: Arc<dyn SourceLoader>, renderer: Renderer, cache: WatermarkCache) -> Self {
        Self {
            loader,
            renderer,
            cache,
            coalescer: RenderCoalescer::new(),
        }
    }

    /// The cache recording original sources to watermarked resources.
    pub fn cache(&self) -> &WatermarkCache {
        &self.cache
    }

    /// Watermark one element, resolving to its final effective source.
    ///
    /// Never fails: skips and failures resolve with the element's current
    /// source so the call is safe to fire and forget.
    pub async fn process_image(
        &self,
        element: &Element,
        text: &str,
        config: &WatermarkConfig,
    ) -> String {
        self.process_with_outcome(element, text, config).await;
        element.src().unwrap_or_default()
    }

    /// Watermark one element and report what happened.
    pub async fn process_with_outcome(
        &self,
        element: &Element,
        text: &str,
        config: &WatermarkConfig,
    ) -> ProcessingOutcome {
        if config
            .ignore_class_names
            .iter()
            .any(|name| element.has_class(name))
        {
            debug!(element = ?element, "image opted out of watermarking");
            return ProcessingOutcome::Skipped(SkipReason::IgnoredByClass);
        }

        let src = match element.src() {
            Some(src) if !src.is_empty() => src,
            _ => {
                debug!(element = ?element, "image source is empty");
                return ProcessingOutcome::Skipped(SkipReason::EmptySource);
            }
        };

        if element.has_class(WATERMARKED_CLASS) {
            debug!(src = %src, "image already watermarked");
            return ProcessingOutcome::Skipped(SkipReason::AlreadyWatermarked);
        }

        if let Some(resource) = self.cache.get(&src).await {
            debug!(src = %src, "using cached watermark");
            self.commit(element, &resource);
            return ProcessingOutcome::Cached(resource);
        }

        let slot = self.coalescer.acquire(&src).await;
        if slot.is_follower() {
            if let Some(resource) = self.cache.get(&src).await {
                debug!(src = %src, "using watermark rendered by a concurrent request");
                self.commit(element, &resource);
                return ProcessingOutcome::Cached(resource);
            }
            // The leader failed or skipped; run the pipeline once ourselves
        }

        debug!(src = %src, "watermarking started");
        let outcome = self.decode_and_render(element, &src, text, config).await;
        match &outcome {
            ProcessingOutcome::Rendered(resource) => {
                info!(src = %src, resource = %resource, "watermarking finished");
            }
            ProcessingOutcome::Skipped(reason) => {
                debug!(src = %src, %reason, "watermarking skipped");
            }
            ProcessingOutcome::Failed(reason) => {
                warn!(src = %src, %reason, "watermarking failed");
            }
            ProcessingOutcome::Cached(_) => {}
        }

        if let RenderSlot::Leader(guard) = slot {
            guard.complete().await;
        }
        outcome
    }

    async fn decode_and_render(
        &self,
        element: &Element,
        src: &str,
        text: &str,
        config: &WatermarkConfig,
    ) -> ProcessingOutcome {
        let bytes = match self.loader.load(src).await {
            Ok(bytes) => bytes,
            Err(e) => return ProcessingOutcome::Failed(FailureReason::Decode(e.to_string())),
        };

        let decoded = match tokio::task::spawn_blocking(move || image::load_from_memory(&bytes))
            .await
        {
            Ok(Ok(image)) => image,
            Ok(Err(e)) => return ProcessingOutcome::Failed(FailureReason::Decode(e.to_string())),
            Err(e) => {
                return ProcessingOutcome::Failed(FailureReason::Decode(format!(
                    "decode worker failed: {e}"
                )))
            }
        };

        // The threshold check short-circuits: no surface is allocated and
        // the element is never mutated for an undersized image
        if decoded.width() < config.ignore_min_size || decoded.height() < config.ignore_min_size {
            return ProcessingOutcome::Skipped(SkipReason::BelowSizeThreshold);
        }

        match self.renderer.render(&decoded, text, config).await {
            Ok(resource) => {
                self.cache.put(src, &resource).await;
                self.commit(element, &resource);
                ProcessingOutcome::Rendered(resource)
            }
            Err(e) => ProcessingOutcome::Failed(FailureReason::Render(e.to_string())),
        }
    }

    /// Apply a watermarked resource to the element.
    ///
    /// The marker class goes on before the source swap, so the re-entrant
    /// `src` mutation event can never observe a watermarked source on an
    /// unmarked element.
    fn commit(&self, element: &Element, resource: &str) {
        element.add_class(WATERMARKED_CLASS);
        element.set_src(resource);
    }
}
