//! Document change observation.
//!
//! The observer consumes a document's mutation stream and feeds affected
//! images back into the processor: inserted image elements are processed
//! directly, inserted containers are walked for image descendants, and a
//! `src` change on an image triggers reprocessing (which is how lazy-loaded
//! source swaps get re-watermarked). Each image runs as its own spawned
//! task; there is no ordering guarantee between concurrently changed
//! images.
//!
//! Watching returns a [`WatchHandle`] so embedding hosts can tear the
//! observation down deterministically. Dropping the handle leaves the
//! observer running for the life of the document.

use crate::config::WatermarkConfig;
use crate::dom::{Document, Element, Mutation};
use crate::processor::ImageProcessor;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Feeds document mutations into the image processor.
#[derive(Clone)]
pub struct ChangeObserver {
    processor: Arc<ImageProcessor>,
}

impl ChangeObserver {
    pub fn new(processor: Arc<ImageProcessor>) -> Self {
        Self { processor }
    }

    /// Start watching `document` and watermarking affected images.
    pub fn watch(
        &self,
        document: &Document,
        text: impl Into<String>,
        config: WatermarkConfig,
    ) -> WatchHandle {
        self.watch_stream(document.subscribe(), text.into(), config)
    }

    /// Watch an already-subscribed mutation stream. Used by the engine so
    /// the subscription can predate the initial document pass.
    pub(crate) fn watch_stream(
        &self,
        mut receiver: broadcast::Receiver<Mutation>,
        text: String,
        config: WatermarkConfig,
    ) -> WatchHandle {
        let processor = Arc::clone(&self.processor);
        let task = tokio::spawn(async move {
            loop {
                match receiver.recv().await {
                    Ok(mutation) => dispatch(&processor, mutation, &text, &config),
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        warn!(missed, "mutation stream lagged, changes may be unprocessed");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        debug!("document dropped, observation ends");
                        break;
                    }
                }
            }
        });
        WatchHandle { task }
    }
}

fn dispatch(
    processor: &Arc<ImageProcessor>,
    mutation: Mutation,
    text: &str,
    config: &WatermarkConfig,
) {
    match mutation {
        Mutation::ChildInserted(node) => {
            let targets = if node.is_image() {
                vec![node]
            } else {
                node.images()
            };
            for image in targets {
                spawn_processing(processor, image, text, config);
            }
        }
        Mutation::AttributeChanged { element, name } => {
            if name == "src" && element.is_image() {
                spawn_processing(processor, element, text, config);
            }
        }
    }
}

/// Each image is an independent fire-and-forget task; failures are absorbed
/// by the processor and never affect other images or the observer.
fn spawn_processing(
    processor: &Arc<ImageProcessor>,
    element: Element,
    text: &str,
    config: &WatermarkConfig,
) {
    let processor = Arc::clone(processor);
    let text = text.to_string();
    let config = config.clone();
    tokio::spawn(async move {
        processor.process_image(&element, &text, &config).await;
    });
}

/// Handle to a running observation task.
#[derive(Debug)]
pub struct WatchHandle {
    task: JoinHandle<()>,
}

impl WatchHandle {
    /// Stop observing. Already-spawned per-image tasks run to completion.
    pub fn stop(&self) {
        self.task.abort();
    }

    /// Whether the observation task is still running.
    pub fn is_active(&self) -> bool {
        !self.task.is_finished()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheConfig, WatermarkCache};
    use crate::dom::IMAGE_TAG;
    use crate::glyph::Typeface;
    use crate::loader::DefaultSourceLoader;
    use crate::processor::WATERMARKED_CLASS;
    use crate::renderer::Renderer;
    use crate::resource::ResourceStore;
    use base64::engine::general_purpose::STANDARD as BASE64;
    use base64::Engine as _;
    use image::{DynamicImage, ImageOutputFormat, Rgba, RgbaImage};
    use std::io::Cursor;
    use std::time::Duration;

    fn png_data_url(width: u32, height: u32) -> String {
        let buffer = RgbaImage::from_pixel(width, height, Rgba([10, 20, 30, 255]));
        let mut bytes = Vec::new();
        DynamicImage::ImageRgba8(buffer)
            .write_to(&mut Cursor::new(&mut bytes), ImageOutputFormat::Png)
            .unwrap();
        format!("data:image/png;base64,{}", BASE64.encode(&bytes))
    }

    fn observer() -> ChangeObserver {
        let store = ResourceStore::new();
        let processor = ImageProcessor::new(
            Arc::new(DefaultSourceLoader::new(store.clone()).unwrap()),
            Renderer::new(Typeface::bitmap(), store),
            WatermarkCache::new(CacheConfig::default()),
        );
        ChangeObserver::new(Arc::new(processor))
    }

    fn test_config() -> WatermarkConfig {
        WatermarkConfig {
            ignore_min_size: 1,
            ..Default::default()
        }
    }

    async fn wait_for_marker(element: &crate::dom::Element) {
        for _ in 0..100 {
            // Check the source too: the marker goes on just before the swap
            if element.has_class(WATERMARKED_CLASS)
                && element.src().is_some_and(|src| src.starts_with("blob:"))
            {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("element was never watermarked: {element:?}");
    }

    #[tokio::test]
    async fn test_inserted_image_gets_watermarked() {
        let document = Document::new();
        let handle = observer().watch(&document, "WM", test_config());

        let img = document.create_element(IMAGE_TAG);
        img.set_src(png_data_url(40, 40));
        document.root().append_child(&img);

        wait_for_marker(&img).await;
        assert!(img.src().unwrap().starts_with("blob:"));
        handle.stop();
    }

    #[tokio::test]
    async fn test_inserted_container_is_walked_for_images() {
        let document = Document::new();
        let handle = observer().watch(&document, "WM", test_config());

        let container = document.create_element("div");
        let first = document.create_element(IMAGE_TAG);
        first.set_src(png_data_url(32, 32));
        let second = document.create_element(IMAGE_TAG);
        second.set_src(png_data_url(24, 24));
        container.append_child(&first);
        container.append_child(&second);
        document.root().append_child(&container);

        wait_for_marker(&first).await;
        wait_for_marker(&second).await;
        handle.stop();
    }

    #[tokio::test]
    async fn test_src_swap_is_rewatermarked() {
        let document = Document::new();
        let img = document.create_element(IMAGE_TAG);
        img.set_src(png_data_url(32, 32));
        document.root().append_child(&img);

        let handle = observer().watch(&document, "WM", test_config());

        // Simulate a lazy loader swapping in the real source
        img.set_src(png_data_url(48, 48));
        wait_for_marker(&img).await;
        let first_resource = img.src().unwrap();
        assert!(first_resource.starts_with("blob:"));

        // Swapping again with the marker cleared triggers a fresh render
        img.remove_class(WATERMARKED_CLASS);
        img.set_src(png_data_url(56, 56));
        for _ in 0..100 {
            let src = img.src().unwrap();
            if src != first_resource && src.starts_with("blob:") {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_ne!(img.src().unwrap(), first_resource);
        handle.stop();
    }

    #[tokio::test]
    async fn test_non_src_attribute_changes_are_ignored() {
        let document = Document::new();
        let img = document.create_element(IMAGE_TAG);
        img.set_src(png_data_url(32, 32));
        document.root().append_child(&img);

        let handle = observer().watch(&document, "WM", test_config());
        img.set_attribute("alt", "a description");
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!img.has_class(WATERMARKED_CLASS));
        handle.stop();
    }

    #[tokio::test]
    async fn test_stop_halts_observation() {
        let document = Document::new();
        let handle = observer().watch(&document, "WM", test_config());
        assert!(handle.is_active());

        handle.stop();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!handle.is_active());

        // Inserted after stop: nothing processes it
        let img = document.create_element(IMAGE_TAG);
        img.set_src(png_data_url(32, 32));
        document.root().append_child(&img);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!img.has_class(WATERMARKED_CLASS));
    }
}
