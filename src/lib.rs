// Sukashi document image watermarking library

pub mod cache;
pub mod coalesce;
pub mod config;
pub mod dom;
pub mod engine;
pub mod error;
pub mod glyph;
pub mod loader;
pub mod logging;
pub mod observer;
pub mod processor;
pub mod renderer;
pub mod resource;
pub mod tiler;

pub use cache::{CacheConfig, WatermarkCache};
pub use config::{WatermarkConfig, WatermarkOptions};
pub use dom::{Document, Element, Mutation, IMAGE_TAG};
pub use engine::{WatermarkEngine, WatermarkEngineBuilder};
pub use error::WatermarkError;
pub use glyph::{parse_color, Color, Typeface};
pub use loader::{DefaultSourceLoader, LoadError, SourceLoader};
pub use observer::{ChangeObserver, WatchHandle};
pub use processor::{
    FailureReason, ImageProcessor, ProcessingOutcome, SkipReason, WATERMARKED_CLASS,
};
pub use renderer::Renderer;
pub use resource::ResourceStore;
pub use tiler::{tile_positions, TilePoint};
