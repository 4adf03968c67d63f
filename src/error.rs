//! Watermark error types.
//!
//! Defines errors that can occur while producing a watermarked image.

use std::fmt;

/// Errors that can occur while producing a watermarked image.
#[derive(Debug)]
pub enum WatermarkError {
    /// Invalid configuration (unparseable color, unreadable font file)
    Config(String),

    /// Failed to rasterize or composite the text overlay
    Render(String),

    /// Failed to encode the composited surface
    Encode(String),
}

impl fmt::Display for WatermarkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "Watermark configuration error: {}", msg),
            Self::Render(msg) => write!(f, "Failed to render watermark: {}", msg),
            Self::Encode(msg) => write!(f, "Failed to encode watermarked image: {}", msg),
        }
    }
}

impl std::error::Error for WatermarkError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = WatermarkError::Config("bad color".to_string());
        assert_eq!(err.to_string(), "Watermark configuration error: bad color");

        let err = WatermarkError::Render("no glyphs".to_string());
        assert_eq!(err.to_string(), "Failed to render watermark: no glyphs");

        let err = WatermarkError::Encode("png writer".to_string());
        assert_eq!(
            err.to_string(),
            "Failed to encode watermarked image: png writer"
        );
    }

    #[test]
    fn test_error_debug() {
        let err = WatermarkError::Render("test".to_string());
        let debug_str = format!("{:?}", err);
        assert!(debug_str.contains("Render"));
        assert!(debug_str.contains("test"));
    }
}
