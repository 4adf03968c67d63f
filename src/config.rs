//! Watermark configuration.
//!
//! A [`WatermarkConfig`] is the fully resolved, immutable set of knobs the
//! pipeline runs with. Callers usually supply a [`WatermarkOptions`] (all
//! fields optional) which is merged over the engine defaults with override
//! precedence and then normalized, so a config observed by the tiler or the
//! renderer is always safe to iterate with.

use serde::{Deserialize, Serialize};

/// Largest rotation magnitude (degrees) the tiler guarantees seamless
/// coverage for. Values outside are clamped during normalization.
pub const MAX_ROTATION_DEGREES: f32 = 89.0;

/// Resolved watermark configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatermarkConfig {
    /// Font size of the overlay text, in pixels.
    #[serde(default = "default_font_size")]
    pub font_size: f32,

    /// Overlay text color as a CSS-style string. Hex (`#RGB`, `#RRGGBB`,
    /// `#RRGGBBAA`) and `rgb()`/`rgba()` forms are accepted.
    #[serde(default = "default_color")]
    pub color: String,

    /// Horizontal gap between repeated text instances, in pixels.
    #[serde(default = "default_horizontal_interval")]
    pub horizontal_interval: f32,

    /// Vertical gap between repeated text instances, in pixels.
    #[serde(default = "default_vertical_interval")]
    pub vertical_interval: f32,

    /// Rotation of the overlay pattern, in degrees. Negative values slant
    /// the text upward left to right.
    #[serde(default = "default_rotation_degrees")]
    pub rotation_degrees: f32,

    /// Elements carrying any of these class names are never watermarked.
    #[serde(default = "default_ignore_class_names")]
    pub ignore_class_names: Vec<String>,

    /// Images whose decoded width or height is below this value are left
    /// untouched. An image exactly at the threshold is processed.
    #[serde(default = "default_ignore_min_size")]
    pub ignore_min_size: u32,
}

impl Default for WatermarkConfig {
    fn default() -> Self {
        Self {
            font_size: default_font_size(),
            color: default_color(),
            horizontal_interval: default_horizontal_interval(),
            vertical_interval: default_vertical_interval(),
            rotation_degrees: default_rotation_degrees(),
            ignore_class_names: default_ignore_class_names(),
            ignore_min_size: default_ignore_min_size(),
        }
    }
}

fn default_font_size() -> f32 {
    20.0
}

fn default_color() -> String {
    "rgba(255, 255, 255, 0.2)".to_string()
}

fn default_horizontal_interval() -> f32 {
    50.0
}

fn default_vertical_interval() -> f32 {
    50.0
}

fn default_rotation_degrees() -> f32 {
    -30.0
}

fn default_ignore_class_names() -> Vec<String> {
    vec!["ignore-image-watermark".to_string()]
}

fn default_ignore_min_size() -> u32 {
    100
}

impl WatermarkConfig {
    /// Clamp fields into the ranges the tiling loops can terminate on.
    ///
    /// Negative or non-finite intervals become 0, the font size is floored
    /// at 1px and the rotation is clamped inside (-90, 90) degrees.
    pub fn normalized(mut self) -> Self {
        if !self.font_size.is_finite() || self.font_size < 1.0 {
            self.font_size = 1.0;
        }
        if !self.horizontal_interval.is_finite() || self.horizontal_interval < 0.0 {
            self.horizontal_interval = 0.0;
        }
        if !self.vertical_interval.is_finite() || self.vertical_interval < 0.0 {
            self.vertical_interval = 0.0;
        }
        if !self.rotation_degrees.is_finite() {
            self.rotation_degrees = default_rotation_degrees();
        }
        self.rotation_degrees = self
            .rotation_degrees
            .clamp(-MAX_ROTATION_DEGREES, MAX_ROTATION_DEGREES);
        self
    }
}

/// Caller overrides. Every field is optional; unset fields fall back to the
/// engine defaults during the merge.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatermarkOptions {
    pub font_size: Option<f32>,
    pub color: Option<String>,
    pub horizontal_interval: Option<f32>,
    pub vertical_interval: Option<f32>,
    pub rotation_degrees: Option<f32>,
    pub ignore_class_names: Option<Vec<String>>,
    pub ignore_min_size: Option<u32>,
}

impl WatermarkOptions {
    /// Merge these overrides over `defaults`, set fields winning, and
    /// normalize the result.
    pub fn merged_over(&self, defaults: &WatermarkConfig) -> WatermarkConfig {
        WatermarkConfig {
            font_size: self.font_size.unwrap_or(defaults.font_size),
            color: self.color.clone().unwrap_or_else(|| defaults.color.clone()),
            horizontal_interval: self
                .horizontal_interval
                .unwrap_or(defaults.horizontal_interval),
            vertical_interval: self.vertical_interval.unwrap_or(defaults.vertical_interval),
            rotation_degrees: self.rotation_degrees.unwrap_or(defaults.rotation_degrees),
            ignore_class_names: self
                .ignore_class_names
                .clone()
                .unwrap_or_else(|| defaults.ignore_class_names.clone()),
            ignore_min_size: self.ignore_min_size.unwrap_or(defaults.ignore_min_size),
        }
        .normalized()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_values() {
        let config = WatermarkConfig::default();
        assert_eq!(config.font_size, 20.0);
        assert_eq!(config.color, "rgba(255, 255, 255, 0.2)");
        assert_eq!(config.horizontal_interval, 50.0);
        assert_eq!(config.vertical_interval, 50.0);
        assert_eq!(config.rotation_degrees, -30.0);
        assert_eq!(
            config.ignore_class_names,
            vec!["ignore-image-watermark".to_string()]
        );
        assert_eq!(config.ignore_min_size, 100);
    }

    #[test]
    fn test_merge_override_precedence() {
        let defaults = WatermarkConfig::default();
        let options = WatermarkOptions {
            font_size: Some(32.0),
            rotation_degrees: Some(45.0),
            ..Default::default()
        };

        let merged = options.merged_over(&defaults);
        assert_eq!(merged.font_size, 32.0);
        assert_eq!(merged.rotation_degrees, 45.0);
        // Unset fields keep the defaults
        assert_eq!(merged.color, defaults.color);
        assert_eq!(merged.ignore_min_size, defaults.ignore_min_size);
    }

    #[test]
    fn test_empty_options_reproduce_defaults() {
        let defaults = WatermarkConfig::default();
        let merged = WatermarkOptions::default().merged_over(&defaults);
        assert_eq!(merged, defaults.clone().normalized());
    }

    #[test]
    fn test_normalize_clamps_intervals() {
        let config = WatermarkConfig {
            horizontal_interval: -10.0,
            vertical_interval: f32::NAN,
            ..Default::default()
        }
        .normalized();
        assert_eq!(config.horizontal_interval, 0.0);
        assert_eq!(config.vertical_interval, 0.0);
    }

    #[test]
    fn test_normalize_clamps_rotation() {
        let config = WatermarkConfig {
            rotation_degrees: -135.0,
            ..Default::default()
        }
        .normalized();
        assert_eq!(config.rotation_degrees, -MAX_ROTATION_DEGREES);

        let config = WatermarkConfig {
            rotation_degrees: 90.0,
            ..Default::default()
        }
        .normalized();
        assert_eq!(config.rotation_degrees, MAX_ROTATION_DEGREES);
    }

    #[test]
    fn test_normalize_floors_font_size() {
        let config = WatermarkConfig {
            font_size: 0.0,
            ..Default::default()
        }
        .normalized();
        assert_eq!(config.font_size, 1.0);
    }

    #[test]
    fn test_options_parse_from_partial_yaml() {
        let options: WatermarkOptions =
            serde_yaml::from_str("font_size: 24\ncolor: \"#FF0000\"\n").unwrap();
        assert_eq!(options.font_size, Some(24.0));
        assert_eq!(options.color.as_deref(), Some("#FF0000"));
        assert!(options.rotation_degrees.is_none());
    }

    #[test]
    fn test_config_parse_from_partial_json_fills_defaults() {
        let config: WatermarkConfig = serde_json::from_str(r#"{"font_size": 12.5}"#).unwrap();
        assert_eq!(config.font_size, 12.5);
        assert_eq!(config.vertical_interval, 50.0);
        assert_eq!(config.ignore_min_size, 100);
    }
}
