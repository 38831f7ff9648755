//! Canvas geometry and viewport limits

use serde::Deserialize;

use crate::layout::LayoutMode;

/// Canvas configuration
#[derive(Debug, Clone, PartialEq)]
pub struct CanvasConfig {
    /// Initial layout orientation
    pub layout: LayoutMode,
    /// Width of every node, in canvas units
    pub node_width: f64,
    /// Horizontal spacing between columns / siblings
    pub gap_x: f64,
    /// Vertical spacing between siblings / rows
    pub gap_y: f64,
    pub min_zoom: f64,
    pub max_zoom: f64,
    /// Scale multiplier per wheel notch or key press
    pub zoom_step: f64,
    /// Terminal colour palette: "auto", "dracula", "nord" or "gruvbox"
    pub theme: String,
}

impl Default for CanvasConfig {
    fn default() -> Self {
        Self {
            layout: LayoutMode::Horizontal,
            node_width: 400.0,
            gap_x: 120.0,
            gap_y: 80.0,
            min_zoom: 0.25,
            max_zoom: 2.0,
            zoom_step: 1.1,
            theme: "auto".to_string(),
        }
    }
}

/// Canvas settings as loaded from config file
#[derive(Debug, Deserialize, Default)]
pub struct FileCanvas {
    pub layout: Option<String>,
    pub node_width: Option<f64>,
    pub gap_x: Option<f64>,
    pub gap_y: Option<f64>,
    pub min_zoom: Option<f64>,
    pub max_zoom: Option<f64>,
    pub zoom_step: Option<f64>,
    pub theme: Option<String>,
}

impl CanvasConfig {
    /// Create from file config with defaults
    ///
    /// Non-positive geometry falls back to the default value.
    pub fn from_file(file: Option<FileCanvas>) -> Self {
        let file = file.unwrap_or_default();
        let defaults = Self::default();
        let positive = |v: Option<f64>, d: f64| v.filter(|v| *v > 0.0).unwrap_or(d);

        Self {
            layout: file
                .layout
                .map(|s| LayoutMode::from_str(&s))
                .unwrap_or(defaults.layout),
            node_width: positive(file.node_width, defaults.node_width),
            gap_x: file.gap_x.filter(|v| *v >= 0.0).unwrap_or(defaults.gap_x),
            gap_y: file.gap_y.filter(|v| *v >= 0.0).unwrap_or(defaults.gap_y),
            min_zoom: positive(file.min_zoom, defaults.min_zoom),
            max_zoom: positive(file.max_zoom, defaults.max_zoom),
            zoom_step: file
                .zoom_step
                .filter(|v| *v > 1.0)
                .unwrap_or(defaults.zoom_step),
            theme: file.theme.unwrap_or(defaults.theme),
        }
    }
}
