// Strong typing over strings. Percent coordinates, client pixels, and the enums shared with JS.
// Percentages are resolution-independent; client pixels only live inside the surface.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// Position as a percentage (0.0 to 100.0) of the image's rendered bounding box.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct PercentCoord {
    pub x: f32,
    pub y: f32,
}

impl PercentCoord {
    pub fn new(x: f32, y: f32) -> Self {
        PercentCoord {
            x: x.clamp(0.0, 100.0),
            y: y.clamp(0.0, 100.0),
        }
    }

    /// Pixel position inside a raster of the given size.
    pub fn to_pixels(&self, width: u32, height: u32) -> (f32, f32) {
        (
            self.x / 100.0 * width as f32,
            self.y / 100.0 * height as f32,
        )
    }
}

/// Pointer position in client (viewport) pixels, as reported by DOM events.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct ClientPoint {
    pub x: f64,
    pub y: f64,
}

impl ClientPoint {
    pub fn new(x: f64, y: f64) -> Self {
        ClientPoint { x, y }
    }
}

/// Bounding rect of the displayed image in client pixels (`getBoundingClientRect`).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct SurfaceRect {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

impl SurfaceRect {
    pub fn new(left: f64, top: f64, width: f64, height: f64) -> Self {
        SurfaceRect {
            left,
            top,
            width,
            height,
        }
    }

    pub fn has_area(&self) -> bool {
        self.width > 0.0 && self.height > 0.0
    }

    /// Map a client point to percentages. Not clamped: a pointer outside the
    /// rect yields values outside [0, 100].
    pub fn to_percent(&self, point: ClientPoint) -> Option<(f64, f64)> {
        if !self.has_area() {
            return None;
        }
        Some((
            (point.x - self.left) / self.width * 100.0,
            (point.y - self.top) / self.height * 100.0,
        ))
    }

    /// Client-pixel position of a percent coordinate inside this rect.
    pub fn to_client(&self, x: f32, y: f32) -> ClientPoint {
        ClientPoint {
            x: self.left + x as f64 / 100.0 * self.width,
            y: self.top + y as f64 / 100.0 * self.height,
        }
    }
}

/// User-placed numbered pin. Ids are dense `1..N` in list order.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Marker {
    pub id: u32,
    pub x: f32,
    pub y: f32,
}

impl Marker {
    pub fn new(id: u32, position: PercentCoord) -> Self {
        Marker {
            id,
            x: position.x,
            y: position.y,
        }
    }

    pub fn position(&self) -> PercentCoord {
        PercentCoord::new(self.x, self.y)
    }
}

/// Start/finish line arrow: anchor position plus facing angle in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StartConfig {
    pub x: f32,
    pub y: f32,
    pub angle: f32,
}

impl StartConfig {
    pub fn at(position: PercentCoord) -> Self {
        StartConfig {
            x: position.x,
            y: position.y,
            angle: 0.0,
        }
    }
}

/// Active annotation tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ToolMode {
    #[default]
    Marker,
    Start,
}

impl FromStr for ToolMode {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "marker" => Ok(ToolMode::Marker),
            "start" => Ok(ToolMode::Start),
            other => Err(EngineError::InvalidInput(format!("unknown tool mode: {}", other))),
        }
    }
}

/// Kind of uploaded media.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
}

/// Track surface condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Weather {
    #[default]
    Dry,
    Wet,
}

/// Vehicle class the advice is tailored to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Vehicle {
    #[default]
    F1,
    FormulaE,
    GT3,
    Karting,
    RoadCar,
}

/// Which part of a video the model should focus on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum VideoScope {
    #[default]
    FullLap,
    KeyCorners,
    SpecificSection,
}

/// Analysis lifecycle. Only one analysis may be in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum AnalysisStatus {
    #[default]
    Idle,
    Running,
    Succeeded,
    Failed,
}

/// User-selected parameters sent alongside the media.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct AnalysisContext {
    #[serde(default)]
    pub weather: Weather,
    #[serde(default)]
    pub vehicle: Vehicle,
    /// Optional circuit name typed by the user.
    #[serde(default)]
    pub track_name: String,
    /// Optional track length in metres, kept as typed.
    #[serde(default)]
    pub track_length: String,
    #[serde(default)]
    pub video_scope: VideoScope,
}

/// Engine configuration passed from JS. Every field has a default, so `{}` is valid.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct EngineConfig {
    #[serde(default)]
    pub compositor: CompositorSettings,
    #[serde(default)]
    pub upload: UploadLimits,
    #[serde(default)]
    pub analysis: AnalysisSettings,
}

/// Colors and proportions for burned-in annotations.
/// Ratios are relative to `max(width, height)` of the source raster.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompositorSettings {
    #[serde(default = "default_marker_fill")]
    pub marker_fill: [u8; 3],
    #[serde(default = "default_white")]
    pub marker_outline: [u8; 3],
    #[serde(default = "default_white")]
    pub number_color: [u8; 3],
    #[serde(default = "default_arrow_fill")]
    pub arrow_fill: [u8; 3],
    #[serde(default = "default_white")]
    pub arrow_outline: [u8; 3],
    #[serde(default = "default_marker_radius_ratio")]
    pub marker_radius_ratio: f32,
    /// Outline width as a fraction of the marker radius.
    #[serde(default = "default_marker_outline_ratio")]
    pub marker_outline_ratio: f32,
    #[serde(default = "default_number_height_ratio")]
    pub number_height_ratio: f32,
    #[serde(default = "default_arrow_size_ratio")]
    pub arrow_size_ratio: f32,
    /// Outline width as a fraction of the arrow size.
    #[serde(default = "default_arrow_outline_ratio")]
    pub arrow_outline_ratio: f32,
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,
}

impl Default for CompositorSettings {
    fn default() -> Self {
        CompositorSettings {
            marker_fill: default_marker_fill(),
            marker_outline: default_white(),
            number_color: default_white(),
            arrow_fill: default_arrow_fill(),
            arrow_outline: default_white(),
            marker_radius_ratio: default_marker_radius_ratio(),
            marker_outline_ratio: default_marker_outline_ratio(),
            number_height_ratio: default_number_height_ratio(),
            arrow_size_ratio: default_arrow_size_ratio(),
            arrow_outline_ratio: default_arrow_outline_ratio(),
            jpeg_quality: default_jpeg_quality(),
        }
    }
}

fn default_marker_fill() -> [u8; 3] {
    [0xFF, 0x18, 0x01]
}

fn default_arrow_fill() -> [u8; 3] {
    [0x00, 0xD2, 0xBE]
}

fn default_white() -> [u8; 3] {
    [0xFF, 0xFF, 0xFF]
}

fn default_marker_radius_ratio() -> f32 {
    0.025
}

fn default_marker_outline_ratio() -> f32 {
    0.15
}

fn default_number_height_ratio() -> f32 {
    0.02
}

fn default_arrow_size_ratio() -> f32 {
    0.04
}

fn default_arrow_outline_ratio() -> f32 {
    0.1
}

fn default_jpeg_quality() -> u8 {
    95
}

/// Local upload limits checked before any network call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadLimits {
    #[serde(default = "default_max_video_bytes")]
    pub max_video_bytes: u64,
}

impl Default for UploadLimits {
    fn default() -> Self {
        UploadLimits {
            max_video_bytes: default_max_video_bytes(),
        }
    }
}

fn default_max_video_bytes() -> u64 {
    60 * 1024 * 1024 // 60 MiB
}

/// Remote model settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisSettings {
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        AnalysisSettings {
            endpoint: default_endpoint(),
            model: default_model(),
            temperature: default_temperature(),
        }
    }
}

fn default_endpoint() -> String {
    "https://generativelanguage.googleapis.com/v1beta".to_string()
}

fn default_model() -> String {
    "gemini-2.5-flash".to_string()
}

fn default_temperature() -> f32 {
    0.2
}
