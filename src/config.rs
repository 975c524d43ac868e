use directories::ProjectDirs;
use iced::Color;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::camera::CameraState;
use crate::error::ConfigError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GridKind {
    #[default]
    Lines,
    Dots,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridConfig {
    pub size: f32,
    pub kind: GridKind,
    pub color: String,
    pub opacity: f32,
    pub sub_grid: bool,
    pub sub_divisions: u32,
    pub sub_color: String,
    pub sub_opacity: f32,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            size: 50.0,
            kind: GridKind::Lines,
            color: "#e5e7eb".to_string(),
            opacity: 0.3,
            sub_grid: true,
            sub_divisions: 5,
            sub_color: "#f3f4f6".to_string(),
            sub_opacity: 0.15,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkStyle {
    pub width: f32,
    pub selected_width: f32,
    pub arrows: bool,
    pub pulses: bool,
    /// World units per second.
    pub pulse_speed: f32,
    pub pulse_count: u32,
    pub idle_color: String,
    pub active_color: String,
    pub error_color: String,
    pub hover_color: String,
}

impl Default for LinkStyle {
    fn default() -> Self {
        Self {
            width: 2.0,
            selected_width: 3.0,
            arrows: true,
            pulses: true,
            pulse_speed: 200.0,
            pulse_count: 3,
            idle_color: "#94a3b8".to_string(),
            active_color: "#3b82f6".to_string(),
            error_color: "#ef4444".to_string(),
            hover_color: "#60a5fa".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InteractionConfig {
    pub snap_to_grid: bool,
    pub snap_size: f32,
    /// Distance within which a dragged connection snaps to a compatible port.
    pub snap_threshold: f32,
    pub link_hit_threshold: f32,
    pub wheel_sensitivity: f32,
    /// Two presses on one node within this many milliseconds are a double-click.
    pub double_click_ms: u64,
}

impl Default for InteractionConfig {
    fn default() -> Self {
        Self {
            snap_to_grid: false,
            snap_size: 50.0,
            snap_threshold: 30.0,
            link_hit_threshold: 8.0,
            wheel_sensitivity: 1.0,
            double_click_ms: 300,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub camera: CameraState,
    pub grid: GridConfig,
    pub links: LinkStyle,
    pub interaction: InteractionConfig,
    /// World-space margin added around the viewport before culling nodes.
    pub cull_padding: f32,
    pub drift_check_ms: u64,
    pub text_cache_capacity: usize,
    /// Start with the statistics overlay shown.
    pub debug: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            camera: CameraState::default(),
            grid: GridConfig::default(),
            links: LinkStyle::default(),
            interaction: InteractionConfig::default(),
            cull_padding: 100.0,
            drift_check_ms: 2000,
            text_cache_capacity: 100,
            debug: false,
        }
    }
}

impl EngineConfig {
    /// Reads the user config, falling back to defaults when the file is
    /// missing or unreadable.
    pub fn load() -> Self {
        match Self::config_path().and_then(|path| Self::load_from(&path)) {
            Ok(config) => config,
            Err(ConfigError::Io(err)) if err.kind() == std::io::ErrorKind::NotFound => {
                Self::default()
            }
            Err(err) => {
                warn!(%err, "using default configuration");
                Self::default()
            }
        }
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        fs::write(path, contents)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let cam = &self.camera;
        if !(cam.min_zoom.is_finite() && cam.max_zoom.is_finite())
            || cam.min_zoom <= 0.0
            || cam.min_zoom >= cam.max_zoom
        {
            return Err(ConfigError::InvalidZoomBounds {
                min: cam.min_zoom,
                max: cam.max_zoom,
            });
        }
        if !cam.zoom.is_finite() || cam.zoom <= 0.0 {
            return Err(ConfigError::InvalidZoom(cam.zoom));
        }
        if !self.grid.size.is_finite() || self.grid.size <= 0.0 {
            return Err(ConfigError::InvalidGridSize(self.grid.size));
        }

        for (field, value) in [
            ("links.width", self.links.width),
            ("links.selected_width", self.links.selected_width),
            ("interaction.snap_size", self.interaction.snap_size),
            ("interaction.snap_threshold", self.interaction.snap_threshold),
            ("interaction.link_hit_threshold", self.interaction.link_hit_threshold),
            ("interaction.wheel_sensitivity", self.interaction.wheel_sensitivity),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(ConfigError::NotPositive { field, value });
            }
        }

        for color in [
            &self.grid.color,
            &self.grid.sub_color,
            &self.links.idle_color,
            &self.links.active_color,
            &self.links.error_color,
            &self.links.hover_color,
        ] {
            parse_color(color)?;
        }
        Ok(())
    }

    fn config_path() -> Result<PathBuf, ConfigError> {
        let dirs = ProjectDirs::from("", "", "nodeflow").ok_or(ConfigError::NoConfigDir)?;
        Ok(dirs.config_dir().join("config.json"))
    }
}

/// Parses `#rgb`, `#rrggbb` or `#rrggbbaa`.
pub fn parse_color(hex: &str) -> Result<Color, ConfigError> {
    let invalid = || ConfigError::InvalidColor(hex.to_string());
    let digits = hex.strip_prefix('#').ok_or_else(invalid)?;
    if !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(invalid());
    }
    let channel = |s: &str| u8::from_str_radix(s, 16).map_err(|_| invalid());

    let (r, g, b, a) = match digits.len() {
        3 => {
            let expand = |i: usize| channel(&digits[i..i + 1].repeat(2));
            (expand(0)?, expand(1)?, expand(2)?, 255)
        }
        6 => (
            channel(&digits[0..2])?,
            channel(&digits[2..4])?,
            channel(&digits[4..6])?,
            255,
        ),
        8 => (
            channel(&digits[0..2])?,
            channel(&digits[2..4])?,
            channel(&digits[4..6])?,
            channel(&digits[6..8])?,
        ),
        _ => return Err(invalid()),
    };
    Ok(Color::from_rgba8(r, g, b, a as f32 / 255.0))
}

/// Like [`parse_color`] but falls back to `fallback` for bad input.
pub fn color_or(hex: &str, fallback: Color) -> Color {
    parse_color(hex).unwrap_or(fallback)
}
