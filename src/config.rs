use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::audio::graph::AnalyserSettings;

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub analyser: AnalyserConfig,
    #[serde(default)]
    pub shader: ShaderConfig,
}

#[derive(Debug, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
    #[serde(default = "default_fps")]
    pub fps: u32,
    #[serde(default = "default_crf")]
    pub crf: u32,
    #[serde(default = "default_codec")]
    pub codec: String,
    #[serde(default = "default_pix_fmt")]
    pub pix_fmt: String,
}

/// Live graph analyser knobs.
#[derive(Debug, Deserialize)]
pub struct AnalyserConfig {
    #[serde(default = "default_fft_size")]
    pub fft_size: usize,
    #[serde(default = "default_smoothing")]
    pub smoothing_time_constant: f32,
    #[serde(default = "default_min_decibels")]
    pub min_decibels: f32,
    #[serde(default = "default_max_decibels")]
    pub max_decibels: f32,
}

#[derive(Debug, Default, Deserialize)]
pub struct ShaderConfig {
    /// Keyword hint for picking the fallback shader.
    #[serde(default)]
    pub description: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            width: default_width(),
            height: default_height(),
            fps: default_fps(),
            crf: default_crf(),
            codec: default_codec(),
            pix_fmt: default_pix_fmt(),
        }
    }
}

impl Default for AnalyserConfig {
    fn default() -> Self {
        Self {
            fft_size: default_fft_size(),
            smoothing_time_constant: default_smoothing(),
            min_decibels: default_min_decibels(),
            max_decibels: default_max_decibels(),
        }
    }
}

impl AnalyserConfig {
    pub fn settings(&self) -> AnalyserSettings {
        AnalyserSettings {
            fft_size: self.fft_size,
            smoothing_time_constant: self.smoothing_time_constant,
            min_decibels: self.min_decibels,
            max_decibels: self.max_decibels,
        }
    }
}

pub const DEFAULT_WIDTH: u32 = 1280;
pub const DEFAULT_HEIGHT: u32 = 720;
pub const DEFAULT_FPS: u32 = 30;
pub const DEFAULT_CRF: u32 = 21;
pub const DEFAULT_CODEC: &str = "libx264";
pub const DEFAULT_PIX_FMT: &str = "yuv420p";

fn default_width() -> u32 { DEFAULT_WIDTH }
fn default_height() -> u32 { DEFAULT_HEIGHT }
fn default_fps() -> u32 { DEFAULT_FPS }
fn default_crf() -> u32 { DEFAULT_CRF }
fn default_codec() -> String { DEFAULT_CODEC.into() }
fn default_pix_fmt() -> String { DEFAULT_PIX_FMT.into() }
fn default_fft_size() -> usize { AnalyserSettings::default().fft_size }
fn default_smoothing() -> f32 { AnalyserSettings::default().smoothing_time_constant }
fn default_min_decibels() -> f32 { AnalyserSettings::default().min_decibels }
fn default_max_decibels() -> f32 { AnalyserSettings::default().max_decibels }

/// Explicit path, else `./beatshade.toml`, else
/// `~/.config/beatshade/config.toml`, else the platform config dir.
pub fn find_config(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    let local = PathBuf::from("beatshade.toml");
    if local.exists() {
        return Some(local);
    }
    if let Some(home) = dirs::home_dir() {
        let xdg = home.join(".config").join("beatshade").join("config.toml");
        if xdg.exists() {
            return Some(xdg);
        }
    }
    if let Some(config_dir) = dirs::config_dir() {
        let platform = config_dir.join("beatshade").join("config.toml");
        if platform.exists() {
            return Some(platform);
        }
    }
    None
}

pub fn load_config(path: &Path) -> Option<Config> {
    let content = std::fs::read_to_string(path).ok()?;
    match toml::from_str(&content) {
        Ok(config) => Some(config),
        Err(err) => {
            log::warn!("Invalid config {}: {}", path.display(), err);
            None
        }
    }
}
