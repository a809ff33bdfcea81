use std::{fs, path::Path};

use serde::{Deserialize, Serialize};

use crate::{audio::AnalyserSpec, scene::VisualizerMode, theme::ThemeVariables, Result};

/// Top-level configuration structure for the application.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub audio: AudioConfig,
    pub equalizer: EqualizerConfig,
    pub visualizer: VisualizerConfig,
    pub theme: ThemeVariables,
}

impl AppConfig {
    /// Reads a JSON config file. Missing sections keep their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }
}

/// Configuration specific to the audio subsystem.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub sample_rate: u32,
    pub fft_size: usize,
    pub smoothing: f32,
    pub min_decibels: f32,
    pub max_decibels: f32,
}

impl Default for AudioConfig {
    fn default() -> Self {
        let analyser = AnalyserSpec::default();
        Self {
            sample_rate: 48_000,
            fft_size: analyser.fft_size,
            smoothing: analyser.smoothing,
            min_decibels: analyser.min_decibels,
            max_decibels: analyser.max_decibels,
        }
    }
}

impl AudioConfig {
    pub fn analyser_spec(&self) -> AnalyserSpec {
        AnalyserSpec {
            fft_size: self.fft_size,
            smoothing: self.smoothing,
            min_decibels: self.min_decibels,
            max_decibels: self.max_decibels,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EqualizerConfig {
    /// JSON file the equalizer state is persisted to.
    pub settings_path: String,
}

impl Default for EqualizerConfig {
    fn default() -> Self {
        Self {
            settings_path: "equalizer.json".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VisualizerConfig {
    pub mode: VisualizerMode,
    pub width: f32,
    pub height: f32,
    pub device_pixel_ratio: f32,
    pub seed: Option<u64>,
}

impl Default for VisualizerConfig {
    fn default() -> Self {
        Self {
            mode: VisualizerMode::Bars,
            width: 800.0,
            height: 200.0,
            device_pixel_ratio: 1.0,
            seed: None,
        }
    }
}
