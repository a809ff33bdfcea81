//! Core library for the music player's audio path.
//!
//! One process-wide [`AudioGraphManager`] owns the signal path
//! `source → equalizer filters → analyser → output`. The
//! [`EqualizerController`] drives the filter gains, and any number of
//! [`VisualizationEngine`]s sample the analyser once per frame to draw one of
//! four procedural scenes. Platform services (audio backend, media elements,
//! drawing surface, frame scheduler, settings storage) sit behind traits with
//! in-process implementations, so the whole pipeline also runs headless.

pub mod analysis;
pub mod audio;
pub mod config;
pub mod equalizer;
pub mod error;
pub mod graph;
pub mod render;
pub mod scene;
pub mod storage;
pub mod theme;
pub mod timeline;
pub mod visualizer;

pub use analysis::AnalyserCore;
pub use audio::{
    AnalyserSpec, AudioBackend, ContextInfo, ContextState, MediaElement, MediaElementId,
    MediaFactory, NodeId, SimulatedMedia, SimulatedMediaFactory, SoftwareBackend, TrackDescriptor,
};
pub use config::{AppConfig, AudioConfig, EqualizerConfig, VisualizerConfig};
pub use equalizer::{EqualizerChange, EqualizerController, EqualizerState, BAND_FREQUENCIES};
pub use error::{PlayerError, Result};
pub use graph::{AudioGraphHandle, AudioGraphManager};
pub use render::{DrawCommand, RecordingSurface, Surface, SurfaceSize};
pub use scene::{Activity, VisualizationState, VisualizerMode};
pub use storage::{JsonFileStore, MemoryStore, SettingsStore};
pub use theme::{resolve_palette, Color, Palette, ThemeVariables};
pub use timeline::{FrameHandle, FrameScheduler, ManualScheduler};
pub use visualizer::{FrameOutcome, FrameStats, VisualizationEngine};
