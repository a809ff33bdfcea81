//! Platform seam for the audio graph.
//!
//! [`AudioBackend`] mirrors the small slice of a Web-Audio style API the
//! player needs: one processing context, media-element sources, biquad
//! filters, an analyser and the output destination. [`SoftwareBackend`] is an
//! in-process implementation used headless and under test.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::Result;

pub mod media;
pub mod param;
pub mod software;

pub use media::{MediaElement, MediaFactory, SimulatedMedia, SimulatedMediaFactory, TrackDescriptor};
pub use param::AudioParam;
pub use software::SoftwareBackend;

/// Opaque handle to a node owned by an [`AudioBackend`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub u32);

/// Identity of a playable media element supplied by the host.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MediaElementId(String);

impl MediaElementId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MediaElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MediaElementId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Lifecycle of the processing context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContextState {
    Suspended,
    Running,
    Closed,
}

/// Snapshot of the processing context handed back to callers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ContextInfo {
    pub sample_rate: f32,
    pub state: ContextState,
    pub current_time: f64,
}

/// Response shape of a single equalizer filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilterKind {
    LowShelf,
    Peaking,
    HighShelf,
}

/// Construction parameters for a biquad filter node.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FilterSpec {
    pub kind: FilterKind,
    pub frequency: f32,
    pub q: f32,
    pub gain_db: f32,
}

/// Construction parameters for the analysis node.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AnalyserSpec {
    pub fft_size: usize,
    pub smoothing: f32,
    pub min_decibels: f32,
    pub max_decibels: f32,
}

impl AnalyserSpec {
    pub fn frequency_bin_count(&self) -> usize {
        self.fft_size / 2
    }
}

impl Default for AnalyserSpec {
    fn default() -> Self {
        Self {
            fft_size: 2048,
            smoothing: 0.8,
            min_decibels: -100.0,
            max_decibels: -30.0,
        }
    }
}

/// Web-Audio style node graph provided by the host platform.
///
/// A backend owns at most one live processing context. Node handles become
/// invalid when the context is closed. Media-element bindings are tracked for
/// the lifetime of the backend: binding the same element twice fails with
/// [`PlayerError::StructuralConflict`](crate::PlayerError::StructuralConflict)
/// even across contexts, as browsers do.
pub trait AudioBackend: Send {
    /// Creates the processing context. Fails with
    /// [`PlayerError::UnsupportedPlatform`](crate::PlayerError::UnsupportedPlatform)
    /// when the platform has no audio API.
    fn create_context(&mut self) -> Result<()>;
    fn has_context(&self) -> bool;
    fn context_state(&self) -> ContextState;
    fn resume(&mut self) -> Result<()>;
    fn close(&mut self) -> Result<()>;
    fn current_time(&self) -> f64;
    fn sample_rate(&self) -> f32;
    /// The speaker output of the live context.
    fn destination(&self) -> Result<NodeId>;

    fn create_analyser(&mut self, spec: AnalyserSpec) -> Result<NodeId>;
    fn create_media_source(&mut self, element: &MediaElementId) -> Result<NodeId>;
    fn create_filter(&mut self, spec: FilterSpec) -> Result<NodeId>;
    /// Frees a node. Its connections are dropped first.
    fn release(&mut self, node: NodeId) -> Result<()>;

    fn connect(&mut self, from: NodeId, to: NodeId) -> Result<()>;
    /// Feeds `from` into `analyser` as a recording-only input: the analyser
    /// sees the signal but does not forward it downstream.
    fn connect_analysis_input(&mut self, from: NodeId, analyser: NodeId) -> Result<()>;
    /// Removes every outgoing connection of `node`, analysis inputs included.
    fn disconnect(&mut self, node: NodeId) -> Result<()>;
    fn outputs(&self, node: NodeId) -> Vec<NodeId>;

    fn cancel_scheduled_gain(&mut self, filter: NodeId, at: f64) -> Result<()>;
    /// Approaches `target` exponentially from `at` with the given time
    /// constant in seconds.
    fn set_gain_target(&mut self, filter: NodeId, target: f32, at: f64, time_constant: f64)
        -> Result<()>;

    fn frequency_bin_count(&self, analyser: NodeId) -> Result<usize>;
    fn byte_frequency_data(&mut self, analyser: NodeId, out: &mut [u8]) -> Result<()>;
    fn byte_time_domain_data(&mut self, analyser: NodeId, out: &mut [u8]) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_analyser_matches_player_tap() {
        let spec = AnalyserSpec::default();
        assert_eq!(spec.fft_size, 2048);
        assert_eq!(spec.frequency_bin_count(), 1024);
        assert!((spec.smoothing - 0.8).abs() < f32::EPSILON);
    }

    #[test]
    fn element_ids_display_their_name() {
        let id = MediaElementId::from("main-player");
        assert_eq!(id.to_string(), "main-player");
        assert_eq!(id.as_str(), "main-player");
    }
}
