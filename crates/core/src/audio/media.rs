use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc, Mutex, MutexGuard, PoisonError,
};

use serde::{Deserialize, Serialize};

use crate::{audio::MediaElementId, PlayerError, Result};

/// A playable media element owned by the host.
pub trait MediaElement: Send + Sync {
    fn id(&self) -> MediaElementId;
    fn is_playing(&self) -> bool;
    /// Current source URL, if one has been assigned.
    fn source(&self) -> Option<String>;
    fn set_source(&self, url: &str);
    fn play(&self) -> Result<()>;
    fn pause(&self);
    fn set_volume(&self, volume: f32);
}

/// Creates hidden helper elements, e.g. the muted analysis-only player used
/// for streams that cannot be tapped directly.
pub trait MediaFactory: Send {
    fn create_hidden_element(&self) -> Result<Arc<dyn MediaElement>>;
}

/// Track metadata supplied by the playlist layer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TrackDescriptor {
    pub id: String,
    pub title: String,
    #[serde(alias = "uploader")]
    pub artist: String,
    pub thumbnail: Option<String>,
    pub duration: f64,
    pub platform: String,
    pub is_special_stream: bool,
    /// The primary element cannot be analysed directly; a muted secondary
    /// element playing `analysis_url` feeds the analyser instead.
    pub requires_analysis_source: bool,
    pub analysis_url: Option<String>,
}

impl TrackDescriptor {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Default)]
struct SimulatedState {
    source: Option<String>,
    playing: bool,
    volume: f32,
}

/// In-memory media element. Clones share state, so a host can keep one copy
/// and hand another to the engine.
#[derive(Debug, Clone)]
pub struct SimulatedMedia {
    id: MediaElementId,
    state: Arc<Mutex<SimulatedState>>,
}

impl SimulatedMedia {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: MediaElementId::new(id),
            state: Arc::new(Mutex::new(SimulatedState {
                volume: 1.0,
                ..Default::default()
            })),
        }
    }

    pub fn volume(&self) -> f32 {
        self.lock().volume
    }

    fn lock(&self) -> MutexGuard<'_, SimulatedState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl MediaElement for SimulatedMedia {
    fn id(&self) -> MediaElementId {
        self.id.clone()
    }

    fn is_playing(&self) -> bool {
        self.lock().playing
    }

    fn source(&self) -> Option<String> {
        self.lock().source.clone()
    }

    fn set_source(&self, url: &str) {
        let mut state = self.lock();
        state.source = Some(url.to_string());
        state.playing = false;
    }

    fn play(&self) -> Result<()> {
        let mut state = self.lock();
        if state.source.is_none() {
            return Err(PlayerError::msg(format!("media element `{}` has no source", self.id)));
        }
        state.playing = true;
        Ok(())
    }

    fn pause(&self) {
        self.lock().playing = false;
    }

    fn set_volume(&self, volume: f32) {
        self.lock().volume = volume.clamp(0.0, 1.0);
    }
}

/// Hands out [`SimulatedMedia`] elements with unique ids and remembers them
/// so tests can inspect what the engine created.
#[derive(Debug, Clone, Default)]
pub struct SimulatedMediaFactory {
    next: Arc<AtomicU64>,
    created: Arc<Mutex<Vec<SimulatedMedia>>>,
}

impl SimulatedMediaFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn created(&self) -> Vec<SimulatedMedia> {
        self.created
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl MediaFactory for SimulatedMediaFactory {
    fn create_hidden_element(&self) -> Result<Arc<dyn MediaElement>> {
        let index = self.next.fetch_add(1, Ordering::Relaxed);
        let element = SimulatedMedia::new(format!("hidden-analysis-{index}"));
        self.created
            .lock()
            .map_err(|_| PlayerError::msg("media factory has been poisoned"))?
            .push(element.clone());
        Ok(Arc::new(element))
    }
}
