//! Owner of the process-wide audio graph.
//!
//! A host constructs exactly one [`AudioGraphManager`] per process, wraps it
//! in an [`AudioGraphHandle`] and injects clones of that handle into the
//! equalizer and every visualization engine. The graph outlives all of them.

use std::{
    f32::consts::FRAC_1_SQRT_2,
    sync::{Arc, Mutex, MutexGuard},
};

use tracing::{debug, error, info, warn};

use crate::{
    audio::{
        AnalyserSpec, AudioBackend, ContextInfo, ContextState, FilterKind, FilterSpec,
        MediaElementId, NodeId,
    },
    PlayerError, Result,
};

/// Q of the peaking filters between the two shelves.
pub const PEAKING_Q: f32 = 1.414;
/// Time constant (seconds) of the exponential gain approach.
pub const GAIN_TIME_CONSTANT: f64 = 0.01;

#[derive(Debug, Clone)]
struct AuxiliarySource {
    element: MediaElementId,
    node: NodeId,
}

/// Builds and rewires the signal path
/// `source → filter[0] → … → filter[n-1] → analyser → destination`.
pub struct AudioGraphManager {
    backend: Box<dyn AudioBackend>,
    analyser_spec: AnalyserSpec,
    element: Option<MediaElementId>,
    source: Option<NodeId>,
    analyser: Option<NodeId>,
    filters: Vec<NodeId>,
    /// The chain as it is currently wired, destination included.
    wired: Vec<NodeId>,
    auxiliary: Vec<AuxiliarySource>,
    initialized: bool,
}

impl AudioGraphManager {
    pub fn new(backend: Box<dyn AudioBackend>, analyser_spec: AnalyserSpec) -> Self {
        Self {
            backend,
            analyser_spec,
            element: None,
            source: None,
            analyser: None,
            filters: Vec::new(),
            wired: Vec::new(),
            auxiliary: Vec::new(),
            initialized: false,
        }
    }

    /// Binds `element` to the graph. Calling it again for the same element
    /// returns immediately.
    ///
    /// A [`PlayerError::StructuralConflict`] from the backend means the
    /// element is already bound elsewhere; it is swallowed and the manager
    /// still reports success.
    pub fn initialize(&mut self, element: &MediaElementId) -> Result<ContextInfo> {
        if self.initialized && self.element.as_ref() == Some(element) && self.source.is_some() {
            debug!(%element, "audio graph already initialised for element");
            return self.context_info();
        }

        match self.try_initialize(element) {
            Ok(info) => Ok(info),
            Err(err) => {
                error!(%element, %err, "failed to initialise audio graph");
                self.initialized = false;
                Err(err)
            }
        }
    }

    fn try_initialize(&mut self, element: &MediaElementId) -> Result<ContextInfo> {
        if !self.backend.has_context() {
            self.backend.create_context().map_err(into_graph_init)?;
            info!("created audio processing context");
        }

        if self.backend.context_state() == ContextState::Suspended {
            self.backend.resume().map_err(into_graph_init)?;
            debug!("resumed suspended audio context");
        }

        if self.analyser.is_none() {
            let analyser = self
                .backend
                .create_analyser(self.analyser_spec)
                .map_err(into_graph_init)?;
            self.analyser = Some(analyser);
            debug!(?analyser, fft_size = self.analyser_spec.fft_size, "created analyser");
        }

        if self.source.is_none() || self.element.as_ref() != Some(element) {
            if let Some(previous) = self.source.take() {
                if let Err(err) = self.backend.disconnect(previous) {
                    warn!(%err, "failed to disconnect previous source");
                }
                debug!("disconnected previous source");
            }

            self.element = Some(element.clone());
            match self.backend.create_media_source(element) {
                Ok(source) => {
                    self.source = Some(source);
                    debug!(%element, ?source, "created media element source");
                }
                Err(PlayerError::StructuralConflict(_)) => {
                    warn!(%element, "media element already has a source node, treating as connected");
                    self.initialized = true;
                    return self.context_info();
                }
                Err(err) => return Err(into_graph_init(err)),
            }
        }

        if let Err(err) = self.reconnect_audio_chain() {
            warn!(%err, "audio chain left in its previous state");
        }

        self.initialized = true;
        info!(%element, "audio graph initialised");
        self.context_info()
    }

    /// Replaces the filter chain with one filter per frequency: a low shelf
    /// first, a high shelf last and peaking filters in between.
    ///
    /// The new chain is wired before the old filters are released. If wiring
    /// fails the old chain stays in place and [`PlayerError::Reconnect`] is
    /// returned.
    pub fn create_equalizer(&mut self, frequencies: &[f32], gains: &[f32]) -> Result<&[NodeId]> {
        if !self.backend.has_context() || self.source.is_none() {
            return Err(PlayerError::NotInitialised);
        }
        if frequencies.is_empty() {
            return Err(PlayerError::invalid("equalizer needs at least one band"));
        }

        let last = frequencies.len() - 1;
        let mut created = Vec::with_capacity(frequencies.len());
        for (index, &frequency) in frequencies.iter().enumerate() {
            let kind = if index == 0 {
                FilterKind::LowShelf
            } else if index == last {
                FilterKind::HighShelf
            } else {
                FilterKind::Peaking
            };
            let spec = FilterSpec {
                kind,
                frequency,
                q: if kind == FilterKind::Peaking { PEAKING_Q } else { FRAC_1_SQRT_2 },
                gain_db: gains.get(index).copied().unwrap_or(0.0),
            };

            match self.backend.create_filter(spec) {
                Ok(node) => created.push(node),
                Err(err) => {
                    self.release_nodes(&created);
                    return Err(into_graph_init(err));
                }
            }
        }

        let previous = std::mem::replace(&mut self.filters, created);
        if let Err(err) = self.reconnect_audio_chain() {
            let rejected = std::mem::replace(&mut self.filters, previous);
            self.release_nodes(&rejected);
            warn!(%err, "kept previous equalizer chain");
            return Err(err);
        }

        self.release_nodes(&previous);
        info!(bands = self.filters.len(), "created equalizer");
        Ok(&self.filters)
    }

    /// Smoothly moves every filter towards its effective gain: `gains[i]`
    /// when enabled, 0 dB otherwise. Returns the requested targets.
    pub fn update_equalizer(&mut self, gains: &[f32], enabled: bool) -> Vec<f32> {
        if self.filters.is_empty() || !self.backend.has_context() {
            warn!("no equalizer to update");
            return Vec::new();
        }

        let now = self.backend.current_time();
        let mut targets = Vec::with_capacity(self.filters.len());
        for (index, &filter) in self.filters.iter().enumerate() {
            let target = if enabled {
                gains.get(index).copied().unwrap_or(0.0)
            } else {
                0.0
            };
            targets.push(target);

            let scheduled = self
                .backend
                .cancel_scheduled_gain(filter, now)
                .and_then(|_| {
                    self.backend
                        .set_gain_target(filter, target, now, GAIN_TIME_CONSTANT)
                });
            if let Err(err) = scheduled {
                error!(band = index, %err, "failed to update equalizer band");
            }
        }

        debug!(?targets, enabled, "updated equalizer gains");
        targets
    }

    /// Relinks `source → filters → analyser → destination`.
    ///
    /// Every node of the old and the new chain is disconnected first, so no
    /// parallel path survives. If a link fails the previous chain is wired
    /// back and [`PlayerError::Reconnect`] is returned.
    pub fn reconnect_audio_chain(&mut self) -> Result<()> {
        let Some(source) = self.source else {
            warn!("cannot reconnect without a source");
            return Ok(());
        };
        if !self.backend.has_context() {
            warn!("cannot reconnect without a context");
            return Ok(());
        }

        let destination = self
            .backend
            .destination()
            .map_err(|err| PlayerError::Reconnect(err.to_string()))?;
        let mut chain = Vec::with_capacity(self.filters.len() + 3);
        chain.push(source);
        chain.extend(self.filters.iter().copied());
        chain.extend(self.analyser);
        chain.push(destination);

        let previous = std::mem::take(&mut self.wired);
        self.unlink(&previous);
        self.unlink(&chain);

        match self.link(&chain) {
            Ok(()) => {
                debug!(nodes = chain.len(), "audio chain reconnected");
                self.wired = chain;
                Ok(())
            }
            Err(err) => {
                error!(%err, "error reconnecting audio chain, restoring previous wiring");
                self.unlink(&chain);
                if let Err(restore) = self.link(&previous) {
                    error!(%restore, "failed to restore previous wiring");
                }
                self.wired = previous;
                Err(PlayerError::Reconnect(err.to_string()))
            }
        }
    }

    /// Feeds a secondary element into the analyser as a recording-only
    /// input. The in-line analyser does not forward it, so the element never
    /// reaches the output.
    pub fn connect_analysis_only(&mut self, element: &MediaElementId) -> Result<NodeId> {
        if let Some(existing) = self.auxiliary.iter().find(|aux| &aux.element == element) {
            return Ok(existing.node);
        }
        let analyser = self.analyser.ok_or(PlayerError::NotInitialised)?;

        let node = self.backend.create_media_source(element)?;
        if let Err(err) = self.backend.connect_analysis_input(node, analyser) {
            self.release_nodes(&[node]);
            return Err(into_graph_init(err));
        }
        self.auxiliary.push(AuxiliarySource {
            element: element.clone(),
            node,
        });
        info!(%element, "connected analysis-only source");
        Ok(node)
    }

    /// Disconnects and releases a source added by
    /// [`connect_analysis_only`](Self::connect_analysis_only). Unknown
    /// elements are ignored.
    pub fn disconnect_analysis_only(&mut self, element: &MediaElementId) {
        let Some(position) = self.auxiliary.iter().position(|aux| &aux.element == element) else {
            return;
        };
        let aux = self.auxiliary.remove(position);
        if let Err(err) = self.backend.disconnect(aux.node) {
            warn!(%element, %err, "failed to disconnect analysis-only source");
        }
        self.release_nodes(&[aux.node]);
        info!(%element, "released analysis-only source");
    }

    /// Copies the latest analyser snapshot into the caller's buffers.
    pub fn sample_analyser(&mut self, frequency: &mut [u8], time_domain: &mut [u8]) -> Result<()> {
        let analyser = self.analyser.ok_or(PlayerError::NotInitialised)?;
        self.backend.byte_frequency_data(analyser, frequency)?;
        self.backend.byte_time_domain_data(analyser, time_domain)
    }

    pub fn frequency_bin_count(&self) -> Option<usize> {
        self.analyser
            .and_then(|analyser| self.backend.frequency_bin_count(analyser).ok())
    }

    pub fn get_analyser(&self) -> Option<NodeId> {
        self.analyser
    }

    pub fn get_context(&self) -> Option<ContextInfo> {
        self.context_info().ok()
    }

    pub fn source(&self) -> Option<NodeId> {
        self.source
    }

    pub fn filters(&self) -> &[NodeId] {
        &self.filters
    }

    pub fn element(&self) -> Option<&MediaElementId> {
        self.element.as_ref()
    }

    pub fn is_ready(&self) -> bool {
        self.initialized && self.backend.has_context() && self.source.is_some()
    }

    pub fn backend(&self) -> &dyn AudioBackend {
        self.backend.as_ref()
    }

    /// Disconnects and releases every owned node and closes the context.
    /// Safe to call repeatedly.
    pub fn destroy(&mut self) {
        let filters = std::mem::take(&mut self.filters);
        self.release_nodes(&filters);

        let auxiliary = std::mem::take(&mut self.auxiliary);
        let aux_nodes: Vec<NodeId> = auxiliary.iter().map(|aux| aux.node).collect();
        self.release_nodes(&aux_nodes);

        if let Some(source) = self.source.take() {
            self.release_nodes(&[source]);
        }
        if let Some(analyser) = self.analyser.take() {
            self.release_nodes(&[analyser]);
        }

        if self.backend.has_context() && self.backend.context_state() != ContextState::Closed {
            if let Err(err) = self.backend.close() {
                warn!(%err, "failed to close audio context");
            }
        }

        let was_initialised = std::mem::replace(&mut self.initialized, false);
        self.wired.clear();
        self.element = None;
        if was_initialised {
            info!("audio graph destroyed");
        }
    }

    fn context_info(&self) -> Result<ContextInfo> {
        if !self.backend.has_context() {
            return Err(PlayerError::NotInitialised);
        }
        Ok(ContextInfo {
            sample_rate: self.backend.sample_rate(),
            state: self.backend.context_state(),
            current_time: self.backend.current_time(),
        })
    }

    fn unlink(&mut self, chain: &[NodeId]) {
        // The last node is the destination, which has no outputs.
        for &node in chain.iter().take(chain.len().saturating_sub(1)) {
            if let Err(err) = self.backend.disconnect(node) {
                debug!(?node, %err, "disconnect failed");
            }
        }
    }

    fn link(&mut self, chain: &[NodeId]) -> Result<()> {
        for pair in chain.windows(2) {
            self.backend.connect(pair[0], pair[1])?;
        }
        Ok(())
    }

    fn release_nodes(&mut self, nodes: &[NodeId]) {
        for &node in nodes {
            if let Err(err) = self.backend.release(node) {
                debug!(?node, %err, "release failed");
            }
        }
    }
}

impl std::fmt::Debug for AudioGraphManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioGraphManager")
            .field("element", &self.element)
            .field("source", &self.source)
            .field("analyser", &self.analyser)
            .field("filters", &self.filters)
            .field("initialized", &self.initialized)
            .finish()
    }
}

fn into_graph_init(err: PlayerError) -> PlayerError {
    match err {
        PlayerError::UnsupportedPlatform | PlayerError::GraphInit(_) => err,
        other => PlayerError::GraphInit(other.to_string()),
    }
}

/// Shared, thread-safe view over the single [`AudioGraphManager`].
///
/// Every mutation goes through the lock, so two flows racing to initialise
/// the same element are serialized and the second one sees the first one's
/// result.
#[derive(Clone)]
pub struct AudioGraphHandle {
    shared: Arc<Mutex<AudioGraphManager>>,
}

impl AudioGraphHandle {
    pub fn new(manager: AudioGraphManager) -> Self {
        Self {
            shared: Arc::new(Mutex::new(manager)),
        }
    }

    pub fn lock(&self) -> Result<MutexGuard<'_, AudioGraphManager>> {
        self.shared
            .lock()
            .map_err(|_| PlayerError::msg("audio graph has been poisoned"))
    }
}

impl std::fmt::Debug for AudioGraphHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioGraphHandle").finish()
    }
}
