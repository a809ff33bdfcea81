//! Frame loop that samples the shared analyser and renders a scene.

use std::sync::Arc;

use rand::{rngs::StdRng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::{
    audio::{MediaElement, MediaFactory, TrackDescriptor},
    graph::AudioGraphHandle,
    render::Surface,
    scene::{render_frame, Activity, VisualizationState, VisualizerMode},
    theme::{resolve_palette, Palette, ThemeVariables},
    timeline::{FrameHandle, FrameScheduler},
    PlayerError, Result,
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameStats {
    pub rendered: u64,
    pub active: u64,
    pub idle: u64,
    pub failed: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    Rendered(Activity),
    /// Drawing failed; the error was logged and the loop keeps running.
    Failed,
    /// The engine is not running. No frame was requested.
    Stopped,
}

/// Hidden, muted element that plays the analysis stream for tracks whose
/// primary element cannot be tapped.
struct SecondarySource {
    element: Arc<dyn MediaElement>,
    url: Option<String>,
    connected: bool,
}

pub struct VisualizationEngine<S: Surface, F: FrameScheduler> {
    graph: AudioGraphHandle,
    media: Arc<dyn MediaElement>,
    scheduler: F,
    surface: Option<S>,
    state: VisualizationState,
    palette: Palette,
    rng: StdRng,
    media_factory: Option<Box<dyn MediaFactory>>,
    secondary: Option<SecondarySource>,
    track: Option<TrackDescriptor>,
    pending: Option<FrameHandle>,
    running: bool,
    analysis_ready: bool,
    stats: FrameStats,
}

impl<S: Surface, F: FrameScheduler> VisualizationEngine<S, F> {
    pub fn new(
        graph: AudioGraphHandle,
        media: Arc<dyn MediaElement>,
        scheduler: F,
        mode: VisualizerMode,
    ) -> Self {
        Self {
            graph,
            media,
            scheduler,
            surface: None,
            state: VisualizationState::new(mode),
            palette: Palette::default(),
            rng: StdRng::from_entropy(),
            media_factory: None,
            secondary: None,
            track: None,
            pending: None,
            running: false,
            analysis_ready: false,
            stats: FrameStats::default(),
        }
    }

    /// Enables the analysis-only secondary source for tracks that need it.
    pub fn with_media_factory(mut self, factory: impl MediaFactory + 'static) -> Self {
        self.media_factory = Some(Box::new(factory));
        self
    }

    /// Makes idle jitter reproducible.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    pub fn set_theme(&mut self, vars: &ThemeVariables) {
        self.palette = resolve_palette(vars);
    }

    pub fn set_palette(&mut self, palette: Palette) {
        self.palette = palette;
    }

    pub fn palette(&self) -> &Palette {
        &self.palette
    }

    pub fn set_mode(&mut self, mode: VisualizerMode) {
        if self.state.mode != mode {
            debug!(from = %self.state.mode, to = %mode, "switching visualizer mode");
            self.state.mode = mode;
        }
    }

    pub fn mode(&self) -> VisualizerMode {
        self.state.mode
    }

    pub fn set_track(&mut self, track: Option<TrackDescriptor>) {
        self.track = track;
        if self.analysis_ready {
            if let Err(err) = self.sync_secondary_source() {
                warn!(%err, "failed to attach analysis source for track");
            }
        }
    }

    /// Connects the engine to the shared graph and starts the frame loop.
    /// Calling it again re-initialises in place: any outstanding frame
    /// request is cancelled first, so only one stays in flight.
    ///
    /// Only [`PlayerError::UnsupportedPlatform`] and
    /// [`PlayerError::MissingSurface`] abort; any other graph failure leaves
    /// the engine running in idle-only mode.
    pub fn setup(&mut self, surface: Option<S>, track: Option<TrackDescriptor>) -> Result<()> {
        if let Some(handle) = self.pending.take() {
            self.scheduler.cancel_frame(handle);
        }
        self.track = track;

        let element = self.media.id();
        let initialised = self.graph.lock().and_then(|mut graph| graph.initialize(&element));
        match initialised {
            Ok(_) => self.analysis_ready = true,
            Err(PlayerError::UnsupportedPlatform) => {
                error!("audio processing is not supported, visualizer disabled");
                return Err(PlayerError::UnsupportedPlatform);
            }
            Err(err) => {
                error!(%err, "audio graph unavailable, visualizer runs idle only");
                self.analysis_ready = false;
            }
        }

        if self.analysis_ready {
            if let Err(err) = self.sync_secondary_source() {
                warn!(%err, "failed to attach analysis source");
            }
            let bins = self.graph.lock()?.frequency_bin_count().unwrap_or(0);
            self.state.resize(bins);
            debug!(bins, "sized analysis buffers");
        }

        let Some(mut surface) = surface else {
            error!("no drawing surface, visualizer not started");
            return Err(PlayerError::MissingSurface);
        };
        let size = surface.client_size();
        let (width, height) = size.backing();
        surface.resize_backing(width, height);
        self.surface = Some(surface);

        self.running = true;
        self.pending = Some(self.scheduler.request_frame());
        info!(mode = %self.state.mode, width, height, "visualizer started");
        Ok(())
    }

    /// Runs one frame. The next frame is requested before anything else, so
    /// a failing frame never stops the loop.
    pub fn tick(&mut self) -> FrameOutcome {
        if !self.running {
            return FrameOutcome::Stopped;
        }
        self.pending = Some(self.scheduler.request_frame());

        if self.analysis_ready {
            if let Err(err) = self.sync_secondary_source() {
                debug!(%err, "analysis source sync failed");
            }
            let sampled = self.graph.lock().and_then(|mut graph| {
                graph.sample_analyser(&mut self.state.frequency, &mut self.state.time_domain)
            });
            if let Err(err) = sampled {
                debug!(%err, "failed to sample analyser");
            }
        }

        let activity = if self.is_playing() && self.state.signal_present() {
            Activity::Active
        } else {
            Activity::Idle
        };

        let Some(surface) = self.surface.as_mut() else {
            return FrameOutcome::Stopped;
        };
        match render_frame(&mut self.state, activity, &self.palette, surface, &mut self.rng) {
            Ok(()) => {
                self.stats.rendered += 1;
                match activity {
                    Activity::Active => self.stats.active += 1,
                    Activity::Idle => self.stats.idle += 1,
                }
                FrameOutcome::Rendered(activity)
            }
            Err(err) => {
                self.stats.failed += 1;
                debug!(%err, "frame render failed");
                FrameOutcome::Failed
            }
        }
    }

    /// Stops the loop and drops the engine's own analysis source. The
    /// shared chain stays untouched.
    pub fn teardown(&mut self) {
        if let Some(handle) = self.pending.take() {
            self.scheduler.cancel_frame(handle);
        }
        if let Some(secondary) = self.secondary.take() {
            secondary.element.pause();
            if secondary.connected {
                match self.graph.lock() {
                    Ok(mut graph) => graph.disconnect_analysis_only(&secondary.element.id()),
                    Err(err) => warn!(%err, "could not release analysis source"),
                }
            }
        }
        self.state.phases.reset();
        if std::mem::replace(&mut self.running, false) {
            info!(frames = self.stats.rendered, "visualizer stopped");
        }
    }

    /// Whether the primary or the secondary element is playing a source.
    pub fn is_playing(&self) -> bool {
        let playing = |element: &dyn MediaElement| element.source().is_some() && element.is_playing();
        playing(self.media.as_ref())
            || self
                .secondary
                .as_ref()
                .is_some_and(|secondary| playing(secondary.element.as_ref()))
    }

    /// Creates, re-points and play/pause-syncs the analysis-only element
    /// according to the current track.
    pub fn sync_secondary_source(&mut self) -> Result<()> {
        let wanted = self
            .track
            .as_ref()
            .filter(|track| track.requires_analysis_source)
            .and_then(|track| track.analysis_url.clone());

        let Some(url) = wanted else {
            if let Some(secondary) = &self.secondary {
                if secondary.element.is_playing() {
                    secondary.element.pause();
                }
            }
            return Ok(());
        };

        if self.secondary.is_none() {
            let factory = self
                .media_factory
                .as_ref()
                .ok_or_else(|| PlayerError::msg("no media factory for the analysis source"))?;
            let element = factory.create_hidden_element()?;
            element.set_volume(0.0);
            info!(element = %element.id(), "created analysis source element");
            self.secondary = Some(SecondarySource {
                element,
                url: None,
                connected: false,
            });
        }
        let Some(secondary) = self.secondary.as_mut() else {
            return Ok(());
        };

        if secondary.url.as_deref() != Some(url.as_str()) {
            secondary.element.set_source(&url);
            debug!(%url, "pointed analysis source at new stream");
            secondary.url = Some(url);
        }

        if !secondary.connected {
            let element = secondary.element.id();
            match self.graph.lock()?.connect_analysis_only(&element) {
                Ok(_) => {}
                Err(err) if err.is_recoverable() => {
                    debug!(%element, %err, "analysis source already connected");
                }
                Err(err) => return Err(err),
            }
            secondary.connected = true;
        }

        let primary_playing = self.media.is_playing();
        if primary_playing && !secondary.element.is_playing() {
            secondary.element.play()?;
        } else if !primary_playing && secondary.element.is_playing() {
            secondary.element.pause();
        }
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn stats(&self) -> FrameStats {
        self.stats
    }

    pub fn state(&self) -> &VisualizationState {
        &self.state
    }

    pub fn surface(&self) -> Option<&S> {
        self.surface.as_ref()
    }

    pub fn surface_mut(&mut self) -> Option<&mut S> {
        self.surface.as_mut()
    }

    pub fn scheduler(&self) -> &F {
        &self.scheduler
    }

    pub fn scheduler_mut(&mut self) -> &mut F {
        &mut self.scheduler
    }

    pub fn secondary_element(&self) -> Option<Arc<dyn MediaElement>> {
        self.secondary.as_ref().map(|secondary| Arc::clone(&secondary.element))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        audio::{
            AnalyserSpec, AudioBackend, ContextState, FilterSpec, MediaElementId, NodeId,
            SimulatedMedia, SimulatedMediaFactory, SoftwareBackend,
        },
        graph::AudioGraphManager,
        render::{DrawCommand, RecordingSurface, Shape},
        scene::bars,
        timeline::ManualScheduler,
    };

    /// Real graph wiring with analyser output pinned to fixed buffers.
    struct FixedAnalysis {
        inner: SoftwareBackend,
        frequency: Vec<u8>,
        time_domain: Vec<u8>,
    }

    impl AudioBackend for FixedAnalysis {
        fn create_context(&mut self) -> Result<()> {
            self.inner.create_context()
        }
        fn has_context(&self) -> bool {
            self.inner.has_context()
        }
        fn context_state(&self) -> ContextState {
            self.inner.context_state()
        }
        fn resume(&mut self) -> Result<()> {
            self.inner.resume()
        }
        fn close(&mut self) -> Result<()> {
            self.inner.close()
        }
        fn current_time(&self) -> f64 {
            self.inner.current_time()
        }
        fn sample_rate(&self) -> f32 {
            self.inner.sample_rate()
        }
        fn destination(&self) -> Result<NodeId> {
            self.inner.destination()
        }
        fn create_analyser(&mut self, spec: AnalyserSpec) -> Result<NodeId> {
            self.inner.create_analyser(spec)
        }
        fn create_media_source(&mut self, element: &MediaElementId) -> Result<NodeId> {
            self.inner.create_media_source(element)
        }
        fn create_filter(&mut self, spec: FilterSpec) -> Result<NodeId> {
            self.inner.create_filter(spec)
        }
        fn release(&mut self, node: NodeId) -> Result<()> {
            self.inner.release(node)
        }
        fn connect(&mut self, from: NodeId, to: NodeId) -> Result<()> {
            self.inner.connect(from, to)
        }
        fn connect_analysis_input(&mut self, from: NodeId, analyser: NodeId) -> Result<()> {
            self.inner.connect_analysis_input(from, analyser)
        }
        fn disconnect(&mut self, node: NodeId) -> Result<()> {
            self.inner.disconnect(node)
        }
        fn outputs(&self, node: NodeId) -> Vec<NodeId> {
            self.inner.outputs(node)
        }
        fn cancel_scheduled_gain(&mut self, filter: NodeId, at: f64) -> Result<()> {
            self.inner.cancel_scheduled_gain(filter, at)
        }
        fn set_gain_target(&mut self, filter: NodeId, target: f32, at: f64, time_constant: f64) -> Result<()> {
            self.inner.set_gain_target(filter, target, at, time_constant)
        }
        fn frequency_bin_count(&self, analyser: NodeId) -> Result<usize> {
            self.inner.frequency_bin_count(analyser)
        }
        fn byte_frequency_data(&mut self, _analyser: NodeId, out: &mut [u8]) -> Result<()> {
            for (slot, value) in out.iter_mut().zip(&self.frequency) {
                *slot = *value;
            }
            Ok(())
        }
        fn byte_time_domain_data(&mut self, _analyser: NodeId, out: &mut [u8]) -> Result<()> {
            for (slot, value) in out.iter_mut().zip(&self.time_domain) {
                *slot = *value;
            }
            Ok(())
        }
    }

    fn fixed_graph(frequency: Vec<u8>, time_domain: Vec<u8>) -> AudioGraphHandle {
        let backend = FixedAnalysis {
            inner: SoftwareBackend::new(48_000.0),
            frequency,
            time_domain,
        };
        AudioGraphHandle::new(AudioGraphManager::new(Box::new(backend), AnalyserSpec::default()))
    }

    fn spike() -> Vec<u8> {
        let mut frequency = vec![0u8; 1024];
        frequency[0] = 255;
        frequency
    }

    fn engine(
        graph: AudioGraphHandle,
        media: &SimulatedMedia,
        mode: VisualizerMode,
    ) -> VisualizationEngine<RecordingSurface, ManualScheduler> {
        VisualizationEngine::new(graph, Arc::new(media.clone()), ManualScheduler::new(), mode).with_seed(1)
    }

    fn bar_heights(surface: &RecordingSurface) -> Vec<f32> {
        surface
            .commands()
            .iter()
            .filter_map(|command| match command {
                DrawCommand::Fill {
                    shape: Shape::RoundedBar { height, .. },
                    ..
                } => Some(*height),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn playing_spike_fills_the_first_bar() {
        let media = SimulatedMedia::new("main");
        media.set_source("tone://440");
        media.play().unwrap();

        let mut engine = engine(fixed_graph(spike(), vec![128; 1024]), &media, VisualizerMode::Bars);
        engine
            .setup(Some(RecordingSurface::new(640.0, 120.0, 2.0)), None)
            .unwrap();
        assert_eq!(engine.surface().unwrap().backing_size(), (1280, 240));
        assert_eq!(engine.state().frequency.len(), 1024);

        assert_eq!(engine.tick(), FrameOutcome::Rendered(Activity::Active));
        let heights = bar_heights(engine.surface().unwrap());
        assert_eq!(heights.len(), bars::BAR_COUNT);
        assert_eq!(heights[0], 120.0);
        assert!(heights[1..].iter().all(|&h| h == 0.0));
    }

    #[test]
    fn paused_media_shows_the_idle_pattern() {
        let media = SimulatedMedia::new("main");
        media.set_source("tone://440");

        let mut engine = engine(fixed_graph(spike(), vec![128; 1024]), &media, VisualizerMode::Bars);
        engine
            .setup(Some(RecordingSurface::new(640.0, 120.0, 1.0)), None)
            .unwrap();

        assert_eq!(engine.tick(), FrameOutcome::Rendered(Activity::Idle));
        let heights = bar_heights(engine.surface().unwrap());
        let expected = bars::idle_heights(bars::IDLE_STEP);
        assert_eq!(heights, expected.to_vec());
    }

    #[test]
    fn missing_surface_aborts_setup() {
        let media = SimulatedMedia::new("main");
        let mut engine = engine(fixed_graph(spike(), vec![128; 1024]), &media, VisualizerMode::Wave);
        assert!(matches!(engine.setup(None, None), Err(PlayerError::MissingSurface)));
        assert!(!engine.is_running());
        assert_eq!(engine.scheduler().pending(), 0);
        assert_eq!(engine.tick(), FrameOutcome::Stopped);
    }

    #[test]
    fn unsupported_platform_is_terminal() {
        let graph = AudioGraphHandle::new(AudioGraphManager::new(
            Box::new(SoftwareBackend::unsupported()),
            AnalyserSpec::default(),
        ));
        let media = SimulatedMedia::new("main");
        let mut engine = engine(graph, &media, VisualizerMode::Bars);
        let result = engine.setup(Some(RecordingSurface::new(10.0, 10.0, 1.0)), None);
        assert!(matches!(result, Err(PlayerError::UnsupportedPlatform)));
        assert!(!engine.is_running());
    }

    #[test]
    fn graph_failure_leaves_an_idle_visualizer() {
        let spec = AnalyserSpec {
            fft_size: 100,
            ..AnalyserSpec::default()
        };
        let graph = AudioGraphHandle::new(AudioGraphManager::new(
            Box::new(SoftwareBackend::new(48_000.0)),
            spec,
        ));
        let media = SimulatedMedia::new("main");
        media.set_source("tone://440");
        media.play().unwrap();

        let mut engine = engine(graph, &media, VisualizerMode::Circle);
        engine
            .setup(Some(RecordingSurface::new(200.0, 200.0, 1.0)), None)
            .unwrap();
        assert!(engine.state().frequency.is_empty());
        assert_eq!(engine.tick(), FrameOutcome::Rendered(Activity::Idle));
    }

    #[test]
    fn teardown_stops_rescheduling() {
        let media = SimulatedMedia::new("main");
        let mut engine = engine(fixed_graph(spike(), vec![128; 1024]), &media, VisualizerMode::Bars);
        engine
            .setup(Some(RecordingSurface::new(100.0, 50.0, 1.0)), None)
            .unwrap();
        engine.tick();
        engine.tick();
        assert_eq!(engine.scheduler().pending(), 3);
        assert!(engine.state().phases.bars_idle > 0.0);

        engine.teardown();
        assert_eq!(engine.scheduler().pending(), 2);
        assert_eq!(engine.state().phases.bars_idle, 0.0);
        assert_eq!(engine.tick(), FrameOutcome::Stopped);
        assert_eq!(engine.scheduler().pending(), 2);
    }

    #[test]
    fn repeated_setup_keeps_a_single_frame_in_flight() {
        let media = SimulatedMedia::new("main");
        let mut engine = engine(fixed_graph(spike(), vec![128; 1024]), &media, VisualizerMode::Bars);
        engine
            .setup(Some(RecordingSurface::new(100.0, 50.0, 1.0)), None)
            .unwrap();
        engine
            .setup(Some(RecordingSurface::new(200.0, 50.0, 1.0)), None)
            .unwrap();
        assert_eq!(engine.scheduler().pending(), 1);

        let mut ticks = 0;
        for _ in 0..10 {
            let due = engine.scheduler().pending();
            for _ in 0..due {
                engine.scheduler_mut().take_due();
                engine.tick();
                ticks += 1;
            }
        }
        assert_eq!(ticks, 10);
        assert!((engine.state().phases.bars_idle - 10.0 * bars::IDLE_STEP).abs() < 1e-4);

        engine.teardown();
        assert_eq!(engine.scheduler().pending(), 0);
    }

    #[test]
    fn render_errors_do_not_stop_the_loop() {
        let media = SimulatedMedia::new("main");
        let mut engine = engine(fixed_graph(spike(), vec![128; 1024]), &media, VisualizerMode::Wave);
        engine
            .setup(Some(RecordingSurface::new(100.0, 50.0, 1.0)), None)
            .unwrap();

        engine.surface_mut().unwrap().fail_next_draw();
        assert_eq!(engine.tick(), FrameOutcome::Failed);
        assert_eq!(engine.tick(), FrameOutcome::Rendered(Activity::Idle));
        assert_eq!(engine.stats().failed, 1);
        assert_eq!(engine.stats().rendered, 1);
        assert!(engine.is_running());
    }

    #[test]
    fn wave_goes_active_with_time_domain_signal() {
        let media = SimulatedMedia::new("main");
        media.set_source("tone://440");
        media.play().unwrap();

        let mut engine = engine(fixed_graph(vec![0; 1024], vec![160; 1024]), &media, VisualizerMode::Wave);
        engine
            .setup(Some(RecordingSurface::new(100.0, 50.0, 1.0)), None)
            .unwrap();
        assert_eq!(engine.tick(), FrameOutcome::Rendered(Activity::Active));

        engine.set_mode(VisualizerMode::Bars);
        assert_eq!(engine.tick(), FrameOutcome::Rendered(Activity::Idle));
    }

    #[test]
    fn secondary_source_follows_the_primary() {
        let media = SimulatedMedia::new("main");
        media.set_source("https://stream.example/primary");
        let factory = SimulatedMediaFactory::new();

        let mut engine = engine(fixed_graph(spike(), vec![128; 1024]), &media, VisualizerMode::Bars)
            .with_media_factory(factory.clone());
        let track = TrackDescriptor {
            requires_analysis_source: true,
            analysis_url: Some("https://proxy.example/a.mp3".into()),
            ..TrackDescriptor::new("t1", "Live")
        };
        engine
            .setup(Some(RecordingSurface::new(100.0, 50.0, 1.0)), Some(track.clone()))
            .unwrap();

        let created = factory.created();
        let hidden = &created[0];
        assert_eq!(hidden.volume(), 0.0);
        assert_eq!(hidden.source().as_deref(), Some("https://proxy.example/a.mp3"));
        assert!(!hidden.is_playing());

        media.play().unwrap();
        engine.tick();
        assert!(hidden.is_playing());

        media.pause();
        engine.tick();
        assert!(!hidden.is_playing());

        engine.set_track(Some(TrackDescriptor {
            analysis_url: Some("https://proxy.example/b.mp3".into()),
            ..track
        }));
        assert_eq!(hidden.source().as_deref(), Some("https://proxy.example/b.mp3"));
        assert_eq!(factory.created().len(), 1);
    }

    #[test]
    fn teardown_releases_the_analysis_source() {
        let backend = SoftwareBackend::new(48_000.0);
        let graph = AudioGraphHandle::new(AudioGraphManager::new(
            Box::new(backend.clone()),
            AnalyserSpec::default(),
        ));
        let media = SimulatedMedia::new("main");
        media.set_source("https://stream.example/primary");

        let mut plain = engine(graph.clone(), &media, VisualizerMode::Bars);
        plain
            .setup(Some(RecordingSurface::new(100.0, 50.0, 1.0)), None)
            .unwrap();
        let nodes_before = backend.node_count();

        let factory = SimulatedMediaFactory::new();
        let mut proxied = engine(graph.clone(), &media, VisualizerMode::Circle)
            .with_media_factory(factory.clone());
        let track = TrackDescriptor {
            requires_analysis_source: true,
            analysis_url: Some("https://proxy.example/a.mp3".into()),
            ..TrackDescriptor::new("t1", "Live")
        };
        proxied
            .setup(Some(RecordingSurface::new(100.0, 50.0, 1.0)), Some(track))
            .unwrap();
        assert_eq!(backend.node_count(), nodes_before + 1);

        proxied.teardown();
        assert_eq!(backend.node_count(), nodes_before);
        assert!(proxied.secondary_element().is_none());
        assert!(!factory.created()[0].is_playing());
        assert!(graph.lock().unwrap().is_ready());
        assert!(matches!(plain.tick(), FrameOutcome::Rendered(_)));
    }

    #[test]
    fn already_bound_analysis_element_counts_as_connected() {
        let backend = SoftwareBackend::new(48_000.0);
        let graph = AudioGraphHandle::new(AudioGraphManager::new(
            Box::new(backend.clone()),
            AnalyserSpec::default(),
        ));
        graph.lock().unwrap().initialize(&MediaElementId::from("main")).unwrap();
        let mut raw = backend.clone();
        raw.create_media_source(&MediaElementId::from("hidden-analysis-0")).unwrap();
        let nodes_before = backend.node_count();

        let media = SimulatedMedia::new("main");
        let factory = SimulatedMediaFactory::new();
        let mut engine = engine(graph, &media, VisualizerMode::Bars).with_media_factory(factory.clone());
        let track = TrackDescriptor {
            requires_analysis_source: true,
            analysis_url: Some("https://proxy.example/a.mp3".into()),
            ..TrackDescriptor::new("t1", "Live")
        };
        engine
            .setup(Some(RecordingSurface::new(100.0, 50.0, 1.0)), Some(track))
            .unwrap();
        engine.tick();

        assert_eq!(factory.created().len(), 1);
        assert_eq!(backend.node_count(), nodes_before);
        engine.teardown();
        assert_eq!(backend.node_count(), nodes_before);
    }

    #[test]
    fn tracks_without_the_flag_get_no_secondary_source() {
        let media = SimulatedMedia::new("main");
        let factory = SimulatedMediaFactory::new();
        let mut engine = engine(fixed_graph(spike(), vec![128; 1024]), &media, VisualizerMode::Bars)
            .with_media_factory(factory.clone());
        let track = TrackDescriptor {
            analysis_url: Some("https://proxy.example/a.mp3".into()),
            ..TrackDescriptor::new("t1", "Studio")
        };
        engine
            .setup(Some(RecordingSurface::new(100.0, 50.0, 1.0)), Some(track))
            .unwrap();
        assert!(factory.created().is_empty());
        assert!(engine.secondary_element().is_none());
    }

    #[test]
    fn engines_share_one_graph() {
        let graph = fixed_graph(spike(), vec![128; 1024]);
        let media = SimulatedMedia::new("main");
        let mut first = engine(graph.clone(), &media, VisualizerMode::Bars);
        let mut second = engine(graph.clone(), &media, VisualizerMode::Circle);
        first
            .setup(Some(RecordingSurface::new(100.0, 50.0, 1.0)), None)
            .unwrap();
        let source = graph.lock().unwrap().source();
        second
            .setup(Some(RecordingSurface::new(100.0, 50.0, 1.0)), None)
            .unwrap();

        first.teardown();
        assert!(graph.lock().unwrap().is_ready());
        assert_eq!(graph.lock().unwrap().source(), source);
        assert!(matches!(second.tick(), FrameOutcome::Rendered(_)));
    }
}
