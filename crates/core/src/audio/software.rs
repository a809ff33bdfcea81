use std::{
    collections::{BTreeMap, BTreeSet, VecDeque},
    f32::consts::FRAC_1_SQRT_2,
    sync::{Arc, Mutex, MutexGuard},
};

use biquad::{Biquad, Coefficients, DirectForm2Transposed, ToHertz, Type};

use crate::{
    analysis::AnalyserCore,
    audio::{
        AnalyserSpec, AudioBackend, AudioParam, ContextState, FilterKind, FilterSpec,
        MediaElementId, NodeId,
    },
    PlayerError, Result,
};

/// Gain change (dB) below which filter coefficients are not recomputed.
const COEFFICIENT_EPSILON: f32 = 1e-3;

/// In-process [`AudioBackend`] that really filters and analyses audio.
///
/// Clones share the same graph, so a host can keep one clone to feed blocks
/// of samples through [`render`](Self::render) while the graph manager owns
/// another. New contexts start suspended, like a browser context created
/// before a user gesture.
#[derive(Debug, Clone)]
pub struct SoftwareBackend {
    shared: Arc<Mutex<SoftwareGraph>>,
}

#[derive(Debug)]
struct SoftwareGraph {
    supported: bool,
    sample_rate: f32,
    context: Option<SoftwareContext>,
    bound_elements: BTreeSet<MediaElementId>,
    next_id: u32,
    failing_targets: BTreeSet<NodeId>,
}

#[derive(Debug)]
struct SoftwareContext {
    state: ContextState,
    frames_rendered: u64,
    destination: NodeId,
    nodes: BTreeMap<NodeId, SoftwareNode>,
    edges: BTreeMap<NodeId, Vec<NodeId>>,
    /// Recording-only inputs: source → analyser, never forwarded.
    analysis_inputs: BTreeMap<NodeId, NodeId>,
}

#[derive(Debug)]
enum SoftwareNode {
    Destination,
    MediaSource(MediaElementId),
    Filter(FilterNode),
    Analyser(Box<AnalyserCore>),
}

struct FilterNode {
    spec: FilterSpec,
    gain: AudioParam,
    applied_gain: f32,
    filter: DirectForm2Transposed<f32>,
}

impl FilterNode {
    fn new(spec: FilterSpec, sample_rate: f32) -> Result<Self> {
        let coefficients = filter_coefficients(&spec, spec.gain_db, sample_rate)?;
        Ok(Self {
            spec,
            gain: AudioParam::new(spec.gain_db),
            applied_gain: spec.gain_db,
            filter: DirectForm2Transposed::<f32>::new(coefficients),
        })
    }

    /// Gain is evaluated once per block, at the block's start time.
    fn process(&mut self, block: &[f32], time: f64, sample_rate: f32) -> Vec<f32> {
        let gain = self.gain.value_at(time);
        if (gain - self.applied_gain).abs() > COEFFICIENT_EPSILON {
            if let Ok(coefficients) = filter_coefficients(&self.spec, gain, sample_rate) {
                self.filter.update_coefficients(coefficients);
                self.applied_gain = gain;
            }
        }
        block.iter().map(|&sample| self.filter.run(sample)).collect()
    }
}

impl std::fmt::Debug for FilterNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilterNode")
            .field("spec", &self.spec)
            .field("gain", &self.gain)
            .field("applied_gain", &self.applied_gain)
            .finish()
    }
}

fn filter_coefficients(spec: &FilterSpec, gain_db: f32, sample_rate: f32) -> Result<Coefficients<f32>> {
    let (kind, q) = match spec.kind {
        FilterKind::LowShelf => (Type::LowShelf(gain_db), FRAC_1_SQRT_2),
        FilterKind::HighShelf => (Type::HighShelf(gain_db), FRAC_1_SQRT_2),
        FilterKind::Peaking => (Type::PeakingEQ(gain_db), spec.q),
    };
    Coefficients::<f32>::from_params(kind, sample_rate.hz(), spec.frequency.hz(), q).map_err(|err| {
        PlayerError::invalid(format!(
            "cannot build {:?} filter at {} Hz: {err:?}",
            spec.kind, spec.frequency
        ))
    })
}

impl SoftwareBackend {
    pub fn new(sample_rate: f32) -> Self {
        Self::build(true, sample_rate)
    }

    /// A backend whose platform has no audio API at all.
    pub fn unsupported() -> Self {
        Self::build(false, 48_000.0)
    }

    fn build(supported: bool, sample_rate: f32) -> Self {
        Self {
            shared: Arc::new(Mutex::new(SoftwareGraph {
                supported,
                sample_rate,
                context: None,
                bound_elements: BTreeSet::new(),
                next_id: 0,
                failing_targets: BTreeSet::new(),
            })),
        }
    }

    /// Pushes a block of samples from `element` through the graph and
    /// returns what reached the destination. A suspended context renders
    /// silence and does not advance time. Elements without a source node
    /// contribute nothing.
    pub fn render(&self, element: &MediaElementId, input: &[f32]) -> Result<Vec<f32>> {
        let mut graph = self.lock()?;
        let sample_rate = graph.sample_rate;
        let context = graph.context.as_mut().ok_or(PlayerError::NotInitialised)?;
        let mut output = vec![0.0; input.len()];
        if context.state != ContextState::Running {
            return Ok(output);
        }

        let time = context.frames_rendered as f64 / f64::from(sample_rate);
        let sources: Vec<NodeId> = context
            .nodes
            .iter()
            .filter_map(|(id, node)| match node {
                SoftwareNode::MediaSource(bound) if bound == element => Some(*id),
                _ => None,
            })
            .collect();

        let mut queue: VecDeque<(NodeId, Vec<f32>)> =
            sources.into_iter().map(|id| (id, input.to_vec())).collect();
        while let Some((node, signal)) = queue.pop_front() {
            if let Some(analyser) = context.analysis_inputs.get(&node).copied() {
                if let Some(SoftwareNode::Analyser(core)) = context.nodes.get_mut(&analyser) {
                    core.push(&signal);
                }
            }
            let targets = context.edges.get(&node).cloned().unwrap_or_default();
            for target in targets {
                let Some(next) = context.nodes.get_mut(&target) else {
                    continue;
                };
                match next {
                    SoftwareNode::Destination => {
                        for (out, sample) in output.iter_mut().zip(&signal) {
                            *out += sample;
                        }
                    }
                    SoftwareNode::Filter(filter) => {
                        let filtered = filter.process(&signal, time, sample_rate);
                        queue.push_back((target, filtered));
                    }
                    SoftwareNode::Analyser(core) => {
                        core.push(&signal);
                        queue.push_back((target, signal.clone()));
                    }
                    SoftwareNode::MediaSource(_) => {}
                }
            }
        }

        context.frames_rendered += input.len() as u64;
        Ok(output)
    }

    /// Makes any later `connect(_, target)` fail, to exercise rollback.
    pub fn fail_connections_to(&self, target: NodeId) -> Result<()> {
        self.lock()?.failing_targets.insert(target);
        Ok(())
    }

    pub fn clear_connection_failures(&self) -> Result<()> {
        self.lock()?.failing_targets.clear();
        Ok(())
    }

    /// Puts the live context back into the suspended state.
    pub fn suspend(&self) -> Result<()> {
        let mut graph = self.lock()?;
        let context = graph.context.as_mut().ok_or(PlayerError::NotInitialised)?;
        context.state = ContextState::Suspended;
        Ok(())
    }

    pub fn is_bound(&self, element: &MediaElementId) -> bool {
        self.lock()
            .map(|graph| graph.bound_elements.contains(element))
            .unwrap_or(false)
    }

    pub fn node_count(&self) -> usize {
        self.lock()
            .ok()
            .and_then(|graph| graph.context.as_ref().map(|context| context.nodes.len()))
            .unwrap_or(0)
    }

    /// Current value of a filter's gain parameter.
    pub fn filter_gain(&self, filter: NodeId) -> Option<f32> {
        let graph = self.lock().ok()?;
        let context = graph.context.as_ref()?;
        let time = context.frames_rendered as f64 / f64::from(graph.sample_rate);
        match context.nodes.get(&filter)? {
            SoftwareNode::Filter(node) => Some(node.gain.value_at(time)),
            _ => None,
        }
    }

    /// Value a filter's gain parameter is approaching.
    pub fn filter_gain_target(&self, filter: NodeId) -> Option<f32> {
        let graph = self.lock().ok()?;
        match graph.context.as_ref()?.nodes.get(&filter)? {
            SoftwareNode::Filter(node) => Some(node.gain.target()),
            _ => None,
        }
    }

    /// Analyser a node feeds as a recording-only input.
    pub fn analysis_target(&self, node: NodeId) -> Option<NodeId> {
        let graph = self.lock().ok()?;
        graph.context.as_ref()?.analysis_inputs.get(&node).copied()
    }

    pub fn filter_spec(&self, filter: NodeId) -> Option<FilterSpec> {
        let graph = self.lock().ok()?;
        match graph.context.as_ref()?.nodes.get(&filter)? {
            SoftwareNode::Filter(node) => Some(node.spec),
            _ => None,
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, SoftwareGraph>> {
        self.shared
            .lock()
            .map_err(|_| PlayerError::msg("software audio graph has been poisoned"))
    }

    fn with_context<T>(&self, f: impl FnOnce(&mut SoftwareContext, f32) -> Result<T>) -> Result<T> {
        let mut graph = self.lock()?;
        let sample_rate = graph.sample_rate;
        let context = graph.context.as_mut().ok_or(PlayerError::NotInitialised)?;
        f(context, sample_rate)
    }
}

impl SoftwareGraph {
    fn allocate(&mut self) -> NodeId {
        let id = NodeId(self.next_id);
        self.next_id += 1;
        id
    }

    fn insert(&mut self, node: SoftwareNode) -> Result<NodeId> {
        let id = self.allocate();
        let context = self.context.as_mut().ok_or(PlayerError::NotInitialised)?;
        context.nodes.insert(id, node);
        Ok(id)
    }
}

impl SoftwareContext {
    fn filter_mut(&mut self, id: NodeId) -> Result<&mut FilterNode> {
        match self.nodes.get_mut(&id) {
            Some(SoftwareNode::Filter(filter)) => Ok(filter),
            _ => Err(PlayerError::invalid(format!("node {id:?} is not a filter"))),
        }
    }

    fn analyser_mut(&mut self, id: NodeId) -> Result<&mut AnalyserCore> {
        match self.nodes.get_mut(&id) {
            Some(SoftwareNode::Analyser(core)) => Ok(core),
            _ => Err(PlayerError::invalid(format!("node {id:?} is not an analyser"))),
        }
    }

    fn current_time(&self, sample_rate: f32) -> f64 {
        self.frames_rendered as f64 / f64::from(sample_rate)
    }
}

impl AudioBackend for SoftwareBackend {
    fn create_context(&mut self) -> Result<()> {
        let mut graph = self.lock()?;
        if !graph.supported {
            return Err(PlayerError::UnsupportedPlatform);
        }
        if graph.context.is_some() {
            return Ok(());
        }

        let destination = graph.allocate();
        let mut nodes = BTreeMap::new();
        nodes.insert(destination, SoftwareNode::Destination);
        graph.context = Some(SoftwareContext {
            state: ContextState::Suspended,
            frames_rendered: 0,
            destination,
            nodes,
            edges: BTreeMap::new(),
            analysis_inputs: BTreeMap::new(),
        });
        Ok(())
    }

    fn has_context(&self) -> bool {
        self.lock().map(|graph| graph.context.is_some()).unwrap_or(false)
    }

    fn context_state(&self) -> ContextState {
        self.lock()
            .ok()
            .and_then(|graph| graph.context.as_ref().map(|context| context.state))
            .unwrap_or(ContextState::Closed)
    }

    fn resume(&mut self) -> Result<()> {
        self.with_context(|context, _| {
            context.state = ContextState::Running;
            Ok(())
        })
    }

    fn close(&mut self) -> Result<()> {
        self.lock()?.context = None;
        Ok(())
    }

    fn current_time(&self) -> f64 {
        self.lock()
            .ok()
            .and_then(|graph| {
                let sample_rate = graph.sample_rate;
                graph.context.as_ref().map(|context| context.current_time(sample_rate))
            })
            .unwrap_or(0.0)
    }

    fn sample_rate(&self) -> f32 {
        self.lock().map(|graph| graph.sample_rate).unwrap_or(0.0)
    }

    fn destination(&self) -> Result<NodeId> {
        self.with_context(|context, _| Ok(context.destination))
    }

    fn create_analyser(&mut self, spec: AnalyserSpec) -> Result<NodeId> {
        let core = AnalyserCore::new(spec)?;
        self.lock()?.insert(SoftwareNode::Analyser(Box::new(core)))
    }

    fn create_media_source(&mut self, element: &MediaElementId) -> Result<NodeId> {
        let mut graph = self.lock()?;
        if graph.context.is_none() {
            return Err(PlayerError::NotInitialised);
        }
        if graph.bound_elements.contains(element) {
            return Err(PlayerError::StructuralConflict(element.to_string()));
        }
        let id = graph.insert(SoftwareNode::MediaSource(element.clone()))?;
        graph.bound_elements.insert(element.clone());
        Ok(id)
    }

    fn create_filter(&mut self, spec: FilterSpec) -> Result<NodeId> {
        let mut graph = self.lock()?;
        let filter = FilterNode::new(spec, graph.sample_rate)?;
        graph.insert(SoftwareNode::Filter(filter))
    }

    fn release(&mut self, node: NodeId) -> Result<()> {
        self.with_context(|context, _| {
            if node == context.destination {
                return Err(PlayerError::invalid("the destination cannot be released"));
            }
            context.edges.remove(&node);
            for targets in context.edges.values_mut() {
                targets.retain(|target| *target != node);
            }
            context.analysis_inputs.remove(&node);
            context.analysis_inputs.retain(|_, analyser| *analyser != node);
            context.nodes.remove(&node);
            Ok(())
        })
    }

    fn connect(&mut self, from: NodeId, to: NodeId) -> Result<()> {
        let mut graph = self.lock()?;
        if graph.failing_targets.contains(&to) {
            return Err(PlayerError::msg(format!("connection {from:?} -> {to:?} refused")));
        }
        let context = graph.context.as_mut().ok_or(PlayerError::NotInitialised)?;
        for id in [from, to] {
            if !context.nodes.contains_key(&id) {
                return Err(PlayerError::invalid(format!("unknown node {id:?}")));
            }
        }
        let targets = context.edges.entry(from).or_default();
        if !targets.contains(&to) {
            targets.push(to);
        }
        Ok(())
    }

    fn disconnect(&mut self, node: NodeId) -> Result<()> {
        self.with_context(|context, _| {
            if !context.nodes.contains_key(&node) {
                return Err(PlayerError::invalid(format!("unknown node {node:?}")));
            }
            context.edges.remove(&node);
            context.analysis_inputs.remove(&node);
            Ok(())
        })
    }

    fn connect_analysis_input(&mut self, from: NodeId, analyser: NodeId) -> Result<()> {
        let mut graph = self.lock()?;
        if graph.failing_targets.contains(&analyser) {
            return Err(PlayerError::msg(format!("connection {from:?} -> {analyser:?} refused")));
        }
        let context = graph.context.as_mut().ok_or(PlayerError::NotInitialised)?;
        if !context.nodes.contains_key(&from) {
            return Err(PlayerError::invalid(format!("unknown node {from:?}")));
        }
        context.analyser_mut(analyser)?;
        context.analysis_inputs.insert(from, analyser);
        Ok(())
    }

    fn outputs(&self, node: NodeId) -> Vec<NodeId> {
        self.lock()
            .ok()
            .and_then(|graph| {
                graph
                    .context
                    .as_ref()
                    .and_then(|context| context.edges.get(&node).cloned())
            })
            .unwrap_or_default()
    }

    fn cancel_scheduled_gain(&mut self, filter: NodeId, at: f64) -> Result<()> {
        self.with_context(|context, _| {
            context.filter_mut(filter)?.gain.cancel_scheduled_values(at);
            Ok(())
        })
    }

    fn set_gain_target(&mut self, filter: NodeId, target: f32, at: f64, time_constant: f64) -> Result<()> {
        self.with_context(|context, _| {
            context
                .filter_mut(filter)?
                .gain
                .set_target_at_time(target, at, time_constant);
            Ok(())
        })
    }

    fn frequency_bin_count(&self, analyser: NodeId) -> Result<usize> {
        self.with_context(|context, _| Ok(context.analyser_mut(analyser)?.frequency_bin_count()))
    }

    fn byte_frequency_data(&mut self, analyser: NodeId, out: &mut [u8]) -> Result<()> {
        self.with_context(|context, _| context.analyser_mut(analyser)?.byte_frequency_data(out))
    }

    fn byte_time_domain_data(&mut self, analyser: NodeId, out: &mut [u8]) -> Result<()> {
        self.with_context(|context, _| {
            context.analyser_mut(analyser)?.byte_time_domain_data(out);
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn running_backend() -> SoftwareBackend {
        let mut backend = SoftwareBackend::new(48_000.0);
        backend.create_context().unwrap();
        backend.resume().unwrap();
        backend
    }

    fn peaking(frequency: f32, gain_db: f32) -> FilterSpec {
        FilterSpec {
            kind: FilterKind::Peaking,
            frequency,
            q: 1.414,
            gain_db,
        }
    }

    fn rms(samples: &[f32]) -> f32 {
        (samples.iter().map(|s| s * s).sum::<f32>() / samples.len() as f32).sqrt()
    }

    fn tone(freq: f32, len: usize) -> Vec<f32> {
        (0..len)
            .map(|n| (2.0 * std::f32::consts::PI * freq * n as f32 / 48_000.0).sin() * 0.5)
            .collect()
    }

    #[test]
    fn unsupported_platform_has_no_context() {
        let mut backend = SoftwareBackend::unsupported();
        assert!(matches!(backend.create_context(), Err(PlayerError::UnsupportedPlatform)));
        assert!(!backend.has_context());
    }

    #[test]
    fn contexts_start_suspended() {
        let mut backend = SoftwareBackend::new(48_000.0);
        backend.create_context().unwrap();
        assert_eq!(backend.context_state(), ContextState::Suspended);
        backend.resume().unwrap();
        assert_eq!(backend.context_state(), ContextState::Running);
    }

    #[test]
    fn second_binding_of_an_element_conflicts_even_after_close() {
        let mut backend = running_backend();
        let element = MediaElementId::from("main");
        backend.create_media_source(&element).unwrap();
        assert!(matches!(
            backend.create_media_source(&element),
            Err(PlayerError::StructuralConflict(_))
        ));

        backend.close().unwrap();
        backend.create_context().unwrap();
        assert!(matches!(
            backend.create_media_source(&element),
            Err(PlayerError::StructuralConflict(_))
        ));
    }

    #[test]
    fn renders_through_filters_to_destination() {
        let mut backend = running_backend();
        let element = MediaElementId::from("main");
        let source = backend.create_media_source(&element).unwrap();
        let boost = backend.create_filter(peaking(1_000.0, 12.0)).unwrap();
        let destination = backend.destination().unwrap();
        backend.connect(source, boost).unwrap();
        backend.connect(boost, destination).unwrap();

        let input = tone(1_000.0, 4_800);
        let output = backend.render(&element, &input).unwrap();
        let tail = 2_400..4_800;
        assert!(rms(&output[tail.clone()]) > rms(&input[tail]) * 3.0);
        assert!((backend.current_time() - 0.1).abs() < 1e-9);
    }

    #[test]
    fn suspended_context_renders_silence() {
        let mut backend = SoftwareBackend::new(48_000.0);
        backend.create_context().unwrap();
        let element = MediaElementId::from("main");
        let source = backend.create_media_source(&element).unwrap();
        let destination = backend.destination().unwrap();
        backend.connect(source, destination).unwrap();

        let output = backend.render(&element, &tone(440.0, 256)).unwrap();
        assert!(output.iter().all(|&s| s == 0.0));
        assert_eq!(backend.current_time(), 0.0);
    }

    #[test]
    fn analyser_taps_the_passing_signal() {
        let mut backend = running_backend();
        let element = MediaElementId::from("main");
        let source = backend.create_media_source(&element).unwrap();
        let analyser = backend.create_analyser(AnalyserSpec::default()).unwrap();
        let destination = backend.destination().unwrap();
        backend.connect(source, analyser).unwrap();
        backend.connect(analyser, destination).unwrap();

        let input = tone(440.0, 2_048);
        let output = backend.render(&element, &input).unwrap();
        assert_eq!(output, input);

        let bins = backend.frequency_bin_count(analyser).unwrap();
        let mut freq = vec![0u8; bins];
        backend.byte_frequency_data(analyser, &mut freq).unwrap();
        assert!(freq.iter().any(|&v| v > 0));
    }

    #[test]
    fn analysis_inputs_are_recorded_but_not_forwarded() {
        let mut backend = running_backend();
        let main = MediaElementId::from("main");
        let hidden = MediaElementId::from("hidden");
        let source = backend.create_media_source(&main).unwrap();
        let aux = backend.create_media_source(&hidden).unwrap();
        let analyser = backend.create_analyser(AnalyserSpec::default()).unwrap();
        let destination = backend.destination().unwrap();
        backend.connect(source, analyser).unwrap();
        backend.connect(analyser, destination).unwrap();
        backend.connect_analysis_input(aux, analyser).unwrap();

        let output = backend.render(&hidden, &tone(440.0, 2_048)).unwrap();
        assert!(output.iter().all(|&s| s == 0.0));
        let mut freq = vec![0u8; backend.frequency_bin_count(analyser).unwrap()];
        backend.byte_frequency_data(analyser, &mut freq).unwrap();
        assert!(freq.iter().any(|&v| v > 0));

        backend.disconnect(aux).unwrap();
        assert_eq!(backend.analysis_target(aux), None);
    }

    #[test]
    fn analysis_inputs_must_target_an_analyser() {
        let mut backend = running_backend();
        let aux = backend.create_media_source(&MediaElementId::from("hidden")).unwrap();
        let filter = backend.create_filter(peaking(500.0, 0.0)).unwrap();
        assert!(backend.connect_analysis_input(aux, filter).is_err());
    }

    #[test]
    fn gain_automation_is_sampled_per_block() {
        let mut backend = running_backend();
        let filter = backend.create_filter(peaking(500.0, 0.0)).unwrap();
        backend.cancel_scheduled_gain(filter, 0.0).unwrap();
        backend.set_gain_target(filter, 6.0, 0.0, 0.01).unwrap();
        assert_eq!(backend.filter_gain_target(filter), Some(6.0));
        assert_eq!(backend.filter_gain(filter), Some(0.0));
    }

    #[test]
    fn injected_failures_refuse_connections() {
        let mut backend = running_backend();
        let a = backend.create_filter(peaking(500.0, 0.0)).unwrap();
        let b = backend.create_filter(peaking(800.0, 0.0)).unwrap();
        backend.fail_connections_to(b).unwrap();
        assert!(backend.connect(a, b).is_err());
        backend.clear_connection_failures().unwrap();
        backend.connect(a, b).unwrap();
        assert_eq!(backend.outputs(a), vec![b]);
    }

    #[test]
    fn released_nodes_lose_their_edges() {
        let mut backend = running_backend();
        let a = backend.create_filter(peaking(500.0, 0.0)).unwrap();
        let b = backend.create_filter(peaking(800.0, 0.0)).unwrap();
        backend.connect(a, b).unwrap();
        backend.release(b).unwrap();
        assert!(backend.outputs(a).is_empty());
        assert!(backend.filter_spec(b).is_none());
    }
}
