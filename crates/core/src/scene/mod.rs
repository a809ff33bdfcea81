//! Procedural visualizer scenes.
//!
//! Each mode has an active variant driven by analyser data and an idle
//! variant that animates on its own. Renderers are pure: they read the
//! buffers, advance their phase accumulator and return draw commands.

use std::{f32::consts::TAU, fmt, str::FromStr};

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::{
    analysis::{has_frequency_signal, has_time_domain_signal},
    render::{DrawCommand, Point, Surface, SurfaceSize},
    theme::Palette,
    PlayerError, Result,
};

pub mod bars;
pub mod circle;
pub mod wave;
pub mod wave_centered;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum VisualizerMode {
    #[default]
    Bars,
    Wave,
    WaveCentered,
    Circle,
}

impl VisualizerMode {
    pub const ALL: [VisualizerMode; 4] = [Self::Bars, Self::Wave, Self::WaveCentered, Self::Circle];

    pub fn key(self) -> &'static str {
        match self {
            Self::Bars => "bars",
            Self::Wave => "wave",
            Self::WaveCentered => "waveCentered",
            Self::Circle => "circle",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Bars => "Bars",
            Self::Wave => "Wave",
            Self::WaveCentered => "Centered Wave",
            Self::Circle => "Circle",
        }
    }

    /// Cycles through the modes in display order.
    pub fn next(self) -> Self {
        match self {
            Self::Bars => Self::Wave,
            Self::Wave => Self::WaveCentered,
            Self::WaveCentered => Self::Circle,
            Self::Circle => Self::Bars,
        }
    }

    /// Whether this mode's active variant has something to show.
    pub fn shows_signal(self, frequency: &[u8], time_domain: &[u8]) -> bool {
        match self {
            Self::Bars => has_frequency_signal(frequency),
            Self::Wave | Self::WaveCentered => has_time_domain_signal(time_domain),
            Self::Circle => has_frequency_signal(frequency) || has_time_domain_signal(time_domain),
        }
    }
}

impl fmt::Display for VisualizerMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for VisualizerMode {
    type Err = PlayerError;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().replace(['-', '_'], "").as_str() {
            "bars" => Ok(Self::Bars),
            "wave" => Ok(Self::Wave),
            "wavecentered" | "centered" => Ok(Self::WaveCentered),
            "circle" => Ok(Self::Circle),
            _ => Err(PlayerError::invalid(format!("unknown visualizer mode `{value}`"))),
        }
    }
}

/// Counters advanced once per rendered frame. They persist across frames
/// and are reset only on teardown.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PhaseAccumulators {
    pub bars_idle: f32,
    pub wave: f32,
    pub rotation: f32,
    pub idle_pulse: f32,
}

impl PhaseAccumulators {
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Adds `step` and wraps into `[0, period)`.
pub(crate) fn advance_wrapping(phase: &mut f32, step: f32, period: f32) {
    *phase = (*phase + step).rem_euclid(period);
}

/// Adds `step` and snaps back to zero once past a full turn.
pub(crate) fn advance_resetting(phase: &mut f32, step: f32) {
    *phase += step;
    if *phase > TAU {
        *phase = 0.0;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Activity {
    Active,
    Idle,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VisualizationState {
    pub mode: VisualizerMode,
    pub frequency: Vec<u8>,
    pub time_domain: Vec<u8>,
    pub phases: PhaseAccumulators,
}

impl VisualizationState {
    pub fn new(mode: VisualizerMode) -> Self {
        Self {
            mode,
            frequency: Vec::new(),
            time_domain: Vec::new(),
            phases: PhaseAccumulators::default(),
        }
    }

    /// Sizes both buffers to the analyser's bin count. Time-domain samples
    /// start on the centre line.
    pub fn resize(&mut self, bins: usize) {
        self.frequency.resize(bins, 0);
        self.time_domain.resize(bins, 128);
    }

    pub fn signal_present(&self) -> bool {
        self.mode.shows_signal(&self.frequency, &self.time_domain)
    }
}

/// Dimensions the renderers lay out against, in CSS pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub width: f32,
    pub height: f32,
}

impl Viewport {
    pub fn center(&self) -> Point {
        Point::new(self.width / 2.0, self.height / 2.0)
    }
}

impl From<SurfaceSize> for Viewport {
    fn from(size: SurfaceSize) -> Self {
        Self {
            width: size.css_width,
            height: size.css_height,
        }
    }
}

/// Uniform jitter in `[-amount / 2, amount / 2)`.
pub(crate) fn jitter<R: Rng + ?Sized>(rng: &mut R, amount: f32) -> f32 {
    (rng.gen::<f32>() - 0.5) * amount
}

/// Clears the surface and draws one frame of the current mode.
pub fn render_frame<S, R>(
    state: &mut VisualizationState,
    activity: Activity,
    palette: &Palette,
    surface: &mut S,
    rng: &mut R,
) -> Result<()>
where
    S: Surface + ?Sized,
    R: Rng + ?Sized,
{
    let viewport = Viewport::from(surface.client_size());
    surface.draw(DrawCommand::Clear {
        width: viewport.width,
        height: viewport.height,
    })?;

    let phases = &mut state.phases;
    let commands = match (state.mode, activity) {
        (VisualizerMode::Bars, Activity::Active) => bars::active(&state.frequency, viewport, palette),
        (VisualizerMode::Bars, Activity::Idle) => bars::idle(phases, viewport, palette),
        (VisualizerMode::Wave, Activity::Active) => wave::active(&state.time_domain, phases, viewport, palette),
        (VisualizerMode::Wave, Activity::Idle) => wave::idle(phases, viewport, palette, rng),
        (VisualizerMode::WaveCentered, Activity::Active) => {
            wave_centered::active(&state.time_domain, viewport, palette)
        }
        (VisualizerMode::WaveCentered, Activity::Idle) => wave_centered::idle(phases, viewport, palette, rng),
        (VisualizerMode::Circle, Activity::Active) => {
            circle::active(&state.frequency, &state.time_domain, phases, viewport, palette)
        }
        (VisualizerMode::Circle, Activity::Idle) => circle::idle(phases, viewport, palette),
    };

    for command in commands {
        surface.draw(command)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use rand::{rngs::StdRng, SeedableRng};

    use super::*;
    use crate::render::RecordingSurface;

    #[test]
    fn modes_parse_from_keys_and_labels() {
        for mode in VisualizerMode::ALL {
            assert_eq!(mode.key().parse::<VisualizerMode>().unwrap(), mode);
        }
        assert_eq!("wave-centered".parse::<VisualizerMode>().unwrap(), VisualizerMode::WaveCentered);
        assert!("spiral".parse::<VisualizerMode>().is_err());
        assert_eq!(VisualizerMode::Circle.next(), VisualizerMode::Bars);
    }

    #[test]
    fn signal_test_depends_on_mode() {
        let silent_freq = vec![0u8; 8];
        let quiet_time = vec![129u8; 8];
        let loud_time = vec![131u8; 8];

        assert!(!VisualizerMode::Bars.shows_signal(&silent_freq, &loud_time));
        assert!(!VisualizerMode::Wave.shows_signal(&[1], &quiet_time));
        assert!(VisualizerMode::WaveCentered.shows_signal(&silent_freq, &loud_time));
        assert!(VisualizerMode::Circle.shows_signal(&[0, 1], &quiet_time));
    }

    #[test]
    fn wrapping_keeps_phase_in_range() {
        let mut phase = TAU - 0.01;
        advance_wrapping(&mut phase, 0.05, TAU);
        assert!((phase - 0.04).abs() < 1e-5);

        let mut wave = TAU - 0.01;
        advance_resetting(&mut wave, 0.03);
        assert_eq!(wave, 0.0);
    }

    #[test]
    fn every_frame_starts_with_a_clear() {
        let palette = Palette::default();
        let mut surface = RecordingSurface::new(320.0, 160.0, 1.0);
        let mut rng = StdRng::seed_from_u64(7);

        for mode in VisualizerMode::ALL {
            let mut state = VisualizationState::new(mode);
            state.resize(1024);
            for activity in [Activity::Idle, Activity::Active] {
                render_frame(&mut state, activity, &palette, &mut surface, &mut rng).unwrap();
                assert!(matches!(surface.commands()[0], DrawCommand::Clear { .. }));
                assert!(surface.commands().len() > 1, "{mode} {activity:?} drew nothing");
            }
        }
    }
}
