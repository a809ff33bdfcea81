//! Ten-band graphic equalizer: presets, persistence and smooth parameter
//! updates on the shared audio graph.

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::{
    audio::MediaElementId,
    graph::AudioGraphHandle,
    storage::SettingsStore,
    PlayerError, Result,
};

pub const BAND_COUNT: usize = 10;
pub const BAND_FREQUENCIES: [f32; BAND_COUNT] = [
    32.0, 64.0, 125.0, 250.0, 500.0, 1_000.0, 2_000.0, 4_000.0, 8_000.0, 16_000.0,
];
pub const MIN_GAIN_DB: f32 = -12.0;
pub const MAX_GAIN_DB: f32 = 12.0;

/// Preset name shown once any band has been edited by hand.
pub const CUSTOM_PRESET: &str = "Custom";
pub const DEFAULT_PRESET: &str = "Flat";

pub const GAINS_KEY: &str = "equalizer_gains";
pub const PRESET_KEY: &str = "equalizer_preset";
pub const ENABLED_KEY: &str = "equalizer_enabled";

pub const PRESETS: [(&str, [f32; BAND_COUNT]); 10] = [
    ("Flat", [0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0]),
    ("Pop", [-1.0, 2.0, 4.0, 4.0, 2.0, 0.0, -1.0, -1.0, -1.0, -1.0]),
    ("Rock", [3.0, 2.0, -2.0, -3.0, -1.0, 2.0, 4.0, 5.0, 5.0, 5.0]),
    ("Jazz", [2.0, 1.0, 1.0, 2.0, -2.0, -2.0, 0.0, 1.0, 2.0, 3.0]),
    ("Classical", [3.0, 2.0, -1.0, -1.0, -1.0, -1.0, -1.0, -2.0, 2.0, 3.0]),
    ("Electronic", [4.0, 3.0, 1.0, 0.0, -2.0, 2.0, 1.0, 1.0, 3.0, 4.0]),
    ("Hip Hop", [4.0, 3.0, 1.0, 2.0, -1.0, -1.0, 1.0, -1.0, 2.0, 3.0]),
    ("Vocal", [-2.0, -3.0, -2.0, 1.0, 3.0, 3.0, 2.0, 1.0, 0.0, -1.0]),
    ("Bass Boost", [6.0, 4.0, 3.0, 2.0, 1.0, 0.0, 0.0, 0.0, 0.0, 0.0]),
    ("Treble Boost", [0.0, 0.0, 0.0, 0.0, 0.0, 1.0, 2.0, 3.0, 4.0, 5.0]),
];

pub fn preset(name: &str) -> Option<[f32; BAND_COUNT]> {
    PRESETS
        .iter()
        .find(|(preset, _)| *preset == name)
        .map(|(_, gains)| *gains)
}

pub fn preset_names() -> impl Iterator<Item = &'static str> {
    PRESETS.iter().map(|(name, _)| *name)
}

/// `32Hz`, `500Hz`, `1kHz`, `2.0kHz`, `16.0kHz`.
pub fn frequency_label(frequency: f32) -> String {
    if frequency >= 1_000.0 {
        let khz = frequency / 1_000.0;
        if frequency == 1_000.0 {
            format!("{khz:.0}kHz")
        } else {
            format!("{khz:.1}kHz")
        }
    } else {
        format!("{frequency:.0}Hz")
    }
}

/// `+2.5dB`, `0.0dB`, `-3.0dB`.
pub fn gain_label(gain: f32) -> String {
    let sign = if gain > 0.0 { "+" } else { "" };
    format!("{sign}{gain:.1}dB")
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EqualizerState {
    pub gains: [f32; BAND_COUNT],
    pub selected_preset: String,
    pub enabled: bool,
}

impl Default for EqualizerState {
    fn default() -> Self {
        Self {
            gains: [0.0; BAND_COUNT],
            selected_preset: DEFAULT_PRESET.to_string(),
            enabled: true,
        }
    }
}

impl EqualizerState {
    /// Gains actually applied to the filters: all zero while disabled.
    pub fn effective_gains(&self) -> [f32; BAND_COUNT] {
        if self.enabled {
            self.gains
        } else {
            [0.0; BAND_COUNT]
        }
    }

    /// Reads the persisted state. Missing or malformed entries fall back to
    /// their defaults individually.
    pub fn restore(store: &dyn SettingsStore) -> Self {
        let mut state = Self::default();

        match store.get(GAINS_KEY) {
            Ok(Some(raw)) => match serde_json::from_str::<Vec<f32>>(&raw) {
                Ok(saved) if saved.len() == BAND_COUNT => {
                    for (slot, gain) in state.gains.iter_mut().zip(saved) {
                        *slot = clamp_gain(gain);
                    }
                }
                Ok(saved) => warn!(bands = saved.len(), "ignoring saved gains with wrong band count"),
                Err(err) => warn!(%err, "error parsing saved equalizer gains"),
            },
            Ok(None) => {}
            Err(err) => warn!(%err, "failed to read saved equalizer gains"),
        }

        match store.get(PRESET_KEY) {
            Ok(Some(name)) if name == CUSTOM_PRESET || preset(&name).is_some() => {
                state.selected_preset = name;
            }
            Ok(Some(name)) => warn!(preset = %name, "ignoring unknown saved preset"),
            Ok(None) => {}
            Err(err) => warn!(%err, "failed to read saved equalizer preset"),
        }

        match store.get(ENABLED_KEY) {
            Ok(Some(raw)) => match raw.as_str() {
                "true" => state.enabled = true,
                "false" => state.enabled = false,
                other => warn!(value = other, "ignoring malformed equalizer flag"),
            },
            Ok(None) => {}
            Err(err) => warn!(%err, "failed to read saved equalizer flag"),
        }

        state
    }

    fn persist(&self, store: &mut dyn SettingsStore) -> Result<()> {
        let gains = serde_json::to_string(&self.gains.to_vec())?;
        store.set(GAINS_KEY, &gains)?;
        store.set(PRESET_KEY, &self.selected_preset)?;
        store.set(ENABLED_KEY, if self.enabled { "true" } else { "false" })
    }
}

fn clamp_gain(gain: f32) -> f32 {
    if gain.is_finite() {
        gain.clamp(MIN_GAIN_DB, MAX_GAIN_DB)
    } else {
        0.0
    }
}

/// Notification sent to listeners after every change.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EqualizerChange {
    pub gains: [f32; BAND_COUNT],
    pub enabled: bool,
}

type ChangeListener = Box<dyn FnMut(&EqualizerChange) + Send>;

/// User-facing equalizer. Every change is persisted, forwarded to the
/// shared graph (once attached) and broadcast to listeners.
pub struct EqualizerController<S: SettingsStore> {
    graph: AudioGraphHandle,
    store: S,
    state: EqualizerState,
    attached: bool,
    listeners: Vec<ChangeListener>,
}

impl<S: SettingsStore> EqualizerController<S> {
    pub fn new(graph: AudioGraphHandle, store: S) -> Self {
        let state = EqualizerState::restore(&store);
        debug!(preset = %state.selected_preset, enabled = state.enabled, "restored equalizer state");
        Self {
            graph,
            store,
            state,
            attached: false,
            listeners: Vec::new(),
        }
    }

    pub fn state(&self) -> &EqualizerState {
        &self.state
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn is_attached(&self) -> bool {
        self.attached
    }

    /// Builds the filter chain for `element` on the shared graph, seeded
    /// with the stored gains.
    pub fn attach(&mut self, element: &MediaElementId) -> Result<()> {
        let mut graph = self.graph.lock()?;
        if self.attached && graph.element() == Some(element) && graph.filters().len() == BAND_COUNT {
            return Ok(());
        }

        graph.initialize(element)?;
        if !graph.is_ready() {
            error!(%element, "audio graph is not ready for the equalizer");
            return Err(PlayerError::NotInitialised);
        }

        let gains = self.state.effective_gains();
        graph.create_equalizer(&BAND_FREQUENCIES, &gains)?;
        self.attached = true;
        info!(%element, preset = %self.state.selected_preset, "equalizer attached");
        Ok(())
    }

    pub fn set_gain(&mut self, band: usize, value: f32) -> Result<()> {
        if band >= BAND_COUNT {
            return Err(PlayerError::invalid(format!("band {band} out of range 0..{BAND_COUNT}")));
        }
        if !value.is_finite() {
            return Err(PlayerError::invalid(format!("gain for band {band} is not a number")));
        }

        self.state.gains[band] = value.clamp(MIN_GAIN_DB, MAX_GAIN_DB);
        self.state.selected_preset = CUSTOM_PRESET.to_string();
        self.commit()
    }

    pub fn apply_preset(&mut self, name: &str) -> Result<()> {
        let gains = preset(name).ok_or_else(|| PlayerError::invalid(format!("unknown preset `{name}`")))?;
        self.state.gains = gains;
        self.state.selected_preset = name.to_string();
        debug!(preset = name, "applied equalizer preset");
        self.commit()
    }

    pub fn reset(&mut self) -> Result<()> {
        self.apply_preset(DEFAULT_PRESET)
    }

    /// Flips the enabled flag and returns the new value. Stored gains are
    /// kept so re-enabling restores them.
    pub fn toggle_enabled(&mut self) -> Result<bool> {
        self.state.enabled = !self.state.enabled;
        self.commit()?;
        Ok(self.state.enabled)
    }

    pub fn set_enabled(&mut self, enabled: bool) -> Result<()> {
        if self.state.enabled == enabled {
            return Ok(());
        }
        self.state.enabled = enabled;
        self.commit()
    }

    pub fn on_change(&mut self, listener: impl FnMut(&EqualizerChange) + Send + 'static) {
        self.listeners.push(Box::new(listener));
    }

    fn commit(&mut self) -> Result<()> {
        let persisted = self.state.persist(&mut self.store);
        if let Err(err) = &persisted {
            error!(%err, "failed to persist equalizer state");
        }

        if self.attached {
            let mut graph = self.graph.lock()?;
            graph.update_equalizer(&self.state.gains, self.state.enabled);
        }

        let change = EqualizerChange {
            gains: self.state.gains,
            enabled: self.state.enabled,
        };
        for listener in &mut self.listeners {
            listener(&change);
        }
        persisted
    }
}

impl<S: SettingsStore> std::fmt::Debug for EqualizerController<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EqualizerController")
            .field("state", &self.state)
            .field("attached", &self.attached)
            .field("listeners", &self.listeners.len())
            .finish()
    }
}
