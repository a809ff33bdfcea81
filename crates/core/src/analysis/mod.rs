use std::{f32::consts::PI, fmt, sync::Arc};

use realfft::{num_complex::Complex32, RealFftPlanner, RealToComplex};

use crate::{audio::AnalyserSpec, PlayerError, Result};

/// Centre value of unsigned 8-bit time-domain samples.
pub const TIME_DOMAIN_CENTER: u8 = 128;
/// Deviation from the centre a time-domain sample needs to count as signal.
pub const TIME_DOMAIN_THRESHOLD: i16 = 2;

const MIN_FFT_SIZE: usize = 32;
const MAX_FFT_SIZE: usize = 32_768;

/// Returns `true` when any frequency bin carries energy.
pub fn has_frequency_signal(data: &[u8]) -> bool {
    data.iter().any(|&value| value > 0)
}

/// Returns `true` when any time-domain sample strays more than
/// [`TIME_DOMAIN_THRESHOLD`] from the centre line.
pub fn has_time_domain_signal(data: &[u8]) -> bool {
    data.iter()
        .any(|&value| (i16::from(value) - i16::from(TIME_DOMAIN_CENTER)).abs() > TIME_DOMAIN_THRESHOLD)
}

/// Mean absolute distance of time-domain samples from the centre line.
pub fn average_deviation(data: &[u8]) -> f32 {
    if data.is_empty() {
        return 0.0;
    }
    let total: u32 = data
        .iter()
        .map(|&value| u32::from(value.abs_diff(TIME_DOMAIN_CENTER)))
        .sum();
    total as f32 / data.len() as f32
}

/// Mean byte value of a frequency buffer.
pub fn average_level(data: &[u8]) -> f32 {
    if data.is_empty() {
        return 0.0;
    }
    let total: u32 = data.iter().map(|&value| u32::from(value)).sum();
    total as f32 / data.len() as f32
}

/// Maps an unsigned time-domain sample to the range [-1, 1).
pub fn normalize_time_sample(value: u8) -> f32 {
    (f32::from(value) - f32::from(TIME_DOMAIN_CENTER)) / 128.0
}

/// DSP behind the analysis node: keeps the most recent `fft_size` samples
/// and produces byte-scaled spectra and waveforms on request.
///
/// Spectra use a Blackman window, magnitude normalised by the FFT size,
/// exponential smoothing across snapshots and a linear mapping of the
/// `[min_decibels, max_decibels]` range onto 0..=255.
pub struct AnalyserCore {
    spec: AnalyserSpec,
    history: Vec<f32>,
    write_index: usize,
    window: Vec<f32>,
    smoothed: Vec<f32>,
    bytes: Vec<u8>,
    stale: bool,
    fft_planner: RealFftPlanner<f32>,
    fft: Option<FftResources>,
}

impl AnalyserCore {
    pub fn new(spec: AnalyserSpec) -> Result<Self> {
        if !spec.fft_size.is_power_of_two() || !(MIN_FFT_SIZE..=MAX_FFT_SIZE).contains(&spec.fft_size) {
            return Err(PlayerError::invalid(format!(
                "analyser window must be a power of two in {MIN_FFT_SIZE}..={MAX_FFT_SIZE}, got {}",
                spec.fft_size
            )));
        }
        if !(0.0..=1.0).contains(&spec.smoothing) {
            return Err(PlayerError::invalid("analyser smoothing must lie in [0, 1]"));
        }
        if spec.min_decibels >= spec.max_decibels {
            return Err(PlayerError::invalid("analyser decibel range is empty"));
        }

        let bins = spec.frequency_bin_count();
        Ok(Self {
            spec,
            history: vec![0.0; spec.fft_size],
            write_index: 0,
            window: blackman_window(spec.fft_size),
            smoothed: vec![0.0; bins],
            bytes: vec![0; bins],
            stale: true,
            fft_planner: RealFftPlanner::new(),
            fft: None,
        })
    }

    pub fn spec(&self) -> AnalyserSpec {
        self.spec
    }

    pub fn frequency_bin_count(&self) -> usize {
        self.spec.frequency_bin_count()
    }

    /// Appends samples flowing through the node.
    pub fn push(&mut self, samples: &[f32]) {
        if samples.is_empty() {
            return;
        }
        let len = self.history.len();
        for &sample in samples {
            self.history[self.write_index] = sample;
            self.write_index = (self.write_index + 1) % len;
        }
        self.stale = true;
    }

    /// Oldest-first copy of the analysis window.
    fn window_samples(&self) -> impl Iterator<Item = f32> + '_ {
        self.history[self.write_index..]
            .iter()
            .chain(self.history[..self.write_index].iter())
            .copied()
    }

    pub fn byte_time_domain_data(&self, out: &mut [u8]) {
        for (slot, sample) in out.iter_mut().zip(self.window_samples()) {
            let scaled = 128.0 * (1.0 + sample);
            *slot = scaled.floor().clamp(0.0, 255.0) as u8;
        }
    }

    pub fn byte_frequency_data(&mut self, out: &mut [u8]) -> Result<()> {
        if self.stale {
            self.refresh_spectrum()?;
            self.stale = false;
        }
        let count = out.len().min(self.bytes.len());
        out[..count].copy_from_slice(&self.bytes[..count]);
        Ok(())
    }

    fn refresh_spectrum(&mut self) -> Result<()> {
        let size = self.spec.fft_size;
        let bins = self.smoothed.len();
        let windowed: Vec<f32> = self
            .window_samples()
            .zip(self.window.iter())
            .map(|(sample, weight)| sample * weight)
            .collect();

        let fft = self.prepare_fft(size);
        fft.input.copy_from_slice(&windowed);
        fft.plan
            .process_with_scratch(&mut fft.input, &mut fft.spectrum, &mut fft.scratch)
            .map_err(|err| PlayerError::msg(format!("analyser FFT failed: {err}")))?;
        let scale = 1.0 / size as f32;
        let magnitudes: Vec<f32> = fft
            .spectrum
            .iter()
            .take(bins)
            .map(|value| value.norm() * scale)
            .collect();

        let smoothing = self.spec.smoothing;
        let min_decibels = self.spec.min_decibels;
        let range = self.spec.max_decibels - min_decibels;
        for (bin, magnitude) in magnitudes.into_iter().enumerate() {
            let smoothed = smoothing * self.smoothed[bin] + (1.0 - smoothing) * magnitude;
            self.smoothed[bin] = if smoothed.is_finite() { smoothed } else { 0.0 };

            let decibels = 20.0 * self.smoothed[bin].log10();
            let byte = 255.0 / range * (decibels - min_decibels);
            self.bytes[bin] = if byte.is_finite() {
                byte.floor().clamp(0.0, 255.0) as u8
            } else {
                0
            };
        }
        Ok(())
    }

    fn prepare_fft(&mut self, size: usize) -> &mut FftResources {
        if self.fft.as_ref().map_or(false, |fft| fft.size != size) {
            self.fft = None;
        }

        let planner = &mut self.fft_planner;
        self.fft.get_or_insert_with(|| {
            let plan = planner.plan_fft_forward(size);
            let scratch = plan.make_scratch_vec();
            let spectrum = plan.make_output_vec();
            let input = plan.make_input_vec();
            FftResources {
                size,
                plan,
                scratch,
                spectrum,
                input,
            }
        })
    }
}

struct FftResources {
    size: usize,
    plan: Arc<dyn RealToComplex<f32>>,
    scratch: Vec<Complex32>,
    spectrum: Vec<Complex32>,
    input: Vec<f32>,
}

impl fmt::Debug for AnalyserCore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnalyserCore")
            .field("spec", &self.spec)
            .field("write_index", &self.write_index)
            .field("stale", &self.stale)
            .finish()
    }
}

impl fmt::Debug for FftResources {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FftResources")
            .field("size", &self.size)
            .finish()
    }
}

fn blackman_window(len: usize) -> Vec<f32> {
    const ALPHA: f32 = 0.16;
    let a0 = 0.5 * (1.0 - ALPHA);
    let a1 = 0.5;
    let a2 = 0.5 * ALPHA;
    (0..len)
        .map(|n| {
            let phase = 2.0 * PI * n as f32 / len as f32;
            a0 - a1 * phase.cos() + a2 * (2.0 * phase).cos()
        })
        .collect()
}
