use std::f32::consts::PI;

use rand::Rng;

use crate::{
    analysis::{average_deviation, normalize_time_sample},
    render::{DrawCommand, GradientStop, Paint, Path, Point, Shape, Style},
    scene::{advance_resetting, jitter, wave::wave_paint, PhaseAccumulators, Viewport},
    theme::{Color, Palette},
};

pub const MAX_POINTS: usize = 512;
pub const IDLE_POINTS: usize = 200;
pub const IDLE_STEP: f32 = 0.01;
const VERTICAL_SCALE: f32 = 0.7;
const IDLE_JITTER: f32 = 1.5;

/// Amplitude gain `1 + min(0.5, avgDev / 30)`.
pub fn amplitude_scale(data: &[u8]) -> f32 {
    1.0 + (average_deviation(data) / 30.0).min(0.5)
}

pub fn active(time_domain: &[u8], viewport: Viewport, palette: &Palette) -> Vec<DrawCommand> {
    let center = viewport.height / 2.0;
    let points = time_domain.len().min(MAX_POINTS);
    if points == 0 {
        return Vec::new();
    }
    let stride = (time_domain.len() / points).max(1);
    let scale = amplitude_scale(time_domain);

    let trace = Path::polyline((0..points).map_while(|i| {
        let value = *time_domain.get(i * stride)?;
        let offset = normalize_time_sample(value) * scale;
        Some(Point::new(
            i as f32 / points as f32 * viewport.width,
            center + offset * center * VERTICAL_SCALE,
        ))
    }));

    let glow = Style::stroke(Paint::Solid(Color::WHITE.with_alpha(0.5)), 1.0)
        .with_shadow(10.0, palette.wave_start);
    vec![
        DrawCommand::Stroke {
            shape: Shape::Path(trace.clone()),
            style: Style::stroke(wave_paint(viewport, palette), 3.0),
        },
        DrawCommand::Stroke {
            shape: Shape::Path(trace),
            style: glow,
        },
    ]
}

fn idle_trace<R: Rng + ?Sized>(phase: f32, viewport: Viewport, rng: &mut R) -> Path {
    let center = viewport.height / 2.0;
    Path::polyline((0..IDLE_POINTS).map(|i| {
        let t = i as f32 / IDLE_POINTS as f32;
        let ripple = (t * PI * 12.0 + phase).sin() * 1.5;
        Point::new(t * viewport.width, center + jitter(&mut *rng, IDLE_JITTER) + ripple)
    }))
}

pub fn idle<R: Rng + ?Sized>(
    phases: &mut PhaseAccumulators,
    viewport: Viewport,
    palette: &Palette,
    rng: &mut R,
) -> Vec<DrawCommand> {
    advance_resetting(&mut phases.wave, IDLE_STEP);

    let paint = Paint::Linear {
        from: Point::new(0.0, 0.0),
        to: Point::new(viewport.width, 0.0),
        stops: vec![
            GradientStop::new(0.0, palette.wave_start),
            GradientStop::new(0.5, palette.wave_end),
            GradientStop::new(1.0, palette.primary),
        ],
    };
    let glow = Style::stroke(Paint::Solid(Color::WHITE.with_alpha(0.4)), 1.5)
        .with_shadow(5.0, palette.wave_start);

    // The glow gets its own jitter, so it shimmers around the main trace.
    vec![
        DrawCommand::Stroke {
            shape: Shape::Path(idle_trace(phases.wave, viewport, rng)),
            style: Style::stroke(paint, 2.0),
        },
        DrawCommand::Stroke {
            shape: Shape::Path(idle_trace(phases.wave, viewport, rng)),
            style: glow,
        },
    ]
}
