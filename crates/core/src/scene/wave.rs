use std::f32::consts::{PI, TAU};

use rand::Rng;

use crate::{
    analysis::{average_deviation, normalize_time_sample},
    render::{DrawCommand, GradientStop, Paint, Path, Point, Shape, Style},
    scene::{advance_resetting, jitter, PhaseAccumulators, Viewport},
    theme::Palette,
};

pub const POINT_COUNT: usize = 200;
pub const ACTIVE_STEP: f32 = 0.03;
pub const IDLE_STEP: f32 = 0.01;
const VERTICAL_SCALE: f32 = 0.7;
const MIRROR_ALPHA: f32 = 0.2;
const IDLE_JITTER: f32 = 1.5;

/// Horizontal wave-start → wave-end gradient, or solid wave-start when the
/// theme turns gradients off.
pub(crate) fn wave_paint(viewport: Viewport, palette: &Palette) -> Paint {
    if palette.gradient_enabled {
        Paint::Linear {
            from: Point::new(0.0, 0.0),
            to: Point::new(viewport.width, 0.0),
            stops: vec![
                GradientStop::new(0.0, palette.wave_start),
                GradientStop::new(1.0, palette.wave_end),
            ],
        }
    } else {
        Paint::Solid(palette.wave_start)
    }
}

/// Per-point offsets from the centre line, in units of the half height.
pub fn active_values(data: &[u8], phase: f32) -> Vec<f32> {
    let stride = (data.len() / POINT_COUNT).max(1);
    let scale = (average_deviation(data) / 20.0).min(1.0);
    (0..POINT_COUNT)
        .map_while(|i| data.get(i * stride).map(|&value| (i, value)))
        .map(|(i, value)| {
            let angle = i as f32 / POINT_COUNT as f32 * TAU;
            normalize_time_sample(value) + (angle + phase).sin() * 0.3 * scale
        })
        .collect()
}

pub fn active(
    time_domain: &[u8],
    phases: &mut PhaseAccumulators,
    viewport: Viewport,
    palette: &Palette,
) -> Vec<DrawCommand> {
    advance_resetting(&mut phases.wave, ACTIVE_STEP);

    let center = viewport.height / 2.0;
    let values = active_values(time_domain, phases.wave);
    let x = |i: usize| i as f32 / POINT_COUNT as f32 * viewport.width;
    let trace = Path::polyline(
        values
            .iter()
            .enumerate()
            .map(|(i, v)| Point::new(x(i), center + v * center * VERTICAL_SCALE)),
    );
    let mirror = Path::polyline(
        values
            .iter()
            .enumerate()
            .map(|(i, v)| Point::new(x(i), center - v * center * VERTICAL_SCALE)),
    );

    let style = Style::stroke(wave_paint(viewport, palette), 3.0);
    vec![
        DrawCommand::Stroke {
            shape: Shape::Path(trace),
            style: style.clone(),
        },
        DrawCommand::Stroke {
            shape: Shape::Path(mirror),
            style: style.with_alpha(MIRROR_ALPHA),
        },
    ]
}

pub fn idle<R: Rng + ?Sized>(
    phases: &mut PhaseAccumulators,
    viewport: Viewport,
    palette: &Palette,
    rng: &mut R,
) -> Vec<DrawCommand> {
    advance_resetting(&mut phases.wave, IDLE_STEP);

    let center = viewport.height / 2.0;
    let phase = phases.wave;
    let trace = Path::polyline((0..POINT_COUNT).map(|i| {
        let t = i as f32 / POINT_COUNT as f32;
        let ripple = (t * PI * 10.0 + phase).sin() * 2.0;
        Point::new(t * viewport.width, center + jitter(&mut *rng, IDLE_JITTER) + ripple)
    }));

    vec![DrawCommand::Stroke {
        shape: Shape::Path(trace),
        style: Style::stroke(wave_paint(viewport, palette), 2.0),
    }]
}
