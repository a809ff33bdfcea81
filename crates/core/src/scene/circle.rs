use std::f32::consts::TAU;

use crate::{
    analysis::{average_level, has_time_domain_signal, normalize_time_sample},
    render::{DrawCommand, GradientStop, Paint, Path, Point, Shape, Style},
    scene::{advance_wrapping, PhaseAccumulators, Viewport},
    theme::{Color, Palette},
};

pub const SEGMENTS: usize = 100;
pub const IDLE_SEGMENTS: usize = 80;
pub const ROTATION_STEP: f32 = 0.005;
pub const PULSE_STEP: f32 = 0.01;
/// The inner ring turns at half speed, so rotation wraps after two turns.
pub const ROTATION_PERIOD: f32 = 2.0 * TAU;
/// Every idle term repeats after this many radians of pulse.
pub const PULSE_PERIOD: f32 = 10.0 * TAU;

const RING_ALPHA: f32 = 0.7;
const HIGHLIGHT: Color = Color::rgba(232, 124, 255, 0.7);
const DEEP: Color = Color::rgba(181, 58, 212, 0.5);

/// Intensity multiplier `min(1.2, 0.5 + avg / 128)`.
pub fn intensity(frequency: &[u8]) -> f32 {
    (0.5 + average_level(frequency) / 128.0).min(1.2)
}

fn ring_point(center: Point, angle: f32, radius: f32) -> Point {
    Point::new(center.x + angle.cos() * radius, center.y + angle.sin() * radius)
}

/// Samples `data` at `segments` evenly strided, wrapping indices.
fn sampled(data: &[u8], segments: usize, i: usize) -> u8 {
    if data.is_empty() {
        return 0;
    }
    let stride = data.len().div_ceil(segments);
    data[(i * stride) % data.len()]
}

/// Outer ring radii for a frequency buffer.
pub fn outer_radii(frequency: &[u8], base: f32) -> Vec<f32> {
    let intensity = intensity(frequency);
    (0..SEGMENTS)
        .map(|i| {
            let value = f32::from(sampled(frequency, SEGMENTS, i)) / 255.0;
            base * (1.0 + value * 0.5 * intensity)
        })
        .collect()
}

fn radial(center: Point, inner_radius: f32, outer_radius: f32, stops: Vec<GradientStop>) -> Paint {
    Paint::Radial {
        center,
        inner_radius,
        outer_radius,
        stops,
    }
}

pub fn active(
    frequency: &[u8],
    time_domain: &[u8],
    phases: &mut PhaseAccumulators,
    viewport: Viewport,
    palette: &Palette,
) -> Vec<DrawCommand> {
    advance_wrapping(&mut phases.rotation, ROTATION_STEP, ROTATION_PERIOD);
    let rotation = phases.rotation;

    let center = viewport.center();
    let base = center.x.min(center.y) * 0.5;
    let step = TAU / SEGMENTS as f32;

    let outer = Path::polygon(
        outer_radii(frequency, base)
            .into_iter()
            .enumerate()
            .map(|(i, radius)| ring_point(center, i as f32 * step + rotation, radius)),
    );
    let fill = radial(
        center,
        base * 0.5,
        base * 1.5,
        vec![
            GradientStop::new(0.0, palette.primary),
            GradientStop::new(0.5, palette.secondary),
            GradientStop::new(1.0, palette.tertiary),
        ],
    );

    let mut commands = vec![
        DrawCommand::Fill {
            shape: Shape::Path(outer.clone()),
            style: Style::fill(fill).with_alpha(RING_ALPHA),
        },
        DrawCommand::Stroke {
            shape: Shape::Path(outer),
            style: Style::stroke(Paint::Solid(Color::WHITE.with_alpha(0.8)), 2.0)
                .with_alpha(RING_ALPHA)
                .with_shadow(20.0, palette.wave_start),
        },
    ];

    if has_time_domain_signal(time_domain) {
        let inner_base = base * 0.4;
        let inner = Path::polygon((0..SEGMENTS).map(|i| {
            let value = normalize_time_sample(sampled(time_domain, SEGMENTS, i));
            let radius = inner_base * (1.0 + value * 0.3);
            ring_point(center, i as f32 * step - rotation * 0.5, radius)
        }));
        let fill = radial(
            center,
            0.0,
            base * 0.5,
            vec![
                GradientStop::new(0.0, Color::WHITE.with_alpha(0.9)),
                GradientStop::new(0.7, HIGHLIGHT),
                GradientStop::new(1.0, DEEP),
            ],
        );
        commands.push(DrawCommand::Fill {
            shape: Shape::Path(inner.clone()),
            style: Style::fill(fill).with_alpha(RING_ALPHA),
        });
        commands.push(DrawCommand::Stroke {
            shape: Shape::Path(inner),
            style: Style::stroke(Paint::Solid(Color::WHITE.with_alpha(0.8)), 1.0)
                .with_alpha(RING_ALPHA)
                .with_shadow(15.0, Color::WHITE),
        });
    }

    commands
}

pub fn idle(phases: &mut PhaseAccumulators, viewport: Viewport, palette: &Palette) -> Vec<DrawCommand> {
    advance_wrapping(&mut phases.idle_pulse, PULSE_STEP, PULSE_PERIOD);
    let pulse = phases.idle_pulse;

    let center = viewport.center();
    let base = center.x.min(center.y) * 0.4;
    let step = TAU / IDLE_SEGMENTS as f32;

    let breathing = pulse.sin() * 0.05 + 1.0;
    let outer = Path::polygon((0..IDLE_SEGMENTS).map(|i| {
        let angle = i as f32 * step + pulse * 0.2;
        let ripple = (angle * 6.0 + pulse).sin() * 0.03 + 1.0;
        ring_point(center, angle, base * breathing * ripple)
    }));

    let inner_radius = base * 0.5;
    let inner = Path::polygon((0..IDLE_SEGMENTS).map(|i| {
        let angle = i as f32 * step - pulse * 0.1;
        let radius = inner_radius * ((angle * 3.0 + pulse).sin() * 0.05 + 0.95);
        ring_point(center, angle, radius)
    }));

    vec![
        DrawCommand::Fill {
            shape: Shape::Path(outer.clone()),
            style: Style::fill(radial(
                center,
                base * 0.3,
                base * 1.2,
                vec![
                    GradientStop::new(0.0, palette.primary),
                    GradientStop::new(0.6, palette.secondary),
                    GradientStop::new(1.0, palette.tertiary),
                ],
            )),
        },
        DrawCommand::Stroke {
            shape: Shape::Path(outer),
            style: Style::stroke(Paint::Solid(Color::WHITE.with_alpha(0.4)), 1.0)
                .with_shadow(15.0, palette.wave_start),
        },
        DrawCommand::Fill {
            shape: Shape::Path(inner.clone()),
            style: Style::fill(radial(
                center,
                0.0,
                inner_radius,
                vec![
                    GradientStop::new(0.0, Color::WHITE.with_alpha(0.7)),
                    GradientStop::new(0.8, HIGHLIGHT.with_alpha(0.4)),
                    GradientStop::new(1.0, DEEP.with_alpha(0.2)),
                ],
            )),
        },
        DrawCommand::Stroke {
            shape: Shape::Path(inner),
            style: Style::stroke(Paint::Solid(Color::WHITE.with_alpha(0.3)), 0.5)
                .with_shadow(10.0, Color::WHITE),
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn viewport() -> Viewport {
        Viewport {
            width: 400.0,
            height: 200.0,
        }
    }

    #[test]
    fn intensity_is_capped() {
        assert_eq!(intensity(&[0; 8]), 0.5);
        assert_eq!(intensity(&[64; 8]), 1.0);
        assert_eq!(intensity(&[255; 8]), 1.2);
    }

    #[test]
    fn silent_bins_sit_on_the_base_radius() {
        let radii = outer_radii(&[0; 1024], 50.0);
        assert_eq!(radii.len(), SEGMENTS);
        assert!(radii.iter().all(|&r| r == 50.0));

        let loud = outer_radii(&[255; 1024], 50.0);
        assert!(loud.iter().all(|&r| (r - 50.0 * 1.6).abs() < 1e-4));
    }

    #[test]
    fn inner_ring_needs_time_domain_signal() {
        let mut phases = PhaseAccumulators::default();
        let quiet = active(&[100; 1024], &[128; 1024], &mut phases, viewport(), &Palette::default());
        assert_eq!(quiet.len(), 2);

        let loud = active(&[100; 1024], &[200; 1024], &mut phases, viewport(), &Palette::default());
        assert_eq!(loud.len(), 4);
        assert!((phases.rotation - 2.0 * ROTATION_STEP).abs() < 1e-6);
    }

    #[test]
    fn rotation_wraps_after_two_turns() {
        let mut phases = PhaseAccumulators {
            rotation: ROTATION_PERIOD - 0.001,
            ..Default::default()
        };
        active(&[1; 16], &[128; 16], &mut phases, viewport(), &Palette::default());
        assert!(phases.rotation < 0.01);
    }

    #[test]
    fn idle_rings_breathe_around_the_base_radius() {
        let mut phases = PhaseAccumulators::default();
        let commands = idle(&mut phases, viewport(), &Palette::default());
        assert_eq!(commands.len(), 4);

        let center = viewport().center();
        let DrawCommand::Fill {
            shape: Shape::Path(outer),
            ..
        } = &commands[0]
        else {
            panic!("expected fill");
        };
        // base = 100 * 0.4; pulse and ripple each stay within a few percent.
        for point in outer.points() {
            let radius = ((point.x - center.x).powi(2) + (point.y - center.y).powi(2)).sqrt();
            assert!((38.0..=42.5).contains(&radius), "radius {radius}");
        }
        assert!(outer.is_closed());
    }
}
