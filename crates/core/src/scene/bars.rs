use std::f32::consts::{PI, TAU};

use crate::{
    render::{DrawCommand, GradientStop, Paint, Point, Shape, Style},
    scene::{advance_wrapping, PhaseAccumulators, Viewport},
    theme::Palette,
};

pub const BAR_COUNT: usize = 64;
pub const BAR_SPACING: f32 = 2.0;
pub const IDLE_STEP: f32 = 0.05;
pub const IDLE_MAX_HEIGHT: f32 = 10.0;

pub fn bar_width(viewport: Viewport) -> f32 {
    ((viewport.width - BAR_COUNT as f32 * BAR_SPACING) / BAR_COUNT as f32).max(0.0)
}

/// Bar heights for a frequency buffer: `(v / 255)^1.5 × height`, sampling
/// every `max(1, len / 64)`-th bin. Bars past the end of short buffers are
/// omitted.
pub fn active_heights(data: &[u8], height: f32) -> Vec<f32> {
    let stride = (data.len() / BAR_COUNT).max(1);
    (0..BAR_COUNT)
        .map_while(|i| data.get(i * stride))
        .map(|&value| (f32::from(value) / 255.0).powf(1.5) * height)
        .collect()
}

/// Travelling sine over two periods of the bar row.
pub fn idle_heights(phase: f32) -> [f32; BAR_COUNT] {
    let mut heights = [0.0; BAR_COUNT];
    for (i, height) in heights.iter_mut().enumerate() {
        let offset = i as f32 / BAR_COUNT as f32 * PI * 4.0;
        *height = ((offset + phase).sin() * 0.5 + 0.5) * IDLE_MAX_HEIGHT;
    }
    heights
}

fn bar_paint(viewport: Viewport, palette: &Palette) -> Paint {
    Paint::Linear {
        from: Point::new(0.0, viewport.height),
        to: Point::new(0.0, 0.0),
        stops: vec![
            GradientStop::new(0.0, palette.bar_start),
            GradientStop::new(0.3, palette.bar_end),
            GradientStop::new(0.6, palette.secondary),
            GradientStop::new(1.0, palette.tertiary),
        ],
    }
}

fn bars_from_heights(heights: &[f32], viewport: Viewport, palette: &Palette) -> Vec<DrawCommand> {
    let width = bar_width(viewport);
    let style = Style::fill(bar_paint(viewport, palette));
    heights
        .iter()
        .enumerate()
        .map(|(i, &height)| DrawCommand::Fill {
            shape: Shape::RoundedBar {
                x: i as f32 * (width + BAR_SPACING),
                y: viewport.height - height,
                width,
                height,
                radius: width / 2.0,
            },
            style: style.clone(),
        })
        .collect()
}

pub fn active(frequency: &[u8], viewport: Viewport, palette: &Palette) -> Vec<DrawCommand> {
    bars_from_heights(&active_heights(frequency, viewport.height), viewport, palette)
}

pub fn idle(phases: &mut PhaseAccumulators, viewport: Viewport, palette: &Palette) -> Vec<DrawCommand> {
    advance_wrapping(&mut phases.bars_idle, IDLE_STEP, TAU);
    bars_from_heights(&idle_heights(phases.bars_idle), viewport, palette)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heights_follow_the_power_curve() {
        let mut data = vec![0u8; 1024];
        data[0] = 255;
        data[16] = 128;
        let heights = active_heights(&data, 200.0);

        assert_eq!(heights.len(), BAR_COUNT);
        assert_eq!(heights[0], 200.0);
        let expected = (128.0f32 / 255.0).powf(1.5) * 200.0;
        assert!((heights[1] - expected).abs() < 1e-4);
        assert!(heights[2..].iter().all(|&h| h == 0.0));
    }

    #[test]
    fn short_buffers_use_stride_one() {
        let heights = active_heights(&[255, 255, 0], 10.0);
        assert_eq!(heights, vec![10.0, 10.0, 0.0]);
    }

    #[test]
    fn idle_pattern_is_a_travelling_sine() {
        let heights = idle_heights(0.0);
        assert!((heights[0] - 5.0).abs() < 1e-5);
        // Quarter period of the first of two cycles.
        assert!((heights[8] - 10.0).abs() < 1e-4);
        assert!(heights.iter().all(|&h| (0.0..=10.0).contains(&h)));

        let shifted = idle_heights(0.05);
        assert!(shifted[0] > heights[0]);
    }

    #[test]
    fn bars_have_rounded_tops_and_fixed_spacing() {
        let viewport = Viewport {
            width: 640.0,
            height: 100.0,
        };
        let commands = active(&[255; 64], viewport, &Palette::default());
        assert_eq!(commands.len(), BAR_COUNT);
        let DrawCommand::Fill {
            shape:
                Shape::RoundedBar {
                    x, y, width, radius, ..
                },
            ..
        } = &commands[1]
        else {
            panic!("expected a bar");
        };
        assert_eq!(*width, 8.0);
        assert_eq!(*radius, 4.0);
        assert_eq!(*x, 10.0);
        assert_eq!(*y, 0.0);
    }

    #[test]
    fn idle_advances_its_phase() {
        let mut phases = PhaseAccumulators::default();
        let viewport = Viewport {
            width: 640.0,
            height: 100.0,
        };
        idle(&mut phases, viewport, &Palette::default());
        idle(&mut phases, viewport, &Palette::default());
        assert!((phases.bars_idle - 0.1).abs() < 1e-6);
    }
}
