//! Retained 2D drawing primitives and the surface the visualizer draws into.
//!
//! Renderers emit [`DrawCommand`]s in CSS pixel space. A [`Surface`] consumes
//! them; [`RecordingSurface`] simply keeps the display list of the current
//! frame so it can be inspected or serialized.

use serde::{Deserialize, Serialize};

use crate::{theme::Color, PlayerError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum PathSegment {
    MoveTo(Point),
    LineTo(Point),
    Close,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Path {
    pub segments: Vec<PathSegment>,
}

impl Path {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open polyline through `points`.
    pub fn polyline(points: impl IntoIterator<Item = Point>) -> Self {
        let mut path = Self::new();
        for point in points {
            path.push(point);
        }
        path
    }

    /// Closed polygon through `points`.
    pub fn polygon(points: impl IntoIterator<Item = Point>) -> Self {
        let mut path = Self::polyline(points);
        if !path.segments.is_empty() {
            path.segments.push(PathSegment::Close);
        }
        path
    }

    /// Moves to the first point, then draws lines to every following one.
    pub fn push(&mut self, point: Point) {
        if self.segments.is_empty() {
            self.segments.push(PathSegment::MoveTo(point));
        } else {
            self.segments.push(PathSegment::LineTo(point));
        }
    }

    pub fn points(&self) -> impl Iterator<Item = Point> + '_ {
        self.segments.iter().filter_map(|segment| match segment {
            PathSegment::MoveTo(p) | PathSegment::LineTo(p) => Some(*p),
            PathSegment::Close => None,
        })
    }

    pub fn is_closed(&self) -> bool {
        matches!(self.segments.last(), Some(PathSegment::Close))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Shape {
    Path(Path),
    /// Rectangle whose two top corners are rounded with `radius`.
    RoundedBar {
        x: f32,
        y: f32,
        width: f32,
        height: f32,
        radius: f32,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GradientStop {
    pub offset: f32,
    pub color: Color,
}

impl GradientStop {
    pub const fn new(offset: f32, color: Color) -> Self {
        Self { offset, color }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Paint {
    Solid(Color),
    Linear {
        from: Point,
        to: Point,
        stops: Vec<GradientStop>,
    },
    Radial {
        center: Point,
        inner_radius: f32,
        outer_radius: f32,
        stops: Vec<GradientStop>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Shadow {
    pub blur: f32,
    pub color: Color,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Style {
    pub paint: Paint,
    /// Global alpha multiplied into the paint.
    pub alpha: f32,
    pub line_width: f32,
    pub shadow: Option<Shadow>,
}

impl Style {
    pub fn fill(paint: Paint) -> Self {
        Self {
            paint,
            alpha: 1.0,
            line_width: 1.0,
            shadow: None,
        }
    }

    pub fn stroke(paint: Paint, line_width: f32) -> Self {
        Self {
            line_width,
            ..Self::fill(paint)
        }
    }

    pub fn with_alpha(mut self, alpha: f32) -> Self {
        self.alpha = alpha;
        self
    }

    pub fn with_shadow(mut self, blur: f32, color: Color) -> Self {
        self.shadow = Some(Shadow { blur, color });
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "camelCase")]
pub enum DrawCommand {
    Clear { width: f32, height: f32 },
    Fill { shape: Shape, style: Style },
    Stroke { shape: Shape, style: Style },
}

/// Layout size of a surface in CSS pixels plus the display's pixel ratio.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SurfaceSize {
    pub css_width: f32,
    pub css_height: f32,
    pub device_pixel_ratio: f32,
}

impl SurfaceSize {
    /// Backing store dimensions: `css size × device pixel ratio`.
    pub fn backing(&self) -> (u32, u32) {
        let ratio = if self.device_pixel_ratio > 0.0 {
            self.device_pixel_ratio
        } else {
            1.0
        };
        (
            (self.css_width * ratio).round().max(0.0) as u32,
            (self.css_height * ratio).round().max(0.0) as u32,
        )
    }
}

pub trait Surface {
    fn client_size(&self) -> SurfaceSize;
    fn resize_backing(&mut self, width: u32, height: u32);
    fn draw(&mut self, command: DrawCommand) -> Result<()>;
}

/// Keeps the display list of the frame currently being drawn. A `Clear`
/// starts a new frame.
#[derive(Debug, Clone, Default)]
pub struct RecordingSurface {
    size: Option<SurfaceSize>,
    backing: (u32, u32),
    commands: Vec<DrawCommand>,
    frames: u64,
    fail_next_draw: bool,
}

impl RecordingSurface {
    pub fn new(css_width: f32, css_height: f32, device_pixel_ratio: f32) -> Self {
        Self {
            size: Some(SurfaceSize {
                css_width,
                css_height,
                device_pixel_ratio,
            }),
            ..Self::default()
        }
    }

    pub fn commands(&self) -> &[DrawCommand] {
        &self.commands
    }

    pub fn backing_size(&self) -> (u32, u32) {
        self.backing
    }

    /// Number of frames started so far.
    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Makes the next `draw` call fail once.
    pub fn fail_next_draw(&mut self) {
        self.fail_next_draw = true;
    }
}

impl Surface for RecordingSurface {
    fn client_size(&self) -> SurfaceSize {
        self.size.unwrap_or(SurfaceSize {
            css_width: 0.0,
            css_height: 0.0,
            device_pixel_ratio: 1.0,
        })
    }

    fn resize_backing(&mut self, width: u32, height: u32) {
        self.backing = (width, height);
    }

    fn draw(&mut self, command: DrawCommand) -> Result<()> {
        if std::mem::take(&mut self.fail_next_draw) {
            return Err(PlayerError::msg("surface lost"));
        }
        if matches!(command, DrawCommand::Clear { .. }) {
            self.commands.clear();
            self.frames += 1;
        }
        self.commands.push(command);
        Ok(())
    }
}
