//! Resolves ambient theme variables into the visualizer palette.

use std::{collections::BTreeMap, fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::PlayerError;

pub const ACCENT_COLOR: &str = "--accent-color";
pub const ACTIVE_ACCENT: &str = "--active-accent";
pub const PROGRESS_KNOB_COLOR: &str = "--progress-knob-color";
pub const SECONDARY_BG: &str = "--secondary-bg";
pub const TEXT_COLOR: &str = "--text-color";
pub const WAVE_COLOR: &str = "--visualizer-wave-color";
pub const WAVE_GRADIENT_ENABLED: &str = "--visualizer-wave-gradient-enabled";

const PRIMARY_FALLBACK: Color = Color::rgb(0xb5, 0x3a, 0xd4);
const SECONDARY_FALLBACK: Color = Color::rgb(0xd2, 0x52, 0xf4);
const WAVE_FALLBACK: Color = Color::rgb(0x64, 0xe0, 0xff);
const BACKGROUND_FALLBACK: Color = Color::rgb(0x6c, 0x22, 0x7e);
const TEXT_FALLBACK: Color = Color::WHITE;

/// Per-channel boost used for the light end of the wave gradient.
const LIGHTEN_AMOUNT: u8 = 40;

/// Named colour variables supplied by the host. Blank values count as unset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ThemeVariables(BTreeMap<String, String>);

impl ThemeVariables {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.0.insert(name.into(), value.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .get(name)
            .map(|value| value.trim())
            .filter(|value| !value.is_empty())
    }

    fn color(&self, name: &str) -> Option<Color> {
        let raw = self.get(name)?;
        match raw.parse() {
            Ok(color) => Some(color),
            Err(err) => {
                debug!(variable = name, %err, "ignoring unparsable theme colour");
                None
            }
        }
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for ThemeVariables {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// RGBA colour with 8-bit channels and a unit alpha.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: f32,
}

impl Color {
    pub const WHITE: Color = Color::rgb(255, 255, 255);

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 1.0 }
    }

    pub const fn rgba(r: u8, g: u8, b: u8, a: f32) -> Self {
        Self { r, g, b, a }
    }

    pub fn with_alpha(self, a: f32) -> Self {
        Self {
            a: a.clamp(0.0, 1.0),
            ..self
        }
    }

    /// Adds `amount` to every channel, saturating at 255.
    pub fn lighten(self, amount: u8) -> Self {
        Self {
            r: self.r.saturating_add(amount),
            g: self.g.saturating_add(amount),
            b: self.b.saturating_add(amount),
            a: self.a,
        }
    }

    pub fn to_hex(self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.a >= 1.0 {
            f.write_str(&self.to_hex())
        } else {
            write!(f, "rgba({}, {}, {}, {})", self.r, self.g, self.b, self.a)
        }
    }
}

impl FromStr for Color {
    type Err = PlayerError;

    /// Accepts `#rgb`, `#rrggbb`, `rgb(r, g, b)` and `rgba(r, g, b, a)`.
    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let value = raw.trim();
        let invalid = || PlayerError::invalid(format!("unsupported colour `{raw}`"));

        if let Some(hex) = value.strip_prefix('#') {
            if !hex.is_ascii() {
                return Err(invalid());
            }
            let channel = |s: &str| u8::from_str_radix(s, 16).map_err(|_| invalid());
            return match hex.len() {
                3 => {
                    let digit = |i: usize| channel(&hex[i..=i]).map(|v| v * 17);
                    Ok(Color::rgb(digit(0)?, digit(1)?, digit(2)?))
                }
                6 => Ok(Color::rgb(channel(&hex[0..2])?, channel(&hex[2..4])?, channel(&hex[4..6])?)),
                _ => Err(invalid()),
            };
        }

        let (body, with_alpha) = if let Some(body) = value.strip_prefix("rgba(") {
            (body, true)
        } else if let Some(body) = value.strip_prefix("rgb(") {
            (body, false)
        } else {
            return Err(invalid());
        };
        let body = body.strip_suffix(')').ok_or_else(invalid)?;
        let parts: Vec<&str> = body.split(',').map(str::trim).collect();
        if parts.len() != if with_alpha { 4 } else { 3 } {
            return Err(invalid());
        }

        let channel = |s: &str| {
            s.parse::<f32>()
                .ok()
                .filter(|v| v.is_finite())
                .map(|v| v.round().clamp(0.0, 255.0) as u8)
                .ok_or_else(invalid)
        };
        let alpha = match parts.get(3) {
            Some(a) => a
                .parse::<f32>()
                .ok()
                .filter(|v| v.is_finite())
                .ok_or_else(invalid)?
                .clamp(0.0, 1.0),
            None => 1.0,
        };
        Ok(Color::rgba(channel(parts[0])?, channel(parts[1])?, channel(parts[2])?, alpha))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Palette {
    pub primary: Color,
    pub secondary: Color,
    pub tertiary: Color,
    pub background: Color,
    pub text: Color,
    pub bar_start: Color,
    pub bar_end: Color,
    pub wave_start: Color,
    pub wave_end: Color,
    pub circle_inner: Color,
    pub circle_outer: Color,
    pub gradient_enabled: bool,
}

impl Default for Palette {
    fn default() -> Self {
        resolve_palette(&ThemeVariables::default())
    }
}

/// Maps theme variables to the palette the renderers draw with.
pub fn resolve_palette(vars: &ThemeVariables) -> Palette {
    let gradient_enabled = !matches!(vars.get(WAVE_GRADIENT_ENABLED), Some("0" | "false"));

    let primary = vars.color(ACCENT_COLOR).unwrap_or(PRIMARY_FALLBACK);
    let secondary = vars.color(ACTIVE_ACCENT).unwrap_or(SECONDARY_FALLBACK);
    let wave = vars
        .color(WAVE_COLOR)
        .or_else(|| vars.color(PROGRESS_KNOB_COLOR))
        .unwrap_or(WAVE_FALLBACK);
    let wave_end = if gradient_enabled {
        wave.lighten(LIGHTEN_AMOUNT)
    } else {
        wave
    };

    Palette {
        primary,
        secondary,
        tertiary: wave,
        background: vars.color(SECONDARY_BG).unwrap_or(BACKGROUND_FALLBACK),
        text: vars.color(TEXT_COLOR).unwrap_or(TEXT_FALLBACK),
        bar_start: primary,
        bar_end: secondary,
        wave_start: wave,
        wave_end,
        circle_inner: secondary,
        circle_outer: primary,
        gradient_enabled,
    }
}
