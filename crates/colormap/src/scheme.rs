//! Colour schemes and the multi-stop interpolation engine.

use serde::{Deserialize, Serialize};

/// RGB color as (r, g, b) with values in 0..=255.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Parse `rrggbb`, with or without a leading `#`.
    pub fn from_hex(hex: &str) -> Option<Self> {
        let hex = hex.strip_prefix('#').unwrap_or(hex);
        if hex.len() != 6 {
            return None;
        }
        let channel = |i: usize| u8::from_str_radix(hex.get(i..i + 2)?, 16).ok();
        Some(Self::new(channel(0)?, channel(2)?, channel(4)?))
    }
}

/// A color stop: position in [0, 1] mapped to an RGB color.
#[derive(Debug, Clone, Copy)]
pub struct ColorStop {
    pub t: f64,
    pub color: Rgb,
}

impl ColorStop {
    pub const fn new(t: f64, r: u8, g: u8, b: u8) -> Self {
        Self {
            t,
            color: Rgb::new(r, g, b),
        }
    }
}

/// Available color schemes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorScheme {
    /// Green -> Yellow -> Red (susceptibility surface and its slices)
    Susceptibility,
    /// Dark teal -> Green -> Yellow -> Red (height above drainage)
    Hand,
    /// White -> Red, two classes (flood masks and hotspots)
    Binary,
    /// Light -> Dark blue (drainage distance, flood depth)
    Blues,
    /// Blue -> Green -> Yellow (elevation)
    Terrain,
    /// Black -> White
    Grayscale,
}

impl ColorScheme {
    /// All available schemes.
    pub const ALL: &[ColorScheme] = &[
        Self::Susceptibility,
        Self::Hand,
        Self::Binary,
        Self::Blues,
        Self::Terrain,
        Self::Grayscale,
    ];

    /// Human-readable name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Susceptibility => "Susceptibility",
            Self::Hand => "HAND",
            Self::Binary => "Binary",
            Self::Blues => "Blues",
            Self::Terrain => "Terrain",
            Self::Grayscale => "Grayscale",
        }
    }
}

// ─── Color stop definitions ───────────────────────────────────────────

const SUSCEPTIBILITY_STOPS: &[ColorStop] = &[
    ColorStop::new(0.0, 0x22, 0xdd, 0x0e),
    ColorStop::new(0.5, 0xf9, 0xfe, 0x31),
    ColorStop::new(1.0, 0xd7, 0x0c, 0x0c),
];

const HAND_STOPS: &[ColorStop] = &[
    ColorStop::new(0.0, 0x02, 0x38, 0x58),
    ColorStop::new(0.1, 0x00, 0x68, 0x37),
    ColorStop::new(0.2, 0x1a, 0x98, 0x50),
    ColorStop::new(0.3, 0x66, 0xbd, 0x63),
    ColorStop::new(0.4, 0xa6, 0xd9, 0x6a),
    ColorStop::new(0.5, 0xd9, 0xef, 0x8b),
    ColorStop::new(0.6, 0xff, 0xff, 0xbf),
    ColorStop::new(0.7, 0xfe, 0xe0, 0x8b),
    ColorStop::new(0.8, 0xfd, 0xae, 0x61),
    ColorStop::new(0.9, 0xf4, 0x6d, 0x43),
    ColorStop::new(1.0, 0xd7, 0x30, 0x27),
];

const BLUES_STOPS: &[ColorStop] = &[
    ColorStop::new(0.0, 0xf7, 0xfb, 0xff),
    ColorStop::new(1.0 / 7.0, 0xde, 0xeb, 0xf7),
    ColorStop::new(2.0 / 7.0, 0xc6, 0xdb, 0xef),
    ColorStop::new(3.0 / 7.0, 0x9e, 0xca, 0xe1),
    ColorStop::new(4.0 / 7.0, 0x6b, 0xae, 0xd6),
    ColorStop::new(5.0 / 7.0, 0x42, 0x92, 0xc6),
    ColorStop::new(6.0 / 7.0, 0x21, 0x71, 0xb5),
    ColorStop::new(1.0, 0x08, 0x45, 0x94),
];

const TERRAIN_STOPS: &[ColorStop] = &[
    ColorStop::new(0.0, 0, 0, 255),
    ColorStop::new(0.5, 0, 128, 0),
    ColorStop::new(1.0, 255, 255, 0),
];

/// Not flood / flood
const BINARY_PALETTE: [Rgb; 2] = [Rgb::new(0xff, 0xff, 0xff), Rgb::new(0xff, 0x06, 0x06)];

// ─── Interpolation engine ──────────────────────────────────────────────

fn lerp(a: f64, b: f64, t: f64) -> f64 {
    a + (b - a) * t
}

fn lerp_color(c1: Rgb, c2: Rgb, t: f64) -> Rgb {
    Rgb::new(
        lerp(c1.r as f64, c2.r as f64, t).round() as u8,
        lerp(c1.g as f64, c2.g as f64, t).round() as u8,
        lerp(c1.b as f64, c2.b as f64, t).round() as u8,
    )
}

fn multi_stop(stops: &[ColorStop], t: f64) -> Rgb {
    if t <= 0.0 {
        return stops[0].color;
    }
    if t >= 1.0 {
        return stops[stops.len() - 1].color;
    }
    for i in 1..stops.len() {
        if t <= stops[i].t {
            let ratio = (t - stops[i - 1].t) / (stops[i].t - stops[i - 1].t);
            return lerp_color(stops[i - 1].color, stops[i].color, ratio);
        }
    }
    stops[stops.len() - 1].color
}

/// Evaluate a color scheme at normalized position `t` ∈ [0, 1].
///
/// `Binary` has two classes split at 0.5; the others interpolate.
pub fn evaluate(scheme: ColorScheme, t: f64) -> Rgb {
    match scheme {
        ColorScheme::Susceptibility => multi_stop(SUSCEPTIBILITY_STOPS, t),
        ColorScheme::Hand => multi_stop(HAND_STOPS, t),
        ColorScheme::Binary => BINARY_PALETTE[usize::from(t >= 0.5)],
        ColorScheme::Blues => multi_stop(BLUES_STOPS, t),
        ColorScheme::Terrain => multi_stop(TERRAIN_STOPS, t),
        ColorScheme::Grayscale => {
            let v = (t.clamp(0.0, 1.0) * 255.0).round() as u8;
            Rgb::new(v, v, v)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn susceptibility_stops() {
        assert_eq!(evaluate(ColorScheme::Susceptibility, 0.0), Rgb::from_hex("22dd0e").unwrap());
        assert_eq!(evaluate(ColorScheme::Susceptibility, 0.5), Rgb::from_hex("#f9fe31").unwrap());
        assert_eq!(evaluate(ColorScheme::Susceptibility, 1.0), Rgb::from_hex("d70c0c").unwrap());
    }

    #[test]
    fn binary_classes() {
        assert_eq!(evaluate(ColorScheme::Binary, 0.0), Rgb::new(255, 255, 255));
        assert_eq!(evaluate(ColorScheme::Binary, 1.0), Rgb::new(255, 6, 6));
    }

    #[test]
    fn clamping() {
        assert_eq!(evaluate(ColorScheme::Hand, -0.5), Rgb::new(2, 56, 88));
        assert_eq!(evaluate(ColorScheme::Hand, 1.5), Rgb::new(215, 48, 39));
    }

    #[test]
    fn grayscale_midpoint() {
        assert_eq!(evaluate(ColorScheme::Grayscale, 0.5), Rgb::new(128, 128, 128));
    }

    #[test]
    fn hex_parsing() {
        assert_eq!(Rgb::from_hex("ff0606"), Some(Rgb::new(255, 6, 6)));
        assert_eq!(Rgb::from_hex("ff06"), None);
        assert_eq!(Rgb::from_hex("zz0606"), None);
    }
}
