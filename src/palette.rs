//! Palette Registry - the closed set of legal codel colors
//!
//! Membership is exact. There is no nearest-match or tolerance.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;
use thiserror::Error;

/// Exact 24-bit RGB triple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const WHITE: Color = Color::rgb(0xff, 0xff, 0xff);
    pub const BLACK: Color = Color::rgb(0x00, 0x00, 0x00);

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    pub const fn from_u32(rgb: u32) -> Self {
        Self::rgb((rgb >> 16) as u8, (rgb >> 8) as u8, rgb as u8)
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PaletteError {
    #[error("Invalid color literal: {0:?}")]
    InvalidColor(String),

    #[error("Palette must contain at least one color")]
    Empty,
}

impl FromStr for Color {
    type Err = PaletteError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let hex = s.strip_prefix('#').unwrap_or(s);
        if hex.len() != 6 || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(PaletteError::InvalidColor(s.to_string()));
        }
        u32::from_str_radix(hex, 16)
            .map(Color::from_u32)
            .map_err(|_| PaletteError::InvalidColor(s.to_string()))
    }
}

impl Serialize for Color {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Color {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Hue {
    Red,
    Yellow,
    Green,
    Cyan,
    Blue,
    Magenta,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Lightness {
    Light,
    Normal,
    Dark,
}

/// What a legal color means as an instruction cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Codel {
    Chromatic { hue: Hue, lightness: Lightness },
    White,
    Black,
}

impl fmt::Display for Codel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Codel::Chromatic { hue, lightness: Lightness::Normal } => write!(f, "{:?}", hue),
            Codel::Chromatic { hue, lightness } => write!(f, "{:?} {:?}", lightness, hue),
            Codel::White => f.write_str("White"),
            Codel::Black => f.write_str("Black"),
        }
    }
}

pub const HUES: [Hue; 6] = [Hue::Red, Hue::Yellow, Hue::Green, Hue::Cyan, Hue::Blue, Hue::Magenta];
pub const LIGHTNESS: [Lightness; 3] = [Lightness::Light, Lightness::Normal, Lightness::Dark];

/// Hue cycle rows, indexed by `LIGHTNESS` then `HUES`.
pub const CHROMATIC: [[Color; 6]; 3] = [
    [
        Color::from_u32(0xffc0c0),
        Color::from_u32(0xffffc0),
        Color::from_u32(0xc0ffc0),
        Color::from_u32(0xc0ffff),
        Color::from_u32(0xc0c0ff),
        Color::from_u32(0xffc0ff),
    ],
    [
        Color::from_u32(0xff0000),
        Color::from_u32(0xffff00),
        Color::from_u32(0x00ff00),
        Color::from_u32(0x00ffff),
        Color::from_u32(0x0000ff),
        Color::from_u32(0xff00ff),
    ],
    [
        Color::from_u32(0xc00000),
        Color::from_u32(0xc0c000),
        Color::from_u32(0x00c000),
        Color::from_u32(0x00c0c0),
        Color::from_u32(0x0000c0),
        Color::from_u32(0xc000c0),
    ],
];

/// The twenty legal Piet colors.
pub const PIET_COLORS: [Color; 20] = {
    let mut out = [Color::BLACK; 20];
    let mut i = 0;
    while i < 18 {
        out[i] = CHROMATIC[i / 6][i % 6];
        i += 1;
    }
    out[18] = Color::WHITE;
    out[19] = Color::BLACK;
    out
};

#[derive(Debug, Clone)]
pub struct Palette {
    colors: Vec<Color>,
    members: HashSet<Color>,
}

impl Palette {
    pub fn new(colors: impl IntoIterator<Item = Color>) -> Result<Self, PaletteError> {
        let mut ordered = Vec::new();
        let mut members = HashSet::new();
        for color in colors {
            if members.insert(color) {
                ordered.push(color);
            }
        }
        if ordered.is_empty() {
            return Err(PaletteError::Empty);
        }
        Ok(Self { colors: ordered, members })
    }

    /// Process-wide Piet palette, built on first use.
    pub fn piet() -> &'static Palette {
        static PIET: OnceLock<Palette> = OnceLock::new();
        PIET.get_or_init(|| Palette {
            colors: PIET_COLORS.to_vec(),
            members: PIET_COLORS.iter().copied().collect(),
        })
    }

    pub fn is_legal(&self, color: Color) -> bool {
        self.members.contains(&color)
    }

    pub fn colors(&self) -> &[Color] {
        &self.colors
    }

    pub fn len(&self) -> usize {
        self.colors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.colors.is_empty()
    }

    /// Instruction meaning of a color under the Piet mapping, if it has one.
    pub fn describe(&self, color: Color) -> Option<Codel> {
        if !self.is_legal(color) {
            return None;
        }
        match color {
            Color::WHITE => return Some(Codel::White),
            Color::BLACK => return Some(Codel::Black),
            _ => {}
        }
        for (row, lightness) in CHROMATIC.iter().zip(LIGHTNESS) {
            if let Some(idx) = row.iter().position(|c| *c == color) {
                return Some(Codel::Chromatic { hue: HUES[idx], lightness });
            }
        }
        None
    }
}
