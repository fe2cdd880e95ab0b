//! Packed RGBA samples as they come out of the decoder.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A packed `0xRRGGBBAA` color sample.
///
/// The value `0` (fully transparent black) is the background sentinel and is
/// never indexed.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Truecolor(pub u32);

impl Truecolor {
    /// "No pixel" marker.
    pub const BACKGROUND: Truecolor = Truecolor(0);
    pub const WHITE: Truecolor = Truecolor::rgb(255, 255, 255);
    pub const BLACK: Truecolor = Truecolor::rgb(0, 0, 0);

    pub const fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self((r as u32) << 24 | (g as u32) << 16 | (b as u32) << 8 | a as u32)
    }

    /// Fully opaque color.
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self::rgba(r, g, b, 255)
    }

    pub fn from_rgba8(px: [u8; 4]) -> Self {
        Self::rgba(px[0], px[1], px[2], px[3])
    }

    #[inline]
    pub fn is_background(self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub fn r(self) -> u8 {
        (self.0 >> 24) as u8
    }

    #[inline]
    pub fn g(self) -> u8 {
        (self.0 >> 16) as u8
    }

    #[inline]
    pub fn b(self) -> u8 {
        (self.0 >> 8) as u8
    }

    #[inline]
    pub fn a(self) -> u8 {
        self.0 as u8
    }

    /// Drop the alpha channel, re-packing as fully opaque.
    ///
    /// Indexing treats two samples that differ only in alpha as the same color.
    #[inline]
    pub fn opaque(self) -> Self {
        Self(self.0 | 0xff)
    }

    /// Channels scaled to [0, 1].
    pub fn to_unit_rgb(self) -> [f32; 3] {
        [
            self.r() as f32 / 255.0,
            self.g() as f32 / 255.0,
            self.b() as f32 / 255.0,
        ]
    }
}

impl From<u32> for Truecolor {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

impl From<Truecolor> for u32 {
    fn from(value: Truecolor) -> Self {
        value.0
    }
}

impl fmt::Display for Truecolor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:08x}", self.0)
    }
}

/// Parses `#rrggbb` (opaque) or `#rrggbbaa`; the leading `#` is optional.
impl FromStr for Truecolor {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let hex = s.trim().trim_start_matches('#');
        if !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(format!("'{}' is not a hex color", s));
        }
        let value = u32::from_str_radix(hex, 16)
            .map_err(|err| format!("'{}' is not a hex color: {}", s, err))?;
        match hex.len() {
            6 => Ok(Self(value << 8 | 0xff)),
            8 => Ok(Self(value)),
            _ => Err(format!("'{}' must have 6 or 8 hex digits", s)),
        }
    }
}
