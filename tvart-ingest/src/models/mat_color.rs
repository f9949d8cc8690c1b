//! Mat color persisted as `#RRGGBB`

use crate::color::Lab;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("Invalid color '{0}': expected #RRGGBB")]
pub struct ParseColorError(pub String);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MatColor {
    rgb: [u8; 3],
}

impl MatColor {
    /// Neutral dark grey used when no color could be derived
    pub const FALLBACK: MatColor = MatColor { rgb: [0x33, 0x33, 0x33] };

    pub const fn from_rgb(r: u8, g: u8, b: u8) -> Self {
        Self { rgb: [r, g, b] }
    }

    pub fn from_lab(lab: Lab) -> Self {
        Self { rgb: lab.to_rgb() }
    }

    pub fn rgb(&self) -> [u8; 3] {
        self.rgb
    }

    pub fn to_lab(&self) -> Lab {
        Lab::from_rgb(self.rgb)
    }

    /// Lowercase hex digits without the leading `#`, used in file names
    pub fn hex_digits(&self) -> String {
        format!("{:02x}{:02x}{:02x}", self.rgb[0], self.rgb[1], self.rgb[2])
    }

    pub fn to_pixel(&self) -> image::Rgb<u8> {
        image::Rgb(self.rgb)
    }
}

impl FromStr for MatColor {
    type Err = ParseColorError;

    /// Accepts `#RRGGBB` or `RRGGBB`, any case
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let digits = trimmed.strip_prefix('#').unwrap_or(trimmed);
        if digits.len() != 6 || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(ParseColorError(s.to_string()));
        }

        let channel = |i: usize| {
            u8::from_str_radix(&digits[i..i + 2], 16).map_err(|_| ParseColorError(s.to_string()))
        };
        Ok(Self {
            rgb: [channel(0)?, channel(2)?, channel(4)?],
        })
    }
}

impl TryFrom<String> for MatColor {
    type Error = ParseColorError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<MatColor> for String {
    fn from(color: MatColor) -> String {
        color.to_string()
    }
}

impl fmt::Display for MatColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "#{:02X}{:02X}{:02X}",
            self.rgb[0], self.rgb[1], self.rgb[2]
        )
    }
}
