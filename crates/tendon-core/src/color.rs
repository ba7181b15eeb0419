//! RGBA colors for URDF materials and render overrides

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ColorError {
    #[error("Invalid color component '{0}'")]
    InvalidComponent(String),
    #[error("Expected 3 or 4 color components, got {0}")]
    ComponentCount(usize),
    #[error("Color component {0} outside 0..1")]
    OutOfRange(f32),
    #[error("Invalid hex color '{0}'")]
    InvalidHex(String),
}

/// Linear RGBA color with components in 0..1
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Color {
    /// Light grey used for primitives without a material
    pub const DEFAULT_GREY: Color = Color::rgba(0.8, 0.8, 0.8, 1.0);

    pub const fn rgba(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    pub const fn rgb(r: f32, g: f32, b: f32) -> Self {
        Self::rgba(r, g, b, 1.0)
    }

    /// Parse a URDF `rgba` attribute: `"r g b a"` (alpha optional)
    pub fn parse_rgba(s: &str) -> Result<Self, ColorError> {
        let mut parts = Vec::with_capacity(4);
        for token in s.split_whitespace() {
            let value: f32 = token
                .parse()
                .map_err(|_| ColorError::InvalidComponent(token.to_string()))?;
            if !(0.0..=1.0).contains(&value) {
                return Err(ColorError::OutOfRange(value));
            }
            parts.push(value);
        }
        match parts.as_slice() {
            [r, g, b] => Ok(Self::rgb(*r, *g, *b)),
            [r, g, b, a] => Ok(Self::rgba(*r, *g, *b, *a)),
            _ => Err(ColorError::ComponentCount(parts.len())),
        }
    }

    /// Parse `#rrggbb` or `#rrggbbaa` (leading `#` optional)
    pub fn from_hex(s: &str) -> Result<Self, ColorError> {
        let hex = s.trim().trim_start_matches('#');
        if !(hex.len() == 6 || hex.len() == 8) || !hex.is_ascii() {
            return Err(ColorError::InvalidHex(s.to_string()));
        }
        let channel = |i: usize| {
            u8::from_str_radix(&hex[i..i + 2], 16)
                .map(|v| v as f32 / 255.0)
                .map_err(|_| ColorError::InvalidHex(s.to_string()))
        };
        let alpha = if hex.len() == 8 { channel(6)? } else { 1.0 };
        Ok(Self::rgba(channel(0)?, channel(2)?, channel(4)?, alpha))
    }

    pub fn is_opaque(&self) -> bool {
        self.a >= 1.0
    }
}

impl FromStr for Color {
    type Err = ColorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim_start().starts_with('#') {
            Self::from_hex(s)
        } else {
            Self::parse_rgba(s)
        }
    }
}

impl TryFrom<String> for Color {
    type Error = ColorError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Color> for String {
    fn from(color: Color) -> Self {
        color.to_string()
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {} {}", self.r, self.g, self.b, self.a)
    }
}
