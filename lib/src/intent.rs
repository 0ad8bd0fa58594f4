use std::fmt;
use std::str::FromStr;

use thiserror::Error;

pub const DEFAULT_TEXT_SPEED: f32 = 7.0;
pub const DEFAULT_TEXT_COLOR: Rgb = Rgb {
    r: 255,
    g: 255,
    b: 0,
};

/// What the matrix should be showing, as requested by a client.
#[derive(Debug, Clone, PartialEq)]
pub enum DisplayIntent {
    Text {
        content: String,
        color: Rgb,
        speed: f32,
    },
    /// A single image or animation, relative to the source directory.
    SingleMedia { path: String },
    /// Every playable file in a folder, relative to the source directory.
    /// An empty path means the source directory itself.
    Folder { path: String, shuffled: bool },
    Stop,
}

impl DisplayIntent {
    pub fn text(content: impl Into<String>) -> Self {
        DisplayIntent::Text {
            content: content.into(),
            color: DEFAULT_TEXT_COLOR,
            speed: DEFAULT_TEXT_SPEED,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{},{}", self.r, self.g, self.b)
    }
}

#[derive(Debug, Error, PartialEq)]
#[error("invalid color {0:?}, expected \"r,g,b\" with components 0-255")]
pub struct ParseRgbError(String);

impl FromStr for Rgb {
    type Err = ParseRgbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseRgbError(s.to_string());
        let mut parts = s.split(',').map(|part| part.trim().parse::<u8>());
        let (Some(Ok(r)), Some(Ok(g)), Some(Ok(b)), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(err());
        };
        Ok(Rgb { r, g, b })
    }
}
