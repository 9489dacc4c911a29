//! Breakpoint definitions for responsive variants.

use serde::{Deserialize, Serialize};

/// Lossy encoding quality (1-100). Clamped on construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "u8")]
pub struct Quality(u8);

impl Quality {
    pub fn new(value: u8) -> Self {
        Self(value.clamp(1, 100))
    }

    pub fn value(self) -> u8 {
        self.0
    }
}

impl From<u8> for Quality {
    fn from(value: u8) -> Self {
        Self::new(value)
    }
}

impl Default for Quality {
    fn default() -> Self {
        Self(82)
    }
}

/// A named target width and its encoding quality.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreakpointSpec {
    pub name: String,
    pub width: u32,
    #[serde(default)]
    pub quality: Quality,
}

impl BreakpointSpec {
    pub fn new(name: impl Into<String>, width: u32, quality: u8) -> Self {
        Self {
            name: name.into(),
            width,
            quality: Quality::new(quality),
        }
    }
}

/// The ordered default set used when configuration supplies none.
pub fn default_breakpoints() -> Vec<BreakpointSpec> {
    vec![
        BreakpointSpec::new("thumbnail", 320, 75),
        BreakpointSpec::new("small", 640, 80),
        BreakpointSpec::new("medium", 1024, 82),
        BreakpointSpec::new("large", 1920, 85),
    ]
}

/// Upper bounds applied before any pixel data is decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VariantLimits {
    pub max_pixels: u64,
}

impl VariantLimits {
    pub const DEFAULT_MAX_PIXELS: u64 = 40_000_000;
}

impl Default for VariantLimits {
    fn default() -> Self {
        Self {
            max_pixels: Self::DEFAULT_MAX_PIXELS,
        }
    }
}
