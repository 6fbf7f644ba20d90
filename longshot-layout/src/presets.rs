// SPDX-License-Identifier: MIT
//! # Output Presets
//!
//! Output mode, render quality and footer placement selections, plus the
//! lossy parsers used when these arrive as free-form strings (stored
//! settings, query parameters).
//!
//! ## Design Philosophy
//!
//! Every parser here is total: unknown input maps to the most conservative
//! choice (single image, standard quality, no footer) instead of failing.

use serde::{Deserialize, Serialize};

/// How the composed long image is delivered.
///
/// `Long` produces one image. The grid modes split the image into that many
/// parts through the split editor.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputMode {
    #[default]
    #[value(name = "long")]
    Long,
    #[value(name = "grid3")]
    Grid3,
    #[value(name = "grid4")]
    Grid4,
    #[value(name = "grid6")]
    Grid6,
    #[value(name = "grid9")]
    Grid9,
}

impl OutputMode {
    /// Number of output parts this mode produces.
    pub fn grid_count(self) -> u32 {
        match self {
            OutputMode::Long => 1,
            OutputMode::Grid3 => 3,
            OutputMode::Grid4 => 4,
            OutputMode::Grid6 => 6,
            OutputMode::Grid9 => 9,
        }
    }

    /// Parse a mode name; anything unrecognized is `Long`.
    pub fn parse_lossy(value: &str) -> Self {
        match value {
            "grid3" => OutputMode::Grid3,
            "grid4" => OutputMode::Grid4,
            "grid6" => OutputMode::Grid6,
            "grid9" => OutputMode::Grid9,
            _ => OutputMode::Long,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OutputMode::Long => "long",
            OutputMode::Grid3 => "grid3",
            OutputMode::Grid4 => "grid4",
            OutputMode::Grid6 => "grid6",
            OutputMode::Grid9 => "grid9",
        }
    }
}

/// Part count for a raw output-mode string. Unknown modes yield 1.
pub fn grid_count(output_mode: &str) -> u32 {
    OutputMode::parse_lossy(output_mode).grid_count()
}

/// Render density of the composed image relative to CSS pixels.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputQuality {
    /// Always 1 output pixel per CSS pixel.
    #[default]
    #[value(name = "standard")]
    Standard,
    /// Device pixel ratio capped at 1.5.
    #[value(name = "high")]
    High,
    /// Full device pixel ratio.
    #[value(name = "max")]
    Max,
}

impl OutputQuality {
    pub fn parse_lossy(value: &str) -> Self {
        match value {
            "high" => OutputQuality::High,
            "max" => OutputQuality::Max,
            _ => OutputQuality::Standard,
        }
    }
}

/// Which output parts receive the informational footer band.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum FooterScope {
    #[default]
    #[value(name = "none")]
    None,
    /// Only the final (bottom-most) part.
    #[value(name = "last")]
    Last,
    /// Every part.
    #[value(name = "all")]
    All,
}

impl FooterScope {
    pub fn parse_lossy(value: &str) -> Self {
        match value {
            "last" => FooterScope::Last,
            "all" => FooterScope::All,
            _ => FooterScope::None,
        }
    }

    /// Whether part `index` (0-based) of `part_count` carries a footer.
    pub fn applies_to(self, index: usize, part_count: usize) -> bool {
        match self {
            FooterScope::None => false,
            FooterScope::All => true,
            FooterScope::Last => part_count > 0 && index + 1 == part_count,
        }
    }
}
