//! # Configuration Module
//!
//! Configuration structures and validation for long-screenshot capture. This
//! is the common interface between the CLI, stored settings files and the
//! core pipeline.
//!
//! ## Configuration Parameters
//!
//! | Parameter | Type | Default | Description |
//! |-----------|------|---------|-------------|
//! | `out_dir` | `PathBuf` | `.` | Where finished images are written |
//! | `file_prefix` | `String` | `longshot` | Artifact file name prefix |
//! | `output_mode` | `OutputMode` | `long` | Single image or grid split |
//! | `quality` | `OutputQuality` | `standard` | Render density |
//! | `max_height` | `u32` | `0` | Capture height cap in CSS px, 0 = unlimited |
//! | `footer_url` | `String` | empty | Link encoded into the footer code |
//! | `footer_scope` | `FooterScope` | `none` | Which parts get a footer |
//! | `language` | `UiLanguage` | `en` | Footer caption locale |
//! | `session_ttl_secs` | `u64` | `7200` | Split session lifetime |
//!
//! ## Examples
//!
//! ```rust
//! use longshot::config::config::{clamp_max_height, CaptureConfig};
//!
//! let config = CaptureConfig::default();
//! assert!(config.validate().is_ok());
//! assert_eq!(clamp_max_height("1200.9"), 1200);
//! assert_eq!(clamp_max_height("abc"), 0);
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use longshot_layout::geometry::CropBounds;
use longshot_layout::presets::{FooterScope, OutputMode, OutputQuality};
use serde::{Deserialize, Serialize};

use crate::capture::CaptureTarget;
use crate::error::{CaptureError, CaptureResult};
use crate::pipeline::CaptureRequest;

/// Default QR rendering endpoint; the encoded link is appended to `data=`.
pub const DEFAULT_CODE_ENDPOINT: &str =
    "https://api.qrserver.com/v1/create-qr-code/?size=180x180&margin=0&data=";

/// Locale of the footer caption.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum UiLanguage {
    #[default]
    #[value(name = "en")]
    En,
    #[value(name = "zh")]
    Zh,
}

impl UiLanguage {
    /// Anything that does not start with `zh` is English.
    pub fn parse_lossy(value: &str) -> Self {
        if value.trim().to_ascii_lowercase().starts_with("zh") {
            UiLanguage::Zh
        } else {
            UiLanguage::En
        }
    }

    pub fn footer_caption(self) -> &'static str {
        match self {
            UiLanguage::En => "Scan QR to view full page",
            UiLanguage::Zh => "扫描二维码查看全文",
        }
    }

    /// Caption size in CSS px.
    pub fn caption_font_size(self) -> f32 {
        match self {
            UiLanguage::En => 24.0,
            UiLanguage::Zh => 26.0,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            UiLanguage::En => "en",
            UiLanguage::Zh => "zh",
        }
    }
}

/// Configuration for capture, split sessions and footer rendering.
///
/// Every field has a default, so a settings file only needs to name the
/// values it changes:
///
/// ```rust
/// use longshot::config::config::CaptureConfig;
/// use longshot_layout::presets::OutputMode;
///
/// let config: CaptureConfig =
///     serde_json::from_str(r#"{ "outputMode": "grid4", "maxHeight": 6000 }"#).unwrap();
/// assert_eq!(config.output_mode, OutputMode::Grid4);
/// assert_eq!(config.max_height, 6000);
/// assert_eq!(config.file_prefix, "longshot");
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CaptureConfig {
    /// Directory that receives finished images.
    pub out_dir: PathBuf,

    /// File name prefix for written artifacts.
    pub file_prefix: String,

    pub output_mode: OutputMode,

    pub quality: OutputQuality,

    /// Capture height cap in CSS px. 0 disables the cap.
    pub max_height: u32,

    /// Link encoded into the footer code. Empty disables the footer.
    pub footer_url: String,

    pub footer_scope: FooterScope,

    pub language: UiLanguage,

    /// Crop edges in page coordinates.
    pub crop: CropBounds,

    /// Where split sessions and crop bounds are persisted.
    pub session_dir: PathBuf,

    pub session_ttl_secs: u64,

    /// TrueType/OpenType font used for the footer caption.
    ///
    /// When unset a handful of well-known system font paths are tried.
    pub caption_font: Option<PathBuf>,

    /// Code-image endpoint prefix; the percent-encoded link is appended.
    pub code_endpoint: String,

    pub code_timeout_ms: u64,

    /// Maximum number of code images kept in memory.
    pub code_cache_capacity: usize,

    pub code_cache_ttl_secs: u64,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            out_dir: PathBuf::from("."),
            file_prefix: "longshot".to_string(),
            output_mode: OutputMode::Long,
            quality: OutputQuality::Standard,
            max_height: 0,
            footer_url: String::new(),
            footer_scope: FooterScope::None,
            language: UiLanguage::En,
            crop: CropBounds::default(),
            session_dir: PathBuf::from(".longshot"),
            session_ttl_secs: 2 * 60 * 60,
            caption_font: None,
            code_endpoint: DEFAULT_CODE_ENDPOINT.to_string(),
            code_timeout_ms: 5_000,
            code_cache_capacity: 32,
            code_cache_ttl_secs: 30 * 60,
        }
    }
}

impl CaptureConfig {
    /// Creates a configuration for the given output choices, everything else default.
    pub fn new(
        out_dir: PathBuf,
        output_mode: OutputMode,
        quality: OutputQuality,
        max_height: u32,
        footer_url: String,
        footer_scope: FooterScope,
    ) -> Self {
        Self {
            out_dir,
            output_mode,
            quality,
            max_height,
            footer_url,
            footer_scope,
            ..Self::default()
        }
    }

    /// Load a JSON settings file; missing keys keep their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> CaptureResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| CaptureError::io_at("read config", path, e))?;
        let config: CaptureConfig = serde_json::from_str(&raw).map_err(|e| {
            CaptureError::validation("config", "must be valid JSON settings", e.to_string())
        })?;
        Ok(config)
    }

    /// Validates the configuration parameters.
    pub fn validate(&self) -> Result<(), String> {
        if self.file_prefix.trim().is_empty() {
            return Err("File prefix must not be empty".to_string());
        }
        if self
            .file_prefix
            .chars()
            .any(|c| matches!(c, '/' | '\\' | ':'))
        {
            return Err("File prefix must not contain path separators".to_string());
        }
        validate_optional_url(&self.footer_url).map_err(|e| e.to_string())?;
        if self.session_ttl_secs == 0 {
            return Err("Session TTL must be greater than 0 seconds".to_string());
        }
        if self.code_cache_capacity == 0 {
            return Err("Code cache capacity must be greater than 0".to_string());
        }
        if self.code_timeout_ms == 0 {
            return Err("Code image timeout must be greater than 0".to_string());
        }
        Ok(())
    }

    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_secs)
    }

    pub fn code_timeout(&self) -> Duration {
        Duration::from_millis(self.code_timeout_ms)
    }

    pub fn code_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.code_cache_ttl_secs)
    }

    /// Convert into a capture request aimed at `target`.
    pub fn to_capture_request(&self, target: CaptureTarget) -> CaptureRequest {
        CaptureRequest {
            target,
            output_mode: self.output_mode,
            quality: self.quality,
            max_height: self.max_height,
            crop: self.crop.normalized(),
            footer_url: self.footer_url.trim().to_string(),
            footer_scope: self.footer_scope,
            language: self.language,
        }
    }
}

/// An empty string is valid; anything else must parse as an absolute URL.
pub fn validate_optional_url(raw: &str) -> CaptureResult<()> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(());
    }
    reqwest::Url::parse(trimmed)
        .map(|_| ())
        .map_err(|e| CaptureError::validation("footer_url", "must be a valid URL", e.to_string()))
}

/// Parse a user-entered height cap. Non-numeric, non-finite and non-positive
/// input all mean "unlimited" (0).
pub fn clamp_max_height(raw: &str) -> u32 {
    raw.trim()
        .parse::<f64>()
        .map(clamp_max_height_value)
        .unwrap_or(0)
}

pub fn clamp_max_height_value(value: f64) -> u32 {
    if !value.is_finite() || value <= 0.0 {
        return 0;
    }
    value.floor().min(f64::from(u32::MAX)) as u32
}
