//! # Long Screenshot Library
//!
//! Captures a scrollable page that is taller than its viewport as one
//! seamless image, optionally cropped, optionally split into ordered parts
//! and optionally finished with an informational footer band.
//!
//! ## Architecture
//!
//! The library is organized into several key modules:
//! - `capture`: Scroll-and-snapshot coordination, rate limiting and settle detection
//! - `processing`: Frame stitching, splitting and footer painting
//! - `session`: Time-limited persistence of images awaiting a split
//! - `pipeline`: Request validation and the end-to-end capture/export flow
//! - `output`: Artifact naming and writing
//! - `core`: Small shared utilities such as the bounded cache
//! - `config`: Configuration management and validation
//!
//! Pure geometry and split arithmetic lives in the `longshot-layout` crate.
//!
//! ## Features
//!
//! - **Overlap-aware stitching**: Frames overlap by 15% of the viewport and are
//!   joined with a 2px redraw seam, then trimmed to what was actually drawn
//! - **Throttle-tolerant acquisition**: Snapshots are spaced 700ms apart and
//!   retried with linear backoff when the source reports throttling
//! - **Lazy-load aware**: A longer settle check at the bottom catches pages
//!   that grow after first reaching the end
//! - **Editable splits**: Multi-part captures are kept as sessions for two
//!   hours so boundaries can be adjusted and exported repeatedly
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use longshot::capture::{CaptureRateLimiter, CaptureTarget, ScrollCoordinator, SimulatedPage, WindowId};
//! use longshot::capture::simulated::SimulatedViewport;
//! use longshot::config::CaptureConfig;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = CaptureConfig::default();
//! let page = Arc::new(SimulatedPage::from_encoded(
//!     &std::fs::read("page.png")?,
//!     SimulatedViewport::default(),
//! )?);
//! let coordinator = ScrollCoordinator::new(
//!     page.clone(),
//!     page,
//!     Arc::new(CaptureRateLimiter::default()),
//! );
//! let pipeline = longshot::build_pipeline(&config)?.with_coordinator(coordinator);
//! let outcome = pipeline
//!     .run_capture(config.to_capture_request(CaptureTarget {
//!         tab_id: Some(1),
//!         window_id: Some(WindowId(1)),
//!         page_url: Some("https://example.com/".into()),
//!     }))
//!     .await?;
//! println!("{outcome:?}");
//! # Ok(())
//! # }
//! ```

// Standard library imports
use std::sync::Arc;

// Internal module imports
pub mod capture;
pub mod config;
pub mod core;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod processing;
pub mod session;

/// Re-export error types for convenience
pub use error::{
    CaptureError, CaptureResult, HasRecoverySuggestion, HasSeverity, Recoverable, Retryable,
};

/// Re-export the layout crate so callers need a single dependency
pub use longshot_layout as layout;

pub use pipeline::{CaptureOutcome, CaptureRequest, ExportSummary, Pipeline, SessionView};

use config::CaptureConfig;
use output::ArtifactWriter;
use processing::code_image::HttpCodeProvider;
use processing::footer::FooterCompositor;
use session::{FsBlobStore, FsKvStore, SessionStore};

/// Build a session-capable pipeline from configuration.
///
/// Sessions and crop bounds are persisted under `config.session_dir`
/// (`meta/` for JSON records, `blobs/` for images), footer code images come
/// from the configured HTTP endpoint and finished images go to
/// `config.out_dir`. Attach a [`capture::ScrollCoordinator`] to capture.
///
/// # Parameters
///
/// * `config` - Validated capture configuration.
///
/// # Returns
///
/// A [`Pipeline`] without a page attached.
///
/// # Errors
///
/// Returns a validation error if `config.validate()` fails, or an external
/// error if the HTTP client cannot be constructed.
pub fn build_pipeline(config: &CaptureConfig) -> CaptureResult<Pipeline> {
    config
        .validate()
        .map_err(|reason| CaptureError::validation("config", reason, ""))?;

    let sessions = SessionStore::new(
        Arc::new(FsKvStore::new(config.session_dir.join("meta"))),
        Arc::new(FsBlobStore::new(config.session_dir.join("blobs"))),
    )
    .with_ttl(config.session_ttl());
    let footers = FooterCompositor::new(
        Arc::new(HttpCodeProvider::from_config(config)?),
        config.caption_font.clone(),
    );
    let writer = ArtifactWriter::new(&config.out_dir, &config.file_prefix);
    Ok(Pipeline::new(footers, sessions, writer))
}
