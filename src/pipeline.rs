//! # Capture Pipeline
//!
//! Ties the stages together:
//!
//! 1. Validate the request before touching the page
//! 2. Scroll and collect frames ([`ScrollCoordinator`])
//! 3. Stitch them into one image ([`Stitcher`])
//! 4. Single-image mode writes the result; multi-part mode parks it in a
//!    session with default boundaries
//! 5. Later, a session is loaded for editing and exported as parts
//!    ([`Splitter`]) as often as needed until it expires
//!
//! The composed image only carries a footer in single-image mode. Multi-part
//! sessions store a footer-free image and footers are painted per part at
//! export time.

use std::path::PathBuf;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use futures_util::future::try_join_all;
use image::RgbaImage;
use longshot_layout::boundaries::{
    FOOTER_HEIGHT, default_boundaries, footer_heights, normalize_boundaries,
};
use longshot_layout::geometry::CropBounds;
use longshot_layout::presets::{FooterScope, OutputMode, OutputQuality};
use tracing::{debug, info, instrument};

use crate::capture::{CaptureTarget, ScrollCoordinator, WindowId};
use crate::config::UiLanguage;
use crate::config::config::validate_optional_url;
use crate::error::{CaptureError, CaptureResult};
use crate::output::ArtifactWriter;
use crate::processing::footer::{FooterArtwork, FooterCompositor, FooterSpec};
use crate::processing::split::Splitter;
use crate::processing::stitch::{ComposedImage, StitchRequest, Stitcher, encode_png};
use crate::session::{CaptureSession, SessionDraft, SessionStore};

const UNSUPPORTED_PAGE: &str = "This page is unsupported. Open an http/https page.";

/// One capture as requested by a caller.
#[derive(Clone, Debug, PartialEq)]
pub struct CaptureRequest {
    pub target: CaptureTarget,
    pub output_mode: OutputMode,
    pub quality: OutputQuality,
    /// CSS px, 0 = unlimited.
    pub max_height: u32,
    pub crop: CropBounds,
    pub footer_url: String,
    pub footer_scope: FooterScope,
    pub language: UiLanguage,
}

impl CaptureRequest {
    fn wants_footer(&self) -> bool {
        !self.footer_url.is_empty() && self.footer_scope != FooterScope::None
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum CaptureOutcome {
    /// Single-image mode: the long image was written.
    Saved {
        path: PathBuf,
        pixel_width: u32,
        pixel_height: u32,
    },
    /// Multi-part mode: boundaries can now be edited and exported.
    NeedsSplit {
        session_id: String,
        part_count: u32,
    },
}

/// A loaded session, ready for a boundary editor.
#[derive(Clone, Debug)]
pub struct SessionView {
    pub session: CaptureSession,
    pub image: RgbaImage,
    /// `data:image/png;base64,...` of the stored image.
    pub data_url: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExportSummary {
    pub part_count: usize,
    pub paths: Vec<PathBuf>,
}

/// Reject malformed requests before any scroll happens.
///
/// Returns the window to snapshot.
pub fn validate_request(request: &CaptureRequest) -> CaptureResult<WindowId> {
    if !matches!(request.target.tab_id, Some(id) if id > 0) {
        return Err(CaptureError::validation("tab_id", "Missing tab id", ""));
    }
    validate_optional_url(&request.footer_url)?;
    let Some(window) = request.target.window_id else {
        return Err(CaptureError::environment(
            "window context",
            "Invalid tab/window context",
        ));
    };
    let page_url = request.target.page_url.as_deref().unwrap_or_default();
    let supported = reqwest::Url::parse(page_url)
        .map(|url| matches!(url.scheme(), "http" | "https"))
        .unwrap_or(false);
    if !supported {
        return Err(CaptureError::environment("http/https page", UNSUPPORTED_PAGE)
            .with_recovery_suggestion("Open an http/https page and capture again."));
    }
    Ok(window)
}

pub struct Pipeline {
    coordinator: Option<ScrollCoordinator>,
    footers: FooterCompositor,
    sessions: SessionStore,
    writer: ArtifactWriter,
}

impl Pipeline {
    /// A pipeline that can serve sessions. Attach a coordinator with
    /// [`with_coordinator`](Self::with_coordinator) to capture.
    pub fn new(footers: FooterCompositor, sessions: SessionStore, writer: ArtifactWriter) -> Self {
        Self {
            coordinator: None,
            footers,
            sessions,
            writer,
        }
    }

    pub fn with_coordinator(mut self, coordinator: ScrollCoordinator) -> Self {
        self.coordinator = Some(coordinator);
        self
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    pub fn writer(&self) -> &ArtifactWriter {
        &self.writer
    }

    #[instrument(skip_all, fields(mode = request.output_mode.as_str()))]
    pub async fn run_capture(&self, request: CaptureRequest) -> CaptureResult<CaptureOutcome> {
        let window = validate_request(&request)?;
        let Some(coordinator) = self.coordinator.as_ref() else {
            return Err(CaptureError::environment(
                "page driver",
                "no page is attached to this pipeline",
            ));
        };
        let page_url = request.target.page_url.as_deref();

        let crop = if request.crop.is_empty() {
            self.sessions.load_crop_bounds(page_url).await?
        } else {
            self.sessions.save_crop_bounds(request.crop, page_url).await?;
            request.crop
        };
        debug!(?crop, "Using crop bounds");

        let run = coordinator.capture(window, &crop, request.max_height).await?;

        let grid_count = request.output_mode.grid_count();
        let footer = if grid_count == 1 && request.wants_footer() {
            Some(self.footer_for(&request.footer_url, request.language).await)
        } else {
            None
        };
        let composed = Stitcher::new().compose(StitchRequest {
            frames: &run.frames,
            metrics: run.final_metrics,
            crop,
            max_height: request.max_height,
            quality: request.quality,
            footer: footer.as_ref(),
        })?;
        let png = composed.encode_png()?;
        let timestamp = self.sessions.now_ms();

        if grid_count == 1 {
            let path = self.writer.write_long_image(timestamp, &png).await?;
            return Ok(CaptureOutcome::Saved {
                path,
                pixel_width: composed.pixel_width(),
                pixel_height: composed.pixel_height(),
            });
        }

        let footers = footer_heights(
            grid_count as usize,
            !request.footer_url.is_empty(),
            request.footer_scope,
            FOOTER_HEIGHT,
        );
        let boundaries = default_boundaries(composed.content_css_height(), &footers);
        let session = self
            .sessions
            .create(
                SessionDraft {
                    width: composed.pixel_width(),
                    height: composed.pixel_height(),
                    css_width: composed.css_width,
                    css_height: composed.css_height,
                    pixel_ratio: composed.pixel_ratio,
                    ui_language: request.language,
                    grid_count,
                    footer_url: request.footer_url.clone(),
                    footer_scope: request.footer_scope,
                    boundaries,
                },
                png,
            )
            .await?;
        Ok(CaptureOutcome::NeedsSplit {
            session_id: session.id,
            part_count: grid_count,
        })
    }

    pub async fn get_session(&self, id: &str) -> CaptureResult<SessionView> {
        let (session, bytes) = self.sessions.load(id).await?;
        let image = image::load_from_memory(&bytes)?.to_rgba8();
        let data_url = format!("data:image/png;base64,{}", STANDARD.encode(&bytes));
        Ok(SessionView {
            session,
            image,
            data_url,
        })
    }

    /// Cut the session image at `boundaries` (CSS px) and write the parts.
    ///
    /// An empty `boundaries` exports at the session's default boundaries.
    /// The session is kept, so it can be exported again until it expires.
    #[instrument(skip(self, boundaries), fields(requested = boundaries.len()))]
    pub async fn export_session(&self, id: &str, boundaries: &[f64]) -> CaptureResult<ExportSummary> {
        let view = self.get_session(id).await?;
        let session = view.session;
        let content_height = session.content_css_height();
        let clean = if boundaries.is_empty() {
            let defaults: Vec<f64> = session.boundaries.iter().map(|b| f64::from(*b)).collect();
            normalize_boundaries(&defaults, content_height)
        } else {
            normalize_boundaries(boundaries, content_height)
        };

        let composed = ComposedImage::from_parts(
            view.image,
            session.css_width,
            session.css_height,
            session.pixel_ratio,
            0,
        );
        let footer = if !session.footer_url.is_empty() && session.footer_scope != FooterScope::None
        {
            Some(self.footer_for(&session.footer_url, session.ui_language).await)
        } else {
            None
        };
        let parts = Splitter::split(&composed, &clean, footer.as_ref(), session.footer_scope)?;
        let encodes = parts
            .into_iter()
            .map(|part| tokio::task::spawn_blocking(move || encode_png(&part.image)));
        let pngs = try_join_all(encodes)
            .await
            .map_err(|e| CaptureError::processing("encode parts", e.to_string()))?
            .into_iter()
            .collect::<CaptureResult<Vec<_>>>()?;
        let paths = self
            .writer
            .write_parts(self.sessions.now_ms(), &pngs)
            .await?;

        info!(session = id, parts = paths.len(), "Exported split session");
        Ok(ExportSummary {
            part_count: paths.len(),
            paths,
        })
    }

    pub async fn delete_session(&self, id: &str) -> CaptureResult<()> {
        self.sessions.delete(id).await
    }

    pub async fn sweep_sessions(&self) -> CaptureResult<usize> {
        self.sessions.sweep_expired().await
    }

    async fn footer_for(&self, link: &str, language: UiLanguage) -> FooterArtwork {
        self.footers.prepare(&FooterSpec::new(link, language)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> CaptureRequest {
        CaptureRequest {
            target: CaptureTarget {
                tab_id: Some(7),
                window_id: Some(WindowId(1)),
                page_url: Some("https://example.com/article".to_string()),
            },
            output_mode: OutputMode::Long,
            quality: OutputQuality::Standard,
            max_height: 0,
            crop: CropBounds::default(),
            footer_url: String::new(),
            footer_scope: FooterScope::None,
            language: UiLanguage::En,
        }
    }

    #[test]
    fn valid_request_yields_window() {
        assert_eq!(validate_request(&request()).unwrap(), WindowId(1));
    }

    #[test]
    fn missing_tab_is_rejected_first() {
        let mut req = request();
        req.target.tab_id = None;
        req.target.window_id = None;
        let err = validate_request(&req).unwrap_err();
        assert_eq!(err.category(), "validation");
        assert!(err.to_string().contains("Missing tab id"));

        req.target.tab_id = Some(0);
        assert_eq!(validate_request(&req).unwrap_err().category(), "validation");
    }

    #[test]
    fn malformed_footer_url_is_a_validation_error() {
        let mut req = request();
        req.footer_url = "not a url".to_string();
        assert_eq!(validate_request(&req).unwrap_err().category(), "validation");
    }

    #[test]
    fn missing_window_and_bad_scheme_are_environment_errors() {
        let mut req = request();
        req.target.window_id = None;
        let err = validate_request(&req).unwrap_err();
        assert_eq!(err.category(), "environment");
        assert!(err.to_string().contains("Invalid tab/window context"));

        let mut req = request();
        req.target.page_url = Some("chrome://settings".to_string());
        let err = validate_request(&req).unwrap_err();
        assert_eq!(err.category(), "environment");
        assert!(err.to_string().contains("http/https"));

        req.target.page_url = None;
        assert_eq!(validate_request(&req).unwrap_err().category(), "environment");
    }
}
