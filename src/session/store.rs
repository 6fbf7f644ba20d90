//! Session metadata, lifetime and crop-bounds persistence on top of
//! [`KvStore`] and [`BlobStore`].

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use longshot_layout::geometry::CropBounds;
use longshot_layout::presets::FooterScope;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::{BlobStore, KvStore};
use crate::config::UiLanguage;
use crate::error::{CaptureError, CaptureResult};

pub const SESSION_KEY_PREFIX: &str = "captureMeta:";
pub const CROP_BOUNDS_KEY: &str = "lastCropBounds";
pub const SESSION_TTL: Duration = Duration::from_secs(2 * 60 * 60);

const ID_SUFFIX_LEN: usize = 6;
const BASE36: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Wall-clock source in unix milliseconds.
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> u64;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }
}

/// A clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    now_ms: AtomicU64,
}

impl ManualClock {
    pub fn new(now_ms: u64) -> Self {
        Self {
            now_ms: AtomicU64::new(now_ms),
        }
    }

    pub fn advance(&self, by: Duration) {
        self.now_ms
            .fetch_add(by.as_millis() as u64, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now_ms.load(Ordering::SeqCst)
    }
}

/// Persisted metadata of a multi-part capture.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureSession {
    pub id: String,
    pub created_at: u64,
    /// Pixel size of the stored image.
    pub width: u32,
    pub height: u32,
    pub css_width: u32,
    pub css_height: u32,
    pub pixel_ratio: f64,
    pub ui_language: UiLanguage,
    pub grid_count: u32,
    pub footer_url: String,
    pub footer_scope: FooterScope,
    /// Default boundaries, CSS px from the top of the content.
    pub boundaries: Vec<u32>,
}

impl CaptureSession {
    pub fn is_expired(&self, now_ms: u64, ttl: Duration) -> bool {
        now_ms.saturating_sub(self.created_at) > ttl.as_millis() as u64
    }

    /// Session images never carry a footer, so all CSS height is content.
    pub fn content_css_height(&self) -> u32 {
        self.css_height.max(1)
    }
}

/// Everything about a session except its identity.
#[derive(Clone, Debug, PartialEq)]
pub struct SessionDraft {
    pub width: u32,
    pub height: u32,
    pub css_width: u32,
    pub css_height: u32,
    pub pixel_ratio: f64,
    pub ui_language: UiLanguage,
    pub grid_count: u32,
    pub footer_url: String,
    pub footer_scope: FooterScope,
    pub boundaries: Vec<u32>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CropEdge {
    Left,
    Right,
    Top,
    Bottom,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredCropBounds {
    #[serde(flatten)]
    bounds: CropBounds,
    #[serde(default)]
    page_url: Option<String>,
    saved_at: u64,
}

pub struct SessionStore {
    kv: Arc<dyn KvStore>,
    blobs: Arc<dyn BlobStore>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
}

impl SessionStore {
    pub fn new(kv: Arc<dyn KvStore>, blobs: Arc<dyn BlobStore>) -> Self {
        Self {
            kv,
            blobs,
            clock: Arc::new(SystemClock),
            ttl: SESSION_TTL,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn now_ms(&self) -> u64 {
        self.clock.now_ms()
    }

    /// `<unix ms>_<6 lowercase base36 chars>`.
    pub fn new_session_id(&self) -> String {
        let mut rng = rand::thread_rng();
        let suffix: String = (0..ID_SUFFIX_LEN)
            .map(|_| char::from(BASE36[rng.gen_range(0..BASE36.len())]))
            .collect();
        format!("{}_{}", self.clock.now_ms(), suffix)
    }

    fn meta_key(id: &str) -> String {
        format!("{SESSION_KEY_PREFIX}{id}")
    }

    /// Store `image` (encoded bytes) with `draft` under a fresh id.
    pub async fn create(&self, draft: SessionDraft, image: Vec<u8>) -> CaptureResult<CaptureSession> {
        let session = CaptureSession {
            id: self.new_session_id(),
            created_at: self.clock.now_ms(),
            width: draft.width,
            height: draft.height,
            css_width: draft.css_width,
            css_height: draft.css_height,
            pixel_ratio: draft.pixel_ratio,
            ui_language: draft.ui_language,
            grid_count: draft.grid_count,
            footer_url: draft.footer_url,
            footer_scope: draft.footer_scope,
            boundaries: draft.boundaries,
        };
        let size = image.len();
        self.blobs.put(&session.id, image).await?;
        self.kv
            .put(&Self::meta_key(&session.id), serde_json::to_value(&session)?)
            .await?;
        info!(
            session = %session.id,
            parts = session.grid_count,
            bytes = size,
            "Saved capture session"
        );
        Ok(session)
    }

    /// Load a session and its image bytes.
    ///
    /// Expired sessions are deleted on the way out and reported as not found.
    pub async fn load(&self, id: &str) -> CaptureResult<(CaptureSession, Vec<u8>)> {
        let Some(value) = self.kv.get(&Self::meta_key(id)).await? else {
            return Err(CaptureError::session_not_found(id, false));
        };
        let session: CaptureSession = serde_json::from_value(value)?;
        if session.is_expired(self.clock.now_ms(), self.ttl) {
            info!(session = id, "Capture session expired");
            self.delete(id).await?;
            return Err(CaptureError::session_not_found(id, true));
        }
        let Some(bytes) = self.blobs.get(id).await? else {
            warn!(session = id, "Session image is missing");
            return Err(CaptureError::session_not_found(id, false));
        };
        Ok((session, bytes))
    }

    pub async fn delete(&self, id: &str) -> CaptureResult<()> {
        self.kv.delete(&Self::meta_key(id)).await?;
        self.blobs.delete(id).await?;
        debug!(session = id, "Deleted capture session");
        Ok(())
    }

    /// Remove every expired session. Unreadable records are removed too.
    pub async fn sweep_expired(&self) -> CaptureResult<usize> {
        let now = self.clock.now_ms();
        let mut removed = 0;
        for key in self.kv.keys(SESSION_KEY_PREFIX).await? {
            let id = &key[SESSION_KEY_PREFIX.len()..];
            let stale = match self.kv.get(&key).await? {
                Some(value) => serde_json::from_value::<CaptureSession>(value)
                    .map(|session| session.is_expired(now, self.ttl))
                    .unwrap_or(true),
                None => false,
            };
            if stale {
                self.delete(id).await?;
                removed += 1;
            }
        }
        if removed > 0 {
            info!(removed, "Swept expired capture sessions");
        }
        Ok(removed)
    }

    /// Remember `bounds` for `page_url`.
    pub async fn save_crop_bounds(
        &self,
        bounds: CropBounds,
        page_url: Option<&str>,
    ) -> CaptureResult<()> {
        let stored = StoredCropBounds {
            bounds: bounds.normalized(),
            page_url: page_url.map(str::to_string),
            saved_at: self.clock.now_ms(),
        };
        self.kv
            .put(CROP_BOUNDS_KEY, serde_json::to_value(&stored)?)
            .await
    }

    /// Stored bounds, when they were saved for `page_url` or for no page.
    pub async fn load_crop_bounds(&self, page_url: Option<&str>) -> CaptureResult<CropBounds> {
        let Some(value) = self.kv.get(CROP_BOUNDS_KEY).await? else {
            return Ok(CropBounds::default());
        };
        let stored: StoredCropBounds = match serde_json::from_value(value) {
            Ok(stored) => stored,
            Err(e) => {
                warn!(error = %e, "Ignoring unreadable crop bounds");
                return Ok(CropBounds::default());
            }
        };
        let matches = match (&stored.page_url, page_url) {
            (None, _) => true,
            (Some(saved), Some(current)) => saved == current,
            (Some(_), None) => false,
        };
        Ok(if matches {
            stored.bounds.normalized()
        } else {
            CropBounds::default()
        })
    }

    /// Drop one edge of the stored bounds, keeping the rest.
    pub async fn clear_crop_edge(&self, edge: CropEdge, page_url: Option<&str>) -> CaptureResult<()> {
        let mut bounds = self.load_crop_bounds(page_url).await?;
        match edge {
            CropEdge::Left => bounds.left = None,
            CropEdge::Right => bounds.right = None,
            CropEdge::Top => bounds.top = None,
            CropEdge::Bottom => bounds.bottom = None,
        }
        self.save_crop_bounds(bounds, page_url).await
    }
}
