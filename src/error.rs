//! # Errors
//!
//! One error enum for the whole library plus a few traits the pipeline and
//! the CLI use to decide what to do with a failure.
//!
//! ## How failures are treated
//!
//! - `Validation`: malformed footer URL, missing tab id. Raised before the
//!   page is touched.
//! - `Environment`: the page cannot be captured at all (not http/https, no
//!   window). Also raised before the page is touched.
//! - `Throttled`: the snapshot source was called too often. The only error
//!   [`Retryable::is_retryable`] accepts; the rate limiter backs off and retries.
//! - `SessionNotFound`: unknown or expired session. Carries a "capture again"
//!   suggestion.
//! - `FrameCapture`, `PageDriver`, `Processing`, `Io`, `External`, `Network`,
//!   `Timeout`: propagated as they are.
//!
//! A document that ends early or frames that leave gaps are not errors; the
//! stitcher trims and clamps instead.
//!
//! ```rust
//! use longshot::error::{CaptureError, HasRecoverySuggestion, Retryable};
//!
//! let busy = CaptureError::throttled(4, "MAX_CAPTURE_VISIBLE_TAB_CALLS_PER_SECOND")
//!     .with_operation("capture_visible_viewport");
//! assert!(busy.is_retryable());
//!
//! let gone = CaptureError::session_not_found("1700000000000_abc123", true);
//! assert!(!gone.is_retryable());
//! assert!(gone.recovery_suggestion().is_some());
//! ```

use std::collections::HashMap;
use std::error::Error as StdError;
use std::fmt;
use std::path::Path;
use std::time::SystemTime;

const RECAPTURE_HINT: &str = "Capture session expired. Please capture again.";

/// How bad a failure is for the current run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Info,
    /// The run can continue or be repeated as is
    Warning,
    /// The current operation was aborted
    Error,
    /// The page or a store may be left in an unexpected state
    Critical,
}

/// Details attached to every [`CaptureError`].
#[derive(Debug, Clone)]
pub struct ErrorContext {
    pub timestamp: SystemTime,
    /// Step that was running, e.g. `capture_visible_viewport`
    pub operation: Option<String>,
    /// Free-form detail such as the frame or path involved
    pub context: Option<String>,
    /// Message shown to the user next to the error
    pub recovery_suggestion: Option<String>,
    pub severity: ErrorSeverity,
    pub retryable: bool,
    pub recoverable: bool,
    pub metadata: HashMap<String, String>,
}

impl Default for ErrorContext {
    fn default() -> Self {
        Self {
            timestamp: SystemTime::now(),
            operation: None,
            context: None,
            recovery_suggestion: None,
            severity: ErrorSeverity::Error,
            retryable: false,
            recoverable: false,
            metadata: HashMap::new(),
        }
    }
}

impl ErrorContext {
    pub fn new() -> Self {
        Self::default()
    }
}

#[derive(Debug)]
pub enum CaptureError {
    /// A request or setting was rejected
    Validation {
        field: String,
        constraint: String,
        value: String,
        context: ErrorContext,
    },
    /// The page or window cannot be captured
    Environment {
        requirement: String,
        reason: String,
        context: ErrorContext,
    },
    /// The snapshot source reported "too many calls"
    Throttled {
        attempts: u32,
        reason: String,
        context: ErrorContext,
    },
    /// Any other snapshot failure
    FrameCapture {
        reason: String,
        context: ErrorContext,
    },
    /// Reading metrics or scrolling failed
    PageDriver {
        operation: String,
        reason: String,
        context: ErrorContext,
    },
    SessionNotFound {
        session_id: String,
        expired: bool,
        context: ErrorContext,
    },
    /// Decoding, resampling, painting or encoding failed
    Processing {
        operation: String,
        reason: String,
        context: ErrorContext,
    },
    Io {
        operation: String,
        path: Option<String>,
        source: std::io::Error,
        context: ErrorContext,
    },
    /// A third-party crate failed in a way with no better variant
    External {
        library: String,
        source: Box<dyn StdError + Send + Sync>,
        context: ErrorContext,
    },
    Network {
        operation: String,
        address: Option<String>,
        source: Option<Box<dyn StdError + Send + Sync>>,
        context: ErrorContext,
    },
    Timeout {
        operation: String,
        duration_ms: u64,
        context: ErrorContext,
    },
}

impl CaptureError {
    pub fn validation(
        field: impl Into<String>,
        constraint: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self::Validation {
            field: field.into(),
            constraint: constraint.into(),
            value: value.into(),
            context: ErrorContext::new(),
        }
    }

    pub fn environment(requirement: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Environment {
            requirement: requirement.into(),
            reason: reason.into(),
            context: ErrorContext::new(),
        }
    }

    /// `attempts` is the number of calls made so far.
    pub fn throttled(attempts: u32, reason: impl Into<String>) -> Self {
        let context = ErrorContext {
            retryable: true,
            severity: ErrorSeverity::Warning,
            ..ErrorContext::default()
        };
        Self::Throttled {
            attempts,
            reason: reason.into(),
            context,
        }
    }

    pub fn frame_capture(reason: impl Into<String>) -> Self {
        Self::FrameCapture {
            reason: reason.into(),
            context: ErrorContext::new(),
        }
    }

    pub fn page_driver(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::PageDriver {
            operation: operation.into(),
            reason: reason.into(),
            context: ErrorContext::new(),
        }
    }

    pub fn session_not_found(session_id: impl Into<String>, expired: bool) -> Self {
        let context = ErrorContext {
            recovery_suggestion: Some(RECAPTURE_HINT.to_string()),
            severity: ErrorSeverity::Warning,
            ..ErrorContext::default()
        };
        Self::SessionNotFound {
            session_id: session_id.into(),
            expired,
            context,
        }
    }

    pub fn processing(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Processing {
            operation: operation.into(),
            reason: reason.into(),
            context: ErrorContext::new(),
        }
    }

    /// I/O failure on a known file or directory.
    pub fn io_at(operation: impl Into<String>, path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            operation: operation.into(),
            path: Some(path.as_ref().display().to_string()),
            source,
            context: ErrorContext::new(),
        }
    }

    pub fn external(library: impl Into<String>, source: impl StdError + Send + Sync + 'static) -> Self {
        Self::External {
            library: library.into(),
            source: Box::new(source),
            context: ErrorContext::new(),
        }
    }

    pub fn network(
        operation: impl Into<String>,
        address: Option<String>,
        source: Option<Box<dyn StdError + Send + Sync>>,
    ) -> Self {
        Self::Network {
            operation: operation.into(),
            address,
            source,
            context: ErrorContext::new(),
        }
    }

    pub fn timeout(operation: impl Into<String>, duration_ms: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            duration_ms,
            context: ErrorContext::new(),
        }
    }

    pub fn with_context(mut self, detail: impl Into<String>) -> Self {
        self.context_mut().context = Some(detail.into());
        self
    }

    pub fn with_operation(mut self, operation: impl Into<String>) -> Self {
        self.context_mut().operation = Some(operation.into());
        self
    }

    pub fn with_recovery_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.context_mut().recovery_suggestion = Some(suggestion.into());
        self
    }

    pub fn with_severity(mut self, severity: ErrorSeverity) -> Self {
        self.context_mut().severity = severity;
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context_mut().metadata.insert(key.into(), value.into());
        self
    }

    pub fn is_throttled(&self) -> bool {
        matches!(self, Self::Throttled { .. })
    }

    pub fn context(&self) -> &ErrorContext {
        match self {
            Self::Validation { context, .. }
            | Self::Environment { context, .. }
            | Self::Throttled { context, .. }
            | Self::FrameCapture { context, .. }
            | Self::PageDriver { context, .. }
            | Self::SessionNotFound { context, .. }
            | Self::Processing { context, .. }
            | Self::Io { context, .. }
            | Self::External { context, .. }
            | Self::Network { context, .. }
            | Self::Timeout { context, .. } => context,
        }
    }

    fn context_mut(&mut self) -> &mut ErrorContext {
        match self {
            Self::Validation { context, .. }
            | Self::Environment { context, .. }
            | Self::Throttled { context, .. }
            | Self::FrameCapture { context, .. }
            | Self::PageDriver { context, .. }
            | Self::SessionNotFound { context, .. }
            | Self::Processing { context, .. }
            | Self::Io { context, .. }
            | Self::External { context, .. }
            | Self::Network { context, .. }
            | Self::Timeout { context, .. } => context,
        }
    }

    /// Stable snake_case name of the variant, used in logs and tests.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "validation",
            Self::Environment { .. } => "environment",
            Self::Throttled { .. } => "throttled",
            Self::FrameCapture { .. } => "frame_capture",
            Self::PageDriver { .. } => "page_driver",
            Self::SessionNotFound { .. } => "session_not_found",
            Self::Processing { .. } => "processing",
            Self::Io { .. } => "io",
            Self::External { .. } => "external",
            Self::Network { .. } => "network",
            Self::Timeout { .. } => "timeout",
        }
    }
}

impl fmt::Display for CaptureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Validation {
                field,
                constraint,
                value,
                ..
            } => {
                if value.is_empty() {
                    write!(f, "Invalid {field}: {constraint}")
                } else {
                    write!(f, "Invalid {field}: {constraint} (got {value:?})")
                }
            }
            Self::Environment {
                requirement,
                reason,
                ..
            } => write!(f, "Cannot capture, {requirement} required: {reason}"),
            Self::Throttled {
                attempts, reason, ..
            } => write!(f, "Snapshot throttled after {attempts} call(s): {reason}"),
            Self::FrameCapture { reason, .. } => write!(f, "Snapshot failed: {reason}"),
            Self::PageDriver {
                operation, reason, ..
            } => write!(f, "Page {operation} failed: {reason}"),
            Self::SessionNotFound {
                session_id,
                expired: true,
                ..
            } => write!(f, "Session {session_id} has expired"),
            Self::SessionNotFound { session_id, .. } => {
                write!(f, "No session with id {session_id}")
            }
            Self::Processing {
                operation, reason, ..
            } => write!(f, "Could not {operation}: {reason}"),
            Self::Io {
                operation,
                path: Some(path),
                source,
                ..
            } => write!(f, "Could not {operation} ({path}): {source}"),
            Self::Io {
                operation, source, ..
            } => write!(f, "Could not {operation}: {source}"),
            Self::External {
                library, source, ..
            } => write!(f, "{library}: {source}"),
            Self::Network {
                operation,
                address: Some(address),
                ..
            } => write!(f, "{operation} to {address} failed"),
            Self::Network { operation, .. } => write!(f, "{operation} failed"),
            Self::Timeout {
                operation,
                duration_ms,
                ..
            } => write!(f, "{operation} timed out after {duration_ms}ms"),
        }
    }
}

impl StdError for CaptureError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::External { source, .. } => Some(source.as_ref()),
            Self::Network {
                source: Some(source),
                ..
            } => Some(source.as_ref()),
            _ => None,
        }
    }
}

pub type CaptureResult<T> = Result<T, CaptureError>;

pub trait Retryable {
    fn is_retryable(&self) -> bool;

    /// Backoff before the next attempt, when the error is retried at all.
    fn retry_delay_ms(&self) -> Option<u64> {
        None
    }

    fn max_retries(&self) -> Option<usize> {
        None
    }
}

impl Retryable for CaptureError {
    fn is_retryable(&self) -> bool {
        self.is_throttled() && self.context().retryable
    }

    fn retry_delay_ms(&self) -> Option<u64> {
        match self {
            Self::Throttled { attempts, .. } => {
                Some(800 + 400 * u64::from(attempts.saturating_sub(1)))
            }
            _ => None,
        }
    }

    fn max_retries(&self) -> Option<usize> {
        self.is_throttled().then_some(3)
    }
}

/// Whether the user can get past the failure without changing code.
pub trait Recoverable {
    fn is_recoverable(&self) -> bool;
}

impl Recoverable for CaptureError {
    fn is_recoverable(&self) -> bool {
        self.context().recoverable
            || matches!(
                self,
                Self::Throttled { .. }
                    | Self::SessionNotFound { .. }
                    | Self::Network { .. }
                    | Self::Timeout { .. }
            )
    }
}

pub trait HasSeverity {
    fn severity(&self) -> ErrorSeverity;
}

impl HasSeverity for CaptureError {
    fn severity(&self) -> ErrorSeverity {
        self.context().severity
    }
}

pub trait HasRecoverySuggestion {
    fn recovery_suggestion(&self) -> Option<&str>;
}

impl HasRecoverySuggestion for CaptureError {
    fn recovery_suggestion(&self) -> Option<&str> {
        self.context().recovery_suggestion.as_deref()
    }
}

/// Coarse grouping used by the CLI.
pub mod classify {
    use super::CaptureError;

    /// Rejected before anything ran.
    pub fn is_rejected_input(error: &CaptureError) -> bool {
        matches!(
            error,
            CaptureError::Validation { .. } | CaptureError::Environment { .. }
        )
    }

    pub fn requires_recapture(error: &CaptureError) -> bool {
        matches!(error, CaptureError::SessionNotFound { .. })
    }

    /// 2 for rejected input, 3 when a new capture is needed, 1 otherwise.
    pub fn exit_code(error: &CaptureError) -> i32 {
        if is_rejected_input(error) {
            2
        } else if requires_recapture(error) {
            3
        } else {
            1
        }
    }
}

impl From<std::io::Error> for CaptureError {
    fn from(source: std::io::Error) -> Self {
        Self::Io {
            operation: "access a file".to_string(),
            path: None,
            source,
            context: ErrorContext::new(),
        }
    }
}

impl From<serde_json::Error> for CaptureError {
    fn from(error: serde_json::Error) -> Self {
        Self::external("serde_json", error)
    }
}

impl From<image::ImageError> for CaptureError {
    fn from(error: image::ImageError) -> Self {
        Self::processing("decode or encode an image", error.to_string())
    }
}

impl From<reqwest::Error> for CaptureError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            return Self::timeout("HTTP request", 0).with_context(error.to_string());
        }
        let address = error.url().map(|url| url.to_string());
        Self::network("HTTP request", address, Some(Box::new(error)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_errors_are_rejected_input() {
        let error = CaptureError::validation("footer_url", "must be a valid URL", "not-a-url");
        assert_eq!(error.category(), "validation");
        assert!(!error.is_retryable());
        assert!(classify::is_rejected_input(&error));
        assert_eq!(classify::exit_code(&error), 2);
        assert_eq!(
            error.to_string(),
            "Invalid footer_url: must be a valid URL (got \"not-a-url\")"
        );
    }

    #[test]
    fn only_throttling_is_retryable() {
        let throttled = CaptureError::throttled(1, "MAX_CAPTURE_VISIBLE_TAB_CALLS_PER_SECOND");
        assert!(throttled.is_retryable());
        assert_eq!(throttled.retry_delay_ms(), Some(800));
        assert_eq!(throttled.max_retries(), Some(3));
        assert_eq!(throttled.severity(), ErrorSeverity::Warning);

        let third = CaptureError::throttled(3, "busy");
        assert_eq!(third.retry_delay_ms(), Some(1600));

        let other = CaptureError::frame_capture("tab closed");
        assert!(!other.is_retryable());
        assert_eq!(other.retry_delay_ms(), None);
        assert_eq!(other.max_retries(), None);
        assert!(!CaptureError::timeout("settle", 2200).is_retryable());
    }

    #[test]
    fn missing_sessions_ask_for_recapture() {
        let error = CaptureError::session_not_found("abc", true);
        assert!(classify::requires_recapture(&error));
        assert_eq!(classify::exit_code(&error), 3);
        assert!(error.is_recoverable());
        assert_eq!(error.recovery_suggestion(), Some(RECAPTURE_HINT));
        assert_eq!(error.to_string(), "Session abc has expired");
        assert_eq!(
            CaptureError::session_not_found("abc", false).to_string(),
            "No session with id abc"
        );
    }

    #[test]
    fn builders_fill_the_context() {
        let error = CaptureError::processing("decode frame", "truncated PNG")
            .with_context("frame at y=1600")
            .with_operation("compose")
            .with_metadata("frame_index", "3")
            .with_severity(ErrorSeverity::Critical);
        assert_eq!(error.category(), "processing");
        assert_eq!(error.severity(), ErrorSeverity::Critical);
        assert_eq!(error.context().context.as_deref(), Some("frame at y=1600"));
        assert_eq!(error.context().operation.as_deref(), Some("compose"));
        assert_eq!(
            error.context().metadata.get("frame_index").map(String::as_str),
            Some("3")
        );
        assert!(!error.is_recoverable());
    }

    #[test]
    fn io_errors_keep_their_source() {
        let error = CaptureError::io_at(
            "write image",
            "/tmp/out/a.png",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        assert_eq!(error.category(), "io");
        assert!(error.source().is_some());
        assert!(error.to_string().contains("/tmp/out/a.png"));
    }
}
