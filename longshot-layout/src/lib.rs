// SPDX-License-Identifier: MIT
//! # longshot-layout: Geometry and Split Math for Long Screenshots
//!
//! This crate holds the pure arithmetic behind long-screenshot capture. Nothing
//! in here touches pixels, the network or the filesystem; every function is a
//! deterministic mapping over integers (and the device pixel ratio where a
//! scale factor is unavoidable).
//!
//! ## Key Components
//!
//! - [`presets`]: Output modes, output quality and footer placement enums
//! - [`geometry`]: Page metrics, crop bounds and capture-rectangle resolution
//! - [`boundaries`]: Split-boundary normalization, default boundaries and pixel cuts
//!
//! ## Usage Example
//!
//! ```rust
//! use longshot_layout::boundaries::normalize_boundaries;
//! use longshot_layout::geometry::{resolve_capture_rect, CropBounds, PageMetrics};
//!
//! let metrics = PageMetrics {
//!     viewport_width: 1280,
//!     viewport_height: 800,
//!     doc_width: 1280,
//!     doc_height: 5000,
//!     ..PageMetrics::default()
//! };
//! let rect = resolve_capture_rect(&metrics, &CropBounds::default(), 0);
//! assert_eq!(rect.height, 5000);
//!
//! let cuts = normalize_boundaries(&[150.0, 100.0, 900.0, 905.0], 1000);
//! assert_eq!(cuts, vec![100, 150, 900]);
//! ```

pub mod boundaries;
pub mod geometry;
pub mod presets;
