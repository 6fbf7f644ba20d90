//! # Processing Module
//!
//! Pixel work after capture: stitching frames into a long image, cutting it
//! into parts and painting the informational footer band.

pub mod code_image;
pub mod footer;
pub mod resample;
pub mod split;
pub mod stitch;
pub mod text;

pub use code_image::{CodeImageProvider, HttpCodeProvider, NoCodeProvider};
pub use footer::{FooterArtwork, FooterCompositor, FooterSpec};
pub use split::{SplitPart, Splitter};
pub use stitch::{ComposedImage, StitchRequest, Stitcher};
