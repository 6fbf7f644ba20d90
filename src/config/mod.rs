//! # Configuration Module
//!
//! Configuration structures and input helpers for capture operations.

pub mod config;

pub use config::{CaptureConfig, UiLanguage};
