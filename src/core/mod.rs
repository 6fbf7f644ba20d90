//! # Core Infrastructure Module
//!
//! Small shared infrastructure used by the pipeline stages.

pub mod bounded_cache;
