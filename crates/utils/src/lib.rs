//! Shared utilities for cachefn
//!
//! Small, mostly pure helpers used across the workspace: tracing subscriber
//! initialisation, interval jitter sampling, and XDG config paths.

pub mod jitter;
pub mod tracing;
pub mod xdg;

pub use jitter::{apply_jitter, apply_jitter_with};
pub use xdg::XdgPaths;
