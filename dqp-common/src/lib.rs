//! # DQP Common Library
//!
//! Shared code for the document query progress crates:
//! - Progress model (stages, sources, progress documents)
//! - Progress events and EventBus
//! - Configuration loading
//! - Tracing setup
//! - Error types

pub mod config;
pub mod error;
pub mod events;
pub mod logging;
pub mod models;

pub use error::{Error, Result};
