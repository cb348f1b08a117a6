//! Test Helper Utilities
//!
//! Shared utilities for testing dqp-tracker

#![allow(dead_code)]

pub mod db_utils;
pub mod doubles;
pub mod log_capture;

// Re-export commonly used items
pub use db_utils::{count_rows, create_test_db};
pub use doubles::{FailingCommitStore, FailingNotifier, LockedStore, RecordingNotifier};
pub use log_capture::{init_test_logging, LogCapture};
