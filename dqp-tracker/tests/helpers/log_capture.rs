//! Log Capture Utilities for Testing
//!
//! Captures tracing events so tests can assert on what the tracker logged.
//! The capture is installed as the thread-local default subscriber, which
//! covers everything a current-thread `#[tokio::test]` runs.

use std::sync::{Arc, Mutex};
use tracing::subscriber::DefaultGuard;
use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;

/// Captured log record
#[derive(Debug, Clone)]
pub struct LogRecord {
    pub level: Level,
    pub target: String,
    pub message: String,
}

/// Log capture layer for testing
#[derive(Clone, Default)]
pub struct LogCapture {
    records: Arc<Mutex<Vec<LogRecord>>>,
}

impl LogCapture {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get all captured log records
    pub fn records(&self) -> Vec<LogRecord> {
        self.records.lock().unwrap().clone()
    }

    /// Count log messages at `level` containing `pattern`
    pub fn count_at(&self, level: Level, pattern: &str) -> usize {
        self.records()
            .iter()
            .filter(|r| r.level == level && r.message.contains(pattern))
            .count()
    }

    /// Assert at least one log at `level` contains `pattern`
    pub fn assert_logged(&self, level: Level, pattern: &str) {
        assert!(
            self.count_at(level, pattern) > 0,
            "Expected {} log matching '{}', but none found. All logs:\n{}",
            level,
            pattern,
            self.records()
                .iter()
                .map(|r| format!("{} {}: {}", r.level, r.target, r.message))
                .collect::<Vec<_>>()
                .join("\n")
        );
    }

    /// Assert no log at `level` contains `pattern`
    pub fn assert_not_logged(&self, level: Level, pattern: &str) {
        let count = self.count_at(level, pattern);
        assert_eq!(
            count, 0,
            "Expected no {} logs matching '{}', found {}",
            level, pattern, count
        );
    }
}

impl<S> tracing_subscriber::Layer<S> for LogCapture
where
    S: tracing::Subscriber,
{
    fn on_event(
        &self,
        event: &tracing::Event<'_>,
        _ctx: tracing_subscriber::layer::Context<'_, S>,
    ) {
        use tracing::field::Visit;

        struct MessageVisitor {
            message: String,
        }

        impl Visit for MessageVisitor {
            fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
                if field.name() == "message" {
                    self.message = format!("{:?}", value);
                    // Remove surrounding quotes
                    if self.message.starts_with('"') && self.message.ends_with('"') {
                        self.message = self.message[1..self.message.len() - 1].to_string();
                    }
                }
            }
        }

        let mut visitor = MessageVisitor {
            message: String::new(),
        };
        event.record(&mut visitor);

        self.records.lock().unwrap().push(LogRecord {
            level: *event.metadata().level(),
            target: event.metadata().target().to_string(),
            message: visitor.message,
        });
    }
}

/// Capture dqp_tracker logs on the current thread until the guard drops
pub fn init_test_logging() -> (LogCapture, DefaultGuard) {
    let capture = LogCapture::new();

    let subscriber = tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new("dqp_tracker=debug"))
        .with(capture.clone());
    let guard = tracing::subscriber::set_default(subscriber);

    (capture, guard)
}
