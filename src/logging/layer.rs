// Bridge from tracing events into the logger directory

use crate::error::{LogCtlError, Result};
use crate::logging::{Level, LogRecord, LoggerDirectory};
use std::fmt::Write as _;
use std::sync::Arc;
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

/// Layer publishing every tracing event to the logger named after its target
///
/// `logctl::control::tail` becomes the logger `logctl.control.tail`, so the
/// control plane can raise or attach handlers to real process output.
pub struct DirectoryLayer {
    directory: Arc<dyn LoggerDirectory>,
}

impl DirectoryLayer {
    pub fn new(directory: Arc<dyn LoggerDirectory>) -> Self {
        Self { directory }
    }
}

/// Logger name for a tracing target
pub fn logger_name(target: &str) -> String {
    target.replace("::", ".")
}

#[derive(Default)]
struct MessageVisitor {
    message: String,
    fields: String,
}

impl Visit for MessageVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message.push_str(value);
        } else {
            let _ = write!(self.fields, " {}={}", field.name(), value);
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            let _ = write!(self.message, "{:?}", value);
        } else {
            let _ = write!(self.fields, " {}={:?}", field.name(), value);
        }
    }
}

impl<S: Subscriber> Layer<S> for DirectoryLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();
        let name = logger_name(metadata.target());
        let level = Level::from(metadata.level());
        if !self.directory.is_loggable(&name, level) {
            return;
        }

        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);
        visitor.message.push_str(&visitor.fields);
        self.directory
            .publish(LogRecord::new(name, level, visitor.message));
    }
}

/// Install the process subscriber: a console `fmt` layer filtered by
/// `RUST_LOG` (or `default_filter`), plus the directory bridge
pub fn init_tracing(directory: Arc<dyn LoggerDirectory>, default_filter: &str) -> Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_filter(env_filter),
        )
        .with(DirectoryLayer::new(directory))
        .try_init()
        .map_err(|e| LogCtlError::Internal(format!("Failed to install tracing subscriber: {}", e)))
}
