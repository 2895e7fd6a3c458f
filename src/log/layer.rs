//! `tracing` integration.

use std::fmt::{self, Write as _};
use std::path::Path;
use std::sync::Arc;

use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::Layer;
use tracing_subscriber::layer::Context;
use tracing_subscriber::registry::LookupSpan;

use super::Log;

/// Writes `tracing` events into a [`Log`].
///
/// The context column shows the innermost span name, or the event target when
/// the event is outside any span. Structured fields follow the message as
/// `key=value`.
#[derive(Debug, Clone)]
pub struct LogLayer {
    log: Arc<Log>,
}

impl LogLayer {
    #[must_use]
    pub const fn new(log: Arc<Log>) -> Self {
        Self { log }
    }
}

impl<S> Layer<S> for LogLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        let meta = event.metadata();
        if !self.log.enabled(*meta.level()) {
            return;
        }

        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);

        let file = meta.file().map_or("-", source_file_name);
        let span = ctx.event_span(event);
        let context = span.as_ref().map_or(meta.target(), |span| span.name());
        self.log
            .write_line(*meta.level(), file, context, &visitor.finish());
    }
}

/// Base name of a source path as reported by `file!()` or `Location`.
pub(super) fn source_file_name(path: &str) -> &str {
    Path::new(path)
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or(path)
}

#[derive(Default)]
struct MessageVisitor {
    message: String,
    fields: String,
}

impl MessageVisitor {
    fn finish(self) -> String {
        if self.message.is_empty() {
            self.fields.trim_start().to_string()
        } else {
            self.message + &self.fields
        }
    }
}

impl Visit for MessageVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message.push_str(value);
        } else {
            let _ = write!(self.fields, " {}={value}", field.name());
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            let _ = write!(self.message, "{value:?}");
        } else {
            let _ = write!(self.fields, " {}={value:?}", field.name());
        }
    }
}
