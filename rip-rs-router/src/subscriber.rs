use std::fmt::{Debug, Write};
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::event::Event;
use tracing::field::{Field, Visit};
use tracing::{span, Id, Level, Metadata, Subscriber};

/// Prints every event on one stderr line: level, target, message, then the remaining fields as
/// `name=value`. Debug and trace events only show up when verbose.
pub struct RouterSubscriber {
    ids: AtomicUsize,
    max_level: Level,
}

impl RouterSubscriber {
    pub fn new(verbose: bool) -> Self {
        RouterSubscriber {
            ids: AtomicUsize::new(1),
            max_level: if verbose { Level::TRACE } else { Level::INFO },
        }
    }

    fn is_enabled(&self, level: &Level) -> bool {
        *level <= self.max_level
    }
}

// https://docs.rs/tracing/0.1/tracing/subscriber/trait.Subscriber.html
impl Subscriber for RouterSubscriber {
    fn enabled(&self, metadata: &Metadata) -> bool {
        self.is_enabled(metadata.level())
    }

    // Spans carry nothing the log needs, they only get unique ids
    fn new_span(&self, _span: &span::Attributes) -> Id {
        let id = self.ids.fetch_add(1, Ordering::SeqCst);
        Id::from_u64(id as u64)
    }

    fn record(&self, _span: &Id, _values: &span::Record) {}

    fn record_follows_from(&self, _span: &Id, _follows: &Id) {}

    fn event(&self, event: &Event) {
        let mut visitor = LineVisitor::default();
        event.record(&mut visitor);
        let metadata = event.metadata();
        eprintln!(
            "{:>5} {}: {}{}",
            metadata.level(),
            metadata.target(),
            visitor.message,
            visitor.fields
        );
    }

    fn enter(&self, _span: &Id) {}

    fn exit(&self, _span: &Id) {}
}

#[derive(Default)]
struct LineVisitor {
    message: String,
    fields: String,
}

impl Visit for LineVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.record_debug(field, &format_args!("{}", value))
    }

    fn record_debug(&mut self, field: &Field, value: &dyn Debug) {
        if field.name() == "message" {
            let _ = write!(self.message, "{:?}", value);
        } else {
            let _ = write!(self.fields, " {}={:?}", field.name(), value);
        }
    }
}
