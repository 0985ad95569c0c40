// Copyright (C) 2022-2025 Michael Herstine <sp1ff@pobox.com>
//
// This file is part of gelf-tracing.
//
// gelf-tracing is free software: you can redistribute it and/or modify it under the terms of the
// GNU General Public License as published by the Free Software Foundation, either version 3 of the
// License, or (at your option) any later version.
//
// gelf-tracing is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without
// even the implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU
// General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with gelf-tracing.  If
// not, see <http://www.gnu.org/licenses/>.

//! Primitives for mapping [`tracing`] entities to GELF [`LogEvent`]s.
//!
//! [`tracing`]: https://docs.rs/tracing/latest/tracing/index.html
//!
//! A [`tracing`] [`Event`] carries a set of typed fields, one of which (by convention, "message")
//! is the human-readable text. [`EventVisitor`] walks those fields & sorts them into a
//! [`LogEvent`]:
//!
//! - the "message" field becomes the message text
//! - a field recorded as a [`std::error::Error`] becomes the event's [`Throwable`]
//! - signed & unsigned integers and floats become numeric additional fields
//! - everything else (strings, booleans, [`Debug`] values) becomes a string additional field
//!
//! [`Event`]: https://docs.rs/tracing/0.1.35/tracing/struct.Event.html
//! [`Debug`]: std::fmt::Debug

use crate::{
    builder::{LogEvent, Throwable},
    level::Level,
};

use tracing::field::{Field, Visit};

/// Name of the thread on which the event was recorded
pub const THREAD_NAME_FIELD: &str = "thread_name";
/// The event's target (typically the module path of the code that emitted it)
pub const LOGGER_NAME_FIELD: &str = "logger_name";
/// The event's [`tracing::Level`], as [`tracing`] spells it
pub const NATIVE_LEVEL_FIELD: &str = "native_level";
pub const SOURCE_FILE_FIELD: &str = "source_file";
pub const SOURCE_LINE_FIELD: &str = "source_line";
pub const SOURCE_MODULE_FIELD: &str = "source_module";
/// Name of the innermost span enclosing the event, if any
pub const LOGGER_NDC_FIELD: &str = "logger_ndc";

/// The field tracing's macros use for the formatted message
const MESSAGE_FIELD: &str = "message";

/// Map [`tracing::Level`] to syslog severity.
pub fn default_level_mapping(level: &tracing::Level) -> Level {
    match *level {
        tracing::Level::TRACE | tracing::Level::DEBUG => Level::LOG_DEBUG,
        tracing::Level::INFO => Level::LOG_INFO,
        tracing::Level::WARN => Level::LOG_WARNING,
        tracing::Level::ERROR => Level::LOG_ERR,
    }
}

/// Accumulates an [`Event`]'s fields into a [`LogEvent`].
///
/// [`Event`]: https://docs.rs/tracing/0.1.35/tracing/struct.Event.html
#[derive(Default)]
pub struct EventVisitor {
    event: LogEvent,
}

impl EventVisitor {
    pub fn new() -> EventVisitor {
        EventVisitor::default()
    }
    pub fn into_event(self) -> LogEvent {
        self.event
    }
}

// `log` records bridged by tracing-log carry their metadata as "log.*" fields; that's already
// been recovered via `NormalizeEvent` by the time we see it
fn is_log_metadata(field: &Field) -> bool {
    field.name().starts_with("log.")
}

impl Visit for EventVisitor {
    fn record_i64(&mut self, field: &Field, value: i64) {
        if !is_log_metadata(field) {
            self.event.add_field(field.name(), value);
        }
    }
    fn record_u64(&mut self, field: &Field, value: u64) {
        if !is_log_metadata(field) {
            self.event.add_field(field.name(), value);
        }
    }
    fn record_f64(&mut self, field: &Field, value: f64) {
        self.event.add_field(field.name(), value);
    }
    fn record_bool(&mut self, field: &Field, value: bool) {
        self.event.add_field(field.name(), value);
    }
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == MESSAGE_FIELD {
            self.event.set_message(Some(value.to_owned()));
        } else if !is_log_metadata(field) {
            self.event.add_field(field.name(), value);
        }
    }
    // The error travels as the event's throwable only; the builder decides whether it lands in
    // `full_message` or the "exception" field.
    fn record_error(&mut self, _field: &Field, value: &(dyn std::error::Error + 'static)) {
        self.event.set_throwable(Some(Throwable::from_error(value)));
    }
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == MESSAGE_FIELD {
            // The tracing macros pre-format `message` so that `value` is a
            // `std::fmt::Arguments`, which debug-prints without enclosing quotes.
            self.event.set_message(Some(format!("{:?}", value)));
        } else if !is_log_metadata(field) {
            self.event.add_field(field.name(), format!("{:?}", value));
        }
    }
}
