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

//! [gelf-tracing](crate) [`Layer`] implementation.
//!
//! [`Layer`]: https://docs.rs/tracing-subscriber/latest/tracing_subscriber/layer/trait.Layer.html
//!
//! [`Layer`] turns each [`tracing`] [`Event`] into a GELF [`Message`] (via a [`MessageBuilder`])
//! & hands it to a [`Sender`]. By default that sender is whatever [`create_sender`] builds from a
//! [`SenderConfiguration`], but any [`Sender`] implementation will do.
//!
//! [`tracing`]: https://docs.rs/tracing/latest/tracing/index.html
//! [`Event`]: https://docs.rs/tracing/0.1.35/tracing/struct.Event.html
//! [`Message`]: crate::message::Message
//! [`create_sender`]: crate::factory::create_sender

use crate::{
    builder::{MessageBuilder, MessageBuilderConfiguration},
    config::SenderConfiguration,
    error::{default_error_handler, ErrorHandler, Result},
    factory::{create_sender_with_handler, GelfSender},
    level::Level,
    tracing::{
        default_level_mapping, EventVisitor, LOGGER_NAME_FIELD, LOGGER_NDC_FIELD,
        NATIVE_LEVEL_FIELD, SOURCE_FILE_FIELD, SOURCE_LINE_FIELD, SOURCE_MODULE_FIELD, THREAD_NAME_FIELD,
    },
    transport::Sender,
};

use tracing::Event;
use tracing_subscriber::{layer::Context, registry::LookupSpan};

// When the tracing-log feature is enabled, use NormalizeEvent to recover the target & location
// of events that originated from the `log` crate, the way tracing-subscriber's fmt layer does.
#[cfg(feature = "tracing-log")]
use tracing_log::NormalizeEvent;

/// Events from these targets are never forwarded: our own diagnostics, and those of the AMQP
/// client, which may be emitted while a send is in progress.
const IGNORED_TARGETS: [&str; 2] = ["gelf_tracing", "amiquip"];

type LevelMapping = Box<dyn Fn(&tracing::Level) -> Level + Send + Sync>;

fn is_ignored(target: &str) -> bool {
    IGNORED_TARGETS.iter().any(|prefix| {
        target
            .strip_prefix(prefix)
            .map_or(false, |rest| rest.is_empty() || rest.starts_with("::"))
    })
}

/// A [`tracing-subscriber`]-compliant [`Layer`] implementation that will send [`Event`]s to a
/// GELF collector.
///
/// [`tracing-subscriber`]: https://docs.rs/tracing-subscriber/latest/tracing_subscriber/index.html
/// [`Layer`]: https://docs.rs/tracing-subscriber/latest/tracing_subscriber/layer/trait.Layer.html
/// [`Event`]: https://docs.rs/tracing/0.1.35/tracing/struct.Event.html
///
/// Delivery failures are reported to the layer's [`ErrorHandler`]; they never reach the
/// instrumented code.
///
/// Each message carries the event's thread, target & level, the name of the innermost span in
/// which it was recorded (if any) and, unless turned off via [`with_location`], its source
/// location.
///
/// [`with_location`]: Layer::with_location
pub struct Layer<T: Sender = GelfSender> {
    builder: MessageBuilder,
    sender: T,
    map_level: LevelMapping,
    on_error: ErrorHandler,
    include_location: bool,
}

impl Layer<GelfSender> {
    /// Build a [`Layer`] from configuration: `sender_config` names the collector, `builder_config`
    /// says how messages should be populated.
    pub fn from_configuration(
        sender_config: &SenderConfiguration,
        builder_config: MessageBuilderConfiguration,
    ) -> Result<Self> {
        let on_error = default_error_handler();
        let sender = create_sender_with_handler(sender_config, on_error.clone())?;
        Ok(Layer::with_error_handler(
            MessageBuilder::new(builder_config),
            sender,
            on_error,
        ))
    }
    /// Attempt to construct a [`Layer`] that will send GELF messages via UDP to port 12201 on
    /// localhost
    pub fn try_default() -> Result<Self> {
        Layer::from_configuration(
            &SenderConfiguration::builder("udp://127.0.0.1:12201").build(),
            MessageBuilderConfiguration::default(),
        )
    }
}

impl<T: Sender> Layer<T> {
    /// Construct a Layer that will send messages built by `builder` through `sender`
    pub fn new(builder: MessageBuilder, sender: T) -> Self {
        Layer::with_error_handler(builder, sender, default_error_handler())
    }
    pub fn with_error_handler(builder: MessageBuilder, sender: T, on_error: ErrorHandler) -> Self {
        Layer {
            builder,
            sender,
            map_level: Box::new(default_level_mapping),
            on_error,
            include_location: true,
        }
    }
    /// Replace the default mapping from [`tracing::Level`] to syslog severity
    pub fn with_level_mapping<F>(mut self, map_level: F) -> Self
    where
        F: Fn(&tracing::Level) -> Level + Send + Sync + 'static,
    {
        self.map_level = Box::new(map_level);
        self
    }
    /// Whether to send each event's source file, line & module (on by default)
    pub fn with_location(mut self, include: bool) -> Self {
        self.include_location = include;
        self
    }
    pub fn sender(&self) -> &T {
        &self.sender
    }
}

impl<S, T> tracing_subscriber::layer::Layer<S> for Layer<T>
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
    T: Sender + 'static,
{
    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        // For native tracing events, normalized_metadata() returns None and we use the event's own
        // metadata.
        #[cfg(feature = "tracing-log")]
        let normalized_meta = event.normalized_metadata();
        #[cfg(feature = "tracing-log")]
        let meta = normalized_meta.as_ref().unwrap_or_else(|| event.metadata());
        #[cfg(not(feature = "tracing-log"))]
        let meta = event.metadata();

        if is_ignored(meta.target()) {
            return;
        }

        let mut visitor = EventVisitor::new();
        event.record(&mut visitor);
        let mut log_event = visitor
            .into_event()
            .with_syslog_level((self.map_level)(meta.level()));

        let thread = std::thread::current();
        match thread.name() {
            Some(name) => log_event.add_field(THREAD_NAME_FIELD, name),
            None => log_event.add_field(THREAD_NAME_FIELD, format!("{:?}", thread.id())),
        }
        log_event.add_field(LOGGER_NAME_FIELD, meta.target());
        log_event.add_field(NATIVE_LEVEL_FIELD, meta.level().to_string());
        if let Some(span) = ctx.event_span(event) {
            log_event.add_field(LOGGER_NDC_FIELD, span.name());
        }
        if self.include_location {
            if let Some(file) = meta.file() {
                log_event.add_field(SOURCE_FILE_FIELD, file);
            }
            if let Some(line) = meta.line() {
                log_event.add_field(SOURCE_LINE_FIELD, line);
            }
            if let Some(module) = meta.module_path() {
                log_event.add_field(SOURCE_MODULE_FIELD, module);
            }
        }

        if let Err(err) = self.sender.send(&self.builder.build(log_event)) {
            (self.on_error)(&err);
        }
    }
}

impl<T: Sender> Drop for Layer<T> {
    fn drop(&mut self) {
        self.sender.close();
    }
}
