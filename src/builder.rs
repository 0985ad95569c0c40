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

//! Turning log events into GELF [`Message`]s.
//!
//! [`MessageBuilder`] combines one producer-supplied [`LogEvent`] with static configuration (the
//! originating host, facility, stacktrace policy & any fields to be attached to every message)
//! to produce one [`Message`]. It holds no state beyond that configuration, so a single instance
//! may be shared freely between threads.
//!
//! ```rust
//! use gelf_tracing::builder::{LogEvent, MessageBuilder, MessageBuilderConfiguration};
//!
//! let builder = MessageBuilder::new(
//!     MessageBuilderConfiguration::builder()
//!         .origin_host("bree.local")
//!         .facility("billing")
//!         .build(),
//! );
//! let msg = builder.build(
//!     LogEvent::new("Hello, world!")
//!         .with_level("4")
//!         .with_timestamp_millis(1000)
//!         .with_field("user", 42),
//! );
//! assert_eq!(msg.host(), Some("bree.local"));
//! assert_eq!(msg.level().code(), 4);
//! ```

use crate::{
    level::Level,
    message::{FieldValue, Message},
};

use backtrace::Backtrace;

use std::collections::BTreeMap;

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                          origin host                                           //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// Attempt to figure-out the name of this host.
///
/// Tries [gethostname()] first, then falls back to an IP address for this host, and finally to
/// "localhost". It cannot fail.
///
/// [gethostname()]: https://man7.org/linux/man-pages/man2/gethostname.2.html
pub fn default_origin_host() -> String {
    hostname::get()
        .ok()
        .and_then(|hn| hn.into_string().ok())
        .filter(|hn| !hn.is_empty())
        .or_else(|| {
            local_ip_address::local_ip()
                .ok()
                .map(|ip| ip.to_string())
        })
        .unwrap_or_else(|| "localhost".to_owned())
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                           Throwable                                            //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// An error captured for inclusion in a message.
///
/// Rust errors are borrowed, and typically don't outlive the call in which they're reported, so
/// we render them eagerly: the error's own description (the "summary line") and the descriptions
/// of every error in its [`source`] chain.
///
/// [`source`]: std::error::Error::source
#[derive(Clone, Debug)]
pub struct Throwable {
    summary: String,
    causes: Vec<String>,
    backtrace: Option<String>,
}

impl Throwable {
    /// Capture `err` and its chain of causes.
    pub fn from_error(err: &(dyn std::error::Error + 'static)) -> Throwable {
        let mut causes = Vec::new();
        let mut next = err.source();
        while let Some(cause) = next {
            causes.push(cause.to_string());
            next = cause.source();
        }
        Throwable {
            summary: err.to_string(),
            causes,
            backtrace: None,
        }
    }
    /// Attach a backtrace (typically one captured where the error was raised).
    pub fn with_backtrace(mut self, back: &Backtrace) -> Throwable {
        self.backtrace = Some(format!("{:?}", back));
        self
    }
    /// The error's own description
    pub fn summary(&self) -> &str {
        &self.summary
    }
    /// Render the full trace: the summary line, one "Caused by:" line per cause & the backtrace,
    /// if any.
    pub fn render(&self) -> String {
        let mut text = self.summary.clone();
        for cause in &self.causes {
            text.push_str("\nCaused by: ");
            text.push_str(cause);
        }
        if let Some(back) = &self.backtrace {
            text.push('\n');
            text.push_str(back);
        }
        text
    }
}

impl<E: std::error::Error + 'static> From<&E> for Throwable {
    fn from(err: &E) -> Self {
        Throwable::from_error(err)
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                            LogEvent                                            //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// Everything a producer tells us about one log event.
#[derive(Clone, Debug, Default)]
pub struct LogEvent {
    message: Option<String>,
    throwable: Option<Throwable>,
    timestamp_millis: Option<i64>,
    level: String,
    fields: BTreeMap<String, FieldValue>,
}

impl LogEvent {
    pub fn new<S: Into<String>>(message: S) -> LogEvent {
        LogEvent {
            message: Some(message.into()),
            ..Default::default()
        }
    }
    /// An event with no message text at all
    pub fn empty() -> LogEvent {
        LogEvent::default()
    }
    pub fn with_throwable(mut self, throwable: Throwable) -> Self {
        self.throwable = Some(throwable);
        self
    }
    pub fn with_error(self, err: &(dyn std::error::Error + 'static)) -> Self {
        self.with_throwable(Throwable::from_error(err))
    }
    pub fn with_timestamp_millis(mut self, timestamp_millis: i64) -> Self {
        self.timestamp_millis = Some(timestamp_millis);
        self
    }
    /// Set the producer's severity. Anything other than "0" through "7" will be sent as
    /// informational.
    pub fn with_level<S: Into<String>>(mut self, level: S) -> Self {
        self.level = level.into();
        self
    }
    pub fn with_syslog_level(self, level: Level) -> Self {
        self.with_level(level.code().to_string())
    }
    pub fn with_field<K: Into<String>, V: Into<FieldValue>>(mut self, key: K, value: V) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }
    pub fn add_field<K: Into<String>, V: Into<FieldValue>>(&mut self, key: K, value: V) {
        self.fields.insert(key.into(), value.into());
    }
    pub fn set_message(&mut self, message: Option<String>) {
        self.message = message;
    }
    pub fn set_throwable(&mut self, throwable: Option<Throwable>) {
        self.throwable = throwable;
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                         MessageBuilder                                         //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// Static configuration applied to every message a [`MessageBuilder`] produces.
#[derive(Clone, Debug)]
pub struct MessageBuilderConfiguration {
    origin_host: String,
    facility: Option<String>,
    extract_stacktrace: bool,
    additional_fields: BTreeMap<String, FieldValue>,
}

impl std::default::Default for MessageBuilderConfiguration {
    fn default() -> Self {
        MessageBuilderConfiguration {
            origin_host: default_origin_host(),
            facility: None,
            extract_stacktrace: false,
            additional_fields: BTreeMap::new(),
        }
    }
}

impl MessageBuilderConfiguration {
    pub fn builder() -> MessageBuilderConfigurationBuilder {
        MessageBuilderConfigurationBuilder {
            imp: MessageBuilderConfiguration::default(),
        }
    }
    pub fn origin_host(&self) -> &str {
        &self.origin_host
    }
    pub fn extract_stacktrace(&self) -> bool {
        self.extract_stacktrace
    }
}

pub struct MessageBuilderConfigurationBuilder {
    imp: MessageBuilderConfiguration,
}

impl MessageBuilderConfigurationBuilder {
    pub fn origin_host<S: Into<String>>(mut self, origin_host: S) -> Self {
        self.imp.origin_host = origin_host.into();
        self
    }
    pub fn facility<S: Into<String>>(mut self, facility: S) -> Self {
        self.imp.facility = Some(facility.into());
        self
    }
    pub fn extract_stacktrace(mut self, extract_stacktrace: bool) -> Self {
        self.imp.extract_stacktrace = extract_stacktrace;
        self
    }
    /// Attach `key` = `value` to every message
    pub fn additional_field<K: Into<String>, V: Into<FieldValue>>(mut self, key: K, value: V) -> Self {
        self.imp.additional_fields.insert(key.into(), value.into());
        self
    }
    pub fn build(self) -> MessageBuilderConfiguration {
        self.imp
    }
}

/// Field under which a throwable's summary is sent when stacktrace extraction is off
pub const EXCEPTION_FIELD: &str = "exception";

/// Builds GELF [`Message`]s from [`LogEvent`]s; see the [module](self) docs.
#[derive(Clone, Debug, Default)]
pub struct MessageBuilder {
    config: MessageBuilderConfiguration,
}

impl MessageBuilder {
    pub fn new(config: MessageBuilderConfiguration) -> MessageBuilder {
        MessageBuilder { config }
    }

    pub fn configuration(&self) -> &MessageBuilderConfiguration {
        &self.config
    }

    /// Build one [`Message`] from `event`.
    ///
    /// Configured fields are applied first, so that the event's own fields win on collision. An
    /// event without a timestamp is stamped with the current time.
    pub fn build(&self, event: LogEvent) -> Message {
        let LogEvent {
            message,
            throwable,
            timestamp_millis,
            level,
            fields,
        } = event;

        let mut msg = Message::new(
            None,
            None,
            timestamp_millis.unwrap_or_else(|| chrono::Utc::now().timestamp_millis()),
            &level,
        );
        msg.set_host(self.config.origin_host.clone());
        if let Some(facility) = &self.config.facility {
            msg.set_facility(facility.clone());
        }
        for (key, value) in self.config.additional_fields.iter().chain(fields.iter()) {
            msg.add_field(key.clone(), value.clone());
        }

        let has_text = message.as_deref().map_or(false, |m| !m.is_empty());
        match throwable {
            Some(throwable) if self.config.extract_stacktrace => {
                if has_text {
                    msg.set_short_message(message.unwrap_or_default());
                } else {
                    msg.set_short_message(throwable.summary());
                }
                msg.set_stacktrace(Some(throwable.render()));
            }
            Some(throwable) => {
                if let Some(text) = message {
                    msg.set_short_message(text);
                }
                msg.add_field(EXCEPTION_FIELD, throwable.summary());
            }
            None => {
                if let Some(text) = message {
                    msg.set_short_message(text);
                }
            }
        }
        msg
    }
}

#[cfg(test)]
mod test {

    use super::*;

    #[derive(Debug)]
    struct Fizzle;

    impl std::fmt::Display for Fizzle {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "the fuse fizzled")
        }
    }

    impl std::error::Error for Fizzle {}

    #[derive(Debug)]
    struct Boom(Fizzle);

    impl std::fmt::Display for Boom {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "nothing went boom")
        }
    }

    impl std::error::Error for Boom {
        fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
            Some(&self.0)
        }
    }

    fn builder(extract_stacktrace: bool) -> MessageBuilder {
        MessageBuilder::new(
            MessageBuilderConfiguration::builder()
                .origin_host("bree.local")
                .facility("unit-tests")
                .extract_stacktrace(extract_stacktrace)
                .additional_field("environment", "test")
                .additional_field("shard", 1)
                .build(),
        )
    }

    #[test]
    fn basic_build() {
        let msg = builder(false).build(
            LogEvent::new("Hello, world!")
                .with_level("3")
                .with_timestamp_millis(1500)
                .with_field("shard", 7)
                .with_field("ratio", 0.5),
        );
        assert_eq!(msg.short_message(), "Hello, world!");
        assert_eq!(msg.host(), Some("bree.local"));
        assert_eq!(msg.facility(), Some("unit-tests"));
        assert_eq!(msg.level(), Level::LOG_ERR);
        assert_eq!(msg.timestamp_millis(), 1500);
        assert_eq!(msg.field("environment"), Some(&FieldValue::from("test")));
        // event fields override configured ones
        assert_eq!(msg.field("shard"), Some(&FieldValue::Integer(7)));
        assert_eq!(msg.field("ratio"), Some(&FieldValue::Float(0.5)));
        assert!(msg.is_valid());
    }

    #[test]
    fn unrecognized_severity() {
        let msg = builder(false).build(LogEvent::new("x").with_level("WARNING"));
        assert_eq!(msg.level().code(), 6);
        let msg = builder(false).build(LogEvent::new("x"));
        assert_eq!(msg.level().code(), 6);
    }

    #[test]
    fn no_message_is_not_an_error() {
        let msg = builder(false).build(LogEvent::empty().with_timestamp_millis(1));
        assert_eq!(msg.short_message(), "null");
        assert!(msg.is_valid());

        let msg = builder(false).build(LogEvent::new(""));
        assert_eq!(msg.short_message(), "");
    }

    #[test]
    fn extract_stacktrace() {
        let err = Boom(Fizzle);
        let msg = builder(true).build(LogEvent::empty().with_error(&err));
        assert_eq!(msg.short_message(), "nothing went boom");
        assert_eq!(
            msg.stacktrace(),
            Some("nothing went boom\nCaused by: the fuse fizzled")
        );

        let msg = builder(true).build(LogEvent::new("while frobbing").with_error(&err));
        assert_eq!(msg.short_message(), "while frobbing");
        assert!(msg.stacktrace().is_some());
        assert!(msg.field(EXCEPTION_FIELD).is_none());
    }

    #[test]
    fn stacktrace_extraction_disabled() {
        let err = Boom(Fizzle);
        let msg = builder(false).build(LogEvent::new("while frobbing").with_error(&err));
        assert_eq!(msg.short_message(), "while frobbing");
        assert!(msg.stacktrace().is_none());
        assert_eq!(
            msg.field(EXCEPTION_FIELD),
            Some(&FieldValue::from("nothing went boom"))
        );
    }

    #[test]
    fn builder_is_reusable() {
        let b = builder(false);
        let first = b.build(LogEvent::new("one").with_field("a", 1).with_timestamp_millis(1));
        let second = b.build(LogEvent::new("two").with_timestamp_millis(1));
        assert!(first.field("a").is_some());
        assert!(second.field("a").is_none());
        assert_eq!(
            b.build(LogEvent::new("one").with_field("a", 1).with_timestamp_millis(1))
                .to_json()
                .unwrap(),
            first.to_json().unwrap()
        );
    }

    #[test]
    fn throwable_backtrace() {
        let t = Throwable::from(&Fizzle).with_backtrace(&Backtrace::new());
        assert!(t.render().starts_with("the fuse fizzled\n"));
    }

    #[test]
    fn origin_host() {
        assert!(!default_origin_host().is_empty());
    }
}
