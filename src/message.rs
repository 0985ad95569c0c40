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

//! The GELF message model & its JSON encoding.
//!
//! A [`Message`] is built once per log event (normally by a
//! [`MessageBuilder`](crate::builder::MessageBuilder)), encoded, handed to a
//! [`Sender`](crate::transport::Sender) and discarded. The encoding is the compatibility-critical
//! part of this crate: the collector on the other end only understands the [GELF] payload
//! specification, so the rules below are followed to the letter:
//!
//! - `short_message` is always present; if it was never set it reads `"null"`
//! - `full_message` appears only when non-empty
//! - `timestamp` is seconds since the epoch, with the milliseconds as a fraction
//! - `level` is always an integer
//! - every additional field `k` goes out as `_k`, except `id`, which GELF reserves (`_id`) & so
//!   is dropped; a field *already* named `_id` goes out as `__id`
//!
//! [GELF]: https://go2docs.graylog.org/current/getting_in_log_data/gelf.html

use crate::{
    error::{Error, Result},
    level::Level,
};

use backtrace::Backtrace;
use serde::ser::{Serialize, SerializeMap, Serializer};

use std::collections::BTreeMap;

/// GELF payload specification version emitted unless told otherwise
pub const GELF_VERSION: &str = "1.1";

/// The value of an additional field; GELF permits strings & numbers only.
#[derive(Clone, Debug, PartialEq)]
pub enum FieldValue {
    String(String),
    Integer(i64),
    Float(f64),
}

impl Serialize for FieldValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            FieldValue::String(s) => serializer.serialize_str(s),
            FieldValue::Integer(i) => serializer.serialize_i64(*i),
            FieldValue::Float(x) => serializer.serialize_f64(*x),
        }
    }
}

impl std::fmt::Display for FieldValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FieldValue::String(s) => write!(f, "{}", s),
            FieldValue::Integer(i) => write!(f, "{}", i),
            FieldValue::Float(x) => write!(f, "{}", x),
        }
    }
}

impl From<String> for FieldValue {
    fn from(x: String) -> Self {
        FieldValue::String(x)
    }
}

impl From<&str> for FieldValue {
    fn from(x: &str) -> Self {
        FieldValue::String(x.to_owned())
    }
}

impl From<i64> for FieldValue {
    fn from(x: i64) -> Self {
        FieldValue::Integer(x)
    }
}

impl From<i32> for FieldValue {
    fn from(x: i32) -> Self {
        FieldValue::Integer(x.into())
    }
}

impl From<u32> for FieldValue {
    fn from(x: u32) -> Self {
        FieldValue::Integer(x.into())
    }
}

impl From<u64> for FieldValue {
    /// Values too large for an `i64` are sent as their decimal string rather than wrapped.
    fn from(x: u64) -> Self {
        i64::try_from(x)
            .map(FieldValue::Integer)
            .unwrap_or_else(|_| FieldValue::String(x.to_string()))
    }
}

impl From<f64> for FieldValue {
    fn from(x: f64) -> Self {
        FieldValue::Float(x)
    }
}

impl From<f32> for FieldValue {
    fn from(x: f32) -> Self {
        FieldValue::Float(x.into())
    }
}

impl From<bool> for FieldValue {
    fn from(x: bool) -> Self {
        FieldValue::String(x.to_string())
    }
}

/// Compute the key under which additional field `key` is sent, if at all.
fn wire_key(key: &str) -> Option<String> {
    if key == "id" {
        None
    } else {
        Some(format!("_{}", key))
    }
}

/// One GELF message.
#[derive(Clone, Debug, PartialEq)]
pub struct Message {
    short_message: Option<String>,
    full_message: Option<String>,
    timestamp_millis: i64,
    host: Option<String>,
    level: Level,
    facility: Option<String>,
    version: String,
    fields: BTreeMap<String, FieldValue>,
    stacktrace: Option<String>,
}

impl std::default::Default for Message {
    fn default() -> Self {
        Message {
            short_message: None,
            full_message: None,
            timestamp_millis: 0,
            host: None,
            level: Level::default(),
            facility: None,
            version: GELF_VERSION.to_owned(),
            fields: BTreeMap::new(),
            stacktrace: None,
        }
    }
}

impl Message {
    /// Create a message from its textual parts; `level` is the producer's severity (see
    /// [`Level::from_input`]).
    pub fn new(
        short_message: Option<String>,
        full_message: Option<String>,
        timestamp_millis: i64,
        level: &str,
    ) -> Message {
        Message {
            short_message,
            full_message,
            timestamp_millis,
            level: Level::from_input(level),
            ..Default::default()
        }
    }

    /// The short message; `"null"` if never set
    pub fn short_message(&self) -> &str {
        self.short_message.as_deref().unwrap_or("null")
    }
    pub fn full_message(&self) -> Option<&str> {
        self.full_message.as_deref()
    }
    pub fn timestamp_millis(&self) -> i64 {
        self.timestamp_millis
    }
    pub fn host(&self) -> Option<&str> {
        self.host.as_deref()
    }
    pub fn level(&self) -> Level {
        self.level
    }
    pub fn facility(&self) -> Option<&str> {
        self.facility.as_deref()
    }
    pub fn version(&self) -> &str {
        &self.version
    }
    pub fn fields(&self) -> &BTreeMap<String, FieldValue> {
        &self.fields
    }
    pub fn field(&self, key: &str) -> Option<&FieldValue> {
        self.fields.get(key)
    }
    pub fn stacktrace(&self) -> Option<&str> {
        self.stacktrace.as_deref()
    }

    pub fn set_short_message<S: Into<String>>(&mut self, short_message: S) -> &mut Self {
        self.short_message = Some(short_message.into());
        self
    }
    pub fn set_full_message(&mut self, full_message: Option<String>) -> &mut Self {
        self.full_message = full_message;
        self
    }
    pub fn set_timestamp_millis(&mut self, timestamp_millis: i64) -> &mut Self {
        self.timestamp_millis = timestamp_millis;
        self
    }
    pub fn set_host<S: Into<String>>(&mut self, host: S) -> &mut Self {
        self.host = Some(host.into());
        self
    }
    pub fn set_level(&mut self, level: Level) -> &mut Self {
        self.level = level;
        self
    }
    pub fn set_facility<S: Into<String>>(&mut self, facility: S) -> &mut Self {
        self.facility = Some(facility.into());
        self
    }
    pub fn set_version<S: Into<String>>(&mut self, version: S) -> &mut Self {
        self.version = version.into();
        self
    }
    pub fn set_stacktrace(&mut self, stacktrace: Option<String>) -> &mut Self {
        self.stacktrace = stacktrace;
        self
    }
    /// Add (or replace) an additional field. The key is given *without* the leading underscore
    /// GELF requires; that is added on encoding.
    pub fn add_field<K: Into<String>, V: Into<FieldValue>>(&mut self, key: K, value: V) -> &mut Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// A message is valid if it knows its host. Neither a short nor a full message is required.
    pub fn is_valid(&self) -> bool {
        self.host.as_deref().map_or(false, |h| !h.is_empty())
    }

    /// The text sent as `full_message`, if any: the full message and the stacktrace, one after the
    /// other.
    fn wire_full_message(&self) -> Option<String> {
        let full = self.full_message.as_deref().filter(|s| !s.is_empty());
        let trace = self.stacktrace.as_deref().filter(|s| !s.is_empty());
        match (full, trace) {
            (Some(full), Some(trace)) => Some(format!("{}\n{}", full, trace)),
            (Some(text), None) | (None, Some(text)) => Some(text.to_owned()),
            (None, None) => None,
        }
    }

    /// Encode this message as a GELF JSON document.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|err| Error::Encoding {
            source: err,
            back: Backtrace::new(),
        })
    }

    /// Encode this message as GELF JSON, as UTF-8 bytes ready for a transport.
    pub fn to_json_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|err| Error::Encoding {
            source: err,
            back: Backtrace::new(),
        })
    }
}

impl Serialize for Message {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("version", &self.version)?;
        if let Some(host) = &self.host {
            map.serialize_entry("host", host)?;
        }
        map.serialize_entry("short_message", self.short_message())?;
        if let Some(full) = self.wire_full_message() {
            map.serialize_entry("full_message", &full)?;
        }
        map.serialize_entry("timestamp", &(self.timestamp_millis as f64 / 1000.0))?;
        map.serialize_entry("level", &self.level.code())?;
        if let Some(facility) = &self.facility {
            map.serialize_entry("facility", facility)?;
        }
        for (key, value) in &self.fields {
            if let Some(key) = wire_key(key) {
                map.serialize_entry(&key, value)?;
            }
        }
        map.end()
    }
}
