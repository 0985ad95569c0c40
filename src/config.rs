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

//! Sender configuration.
//!
//! A [`SenderConfiguration`] names the collector (by URI) & says whether deliveries should be
//! handed off to a background thread. Transport-specific options ride along in the URI's query
//! string:
//!
//! | transport | example                                                   | options                                    |
//! |-----------|-----------------------------------------------------------|--------------------------------------------|
//! | AMQP      | `amqp://guest:guest@mq:5672/%2f?exchange=logs&routingKey=gelf` | `exchange`, `routingKey` (required), `confirmTimeout` (ms) |
//! | UDP       | `udp://graylog:12201?compress=false&chunkSize=8192`       | `compress`, `chunkSize`                    |
//! | TCP       | `tcp://graylog:12201`                                     |                                            |
//!
//! ```rust
//! use gelf_tracing::config::SenderConfiguration;
//! use std::time::Duration;
//!
//! let config = SenderConfiguration::builder("udp://localhost:12201")
//!     .threaded(true)
//!     .threaded_queue_max_depth(512)
//!     .unwrap()
//!     .threaded_queue_timeout(Duration::from_millis(250))
//!     .max_retries(3)
//!     .build();
//! assert!(config.threaded());
//! ```

use crate::error::{Error, Result};

use backtrace::Backtrace;

use std::time::Duration;

/// Queue depth used when none is configured
pub const DEFAULT_THREADED_QUEUE_MAX_DEPTH: usize = 1000;
/// Enqueue/drain timeout used when none is configured
pub const DEFAULT_THREADED_QUEUE_TIMEOUT: Duration = Duration::from_millis(1000);

/// How to reach the collector, and how hard to try. Immutable once built.
#[derive(Clone, Debug)]
pub struct SenderConfiguration {
    target_uri: String,
    threaded: bool,
    threaded_queue_max_depth: usize,
    threaded_queue_timeout: Duration,
    max_retries: usize,
}

impl SenderConfiguration {
    pub fn builder<S: Into<String>>(target_uri: S) -> SenderConfigurationBuilder {
        SenderConfigurationBuilder {
            imp: SenderConfiguration {
                target_uri: target_uri.into(),
                threaded: false,
                threaded_queue_max_depth: DEFAULT_THREADED_QUEUE_MAX_DEPTH,
                threaded_queue_timeout: DEFAULT_THREADED_QUEUE_TIMEOUT,
                max_retries: 0,
            },
        }
    }
    /// The URI naming the transport & the collector, e.g. "udp://graylog.local:12201"
    pub fn target_uri(&self) -> &str {
        &self.target_uri
    }
    /// If true, deliveries are queued & performed by a background thread
    pub fn threaded(&self) -> bool {
        self.threaded
    }
    pub fn threaded_queue_max_depth(&self) -> usize {
        self.threaded_queue_max_depth
    }
    /// How long an enqueue may block on a full queue, and how long `close()` waits for the queue
    /// to drain
    pub fn threaded_queue_timeout(&self) -> Duration {
        self.threaded_queue_timeout
    }
    pub fn max_retries(&self) -> usize {
        self.max_retries
    }
}

pub struct SenderConfigurationBuilder {
    imp: SenderConfiguration,
}

impl SenderConfigurationBuilder {
    pub fn threaded(mut self, threaded: bool) -> Self {
        self.imp.threaded = threaded;
        self
    }
    /// The queue must be able to hold at least one message.
    pub fn threaded_queue_max_depth(mut self, depth: usize) -> Result<Self> {
        if depth == 0 {
            return Err(Error::BadOption {
                name: "threadedQueueMaxDepth",
                value: depth.to_string(),
                back: Backtrace::new(),
            });
        }
        self.imp.threaded_queue_max_depth = depth;
        Ok(self)
    }
    pub fn threaded_queue_timeout(mut self, timeout: Duration) -> Self {
        self.imp.threaded_queue_timeout = timeout;
        self
    }
    pub fn max_retries(mut self, max_retries: usize) -> Self {
        self.imp.max_retries = max_retries;
        self
    }
    pub fn build(self) -> SenderConfiguration {
        self.imp
    }
}
