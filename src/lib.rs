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
//! Build [GELF] messages & deliver them to a [Graylog] collector over AMQP, UDP or TCP, optionally
//! from a background thread; includes a [`tracing-subscriber`] [`Layer`] implementation.
//!
//! [GELF]: https://go2docs.graylog.org/current/getting_in_log_data/gelf.html
//! [Graylog]: https://graylog.org/
//! [`tracing-subscriber`]: https://docs.rs/tracing-subscriber/latest/tracing_subscriber/index.html
//! [`Layer`]: https://docs.rs/tracing-subscriber/latest/tracing_subscriber/layer/trait.Layer.html
//!
//! # Introduction
//!
//! GELF (the "Graylog Extended Log Format") is a JSON document describing a single log event: a
//! handful of well-known keys (`host`, `short_message`, `timestamp`, `level` & so on) plus any
//! number of "additional fields", each prefixed with an underscore. Collectors accept it over UDP
//! (optionally gzip'd, and chunked when too large for one datagram), over TCP (each document
//! terminated by a null byte), or from a message broker.
//!
//! This crate is organized as a little pipeline:
//!
//! 1. a [`LogEvent`] (message text, severity, fields, perhaps an error) is turned into a
//!    [`Message`] by a [`MessageBuilder`], which adds the originating host, facility & any
//!    configured static fields
//!
//! 2. the [`Message`] is handed to a [`Sender`]: [`AmqpSender`], [`UdpSender`] or [`TcpSender`]
//!
//! 3. optionally, the [`Sender`] is wrapped in a [`ThreadedSender`] so that producers only ever
//!    enqueue; a worker thread performs delivery, with retries
//!
//! [`SenderConfiguration`] & [`create_sender`] tie steps two & three together from a target URI.
//!
//! [`LogEvent`]: crate::builder::LogEvent
//! [`Message`]: crate::message::Message
//! [`MessageBuilder`]: crate::builder::MessageBuilder
//! [`Sender`]: crate::transport::Sender
//! [`AmqpSender`]: crate::amqp::AmqpSender
//! [`UdpSender`]: crate::transport::UdpSender
//! [`TcpSender`]: crate::transport::TcpSender
//! [`ThreadedSender`]: crate::threaded::ThreadedSender
//! [`SenderConfiguration`]: crate::config::SenderConfiguration
//! [`create_sender`]: crate::factory::create_sender
//!
//! # Usage
//!
//! Messages can be built & sent directly:
//!
//! ```no_run
//! use gelf_tracing::{
//!     builder::{LogEvent, MessageBuilder, MessageBuilderConfiguration},
//!     config::SenderConfiguration,
//!     factory::create_sender,
//!     transport::Sender,
//! };
//!
//! let builder = MessageBuilder::new(
//!     MessageBuilderConfiguration::builder().facility("billing").build(),
//! );
//! let sender = create_sender(
//!     &SenderConfiguration::builder("tcp://graylog.local:12201")
//!         .threaded(true)
//!         .max_retries(3)
//!         .build(),
//! )
//! .unwrap();
//! sender
//!     .send(&builder.build(LogEvent::new("Hello, world!").with_field("user", 42)))
//!     .unwrap();
//! sender.close();
//! ```
//!
//! or [`tracing`] events can be forwarded by installing the [`Layer`](crate::layer::Layer):
//!
//! [`tracing`]: https://docs.rs/tracing/latest/tracing/index.html
//!
//! ```no_run
//! use tracing::info;
//! use gelf_tracing::layer::Layer;
//! use tracing_subscriber::registry::Registry;
//! use tracing_subscriber::layer::SubscriberExt; // Needed to get `with()`
//!
//! // The default configuration is to send uncompressed-when-small, gzip'd GELF via UDP to port
//! // 12201 on the localhost.
//! let subscriber = Registry::default().with(Layer::try_default().unwrap());
//! let _guard = tracing::subscriber::set_default(subscriber);
//!
//! info!(user = 42, "Hello, world!");
//! ```
//!
//! Failures that can't be returned to a caller (a message dropped by a full queue, say, or one
//! abandoned after its retries ran out) are reported through an [`ErrorHandler`]. The default
//! handler logs a warning under this crate's own target, which the [`Layer`](crate::layer::Layer)
//! never forwards.
//!
//! [`ErrorHandler`]: crate::error::ErrorHandler

pub mod amqp;
pub mod builder;
pub mod config;
pub mod error;
pub mod factory;
pub mod layer;
pub mod level;
pub mod message;
pub mod threaded;
pub mod tracing;
pub mod transport;
