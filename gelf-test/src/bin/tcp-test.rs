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

//! Test writing GELF over TCP to port 12201 on the local host, from a background thread.

use gelf_tracing::{builder::MessageBuilderConfiguration, config::SenderConfiguration, layer::Layer};
use tracing::{debug, error, info, trace, warn};
use tracing_subscriber::{
    layer::SubscriberExt, // Needed to get `with()`
    registry::Registry,
};

pub fn main() {
    let config = SenderConfiguration::builder("tcp://127.0.0.1:12201")
        .threaded(true)
        .max_retries(3)
        .build();
    let layer = Layer::from_configuration(
        &config,
        MessageBuilderConfiguration::builder()
            .facility("gelf-test")
            .build(),
    )
    .unwrap();
    let subscriber = Registry::default().with(layer);
    let _guard = tracing::subscriber::set_default(subscriber);

    trace!("你好, TCP socket.");
    debug!("你好, TCP socket.");
    info!("你好, TCP socket.");
    warn!("你好, TCP socket.");
    error!("你好, TCP socket.");
}
