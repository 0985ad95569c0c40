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

//! Asynchronous delivery.
//!
//! [`ThreadedSender`] wraps any other [`Sender`] so that logging never waits on the network. A
//! send merely places the message on a bounded queue; a single worker thread takes messages off
//! that queue in order & hands them to the wrapped sender, retrying transient failures.
//!
//! Nothing here can fail back into application code once a message has been queued. Messages that
//! can't be queued in time, or can't be delivered, are dropped & reported through the
//! [`ErrorHandler`] instead.
//!
//! On [`close`](Sender::close), the queue stops accepting messages & the worker is given the
//! configured timeout to deliver whatever is left. After that the wrapped sender is closed
//! regardless; delivery is best-effort, not durable.

use crate::{
    config::SenderConfiguration,
    error::{Error, ErrorHandler, Result},
    message::Message,
    transport::{lock, Sender},
};

use crossbeam_channel::{bounded, select, Receiver, SendTimeoutError};
use tracing::{debug, trace, warn};

use std::{
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc, Mutex,
    },
    thread::JoinHandle,
    time::Duration,
};

/// The worker thread's state
struct Worker<S: Sender> {
    inner: Arc<S>,
    queue: Receiver<Message>,
    abort: Receiver<()>,
    done: crossbeam_channel::Sender<()>,
    max_attempts: usize,
    on_error: ErrorHandler,
    dropped: Arc<AtomicU64>,
}

impl<S: Sender> Worker<S> {
    fn run(self) {
        debug!("GELF delivery thread starting");
        loop {
            if self.abort.try_recv().is_ok() {
                self.abandon();
                break;
            }
            select! {
                recv(self.abort) -> _ => {
                    self.abandon();
                    break;
                }
                recv(self.queue) -> msg => match msg {
                    Ok(msg) => self.deliver(&msg),
                    // closed & drained
                    Err(_) => break,
                }
            }
        }
        debug!("GELF delivery thread exiting");
        let _ = self.done.send(());
    }
    fn deliver(&self, msg: &Message) {
        let mut attempts = 0;
        loop {
            attempts += 1;
            match self.inner.send(msg) {
                Ok(()) => return,
                Err(err) if err.is_retryable() && attempts < self.max_attempts => {
                    trace!("delivery attempt {} failed: {}", attempts, err);
                }
                Err(err) => {
                    self.dropped.fetch_add(1, Ordering::Relaxed);
                    (self.on_error)(&Error::RetriesExhausted {
                        attempts,
                        last: Box::new(err),
                    });
                    return;
                }
            }
        }
    }
    fn abandon(&self) {
        let count = self.queue.try_iter().count();
        if count > 0 {
            self.dropped.fetch_add(count as u64, Ordering::Relaxed);
            (self.on_error)(&Error::Abandoned { count });
        }
    }
}

/// A [`Sender`] that queues messages for delivery by a dedicated thread; see the
/// [module](self) docs.
pub struct ThreadedSender<S: Sender + 'static> {
    inner: Arc<S>,
    // `None` once closed
    queue: Mutex<Option<crossbeam_channel::Sender<Message>>>,
    depth: usize,
    timeout: Duration,
    abort: crossbeam_channel::Sender<()>,
    done: Receiver<()>,
    worker: Mutex<Option<JoinHandle<()>>>,
    dropped: Arc<AtomicU64>,
    on_error: ErrorHandler,
    shutdown: AtomicBool,
}

impl<S: Sender + 'static> ThreadedSender<S> {
    /// Wrap `inner`, taking queue depth, timeout & retry count from `config`; undeliverable
    /// messages are reported to `on_error`.
    pub fn new(inner: S, config: &SenderConfiguration, on_error: ErrorHandler) -> Result<Self> {
        let depth = config.threaded_queue_max_depth().max(1);
        let (queue_tx, queue_rx) = bounded(depth);
        let (abort_tx, abort_rx) = bounded(1);
        let (done_tx, done_rx) = bounded(1);
        let inner = Arc::new(inner);
        let dropped = Arc::new(AtomicU64::new(0));

        let worker = Worker {
            inner: inner.clone(),
            queue: queue_rx,
            abort: abort_rx,
            done: done_tx,
            max_attempts: config.max_retries().max(1),
            on_error: on_error.clone(),
            dropped: dropped.clone(),
        };
        let handle = std::thread::Builder::new()
            .name("gelf-sender".to_owned())
            .spawn(move || worker.run())
            .map_err(Error::transport)?;

        Ok(ThreadedSender {
            inner,
            queue: Mutex::new(Some(queue_tx)),
            depth,
            timeout: config.threaded_queue_timeout(),
            abort: abort_tx,
            done: done_rx,
            worker: Mutex::new(Some(handle)),
            dropped,
            on_error,
            shutdown: AtomicBool::new(false),
        })
    }
    /// The number of messages dropped so far, for whatever reason
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
    /// The wrapped sender
    pub fn inner(&self) -> &S {
        &self.inner
    }
}

impl<S: Sender + 'static> Sender for ThreadedSender<S> {
    /// Queue `message` for delivery. Blocks for at most the configured timeout if the queue is
    /// full, after which the message is dropped (& reported). Only fails if the sender has been
    /// closed.
    fn send(&self, message: &Message) -> Result<()> {
        if self.shutdown.load(Ordering::Acquire) {
            return Err(Error::ShuttingDown);
        }
        // Clone the channel handle so we don't hold the lock while (possibly) blocking
        let queue = lock(&self.queue).clone().ok_or(Error::ShuttingDown)?;
        match queue.send_timeout(message.clone(), self.timeout) {
            Ok(()) => Ok(()),
            Err(SendTimeoutError::Timeout(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                (self.on_error)(&Error::QueueFull { depth: self.depth });
                Ok(())
            }
            Err(SendTimeoutError::Disconnected(_)) => Err(Error::ShuttingDown),
        }
    }
    fn close(&self) {
        if self.shutdown.swap(true, Ordering::AcqRel) {
            return;
        }
        // Hanging up our end of the queue lets the worker drain what's left & then exit...
        drop(lock(&self.queue).take());
        let drained = self.done.recv_timeout(self.timeout).is_ok();
        if !drained {
            // but we won't wait forever.
            warn!(
                "GELF delivery queue not drained within {:?}; abandoning it",
                self.timeout
            );
            let _ = self.abort.try_send(());
        }
        self.inner.close();
        if drained {
            if let Some(handle) = lock(&self.worker).take() {
                let _ = handle.join();
            }
        }
    }
}

impl<S: Sender + 'static> Drop for ThreadedSender<S> {
    fn drop(&mut self) {
        self.close();
    }
}
