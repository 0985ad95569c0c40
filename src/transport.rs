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

//! The GELF transport layer.
//!
//! This module defines the [`Sender`] trait that all transports must support, as well as the UDP
//! & TCP implementations. The AMQP implementation lives in [`amqp`](crate::amqp).
//!
//! # Examples
//!
//! To send GELF messages over UDP to a collector listening on port 12201 (the default) on
//! localhost:
//!
//! ```rust
//! use gelf_tracing::transport::UdpSender;
//! let sender = UdpSender::local().unwrap();
//! ```
//!
//! On a non-standard port on another host:
//!
//! ```rust
//! use gelf_tracing::transport::UdpSender;
//! let sender = UdpSender::new("some-host.domain.io:5514");
//! assert!(sender.is_err()); // no such host, after all
//! ```

use crate::{
    error::{Error, Result},
    message::Message,
};

use backtrace::Backtrace;
use bytes::{BufMut, Bytes, BytesMut};
use flate2::{write::GzEncoder, Compression};
use tracing::{debug, trace};

use std::{
    io::Write,
    net::{Ipv4Addr, Ipv6Addr, SocketAddr, TcpStream, ToSocketAddrs, UdpSocket},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, MutexGuard,
    },
};

/// The port GELF collectors customarily listen on
pub const DEFAULT_PORT: u16 = 12201;

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                          trait Sender                                          //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// Operations all GELF senders must support.
///
/// Implementations own their connection exclusively & serialize concurrent sends internally, so
/// callers may share a sender between threads without further ceremony.
pub trait Sender: Send + Sync {
    /// Deliver one message.
    fn send(&self, message: &Message) -> Result<()>;
    /// Release the underlying connection.
    ///
    /// Idempotent, and never fails: errors tearing down the connection are swallowed. Once a
    /// sender has been closed, every subsequent [`send`](Sender::send) fails with
    /// [`Error::ShuttingDown`] without touching the network.
    fn close(&self);
}

impl<S: Sender + ?Sized> Sender for Arc<S> {
    fn send(&self, message: &Message) -> Result<()> {
        (**self).send(message)
    }
    fn close(&self) {
        (**self).close()
    }
}

impl<S: Sender + ?Sized> Sender for Box<S> {
    fn send(&self, message: &Message) -> Result<()> {
        (**self).send(message)
    }
    fn close(&self) {
        (**self).close()
    }
}

/// Take a lock, even if a previous holder panicked; a sender's state is always left consistent
/// between operations.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
}

/// gzip `buf`
pub(crate) fn gzip(buf: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::with_capacity(buf.len() / 2), Compression::default());
    encoder.write_all(buf).map_err(Error::transport)?;
    encoder.finish().map_err(Error::transport)
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                            chunking                                            //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// Every GELF chunk begins with these two bytes
pub const CHUNK_MAGIC: [u8; 2] = [0x1e, 0x0f];
/// magic (2) + message id (8) + sequence number (1) + sequence count (1)
pub const CHUNK_HEADER_LEN: usize = 12;
/// Collectors will discard any message split into more chunks than this
pub const MAX_CHUNKS: usize = 128;
/// Default maximum datagram size; small enough to get through most networks un-fragmented
pub const DEFAULT_CHUNK_SIZE: usize = 1420;
/// The largest UDP payload an IPv4 datagram can carry (65535 less the IP & UDP headers)
pub const MAX_DATAGRAM_SIZE: usize = 65507;

/// Split `payload` into GELF chunks no larger than `chunk_size` bytes apiece.
///
/// A payload that fits in one datagram is returned as-is, with no chunk header. Otherwise each
/// chunk is the twelve-byte header followed by the next `chunk_size - 12` bytes of payload. All
/// chunks share `message_id` so the collector can reassemble them in any order. Fails, rather
/// than truncating, if more than [`MAX_CHUNKS`] would be needed.
pub fn chunk(payload: &[u8], chunk_size: usize, message_id: [u8; 8]) -> Result<Vec<Bytes>> {
    if payload.len() <= chunk_size {
        return Ok(vec![Bytes::copy_from_slice(payload)]);
    }
    // `chunk_size` is validated at configuration time; this just keeps us from dividing by zero
    let body = chunk_size.saturating_sub(CHUNK_HEADER_LEN).max(1);
    let count = (payload.len() + body - 1) / body;
    if count > MAX_CHUNKS {
        return Err(Error::MessageTooLarge {
            size: payload.len(),
            chunks: count,
            back: Backtrace::new(),
        });
    }
    Ok(payload
        .chunks(body)
        .enumerate()
        .map(|(seq, piece)| {
            let mut buf = BytesMut::with_capacity(CHUNK_HEADER_LEN + piece.len());
            buf.put_slice(&CHUNK_MAGIC);
            buf.put_slice(&message_id);
            buf.put_u8(seq as u8);
            buf.put_u8(count as u8);
            buf.put_slice(piece);
            buf.freeze()
        })
        .collect())
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                              UDP                                               //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// Sending GELF messages via UDP datagrams, compressed & chunked as needed.
pub struct UdpSender {
    socket: UdpSocket,
    compress: bool,
    chunk_size: usize,
    shutdown: AtomicBool,
}

impl UdpSender {
    /// Construct a [`Sender`] via UDP at `addr`, gzip-compressing messages & using the default
    /// chunk size.
    pub fn new<A: ToSocketAddrs>(addr: A) -> Result<UdpSender> {
        UdpSender::with_options(addr, true, DEFAULT_CHUNK_SIZE)
    }
    /// Construct a [`Sender`] via UDP at localhost:12201
    pub fn local() -> Result<UdpSender> {
        UdpSender::new(("localhost", DEFAULT_PORT))
    }
    /// Construct a [`Sender`] via UDP at `addr` with explicit compression & chunking.
    pub fn with_options<A: ToSocketAddrs>(
        addr: A,
        compress: bool,
        chunk_size: usize,
    ) -> Result<UdpSender> {
        if chunk_size <= CHUNK_HEADER_LEN || chunk_size > MAX_DATAGRAM_SIZE {
            return Err(Error::BadOption {
                name: "chunkSize",
                value: chunk_size.to_string(),
                back: Backtrace::new(),
            });
        }
        let target = addr
            .to_socket_addrs()
            .map_err(Error::transport)?
            .next()
            .ok_or_else(|| {
                Error::transport(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "target address resolved to nothing",
                ))
            })?;
        // Bind to any available port...
        let local: SocketAddr = if target.is_ipv4() {
            (Ipv4Addr::UNSPECIFIED, 0).into()
        } else {
            (Ipv6Addr::UNSPECIFIED, 0).into()
        };
        let socket = UdpSocket::bind(local).map_err(Error::transport)?;
        // and connect to the collector at `target`:
        socket.connect(target).map_err(Error::transport)?;
        Ok(UdpSender {
            socket,
            compress,
            chunk_size,
            shutdown: AtomicBool::new(false),
        })
    }
}

impl Sender for UdpSender {
    fn send(&self, message: &Message) -> Result<()> {
        if self.shutdown.load(Ordering::Acquire) {
            return Err(Error::ShuttingDown);
        }
        let mut payload = message.to_json_bytes()?;
        if self.compress {
            payload = gzip(&payload)?;
        }
        let datagrams = chunk(&payload, self.chunk_size, rand::random::<[u8; 8]>())?;
        trace!(
            "sending a {}-byte GELF message in {} datagram(s)",
            payload.len(),
            datagrams.len()
        );
        for datagram in &datagrams {
            self.socket.send(datagram).map_err(Error::transport)?;
        }
        Ok(())
    }
    fn close(&self) {
        self.shutdown.store(true, Ordering::Release);
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                              TCP                                               //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// Sending GELF messages via a TCP stream, each terminated by a null byte.
///
/// GELF over TCP supports neither compression nor chunking. The connection is opened on first
/// use & re-opened whenever it is found to be broken.
pub struct TcpSender {
    addr: String,
    stream: Mutex<Option<TcpStream>>,
    shutdown: AtomicBool,
}

/// Has the peer closed this connection? Collectors never write to us, so a readable stream
/// showing end-of-file means the connection is gone.
fn is_broken(stream: &TcpStream) -> bool {
    if stream.set_nonblocking(true).is_err() {
        return true;
    }
    let mut buf = [0u8; 1];
    let broken = match stream.peek(&mut buf) {
        Ok(0) => true,
        Ok(_) => false,
        Err(err) => err.kind() != std::io::ErrorKind::WouldBlock,
    };
    broken || stream.set_nonblocking(false).is_err()
}

impl TcpSender {
    /// Construct a [`Sender`] via TCP at `addr` (in "host:port" form). No connection is made until
    /// the first message is sent.
    pub fn new<S: Into<String>>(addr: S) -> TcpSender {
        TcpSender {
            addr: addr.into(),
            stream: Mutex::new(None),
            shutdown: AtomicBool::new(false),
        }
    }
    /// Construct a [`Sender`] via TCP at localhost:12201
    pub fn local() -> TcpSender {
        TcpSender::new(format!("localhost:{}", DEFAULT_PORT))
    }
    fn write_frame(&self, slot: &mut Option<TcpStream>, frame: &[u8]) -> Result<()> {
        if slot.as_ref().map_or(false, is_broken) {
            debug!("GELF TCP connection to {} is broken; reconnecting", self.addr);
            *slot = None;
        }
        if slot.is_none() {
            *slot = Some(TcpStream::connect(self.addr.as_str()).map_err(Error::transport)?);
        }
        // `slot` was populated just above
        let stream = slot.as_mut().ok_or(Error::ShuttingDown)?;
        stream.write_all(frame).map_err(Error::transport)?;
        stream.flush().map_err(Error::transport)
    }
}

impl Sender for TcpSender {
    fn send(&self, message: &Message) -> Result<()> {
        if self.shutdown.load(Ordering::Acquire) {
            return Err(Error::ShuttingDown);
        }
        let mut frame = message.to_json_bytes()?;
        frame.push(0);
        let mut slot = lock(&self.stream);
        // `close()` may have raced us to the lock
        if self.shutdown.load(Ordering::Acquire) {
            return Err(Error::ShuttingDown);
        }
        self.write_frame(&mut slot, &frame).map_err(|err| {
            *slot = None;
            err
        })
    }
    fn close(&self) {
        if self.shutdown.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(stream) = lock(&self.stream).take() {
            let _ = stream.shutdown(std::net::Shutdown::Both);
        }
    }
}

#[cfg(test)]
mod test {

    use super::*;

    use flate2::read::GzDecoder;

    use std::{
        io::Read,
        net::TcpListener,
        time::Duration,
    };

    fn message(text: &str) -> Message {
        let mut msg = Message::new(Some(text.to_owned()), None, 1000, "6");
        msg.set_host("bree.local");
        msg
    }

    fn collector() -> UdpSocket {
        let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
        socket
            .set_read_timeout(Some(Duration::from_millis(500)))
            .unwrap();
        socket
    }

    #[test]
    fn small_payloads_are_not_chunked() {
        let payload = b"{\"short_message\":\"hi\"}";
        let chunks = chunk(payload, 100, [1; 8]).unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(&chunks[0][..], &payload[..]);
    }

    #[test]
    fn chunks_reassemble() {
        let payload: Vec<u8> = (0..1000u32).map(|i| (i % 251) as u8).collect();
        let id = [9, 8, 7, 6, 5, 4, 3, 2];
        let mut chunks = chunk(&payload, 112, id).unwrap();
        assert_eq!(chunks.len(), 10);
        for c in &chunks {
            assert!(c.len() <= 112);
            assert_eq!(&c[0..2], &CHUNK_MAGIC);
            assert_eq!(&c[2..10], &id);
            assert_eq!(c[11], 10);
        }
        // deliver out-of-order; the collector sorts by sequence number
        chunks.reverse();
        chunks.sort_by_key(|c| c[10]);
        let reassembled: Vec<u8> = chunks
            .iter()
            .flat_map(|c| c[CHUNK_HEADER_LEN..].to_vec())
            .collect();
        assert_eq!(reassembled, payload);
    }

    #[test]
    fn too_many_chunks() {
        let payload = vec![b'x'; 129 * 4];
        assert!(matches!(
            chunk(&payload, CHUNK_HEADER_LEN + 4, [0; 8]),
            Err(Error::MessageTooLarge { chunks: 129, .. })
        ));
        // exactly at the ceiling is fine
        let payload = vec![b'x'; 128 * 4];
        assert_eq!(chunk(&payload, CHUNK_HEADER_LEN + 4, [0; 8]).unwrap().len(), 128);
    }

    #[test]
    fn udp_round_trip() {
        let collector = collector();
        let sender = UdpSender::with_options(collector.local_addr().unwrap(), false, 8192).unwrap();
        let msg = message("Hello, 世界!");
        sender.send(&msg).unwrap();

        let mut buf = [0u8; 8192];
        let n = collector.recv(&mut buf).unwrap();
        assert_eq!(&buf[..n], msg.to_json().unwrap().as_bytes());
    }

    #[test]
    fn udp_compressed_and_chunked() {
        let collector = collector();
        let sender = UdpSender::with_options(collector.local_addr().unwrap(), true, 64).unwrap();
        let mut msg = message("a message of some length");
        for i in 0..40 {
            msg.add_field(format!("field{}", i), rand::random::<u64>() as i64);
        }
        sender.send(&msg).unwrap();

        let mut chunks = Vec::new();
        let mut buf = [0u8; 64];
        loop {
            let n = collector.recv(&mut buf).unwrap();
            assert_eq!(&buf[0..2], &CHUNK_MAGIC);
            let count = buf[11] as usize;
            chunks.push(buf[..n].to_vec());
            if chunks.len() == count {
                break;
            }
        }
        chunks.sort_by_key(|c| c[10]);
        let compressed: Vec<u8> = chunks
            .iter()
            .flat_map(|c| c[CHUNK_HEADER_LEN..].to_vec())
            .collect();
        let mut json = String::new();
        GzDecoder::new(&compressed[..])
            .read_to_string(&mut json)
            .unwrap();
        assert_eq!(json, msg.to_json().unwrap());
    }

    #[test]
    fn udp_rejects_oversized_before_sending() {
        let collector = collector();
        let sender = UdpSender::with_options(
            collector.local_addr().unwrap(),
            false,
            CHUNK_HEADER_LEN + 1,
        )
        .unwrap();
        let msg = message(&"x".repeat(500));
        assert!(matches!(
            sender.send(&msg),
            Err(Error::MessageTooLarge { .. })
        ));
        let mut buf = [0u8; 64];
        assert!(collector.recv(&mut buf).is_err());
    }

    #[test]
    fn udp_bad_chunk_size() {
        assert!(matches!(
            UdpSender::with_options("127.0.0.1:12201", false, CHUNK_HEADER_LEN),
            Err(Error::BadOption { .. })
        ));
    }

    #[test]
    fn udp_chunk_size_above_datagram_limit() {
        match UdpSender::with_options("127.0.0.1:12201", false, MAX_DATAGRAM_SIZE + 1) {
            Err(Error::BadOption { name, value, .. }) => {
                assert_eq!(name, "chunkSize");
                assert_eq!(value, "65508");
            }
            _ => panic!("expected BadOption"),
        }
        assert!(UdpSender::with_options("127.0.0.1:12201", false, MAX_DATAGRAM_SIZE).is_ok());
    }

    #[test]
    fn udp_after_close() {
        let collector = collector();
        let sender = UdpSender::new(collector.local_addr().unwrap()).unwrap();
        sender.close();
        sender.close();
        assert!(matches!(
            sender.send(&message("too late")),
            Err(Error::ShuttingDown)
        ));
    }

    #[test]
    fn tcp_frames_are_null_terminated() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let server = std::thread::spawn(move || {
            let (mut conn, _) = listener.accept().unwrap();
            let mut buf = Vec::new();
            conn.read_to_end(&mut buf).unwrap();
            buf
        });

        let sender = TcpSender::new(addr.to_string());
        let first = message("first");
        let second = message("second");
        sender.send(&first).unwrap();
        sender.send(&second).unwrap();
        sender.close();

        let buf = server.join().unwrap();
        let mut expected = first.to_json_bytes().unwrap();
        expected.push(0);
        expected.extend(second.to_json_bytes().unwrap());
        expected.push(0);
        assert_eq!(buf, expected);
        assert!(matches!(sender.send(&first), Err(Error::ShuttingDown)));
    }

    #[test]
    fn tcp_reconnects() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = crossbeam_channel::bounded::<()>(0);
        let server = std::thread::spawn(move || {
            // Read one frame from the first connection, then hang up on it.
            let (mut conn, _) = listener.accept().unwrap();
            let mut buf = [0u8; 1024];
            let n = conn.read(&mut buf).unwrap();
            assert_eq!(buf[n - 1], 0);
            drop(conn);
            tx.send(()).unwrap();
            let (mut conn, _) = listener.accept().unwrap();
            let mut buf = Vec::new();
            conn.read_to_end(&mut buf).unwrap();
            buf
        });

        let sender = TcpSender::new(addr.to_string());
        sender.send(&message("one")).unwrap();
        rx.recv().unwrap();
        std::thread::sleep(Duration::from_millis(100));
        let two = message("two");
        sender.send(&two).unwrap();
        sender.close();

        let mut expected = two.to_json_bytes().unwrap();
        expected.push(0);
        assert_eq!(server.join().unwrap(), expected);
    }

    #[test]
    fn tcp_connection_refused_is_retryable() {
        // Grab a free port, then release it so nothing is listening there.
        let addr = TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap();
        let sender = TcpSender::new(addr.to_string());
        let err = sender.send(&message("nobody home")).unwrap_err();
        assert!(err.is_retryable());
    }
}
