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

//! [gelf-tracing](crate) errors

use backtrace::Backtrace;

use std::sync::Arc;

/// [gelf-tracing](crate) error type
///
/// [gelf-tracing](crate) eschews libraries like [thiserror], [anyhow] & [Snafu] in favor of a
/// straightforward enumeration. The match arms fall into four groups,
/// chosen on the basis of what the caller will need to do in response:
///
/// - configuration problems (`BadUri`, `UnsupportedScheme`, `MissingOption`, `BadOption`) are
///   reported when a sender is constructed; nothing was built, nothing will be retried
/// - `Transport` is a transient delivery failure; it may succeed on retry
/// - `ShuttingDown`, `MessageTooLarge` & `Encoding` won't get better no matter how many times you
///   try
/// - `QueueFull`, `RetriesExhausted` & `Abandoned` are never returned to a caller; the threaded
///   sender hands them to its [`ErrorHandler`] after the original caller has moved on
///
/// [thiserror]: https://docs.rs/thiserror
/// [anyhow]: https://docs.rs/anyhow
/// [Snafu]: https://docs.rs/snafu/latest/snafu
#[non_exhaustive]
pub enum Error {
    /// The target URI could not be parsed
    BadUri {
        uri: String,
        source: url::ParseError,
        back: Backtrace,
    },
    /// The target URI named a transport we don't speak
    UnsupportedScheme { scheme: String, back: Backtrace },
    /// A transport option the chosen transport requires was not given
    MissingOption { name: &'static str, back: Backtrace },
    /// A transport option was given, but its value made no sense
    BadOption {
        name: &'static str,
        value: String,
        back: Backtrace,
    },
    /// General transport layer error
    Transport {
        source: Box<dyn std::error::Error + Send + Sync + 'static>,
        back: Backtrace,
    },
    /// The sender has been closed
    ShuttingDown,
    /// The serialized message needs more chunks than GELF permits
    MessageTooLarge {
        size: usize,
        chunks: usize,
        back: Backtrace,
    },
    /// Failed to serialize a message to JSON
    Encoding {
        source: serde_json::Error,
        back: Backtrace,
    },
    /// The delivery queue stayed full for longer than the configured timeout, so a message was
    /// dropped
    QueueFull { depth: usize },
    /// A queued message could not be delivered; it has been dropped
    RetriesExhausted { attempts: usize, last: Box<Error> },
    /// The sender was closed before `count` queued messages could be delivered
    Abandoned { count: usize },
}

impl Error {
    /// True if trying the same message again might succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Transport { .. })
    }
    /// Wrap any transport-level failure
    pub(crate) fn transport<E>(err: E) -> Error
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Error::Transport {
            source: Box::new(err),
            back: Backtrace::new(),
        }
    }
}

impl std::fmt::Display for Error {
    // `Error` is non-exhaustive so that adding variants won't be a breaking change to our
    // callers. That means the compiler won't catch us if we miss a variant here, so we
    // always include a `_` arm.
    #[allow(unreachable_patterns)]
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Error::BadUri { uri, source, .. } => {
                write!(f, "Couldn't parse target URI '{}': {}", uri, source)
            }
            Error::UnsupportedScheme { scheme, .. } => write!(
                f,
                "Unsupported transport '{}'; expected one of amqp, udp or tcp",
                scheme
            ),
            Error::MissingOption { name, .. } => {
                write!(f, "The transport option '{}' is required", name)
            }
            Error::BadOption { name, value, .. } => {
                write!(f, "Bad value '{}' for transport option '{}'", value, name)
            }
            Error::Transport { source, .. } => write!(f, "Transport error: {}", source),
            Error::ShuttingDown => write!(f, "The GELF sender is shutting down"),
            Error::MessageTooLarge { size, chunks, .. } => write!(
                f,
                "A {}-byte message would need {} chunks, more than GELF allows",
                size, chunks
            ),
            Error::Encoding { source, .. } => {
                write!(f, "Failed to encode a GELF message: {}", source)
            }
            Error::QueueFull { depth } => write!(
                f,
                "The delivery queue ({} messages deep) stayed full; a message was dropped",
                depth
            ),
            Error::RetriesExhausted { attempts, last } => write!(
                f,
                "Gave up on a message after {} attempt(s); last error: {}",
                attempts, last
            ),
            Error::Abandoned { count } => write!(
                f,
                "{} queued message(s) were abandoned when the sender was closed",
                count
            ),
            _ => write!(f, "Other gelf-tracing error"),
        }
    }
}

impl std::fmt::Debug for Error {
    #[allow(unreachable_patterns)]
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Error::BadUri { back, .. } => write!(f, "{}\n{:?}", self, back),
            Error::UnsupportedScheme { back, .. } => write!(f, "{}\n{:?}", self, back),
            Error::MissingOption { back, .. } => write!(f, "{}\n{:?}", self, back),
            Error::BadOption { back, .. } => write!(f, "{}\n{:?}", self, back),
            Error::Transport { back, .. } => write!(f, "{}\n{:?}", self, back),
            Error::MessageTooLarge { back, .. } => write!(f, "{}\n{:?}", self, back),
            Error::Encoding { back, .. } => write!(f, "{}\n{:?}", self, back),
            Error::RetriesExhausted { last, .. } => write!(f, "{}\n{:?}", self, last),
            err => write!(f, "gelf-tracing error: {}", err),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::BadUri { source, .. } => Some(source),
            Error::Transport { source, .. } => Some(source.as_ref()),
            Error::Encoding { source, .. } => Some(source),
            Error::RetriesExhausted { last, .. } => Some(last.as_ref()),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// The side channel through which failures that can't be returned to a caller are reported.
///
/// Whatever is installed here must not log through the same GELF sender it is reporting on.
pub type ErrorHandler = Arc<dyn Fn(&Error) + Send + Sync>;

/// The default [`ErrorHandler`]: emit a warning under this crate's own target. The
/// [`Layer`](crate::layer::Layer) ignores events from that target, so the warning reaches any
/// other layers (stderr, a file) without looping back into GELF.
pub fn default_error_handler() -> ErrorHandler {
    Arc::new(|err: &Error| {
        tracing::warn!("{}", err);
    })
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn retryable() {
        let err = Error::transport(std::io::Error::from(std::io::ErrorKind::ConnectionReset));
        assert!(err.is_retryable());
        assert!(!Error::ShuttingDown.is_retryable());
        assert!(!Error::MessageTooLarge {
            size: 1,
            chunks: 129,
            back: Backtrace::new()
        }
        .is_retryable());
    }

    #[test]
    fn display() {
        assert_eq!(
            format!("{}", Error::ShuttingDown),
            "The GELF sender is shutting down"
        );
        let err = Error::RetriesExhausted {
            attempts: 3,
            last: Box::new(Error::ShuttingDown),
        };
        assert_eq!(
            format!("{}", err),
            "Gave up on a message after 3 attempt(s); last error: The GELF sender is shutting down"
        );
        use std::error::Error as StdError;
        assert!(err.source().is_some());
    }
}
