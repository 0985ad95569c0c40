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

//! GELF severity levels.
//!
//! GELF borrows its `level` field from syslog: the eight severities of RFC [5424], numbered as in
//! `<syslog.h>`. [`Level`] replicates those names.
//!
//! [5424]: https://datatracker.ietf.org/doc/html/rfc5424

type StdResult<T, E> = std::result::Result<T, E>;

/// The eight syslog severity levels, as documented in the `syslog()` manual [page] & defined in
/// `<syslog.h>`. Highest urgency is zero.
///
/// [page]: https://man7.org/linux/man-pages/man3/syslog.3.html
#[allow(non_camel_case_types)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    /// system is unusable
    LOG_EMERG = 0,
    /// action must be take immediately
    LOG_ALERT = 1,
    /// critical conditions
    LOG_CRIT = 2,
    /// error conditions
    LOG_ERR = 3,
    /// warning conditions
    LOG_WARNING = 4,
    /// normal, but significant condition
    LOG_NOTICE = 5,
    /// informational message
    LOG_INFO = 6,
    /// debug-level message
    LOG_DEBUG = 7,
}

impl std::default::Default for Level {
    /// The default level is `LOG_INFO`.
    fn default() -> Self {
        Level::LOG_INFO
    }
}

impl Level {
    /// Map a numeric severity to a [`Level`]; anything outside 0-7 is `None`.
    pub fn from_code(code: i64) -> Option<Level> {
        match code {
            0 => Some(Level::LOG_EMERG),
            1 => Some(Level::LOG_ALERT),
            2 => Some(Level::LOG_CRIT),
            3 => Some(Level::LOG_ERR),
            4 => Some(Level::LOG_WARNING),
            5 => Some(Level::LOG_NOTICE),
            6 => Some(Level::LOG_INFO),
            7 => Some(Level::LOG_DEBUG),
            _ => None,
        }
    }
    /// Map a producer-supplied severity to a [`Level`].
    ///
    /// Producers hand us their severity as text. Only the decimal codes "0" through "7" are
    /// recognized; anything else, *including* names like "WARNING", comes out as `LOG_INFO`.
    pub fn from_input(input: &str) -> Level {
        input
            .trim()
            .parse::<i64>()
            .ok()
            .and_then(Level::from_code)
            .unwrap_or_default()
    }
    /// This level's numeric code, as it appears on the wire
    pub fn code(&self) -> u8 {
        *self as u8
    }
}

impl std::fmt::Display for Level {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> StdResult<(), std::fmt::Error> {
        write!(
            f,
            "{}",
            match self {
                Level::LOG_EMERG => "LOG_EMERG",
                Level::LOG_ALERT => "LOG_ALERT",
                Level::LOG_CRIT => "LOG_CRIT",
                Level::LOG_ERR => "LOG_ERR",
                Level::LOG_WARNING => "LOG_WARNING",
                Level::LOG_NOTICE => "LOG_NOTICE",
                Level::LOG_INFO => "LOG_INFO",
                Level::LOG_DEBUG => "LOG_DEBUG",
            }
        )
    }
}

#[cfg(test)]
mod level_tests {
    use super::*;

    #[test]
    fn codes() {
        assert_eq!(Level::LOG_EMERG.code(), 0);
        assert_eq!(Level::LOG_WARNING.code(), 4);
        assert_eq!(Level::LOG_DEBUG.code(), 7);
        assert_eq!(format!("{}", Level::LOG_ERR), "LOG_ERR".to_string());
    }

    #[test]
    fn unrecognized_input_is_info() {
        assert_eq!(Level::from_input("3"), Level::LOG_ERR);
        assert_eq!(Level::from_input(" 0 "), Level::LOG_EMERG);
        assert_eq!(Level::from_input("WARNING"), Level::LOG_INFO);
        assert_eq!(Level::from_input("8"), Level::LOG_INFO);
        assert_eq!(Level::from_input("-1"), Level::LOG_INFO);
        assert_eq!(Level::from_input(""), Level::LOG_INFO);
    }
}
