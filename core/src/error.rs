/*
 * error.rs
 * Copyright (C) 2026 Chris Burdess
 *
 * This file is part of Vassoio, an asynchronous HTTP origin server.
 *
 * Vassoio is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * Vassoio is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with Vassoio.  If not, see <http://www.gnu.org/licenses/>.
 */

//! Server errors: startup configuration failures and per-response HTTP errors.

use std::fmt;
use std::io;

/// Startup configuration failure. Surfaces before serving; the process should not listen.
#[derive(Debug)]
pub enum ConfigError {
    /// Listen address is not `*`, IPv4, or (bracketed) IPv6.
    Address(String),
    /// TCP port outside 1..=65535.
    Port(u32),
    /// Certificate bundle missing, unreadable, unparseable, or without a private key.
    Certificate(String),
    /// crypto_method option produced an empty version mask.
    CryptoMethod(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Address(a) => write!(f, "invalid listen address: {}", a),
            ConfigError::Port(p) => write!(f, "port {} out of range (1-65535)", p),
            ConfigError::Certificate(m) => write!(f, "certificate error: {}", m),
            ConfigError::CryptoMethod(m) => write!(f, "crypto_method error: {}", m),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Errors raised while producing a single response or driving a connection.
#[derive(Debug)]
pub enum HttpError {
    /// A response operation was called in a state that forbids it. Programmer bug;
    /// fatal to the current response only.
    Lifecycle(&'static str),
    /// The writer factory was handed a body it cannot serialize.
    InvalidBody(&'static str),
    /// The client disconnected; the current writer must stop and release its body source.
    ClientGone,
    /// A codec filter failed while transforming headers or body.
    Filter(String),
    /// Any other I/O failure (body source read, listener, ...).
    Io(io::Error),
}

impl HttpError {
    /// True if this error means the peer is unreachable and the connection is dead.
    pub fn is_client_gone(&self) -> bool {
        matches!(self, HttpError::ClientGone)
    }
}

impl fmt::Display for HttpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HttpError::Lifecycle(m) => write!(f, "response lifecycle violation: {}", m),
            HttpError::InvalidBody(m) => write!(f, "invalid response body: {}", m),
            HttpError::ClientGone => write!(f, "client disconnected"),
            HttpError::Filter(m) => write!(f, "filter error: {}", m),
            HttpError::Io(e) => write!(f, "i/o error: {}", e),
        }
    }
}

impl std::error::Error for HttpError {}

/// Socket-side errors: disconnect-shaped kinds collapse to ClientGone so writers
/// and response methods surface a single cancellation signal.
impl From<io::Error> for HttpError {
    fn from(e: io::Error) -> Self {
        match e.kind() {
            io::ErrorKind::BrokenPipe
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::UnexpectedEof
            | io::ErrorKind::WriteZero => HttpError::ClientGone,
            _ => HttpError::Io(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disconnect_kinds_map_to_client_gone() {
        for kind in [
            io::ErrorKind::BrokenPipe,
            io::ErrorKind::ConnectionReset,
            io::ErrorKind::ConnectionAborted,
            io::ErrorKind::UnexpectedEof,
            io::ErrorKind::WriteZero,
        ] {
            let e = HttpError::from(io::Error::new(kind, "gone"));
            assert!(e.is_client_gone(), "{:?} should map to ClientGone", kind);
        }
        let e = HttpError::from(io::Error::new(io::ErrorKind::PermissionDenied, "nope"));
        assert!(!e.is_client_gone());
    }
}
