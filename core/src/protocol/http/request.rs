/*
 * request.rs
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

//! Parsed request as handed to the application: method, target, protocol
//! version, headers, optional body stream.

use std::io;

use bytes::{Bytes, BytesMut};
use tokio::sync::mpsc;

use super::headers::HeaderMap;

/// HTTP request method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
    Head,
    Options,
    Patch,
    Trace,
    Other(String),
}

impl Method {
    pub fn from_token(token: &str) -> Method {
        match token {
            "GET" => Method::Get,
            "POST" => Method::Post,
            "PUT" => Method::Put,
            "DELETE" => Method::Delete,
            "HEAD" => Method::Head,
            "OPTIONS" => Method::Options,
            "PATCH" => Method::Patch,
            "TRACE" => Method::Trace,
            other => Method::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
            Method::Head => "HEAD",
            Method::Options => "OPTIONS",
            Method::Patch => "PATCH",
            Method::Trace => "TRACE",
            Method::Other(s) => s,
        }
    }
}

/// Negotiated protocol version. 1.1 allows chunked framing and pipelining;
/// 1.0 falls back to identity or close-delimited bodies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpVersion {
    Http1_0,
    Http1_1,
}

impl HttpVersion {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpVersion::Http1_0 => "HTTP/1.0",
            HttpVersion::Http1_1 => "HTTP/1.1",
        }
    }

    pub fn supports_chunked(&self) -> bool {
        matches!(self, HttpVersion::Http1_1)
    }
}

/// Request body handle: a bounded stream of chunks fed by the parser. The
/// parser side suspends when the application is not consuming (backpressure).
/// Dropping the handle discards any chunks still in flight.
pub struct RequestBody {
    rx: mpsc::Receiver<Bytes>,
}

impl RequestBody {
    pub(crate) fn new(rx: mpsc::Receiver<Bytes>) -> Self {
        Self { rx }
    }

    /// Next body chunk, or None at end of body.
    pub async fn chunk(&mut self) -> Option<Bytes> {
        self.rx.recv().await
    }

    /// Collect the whole body, failing once it exceeds `limit` bytes.
    pub async fn read_to_end(&mut self, limit: usize) -> io::Result<Bytes> {
        let mut buf = BytesMut::new();
        while let Some(chunk) = self.rx.recv().await {
            if buf.len() + chunk.len() > limit {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    "request body exceeds limit",
                ));
            }
            buf.extend_from_slice(&chunk);
        }
        Ok(buf.freeze())
    }
}

/// One parsed request. Constructed by the connection driver, consumed by the
/// application handler.
pub struct Request {
    pub method: Method,
    pub target: String,
    pub version: HttpVersion,
    pub headers: HeaderMap,
    pub body: Option<RequestBody>,
}

impl Request {
    /// First value of a header, if present.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    /// Take the body handle, leaving None behind.
    pub fn take_body(&mut self) -> Option<RequestBody> {
        self.body.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn method_round_trip() {
        assert_eq!(Method::from_token("GET"), Method::Get);
        assert_eq!(Method::from_token("BREW").as_str(), "BREW");
        assert_eq!(Method::Delete.as_str(), "DELETE");
    }

    #[tokio::test]
    async fn body_read_to_end_respects_limit() {
        let (tx, rx) = mpsc::channel(4);
        let mut body = RequestBody::new(rx);
        tx.send(Bytes::from_static(b"hello ")).await.unwrap();
        tx.send(Bytes::from_static(b"world")).await.unwrap();
        drop(tx);
        let all = body.read_to_end(64).await.unwrap();
        assert_eq!(&all[..], b"hello world");

        let (tx, rx) = mpsc::channel(4);
        let mut body = RequestBody::new(rx);
        tx.send(Bytes::from_static(b"0123456789")).await.unwrap();
        drop(tx);
        assert!(body.read_to_end(5).await.is_err());
    }
}
