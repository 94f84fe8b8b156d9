/*
 * response.rs
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

//! Response builder and lifecycle state machine.
//!
//! Status, reason, headers, and cookies are mutable until the first body
//! push freezes them into a header snapshot for the codec. State bits are
//! set only after the corresponding codec push succeeds, so a filter error
//! leaves the response in a state the driver can still substitute for.

use bytes::Bytes;

use crate::error::HttpError;
use crate::protocol::http::body::Body;
use crate::protocol::http::codec::Codec;
use crate::protocol::http::cookie::{CookieFlag, CookieJar};
use crate::protocol::http::headers::{EntityLength, HeaderMap, ENTITY_LENGTH, REASON, STATUS};

/// Header snapshot has been pushed; status/headers/cookies are frozen.
pub const STARTED: u8 = 1 << 0;
/// Body chunks are flowing; more may follow until ENDED.
pub const STREAMING: u8 = 1 << 1;
/// Body is complete; every further push is a lifecycle violation.
pub const ENDED: u8 = 1 << 2;

/// One response under construction. Created by the driver before the handler
/// runs; the handler is its only writer.
pub struct Response {
    status: u16,
    reason: Option<String>,
    headers: HeaderMap,
    cookies: CookieJar,
    state: u8,
    codec: Codec,
}

impl Response {
    pub fn new(codec: Codec) -> Self {
        Self {
            status: 200,
            reason: None,
            headers: HeaderMap::new(),
            cookies: CookieJar::new(),
            state: 0,
            codec,
        }
    }

    /// Current state bits (STARTED | STREAMING | ENDED).
    pub fn state(&self) -> u8 {
        self.state
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    fn not_started(&self, op: &'static str) -> Result<(), HttpError> {
        if self.state & STARTED != 0 {
            return Err(HttpError::Lifecycle(op));
        }
        Ok(())
    }

    pub fn set_status(&mut self, code: u16) -> Result<&mut Self, HttpError> {
        self.not_started("set_status after start")?;
        if !(100..=599).contains(&code) {
            return Err(HttpError::Lifecycle("status outside 100..=599"));
        }
        self.status = code;
        Ok(self)
    }

    pub fn set_reason(&mut self, phrase: impl Into<String>) -> Result<&mut Self, HttpError> {
        self.not_started("set_reason after start")?;
        self.reason = Some(phrase.into());
        Ok(self)
    }

    /// Append a value to the (lowercased) field.
    pub fn add_header(
        &mut self,
        field: &str,
        value: impl Into<String>,
    ) -> Result<&mut Self, HttpError> {
        self.not_started("add_header after start")?;
        self.headers.add(field, value);
        Ok(self)
    }

    /// Replace the (lowercased) field with a single value.
    pub fn set_header(
        &mut self,
        field: &str,
        value: impl Into<String>,
    ) -> Result<&mut Self, HttpError> {
        self.not_started("set_header after start")?;
        self.headers.set(field, value);
        Ok(self)
    }

    pub fn set_cookie(
        &mut self,
        name: impl Into<String>,
        value: impl Into<String>,
        flags: Vec<CookieFlag>,
    ) -> Result<&mut Self, HttpError> {
        self.not_started("set_cookie after start")?;
        self.cookies.set(name, value, flags);
        Ok(self)
    }

    /// Freeze: cookies become `set-cookie` headers, pseudo-headers carry
    /// status, reason, and the entity length sentinel.
    fn snapshot(&self, entity: EntityLength) -> HeaderMap {
        let mut headers = self.headers.clone();
        self.cookies.render_into(&mut headers);
        headers.set(STATUS, self.status.to_string());
        if let Some(reason) = &self.reason {
            headers.set(REASON, reason.clone());
        }
        headers.set(ENTITY_LENGTH, entity.as_header_value());
        headers
    }

    /// Push one body chunk, starting the response in streaming mode (entity
    /// length unknown) on first use.
    pub async fn stream(&mut self, chunk: impl Into<Bytes>) -> Result<(), HttpError> {
        if self.state & ENDED != 0 {
            return Err(HttpError::Lifecycle("stream after end"));
        }
        if self.state & STARTED == 0 {
            let snapshot = self.snapshot(EntityLength::Streaming);
            self.codec.send_headers(snapshot).await?;
            self.state |= STARTED;
        }
        self.codec.send_chunk(chunk.into()).await?;
        self.state |= STREAMING;
        Ok(())
    }

    /// Force everything pushed so far onto the wire. Returns once the
    /// destination has accepted it.
    pub async fn flush(&mut self) -> Result<(), HttpError> {
        if self.state & STARTED == 0 {
            return Err(HttpError::Lifecycle("flush before start"));
        }
        if self.state & ENDED != 0 {
            return Err(HttpError::Lifecycle("flush after end"));
        }
        self.codec.send_flush().await
    }

    /// Complete the response, optionally with a final chunk. On first start
    /// the entity length is the chunk's length, or "no body" without one.
    pub async fn end(&mut self, chunk: Option<Bytes>) -> Result<(), HttpError> {
        if self.state & ENDED != 0 {
            return Err(HttpError::Lifecycle("end after end"));
        }
        if self.state & STARTED == 0 {
            let entity = match &chunk {
                Some(c) => EntityLength::Exact(c.len() as u64),
                None => EntityLength::None,
            };
            let snapshot = self.snapshot(entity);
            self.codec.send_headers(snapshot).await?;
            self.state |= STARTED;
        }
        if let Some(chunk) = chunk {
            self.codec.send_chunk(chunk).await?;
        }
        self.codec.send_end().await?;
        self.state |= ENDED;
        Ok(())
    }

    /// One-shot body: equivalent to `end(Some(body))` on a fresh response.
    pub async fn send(&mut self, body: impl Into<Bytes>) -> Result<(), HttpError> {
        if self.state & (STREAMING | ENDED) != 0 {
            return Err(HttpError::Lifecycle("send after stream or end"));
        }
        self.end(Some(body.into())).await
    }

    /// Attach a shaped body (stream, byte range, multipart, chunk sequence).
    /// The writer factory picks the serializer; the response is complete once
    /// the push is accepted.
    pub async fn send_body(&mut self, body: Body) -> Result<(), HttpError> {
        if self.state & (STARTED | ENDED) != 0 {
            return Err(HttpError::Lifecycle("send_body after start"));
        }
        match body {
            Body::Empty => self.end(None).await,
            Body::Buffer(buffer) => self.end(Some(buffer)).await,
            body => {
                if let Body::MultiPartByteRange(m) = &body {
                    if !self.headers.contains("content-type") {
                        self.headers.set("content-type", m.content_type_header());
                    }
                }
                let snapshot = self.snapshot(body.entity_length());
                self.codec.send_headers(snapshot).await?;
                self.state |= STARTED;
                self.codec.send_payload(body).await?;
                self.state |= ENDED;
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::http::codec::{FilterContext, Framing, WireFrame};
    use crate::protocol::http::request::HttpVersion;
    use tokio::sync::mpsc;

    fn response() -> (Response, mpsc::Receiver<WireFrame>) {
        let (tx, rx) = mpsc::channel(64);
        let codec = Codec::standard(FilterContext::new(HttpVersion::Http1_1), tx);
        (Response::new(codec), rx)
    }

    fn block_text(frame: WireFrame) -> (String, Framing) {
        match frame {
            WireFrame::Headers { block, framing, .. } => {
                (String::from_utf8(block.to_vec()).unwrap(), framing)
            }
            _ => panic!("expected headers frame"),
        }
    }

    #[tokio::test]
    async fn string_body_uses_identity_framing() {
        let (mut res, mut rx) = response();
        res.set_status(201).unwrap().set_header("X-A", "1").unwrap();
        res.send("hi").await.unwrap();
        assert_eq!(res.state(), STARTED | ENDED);

        let (text, framing) = block_text(rx.recv().await.unwrap());
        assert!(text.starts_with("HTTP/1.1 201 Created\r\n"));
        assert!(text.contains("x-a: 1\r\n"));
        assert!(text.contains("content-length: 2\r\n"));
        assert_eq!(framing, Framing::Length(2));
        match rx.recv().await.unwrap() {
            WireFrame::Chunk(c) => assert_eq!(&c[..], b"hi"),
            _ => panic!("expected chunk"),
        }
        assert!(matches!(rx.recv().await.unwrap(), WireFrame::End));
    }

    #[tokio::test]
    async fn setters_fail_after_start_without_mutation() {
        let (mut res, _rx) = response();
        res.send("x").await.unwrap();
        assert!(matches!(
            res.set_header("y", "z"),
            Err(HttpError::Lifecycle(_))
        ));
        assert!(matches!(res.set_status(404), Err(HttpError::Lifecycle(_))));
        assert!(matches!(
            res.set_cookie("a", "b", vec![]),
            Err(HttpError::Lifecycle(_))
        ));
        assert!(!res.headers().contains("y"));
        assert_eq!(res.status(), 200);
    }

    #[tokio::test]
    async fn status_range_is_enforced() {
        let (mut res, _rx) = response();
        assert!(matches!(res.set_status(99), Err(HttpError::Lifecycle(_))));
        assert!(matches!(res.set_status(600), Err(HttpError::Lifecycle(_))));
        res.set_status(100).unwrap();
        res.set_status(599).unwrap();
    }

    #[tokio::test]
    async fn streaming_sets_bits_and_uses_chunked() {
        let (mut res, mut rx) = response();
        res.stream("ab").await.unwrap();
        assert_eq!(res.state(), STARTED | STREAMING);
        res.stream("cd").await.unwrap();
        res.end(None).await.unwrap();
        assert_eq!(res.state(), STARTED | STREAMING | ENDED);

        let (_, framing) = block_text(rx.recv().await.unwrap());
        assert_eq!(framing, Framing::Chunked);
    }

    #[tokio::test]
    async fn flush_requires_started_and_not_ended() {
        let (mut res, mut rx) = response();
        assert!(matches!(res.flush().await, Err(HttpError::Lifecycle(_))));

        // Drain frames concurrently so the flush ack arrives.
        let drain = tokio::spawn(async move {
            while let Some(frame) = rx.recv().await {
                if let WireFrame::Flush(ack) = frame {
                    let _ = ack.send(());
                }
            }
        });
        res.stream("a").await.unwrap();
        res.flush().await.unwrap();
        res.end(None).await.unwrap();
        assert!(matches!(res.flush().await, Err(HttpError::Lifecycle(_))));
        drop(res);
        drain.await.unwrap();
    }

    #[tokio::test]
    async fn end_without_chunk_has_no_body_bytes() {
        let (mut res, mut rx) = response();
        res.end(None).await.unwrap();
        let (text, framing) = block_text(rx.recv().await.unwrap());
        assert!(text.contains("content-length: 0\r\n"));
        assert_eq!(framing, Framing::Length(0));
        assert!(matches!(rx.recv().await.unwrap(), WireFrame::End));
    }

    #[tokio::test]
    async fn send_after_stream_or_end_fails() {
        let (mut res, _rx) = response();
        res.stream("a").await.unwrap();
        assert!(matches!(res.send("b").await, Err(HttpError::Lifecycle(_))));
        res.end(None).await.unwrap();
        assert!(matches!(res.send("c").await, Err(HttpError::Lifecycle(_))));
        assert!(matches!(res.end(None).await, Err(HttpError::Lifecycle(_))));
    }

    #[tokio::test]
    async fn cookies_freeze_into_set_cookie_headers() {
        let (mut res, mut rx) = response();
        res.set_cookie(
            "sid",
            "abc",
            vec![CookieFlag::bare("Secure"), CookieFlag::keyed("path", "/")],
        )
        .unwrap();
        res.send("ok").await.unwrap();
        let (text, _) = block_text(rx.recv().await.unwrap());
        assert!(text.contains("set-cookie: sid=abc; Secure; path=/\r\n"));
    }

    #[tokio::test]
    async fn send_body_dispatches_payload() {
        let (mut res, mut rx) = response();
        let (chunk_tx, body) = Body::chunks(4);
        drop(chunk_tx);
        res.send_body(body).await.unwrap();
        assert_eq!(res.state(), STARTED | ENDED);
        let (_, framing) = block_text(rx.recv().await.unwrap());
        assert_eq!(framing, Framing::Chunked);
        assert!(matches!(rx.recv().await.unwrap(), WireFrame::Payload(_)));
        assert!(matches!(
            res.send_body(Body::Empty).await,
            Err(HttpError::Lifecycle(_))
        ));
    }
}
