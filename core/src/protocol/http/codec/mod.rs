/*
 * mod.rs
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

//! Egress codec: an ordered filter chain between Response and writer.
//!
//! Event order is strict: one header snapshot, zero or more chunks or
//! flushes, one end. Each filter may transform or buffer events; composition
//! is sequential. The downstream end is a bounded frame channel consumed by
//! the writer; a full channel suspends the response method that pushed.

pub mod filters;

use bytes::Bytes;
use std::fmt;
use tokio::sync::{mpsc, oneshot};

use crate::error::HttpError;
use crate::protocol::http::body::Body;
use crate::protocol::http::headers::HeaderMap;
use crate::protocol::http::request::{HttpVersion, Request};

/// Framing chosen for a response body, recorded in the header frame so the
/// writer knows how to put chunks on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    /// `content-length` stamped; chunks go out verbatim.
    Length(u64),
    /// `transfer-encoding: chunked`; the writer frames each chunk.
    Chunked,
    /// Neither; the body ends when the connection closes.
    Close,
    /// No body at all.
    None,
}

/// Frames delivered to the writer.
pub enum WireFrame {
    /// Pre-serialized status line + header block.
    Headers {
        block: Bytes,
        framing: Framing,
        close: bool,
    },
    /// Body bytes (post-filter, pre-framing).
    Chunk(Bytes),
    /// Hand everything to the destination, then ack.
    Flush(oneshot::Sender<()>),
    /// End of body.
    End,
    /// Out-of-band body; the writer factory dispatches on its shape.
    Payload(Body),
}

/// Per-response context visible to filters: negotiated protocol version and
/// what the request is willing to accept.
#[derive(Debug, Clone)]
pub struct FilterContext {
    pub version: HttpVersion,
    pub accept_gzip: bool,
    pub accept_deflate: bool,
}

impl FilterContext {
    pub fn new(version: HttpVersion) -> Self {
        Self {
            version,
            accept_gzip: false,
            accept_deflate: false,
        }
    }

    pub fn for_request(request: &Request) -> Self {
        let mut ctx = Self::new(request.version);
        if let Some(value) = request.headers.get("accept-encoding") {
            for token in value.split(',') {
                let token = token.trim().split(';').next().unwrap_or("").trim();
                if token.eq_ignore_ascii_case("gzip") {
                    ctx.accept_gzip = true;
                } else if token.eq_ignore_ascii_case("deflate") {
                    ctx.accept_deflate = true;
                }
            }
        }
        ctx
    }
}

/// A filter stage failure. Recoverable (synthetic 500) only while the header
/// block has not reached the writer.
#[derive(Debug)]
pub struct FilterError(pub String);

impl fmt::Display for FilterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for FilterError {}

/// One stage of the chain. Default methods pass events through unchanged.
pub trait Filter: Send {
    fn on_headers(
        &mut self,
        _ctx: &FilterContext,
        _headers: &mut HeaderMap,
    ) -> Result<(), FilterError> {
        Ok(())
    }

    /// Transform one body chunk; push zero or more chunks downstream.
    fn on_chunk(&mut self, chunk: Bytes, out: &mut Vec<Bytes>) -> Result<(), FilterError> {
        out.push(chunk);
        Ok(())
    }

    /// Emit anything buffered; the response asked for bytes on the wire now.
    fn on_flush(&mut self, _out: &mut Vec<Bytes>) -> Result<(), FilterError> {
        Ok(())
    }

    /// Body is complete; emit any trailing bytes.
    fn on_end(&mut self, _out: &mut Vec<Bytes>) -> Result<(), FilterError> {
        Ok(())
    }
}

/// The assembled chain plus its downstream frame channel.
pub struct Codec {
    ctx: FilterContext,
    chain: Vec<Box<dyn Filter>>,
    tx: mpsc::Sender<WireFrame>,
    headers_sent: bool,
    framing: Framing,
}

impl Codec {
    pub fn new(ctx: FilterContext, chain: Vec<Box<dyn Filter>>, tx: mpsc::Sender<WireFrame>) -> Self {
        Self {
            ctx,
            chain,
            tx,
            headers_sent: false,
            framing: Framing::None,
        }
    }

    /// Standard chain: compression negotiation, then framing decision.
    pub fn standard(ctx: FilterContext, tx: mpsc::Sender<WireFrame>) -> Self {
        let chain: Vec<Box<dyn Filter>> = vec![
            Box::new(filters::CompressionFilter::new()),
            Box::new(filters::FramingFilter),
        ];
        Self::new(ctx, chain, tx)
    }

    pub fn framing(&self) -> Framing {
        self.framing
    }

    pub(crate) fn headers_sent(&self) -> bool {
        self.headers_sent
    }

    async fn push(&mut self, frame: WireFrame) -> Result<(), HttpError> {
        self.tx.send(frame).await.map_err(|_| HttpError::ClientGone)
    }

    /// Run the header snapshot through the chain, serialize, and push the
    /// header frame downstream.
    pub async fn send_headers(&mut self, mut headers: HeaderMap) -> Result<(), HttpError> {
        for filter in &mut self.chain {
            filter
                .on_headers(&self.ctx, &mut headers)
                .map_err(|e| HttpError::Filter(e.0))?;
        }
        let (block, framing, close) = filters::serialize(&self.ctx, headers)?;
        self.framing = framing;
        self.push(WireFrame::Headers { block, framing, close }).await?;
        self.headers_sent = true;
        Ok(())
    }

    fn run_chunk(&mut self, chunk: Bytes) -> Result<Vec<Bytes>, HttpError> {
        let mut current = vec![chunk];
        for filter in &mut self.chain {
            let mut next = Vec::new();
            for c in current {
                filter.on_chunk(c, &mut next).map_err(|e| HttpError::Filter(e.0))?;
            }
            current = next;
        }
        Ok(current)
    }

    /// Cascade a flush: each stage first sees upstream output as chunks, then
    /// flushes its own buffer.
    fn run_flush(&mut self) -> Result<Vec<Bytes>, HttpError> {
        let mut current: Vec<Bytes> = Vec::new();
        for filter in &mut self.chain {
            let mut next = Vec::new();
            for c in current {
                filter.on_chunk(c, &mut next).map_err(|e| HttpError::Filter(e.0))?;
            }
            filter.on_flush(&mut next).map_err(|e| HttpError::Filter(e.0))?;
            current = next;
        }
        Ok(current)
    }

    fn run_end(&mut self) -> Result<Vec<Bytes>, HttpError> {
        let mut current: Vec<Bytes> = Vec::new();
        for filter in &mut self.chain {
            let mut next = Vec::new();
            for c in current {
                filter.on_chunk(c, &mut next).map_err(|e| HttpError::Filter(e.0))?;
            }
            filter.on_end(&mut next).map_err(|e| HttpError::Filter(e.0))?;
            current = next;
        }
        Ok(current)
    }

    pub async fn send_chunk(&mut self, chunk: Bytes) -> Result<(), HttpError> {
        for c in self.run_chunk(chunk)? {
            self.push(WireFrame::Chunk(c)).await?;
        }
        Ok(())
    }

    /// Push a flush marker and wait until the destination has accepted all
    /// bytes pushed so far.
    pub async fn send_flush(&mut self) -> Result<(), HttpError> {
        for c in self.run_flush()? {
            self.push(WireFrame::Chunk(c)).await?;
        }
        let (ack_tx, ack_rx) = oneshot::channel();
        self.push(WireFrame::Flush(ack_tx)).await?;
        ack_rx.await.map_err(|_| HttpError::ClientGone)
    }

    pub async fn send_end(&mut self) -> Result<(), HttpError> {
        for c in self.run_end()? {
            self.push(WireFrame::Chunk(c)).await?;
        }
        self.push(WireFrame::End).await
    }

    /// Push an out-of-band body for the writer factory. Terminal: the writer
    /// finishes the response after serializing it.
    pub async fn send_payload(&mut self, body: Body) -> Result<(), HttpError> {
        self.push(WireFrame::Payload(body)).await
    }
}
