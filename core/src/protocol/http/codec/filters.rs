/*
 * filters.rs
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

//! Standard codec filters: compression negotiation, framing decision, and the
//! terminal serialization into a status line + header block.

use std::io::Write;

use bytes::{Bytes, BytesMut};
use flate2::write::{GzEncoder, ZlibEncoder};
use flate2::Compression;

use super::{Filter, FilterContext, FilterError, Framing};
use crate::error::HttpError;
use crate::protocol::http::headers::{EntityLength, HeaderMap, ENTITY_LENGTH, REASON, STATUS};

/// Server token stamped when the handler did not set one.
const SERVER_TOKEN: &str = concat!("vassoio/", env!("CARGO_PKG_VERSION"));

/// Responses below this size are not worth compressing.
const MIN_COMPRESS_LENGTH: u64 = 1024;

/// RFC 7231 date format, always GMT.
pub fn http_date() -> String {
    chrono::Utc::now().format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

pub fn default_reason(status: u16) -> &'static str {
    match status {
        100 => "Continue",
        101 => "Switching Protocols",
        200 => "OK",
        201 => "Created",
        202 => "Accepted",
        204 => "No Content",
        206 => "Partial Content",
        301 => "Moved Permanently",
        302 => "Found",
        303 => "See Other",
        304 => "Not Modified",
        307 => "Temporary Redirect",
        308 => "Permanent Redirect",
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        405 => "Method Not Allowed",
        408 => "Request Timeout",
        411 => "Length Required",
        413 => "Payload Too Large",
        414 => "URI Too Long",
        416 => "Range Not Satisfiable",
        426 => "Upgrade Required",
        429 => "Too Many Requests",
        431 => "Request Header Fields Too Large",
        500 => "Internal Server Error",
        501 => "Not Implemented",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        505 => "HTTP Version Not Supported",
        _ => "Unknown",
    }
}

fn status_of(headers: &HeaderMap) -> u16 {
    headers
        .get(STATUS)
        .and_then(|s| s.parse::<u16>().ok())
        .unwrap_or(200)
}

fn status_forbids_body(status: u16) -> bool {
    matches!(status, 100..=199 | 204 | 304)
}

/// Replaces the entity-length pseudo-header with concrete framing headers:
/// a decimal length becomes `content-length`; streaming becomes
/// `transfer-encoding: chunked` on HTTP/1.1 and close-delimited on 1.0;
/// "no body" becomes `content-length: 0` unless the status forbids a body.
pub struct FramingFilter;

impl Filter for FramingFilter {
    fn on_headers(
        &mut self,
        ctx: &FilterContext,
        headers: &mut HeaderMap,
    ) -> Result<(), FilterError> {
        let entity = headers
            .remove(ENTITY_LENGTH)
            .and_then(|values| values.into_iter().next())
            .and_then(|v| EntityLength::parse(&v))
            .ok_or_else(|| FilterError("missing or invalid entity length".to_string()))?;
        match entity {
            EntityLength::None => {
                if !status_forbids_body(status_of(headers)) {
                    headers.set("content-length", "0");
                }
            }
            EntityLength::Exact(n) => {
                headers.set("content-length", n.to_string());
            }
            EntityLength::Streaming => {
                headers.remove("content-length");
                if ctx.version.supports_chunked() {
                    headers.set("transfer-encoding", "chunked");
                } else {
                    headers.set("connection", "close");
                }
            }
        }
        Ok(())
    }
}

enum Encoder {
    Gzip(GzEncoder<Vec<u8>>),
    Deflate(ZlibEncoder<Vec<u8>>),
}

impl Encoder {
    fn write(&mut self, data: &[u8]) -> std::io::Result<()> {
        match self {
            Encoder::Gzip(e) => e.write_all(data),
            Encoder::Deflate(e) => e.write_all(data),
        }
    }

    fn sync_flush(&mut self) -> std::io::Result<()> {
        match self {
            Encoder::Gzip(e) => e.flush(),
            Encoder::Deflate(e) => e.flush(),
        }
    }

    fn take_output(&mut self) -> Vec<u8> {
        match self {
            Encoder::Gzip(e) => std::mem::take(e.get_mut()),
            Encoder::Deflate(e) => std::mem::take(e.get_mut()),
        }
    }

    fn finish(self) -> std::io::Result<Vec<u8>> {
        match self {
            Encoder::Gzip(e) => e.finish(),
            Encoder::Deflate(e) => e.finish(),
        }
    }
}

/// Negotiates `content-encoding` from the request's accept-encoding: when the
/// body is compressible and large (or unbounded), compresses chunks and turns
/// the entity length into streaming so the framing filter chunks the output.
pub struct CompressionFilter {
    encoder: Option<Encoder>,
}

impl CompressionFilter {
    pub fn new() -> Self {
        Self { encoder: None }
    }

    fn compressible(content_type: &str) -> bool {
        let ct = content_type
            .split(';')
            .next()
            .unwrap_or("")
            .trim()
            .to_ascii_lowercase();
        ct.starts_with("text/")
            || ct.ends_with("+xml")
            || ct.ends_with("+json")
            || matches!(
                ct.as_str(),
                "application/json"
                    | "application/javascript"
                    | "application/xml"
                    | "image/svg+xml"
            )
    }
}

impl Default for CompressionFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl Filter for CompressionFilter {
    fn on_headers(
        &mut self,
        ctx: &FilterContext,
        headers: &mut HeaderMap,
    ) -> Result<(), FilterError> {
        if headers.contains("content-encoding") {
            return Ok(());
        }
        let entity = headers.get(ENTITY_LENGTH).and_then(EntityLength::parse);
        let eligible = match entity {
            Some(EntityLength::Streaming) => true,
            Some(EntityLength::Exact(n)) => n >= MIN_COMPRESS_LENGTH,
            _ => false,
        };
        if !eligible {
            return Ok(());
        }
        let compressible = headers
            .get("content-type")
            .map(Self::compressible)
            .unwrap_or(false);
        if !compressible {
            return Ok(());
        }
        if ctx.accept_gzip {
            headers.set("content-encoding", "gzip");
            self.encoder = Some(Encoder::Gzip(GzEncoder::new(Vec::new(), Compression::default())));
        } else if ctx.accept_deflate {
            headers.set("content-encoding", "deflate");
            self.encoder = Some(Encoder::Deflate(ZlibEncoder::new(
                Vec::new(),
                Compression::default(),
            )));
        } else {
            return Ok(());
        }
        // Length is no longer known; downstream decides chunked or close.
        headers.set(ENTITY_LENGTH, "*");
        headers.add("vary", "accept-encoding");
        Ok(())
    }

    fn on_chunk(&mut self, chunk: Bytes, out: &mut Vec<Bytes>) -> Result<(), FilterError> {
        match &mut self.encoder {
            Some(encoder) => {
                encoder
                    .write(&chunk)
                    .map_err(|e| FilterError(format!("compression failed: {}", e)))?;
                let produced = encoder.take_output();
                if !produced.is_empty() {
                    out.push(Bytes::from(produced));
                }
                Ok(())
            }
            None => {
                out.push(chunk);
                Ok(())
            }
        }
    }

    fn on_flush(&mut self, out: &mut Vec<Bytes>) -> Result<(), FilterError> {
        if let Some(encoder) = &mut self.encoder {
            encoder
                .sync_flush()
                .map_err(|e| FilterError(format!("compression flush failed: {}", e)))?;
            let produced = encoder.take_output();
            if !produced.is_empty() {
                out.push(Bytes::from(produced));
            }
        }
        Ok(())
    }

    fn on_end(&mut self, out: &mut Vec<Bytes>) -> Result<(), FilterError> {
        if let Some(encoder) = self.encoder.take() {
            let produced = encoder
                .finish()
                .map_err(|e| FilterError(format!("compression finish failed: {}", e)))?;
            if !produced.is_empty() {
                out.push(Bytes::from(produced));
            }
        }
        Ok(())
    }
}

/// Terminal stage: pull the pseudo-headers out, stamp `date` and `server`,
/// derive the framing from what the chain left behind, and build the block.
pub fn serialize(
    ctx: &FilterContext,
    mut headers: HeaderMap,
) -> Result<(Bytes, Framing, bool), HttpError> {
    let status = headers
        .remove(STATUS)
        .and_then(|v| v.into_iter().next())
        .and_then(|s| s.parse::<u16>().ok())
        .unwrap_or(200);
    let reason = headers
        .remove(REASON)
        .and_then(|v| v.into_iter().next())
        .unwrap_or_else(|| default_reason(status).to_string());

    if !headers.contains("date") {
        headers.set("date", http_date());
    }
    if !headers.contains("server") {
        headers.set("server", SERVER_TOKEN);
    }

    let framing = if headers.has_token("transfer-encoding", "chunked") {
        Framing::Chunked
    } else if let Some(n) = headers.get("content-length").and_then(|v| v.parse::<u64>().ok()) {
        Framing::Length(n)
    } else if headers.has_token("connection", "close") {
        Framing::Close
    } else {
        Framing::None
    };
    let close = headers.has_token("connection", "close");

    let mut block = BytesMut::with_capacity(256);
    block.extend_from_slice(ctx.version.as_str().as_bytes());
    block.extend_from_slice(b" ");
    block.extend_from_slice(status.to_string().as_bytes());
    block.extend_from_slice(b" ");
    block.extend_from_slice(reason.as_bytes());
    block.extend_from_slice(b"\r\n");
    headers.write_block(&mut block);
    block.extend_from_slice(b"\r\n");
    Ok((block.freeze(), framing, close))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::http::request::HttpVersion;

    fn ctx11() -> FilterContext {
        FilterContext::new(HttpVersion::Http1_1)
    }

    fn headers_with(entity: &str) -> HeaderMap {
        let mut h = HeaderMap::new();
        h.set(STATUS, "200");
        h.set(ENTITY_LENGTH, entity);
        h
    }

    #[test]
    fn framing_known_length() {
        let mut h = headers_with("2");
        FramingFilter.on_headers(&ctx11(), &mut h).unwrap();
        assert_eq!(h.get("content-length"), Some("2"));
        assert!(!h.contains("transfer-encoding"));
    }

    #[test]
    fn framing_streaming_http11_is_chunked() {
        let mut h = headers_with("*");
        FramingFilter.on_headers(&ctx11(), &mut h).unwrap();
        assert_eq!(h.get("transfer-encoding"), Some("chunked"));
    }

    #[test]
    fn framing_streaming_http10_closes() {
        let mut h = headers_with("*");
        FramingFilter
            .on_headers(&FilterContext::new(HttpVersion::Http1_0), &mut h)
            .unwrap();
        assert!(!h.contains("transfer-encoding"));
        assert_eq!(h.get("connection"), Some("close"));
    }

    #[test]
    fn framing_no_body() {
        let mut h = headers_with("@");
        FramingFilter.on_headers(&ctx11(), &mut h).unwrap();
        assert_eq!(h.get("content-length"), Some("0"));

        let mut h = headers_with("@");
        h.set(STATUS, "204");
        FramingFilter.on_headers(&ctx11(), &mut h).unwrap();
        assert!(!h.contains("content-length"));
    }

    #[test]
    fn serialize_builds_status_line_and_strips_pseudo_headers() {
        let mut h = HeaderMap::new();
        h.set(STATUS, "201");
        h.set("x-a", "1");
        h.set("content-length", "2");
        let (block, framing, close) = serialize(&ctx11(), h).unwrap();
        let text = std::str::from_utf8(&block).unwrap();
        assert!(text.starts_with("HTTP/1.1 201 Created\r\n"));
        assert!(text.contains("x-a: 1\r\n"));
        assert!(text.contains("date: "));
        assert!(text.contains("server: "));
        assert!(!text.contains(":status"));
        assert!(text.ends_with("\r\n\r\n"));
        assert_eq!(framing, Framing::Length(2));
        assert!(!close);
    }

    #[test]
    fn serialize_honors_custom_reason() {
        let mut h = HeaderMap::new();
        h.set(STATUS, "200");
        h.set(REASON, "Fine And Dandy");
        h.set("content-length", "0");
        let (block, _, _) = serialize(&ctx11(), h).unwrap();
        assert!(std::str::from_utf8(&block)
            .unwrap()
            .starts_with("HTTP/1.1 200 Fine And Dandy\r\n"));
    }

    #[test]
    fn compression_negotiates_gzip_and_forces_streaming() {
        let mut ctx = ctx11();
        ctx.accept_gzip = true;
        let mut filter = CompressionFilter::new();
        let mut h = headers_with("4096");
        h.set("content-type", "text/html");
        filter.on_headers(&ctx, &mut h).unwrap();
        assert_eq!(h.get("content-encoding"), Some("gzip"));
        assert_eq!(h.get(ENTITY_LENGTH), Some("*"));
    }

    #[test]
    fn compression_skips_small_or_binary_bodies() {
        let mut ctx = ctx11();
        ctx.accept_gzip = true;

        let mut filter = CompressionFilter::new();
        let mut h = headers_with("10");
        h.set("content-type", "text/html");
        filter.on_headers(&ctx, &mut h).unwrap();
        assert!(!h.contains("content-encoding"));

        let mut filter = CompressionFilter::new();
        let mut h = headers_with("*");
        h.set("content-type", "image/png");
        filter.on_headers(&ctx, &mut h).unwrap();
        assert!(!h.contains("content-encoding"));
    }

    #[test]
    fn compression_round_trip() {
        use std::io::Read;

        let mut ctx = ctx11();
        ctx.accept_gzip = true;
        let mut filter = CompressionFilter::new();
        let mut h = headers_with("*");
        h.set("content-type", "text/plain");
        filter.on_headers(&ctx, &mut h).unwrap();

        let mut wire = Vec::new();
        let mut out = Vec::new();
        filter
            .on_chunk(Bytes::from(vec![b'a'; 2000]), &mut out)
            .unwrap();
        filter.on_end(&mut out).unwrap();
        for c in out {
            wire.extend_from_slice(&c);
        }
        let mut decoder = flate2::read::GzDecoder::new(&wire[..]);
        let mut plain = Vec::new();
        decoder.read_to_end(&mut plain).unwrap();
        assert_eq!(plain, vec![b'a'; 2000]);
    }
}
