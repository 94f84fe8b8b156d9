/*
 * parser.rs
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

//! HTTP/1.x request push parser: request line, headers, body (Content-Length
//! or chunked). After the headers of each request the parser pauses so the
//! connection can decide the body mode; after each complete request it loops
//! back to the request line for pipelined successors.

use bytes::Buf;
use bytes::BytesMut;
use std::io;

use crate::protocol::http::request::HttpVersion;

/// A request line or header line longer than this is rejected outright.
const MAX_LINE: usize = 8192;

/// Callback for request events. The connection implements this and assembles
/// Request values plus body chunks from it.
pub trait H1RequestHandler {
    fn request_line(&mut self, method: &str, target: &str, version: HttpVersion);
    fn header(&mut self, name: &str, value: &str);
    /// Headers done; the connection must call set_body_mode() before feeding
    /// more bytes.
    fn headers_complete(&mut self);
    fn body_chunk(&mut self, data: &[u8]);
    fn trailer(&mut self, name: &str, value: &str);
    fn complete(&mut self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseState {
    RequestLine,
    Headers,
    /// Waiting for the connection to call set_body_mode().
    HeadersComplete,
    Body,
    ChunkSize,
    ChunkData,
    ChunkTrailer,
}

/// Push parser for HTTP/1.x requests. Feed bytes via `receive`; the handler
/// is invoked as complete tokens are parsed.
pub struct RequestParser {
    state: ParseState,
    /// Remaining identity body length; unset for chunked.
    content_length: i64,
    bytes_received: i64,
    chunk_remaining: i64,
}

impl RequestParser {
    pub fn new() -> Self {
        Self {
            state: ParseState::RequestLine,
            content_length: -1,
            bytes_received: 0,
            chunk_remaining: 0,
        }
    }

    pub fn state(&self) -> ParseState {
        self.state
    }

    /// Find CRLF in buf; return bytes to the start of CRLF, or None.
    fn find_crlf(buf: &[u8]) -> Option<usize> {
        let mut i = 0;
        while i + 1 < buf.len() {
            if buf[i] == b'\r' && buf[i + 1] == b'\n' {
                return Some(i);
            }
            i += 1;
        }
        None
    }

    fn take_line(buf: &mut BytesMut) -> io::Result<Option<(BytesMut, usize)>> {
        match Self::find_crlf(buf) {
            Some(n) => Ok(Some((buf.split_to(n + 2), n))),
            None => {
                if buf.len() > MAX_LINE {
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidData,
                        "header line too long",
                    ));
                }
                Ok(None)
            }
        }
    }

    /// Consume and parse as much as possible from buf. Partial data remains
    /// in buf. Pauses in HeadersComplete until set_body_mode() is called.
    pub fn receive<H: H1RequestHandler>(
        &mut self,
        buf: &mut BytesMut,
        handler: &mut H,
    ) -> Result<(), io::Error> {
        while !buf.is_empty() {
            match self.state {
                ParseState::RequestLine => {
                    let (line, line_end) = match Self::take_line(buf)? {
                        Some(l) => l,
                        None => return Ok(()),
                    };
                    if line_end == 0 {
                        // Tolerate blank lines between pipelined requests.
                        continue;
                    }
                    let line_str = std::str::from_utf8(&line[..line_end]).map_err(|_| {
                        io::Error::new(io::ErrorKind::InvalidData, "invalid request line UTF-8")
                    })?;
                    let parts: Vec<&str> = line_str.splitn(3, ' ').collect();
                    if parts.len() != 3 || parts[0].is_empty() || parts[1].is_empty() {
                        return Err(io::Error::new(
                            io::ErrorKind::InvalidData,
                            "malformed request line",
                        ));
                    }
                    let version = match parts[2] {
                        "HTTP/1.1" => HttpVersion::Http1_1,
                        "HTTP/1.0" => HttpVersion::Http1_0,
                        _ => {
                            return Err(io::Error::new(
                                io::ErrorKind::InvalidData,
                                "unsupported protocol version",
                            ))
                        }
                    };
                    handler.request_line(parts[0], parts[1], version);
                    self.state = ParseState::Headers;
                }
                ParseState::Headers => {
                    let (line, line_end) = match Self::take_line(buf)? {
                        Some(l) => l,
                        None => return Ok(()),
                    };
                    if line_end == 0 {
                        self.state = ParseState::HeadersComplete;
                        handler.headers_complete();
                        return Ok(()); // connection decides the body mode
                    }
                    let line_str = std::str::from_utf8(&line[..line_end]).map_err(|_| {
                        io::Error::new(io::ErrorKind::InvalidData, "invalid header UTF-8")
                    })?;
                    match line_str.find(':') {
                        Some(colon) => {
                            let name = line_str[..colon].trim();
                            let value = line_str[colon + 1..].trim();
                            handler.header(name, value);
                        }
                        None => {
                            return Err(io::Error::new(
                                io::ErrorKind::InvalidData,
                                "header line without colon",
                            ))
                        }
                    }
                }
                ParseState::HeadersComplete => {
                    // Waiting for set_body_mode().
                    return Ok(());
                }
                ParseState::Body => {
                    let remaining = (self.content_length - self.bytes_received) as usize;
                    let to_read = remaining.min(buf.len());
                    if to_read > 0 {
                        let chunk = buf.split_to(to_read);
                        handler.body_chunk(&chunk);
                        self.bytes_received += to_read as i64;
                    }
                    if self.bytes_received >= self.content_length {
                        handler.complete();
                        self.state = ParseState::RequestLine;
                    }
                }
                ParseState::ChunkSize => {
                    let (line, line_end) = match Self::take_line(buf)? {
                        Some(l) => l,
                        None => return Ok(()),
                    };
                    let line_str = std::str::from_utf8(&line[..line_end]).map_err(|_| {
                        io::Error::new(io::ErrorKind::InvalidData, "invalid chunk size")
                    })?;
                    let hex_part = line_str.split(';').next().unwrap_or(line_str).trim();
                    self.chunk_remaining = i64::from_str_radix(hex_part, 16).map_err(|_| {
                        io::Error::new(io::ErrorKind::InvalidData, "invalid chunk size")
                    })?;
                    if self.chunk_remaining == 0 {
                        self.state = ParseState::ChunkTrailer;
                    } else {
                        self.state = ParseState::ChunkData;
                    }
                }
                ParseState::ChunkData => {
                    let to_read = (self.chunk_remaining as usize).min(buf.len());
                    if to_read > 0 {
                        let chunk = buf.split_to(to_read);
                        handler.body_chunk(&chunk);
                        self.chunk_remaining -= to_read as i64;
                    }
                    if self.chunk_remaining == 0 {
                        // Consume the CRLF after the chunk data.
                        if buf.len() >= 2 {
                            buf.advance(2);
                            self.state = ParseState::ChunkSize;
                        } else {
                            return Ok(());
                        }
                    } else {
                        return Ok(());
                    }
                }
                ParseState::ChunkTrailer => {
                    let (line, line_end) = match Self::take_line(buf)? {
                        Some(l) => l,
                        None => return Ok(()),
                    };
                    if line_end == 0 {
                        handler.complete();
                        self.state = ParseState::RequestLine;
                    } else {
                        let line_str = std::str::from_utf8(&line[..line_end]).map_err(|_| {
                            io::Error::new(io::ErrorKind::InvalidData, "invalid trailer")
                        })?;
                        if let Some(colon) = line_str.find(':') {
                            let name = line_str[..colon].trim();
                            let value = line_str[colon + 1..].trim();
                            handler.trailer(name, value);
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// Called by the connection after headers_complete(). A request without
    /// content-length and without chunked encoding has no body.
    pub fn set_body_mode(&mut self, content_length: Option<u64>, chunked: bool) -> bool {
        if self.state != ParseState::HeadersComplete {
            return false;
        }
        if chunked {
            self.content_length = -1;
            self.state = ParseState::ChunkSize;
            true
        } else if let Some(cl) = content_length.filter(|cl| *cl > 0) {
            self.content_length = cl as i64;
            self.bytes_received = 0;
            self.state = ParseState::Body;
            true
        } else {
            self.state = ParseState::RequestLine;
            false
        }
    }
}

impl Default for RequestParser {
    fn default() -> Self {
        Self::new()
    }
}
