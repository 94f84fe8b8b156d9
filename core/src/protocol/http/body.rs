/*
 * body.rs
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

//! Response body shapes. A body is exactly one of six variants; the writer
//! factory dispatches on the tag, so every variant has a serializer.

use bytes::Bytes;
use rand::distributions::Alphanumeric;
use rand::Rng;
use tokio::io::{AsyncRead, AsyncSeek};
use tokio::sync::mpsc;

use super::headers::EntityLength;

/// Seekable byte source for range bodies. `tokio::fs::File` qualifies.
pub trait RangeSource: AsyncRead + AsyncSeek + Send + Unpin {}

impl<T: AsyncRead + AsyncSeek + Send + Unpin> RangeSource for T {}

/// Opaque readable source with unknown length.
pub struct BodyStream {
    pub(crate) source: Box<dyn AsyncRead + Send + Unpin>,
}

impl BodyStream {
    pub fn new(source: impl AsyncRead + Send + Unpin + 'static) -> Self {
        Self { source: Box::new(source) }
    }
}

/// A seekable source plus one `(offset, length)` window.
pub struct ByteRangeBody {
    pub(crate) source: Box<dyn RangeSource>,
    pub offset: u64,
    pub length: u64,
}

/// A seekable source plus several `(offset, length)` windows, serialized as
/// `multipart/byteranges` with a generated boundary token.
pub struct MultiPartBody {
    pub(crate) source: Box<dyn RangeSource>,
    pub ranges: Vec<(u64, u64)>,
    pub boundary: String,
    /// `Content-Type` of each part.
    pub content_type: String,
    /// Complete size of the underlying representation, for `Content-Range`.
    pub total_size: u64,
}

impl MultiPartBody {
    /// Value for the response `content-type` header.
    pub fn content_type_header(&self) -> String {
        format!("multipart/byteranges; boundary={}", self.boundary)
    }

    /// The delimiter + part headers emitted before one range's bytes.
    pub(crate) fn part_header(&self, offset: u64, length: u64) -> String {
        format!(
            "--{}\r\nContent-Type: {}\r\nContent-Range: bytes {}-{}/{}\r\n\r\n",
            self.boundary,
            self.content_type,
            offset,
            offset + length - 1,
            self.total_size,
        )
    }

    /// Closing delimiter after the last range.
    pub(crate) fn closing_delimiter(&self) -> String {
        format!("--{}--\r\n", self.boundary)
    }

    /// Exact on-wire length of the whole multipart payload.
    pub fn payload_length(&self) -> u64 {
        let mut total = 0u64;
        for &(offset, length) in &self.ranges {
            total += self.part_header(offset, length).len() as u64;
            total += length;
            total += 2; // CRLF after the part's bytes
        }
        total + self.closing_delimiter().len() as u64
    }
}

/// Boundary token: 24 alphanumerics, collision-safe for one response.
fn generate_boundary() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(24)
        .map(char::from)
        .collect()
}

/// Tagged body union consumed by the writer factory.
pub enum Body {
    /// No body bytes at all.
    Empty,
    /// Finite in-memory buffer.
    Buffer(Bytes),
    /// Opaque readable source, unknown length.
    Stream(BodyStream),
    /// Seekable source window.
    ByteRange(ByteRangeBody),
    /// Several windows with multipart delimiters.
    MultiPartByteRange(MultiPartBody),
    /// Finite lazy chunk sequence; not restartable. Senders suspend the
    /// producer when the writer is not draining.
    Chunks(mpsc::Receiver<Bytes>),
}

impl Body {
    pub fn buffer(data: impl Into<Bytes>) -> Body {
        Body::Buffer(data.into())
    }

    pub fn stream(source: impl AsyncRead + Send + Unpin + 'static) -> Body {
        Body::Stream(BodyStream::new(source))
    }

    pub fn byte_range(source: impl RangeSource + 'static, offset: u64, length: u64) -> Body {
        Body::ByteRange(ByteRangeBody { source: Box::new(source), offset, length })
    }

    pub fn multipart_byte_range(
        source: impl RangeSource + 'static,
        ranges: Vec<(u64, u64)>,
        content_type: impl Into<String>,
        total_size: u64,
    ) -> Body {
        Body::MultiPartByteRange(MultiPartBody {
            source: Box::new(source),
            ranges,
            boundary: generate_boundary(),
            content_type: content_type.into(),
            total_size,
        })
    }

    /// Lazy chunk sequence with the given producer-side queue depth.
    pub fn chunks(depth: usize) -> (mpsc::Sender<Bytes>, Body) {
        let (tx, rx) = mpsc::channel(depth);
        (tx, Body::Chunks(rx))
    }

    /// Entity length sentinel for the header snapshot.
    pub fn entity_length(&self) -> EntityLength {
        match self {
            Body::Empty => EntityLength::None,
            Body::Buffer(b) => EntityLength::Exact(b.len() as u64),
            Body::Stream(_) => EntityLength::Streaming,
            Body::ByteRange(r) => EntityLength::Exact(r.length),
            Body::MultiPartByteRange(m) => EntityLength::Exact(m.payload_length()),
            Body::Chunks(_) => EntityLength::Streaming,
        }
    }
}
