/*
 * writer.rs
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

//! Response serialization: the frame loop consuming the codec tail, and the
//! body writers the factory dispatches to. Socket writes suspend on a full
//! kernel buffer; write failures map to ClientGone and stop body reads.

use std::io::{self, SeekFrom};

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;

use crate::error::HttpError;
use crate::protocol::http::body::{Body, BodyStream, ByteRangeBody, MultiPartBody, RangeSource};
use crate::protocol::http::codec::{Framing, WireFrame};
use crate::protocol::http::request::HttpVersion;

const COPY_BUF: usize = 16 * 1024;

/// Socket-side write; disconnect kinds surface as ClientGone.
async fn sink_write<W: AsyncWrite + Unpin>(dest: &mut W, data: &[u8]) -> Result<(), HttpError> {
    dest.write_all(data).await.map_err(HttpError::from)
}

/// `lower-hex(len) CRLF bytes CRLF`
fn chunk_frame(chunk: &[u8], buf: &mut BytesMut) {
    buf.extend_from_slice(format!("{:x}\r\n", chunk.len()).as_bytes());
    buf.extend_from_slice(chunk);
    buf.extend_from_slice(b"\r\n");
}

/// Copy exactly `length` bytes from a seekable source to the sink. A source
/// that runs dry early is an I/O error, not a client disconnect.
async fn copy_exact<W: AsyncWrite + Unpin>(
    source: &mut (dyn RangeSource),
    dest: &mut W,
    length: u64,
) -> Result<(), HttpError> {
    let mut buf = vec![0u8; COPY_BUF];
    let mut remaining = length;
    while remaining > 0 {
        let want = remaining.min(COPY_BUF as u64) as usize;
        let n = source.read(&mut buf[..want]).await.map_err(HttpError::Io)?;
        if n == 0 {
            return Err(HttpError::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "range source ended before requested length",
            )));
        }
        sink_write(dest, &buf[..n]).await?;
        remaining -= n as u64;
    }
    Ok(())
}

/// One serializer per body shape. `select` is a total match over the tagged
/// union; shape/framing combinations that cannot be serialized are rejected
/// as InvalidBody.
pub enum BodyWriter {
    /// Empty or finite buffer: headers + body in one send.
    Inline(Bytes),
    /// Opaque readable source, framed per the codec's decision.
    Stream(BodyStream),
    /// Seek to offset, copy exactly length bytes.
    ByteRange(ByteRangeBody),
    /// Per-range multipart delimiters, then the closing delimiter.
    MultiPartByteRange(MultiPartBody),
    /// Chunk sequence with chunked framing (HTTP/1.1).
    ChunkedChunks(mpsc::Receiver<Bytes>),
    /// Chunk sequence written raw; close-delimited (HTTP/1.0).
    RawChunks(mpsc::Receiver<Bytes>),
}

impl BodyWriter {
    pub fn select(
        body: Body,
        framing: Framing,
        version: HttpVersion,
    ) -> Result<BodyWriter, HttpError> {
        match body {
            Body::Empty => Ok(BodyWriter::Inline(Bytes::new())),
            Body::Buffer(buffer) => Ok(BodyWriter::Inline(buffer)),
            Body::Stream(_) if matches!(framing, Framing::Length(_)) => Err(
                HttpError::InvalidBody("stream body with precomputed content-length"),
            ),
            Body::Stream(stream) => Ok(BodyWriter::Stream(stream)),
            Body::ByteRange(range) if range.length == 0 => {
                Err(HttpError::InvalidBody("byte range with zero length"))
            }
            Body::ByteRange(range) => Ok(BodyWriter::ByteRange(range)),
            Body::MultiPartByteRange(multi) if multi.ranges.is_empty() => {
                Err(HttpError::InvalidBody("multipart body without ranges"))
            }
            Body::MultiPartByteRange(multi) => Ok(BodyWriter::MultiPartByteRange(multi)),
            Body::Chunks(rx) if version.supports_chunked() => Ok(BodyWriter::ChunkedChunks(rx)),
            Body::Chunks(rx) => Ok(BodyWriter::RawChunks(rx)),
        }
    }

    /// Serialize headers + body to the sink. Consumes the writer; a failed
    /// write stops the body source immediately.
    pub async fn write<W: AsyncWrite + Unpin>(
        self,
        headers: Bytes,
        framing: Framing,
        dest: &mut W,
    ) -> Result<(), HttpError> {
        match self {
            BodyWriter::Inline(body) => {
                let mut buf = BytesMut::with_capacity(headers.len() + body.len());
                buf.extend_from_slice(&headers);
                buf.extend_from_slice(&body);
                sink_write(dest, &buf).await
            }
            BodyWriter::Stream(mut stream) => {
                sink_write(dest, &headers).await?;
                let mut buf = vec![0u8; COPY_BUF];
                loop {
                    let n = stream.source.read(&mut buf).await.map_err(HttpError::Io)?;
                    if n == 0 {
                        break;
                    }
                    if framing == Framing::Chunked {
                        let mut framed = BytesMut::with_capacity(n + 16);
                        chunk_frame(&buf[..n], &mut framed);
                        sink_write(dest, &framed).await?;
                    } else {
                        sink_write(dest, &buf[..n]).await?;
                    }
                }
                if framing == Framing::Chunked {
                    sink_write(dest, b"0\r\n\r\n").await?;
                }
                Ok(())
            }
            BodyWriter::ByteRange(mut range) => {
                sink_write(dest, &headers).await?;
                range
                    .source
                    .seek(SeekFrom::Start(range.offset))
                    .await
                    .map_err(HttpError::Io)?;
                copy_exact(&mut *range.source, dest, range.length).await
            }
            BodyWriter::MultiPartByteRange(mut multi) => {
                sink_write(dest, &headers).await?;
                let ranges = multi.ranges.clone();
                for (offset, length) in ranges {
                    let part = multi.part_header(offset, length);
                    sink_write(dest, part.as_bytes()).await?;
                    multi
                        .source
                        .seek(SeekFrom::Start(offset))
                        .await
                        .map_err(HttpError::Io)?;
                    copy_exact(&mut *multi.source, dest, length).await?;
                    sink_write(dest, b"\r\n").await?;
                }
                sink_write(dest, multi.closing_delimiter().as_bytes()).await
            }
            BodyWriter::ChunkedChunks(mut rx) => {
                sink_write(dest, &headers).await?;
                while let Some(chunk) = rx.recv().await {
                    // An empty chunk would be read as the terminator.
                    if chunk.is_empty() {
                        continue;
                    }
                    let mut framed = BytesMut::with_capacity(chunk.len() + 16);
                    chunk_frame(&chunk, &mut framed);
                    sink_write(dest, &framed).await?;
                }
                sink_write(dest, b"0\r\n\r\n").await
            }
            BodyWriter::RawChunks(mut rx) => {
                sink_write(dest, &headers).await?;
                while let Some(chunk) = rx.recv().await {
                    if !chunk.is_empty() {
                        sink_write(dest, &chunk).await?;
                    }
                }
                Ok(())
            }
        }
    }
}

/// Outcome of one response's write loop.
#[derive(Debug, Clone, Copy)]
pub struct WriteSummary {
    /// The header block was (at least partially) handed to the sink; a
    /// substitute response is no longer possible.
    pub headers_written: bool,
    /// The body reached its terminator. False means the response side was
    /// dropped before completion.
    pub completed: bool,
    /// The response asked for the connection to close afterwards.
    pub close: bool,
}

/// Drive one response: consume frames from the codec tail and write them to
/// the sink. The header block is held back and coalesced with the first body
/// bytes. Returns when the response terminates or its channel closes; the
/// receiver is consumed so a failed writer unblocks the response side.
pub async fn write_response<W: AsyncWrite + Unpin>(
    mut rx: mpsc::Receiver<WireFrame>,
    dest: &mut W,
    version: HttpVersion,
) -> Result<WriteSummary, HttpError> {
    let mut pending: Option<Bytes> = None;
    let mut framing = Framing::None;
    let mut close = false;
    let mut headers_written = false;

    while let Some(frame) = rx.recv().await {
        match frame {
            WireFrame::Headers {
                block,
                framing: f,
                close: c,
            } => {
                pending = Some(block);
                framing = f;
                close = c;
            }
            WireFrame::Chunk(chunk) => {
                if framing == Framing::Chunked && chunk.is_empty() {
                    continue;
                }
                let mut buf = BytesMut::with_capacity(chunk.len() + 64);
                if let Some(block) = pending.take() {
                    buf.extend_from_slice(&block);
                    headers_written = true;
                }
                if framing == Framing::Chunked {
                    chunk_frame(&chunk, &mut buf);
                } else {
                    buf.extend_from_slice(&chunk);
                }
                sink_write(dest, &buf).await?;
            }
            WireFrame::Flush(ack) => {
                if let Some(block) = pending.take() {
                    headers_written = true;
                    sink_write(dest, &block).await?;
                }
                dest.flush().await.map_err(HttpError::from)?;
                let _ = ack.send(());
            }
            WireFrame::End => {
                let mut buf = BytesMut::new();
                if let Some(block) = pending.take() {
                    buf.extend_from_slice(&block);
                    headers_written = true;
                }
                if framing == Framing::Chunked {
                    buf.extend_from_slice(b"0\r\n\r\n");
                }
                if !buf.is_empty() {
                    sink_write(dest, &buf).await?;
                }
                dest.flush().await.map_err(HttpError::from)?;
                return Ok(WriteSummary {
                    headers_written,
                    completed: true,
                    close,
                });
            }
            WireFrame::Payload(body) => {
                let block = pending.take().unwrap_or_default();
                headers_written = true;
                let writer = BodyWriter::select(body, framing, version)?;
                writer.write(block, framing, dest).await?;
                dest.flush().await.map_err(HttpError::from)?;
                return Ok(WriteSummary {
                    headers_written,
                    completed: true,
                    close,
                });
            }
        }
    }
    Ok(WriteSummary {
        headers_written,
        completed: false,
        close,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const HEAD: &[u8] = b"HTTP/1.1 200 OK\r\n\r\n";

    async fn drive(frames: Vec<WireFrame>) -> (Vec<u8>, WriteSummary) {
        let (tx, rx) = mpsc::channel(frames.len().max(1));
        for frame in frames {
            tx.send(frame).await.unwrap();
        }
        drop(tx);
        let mut dest = Cursor::new(Vec::new());
        let summary = write_response(rx, &mut dest, HttpVersion::Http1_1)
            .await
            .unwrap();
        (dest.into_inner(), summary)
    }

    fn headers_frame(framing: Framing) -> WireFrame {
        WireFrame::Headers {
            block: Bytes::from_static(HEAD),
            framing,
            close: false,
        }
    }

    #[tokio::test]
    async fn inline_body_is_one_send() {
        let (wire, summary) = drive(vec![
            headers_frame(Framing::Length(2)),
            WireFrame::Chunk(Bytes::from_static(b"hi")),
            WireFrame::End,
        ])
        .await;
        assert_eq!(wire, [HEAD, b"hi".as_slice()].concat());
        assert!(summary.completed);
        assert!(summary.headers_written);
    }

    #[tokio::test]
    async fn chunked_stream_encodes_frames_and_terminator() {
        let (wire, _) = drive(vec![
            headers_frame(Framing::Chunked),
            WireFrame::Chunk(Bytes::from_static(b"ab")),
            WireFrame::Chunk(Bytes::from_static(b"cd")),
            WireFrame::End,
        ])
        .await;
        let body = &wire[HEAD.len()..];
        assert_eq!(body, b"2\r\nab\r\n2\r\ncd\r\n0\r\n\r\n");
    }

    #[tokio::test]
    async fn empty_chunk_is_elided_not_a_terminator() {
        let (wire, _) = drive(vec![
            headers_frame(Framing::Chunked),
            WireFrame::Chunk(Bytes::from_static(b"ab")),
            WireFrame::Chunk(Bytes::new()),
            WireFrame::Chunk(Bytes::from_static(b"cd")),
            WireFrame::End,
        ])
        .await;
        let body = &wire[HEAD.len()..];
        assert_eq!(body, b"2\r\nab\r\n2\r\ncd\r\n0\r\n\r\n");
    }

    #[tokio::test]
    async fn dropped_channel_without_end_reports_incomplete() {
        let (_, summary) = drive(vec![headers_frame(Framing::Length(10))]).await;
        assert!(!summary.completed);
        // Headers were never followed by body bytes, so they were held back.
        assert!(!summary.headers_written);
    }

    #[tokio::test]
    async fn byte_range_writes_exactly_the_window() {
        let source: Vec<u8> = (0..=255u8).cycle().take(512).collect();
        let body = Body::byte_range(Cursor::new(source.clone()), 100, 50);
        let (wire, _) = drive(vec![
            headers_frame(Framing::Length(50)),
            WireFrame::Payload(body),
        ])
        .await;
        assert_eq!(&wire[HEAD.len()..], &source[100..150]);
    }

    #[tokio::test]
    async fn multipart_ranges_have_delimiters_and_closing() {
        let source: Vec<u8> = (b'a'..=b'z').cycle().take(100).collect();
        let body = Body::multipart_byte_range(
            Cursor::new(source.clone()),
            vec![(0, 10), (50, 5)],
            "text/plain",
            100,
        );
        let boundary = match &body {
            Body::MultiPartByteRange(m) => m.boundary.clone(),
            _ => unreachable!(),
        };
        let (wire, _) = drive(vec![
            headers_frame(Framing::Length(0)),
            WireFrame::Payload(body),
        ])
        .await;
        let text = &wire[HEAD.len()..];
        let expected = [
            format!(
                "--{b}\r\nContent-Type: text/plain\r\nContent-Range: bytes 0-9/100\r\n\r\n",
                b = boundary
            )
            .into_bytes(),
            source[0..10].to_vec(),
            b"\r\n".to_vec(),
            format!(
                "--{b}\r\nContent-Type: text/plain\r\nContent-Range: bytes 50-54/100\r\n\r\n",
                b = boundary
            )
            .into_bytes(),
            source[50..55].to_vec(),
            b"\r\n".to_vec(),
            format!("--{b}--\r\n", b = boundary).into_bytes(),
        ]
        .concat();
        assert_eq!(text, expected);
    }

    #[tokio::test]
    async fn chunk_sequence_is_chunked_on_http11() {
        let (chunk_tx, body) = Body::chunks(4);
        chunk_tx.send(Bytes::from_static(b"ab")).await.unwrap();
        chunk_tx.send(Bytes::new()).await.unwrap();
        chunk_tx.send(Bytes::from_static(b"cde")).await.unwrap();
        drop(chunk_tx);
        let (wire, _) = drive(vec![
            headers_frame(Framing::Chunked),
            WireFrame::Payload(body),
        ])
        .await;
        assert_eq!(&wire[HEAD.len()..], b"2\r\nab\r\n3\r\ncde\r\n0\r\n\r\n");
    }

    #[tokio::test]
    async fn chunk_sequence_is_raw_on_http10() {
        let (chunk_tx, body) = Body::chunks(4);
        chunk_tx.send(Bytes::from_static(b"ab")).await.unwrap();
        chunk_tx.send(Bytes::from_static(b"cd")).await.unwrap();
        drop(chunk_tx);
        let (tx, rx) = mpsc::channel(4);
        tx.send(WireFrame::Headers {
            block: Bytes::from_static(HEAD),
            framing: Framing::Close,
            close: true,
        })
        .await
        .unwrap();
        tx.send(WireFrame::Payload(body)).await.unwrap();
        drop(tx);
        let mut dest = Cursor::new(Vec::new());
        let summary = write_response(rx, &mut dest, HttpVersion::Http1_0)
            .await
            .unwrap();
        assert!(summary.close);
        assert_eq!(&dest.into_inner()[HEAD.len()..], b"abcd");
    }

    #[tokio::test]
    async fn stream_body_follows_stamped_framing() {
        let body = Body::stream(Cursor::new(b"hello world".to_vec()));
        let (wire, _) = drive(vec![
            headers_frame(Framing::Chunked),
            WireFrame::Payload(body),
        ])
        .await;
        assert_eq!(&wire[HEAD.len()..], b"b\r\nhello world\r\n0\r\n\r\n");

        let body = Body::stream(Cursor::new(b"hello world".to_vec()));
        let (tx, rx) = mpsc::channel(4);
        tx.send(WireFrame::Headers {
            block: Bytes::from_static(HEAD),
            framing: Framing::Close,
            close: true,
        })
        .await
        .unwrap();
        tx.send(WireFrame::Payload(body)).await.unwrap();
        drop(tx);
        let mut dest = Cursor::new(Vec::new());
        write_response(rx, &mut dest, HttpVersion::Http1_0)
            .await
            .unwrap();
        assert_eq!(&dest.into_inner()[HEAD.len()..], b"hello world");
    }

    #[tokio::test]
    async fn invalid_shapes_are_rejected() {
        let body = Body::stream(Cursor::new(Vec::new()));
        assert!(matches!(
            BodyWriter::select(body, Framing::Length(5), HttpVersion::Http1_1),
            Err(HttpError::InvalidBody(_))
        ));
        let body = Body::byte_range(Cursor::new(Vec::new()), 0, 0);
        assert!(matches!(
            BodyWriter::select(body, Framing::Length(0), HttpVersion::Http1_1),
            Err(HttpError::InvalidBody(_))
        ));
        let body = Body::multipart_byte_range(Cursor::new(Vec::new()), vec![], "text/plain", 0);
        assert!(matches!(
            BodyWriter::select(body, Framing::Length(0), HttpVersion::Http1_1),
            Err(HttpError::InvalidBody(_))
        ));
    }
}
