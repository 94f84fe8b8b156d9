/*
 * connection.rs
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

//! Per-connection driver: one TCP or TLS stream, a reader feeding the request
//! push parser, and a responder serializing responses in parse order.
//!
//! Parsing may run ahead of responding; the pipeline queue is bounded and a
//! full queue suspends the parser until responses drain. At most one response
//! is written at a time; its handler and its frame writer run concurrently so
//! pushes suspend on the writer's progress, not on buffering.

use std::collections::VecDeque;
use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadBuf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_rustls::server::TlsStream;
use tracing::{debug, warn};

use crate::error::HttpError;
use crate::protocol::http::codec::filters::{default_reason, http_date};
use crate::protocol::http::codec::{Codec, FilterContext};
use crate::protocol::http::h1::{H1RequestHandler, ParseState, RequestParser};
use crate::protocol::http::handler::Application;
use crate::protocol::http::headers::HeaderMap;
use crate::protocol::http::request::{HttpVersion, Method, Request, RequestBody};
use crate::protocol::http::response::{Response, ENDED};
use crate::protocol::http::writer::write_response;

/// Unified stream: plain TCP or server-side TLS.
pub enum ServerStream {
    Plain(TcpStream),
    Tls(TlsStream<TcpStream>),
}

impl AsyncRead for ServerStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match &mut *self {
            ServerStream::Plain(s) => Pin::new(s).poll_read(cx, buf),
            ServerStream::Tls(s) => Pin::new(s).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for ServerStream {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match &mut *self {
            ServerStream::Plain(s) => Pin::new(s).poll_write(cx, buf),
            ServerStream::Tls(s) => Pin::new(s).poll_write(cx, buf),
        }
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match &mut *self {
            ServerStream::Plain(s) => Pin::new(s).poll_flush(cx),
            ServerStream::Tls(s) => Pin::new(s).poll_flush(cx),
        }
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match &mut *self {
            ServerStream::Plain(s) => Pin::new(s).poll_shutdown(cx),
            ServerStream::Tls(s) => Pin::new(s).poll_shutdown(cx),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Parsed-but-unanswered requests allowed before the parser is suspended.
    pub max_pipelined_requests: usize,
    /// Frames buffered between a response and its writer.
    pub frame_queue_depth: usize,
    /// Request body chunks buffered before the parser is suspended.
    pub body_queue_depth: usize,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            max_pipelined_requests: 8,
            frame_queue_depth: 8,
            body_queue_depth: 8,
        }
    }
}

/// Shared in-flight request counter, usable for external flow control while
/// the connection runs.
#[derive(Clone, Default)]
pub struct PendingRequests(Arc<AtomicUsize>);

impl PendingRequests {
    pub fn get(&self) -> usize {
        self.0.load(Ordering::Relaxed)
    }

    fn increment(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    fn decrement(&self) {
        self.0.fetch_sub(1, Ordering::Relaxed);
    }
}

/// Reader-to-responder messages.
enum IngressMessage {
    Request(Request),
    /// Parse failure: answer 400 and close.
    Invalid(String),
}

/// Events gathered by the parser callbacks, forwarded (with suspension)
/// after each receive() pass.
enum IngressEvent {
    Request {
        request: Request,
        body_tx: Option<mpsc::Sender<Bytes>>,
    },
    BodyChunk(Bytes),
    BodyEnd,
}

/// Bridges parser callbacks to request assembly. The parser is synchronous;
/// events queue here and the read loop forwards them at its suspension
/// points.
#[derive(Default)]
struct Assembler {
    method: Option<Method>,
    target: String,
    version: Option<HttpVersion>,
    headers: HeaderMap,
    events: VecDeque<IngressEvent>,
}

impl Assembler {
    fn take_request_parts(&mut self) -> (Method, String, HttpVersion, HeaderMap) {
        (
            self.method.take().unwrap_or(Method::Get),
            std::mem::take(&mut self.target),
            self.version.take().unwrap_or(HttpVersion::Http1_1),
            std::mem::take(&mut self.headers),
        )
    }
}

impl H1RequestHandler for Assembler {
    fn request_line(&mut self, method: &str, target: &str, version: HttpVersion) {
        self.method = Some(Method::from_token(method));
        self.target = target.to_string();
        self.version = Some(version);
        self.headers = HeaderMap::new();
    }

    fn header(&mut self, name: &str, value: &str) {
        self.headers.add(name, value);
    }

    fn headers_complete(&mut self) {
        // The read loop assembles the Request; it needs the parser state.
    }

    fn body_chunk(&mut self, data: &[u8]) {
        self.events
            .push_back(IngressEvent::BodyChunk(Bytes::copy_from_slice(data)));
    }

    fn trailer(&mut self, name: &str, _value: &str) {
        debug!(name, "discarding request trailer");
    }

    fn complete(&mut self) {
        self.events.push_back(IngressEvent::BodyEnd);
    }
}

/// Minimal bodyless response used for parse failures and handler failures
/// before any response bytes went out.
async fn write_simple<W: AsyncWrite + Unpin>(
    wr: &mut W,
    version: HttpVersion,
    status: u16,
    close: bool,
) -> Result<(), HttpError> {
    let mut head = format!(
        "{} {} {}\r\ndate: {}\r\ncontent-length: 0\r\n",
        version.as_str(),
        status,
        default_reason(status),
        http_date(),
    );
    if close {
        head.push_str("connection: close\r\n");
    }
    head.push_str("\r\n");
    wr.write_all(head.as_bytes()).await.map_err(HttpError::from)?;
    wr.flush().await.map_err(HttpError::from)
}

/// One client connection bound to an application.
pub struct Connection<S> {
    stream: S,
    app: Arc<dyn Application>,
    config: ConnectionConfig,
    pending: PendingRequests,
}

impl<S: AsyncRead + AsyncWrite> Connection<S> {
    pub fn new(stream: S, app: Arc<dyn Application>) -> Self {
        Self::with_config(stream, app, ConnectionConfig::default())
    }

    pub fn with_config(stream: S, app: Arc<dyn Application>, config: ConnectionConfig) -> Self {
        Self {
            stream,
            app,
            config,
            pending: PendingRequests::default(),
        }
    }

    /// Counter handle that stays valid while `run` is in flight.
    pub fn pending_requests(&self) -> PendingRequests {
        self.pending.clone()
    }

    /// In-flight parsed-but-not-yet-responded requests.
    pub fn pending_request_count(&self) -> usize {
        self.pending.get()
    }

    /// Serve the connection until close, client EOF, or a fatal error.
    pub async fn run(self) -> Result<(), HttpError> {
        let (rd, wr) = tokio::io::split(self.stream);
        let (msg_tx, msg_rx) = mpsc::channel(self.config.max_pipelined_requests);
        let reader = read_loop(rd, msg_tx, self.pending.clone(), self.config.body_queue_depth);
        let responder = respond_loop(
            wr,
            msg_rx,
            self.app,
            self.pending.clone(),
            self.config.frame_queue_depth,
        );
        tokio::pin!(reader);
        tokio::pin!(responder);
        tokio::select! {
            read_result = &mut reader => {
                // Input is done (EOF or read error): drain queued responses,
                // then surface whichever side failed.
                let respond_result = (&mut responder).await;
                respond_result?;
                read_result
            }
            respond_result = &mut responder => {
                // Responder decided to close (keep-alive off or failure);
                // the reader is cancelled with it.
                respond_result
            }
        }
    }
}

async fn read_loop<R: AsyncRead + Unpin>(
    mut rd: R,
    msg_tx: mpsc::Sender<IngressMessage>,
    pending: PendingRequests,
    body_depth: usize,
) -> Result<(), HttpError> {
    let mut parser = RequestParser::new();
    let mut assembler = Assembler::default();
    let mut read_buf = BytesMut::with_capacity(8192);
    let mut body_tx: Option<mpsc::Sender<Bytes>> = None;
    let mut tmp = [0u8; 8192];

    loop {
        let n = rd.read(&mut tmp).await.map_err(HttpError::from)?;
        if n == 0 {
            return Ok(());
        }
        read_buf.extend_from_slice(&tmp[..n]);

        loop {
            if let Err(e) = parser.receive(&mut read_buf, &mut assembler) {
                forward(&mut assembler, &mut body_tx, &msg_tx, &pending).await?;
                let _ = msg_tx.send(IngressMessage::Invalid(e.to_string())).await;
                return Ok(());
            }
            if parser.state() == ParseState::HeadersComplete {
                let (method, target, version, headers) = assembler.take_request_parts();
                let content_length = headers
                    .get("content-length")
                    .and_then(|v| v.trim().parse::<u64>().ok());
                let chunked = headers.has_token("transfer-encoding", "chunked");
                let has_body = chunked || content_length.map(|cl| cl > 0).unwrap_or(false);
                let (tx, body) = if has_body {
                    let (tx, rx) = mpsc::channel(body_depth);
                    (Some(tx), Some(RequestBody::new(rx)))
                } else {
                    (None, None)
                };
                assembler.events.push_back(IngressEvent::Request {
                    request: Request {
                        method,
                        target,
                        version,
                        headers,
                        body,
                    },
                    body_tx: tx,
                });
                parser.set_body_mode(content_length, chunked);
                continue; // keep parsing the remaining buffer
            }
            break;
        }
        forward(&mut assembler, &mut body_tx, &msg_tx, &pending).await?;
    }
}

/// Push gathered events into the bounded channels. These sends are the
/// parser's backpressure suspension points.
async fn forward(
    assembler: &mut Assembler,
    body_tx: &mut Option<mpsc::Sender<Bytes>>,
    msg_tx: &mpsc::Sender<IngressMessage>,
    pending: &PendingRequests,
) -> Result<(), HttpError> {
    while let Some(event) = assembler.events.pop_front() {
        match event {
            IngressEvent::Request { request, body_tx: tx } => {
                *body_tx = tx;
                pending.increment();
                if msg_tx.send(IngressMessage::Request(request)).await.is_err() {
                    return Err(HttpError::ClientGone);
                }
            }
            IngressEvent::BodyChunk(chunk) => {
                let dropped = match body_tx.as_ref() {
                    Some(tx) => tx.send(chunk).await.is_err(),
                    None => false,
                };
                if dropped {
                    // The application dropped the body; discard the rest.
                    *body_tx = None;
                }
            }
            IngressEvent::BodyEnd => {
                *body_tx = None;
            }
        }
    }
    Ok(())
}

async fn respond_loop<W: AsyncWrite + Unpin>(
    mut wr: W,
    mut msg_rx: mpsc::Receiver<IngressMessage>,
    app: Arc<dyn Application>,
    pending: PendingRequests,
    frame_depth: usize,
) -> Result<(), HttpError> {
    while let Some(msg) = msg_rx.recv().await {
        let request = match msg {
            IngressMessage::Invalid(reason) => {
                warn!(%reason, "unparseable request; answering 400");
                write_simple(&mut wr, HttpVersion::Http1_1, 400, true).await?;
                return Ok(());
            }
            IngressMessage::Request(request) => request,
        };

        let version = request.version;
        let request_close = request.headers.has_token("connection", "close")
            || (version == HttpVersion::Http1_0
                && !request.headers.has_token("connection", "keep-alive"));
        let ctx = FilterContext::for_request(&request);
        let (frame_tx, frame_rx) = mpsc::channel(frame_depth);
        let codec = Codec::standard(ctx, frame_tx);

        let handler_app = app.clone();
        let handler = async move {
            let mut response = Response::new(codec);
            match handler_app.respond(request, &mut response).await {
                Ok(()) => {
                    if response.state() & ENDED == 0 {
                        response.end(None).await
                    } else {
                        Ok(())
                    }
                }
                Err(e) => Err(e),
            }
            // response drops here, closing the frame channel
        };
        let writer = write_response(frame_rx, &mut wr, version);

        let (handler_result, writer_result) = tokio::join!(handler, writer);
        pending.decrement();

        let summary = writer_result?;

        match handler_result {
            Ok(()) => {
                if !summary.completed {
                    // The response side vanished without a terminator.
                    return Ok(());
                }
            }
            Err(e) => {
                if e.is_client_gone() {
                    return Err(e);
                }
                warn!(error = %e, "handler failed");
                if summary.headers_written {
                    // Mid-response failure: nothing valid can follow.
                    return Ok(());
                }
                write_simple(&mut wr, version, 500, request_close).await?;
                if request_close {
                    return Ok(());
                }
                continue;
            }
        }

        if request_close || summary.close {
            return Ok(());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::http::handler::BoxFuture;

    struct Echo;

    impl Application for Echo {
        fn respond<'a>(
            &'a self,
            mut request: Request,
            response: &'a mut Response,
        ) -> BoxFuture<'a, Result<(), HttpError>> {
            Box::pin(async move {
                let body = match request.take_body() {
                    Some(mut body) => body.read_to_end(1 << 20).await.map_err(HttpError::Io)?,
                    None => Bytes::from_static(b"(empty)"),
                };
                response.set_header("content-type", "text/plain")?;
                response.send(body).await
            })
        }
    }

    async fn talk(input: &[u8]) -> Vec<u8> {
        let (client, server) = tokio::io::duplex(16 * 1024);
        let connection = Connection::new(server, Arc::new(Echo));
        let serving = tokio::spawn(connection.run());

        let (mut client_rd, mut client_wr) = tokio::io::split(client);
        client_wr.write_all(input).await.unwrap();
        client_wr.shutdown().await.unwrap();
        drop(client_wr);
        let mut out = Vec::new();
        client_rd.read_to_end(&mut out).await.unwrap();
        let _ = serving.await.unwrap();
        out
    }

    #[tokio::test]
    async fn get_gets_an_identity_response() {
        let out = talk(b"GET / HTTP/1.1\r\nhost: a\r\n\r\n").await;
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(text.contains("content-length: 7\r\n"));
        assert!(text.ends_with("(empty)"));
    }

    #[tokio::test]
    async fn post_body_is_echoed() {
        let out = talk(b"POST /u HTTP/1.1\r\ncontent-length: 5\r\n\r\nhello").await;
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("content-length: 5\r\n"));
        assert!(text.ends_with("hello"));
    }

    #[tokio::test]
    async fn pipelined_requests_are_answered_in_order() {
        let out = talk(
            b"POST /a HTTP/1.1\r\ncontent-length: 3\r\n\r\nonePOST /b HTTP/1.1\r\ncontent-length: 3\r\n\r\ntwo",
        )
        .await;
        let text = String::from_utf8(out).unwrap();
        let first = text.find("one").unwrap();
        let second = text.find("two").unwrap();
        assert!(first < second);
        assert_eq!(text.matches("HTTP/1.1 200 OK").count(), 2);
    }

    #[tokio::test]
    async fn bad_request_line_yields_400() {
        let out = talk(b"GARBAGE\r\n\r\n").await;
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("HTTP/1.1 400 Bad Request\r\n"));
        assert!(text.contains("connection: close\r\n"));
    }

    #[tokio::test]
    async fn handler_error_before_start_becomes_500() {
        struct Failing;
        impl Application for Failing {
            fn respond<'a>(
                &'a self,
                _request: Request,
                _response: &'a mut Response,
            ) -> BoxFuture<'a, Result<(), HttpError>> {
                Box::pin(async { Err(HttpError::Filter("broken stage".to_string())) })
            }
        }
        let (client, server) = tokio::io::duplex(16 * 1024);
        let connection = Connection::new(server, Arc::new(Failing));
        let serving = tokio::spawn(connection.run());
        let (mut client_rd, mut client_wr) = tokio::io::split(client);
        client_wr
            .write_all(b"GET / HTTP/1.1\r\nhost: a\r\n\r\n")
            .await
            .unwrap();
        client_wr.shutdown().await.unwrap();
        let mut out = Vec::new();
        client_rd.read_to_end(&mut out).await.unwrap();
        let _ = serving.await.unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("HTTP/1.1 500 Internal Server Error\r\n"));
    }

    #[tokio::test]
    async fn http10_closes_by_default() {
        let (client, server) = tokio::io::duplex(16 * 1024);
        let connection = Connection::new(server, Arc::new(Echo));
        let serving = tokio::spawn(connection.run());
        let (mut client_rd, mut client_wr) = tokio::io::split(client);
        client_wr
            .write_all(b"GET / HTTP/1.0\r\n\r\n")
            .await
            .unwrap();
        // No shutdown: the server must close on its own after the response.
        let mut out = Vec::new();
        client_rd.read_to_end(&mut out).await.unwrap();
        let _ = serving.await.unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("HTTP/1.0 200 OK\r\n"));
    }
}
