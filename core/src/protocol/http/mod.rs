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

//! HTTP/1.x origin service.
//!
//! Design:
//! - Ingress: push request parser (`h1`), driven by the connection's read
//!   loop; parsed requests queue behind a bounded pipeline limit.
//! - Egress: Response lifecycle → codec filter chain → frame writer; shaped
//!   bodies (ranges, streams, chunk sequences) dispatch through the writer
//!   factory.
//! - Buffers: `bytes` crate (BytesMut for parse/serialize buffers, Bytes for
//!   payload slices).

pub mod body;
pub mod codec;
pub mod connection;
pub mod cookie;
pub mod h1;
pub mod handler;
pub mod headers;
pub mod request;
pub mod response;
pub mod writer;

pub use body::Body;
pub use connection::{Connection, ConnectionConfig, PendingRequests, ServerStream};
pub use cookie::CookieFlag;
pub use handler::{Application, BoxFuture};
pub use headers::HeaderMap;
pub use request::{HttpVersion, Method, Request, RequestBody};
pub use response::Response;
pub use writer::BodyWriter;
