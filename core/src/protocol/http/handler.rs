/*
 * handler.rs
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

//! Application handler contract. The driver creates a Response per parsed
//! request and hands both to the handler; the handler mutates the response
//! (setters, then stream/send/end) and every push may suspend on codec
//! backpressure.
//!
//! A handler that returns Ok without ending the response gets an implicit
//! `end(None)`. A handler error is recoverable (synthetic 500) only while
//! the header block has not reached the writer.

use std::future::Future;
use std::pin::Pin;

use crate::error::HttpError;
use crate::protocol::http::request::Request;
use crate::protocol::http::response::Response;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Per-host application entry point.
pub trait Application: Send + Sync {
    /// Respond to one request. The request is owned (its body handle can be
    /// moved out); the response is shared with the driver, which enforces
    /// completion after this returns.
    fn respond<'a>(
        &'a self,
        request: Request,
        response: &'a mut Response,
    ) -> BoxFuture<'a, Result<(), HttpError>>;
}
