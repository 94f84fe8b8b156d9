/*
 * lib.rs
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

//! Vassoio core: an asynchronous HTTP/1.x origin server.
//!
//! The per-connection pipeline is: push parser → driver → application
//! handler → response (lifecycle state machine) → codec filter chain →
//! body writers. Hosts map `(address, port, SNI name)` to an application
//! and an optional TLS context.

pub mod error;
pub mod host;
pub mod protocol;
pub mod server;
pub mod tls;

pub use error::{ConfigError, HttpError};
pub use host::{Host, HostRegistry};
pub use protocol::http::{Application, Body, Connection, Request, Response};
pub use server::Server;
