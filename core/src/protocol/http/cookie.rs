/*
 * cookie.rs
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

//! Response cookies. Each cookie becomes one `set-cookie` header at freeze time:
//! `name=value` followed by its flags in insertion order. Bare flags render as
//! `; value`, keyed flags as `; key=value`. Values are emitted as given; no
//! quoting or escaping is applied.

use super::headers::HeaderMap;

/// One cookie attribute: `Secure` is bare, `path=/` is keyed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CookieFlag {
    Bare(String),
    Keyed(String, String),
}

impl CookieFlag {
    pub fn bare(value: impl Into<String>) -> Self {
        CookieFlag::Bare(value.into())
    }

    pub fn keyed(key: impl Into<String>, value: impl Into<String>) -> Self {
        CookieFlag::Keyed(key.into(), value.into())
    }
}

#[derive(Debug, Clone)]
struct Cookie {
    value: String,
    flags: Vec<CookieFlag>,
}

/// Cookie table: name to (value, flags). Setting an existing name replaces it
/// in place; new names append.
#[derive(Debug, Clone, Default)]
pub struct CookieJar {
    entries: Vec<(String, Cookie)>,
}

impl CookieJar {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>, flags: Vec<CookieFlag>) {
        let name = name.into();
        let cookie = Cookie { value: value.into(), flags };
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some((_, c)) => *c = cookie,
            None => self.entries.push((name, cookie)),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn render_one(name: &str, cookie: &Cookie) -> String {
        let mut out = format!("{}={}", name, cookie.value);
        for flag in &cookie.flags {
            match flag {
                CookieFlag::Bare(v) => {
                    out.push_str("; ");
                    out.push_str(v);
                }
                CookieFlag::Keyed(k, v) => {
                    out.push_str("; ");
                    out.push_str(k);
                    out.push('=');
                    out.push_str(v);
                }
            }
        }
        out
    }

    /// Emit one `set-cookie` header per cookie into `headers`.
    pub fn render_into(&self, headers: &mut HeaderMap) {
        for (name, cookie) in &self.entries {
            headers.add("set-cookie", Self::render_one(name, cookie));
        }
    }
}
