/*
 * headers.rs
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

//! Ordered header multimap: lowercased field names, values in insertion order.
//! Pseudo-headers (leading `:`) are ordinary entries used for in-pipeline
//! metadata and are stripped before wire serialization.

use bytes::{BufMut, BytesMut};

/// Pseudo-header carrying the response status code.
pub const STATUS: &str = ":status";
/// Pseudo-header carrying the optional reason phrase.
pub const REASON: &str = ":reason";
/// Pseudo-header carrying the entity length sentinel consumed by the framing filter.
pub const ENTITY_LENGTH: &str = ":entity-length";

/// Entity length sentinel: `"@"` no body, `"*"` streaming/unknown, decimal known length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityLength {
    None,
    Streaming,
    Exact(u64),
}

impl EntityLength {
    pub fn as_header_value(&self) -> String {
        match self {
            EntityLength::None => "@".to_string(),
            EntityLength::Streaming => "*".to_string(),
            EntityLength::Exact(n) => n.to_string(),
        }
    }

    pub fn parse(value: &str) -> Option<EntityLength> {
        match value {
            "@" => Some(EntityLength::None),
            "*" => Some(EntityLength::Streaming),
            n => n.parse::<u64>().ok().map(EntityLength::Exact),
        }
    }
}

/// Header multimap. Field names are lowercased on insertion; field order and
/// per-field value order follow insertion order for stable output.
#[derive(Debug, Clone, Default)]
pub struct HeaderMap {
    entries: Vec<(String, Vec<String>)>,
}

impl HeaderMap {
    pub fn new() -> Self {
        Self::default()
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.entries.iter().position(|(k, _)| k == name)
    }

    /// First value for the (case-insensitive) field, if any.
    pub fn get(&self, name: &str) -> Option<&str> {
        let name = name.to_ascii_lowercase();
        self.position(&name)
            .and_then(|i| self.entries[i].1.first())
            .map(|s| s.as_str())
    }

    /// All values for the field, in insertion order.
    pub fn get_all(&self, name: &str) -> &[String] {
        let name = name.to_ascii_lowercase();
        match self.position(&name) {
            Some(i) => &self.entries[i].1,
            None => &[],
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        let name = name.to_ascii_lowercase();
        self.position(&name).is_some()
    }

    /// Append a value to the field's list.
    pub fn add(&mut self, name: &str, value: impl Into<String>) {
        let name = name.to_ascii_lowercase();
        match self.position(&name) {
            Some(i) => self.entries[i].1.push(value.into()),
            None => self.entries.push((name, vec![value.into()])),
        }
    }

    /// Replace the field's list with a single value.
    pub fn set(&mut self, name: &str, value: impl Into<String>) {
        let name = name.to_ascii_lowercase();
        match self.position(&name) {
            Some(i) => self.entries[i].1 = vec![value.into()],
            None => self.entries.push((name, vec![value.into()])),
        }
    }

    /// Remove the field entirely; returns its values if it was present.
    pub fn remove(&mut self, name: &str) -> Option<Vec<String>> {
        let name = name.to_ascii_lowercase();
        self.position(&name).map(|i| self.entries.remove(i).1)
    }

    /// One item per (field, value) pair, fields and values in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .flat_map(|(k, vs)| vs.iter().map(move |v| (k.as_str(), v.as_str())))
    }

    /// True if `value` appears as a comma-separated token of the field (ASCII
    /// case-insensitive). Used for `connection` and `transfer-encoding` checks.
    pub fn has_token(&self, name: &str, token: &str) -> bool {
        self.get_all(name).iter().any(|v| {
            v.split(',')
                .any(|t| t.trim().eq_ignore_ascii_case(token))
        })
    }

    /// Serialize non-pseudo fields as `name: value CRLF` pairs, preserving order.
    pub fn write_block(&self, buf: &mut BytesMut) {
        for (name, value) in self.iter() {
            if name.starts_with(':') {
                continue;
            }
            buf.put_slice(name.as_bytes());
            buf.put_slice(b": ");
            buf.put_slice(value.as_bytes());
            buf.put_slice(b"\r\n");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_are_lowercased_and_order_preserved() {
        let mut h = HeaderMap::new();
        h.add("X-A", "1");
        h.add("X-B", "2");
        h.add("X-A", "3");
        assert_eq!(h.get("x-a"), Some("1"));
        assert_eq!(h.get_all("X-A"), &["1".to_string(), "3".to_string()]);
        let pairs: Vec<_> = h.iter().collect();
        assert_eq!(pairs, vec![("x-a", "1"), ("x-a", "3"), ("x-b", "2")]);
    }

    #[test]
    fn set_after_add_resets_to_one_value() {
        let mut h = HeaderMap::new();
        h.add("Accept", "a");
        h.add("Accept", "b");
        h.set("accept", "c");
        assert_eq!(h.get_all("accept"), &["c".to_string()]);
    }

    #[test]
    fn pseudo_headers_are_stripped_from_wire_block() {
        let mut h = HeaderMap::new();
        h.set(STATUS, "200");
        h.set("content-type", "text/plain");
        h.set(ENTITY_LENGTH, "*");
        let mut buf = BytesMut::new();
        h.write_block(&mut buf);
        assert_eq!(&buf[..], b"content-type: text/plain\r\n");
    }

    #[test]
    fn connection_tokens() {
        let mut h = HeaderMap::new();
        h.set("connection", "keep-alive, Upgrade");
        assert!(h.has_token("connection", "upgrade"));
        assert!(!h.has_token("connection", "close"));
    }

    #[test]
    fn entity_length_sentinels() {
        assert_eq!(EntityLength::parse("@"), Some(EntityLength::None));
        assert_eq!(EntityLength::parse("*"), Some(EntityLength::Streaming));
        assert_eq!(EntityLength::parse("42"), Some(EntityLength::Exact(42)));
        assert_eq!(EntityLength::parse("x"), None);
        assert_eq!(EntityLength::Exact(7).as_header_value(), "7");
    }
}
