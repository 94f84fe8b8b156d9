/*
 * host.rs
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

//! Host registry: maps `(address, port, server name)` to an application and
//! an optional TLS context. Identity key is `"<name-or-address>:<port>"`;
//! either side of an identity may be a wildcard.

use std::net::{Ipv4Addr, Ipv6Addr};
use std::sync::Arc;

use crate::error::ConfigError;
use crate::protocol::http::handler::Application;
use crate::tls::{self, TlsContext, TlsOptions};

/// Normalize a listen address: `*` stays a wildcard, `::` becomes `[::]`,
/// anything else must parse as IPv4 or (bracketed) IPv6.
fn normalize_address(address: &str) -> Result<String, ConfigError> {
    if address == "*" {
        return Ok("*".to_string());
    }
    if address == "::" {
        return Ok("[::]".to_string());
    }
    if let Some(inner) = address.strip_prefix('[').and_then(|a| a.strip_suffix(']')) {
        return inner
            .parse::<Ipv6Addr>()
            .map(|ip| format!("[{}]", ip))
            .map_err(|_| ConfigError::Address(address.to_string()));
    }
    if address.contains(':') {
        return address
            .parse::<Ipv6Addr>()
            .map(|ip| format!("[{}]", ip))
            .map_err(|_| ConfigError::Address(address.to_string()));
    }
    address
        .parse::<Ipv4Addr>()
        .map(|ip| ip.to_string())
        .map_err(|_| ConfigError::Address(address.to_string()))
}

/// One virtual host: listen address, port, lowercased server name, handler,
/// optional TLS context. Immutable once registered.
pub struct Host {
    address: String,
    port: u16,
    name: String,
    app: Arc<dyn Application>,
    tls: Option<Arc<TlsContext>>,
}

impl Host {
    pub fn new(
        address: &str,
        port: u16,
        name: &str,
        app: Arc<dyn Application>,
    ) -> Result<Host, ConfigError> {
        if port == 0 {
            return Err(ConfigError::Port(0));
        }
        Ok(Host {
            address: normalize_address(address)?,
            port,
            name: name.to_ascii_lowercase(),
            app,
            tls: None,
        })
    }

    /// Attach a TLS context built from `options`; the host becomes encrypted.
    pub fn set_encryption(&mut self, options: &TlsOptions) -> Result<(), ConfigError> {
        self.tls = Some(Arc::new(tls::configure(&self.name, options)?));
        Ok(())
    }

    pub fn is_encrypted(&self) -> bool {
        self.tls.is_some()
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn app(&self) -> Arc<dyn Application> {
        self.app.clone()
    }

    pub fn tls_context(&self) -> Option<Arc<TlsContext>> {
        self.tls.clone()
    }

    /// Identity key: `"<name-or-address>:<port>"`.
    pub fn id(&self) -> String {
        let host = if self.name.is_empty() { &self.address } else { &self.name };
        format!("{}:{}", host, self.port)
    }

    /// True if `identity` names this host. Either side of the identity may be
    /// `*`; a bare `*` (or `*:*`) matches every host.
    pub fn matches(&self, identity: &str) -> bool {
        if identity == "*" || identity == "*:*" {
            return true;
        }
        let (host, port) = match identity.rsplit_once(':') {
            Some((h, p)) => (h, p),
            None => (identity, "*"),
        };
        let own = if self.name.is_empty() { self.address.as_str() } else { self.name.as_str() };
        let host_ok = host == "*" || own == "*" || host.eq_ignore_ascii_case(own);
        let port_ok = port == "*" || port.parse::<u16>().map(|p| p == self.port).unwrap_or(false);
        host_ok && port_ok
    }
}

/// Ordered host collection. Lookup prefers an exact identity over wildcards;
/// among wildcards, registration order wins.
#[derive(Default)]
pub struct HostRegistry {
    hosts: Vec<Host>,
}

impl HostRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, host: Host) {
        self.hosts.push(host);
    }

    pub fn len(&self) -> usize {
        self.hosts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Host> {
        self.hosts.iter()
    }

    /// Find the host for an identity (`"name:port"`, wildcards allowed).
    pub fn select(&self, identity: &str) -> Option<&Host> {
        self.hosts
            .iter()
            .find(|h| h.id() == identity)
            .or_else(|| self.hosts.iter().find(|h| h.matches(identity)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HttpError;
    use crate::protocol::http::handler::{Application, BoxFuture};
    use crate::protocol::http::request::Request;
    use crate::protocol::http::response::Response;

    struct NullApp;

    impl Application for NullApp {
        fn respond<'a>(
            &'a self,
            _request: Request,
            _response: &'a mut Response,
        ) -> BoxFuture<'a, Result<(), HttpError>> {
            Box::pin(async { Ok(()) })
        }
    }

    fn host(address: &str, port: u16, name: &str) -> Host {
        Host::new(address, port, name, Arc::new(NullApp)).unwrap()
    }

    #[test]
    fn address_normalization() {
        assert_eq!(host("*", 80, "").address(), "*");
        assert_eq!(host("::", 80, "").address(), "[::]");
        assert_eq!(host("[::1]", 80, "").address(), "[::1]");
        assert_eq!(host("0.0.0.0", 80, "").address(), "0.0.0.0");
        assert!(Host::new("not an address", 80, "", Arc::new(NullApp)).is_err());
        assert!(Host::new("1.2.3.4.5", 80, "", Arc::new(NullApp)).is_err());
    }

    #[test]
    fn zero_port_is_rejected() {
        assert!(matches!(
            Host::new("*", 0, "", Arc::new(NullApp)),
            Err(ConfigError::Port(0))
        ));
    }

    #[test]
    fn identity_uses_name_over_address() {
        let h = host("0.0.0.0", 1337, "Example.Com");
        assert_eq!(h.id(), "example.com:1337");
        let anon = host("127.0.0.1", 8080, "");
        assert_eq!(anon.id(), "127.0.0.1:8080");
    }

    #[test]
    fn matching_with_wildcards() {
        let h = host("0.0.0.0", 1337, "example.com");
        assert!(h.matches("example.com:1337"));
        assert!(h.matches("*:1337"));
        assert!(h.matches("example.com:*"));
        assert!(h.matches("*"));
        assert!(h.matches("*:*"));
        assert!(!h.matches("other:1337"));
        assert!(!h.matches("example.com:1338"));
    }

    #[test]
    fn wildcard_host_side_matches_any_name() {
        let h = host("*", 80, "");
        assert!(h.matches("whatever:80"));
        assert!(!h.matches("whatever:81"));
    }

    #[test]
    fn registry_prefers_exact_identity() {
        let mut registry = HostRegistry::new();
        registry.add(host("*", 80, ""));
        registry.add(host("0.0.0.0", 80, "example.com"));
        let selected = registry.select("example.com:80").unwrap();
        assert_eq!(selected.id(), "example.com:80");
        let fallback = registry.select("unknown:80").unwrap();
        assert_eq!(fallback.id(), "*:80");
    }
}
