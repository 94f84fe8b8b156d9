/*
 * tls.rs
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

//! TLS context configuration for encrypted hosts: option merging over
//! defaults, crypto_method version-mask normalization, PEM bundle loading
//! with certificate sanity checks, and rustls ServerConfig construction.
//!
//! Certificate name/expiry mismatches are warnings, not errors: the operator
//! may be terminating for a name the certificate does not list on purpose.

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use tokio_rustls::rustls::pki_types::{CertificateDer, PrivateKeyDer};
use tokio_rustls::rustls::{version, ServerConfig, SupportedProtocolVersion};
use tracing::warn;
use x509_parser::prelude::{FromDer, GeneralName, X509Certificate};

use crate::error::ConfigError;

// Protocol version bits for the crypto_method mask.
pub const SSLV2: u32 = 1 << 0;
pub const SSLV3: u32 = 1 << 1;
pub const TLSV1_0: u32 = 1 << 2;
pub const TLSV1_1: u32 = 1 << 3;
pub const TLSV1_2: u32 = 1 << 4;
pub const TLSV1_3: u32 = 1 << 5;

/// All TLS versions (the default mask).
pub const TLS_ANY: u32 = TLSV1_0 | TLSV1_1 | TLSV1_2 | TLSV1_3;
/// Every version bit, SSL included (`any`, `sslv23`).
pub const ANY: u32 = TLS_ANY | SSLV2 | SSLV3;

/// The crypto_method option: unset, a space-separated token string, or a
/// token list. Tokens OR into a version mask; unknown tokens are ignored.
#[derive(Debug, Clone, Default)]
pub enum CryptoMethod {
    #[default]
    Default,
    Spec(String),
    List(Vec<String>),
}

fn token_bits(token: &str) -> u32 {
    match token.to_ascii_lowercase().as_str() {
        "tls" => TLS_ANY,
        "tls1" | "tlsv1" | "tlsv1.0" => TLSV1_0,
        "tls1.1" | "tlsv1.1" => TLSV1_1,
        "tls1.2" | "tlsv1.2" => TLSV1_2,
        "tls1.3" | "tlsv1.3" => TLSV1_3,
        "ssl2" | "sslv2" => SSLV2,
        "ssl3" | "sslv3" => SSLV3,
        "sslv23" => ANY,
        "any" => ANY,
        _ => 0,
    }
}

impl CryptoMethod {
    /// OR all tokens into a mask. An empty result is a configuration error.
    pub fn normalize(&self) -> Result<u32, ConfigError> {
        let mask = match self {
            CryptoMethod::Default => TLS_ANY,
            CryptoMethod::Spec(s) => s.split_whitespace().map(token_bits).fold(0, |m, b| m | b),
            CryptoMethod::List(l) => l.iter().map(|t| token_bits(t)).fold(0, |m, b| m | b),
        };
        if mask == 0 {
            return Err(ConfigError::CryptoMethod(
                "no recognized protocol version token".to_string(),
            ));
        }
        Ok(mask)
    }
}

/// TLS options for one encrypted host, merged over defaults via struct update
/// syntax. Only `local_cert` and `crypto_method` drive the rustls config; the
/// remaining keys are carried for the operator interface.
#[derive(Debug, Clone)]
pub struct TlsOptions {
    /// PEM bundle path: certificate chain plus private key.
    pub local_cert: PathBuf,
    pub passphrase: Option<String>,
    pub allow_self_signed: bool,
    pub verify_peer: bool,
    pub ciphers: Option<String>,
    pub cafile: Option<PathBuf>,
    pub capath: Option<PathBuf>,
    pub single_ecdh_use: bool,
    pub ecdh_curve: String,
    pub honor_cipher_order: bool,
    pub disable_compression: bool,
    pub reneg_limit: u32,
    pub reneg_limit_callback: Option<fn(u32)>,
    pub crypto_method: CryptoMethod,
}

impl Default for TlsOptions {
    fn default() -> Self {
        Self {
            local_cert: PathBuf::new(),
            passphrase: None,
            allow_self_signed: false,
            verify_peer: false,
            ciphers: None,
            cafile: None,
            capath: None,
            single_ecdh_use: false,
            ecdh_curve: "prime256v1".to_string(),
            honor_cipher_order: true,
            disable_compression: true,
            reneg_limit: 2,
            reneg_limit_callback: None,
            crypto_method: CryptoMethod::Default,
        }
    }
}

/// Built TLS context for one host: the rustls config plus the normalized
/// version mask it was derived from.
#[derive(Debug)]
pub struct TlsContext {
    server_config: Arc<ServerConfig>,
    version_mask: u32,
}

impl TlsContext {
    pub fn server_config(&self) -> Arc<ServerConfig> {
        self.server_config.clone()
    }

    pub fn version_mask(&self) -> u32 {
        self.version_mask
    }
}

/// Wildcard-aware DNS name comparison (`*.example.com` covers one label).
fn dns_matches(pattern: &str, name: &str) -> bool {
    let pattern = pattern.to_ascii_lowercase();
    if let Some(suffix) = pattern.strip_prefix("*.") {
        match name.strip_suffix(suffix) {
            Some(head) => {
                head.ends_with('.') && {
                    let label = &head[..head.len() - 1];
                    !label.is_empty() && !label.contains('.')
                }
            }
            None => false,
        }
    } else {
        pattern == name
    }
}

fn cert_covers_name(cert: &X509Certificate<'_>, name: &str) -> bool {
    if let Ok(Some(san)) = cert.subject_alternative_name() {
        for general_name in &san.value.general_names {
            if let GeneralName::DNSName(dns) = general_name {
                if dns_matches(dns, name) {
                    return true;
                }
            }
        }
    }
    cert.subject()
        .iter_common_name()
        .filter_map(|attr| attr.as_str().ok())
        .any(|cn| dns_matches(cn, name))
}

/// Build the TLS context for `host_name` from `options`.
///
/// Fails on an unreadable bundle, a bundle without a certificate or private
/// key block, or an empty crypto_method mask. A certificate that does not
/// cover `host_name` or is already expired only logs a warning.
pub fn configure(host_name: &str, options: &TlsOptions) -> Result<TlsContext, ConfigError> {
    let path = &options.local_cert;
    let pem = std::fs::read(path).map_err(|e| {
        ConfigError::Certificate(format!("cannot read {}: {}", path.display(), e))
    })?;

    let text = String::from_utf8_lossy(&pem);
    let has_key_block = text
        .lines()
        .any(|l| l.starts_with("-----BEGIN") && l.contains("PRIVATE KEY-----"));
    if !has_key_block {
        return Err(ConfigError::Certificate(format!(
            "{} contains no private key block",
            path.display()
        )));
    }

    let mut reader = io::BufReader::new(&pem[..]);
    let certs: Vec<CertificateDer<'static>> = rustls_pemfile::certs(&mut reader)
        .collect::<Result<_, _>>()
        .map_err(|e| ConfigError::Certificate(format!("{}: {}", path.display(), e)))?;
    if certs.is_empty() {
        return Err(ConfigError::Certificate(format!(
            "{} contains no certificate",
            path.display()
        )));
    }

    match X509Certificate::from_der(certs[0].as_ref()) {
        Ok((_, cert)) => {
            let host_name = host_name.to_ascii_lowercase();
            if !host_name.is_empty() && !cert_covers_name(&cert, &host_name) {
                warn!(host = %host_name, cert = %path.display(),
                    "certificate CN/SAN does not cover host name");
            }
            if cert.validity().not_after.timestamp() < chrono::Utc::now().timestamp() {
                warn!(cert = %path.display(), "certificate has expired");
            }
        }
        Err(e) => {
            return Err(ConfigError::Certificate(format!(
                "{}: not an X.509 certificate: {}",
                path.display(),
                e
            )));
        }
    }

    let mut key_reader = io::BufReader::new(&pem[..]);
    let key: PrivateKeyDer<'static> = rustls_pemfile::private_key(&mut key_reader)
        .map_err(|e| ConfigError::Certificate(format!("{}: {}", path.display(), e)))?
        .ok_or_else(|| {
            ConfigError::Certificate(format!("{} contains no usable private key", path.display()))
        })?;

    let mask = options.crypto_method.normalize()?;
    let mut versions: Vec<&'static SupportedProtocolVersion> = Vec::new();
    if mask & TLSV1_2 != 0 {
        versions.push(&version::TLS12);
    }
    if mask & TLSV1_3 != 0 {
        versions.push(&version::TLS13);
    }
    if versions.is_empty() {
        return Err(ConfigError::CryptoMethod(
            "mask selects no protocol version this platform can serve".to_string(),
        ));
    }

    if options.verify_peer {
        warn!("verify_peer requested but client certificate auth is not configured; ignoring");
    }

    let server_config = ServerConfig::builder_with_protocol_versions(&versions)
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .map_err(|e| ConfigError::Certificate(format!("{}: {}", path.display(), e)))?;

    Ok(TlsContext {
        server_config: Arc::new(server_config),
        version_mask: mask,
    })
}
