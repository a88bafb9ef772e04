//! Picks the externally reachable `host:port` written into served documents.
//!
//! Seed documents are authored against a fixed development address. Before
//! a document leaves the server every occurrence of that address is replaced
//! with the host the client should use.

use std::net::{IpAddr, SocketAddr, UdpSocket};

use tracing::debug;

/// Development addresses authored into seed documents.
pub const PLACEHOLDER_HOSTS: [&str; 2] = ["127.0.0.1:8080", "localhost:8080"];

pub const DEFAULT_PROBE_TARGET: &str = "8.8.8.8:80";

/// What the current request tells us about the host it was sent to.
#[derive(Debug, Clone, Default)]
pub struct HostContext<'a> {
    pub declared_host: Option<&'a str>,
}

pub trait HostProvider: Send + Sync {
    fn name(&self) -> &'static str;

    fn provide(&self, context: &HostContext<'_>) -> Option<String>;
}

/// The host the caller declared, e.g. the `Host` header.
#[derive(Debug, Default, Clone, Copy)]
pub struct DeclaredHost;

impl HostProvider for DeclaredHost {
    fn name(&self) -> &'static str {
        "declared"
    }

    fn provide(&self, context: &HostContext<'_>) -> Option<String> {
        let host = context.declared_host.map(str::trim)?;
        if !is_valid_authority(host) {
            if !host.is_empty() {
                debug!("Ignoring malformed declared host {:?}", host);
            }
            return None;
        }
        Some(host.to_string())
    }
}

/// Whether `authority` is a bare `host[:port]`.
///
/// The host is a name or IPv4 address made of ASCII letters, digits, dots
/// and dashes, or a bracketed IPv6 address. The port, if present, must fit
/// in a `u16`.
pub fn is_valid_authority(authority: &str) -> bool {
    let (host_ok, port) = match authority.strip_prefix('[') {
        Some(rest) => match rest.split_once(']') {
            Some((inner, after)) => {
                let ok = !inner.is_empty()
                    && inner.chars().all(|c| c.is_ascii_hexdigit() || c == ':' || c == '.');
                match after {
                    "" => (ok, None),
                    after => match after.strip_prefix(':') {
                        Some(port) => (ok, Some(port)),
                        None => return false,
                    },
                }
            }
            None => return false,
        },
        None => {
            let (host, port) = match authority.split_once(':') {
                Some((host, port)) => (host, Some(port)),
                None => (authority, None),
            };
            let ok = !host.is_empty()
                && host.chars().all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-');
            (ok, port)
        }
    };

    host_ok
        && port.map_or(true, |port| {
            !port.is_empty() && port.chars().all(|c| c.is_ascii_digit()) && port.parse::<u16>().is_ok()
        })
}

/// Operator-configured public host.
#[derive(Debug, Clone)]
pub struct ConfiguredHost {
    host: Option<String>,
    port: u16,
}

impl ConfiguredHost {
    pub fn new(host: Option<String>, port: u16) -> Self {
        Self { host, port }
    }
}

impl HostProvider for ConfiguredHost {
    fn name(&self) -> &'static str {
        "configured"
    }

    fn provide(&self, _context: &HostContext<'_>) -> Option<String> {
        let host = self.host.as_deref()?.trim();
        if host.is_empty() {
            return None;
        }
        Some(with_port(host, self.port))
    }
}

/// Address of the interface that routes towards `target`.
///
/// Connecting a UDP socket sends nothing, it only selects a route.
#[derive(Debug, Clone)]
pub struct ProbedHost {
    target: String,
    port: u16,
}

impl ProbedHost {
    pub fn new(target: impl Into<String>, port: u16) -> Self {
        Self {
            target: target.into(),
            port,
        }
    }
}

impl HostProvider for ProbedHost {
    fn name(&self) -> &'static str {
        "probed"
    }

    fn provide(&self, _context: &HostContext<'_>) -> Option<String> {
        match probe_local_ip(&self.target) {
            Ok(ip) if !ip.is_unspecified() => Some(with_port(&ip.to_string(), self.port)),
            Ok(_) => None,
            Err(err) => {
                debug!("Local address probe towards {} failed: {}", self.target, err);
                None
            }
        }
    }
}

pub fn probe_local_ip(target: &str) -> std::io::Result<IpAddr> {
    let socket = UdpSocket::bind("0.0.0.0:0")?;
    socket.connect(target)?;
    Ok(socket.local_addr()?.ip())
}

/// Appends `port` unless `host` already carries one.
pub fn with_port(host: &str, port: u16) -> String {
    if host.parse::<SocketAddr>().is_ok() {
        return host.to_string();
    }
    match host.parse::<IpAddr>() {
        Ok(IpAddr::V6(ip)) => format!("[{}]:{}", ip, port),
        Ok(IpAddr::V4(ip)) => format!("{}:{}", ip, port),
        Err(_) if host.contains(':') => host.to_string(),
        Err(_) => format!("{}:{}", host, port),
    }
}

/// Ranked host providers with a loopback fallback.
pub struct HostResolver {
    providers: Vec<Box<dyn HostProvider>>,
    port: u16,
}

impl HostResolver {
    /// Caller-declared host first, then the configured one, then the probe.
    ///
    /// HTTP/1.1 clients always send `Host`, so the configured host and the
    /// probed address only apply when the declared one is missing or
    /// malformed.
    pub fn new(configured: Option<String>, probe_target: impl Into<String>, port: u16) -> Self {
        Self::with_providers(
            vec![
                Box::new(DeclaredHost),
                Box::new(ConfiguredHost::new(configured, port)),
                Box::new(ProbedHost::new(probe_target, port)),
            ],
            port,
        )
    }

    pub fn with_providers(providers: Vec<Box<dyn HostProvider>>, port: u16) -> Self {
        Self { providers, port }
    }

    pub fn fallback(&self) -> String {
        format!("127.0.0.1:{}", self.port)
    }

    pub fn resolve(&self, context: &HostContext<'_>) -> String {
        for provider in &self.providers {
            if let Some(host) = provider.provide(context) {
                debug!("Public host {} from {} provider", host, provider.name());
                return host;
            }
        }
        self.fallback()
    }
}

/// Replaces every placeholder address in a serialized document.
pub fn rewrite_placeholders(body: &str, host: &str) -> String {
    PLACEHOLDER_HOSTS
        .iter()
        .fold(body.to_string(), |body, placeholder| body.replace(placeholder, host))
}
