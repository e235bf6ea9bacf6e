//! Transport bindings and host normalization.
//!
//! A [`TransportBinding`] is the immutable result of discovery: which host,
//! scheme, path and TLS policy every later request uses. Clones of a
//! controller share one binding through an `Arc`.

use std::fmt;

use crate::core::{Error, LOCAL_RPC_PATH, Result};

/// URL scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scheme {
    /// Plain HTTP.
    Http,
    /// HTTP over TLS.
    Https,
}

impl Scheme {
    /// Lowercase scheme name.
    pub fn as_str(self) -> &'static str {
        match self {
            Scheme::Http => "http",
            Scheme::Https => "https",
        }
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Certificate verification applied to one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TlsPolicy {
    /// Standard verification against the platform roots.
    #[default]
    Strict,
    /// Accept the controller's self-signed certificate. Local endpoint only.
    RelaxedLocal,
}

impl fmt::Display for TlsPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TlsPolicy::Strict => f.write_str("strict"),
            TlsPolicy::RelaxedLocal => f.write_str("relaxed-local"),
        }
    }
}

/// Which surface a binding talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    /// The controller on the LAN.
    Local,
    /// The vendor cloud API.
    Cloud,
}

/// Where and how requests are sent.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TransportBinding {
    host: String,
    scheme: Scheme,
    path: String,
    tls: TlsPolicy,
    endpoint: Endpoint,
}

impl TransportBinding {
    /// Build a binding.
    ///
    /// Relaxed TLS is rejected for the cloud endpoint.
    pub fn new(
        host: impl Into<String>,
        scheme: Scheme,
        path: impl Into<String>,
        tls: TlsPolicy,
        endpoint: Endpoint,
    ) -> Result<Self> {
        let host = host.into();
        if host.is_empty() {
            return Err(Error::Config("empty host".into()));
        }
        if endpoint == Endpoint::Cloud && tls == TlsPolicy::RelaxedLocal {
            return Err(Error::Config(
                "relaxed TLS is only allowed for the local controller".into(),
            ));
        }
        let mut path = path.into();
        if !path.starts_with('/') {
            path.insert(0, '/');
        }
        Ok(Self {
            host,
            scheme,
            path,
            tls,
            endpoint,
        })
    }

    /// Binding for the controller's RPC path on `host`.
    pub fn local(host: impl Into<String>, scheme: Scheme, tls: TlsPolicy) -> Result<Self> {
        Self::new(host, scheme, LOCAL_RPC_PATH, tls, Endpoint::Local)
    }

    /// Binding for a cloud API URL.
    pub fn cloud(url: &str) -> Result<Self> {
        let (scheme, rest) = split_scheme(url)
            .ok_or_else(|| Error::Config(format!("cloud URL needs a scheme: {}", url)))?;
        let (host, path) = split_path(rest);
        Self::new(host, scheme, path.unwrap_or("/"), TlsPolicy::Strict, Endpoint::Cloud)
    }

    /// Host, optionally with port.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Scheme.
    pub fn scheme(&self) -> Scheme {
        self.scheme
    }

    /// Request path.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// TLS policy for every request on this binding.
    pub fn tls(&self) -> TlsPolicy {
        self.tls
    }

    /// Target surface.
    pub fn endpoint(&self) -> Endpoint {
        self.endpoint
    }

    /// Full request URL.
    pub fn url(&self) -> String {
        format!("{}://{}{}", self.scheme, self.host, self.path)
    }
}

impl fmt::Display for TransportBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (tls {})", self.url(), self.tls)
    }
}

/// A caller-supplied host after normalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostSpec {
    /// Host with no scheme or path; discovery picks the transport.
    Bare(String),
    /// Scheme or path given; used exactly as written.
    Explicit(TransportBinding),
}

impl HostSpec {
    /// Normalize a host string.
    ///
    /// `http(s)://host`, `http(s)://host/` and `http(s)://host/stick` all
    /// resolve to `<scheme>://host/stick`. A bare host with only a trailing
    /// slash stays bare; a bare host with a path binds plain HTTP to that
    /// path.
    pub fn parse(input: &str) -> Result<Self> {
        let input = input.trim();
        if let Some((scheme, rest)) = split_scheme(input) {
            let (host, path) = split_path(rest);
            let path = match path {
                None | Some("/") => LOCAL_RPC_PATH,
                Some(path) => path,
            };
            return TransportBinding::new(host, scheme, path, TlsPolicy::Strict, Endpoint::Local)
                .map(HostSpec::Explicit);
        }
        match split_path(input) {
            (host, None | Some("/")) if !host.is_empty() => Ok(HostSpec::Bare(host.to_string())),
            (host, Some(path)) if !host.is_empty() => {
                TransportBinding::new(host, Scheme::Http, path, TlsPolicy::Strict, Endpoint::Local)
                    .map(HostSpec::Explicit)
            }
            _ => Err(Error::Config(format!("invalid host: {:?}", input))),
        }
    }
}

fn split_scheme(input: &str) -> Option<(Scheme, &str)> {
    let lower: String = input.chars().take(8).collect::<String>().to_ascii_lowercase();
    if lower.starts_with("https://") {
        Some((Scheme::Https, &input[8..]))
    } else if lower.starts_with("http://") {
        Some((Scheme::Http, &input[7..]))
    } else {
        None
    }
}

fn split_path(rest: &str) -> (&str, Option<&str>) {
    match rest.find('/') {
        Some(index) => (&rest[..index], Some(&rest[index..])),
        None => (rest, None),
    }
}
