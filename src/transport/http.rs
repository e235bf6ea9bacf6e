//! reqwest-backed [`Transport`].
//!
//! Two connection pools are kept: one with standard certificate
//! verification and one that accepts the controller's self-signed
//! certificate. The relaxed pool is only ever used for a local binding whose
//! policy asks for it, so the relaxation never leaks to other hosts.

use std::error::Error as StdError;
use std::io;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE as CONTENT_TYPE_HEADER;
use tracing::debug;

use crate::core::{CONTENT_TYPE, Error, FailureCategory, Result, USER_AGENT};

use super::{Endpoint, TlsPolicy, Transport, TransportBinding, TransportResponse};

/// HTTP(S) transport over reqwest.
///
/// reqwest fixes certificate verification per client, so the TLS policy of
/// each request selects one of two prebuilt clients.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    strict: reqwest::Client,
    relaxed: reqwest::Client,
}

impl HttpTransport {
    /// Build both connection pools.
    pub fn new() -> Result<Self> {
        let strict = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| Error::Config(format!("cannot build HTTP client: {}", e)))?;
        let relaxed = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .danger_accept_invalid_certs(true)
            .build()
            .map_err(|e| Error::Config(format!("cannot build relaxed HTTP client: {}", e)))?;
        Ok(Self { strict, relaxed })
    }

    fn client_for(&self, binding: &TransportBinding) -> (&reqwest::Client, TlsPolicy) {
        match (binding.endpoint(), binding.tls()) {
            (Endpoint::Local, TlsPolicy::RelaxedLocal) => (&self.relaxed, TlsPolicy::RelaxedLocal),
            _ => (&self.strict, TlsPolicy::Strict),
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn post(
        &self,
        binding: &TransportBinding,
        body: Vec<u8>,
        timeout: Duration,
    ) -> Result<TransportResponse> {
        let (client, policy) = self.client_for(binding);
        let response = client
            .post(binding.url())
            .header(CONTENT_TYPE_HEADER, CONTENT_TYPE)
            .timeout(timeout)
            .body(body)
            .send()
            .await
            .map_err(|e| classify(&e, policy))?;

        let status = response.status().as_u16();
        let body = response.bytes().await.map_err(|e| classify(&e, policy))?;
        Ok(TransportResponse {
            status,
            body: body.to_vec(),
        })
    }
}

/// Translate a reqwest failure into a [`FailureCategory`] here, at the call
/// site, so nothing above the transport sees a library error.
fn classify(err: &reqwest::Error, policy: TlsPolicy) -> Error {
    let category = categorize(err, policy);
    debug!(error = %err, %category, "request failed");
    Error::Transport(category)
}

fn categorize(err: &reqwest::Error, policy: TlsPolicy) -> FailureCategory {
    if err.is_timeout() {
        return FailureCategory::Timeout;
    }
    let mut source = err.source();
    while let Some(cause) = source {
        if let Some(category) = categorize_cause(cause, policy) {
            return category;
        }
        source = cause.source();
    }
    if err.is_connect() {
        FailureCategory::Unreachable
    } else {
        FailureCategory::Protocol
    }
}

/// `io::Error::source` skips a custom payload, and the TLS connector nests
/// `io::Error`s, so payloads are unwrapped here before the kind is read.
fn categorize_cause(cause: &(dyn StdError + 'static), policy: TlsPolicy) -> Option<FailureCategory> {
    if cause.downcast_ref::<rustls::Error>().is_some() {
        return Some(tls_failure(policy));
    }
    let io = cause.downcast_ref::<io::Error>()?;
    if let Some(category) = io.get_ref().and_then(|inner| categorize_cause(inner, policy)) {
        return Some(category);
    }
    match io.kind() {
        io::ErrorKind::ConnectionRefused
        | io::ErrorKind::ConnectionReset
        | io::ErrorKind::ConnectionAborted => Some(FailureCategory::ConnectionRefused),
        io::ErrorKind::TimedOut => Some(FailureCategory::Timeout),
        _ => None,
    }
}

fn tls_failure(policy: TlsPolicy) -> FailureCategory {
    match policy {
        TlsPolicy::Strict => FailureCategory::CertificateRejected,
        TlsPolicy::RelaxedLocal => FailureCategory::RelaxedTlsFailed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{EncryptedEnvelope, SharedSecret};
    use crate::transport::{Discovery, Scheme};
    use rustls::pki_types::{PrivateKeyDer, PrivatePkcs8KeyDer};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio_rustls::TlsAcceptor;

    const SECRET: &str = "pw";
    const TIMEOUT: Duration = Duration::from_secs(5);

    /// Counts requests handed to the real transport.
    struct Counting {
        inner: HttpTransport,
        posts: AtomicUsize,
    }

    impl Counting {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                inner: HttpTransport::new().unwrap(),
                posts: AtomicUsize::new(0),
            })
        }

        fn posts(&self) -> usize {
            self.posts.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Transport for Counting {
        async fn post(
            &self,
            binding: &TransportBinding,
            body: Vec<u8>,
            timeout: Duration,
        ) -> Result<TransportResponse> {
            self.posts.fetch_add(1, Ordering::SeqCst);
            self.inner.post(binding, body, timeout).await
        }
    }

    /// Sealed `ModelAndVersionResponse` for an ESP-TM2.
    fn model_reply() -> Vec<u8> {
        let text = r#"{"id":1,"jsonrpc":"2.0","result":{"data":"82000A0103","length":5}}"#;
        EncryptedEnvelope::seal(text, &SharedSecret::new(SECRET).derive_key()).to_bytes()
    }

    fn http_ok(body: &[u8]) -> Vec<u8> {
        let mut out = format!(
            "HTTP/1.1 200 OK\r\nContent-Type: application/octet-stream\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
            body.len()
        )
        .into_bytes();
        out.extend_from_slice(body);
        out
    }

    /// Read one request head and its `Content-Length` body.
    async fn read_request<S: AsyncRead + Unpin>(stream: &mut S) -> std::io::Result<()> {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 1024];
        let head_end = loop {
            if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                break pos + 4;
            }
            let n = stream.read(&mut chunk).await?;
            if n == 0 {
                return Err(io::ErrorKind::UnexpectedEof.into());
            }
            buf.extend_from_slice(&chunk[..n]);
        };
        let head = String::from_utf8_lossy(&buf[..head_end]).to_ascii_lowercase();
        let length = head
            .lines()
            .find_map(|line| line.strip_prefix("content-length:"))
            .and_then(|v| v.trim().parse::<usize>().ok())
            .unwrap_or(0);
        while buf.len() < head_end + length {
            let n = stream.read(&mut chunk).await?;
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);
        }
        Ok(())
    }

    async fn serve<S: AsyncRead + AsyncWrite + Unpin>(mut stream: S, reply: &[u8]) {
        if read_request(&mut stream).await.is_ok() {
            let _ = stream.write_all(&http_ok(reply)).await;
            let _ = stream.shutdown().await;
        }
    }

    /// HTTPS listener with a freshly generated self-signed certificate.
    async fn self_signed_listener(reply: Vec<u8>) -> u16 {
        let certified = rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();
        let cert = certified.cert.der().clone();
        let key = PrivatePkcs8KeyDer::from(certified.key_pair.serialize_der());
        let config = rustls::ServerConfig::builder_with_provider(Arc::new(
            rustls::crypto::ring::default_provider(),
        ))
        .with_safe_default_protocol_versions()
        .unwrap()
        .with_no_client_auth()
        .with_single_cert(vec![cert], PrivateKeyDer::Pkcs8(key))
        .unwrap();
        let acceptor = TlsAcceptor::from(Arc::new(config));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let acceptor = acceptor.clone();
                let reply = reply.clone();
                tokio::spawn(async move {
                    if let Ok(tls) = acceptor.accept(stream).await {
                        serve(tls, &reply).await;
                    }
                });
            }
        });
        port
    }

    /// Plain HTTP listener. Anything that is not an HTTP request gets a 400,
    /// the way a controller answers a TLS hello on its HTTP port.
    async fn plain_listener(reply: Vec<u8>) -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            while let Ok((mut stream, _)) = listener.accept().await {
                let reply = reply.clone();
                tokio::spawn(async move {
                    let mut method = [0u8; 4];
                    if stream.read_exact(&mut method).await.is_err() {
                        return;
                    }
                    if &method == b"POST" {
                        serve(stream, &reply).await;
                    } else {
                        let _ = stream
                            .write_all(b"HTTP/1.1 400 Bad Request\r\nContent-Length: 0\r\nConnection: close\r\n\r\n")
                            .await;
                        let mut rest = Vec::new();
                        let _ = stream.read_to_end(&mut rest).await;
                    }
                });
            }
        });
        port
    }

    fn local(port: u16, scheme: Scheme, tls: TlsPolicy) -> TransportBinding {
        TransportBinding::local(format!("127.0.0.1:{}", port), scheme, tls).unwrap()
    }

    async fn category(binding: &TransportBinding) -> Option<FailureCategory> {
        HttpTransport::new()
            .unwrap()
            .post(binding, b"{}".to_vec(), TIMEOUT)
            .await
            .unwrap_err()
            .transport_category()
    }

    #[test]
    fn test_relaxed_pool_only_for_local() {
        let transport = HttpTransport::new().unwrap();
        let local =
            TransportBinding::local("10.0.0.5", Scheme::Https, TlsPolicy::RelaxedLocal).unwrap();
        assert_eq!(transport.client_for(&local).1, TlsPolicy::RelaxedLocal);

        let strict = TransportBinding::local("10.0.0.5", Scheme::Https, TlsPolicy::Strict).unwrap();
        assert_eq!(transport.client_for(&strict).1, TlsPolicy::Strict);

        let cloud = TransportBinding::cloud("https://rdz-rbcloud.rainbird.com/phone-api").unwrap();
        assert_eq!(transport.client_for(&cloud).1, TlsPolicy::Strict);
    }

    #[test]
    fn test_tls_failure_tracks_policy() {
        assert_eq!(tls_failure(TlsPolicy::Strict), FailureCategory::CertificateRejected);
        assert_eq!(tls_failure(TlsPolicy::RelaxedLocal), FailureCategory::RelaxedTlsFailed);
    }

    #[test]
    fn test_nested_tls_error_is_found() {
        let tls = rustls::Error::InvalidCertificate(rustls::CertificateError::UnknownIssuer);
        let nested = io::Error::other(io::Error::new(io::ErrorKind::InvalidData, tls));
        assert_eq!(
            categorize_cause(&nested, TlsPolicy::Strict),
            Some(FailureCategory::CertificateRejected)
        );
        assert_eq!(
            categorize_cause(&nested, TlsPolicy::RelaxedLocal),
            Some(FailureCategory::RelaxedTlsFailed)
        );

        let refused = io::Error::other(io::Error::from(io::ErrorKind::ConnectionRefused));
        assert_eq!(
            categorize_cause(&refused, TlsPolicy::Strict),
            Some(FailureCategory::ConnectionRefused)
        );
        assert_eq!(categorize_cause(&io::Error::other("boom"), TlsPolicy::Strict), None);
    }

    #[tokio::test]
    async fn test_refused_port_is_wrong_scheme() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let binding = local(port, Scheme::Http, TlsPolicy::Strict);
        assert_eq!(category(&binding).await, Some(FailureCategory::ConnectionRefused));
    }

    #[tokio::test]
    async fn test_self_signed_certificate() {
        let port = self_signed_listener(b"ok".to_vec()).await;

        let strict = local(port, Scheme::Https, TlsPolicy::Strict);
        assert_eq!(category(&strict).await, Some(FailureCategory::CertificateRejected));

        let relaxed = local(port, Scheme::Https, TlsPolicy::RelaxedLocal);
        let response = HttpTransport::new()
            .unwrap()
            .post(&relaxed, b"{}".to_vec(), TIMEOUT)
            .await
            .unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(response.body, b"ok");
    }

    #[tokio::test]
    async fn test_https_against_plain_http() {
        let port = plain_listener(Vec::new()).await;

        let strict = local(port, Scheme::Https, TlsPolicy::Strict);
        assert_eq!(category(&strict).await, Some(FailureCategory::CertificateRejected));

        let relaxed = local(port, Scheme::Https, TlsPolicy::RelaxedLocal);
        assert_eq!(category(&relaxed).await, Some(FailureCategory::RelaxedTlsFailed));
    }

    #[tokio::test]
    async fn test_discovery_settles_on_relaxed_tls() {
        let port = self_signed_listener(model_reply()).await;
        let transport = Counting::new();

        let (binding, model) = Discovery::new(transport.clone())
            .with_probe_timeout(TIMEOUT)
            .discover_with_model(&format!("127.0.0.1:{}", port), &SharedSecret::new(SECRET))
            .await
            .unwrap();
        assert_eq!(binding.scheme(), Scheme::Https);
        assert_eq!(binding.tls(), TlsPolicy::RelaxedLocal);
        assert_eq!(model.unwrap().model_id, 0x000A);
        assert_eq!(transport.posts(), 2);
    }

    #[tokio::test]
    async fn test_discovery_falls_back_to_http() {
        let port = plain_listener(model_reply()).await;
        let transport = Counting::new();

        let binding = Discovery::new(transport.clone())
            .with_probe_timeout(TIMEOUT)
            .discover(&format!("127.0.0.1:{}", port), &SharedSecret::new(SECRET))
            .await
            .unwrap();
        assert_eq!(binding.url(), format!("http://127.0.0.1:{}/stick", port));
        assert_eq!(transport.posts(), 3);
    }
}
