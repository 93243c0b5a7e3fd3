//! HTTP fetch pipeline for link previews.
//!
//! ### URL Canonicalization
//! - Trim whitespace, ensure scheme (default: `https`)
//! - Lowercase host, remove fragments
//! - Preserve query string
//!
//! ### Safety Gates
//! - Deny private ranges (RFC1918, link-local, localhost, etc.)
//! - Resolve DNS and validate all A/AAAA answers are public, for the
//!   initial URL and for every redirect hop.
//! - Max redirects: 5, followed by hand so each hop passes the gate
//! - Max body bytes: 2MB (configurable), enforced while streaming
//!
//! ### Status Handling
//! - Only `200 OK` counts as success; every other status is `BadStatus`.

pub mod ssrf;
pub mod url;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use reqwest::Url;
use reqwest::{Client, Response, StatusCode, header};
use std::sync::Arc;
use std::time::{Duration, Instant};

pub use self::ssrf::{HostGate, PublicAddressGate, SsrfError, validate_host, validate_ip};
pub use self::url::{UrlError, canonicalize, is_web_url};

use linkpeek_core::{AppConfig, Error};

/// Configuration for the fetch client.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// User agent string
    pub user_agent: String,

    /// Maximum response body size in bytes (default: 2MB)
    pub max_bytes: usize,

    /// Per-request timeout (default: 8s)
    pub timeout: Duration,

    /// Maximum number of redirects to follow (default: 5)
    pub max_redirects: usize,

    /// Refuse hosts resolving to private/reserved addresses (default: true)
    pub block_private_addresses: bool,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for FetchConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            user_agent: config.user_agent.clone(),
            max_bytes: config.max_bytes,
            timeout: config.timeout(),
            max_redirects: config.max_redirects,
            block_private_addresses: config.block_private_addresses,
        }
    }
}

/// Response from a fetch operation.
#[derive(Debug, Clone)]
pub struct FetchResponse {
    /// The URL requested
    pub url: Url,
    /// The final URL after redirects
    pub final_url: Url,
    /// Response body bytes
    pub bytes: Bytes,
    /// Time taken to fetch in milliseconds
    pub fetch_ms: u64,
}

/// An HTML page ready for metadata extraction.
#[derive(Debug, Clone)]
pub struct FetchedPage {
    pub url: Url,
    pub final_url: Url,
    pub html: String,
    pub fetch_ms: u64,
}

/// Source of page HTML for the preview service.
///
/// `FetchClient` is the production implementation; tests substitute
/// counting or stalling fakes.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch_page(&self, url: &Url) -> Result<FetchedPage, Error>;
}

/// HTTP fetch client with safety checks.
pub struct FetchClient {
    http: Client,
    config: FetchConfig,
    gate: Option<Arc<dyn HostGate>>,
}

impl FetchClient {
    /// Create a new fetch client with the given configuration.
    ///
    /// Uses `PublicAddressGate` unless `block_private_addresses` is off.
    pub fn new(config: FetchConfig) -> Result<Self, Error> {
        Self::with_gate(config, Arc::new(PublicAddressGate))
    }

    /// Create a client that consults `gate` before every request it sends.
    pub fn with_gate(config: FetchConfig, gate: Arc<dyn HostGate>) -> Result<Self, Error> {
        let http = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.timeout)
            .redirect(reqwest::redirect::Policy::none())
            .use_rustls_tls()
            .gzip(true)
            .brotli(true)
            .deflate(true)
            .build()
            .map_err(|e| Error::Network(format!("failed to build HTTP client: {}", e)))?;

        let gate = config.block_private_addresses.then_some(gate);
        Ok(Self { http, config, gate })
    }

    /// Fetch a URL, returning raw bytes and metadata.
    ///
    /// Performs the SSRF check on every hop and enforces the redirect,
    /// timeout, status and byte limits.
    pub async fn fetch(&self, url: &Url) -> Result<FetchResponse, Error> {
        let start = Instant::now();
        let mut current = url.clone();
        let mut redirects = 0usize;

        let response = loop {
            if let Some(gate) = &self.gate {
                gate.check(&current).await.map_err(|e| Error::SsrfBlocked(e.to_string()))?;
            }

            let response = self
                .http
                .get(current.as_str())
                .header(header::ACCEPT, "text/html,application/xhtml+xml;q=0.9,*/*;q=0.8")
                .send()
                .await
                .map_err(|e| classify(&e, &self.config))?;

            let Some(next) = redirect_target(&current, &response)? else {
                break response;
            };
            if redirects >= self.config.max_redirects {
                return Err(Error::Network(format!("more than {} redirects", self.config.max_redirects)));
            }

            tracing::debug!(from = %current, to = %next, "following redirect");
            current = next;
            redirects += 1;
        };

        let status = response.status();
        if status != StatusCode::OK {
            return Err(Error::BadStatus(status.as_u16()));
        }

        if let Some(len) = response.content_length()
            && len as usize > self.config.max_bytes
        {
            return Err(Error::FetchTooLarge(format!("{} bytes exceeds {}", len, self.config.max_bytes)));
        }

        let final_url = response.url().clone();
        let bytes = self.read_body(response).await?;
        let fetch_ms = start.elapsed().as_millis() as u64;

        tracing::debug!(
            url = %url,
            final_url = %final_url,
            fetch_ms,
            redirects,
            bytes = bytes.len(),
            "fetched page"
        );

        Ok(FetchResponse { url: url.clone(), final_url, bytes, fetch_ms })
    }

    /// Read the body chunk by chunk, failing as soon as it passes `max_bytes`.
    async fn read_body(&self, mut response: Response) -> Result<Bytes, Error> {
        let mut body = BytesMut::new();
        while let Some(chunk) = response.chunk().await.map_err(|e| classify(&e, &self.config))? {
            if body.len() + chunk.len() > self.config.max_bytes {
                return Err(Error::FetchTooLarge(format!("body exceeds {} bytes", self.config.max_bytes)));
            }
            body.extend_from_slice(&chunk);
        }
        Ok(body.freeze())
    }
}

/// The next URL to request when `response` is a redirect with a usable
/// `Location`. Anything else is handed back to status handling.
fn redirect_target(current: &Url, response: &Response) -> Result<Option<Url>, Error> {
    if !response.status().is_redirection() {
        return Ok(None);
    }
    let Some(location) = response.headers().get(header::LOCATION).and_then(|v| v.to_str().ok()) else {
        return Ok(None);
    };

    let next = current
        .join(location)
        .map_err(|e| Error::Network(format!("bad redirect target {location:?}: {e}")))?;
    match next.scheme() {
        "http" | "https" => Ok(Some(next)),
        scheme => Err(Error::Network(format!("redirect to unsupported scheme {scheme}"))),
    }
}

#[async_trait]
impl PageFetcher for FetchClient {
    async fn fetch_page(&self, url: &Url) -> Result<FetchedPage, Error> {
        let response = self.fetch(url).await?;

        if response.bytes.iter().all(u8::is_ascii_whitespace) {
            return Err(Error::EmptyBody(url.to_string()));
        }

        let html = String::from_utf8_lossy(&response.bytes).into_owned();
        Ok(FetchedPage { url: response.url, final_url: response.final_url, html, fetch_ms: response.fetch_ms })
    }
}

fn classify(err: &reqwest::Error, config: &FetchConfig) -> Error {
    if err.is_timeout() {
        Error::FetchTimeout(format!("no response within {}ms", config.timeout.as_millis()))
    } else {
        Error::Network(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header as header_eq, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn local_config() -> FetchConfig {
        FetchConfig { block_private_addresses: false, ..Default::default() }
    }

    fn page_url(server: &MockServer, p: &str) -> Url {
        Url::parse(&format!("{}{}", server.uri(), p)).unwrap()
    }

    #[test]
    fn test_fetch_config_default() {
        let config = FetchConfig::default();
        assert_eq!(config.user_agent, "linkpeek/0.1 (VisualLinkPreview/1.0)");
        assert_eq!(config.max_bytes, 2 * 1024 * 1024);
        assert_eq!(config.timeout, Duration::from_secs(8));
        assert_eq!(config.max_redirects, 5);
        assert!(config.block_private_addresses);
    }

    #[tokio::test]
    async fn test_fetch_page_ok() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/article"))
            .and(header_eq("user-agent", "linkpeek/0.1 (VisualLinkPreview/1.0)"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<title>Hi</title>"))
            .expect(1)
            .mount(&server)
            .await;

        let client = FetchClient::new(local_config()).unwrap();
        let page = client.fetch_page(&page_url(&server, "/article")).await.unwrap();
        assert_eq!(page.html, "<title>Hi</title>");
    }

    #[tokio::test]
    async fn test_non_200_is_bad_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = FetchClient::new(local_config()).unwrap();
        let result = client.fetch(&page_url(&server, "/missing")).await;
        assert!(matches!(result, Err(Error::BadStatus(404))));
    }

    #[tokio::test]
    async fn test_204_is_bad_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;

        let client = FetchClient::new(local_config()).unwrap();
        let result = client.fetch(&page_url(&server, "/")).await;
        assert!(matches!(result, Err(Error::BadStatus(204))));
    }

    #[tokio::test]
    async fn test_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
            .mount(&server)
            .await;

        let config = FetchConfig { timeout: Duration::from_millis(200), ..local_config() };
        let client = FetchClient::new(config).unwrap();

        let started = Instant::now();
        let result = client.fetch(&page_url(&server, "/slow")).await;
        assert!(matches!(result, Err(Error::FetchTimeout(_))));
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_too_large() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("x".repeat(2048)))
            .mount(&server)
            .await;

        let config = FetchConfig { max_bytes: 1024, ..local_config() };
        let client = FetchClient::new(config).unwrap();
        let result = client.fetch(&page_url(&server, "/big")).await;
        assert!(matches!(result, Err(Error::FetchTooLarge(_))));
    }

    #[tokio::test]
    async fn test_empty_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("  \n"))
            .mount(&server)
            .await;

        let client = FetchClient::new(local_config()).unwrap();
        let result = client.fetch_page(&page_url(&server, "/blank")).await;
        assert!(matches!(result, Err(Error::EmptyBody(_))));
    }

    #[tokio::test]
    async fn test_follows_redirect() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/old"))
            .respond_with(ResponseTemplate::new(301).insert_header("location", "/new"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/new"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<title>New</title>"))
            .mount(&server)
            .await;

        let client = FetchClient::new(local_config()).unwrap();
        let page = client.fetch_page(&page_url(&server, "/old")).await.unwrap();
        assert_eq!(page.final_url.path(), "/new");
        assert_eq!(page.url.path(), "/old");
        assert_eq!(page.html, "<title>New</title>");
    }

    #[tokio::test]
    async fn test_redirect_limit() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/loop"))
            .respond_with(ResponseTemplate::new(302).insert_header("location", "/loop"))
            .mount(&server)
            .await;

        let config = FetchConfig { max_redirects: 2, ..local_config() };
        let client = FetchClient::new(config).unwrap();
        let result = client.fetch(&page_url(&server, "/loop")).await;
        assert!(matches!(result, Err(Error::Network(msg)) if msg.contains("more than 2 redirects")));
    }

    /// Admits one host name and records every URL it is asked about.
    struct OneHostGate {
        allowed: &'static str,
        seen: std::sync::Mutex<Vec<String>>,
    }

    #[async_trait]
    impl HostGate for OneHostGate {
        async fn check(&self, url: &Url) -> Result<(), SsrfError> {
            self.seen.lock().unwrap().push(url.to_string());
            match url.host_str() {
                Some(host) if host == self.allowed => Ok(()),
                other => Err(SsrfError::DnsError(format!("{other:?} not allowed"))),
            }
        }
    }

    #[tokio::test]
    async fn test_redirect_hop_is_gated() {
        let server = MockServer::start().await;
        let port = server.address().port();
        Mock::given(method("GET"))
            .and(path("/start"))
            .respond_with(
                ResponseTemplate::new(302).insert_header("location", format!("http://localhost:{port}/secret")),
            )
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/secret"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<title>Internal</title>"))
            .expect(0)
            .mount(&server)
            .await;

        let gate = Arc::new(OneHostGate { allowed: "127.0.0.1", seen: Default::default() });
        let client = FetchClient::with_gate(FetchConfig::default(), gate.clone()).unwrap();
        let result = client.fetch(&page_url(&server, "/start")).await;

        assert!(matches!(result, Err(Error::SsrfBlocked(_))));
        let seen = gate.seen.lock().unwrap().clone();
        assert_eq!(seen.len(), 2);
        assert!(seen[1].starts_with("http://localhost:"));
    }

    #[tokio::test]
    async fn test_gate_skipped_when_disabled() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<title>Hi</title>"))
            .mount(&server)
            .await;

        let gate = Arc::new(OneHostGate { allowed: "nowhere.invalid", seen: Default::default() });
        let client = FetchClient::with_gate(local_config(), gate.clone()).unwrap();
        client.fetch(&page_url(&server, "/")).await.unwrap();
        assert!(gate.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_chunked_body_capped_while_streaming() {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = [0u8; 1024];
            let _ = socket.read(&mut request).await;
            let _ = socket
                .write_all(b"HTTP/1.1 200 OK\r\ncontent-type: text/html\r\ntransfer-encoding: chunked\r\n\r\n")
                .await;
            let chunk = format!("200\r\n{}\r\n", "x".repeat(0x200));
            for _ in 0..64 {
                if socket.write_all(chunk.as_bytes()).await.is_err() {
                    return;
                }
            }
            let _ = socket.write_all(b"0\r\n\r\n").await;
        });

        let config = FetchConfig { max_bytes: 1024, ..local_config() };
        let client = FetchClient::new(config).unwrap();
        let url = Url::parse(&format!("http://{addr}/stream")).unwrap();
        let result = client.fetch(&url).await;
        assert!(matches!(result, Err(Error::FetchTooLarge(msg)) if msg.contains("body exceeds 1024")));
    }

    #[tokio::test]
    async fn test_private_address_blocked() {
        let server = MockServer::start().await;
        let client = FetchClient::new(FetchConfig::default()).unwrap();
        let result = client.fetch(&page_url(&server, "/")).await;
        assert!(matches!(result, Err(Error::SsrfBlocked(_))));
    }
}
