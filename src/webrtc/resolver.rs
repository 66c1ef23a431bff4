//! Signaling endpoint discovery
//!
//! Player pages served by SRS embed the play API URL in their scripts. The
//! resolver fetches the page and scans it with a fixed list of patterns. When
//! the page cannot be fetched or nothing matches, a conventional endpoint is
//! derived from the page URL instead, so resolution never fails.

use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::{StatusCode, Url};
use tracing::{debug, info, warn};

use crate::events::{EventBus, SessionEvent};

/// Default play API path
pub const PLAY_API_PATH: &str = "/rtc/v1/play/";

/// Default SRS HTTP API port, used when the page is served on a custom port
pub const SRS_API_PORT: u16 = 1985;

/// Endpoint patterns in priority order; the first pattern that matches wins
static ENDPOINT_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r#"var\s+url\s*=\s*"([^"]+)""#,
        r#"url\s*:\s*"([^"]+)""#,
        r#"api_server\s*=\s*"([^"]+)""#,
        r#"'([^']*/rtc/.*?)'"#,
    ]
    .iter()
    .filter_map(|p| Regex::new(p).ok())
    .collect()
});

/// Where a resolved endpoint came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointSource {
    /// Extracted from the page body
    Page,
    /// Derived from the page URL
    Fallback,
    /// Given explicitly by the user
    Configured,
}

impl std::fmt::Display for EndpointSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EndpointSource::Page => write!(f, "page"),
            EndpointSource::Fallback => write!(f, "fallback"),
            EndpointSource::Configured => write!(f, "configured"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedEndpoint {
    pub url: Url,
    pub source: EndpointSource,
}

/// Resolves the signaling endpoint for a host page
pub struct EndpointResolver {
    client: reqwest::Client,
    events: Arc<EventBus>,
}

impl EndpointResolver {
    pub fn new(client: reqwest::Client, events: Arc<EventBus>) -> Self {
        Self { client, events }
    }

    /// Resolve the endpoint for `page_url`; never fails
    ///
    /// `page_text` is the page URL as the user wrote it. Parsing drops a
    /// default port, but a written `:80` still selects the API port fallback.
    pub async fn resolve(&self, page_url: &Url, page_text: &str) -> ResolvedEndpoint {
        let resolved = match self.fetch_page(page_url).await {
            Some(html) => match extract_endpoint(&html, page_url) {
                Some(url) => {
                    info!("Extracted API endpoint from page: {}", url);
                    ResolvedEndpoint {
                        url,
                        source: EndpointSource::Page,
                    }
                }
                None => {
                    let url = fallback_endpoint(page_url, page_text);
                    info!("No API endpoint found in page, using default {}", url);
                    ResolvedEndpoint {
                        url,
                        source: EndpointSource::Fallback,
                    }
                }
            },
            None => {
                let url = fallback_endpoint(page_url, page_text);
                info!("Using default API endpoint {}", url);
                ResolvedEndpoint {
                    url,
                    source: EndpointSource::Fallback,
                }
            }
        };

        self.publish(&resolved);
        resolved
    }

    /// Announce an endpoint that bypassed resolution
    pub fn configured(&self, url: Url) -> ResolvedEndpoint {
        let resolved = ResolvedEndpoint {
            url,
            source: EndpointSource::Configured,
        };
        self.publish(&resolved);
        resolved
    }

    fn publish(&self, resolved: &ResolvedEndpoint) {
        self.events.publish(SessionEvent::EndpointResolved {
            endpoint: resolved.url.to_string(),
            source: resolved.source.to_string(),
        });
    }

    async fn fetch_page(&self, page_url: &Url) -> Option<String> {
        debug!("Fetching player page {}", page_url);
        let response = match self.client.get(page_url.clone()).send().await {
            Ok(response) => response,
            Err(e) => {
                warn!("Failed to load page {}: {}", page_url, e);
                return None;
            }
        };

        if response.status() != StatusCode::OK {
            warn!(
                "Failed to load page {}: status {}",
                page_url,
                response.status()
            );
            return None;
        }

        match response.text().await {
            Ok(body) => Some(body),
            Err(e) => {
                warn!("Failed to read page {}: {}", page_url, e);
                None
            }
        }
    }
}

/// Scan page text for the endpoint
///
/// Relative matches are joined onto the page origin.
pub fn extract_endpoint(html: &str, page_url: &Url) -> Option<Url> {
    let candidate = ENDPOINT_PATTERNS
        .iter()
        .find_map(|re| re.captures(html).and_then(|c| c.get(1)))?
        .as_str();

    debug!("Endpoint candidate in page: {}", candidate);

    if candidate.starts_with("http://") || candidate.starts_with("https://") {
        return match Url::parse(candidate) {
            Ok(url) => Some(url),
            Err(e) => {
                warn!("Ignoring malformed endpoint '{}': {}", candidate, e);
                None
            }
        };
    }

    match origin(page_url).join(candidate) {
        Ok(url) => Some(url),
        Err(e) => {
            warn!("Cannot join endpoint '{}' onto {}: {}", candidate, page_url, e);
            None
        }
    }
}

/// Conventional endpoint for a page
///
/// `<origin>/rtc/v1/play/`, or the SRS API port on the same host when the
/// page URL carries an explicit port.
pub fn fallback_endpoint(page_url: &Url, page_text: &str) -> Url {
    let mut url = origin(page_url);
    url.set_path(PLAY_API_PATH);
    let explicit_port = page_url.port().is_some() || has_explicit_port(page_text);
    if explicit_port && url.set_port(Some(SRS_API_PORT)).is_err() {
        warn!("Cannot set API port on {}", url);
    }
    url
}

/// `true` when the authority of a URL string names a port, default or not
fn has_explicit_port(page_text: &str) -> bool {
    let text = page_text.trim();
    let rest = text.split_once("://").map_or(text, |(_, rest)| rest);
    let authority = rest.split(['/', '?', '#']).next().unwrap_or_default();
    let host_port = authority.rsplit_once('@').map_or(authority, |(_, host)| host);
    // IPv6 literals carry colons inside the brackets
    let after_host = match host_port.rfind(']') {
        Some(end) => &host_port[end + 1..],
        None => host_port,
    };
    after_host.contains(':')
}

/// `true` when the URL already points at the play API
pub fn looks_like_endpoint(url: &Url) -> bool {
    url.path().contains("/rtc/v1/")
}

/// `scheme://host[:port]/`
fn origin(url: &Url) -> Url {
    let mut origin = url.clone();
    origin.set_path("/");
    origin.set_query(None);
    origin.set_fragment(None);
    let _ = origin.set_username("");
    let _ = origin.set_password(None);
    origin
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::spawn_server;
    use axum::http::StatusCode as HttpStatus;
    use axum::routing::get;
    use axum::Router;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn test_var_url_pattern_wins() {
        let html = r#"
            <script>
              api_server = "https://other.example.com/api";
              var opts = { url: "/ignored" };
              var url = "https://srs.example.com:1985/rtc/v1/play/";
            </script>"#;
        let found = extract_endpoint(html, &url("https://srs.example.com/player")).unwrap();
        assert_eq!(found.as_str(), "https://srs.example.com:1985/rtc/v1/play/");
    }

    #[test]
    fn test_object_url_with_other_scheme_is_kept() {
        let html = r#"sdk.play({ url: "wss://x/rtc" });"#;
        let found = extract_endpoint(html, &url("http://host:8080/index.html")).unwrap();
        assert_eq!(found.as_str(), "wss://x/rtc");
    }

    #[test]
    fn test_relative_match_joined_onto_origin() {
        let html = r#"var url = "/rtc/v1/play/";"#;
        let page = url("http://host:8080/players/rtc_player.html?stream=abc");
        let found = extract_endpoint(html, &page).unwrap();
        assert_eq!(found.as_str(), "http://host:8080/rtc/v1/play/");
    }

    #[test]
    fn test_api_server_and_quoted_path_patterns() {
        let html = r#"api_server = "https://api.example.com/rtc/v1/play/";"#;
        let found = extract_endpoint(html, &url("https://www.example.com/")).unwrap();
        assert_eq!(found.as_str(), "https://api.example.com/rtc/v1/play/");

        let html = "fetch('/rtc/v1/play/?x=1', opts)";
        let found = extract_endpoint(html, &url("https://www.example.com/a/b")).unwrap();
        assert_eq!(found.as_str(), "https://www.example.com/rtc/v1/play/?x=1");
    }

    #[test]
    fn test_no_match() {
        assert!(extract_endpoint("<html>nothing here</html>", &url("http://h/")).is_none());
    }

    #[test]
    fn test_fallback_with_explicit_port_uses_api_port() {
        let text = "http://host:8080/players/srs_player.html?stream=x";
        assert_eq!(
            fallback_endpoint(&url(text), text).as_str(),
            "http://host:1985/rtc/v1/play/"
        );
    }

    #[test]
    fn test_fallback_without_port_uses_origin() {
        let text = "https://live.example.com/players/srs_player.html";
        assert_eq!(
            fallback_endpoint(&url(text), text).as_str(),
            "https://live.example.com/rtc/v1/play/"
        );
    }

    #[test]
    fn test_fallback_with_written_default_port_uses_api_port() {
        let text = "http://host:80/players/srs_player.html";
        assert_eq!(
            fallback_endpoint(&url(text), text).as_str(),
            "http://host:1985/rtc/v1/play/"
        );

        let text = "https://user@live.example.com:443/players/srs_player.html";
        assert_eq!(
            fallback_endpoint(&url(text), text).as_str(),
            "https://live.example.com:1985/rtc/v1/play/"
        );
    }

    #[test]
    fn test_explicit_port_detection() {
        assert!(has_explicit_port("http://host:80/a"));
        assert!(has_explicit_port("http://[::1]:8080/"));
        assert!(!has_explicit_port("http://[::1]/a:b"));
        assert!(!has_explicit_port("https://host/path?x=a:b#c:d"));
        assert!(!has_explicit_port("http://user:pw@host/"));
    }

    #[test]
    fn test_looks_like_endpoint() {
        assert!(looks_like_endpoint(&url("http://h:1985/rtc/v1/play/")));
        assert!(!looks_like_endpoint(&url("http://h/players/rtc_player.html")));
    }

    #[tokio::test]
    async fn test_resolve_from_served_page() {
        let app = Router::new().route(
            "/player.html",
            get(|| async { r#"<script>var url = "/rtc/v1/play/";</script>"# }),
        );
        let addr = spawn_server(app).await;
        let page = url(&format!("http://{}/player.html", addr));

        let events = Arc::new(EventBus::new());
        let mut rx = events.subscribe();
        let resolver = EndpointResolver::new(reqwest::Client::new(), events);
        let resolved = resolver.resolve(&page, page.as_str()).await;

        assert_eq!(resolved.source, EndpointSource::Page);
        assert_eq!(
            resolved.url.as_str(),
            format!("http://{}/rtc/v1/play/", addr)
        );
        assert!(matches!(
            rx.recv().await.unwrap(),
            SessionEvent::EndpointResolved { .. }
        ));
    }

    #[tokio::test]
    async fn test_resolve_falls_back_on_error_status() {
        let app = Router::new().route(
            "/player.html",
            get(|| async { (HttpStatus::NOT_FOUND, "gone") }),
        );
        let addr = spawn_server(app).await;
        let page = url(&format!("http://{}/player.html", addr));

        let resolver = EndpointResolver::new(reqwest::Client::new(), Arc::new(EventBus::new()));
        let resolved = resolver.resolve(&page, page.as_str()).await;

        assert_eq!(resolved.source, EndpointSource::Fallback);
        assert_eq!(resolved.url.as_str(), "http://127.0.0.1:1985/rtc/v1/play/");
    }

    #[tokio::test]
    async fn test_resolve_falls_back_when_unreachable() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let page = url(&format!("http://{}/player.html", addr));
        let resolver = EndpointResolver::new(reqwest::Client::new(), Arc::new(EventBus::new()));
        let resolved = resolver.resolve(&page, page.as_str()).await;

        assert_eq!(resolved.source, EndpointSource::Fallback);
        assert_eq!(resolved.url.port(), Some(SRS_API_PORT));
    }
}
