//! Feed downloader with SSRF protection, size limits and proxy fallback.

use std::net::IpAddr;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::Deserialize;
use tracing::debug;

use crate::config::FetchConfig;
use crate::{FeedError, Result};

/// User agent string for feed fetching.
const USER_AGENT: &str = "feedsum/0.1 (feed reader)";

/// Downloads the raw document of a feed.
#[async_trait]
pub trait FeedFetcher: Send + Sync {
    /// Fetch the feed at `url` and return its body as text.
    ///
    /// Any failure is reported as [`FeedError::Fetch`].
    async fn fetch(&self, url: &str) -> Result<String>;
}

/// Body shape returned by the fallback proxy.
#[derive(Debug, Deserialize)]
struct ProxyResponse {
    contents: Option<String>,
}

/// HTTP feed fetcher.
///
/// Tries the feed URL directly first. When that fails and a proxy is
/// configured, the proxy is asked for the same URL.
pub struct HttpFeedFetcher {
    client: Client,
    max_feed_size: u64,
    block_private_hosts: bool,
    proxy_url: Option<String>,
}

impl HttpFeedFetcher {
    /// Create a fetcher from configuration.
    pub fn new(config: &FetchConfig) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .read_timeout(Duration::from_secs(config.read_timeout_secs))
            .timeout(Duration::from_secs(config.total_timeout_secs))
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| FeedError::Fetch(format!("failed to create HTTP client: {e}")))?;

        let proxy_url = Some(config.proxy_url.trim().to_string()).filter(|p| !p.is_empty());

        Ok(Self {
            client,
            max_feed_size: config.max_feed_size_bytes,
            block_private_hosts: config.block_private_hosts,
            proxy_url,
        })
    }

    async fn fetch_direct(&self, url: &str) -> Result<String> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FeedError::Fetch(format!("failed to fetch feed: {e}")))?;
        let bytes = self.read_body(response).await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    async fn fetch_via_proxy(&self, template: &str, url: &str) -> Result<String> {
        let proxied = proxy_request_url(template, url);
        let response = self
            .client
            .get(&proxied)
            .send()
            .await
            .map_err(|e| FeedError::Fetch(format!("proxy request failed: {e}")))?;
        let bytes = self.read_body(response).await?;
        let body: ProxyResponse = serde_json::from_slice(&bytes)
            .map_err(|e| FeedError::Fetch(format!("invalid proxy response: {e}")))?;
        body.contents
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| FeedError::Fetch("proxy returned no contents".to_string()))
    }

    /// Check status and size limits, then read the body.
    async fn read_body(&self, response: Response) -> Result<Vec<u8>> {
        if !response.status().is_success() {
            return Err(FeedError::Fetch(format!("HTTP error: {}", response.status())));
        }

        if let Some(content_length) = response.content_length() {
            if content_length > self.max_feed_size {
                return Err(too_large(content_length, self.max_feed_size));
            }
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| FeedError::Fetch(format!("failed to read response: {e}")))?;

        if bytes.len() as u64 > self.max_feed_size {
            return Err(too_large(bytes.len() as u64, self.max_feed_size));
        }

        Ok(bytes.to_vec())
    }
}

#[async_trait]
impl FeedFetcher for HttpFeedFetcher {
    async fn fetch(&self, url: &str) -> Result<String> {
        if self.block_private_hosts {
            validate_url(url)?;
        }

        let direct_err = match self.fetch_direct(url).await {
            Ok(body) => return Ok(body),
            Err(e) => e,
        };

        let Some(template) = self.proxy_url.as_deref() else {
            return Err(direct_err);
        };

        debug!("Direct fetch of {} failed ({}), trying proxy", url, direct_err);
        match self.fetch_via_proxy(template, url).await {
            Ok(body) => Ok(body),
            Err(proxy_err) => {
                Err(FeedError::Fetch(format!(
                    "direct: {direct_err}; proxy: {proxy_err}"
                )))
            }
        }
    }
}

fn too_large(size: u64, max: u64) -> FeedError {
    FeedError::Fetch(format!("feed too large: {size} bytes (max {max} bytes)"))
}

/// Substitute the encoded feed URL into the proxy template.
///
/// Templates without a `{url}` placeholder get the encoded URL appended.
fn proxy_request_url(template: &str, url: &str) -> String {
    let encoded = urlencoding::encode(url);
    if template.contains("{url}") {
        template.replace("{url}", &encoded)
    } else {
        format!("{template}{encoded}")
    }
}

/// Validate a URL for SSRF protection.
///
/// This function checks that:
/// - The URL uses http or https scheme
/// - The host is not a private/loopback address
/// - The host is not a reserved hostname
pub fn validate_url(url: &str) -> Result<()> {
    let parsed =
        url::Url::parse(url).map_err(|e| FeedError::Fetch(format!("invalid URL: {e}")))?;

    match parsed.scheme() {
        "http" | "https" => {}
        scheme => {
            return Err(FeedError::Fetch(format!("unsupported URL scheme: {scheme}")));
        }
    }

    let host = parsed
        .host()
        .ok_or_else(|| FeedError::Fetch("URL has no host".to_string()))?;

    let ip = match host {
        url::Host::Domain(domain) => {
            if is_forbidden_hostname(domain) {
                return Err(FeedError::Fetch(format!("forbidden host: {domain}")));
            }
            return Ok(());
        }
        url::Host::Ipv4(v4) => IpAddr::V4(v4),
        url::Host::Ipv6(v6) => IpAddr::V6(v6),
    };

    if is_private_ip(&ip) {
        return Err(FeedError::Fetch(format!(
            "private IP address not allowed: {ip}"
        )));
    }
    Ok(())
}

/// Check if a hostname is forbidden.
fn is_forbidden_hostname(host: &str) -> bool {
    const FORBIDDEN_SUFFIXES: [&str; 7] = [
        ".local",
        ".localhost",
        ".internal",
        ".intranet",
        ".corp",
        ".home",
        ".lan",
    ];

    let host = host.to_lowercase();
    host == "localhost" || FORBIDDEN_SUFFIXES.iter().any(|s| host.ends_with(s))
}

/// Check if an IP address is private/reserved.
fn is_private_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            v4.is_loopback()
                || v4.is_private()
                || v4.is_link_local()
                || v4.is_broadcast()
                || v4.is_unspecified()
                || v4.is_documentation()
        }
        IpAddr::V6(v6) => {
            let first = v6.segments()[0];
            v6.is_loopback()
                || v6.is_unspecified()
                // Unique local fc00::/7
                || (first & 0xfe00) == 0xfc00
                // Link-local fe80::/10
                || (first & 0xffc0) == 0xfe80
        }
    }
}
