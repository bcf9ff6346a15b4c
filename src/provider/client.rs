use crate::error::{BrokerError, Result};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Proxy, Url};
use std::time::Duration;

const PROXY_SCHEMES: &[&str] = &["http", "https", "socks5", "socks5h"];

/// Settings shared by every client the factory builds.
#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub user_agent: String,
    pub connect_timeout: Option<Duration>,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            user_agent: concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"))
                .to_string(),
            connect_timeout: None,
        }
    }
}

/// HTTP client bound to one upstream endpoint and credential.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
}

impl ApiClient {
    /// Build a client. Performs no network I/O.
    pub fn build(
        opts: &ClientOptions,
        base_url: &str,
        api_key: &str,
        proxy: Option<&str>,
    ) -> Result<Self> {
        let mut builder = reqwest::Client::builder()
            .user_agent(opts.user_agent.as_str())
            .default_headers(headers(api_key)?);

        if let Some(timeout) = opts.connect_timeout {
            builder = builder.connect_timeout(timeout);
        }

        // An explicit proxy replaces environment proxy resolution entirely.
        if let Some(spec) = proxy.map(str::trim).filter(|s| !s.is_empty()) {
            builder = builder.no_proxy().proxy(parse_proxy(spec)?);
        }

        Ok(Self {
            http: builder.build()?,
            base_url: base_url.to_string(),
        })
    }

    /// Resolve `path` against the base URL the way a request would.
    pub fn url_for(&self, path: &str) -> Result<Url> {
        resolve_url(&self.base_url, path)
    }

    pub fn post(&self, path: &str) -> Result<reqwest::RequestBuilder> {
        Ok(self.http.post(self.url_for(path)?))
    }
}

fn headers(api_key: &str) -> Result<HeaderMap> {
    let mut h = HeaderMap::new();
    h.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    let mut auth = HeaderValue::from_str(&format!("Bearer {api_key}"))?;
    auth.set_sensitive(true);
    h.insert(AUTHORIZATION, auth);
    Ok(h)
}

/// Validate a proxy URL and turn it into a catch-all reqwest proxy.
pub fn parse_proxy(spec: &str) -> Result<Proxy> {
    let invalid = |reason: &str| BrokerError::InvalidProxy {
        spec: spec.to_string(),
        reason: reason.to_string(),
    };

    let url = Url::parse(spec).map_err(|e| invalid(&e.to_string()))?;
    if !PROXY_SCHEMES.contains(&url.scheme()) {
        return Err(invalid(&format!("unsupported scheme '{}'", url.scheme())));
    }
    if url.host_str().map_or(true, str::is_empty) {
        return Err(invalid("missing host"));
    }

    let mut proxy = Proxy::all(url.as_str()).map_err(|e| invalid(&e.to_string()))?;
    if !url.username().is_empty() {
        proxy = proxy.basic_auth(url.username(), url.password().unwrap_or(""));
    }
    Ok(proxy)
}

/// Join a base URL and a request path. An absolute `http(s)` path wins over the base.
pub fn resolve_url(base_url: &str, path: &str) -> Result<Url> {
    if let Ok(abs) = Url::parse(path) {
        if matches!(abs.scheme(), "http" | "https") {
            return Ok(abs);
        }
    }

    let joined = if path.is_empty() {
        base_url.to_string()
    } else {
        format!(
            "{}/{}",
            base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    };

    Url::parse(&joined).map_err(|e| BrokerError::InvalidUrl {
        url: joined.clone(),
        reason: e.to_string(),
    })
}
