//! Shared HTTP request state for the strategies.
//!
//! Each strategy attempt builds a [`Session`] carrying the headers, query
//! parameters and cookies the platform expects. Cookies set by responses are
//! folded back into the session so multi-request strategies keep their
//! server-assigned identity.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Method, RequestBuilder};
use rustc_hash::FxHashMap;
use rustls::{ClientConfig, crypto::ring};
use rustls_platform_verifier::BuilderVerifierExt;
use tracing::debug;

pub const DEFAULT_UA: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/126.0.0.0 Safari/537.36";
pub const DEFAULT_MOBILE_UA: &str = "Mozilla/5.0 (iPhone; CPU iPhone OS 17_6_1 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.6.1 Mobile/15E148 Safari/604.1";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct Session {
    pub client: Client,
    headers: HeaderMap,
    pub params: FxHashMap<String, String>,
    pub cookies: FxHashMap<String, String>,
}

impl Session {
    pub fn new(client: Client) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(reqwest::header::USER_AGENT, DEFAULT_UA.parse().unwrap());
        headers.insert(
            reqwest::header::ACCEPT,
            "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8"
                .parse()
                .unwrap(),
        );
        headers.insert(
            reqwest::header::ACCEPT_LANGUAGE,
            "zh-CN,zh;q=0.8,en-US;q=0.5,en;q=0.3".parse().unwrap(),
        );

        Self {
            client,
            headers,
            params: FxHashMap::default(),
            cookies: FxHashMap::default(),
        }
    }

    pub fn add_header<K: Into<String>, V: Into<String>>(&mut self, key: K, value: V) {
        let key = key.into();
        let value = value.into();
        match (HeaderName::from_str(&key), HeaderValue::from_str(&value)) {
            (Ok(name), Ok(value)) => {
                self.headers.insert(name, value);
            }
            _ => debug!(header = %key, "skipping invalid header"),
        }
    }

    pub fn add_param<K: Into<String>, V: Into<String>>(&mut self, key: K, value: V) {
        self.params.insert(key.into(), value.into());
    }

    pub fn add_cookie<N: Into<String>, V: Into<String>>(&mut self, name: N, value: V) {
        self.cookies.insert(name.into(), value.into());
    }

    pub fn cookie(&self, name: &str) -> Option<&String> {
        self.cookies.get(name)
    }

    /// Imports cookies from a `name1=value1; name2=value2` header string.
    pub fn set_cookies_from_string(&mut self, cookie_string: &str) {
        for cookie in cookie_string.split(';') {
            let cookie = cookie.trim();
            if let Some((name, value)) = cookie.split_once('=') {
                self.cookies
                    .insert(name.trim().to_string(), value.trim().to_string());
            }
        }
    }

    /// Imports cookies from Netscape `cookies.txt` content (browser exports).
    pub fn set_cookies_from_netscape(&mut self, content: &str) {
        for (name, value) in parse_netscape_cookies(content) {
            self.cookies.insert(name, value);
        }
    }

    /// Stores cookies from `set-cookie` response headers.
    pub fn store_response_cookies(&mut self, headers: &HeaderMap) {
        for value in headers.get_all("set-cookie").iter() {
            if let Ok(cookie_str) = value.to_str() {
                if let Some(cookie_part) = cookie_str.split(';').next() {
                    if let Some((name, value)) = cookie_part.split_once('=') {
                        self.cookies
                            .insert(name.trim().to_string(), value.trim().to_string());
                    }
                }
            }
        }
    }

    fn build_cookie_header(&self) -> Option<String> {
        if self.cookies.is_empty() {
            return None;
        }

        let cookie_string = self
            .cookies
            .iter()
            .map(|(name, value)| format!("{name}={value}"))
            .collect::<Vec<_>>()
            .join("; ");

        Some(cookie_string)
    }

    pub fn get(&self, url: &str) -> RequestBuilder {
        self.request(Method::GET, url)
    }

    /// Builds a request carrying the session headers, cookie jar and query
    /// parameters.
    pub fn request(&self, method: Method, url: &str) -> RequestBuilder {
        let mut builder = self
            .client
            .request(method, url)
            .headers(self.headers.clone())
            .query(&self.params);

        if let Some(header) = self.build_cookie_header() {
            if let Ok(value) = HeaderValue::from_str(&header) {
                builder = builder.header(reqwest::header::COOKIE, value);
            }
        }

        builder
    }
}

/// Parses Netscape `cookies.txt` content into name/value pairs. Lines are
/// TAB-separated with name and value in the last two fields;
/// `#HttpOnly_`-prefixed entries are honored, other comments skipped.
pub fn parse_netscape_cookies(content: &str) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    for line in content.lines() {
        let line = line.strip_prefix("#HttpOnly_").unwrap_or(line).trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() == 7 {
            pairs.push((fields[5].to_string(), fields[6].to_string()));
        }
    }
    pairs
}

/// Client with the default redirect policy (10 hops).
pub fn default_client() -> Client {
    build_client(None, true)
}

/// Client routed through `proxy` (URL with inline credentials) when given.
pub fn create_client(proxy: Option<&str>) -> Client {
    build_client(proxy, true)
}

/// Client that surfaces redirects instead of following them, used when the
/// `Location` chain itself is the payload.
pub fn no_redirect_client() -> Client {
    build_client(None, false)
}

fn build_client(proxy: Option<&str>, follow_redirects: bool) -> Client {
    let provider = Arc::new(ring::default_provider());
    let tls_config = ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .expect("Failed to configure default TLS protocol versions")
        .with_platform_verifier()
        .unwrap()
        .with_no_client_auth();

    let mut builder = Client::builder()
        .use_preconfigured_tls(tls_config)
        .timeout(REQUEST_TIMEOUT)
        .redirect(if follow_redirects {
            reqwest::redirect::Policy::limited(10)
        } else {
            reqwest::redirect::Policy::none()
        });

    if let Some(proxy_url) = proxy {
        match reqwest::Proxy::all(proxy_url) {
            Ok(proxy) => builder = builder.proxy(proxy),
            Err(e) => debug!("ignoring unusable proxy {proxy_url}: {e}"),
        }
    }

    builder.build().expect("Failed to create HTTP client")
}
