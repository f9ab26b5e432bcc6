//! Turns whatever the user pastes (share text, short link, long link, bare
//! numeric ID) into a canonical target for the strategies.

use std::sync::LazyLock;

use regex::Regex;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use crate::{
    apis::{BASE_URL, SHORT_LINK_HOSTS},
    error::ParseError,
    session::{DEFAULT_MOBILE_UA, no_redirect_client},
};

const MAX_REDIRECTS: usize = 10;

static SHARE_URL_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"https?://[^\s]+").unwrap());

/// Probes ordered from most to least specific; the bare digit run comes last
/// so it never shadows a structured form.
static AWEME_ID_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"/video/(\d+)",
        r"/note/(\d+)",
        r"/share/video/(\d+)",
        r"[?&]modal_id=(\d+)",
        r"[?&]aweme_id=(\d+)",
        r"/(\d{15,20})(?:[/?#]|$)",
    ]
    .iter()
    .map(|pattern| Regex::new(pattern).unwrap())
    .collect()
});

/// Canonicalized parse target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedTarget {
    pub aweme_id: String,
    /// Canonical long-form page URL, rebuilt from the ID.
    pub url: String,
    /// The raw user input, kept for cache keying and reporting.
    pub input: String,
}

impl ResolvedTarget {
    pub fn from_id(aweme_id: impl Into<String>, input: impl Into<String>) -> Self {
        let aweme_id = aweme_id.into();
        let url = canonical_url(&aweme_id);
        Self {
            aweme_id,
            url,
            input: input.into(),
        }
    }
}

pub fn canonical_url(aweme_id: &str) -> String {
    format!("{BASE_URL}/video/{aweme_id}")
}

/// First URL embedded in pasted share text, if any.
pub fn extract_share_url(text: &str) -> Option<&str> {
    SHARE_URL_REGEX.find(text).map(|m| m.as_str())
}

/// Pulls the aweme id out of any known URL shape.
pub fn extract_aweme_id(url: &str) -> Option<String> {
    AWEME_ID_PATTERNS.iter().find_map(|pattern| {
        pattern
            .captures(url)
            .and_then(|captures| captures.get(1))
            .map(|m| m.as_str().to_string())
    })
}

fn is_short_link(url: &str) -> bool {
    Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(|h| SHORT_LINK_HOSTS.contains(&h)))
        .unwrap_or(false)
}

fn looks_like_bare_id(input: &str) -> bool {
    (15..=20).contains(&input.len()) && input.bytes().all(|b| b.is_ascii_digit())
}

pub struct Resolver {
    client: Client,
}

impl Default for Resolver {
    fn default() -> Self {
        Self::new()
    }
}

impl Resolver {
    pub fn new() -> Self {
        Self {
            client: no_redirect_client(),
        }
    }

    /// Resolves user input to a target. Network I/O happens only for short
    /// links and URLs that carry no recognizable ID.
    pub async fn resolve(&self, input: &str) -> Result<ResolvedTarget, ParseError> {
        let trimmed = input.trim();

        if looks_like_bare_id(trimmed) {
            return Ok(ResolvedTarget::from_id(trimmed, input));
        }

        let url = extract_share_url(trimmed)
            .ok_or_else(|| ParseError::NoUrlFound(trimmed.to_string()))?;

        if let Some(aweme_id) = extract_aweme_id(url) {
            return Ok(ResolvedTarget::from_id(aweme_id, input));
        }

        // the redirect walk needs a parseable base
        if Url::parse(url).is_err() {
            return Err(ParseError::InvalidUrl(url.to_string()));
        }

        if is_short_link(url) {
            debug!(url = %url, "expanding short link");
        }

        let final_url = self.follow_redirects(url).await?;
        let aweme_id = extract_aweme_id(&final_url)
            .ok_or_else(|| ParseError::AwemeIdNotFound(final_url.clone()))?;

        Ok(ResolvedTarget::from_id(aweme_id, input))
    }

    /// Walks the `Location` chain by hand, stopping as soon as a hop carries
    /// an ID or the chain ends.
    async fn follow_redirects(&self, url: &str) -> Result<String, ParseError> {
        let mut current = url.to_string();

        for _ in 0..MAX_REDIRECTS {
            if extract_aweme_id(&current).is_some() {
                return Ok(current);
            }

            let response = self
                .client
                .get(&current)
                .header(reqwest::header::USER_AGENT, DEFAULT_MOBILE_UA)
                .send()
                .await?;

            if !response.status().is_redirection() {
                break;
            }

            let Some(location) = response
                .headers()
                .get(reqwest::header::LOCATION)
                .and_then(|value| value.to_str().ok())
            else {
                break;
            };

            current = match Url::parse(&current).and_then(|base| base.join(location)) {
                Ok(joined) => joined.to_string(),
                Err(_) => location.to_string(),
            };
            debug!(next = %current, "redirect hop");
        }

        Ok(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const ID: &str = "7345678901234567890";

    #[test]
    fn extracts_id_from_known_url_shapes() {
        let cases = [
            format!("https://www.douyin.com/video/{ID}"),
            format!("https://www.douyin.com/note/{ID}?from=share"),
            format!("https://www.iesdouyin.com/share/video/{ID}/?region=CN"),
            format!("https://www.douyin.com/discover?modal_id={ID}"),
            format!("https://www.douyin.com/detail?aweme_id={ID}&x=1"),
            format!("https://www.douyin.com/{ID}"),
        ];
        for case in &cases {
            assert_eq!(extract_aweme_id(case).as_deref(), Some(ID), "case: {case}");
        }
    }

    #[test]
    fn short_digit_runs_are_not_ids() {
        assert_eq!(extract_aweme_id("https://www.douyin.com/12345"), None);
        assert_eq!(extract_aweme_id("https://v.douyin.com/iJcnxsA/"), None);
    }

    #[test]
    fn finds_url_in_share_text() {
        let text = "8.61 复制打开抖音，看看作品 https://v.douyin.com/iJcnxsA/ 来抖音记录美好生活~";
        assert_eq!(extract_share_url(text), Some("https://v.douyin.com/iJcnxsA/"));
        assert_eq!(extract_share_url("没有链接的文本"), None);
    }

    #[test]
    fn recognizes_short_link_hosts() {
        assert!(is_short_link("https://v.douyin.com/iJcnxsA/"));
        assert!(!is_short_link("https://www.douyin.com/video/1"));
        assert!(!is_short_link("not a url"));
    }

    #[tokio::test]
    async fn resolves_long_link_without_network() {
        let resolver = Resolver::new();
        let target = resolver
            .resolve(&format!("https://www.douyin.com/video/{ID}"))
            .await
            .unwrap();
        assert_eq!(target.aweme_id, ID);
        assert_eq!(target.url, format!("https://www.douyin.com/video/{ID}"));
    }

    #[tokio::test]
    async fn resolves_bare_id() {
        let resolver = Resolver::new();
        let target = resolver.resolve(&format!("  {ID} ")).await.unwrap();
        assert_eq!(target.aweme_id, ID);
    }

    #[tokio::test]
    async fn rejects_input_without_url() {
        let resolver = Resolver::new();
        let err = resolver.resolve("随便写点什么").await.unwrap_err();
        assert!(matches!(err, ParseError::NoUrlFound(_)));
    }

    #[tokio::test]
    async fn rejects_unparseable_url() {
        let resolver = Resolver::new();
        let err = resolver.resolve("看看 https://[ 这个").await.unwrap_err();
        assert!(matches!(err, ParseError::InvalidUrl(_)));
    }

    #[tokio::test]
    async fn follows_redirect_chain_to_id() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/iJcnxsA"))
            .respond_with(
                ResponseTemplate::new(302).insert_header("location", "/hop"),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/hop"))
            .respond_with(
                ResponseTemplate::new(302)
                    .insert_header("location", format!("/video/{ID}?from=share").as_str()),
            )
            .mount(&server)
            .await;

        let resolver = Resolver::new();
        let target = resolver
            .resolve(&format!("看看作品 {}/iJcnxsA 复制此链接", server.uri()))
            .await
            .unwrap();
        assert_eq!(target.aweme_id, ID);
        // canonical url is rebuilt, not passed through
        assert_eq!(target.url, canonical_url(ID));
    }

    #[tokio::test]
    async fn dead_end_redirect_reports_missing_id() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/nowhere"))
            .respond_with(ResponseTemplate::new(200).set_body_string("plain page"))
            .mount(&server)
            .await;

        let resolver = Resolver::new();
        let err = resolver
            .resolve(&format!("{}/nowhere", server.uri()))
            .await
            .unwrap_err();
        assert!(matches!(err, ParseError::AwemeIdNotFound(_)));
    }
}
