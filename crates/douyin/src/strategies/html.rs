//! Plain-HTTP strategy. Fetches the content page and digs the record out of
//! whichever embedded state blob the server rendered: RENDER_DATA (percent
//! encoded), `window._SSR_DATA`, SIGI_STATE, JSON-LD, and finally the `og:`
//! meta tags.

use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use scraper::{Html, Selector};
use serde_json::Value;
use tracing::debug;

use crate::{
    error::ParseError,
    record::{VideoRecord, strip_watermark},
    resolver::ResolvedTarget,
    session::{Session, create_client, default_client},
    strategy::{ParseContext, ParseStrategy, StrategyKind},
};

static RENDER_DATA_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<script id="RENDER_DATA" type="application/json">([^<]+)</script>"#).unwrap()
});

static SSR_DATA_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)window\._SSR_DATA\s*=\s*(\{.*?\})\s*;?\s*</script>").unwrap());

static SIGI_STATE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)<script id="SIGI_STATE"[^>]*>(.*?)</script>"#).unwrap()
});

pub struct HtmlStrategy {
    client: Client,
}

impl Default for HtmlStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl HtmlStrategy {
    pub fn new() -> Self {
        Self::with_client(default_client())
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ParseStrategy for HtmlStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Html
    }

    async fn parse(
        &self,
        target: &ResolvedTarget,
        cx: &ParseContext,
    ) -> Result<VideoRecord, ParseError> {
        let client = match cx.proxy.as_deref() {
            Some(proxy) => create_client(Some(proxy)),
            None => self.client.clone(),
        };

        let mut session = Session::new(client);
        if let Some(ua) = cx.user_agent.as_deref() {
            session.add_header(reqwest::header::USER_AGENT.as_str().to_owned(), ua);
        }
        if let Some(cookies) = cx.cookies.as_deref() {
            session.set_cookies_from_string(cookies);
        }

        let response = session.get(&target.url).send().await?.error_for_status()?;
        let body = response.text().await?;

        extract_record_from_html(&body, &target.aweme_id, StrategyKind::Html)
    }
}

/// Runs the extraction ladder over raw page HTML. Shared with the browser
/// strategy's DOM fallback.
pub(crate) fn extract_record_from_html(
    html: &str,
    aweme_id: &str,
    source: StrategyKind,
) -> Result<VideoRecord, ParseError> {
    if let Some(record) = from_render_data(html, aweme_id, source) {
        return Ok(record);
    }
    if let Some(record) = from_ssr_data(html, aweme_id, source) {
        return Ok(record);
    }
    if let Some(record) = from_sigi_state(html, aweme_id, source) {
        return Ok(record);
    }
    if let Some(record) = from_json_ld(html, aweme_id, source) {
        return Ok(record);
    }
    if let Some(record) = from_og_meta(html, aweme_id, source) {
        return Ok(record);
    }

    Err(ParseError::ValidationError(
        "no embedded state found in page, cookies may be required".to_string(),
    ))
}

fn from_render_data(html: &str, aweme_id: &str, source: StrategyKind) -> Option<VideoRecord> {
    let encoded = RENDER_DATA_REGEX.captures(html)?.get(1)?.as_str();
    let decoded = urlencoding::decode(encoded).ok()?;
    let root: Value = serde_json::from_str(&decoded).ok()?;
    let detail = find_detail(&root, aweme_id)?;
    debug!("record extracted from RENDER_DATA");
    Some(record_from_value(detail, aweme_id, source))
}

fn from_ssr_data(html: &str, aweme_id: &str, source: StrategyKind) -> Option<VideoRecord> {
    let blob = SSR_DATA_REGEX.captures(html)?.get(1)?.as_str();
    let root: Value = serde_json::from_str(blob).ok()?;
    let detail = find_detail(&root, aweme_id)?;
    debug!("record extracted from _SSR_DATA");
    Some(record_from_value(detail, aweme_id, source))
}

fn from_sigi_state(html: &str, aweme_id: &str, source: StrategyKind) -> Option<VideoRecord> {
    let blob = SIGI_STATE_REGEX.captures(html)?.get(1)?.as_str();
    let root: Value = serde_json::from_str(blob).ok()?;
    let item = root.get("ItemModule")?.get(aweme_id)?;
    debug!("record extracted from SIGI_STATE");
    Some(record_from_value(item, aweme_id, source))
}

fn from_json_ld(html: &str, aweme_id: &str, source: StrategyKind) -> Option<VideoRecord> {
    let document = Html::parse_document(html);
    let selector = Selector::parse(r#"script[type="application/ld+json"]"#).ok()?;

    for element in document.select(&selector) {
        let text: String = element.text().collect();
        let Ok(value) = serde_json::from_str::<Value>(&text) else {
            continue;
        };
        if !is_video_object(&value) {
            continue;
        }

        let mut record = VideoRecord::new(aweme_id, source);
        record.title = get_str(&value, &["name", "headline"]).unwrap_or_default();
        record.video_url = get_str(&value, &["contentUrl", "contentURL"])
            .map(|u| strip_watermark(&u));
        record.cover_url = match value.get("thumbnailUrl") {
            Some(Value::Array(urls)) => urls.first().and_then(Value::as_str).map(String::from),
            Some(Value::String(url)) => Some(url.clone()),
            _ => None,
        };
        if let Some(author) = value.get("author").or_else(|| value.get("creator")) {
            record.author.nickname = get_str(author, &["name"]).unwrap_or_default();
        }
        debug!("record extracted from JSON-LD");
        return Some(record);
    }
    None
}

fn from_og_meta(html: &str, aweme_id: &str, source: StrategyKind) -> Option<VideoRecord> {
    let document = Html::parse_document(html);
    let meta = |property: &str| -> Option<String> {
        let selector = Selector::parse(&format!(r#"meta[property="{property}"]"#)).ok()?;
        document
            .select(&selector)
            .next()
            .and_then(|el| el.value().attr("content"))
            .map(String::from)
    };

    let video_url = meta("og:video").or_else(|| meta("og:video:url"))?;

    let mut record = VideoRecord::new(aweme_id, source);
    record.title = meta("og:title").unwrap_or_default();
    record.video_url = Some(strip_watermark(&video_url));
    record.cover_url = meta("og:image");
    // author is not part of the og vocabulary; the page sometimes carries it
    // as a plain meta name
    if let Ok(selector) = Selector::parse(r#"meta[name="author"]"#) {
        if let Some(content) = document
            .select(&selector)
            .next()
            .and_then(|el| el.value().attr("content"))
        {
            record.author.nickname = content.to_string();
        }
    }
    debug!("record extracted from og: meta tags");
    Some(record)
}

fn is_video_object(value: &Value) -> bool {
    match value.get("@type") {
        Some(Value::String(t)) => t == "VideoObject",
        Some(Value::Array(types)) => types.iter().any(|t| t.as_str() == Some("VideoObject")),
        _ => false,
    }
}

/// Depth-first search for the detail object of the right post. The state
/// trees nest it at version-dependent paths, so key probing beats fixed
/// paths here.
fn find_detail<'a>(value: &'a Value, aweme_id: &str) -> Option<&'a Value> {
    match value {
        Value::Object(map) => {
            let id_matches = ["awemeId", "aweme_id", "awemeID"]
                .iter()
                .filter_map(|key| map.get(*key))
                .filter_map(value_as_id)
                .any(|id| id == aweme_id);
            if id_matches
                && (map.contains_key("video")
                    || map.contains_key("images")
                    || map.contains_key("author")
                    || map.contains_key("authorInfo"))
            {
                return Some(value);
            }
            map.values().find_map(|v| find_detail(v, aweme_id))
        }
        Value::Array(items) => items.iter().find_map(|v| find_detail(v, aweme_id)),
        _ => None,
    }
}

fn value_as_id(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Builds a record out of a detail object that may use either camelCase
/// (RENDER_DATA) or snake_case (SIGI/API-shaped) keys.
fn record_from_value(detail: &Value, aweme_id: &str, source: StrategyKind) -> VideoRecord {
    let mut record = VideoRecord::new(aweme_id, source);

    record.title = get_str(detail, &["desc", "description"]).unwrap_or_default();

    // SIGI-style blobs keep `author` as a bare name string next to the full
    // `authorInfo` object, so the object form is probed first
    match get(detail, &["authorInfo", "author"]) {
        Some(Value::String(name)) => record.author.nickname = name.clone(),
        Some(author) => {
            record.author.nickname =
                get_str(author, &["nickname", "nickName"]).unwrap_or_default();
            record.author.uid = get_str(author, &["uid", "authorId", "id"]).unwrap_or_default();
            record.author.sec_uid = get_str(author, &["secUid", "sec_uid"]).unwrap_or_default();
            record.author.avatar_url = get(author, &["avatarThumb", "avatar_thumb"])
                .and_then(first_url)
                .or_else(|| get_str(author, &["avatarUrl", "avatar_url"]));
        }
        None => {}
    }

    if let Some(video) = detail.get("video") {
        record.video_url = get(video, &["playAddr", "play_addr"])
            .and_then(first_url)
            .or_else(|| get_str(video, &["playApi", "play_api"]))
            .or_else(|| {
                // some blobs only ship the vod uri
                get_str(video, &["uri"]).map(|uri| play_url_from_uri(&uri))
            })
            .map(|u| normalize_scheme(&strip_watermark(&u)));
        record.cover_url = get(video, &["originCover", "origin_cover", "cover", "dynamicCover"])
            .and_then(first_url)
            .or_else(|| get_str(video, &["cover"]))
            .map(|u| normalize_scheme(&u));
        record.duration_ms = get(video, &["duration"])
            .and_then(Value::as_u64)
            .unwrap_or(0);
    }

    if let Some(images) = detail.get("images").and_then(Value::as_array) {
        record.images = images
            .iter()
            .filter_map(first_url)
            .map(|u| normalize_scheme(&u))
            .collect();
    }

    if let Some(music) = detail.get("music") {
        record.music_url = get(music, &["playUrl", "play_url"])
            .and_then(first_url)
            .map(|u| normalize_scheme(&u));
    }

    if let Some(stats) = get(detail, &["stats", "statistics"]) {
        record.stats.digg_count = get_u64(stats, &["diggCount", "digg_count"]);
        record.stats.comment_count = get_u64(stats, &["commentCount", "comment_count"]);
        record.stats.collect_count = get_u64(stats, &["collectCount", "collect_count"]);
        record.stats.share_count = get_u64(stats, &["shareCount", "share_count"]);
    }

    record
}

fn get<'a>(value: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().find_map(|key| value.get(key))
}

fn get_str(value: &Value, keys: &[&str]) -> Option<String> {
    get(value, keys).and_then(|v| match v {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        _ => None,
    })
}

fn get_u64(value: &Value, keys: &[&str]) -> u64 {
    get(value, keys)
        .and_then(|v| match v {
            Value::Number(n) => n.as_u64(),
            Value::String(s) => s.parse().ok(),
            _ => None,
        })
        .unwrap_or(0)
}

/// A url holder is either a bare string, `{ urlList: [...] }`, or
/// `{ url_list: [...] }`.
fn first_url(holder: &Value) -> Option<String> {
    match holder {
        Value::String(url) if !url.is_empty() => Some(url.clone()),
        Value::Object(_) => get(holder, &["urlList", "url_list"])
            .and_then(Value::as_array)
            .and_then(|urls| {
                urls.iter()
                    .filter_map(Value::as_str)
                    .find(|u| !u.is_empty())
                    .map(String::from)
            }),
        _ => None,
    }
}

fn play_url_from_uri(uri: &str) -> String {
    format!("https://aweme.snssdk.com/aweme/v1/play/?video_id={uri}&ratio=720p&line=0")
}

/// Embedded blobs sometimes carry scheme-relative or http URLs.
fn normalize_scheme(url: &str) -> String {
    if let Some(rest) = url.strip_prefix("//") {
        format!("https://{rest}")
    } else {
        url.to_string()
    }
}
