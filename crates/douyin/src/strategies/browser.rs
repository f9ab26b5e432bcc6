//! Headless-browser strategy. Drives a real Chromium so the page signs its
//! own detail request, then lifts the record either off the wire (CDP network
//! events) or out of the rendered DOM.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::STANDARD};
use chromiumoxide::Page;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::network::{
    CookieParam, EventResponseReceived, GetResponseBodyParams,
};
use futures::StreamExt;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::{
    apis::WEB_DETAIL_PATH,
    error::ParseError,
    models::DetailResponse,
    record::VideoRecord,
    resolver::ResolvedTarget,
    session::DEFAULT_UA,
    strategies::html::extract_record_from_html,
    strategy::{ParseContext, ParseStrategy, StrategyKind},
};

const NAV_TIMEOUT: Duration = Duration::from_secs(20);
/// How long to keep listening for the page's own detail request after
/// navigation before falling back to the DOM.
const SNIFF_WINDOW: Duration = Duration::from_secs(6);

const BROWSER_ENV: &str = "AWEME_BROWSER";

pub struct BrowserStrategy {
    executable: Option<PathBuf>,
    slot: Mutex<Option<BrowserSlot>>,
}

struct BrowserSlot {
    browser: Browser,
    handler_task: JoinHandle<()>,
}

impl BrowserSlot {
    async fn shutdown(mut self) {
        self.browser.close().await.ok();
        self.browser.wait().await.ok();
    }
}

impl Drop for BrowserSlot {
    fn drop(&mut self) {
        self.handler_task.abort();
    }
}

impl Default for BrowserStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl BrowserStrategy {
    pub fn new() -> Self {
        Self {
            executable: None,
            slot: Mutex::new(None),
        }
    }

    /// Pin a specific browser binary instead of probing for one.
    pub fn with_executable(path: impl Into<PathBuf>) -> Self {
        Self {
            executable: Some(path.into()),
            slot: Mutex::new(None),
        }
    }

    async fn launch(
        &self,
        proxy: Option<&str>,
        user_agent: Option<&str>,
    ) -> Result<BrowserSlot, ParseError> {
        let executable = self
            .executable
            .clone()
            .or_else(find_browser)
            .ok_or(ParseError::BrowserUnavailable)?;

        debug!(executable = %executable.display(), "launching browser");

        let ua = user_agent.unwrap_or(DEFAULT_UA);
        let mut builder = BrowserConfig::builder()
            .chrome_executable(executable)
            .arg("--headless=new")
            .arg("--disable-gpu")
            .arg("--no-sandbox")
            .arg("--disable-dev-shm-usage")
            .arg("--mute-audio")
            .arg(format!("--user-agent={ua}"));
        if let Some(proxy) = proxy {
            builder = builder.arg(format!("--proxy-server={proxy}"));
        }
        let config = builder.build().map_err(ParseError::BrowserError)?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| ParseError::BrowserError(e.to_string()))?;

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        Ok(BrowserSlot {
            browser,
            handler_task,
        })
    }

    async fn run_page(
        &self,
        browser: &Browser,
        target: &ResolvedTarget,
        cx: &ParseContext,
    ) -> Result<VideoRecord, ParseError> {
        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| ParseError::BrowserError(e.to_string()))?;

        if let Some(cookies) = cx.cookies.as_deref() {
            let params = cookie_params(cookies);
            if !params.is_empty() {
                page.set_cookies(params)
                    .await
                    .map_err(|e| ParseError::BrowserError(e.to_string()))?;
            }
        }

        let result = self.attempt(&page, target).await;
        page.close().await.ok();
        result
    }

    async fn attempt(
        &self,
        page: &Page,
        target: &ResolvedTarget,
    ) -> Result<VideoRecord, ParseError> {
        // must be attached before navigation or the detail request is missed
        let mut responses = page
            .event_listener::<EventResponseReceived>()
            .await
            .map_err(|e| ParseError::BrowserError(e.to_string()))?;

        match tokio::time::timeout(NAV_TIMEOUT, page.goto(target.url.as_str())).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => return Err(ParseError::BrowserError(e.to_string())),
            Err(_) => return Err(ParseError::BrowserError("navigation timed out".to_string())),
        }

        let deadline = tokio::time::Instant::now() + SNIFF_WINDOW;
        loop {
            let event = match tokio::time::timeout_at(deadline, responses.next()).await {
                Ok(Some(event)) => event,
                Ok(None) | Err(_) => break,
            };
            if !event.response.url.contains(WEB_DETAIL_PATH) {
                continue;
            }
            debug!(url = %event.response.url, "detail response intercepted");
            let Ok(reply) = page
                .execute(GetResponseBodyParams::new(event.request_id.clone()))
                .await
            else {
                continue;
            };
            let body = if reply.result.base64_encoded {
                match STANDARD.decode(reply.result.body.as_bytes()) {
                    Ok(raw) => String::from_utf8_lossy(&raw).into_owned(),
                    Err(_) => continue,
                }
            } else {
                reply.result.body.clone()
            };
            if let Some(record) = record_from_detail_body(&body, &target.aweme_id) {
                return Ok(record);
            }
        }

        debug!("no detail response sniffed, reading rendered DOM");
        let html: String = page
            .evaluate("document.documentElement.outerHTML")
            .await
            .map_err(|e| ParseError::BrowserError(e.to_string()))?
            .into_value()
            .map_err(|e| ParseError::BrowserError(e.to_string()))?;

        extract_record_from_html(&html, &target.aweme_id, StrategyKind::Browser)
    }
}

#[async_trait]
impl ParseStrategy for BrowserStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Browser
    }

    async fn parse(
        &self,
        target: &ResolvedTarget,
        cx: &ParseContext,
    ) -> Result<VideoRecord, ParseError> {
        // one page at a time; the instance is launched on first use, so the
        // proxy and user agent, being launch flags, come from that attempt
        let mut slot = self.slot.lock().await;
        if slot.is_none() {
            *slot = Some(
                self.launch(cx.proxy.as_deref(), cx.user_agent.as_deref())
                    .await?,
            );
        }
        let active = slot
            .as_ref()
            .ok_or_else(|| ParseError::BrowserError("browser slot empty".to_string()))?;

        let result = self.run_page(&active.browser, target, cx).await;

        if let Err(ParseError::BrowserError(reason)) = &result {
            warn!(%reason, "browser attempt failed, recycling instance");
            if let Some(old) = slot.take() {
                old.shutdown().await;
            }
        }
        result
    }

    async fn shutdown(&self) {
        let mut slot = self.slot.lock().await;
        if let Some(old) = slot.take() {
            old.shutdown().await;
        }
    }
}

fn record_from_detail_body(body: &str, aweme_id: &str) -> Option<VideoRecord> {
    let response: DetailResponse = serde_json::from_str(body).ok()?;
    let detail = response.aweme_detail?;
    if detail.aweme_id != aweme_id {
        return None;
    }
    Some(detail.into_record(StrategyKind::Browser))
}

fn cookie_params(cookies: &str) -> Vec<CookieParam> {
    cookies
        .split(';')
        .filter_map(|pair| {
            let (name, value) = pair.trim().split_once('=')?;
            if name.is_empty() {
                return None;
            }
            let mut param = CookieParam::new(name, value);
            param.domain = Some(".douyin.com".to_string());
            Some(param)
        })
        .collect()
}

/// True when a Chromium binary can be located, so callers can decide up
/// front whether registering this strategy is worthwhile.
pub fn browser_available() -> bool {
    find_browser().is_some()
}

/// Probes for a usable Chromium binary: env override first, then PATH, then
/// the usual install locations.
fn find_browser() -> Option<PathBuf> {
    if let Ok(from_env) = std::env::var(BROWSER_ENV) {
        let path = PathBuf::from(from_env);
        if path.exists() {
            return Some(path);
        }
        warn!(env = BROWSER_ENV, "configured browser path does not exist");
    }

    const NAMES: &[&str] = &[
        "chromium",
        "chromium-browser",
        "google-chrome",
        "google-chrome-stable",
        "chrome",
        "msedge",
        "microsoft-edge-stable",
    ];
    for name in NAMES {
        if let Ok(path) = which::which(name) {
            return Some(path);
        }
    }

    const HOME_RELATIVE: &[&str] = &[
        ".local/bin/chromium",
        ".local/bin/google-chrome",
        "Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
        "Applications/Chromium.app/Contents/MacOS/Chromium",
    ];
    if let Some(home) = dirs::home_dir() {
        for rel in HOME_RELATIVE {
            let path = home.join(rel);
            if path.exists() {
                return Some(path);
            }
        }
    }

    const KNOWN_PATHS: &[&str] = &[
        "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
        "/Applications/Chromium.app/Contents/MacOS/Chromium",
        "/Applications/Microsoft Edge.app/Contents/MacOS/Microsoft Edge",
        r"C:\Program Files\Google\Chrome\Application\chrome.exe",
        r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
    ];
    KNOWN_PATHS
        .iter()
        .map(Path::new)
        .find(|p| p.exists())
        .map(Path::to_path_buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_override_wins_when_path_exists() {
        let file = tempfile::NamedTempFile::new().unwrap();
        unsafe { std::env::set_var(BROWSER_ENV, file.path()) };
        let found = find_browser();
        unsafe { std::env::remove_var(BROWSER_ENV) };
        assert_eq!(found.as_deref(), Some(file.path()));
    }

    #[test]
    fn cookie_string_splits_into_params() {
        let params = cookie_params("ttwid=abc; msToken=def;; =broken; sid_tt=x=y");
        assert_eq!(params.len(), 3);
        assert_eq!(params[0].name, "ttwid");
        assert_eq!(params[0].value, "abc");
        assert_eq!(params[0].domain.as_deref(), Some(".douyin.com"));
        // values containing '=' keep everything after the first one
        assert_eq!(params[2].name, "sid_tt");
        assert_eq!(params[2].value, "x=y");
    }

    #[test]
    fn detail_body_with_matching_id_builds_record() {
        let body = serde_json::json!({
            "status_code": 0,
            "aweme_detail": {
                "aweme_id": "7300000000000000001",
                "desc": "标题",
                "author": { "nickname": "作者" },
                "video": {
                    "play_addr": { "url_list": ["https://v.example.com/playwm/a.mp4"] },
                    "duration": 9000
                }
            }
        })
        .to_string();

        let record = record_from_detail_body(&body, "7300000000000000001").unwrap();
        assert_eq!(record.title, "标题");
        assert_eq!(record.source, StrategyKind::Browser);
        assert_eq!(
            record.video_url.as_deref(),
            Some("https://v.example.com/play/a.mp4")
        );

        assert!(record_from_detail_body(&body, "7300000000000000002").is_none());
        assert!(record_from_detail_body("not json", "7300000000000000001").is_none());
    }

    #[tokio::test]
    #[ignore = "requires an installed Chromium and network access"]
    async fn parses_live_page_with_real_browser() {
        let strategy = BrowserStrategy::new();
        let target = ResolvedTarget::from_id("7431759837333703974", "live test");
        let record = strategy
            .parse(&target, &ParseContext::default())
            .await
            .unwrap();
        assert!(record.validate(&target.aweme_id).is_ok());
        strategy.shutdown().await;
    }
}
