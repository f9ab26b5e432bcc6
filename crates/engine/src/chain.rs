//! # Strategy Chain
//!
//! The heart of the engine: an ordered, health-weighted fallback chain over
//! the extraction strategies. Strategies that keep working float to the
//! front, strategies that keep failing sink and eventually drop out, and a
//! strategy that reports an unsupported environment is retired for good.

use std::sync::Arc;
use std::time::{Duration, Instant};

use douyin_parser::{
    ParseContext, ParseError, ParseStrategy, ResolvedTarget, StrategyKind, VideoRecord,
};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::EngineError;
use crate::metrics::MetricsCollector;
use crate::proxy::ProxyManager;

/// Health tracking for one strategy.
#[derive(Debug, Clone)]
struct StrategyHealth {
    successes: u64,
    /// Fractional: every success also pays off half a failure, so a strategy
    /// earns its standing back by working.
    failures: f64,
    /// EWMA of attempt time in milliseconds.
    avg_response_time: u64,
    last_used: Option<Instant>,
    last_error: Option<String>,
    /// 0-100, combining success rate and response time.
    score: u8,
    active: bool,
    /// Set once by unsupported-input failures; never cleared.
    disabled: bool,
}

impl Default for StrategyHealth {
    fn default() -> Self {
        Self {
            successes: 0,
            failures: 0.0,
            avg_response_time: 0,
            last_used: None,
            last_error: None,
            score: 100,
            active: true,
            disabled: false,
        }
    }
}

impl StrategyHealth {
    fn success_rate(&self) -> f64 {
        let total = self.successes as f64 + self.failures;
        if total == 0.0 {
            1.0
        } else {
            self.successes as f64 / total
        }
    }

    fn record(&mut self, success: bool, elapsed_ms: u64) {
        if success {
            self.successes += 1;
            self.failures = (self.failures - 0.5).max(0.0);
        } else {
            self.failures += 1.0;
        }

        if self.avg_response_time == 0 {
            self.avg_response_time = elapsed_ms;
        } else {
            // 70% old value, 30% new value for smoothing
            self.avg_response_time = (self.avg_response_time * 7 + elapsed_ms * 3) / 10;
        }
        self.last_used = Some(Instant::now());

        self.recalculate_score();
        if !self.disabled {
            self.active = self.score > 20;
        }
    }

    fn recalculate_score(&mut self) {
        let success_points = (self.success_rate() * 100.0) as u32;

        // Response time score (faster = better)
        // 0 - 800ms: 100-80
        // 800ms - 2.5s: 80-60
        // 2.5s - 8s: 60-40
        // >8s: <40
        let avg = self.avg_response_time;
        let time_points: u32 = if avg < 800 {
            80 + (20 * (800 - avg) / 800) as u32
        } else if avg < 2500 {
            60 + (20 * (2500 - avg) / 1700) as u32
        } else if avg < 8000 {
            40 + (20 * (8000 - avg) / 5500) as u32
        } else {
            (40 * 8000 / avg.max(1)) as u32
        };

        self.score = ((success_points * 70 + time_points * 30) / 100) as u8;
    }

    fn disable(&mut self) {
        self.disabled = true;
        self.active = false;
    }
}

/// One strategy's standing, for stats output.
#[derive(Debug, Clone, Serialize)]
pub struct StrategyHealthView {
    pub strategy: StrategyKind,
    pub successes: u64,
    pub failures: f64,
    pub avg_response_time_ms: u64,
    pub score: u8,
    pub effective_weight: f64,
    pub active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

pub struct StrategyChain {
    strategies: Vec<Arc<dyn ParseStrategy>>,
    health: Mutex<FxHashMap<StrategyKind, StrategyHealth>>,
    proxies: Arc<ProxyManager>,
    metrics: Arc<MetricsCollector>,
    timeout_override: Option<Duration>,
}

impl StrategyChain {
    pub fn new(
        strategies: Vec<Arc<dyn ParseStrategy>>,
        proxies: Arc<ProxyManager>,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        let health = strategies
            .iter()
            .map(|s| (s.kind(), StrategyHealth::default()))
            .collect();
        Self {
            strategies,
            health: Mutex::new(health),
            proxies,
            metrics,
            timeout_override: None,
        }
    }

    /// Caps every attempt at one budget instead of per-strategy defaults.
    pub fn with_timeout_override(mut self, timeout: Option<Duration>) -> Self {
        self.timeout_override = timeout;
        self
    }

    /// Active strategies in descending effective weight. Ties keep the
    /// registration order because the sort is stable.
    fn candidates(&self) -> Vec<Arc<dyn ParseStrategy>> {
        let health = self.health.lock();
        let mut active: Vec<(f64, Arc<dyn ParseStrategy>)> = self
            .strategies
            .iter()
            .filter_map(|strategy| {
                let h = health.get(&strategy.kind())?;
                if !h.active {
                    return None;
                }
                let weight = effective_weight(strategy.base_weight(), h.success_rate());
                Some((weight, Arc::clone(strategy)))
            })
            .collect();
        active.sort_by(|a, b| b.0.total_cmp(&a.0));
        active.into_iter().map(|(_, s)| s).collect()
    }

    /// Runs the chain for one target. Returns the first validated record, or
    /// an error carrying every strategy's failure.
    pub async fn parse(
        &self,
        target: &ResolvedTarget,
        base: &ParseContext,
    ) -> Result<VideoRecord, EngineError> {
        let candidates = self.candidates();
        if candidates.is_empty() {
            return Err(EngineError::NoActiveStrategies);
        }

        let mut attempts: Vec<(StrategyKind, String)> = Vec::new();
        for strategy in candidates {
            let kind = strategy.kind();
            let proxy = self.proxies.acquire();
            let cx = base.clone().with_proxy(proxy.clone());

            let budget = self.timeout_override.unwrap_or_else(|| strategy.timeout());
            let started = Instant::now();
            let outcome = tokio::time::timeout(budget, strategy.parse(target, &cx)).await;
            let elapsed = started.elapsed();

            let result: Result<VideoRecord, ParseError> = match outcome {
                Ok(Ok(record)) => record.validate(&target.aweme_id).map(|()| record),
                Ok(Err(error)) => Err(error),
                Err(_) => Err(ParseError::Timeout(budget)),
            };

            match result {
                Ok(record) => {
                    debug!(
                        strategy = %kind,
                        elapsed_ms = elapsed.as_millis() as u64,
                        aweme_id = %target.aweme_id,
                        "strategy succeeded"
                    );
                    self.record_outcome(kind, true, elapsed.as_millis() as u64, None);
                    self.metrics.record_attempt(kind, elapsed, true);
                    if let Some(url) = proxy.as_deref() {
                        self.proxies.report_success(url);
                    }
                    return Ok(record);
                }
                Err(error) => {
                    warn!(
                        strategy = %kind,
                        error = %error,
                        elapsed_ms = elapsed.as_millis() as u64,
                        "strategy failed, trying next"
                    );
                    self.record_outcome(
                        kind,
                        false,
                        elapsed.as_millis() as u64,
                        Some(&error),
                    );
                    self.metrics.record_attempt(kind, elapsed, false);
                    if let Some(url) = proxy.as_deref() {
                        self.proxies.report_failure(url);
                    }
                    attempts.push((kind, error.to_string()));
                }
            }
        }

        Err(EngineError::AllStrategiesFailed { attempts })
    }

    fn record_outcome(
        &self,
        kind: StrategyKind,
        success: bool,
        elapsed_ms: u64,
        error: Option<&ParseError>,
    ) {
        let mut health = self.health.lock();
        let h = health.entry(kind).or_default();
        h.record(success, elapsed_ms);
        if let Some(error) = error {
            h.last_error = Some(error.to_string());
            if error.is_unsupported() {
                h.disable();
                warn!(strategy = %kind, "strategy permanently deactivated");
            }
        }
        debug!(
            strategy = %kind,
            success,
            score = h.score,
            avg_response_time_ms = h.avg_response_time,
            active = h.active,
            "strategy health updated"
        );
    }

    /// Standing of every registered strategy, in registration order.
    pub fn health_report(&self) -> Vec<StrategyHealthView> {
        let health = self.health.lock();
        self.strategies
            .iter()
            .filter_map(|strategy| {
                let h = health.get(&strategy.kind())?;
                Some(StrategyHealthView {
                    strategy: strategy.kind(),
                    successes: h.successes,
                    failures: h.failures,
                    avg_response_time_ms: h.avg_response_time,
                    score: h.score,
                    effective_weight: effective_weight(strategy.base_weight(), h.success_rate()),
                    active: h.active,
                    last_error: h.last_error.clone(),
                })
            })
            .collect()
    }

    pub fn strategy_count(&self) -> usize {
        self.strategies.len()
    }

    pub async fn shutdown(&self) {
        for strategy in &self.strategies {
            strategy.shutdown().await;
        }
    }
}

/// Base weight scaled into `[base/2, base]` by the observed success rate.
fn effective_weight(base_weight: f64, success_rate: f64) -> f64 {
    base_weight * (0.5 + success_rate * 0.5)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    fn sample_record(id: &str, source: StrategyKind) -> VideoRecord {
        let mut record = VideoRecord::new(id, source);
        record.title = "测试视频".to_string();
        record.author.nickname = "测试作者".to_string();
        record.video_url = Some("https://v.example.com/play/sample.mp4".to_string());
        record
    }

    enum StubBehavior {
        Succeed,
        Fail(fn() -> ParseError),
        WrongId,
        Hang,
    }

    struct StubStrategy {
        kind: StrategyKind,
        behavior: StubBehavior,
        calls: AtomicU32,
    }

    impl StubStrategy {
        fn new(kind: StrategyKind, behavior: StubBehavior) -> Arc<Self> {
            Arc::new(Self {
                kind,
                behavior,
                calls: AtomicU32::new(0),
            })
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ParseStrategy for StubStrategy {
        fn kind(&self) -> StrategyKind {
            self.kind
        }

        fn timeout(&self) -> Duration {
            Duration::from_millis(200)
        }

        async fn parse(
            &self,
            target: &ResolvedTarget,
            _cx: &ParseContext,
        ) -> Result<VideoRecord, ParseError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.behavior {
                StubBehavior::Succeed => Ok(sample_record(&target.aweme_id, self.kind)),
                StubBehavior::Fail(make) => Err(make()),
                StubBehavior::WrongId => Ok(sample_record("1", self.kind)),
                StubBehavior::Hang => {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    Ok(sample_record(&target.aweme_id, self.kind))
                }
            }
        }
    }

    fn chain_of(strategies: Vec<Arc<dyn ParseStrategy>>) -> StrategyChain {
        StrategyChain::new(
            strategies,
            Arc::new(ProxyManager::empty()),
            Arc::new(MetricsCollector::new()),
        )
    }

    fn target() -> ResolvedTarget {
        ResolvedTarget::from_id("7345678901234567890", "test input")
    }

    #[tokio::test]
    async fn first_strategy_success_short_circuits() {
        let api = StubStrategy::new(StrategyKind::Api, StubBehavior::Succeed);
        let html = StubStrategy::new(StrategyKind::Html, StubBehavior::Succeed);
        let chain = chain_of(vec![api.clone(), html.clone()]);

        let record = chain.parse(&target(), &ParseContext::default()).await.unwrap();
        assert_eq!(record.source, StrategyKind::Api);
        assert_eq!(api.calls(), 1);
        assert_eq!(html.calls(), 0);
    }

    #[tokio::test]
    async fn failure_falls_through_to_next_strategy() {
        let api = StubStrategy::new(
            StrategyKind::Api,
            StubBehavior::Fail(|| ParseError::ContentNotFound("gone".to_string())),
        );
        let html = StubStrategy::new(StrategyKind::Html, StubBehavior::Succeed);
        let chain = chain_of(vec![api.clone(), html.clone()]);

        let record = chain.parse(&target(), &ParseContext::default()).await.unwrap();
        assert_eq!(record.source, StrategyKind::Html);
        assert_eq!(api.calls(), 1);
        assert_eq!(html.calls(), 1);
    }

    #[tokio::test]
    async fn all_failures_collects_every_error() {
        let api = StubStrategy::new(
            StrategyKind::Api,
            StubBehavior::Fail(|| ParseError::ContentNotFound("a".to_string())),
        );
        let html = StubStrategy::new(
            StrategyKind::Html,
            StubBehavior::Fail(|| ParseError::PrivateContent),
        );
        let chain = chain_of(vec![api, html]);

        let err = chain
            .parse(&target(), &ParseContext::default())
            .await
            .unwrap_err();
        match err {
            EngineError::AllStrategiesFailed { attempts } => {
                assert_eq!(attempts.len(), 2);
                assert_eq!(attempts[0].0, StrategyKind::Api);
                assert_eq!(attempts[1].0, StrategyKind::Html);
                assert!(attempts[1].1.contains("private"));
            }
            other => panic!("expected AllStrategiesFailed, got {other}"),
        }
    }

    #[tokio::test]
    async fn invalid_record_advances_the_chain() {
        let api = StubStrategy::new(StrategyKind::Api, StubBehavior::WrongId);
        let html = StubStrategy::new(StrategyKind::Html, StubBehavior::Succeed);
        let chain = chain_of(vec![api.clone(), html]);

        let record = chain.parse(&target(), &ParseContext::default()).await.unwrap();
        assert_eq!(record.source, StrategyKind::Html);
        assert_eq!(api.calls(), 1);
    }

    #[tokio::test]
    async fn hanging_strategy_times_out_and_chain_continues() {
        let api = StubStrategy::new(StrategyKind::Api, StubBehavior::Hang);
        let html = StubStrategy::new(StrategyKind::Html, StubBehavior::Succeed);
        let chain = chain_of(vec![api, html]);

        let record = chain.parse(&target(), &ParseContext::default()).await.unwrap();
        assert_eq!(record.source, StrategyKind::Html);

        let report = chain.health_report();
        let api_health = report
            .iter()
            .find(|h| h.strategy == StrategyKind::Api)
            .unwrap();
        assert!(api_health.last_error.as_deref().unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn unsupported_error_deactivates_permanently() {
        let browser = StubStrategy::new(
            StrategyKind::Browser,
            StubBehavior::Fail(|| ParseError::BrowserUnavailable),
        );
        let html = StubStrategy::new(StrategyKind::Html, StubBehavior::Succeed);
        let chain = chain_of(vec![browser.clone(), html]);

        chain.parse(&target(), &ParseContext::default()).await.unwrap();
        assert_eq!(browser.calls(), 1);

        // second parse must not touch the retired strategy
        chain.parse(&target(), &ParseContext::default()).await.unwrap();
        assert_eq!(browser.calls(), 1);

        let report = chain.health_report();
        let b = report
            .iter()
            .find(|h| h.strategy == StrategyKind::Browser)
            .unwrap();
        assert!(!b.active);
    }

    #[tokio::test]
    async fn failures_reorder_strategies_by_effective_weight() {
        let api = StubStrategy::new(
            StrategyKind::Api,
            StubBehavior::Fail(|| ParseError::ContentNotFound("down".to_string())),
        );
        let browser = StubStrategy::new(StrategyKind::Browser, StubBehavior::Succeed);
        let chain = chain_of(vec![api.clone(), browser.clone()]);

        // api fails repeatedly; its success rate drops toward zero and its
        // effective weight toward 0.5, below browser's 0.8
        for _ in 0..3 {
            chain.parse(&target(), &ParseContext::default()).await.unwrap();
        }
        let api_calls_so_far = api.calls();
        assert!(api_calls_so_far >= 1);

        chain.parse(&target(), &ParseContext::default()).await.unwrap();
        // browser now leads, so the failing api strategy is not retried
        assert_eq!(api.calls(), api_calls_so_far);
    }

    #[test]
    fn success_pays_off_half_a_failure() {
        let mut health = StrategyHealth::default();
        health.record(false, 100);
        health.record(false, 100);
        assert!((health.failures - 2.0).abs() < f64::EPSILON);

        health.record(true, 100);
        assert!((health.failures - 1.5).abs() < f64::EPSILON);
        assert_eq!(health.successes, 1);
    }

    #[test]
    fn score_bands_follow_response_time() {
        let mut fast = StrategyHealth::default();
        fast.record(true, 100);
        assert!(fast.score > 90);

        let mut slow = StrategyHealth::default();
        slow.record(true, 10_000);
        // perfect success rate but dismal time keeps the score mid-range
        assert!(slow.score < 90);
        assert!(slow.active);
    }

    #[test]
    fn effective_weight_scales_with_success_rate() {
        assert!((effective_weight(1.0, 1.0) - 1.0).abs() < f64::EPSILON);
        assert!((effective_weight(1.0, 0.0) - 0.5).abs() < f64::EPSILON);
        assert!((effective_weight(0.8, 0.5) - 0.6).abs() < f64::EPSILON);
    }
}
