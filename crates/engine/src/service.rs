//! # Aweme Service
//!
//! The facade that wires resolution, the strategy chain, caching, proxy
//! rotation, metrics and downloads into one entry point. Library consumers
//! and the CLI both talk to [`AwemeService`].

use std::sync::Arc;
use std::time::{Duration, Instant};

use douyin_parser::strategies::{ApiStrategy, BrowserStrategy, HtmlStrategy, browser_available};
use douyin_parser::{ParseContext, ParseStrategy, Resolver, VideoRecord};
use futures::StreamExt;
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::cache::{CacheKey, CacheManager, CacheStats, CacheStatus};
use crate::chain::{StrategyChain, StrategyHealthView};
use crate::config::ServiceConfig;
use crate::download::{DownloadOptions, DownloadStats, MediaDownloader};
use crate::error::{CacheError, EngineError, ProxyError};
use crate::metrics::{MetricsCollector, MetricsSnapshot};
use crate::proxy::{ProxyManager, ProxyStatus, parse_proxy_lines};

const DEFAULT_BATCH_CONCURRENCY: usize = 10;

/// Per-call parse knobs.
#[derive(Debug, Clone, Copy, Default)]
pub struct ParseOptions {
    /// Skip the cache lookup and overwrite whatever is stored.
    pub force_refresh: bool,
}

/// A successful parse with its provenance.
#[derive(Debug, Clone, Serialize)]
pub struct ParseOutcome {
    pub record: VideoRecord,
    pub cache_status: CacheStatus,
    #[serde(rename = "elapsed_ms", serialize_with = "ser_millis")]
    pub elapsed: Duration,
}

fn ser_millis<S: serde::Serializer>(elapsed: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(elapsed.as_millis() as u64)
}

/// Point-in-time view over every moving part, for `stats` surfaces.
#[derive(Debug, Clone, Serialize)]
pub struct ServiceStats {
    pub strategies: Vec<StrategyHealthView>,
    pub cache: CacheStats,
    pub proxies: Vec<ProxyStatus>,
    pub metrics: MetricsSnapshot,
}

pub struct AwemeService {
    resolver: Resolver,
    chain: StrategyChain,
    cache: Arc<CacheManager>,
    proxies: Arc<ProxyManager>,
    metrics: Arc<MetricsCollector>,
    context: ParseContext,
    maintenance: JoinHandle<()>,
}

impl AwemeService {
    pub fn new(config: ServiceConfig) -> Result<Self, EngineError> {
        let mut urls = config.proxies.clone();
        if let Some(path) = &config.proxy_file {
            let contents = std::fs::read_to_string(path).map_err(ProxyError::from)?;
            urls.extend(parse_proxy_lines(&contents));
        }
        let proxies = Arc::new(ProxyManager::new(urls, config.rotation)?);
        if !proxies.is_empty() {
            info!(count = proxies.len(), rotation = ?config.rotation, "proxy pool ready");
        }

        let mut strategies: Vec<Arc<dyn ParseStrategy>> = vec![Arc::new(ApiStrategy::new())];
        match (config.browser_disabled, &config.browser_executable) {
            (true, _) => debug!("browser strategy disabled by configuration"),
            (false, Some(path)) => {
                strategies.push(Arc::new(BrowserStrategy::with_executable(path.clone())));
            }
            (false, None) => {
                if browser_available() {
                    strategies.push(Arc::new(BrowserStrategy::new()));
                } else {
                    debug!("no browser binary found, browser strategy not registered");
                }
            }
        }
        strategies.push(Arc::new(HtmlStrategy::new()));

        let context = ParseContext::default()
            .with_cookies(config.cookies.clone())
            .with_user_agent(config.user_agent.clone());

        Ok(Self::assemble(strategies, proxies, context, &config))
    }

    fn assemble(
        strategies: Vec<Arc<dyn ParseStrategy>>,
        proxies: Arc<ProxyManager>,
        context: ParseContext,
        config: &ServiceConfig,
    ) -> Self {
        let metrics = Arc::new(MetricsCollector::new());
        let cache = Arc::new(CacheManager::new(&config.cache));
        let chain = StrategyChain::new(strategies, Arc::clone(&proxies), Arc::clone(&metrics))
            .with_timeout_override(config.strategy_timeout);
        let maintenance = cache.spawn_maintenance(config.maintenance_interval);

        Self {
            resolver: Resolver::new(),
            chain,
            cache,
            proxies,
            metrics,
            context,
            maintenance,
        }
    }

    /// Resolves `input` and produces a record, consulting the cache first.
    pub async fn parse(
        &self,
        input: &str,
        options: &ParseOptions,
    ) -> Result<ParseOutcome, EngineError> {
        let started = Instant::now();
        self.metrics.record_request();

        let target = self.resolver.resolve(input).await?;
        // keyed on the canonical URL, so every input form of one video
        // shares an entry
        let key = CacheKey::new(&target.url);

        let mut cache_status = CacheStatus::Miss;
        if self.cache.is_enabled() && !options.force_refresh {
            let (found, status) = self.cache.get(&key).await;
            if let Some(record) = found {
                self.metrics.record_cache_hit();
                debug!(aweme_id = %target.aweme_id, "served from cache");
                return Ok(ParseOutcome {
                    record,
                    cache_status: status,
                    elapsed: started.elapsed(),
                });
            }
            self.metrics.record_cache_miss();
            cache_status = status;
        }

        let record = match self.chain.parse(&target, &self.context).await {
            Ok(record) => {
                self.metrics.record_parse_outcome(true);
                record
            }
            Err(e) => {
                self.metrics.record_parse_outcome(false);
                return Err(e);
            }
        };

        self.cache.put(&key, &record).await;
        Ok(ParseOutcome {
            record,
            cache_status,
            elapsed: started.elapsed(),
        })
    }

    /// Parses many inputs concurrently. Results come back in input order,
    /// each paired with the input that produced it.
    pub async fn parse_batch(
        &self,
        inputs: &[String],
        max_concurrent: usize,
    ) -> Vec<(String, Result<ParseOutcome, EngineError>)> {
        let limit = if max_concurrent == 0 {
            DEFAULT_BATCH_CONCURRENCY
        } else {
            max_concurrent
        };

        let mut slots: Vec<Option<(String, Result<ParseOutcome, EngineError>)>> =
            (0..inputs.len()).map(|_| None).collect();

        let mut stream = futures::stream::iter(inputs.iter().cloned().enumerate().map(
            |(index, input)| async move {
                let result = self.parse(&input, &ParseOptions::default()).await;
                (index, input, result)
            },
        ))
        .buffer_unordered(limit);

        while let Some((index, input, result)) = stream.next().await {
            slots[index] = Some((input, result));
        }

        slots.into_iter().flatten().collect()
    }

    /// Downloads a record's media through a pool proxy when one is eligible.
    pub async fn download(
        &self,
        record: &VideoRecord,
        options: &DownloadOptions,
    ) -> Result<DownloadStats, EngineError> {
        let proxy = self.proxies.acquire();
        let downloader = MediaDownloader::with_proxy(proxy.as_deref())?;
        let stats = downloader.download(record, options).await?;

        if let Some(url) = proxy.as_deref() {
            if stats.failed > 0 && stats.completed == 0 {
                self.proxies.report_failure(url);
            } else {
                self.proxies.report_success(url);
            }
        }
        self.metrics
            .record_downloads(stats.completed, stats.failed, stats.bytes);
        Ok(stats)
    }

    pub async fn stats(&self) -> ServiceStats {
        ServiceStats {
            strategies: self.chain.health_report(),
            cache: self.cache.stats().await,
            proxies: self.proxies.pool_view(),
            metrics: self.metrics.snapshot(),
        }
    }

    /// Drops every cached record. Returns the number of file entries removed.
    pub async fn clear_cache(&self) -> Result<u64, CacheError> {
        self.cache.clear().await
    }

    /// Tears down long-lived resources: browser processes and the cache
    /// maintenance task.
    pub async fn shutdown(&self) {
        self.chain.shutdown().await;
        self.maintenance.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheConfig;
    use async_trait::async_trait;
    use douyin_parser::{ParseError, ResolvedTarget, StrategyKind};
    use std::sync::atomic::{AtomicU32, Ordering};

    struct CountingStrategy {
        calls: Arc<AtomicU32>,
        fail: bool,
    }

    #[async_trait]
    impl ParseStrategy for CountingStrategy {
        fn kind(&self) -> StrategyKind {
            StrategyKind::Api
        }

        async fn parse(
            &self,
            target: &ResolvedTarget,
            _cx: &ParseContext,
        ) -> Result<VideoRecord, ParseError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(ParseError::ContentNotFound(target.aweme_id.clone()));
            }
            let mut record = VideoRecord::new(&target.aweme_id, StrategyKind::Api);
            record.title = "测试".to_string();
            record.author.nickname = "作者".to_string();
            record.video_url = Some("https://cdn.example.com/v.mp4".to_string());
            Ok(record)
        }
    }

    fn service_with(
        fail: bool,
        cache_dir: &std::path::Path,
    ) -> (AwemeService, Arc<AtomicU32>) {
        let calls = Arc::new(AtomicU32::new(0));
        let strategy = Arc::new(CountingStrategy {
            calls: Arc::clone(&calls),
            fail,
        });
        let config = ServiceConfig::builder()
            .with_cache_dir(cache_dir)
            .build();
        let service = AwemeService::assemble(
            vec![strategy],
            Arc::new(ProxyManager::empty()),
            ParseContext::default(),
            &config,
        );
        (service, calls)
    }

    const ID: &str = "7345678901234567890";

    #[tokio::test]
    async fn second_parse_is_served_from_cache() {
        let dir = tempfile::tempdir().unwrap();
        let (service, calls) = service_with(false, dir.path());

        let first = service.parse(ID, &ParseOptions::default()).await.unwrap();
        assert_eq!(first.cache_status, CacheStatus::Miss);

        let second = service.parse(ID, &ParseOptions::default()).await.unwrap();
        assert_eq!(second.cache_status, CacheStatus::Hit);
        assert_eq!(second.record.aweme_id, ID);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn force_refresh_bypasses_cache() {
        let dir = tempfile::tempdir().unwrap();
        let (service, calls) = service_with(false, dir.path());

        service.parse(ID, &ParseOptions::default()).await.unwrap();
        let forced = ParseOptions {
            force_refresh: true,
        };
        service.parse(ID, &forced).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn failed_parse_is_not_cached() {
        let dir = tempfile::tempdir().unwrap();
        let (service, calls) = service_with(true, dir.path());

        let err = service.parse(ID, &ParseOptions::default()).await.unwrap_err();
        assert!(matches!(err, EngineError::AllStrategiesFailed { .. }));

        let _ = service.parse(ID, &ParseOptions::default()).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        let stats = service.stats().await;
        assert_eq!(stats.metrics.parse_failures, 2);
        assert_eq!(stats.cache.file_entries, 0);
    }

    #[tokio::test]
    async fn batch_restores_input_order() {
        let dir = tempfile::tempdir().unwrap();
        let (service, _calls) = service_with(false, dir.path());

        let inputs: Vec<String> = vec![
            "7345678901234567890".to_string(),
            "7345678901234567891".to_string(),
            "7345678901234567892".to_string(),
        ];
        let results = service.parse_batch(&inputs, 2).await;

        assert_eq!(results.len(), 3);
        for (given, (input, result)) in inputs.iter().zip(&results) {
            assert_eq!(given, input);
            assert_eq!(&result.as_ref().unwrap().record.aweme_id, input);
        }
    }

    #[tokio::test]
    async fn unresolvable_input_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let (service, calls) = service_with(false, dir.path());

        let err = service
            .parse("not a douyin link at all", &ParseOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Parse(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn stats_cover_every_component() {
        let dir = tempfile::tempdir().unwrap();
        let (service, _calls) = service_with(false, dir.path());
        service.parse(ID, &ParseOptions::default()).await.unwrap();

        let stats = service.stats().await;
        assert_eq!(stats.strategies.len(), 1);
        assert_eq!(stats.strategies[0].successes, 1);
        assert!(stats.proxies.is_empty());
        assert_eq!(stats.metrics.requests, 1);
        assert_eq!(stats.cache.file_entries, 1);
    }

    #[tokio::test]
    async fn real_construction_without_browser() {
        let dir = tempfile::tempdir().unwrap();
        let config = ServiceConfig::builder()
            .with_cache_dir(dir.path())
            .with_browser_disabled(true)
            .build();
        let service = AwemeService::new(config).unwrap();
        let stats = service.stats().await;
        // api and html always register; browser was held back
        assert_eq!(stats.strategies.len(), 2);
        service.shutdown().await;
    }
}
