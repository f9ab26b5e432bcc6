use std::fmt::Write as _;
use std::io::Write as _;
use std::path::Path;

use aweme_engine::{CacheStatus, ParseOutcome, ServiceStats, render_prometheus};
use douyin_parser::VideoRecord;

use crate::cli::{OutputFormat, StatsFormat};
use crate::error::Result;

pub fn format_outcome(outcome: &ParseOutcome, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Pretty => Ok(format_outcome_pretty(outcome)),
        OutputFormat::Json => Ok(serde_json::to_string_pretty(outcome)?),
        OutputFormat::JsonCompact => Ok(serde_json::to_string(outcome)?),
    }
}

fn format_outcome_pretty(outcome: &ParseOutcome) -> String {
    let mut out = String::new();
    out.push_str("Record:\n");
    push_record_fields(&mut out, &outcome.record);

    let source = match outcome.cache_status {
        CacheStatus::Hit => "cache".to_string(),
        _ => outcome.record.source.to_string(),
    };
    field(&mut out, "Served by", &source);
    field(
        &mut out,
        "Elapsed",
        &format!("{} ms", outcome.elapsed.as_millis()),
    );
    out
}

fn push_record_fields(out: &mut String, record: &VideoRecord) {
    field(out, "Aweme ID", &record.aweme_id);
    field(out, "Title", &record.title);

    let author = if record.author.uid.is_empty() {
        record.author.nickname.clone()
    } else {
        format!("{} (uid {})", record.author.nickname, record.author.uid)
    };
    field(out, "Author", &author);

    if let Some(url) = &record.video_url {
        field(out, "Video URL", url);
    }
    if let Some(url) = &record.cover_url {
        field(out, "Cover URL", url);
    }
    if let Some(url) = &record.music_url {
        field(out, "Music URL", url);
    }
    if record.is_image_post() {
        field(out, "Images", &record.images.len().to_string());
        for (index, url) in record.images.iter().enumerate() {
            let _ = writeln!(out, "    {:>2}. {url}", index + 1);
        }
    }
    if record.duration_ms > 0 {
        field(
            out,
            "Duration",
            &format!("{:.1}s", record.duration_ms as f64 / 1000.0),
        );
    }
    field(
        out,
        "Stats",
        &format!(
            "{} likes, {} comments, {} favorites, {} shares",
            record.stats.digg_count,
            record.stats.comment_count,
            record.stats.collect_count,
            record.stats.share_count
        ),
    );
    field(out, "Strategy", record.source.as_str());
    field(out, "Fetched at", &record.fetched_at.to_rfc3339());
}

pub fn format_stats(stats: &ServiceStats, format: StatsFormat) -> Result<String> {
    match format {
        StatsFormat::Pretty => Ok(format_stats_pretty(stats)),
        StatsFormat::Json => Ok(serde_json::to_string_pretty(stats)?),
        StatsFormat::Prometheus => Ok(render_prometheus(&stats.metrics)),
    }
}

fn format_stats_pretty(stats: &ServiceStats) -> String {
    let mut out = String::new();

    out.push_str("Strategies:\n");
    if stats.strategies.is_empty() {
        out.push_str("  (none registered)\n");
    }
    for s in &stats.strategies {
        let state = if s.active { "active" } else { "inactive" };
        let _ = writeln!(
            out,
            "  {:<8} score {:>3}  weight {:.2}  ok {}  fail {:.1}  avg {} ms  {state}",
            s.strategy.as_str(),
            s.score,
            s.effective_weight,
            s.successes,
            s.failures,
            s.avg_response_time_ms,
        );
        if let Some(error) = &s.last_error {
            let _ = writeln!(out, "           last error: {error}");
        }
    }

    out.push_str("\nCache:\n");
    field(&mut out, "Memory entries", &stats.cache.memory_entries.to_string());
    field(&mut out, "File entries", &stats.cache.file_entries.to_string());
    field(&mut out, "Hits", &stats.cache.hits.to_string());
    field(&mut out, "Misses", &stats.cache.misses.to_string());
    field(&mut out, "Evictions", &stats.cache.evictions.to_string());

    out.push_str("\nProxies:\n");
    if stats.proxies.is_empty() {
        out.push_str("  (none configured)\n");
    }
    for p in &stats.proxies {
        let blocked = if p.blocked { "  blocked" } else { "" };
        let _ = writeln!(
            out,
            "  {}  ok {}  fail {}  streak {}{blocked}",
            p.url, p.successes, p.failures, p.consecutive_failures
        );
    }

    let m = &stats.metrics;
    out.push_str("\nMetrics:\n");
    field(&mut out, "Uptime", &format!("{} s", m.uptime_secs));
    field(&mut out, "Requests", &m.requests.to_string());
    field(
        &mut out,
        "Cache",
        &format!("{} hits, {} misses", m.cache_hits, m.cache_misses),
    );
    field(
        &mut out,
        "Parses",
        &format!("{} ok, {} failed", m.parse_successes, m.parse_failures),
    );
    field(
        &mut out,
        "Downloads",
        &format!(
            "{} completed, {} failed, {} bytes",
            m.downloads_completed, m.downloads_failed, m.download_bytes
        ),
    );
    field(
        &mut out,
        "Latency (5m)",
        &format!(
            "p50 {} ms, p90 {} ms, p99 {} ms ({} samples)",
            m.window.p50_ms, m.window.p90_ms, m.window.p99_ms, m.window.samples
        ),
    );

    out
}

fn field(out: &mut String, label: &str, value: &str) {
    let _ = writeln!(out, "  {:<16} {value}", format!("{label}:"));
}

pub fn write_output(content: &str, output_file: Option<&Path>) -> Result<()> {
    match output_file {
        Some(path) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(path, content)?;
        }
        None => {
            println!("{}", content.trim_end_matches('\n'));
            std::io::stdout().flush()?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use douyin_parser::StrategyKind;
    use std::time::Duration;

    fn outcome() -> ParseOutcome {
        let mut record = VideoRecord::new("7345678901234567890", StrategyKind::Api);
        record.title = "海边日落".to_string();
        record.author.nickname = "摄影师".to_string();
        record.author.uid = "1234".to_string();
        record.video_url = Some("https://cdn.example.com/v.mp4".to_string());
        record.duration_ms = 15_300;
        record.stats.digg_count = 42;
        ParseOutcome {
            record,
            cache_status: CacheStatus::Miss,
            elapsed: Duration::from_millis(321),
        }
    }

    #[test]
    fn pretty_outcome_lists_fields() {
        let text = format_outcome(&outcome(), OutputFormat::Pretty).unwrap();
        assert!(text.contains("Aweme ID:"));
        assert!(text.contains("7345678901234567890"));
        assert!(text.contains("海边日落"));
        assert!(text.contains("摄影师 (uid 1234)"));
        assert!(text.contains("15.3s"));
        assert!(text.contains("321 ms"));
    }

    #[test]
    fn json_outcome_round_trips_fields() {
        let text = format_outcome(&outcome(), OutputFormat::Json).unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["record"]["aweme_id"], "7345678901234567890");
        assert_eq!(value["cache_status"], "miss");
        assert_eq!(value["elapsed_ms"], 321);
    }

    #[test]
    fn compact_json_has_no_newlines() {
        let text = format_outcome(&outcome(), OutputFormat::JsonCompact).unwrap();
        assert!(!text.contains('\n'));
    }
}
