use std::path::Path;
use std::time::Duration;

use aweme_engine::{AwemeService, DownloadOptions, ParseOptions};
use douyin_parser::session::parse_netscape_cookies;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

use crate::cli::{OutputFormat, StatsFormat};
use crate::error::{CliError, Result};
use crate::output::{format_outcome, format_stats, write_output};

pub struct CommandExecutor {
    service: AwemeService,
}

impl CommandExecutor {
    pub fn new(service: AwemeService) -> Self {
        Self { service }
    }

    pub async fn parse_single(
        &self,
        input: &str,
        force: bool,
        format: OutputFormat,
        output_file: Option<&Path>,
    ) -> Result<()> {
        let options = ParseOptions {
            force_refresh: force,
        };

        let pb = create_spinner("Parsing...");
        let outcome = self.service.parse(input, &options).await;
        pb.finish_and_clear();

        let outcome = outcome?;
        write_output(&format_outcome(&outcome, format)?, output_file)
    }

    pub async fn batch(
        &self,
        file: &Path,
        max_concurrent: usize,
        format: OutputFormat,
        continue_on_error: bool,
    ) -> Result<()> {
        let contents = std::fs::read_to_string(file)?;
        let inputs: Vec<String> = contents
            .lines()
            .filter_map(|line| {
                let line = line.trim();
                if line.is_empty() || line.starts_with('#') {
                    None
                } else {
                    Some(line.to_string())
                }
            })
            .collect();

        if inputs.is_empty() {
            return Err(CliError::InvalidInput(format!(
                "no inputs found in {}",
                file.display()
            )));
        }

        let pb = create_spinner(&format!("Parsing {} input(s)...", inputs.len()));
        let results = self.service.parse_batch(&inputs, max_concurrent).await;
        pb.finish_and_clear();

        let mut failed = 0usize;
        match format {
            OutputFormat::Pretty => {
                for (input, result) in &results {
                    match result {
                        Ok(outcome) => {
                            println!("=== {input}");
                            print!("{}", format_outcome(outcome, OutputFormat::Pretty)?);
                        }
                        Err(e) => {
                            failed += 1;
                            println!("=== {input}");
                            println!("  error: {e}");
                        }
                    }
                }
            }
            OutputFormat::Json | OutputFormat::JsonCompact => {
                let lines: Vec<serde_json::Value> = results
                    .iter()
                    .map(|(input, result)| match result {
                        Ok(outcome) => serde_json::json!({
                            "input": input,
                            "outcome": outcome,
                        }),
                        Err(e) => {
                            failed += 1;
                            serde_json::json!({
                                "input": input,
                                "error": e.to_string(),
                            })
                        }
                    })
                    .collect();
                let text = if format == OutputFormat::Json {
                    serde_json::to_string_pretty(&lines)?
                } else {
                    serde_json::to_string(&lines)?
                };
                println!("{text}");
            }
        }

        if failed > 0 {
            warn!(failed, total = results.len(), "batch finished with failures");
            if !continue_on_error {
                return Err(CliError::BatchFailures {
                    failed,
                    total: results.len(),
                });
            }
        }
        Ok(())
    }

    pub async fn download(
        &self,
        input: &str,
        dir: &Path,
        with_cover: bool,
        overwrite: bool,
        no_progress: bool,
    ) -> Result<()> {
        let pb = create_spinner("Resolving...");
        let outcome = self.service.parse(input, &ParseOptions::default()).await;
        pb.finish_and_clear();
        let outcome = outcome?;

        let options = DownloadOptions {
            dir: dir.to_path_buf(),
            overwrite,
            with_cover,
            show_progress: !no_progress,
        };
        let stats = self.service.download(&outcome.record, &options).await?;

        info!(
            aweme_id = %outcome.record.aweme_id,
            completed = stats.completed,
            skipped = stats.skipped,
            failed = stats.failed,
            bytes = stats.bytes,
            "download finished"
        );
        println!(
            "Downloaded {} file(s) ({} bytes), skipped {}, failed {}",
            stats.completed, stats.bytes, stats.skipped, stats.failed
        );

        if stats.completed == 0 && stats.failed > 0 {
            return Err(CliError::DownloadFailed { total: stats.total });
        }
        Ok(())
    }

    pub async fn stats(&self, format: StatsFormat) -> Result<()> {
        let stats = self.service.stats().await;
        write_output(&format_stats(&stats, format)?, None)
    }

    pub async fn cache(&self, clear: bool, stats: bool) -> Result<()> {
        if clear {
            let removed = self.service.clear_cache().await?;
            println!("Cache cleared ({removed} stored record(s) removed)");
        } else if stats {
            let stats = self.service.stats().await;
            println!("{}", serde_json::to_string_pretty(&stats.cache)?);
        } else {
            println!("Use --clear to empty the cache or --stats to inspect it");
        }
        Ok(())
    }

    pub async fn shutdown(&self) {
        self.service.shutdown().await;
    }
}

/// Turns the `--cookies` argument into a cookie header string. A leading `@`
/// reads the value from a file; Netscape cookies.txt exports are converted.
pub fn resolve_cookies(spec: &str) -> Result<String> {
    let Some(path) = spec.strip_prefix('@') else {
        return Ok(spec.to_string());
    };

    let contents = std::fs::read_to_string(path)?;
    if contents.lines().any(|l| l.split('\t').count() == 7) {
        let pairs = parse_netscape_cookies(&contents);
        if pairs.is_empty() {
            return Err(CliError::InvalidInput(format!(
                "no cookies found in {path}"
            )));
        }
        Ok(pairs
            .into_iter()
            .map(|(name, value)| format!("{name}={value}"))
            .collect::<Vec<_>>()
            .join("; "))
    } else {
        Ok(contents.trim().to_string())
    }
}

fn create_spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.enable_steady_tick(Duration::from_millis(500));
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.cyan} {msg}")
            .unwrap(),
    );
    pb.set_message(message.to_string());
    pb
}
