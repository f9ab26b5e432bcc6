mod cli;
mod commands;
mod error;
mod output;

use crate::{
    cli::{Args, Commands},
    commands::{CommandExecutor, resolve_cookies},
    error::Result,
};
use aweme_engine::{AwemeService, ServiceConfig};
use clap::Parser;
use std::process;
use tracing::{Level, error};
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

#[tokio::main]
async fn main() {
    let result = run().await;

    if let Err(e) = result {
        error!("Application error: {}", e);
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

async fn run() -> Result<()> {
    let args = Args::parse();

    // Completions never need a service, and must not fail because of one.
    if let Commands::Completions { shell } = &args.command {
        use clap::CommandFactory;
        use clap_complete::generate;

        let mut cmd = Args::command();
        let bin_name = cmd.get_name().to_string();
        generate(*shell, &mut cmd, bin_name, &mut std::io::stdout());
        return Ok(());
    }

    init_logging(args.verbose, args.quiet);

    let mut builder = ServiceConfig::builder()
        .with_caching_enabled(!args.no_cache)
        .with_proxies(args.proxy.clone())
        .with_browser_disabled(args.no_browser);
    if let Some(dir) = args.cache_dir.clone() {
        builder = builder.with_cache_dir(dir);
    }
    if let Some(file) = args.proxy_file.clone() {
        builder = builder.with_proxy_file(file);
    }
    if let Some(spec) = args.cookies.as_deref() {
        builder = builder.with_cookies(resolve_cookies(spec)?);
    }

    let service = AwemeService::new(builder.build())?;
    let executor = CommandExecutor::new(service);

    let result = match args.command {
        Commands::Parse {
            input,
            force,
            output,
            output_file,
        } => {
            executor
                .parse_single(&input, force, output, output_file.as_deref())
                .await
        }

        Commands::Batch {
            file,
            max_concurrent,
            output,
            continue_on_error,
        } => {
            executor
                .batch(&file, max_concurrent, output, continue_on_error)
                .await
        }

        Commands::Download {
            input,
            dir,
            with_cover,
            overwrite,
            no_progress,
        } => {
            executor
                .download(&input, &dir, with_cover, overwrite, no_progress)
                .await
        }

        Commands::Stats { output } => executor.stats(output).await,

        Commands::Cache { clear, stats } => executor.cache(clear, stats).await,

        // Handled above, before the service was built.
        Commands::Completions { .. } => Ok(()),
    };

    executor.shutdown().await;
    result
}

fn init_logging(verbose: bool, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env().add_directive(Level::INFO.into())
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_level(verbose))
        .with(filter)
        .init();
}
