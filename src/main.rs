use anyhow::{Context, Result};
use clap::Parser;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use clipcut::cli::{Cli, Commands};
use clipcut::config::Config;
use clipcut::job::{JobController, JobPhase};
use clipcut::source::ClipRequest;
use clipcut::timespec::TimeSpec;
use clipcut::utils;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let default_filter = if cli.verbose {
        "clipcut=debug"
    } else if cli.quiet {
        "clipcut=error"
    } else {
        "clipcut=info"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load().await?;

    match cli.command {
        Commands::Clip {
            url,
            file,
            start,
            end,
            output_dir,
        } => {
            warn_missing_dependencies(&config).await;
            run_clip(&config, url, file, &start, &end, output_dir, cli.quiet).await?;
        }
        Commands::Config { show } => {
            if show {
                config.display();
            } else {
                println!("Config file: {}", Config::config_path()?.display());
                println!("Run `clipcut config --show` to see the effective settings");
            }
        }
        Commands::Doctor => {
            let missing = utils::check_dependencies(&config.tools).await;
            if missing.is_empty() {
                println!("{} All required tools are available", style("✓").green());
            } else {
                println!("{} Missing tools:", style("✗").red());
                for tool in &missing {
                    println!("   • {}", tool);
                }
                std::process::exit(1);
            }
        }
    }

    Ok(())
}

async fn warn_missing_dependencies(config: &Config) {
    let missing = utils::check_dependencies(&config.tools).await;
    if !missing.is_empty() {
        eprintln!("⚠️  Dependency check warnings:");
        for dep in missing {
            eprintln!("   • {}", dep);
        }
        eprintln!("   (Continuing anyway - tools may be available)");
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_clip(
    config: &Config,
    url: Option<String>,
    file: Option<PathBuf>,
    start: &str,
    end: &str,
    output_dir: Option<PathBuf>,
    quiet: bool,
) -> Result<()> {
    let start = TimeSpec::parse(start)?;
    let end = TimeSpec::parse(end)?;

    let request = match (url, file) {
        (Some(url), None) => ClipRequest::remote(&url, start, end)?,
        (None, Some(path)) => ClipRequest::upload(path, start, end)?,
        // clap enforces exactly one source argument.
        _ => unreachable!("clap validates the source arguments"),
    };

    let controller = JobController::with_defaults(config);
    controller.submit(request)?;

    // Map Ctrl-C to cooperative cancellation of the running job.
    let cancel_controller = controller.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\nCancelling...");
            cancel_controller.cancel();
        }
    });

    let bar = if quiet {
        ProgressBar::hidden()
    } else {
        let bar = ProgressBar::new(100);
        bar.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {msg}")
                .expect("valid progress template"),
        );
        bar.enable_steady_tick(Duration::from_millis(100));
        bar
    };

    let status = loop {
        let status = controller.poll_progress();
        bar.set_message(status.message.clone());
        if let Some(percent) = status.percent {
            bar.set_position(percent as u64);
        }
        if status.phase.is_settled() {
            break status;
        }
        tokio::time::sleep(Duration::from_millis(200)).await;
    };
    bar.finish_and_clear();

    match status.phase {
        JobPhase::Done => {
            let clip = controller.claim_result()?;

            let target_dir = output_dir
                .or_else(|| config.app.output_dir.clone())
                .map_or_else(std::env::current_dir, Ok)?;
            fs_err::create_dir_all(&target_dir)?;

            let target = target_dir.join(&clip.filename);
            fs_err::copy(&clip.path, &target).context("Failed to save the finished clip")?;

            let size = fs_err::metadata(&target)?.len();
            println!(
                "{} Saved {} ({}, {})",
                style("✓").green(),
                style(target.display()).bold(),
                utils::format_duration((end.as_secs() - start.as_secs()) as f64),
                utils::format_file_size(size)
            );
            Ok(())
        }
        JobPhase::Cancelled => {
            println!("{} {}", style("✗").yellow(), status.message);
            Ok(())
        }
        _ => anyhow::bail!("{}", status.message),
    }
}
