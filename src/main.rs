use anyhow::{Context, Result};
use clap::Parser;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use video_scribe::api::{ValidateResponse, Service};
use video_scribe::cli::{Cli, Commands, LogFormat};
use video_scribe::config::{Config, TranscriptionBackend};
use video_scribe::extractors::youtube::YtDlpSource;
use video_scribe::output::print_to_console;
use video_scribe::pipeline::{cancel_pair, MetadataValidator};
use video_scribe::storage::RecordQuery;
use video_scribe::utils::{self, ExternalTool};

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.log_format);

    let config = Config::load(cli.config.as_deref()).await?;

    let success = match cli.command {
        Commands::Process { url } => {
            prepare_dirs(&config)?;
            let service = Service::from_config(&config).await?;

            let spinner = spinner(cli.quiet, format!("Processing {}", url));
            let started = Instant::now();
            let (handle, signal) = cancel_pair();

            let run = service.process_with_cancel(&url, signal);
            tokio::pin!(run);
            let response = tokio::select! {
                response = &mut run => response,
                _ = tokio::signal::ctrl_c() => {
                    spinner.set_message("Cancelling...");
                    handle.cancel();
                    run.await
                }
            };
            spinner.finish_and_clear();

            if response.success {
                eprintln!(
                    "{} Processed {} in {}",
                    style("✓").green(),
                    url,
                    utils::format_duration(started.elapsed().as_secs_f64())
                );
            } else if let Some(stage) = response.stage {
                eprintln!("{} Failed while {}", style("✗").red(), stage);
            }
            print_to_console(&response)?;
            response.success
        }
        Commands::Validate { url } => {
            // Metadata only; no record store or object storage needed
            let validator = MetadataValidator::new(
                Arc::new(YtDlpSource::new(&config.source.yt_dlp_path)),
                config.source.max_duration_seconds,
            );
            let response = ValidateResponse::from(validator.validate(&url).await);
            print_to_console(&response)?;
            response.success
        }
        Commands::List {
            limit,
            youtube_id,
            tag,
            since,
        } => {
            let service = Service::from_config(&config).await?;
            let response = service
                .list_records(&RecordQuery {
                    youtube_id,
                    tag,
                    created_after: since,
                    limit,
                })
                .await;
            print_to_console(&response)?;
            response.success
        }
        Commands::Show { youtube_id } => {
            let service = Service::from_config(&config).await?;
            let response = service.get_record(&youtube_id).await;
            print_to_console(&response)?;
            response.success
        }
        Commands::Tags => {
            let service = Service::from_config(&config).await?;
            let response = service.list_tags().await;
            print_to_console(&response)?;
            response.success
        }
        Commands::Tag { youtube_id, tag } => {
            let service = Service::from_config(&config).await?;
            let response = service.tag_record(&youtube_id, &tag).await;
            print_to_console(&response)?;
            response.success
        }
        Commands::Config { show } => {
            if show {
                config.display();
            } else {
                let path = match cli.config {
                    Some(path) => path,
                    None => Config::config_path()?,
                };
                println!("Configuration file: {}", path.display());
                println!("Edit it directly, or run `scribe config --show` to see the effective values.");
            }
            true
        }
        Commands::Doctor => doctor(&config).await,
    };

    Ok(if success { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}

fn init_tracing(verbose: bool, format: LogFormat) {
    let default_filter = if verbose { "video_scribe=debug" } else { "video_scribe=info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_filter.into());

    // stdout carries the JSON envelopes, logs go to stderr
    let (text, json) = match format {
        LogFormat::Text => (
            Some(tracing_subscriber::fmt::layer().with_writer(std::io::stderr)),
            None,
        ),
        LogFormat::Json => (
            None,
            Some(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr)),
        ),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(text)
        .with(json)
        .init();
}

/// Scratch and output roots are created once here, not per run
fn prepare_dirs(config: &Config) -> Result<()> {
    fs_err::create_dir_all(&config.app.scratch_dir).context("Failed to create scratch directory")?;
    fs_err::create_dir_all(&config.app.output_dir).context("Failed to create output directory")?;
    Ok(())
}

fn spinner(quiet: bool, message: String) -> ProgressBar {
    if quiet {
        return ProgressBar::hidden();
    }

    let progress = ProgressBar::new_spinner();
    progress.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed_precise}] {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    progress.set_message(message);
    progress.enable_steady_tick(Duration::from_millis(120));
    progress
}

async fn doctor(config: &Config) -> bool {
    let mut tools = vec![
        ExternalTool {
            command: &config.source.yt_dlp_path,
            probe_arg: "--version",
            purpose: "metadata lookup and download",
        },
        ExternalTool {
            command: "ffmpeg",
            probe_arg: "-version",
            purpose: "audio extraction",
        },
    ];
    if config.transcription.engine == TranscriptionBackend::Whisper {
        tools.push(ExternalTool {
            command: &config.transcription.whisper_path,
            probe_arg: "--help",
            purpose: "local transcription",
        });
    }

    let missing = utils::check_dependencies(&tools).await;
    if missing.is_empty() {
        println!("{} All external tools are available", style("✓").green());
    } else {
        println!("{} Missing external tools:", style("⚠️").yellow());
        for dep in &missing {
            println!("   • {}", dep);
        }
    }

    if config.translation.api_key.is_none() {
        println!("{} No translation API key (set OPENAI_API_KEY)", style("⚠️").yellow());
    }

    missing.is_empty()
}
