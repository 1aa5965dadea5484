//! hlspack - HLS packaging for on-demand video
//!
//! Command line entry point: packages video files into HLS trees with
//! ffmpeg, lists and extracts package files, and runs the HTTP server.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, Level};
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use hlspack::cli::{Args, Commands};
use hlspack::config::Config;
use hlspack::pipeline::{PackageOutcome, PackagingMode};
use hlspack::server;
use hlspack::workflow::{ProcessRequest, Workflow};

const DEFAULT_CONFIG_FILE: &str = "hlspack.toml";

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    setup_logging(args.verbose)?;

    let config = match &args.command {
        Commands::InitConfig { .. } => Config::default(),
        _ => load_config(args.config.as_deref())?,
    };

    match args.command {
        Commands::Ingest { input, extract_audio_tracks } => {
            let workflow = Workflow::new(config)?;
            let file_name = input
                .file_name()
                .and_then(|n| n.to_str())
                .with_context(|| format!("Input has no usable file name: {}", input.display()))?
                .to_string();
            let file = tokio::fs::File::open(&input)
                .await
                .with_context(|| format!("Failed to open {}", input.display()))?;

            let spinner = spinner(&format!("Packaging {}", file_name));
            let outcome = workflow
                .ingest_upload(&file_name, file, PackagingMode::from_flag(extract_audio_tracks))
                .await;
            spinner.finish_and_clear();
            print_outcome(&outcome?);
        }
        Commands::Process { input, extract_audio_tracks, delete_source } => {
            let workflow = Workflow::new(config)?;
            let request = ProcessRequest {
                file_path: absolute(&input)?,
                extract_audio_tracks,
                delete_source_after_process: delete_source,
            };

            let spinner = spinner(&format!("Processing {}", input.display()));
            let outcome = workflow.process_existing(&request).await;
            spinner.finish_and_clear();
            print_outcome(&outcome?);
        }
        Commands::List { json } => {
            let workflow = Workflow::new(config)?;
            let packages = workflow.list_packages().await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&packages)?);
            } else if packages.is_empty() {
                println!("No packages found.");
            } else {
                println!("{:<30} {:<8} {:<8} {:<50}", "Name", "Tracks", "Legends", "Playlist");
                println!("{}", "-".repeat(96));
                for package in packages {
                    println!(
                        "{:<30} {:<8} {:<8} {:<50}",
                        package.name,
                        package.tracks.len(),
                        package.legends.len(),
                        package.playlist
                    );
                }
            }
        }
        Commands::Fetch { package, path, output } => {
            let workflow = Workflow::new(config)?;
            let mut served = workflow.fetch(&package, &path).await?;
            info!("Fetching {} ({})", served.path.display(), served.content_type);

            match output {
                Some(output) => {
                    let mut file = tokio::fs::File::create(&output).await?;
                    let copied = tokio::io::copy(&mut served.file, &mut file).await?;
                    println!("Wrote {} bytes to {}", copied, output.display());
                }
                None => {
                    let mut stdout = tokio::io::stdout();
                    tokio::io::copy(&mut served.file, &mut stdout).await?;
                }
            }
        }
        Commands::AttachSubtitle { package, input } => {
            let workflow = Workflow::new(config)?;
            let attached = workflow.attach_subtitle(&package, &input).await?;
            println!("Attached {}", attached.display());
        }
        Commands::Check => {
            let workflow = Workflow::new(config)?;
            workflow.engine().check_availability()?;
            let version = workflow.engine().version_info().await?;
            println!("ffmpeg and ffprobe are available");
            println!("{}", version);
        }
        Commands::Serve { bind } => {
            let bind = bind.unwrap_or_else(|| config.server.bind.clone());
            let workflow = Arc::new(Workflow::new(config)?);
            server::serve(workflow, &bind).await?;
        }
        Commands::InitConfig { output } => {
            config.save_to_file(&output)?;
            println!("Wrote default configuration to {}", output.display());
        }
    }

    Ok(())
}

/// Explicit path, then `hlspack.toml` in the current directory, then defaults
fn load_config(path: Option<&Path>) -> Result<Config> {
    let config = match path {
        Some(path) => Config::from_file(path)?,
        None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
            info!("Found {} in current directory, loading...", DEFAULT_CONFIG_FILE);
            Config::from_file(DEFAULT_CONFIG_FILE)?
        }
        None => Config::default(),
    };
    Ok(config)
}

fn absolute(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}

fn spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed_precise}] {msg}") {
        pb.set_style(style);
    }
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(120));
    pb
}

fn print_outcome(outcome: &PackageOutcome) {
    println!("Package:      {}", outcome.name);
    println!("Location:     {}", outcome.root.display());
    println!("Mode:         {:?}", outcome.mode);
    println!("Audio tracks: {}", outcome.audio_tracks);
    if outcome.source_deleted {
        println!("Source file deleted");
    }
}

/// Setup logging to both console and file
fn setup_logging(verbose: bool) -> Result<()> {
    let log_dir = std::env::current_dir()?.join(".hlspack").join("log");
    std::fs::create_dir_all(&log_dir)?;

    // Daily rotation
    let file_appender = rolling::daily(&log_dir, "hlspack.log");
    let (non_blocking_file, guard) = non_blocking(file_appender);
    // Keep the guard alive for the duration of the program
    std::mem::forget(guard);

    let log_level = if verbose { Level::DEBUG } else { Level::INFO };

    let console_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true);

    let file_layer = fmt::layer()
        .with_writer(non_blocking_file)
        .with_target(false)
        .with_thread_ids(true)
        .with_thread_names(true)
        .with_file(true)
        .with_line_number(true)
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive(log_level.into()))
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    info!("Logging initialized - console: {}, file: {}",
          log_level, log_dir.join("hlspack.log").display());

    Ok(())
}
