//! `intervu` command-line host for the interview pipeline.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{anyhow, Context};
use clap::{Parser, Subcommand};
use futures::{StreamExt, TryStreamExt};
use serde_json::json;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use intervu_models::{AnalysisResult, Requester};
use intervu_pipeline::{PipelineConfig, PipelineController, PipelineOutcome};

#[derive(Parser)]
#[command(name = "intervu", version, about = "Record or upload an interview and get structured feedback")]
struct Cli {
    /// User the records belong to
    #[arg(long, env = "INTERVU_USER_ID", global = true)]
    user: Option<String>,

    /// Display name sent with the analysis request
    #[arg(long, env = "INTERVU_USER_NAME", global = true)]
    name: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Analyze a video file
    Analyze {
        file: PathBuf,
        /// Send the video with the analysis request instead of uploading first
        #[arg(long)]
        direct: bool,
        /// Comma-separated skills to focus on
        #[arg(long, value_delimiter = ',')]
        skills: Vec<String>,
    },
    /// Record from the camera, then analyze
    Record {
        /// Stop after this many seconds (the configured ceiling still applies)
        #[arg(long)]
        seconds: Option<u64>,
        #[arg(long)]
        direct: bool,
        #[arg(long, value_delimiter = ',')]
        skills: Vec<String>,
    },
    /// List previous analyses, newest first
    History {
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Print the JSON schema of an analysis result
    Schema,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow!("Failed to install rustls crypto provider"))?;

    dotenvy::dotenv().ok();
    init_tracing()?;

    let cli = Cli::parse();

    if let Command::Schema = cli.command {
        println!("{}", serde_json::to_string_pretty(&AnalysisResult::json_schema())?);
        return Ok(());
    }

    let user = cli
        .user
        .ok_or_else(|| anyhow!("--user or INTERVU_USER_ID is required"))?;
    let mut requester = Requester::new(user);
    if let Some(name) = cli.name {
        requester = requester.with_display_name(name);
    }

    let config = PipelineConfig::from_env();
    info!("Pipeline config: {:?}", config);

    match cli.command {
        Command::Analyze {
            file,
            direct,
            skills,
        } => {
            let pipeline = PipelineController::from_config(&config, requester)
                .await?
                .with_skills(skills);
            pipeline
                .accept_file(&file)
                .await
                .with_context(|| format!("cannot use {}", file.display()))?;
            let outcome = run(&pipeline, direct).await?;
            print_outcome(&outcome)?;
        }
        Command::Record {
            seconds,
            direct,
            skills,
        } => {
            let pipeline = PipelineController::from_config(&config, requester)
                .await?
                .with_skills(skills);
            let preview = pipeline.start_capture().await?;
            info!(stream_id = %preview.stream_id, source = %preview.source, "Recording, press Ctrl-C to stop");

            let limit = seconds.map(Duration::from_secs).unwrap_or(config.max_recording);
            let asset = tokio::select! {
                asset = pipeline.wait_for_auto_stop() => asset?,
                _ = tokio::time::sleep(limit) => pipeline.stop_capture().await?,
                _ = tokio::signal::ctrl_c() => pipeline.stop_capture().await?,
            };
            info!(size_bytes = asset.size_bytes, "Recording ready");

            let outcome = run(&pipeline, direct).await?;
            print_outcome(&outcome)?;
        }
        Command::History { limit } => {
            let pipeline = PipelineController::from_config(&config, requester).await?;
            let records: Vec<_> = pipeline.history().take(limit).try_collect().await?;
            println!("{}", serde_json::to_string_pretty(&records)?);
        }
        Command::Schema => {}
    }

    Ok(())
}

async fn run(pipeline: &PipelineController, direct: bool) -> anyhow::Result<PipelineOutcome> {
    let mut progress = pipeline.subscribe_progress();
    let reporter = tokio::spawn(async move {
        while progress.changed().await.is_ok() {
            let percent = *progress.borrow_and_update();
            info!(percent, "Upload progress");
        }
    });

    let result = tokio::select! {
        outcome = async {
            if direct {
                pipeline.analyze_direct().await
            } else {
                pipeline.analyze_video().await
            }
        } => outcome,
        _ = tokio::signal::ctrl_c() => {
            pipeline.cancel().await;
            Err(intervu_pipeline::PipelineError::Cancelled)
        }
    };
    reporter.abort();

    match result {
        Ok(outcome) => Ok(outcome),
        Err(e) => match e.kind() {
            Some(kind) => Err(anyhow!("{} ({})", e, kind)),
            None => Err(e.into()),
        },
    }
}

fn print_outcome(outcome: &PipelineOutcome) -> anyhow::Result<()> {
    if !outcome.analysis.is_live() {
        warn!("Live analysis was unavailable; showing the degraded result");
    }
    if let Some(error) = &outcome.persistence_error {
        warn!(error = %error, "Analysis could not be saved");
    }

    let report = json!({
        "source": outcome.analysis.source,
        "isLive": outcome.analysis.is_live(),
        "recordId": outcome.record.as_ref().map(|r| r.id.to_string()),
        "createdAt": outcome.record.as_ref().map(|r| r.created_at),
        "persistenceError": outcome.persistence_error,
        "analysis": outcome.analysis.result,
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn init_tracing() -> anyhow::Result<()> {
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info"))
        .add_directive("intervu=info".parse()?)
        .add_directive("hyper=warn".parse()?);

    // Logs go to stderr so stdout carries only the JSON report.
    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }
    Ok(())
}
