//! `scribe`: run clinical scribe pipeline handlers from the command line
//!
//! Each subcommand reads one JSON event (from `--event <FILE>` or stdin),
//! runs the matching handler with adapters built from configuration and
//! prints the JSON response on stdout. Logs go to stderr.
//!
//! ```bash
//! scribe route --event route.json
//! aws sqs receive-message ... | jq '{Records: .Messages}' | scribe process-queue
//! scribe monitor-usage --date 2025-03-01
//! scribe check-config --config scribe.toml
//! ```

use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Context;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use tracing::info;

use config_engine::PipelineConfig;
use logger_redacted::init_tracing;
use scribe_pipeline::{HandlerResponse, Pipeline};

#[derive(Parser, Debug)]
#[command(name = "scribe")]
#[command(about = "Run clinical scribe pipeline handlers against JSON events")]
#[command(version)]
struct Cli {
    /// Configuration file (TOML or YAML); SCRIBE_* variables override it
    #[arg(short, long, env = "SCRIBE_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Human-readable logs instead of JSON lines
    #[arg(long, global = true)]
    pretty_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start transcription for a recorded call
    Route(EventArgs),
    /// Handle a transcription job state-change event
    Callback(EventArgs),
    /// Generate a SOAP note from a transcript
    Generate(EventArgs),
    /// Replay a batch of retry queue messages
    ProcessQueue(EventArgs),
    /// Report daily token usage against the budget
    MonitorUsage {
        /// Day to report, defaults to today (UTC)
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// Store a generated note and notify the provider
    Finalize(EventArgs),
    /// Load and validate configuration, print a summary without secrets
    CheckConfig,
}

#[derive(clap::Args, Debug)]
struct EventArgs {
    /// JSON event file, `-` or absent for stdin
    #[arg(short, long)]
    event: Option<PathBuf>,
}

fn read_event(path: Option<&Path>) -> anyhow::Result<Value> {
    let raw = match path {
        Some(path) if path != Path::new("-") => {
            fs::read_to_string(path).with_context(|| format!("reading event file {}", path.display()))?
        }
        _ => {
            let mut raw = String::new();
            io::stdin().read_to_string(&mut raw).context("reading event from stdin")?;
            raw
        }
    };
    serde_json::from_str(&raw).context("event is not valid JSON")
}

fn config_summary(config: &PipelineConfig) -> Value {
    json!({
        "supabase": {
            "url": config.supabase.url,
            "service_key_set": config.supabase.service_key.is_some(),
        },
        "aws": {
            "region": config.aws.region,
            "output_bucket": config.aws.output_bucket,
        },
        "whisper": {
            "api_url": config.whisper.api_url,
            "model": config.whisper.model,
            "api_key_set": config.whisper.api_key.is_some(),
        },
        "bedrock": {
            "region": config.bedrock.region,
            "primary_model": config.bedrock.primary_model,
            "fallback_model": config.bedrock.fallback_model,
            "extraction_model": config.bedrock.extraction_model,
        },
        "generation": {
            "enable_fallback": config.generation.enable_fallback,
            "max_retry_attempts": config.generation.max_retry_attempts,
        },
        "retry_queue_configured": config.queue.retry_queue_url.is_some(),
        "usage": {
            "daily_token_limit": config.usage.daily_token_limit,
            "warning_threshold": config.usage.warning_threshold,
            "critical_threshold": config.usage.critical_threshold,
        },
        "notifications_enabled": config.notifications.enabled,
    })
}

fn print_json(value: &impl serde::Serialize) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_response(response: &HandlerResponse) -> anyhow::Result<ExitCode> {
    print_json(response)?;
    Ok(if response.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let mut config = PipelineConfig::load(cli.config.as_deref()).context("loading configuration")?;
    if cli.pretty_logs {
        config.logging.json = false;
    }
    init_tracing(&config.logging)?;

    if let Command::CheckConfig = cli.command {
        print_json(&config_summary(&config))?;
        return Ok(ExitCode::SUCCESS);
    }

    let pipeline = Pipeline::from_config(&config).await?;
    info!(command = ?cli.command, "Running handler");

    match cli.command {
        Command::Route(args) => print_response(&pipeline.handle_route(read_event(args.event.as_deref())?).await),
        Command::Callback(args) => print_response(&pipeline.handle_callback(read_event(args.event.as_deref())?).await),
        Command::Generate(args) => print_response(&pipeline.handle_generate(read_event(args.event.as_deref())?).await),
        Command::ProcessQueue(args) => {
            let response = pipeline
                .handle_process_queue(read_event(args.event.as_deref())?)
                .await?;
            print_json(&response)?;
            Ok(ExitCode::SUCCESS)
        }
        Command::MonitorUsage { date } => {
            let event = date.map_or(Value::Null, |date| json!({ "date": date }));
            print_response(&pipeline.handle_monitor_usage(event).await)
        }
        Command::Finalize(args) => print_response(&pipeline.handle_finalize(read_event(args.event.as_deref())?).await),
        Command::CheckConfig => Ok(ExitCode::SUCCESS),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use std::io::Write;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_subcommand_parsing() {
        let cli = Cli::try_parse_from(["scribe", "--config", "scribe.toml", "process-queue", "--event", "batch.json"]).unwrap();
        assert_eq!(cli.config.as_deref(), Some(Path::new("scribe.toml")));
        match cli.command {
            Command::ProcessQueue(args) => assert_eq!(args.event.as_deref(), Some(Path::new("batch.json"))),
            other => panic!("unexpected command: {other:?}"),
        }

        let cli = Cli::try_parse_from(["scribe", "monitor-usage", "--date", "2025-03-01"]).unwrap();
        assert!(matches!(cli.command, Command::MonitorUsage { date: Some(_) }));
    }

    #[test]
    fn test_read_event_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"s3_uri": "s3://recordings/a.mp3", "appointment_id": "a-1"}}"#).unwrap();

        let event = read_event(Some(file.path())).unwrap();
        assert_eq!(event["appointment_id"], "a-1");
    }

    #[test]
    fn test_read_event_rejects_invalid_json() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();
        assert!(read_event(Some(file.path())).is_err());
    }

    #[test]
    fn test_config_summary_hides_secrets() {
        let summary = config_summary(&PipelineConfig::default());
        assert_eq!(summary["supabase"]["service_key_set"], false);
        assert_eq!(summary["generation"]["max_retry_attempts"], 5);
        assert!(!summary.to_string().contains("service_key\":"));
    }
}
