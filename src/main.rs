use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::Value;
use tracing_subscriber::EnvFilter;

use veriops::client::RunsParams;
use veriops::config::Settings;
use veriops::metrics::compute_run_metrics;
use veriops::model::RunStatus;
use veriops::query::{self, DateRange, PageInfo, RunQuery, SortOrder, StepQuery};
use veriops::runbook::load_runbook;
use veriops::sample::{preset, sample_payloads};
use veriops::validate::validate_payload;
use veriops::{ApiError, VeriOpsClient};

#[derive(Parser)]
#[command(name = "veriops", version, about = "Validate, ingest and inspect VeriOps agent runs")]
struct Cli {
    /// YAML config file; environment variables override its values.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Check an events payload locally without sending it.
    Check { file: PathBuf },
    /// Check an events payload and send it if it is clean.
    Ingest { file: PathBuf },
    /// Print sample payloads.
    Sample {
        #[arg(long)]
        out_of_order: bool,
        /// Print every preset with its title instead of one payload.
        #[arg(long)]
        all: bool,
    },
    Health,
    Projects,
    Summary {
        project: String,
        #[arg(long, value_enum, default_value_t = DateRange::Day)]
        range: DateRange,
    },
    Runs {
        #[arg(long)]
        project: Option<String>,
        #[arg(long, default_value_t = 20)]
        limit: u32,
        #[arg(long, default_value_t = 0)]
        offset: u32,
        #[arg(long)]
        search: Option<String>,
        #[arg(long)]
        status: Option<String>,
        #[arg(long)]
        has_validation: bool,
        #[arg(long)]
        runbook: Option<String>,
        #[arg(long, value_enum)]
        range: Option<DateRange>,
        #[arg(long, value_enum, default_value_t = SortOrder::Newest)]
        sort: SortOrder,
    },
    /// Run detail with steps ordered by index.
    Run {
        id: String,
        /// Show only failed or errored steps.
        #[arg(long)]
        errors_only: bool,
    },
    Validations {
        id: String,
        #[arg(long, default_value_t = 20)]
        limit: u32,
        /// Print only the most recent verdict.
        #[arg(long)]
        latest: bool,
    },
    /// Validate a run against a runbook YAML file.
    ValidateRun {
        id: String,
        #[arg(long)]
        runbook: PathBuf,
    },
    DeleteRun { id: String },
    /// Pass rate, tokens and cost over a project's recent runs.
    Metrics {
        #[arg(long)]
        project: String,
        #[arg(long, value_enum, default_value_t = DateRange::Day)]
        range: DateRange,
        #[arg(long, default_value_t = 200)]
        limit: u32,
    },
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn read_payload(path: &Path) -> Result<Value> {
    let txt = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read payload: {}", path.display()))?;
    serde_json::from_str(&txt).context("Payload must be valid JSON")
}

/// Prints diagnostics and fails when the payload must not be sent.
fn check_payload(payload: &Value) -> Result<()> {
    let diags = validate_payload(payload)?;
    if diags.is_empty() {
        return Ok(());
    }
    for d in &diags {
        println!("{d}");
    }
    bail!("{} diagnostic(s); payload not accepted", diags.len());
}

#[derive(Serialize)]
struct RunsOutput {
    runs: Vec<veriops::model::Run>,
    page: PageInfo,
    runbooks: Vec<String>,
}

async fn run(cli: Cli) -> Result<()> {
    let settings = Settings::load(cli.config.as_deref()).await?;
    if settings.api_base_url.is_none() {
        tracing::warn!("API base URL is not set. Define VERIOPS_API_BASE_URL to enable backend calls.");
    }
    let client = || -> Result<VeriOpsClient> { VeriOpsClient::new(settings.client_config()?) };

    match cli.command {
        Command::Check { file } => {
            let payload = read_payload(&file).await?;
            check_payload(&payload)?;
            tracing::info!(file = %file.display(), "payload is valid");
        }
        Command::Ingest { file } => {
            let payload = read_payload(&file).await?;
            check_payload(&payload)?;
            let count = payload["events"].as_array().map_or(0, Vec::len);
            let resp = client()?.ingest_events(&payload).await?;
            tracing::info!(events = count, "events ingested");
            print_json(&resp)?;
        }
        Command::Sample { out_of_order, all } => {
            if all {
                print_json(&sample_payloads())?;
            } else {
                print_json(&preset(out_of_order))?;
            }
        }
        Command::Health => print_json(&client()?.health().await?)?,
        Command::Projects => print_json(&client()?.projects().await?)?,
        Command::Summary { project, range } => {
            print_json(&client()?.project_summary(&project, range.summary_limit()).await?)?
        }
        Command::Runs { project, limit, offset, search, status, has_validation, runbook, range, sort } => {
            let status = match status.as_deref().map(RunStatus::parse) {
                Some(RunStatus::Unknown) => bail!("unknown status filter; use passed, failed, warning, running or error"),
                other => other,
            };
            let resp = client()?
                .runs(&RunsParams { project_id: project, limit, offset })
                .await?;
            let q = RunQuery { search, status, has_validation, runbook, range, sort };
            print_json(&RunsOutput {
                page: PageInfo::compute(&resp, u64::from(limit), u64::from(offset)),
                runbooks: query::runbooks(&resp.runs),
                runs: q.apply(&resp.runs, Utc::now()),
            })?;
        }
        Command::Run { id, errors_only } => {
            let mut run = client()?.run(&id).await?;
            run.steps = run.steps.map(|steps| StepQuery { errors_only }.apply(&steps));
            print_json(&run)?;
        }
        Command::Validations { id, limit, latest } => {
            let c = client()?;
            let list = c.run_validations(&id, limit).await?;
            if latest {
                let run = if list.is_empty() { Some(c.run(&id).await?) } else { None };
                match query::latest_validation(&list, run.as_ref()) {
                    Some(v) => print_json(&v)?,
                    None => tracing::info!(run = %id, "run has not been validated"),
                }
            } else {
                print_json(&query::validations_newest_first(&list))?;
            }
        }
        Command::ValidateRun { id, runbook } => {
            let yaml = load_runbook(&runbook).await?;
            let result = client()?.validate_run(&id, &yaml).await?;
            tracing::info!(run = %id, status = ?result.status, "validation finished");
            print_json(&result)?;
        }
        Command::DeleteRun { id } => {
            client()?.delete_run(&id).await?;
            tracing::info!(run = %id, "run deleted");
        }
        Command::Metrics { project, range, limit } => {
            let resp = client()?.project_runs(&project, limit, 0).await?;
            print_json(&compute_run_metrics(&resp.runs, range, Utc::now()))?;
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let result = run(cli).await;
    if let Err(e) = &result {
        if let Some(api) = e.downcast_ref::<ApiError>() {
            tracing::error!(status = api.status, detail = ?api.detail(), "backend rejected the request");
        }
    }
    result
}
