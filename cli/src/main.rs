use std::time::Duration;

use anyhow::Context;
use chart_core::Patient;
use chart_fhir::{render_view, views, ViewRequest};
use chart_loader::{load_many, LoadConfig, Sources};
use chrono::{NaiveDate, Utc};
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(
    name = "chart-cli",
    about = "Load FHIR bundles and print patient chart summaries or views."
)]
struct Args {
    /// Bundle files or URLs.
    #[arg(conflicts_with = "dir", required_unless_present = "dir")]
    sources: Vec<String>,

    /// Directory or listing URL to discover `.json` bundles in.
    #[arg(short, long)]
    dir: Option<String>,

    /// Sources fetched concurrently per chunk.
    #[arg(long, default_value_t = 5)]
    chunk_size: usize,

    /// Stop at the first failing source.
    #[arg(long)]
    fail_fast: bool,

    /// Per-source timeout in seconds.
    #[arg(long, default_value_t = 30)]
    timeout_secs: u64,

    /// View request as JSON, e.g. '{"view":"vitalTrend","query":"weight"}'.
    #[arg(long)]
    view: Option<String>,

    /// Reference date (YYYY-MM-DD) for age-dependent views.
    #[arg(long)]
    today: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let view: Option<ViewRequest> = args
        .view
        .as_deref()
        .map(serde_json::from_str::<ViewRequest>)
        .transpose()
        .context("Cannot parse --view request")?;
    let today = match args.today.as_deref() {
        Some(text) => chart_fhir::parse_date(text)
            .with_context(|| format!("Invalid --today date {text:?}"))?,
        None => Utc::now().date_naive(),
    };

    let sources = match args.dir {
        Some(dir) => Sources::Directory(dir),
        None => Sources::Locations(args.sources),
    };
    let config = LoadConfig {
        chunk_size: args.chunk_size,
        continue_on_error: !args.fail_fast,
        timeout: Duration::from_secs(args.timeout_secs),
        ..LoadConfig::default()
    }
    .with_progress(|progress| {
        tracing::info!(
            processed = progress.processed,
            total = progress.total,
            failed = progress.failed,
            "progress"
        );
    });

    let report = load_many(sources, config)
        .await
        .context("Loading bundles failed")?;

    match view {
        Some(request) => {
            let rendered = report
                .patients
                .iter()
                .map(|patient| -> serde_json::Result<serde_json::Value> {
                    let view = render_view(patient, &request, today)?;
                    Ok(serde_json::json!({ "patient": patient.id, "view": view }))
                })
                .collect::<serde_json::Result<Vec<_>>>()?;
            println!("{}", serde_json::to_string_pretty(&rendered)?);
        }
        None => {
            for patient in &report.patients {
                println!("{}", describe(patient, today));
            }
        }
    }

    for error in &report.errors {
        eprintln!("failed: {} ({})", error.location, error.message);
    }
    eprintln!(
        "Loaded {} of {} bundles, {} failed",
        report.summary.successful, report.summary.total, report.summary.failed
    );

    Ok(())
}

fn describe(patient: &Patient, today: NaiveDate) -> String {
    let age = views::age_on(patient, today)
        .map(|age| age.to_string())
        .unwrap_or_else(|| "?".to_string());

    format!(
        "{} | {} | age {} | resources: {} | events: {} | active conditions: {}",
        patient.id.as_deref().unwrap_or("-"),
        patient.display_name().unwrap_or_else(|| "(unnamed)".to_string()),
        age,
        patient.resource_count(),
        views::event_history(patient).len(),
        views::active_conditions(patient).len(),
    )
}
