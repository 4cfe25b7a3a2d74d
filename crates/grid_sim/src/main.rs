use std::path::PathBuf;

use anyhow::{Context, bail};
use clap::{Parser, ValueEnum};
use grid_sim::{ExportFormat, ExportLayout, FileExporter, RunState, Scenario};
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Format {
    Json,
    Msgpack,
}

impl From<Format> for ExportFormat {
    fn from(format: Format) -> Self {
        match format {
            Format::Json => ExportFormat::Json,
            Format::Msgpack => ExportFormat::MessagePack,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Layout {
    ByElement,
    ByClass,
}

impl From<Layout> for ExportLayout {
    fn from(layout: Layout) -> Self {
        match layout {
            Layout::ByElement => ExportLayout::ByElement,
            Layout::ByClass => ExportLayout::ByClass,
        }
    }
}

#[derive(Parser)]
#[command(name = "grid_sim", about = "Run a grid simulation scenario")]
struct Args {
    /// Scenario document (JSON)
    scenario: PathBuf,

    /// JSON object merged over the scenario's options
    #[arg(long)]
    options: Option<String>,

    /// Results file (defaults to the scenario path with the format's extension)
    #[arg(short, long)]
    output: Option<PathBuf>,

    #[arg(short, long, value_enum, default_value = "json")]
    format: Format,

    #[arg(long, value_enum, default_value = "by-element")]
    layout: Layout,

    /// Log at debug level unless RUST_LOG is set
    #[arg(short, long)]
    verbose: bool,

    /// Validate the scenario and build its controllers without stepping
    #[arg(long)]
    dry_run: bool,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_level.into()),
        )
        .init();

    info!(path = %args.scenario.display(), "loading scenario");
    let text = std::fs::read_to_string(&args.scenario)
        .with_context(|| format!("cannot read {}", args.scenario.display()))?;
    let mut scenario = Scenario::from_json(&text)
        .with_context(|| format!("invalid scenario {}", args.scenario.display()))?;

    if let Some(overrides) = &args.options {
        let overrides: serde_json::Value =
            serde_json::from_str(overrides).context("--options is not valid JSON")?;
        scenario.options = scenario
            .options
            .with_overrides(&overrides)
            .context("cannot apply --options")?;
    }

    let format = ExportFormat::from(args.format);
    let output = args
        .output
        .clone()
        .unwrap_or_else(|| args.scenario.with_extension(format!("results.{}", format.extension())));
    let exporter = FileExporter::new(&output, format).with_layout(args.layout.into());

    let mut sim = scenario
        .build()
        .context("cannot build simulation")?
        .with_exporter(Box::new(exporter));

    if args.dry_run {
        info!(
            run_id = %sim.run_id(),
            steps = sim.total_steps(),
            controllers = sim.controllers().len(),
            "dry run, scenario is valid"
        );
        println!("{}", sim.total_steps());
        return Ok(());
    }

    match sim.run_simulation() {
        Ok(summary) => {
            if summary.stats.exhausted > 0 {
                warn!(
                    exhausted = summary.stats.exhausted,
                    worst_residual = summary.stats.worst_residual,
                    worst_step = ?summary.stats.worst_step,
                    "some tiers did not converge"
                );
            }
            info!(
                run_id = %summary.run_id,
                steps = summary.steps_run,
                resolves = summary.stats.total_resolves,
                output = %output.display(),
                "run finished"
            );
            Ok(())
        }
        Err(e) => {
            error!(run_id = %sim.run_id(), state = %sim.state(), "run failed");
            if sim.state() == RunState::Crashed {
                bail!("simulation crashed: {e}");
            }
            Err(e.into())
        }
    }
}
