//! Transfection runner CLI
//!
//! ```bash
//! # Print the compiled plan as a table
//! transfect-runner plan design.csv
//!
//! # JSON plan for a single-rack bench
//! transfect-runner --single-rack plan design.csv --format json --output plan.json
//!
//! # Validate volumes and addresses only
//! transfect-runner check design.csv
//!
//! # Dry run with operator prompts at each checkpoint
//! transfect-runner simulate design.csv --interactive
//! ```

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use planner::{PlanError, TransferPlan, TransferPlanner};
use tokio_util::sync::CancellationToken;
use tracing::info;

use transfect_runner::{
    load_design, AutoAcknowledge, CheckpointGate, DesignTableError, LoggingActuator,
    PlanExecutor, RunnerConfig, StdinGate,
};

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Bench config TOML (overrides TRANSFECT_CONFIG)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Use the single tube-rack bench profile instead of the config file
    #[arg(long, global = true, default_value_t = false)]
    single_rack: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Compile a design table into a transfer plan
    Plan {
        design: PathBuf,
        #[arg(long, value_enum, default_value_t = Format::Table)]
        format: Format,
        /// Write the plan here instead of stdout
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Validate a design table without compiling
    Check { design: PathBuf },
    /// Execute a plan against the logging actuator
    Simulate {
        design: PathBuf,
        /// Wait for Enter at every checkpoint
        #[arg(long, default_value_t = false)]
        interactive: bool,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum Format {
    Table,
    Json,
}

fn planner_error(err: PlanError) -> anyhow::Error {
    anyhow::anyhow!(err.with_suggestion())
}

fn table_error(err: DesignTableError) -> anyhow::Error {
    anyhow::anyhow!(err.with_suggestion())
}

fn compile(planner: &TransferPlanner, design: &Path) -> Result<TransferPlan> {
    let rows = load_design(design, planner.config()).map_err(table_error)?;
    planner.compile(&rows).map_err(planner_error)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args = Args::parse();
    let mut config = RunnerConfig::load(args.config.as_deref())?;
    if args.single_rack {
        config.protocol = planner::PlannerConfig::single_rack();
    }
    let planner = TransferPlanner::new(config.protocol.clone()).map_err(planner_error)?;
    info!(
        containers = planner.config().number_of_containers(),
        excess = planner.config().excess,
        "Planner ready"
    );

    match args.command {
        Command::Plan {
            design,
            format,
            output,
        } => {
            let plan = compile(&planner, &design)?;
            let rendered = match format {
                Format::Table => plan.render_table(),
                Format::Json => serde_json::to_string_pretty(&plan)?,
            };
            match output {
                Some(path) => {
                    std::fs::write(&path, rendered)
                        .with_context(|| format!("Failed to write plan to {}", path.display()))?;
                    info!(path = %path.display(), steps = plan.steps.len(), "Plan written");
                }
                None => println!("{rendered}"),
            }
        }
        Command::Check { design } => {
            let rows = load_design(&design, planner.config()).map_err(table_error)?;
            let entries = planner.preflight(&rows).map_err(planner_error)?;
            info!(rows = rows.len(), entries = entries.len(), "Design table is valid");
        }
        Command::Simulate {
            design,
            interactive,
        } => {
            let plan = compile(&planner, &design)?;

            let cancel = CancellationToken::new();
            let ctrl_c = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::warn!("Interrupt received, stopping after the current step");
                    ctrl_c.cancel();
                }
            });

            let mut actuator = LoggingActuator::default();
            let mut gate: Box<dyn CheckpointGate> = if interactive && !config.run.auto_acknowledge
            {
                Box::new(StdinGate::stdin())
            } else {
                Box::new(AutoAcknowledge)
            };

            let report = PlanExecutor::new()
                .run(&plan, &mut actuator, gate.as_mut(), &cancel)
                .await?;

            if let Some(path) = &config.run.report_path {
                let json = serde_json::to_string_pretty(&report)?;
                std::fs::write(path, json)
                    .with_context(|| format!("Failed to write run report to {}", path.display()))?;
                info!(path = %path.display(), "Run report written");
            }
            info!(
                run_id = %report.run_id,
                operations = report.operations_executed,
                checkpoints = report.checkpoints.len(),
                "Simulation finished"
            );
        }
    }

    Ok(())
}
