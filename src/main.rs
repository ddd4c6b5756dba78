//! Sheetflow CLI - run spreadsheet workflows over JSON tables

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use colored::Colorize;

use sheetflow::storage::{load_table, load_workflow};
use sheetflow::{
    Engine, ExecutionRecord, FixSuggestion, OutputStore, RunResult, SheetflowConfig,
    SheetflowError, Table, Workflow,
};

#[derive(Parser)]
#[command(name = "sheetflow")]
#[command(about = "Sheetflow - declarative spreadsheet workflows")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a workflow and write its output tables
    Run {
        /// Workflow file (.json, .yaml or .yml)
        workflow: PathBuf,

        /// Input table as a JSON array of records
        input: PathBuf,

        /// Output directory (default: config, then ./uploads)
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Abort the run after this many seconds
        #[arg(short, long)]
        timeout: Option<u64>,
    },

    /// Run a workflow without writing anything and print the first rows
    Preview {
        /// Workflow file (.json, .yaml or .yml)
        workflow: PathBuf,

        /// Input table as a JSON array of records
        input: PathBuf,

        /// Rows shown before and after (default: 20)
        #[arg(short = 'n', long)]
        max_rows: Option<usize>,
    },

    /// Check a workflow against an input table without running it
    Validate {
        /// Workflow file (.json, .yaml or .yml)
        workflow: PathBuf,

        /// Input table as a JSON array of records
        input: PathBuf,
    },

    /// List the available step types
    Rules,
}

#[tokio::main]
async fn main() {
    // Load .env file (ignore if not present)
    let _ = dotenvy::dotenv();

    // Logs go to stderr so stdout stays machine-readable
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match SheetflowConfig::load().and_then(SheetflowConfig::with_env) {
        Ok(config) => dispatch(cli.command, &config).await,
        Err(e) => Err(e.into()),
    };

    if let Err(e) = result {
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        let suggestion = e
            .chain()
            .find_map(|cause| cause.downcast_ref::<SheetflowError>())
            .and_then(|err| err.fix_suggestion());
        if let Some(suggestion) = suggestion {
            eprintln!("  {} {}", "Fix:".yellow(), suggestion);
        }
        std::process::exit(1);
    }
}

async fn dispatch(command: Commands, config: &SheetflowConfig) -> anyhow::Result<()> {
    match command {
        Commands::Run {
            workflow,
            input,
            out,
            timeout,
        } => {
            let out = out.unwrap_or_else(|| config.output_dir());
            let timeout = match timeout {
                Some(secs) if secs > 0 => Some(Duration::from_secs(secs)),
                Some(_) => None,
                None => config.run_timeout(),
            };
            run_workflow(&workflow, &input, &out, timeout).await
        }
        Commands::Preview {
            workflow,
            input,
            max_rows,
        } => preview_workflow(&workflow, &input, max_rows.unwrap_or(config.preview_rows())),
        Commands::Validate { workflow, input } => validate_workflow(&workflow, &input),
        Commands::Rules => {
            list_rules();
            Ok(())
        }
    }
}

fn load_inputs(workflow: &Path, input: &Path) -> anyhow::Result<(Workflow, Table)> {
    let wf = load_workflow(workflow)
        .with_context(|| format!("Failed to load workflow {}", workflow.display()))?;
    let table = load_table(input)
        .with_context(|| format!("Failed to load input table {}", input.display()))?;
    Ok((wf, table))
}

async fn run_workflow(
    workflow_path: &Path,
    input_path: &Path,
    out: &Path,
    timeout: Option<Duration>,
) -> anyhow::Result<()> {
    let (workflow, table) = load_inputs(workflow_path, input_path)?;
    let store = OutputStore::new(out);

    let mut record = ExecutionRecord::new();
    record.start()?;
    println!(
        "{} Execution {} started ({} rows)",
        "→".cyan(),
        record.id.to_string().cyan().bold(),
        table.row_count()
    );

    let outcome = run_recorded(Engine::new(), &store, &mut record, table, workflow, timeout).await;
    let path = store.execution_path(&record.id);

    match outcome {
        Ok(result) => {
            for entry in &result.logs {
                println!(
                    "  [{}] {}: {} ({} rows)",
                    entry.step_index, entry.step_type, entry.message, entry.affected_rows
                );
            }
            for file in &record.output_files {
                println!(
                    "  {} {} → {} ({} rows)",
                    "✓".green(),
                    file.sheet.bold(),
                    file.path.display(),
                    file.rows
                );
            }
            println!("{} Execution succeeded", "✓".green());
            println!("  Record: {}", path.display());
            Ok(())
        }
        Err(err) => {
            if record.status.is_terminal() {
                eprintln!("  Record: {}", path.display());
            }
            Err(err.into())
        }
    }
}

/// Run the engine, write its outputs and persist the finished record
///
/// `record` must be running. Whatever the outcome, it ends up `success` or
/// `failed` on disk, unless persisting the record itself fails.
async fn run_recorded(
    engine: Engine,
    store: &OutputStore,
    record: &mut ExecutionRecord,
    table: Table,
    workflow: Workflow,
    timeout: Option<Duration>,
) -> Result<RunResult, SheetflowError> {
    let outcome = match execute(engine, table, workflow, timeout).await {
        Ok(result) => store
            .save_tables(&record.id, &result.outputs)
            .map(|files| (result, files)),
        Err(err) => Err(err),
    };

    match outcome {
        Ok((result, files)) => {
            record.succeed(result.logs.clone(), files)?;
            store.save_execution(record)?;
            Ok(result)
        }
        Err(err) => {
            record.fail(err.to_string())?;
            store.save_execution(record)?;
            Err(err)
        }
    }
}

/// Run the engine on a blocking worker, optionally bounded in time
///
/// A timed-out worker cannot be interrupted; it is left to finish on its own
/// and its result is discarded.
async fn execute(
    engine: Engine,
    table: Table,
    workflow: Workflow,
    timeout: Option<Duration>,
) -> Result<RunResult, SheetflowError> {
    let task = tokio::task::spawn_blocking(move || engine.run(table, &workflow));

    let joined = match timeout {
        Some(limit) => tokio::time::timeout(limit, task)
            .await
            .map_err(|_| SheetflowError::Timeout { limit })?,
        None => task.await,
    };

    joined.map_err(|e| SheetflowError::WorkerFailed {
        reason: e.to_string(),
    })?
}

fn preview_workflow(
    workflow_path: &Path,
    input_path: &Path,
    max_rows: usize,
) -> anyhow::Result<()> {
    let (workflow, table) = load_inputs(workflow_path, input_path)?;
    let preview = Engine::new().preview(table, &workflow, max_rows)?;
    println!("{}", serde_json::to_string_pretty(&preview)?);
    Ok(())
}

fn validate_workflow(workflow_path: &Path, input_path: &Path) -> anyhow::Result<()> {
    let (workflow, table) = load_inputs(workflow_path, input_path)?;
    let engine = Engine::new();
    let steps = engine.validate(&table, &workflow)?;

    println!(
        "{} Workflow '{}' is valid",
        "✓".green(),
        workflow_path.display()
    );
    println!("  Columns: {}", table.column_names().join(", "));
    println!("  Steps: {}", steps.len());
    for step in &steps {
        if engine.registry().has(&step.step_type) {
            println!("    [{}] {}", step.index, step.step_type);
        } else {
            println!(
                "    [{}] {} {}",
                step.index,
                step.step_type,
                "(unknown step type, run will fail here)".yellow()
            );
        }
    }
    Ok(())
}

fn list_rules() {
    for name in Engine::new().registry().names() {
        println!("{}", name);
    }
}
