use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use stepline::app::{handle_fatal_error, init_logging, AppConfig};
use stepline::env::{ModeFlags, RealEnvReader};
use stepline::error::StepLineError;
use stepline::steplib::{LocalStepLibrary, StepActivator};
use stepline::subprocess::TokioProcessRunner;
use stepline::workflow::{
    setup_interrupt_handlers, CancellationFlag, Inventory, RunEngine, RunRequest, StepExecutor,
    WorkflowDocument,
};
use tracing::{info, warn};

/// Exit status of a run halted by a signal
const HALTED_EXIT_CODE: i32 = 130;

/// Run versioned CI steps as ordered workflows
#[derive(Parser)]
#[command(name = "stepline", version)]
#[command(about = "Run versioned CI steps as ordered workflows", long_about = None)]
struct Cli {
    /// Enable verbose output (-v for debug, -vv for trace, -vvv for all)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a workflow
    Run(RunArgs),
    /// List the workflows of a configuration
    Workflows {
        /// Path to the workflow configuration
        #[arg(short = 'c', long, default_value = "stepline.yml")]
        config: PathBuf,
    },
}

#[derive(Args)]
struct RunArgs {
    /// Name of the workflow to run
    workflow: String,

    /// Path to the workflow configuration
    #[arg(short = 'c', long, default_value = "stepline.yml")]
    config: PathBuf,

    /// Secrets file; its entries are never shown in logs
    #[arg(short = 'i', long)]
    inventory: Option<PathBuf>,

    /// Root directory of local step libraries
    #[arg(long)]
    steplib: Option<PathBuf>,

    /// Map a step library source to a directory under the library root
    #[arg(long = "steplib-alias", value_name = "SOURCE=DIR", value_parser = parse_alias)]
    steplib_aliases: Vec<(String, String)>,

    /// Directory steps are staged in (default: a temporary directory)
    #[arg(long)]
    work_dir: Option<PathBuf>,

    /// Force CI mode on or off
    #[arg(long, num_args = 0..=1, require_equals = true, default_missing_value = "true")]
    ci: Option<bool>,

    /// Force pull request mode on or off
    #[arg(long, num_args = 0..=1, require_equals = true, default_missing_value = "true")]
    pr: Option<bool>,

    /// Force secret filtering on or off
    #[arg(long, num_args = 0..=1, require_equals = true, default_missing_value = "true")]
    secret_filtering: Option<bool>,

    /// Secret filtering when neither a flag nor STEPLINE_SECRET_FILTERING decides
    #[arg(long, value_name = "BOOL", default_value_t = true, action = clap::ArgAction::Set)]
    secret_filtering_default: bool,

    /// Time limit for each step, in seconds
    #[arg(long, value_name = "SECONDS")]
    timeout: Option<u64>,

    /// Print the run result as JSON on stdout
    #[arg(long)]
    json: bool,
}

fn parse_alias(raw: &str) -> Result<(String, String), String> {
    match raw.rsplit_once('=') {
        Some((source, dir)) if !source.is_empty() && !dir.is_empty() => {
            Ok((source.to_string(), dir.to_string()))
        }
        _ => Err(format!("expected SOURCE=DIR, got {:?}", raw)),
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match AppConfig::new(cli.verbose) {
        Ok(config) => config,
        Err(e) => handle_fatal_error(e.into(), cli.verbose),
    };
    init_logging(&config);

    let result = match cli.command {
        Commands::Run(args) => run_workflow(config, args).await,
        Commands::Workflows { config } => list_workflows(&config),
    };

    match result {
        Ok(code) => std::process::exit(code),
        Err(e) => handle_fatal_error(e, cli.verbose),
    }
}

async fn run_workflow(config: AppConfig, args: RunArgs) -> Result<i32> {
    let config = match args.steplib {
        Some(root) => config.with_steplib_root(root),
        None => config,
    }
    .with_work_dir(args.work_dir)
    .with_default_secret_filtering(args.secret_filtering_default)
    .with_step_timeout(args.timeout.map(Duration::from_secs));

    let document = WorkflowDocument::load(&args.config).map_err(StepLineError::from)?;
    let plan = document
        .plan(&args.workflow)
        .map_err(StepLineError::from)?;
    let secrets = match &args.inventory {
        Some(path) => Inventory::load(path).map_err(StepLineError::from)?.envs,
        None => Vec::new(),
    };

    let library = args
        .steplib_aliases
        .into_iter()
        .fold(LocalStepLibrary::new(&config.steplib_root), |library, (source, dir)| {
            library.with_alias(source, dir)
        });
    let activator = StepActivator::new(Arc::new(library), &config.working_dir);
    let executor =
        StepExecutor::new(Arc::new(TokioProcessRunner)).with_timeout(config.step_timeout);

    // Dropped at the end of the run, removing the staged steps
    let mut _temp_work_dir = None;
    let work_dir = match &config.work_dir {
        Some(dir) => dir.clone(),
        None => {
            let temp = tempfile::Builder::new()
                .prefix("stepline-")
                .tempdir()
                .context("Failed to create a temporary work directory")?;
            let path = temp.path().to_path_buf();
            _temp_work_dir = Some(temp);
            path
        }
    };

    let cancellation = CancellationFlag::new();
    setup_interrupt_handlers(cancellation.clone())
        .context("Failed to install signal handlers")?;

    let engine = RunEngine::new(
        activator,
        executor,
        Arc::new(RealEnvReader),
        &config.working_dir,
        work_dir,
    )
    .with_policy(config.mode_policy())
    .with_cancellation(cancellation);

    let request = RunRequest {
        flags: ModeFlags {
            secret_filtering: args.secret_filtering,
            ci: args.ci,
            pr: args.pr,
        },
        secrets,
    };
    let ledger = engine.run(&plan, &request).await?;

    for advisory in &ledger.advisories {
        warn!("Advisory for {}: {}", advisory.step_id, advisory.message);
    }
    if args.json {
        println!("{}", serde_json::to_string_pretty(&ledger)?);
    }

    if ledger.halted {
        warn!("Workflow {} was cancelled", plan.workflow);
        return Ok(HALTED_EXIT_CODE);
    }
    Ok(ledger.exit_code())
}

fn list_workflows(config: &Path) -> Result<i32> {
    let document = WorkflowDocument::load(config).map_err(StepLineError::from)?;
    if document.workflows.is_empty() {
        info!("No workflows defined in {}", config.display());
    }
    for (name, workflow) in &document.workflows {
        match &workflow.title {
            Some(title) => println!("{} - {}", name, title),
            None => println!("{}", name),
        }
    }
    Ok(0)
}
