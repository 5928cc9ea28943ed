//! relforge CLI
//!
//! Entry point for the `relforge` command-line tool.

use clap::{Parser, Subcommand};
use relforge::config::{load_env_file, ENV_FILE};
use relforge::pipeline::DEFAULT_DIST_DIR;
use relforge::{load_file, logging, ExitCode, Orchestrator, RunError, RunOptions, Stage};
use std::path::PathBuf;
use std::process;

#[derive(Parser)]
#[command(name = "relforge")]
#[command(about = "Build, archive and release binaries for many targets in parallel", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Release tag, available to templates as {{ .Tag }}
    #[arg(long, global = true, env = "RELFORGE_TAG")]
    tag: Option<String>,

    /// Path to the config file
    #[arg(long, short = 'c', global = true, default_value = relforge::config::DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Output directory
    #[arg(long, global = true, env = "RELFORGE_DIST", default_value = DEFAULT_DIST_DIR)]
    dist: PathBuf,

    /// Number of parallel units (0 = one per CPU)
    #[arg(long, global = true, env = "RELFORGE_WORKERS", default_value_t = 0, allow_negative_numbers = true)]
    workers: i64,

    /// Only log warnings and errors
    #[arg(long, short = 'q', global = true)]
    quiet: bool,

    /// Trial run: plan and log without building, writing or starting plugins
    #[arg(long = "try", global = true)]
    trial: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Build binaries for every target
    Build,
    /// Archive previously built binaries
    Archive,
    /// Collect archives into release directories with checksums
    Release,
    /// Build, archive and release
    All,
}

impl Commands {
    fn stages(&self) -> Vec<Stage> {
        match self {
            Commands::Build => vec![Stage::Build],
            Commands::Archive => vec![Stage::Archive],
            Commands::Release => vec![Stage::Release],
            Commands::All => Stage::ALL.to_vec(),
        }
    }
}

fn main() {
    let project_dir = match std::env::current_dir() {
        Ok(dir) => dir,
        Err(e) => {
            eprintln!("Error: cannot determine working directory: {}", e);
            process::exit(ExitCode::Io.as_i32());
        }
    };

    // Before parsing so the file can supply env-backed flags
    let env_loaded = load_env_file(&project_dir.join(ENV_FILE));

    let cli = Cli::parse();
    logging::init(cli.quiet);

    match env_loaded {
        Ok(0) => {}
        Ok(count) => tracing::debug!(file = ENV_FILE, vars = count, "Loaded environment file"),
        Err(e) => tracing::warn!(file = ENV_FILE, error = %e, "Failed to read environment file"),
    }

    process::exit(run(cli, project_dir));
}

fn run(cli: Cli, project_dir: PathBuf) -> i32 {
    let Some(tag) = cli.tag.filter(|t| !t.is_empty()) else {
        eprintln!("Error: --tag (or RELFORGE_TAG) is required");
        return ExitCode::Config.as_i32();
    };

    let config_path = project_dir.join(&cli.config);
    let config = match load_file(&config_path) {
        Ok(config) => config,
        Err(e) => {
            let err = RunError::from(e);
            eprintln!("Error: {}", err);
            return err.exit_code();
        }
    };

    let options = RunOptions {
        project_dir,
        dist: cli.dist,
        tag,
        workers: cli.workers,
        trial: cli.trial,
        stages: cli.command.stages(),
    };

    match Orchestrator::new(options).run(&config) {
        Ok(summary) => {
            if !cli.quiet {
                println!("{}", summary.human_summary);
            }
            ExitCode::Success.as_i32()
        }
        Err(err) => {
            eprintln!("Error: {}", err);
            if let Some(stage) = err.summary().and_then(|s| s.failed_stage()) {
                for unit in stage.failures() {
                    eprintln!("  {}: {}", unit.label, unit.error.as_deref().unwrap_or("failed"));
                }
            }
            err.exit_code()
        }
    }
}
