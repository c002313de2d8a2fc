//! Orchestrator CLI
//!
//! Exit codes: 0 success, 1 configuration error, 2 convergence exceeded,
//! 3 lockchain verification failed, 4 topology violation.

use clap::{Parser, Subcommand};
use kgcl_engine::{EngineConfig, EngineError, Orchestrator};
use kgcl_lockchain::LockchainWriter;
use kgcl_physics::PhysicsOntology;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

const EXIT_CONFIG: u8 = 1;
const EXIT_NON_CONVERGENCE: u8 = 2;
const EXIT_CHAIN_BROKEN: u8 = 3;
const EXIT_TOPOLOGY: u8 = 4;

#[derive(Parser)]
#[command(name = "kgcl", about = "Knowledge-graph workflow engine", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Load a topology and tick it to convergence
    Run {
        /// Workflow topology (Turtle)
        #[arg(long)]
        topology: PathBuf,
        /// Physics ontology (defaults to the embedded document)
        #[arg(long)]
        physics: Option<PathBuf>,
        /// Tick budget
        #[arg(long)]
        max_ticks: Option<u64>,
        /// Git repository receiving the lockchain
        #[arg(long)]
        repo: Option<PathBuf>,
    },
    /// Verify a lockchain
    Verify {
        /// Git repository holding the lockchain
        #[arg(long)]
        repo: PathBuf,
    },
    /// Print token placement for a topology without ticking
    Inspect {
        /// Workflow topology (Turtle)
        #[arg(long)]
        topology: PathBuf,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let config = EngineConfig::from_env();
    let filter = EnvFilter::try_new(&config.log_level)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();
    match run(cli, config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::from(exit_code(&e))
        }
    }
}

fn exit_code(error: &EngineError) -> u8 {
    match error {
        EngineError::NonConvergence { .. } => EXIT_NON_CONVERGENCE,
        EngineError::AuditTrail(_) => EXIT_CHAIN_BROKEN,
        EngineError::Store(kgcl_store::StoreError::TopologyViolation { .. }) => EXIT_TOPOLOGY,
        _ => EXIT_CONFIG,
    }
}

async fn run(cli: Cli, config: EngineConfig) -> Result<(), EngineError> {
    match cli.command {
        Command::Run {
            topology,
            physics,
            max_ticks,
            repo,
        } => {
            let ontology = match physics {
                Some(path) => PhysicsOntology::load_file(path)?,
                None => PhysicsOntology::default_physics()?,
            };
            let mut orchestrator = Orchestrator::new(ontology)?;
            if let Some(repo) = repo {
                orchestrator.attach_lockchain(repo)?;
            }

            let turtle = std::fs::read_to_string(&topology).map_err(|e| {
                EngineError::Config(format!("cannot read {}: {}", topology.display(), e))
            })?;
            orchestrator.load_topology(&turtle)?;

            let budget = max_ticks.unwrap_or(config.max_ticks);
            let receipts = orchestrator.run_to_completion(budget).await?;

            println!("converged after {} tick(s)", receipts.len());
            for (task, state) in orchestrator.inspect()? {
                println!("  {} {}", task, state);
            }
            Ok(())
        }

        Command::Verify { repo } => {
            let writer = LockchainWriter::open(&repo)?;
            match writer.verify_chain()? {
                None => {
                    println!("chain intact: {} receipt(s)", writer.len()?);
                    Ok(())
                }
                Some(tick) => {
                    eprintln!("chain broken at tick {}", tick);
                    Err(EngineError::AuditTrail(format!(
                        "chain broken at tick {}",
                        tick
                    )))
                }
            }
        }

        Command::Inspect { topology } => {
            let orchestrator = Orchestrator::with_default_physics()?;
            let turtle = std::fs::read_to_string(&topology).map_err(|e| {
                EngineError::Config(format!("cannot read {}: {}", topology.display(), e))
            })?;
            orchestrator.load_topology(&turtle)?;
            for (task, state) in orchestrator.inspect()? {
                println!("{} {}", task, state);
            }
            Ok(())
        }
    }
}
