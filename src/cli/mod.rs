//! Thin command-line adapter. Each command parses its arguments, calls one
//! core operation and prints the result as JSON.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use serde::Serialize;

use project_graph::{
    BranchGraphManager, GraphBuilder, IncrementalUpdater, MemoryManager,
};

#[derive(Parser)]
#[command(name = "project-graph")]
#[command(about = "Persistent, branch-aware knowledge graph of source-code projects")]
#[command(version)]
#[command(after_long_help = r#"
EXAMPLES:
    # Analyze a project and persist its graph
    project-graph analyze ./my-project

    # Show the persisted summary
    project-graph summary ./my-project

    # Blast radius of changing one file
    project-graph impact ./my-project src/core.py

    # Branch operations
    project-graph branches ./my-project
    project-graph branch-analyze ./my-project --branch feature/x --force
    project-graph compare ./my-project main feature/x

    # Keep the graph live under edits
    project-graph watch ./my-project
"#)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Storage directory override (defaults to ~/.project-graph)
    #[arg(long, global = true)]
    pub storage_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Analyze a project and persist its knowledge graph
    Analyze {
        path: PathBuf,
        /// Maximum number of files to analyze
        #[arg(long, default_value_t = 1000)]
        max_files: usize,
    },
    /// Print the persisted project summary
    Summary { path: PathBuf },
    /// Predict the impact of changing one file
    Impact {
        path: PathBuf,
        /// File to assess, absolute or relative to the project root
        file: String,
    },
    /// List recorded branches for a project
    Branches { path: PathBuf },
    /// Analyze a branch (skips work when the stored graph is fresh)
    BranchAnalyze {
        path: PathBuf,
        #[arg(long)]
        branch: Option<String>,
        #[arg(long)]
        force: bool,
    },
    /// Check out a branch and analyze it
    Switch { path: PathBuf, branch: String },
    /// Compare the persisted graphs of two branches
    Compare {
        path: PathBuf,
        branch1: String,
        branch2: String,
    },
    /// Monitor a project and apply incremental updates until interrupted
    Watch { path: PathBuf },
    /// Discard incremental state and re-analyze from scratch
    ForceUpdate { path: PathBuf },
    /// Show monitoring and persistence status for a project
    Status { path: PathBuf },
    /// List persisted projects
    Projects,
    /// Show storage statistics
    Stats,
    /// Retire projects unaccessed beyond the retention window
    Cleanup {
        #[arg(long, default_value_t = 30)]
        days: u64,
    },
}

pub fn run(cli: Cli) -> anyhow::Result<()> {
    let memory = Arc::new(match cli.storage_dir {
        Some(dir) => MemoryManager::with_storage_dir(dir)?,
        None => MemoryManager::open()?,
    });

    match cli.command {
        Commands::Analyze { path, max_files } => {
            let graph = GraphBuilder::new(&path).analyze(max_files)?;
            memory.save(&graph)?;
            print_json(&graph.summary()?)
        }
        Commands::Summary { path } => {
            let graph = load_required(&memory, &path)?;
            print_json(&graph.summary()?)
        }
        Commands::Impact { path, file } => {
            let graph = load_required(&memory, &path)?;
            let target = if Path::new(&file).is_absolute() {
                file
            } else {
                path.join(&file).display().to_string()
            };
            print_json(&graph.predict_change_impact(&target)?)
        }
        Commands::Branches { path } => {
            let manager = BranchGraphManager::new(&path, memory);
            print_json(&manager.list_branches()?)
        }
        Commands::BranchAnalyze {
            path,
            branch,
            force,
        } => {
            let manager = BranchGraphManager::new(&path, memory);
            print_json(&manager.analyze_branch(branch.as_deref(), force)?)
        }
        Commands::Switch { path, branch } => {
            let mut manager = BranchGraphManager::new(&path, memory);
            print_json(&manager.switch_branch(&branch)?)
        }
        Commands::Compare {
            path,
            branch1,
            branch2,
        } => {
            let manager = BranchGraphManager::new(&path, memory);
            print_json(&manager.compare(&branch1, &branch2)?)
        }
        Commands::Watch { path } => {
            let mut updater = IncrementalUpdater::new(&path, memory);
            updater.start_monitoring()?;
            eprintln!("monitoring {}; press Ctrl-C to stop", path.display());
            loop {
                std::thread::park();
            }
        }
        Commands::ForceUpdate { path } => {
            let mut updater = IncrementalUpdater::new(&path, memory);
            print_json(&updater.force_update()?)
        }
        Commands::Status { path } => {
            let updater = IncrementalUpdater::new(&path, memory);
            print_json(&updater.status()?)
        }
        Commands::Projects => print_json(&memory.list_projects()?),
        Commands::Stats => print_json(&memory.storage_stats()?),
        Commands::Cleanup { days } => {
            #[derive(Serialize)]
            struct CleanupResult {
                retired: usize,
            }
            let retired = memory.cleanup(days)?;
            print_json(&CleanupResult { retired })
        }
    }
}

fn load_required(
    memory: &MemoryManager,
    path: &Path,
) -> anyhow::Result<project_graph::KnowledgeGraph> {
    memory
        .load(&path.display().to_string(), true)?
        .ok_or_else(|| {
            anyhow::anyhow!(
                "no persisted graph for {}; run `project-graph analyze` first",
                path.display()
            )
        })
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
