use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

use codescope::api::{dispatch, Operation, Request};
use codescope::config::Config;
use codescope::Engine;

#[derive(Parser)]
#[command(name = "codescope")]
#[command(about = "Structural answers about annotation-driven Java codebases")]
#[command(version)]
pub struct Cli {
    /// Path to configuration file (defaults to codescope.toml in the workspace root)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Workspace root to analyze
    #[arg(short, long, global = true, default_value = ".")]
    pub root: PathBuf,

    /// Per-request timeout in milliseconds
    #[arg(long, global = true)]
    pub timeout_ms: Option<u64>,

    /// Print the response on a single line
    #[arg(long, global = true)]
    pub compact: bool,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Write a default codescope.toml into the workspace root
    Init {
        /// Overwrite an existing configuration file
        #[arg(long)]
        force: bool,
    },

    /// Resolve a name to its declaration as seen from a file
    Resolve {
        name: String,

        /// File the name appears in, root-relative or absolute
        #[arg(long)]
        file: PathBuf,

        /// Line the name appears on; enables local and parameter shadowing
        #[arg(long)]
        line: Option<usize>,
    },

    /// Print a method's full source and signature
    Source {
        type_name: String,
        method: String,

        #[arg(long)]
        arity: Option<usize>,
    },

    /// Extract the field structure of a type
    Shape {
        type_name: String,

        #[arg(long)]
        depth: Option<usize>,
    },

    /// Enumerate decision points and execution paths of a method
    Branches {
        type_name: String,
        method: String,

        #[arg(long)]
        arity: Option<usize>,
    },

    /// Branch analysis of a statement block read from a file or stdin
    Snippet {
        #[arg(long)]
        file: Option<PathBuf>,
    },

    /// Trace the call chain below a method
    Trace {
        type_name: String,
        method: String,

        #[arg(long)]
        arity: Option<usize>,

        #[arg(long)]
        depth: Option<usize>,

        /// Namespace where tracing stops; repeatable, replaces the configured list
        #[arg(long = "boundary")]
        boundaries: Vec<String>,
    },

    /// Classify a type's injected collaborators
    Deps { type_name: String },

    /// Follow an HTTP request from route to persistence
    Endpoint { verb: String, path: String },

    /// Find references to a type or member across the workspace
    Usages { symbol: String },

    /// List every discovered HTTP route
    Routes,

    /// List parsed files changed on disk during this session
    Stale,

    /// Run a raw JSON request read from a file or stdin
    Request {
        #[arg(long)]
        file: Option<PathBuf>,
    },
}

impl Cli {
    /// Run the command and print its response. Returns whether it succeeded.
    pub async fn execute(self) -> Result<bool> {
        if let Commands::Init { force } = self.command {
            self.init(force)?;
            return Ok(true);
        }

        let config = self.load_config()?;
        let compact = self.compact;
        let engine = Arc::new(Engine::new(&self.root, config)?);
        let request = self.into_request()?;
        info!(operation = request.operation.name(), "dispatching request");

        let response = tokio::task::spawn_blocking(move || dispatch(&engine, request))
            .await
            .context("analysis task panicked")?;

        let rendered = if compact {
            serde_json::to_string(&response)?
        } else {
            serde_json::to_string_pretty(&response)?
        };
        println!("{}", rendered);
        Ok(response.is_success())
    }

    fn load_config(&self) -> Result<Config> {
        let config = match &self.config {
            Some(path) => Config::load(path)
                .with_context(|| format!("failed to load configuration from {}", path.display()))?,
            None => match Config::find_in(&self.root) {
                Some(found) => Config::load(&found)
                    .with_context(|| format!("failed to load configuration from {}", found.display()))?,
                None => Config::default(),
            },
        };
        Ok(config)
    }

    fn init(&self, force: bool) -> Result<()> {
        let path = self
            .config
            .clone()
            .unwrap_or_else(|| self.root.join("codescope.toml"));
        if path.exists() && !force {
            bail!("{} already exists; pass --force to overwrite", path.display());
        }
        Config::default().save(&path)?;
        info!("📝 wrote {}", path.display());
        println!("Created {}", path.display());
        Ok(())
    }

    fn into_request(self) -> Result<Request> {
        let operation = match self.command {
            Commands::Resolve { name, file, line } => Operation::ResolveSymbol { name, file, line },
            Commands::Source { type_name, method, arity } => Operation::MethodSource { type_name, method, arity },
            Commands::Shape { type_name, depth } => Operation::ExtractShape {
                type_name,
                max_depth: depth,
            },
            Commands::Branches { type_name, method, arity } => {
                Operation::AnalyzeBranches { type_name, method, arity }
            }
            Commands::Snippet { file } => Operation::AnalyzeSnippet {
                code: read_input(file.as_deref())?,
            },
            Commands::Trace {
                type_name,
                method,
                arity,
                depth,
                boundaries,
            } => Operation::TraceCalls {
                type_name,
                method,
                arity,
                max_depth: depth,
                boundary_namespaces: (!boundaries.is_empty()).then_some(boundaries),
            },
            Commands::Deps { type_name } => Operation::ClassifyDependencies { type_name },
            Commands::Endpoint { verb, path } => Operation::TraceEndpoint { verb, path },
            Commands::Usages { symbol } => Operation::FindUsages { symbol },
            Commands::Routes => Operation::ListRoutes,
            Commands::Stale => Operation::StaleFiles,
            Commands::Request { file } => {
                let mut request = Request::from_json(&read_input(file.as_deref())?)?;
                if self.timeout_ms.is_some() {
                    request.timeout_ms = self.timeout_ms;
                }
                return Ok(request);
            }
            Commands::Init { .. } => bail!("init does not produce an analysis request"),
        };

        Ok(Request {
            operation,
            timeout_ms: self.timeout_ms,
        })
    }
}

/// Contents of `file`, or all of stdin when no file is given.
fn read_input(file: Option<&Path>) -> Result<String> {
    match file {
        Some(path) => {
            std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))
        }
        None => std::io::read_to_string(std::io::stdin()).context("failed to read stdin"),
    }
}
