//! Local coding partner CLI.
//!
//! Opens (or creates) `project_context.json` in the project directory and runs
//! an interactive session against a local text-generation server. Settings
//! come from `.partner/config.toml`, overridable per invocation.

use std::path::{Path, PathBuf};

use anyhow::{Result, bail};
use clap::{Parser, Subcommand};
use partner::core::types::ProjectContext;
use partner::exit_codes;
use partner::handle::SessionHandle;
use partner::io::backend::{BackendClient, HttpTransport};
use partner::io::config::{SessionConfig, load_config};
use partner::io::context_store::ContextStore;
use partner::io::init::{InitOptions, ProjectPaths, init_config};
use partner::repl::{self, render_status, render_todos};
use partner::session::{Session, SessionStatus};
use tokio::io::BufReader;
use tracing::debug;

#[derive(Parser)]
#[command(
    name = "partner",
    version,
    about = "Local coding partner with persistent project context"
)]
struct Cli {
    /// Project directory the session works in.
    #[arg(long, global = true, default_value = ".")]
    dir: PathBuf,

    /// Config file (default: `<dir>/.partner/config.toml`).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Override the configured model.
    #[arg(long, global = true)]
    model: Option<String>,

    /// Override the configured generate endpoint URL.
    #[arg(long, global = true)]
    endpoint: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the interactive session.
    Chat,
    /// Print the project status.
    Status,
    /// Check that the backend answers.
    Ping,
    /// Set the project goal.
    Goal {
        #[arg(required = true, num_args = 1..)]
        text: Vec<String>,
    },
    /// Print the TODO list.
    Todo,
    /// Create `.partner/config.toml` with default settings.
    InitConfig {
        /// Overwrite an existing config file.
        #[arg(short, long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() {
    partner::logging::init();

    let code = match run(Cli::parse()).await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{:#}", err);
            exit_codes::INVALID
        }
    };
    std::process::exit(code);
}

async fn run(cli: Cli) -> Result<i32> {
    if !cli.dir.is_dir() {
        bail!("project directory {} does not exist", cli.dir.display());
    }
    if let Command::InitConfig { force } = cli.command {
        let paths = init_config(&cli.dir, &InitOptions { force })?;
        println!("{}", paths.config_path.display());
        return Ok(exit_codes::OK);
    }

    let cfg = resolve_config(&cli)?;
    debug!(model = %cfg.model, endpoint = %cfg.endpoint, "resolved config");

    // Read-only commands load the stored context without opening a session,
    // so nothing is written.
    match &cli.command {
        Command::Status => {
            let context = read_context(&cli.dir, &cfg);
            println!("{}", render_status(&SessionStatus::of(&context)));
            return Ok(exit_codes::OK);
        }
        Command::Todo => {
            let context = read_context(&cli.dir, &cfg);
            let todos: Vec<String> = context.todo_list.into_iter().collect();
            println!("{}", render_todos(&todos));
            return Ok(exit_codes::OK);
        }
        _ => {}
    }

    let backend = BackendClient::http(&cfg)?;
    let mut session = Session::open(&cli.dir, cfg, backend)?;

    match cli.command {
        Command::Chat => cmd_chat(session).await,
        Command::Goal { text } => {
            session.set_goal(&text.join(" "));
            println!("Project goal set: {}", session.context().project_goal);
            Ok(exit_codes::OK)
        }
        Command::Ping => match session.ping().await {
            Ok(reply) => {
                println!("{reply}");
                Ok(exit_codes::OK)
            }
            Err(err) => {
                eprintln!("{err}");
                Ok(exit_codes::BACKEND_UNAVAILABLE)
            }
        },
        Command::InitConfig { .. } | Command::Status | Command::Todo => Ok(exit_codes::OK),
    }
}

fn read_context(dir: &Path, cfg: &SessionConfig) -> ProjectContext {
    let (context, _) = ContextStore::new(dir).load(cfg.backend_settings());
    context
}

async fn cmd_chat(session: Session<BackendClient<HttpTransport>>) -> Result<i32> {
    let (handle, task) = SessionHandle::spawn(session);
    let stdin = BufReader::new(tokio::io::stdin());
    repl::run(&handle, stdin, &mut std::io::stdout()).await?;
    drop(handle);
    task.await?;
    Ok(exit_codes::OK)
}

/// Load the config file and apply command-line overrides.
fn resolve_config(cli: &Cli) -> Result<SessionConfig> {
    let path = config_path(&cli.dir, cli.config.as_deref());
    let mut cfg = load_config(&path)?;
    if let Some(model) = &cli.model {
        cfg.model = model.clone();
    }
    if let Some(endpoint) = &cli.endpoint {
        cfg.endpoint = endpoint.clone();
    }
    cfg.validate()?;
    Ok(cfg)
}

fn config_path(dir: &Path, explicit: Option<&Path>) -> PathBuf {
    match explicit {
        Some(path) => path.to_path_buf(),
        None => ProjectPaths::new(dir).config_path,
    }
}
