//! `dash`: terminal client for the control-plane console.

pub mod actions;
pub mod auth;
pub mod lists;
pub mod logs;

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use dash_api::cache::CachedConsoleApi;
use dash_api::http::{HttpConfig, HttpConsoleApi};
use dash_api::types::{Instance, Run, Volume};
use dash_api::ConsoleApi;
use dash_core::config::{load_config, Config, TailConfig};
use dash_core::session::{FileSessionStore, SessionContext};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

#[derive(Debug, Parser)]
#[command(name = "dash", version, about = "Browse runs, instances, events, volumes and logs")]
pub struct Cli {
    /// Config file (defaults to the XDG search path).
    #[arg(long, global = true, env = "DASH_CONFIG")]
    pub config: Option<PathBuf>,

    /// Project to act on; overrides the configured one.
    #[arg(long, short = 'p', global = true)]
    pub project: Option<String>,

    /// Print JSON instead of tables.
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// List runs, newest first.
    Runs(lists::ListArgs),
    /// List instances, newest first.
    Instances(lists::ListArgs),
    /// Show the event feed, newest first.
    Events(lists::ListArgs),
    /// List volumes, newest first.
    Volumes(lists::ListArgs),
    /// Print (or follow) a run's logs.
    Logs(logs::LogsArgs),
    /// Stop runs.
    Stop(actions::StopArgs),
    /// Delete volumes.
    DeleteVolumes(actions::DeleteVolumesArgs),
    /// Store an access token.
    Login(auth::LoginArgs),
    /// Forget the stored access token.
    Logout,
}

/// What commands run against.
pub struct Context {
    pub api: Arc<dyn ConsoleApi>,
    pub session: SessionContext,
    pub project: String,
    pub page_size: usize,
    pub tail: TailConfig,
    /// Fired on Ctrl-C; ends `logs --follow`.
    pub cancel: CancellationToken,
}

impl Context {
    pub fn new(api: Arc<dyn ConsoleApi>, session: SessionContext) -> Self {
        let defaults = Config::default();
        Self {
            api,
            session,
            project: defaults.server.project,
            page_size: defaults.pagination.page_size,
            tail: defaults.tail,
            cancel: CancellationToken::new(),
        }
    }

    /// Wire the HTTP transport (behind the response cache) and the file
    /// session store from `config`.
    pub fn from_config(config: &Config) -> Result<Self, String> {
        config.ensure_directories().map_err(|err| err.to_string())?;
        let store = Arc::new(FileSessionStore::new(config.session_path()));
        let session = SessionContext::open(store).map_err(|err| err.to_string())?;
        let http = HttpConsoleApi::new(HttpConfig::from(&config.server), session.clone())
            .map_err(|err| err.to_string())?;
        Ok(Self {
            api: Arc::new(CachedConsoleApi::new(Arc::new(http))),
            session,
            project: config.server.project.clone(),
            page_size: config.pagination.page_size,
            tail: config.tail.clone(),
            cancel: CancellationToken::new(),
        })
    }

    fn require_login(&self) -> Result<(), String> {
        if self.session.is_authenticated() {
            Ok(())
        } else {
            Err("not logged in; run `dash login --token <token>`".to_string())
        }
    }
}

pub async fn execute(cli: Cli, ctx: &Context, stdout: &mut dyn Write) -> Result<(), String> {
    let project = cli.project.unwrap_or_else(|| ctx.project.clone());
    let json = cli.json;
    match cli.command {
        Command::Login(args) => auth::login(ctx, &args, stdout),
        Command::Logout => auth::logout(ctx, stdout),
        command => {
            ctx.require_login()?;
            match command {
                Command::Runs(args) => lists::run_paged::<Run>(ctx, &project, &args, json, stdout).await,
                Command::Instances(args) => {
                    lists::run_paged::<Instance>(ctx, &project, &args, json, stdout).await
                }
                Command::Volumes(args) => {
                    lists::run_paged::<Volume>(ctx, &project, &args, json, stdout).await
                }
                Command::Events(args) => lists::run_events(ctx, &project, &args, json, stdout).await,
                Command::Logs(args) => logs::run(ctx, &project, &args, json, stdout).await,
                Command::Stop(args) => actions::stop(ctx, &project, &args, stdout).await,
                Command::DeleteVolumes(args) => {
                    actions::delete_volumes(ctx, &project, &args, stdout).await
                }
                Command::Login(_) | Command::Logout => Ok(()),
            }
        }
    }
}

/// Parse `args` and run against `ctx`, capturing output.
pub async fn run_for_test(args: &[&str], ctx: &Context) -> CommandOutput {
    let mut stdout = Vec::new();
    let mut stderr = Vec::new();
    let exit_code = match Cli::try_parse_from(args) {
        Ok(cli) => match execute(cli, ctx, &mut stdout).await {
            Ok(()) => 0,
            Err(message) => {
                let _ = writeln!(stderr, "error: {message}");
                1
            }
        },
        Err(err) => {
            let _ = write!(stderr, "{err}");
            err.exit_code()
        }
    };
    CommandOutput {
        stdout: String::from_utf8_lossy(&stdout).into_owned(),
        stderr: String::from_utf8_lossy(&stderr).into_owned(),
        exit_code,
    }
}

pub fn run_from_env() -> i32 {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let _ = err.print();
            return err.exit_code();
        }
    };

    let (config, config_path) = match load_config(cli.config.as_deref()) {
        Ok(loaded) => loaded,
        Err(err) => {
            eprintln!("error: {err}");
            return 1;
        }
    };
    if let Err(err) = dash_core::logging::init(&config.logging) {
        eprintln!("warning: {err}");
    }
    debug!(config = ?config_path, server = %config.server.url, "configuration loaded");

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(err) => {
            eprintln!("error: start runtime: {err}");
            return 1;
        }
    };

    runtime.block_on(async {
        let ctx = match Context::from_config(&config) {
            Ok(ctx) => ctx,
            Err(message) => {
                eprintln!("error: {message}");
                return 1;
            }
        };
        let cancel = ctx.cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        });

        let mut stdout = std::io::stdout();
        match execute(cli, &ctx, &mut stdout).await {
            Ok(()) => 0,
            Err(message) => {
                eprintln!("error: {message}");
                1
            }
        }
    })
}
