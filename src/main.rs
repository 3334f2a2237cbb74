use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use secrecy::SecretString;
use std::path::PathBuf;
use std::process::ExitCode;

use newsdedup::backend::{Backend, Miniflux, TtRss};
use newsdedup::config::{BackendKind, Config};
use newsdedup::scheduler::{CycleReport, Scheduler};
use newsdedup::shutdown::{self, Shutdown};
use newsdedup::state::StateFile;
use newsdedup::{logging, tools};

/// Exit status after SIGINT or SIGTERM (128 + SIGINT)
const EXIT_INTERRUPTED: u8 = 130;

/// Get the config directory path (~/.config/newsdedup/)
fn get_config_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    Ok(PathBuf::from(home).join(".config").join("newsdedup"))
}

#[derive(Parser, Debug)]
#[command(
    name = "newsdedup",
    version,
    about = "Marks duplicate articles as read in Tiny Tiny RSS and Miniflux"
)]
struct Args {
    /// Config file (default: ~/.config/newsdedup/config.toml)
    #[arg(short, long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log progress at info level
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log at debug level
    #[arg(short, long, global = true)]
    debug: bool,

    /// Leave timestamps out of log lines
    #[arg(short = 'D', long, global = true)]
    daemon: bool,

    /// Check unread articles once without marking anything
    #[arg(long)]
    evaluate: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, Copy)]
enum Command {
    /// Watch for duplicates until interrupted (default)
    Run,
    /// Print the id and title of every feed
    ListFeeds,
    /// Review starred articles page by page and unstar them
    Unstar {
        /// Articles per page
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
    },
}

enum Outcome {
    Done,
    Interrupted,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    logging::init(logging::level_for(args.verbose, args.debug), args.daemon);

    match run(args).await {
        Ok(Outcome::Done) => ExitCode::SUCCESS,
        Ok(Outcome::Interrupted) => ExitCode::from(EXIT_INTERRUPTED),
        Err(e) => {
            tracing::error!(error = %format!("{e:#}"), "Fatal error");
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<Outcome> {
    let config_path = match &args.config {
        Some(path) => path.clone(),
        None => get_config_dir()?.join("config.toml"),
    };
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;
    let state = StateFile::new(config.state_path(&config_path));

    match config.backend {
        BackendKind::Ttrss => {
            let section = config
                .ttrss
                .as_ref()
                .context("Missing [ttrss] section in config")?;
            let backend = TtRss::new(
                &section.hostname,
                section.username.clone(),
                SecretString::from(section.password.clone()),
            )
            .context("Failed to set up Tiny Tiny RSS client")?;
            dispatch(backend, &args, &config, state).await
        }
        BackendKind::Miniflux => {
            let section = config
                .miniflux
                .as_ref()
                .context("Missing [miniflux] section in config")?;
            let backend = Miniflux::new(
                &section.hostname,
                SecretString::from(section.api_token.clone()),
            )
            .context("Failed to set up Miniflux client")?;
            dispatch(backend, &args, &config, state).await
        }
    }
}

async fn dispatch<B: Backend>(
    backend: B,
    args: &Args,
    config: &Config,
    state: StateFile,
) -> Result<Outcome> {
    match args.command.unwrap_or(Command::Run) {
        Command::ListFeeds => {
            backend.login().await.context("Login failed")?;
            tools::list_feeds(&backend, &mut std::io::stdout().lock()).await?;
            Ok(Outcome::Done)
        }
        Command::Unstar { limit } => {
            backend.login().await.context("Login failed")?;
            tools::unstar(
                &backend,
                limit,
                &mut std::io::stdin().lock(),
                &mut std::io::stdout(),
            )
            .await?;
            Ok(Outcome::Done)
        }
        Command::Run => {
            let evaluate = args.evaluate || config.dedup.evaluate_only;
            watch(backend, config, state, evaluate).await
        }
    }
}

/// Log in, warm up and poll, stopping early on Ctrl-C or SIGTERM.
async fn watch<B: Backend>(
    backend: B,
    config: &Config,
    state: StateFile,
    evaluate: bool,
) -> Result<Outcome> {
    let (trigger, mut shutdown) = Shutdown::channel();
    tokio::spawn(async move {
        if let Err(e) = shutdown::listen_for_signals(trigger).await {
            tracing::warn!(error = %e, "Failed to install signal handlers");
        }
    });

    tokio::select! {
        biased;
        _ = shutdown.wait() => return Ok(Outcome::Interrupted),
        result = backend.login() => result.context("Login failed")?,
    }
    tracing::info!(backend = ?config.backend, evaluate, "Logged in");

    let mut scheduler = Scheduler::new(backend, &config.dedup, state);
    tokio::select! {
        biased;
        _ = shutdown.wait() => return Ok(Outcome::Interrupted),
        _ = scheduler.start() => {}
    }

    if evaluate {
        let report = tokio::select! {
            biased;
            _ = shutdown.wait() => return Ok(Outcome::Interrupted),
            report = scheduler.evaluate() => report.context("Evaluation failed")?,
        };
        print_report(&report);
        return Ok(Outcome::Done);
    }

    scheduler.run(&mut shutdown).await;
    Ok(Outcome::Interrupted)
}

fn print_report(report: &CycleReport) {
    println!("Articles checked:     {}", report.seen);
    println!("Exempt:               {}", report.exempt);
    println!("Duplicates by url:    {}", report.url_duplicates);
    println!("Duplicates by title:  {}", report.title_duplicates);
}
