//! Command-line interface
//!
//! Every subcommand except `request` maps onto one [`Request`] and goes
//! through the same [`Dispatcher`] the JSON-lines mode uses.

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tokio::io::AsyncReadExt;
use tracing::debug;
use tracing_subscriber::EnvFilter;

pub mod render;
pub mod request;

use crate::config::RootConfig;
use crate::manager::FileManager;
use crate::service::{Dispatcher, Request, Status};
use request::RequestCommand;

const DEFAULT_LOG_FILTER: &str = "fsroot=info";

#[derive(Debug, Parser)]
#[command(name = "fsroot", version, about = "File operations confined to one root directory")]
pub struct Cli {
    /// TOML configuration file
    #[arg(long, short = 'c', global = true, conflicts_with = "root")]
    pub config: Option<PathBuf>,

    /// Root directory, with default settings
    #[arg(long, global = true)]
    pub root: Option<PathBuf>,

    /// Log level for fsroot (overrides RUST_LOG)
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Print raw JSON responses
    #[arg(long, global = true)]
    pub json: bool,

    /// Fail requests that run longer than this many seconds
    #[arg(long, global = true)]
    pub timeout: Option<u64>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// List a directory
    List {
        #[arg(default_value = "/")]
        dir: String,
        #[arg(long, default_value = "name")]
        sort: String,
        #[arg(long, default_value = "asc")]
        order: String,
    },
    /// Print the directory tree
    Tree,
    /// Find entries whose name contains QUERY
    Search {
        query: String,
        #[arg(long, default_value = "/")]
        dir: String,
    },
    /// Create a directory
    Mkdir { dir: String, name: String },
    /// Create a file
    Touch {
        dir: String,
        name: String,
        #[arg(long, default_value = "")]
        content: String,
    },
    Rename {
        dir: String,
        old_name: String,
        new_name: String,
    },
    /// Move items to the trash
    Trash {
        dir: String,
        #[arg(required = true)]
        names: Vec<String>,
    },
    /// Delete items permanently
    Delete {
        dir: String,
        #[arg(required = true)]
        names: Vec<String>,
    },
    /// Restore trashed items
    Restore {
        #[arg(required = true)]
        names: Vec<String>,
    },
    Copy {
        dir: String,
        destination: String,
        #[arg(required = true)]
        names: Vec<String>,
    },
    Move {
        dir: String,
        destination: String,
        #[arg(required = true)]
        names: Vec<String>,
    },
    /// Change permissions using an octal mode
    Chmod { path: String, mode: String },
    /// Pack items into an archive (zip, tar, gzip)
    Compress {
        dir: String,
        #[arg(long, default_value = "archive")]
        name: String,
        #[arg(long, default_value = "zip")]
        format: String,
        #[arg(required = true)]
        names: Vec<String>,
    },
    /// Extract an archive, by default next to it
    Extract {
        archive: String,
        destination: Option<String>,
    },
    /// Print a text file
    Cat { dir: String, name: String },
    /// Replace the content of a text file, read from stdin unless --content is given
    Save {
        dir: String,
        name: String,
        #[arg(long)]
        content: Option<String>,
    },
    EmptyTrash,
    ListTrash,
    /// Read one JSON request per stdin line, answer one JSON response per line
    Request,
}

/// Install the global subscriber. Logs go to stderr so stdout stays clean
/// for responses.
pub fn init_logging(level: Option<&str>) {
    let filter = match level {
        Some(level) => EnvFilter::new(format!("fsroot={}", level)),
        None => EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

pub fn load_config(cli: &Cli) -> Result<RootConfig> {
    let mut config = match (&cli.config, &cli.root) {
        (Some(path), _) => RootConfig::load(path)?,
        (None, Some(root)) => RootConfig::new(root.clone()),
        (None, None) => bail!("either --config or --root is required"),
    };
    if let Some(secs) = cli.timeout {
        config = config.with_request_timeout(secs);
    }
    Ok(config)
}

pub async fn run(cli: Cli) -> Result<ExitCode> {
    init_logging(cli.log_level.as_deref());
    let config = load_config(&cli)?;
    let display = config.display.clone();
    let trash_dir = format!("/{}", config.trash_dir_name);
    let dispatcher = Dispatcher::new(FileManager::new(config)?);

    let command = match cli.command {
        Command::Save {
            dir,
            name,
            content: None,
        } => {
            let mut content = String::new();
            tokio::io::stdin().read_to_string(&mut content).await?;
            Command::Save {
                dir,
                name,
                content: Some(content),
            }
        }
        other => other,
    };

    let Some(request) = into_request(command, &trash_dir) else {
        RequestCommand::execute(dispatcher).await?;
        return Ok(ExitCode::SUCCESS);
    };

    debug!(action = request.action(), "running command");
    let action = request.action();
    let response = dispatcher.dispatch(request).await;
    if cli.json {
        println!("{}", serde_json::to_string_pretty(&response)?);
    } else {
        render::print(action, &response, &display);
    }

    Ok(match response.status {
        Status::Ok => ExitCode::SUCCESS,
        Status::Partial => ExitCode::from(2),
        Status::Error => ExitCode::FAILURE,
    })
}

/// The request a subcommand stands for; `None` for the `request` loop.
fn into_request(command: Command, trash_dir: &str) -> Option<Request> {
    let request = match command {
        Command::List { dir, sort, order } => Request::List {
            dir,
            sort: Some(sort),
            order: Some(order),
        },
        Command::Tree => Request::Tree,
        Command::Search { query, dir } => Request::Search { dir, query },
        Command::Mkdir { dir, name } => Request::CreateDirectory { dir, name },
        Command::Touch { dir, name, content } => Request::CreateFile { dir, name, content },
        Command::Rename {
            dir,
            old_name,
            new_name,
        } => Request::Rename {
            dir,
            old_name,
            new_name,
        },
        Command::Trash { dir, names } => Request::Trash { dir, names },
        Command::Delete { dir, names } => Request::DeletePermanent { dir, names },
        Command::Copy {
            dir,
            destination,
            names,
        } => Request::Copy {
            dir,
            names,
            destination,
        },
        Command::Move {
            dir,
            destination,
            names,
        } => Request::Move {
            dir,
            names,
            destination,
        },
        Command::Chmod { path, mode } => Request::ChangePermissions { path, mode },
        Command::Compress {
            dir,
            name,
            format,
            names,
        } => Request::Compress {
            dir,
            names,
            archive_name: name,
            format,
        },
        Command::Extract {
            archive,
            destination,
        } => Request::Extract {
            archive,
            destination,
        },
        Command::Cat { dir, name } => Request::ReadFile { dir, name },
        Command::Save { dir, name, content } => Request::SaveFile {
            dir,
            name,
            content: content.unwrap_or_default(),
        },
        Command::Restore { names } => Request::Restore {
            dir: trash_dir.to_string(),
            names,
        },
        Command::EmptyTrash => Request::EmptyTrash,
        Command::ListTrash => Request::ListTrash,
        Command::Request => return None,
    };
    Some(request)
}
