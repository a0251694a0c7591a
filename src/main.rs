use anyhow::Result;
use clap::Parser;
use std::process::ExitCode;

use fsroot::commands::{self, Cli};

#[tokio::main(flavor = "multi_thread", worker_threads = 4)]
async fn main() -> Result<ExitCode> {
    commands::run(Cli::parse()).await
}
