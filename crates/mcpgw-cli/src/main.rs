//! MCP Gateway binary entry point.

mod cli;
mod error;
mod health;
mod http;
mod reaper;
mod rpc;
mod seed;
mod state;

use clap::Parser;

#[tokio::main]
async fn main() {
    let cli = cli::Cli::parse();
    if let Err(err) = cli.execute().await {
        let code = error::display_error(&err);
        std::process::exit(code);
    }
}
