//! Spyglass CLI - a realtime client for task/project collaboration servers.

use clap::Parser;
use spyglass::cli::Cli;
use spyglass::client::Client;
use spyglass::commands;
use spyglass::config::Endpoints;
use std::process;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let client = Client::new(Endpoints::from_server_url(&cli.server));

    if let Err(e) = commands::run(&client, cli.command).await {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}
