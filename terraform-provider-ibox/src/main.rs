//! Terraform Provider for the iBox storage array
//!
//! Maps desired-state descriptions of hosts, host clusters, pools, volumes
//! and LUN mappings onto the array's REST management API.

mod provider;
mod resources;
mod schema;

use clap::Parser;
use provider::IboxProvider;
use std::io::{self, BufRead, Write};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Terraform Provider for iBox
#[derive(Parser, Debug)]
#[command(name = "terraform-provider-ibox")]
#[command(about = "Terraform provider for the iBox storage array")]
struct Args {
    /// Enable debug mode
    #[arg(long, env = "TF_LOG")]
    debug: bool,
}

fn main() -> anyhow::Result<()> {
    // stdout carries the plugin protocol; all logging goes to stderr.
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    let _args = Args::parse();

    tracing::info!("Starting Terraform Provider for iBox");

    let stdin = io::stdin();
    let stdout = io::stdout();
    let mut stdout_lock = stdout.lock();

    let provider = IboxProvider::new();

    for line in stdin.lock().lines() {
        let input = line?;
        let response = provider.handle_request(&input);
        writeln!(stdout_lock, "{}", response)?;
        stdout_lock.flush()?;
    }

    tracing::info!("Terraform Provider shutting down");
    Ok(())
}
