//! Command-line interface for netapply
//!
//! Uses clap with derive for type-safe CLI parsing

use clap::Parser;

/// Applies the generated network configuration to the running kernel
#[derive(Parser, Debug)]
#[command(name = "netapply")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Only reconcile static routes
    #[arg(long)]
    pub routes: bool,
}

impl Cli {
    /// Parse command-line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
