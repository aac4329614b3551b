//! netapply - network configuration applier
//!
//! Reconciles the kernel's interfaces and routes with generated ifupdown
//! configuration, restarting only what changed.

mod cli;
mod config;
mod diff;
mod error;
mod exec;
mod lock;
mod model;
mod network;
mod planner;
mod reconcile;
mod routes;
mod stanza;
#[cfg(test)]
mod testing;

use chrono::Local;
use cli::Cli;
use config::Settings;
use error::Result;
use exec::SystemRunner;
use log::error;
use reconcile::Reconciler;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

fn main() {
    let cli = Cli::parse_args();

    let settings = match config::load(&config::config_path()) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    init_logging(settings.paths.log_file.as_deref());

    if let Err(e) = run(&cli, &settings) {
        error!("{}", e);
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run(cli: &Cli, settings: &Settings) -> Result<()> {
    let runner = SystemRunner::from_settings(&settings.commands);
    Reconciler::new(settings, &runner).apply(cli.routes)
}

/// Log to the configured file when it can be opened, stderr otherwise
fn init_logging(log_file: Option<&Path>) {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));

    builder.format(|buf, record| {
        let file = record
            .file()
            .and_then(|f| Path::new(f).file_name())
            .and_then(|f| f.to_str())
            .unwrap_or("?");
        writeln!(
            buf,
            "{}: [{}]: {}({}): {}: {}",
            Local::now().format("%FT%T"),
            std::process::id(),
            file,
            record.line().unwrap_or(0),
            record.level(),
            record.args()
        )
    });

    if let Some(path) = log_file {
        if let Ok(file) = OpenOptions::new().create(true).append(true).open(path) {
            builder.target(env_logger::Target::Pipe(Box::new(file)));
        }
    }

    builder.init();
}
