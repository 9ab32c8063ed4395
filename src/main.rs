//! UNDR CLI: index, download, and decompress neuromorphic datasets.

use anyhow::{Context, Result};
use clap::Parser;
use std::io::Write;
use std::time::Instant;
use undr::cli::{Cli, Commands, SharedOptions};
use undr::config::Configuration;
use undr::logging::setup_logging;
use undr::orchestrator::{run_bibtex, run_install};
use undr::task::{Message, Phase};

const STARTER_CONFIGURATION: &str = r#"# UNDR dataset configuration.
directory = "datasets"

# [[datasets]]
# name = "example"
# url = "https://data.example.org/example/"
# mode = "raw"  # one of: disabled, remote, local, raw
"#;

fn load_configuration(shared: &SharedOptions) -> Result<Configuration> {
    let mut config = Configuration::load(&shared.configuration)
        .with_context(|| format!("loading {}", shared.configuration.display()))?;
    if let Some(timeout) = shared.timeout {
        config.override_timeout(timeout);
    }
    Ok(config)
}

fn worker_count(shared: &SharedOptions) -> usize {
    shared.workers.unwrap_or_else(undr::config::default_worker_count)
}

fn print_message(quiet: bool, message: &Message) {
    if quiet {
        return;
    }
    match message {
        Message::Progress { phase, progress } if progress.complete => {
            let label = match phase {
                Phase::Download => "downloaded",
                Phase::Decompress => "decompressed",
            };
            println!("{label} {}", progress.path_id);
        }
        Message::Error { path_id, message } => eprintln!("error for {path_id}: {message}"),
        _ => {}
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let start_time = Instant::now();

    match cli.command {
        Commands::Init { path } => {
            setup_logging(false);
            if path.is_file() {
                anyhow::bail!("{} already exists", path.display());
            }
            let mut file = std::fs::File::create(&path)
                .with_context(|| format!("creating {}", path.display()))?;
            file.write_all(STARTER_CONFIGURATION.as_bytes())?;
            log::info!("wrote {}", path.display());
        }

        Commands::Install { shared } => {
            setup_logging(shared.verbose);
            let config = load_configuration(&shared)?;
            let workers = worker_count(&shared);
            let interrupted = undr::interrupt::register();
            run_install(&config, workers, shared.force, &interrupted, |message| {
                print_message(shared.quiet, message)
            })?;
            log::debug!("install finished in {:?}", start_time.elapsed());
        }

        Commands::Bibtex { shared, out, bibtex_timeout } => {
            setup_logging(shared.verbose);
            let config = load_configuration(&shared)?;
            let workers = worker_count(&shared);
            let interrupted = undr::interrupt::register();
            let bibtex = run_bibtex(&config, workers, bibtex_timeout, &interrupted, |message| {
                print_message(shared.quiet, message)
            })?;
            std::fs::write(&out, bibtex).with_context(|| format!("writing {}", out.display()))?;
            log::debug!("bibtex finished in {:?}", start_time.elapsed());
        }

        Commands::Doctor { .. } => {
            anyhow::bail!(undr::error::UndrError::OutOfScope(
                "doctor (auditing locally installed files against manifest invariants)"
            ));
        }

        Commands::CheckForUpload { .. } => {
            anyhow::bail!(undr::error::UndrError::OutOfScope(
                "check-for-upload (validating a directory tree before publishing it to the canonical server)"
            ));
        }
    }

    Ok(())
}
