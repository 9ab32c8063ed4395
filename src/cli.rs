//! Command-line surface: `init`, `install`, `bibtex`; `doctor` and
//! `check-for-upload` are acknowledged but not implemented here (external
//! collaborators of the core engine).

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Uniform Neuromorphic Datasets Repository: index, download, and decompress
/// neuromorphic datasets described by per-directory JSON manifests.
#[derive(Parser)]
#[command(name = "undr")]
#[command(about = "Index, download, and decompress neuromorphic datasets")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Clone, Parser)]
pub struct SharedOptions {
    /// Path to the `.toml` configuration file.
    #[arg(long, short = 'c', default_value = "undr.toml")]
    pub configuration: PathBuf,

    /// Worker thread count. Default: `2 × available_parallelism()`, capped by the file-descriptor budget.
    #[arg(long, short = 'w')]
    pub workers: Option<usize>,

    /// Per-request HTTP timeout override, in seconds.
    #[arg(long, short = 't')]
    pub timeout: Option<f64>,

    /// Re-download and re-decompress every selected file, ignoring what is already on disk.
    #[arg(long)]
    pub force: bool,

    /// Suppress the live progress display.
    #[arg(long)]
    pub quiet: bool,

    /// Verbose logging.
    #[arg(long, short = 'v')]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Write a starter `.toml` configuration file.
    Init {
        /// Where to write the configuration. Default: `undr.toml`.
        #[arg(default_value = "undr.toml")]
        path: PathBuf,
    },

    /// Index every enabled dataset, then download (and, for RAW datasets, decompress) selected files.
    Install {
        #[command(flatten)]
        shared: SharedOptions,
    },

    /// Index every enabled dataset with a DOI-only selector and write a merged bibtex file.
    Bibtex {
        #[command(flatten)]
        shared: SharedOptions,

        /// Output file path.
        out: PathBuf,

        /// Per-DOI HTTP timeout when fetching bibtex entries, in seconds.
        #[arg(long, default_value_t = 10.0)]
        bibtex_timeout: f64,
    },

    /// Not implemented: auditing invariants against locally installed files is an external collaborator of this engine.
    Doctor {
        #[command(flatten)]
        shared: SharedOptions,
    },

    /// Not implemented: preparing a directory for upload to the canonical server is an external collaborator of this engine.
    CheckForUpload {
        /// Directory to check.
        path: PathBuf,
    },
}
