//! Configuration file loading (`.toml`) and engine-wide tuning constants.

use crate::error::{Result, UndrError};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Bytes per streamed chunk for downloads and decompression (`CHUNK_SIZE`).
pub const CHUNK_SIZE: usize = 65536;
/// Below this many chunks worth of declared size, implementations MAY buffer instead of stream.
pub const STREAM_CHUNK_THRESHOLD: usize = 64;
/// Worker idle-poll interval when every priority queue is empty.
pub const WORKER_POLL_PERIOD_MS: u64 = 20;
/// Consumer poll interval used by the orchestrator's display-forwarding loop.
pub const CONSUMER_POLL_PERIOD_MS: u64 = 100;
/// Suffix for in-flight downloads.
pub const DOWNLOAD_SUFFIX: &str = ".download";
/// Suffix for in-flight decompression output.
pub const DECOMPRESS_SUFFIX: &str = ".decompress";
/// Default per-request HTTP timeout, in seconds.
pub const DEFAULT_TIMEOUT_SECS: f64 = 60.0;
/// Manifest LRU cache size.
pub const LRU_CACHE_MAXSIZE: usize = 128;
/// Durable store: flush a batch after this many rows...
pub const STORE_COMMIT_ROW_THRESHOLD: usize = 100;
/// ...or after this many milliseconds, whichever comes first.
pub const STORE_COMMIT_FLUSH_DELAY_MS: u64 = 100;
/// Reserved file descriptors per in-flight worker (one HTTP connection, one or two local files).
pub const FDS_PER_WORKER: usize = 4;

/// `{disabled, remote, local, raw}` — controls whether to skip, index only,
/// also download, or also decompress a dataset.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Disabled,
    Remote,
    Local,
    Raw,
}

/// `{name, url, mode, timeout}` for one declared dataset.
#[derive(Clone, Debug, Deserialize)]
pub struct DatasetSettings {
    pub name: String,
    pub url: String,
    pub mode: Mode,
    #[serde(default)]
    pub timeout: Option<f64>,
}

impl DatasetSettings {
    pub fn timeout_secs(&self) -> f64 {
        self.timeout.unwrap_or(DEFAULT_TIMEOUT_SECS)
    }
}

#[derive(Deserialize)]
struct RawConfigFile {
    directory: PathBuf,
    #[serde(default)]
    datasets: Vec<DatasetSettings>,
}

/// A loaded `.toml` configuration: the local root directory plus every
/// declared dataset (including disabled ones; callers filter as needed).
#[derive(Clone, Debug)]
pub struct Configuration {
    pub directory: PathBuf,
    pub datasets: Vec<DatasetSettings>,
}

impl Configuration {
    /// Load and validate a configuration file. `directory`, if relative, is
    /// resolved relative to the configuration file's parent.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| UndrError::io(path.display().to_string(), e))?;
        let raw: RawConfigFile =
            toml::from_str(&text).map_err(|e| UndrError::Config(format!("{path:?}: {e}")))?;

        let mut seen = HashSet::new();
        for dataset in &raw.datasets {
            if !seen.insert(dataset.name.clone()) {
                return Err(UndrError::DuplicateName {
                    name: dataset.name.clone(),
                    context: "configuration".to_string(),
                });
            }
        }

        let directory = if raw.directory.is_absolute() {
            raw.directory
        } else {
            path.parent().unwrap_or_else(|| Path::new(".")).join(&raw.directory)
        };
        std::fs::create_dir_all(&directory)
            .map_err(|e| UndrError::io(directory.display().to_string(), e))?;

        Ok(Configuration {
            directory,
            datasets: raw.datasets,
        })
    }

    /// Overrides every dataset's per-request timeout (the CLI's `--timeout` flag).
    pub fn override_timeout(&mut self, timeout_secs: f64) {
        for dataset in &mut self.datasets {
            dataset.timeout = Some(timeout_secs);
        }
    }

    /// Every dataset whose mode is not `Disabled`. Fatal if none.
    pub fn enabled_datasets(&self) -> Result<Vec<&DatasetSettings>> {
        let result: Vec<&DatasetSettings> = self
            .datasets
            .iter()
            .filter(|d| d.mode != Mode::Disabled)
            .collect();
        if result.is_empty() {
            return Err(UndrError::EmptyConfiguration);
        }
        Ok(result)
    }
}

/// Default worker count: `2 × available_parallelism()`, capped by the
/// process file-descriptor budget the same way the rest of this engine's
/// concurrency knobs are capped (see [`crate::fd_limit`]).
pub fn default_worker_count() -> usize {
    let cpu = std::thread::available_parallelism().map(|n| n.get()).unwrap_or(4);
    let by_cpu = cpu * 2;
    match crate::fd_limit::max_workers_by_fd_limit(FDS_PER_WORKER) {
        Some(cap) => by_cpu.min(cap).max(1),
        None => by_cpu,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp(contents: &str) -> PathBuf {
        let mut path = std::env::temp_dir();
        path.push(format!("undr-config-test-{}-{}.toml", std::process::id(), contents.len()));
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        path
    }

    #[test]
    fn loads_datasets_and_resolves_relative_directory() {
        let path = write_temp(
            r#"
directory = "datasets-a"
[[datasets]]
name = "a"
url = "https://example.org/a/"
mode = "raw"
"#,
        );
        let config = Configuration::load(&path).unwrap();
        assert_eq!(config.datasets.len(), 1);
        assert_eq!(config.datasets[0].mode, Mode::Raw);
        assert!(config.directory.ends_with("datasets-a"));
        std::fs::remove_file(&path).ok();
        std::fs::remove_dir_all(&config.directory).ok();
    }

    #[test]
    fn duplicate_name_is_fatal() {
        let path = write_temp(
            r#"
directory = "datasets-b"
[[datasets]]
name = "a"
url = "https://example.org/a/"
mode = "raw"
[[datasets]]
name = "a"
url = "https://example.org/b/"
mode = "remote"
"#,
        );
        let err = Configuration::load(&path).unwrap_err();
        assert!(matches!(err, UndrError::DuplicateName { .. }));
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn all_disabled_is_empty_configuration() {
        let path = write_temp(
            r#"
directory = "datasets-c"
[[datasets]]
name = "a"
url = "https://example.org/a/"
mode = "disabled"
"#,
        );
        let config = Configuration::load(&path).unwrap();
        let err = config.enabled_datasets().unwrap_err();
        assert!(matches!(err, UndrError::EmptyConfiguration));
        std::fs::remove_file(&path).ok();
        std::fs::remove_dir_all(&config.directory).ok();
    }
}
