//! Selector: a stateless policy object deciding per-file action and
//! whether to scan the filesystem.

use crate::config::Mode;
use crate::manifest::{FileDescriptor, FileKind};
use crate::store::ReadOnlyStore;

/// Per-file action a [`Selector`] can return.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Action {
    Ignore,
    Doi,
    Skip,
    DownloadSkip,
    Download,
    Decompress,
    Process,
}

impl Action {
    /// SKIP and DOWNLOAD_SKIP: report as already complete without doing any I/O.
    pub fn is_skip(self) -> bool {
        matches!(self, Action::Skip | Action::DownloadSkip)
    }

    /// Actions whose files count toward `download_bytes` accounting.
    pub fn reports_download(self) -> bool {
        matches!(
            self,
            Action::Skip | Action::DownloadSkip | Action::Download | Action::Decompress | Action::Process
        )
    }

    /// Actions whose files count toward `process_bytes` accounting.
    pub fn reports_process(self) -> bool {
        matches!(self, Action::Skip | Action::Decompress | Action::Process)
    }

    /// Actions `InstallFilesRecursive` does nothing for.
    pub fn install_ignores(self) -> bool {
        matches!(self, Action::Ignore | Action::Doi | Action::Skip | Action::DownloadSkip)
    }
}

pub trait Selector: Send + Sync {
    fn action(&self, file: &FileDescriptor) -> Action;
    fn scan_filesystem(&self) -> bool;
}

/// REMOTE→IGNORE; LOCAL→DOWNLOAD; RAW→DECOMPRESS; scans the filesystem iff not REMOTE.
pub struct InstallSelector {
    action: Action,
    scan: bool,
}

impl InstallSelector {
    pub fn new(mode: Mode) -> Self {
        match mode {
            Mode::Remote => InstallSelector {
                action: Action::Ignore,
                scan: false,
            },
            Mode::Local => InstallSelector {
                action: Action::Download,
                scan: true,
            },
            Mode::Raw => InstallSelector {
                action: Action::Decompress,
                scan: true,
            },
            Mode::Disabled => InstallSelector {
                action: Action::Ignore,
                scan: false,
            },
        }
    }
}

impl Selector for InstallSelector {
    fn action(&self, _file: &FileDescriptor) -> Action {
        self.action
    }

    fn scan_filesystem(&self) -> bool {
        self.scan
    }
}

/// Every file → DOI (used by the bibtex path to surface DOIs without
/// downloading files).
pub struct DoiSelector;

impl Selector for DoiSelector {
    fn action(&self, _file: &FileDescriptor) -> Action {
        Action::Doi
    }

    fn scan_filesystem(&self) -> bool {
        false
    }
}

/// Typed files → PROCESS, but SKIP if the Store already contains the
/// path_id; others → IGNORE.
pub struct MapSelector {
    enabled_kinds: Vec<FileKind>,
    store: Option<ReadOnlyStore>,
}

impl MapSelector {
    pub fn new(enabled_kinds: Vec<FileKind>, store: Option<ReadOnlyStore>) -> Self {
        MapSelector { enabled_kinds, store }
    }

    fn kind_enabled(&self, kind: FileKind) -> bool {
        self.enabled_kinds.iter().any(|k| kind_matches(*k, kind))
    }
}

fn kind_matches(a: FileKind, b: FileKind) -> bool {
    std::mem::discriminant(&a) == std::mem::discriminant(&b)
}

impl Selector for MapSelector {
    fn action(&self, file: &FileDescriptor) -> Action {
        if self.kind_enabled(file.kind) {
            if let Some(store) = &self.store {
                if store.contains(file.path_id.as_str()) {
                    return Action::Skip;
                }
            }
            Action::Process
        } else {
            Action::Ignore
        }
    }

    fn scan_filesystem(&self) -> bool {
        !self.enabled_kinds.is_empty()
    }
}
