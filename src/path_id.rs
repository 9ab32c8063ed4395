//! PathId: a stable, POSIX-style relative path identifying any resource inside a dataset.

use std::fmt;
use std::path::{Path, PathBuf};

/// Rooted at the dataset name (e.g. `nmnist/train/0/foo.es`). Components are
/// kept verbatim (case- and encoding-sensitive) since they are also URL path
/// segments beyond the server root.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PathId(String);

impl PathId {
    pub fn new(value: impl Into<String>) -> Self {
        let value = value.into();
        debug_assert!(!value.starts_with('/'), "PathId must be relative");
        PathId(value)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The dataset name: the first path component.
    pub fn dataset(&self) -> &str {
        self.0.split('/').next().unwrap_or("")
    }

    /// Components after the dataset name, for URL composition against a [`crate::remote::Server`].
    pub fn url_parts(&self) -> impl Iterator<Item = &str> {
        self.0.splitn(2, '/').nth(1).into_iter().flat_map(|rest| rest.split('/'))
    }

    /// Append a child name, producing a new PathId.
    pub fn join(&self, name: &str) -> PathId {
        PathId(format!("{}/{}", self.0, name))
    }

    /// Append a suffix directly to the last component (e.g. `.download`).
    pub fn with_suffix(&self, suffix: &str) -> PathId {
        PathId(format!("{}{}", self.0, suffix))
    }

    /// Map to a filesystem path under `root`.
    pub fn local_path(&self, root: &Path) -> PathBuf {
        root.join(&self.0)
    }
}

impl fmt::Display for PathId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for PathId {
    fn from(value: &str) -> Self {
        PathId::new(value)
    }
}

impl From<String> for PathId {
    fn from(value: String) -> Self {
        PathId::new(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dataset_is_first_component() {
        let p = PathId::new("nmnist/train/0/foo.es");
        assert_eq!(p.dataset(), "nmnist");
    }

    #[test]
    fn url_parts_skip_dataset() {
        let p = PathId::new("nmnist/train/0/foo.es");
        let parts: Vec<&str> = p.url_parts().collect();
        assert_eq!(parts, vec!["train", "0", "foo.es"]);
    }

    #[test]
    fn url_parts_empty_for_dataset_root() {
        let p = PathId::new("nmnist");
        assert_eq!(p.url_parts().count(), 0);
    }

    #[test]
    fn join_appends_component() {
        let p = PathId::new("nmnist").join("train");
        assert_eq!(p.as_str(), "nmnist/train");
    }

    #[test]
    fn with_suffix_appends_to_last_component() {
        let p = PathId::new("a/b/x.es").with_suffix(".download");
        assert_eq!(p.as_str(), "a/b/x.es.download");
    }
}
