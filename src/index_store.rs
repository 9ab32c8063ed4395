//! Index store: loads and caches parsed directory manifests.

use crate::config::LRU_CACHE_MAXSIZE;
use crate::error::{Result, UndrError};
use crate::manifest::{self, Directory};
use crate::path_id::PathId;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Process-local LRU cache of parsed manifests keyed by the canonical
/// filesystem path of the `-index.json` file. Workers in separate processes
/// would each maintain their own; here, workers are threads in one process
/// sharing one store behind a mutex (cheap: loads are infrequent relative to
/// download/decompress work).
pub struct IndexStore {
    cache: Mutex<LruCache<PathBuf, Directory>>,
}

impl IndexStore {
    pub fn new() -> Self {
        IndexStore {
            cache: Mutex::new(LruCache::new(
                NonZeroUsize::new(LRU_CACHE_MAXSIZE).expect("cache size is nonzero"),
            )),
        }
    }

    /// Read one `<root>/<path_id>/-index.json`, validate, and return the
    /// parsed manifest. A missing manifest produces [`UndrError::NotInstalled`].
    pub fn load(&self, root: &Path, path_id: &PathId) -> Result<Directory> {
        let manifest_path = path_id.local_path(root).join("-index.json");
        let canonical = manifest_path
            .canonicalize()
            .unwrap_or_else(|_| manifest_path.clone());

        if let Some(hit) = self.cache.lock().unwrap().get(&canonical) {
            return Ok(hit.clone());
        }

        let text = std::fs::read_to_string(&manifest_path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                UndrError::NotInstalled {
                    path_id: path_id.clone(),
                }
            } else {
                UndrError::io(manifest_path.display().to_string(), e)
            }
        })?;

        let directory = manifest::parse_manifest(&text, path_id, &manifest_path.display().to_string())?;
        self.cache.lock().unwrap().put(canonical, directory.clone());
        Ok(directory)
    }
}

impl Default for IndexStore {
    fn default() -> Self {
        Self::new()
    }
}
