//! Directory manifests (`-index.json`): parsing and schema validation.

use crate::compression::Compression;
use crate::error::{Result, UndrError};
use crate::path_id::PathId;
use serde::Deserialize;
use std::sync::OnceLock;

const SCHEMA_JSON: &str = include_str!("schema/undr_schema.json");

fn schema() -> &'static jsonschema::Validator {
    static SCHEMA: OnceLock<jsonschema::Validator> = OnceLock::new();
    SCHEMA.get_or_init(|| {
        let value: serde_json::Value =
            serde_json::from_str(SCHEMA_JSON).expect("bundled schema is valid JSON");
        jsonschema::validator_for(&value).expect("bundled schema compiles")
    })
}

#[derive(Deserialize)]
struct RawCompression {
    #[serde(rename = "type")]
    kind: String,
    suffix: String,
    size: u64,
    hash: String,
}

#[derive(Deserialize)]
struct RawProperties {
    #[serde(rename = "type")]
    kind: String,
    width: Option<u32>,
    height: Option<u32>,
}

#[derive(Deserialize)]
struct RawFile {
    name: String,
    size: u64,
    hash: String,
    #[serde(default)]
    doi: Option<String>,
    #[serde(default)]
    metadata: serde_json::Value,
    compressions: Vec<RawCompression>,
    properties: RawProperties,
}

#[derive(Deserialize)]
struct RawChildDir {
    name: String,
    #[serde(default)]
    doi: Option<String>,
    #[serde(default)]
    metadata: serde_json::Value,
}

#[derive(Deserialize)]
struct RawManifest {
    #[allow(dead_code)]
    version: String,
    #[serde(default)]
    doi: Option<String>,
    #[serde(default)]
    metadata: serde_json::Value,
    directories: Vec<RawChildDir>,
    files: Vec<RawFile>,
    other_files: Vec<RawFile>,
}

/// Properties-driven file type dispatch tag, used by the Map task's
/// format-routing switch. Decoding the typed packet views
/// themselves is out of scope; this only names the kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FileKind {
    Dvs,
    Aps { width: u32, height: u32 },
    Imu,
    Other,
}

/// `size` and `hash` refer to the decompressed content. `word_size` is
/// format-dependent (1 for opaque files; the fixed record stride otherwise).
#[derive(Clone, Debug)]
pub struct FileDescriptor {
    pub path_id: PathId,
    pub size: u64,
    pub hash: String,
    pub own_doi: Option<String>,
    pub metadata: serde_json::Value,
    pub compressions: Vec<Compression>,
    pub kind: FileKind,
}

impl FileDescriptor {
    pub fn word_size(&self) -> usize {
        match self.kind {
            FileKind::Dvs => crate::records::DVS_WORD_SIZE,
            FileKind::Imu => crate::records::IMU_WORD_SIZE,
            FileKind::Aps { width, height } => crate::records::aps_word_size(width, height),
            FileKind::Other => crate::records::OTHER_WORD_SIZE,
        }
    }

    /// The compression alternative with the smallest compressed size.
    pub fn best_compression(&self) -> &Compression {
        self.compressions
            .iter()
            .min_by_key(|c| c.compressed_size())
            .expect("a file descriptor always has at least one compression")
    }
}

fn file_from_raw(raw: RawFile, parent: &PathId) -> FileDescriptor {
    let path_id = parent.join(&raw.name);
    let kind = match raw.properties.kind.as_str() {
        "dvs" => FileKind::Dvs,
        "imu" => FileKind::Imu,
        "aps" => FileKind::Aps {
            width: raw.properties.width.unwrap_or(0),
            height: raw.properties.height.unwrap_or(0),
        },
        _ => FileKind::Other,
    };
    let compressions = raw
        .compressions
        .into_iter()
        .map(|c| match c.kind.as_str() {
            "brotli" => Compression::Brotli {
                suffix: c.suffix,
                compressed_size: c.size,
                compressed_hash: c.hash,
            },
            _ => Compression::None {
                compressed_size: raw.size,
                compressed_hash: raw.hash.clone(),
            },
        })
        .collect();
    FileDescriptor {
        path_id,
        size: raw.size,
        hash: raw.hash,
        own_doi: raw.doi,
        metadata: raw.metadata,
        compressions,
        kind,
    }
}

/// A child entry (subdirectory) referenced by a manifest, not yet loaded.
#[derive(Clone, Debug)]
pub struct ChildDirectory {
    pub path_id: PathId,
    pub own_doi: Option<String>,
    pub metadata: serde_json::Value,
}

/// `{path_id, own_doi?, metadata, child_dirs[name], files[descriptor], other_files[descriptor]}`.
#[derive(Clone, Debug)]
pub struct Directory {
    pub path_id: PathId,
    pub own_doi: Option<String>,
    pub metadata: serde_json::Value,
    pub child_dirs: Vec<ChildDirectory>,
    pub files: Vec<FileDescriptor>,
    pub other_files: Vec<FileDescriptor>,
}

/// Parse and validate one manifest document already read into memory.
/// `path_id` is the directory's own PathId (the manifest's parent directory).
pub fn parse_manifest(text: &str, path_id: &PathId, manifest_path: &str) -> Result<Directory> {
    let value: serde_json::Value = serde_json::from_str(text).map_err(|e| UndrError::SchemaInvalid {
        path: manifest_path.to_string(),
        message: format!("invalid JSON: {e}"),
    })?;

    if let Err(errors) = schema().validate(&value) {
        return Err(UndrError::SchemaInvalid {
            path: manifest_path.to_string(),
            message: errors.to_string(),
        });
    }

    let raw: RawManifest = serde_json::from_value(value).map_err(|e| UndrError::SchemaInvalid {
        path: manifest_path.to_string(),
        message: format!("schema-valid but unparsable: {e}"),
    })?;

    let mut names = std::collections::HashSet::new();
    let mut check_unique = |name: &str| -> Result<()> {
        if !names.insert(name.to_string()) {
            return Err(UndrError::DuplicateName {
                name: name.to_string(),
                context: manifest_path.to_string(),
            });
        }
        Ok(())
    };
    for d in &raw.directories {
        check_unique(&d.name)?;
    }
    for f in raw.files.iter().chain(raw.other_files.iter()) {
        check_unique(&f.name)?;
    }

    let child_dirs = raw
        .directories
        .into_iter()
        .map(|d| ChildDirectory {
            path_id: path_id.join(&d.name),
            own_doi: d.doi,
            metadata: d.metadata,
        })
        .collect();
    let files = raw.files.into_iter().map(|f| file_from_raw(f, path_id)).collect();
    let other_files = raw
        .other_files
        .into_iter()
        .map(|f| file_from_raw(f, path_id))
        .collect();

    Ok(Directory {
        path_id: path_id.clone(),
        own_doi: raw.doi,
        metadata: raw.metadata,
        child_dirs,
        files,
        other_files,
    })
}
