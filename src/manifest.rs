//! Manifest System - program catalogs per category
//!
//! The catalog is a snapshot of a directory tree, one manifest per category.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;

use crate::normalize::write_atomically;

pub type ProgramId = String;

/// Finder metadata files are never programs.
const IGNORED_FILES: &[&str] = &[".DS_Store"];

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("Unknown category: {0}")]
    UnknownCategory(String),

    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed catalog: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Ordered program list for one category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
    pub programs: Vec<ProgramId>,
}

impl Manifest {
    pub fn new(path: impl Into<String>, programs: Vec<ProgramId>) -> Self {
        Self {
            path: path.into(),
            default: None,
            programs,
        }
    }

    /// Program ids paired with their location under `base_dir`, in manifest order.
    /// Ids are joined as given; check them with [`is_contained`] before use.
    pub fn resolve(&self, base_dir: &Path) -> Vec<(ProgramId, PathBuf)> {
        self.programs
            .iter()
            .map(|p| (p.clone(), base_dir.join(p)))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.programs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.programs.is_empty()
    }
}

/// Whether `id` names a path below the programs directory. Absolute paths,
/// drive prefixes and any `..` component are rejected, as is an empty id.
pub fn is_contained(id: &str) -> bool {
    let mut named = false;
    for component in Path::new(id).components() {
        match component {
            Component::Normal(_) => named = true,
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return false,
        }
    }
    named
}

/// Category name to manifest, as stored in `programs.json`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Catalog {
    categories: BTreeMap<String, Manifest>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enumerate `<root>/<category>/` for each category.
    ///
    /// `url_root` is the public prefix programs are served under; `defaults`
    /// names the program a front end opens first for a category.
    pub fn generate(
        root: &Path,
        categories: &[&str],
        url_root: &str,
        defaults: &BTreeMap<String, String>,
    ) -> Result<Self, ManifestError> {
        let mut catalog = Self::new();
        for category in categories {
            let dir = root.join(category);
            let url_path = format!("{}/{}", url_root.trim_end_matches('/'), category);
            let mut manifest = Manifest::new(url_path.clone(), list_programs(&dir)?);
            manifest.default = defaults
                .get(*category)
                .map(|program| format!("{}/{}", url_path, program));
            log::debug!("{}: {} programs", category, manifest.len());
            catalog.register(category, manifest);
        }
        Ok(catalog)
    }

    pub fn load(path: &Path) -> Result<Self, ManifestError> {
        let content = fs::read_to_string(path).map_err(|source| ManifestError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn save(&self, path: &Path) -> Result<(), ManifestError> {
        let json = serde_json::to_string_pretty(self)?;
        write_atomically(path, |out| {
            out.write_all(json.as_bytes())?;
            out.write_all(b"\n")
        })
        .map_err(|source| ManifestError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn category(&self, name: &str) -> Result<&Manifest, ManifestError> {
        self.categories
            .get(name)
            .ok_or_else(|| ManifestError::UnknownCategory(name.to_string()))
    }

    pub fn categories(&self) -> impl Iterator<Item = &str> {
        self.categories.keys().map(String::as_str)
    }

    pub fn register(&mut self, name: &str, manifest: Manifest) {
        self.categories.insert(name.to_string(), manifest);
    }
}

/// File names in `dir`, sorted case-insensitively.
pub fn list_programs(dir: &Path) -> Result<Vec<ProgramId>, ManifestError> {
    let io_err = |source| ManifestError::Io {
        path: dir.to_path_buf(),
        source,
    };
    let mut programs = vec![];
    for entry in fs::read_dir(dir).map_err(io_err)? {
        let entry = entry.map_err(io_err)?;
        if !entry.file_type().map_err(io_err)?.is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if IGNORED_FILES.contains(&name.as_str()) {
            continue;
        }
        programs.push(name);
    }
    programs.sort_by_key(|name| name.to_lowercase());
    Ok(programs)
}
