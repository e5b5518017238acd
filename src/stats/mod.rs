//! Lookup of static module capacities from the game's macro definition files
//!
//! The catalog root is located once (first existing candidate directory wins),
//! indexed by filename stem on first use, and each macro is read at most once
//! per process. Failures for a single macro are cached as "unknown".

mod definition;

use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};
use walkdir::WalkDir;

pub use definition::{parse_macro_definition, PropertyBag};

/// One cargo/storage declaration of a macro
#[derive(Debug, Clone, PartialEq)]
pub struct StorageEntry {
    pub capacity: f64,
    pub tags: Vec<String>,
}

/// Static capacity facts of one macro
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MacroStats {
    pub workforce_capacity: Option<f64>,
    pub storage_entries: Vec<StorageEntry>,
}

impl MacroStats {
    /// Sum of all storage entry capacities; each entry counts once regardless of tags
    pub fn storage_capacity(&self) -> f64 {
        self.storage_entries.iter().map(|e| e.capacity).sum()
    }
}

/// Why a macro could not be resolved; recovered locally as "unknown"
#[derive(Debug, Error)]
pub enum StatsError {
    #[error("no definition file indexed for {0}")]
    NotIndexed(String),

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {message}")]
    Xml { path: PathBuf, message: String },

    #[error("{0} has no macro properties")]
    NoProperties(PathBuf),
}

/// Resolve a macro name to its static stats
pub trait StatsLookup {
    fn lookup(&mut self, macro_name: &str) -> Option<Arc<MacroStats>>;
}

/// Lazily built, cached index over a catalog directory
pub struct ModuleStatsIndex {
    candidates: Vec<PathBuf>,
    root: Option<Option<PathBuf>>,
    macro_files: Option<HashMap<String, PathBuf>>,
    cache: HashMap<String, Option<Arc<MacroStats>>>,
}

impl ModuleStatsIndex {
    /// Use the given candidate directories, in preference order
    pub fn new(candidates: Vec<PathBuf>) -> Self {
        Self {
            candidates,
            root: None,
            macro_files: None,
            cache: HashMap::new(),
        }
    }

    /// Default search order, optionally preceded by an explicit override
    pub fn with_default_candidates(override_dir: Option<PathBuf>) -> Self {
        let mut candidates: Vec<PathBuf> = override_dir.into_iter().collect();
        let exe_dir = env::current_exe()
            .ok()
            .and_then(|p| p.parent().map(Path::to_path_buf));
        if let Some(exe_dir) = exe_dir {
            candidates.push(exe_dir.join("..").join("catalogs"));
            candidates.push(exe_dir.join("catalogs"));
        }
        if let Ok(cwd) = env::current_dir() {
            candidates.push(cwd.join("..").join("catalogs"));
            candidates.push(cwd.join("catalogs"));
        }
        Self::new(candidates)
    }

    /// The catalog root in use; decided on first call and never revisited
    pub fn catalog_root(&mut self) -> Option<&Path> {
        if self.root.is_none() {
            let found = self.candidates.iter().find(|c| c.is_dir()).cloned();
            match &found {
                Some(dir) => info!(root = %dir.display(), "Using module catalog"),
                None => info!(
                    "No module catalog found; module capacities fall back to declared values"
                ),
            }
            self.root = Some(found);
        }
        self.root.as_ref().and_then(|r| r.as_deref())
    }

    /// Number of indexed definition files (builds the index if needed)
    pub fn indexed_len(&mut self) -> usize {
        self.index().len()
    }

    fn index(&mut self) -> &HashMap<String, PathBuf> {
        if self.macro_files.is_none() {
            let files = match self.catalog_root() {
                Some(root) => collect_definition_files(root),
                None => HashMap::new(),
            };
            debug!(files = files.len(), "Indexed macro definitions");
            self.macro_files = Some(files);
        }
        self.macro_files.get_or_insert_with(HashMap::new)
    }

    fn resolve(&mut self, macro_name: &str) -> Result<MacroStats, StatsError> {
        let path = self
            .index()
            .get(macro_name)
            .cloned()
            .ok_or_else(|| StatsError::NotIndexed(macro_name.to_string()))?;

        let xml = std::fs::read_to_string(&path).map_err(|source| StatsError::Io {
            path: path.clone(),
            source,
        })?;
        let properties = parse_macro_definition(&xml)
            .map_err(|message| StatsError::Xml {
                path: path.clone(),
                message,
            })?
            .ok_or_else(|| StatsError::NoProperties(path.clone()))?;

        Ok(properties.to_stats())
    }
}

impl StatsLookup for ModuleStatsIndex {
    fn lookup(&mut self, macro_name: &str) -> Option<Arc<MacroStats>> {
        if macro_name.is_empty() {
            return None;
        }
        if let Some(cached) = self.cache.get(macro_name) {
            return cached.clone();
        }

        let stats = match self.resolve(macro_name) {
            Ok(stats) => Some(Arc::new(stats)),
            Err(err) => {
                debug!(macro_name, error = %err, "Module stats unavailable");
                None
            }
        };
        self.cache.insert(macro_name.to_string(), stats.clone());
        stats
    }
}

/// Map every `<namespace>/assets/structures/**/*_macro.xml` under the catalog
/// root to its path, keyed by file stem; first hit in sorted order wins
fn collect_definition_files(root: &Path) -> HashMap<String, PathBuf> {
    let mut files = HashMap::new();
    let namespaces = WalkDir::new(root)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_dir());

    for namespace in namespaces {
        let structures = namespace.path().join("assets").join("structures");
        if !structures.is_dir() {
            continue;
        }
        let walker = WalkDir::new(&structures)
            .follow_links(true)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file());

        for entry in walker {
            let Some(name) = entry.file_name().to_str() else {
                continue;
            };
            if let Some(stem) = name.strip_suffix(".xml").filter(|s| s.ends_with("_macro")) {
                files
                    .entry(stem.to_string())
                    .or_insert_with(|| entry.path().to_path_buf());
            }
        }
    }
    files
}
