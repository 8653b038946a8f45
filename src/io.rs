use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::error::{Result, ViewerError};

/// Source of raw resource bytes (models, panoramas, archives, textures).
pub trait ResourceFetcher {
    fn fetch(&self, resource: &str) -> Result<Vec<u8>>;
}

/// Reads resources from disk. Relative paths resolve against `root`.
#[derive(Debug, Clone)]
pub struct FsFetcher {
    root: PathBuf,
}

impl FsFetcher {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn resolve(&self, resource: &str) -> PathBuf {
        let normalized = normalize_resource_path(resource);
        let path = Path::new(&normalized);
        if path.is_absolute() || resource.starts_with('/') {
            PathBuf::from(resource)
        } else {
            self.root.join(path)
        }
    }
}

impl ResourceFetcher for FsFetcher {
    fn fetch(&self, resource: &str) -> Result<Vec<u8>> {
        load_binary(&self.resolve(resource))
    }
}

/// In-memory resources keyed by normalised path.
#[derive(Debug, Default, Clone)]
pub struct MemoryFetcher {
    files: HashMap<String, Vec<u8>>,
}

impl MemoryFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, resource: &str, bytes: Vec<u8>) {
        self.files.insert(normalize_resource_path(resource), bytes);
    }

    pub fn with(mut self, resource: &str, bytes: Vec<u8>) -> Self {
        self.insert(resource, bytes);
        self
    }
}

impl ResourceFetcher for MemoryFetcher {
    fn fetch(&self, resource: &str) -> Result<Vec<u8>> {
        self.files
            .get(&normalize_resource_path(resource))
            .cloned()
            .ok_or_else(|| ViewerError::NetworkFailure {
                resource: resource.to_string(),
                reason: "not found".into(),
            })
    }
}

fn normalize_resource_path(resource: &str) -> String {
    let mut path = resource.replace('\\', "/");

    if let Some(stripped) = path.strip_prefix("file://") {
        path = stripped.to_string();
    }

    while let Some(stripped) = path.strip_prefix("./") {
        path = stripped.to_string();
    }

    path
}

pub(crate) fn load_binary(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).map_err(|err| ViewerError::NetworkFailure {
        resource: path.display().to_string(),
        reason: err.to_string(),
    })
}
