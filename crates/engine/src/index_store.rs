//! Index metadata store
//!
//! Maps (entity type, index name) to the index's configuration. Backed by
//! an optional JSON file that is rewritten through a temp file and rename
//! on every change, so a crash leaves either the old or the new contents.

use kvindex_core::{EntityType, Error, IndexConfig, IndexMetadataStore, Result};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::info;

const STORE_FORMAT_VERSION: u32 = 1;

type IndexKey = (EntityType, String);

#[derive(Debug, Serialize, Deserialize)]
struct StoredIndex {
    entity_type: EntityType,
    index_name: String,
    config: IndexConfig,
}

#[derive(Debug, Serialize, Deserialize)]
struct StoreFile {
    format_version: u32,
    indexes: Vec<StoredIndex>,
}

/// Thread-safe index metadata store
#[derive(Debug)]
pub struct IndexStore {
    path: Option<PathBuf>,
    indexes: RwLock<BTreeMap<IndexKey, IndexConfig>>,
}

impl IndexStore {
    /// Store that lives only in memory
    pub fn in_memory() -> Self {
        Self {
            path: None,
            indexes: RwLock::new(BTreeMap::new()),
        }
    }

    /// Open the store backed by `path`, loading it if the file exists
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let indexes = if path.exists() {
            Self::load(&path)?
        } else {
            BTreeMap::new()
        };
        info!(path = %path.display(), indexes = indexes.len(), "index store opened");
        Ok(Self {
            path: Some(path),
            indexes: RwLock::new(indexes),
        })
    }

    /// Backing file, if any
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Number of known indexes
    pub fn len(&self) -> usize {
        self.indexes.read().len()
    }

    /// Whether no index is known
    pub fn is_empty(&self) -> bool {
        self.indexes.read().is_empty()
    }

    /// Names of the indexes over `entity_type`, sorted
    pub fn index_names(&self, entity_type: EntityType) -> Vec<String> {
        self.indexes
            .read()
            .keys()
            .filter(|(t, _)| *t == entity_type)
            .map(|(_, name)| name.clone())
            .collect()
    }

    fn load(path: &Path) -> Result<BTreeMap<IndexKey, IndexConfig>> {
        let text = fs::read_to_string(path)?;
        let file: StoreFile = serde_json::from_str(&text)
            .map_err(|e| Error::IndexStore(format!("{}: {}", path.display(), e)))?;
        if file.format_version != STORE_FORMAT_VERSION {
            return Err(Error::IndexStore(format!(
                "{}: unsupported format version {}",
                path.display(),
                file.format_version
            )));
        }
        Ok(file
            .indexes
            .into_iter()
            .map(|idx| ((idx.entity_type, idx.index_name), idx.config))
            .collect())
    }

    fn persist(&self, indexes: &BTreeMap<IndexKey, IndexConfig>) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let file = StoreFile {
            format_version: STORE_FORMAT_VERSION,
            indexes: indexes
                .iter()
                .map(|((entity_type, index_name), config)| StoredIndex {
                    entity_type: *entity_type,
                    index_name: index_name.clone(),
                    config: config.clone(),
                })
                .collect(),
        };
        let json = serde_json::to_vec_pretty(&file)
            .map_err(|e| Error::Serialization(e.to_string()))?;

        let tmp = path.with_extension("tmp");
        let mut out = File::create(&tmp)?;
        out.write_all(&json)?;
        out.sync_all()?;
        fs::rename(&tmp, path)?;
        Ok(())
    }
}

impl IndexMetadataStore for IndexStore {
    fn set_if_necessary(
        &self,
        entity_type: EntityType,
        index_name: &str,
        config: &IndexConfig,
    ) -> Result<bool> {
        let mut indexes = self.indexes.write();
        let key = (entity_type, index_name.to_string());
        if indexes.contains_key(&key) {
            return Ok(false);
        }
        indexes.insert(key.clone(), config.clone());
        if let Err(e) = self.persist(&indexes) {
            indexes.remove(&key);
            return Err(Error::IndexStore(format!(
                "failed to persist index {}/{}: {}",
                entity_type, index_name, e
            )));
        }
        info!(entity_type = %entity_type, index = index_name, "index created");
        Ok(true)
    }

    fn get(&self, entity_type: EntityType, index_name: &str) -> Option<IndexConfig> {
        self.indexes
            .read()
            .get(&(entity_type, index_name.to_string()))
            .cloned()
    }
}
