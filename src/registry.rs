//! Display metadata for every known model.
//!
//! The registry file is a JSON object mapping model id to `{name, description}`.
//! The built-in standard model is never written to it; it is added to every
//! catalog at read time.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{ForecastError, Result};
use crate::utils::io::write_atomic;

pub const STANDARD_MODEL_ID: &str = "standard";
pub const STANDARD_MODEL_NAME: &str = "Standard model";
pub const STANDARD_MODEL_DESCRIPTION: &str =
    "Built-in network with two hidden layers of 64 and 32 units";
pub const DEFAULT_MODEL_NAME: &str = "New model";
pub const DEFAULT_DESCRIPTION: &str = "No description";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub name: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelRecord {
    pub id: String,
    pub name: String,
    pub description: String,
}

#[derive(Deserialize)]
struct StoredEntry {
    name: String,
    #[serde(default)]
    description: Option<String>,
}

pub fn is_standard(id: &str) -> bool {
    id == STANDARD_MODEL_ID
}

/// Fresh random identifier for a user-added model.
pub fn new_model_id() -> String {
    Uuid::new_v4().to_string()
}

/// Immutable snapshot of the registry. Edits return a new snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelCatalog {
    models: BTreeMap<String, ModelInfo>,
}

impl Default for ModelCatalog {
    fn default() -> Self {
        let mut models = BTreeMap::new();
        models.insert(
            STANDARD_MODEL_ID.to_string(),
            ModelInfo {
                name: STANDARD_MODEL_NAME.to_string(),
                description: STANDARD_MODEL_DESCRIPTION.to_string(),
            },
        );
        Self { models }
    }
}

impl ModelCatalog {
    pub fn get(&self, id: &str) -> Option<&ModelInfo> {
        self.models.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.models.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.models.keys().map(String::as_str)
    }

    /// All models, standard model first, the rest by id.
    pub fn records(&self) -> Vec<ModelRecord> {
        let mut records: Vec<ModelRecord> = self
            .models
            .iter()
            .map(|(id, info)| ModelRecord {
                id: id.clone(),
                name: info.name.clone(),
                description: info.description.clone(),
            })
            .collect();
        records.sort_by_key(|r| !is_standard(&r.id));
        records
    }

    /// Inserts or replaces a user model. Empty fields fall back to defaults.
    pub fn with_model(&self, id: &str, name: &str, description: &str) -> Result<Self> {
        if is_standard(id) {
            return Err(ForecastError::ReservedModel(id.to_string()));
        }
        let mut next = self.clone();
        next.models.insert(id.to_string(), info_or_defaults(name, description));
        Ok(next)
    }

    pub fn renamed(&self, id: &str, name: &str, description: &str) -> Result<Self> {
        if is_standard(id) {
            return Err(ForecastError::ReservedModel(id.to_string()));
        }
        if !self.contains(id) {
            return Err(ForecastError::UnknownModel(id.to_string()));
        }
        self.with_model(id, name, description)
    }

    pub fn without(&self, id: &str) -> Result<Self> {
        if is_standard(id) {
            return Err(ForecastError::ReservedModel(id.to_string()));
        }
        let mut next = self.clone();
        next.models
            .remove(id)
            .ok_or_else(|| ForecastError::UnknownModel(id.to_string()))?;
        Ok(next)
    }
}

fn info_or_defaults(name: &str, description: &str) -> ModelInfo {
    let name = name.trim();
    let description = description.trim();
    ModelInfo {
        name: if name.is_empty() { DEFAULT_MODEL_NAME } else { name }.to_string(),
        description: if description.is_empty() {
            DEFAULT_DESCRIPTION
        } else {
            description
        }
        .to_string(),
    }
}

/// Registry backed by a JSON side file.
#[derive(Debug, Clone)]
pub struct ModelRegistry {
    path: PathBuf,
}

impl ModelRegistry {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Standard model plus every entry of the side file. A missing file is not
    /// an error; an unreadable one is.
    pub fn list_models(&self) -> Result<ModelCatalog> {
        let mut catalog = ModelCatalog::default();

        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "no registry file yet");
                return Ok(catalog);
            }
            Err(e) => return Err(e.into()),
        };

        let stored: BTreeMap<String, StoredEntry> = serde_json::from_str(&text)?;
        for (id, entry) in stored {
            if is_standard(&id) {
                continue;
            }
            catalog.models.insert(
                id,
                ModelInfo {
                    name: entry.name,
                    description: entry
                        .description
                        .unwrap_or_else(|| DEFAULT_DESCRIPTION.to_string()),
                },
            );
        }
        Ok(catalog)
    }

    /// Overwrites the side file with every non-standard entry.
    pub fn save_metadata(&self, catalog: &ModelCatalog) -> Result<()> {
        let persisted: BTreeMap<&str, &ModelInfo> = catalog
            .models
            .iter()
            .filter(|(id, _)| !is_standard(id))
            .map(|(id, info)| (id.as_str(), info))
            .collect();

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(&persisted)?;
        write_atomic(&self.path, json.as_bytes())?;
        info!(path = %self.path.display(), models = persisted.len(), "registry saved");
        Ok(())
    }
}
