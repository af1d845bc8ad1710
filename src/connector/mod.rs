//! Connector registry.
//!
//! The tracker only needs to resolve a connector id to its type and name
//! (the type selects the retention policy). [`ConnectorCatalog`] serves
//! that from a directory of TOML files, one connector per file:
//!
//! ```toml
//! [connector]
//! id = "c0ffee00-0000-4000-8000-000000000001"
//! name = "ImportFileStix"
//! type = "INTERNAL_IMPORT_FILE"
//! ```

use crate::error::{Error, Result};
use crate::model::Connector;
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

/// Resolves connector ids.
#[async_trait]
pub trait ConnectorRegistry: Send + Sync {
    async fn get(&self, connector_id: &str) -> Result<Option<Connector>>;
}

/// Top-level TOML wrapper.
#[derive(Debug, Deserialize)]
struct ConnectorFile {
    connector: Connector,
}

/// Registry of known connectors, indexed by id.
#[derive(Debug, Default)]
pub struct ConnectorCatalog {
    connectors: HashMap<String, Connector>,
}

impl ConnectorCatalog {
    /// Create an empty catalog.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_connectors(connectors: impl IntoIterator<Item = Connector>) -> Self {
        Self {
            connectors: connectors
                .into_iter()
                .map(|c| (c.id.clone(), c))
                .collect(),
        }
    }

    /// Load all `.toml` files from a directory.
    pub fn load_from_dir(dir: &Path) -> Result<Self> {
        let mut connectors = HashMap::new();

        let entries = std::fs::read_dir(dir).map_err(|e| {
            Error::Config(format!("cannot read connector dir {}: {e}", dir.display()))
        })?;

        for entry in entries {
            let path = entry?.path();
            if path.extension().is_some_and(|ext| ext == "toml") {
                let content = std::fs::read_to_string(&path)?;
                let file: ConnectorFile = toml::from_str(&content).map_err(|e| {
                    Error::Config(format!("bad connector config {}: {e}", path.display()))
                })?;
                let connector = file.connector;
                if connectors.contains_key(&connector.id) {
                    return Err(Error::Config(format!(
                        "duplicate connector id {} in {}",
                        connector.id,
                        path.display()
                    )));
                }
                connectors.insert(connector.id.clone(), connector);
            }
        }

        Ok(Self { connectors })
    }

    pub fn insert(&mut self, connector: Connector) {
        self.connectors.insert(connector.id.clone(), connector);
    }

    pub fn len(&self) -> usize {
        self.connectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connectors.is_empty()
    }
}

#[async_trait]
impl ConnectorRegistry for ConnectorCatalog {
    async fn get(&self, connector_id: &str) -> Result<Option<Connector>> {
        Ok(self.connectors.get(connector_id).cloned())
    }
}
