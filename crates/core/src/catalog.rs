//! Static test catalog: a pre-generated mapping from category to the known
//! scenarios in it, used to seed `pending` entries before a run starts.
//!
//! The catalog is read-only input. A missing catalog file is not fatal: the
//! dashboard degrades to showing only live-run scenarios.

use crate::error::{Error, Result};
use crate::types::Scenario;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{info, warn};

/// Where the seeded scenario list came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CatalogSource {
    /// Seeded from the pre-generated catalog file
    Catalog,
    /// No catalog available; only live-run scenarios are shown
    Empty,
}

/// One test as enumerated by the catalog generator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogTest {
    /// Stable id; derived from (file, name) when the generator omits it
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    pub file: String,
    #[serde(default)]
    pub suite: String,
}

/// One category of the catalog
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogCategory {
    pub total: usize,
    pub tests: Vec<CatalogTest>,
}

/// The full pre-generated catalog
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Catalog {
    // BTreeMap keeps category iteration stable across loads
    #[serde(flatten)]
    pub categories: BTreeMap<String, CatalogCategory>,
}

impl Catalog {
    /// Parse a catalog from a JSON string
    pub fn from_json(json: &str) -> Result<Self> {
        let catalog: Self = serde_json::from_str(json)?;
        for (category, entry) in &catalog.categories {
            if entry.total != entry.tests.len() {
                warn!(
                    category = %category,
                    declared = entry.total,
                    actual = entry.tests.len(),
                    "catalog total does not match test list length"
                );
            }
        }
        Ok(catalog)
    }

    /// Load a catalog from a file, degrading to an empty catalog when the
    /// file does not exist.
    pub fn load(path: &Path) -> Result<(Self, CatalogSource)> {
        if !path.exists() {
            info!(path = %path.display(), "no catalog file; seeding nothing");
            return Ok((Self::default(), CatalogSource::Empty));
        }
        let content = std::fs::read_to_string(path)?;
        let catalog = Self::from_json(&content)
            .map_err(|e| Error::Catalog(format!("{}: {}", path.display(), e)))?;
        Ok((catalog, CatalogSource::Catalog))
    }

    /// All known scenarios as pending entries, in category then list order.
    ///
    /// Ids here must match what the live ingestion path derives, since the
    /// merger joins static and live state on them.
    pub fn scenarios(&self) -> Vec<Scenario> {
        let mut out = Vec::new();
        for entry in self.categories.values() {
            for test in &entry.tests {
                let mut scenario = Scenario::pending(&test.name, &test.file, &test.suite);
                if let Some(id) = &test.id {
                    scenario.id = id.clone();
                }
                out.push(scenario);
            }
        }
        out
    }

    /// Total number of enumerated tests
    pub fn len(&self) -> usize {
        self.categories.values().map(|c| c.tests.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
