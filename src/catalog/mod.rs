//! Table metadata: schemas, heap page lists, and index root pointers.
//!
//! The catalog is the only state that survives restart outside the page
//! file itself; without it the tree's root page id would be lost (no
//! persistent root pointer exists on disk).

mod error;
mod schema;
mod value;

pub use error::{CatalogError, CatalogResult};
pub use schema::{Column, Schema};
pub use value::{TypeId, Value};

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::storage::PageId;

pub const CATALOG_FILE: &str = "catalog.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexInfo {
    pub column: String,
    pub root_page_id: PageId,
    pub max_size: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableInfo {
    pub schema: Schema,
    /// Heap pages in insertion order; the last one receives new tuples.
    pub pages: Vec<PageId>,
    pub index: Option<IndexInfo>,
}

/// All table metadata, persisted as JSON next to the database file.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Catalog {
    tables: HashMap<String, TableInfo>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the catalog from `dir`, or start empty if none was saved yet.
    pub fn load(dir: &Path) -> CatalogResult<Self> {
        let path = dir.join(CATALOG_FILE);
        if !path.exists() {
            return Ok(Self::new());
        }
        let content = fs::read_to_string(&path)?;
        let mut catalog: Catalog = serde_json::from_str(&content)?;
        for table in catalog.tables.values_mut() {
            table.schema.compute_layout();
        }
        Ok(catalog)
    }

    pub fn save(&self, dir: &Path) -> CatalogResult<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(dir.join(CATALOG_FILE), content)?;
        Ok(())
    }

    pub fn create_table(&mut self, name: &str, info: TableInfo) -> CatalogResult<()> {
        if self.tables.contains_key(name) {
            return Err(CatalogError::TableExists(name.to_string()));
        }
        self.tables.insert(name.to_string(), info);
        Ok(())
    }

    pub fn table(&self, name: &str) -> CatalogResult<&TableInfo> {
        self.tables
            .get(name)
            .ok_or_else(|| CatalogError::TableNotFound(name.to_string()))
    }

    pub fn table_mut(&mut self, name: &str) -> CatalogResult<&mut TableInfo> {
        self.tables
            .get_mut(name)
            .ok_or_else(|| CatalogError::TableNotFound(name.to_string()))
    }

    pub fn table_names(&self) -> Vec<&str> {
        self.tables.keys().map(String::as_str).collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tables.contains_key(name)
    }
}
