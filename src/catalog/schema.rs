use serde::{Deserialize, Serialize};

use super::error::{CatalogError, CatalogResult};
use super::value::{TypeId, Value};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub type_id: TypeId,
}

impl Column {
    pub fn new(name: impl Into<String>, type_id: TypeId) -> Self {
        Self {
            name: name.into(),
            type_id,
        }
    }
}

/// Fixed-width row layout: column values are laid out back to back at
/// offsets computed from the column types.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Schema {
    columns: Vec<Column>,
    #[serde(skip)]
    offsets: Vec<usize>,
    #[serde(skip)]
    tuple_size: usize,
}

impl Schema {
    pub fn new(columns: Vec<Column>) -> Self {
        let mut schema = Self {
            columns,
            offsets: Vec::new(),
            tuple_size: 0,
        };
        schema.compute_layout();
        schema
    }

    /// Recompute offsets; needed after serde deserialization, which skips
    /// the derived fields.
    pub fn compute_layout(&mut self) {
        self.offsets.clear();
        let mut offset = 0;
        for column in &self.columns {
            self.offsets.push(offset);
            offset += column.type_id.size();
        }
        self.tuple_size = offset;
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn column(&self, index: usize) -> &Column {
        &self.columns[index]
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn column_offset(&self, index: usize) -> usize {
        self.offsets[index]
    }

    pub fn tuple_size(&self) -> usize {
        self.tuple_size
    }

    /// Serialize one row into its fixed-width byte layout.
    pub fn serialize_row(&self, values: &[Value]) -> CatalogResult<Vec<u8>> {
        if values.len() != self.columns.len() {
            return Err(CatalogError::ArityMismatch {
                expected: self.columns.len(),
                actual: values.len(),
            });
        }
        let mut row = vec![0u8; self.tuple_size];
        for (index, (value, column)) in values.iter().zip(&self.columns).enumerate() {
            let offset = self.offsets[index];
            value.serialize_into(column.type_id, &mut row[offset..offset + column.type_id.size()])?;
        }
        Ok(row)
    }

    /// Read the value of column `index` out of a serialized row.
    pub fn value_at(&self, row: &[u8], index: usize) -> CatalogResult<Value> {
        let column = &self.columns[index];
        let offset = self.offsets[index];
        if row.len() < offset + column.type_id.size() {
            return Err(CatalogError::Deserialization(format!(
                "row of {} bytes too short for column {}",
                row.len(),
                column.name
            )));
        }
        Value::deserialize_from(column.type_id, &row[offset..offset + column.type_id.size()])
    }

    /// Deserialize a whole row.
    pub fn deserialize_row(&self, row: &[u8]) -> CatalogResult<Vec<Value>> {
        (0..self.columns.len())
            .map(|index| self.value_at(row, index))
            .collect()
    }
}
