//! Statement dispatch: parsed SQL in, query results out.


use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use thiserror::Error;
use tracing::info;

use crate::catalog::{
    Catalog, CatalogError, Column, IndexInfo, Schema, TableInfo, TypeId, Value,
};
use crate::execution::{
    CompiledExpr, ExecutionError, Executor, FilterExecutor, InsertExecutor, SeqScanExecutor,
};
use crate::heap::{HeapError, TableHeap};
use crate::index::{BPlusTree, IndexError};
use crate::sql::{self, InsertStatement, SelectItem, SelectStatement, SqlError, Statement};
use crate::storage::{BufferPoolManager, DiskManager, Rid, StorageError, DEFAULT_POOL_SIZE};

/// Name of the page file inside the database directory.
pub const DB_FILE: &str = "pagedb.db";

/// Fanout for the per-table integer index.
const INDEX_FANOUT: u32 = 128;

#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("heap error: {0}")]
    Heap(#[from] HeapError),

    #[error("index error: {0}")]
    Index(#[from] IndexError),

    #[error("catalog error: {0}")]
    Catalog(#[from] CatalogError),

    #[error("SQL error: {0}")]
    Sql(#[from] SqlError),

    #[error("execution error: {0}")]
    Execution(#[from] ExecutionError),

    #[error("column {0} not found in table {1}")]
    ColumnNotFound(String, String),

    #[error("INSERT row has {actual} values, expected {expected}")]
    RowArityMismatch { expected: usize, actual: usize },
}

pub type DatabaseResult<T> = Result<T, DatabaseError>;

#[derive(Debug, Clone, PartialEq)]
pub enum QueryResult {
    None,
    RowsAffected(usize),
    Rows {
        header: Vec<String>,
        rows: Vec<Vec<Value>>,
    },
}

/// A single-threaded database instance: one page file, one buffer pool,
/// a JSON catalog, and per-table heaps and integer indexes.
pub struct Database {
    dir: PathBuf,
    bpm: Rc<BufferPoolManager>,
    catalog: Catalog,
    heaps: HashMap<String, TableHeap>,
    indexes: HashMap<String, BPlusTree>,
}

impl Database {
    /// Open (or create) the database stored under `dir`.
    pub fn open<P: AsRef<Path>>(dir: P) -> DatabaseResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;

        let disk = DiskManager::open(dir.join(DB_FILE))?;
        let bpm = Rc::new(BufferPoolManager::new(disk, DEFAULT_POOL_SIZE));
        let catalog = Catalog::load(&dir)?;

        let mut heaps = HashMap::new();
        let mut indexes = HashMap::new();
        for name in catalog.table_names() {
            let info = catalog.table(name)?;
            heaps.insert(
                name.to_string(),
                TableHeap::open(Rc::clone(&bpm), info.pages.clone()),
            );
            if let Some(index) = &info.index {
                indexes.insert(
                    name.to_string(),
                    BPlusTree::open(Rc::clone(&bpm), index.root_page_id, index.max_size),
                );
            }
        }

        info!(dir = %dir.display(), tables = heaps.len(), "database opened");
        Ok(Self {
            dir,
            bpm,
            catalog,
            heaps,
            indexes,
        })
    }

    /// Parse and execute a batch of statements, one result per statement.
    pub fn execute(&mut self, input: &str) -> DatabaseResult<Vec<QueryResult>> {
        let statements = sql::parse(input)?;
        let mut results = Vec::with_capacity(statements.len());
        for statement in statements {
            results.push(self.execute_statement(statement)?);
        }
        Ok(results)
    }

    fn execute_statement(&mut self, statement: Statement) -> DatabaseResult<QueryResult> {
        match statement {
            Statement::CreateTable(stmt) => self.create_table(stmt.table, stmt.columns),
            Statement::Insert(stmt) => self.insert(stmt),
            Statement::Select(stmt) => self.select(stmt),
        }
    }

    fn create_table(
        &mut self,
        name: String,
        columns: Vec<(String, TypeId)>,
    ) -> DatabaseResult<QueryResult> {
        if self.catalog.contains(&name) {
            return Err(CatalogError::TableExists(name).into());
        }

        let schema = Schema::new(
            columns
                .into_iter()
                .map(|(name, type_id)| Column::new(name, type_id))
                .collect(),
        );
        let heap = TableHeap::create(Rc::clone(&self.bpm))?;

        // The first INTEGER column gets the table's index.
        let index_column = schema
            .columns()
            .iter()
            .find(|c| c.type_id == TypeId::Integer)
            .map(|c| c.name.clone());
        let index = match &index_column {
            Some(column) => {
                let tree = BPlusTree::new(Rc::clone(&self.bpm), INDEX_FANOUT)?;
                let info = IndexInfo {
                    column: column.clone(),
                    root_page_id: tree.root_page_id(),
                    max_size: INDEX_FANOUT,
                };
                self.indexes.insert(name.clone(), tree);
                Some(info)
            }
            None => None,
        };

        self.catalog.create_table(
            &name,
            TableInfo {
                schema,
                pages: heap.pages().to_vec(),
                index,
            },
        )?;
        self.heaps.insert(name, heap);
        self.save()?;
        Ok(QueryResult::None)
    }

    fn insert(&mut self, stmt: InsertStatement) -> DatabaseResult<QueryResult> {
        let schema = self.catalog.table(&stmt.table)?.schema.clone();
        let rows = reorder_rows(&stmt, &schema)?;

        let heap = self
            .heaps
            .get_mut(&stmt.table)
            .ok_or_else(|| CatalogError::TableNotFound(stmt.table.clone()))?;
        let index = match self.indexes.get_mut(&stmt.table) {
            Some(tree) => {
                let info = self.catalog.table(&stmt.table)?;
                let column = info.index.as_ref().map(|i| i.column.clone());
                let key_column = column
                    .and_then(|c| schema.column_index(&c))
                    .expect("catalog index column must exist in schema");
                Some((tree, key_column))
            }
            None => None,
        };

        let mut executor = InsertExecutor::new(heap, index, &schema, rows);
        executor.init()?;
        let mut inserted = 0;
        while executor.next()?.is_some() {
            inserted += 1;
        }
        self.sync_catalog()?;
        Ok(QueryResult::RowsAffected(inserted))
    }

    fn select(&mut self, stmt: SelectStatement) -> DatabaseResult<QueryResult> {
        let schema = self.catalog.table(&stmt.table)?.schema.clone();
        let heap = self
            .heaps
            .get(&stmt.table)
            .ok_or_else(|| CatalogError::TableNotFound(stmt.table.clone()))?;

        // Resolve the projection up front
        let mut projection = Vec::new();
        for item in &stmt.select_list {
            match item {
                SelectItem::Star => projection.extend(0..schema.column_count()),
                SelectItem::Column(name) => projection.push(
                    schema
                        .column_index(name)
                        .ok_or_else(|| {
                            DatabaseError::ColumnNotFound(name.clone(), stmt.table.clone())
                        })?,
                ),
            }
        }
        let header: Vec<String> = projection
            .iter()
            .map(|&i| schema.column(i).name.clone())
            .collect();

        let scan = SeqScanExecutor::new(heap);
        let mut executor: Box<dyn Executor + '_> = match &stmt.where_clause {
            Some(predicate) => {
                let compiled = CompiledExpr::bind(predicate, &schema)?;
                Box::new(FilterExecutor::new(Box::new(scan), compiled, &schema))
            }
            None => Box::new(scan),
        };

        executor.init()?;
        let mut rows = Vec::new();
        while let Some((tuple, _rid)) = executor.next()? {
            let mut row = Vec::with_capacity(projection.len());
            for &column in &projection {
                row.push(schema.value_at(tuple.data(), column)?);
            }
            rows.push(row);
        }
        Ok(QueryResult::Rows { header, rows })
    }

    /// Point lookup through the table's index; `None` if the table has no
    /// index or the key is absent.
    pub fn lookup_by_index(&self, table: &str, key: i32) -> DatabaseResult<Option<Vec<Value>>> {
        let Some(tree) = self.indexes.get(table) else {
            return Ok(None);
        };
        let Some(rid) = tree.search(key)? else {
            return Ok(None);
        };
        let schema = &self.catalog.table(table)?.schema;
        let heap = self
            .heaps
            .get(table)
            .ok_or_else(|| CatalogError::TableNotFound(table.to_string()))?;
        match heap.get_tuple(rid)? {
            Some(tuple) => Ok(Some(schema.deserialize_row(tuple.data())?)),
            None => Ok(None),
        }
    }

    /// Rid behind an indexed key, for callers that want the raw location.
    pub fn index_rid(&self, table: &str, key: i32) -> DatabaseResult<Option<Rid>> {
        match self.indexes.get(table) {
            Some(tree) => Ok(tree.search(key)?),
            None => Ok(None),
        }
    }

    pub fn table_names(&self) -> Vec<&str> {
        self.catalog.table_names()
    }

    /// Push heap page lists and index roots back into the catalog.
    fn sync_catalog(&mut self) -> DatabaseResult<()> {
        for (name, heap) in &self.heaps {
            let info = self.catalog.table_mut(name)?;
            info.pages = heap.pages().to_vec();
            if let (Some(index_info), Some(tree)) = (info.index.as_mut(), self.indexes.get(name)) {
                index_info.root_page_id = tree.root_page_id();
            }
        }
        Ok(())
    }

    fn save(&mut self) -> DatabaseResult<()> {
        self.sync_catalog()?;
        self.catalog.save(&self.dir)?;
        Ok(())
    }

    /// Flush everything and persist the catalog. Called from `Drop` as
    /// well; calling it twice is harmless.
    pub fn close(&mut self) -> DatabaseResult<()> {
        self.save()?;
        self.bpm.flush_all_pages()?;
        info!(dir = %self.dir.display(), "database closed");
        Ok(())
    }
}

impl Drop for Database {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

/// Rearrange INSERT rows into schema order when a column list was given.
fn reorder_rows(stmt: &InsertStatement, schema: &Schema) -> DatabaseResult<Vec<Vec<Value>>> {
    if stmt.columns.is_empty() {
        return Ok(stmt.rows.clone());
    }

    for name in &stmt.columns {
        if schema.column_index(name).is_none() {
            return Err(DatabaseError::ColumnNotFound(
                name.clone(),
                stmt.table.clone(),
            ));
        }
    }

    // Map each schema column to its position in the statement's list.
    let mut positions = Vec::with_capacity(schema.column_count());
    for column in schema.columns() {
        let position = stmt
            .columns
            .iter()
            .position(|name| *name == column.name)
            .ok_or_else(|| {
                DatabaseError::ColumnNotFound(column.name.clone(), stmt.table.clone())
            })?;
        positions.push(position);
    }

    let mut rows = Vec::with_capacity(stmt.rows.len());
    for row in &stmt.rows {
        if row.len() != stmt.columns.len() {
            return Err(DatabaseError::RowArityMismatch {
                expected: stmt.columns.len(),
                actual: row.len(),
            });
        }
        rows.push(positions.iter().map(|&p| row[p].clone()).collect());
    }
    Ok(rows)
}
