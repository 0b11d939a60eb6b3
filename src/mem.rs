//! In-memory [`TableStore`], for exercising the runner without a database.

use std::collections::BTreeMap;

use async_trait::async_trait;

use crate::{
    error::{Error, Result},
    query::{Row, SqlValue, TableSnapshot, TableStore},
};

/// A [`TableStore`] over plain maps.
///
/// Unknown tables behave like missing relations: every operation on them is
/// a query error. The failure knobs cover paths a real database only hits
/// under duress, such as a truncate failing during cleanup.
#[derive(Default, Debug)]
pub struct MemStore {
    tables: BTreeMap<String, Vec<Row>>,
    fail_truncates: bool,
    fail_inserts: bool,
}

impl MemStore {
    /// Store with the given tables, all empty.
    pub fn with_tables<I, S>(tables: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            tables: tables
                .into_iter()
                .map(|table| (table.into(), Vec::new()))
                .collect(),
            ..Default::default()
        }
    }

    /// Make subsequent truncates fail, exercising the cleanup error path.
    pub fn fail_truncates(&mut self, fail: bool) {
        self.fail_truncates = fail;
    }

    /// Make subsequent inserts fail, standing in for a constraint violation.
    pub fn fail_inserts(&mut self, fail: bool) {
        self.fail_inserts = fail;
    }

    fn table_mut(&mut self, table: &str) -> Result<&mut Vec<Row>> {
        self.tables
            .get_mut(table)
            .ok_or_else(|| Error::query(table, "no such table"))
    }
}

#[async_trait]
impl TableStore for MemStore {
    async fn count_rows(&mut self, table: &str) -> Result<i64> {
        Ok(self.table_mut(table)?.len() as i64)
    }

    async fn insert_row(&mut self, table: &str, row: &[(String, SqlValue)]) -> Result<()> {
        if self.fail_inserts {
            return Err(Error::query(table, "insert failure injected"));
        }
        self.table_mut(table)?.push(row.to_vec());
        Ok(())
    }

    async fn truncate_table(&mut self, table: &str) -> Result<()> {
        if self.fail_truncates {
            return Err(Error::query(table, "truncate failure injected"));
        }
        self.table_mut(table)?.clear();
        Ok(())
    }

    async fn snapshot(&mut self, table: &str) -> Result<TableSnapshot> {
        Ok(TableSnapshot {
            table: table.to_string(),
            rows: self.table_mut(table)?.clone(),
        })
    }
}
