//! Thin query layer over a known set of tables.
//!
//! The harness talks to tables through [`TableStore`], so the runner state
//! machine can be exercised against [`MemStore`][crate::mem::MemStore]
//! without a container. [`PgStore`] is the real implementation over a
//! `tokio-postgres` connection.

use async_trait::async_trait;
use bytes::BytesMut;
use log::warn;
use serde_json::Value as JsonValue;
use tokio_postgres::{
    types::{to_sql_checked, IsNull, ToSql, Type},
    Client, NoTls,
};

use crate::{
    config::DbConfig,
    error::{Error, Result},
};

/// A single cell value, as declared in a data set or bound as a statement
/// parameter.
#[derive(Clone, PartialEq, Debug)]
pub enum SqlValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl From<&str> for SqlValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for SqlValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for SqlValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<bool> for SqlValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl SqlValue {
    /// Map a JSON scalar; `None` for arrays and objects.
    pub(crate) fn from_json(value: &JsonValue) -> Option<Self> {
        match value {
            JsonValue::Null => Some(Self::Null),
            JsonValue::Bool(b) => Some(Self::Bool(*b)),
            JsonValue::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Some(Self::Int(i))
                } else {
                    n.as_f64().map(Self::Float)
                }
            }
            JsonValue::String(s) => Some(Self::Text(s.clone())),
            JsonValue::Array(_) | JsonValue::Object(_) => None,
        }
    }
}

impl ToSql for SqlValue {
    // Data sets carry untyped scalars; the destination column decides the
    // width, so dispatch on it.
    fn to_sql(
        &self,
        ty: &Type,
        out: &mut BytesMut,
    ) -> std::result::Result<IsNull, Box<dyn std::error::Error + Sync + Send>> {
        match self {
            Self::Null => Ok(IsNull::Yes),
            Self::Bool(b) => b.to_sql(ty, out),
            Self::Int(i) => {
                if *ty == Type::INT2 {
                    (*i as i16).to_sql(ty, out)
                } else if *ty == Type::INT4 {
                    (*i as i32).to_sql(ty, out)
                } else {
                    i.to_sql(ty, out)
                }
            }
            Self::Float(f) => {
                if *ty == Type::FLOAT4 {
                    (*f as f32).to_sql(ty, out)
                } else {
                    f.to_sql(ty, out)
                }
            }
            Self::Text(s) => s.to_sql(ty, out),
        }
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }

    to_sql_checked!();
}

/// One table row: column/value pairs in declaration order.
pub type Row = Vec<(String, SqlValue)>;

/// Contents of a table at a point in time.
#[derive(Clone, PartialEq, Debug)]
pub struct TableSnapshot {
    /// The table the snapshot was taken of.
    pub table: String,
    /// Its rows, in the order the backend returned them.
    pub rows: Vec<Row>,
}

impl TableSnapshot {
    /// Number of rows in the snapshot.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the snapshot holds no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Operations the fixture controller and test bodies need from a database.
#[async_trait]
pub trait TableStore: Send {
    /// Current row count of `table`; no side effects.
    async fn count_rows(&mut self, table: &str) -> Result<i64>;

    /// Insert one row into `table`.
    async fn insert_row(&mut self, table: &str, row: &[(String, SqlValue)]) -> Result<()>;

    /// Remove every row of `table`.
    async fn truncate_table(&mut self, table: &str) -> Result<()>;

    /// Current contents of `table`.
    async fn snapshot(&mut self, table: &str) -> Result<TableSnapshot>;
}

/// [`TableStore`] over a live PostgreSQL connection.
pub struct PgStore {
    client: Client,
    conn: tokio::task::JoinHandle<()>,
}

impl PgStore {
    /// Connect with explicit coordinates.
    pub async fn connect(config: &DbConfig) -> Result<Self> {
        let (client, connection) = tokio_postgres::connect(&config.url, NoTls)
            .await
            .map_err(|source| Error::Connect {
                url: config.url.clone(),
                source,
            })?;

        let url = config.url.clone();
        let conn = tokio::spawn(async move {
            if let Err(err) = connection.await {
                warn!("connection to {url} lost: {err}");
            }
        });

        Ok(Self { client, conn })
    }

    /// Connect with coordinates previously published to the environment.
    pub async fn connect_from_env() -> Result<Self> {
        Self::connect(&DbConfig::from_env()?).await
    }

    /// Execute arbitrary setup SQL, e.g. schema creation before a run.
    pub async fn batch_execute(&mut self, sql: &str) -> Result<()> {
        self.client
            .batch_execute(sql)
            .await
            .map_err(|err| Error::query("(batch)", err))
    }
}

impl Drop for PgStore {
    fn drop(&mut self) {
        self.conn.abort();
    }
}

#[async_trait]
impl TableStore for PgStore {
    async fn count_rows(&mut self, table: &str) -> Result<i64> {
        let sql = format!("SELECT count(*) FROM {}", quote_ident(table));
        let row = self
            .client
            .query_one(&sql, &[])
            .await
            .map_err(|err| Error::query(table, err))?;
        row.try_get(0).map_err(|err| Error::query(table, err))
    }

    async fn insert_row(&mut self, table: &str, row: &[(String, SqlValue)]) -> Result<()> {
        let sql = if row.is_empty() {
            format!("INSERT INTO {} DEFAULT VALUES", quote_ident(table))
        } else {
            let columns = row
                .iter()
                .map(|(column, _)| quote_ident(column))
                .collect::<Vec<_>>()
                .join(", ");
            let placeholders = (1..=row.len())
                .map(|i| format!("${i}"))
                .collect::<Vec<_>>()
                .join(", ");
            format!(
                "INSERT INTO {} ({columns}) VALUES ({placeholders})",
                quote_ident(table)
            )
        };

        let params = row
            .iter()
            .map(|(_, value)| value as &(dyn ToSql + Sync))
            .collect::<Vec<_>>();
        self.client
            .execute(&sql, &params)
            .await
            .map_err(|err| Error::query(table, err))?;
        Ok(())
    }

    async fn truncate_table(&mut self, table: &str) -> Result<()> {
        let sql = format!("TRUNCATE TABLE {}", quote_ident(table));
        self.client
            .execute(&sql, &[])
            .await
            .map_err(|err| Error::query(table, err))?;
        Ok(())
    }

    async fn snapshot(&mut self, table: &str) -> Result<TableSnapshot> {
        // row_to_json keeps us out of per-type fetch plumbing and preserves
        // column order as declared in the table.
        let sql = format!("SELECT row_to_json(t)::text FROM {} t", quote_ident(table));
        let rows = self
            .client
            .query(&sql, &[])
            .await
            .map_err(|err| Error::query(table, err))?;

        let mut snapshot = TableSnapshot {
            table: table.to_string(),
            rows: Vec::with_capacity(rows.len()),
        };
        for row in rows {
            let json: String = row.try_get(0).map_err(|err| Error::query(table, err))?;
            let value: JsonValue =
                serde_json::from_str(&json).map_err(|err| Error::query(table, err))?;
            snapshot.rows.push(json_row(table, &value)?);
        }
        Ok(snapshot)
    }
}

// `example.pet` → `"example"."pet"`
fn quote_ident(ident: &str) -> String {
    ident
        .split('.')
        .map(|part| format!("\"{}\"", part.replace('"', "\"\"")))
        .collect::<Vec<_>>()
        .join(".")
}

fn json_row(table: &str, value: &JsonValue) -> Result<Row> {
    let JsonValue::Object(map) = value else {
        return Err(Error::query(table, "row_to_json returned a non-object"));
    };
    map.iter()
        .map(|(column, value)| {
            SqlValue::from_json(value)
                .map(|value| (column.clone(), value))
                .ok_or_else(|| {
                    Error::query(table, format!("unsupported value in column `{column}`"))
                })
        })
        .collect()
}
