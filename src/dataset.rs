//! Declarative data-set fixtures.
//!
//! A data set is a YAML document mapping table names to row lists:
//!
//! ```yaml
//! example.pet:
//!   - name: buttons
//!   - name: whiskers
//! ```
//!
//! A table with a null body declares the table with zero rows, which makes
//! an "empty" data set a one-liner. [`export_tables`] writes the same
//! format, so a captured state can be replayed as a fixture.

use std::{fs, path::Path};

use log::{debug, info};
use serde_yaml::{Mapping, Value};

use crate::{
    error::{Error, Result},
    query::{Row, SqlValue, TableSnapshot, TableStore},
};

/// A named, immutable set of table contents.
#[derive(Clone, PartialEq, Debug)]
pub struct DataSet {
    name: String,
    tables: Vec<(String, Vec<Row>)>,
}

impl DataSet {
    /// Load a data set from a YAML file; the file stem becomes its name.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let name = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        let text = fs::read_to_string(path).map_err(|source| Error::FixtureRead {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(name, &text)
    }

    /// Parse a data set from YAML text.
    pub fn parse(name: impl Into<String>, text: &str) -> Result<Self> {
        let name = name.into();
        let doc: Value =
            serde_yaml::from_str(text).map_err(|source| Error::FixtureParse {
                name: name.clone(),
                source,
            })?;

        let mapping = match doc {
            // an empty document declares no tables
            Value::Null => Mapping::new(),
            Value::Mapping(mapping) => mapping,
            other => {
                return Err(shape(
                    &name,
                    format!("expected a table mapping at the top level, got {}", kind(&other)),
                ))
            }
        };

        let mut tables = Vec::with_capacity(mapping.len());
        for (key, body) in mapping {
            let table = key
                .as_str()
                .ok_or_else(|| shape(&name, "table names must be strings".to_string()))?
                .to_string();
            let rows = parse_rows(&name, &table, body)?;
            tables.push((table, rows));
        }
        Ok(Self { name, tables })
    }

    /// The data set's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared tables, in document order.
    pub fn tables(&self) -> impl Iterator<Item = &str> {
        self.tables.iter().map(|(table, _)| table.as_str())
    }

    /// Declared rows of `table`, if the table is declared.
    pub fn rows(&self, table: &str) -> Option<&[Row]> {
        self.tables
            .iter()
            .find(|(name, _)| name == table)
            .map(|(_, rows)| rows.as_slice())
    }

    /// Replace the declared tables' contents with exactly the declared rows.
    pub async fn apply<S: TableStore>(&self, store: &mut S) -> Result<()> {
        info!("applying data set `{}`", self.name);
        for (table, rows) in &self.tables {
            store.truncate_table(table).await?;
            for row in rows {
                store.insert_row(table, row).await?;
            }
            debug!("data set `{}`: {} rows into {table}", self.name, rows.len());
        }
        Ok(())
    }

    /// Truncate the declared tables, restoring the canonical clean state.
    pub async fn clean<S: TableStore>(&self, store: &mut S) -> Result<()> {
        info!("cleaning after data set `{}`", self.name);
        for (table, _) in &self.tables {
            store.truncate_table(table).await?;
        }
        Ok(())
    }
}

/// Serialize snapshots of `tables` into a YAML artifact at `path`.
pub async fn export_tables<S: TableStore>(
    store: &mut S,
    tables: &[String],
    path: impl AsRef<Path>,
) -> Result<()> {
    let path = path.as_ref();
    let mut doc = Mapping::new();
    for table in tables {
        let snapshot = store.snapshot(table).await?;
        doc.insert(Value::String(table.clone()), snapshot_to_yaml(&snapshot));
    }

    let text = serde_yaml::to_string(&doc).map_err(|source| export_err(path, source))?;
    fs::write(path, text).map_err(|source| export_err(path, source))?;
    info!("exported {} table(s) to {}", tables.len(), path.display());
    Ok(())
}

fn export_err(path: &Path, source: impl Into<crate::error::BoxError>) -> Error {
    Error::ExportWrite {
        path: path.to_path_buf(),
        source: source.into(),
    }
}

fn parse_rows(name: &str, table: &str, body: Value) -> Result<Vec<Row>> {
    let seq = match body {
        // `table:` with no body declares zero rows
        Value::Null => return Ok(Vec::new()),
        Value::Sequence(seq) => seq,
        other => {
            return Err(shape(
                name,
                format!("table `{table}`: expected a row list, got {}", kind(&other)),
            ))
        }
    };

    seq.into_iter()
        .map(|row| {
            let Value::Mapping(fields) = row else {
                return Err(shape(name, format!("table `{table}`: rows must be mappings")));
            };
            fields
                .into_iter()
                .map(|(column, value)| {
                    let column = column
                        .as_str()
                        .ok_or_else(|| {
                            shape(name, format!("table `{table}`: column names must be strings"))
                        })?
                        .to_string();
                    let value = scalar(name, table, &column, value)?;
                    Ok((column, value))
                })
                .collect()
        })
        .collect()
}

fn scalar(name: &str, table: &str, column: &str, value: Value) -> Result<SqlValue> {
    Ok(match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Bool(b),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                SqlValue::Int(i)
            } else if let Some(f) = n.as_f64() {
                SqlValue::Float(f)
            } else {
                return Err(shape(
                    name,
                    format!("table `{table}`: column `{column}`: unsupported number"),
                ));
            }
        }
        Value::String(s) => SqlValue::Text(s),
        other => {
            return Err(shape(
                name,
                format!(
                    "table `{table}`: column `{column}`: values must be scalars, got {}",
                    kind(&other)
                ),
            ))
        }
    })
}

fn snapshot_to_yaml(snapshot: &TableSnapshot) -> Value {
    Value::Sequence(
        snapshot
            .rows
            .iter()
            .map(|row| {
                Value::Mapping(
                    row.iter()
                        .map(|(column, value)| {
                            (Value::String(column.clone()), value_to_yaml(value))
                        })
                        .collect(),
                )
            })
            .collect(),
    )
}

fn value_to_yaml(value: &SqlValue) -> Value {
    match value {
        SqlValue::Null => Value::Null,
        SqlValue::Bool(b) => Value::Bool(*b),
        SqlValue::Int(i) => Value::Number((*i).into()),
        SqlValue::Float(f) => Value::Number((*f).into()),
        SqlValue::Text(s) => Value::String(s.clone()),
    }
}

fn shape(name: &str, detail: String) -> Error {
    Error::FixtureShape {
        name: name.to_string(),
        detail,
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Sequence(_) => "a sequence",
        Value::Mapping(_) => "a mapping",
        Value::Tagged(_) => "a tagged value",
    }
}
