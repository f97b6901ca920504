use crate::{Result, StoreError};
use rusqlite::types::Value;
use std::sync::Arc;

/// Name of SQLite's implicit row identifier, accepted but never stored.
pub const ROWID: &str = "rowid";

/// A declared table column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    /// Column name.
    pub name: String,
    /// SQL type and constraints (e.g. `TEXT PRIMARY KEY`).
    pub sql_type: String,
    /// Whether the column must be supplied when building a row by name.
    pub required: bool,
}

/// Ordered column declarations for one table.
///
/// The store itself is schema-agnostic; callers declare their columns here
/// and use them both to create tables and to build [`Row`]s.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Columns {
    columns: Vec<Column>,
    ignored: Vec<String>,
}

impl Default for Columns {
    fn default() -> Self {
        Self::new()
    }
}

impl Columns {
    /// Create an empty declaration. `rowid` is ignored by default.
    pub fn new() -> Self {
        Self {
            columns: Vec::new(),
            ignored: vec![ROWID.to_string()],
        }
    }

    /// Declare a required column.
    pub fn column(mut self, name: &str, sql_type: &str) -> Self {
        self.columns.push(Column {
            name: name.to_string(),
            sql_type: sql_type.to_string(),
            required: true,
        });
        self
    }

    /// Declare a column that defaults to `NULL` when omitted.
    pub fn optional(mut self, name: &str, sql_type: &str) -> Self {
        self.columns.push(Column {
            name: name.to_string(),
            sql_type: sql_type.to_string(),
            required: false,
        });
        self
    }

    /// Declare a key that is tolerated in named construction but not stored.
    pub fn ignore(mut self, name: &str) -> Self {
        self.ignored.push(name.to_string());
        self
    }

    /// Column declarations in order.
    pub fn iter(&self) -> impl Iterator<Item = &Column> {
        self.columns.iter()
    }

    /// Column names in declaration order.
    pub fn names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Number of declared columns.
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// Whether no columns are declared.
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    fn is_ignored(&self, name: &str) -> bool {
        self.ignored.iter().any(|k| k == name)
    }
}

/// A generic record: declared column names mapped to values.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    columns: Arc<Columns>,
    values: Vec<Value>,
}

impl Row {
    /// Build a row by positional unpacking, as returned by a query.
    pub fn from_values(columns: &Arc<Columns>, values: Vec<Value>) -> Result<Self> {
        if values.len() != columns.len() {
            return Err(StoreError::ColumnCount {
                expected: columns.len(),
                found: values.len(),
            });
        }
        Ok(Self {
            columns: Arc::clone(columns),
            values,
        })
    }

    /// Build a row from named values.
    ///
    /// Ignored keys (such as `rowid`) are dropped, unknown keys are rejected,
    /// every required column must be present and omitted optional columns
    /// are `NULL`.
    pub fn from_named<'a, I>(columns: &Arc<Columns>, pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (&'a str, Value)>,
    {
        let mut slots: Vec<Option<Value>> = vec![None; columns.len()];
        for (key, value) in pairs {
            if columns.is_ignored(key) {
                continue;
            }
            let index = columns
                .position(key)
                .ok_or_else(|| StoreError::UnknownColumn(key.to_string()))?;
            slots[index] = Some(value);
        }

        let mut values = Vec::with_capacity(columns.len());
        for (column, slot) in columns.iter().zip(slots) {
            match slot {
                Some(value) => values.push(value),
                None if column.required => {
                    return Err(StoreError::MissingColumn(column.name.clone()))
                }
                None => values.push(Value::Null),
            }
        }

        Ok(Self {
            columns: Arc::clone(columns),
            values,
        })
    }

    /// Column names in declaration order.
    pub fn headers(&self) -> Vec<&str> {
        self.columns.names()
    }

    /// Values in declaration order.
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Consume the row, returning its values in declaration order.
    pub fn into_values(self) -> Vec<Value> {
        self.values
    }

    /// Number of values held.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the row holds no values.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Value of a column.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.columns.position(name).map(|i| &self.values[i])
    }

    /// Replace the value of a declared column.
    pub fn set(&mut self, name: &str, value: Value) -> Result<()> {
        let index = self
            .columns
            .position(name)
            .ok_or_else(|| StoreError::UnknownColumn(name.to_string()))?;
        self.values[index] = value;
        Ok(())
    }

    /// Integer value of a column.
    pub fn integer(&self, name: &str) -> Option<i64> {
        match self.get(name)? {
            Value::Integer(v) => Some(*v),
            _ => None,
        }
    }

    /// Floating point value of a column; integers are widened.
    pub fn real(&self, name: &str) -> Option<f64> {
        match self.get(name)? {
            Value::Real(v) => Some(*v),
            Value::Integer(v) => Some(*v as f64),
            _ => None,
        }
    }

    /// Text value of a column.
    pub fn text(&self, name: &str) -> Option<&str> {
        match self.get(name)? {
            Value::Text(v) => Some(v),
            _ => None,
        }
    }

    /// Blob value of a column.
    pub fn blob(&self, name: &str) -> Option<&[u8]> {
        match self.get(name)? {
            Value::Blob(v) => Some(v),
            _ => None,
        }
    }
}
