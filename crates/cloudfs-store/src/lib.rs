//! # cloudfs-store
//!
//! Embedded SQLite store used by filesystem implementations to cache remote
//! metadata.
//!
//! This crate provides:
//! - [`Database`]: a connection shared between threads, with every
//!   statement serialized behind one lock
//! - Unbounded retry with a fixed one-second backoff when SQLite reports
//!   `SQLITE_BUSY` or `SQLITE_LOCKED`
//! - [`Columns`] and [`Row`]: caller-declared table layouts and generic
//!   records built positionally or by column name
//!
//! ## Example
//!
//! ```ignore
//! use cloudfs_store::{Columns, Database, Row, Value};
//! use std::sync::Arc;
//!
//! let db = Database::open("cache/metadata.db")?;
//! let columns = Arc::new(
//!     Columns::new()
//!         .column("id", "TEXT PRIMARY KEY")
//!         .optional("etag", "TEXT"),
//! );
//! db.create_table("items", &columns, false)?;
//!
//! let row = Row::from_named(&columns, [("id", Value::Text("root".into()))])?;
//! db.insert_rows("items", &columns, &[row])?;
//! ```

mod database;
mod error;
mod row;

pub use database::{is_contention, retry_locked, Database, RETRY_BACKOFF};
pub use error::{Result, StoreError};
pub use row::{Column, Columns, Row, ROWID};

// Re-export the SQLite value type used in parameters and rows
pub use rusqlite::types::Value;
