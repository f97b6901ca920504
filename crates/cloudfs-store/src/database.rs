//! Mutex-guarded SQLite connection with lock-contention retry.

use crate::row::{Columns, Row};
use crate::Result;
use log::{debug, warn};
use parking_lot::Mutex;
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection, ErrorCode};
use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Delay between attempts when SQLite reports the database busy or locked.
pub const RETRY_BACKOFF: Duration = Duration::from_secs(1);

/// Thread-safe handle to an embedded SQLite database.
///
/// Every statement runs behind one mutex, so at most one statement executes
/// at a time regardless of whether it reads or writes. Statements failing
/// with `SQLITE_BUSY`/`SQLITE_LOCKED` are retried after [`RETRY_BACKOFF`]
/// without limit; any other error is returned immediately.
pub struct Database {
    conn: Mutex<Connection>,
    backoff: Duration,
}

impl Database {
    /// Open or create a database file.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path.as_ref())?;
        debug!("Opened database {}", path.as_ref().display());
        Ok(Self::from_connection(conn))
    }

    /// Create an in-memory database (for testing).
    pub fn in_memory() -> Result<Self> {
        Ok(Self::from_connection(Connection::open_in_memory()?))
    }

    fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
            backoff: RETRY_BACKOFF,
        }
    }

    /// Set how long SQLite itself waits on a lock before reporting busy.
    ///
    /// rusqlite defaults to five seconds; a zero timeout hands contention
    /// straight to the retry loop.
    pub fn with_busy_timeout(self, timeout: Duration) -> Result<Self> {
        self.conn.lock().busy_timeout(timeout)?;
        Ok(self)
    }

    /// Override the delay between retries.
    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    // =========================================================================
    // Schema primitives
    // =========================================================================

    /// Drop a table if it exists.
    pub fn drop_table(&self, name: &str) -> Result<()> {
        self.execute(&format!("DROP TABLE IF EXISTS {}", quote_ident(name)), &[])?;
        Ok(())
    }

    /// Create a table from column declarations, optionally dropping it first.
    pub fn create_table(&self, name: &str, columns: &Columns, reset: bool) -> Result<()> {
        if reset {
            self.drop_table(name)?;
        }
        let definitions = columns
            .iter()
            .map(|c| format!("{} {}", quote_ident(&c.name), c.sql_type))
            .collect::<Vec<_>>()
            .join(", ");
        self.execute(
            &format!(
                "CREATE TABLE IF NOT EXISTS {} ({})",
                quote_ident(name),
                definitions
            ),
            &[],
        )?;
        Ok(())
    }

    /// Create an index on one column if it does not exist.
    pub fn create_index(&self, table: &str, column: &str) -> Result<()> {
        let index = format!("{}_{}_index", table, column);
        self.execute(
            &format!(
                "CREATE INDEX IF NOT EXISTS {} ON {} ({})",
                quote_ident(&index),
                quote_ident(table),
                quote_ident(column)
            ),
            &[],
        )?;
        Ok(())
    }

    // =========================================================================
    // Execution primitives
    // =========================================================================

    /// Run a query and return its first row, if any.
    pub fn fetch_one(&self, sql: &str, params: &[Value]) -> Result<Option<Vec<Value>>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(sql)?;
            let count = stmt.column_count();
            let mut rows = stmt.query(params_from_iter(params.iter()))?;
            let first = match rows.next()? {
                Some(row) => Some(read_values(row, count)?),
                None => None,
            };
            Ok(first)
        })
    }

    /// Run a query and return every row.
    pub fn fetch_all(&self, sql: &str, params: &[Value]) -> Result<Vec<Vec<Value>>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(sql)?;
            let count = stmt.column_count();
            let rows = stmt.query_map(params_from_iter(params.iter()), |row| {
                read_values(row, count)
            })?;
            rows.collect()
        })
    }

    /// Run a statement that returns no rows. Returns the affected row count.
    pub fn execute(&self, sql: &str, params: &[Value]) -> Result<usize> {
        self.with_conn(|conn| conn.execute(sql, params_from_iter(params.iter())))
    }

    /// Run one statement for each parameter set inside a single transaction.
    pub fn execute_many(&self, sql: &str, batch: &[Vec<Value>]) -> Result<usize> {
        self.with_conn(|conn| {
            let tx = conn.transaction()?;
            let mut changed = 0;
            {
                let mut stmt = tx.prepare(sql)?;
                for params in batch {
                    changed += stmt.execute(params_from_iter(params.iter()))?;
                }
            }
            tx.commit()?;
            Ok(changed)
        })
    }

    // =========================================================================
    // Row helpers
    // =========================================================================

    /// Like [`Database::fetch_one`], unpacking the result into a [`Row`].
    pub fn fetch_row(
        &self,
        columns: &Arc<Columns>,
        sql: &str,
        params: &[Value],
    ) -> Result<Option<Row>> {
        self.fetch_one(sql, params)?
            .map(|values| Row::from_values(columns, values))
            .transpose()
    }

    /// Like [`Database::fetch_all`], unpacking each result into a [`Row`].
    pub fn fetch_rows(
        &self,
        columns: &Arc<Columns>,
        sql: &str,
        params: &[Value],
    ) -> Result<Vec<Row>> {
        self.fetch_all(sql, params)?
            .into_iter()
            .map(|values| Row::from_values(columns, values))
            .collect()
    }

    /// Insert rows built from `columns` into `table`.
    pub fn insert_rows(&self, table: &str, columns: &Columns, rows: &[Row]) -> Result<usize> {
        let names = columns
            .iter()
            .map(|c| quote_ident(&c.name))
            .collect::<Vec<_>>()
            .join(", ");
        let placeholders = (1..=columns.len())
            .map(|i| format!("?{}", i))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            quote_ident(table),
            names,
            placeholders
        );
        let batch: Vec<Vec<Value>> = rows.iter().map(|r| r.values().to_vec()).collect();
        self.execute_many(&sql, &batch)
    }

    fn with_conn<T>(
        &self,
        mut op: impl FnMut(&mut Connection) -> rusqlite::Result<T>,
    ) -> Result<T> {
        let mut conn = self.conn.lock();
        Ok(retry_locked(self.backoff, || op(&mut conn))?)
    }
}

/// Run `op` until it stops failing with a busy/locked error.
///
/// There is no attempt limit: a statement that keeps hitting contention
/// keeps waiting, `backoff` apart.
pub fn retry_locked<T>(
    backoff: Duration,
    mut op: impl FnMut() -> rusqlite::Result<T>,
) -> rusqlite::Result<T> {
    let mut attempt: u64 = 0;
    loop {
        match op() {
            Err(err) if is_contention(&err) => {
                attempt += 1;
                warn!(
                    "database contention ({}), retry #{} in {:?}",
                    err, attempt, backoff
                );
                thread::sleep(backoff);
            }
            result => return result,
        }
    }
}

/// Whether an error is transient lock contention.
pub fn is_contention(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if matches!(e.code, ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked)
    )
}

fn read_values(row: &rusqlite::Row<'_>, count: usize) -> rusqlite::Result<Vec<Value>> {
    (0..count).map(|i| row.get::<_, Value>(i)).collect()
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::ffi;
    use std::time::Instant;

    fn locked() -> rusqlite::Error {
        rusqlite::Error::SqliteFailure(ffi::Error::new(ffi::SQLITE_LOCKED), None)
    }

    #[test]
    fn retry_recovers_after_two_lock_failures() {
        let mut calls = 0;
        let started = Instant::now();

        let result = retry_locked(RETRY_BACKOFF, || {
            calls += 1;
            if calls <= 2 {
                Err(locked())
            } else {
                Ok("done")
            }
        });

        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls, 3);
        assert!(started.elapsed() >= Duration::from_secs(2));
    }

    #[test]
    fn retry_treats_busy_as_transient() {
        let mut calls = 0;
        let result = retry_locked(Duration::from_millis(1), || {
            calls += 1;
            if calls == 1 {
                Err(rusqlite::Error::SqliteFailure(
                    ffi::Error::new(ffi::SQLITE_BUSY),
                    None,
                ))
            } else {
                Ok(calls)
            }
        });
        assert_eq!(result.unwrap(), 2);
    }

    #[test]
    fn retry_passes_other_errors_through() {
        let mut calls = 0;
        let result: rusqlite::Result<()> = retry_locked(Duration::from_millis(1), || {
            calls += 1;
            Err(rusqlite::Error::QueryReturnedNoRows)
        });
        assert!(matches!(result, Err(rusqlite::Error::QueryReturnedNoRows)));
        assert_eq!(calls, 1);
    }

    #[test]
    fn identifiers_are_quoted() {
        assert_eq!(quote_ident("files"), "\"files\"");
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
    }
}
