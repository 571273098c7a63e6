// Database handle, explicit connection config, and counted connection leases.
use crate::core::error::{Error, ErrorKind};
use rusqlite::{Connection, OpenFlags};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_TABLE: &str = "user_data";
const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_FETCH_SIZE: usize = 1;

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DbConfig {
    pub path: PathBuf,
    pub table: String,
    pub busy_timeout: Duration,
    /// Rows pulled from storage per cursor step of a record stream.
    pub fetch_size: usize,
}

impl DbConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            table: DEFAULT_TABLE.to_string(),
            busy_timeout: DEFAULT_BUSY_TIMEOUT,
            fetch_size: DEFAULT_FETCH_SIZE,
        }
    }

    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }

    pub fn with_busy_timeout(mut self, busy_timeout: Duration) -> Self {
        self.busy_timeout = busy_timeout;
        self
    }

    pub fn with_fetch_size(mut self, fetch_size: usize) -> Self {
        self.fetch_size = fetch_size;
        self
    }
}

/// Entry point for every sequence. Holds configuration only; each sequence
/// opens and owns its own connection.
#[derive(Clone, Debug)]
pub struct Database {
    config: DbConfig,
    live: Arc<AtomicUsize>,
}

impl Database {
    pub fn new(config: DbConfig) -> Result<Self, Error> {
        validate_table_name(&config.table)?;
        sql_limit(config.fetch_size, "fetch")?;
        Ok(Self {
            config,
            live: Arc::new(AtomicUsize::new(0)),
        })
    }

    pub fn config(&self) -> &DbConfig {
        &self.config
    }

    pub fn path(&self) -> &Path {
        &self.config.path
    }

    pub fn table(&self) -> &str {
        &self.config.table
    }

    /// Connections currently held by live sequences of this handle.
    pub fn open_connections(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    /// Opens a read-only connection. The database file must already exist.
    pub(crate) fn lease(&self) -> Result<Lease, Error> {
        let flags = OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        self.open_with_flags(flags)
    }

    /// Opens a read-write connection, creating the file when missing.
    pub(crate) fn lease_writable(&self) -> Result<Lease, Error> {
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        self.open_with_flags(flags)
    }

    fn open_with_flags(&self, flags: OpenFlags) -> Result<Lease, Error> {
        let path = &self.config.path;
        let conn = Connection::open_with_flags(path, flags).map_err(|err| {
            Error::new(ErrorKind::Connection)
                .with_message("failed to open database")
                .with_path(path)
                .with_source(err)
        })?;
        conn.busy_timeout(self.config.busy_timeout).map_err(|err| {
            Error::new(ErrorKind::Connection)
                .with_message("failed to configure busy timeout")
                .with_path(path)
                .with_source(err)
        })?;
        let live = self.live.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(path = %path.display(), live, "opened connection");
        Ok(Lease {
            conn,
            live: Arc::clone(&self.live),
            path: path.clone(),
        })
    }
}

/// A connection owned by exactly one sequence. Dropping it releases the
/// connection and decrements the handle's live count.
#[derive(Debug)]
pub struct Lease {
    conn: Connection,
    live: Arc<AtomicUsize>,
    path: PathBuf,
}

impl Lease {
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    pub(crate) fn conn_mut(&mut self) -> &mut Connection {
        &mut self.conn
    }

    /// Fails with a query error when `sql` does not prepare, e.g. a missing table.
    pub(crate) fn check_statement(&self, sql: &str) -> Result<(), Error> {
        self.conn
            .prepare_cached(sql)
            .map(|_| ())
            .map_err(|err| {
                let mut out = Error::new(ErrorKind::Query)
                    .with_message("failed to prepare query")
                    .with_path(&self.path)
                    .with_source(err);
                if is_missing_table(&out) {
                    out = out.with_hint("Load records first with `userstream seed <file>`.");
                }
                out
            })
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        let live = self.live.fetch_sub(1, Ordering::SeqCst).saturating_sub(1);
        debug!(path = %self.path.display(), live, "released connection");
    }
}

fn is_missing_table(err: &Error) -> bool {
    use std::error::Error as _;
    err.source()
        .map(|source| source.to_string().contains("no such table"))
        .unwrap_or(false)
}

/// Table names are interpolated into SQL, so only plain identifiers pass.
pub fn validate_table_name(table: &str) -> Result<(), Error> {
    let mut chars = table.chars();
    let valid = match chars.next() {
        Some(first) => {
            (first.is_ascii_alphabetic() || first == '_')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        None => false,
    };
    if valid {
        Ok(())
    } else {
        Err(Error::new(ErrorKind::InvalidArgument)
            .with_message(format!("invalid table name: {table:?}"))
            .with_hint("Table names may contain ASCII letters, digits, and underscores."))
    }
}

/// Converts a row count into a SQL `LIMIT`. Zero is rejected, and so is
/// anything past `i64::MAX`, which SQLite would otherwise wrap to "no limit".
pub(crate) fn sql_limit(size: usize, what: &str) -> Result<i64, Error> {
    match i64::try_from(size) {
        Ok(limit) if limit > 0 => Ok(limit),
        Ok(_) => Err(Error::new(ErrorKind::InvalidArgument)
            .with_message(format!("{what} size must be positive"))
            .with_hint(format!("Pass a {what} size of 1 or more."))),
        Err(_) => Err(Error::new(ErrorKind::InvalidArgument)
            .with_message(format!("{what} size {size} exceeds {}", i64::MAX))),
    }
}

/// First cursor step of a keyset scan: `?1` = limit.
pub fn scan_head_sql(table: &str, columns: &str) -> String {
    format!("SELECT {columns} FROM \"{table}\" ORDER BY id LIMIT ?1")
}

/// Later cursor steps: `?1` = last key seen, `?2` = limit.
pub fn scan_after_sql(table: &str, columns: &str) -> String {
    format!("SELECT {columns} FROM \"{table}\" WHERE id > ?1 ORDER BY id LIMIT ?2")
}

/// Range query for one page: `?1` = limit, `?2` = offset.
pub fn page_sql(table: &str, columns: &str) -> String {
    format!("SELECT {columns} FROM \"{table}\" ORDER BY id LIMIT ?1 OFFSET ?2")
}

pub(crate) fn query_error(err: rusqlite::Error, message: &str) -> Error {
    Error::new(ErrorKind::Query)
        .with_message(message)
        .with_source(err)
}

#[cfg(test)]
mod tests {
    use super::{
        Database, DbConfig, page_sql, scan_after_sql, scan_head_sql, sql_limit,
        validate_table_name,
    };
    use crate::core::error::ErrorKind;

    #[test]
    fn table_names_are_plain_identifiers() {
        for ok in ["user_data", "_t", "Users2"] {
            assert!(validate_table_name(ok).is_ok(), "{ok}");
        }
        for bad in ["", "2users", "user data", "t;DROP TABLE x", "\"t\""] {
            let err = validate_table_name(bad).expect_err(bad);
            assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        }
    }

    #[test]
    fn zero_fetch_size_is_rejected() {
        let err = Database::new(DbConfig::new("unused.db").with_fetch_size(0)).expect_err("zero");
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    #[cfg(target_pointer_width = "64")]
    fn limits_beyond_i64_are_rejected() {
        let err = Database::new(DbConfig::new("unused.db").with_fetch_size(usize::MAX))
            .expect_err("too large");
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        assert_eq!(sql_limit(7, "page").expect("limit"), 7);
        assert_eq!(sql_limit(i64::MAX as usize, "page").expect("max"), i64::MAX);
        let err = sql_limit(i64::MAX as usize + 1, "page").expect_err("wraps");
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn read_queries_order_by_primary_key_without_aggregates() {
        let sqls = [
            scan_head_sql("user_data", "id, age"),
            scan_after_sql("user_data", "id, age"),
            page_sql("user_data", "id, age"),
        ];
        for sql in sqls {
            assert!(sql.contains("ORDER BY id"), "{sql}");
            let upper = sql.to_ascii_uppercase();
            assert!(!upper.contains("AVG(") && !upper.contains("SUM("), "{sql}");
        }
    }

    #[test]
    fn missing_file_is_a_connection_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = Database::new(DbConfig::new(dir.path().join("absent.db"))).expect("db");
        let err = db.lease().expect_err("missing file");
        assert_eq!(err.kind(), ErrorKind::Connection);
        assert_eq!(db.open_connections(), 0);
    }

    #[test]
    fn leases_are_counted_until_dropped() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = Database::new(DbConfig::new(dir.path().join("users.db"))).expect("db");
        let writer = db.lease_writable().expect("writable");
        let reader = db.lease().expect("reader");
        assert_eq!(db.open_connections(), 2);
        drop(reader);
        assert_eq!(db.open_connections(), 1);
        drop(writer);
        assert_eq!(db.open_connections(), 0);
    }
}
