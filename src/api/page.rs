//! Purpose: Lazily paginate a table with offset/limit range queries.
//! Exports: `Page`, `Paginator`, `fetch_page`.
//! Role: On-demand page source; page k is queried only when requested.
//! Invariants: Pages concatenate to the full table in primary-key order.
//! Invariants: Iteration ends at the first empty or short page, so no query
//! Invariants: is issued with an offset beyond the table size.
use crate::core::error::{Error, ErrorKind};
use crate::core::record::{Projection, User, Users};
use crate::core::store::{Database, Lease, page_sql, query_error, sql_limit};
use rusqlite::{Connection, params};
use serde::Serialize;
use tracing::debug;

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct Page {
    /// Zero-based page index.
    pub number: u64,
    pub offset: u64,
    pub page_size: usize,
    pub records: Vec<User>,
}

impl Page {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// A short page is always the last one.
    pub fn is_partial(&self) -> bool {
        self.records.len() < self.page_size
    }
}

/// Single range query: up to `page_size` users starting at `offset`.
pub fn fetch_page(
    conn: &Connection,
    table: &str,
    page_size: usize,
    offset: u64,
) -> Result<Vec<User>, Error> {
    let limit = sql_limit(page_size, "page")?;
    let start = i64::try_from(offset).map_err(|_| {
        Error::new(ErrorKind::InvalidArgument)
            .with_message(format!("page offset {offset} exceeds {}", i64::MAX))
    })?;
    let sql = page_sql(table, Users::COLUMNS);
    let fetch = || -> rusqlite::Result<Vec<User>> {
        let mut stmt = conn.prepare_cached(&sql)?;
        let rows = stmt.query_map(params![limit, start], |row| {
            Users::decode(row).map(|(_, user)| user)
        })?;
        rows.collect()
    };
    fetch().map_err(|err| query_error(err, "failed to fetch page").with_offset(offset))
}

pub struct Paginator {
    lease: Option<Lease>,
    table: String,
    page_size: usize,
    next_number: u64,
    fetches: u64,
}

impl Paginator {
    pub(crate) fn open(db: &Database, page_size: usize) -> Result<Self, Error> {
        sql_limit(page_size, "page")?;
        let lease = db.lease()?;
        lease.check_statement(&page_sql(db.table(), Users::COLUMNS))?;
        Ok(Self {
            lease: Some(lease),
            table: db.table().to_string(),
            page_size,
            next_number: 0,
            fetches: 0,
        })
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Range queries issued so far.
    pub fn fetches(&self) -> u64 {
        self.fetches
    }

    /// Offset the next page query would use.
    pub fn next_offset(&self) -> u64 {
        self.next_number * self.page_size as u64
    }

    pub fn is_released(&self) -> bool {
        self.lease.is_none()
    }

    fn release(&mut self) {
        if self.lease.take().is_some() {
            debug!(pages = self.next_number, fetches = self.fetches, "paginator finished");
        }
    }
}

impl Iterator for Paginator {
    type Item = Result<Page, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        let lease = self.lease.as_ref()?;
        let offset = self.next_offset();
        self.fetches += 1;
        debug!(offset, limit = self.page_size, "fetching page");
        match fetch_page(lease.conn(), &self.table, self.page_size, offset) {
            Ok(records) if records.is_empty() => {
                self.release();
                None
            }
            Ok(records) => {
                let page = Page {
                    number: self.next_number,
                    offset,
                    page_size: self.page_size,
                    records,
                };
                self.next_number += 1;
                if page.is_partial() {
                    self.release();
                }
                Some(Ok(page))
            }
            Err(err) => {
                self.release();
                Some(Err(err))
            }
        }
    }
}

impl std::fmt::Debug for Paginator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Paginator")
            .field("table", &self.table)
            .field("page_size", &self.page_size)
            .field("next_number", &self.next_number)
            .field("fetches", &self.fetches)
            .field("released", &self.lease.is_none())
            .finish()
    }
}
