// Keyset cursor over a table: pulls a bounded step of rows on demand and
// remembers the last primary key as its position.
use crate::core::error::Error;
use crate::core::record::Projection;
use crate::core::store::{
    Database, Lease, query_error, scan_after_sql, scan_head_sql, sql_limit,
};
use rusqlite::params;
use std::collections::VecDeque;
use std::marker::PhantomData;
use tracing::debug;

pub struct RowStream<P: Projection> {
    lease: Option<Lease>,
    head_sql: String,
    after_sql: String,
    fetch_size: usize,
    limit: i64,
    last_key: Option<String>,
    buffered: VecDeque<Result<P::Item, Error>>,
    yielded: u64,
    _projection: PhantomData<P>,
}

impl<P: Projection> RowStream<P> {
    pub(crate) fn open(db: &Database) -> Result<Self, Error> {
        let table = db.table();
        let fetch_size = db.config().fetch_size;
        let limit = sql_limit(fetch_size, "fetch")?;
        let head_sql = scan_head_sql(table, P::COLUMNS);
        let after_sql = scan_after_sql(table, P::COLUMNS);
        let lease = db.lease()?;
        lease.check_statement(&head_sql)?;
        Ok(Self {
            lease: Some(lease),
            head_sql,
            after_sql,
            fetch_size,
            limit,
            last_key: None,
            buffered: VecDeque::new(),
            yielded: 0,
            _projection: PhantomData,
        })
    }

    /// Elements handed to the consumer so far, errors included.
    pub fn position(&self) -> u64 {
        self.yielded
    }

    /// True once the connection has been given back.
    pub fn is_released(&self) -> bool {
        self.lease.is_none()
    }

    fn release(&mut self) {
        if self.lease.take().is_some() {
            debug!(yielded = self.yielded, "row stream finished");
        }
    }

    fn refill(&mut self) {
        let Some(lease) = self.lease.as_ref() else {
            return;
        };
        let sql = match self.last_key {
            Some(_) => &self.after_sql,
            None => &self.head_sql,
        };
        let base = self.yielded;
        let mut fetched = 0usize;
        let step = fetch_step::<P>(
            lease,
            sql,
            self.last_key.clone(),
            self.limit,
            |key, item| {
                fetched += 1;
                self.last_key = Some(key);
                self.buffered.push_back(Ok(item));
            },
        );

        match step {
            Err(err) => {
                let offset = base + self.buffered.len() as u64;
                debug!(offset, error = %err, "row fetch failed");
                self.buffered
                    .push_back(Err(query_error(err, "failed to fetch row").with_offset(offset)));
                self.release();
            }
            Ok(()) if fetched < self.fetch_size => self.release(),
            Ok(()) => {}
        }
    }
}

/// Runs one bounded cursor step, handing each decoded row to `on_row`.
/// Rows decoded before a failure are still delivered.
fn fetch_step<P: Projection>(
    lease: &Lease,
    sql: &str,
    after: Option<String>,
    limit: i64,
    mut on_row: impl FnMut(String, P::Item),
) -> rusqlite::Result<()> {
    let mut stmt = lease.conn().prepare_cached(sql)?;
    let mut rows = match &after {
        Some(key) => stmt.query(params![key, limit])?,
        None => stmt.query(params![limit])?,
    };
    while let Some(row) = rows.next()? {
        let (key, item) = P::decode(row)?;
        on_row(key, item);
    }
    Ok(())
}

impl<P: Projection> Iterator for RowStream<P> {
    type Item = Result<P::Item, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.buffered.is_empty() {
            self.refill();
        }
        let item = self.buffered.pop_front()?;
        self.yielded += 1;
        Some(item)
    }
}

impl<P: Projection> std::fmt::Debug for RowStream<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RowStream")
            .field("fetch_size", &self.fetch_size)
            .field("last_key", &self.last_key)
            .field("buffered", &self.buffered.len())
            .field("yielded", &self.yielded)
            .field("released", &self.lease.is_none())
            .finish()
    }
}
