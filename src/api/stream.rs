//! Purpose: Lazy sequence constructors over a `Database` handle.
//! Exports: `DatabaseApiExt`, `UserStream`, `AgeStream`, `UserBatches`, `FilteredUsers`.
//! Role: Public entry points for streaming, batching, paging, and aggregation.
//! Invariants: Size arguments are validated before any storage access.
//! Invariants: Each sequence owns one connection and releases it exactly once.
use crate::api::aggregate;
use crate::api::batch::{Batches, FilterBatches, check_batch_size};
use crate::api::page::Paginator;
use crate::core::cursor::RowStream;
use crate::core::error::Error;
use crate::core::record::{Ages, User, Users};
use crate::core::store::Database;

pub type UserStream = RowStream<Users>;
pub type AgeStream = RowStream<Ages>;
pub type UserBatches = Batches<UserStream>;
pub type FilteredUsers<F> = FilterBatches<UserBatches, User, F>;

pub trait DatabaseApiExt {
    /// Every record in primary-key order, one storage step at a time.
    fn stream_users(&self) -> Result<UserStream, Error>;

    /// The `age` column alone, in the same order as `stream_users`.
    fn stream_ages(&self) -> Result<AgeStream, Error>;

    fn stream_batches(&self, batch_size: usize) -> Result<UserBatches, Error>;

    /// Records passing `predicate`, processed one batch at a time.
    fn batch_processing<F>(&self, batch_size: usize, predicate: F) -> Result<FilteredUsers<F>, Error>
    where
        F: FnMut(&User) -> bool;

    fn lazy_paginate(&self, page_size: usize) -> Result<Paginator, Error>;

    /// Mean age computed from a running total over `stream_ages`.
    fn average_age(&self) -> Result<f64, Error>;
}

impl DatabaseApiExt for Database {
    fn stream_users(&self) -> Result<UserStream, Error> {
        RowStream::open(self)
    }

    fn stream_ages(&self) -> Result<AgeStream, Error> {
        RowStream::open(self)
    }

    fn stream_batches(&self, batch_size: usize) -> Result<UserBatches, Error> {
        check_batch_size(batch_size)?;
        Batches::new(self.stream_users()?, batch_size)
    }

    fn batch_processing<F>(&self, batch_size: usize, predicate: F) -> Result<FilteredUsers<F>, Error>
    where
        F: FnMut(&User) -> bool,
    {
        Ok(FilterBatches::new(self.stream_batches(batch_size)?, predicate))
    }

    fn lazy_paginate(&self, page_size: usize) -> Result<Paginator, Error> {
        Paginator::open(self, page_size)
    }

    fn average_age(&self) -> Result<f64, Error> {
        aggregate::mean(self.stream_ages()?)
    }
}

#[cfg(test)]
mod tests {
    use super::DatabaseApiExt;
    use crate::api::batch::age_above;
    use crate::core::error::ErrorKind;
    use crate::core::fixtures::{fixture, fixture_with_fetch_size, users};
    use crate::core::record::User;
    use crate::core::store::{Database, DbConfig};

    fn ages_fixture(ages: &[u32]) -> crate::core::fixtures::Fixture {
        let rows = users(ages.len())
            .into_iter()
            .zip(ages)
            .map(|(user, age)| User { age: *age, ..user })
            .collect::<Vec<_>>();
        fixture(&rows)
    }

    #[test]
    fn repeated_streams_are_identical() {
        let fx = fixture_with_fetch_size(&users(17), 4);
        let first = fx.db.stream_users().expect("first").collect::<Result<Vec<_>, _>>();
        let second = fx.db.stream_users().expect("second").collect::<Result<Vec<_>, _>>();
        assert_eq!(first.expect("first rows"), second.expect("second rows"));
    }

    #[test]
    fn abandoning_a_stream_releases_its_connection() {
        let fx = fixture(&users(100));
        assert_eq!(fx.db.open_connections(), 0);
        {
            let mut stream = fx.db.stream_users().expect("stream");
            assert!(stream.next().is_some());
            assert!(stream.next().is_some());
            assert_eq!(fx.db.open_connections(), 1);
        }
        assert_eq!(fx.db.open_connections(), 0);

        let mut filtered = fx.db.batch_processing(10, age_above(0)).expect("batches");
        filtered.next().expect("first").expect("user");
        assert_eq!(fx.db.open_connections(), 1);
        drop(filtered);
        assert_eq!(fx.db.open_connections(), 0);
    }

    #[test]
    fn sequences_hold_independent_connections() {
        let fx = fixture(&users(3));
        let a = fx.db.stream_users().expect("a");
        let b = fx.db.lazy_paginate(2).expect("b");
        assert_eq!(fx.db.open_connections(), 2);
        drop(a);
        drop(b);
        assert_eq!(fx.db.open_connections(), 0);
    }

    #[test]
    fn batches_reconstruct_source_order() {
        let all = users(11);
        let fx = fixture(&all);
        let groups = fx
            .db
            .stream_batches(4)
            .expect("batches")
            .collect::<Result<Vec<_>, _>>()
            .expect("groups");
        assert_eq!(
            groups.iter().map(Vec::len).collect::<Vec<_>>(),
            vec![4, 4, 3]
        );
        assert_eq!(groups.concat(), all);
    }

    #[test]
    fn batch_processing_filters_in_order() {
        let fx = ages_fixture(&[30, 12, 26, 25, 99]);
        let ages = fx
            .db
            .batch_processing(2, age_above(25))
            .expect("processing")
            .map(|user| user.expect("user").age)
            .collect::<Vec<_>>();
        assert_eq!(ages, vec![30, 26, 99]);
    }

    #[test]
    fn average_age_uses_running_total() {
        let fx = ages_fixture(&[10, 20, 30, 40]);
        assert_eq!(fx.db.average_age().expect("mean"), 25.0);
        assert_eq!(fx.db.open_connections(), 0);
    }

    #[test]
    fn empty_table_behaviour() {
        let fx = fixture(&[]);
        assert_eq!(fx.db.stream_users().expect("stream").count(), 0);
        assert_eq!(fx.db.stream_batches(3).expect("batches").count(), 0);
        assert_eq!(fx.db.lazy_paginate(3).expect("pages").count(), 0);
        let err = fx.db.average_age().expect_err("empty");
        assert_eq!(err.kind(), ErrorKind::EmptyAggregate);
        assert_eq!(fx.db.open_connections(), 0);
    }

    #[test]
    fn zero_sizes_fail_before_storage_access() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("absent.db");
        let db = Database::new(DbConfig::new(&path)).expect("db");
        let batch_err = db.stream_batches(0).expect_err("batch");
        assert_eq!(batch_err.kind(), ErrorKind::InvalidArgument);
        let filter_err = db.batch_processing(0, age_above(25)).err().expect("filter");
        assert_eq!(filter_err.kind(), ErrorKind::InvalidArgument);
        let page_err = db.lazy_paginate(0).expect_err("page");
        assert_eq!(page_err.kind(), ErrorKind::InvalidArgument);
        assert!(!path.exists());
    }
}
