//! Purpose: Define the stable public Rust API boundary for userstream.
//! Exports: Record types, lazy sequences, aggregation, and seeding.
//! Role: Public, additive-only surface; hides cursor and connection plumbing.
//! Invariants: This module is the only public path to storage access.
//! Invariants: Every sequence is created from an explicit `DbConfig`.

mod aggregate;
mod batch;
mod page;
mod seed;
mod stream;

pub use crate::core::cursor::RowStream;
#[doc(hidden)]
pub use crate::core::error::to_exit_code;
pub use crate::core::error::{Error, ErrorKind};
pub use crate::core::record::{Ages, Projection, User, Users};
pub use crate::core::store::{DEFAULT_TABLE, Database, DbConfig, validate_table_name};
pub use aggregate::{RunningMean, accumulate, mean};
pub use batch::{Batches, FilterBatches, age_above};
pub use page::{Page, Paginator, fetch_page};
pub use seed::{SeedFailure, SeedFormat, SeedOutcome, create_table, seed_users};
pub use stream::{AgeStream, DatabaseApiExt, FilteredUsers, UserBatches, UserStream};
