// Core modules implementing storage access, cursors, records, and errors.
pub mod cursor;
pub mod error;
pub mod record;
pub mod store;

#[cfg(test)]
pub(crate) mod fixtures;
