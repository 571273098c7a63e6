// User records and the column projections a row stream can decode.
use rusqlite::Row;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub name: String,
    pub email: String,
    pub age: u32,
}

/// Maps one result row to a stream item.
///
/// Every projection selects the primary key first; the stream keeps the last
/// key it saw as its cursor position.
pub trait Projection {
    type Item;

    /// Column list following `SELECT`, starting with `id`.
    const COLUMNS: &'static str;

    fn decode(row: &Row<'_>) -> rusqlite::Result<(String, Self::Item)>;
}

/// Full records: `id, name, email, age`.
#[derive(Debug)]
pub struct Users;

/// One-field projection over `age`.
#[derive(Debug)]
pub struct Ages;

impl Projection for Users {
    type Item = User;

    const COLUMNS: &'static str = "id, name, email, age";

    fn decode(row: &Row<'_>) -> rusqlite::Result<(String, User)> {
        let id: String = row.get(0)?;
        let user = User {
            id: id.clone(),
            name: row.get(1)?,
            email: row.get(2)?,
            age: decode_age(row, 3)?,
        };
        Ok((id, user))
    }
}

impl Projection for Ages {
    type Item = u32;

    const COLUMNS: &'static str = "id, age";

    fn decode(row: &Row<'_>) -> rusqlite::Result<(String, u32)> {
        Ok((row.get(0)?, decode_age(row, 1)?))
    }
}

pub(crate) fn decode_age(row: &Row<'_>, idx: usize) -> rusqlite::Result<u32> {
    let age: i64 = row.get(idx)?;
    u32::try_from(age).map_err(|_| rusqlite::Error::IntegralValueOutOfRange(idx, age))
}
