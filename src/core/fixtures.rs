// Temporary databases seeded with synthetic users for unit tests.
use crate::core::record::User;
use crate::core::store::{Database, DbConfig};
use rusqlite::{Connection, params};
use tempfile::TempDir;

pub(crate) struct Fixture {
    _dir: TempDir,
    pub db: Database,
}

/// Ids sort in generation order, so primary-key order equals index order.
pub(crate) fn users(count: usize) -> Vec<User> {
    (0..count)
        .map(|idx| User {
            id: format!("00000000-0000-4000-8000-{idx:012}"),
            name: format!("User {idx}"),
            email: format!("user{idx}@example.com"),
            age: ((idx * 7) % 90) as u32 + 10,
        })
        .collect()
}

pub(crate) fn fixture(users: &[User]) -> Fixture {
    fixture_with_fetch_size(users, 1)
}

pub(crate) fn fixture_with_fetch_size(users: &[User], fetch_size: usize) -> Fixture {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("users.db");
    let conn = Connection::open(&path).expect("open");
    conn.execute_batch(
        "CREATE TABLE user_data (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            email TEXT NOT NULL,
            age INTEGER NOT NULL
        )",
    )
    .expect("create");
    for user in users {
        conn.execute(
            "INSERT INTO user_data (id, name, email, age) VALUES (?1, ?2, ?3, ?4)",
            params![user.id, user.name, user.email, user.age],
        )
        .expect("insert");
    }
    let db = Database::new(DbConfig::new(path).with_fetch_size(fetch_size)).expect("db");
    Fixture { _dir: dir, db }
}

/// Raw read-write access for tests that corrupt or drop the table.
pub(crate) fn raw(db: &Database) -> Connection {
    Connection::open(db.path()).expect("open raw")
}
