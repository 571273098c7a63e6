//! Purpose: Create the user table and load records from JSON lines or CSV.
//! Exports: `SeedFormat`, `SeedOutcome`, `SeedFailure`, `create_table`, `seed_users`.
//! Role: The only write path; used by `userstream seed` and test setup.
//! Invariants: Ids must parse as UUIDs and ages must fit the stored `u32` range.
//! Invariants: Invalid records are skipped and reported, never inserted.
//! Invariants: A table that already holds rows is left untouched.
use std::io::BufRead;
use std::path::Path;

use rusqlite::{Connection, Statement, params};
use serde::Deserialize;
use tracing::{debug, info};
use uuid::Uuid;

use crate::core::error::{Error, ErrorKind};
use crate::core::store::{Database, query_error};

const MAX_SNIPPET_CHARS: usize = 80;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SeedFormat {
    /// One JSON object per line.
    Jsonl,
    /// Header row `user_id,name,email,age` followed by one record per row.
    Csv,
}

impl SeedFormat {
    /// `.csv` files are read as CSV; everything else, stdin included, as JSON lines.
    pub fn for_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("csv") => SeedFormat::Csv,
            _ => SeedFormat::Jsonl,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            SeedFormat::Jsonl => "jsonl",
            SeedFormat::Csv => "csv",
        }
    }
}

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct SeedOutcome {
    pub lines: u64,
    pub inserted: u64,
    pub duplicates: u64,
    pub skipped: u64,
    /// Rows already present; non-zero means nothing was loaded.
    pub existing: u64,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SeedFailure {
    pub line: u64,
    pub message: String,
    pub snippet: String,
}

#[derive(Debug, Deserialize)]
struct SeedRow {
    #[serde(alias = "user_id")]
    id: String,
    name: String,
    email: String,
    age: i64,
}

pub fn create_table(conn: &Connection, table: &str) -> Result<(), Error> {
    let sql = format!(
        "CREATE TABLE IF NOT EXISTS \"{table}\" (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            email TEXT NOT NULL,
            age INTEGER NOT NULL CHECK (age >= 0)
        )"
    );
    conn.execute_batch(&sql)
        .map_err(|err| query_error(err, "failed to create table"))
}

pub fn seed_users<R, N>(
    db: &Database,
    reader: R,
    format: SeedFormat,
    mut on_failure: N,
) -> Result<SeedOutcome, Error>
where
    R: BufRead,
    N: FnMut(SeedFailure),
{
    let table = db.table();
    let mut lease = db.lease_writable()?;
    create_table(lease.conn(), table)?;

    let existing: i64 = lease
        .conn()
        .query_row(&format!("SELECT COUNT(*) FROM \"{table}\""), [], |row| {
            row.get(0)
        })
        .map_err(|err| query_error(err, "failed to count rows"))?;
    if existing > 0 {
        info!(table, existing, "table already seeded");
        return Ok(SeedOutcome {
            existing: existing as u64,
            ..SeedOutcome::default()
        });
    }

    let tx = lease
        .conn_mut()
        .transaction()
        .map_err(|err| query_error(err, "failed to begin transaction"))?;
    let outcome = {
        let insert = tx
            .prepare(&format!(
                "INSERT OR IGNORE INTO \"{table}\" (id, name, email, age) VALUES (?1, ?2, ?3, ?4)"
            ))
            .map_err(|err| query_error(err, "failed to prepare insert"))?;
        let mut loader = Loader {
            insert,
            outcome: SeedOutcome::default(),
            on_failure: &mut on_failure,
        };
        match format {
            SeedFormat::Jsonl => load_jsonl(reader, &mut loader)?,
            SeedFormat::Csv => load_csv(reader, &mut loader)?,
        }
        loader.outcome
    };
    tx.commit()
        .map_err(|err| query_error(err, "failed to commit seed"))?;

    info!(
        table,
        format = format.label(),
        inserted = outcome.inserted,
        skipped = outcome.skipped,
        duplicates = outcome.duplicates,
        "seeded table"
    );
    Ok(outcome)
}

struct Loader<'a, N> {
    insert: Statement<'a>,
    outcome: SeedOutcome,
    on_failure: &'a mut N,
}

impl<N: FnMut(SeedFailure)> Loader<'_, N> {
    fn accept(
        &mut self,
        line: u64,
        parsed: Result<SeedRow, String>,
        snippet: &str,
    ) -> Result<(), Error> {
        self.outcome.lines += 1;
        let row = match parsed.and_then(validate_row) {
            Ok(row) => row,
            Err(message) => {
                debug!(line, %message, "skipping seed record");
                self.outcome.skipped += 1;
                (self.on_failure)(SeedFailure {
                    line,
                    message,
                    snippet: snippet.chars().take(MAX_SNIPPET_CHARS).collect(),
                });
                return Ok(());
            }
        };
        let changed = self
            .insert
            .execute(params![row.id, row.name, row.email, row.age])
            .map_err(|err| query_error(err, "failed to insert record").with_offset(line))?;
        if changed == 0 {
            self.outcome.duplicates += 1;
        } else {
            self.outcome.inserted += 1;
        }
        Ok(())
    }
}

fn load_jsonl<R, N>(reader: R, loader: &mut Loader<'_, N>) -> Result<(), Error>
where
    R: BufRead,
    N: FnMut(SeedFailure),
{
    for (idx, line) in reader.lines().enumerate() {
        let line_no = idx as u64 + 1;
        let line = line.map_err(|err| {
            Error::new(ErrorKind::Io)
                .with_message("failed to read seed input")
                .with_offset(line_no)
                .with_source(err)
        })?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let parsed =
            serde_json::from_str(trimmed).map_err(|err| format!("invalid record json: {err}"));
        loader.accept(line_no, parsed, trimmed)?;
    }
    Ok(())
}

fn load_csv<R, N>(reader: R, loader: &mut Loader<'_, N>) -> Result<(), Error>
where
    R: BufRead,
    N: FnMut(SeedFailure),
{
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);
    let headers = reader.headers().map_err(csv_read_error)?.clone();
    for record in reader.records() {
        let record = match record {
            Ok(record) => record,
            Err(err) if err.is_io_error() => return Err(csv_read_error(err)),
            Err(err) => {
                let line = err.position().map_or(0, |pos| pos.line());
                loader.accept(line, Err(format!("invalid csv record: {err}")), "")?;
                continue;
            }
        };
        let line = record.position().map_or(0, |pos| pos.line());
        let snippet = record.iter().collect::<Vec<_>>().join(",");
        let parsed = record
            .deserialize(Some(&headers))
            .map_err(|err| format!("invalid csv record: {err}"));
        loader.accept(line, parsed, &snippet)?;
    }
    Ok(())
}

fn csv_read_error(err: csv::Error) -> Error {
    let line = err.position().map(|pos| pos.line());
    let mut error = Error::new(ErrorKind::Io)
        .with_message("failed to read seed input")
        .with_source(err);
    if let Some(line) = line {
        error = error.with_offset(line);
    }
    error
}

fn validate_row(mut row: SeedRow) -> Result<SeedRow, String> {
    let id = Uuid::parse_str(&row.id).map_err(|err| format!("invalid id {:?}: {err}", row.id))?;
    row.id = id.hyphenated().to_string();
    if u32::try_from(row.age).is_err() {
        return Err(format!(
            "age must be between 0 and {}, got {}",
            u32::MAX,
            row.age
        ));
    }
    if row.name.trim().is_empty() {
        return Err("name is required".to_string());
    }
    if row.email.trim().is_empty() {
        return Err("email is required".to_string());
    }
    Ok(row)
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::{SeedFailure, SeedFormat, seed_users};
    use crate::api::DatabaseApiExt;
    use crate::core::store::{Database, DbConfig};

    const ALICE: &str = r#"{"user_id":"00234e50-34eb-4ce2-94ec-26e3fa749796","name":"Alice","email":"alice@example.com","age":67}"#;
    const BOB: &str = r#"{"id":"006bfede-724d-4cdd-a2a6-59700f40d0da","name":"Bob","email":"bob@example.com","age":19}"#;

    fn temp_db() -> (tempfile::TempDir, Database) {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = Database::new(DbConfig::new(dir.path().join("users.db"))).expect("db");
        (dir, db)
    }

    #[test]
    fn seeds_valid_lines_and_reports_invalid_ones() {
        let (_dir, db) = temp_db();
        let input = [
            ALICE,
            "",
            r#"{"id":"not-a-uuid","name":"X","email":"x@example.com","age":3}"#,
            r#"{"id":"01187f09-72be-4924-8a2d-150645dcadad","name":"Neg","email":"n@example.com","age":-1}"#,
            "{broken",
            BOB,
            ALICE,
        ]
        .join("\n");

        let mut failures: Vec<SeedFailure> = Vec::new();
        let outcome = seed_users(&db, input.as_bytes(), SeedFormat::Jsonl, |failure| {
            failures.push(failure)
        })
        .expect("seed");
        assert_eq!(outcome.lines, 6);
        assert_eq!(outcome.inserted, 2);
        assert_eq!(outcome.duplicates, 1);
        assert_eq!(outcome.skipped, 3);
        assert_eq!(
            failures.iter().map(|f| f.line).collect::<Vec<_>>(),
            vec![3, 4, 5]
        );
        assert_eq!(db.open_connections(), 0);

        let names = db
            .stream_users()
            .expect("stream")
            .map(|user| user.expect("user").name)
            .collect::<Vec<_>>();
        assert_eq!(names, vec!["Alice", "Bob"]);
    }

    #[test]
    fn populated_table_is_not_reseeded() {
        let (_dir, db) = temp_db();
        seed_users(&db, ALICE.as_bytes(), SeedFormat::Jsonl, |_| {}).expect("first");
        let outcome = seed_users(&db, BOB.as_bytes(), SeedFormat::Jsonl, |_| {}).expect("second");
        assert_eq!(outcome.existing, 1);
        assert_eq!(outcome.inserted, 0);
        assert_eq!(db.stream_users().expect("stream").count(), 1);
    }

    #[test]
    fn ages_beyond_u32_are_skipped_not_stored() {
        let (_dir, db) = temp_db();
        let input = [
            r#"{"id":"00234e50-34eb-4ce2-94ec-26e3fa749796","name":"Huge","email":"h@example.com","age":5000000000}"#,
            BOB,
        ]
        .join("\n");

        let mut failures: Vec<SeedFailure> = Vec::new();
        let outcome = seed_users(&db, input.as_bytes(), SeedFormat::Jsonl, |failure| {
            failures.push(failure)
        })
        .expect("seed");
        assert_eq!(outcome.inserted, 1);
        assert_eq!(outcome.skipped, 1);
        assert_eq!(failures[0].line, 1);
        assert!(failures[0].message.contains("5000000000"));

        let ages = db
            .stream_ages()
            .expect("ages")
            .collect::<Result<Vec<_>, _>>()
            .expect("every stored age decodes");
        assert_eq!(ages, vec![19]);
        assert_eq!(db.average_age().expect("average"), 19.0);
    }

    #[test]
    fn loads_csv_with_header_and_reports_bad_rows() {
        let (_dir, db) = temp_db();
        let input = "user_id,name,email,age\n\
            00234e50-34eb-4ce2-94ec-26e3fa749796,Dan Altenwerth Jr.,Molly59@gmail.com,67\n\
            not-a-uuid,Bad Id,bad@example.com,30\n\
            006bfede-724d-4cdd-a2a6-59700f40d0da,Glenda Wisozk,Miriam21@gmail.com,119\n\
            01187f09-72be-4924-8a2d-150645dcadad,Old,old@example.com,-4\n\
            015a6d25-6fcb-4b58-94c5-b8a0e8b1a2a5,Too Old,t@example.com,5000000000\n\
            02d5ba05-89e0-4dd2-8a35-8d7f2b1c0e43,No Age,n@example.com,abc\n";

        let mut failures: Vec<SeedFailure> = Vec::new();
        let outcome = seed_users(&db, input.as_bytes(), SeedFormat::Csv, |failure| {
            failures.push(failure)
        })
        .expect("seed");
        assert_eq!(outcome.lines, 6);
        assert_eq!(outcome.inserted, 2);
        assert_eq!(outcome.skipped, 4);
        assert_eq!(
            failures.iter().map(|f| f.line).collect::<Vec<_>>(),
            vec![3, 5, 6, 7]
        );
        assert!(failures[0].snippet.starts_with("not-a-uuid,Bad Id"));

        let users = db
            .stream_users()
            .expect("stream")
            .collect::<Result<Vec<_>, _>>()
            .expect("users");
        assert_eq!(
            users.iter().map(|u| (u.name.as_str(), u.age)).collect::<Vec<_>>(),
            vec![("Dan Altenwerth Jr.", 67), ("Glenda Wisozk", 119)]
        );
    }

    #[test]
    fn format_follows_file_extension() {
        assert_eq!(SeedFormat::for_path(Path::new("user_data.csv")), SeedFormat::Csv);
        assert_eq!(SeedFormat::for_path(Path::new("USERS.CSV")), SeedFormat::Csv);
        assert_eq!(SeedFormat::for_path(Path::new("users.jsonl")), SeedFormat::Jsonl);
        assert_eq!(SeedFormat::for_path(Path::new("-")), SeedFormat::Jsonl);
    }
}
