//! Purpose: Hold top-level CLI command dispatch for `userstream`.
//! Exports: `dispatch_command`.
//! Role: Keep `main.rs` focused on parse/bootstrap and delegate command execution.
//! Invariants: Sequences are consumed lazily; nothing buffers a whole table.
//! Invariants: The first failing element aborts the command with its error.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use userstream::api::{
    DatabaseApiExt, SeedFailure, SeedFormat, accumulate, age_above, seed_users,
};

use super::*;

pub(super) fn dispatch_command(
    command: Command,
    config: DbConfig,
    color_mode: ColorMode,
) -> Result<RunOutcome, Error> {
    match command {
        Command::Completion { shell } => {
            let mut cmd = Cli::command();
            clap_complete::aot::generate(shell, &mut cmd, "userstream", &mut io::stdout());
            Ok(RunOutcome::ok())
        }
        Command::Version => {
            emit_version_output();
            Ok(RunOutcome::ok())
        }
        Command::Seed { file, format } => {
            let format = seed_format(format, &file);
            let reader = open_seed_input(&file)?;
            if let Some(parent) = config.path.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent).map_err(|err| {
                        Error::new(ErrorKind::Io)
                            .with_message("failed to create database directory")
                            .with_path(parent)
                            .with_source(err)
                    })?;
                }
            }
            let db = open_database(config)?;
            let table = db.table().to_string();
            let outcome = seed_users(&db, reader, format, |failure| {
                emit_notice(&skip_notice(&table, &failure), color_mode);
            })?;
            emit_json(
                json!({
                    "seed": {
                        "path": db.path().display().to_string(),
                        "table": table,
                        "format": format.label(),
                        "lines": outcome.lines,
                        "inserted": outcome.inserted,
                        "duplicates": outcome.duplicates,
                        "skipped": outcome.skipped,
                        "existing": outcome.existing,
                    }
                }),
            );
            Ok(RunOutcome::ok())
        }
        Command::Stream { limit } => {
            let db = open_database(config)?;
            let stream = db.stream_users()?;
            let limit = limit.unwrap_or(u64::MAX);
            for user in stream.take(usize::try_from(limit).unwrap_or(usize::MAX)) {
                emit_json(to_json_value(&user?)?);
            }
            Ok(RunOutcome::ok())
        }
        Command::Batches { size } => {
            let size = positive_size(size, "batch")?;
            let db = open_database(config)?;
            for (idx, batch) in db.stream_batches(size)?.enumerate() {
                let records = batch?;
                emit_json(
                    json!({
                        "batch": idx,
                        "size": records.len(),
                        "records": to_json_value(&records)?,
                    }),
                );
            }
            Ok(RunOutcome::ok())
        }
        Command::Process { size, min_age } => {
            let size = positive_size(size, "batch")?;
            let db = open_database(config)?;
            for user in db.batch_processing(size, age_above(min_age))? {
                emit_json(to_json_value(&user?)?);
            }
            Ok(RunOutcome::ok())
        }
        Command::Pages { size, max_pages } => {
            let size = positive_size(size, "page")?;
            let db = open_database(config)?;
            let max_pages = usize::try_from(max_pages.unwrap_or(u64::MAX)).unwrap_or(usize::MAX);
            for page in db.lazy_paginate(size)?.take(max_pages) {
                let page = page?;
                emit_json(
                    json!({
                        "page": page.number,
                        "offset": page.offset,
                        "size": page.len(),
                        "partial": page.is_partial(),
                        "records": to_json_value(&page.records)?,
                    }),
                );
            }
            Ok(RunOutcome::ok())
        }
        Command::AverageAge => {
            let db = open_database(config)?;
            let acc = accumulate(db.stream_ages()?)?;
            let mean = acc.finish()?;
            emit_json(
                json!({
                    "average_age": mean,
                    "count": acc.count(),
                }),
            );
            Ok(RunOutcome::ok())
        }
    }
}

pub(super) fn seed_format(format: InputFormat, file: &Path) -> SeedFormat {
    match format {
        InputFormat::Auto => SeedFormat::for_path(file),
        InputFormat::Jsonl => SeedFormat::Jsonl,
        InputFormat::Csv => SeedFormat::Csv,
    }
}

fn open_seed_input(file: &Path) -> Result<Box<dyn BufRead>, Error> {
    if file.as_os_str() == "-" {
        return Ok(Box::new(BufReader::new(io::stdin())));
    }
    let handle = File::open(file).map_err(|err| {
        let kind = if err.kind() == io::ErrorKind::NotFound {
            ErrorKind::NotFound
        } else {
            ErrorKind::Io
        };
        Error::new(kind)
            .with_message("failed to open seed input")
            .with_path(file)
            .with_source(err)
    })?;
    Ok(Box::new(BufReader::new(handle)))
}

fn skip_notice(table: &str, failure: &SeedFailure) -> Notice {
    let mut details = Map::new();
    details.insert("line".to_string(), json!(failure.line));
    details.insert("snippet".to_string(), json!(failure.snippet));
    Notice {
        kind: "skip".to_string(),
        time: notice_time_now().unwrap_or_default(),
        cmd: "seed".to_string(),
        table: table.to_string(),
        message: failure.message.clone(),
        details,
    }
}
