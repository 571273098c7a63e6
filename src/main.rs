//! Purpose: `userstream` CLI entry point.
//! Role: Binary crate root; parses args, runs commands, emits JSON on stdout.
//! Invariants: Records, batches, and pages are emitted one JSON value per line.
//! Invariants: Non-interactive errors are emitted as JSON on stderr.
//! Invariants: Process exit code is derived from `api::to_exit_code`.
//! Invariants: Logs go to stderr through `tracing`; stdout carries data only.
use std::io::{self, IsTerminal};
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use clap::{
    CommandFactory, Parser, Subcommand, ValueEnum, ValueHint, error::ErrorKind as ClapErrorKind,
};
use clap_complete::aot::Shell;
use serde_json::{Map, Value, json};
use std::error::Error as StdError;
use tracing_subscriber::EnvFilter;

mod command_dispatch;
mod db_paths;

use db_paths::{DEFAULT_DB_NAME, default_db_dir, resolve_db_path};
use userstream::api::{DEFAULT_TABLE, Database, DbConfig, Error, ErrorKind, to_exit_code};
use userstream::notice::{Notice, notice_json};

#[derive(Copy, Clone, Debug)]
struct RunOutcome {
    exit_code: i32,
}

impl RunOutcome {
    fn ok() -> Self {
        Self { exit_code: 0 }
    }
}

fn main() {
    let exit_code = match run() {
        Ok(outcome) => outcome.exit_code,
        Err((err, color_mode)) => {
            emit_error(&err, color_mode);
            to_exit_code(err.kind())
        }
    };
    std::process::exit(exit_code);
}

fn run() -> Result<RunOutcome, (Error, ColorMode)> {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => match err.kind() {
            ClapErrorKind::DisplayHelp
            | ClapErrorKind::DisplayVersion
            | ClapErrorKind::DisplayHelpOnMissingArgumentOrSubcommand => {
                err.print().map_err(|io_err| {
                    (
                        Error::new(ErrorKind::Io)
                            .with_message("failed to write help")
                            .with_source(io_err),
                        ColorMode::Auto,
                    )
                })?;
                let exit_code = if matches!(
                    err.kind(),
                    ClapErrorKind::DisplayHelpOnMissingArgumentOrSubcommand
                ) {
                    2
                } else {
                    0
                };
                return Ok(RunOutcome { exit_code });
            }
            _ => {
                return Err((
                    Error::new(ErrorKind::Usage)
                        .with_message(clap_error_summary(&err))
                        .with_hint("Try `userstream --help`."),
                    ColorMode::Auto,
                ));
            }
        },
    };

    init_tracing();

    let color_mode = cli.color;
    let db_dir = cli.dir.unwrap_or_else(default_db_dir);
    let path = resolve_db_path(&cli.db, &db_dir);
    let config = DbConfig::new(path).with_table(cli.table);

    command_dispatch::dispatch_command(cli.command, config, color_mode)
        .map_err(add_connection_hint)
        .map_err(|err| (err, color_mode))
}

#[derive(Parser)]
#[command(
    name = "userstream",
    version,
    about = "Stream, batch, and page through user records without loading the table",
    long_about = None,
    after_help = r#"EXAMPLES
  $ userstream seed users.jsonl
  $ userstream seed user_data.csv
  $ userstream stream --limit 5
  $ userstream process --size 50 --min-age 25
  $ userstream pages --size 100 --max-pages 2
  $ userstream average-age

Set RUST_LOG=debug to trace every query and connection on stderr."#,
    arg_required_else_help = true
)]
struct Cli {
    #[arg(
        long,
        help = "Directory for named databases (default: ~/.userstream)",
        value_hint = ValueHint::DirPath
    )]
    dir: Option<PathBuf>,
    #[arg(
        long,
        default_value = DEFAULT_DB_NAME,
        help = "Database name (resolved in --dir) or path containing '/'"
    )]
    db: String,
    #[arg(long, default_value = DEFAULT_TABLE, help = "Table holding the user records")]
    table: String,
    #[arg(
        long,
        default_value = "auto",
        value_enum,
        help = "Colorize stderr diagnostics: auto|always|never"
    )]
    color: ColorMode,

    #[command(subcommand)]
    command: Command,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum InputFormat {
    Auto,
    Jsonl,
    Csv,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum ColorMode {
    Auto,
    Always,
    Never,
}

impl ColorMode {
    fn use_color(self, is_tty: bool) -> bool {
        match self {
            ColorMode::Auto => is_tty,
            ColorMode::Always => true,
            ColorMode::Never => false,
        }
    }
}

#[derive(Subcommand)]
enum Command {
    #[command(about = "Create the table and load JSON-lines or CSV records (stdin when FILE is '-')")]
    Seed {
        #[arg(default_value = "-", value_hint = ValueHint::FilePath)]
        file: PathBuf,
        #[arg(
            long,
            value_enum,
            default_value_t = InputFormat::Auto,
            help = "Input format; auto picks csv for .csv files"
        )]
        format: InputFormat,
    },
    #[command(about = "Stream records one at a time")]
    Stream {
        #[arg(long, help = "Stop after this many records")]
        limit: Option<u64>,
    },
    #[command(about = "Stream records in fixed-size batches")]
    Batches {
        #[arg(long, allow_negative_numbers = true, help = "Records per batch")]
        size: i64,
    },
    #[command(about = "Batch-process records, keeping those older than --min-age")]
    Process {
        #[arg(long, allow_negative_numbers = true, help = "Records per batch")]
        size: i64,
        #[arg(long, default_value_t = 25)]
        min_age: u32,
    },
    #[command(about = "Lazily fetch pages with offset/limit queries")]
    Pages {
        #[arg(long, allow_negative_numbers = true, help = "Records per page")]
        size: i64,
        #[arg(long, help = "Stop after this many pages")]
        max_pages: Option<u64>,
    },
    #[command(about = "Mean age computed from a running total over streamed ages")]
    AverageAge,
    #[command(about = "Generate shell completion scripts")]
    Completion {
        #[arg(value_enum)]
        shell: Shell,
    },
    #[command(about = "Print version info")]
    Version,
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(io::stderr)
        .try_init();
}

fn open_database(config: DbConfig) -> Result<Database, Error> {
    Database::new(config)
}

/// Sizes arrive signed so that negative values surface as invalid arguments.
fn positive_size(value: i64, what: &str) -> Result<usize, Error> {
    usize::try_from(value)
        .ok()
        .filter(|size| *size > 0)
        .ok_or_else(|| {
            Error::new(ErrorKind::InvalidArgument)
                .with_message(format!("{what} size must be positive, got {value}"))
                .with_hint(format!("Pass --size 1 or more for the {what} size."))
        })
}

fn add_connection_hint(err: Error) -> Error {
    if err.kind() != ErrorKind::Connection || err.hint().is_some() {
        return err;
    }
    err.with_hint("Check the --db path, or create it with `userstream seed <file>`.")
}

fn emit_version_output() {
    if io::stdout().is_terminal() {
        println!("userstream {}", env!("CARGO_PKG_VERSION"));
    } else {
        emit_json(
            json!({
                "name": "userstream",
                "version": env!("CARGO_PKG_VERSION"),
            }),
        );
    }
}

/// Compact single-line JSON when piped; pretty-printed on a terminal.
fn emit_json(value: Value) {
    let json = if io::stdout().is_terminal() {
        serde_json::to_string_pretty(&value)
    } else {
        serde_json::to_string(&value)
    }
    .unwrap_or_else(|_| "{\"error\":\"json encode failed\"}".to_string());
    println!("{json}");
}

fn to_json_value(value: &impl serde::Serialize) -> Result<Value, Error> {
    serde_json::to_value(value).map_err(|err| {
        Error::new(ErrorKind::Internal)
            .with_message("json encode failed")
            .with_source(err)
    })
}

#[derive(Copy, Clone, Debug)]
enum AnsiColor {
    Red,
    Yellow,
}

fn colorize_label(label: &str, enabled: bool, color: AnsiColor) -> String {
    if !enabled {
        return label.to_string();
    }
    let code = match color {
        AnsiColor::Red => "31",
        AnsiColor::Yellow => "33",
    };
    format!("\u{1b}[{code}m{label}\u{1b}[0m")
}

fn emit_error(err: &Error, color_mode: ColorMode) {
    let is_tty = io::stderr().is_terminal();
    if is_tty {
        eprintln!("{}", error_text(err, color_mode.use_color(is_tty)));
        return;
    }

    let value = error_json(err);
    let json = serde_json::to_string(&value).unwrap_or_else(|_| {
        "{\"error\":{\"kind\":\"Internal\",\"message\":\"json encode failed\"}}".to_string()
    });
    eprintln!("{json}");
}

fn notice_time_now() -> Option<String> {
    use time::format_description::well_known::Rfc3339;
    let duration = SystemTime::now().duration_since(UNIX_EPOCH).ok()?;
    let ts = time::OffsetDateTime::from_unix_timestamp_nanos(duration.as_nanos() as i128).ok()?;
    ts.format(&Rfc3339).ok()
}

fn emit_notice(notice: &Notice, color_mode: ColorMode) {
    let is_tty = io::stderr().is_terminal();
    if is_tty {
        let label = colorize_label("notice:", color_mode.use_color(is_tty), AnsiColor::Yellow);
        eprintln!("{label} {} (table: {})", notice.message, notice.table);
        return;
    }

    let value = notice_json(notice);
    let json = serde_json::to_string(&value).unwrap_or_else(|_| {
        "{\"notice\":{\"kind\":\"Internal\",\"message\":\"json encode failed\"}}".to_string()
    });
    eprintln!("{json}");
}

fn error_message(err: &Error) -> String {
    if let Some(message) = err.message() {
        return message.to_string();
    }
    match err.kind() {
        ErrorKind::Internal => "internal error".to_string(),
        ErrorKind::Usage => "usage error".to_string(),
        ErrorKind::InvalidArgument => "invalid argument".to_string(),
        ErrorKind::Connection => "cannot connect to database".to_string(),
        ErrorKind::Query => "query failed".to_string(),
        ErrorKind::EmptyAggregate => "no data".to_string(),
        ErrorKind::NotFound => "not found".to_string(),
        ErrorKind::Io => "i/o error".to_string(),
    }
}

fn error_causes(err: &Error) -> Vec<String> {
    let mut causes = Vec::new();
    let mut cur = err.source();
    while let Some(source) = cur {
        causes.push(source.to_string());
        cur = source.source();
    }
    causes
}

fn error_json(err: &Error) -> Value {
    let mut inner = Map::new();
    inner.insert("kind".to_string(), json!(format!("{:?}", err.kind())));
    inner.insert("message".to_string(), json!(error_message(err)));
    if let Some(hint) = err.hint() {
        inner.insert("hint".to_string(), json!(hint));
    }
    if let Some(path) = err.path() {
        inner.insert("path".to_string(), json!(path.display().to_string()));
    }
    if let Some(offset) = err.offset() {
        inner.insert("offset".to_string(), json!(offset));
    }
    let causes = error_causes(err);
    if !causes.is_empty() {
        inner.insert("causes".to_string(), json!(causes));
    }

    let mut outer = Map::new();
    outer.insert("error".to_string(), Value::Object(inner));
    Value::Object(outer)
}

fn error_text(err: &Error, use_color: bool) -> String {
    let mut lines = Vec::new();
    lines.push(format!(
        "{} {}",
        colorize_label("error:", use_color, AnsiColor::Red),
        error_message(err)
    ));

    if let Some(hint) = err.hint() {
        lines.push(format!(
            "{} {hint}",
            colorize_label("hint:", use_color, AnsiColor::Yellow)
        ));
    }
    if let Some(path) = err.path() {
        lines.push(format!(
            "{} {}",
            colorize_label("path:", use_color, AnsiColor::Yellow),
            path.display()
        ));
    }
    if let Some(offset) = err.offset() {
        lines.push(format!(
            "{} {offset}",
            colorize_label("offset:", use_color, AnsiColor::Yellow)
        ));
    }

    let causes = error_causes(err);
    if let Some(cause) = causes.first() {
        lines.push(format!(
            "{} {cause}",
            colorize_label("caused by:", use_color, AnsiColor::Yellow)
        ));
    }

    lines.join("\n")
}

fn clap_error_summary(err: &clap::Error) -> String {
    for line in err.to_string().lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if let Some(rest) = trimmed.strip_prefix("error:") {
            return rest.trim().to_string();
        }
        return trimmed.to_string();
    }
    "invalid arguments".to_string()
}
