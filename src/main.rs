//! Purpose: `sheetjson` CLI entry point.
//! Role: Binary crate root; parses args, runs commands, emits JSON on stdout.
//! Invariants: Commands emit JSON on stdout (pretty when stdout is a terminal).
//! Invariants: Errors are emitted as JSON on stderr unless stderr is a terminal.
//! Invariants: Process exit code is derived from `api::to_exit_code`.
#![allow(clippy::result_large_err)]
use std::ffi::OsString;
use std::io::{self, IsTerminal, Read};
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand, ValueHint, error::ErrorKind as ClapErrorKind};
use serde_json::{Map, Value, json};
use std::error::Error as StdError;

mod command_dispatch;

use sheetjson::api::{Error, ErrorKind, default_accounts_dir, to_exit_code};

const DEFAULT_BIND: &str = "127.0.0.1:5000";
const DEFAULT_MAX_BODY_BYTES: u64 = 4 * 1024 * 1024;
const DEFAULT_UPSTREAM_TIMEOUT_MS: u64 = 30_000;

#[derive(Copy, Clone, Debug)]
struct RunOutcome {
    exit_code: i32,
}

impl RunOutcome {
    fn ok() -> Self {
        Self { exit_code: 0 }
    }

    fn with_code(exit_code: i32) -> Self {
        Self { exit_code }
    }
}

fn main() {
    let exit_code = match run() {
        Ok(outcome) => outcome.exit_code,
        Err(err) => {
            emit_error(&err);
            to_exit_code(err.kind())
        }
    };
    std::process::exit(exit_code);
}

fn run() -> Result<RunOutcome, Error> {
    let cli = match Cli::try_parse_from(std::env::args_os().collect::<Vec<OsString>>()) {
        Ok(cli) => cli,
        Err(err) => match err.kind() {
            ClapErrorKind::DisplayHelp
            | ClapErrorKind::DisplayVersion
            | ClapErrorKind::DisplayHelpOnMissingArgumentOrSubcommand => {
                err.print().map_err(|io_err| {
                    Error::new(ErrorKind::Io)
                        .with_message("failed to write help")
                        .with_source(io_err)
                })?;
                let exit_code = if matches!(
                    err.kind(),
                    ClapErrorKind::DisplayHelpOnMissingArgumentOrSubcommand
                ) {
                    2
                } else {
                    0
                };
                return Ok(RunOutcome::with_code(exit_code));
            }
            _ => {
                return Err(Error::new(ErrorKind::Usage)
                    .with_message(clap_error_summary(&err))
                    .with_hint("Try `sheetjson --help`."));
            }
        },
    };

    let accounts_dir = cli.accounts_dir.unwrap_or_else(default_accounts_dir);

    command_dispatch::dispatch_command(cli.command, accounts_dir)
        .map_err(add_corrupt_hint)
        .map_err(add_io_hint)
        .map_err(add_internal_hint)
}

#[derive(Parser)]
#[command(
    name = "sheetjson",
    version,
    about = "Serve Google Sheets ranges as JSON records and write JSON back",
    long_about = None,
    after_help = r#"EXAMPLES
  $ sheetjson serve --bind 127.0.0.1:5000
  $ curl 'http://127.0.0.1:5000/google/sheets/<doc>/Sheet1?filter_status=open'
  $ sheetjson records grid.json --filter status=open
  $ echo '[{"name":"ada"}]' | sheetjson grid --decorate-keys

ACCOUNTS
  <dir>/<name>.json       service-account key used for ?account=<name>
  <dir>/<name>.auth.json  {"Authorization": ["Bearer ..."]} allowlist (optional)"#,
    arg_required_else_help = true
)]
struct Cli {
    #[arg(
        long,
        help = "Directory holding account credentials (default: ./accounts)",
        value_hint = ValueHint::DirPath
    )]
    accounts_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    #[command(about = "Run the HTTP server")]
    Serve {
        #[arg(long, default_value = DEFAULT_BIND, help = "Bind address", help_heading = "Connection")]
        bind: String,
        #[arg(
            long,
            default_value = sheetjson::api::DEFAULT_ENDPOINT,
            help = "Google Sheets API endpoint",
            help_heading = "Connection"
        )]
        sheets_endpoint: String,
        #[arg(long, help = "Allow non-loopback binds", help_heading = "Safety")]
        allow_non_loopback: bool,
        #[arg(
            long,
            default_value_t = DEFAULT_MAX_BODY_BYTES,
            help = "Max request body size in bytes",
            help_heading = "Safety"
        )]
        max_body_bytes: u64,
        #[arg(
            long,
            default_value_t = DEFAULT_UPSTREAM_TIMEOUT_MS,
            help = "Timeout for each Sheets API call in milliseconds",
            help_heading = "Safety"
        )]
        upstream_timeout_ms: u64,
    },
    #[command(about = "List configured accounts")]
    Accounts,
    #[command(
        about = "Decode a JSON grid (array of rows) into records",
        after_help = r#"EXAMPLES
  $ sheetjson records grid.json
  $ sheetjson records --values-mode < grid.json
  $ sheetjson records grid.json --filter column_1='value A2'"#
    )]
    Records {
        #[arg(help = "Grid JSON file (default: stdin)", value_hint = ValueHint::FilePath)]
        input: Option<PathBuf>,
        #[arg(long, help = "Return the grid unchanged")]
        values_mode: bool,
        #[arg(long, help = "Emit the header row as the first record")]
        include_first_row: bool,
        #[arg(long, help = "Stop at the first blank or #N/A row")]
        break_if_na: bool,
        #[arg(long = "filter", value_name = "KEY=VALUE", help = "Keep records whose KEY equals VALUE (repeatable)")]
        filters: Vec<String>,
    },
    #[command(
        about = "Encode a JSON write body into the grid that would be written",
        after_help = r#"EXAMPLES
  $ echo '{"a":["1","2"],"b":["3"]}' | sheetjson grid
  $ sheetjson grid body.json --keys-seq b,a --decorate-keys"#
    )]
    Grid {
        #[arg(help = "Body JSON file (default: stdin)", value_hint = ValueHint::FilePath)]
        input: Option<PathBuf>,
        #[arg(long, value_name = "KEYS", help = "Comma-separated header order")]
        keys_seq: Option<String>,
        #[arg(long, help = "Uppercase header labels and turn `_` into spaces")]
        decorate_keys: bool,
    },
}

fn read_input(input: Option<&Path>) -> Result<Vec<u8>, Error> {
    match input {
        Some(path) => std::fs::read(path).map_err(|err| {
            let kind = if err.kind() == io::ErrorKind::NotFound {
                ErrorKind::NotFound
            } else {
                ErrorKind::Io
            };
            Error::new(kind)
                .with_message("failed to read input file")
                .with_path(path)
                .with_source(err)
        }),
        None => {
            let mut buf = Vec::new();
            io::stdin().lock().read_to_end(&mut buf).map_err(|err| {
                Error::new(ErrorKind::Io)
                    .with_message("failed to read stdin")
                    .with_source(err)
            })?;
            Ok(buf)
        }
    }
}

fn add_io_hint(err: Error) -> Error {
    if err.hint().is_some() {
        return err;
    }
    match err.kind() {
        ErrorKind::Io => err.with_hint("I/O error. Check the path and its permissions."),
        ErrorKind::NotFound if err.path().is_some() => {
            err.with_hint("Check the path, or pass --accounts-dir.")
        }
        _ => err,
    }
}

fn add_corrupt_hint(err: Error) -> Error {
    if err.kind() != ErrorKind::Corrupt || err.hint().is_some() {
        return err;
    }
    err.with_hint("Account file is unreadable. Re-download the service-account key.")
}

fn add_internal_hint(err: Error) -> Error {
    if err.kind() != ErrorKind::Internal || err.hint().is_some() {
        return err;
    }
    err.with_hint(
        "Unexpected internal failure. Retry with RUST_BACKTRACE=1 and share command/context if it persists.",
    )
}

fn emit_json(value: Value) {
    let json = if io::stdout().is_terminal() {
        serde_json::to_string_pretty(&value)
    } else {
        serde_json::to_string(&value)
    }
    .unwrap_or_else(|_| "{\"error\":\"json encode failed\"}".to_string());
    println!("{json}");
}

fn emit_error(err: &Error) {
    if io::stderr().is_terminal() {
        eprintln!("{}", error_text(err));
        return;
    }
    let json = serde_json::to_string(&error_json(err)).unwrap_or_else(|_| {
        "{\"error\":{\"kind\":\"Internal\",\"message\":\"json encode failed\"}}".to_string()
    });
    eprintln!("{json}");
}

fn error_message(err: &Error) -> String {
    if let Some(message) = err.message() {
        return message.to_string();
    }
    match err.kind() {
        ErrorKind::Internal => "internal error",
        ErrorKind::Usage => "usage error",
        ErrorKind::InvalidPayloadShape => "invalid payload shape",
        ErrorKind::MalformedRange => "malformed range",
        ErrorKind::UnauthorizedAccount => "not authorized",
        ErrorKind::Permission => "permission denied",
        ErrorKind::UnknownAccount => "unknown account",
        ErrorKind::NotFound => "not found",
        ErrorKind::UpstreamFailure => "upstream failure",
        ErrorKind::Timeout => "timed out",
        ErrorKind::Corrupt => "corrupt data",
        ErrorKind::Io => "i/o error",
    }
    .to_string()
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
    if let Some(index) = err.index() {
        inner.insert("index".to_string(), json!(index));
    }
    let causes = error_causes(err);
    if !causes.is_empty() {
        inner.insert("causes".to_string(), json!(causes));
    }

    let mut outer = Map::new();
    outer.insert("error".to_string(), Value::Object(inner));
    Value::Object(outer)
}

fn error_text(err: &Error) -> String {
    let mut lines = vec![format!("error: {}", error_message(err))];
    if let Some(hint) = err.hint() {
        lines.push(format!("hint: {hint}"));
    }
    if let Some(path) = err.path() {
        lines.push(format!("path: {}", path.display()));
    }
    if let Some(index) = err.index() {
        lines.push(format!("index: {index}"));
    }
    if let Some(cause) = error_causes(err).first() {
        lines.push(format!("caused by: {cause}"));
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
