//! Purpose: Hold top-level CLI command dispatch for `sheetjson`.
//! Exports: `dispatch_command`.
//! Role: Keep `main.rs` focused on parse/bootstrap and delegate command execution.
//! Invariants: `records` and `grid` run the same codecs as the HTTP handlers, offline.

use super::*;

use sheetjson::api::{AccountStore, parse_body};
use sheetjson::core::encode::{self, EncodeOptions, Encoded, WriteShape};
use sheetjson::core::filter::{self, Filter};
use sheetjson::core::grid::{self, DecodeOptions, Decoded};
use sheetjson::core::keys::normalize_key;
use sheetjson::serve;

pub(super) fn dispatch_command(command: Command, accounts_dir: PathBuf) -> Result<RunOutcome, Error> {
    match command {
        Command::Serve {
            bind,
            sheets_endpoint,
            allow_non_loopback,
            max_body_bytes,
            upstream_timeout_ms,
        } => {
            let bind = bind.parse().map_err(|err| {
                Error::new(ErrorKind::Usage)
                    .with_message(format!("invalid bind address `{bind}`"))
                    .with_hint("Use host:port, for example 127.0.0.1:5000.")
                    .with_source(err)
            })?;
            let config = serve::ServeConfig {
                bind,
                accounts_dir,
                sheets_endpoint,
                allow_non_loopback,
                max_body_bytes,
                upstream_timeout_ms,
            };
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()
                .map_err(|err| {
                    Error::new(ErrorKind::Internal)
                        .with_message("failed to start runtime")
                        .with_source(err)
                })?;
            runtime.block_on(serve::serve(config))?;
            Ok(RunOutcome::ok())
        }
        Command::Accounts => {
            let store = AccountStore::load(&accounts_dir)?;
            let accounts: Vec<Value> = store
                .names()
                .map(|name| {
                    json!({
                        "name": name,
                        "client_email": store.get(name).map(|account| account.key().client_email.clone()),
                        "auth_required": store.requires_auth(name),
                        "bearer_count": store.allowlist_len(name),
                    })
                })
                .collect();
            emit_json(json!({
                "accounts_dir": accounts_dir.display().to_string(),
                "accounts": accounts,
            }));
            Ok(RunOutcome::ok())
        }
        Command::Records {
            input,
            values_mode,
            include_first_row,
            break_if_na,
            filters,
        } => {
            let bytes = read_input(input.as_deref())?;
            let rows = match encode::classify(parse_body(&bytes)?)? {
                WriteShape::RowsOfValues(rows) => rows,
                WriteShape::Clear => Vec::new(),
                other => {
                    return Err(Error::new(ErrorKind::InvalidPayloadShape)
                        .with_message(format!("expected an array of rows, found {}", other.name()))
                        .with_hint("Pass the grid as [[\"header\", ...], [\"value\", ...]]."));
                }
            };
            let filters = parse_filters(&filters)?;
            let options = DecodeOptions {
                values_mode,
                include_first_row,
                break_if_na,
            };
            let decoded = match grid::decode(rows, options) {
                Decoded::Records(records) => Decoded::Records(filter::apply(records, &filters)),
                values => values,
            };
            emit_json(decoded.to_json());
            Ok(RunOutcome::ok())
        }
        Command::Grid {
            input,
            keys_seq,
            decorate_keys,
        } => {
            let bytes = read_input(input.as_deref())?;
            let shape = encode::classify(parse_body(&bytes)?)?;
            let options = EncodeOptions {
                keys_seq: keys_seq.as_deref().and_then(encode::parse_keys_seq),
                decorate_keys,
            };
            let output = match encode::encode(shape, &options) {
                Encoded::Clear => json!({ "clear": true }),
                Encoded::Grid(rows) => json!({ "grid": rows }),
            };
            emit_json(output);
            Ok(RunOutcome::ok())
        }
    }
}

fn parse_filters(raw: &[String]) -> Result<Vec<Filter>, Error> {
    raw.iter()
        .map(|entry| {
            let (key, value) = entry.split_once('=').ok_or_else(|| {
                Error::new(ErrorKind::Usage)
                    .with_message(format!("filter `{entry}` is missing `=`"))
                    .with_hint("Use --filter KEY=VALUE.")
            })?;
            Ok::<_, Error>(Filter::new(normalize_key(key), value))
        })
        .collect()
}
