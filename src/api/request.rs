//! Purpose: Sequence account resolution, the sheet backend, and the grid codecs for one request.
//! Exports: `SheetService`, `ReadRequest`, `WriteRequest`, `parse_body`, `parse_bool`.
//! Role: Transport-neutral request layer shared by the HTTP server and tests.
//! Invariants: Authorization runs before any backend call.
//! Invariants: One backend call per request; no retries.
//! Invariants: Write and clear results are relayed unchanged.
#![allow(clippy::result_large_err)]

use std::sync::Arc;

use serde_json::Value;

use crate::core::encode::{self, EncodeOptions, Encoded};
use crate::core::error::{Error, ErrorKind};
use crate::core::filter::{self, Filter};
use crate::core::grid::{self, DecodeOptions, Decoded};
use crate::core::keys::normalize_key;
use crate::core::range::CellRange;
use crate::json::parse;

use super::ApiResult;
use super::accounts::AccountStore;
use super::backend::{SheetTarget, SheetsBackend};

pub const DEFAULT_ACCOUNT: &str = "default";

const FILTER_PREFIX: &str = "filter_";

/// Parsed query of a read (GET) request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReadRequest {
    pub target: SheetTarget,
    pub account: String,
    pub options: DecodeOptions,
    pub filters: Vec<Filter>,
}

/// Parsed query of a write (POST) request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WriteRequest {
    pub target: SheetTarget,
    pub account: String,
    pub options: EncodeOptions,
}

impl ReadRequest {
    pub fn from_query(
        document_id: &str,
        sheet_name: &str,
        params: &[(String, String)],
    ) -> ApiResult<Self> {
        let common = CommonParams::from_query(document_id, sheet_name, params)?;
        let flag = |name: &str| first_param(params, name).is_some_and(parse_bool);
        let options = DecodeOptions {
            values_mode: flag("values_mode"),
            include_first_row: flag("include_first_row"),
            break_if_na: flag("break_if_na"),
        };
        let filters = params
            .iter()
            .filter_map(|(name, value)| {
                let raw_key = name.strip_prefix(FILTER_PREFIX)?;
                Some(Filter::new(normalize_key(raw_key), value.clone()))
            })
            .collect();
        Ok(Self {
            target: common.target,
            account: common.account,
            options,
            filters,
        })
    }
}

impl WriteRequest {
    pub fn from_query(
        document_id: &str,
        sheet_name: &str,
        params: &[(String, String)],
    ) -> ApiResult<Self> {
        let common = CommonParams::from_query(document_id, sheet_name, params)?;
        let options = EncodeOptions {
            keys_seq: first_param(params, "keys_seq").and_then(encode::parse_keys_seq),
            decorate_keys: first_param(params, "decorate_keys").is_some_and(parse_bool),
        };
        Ok(Self {
            target: common.target,
            account: common.account,
            options,
        })
    }
}

struct CommonParams {
    target: SheetTarget,
    account: String,
}

impl CommonParams {
    fn from_query(
        document_id: &str,
        sheet_name: &str,
        params: &[(String, String)],
    ) -> ApiResult<Self> {
        validate_document_id(document_id)?;
        if sheet_name.is_empty() {
            return Err(Error::new(ErrorKind::Usage).with_message("sheet name is empty"));
        }
        let account = first_param(params, "account").unwrap_or(DEFAULT_ACCOUNT);
        let range = match first_param(params, "range") {
            Some(raw) => CellRange::parse(raw)?,
            None => CellRange::default(),
        };
        Ok(Self {
            target: SheetTarget::new(document_id, sheet_name, range),
            account: account.to_string(),
        })
    }
}

/// First value of a repeated query parameter.
pub fn first_param<'a>(params: &'a [(String, String)], name: &str) -> Option<&'a str> {
    params
        .iter()
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.as_str())
}

/// Query-string boolean: `true`, `1`, `yes`, `on` (any case).
pub fn parse_bool(raw: &str) -> bool {
    matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "true" | "1" | "yes" | "on"
    )
}

/// Parses a write body; any JSON syntax failure is a payload-shape error.
pub fn parse_body(bytes: &[u8]) -> ApiResult<Value> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Err(Error::new(ErrorKind::InvalidPayloadShape)
            .with_message("request body is empty")
            .with_hint("Send a JSON array or object."));
    }
    parse::from_slice(bytes).map_err(|err| {
        let hint = parse::hint_for_error(&err, "request body");
        Error::new(ErrorKind::InvalidPayloadShape)
            .with_message("request body is not valid json")
            .with_hint(hint)
            .with_source(err)
    })
}

fn validate_document_id(document_id: &str) -> ApiResult<()> {
    let valid = !document_id.is_empty()
        && document_id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_');
    if valid {
        Ok(())
    } else {
        Err(Error::new(ErrorKind::Usage)
            .with_message(format!("invalid document id `{document_id}`"))
            .with_hint("Document ids contain only letters, digits, `-` and `_`."))
    }
}

/// Request handlers over a backend and the account registry.
#[derive(Clone)]
pub struct SheetService {
    backend: Arc<dyn SheetsBackend>,
    accounts: Arc<AccountStore>,
}

impl SheetService {
    pub fn new(backend: Arc<dyn SheetsBackend>, accounts: Arc<AccountStore>) -> Self {
        Self { backend, accounts }
    }

    pub fn accounts(&self) -> &AccountStore {
        &self.accounts
    }

    pub fn read(&self, request: &ReadRequest, authorization: Option<&str>) -> ApiResult<Value> {
        let account = self.accounts.resolve(&request.account, authorization)?;
        let rows = self.backend.fetch_range(account, &request.target)?;
        let decoded = match grid::decode(rows, request.options) {
            Decoded::Records(records) => {
                Decoded::Records(filter::apply(records, &request.filters))
            }
            values => values,
        };
        tracing::debug!(
            account = %request.account,
            document = %request.target.document_id,
            range = %request.target.qualified_range(),
            rows = decoded.len(),
            "read complete"
        );
        Ok(decoded.to_json())
    }

    pub fn write(
        &self,
        request: &WriteRequest,
        authorization: Option<&str>,
        body: Value,
    ) -> ApiResult<Value> {
        let account = self.accounts.resolve(&request.account, authorization)?;
        let shape = encode::classify(body)?;
        let shape_name = shape.name();
        let result = match encode::encode(shape, &request.options) {
            Encoded::Clear => self.backend.clear_range(account, &request.target)?,
            Encoded::Grid(rows) => self.backend.write_range(account, &request.target, &rows)?,
        };
        tracing::debug!(
            account = %request.account,
            document = %request.target.document_id,
            range = %request.target.qualified_range(),
            shape = shape_name,
            "write complete"
        );
        Ok(result)
    }
}
