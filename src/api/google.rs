//! Purpose: Provide a blocking HTTP client for the Google Sheets v4 values API.
//! Exports: `GoogleSheetsClient`, `DEFAULT_ENDPOINT`.
//! Role: Production `SheetsBackend`; authenticates per call with the account's service key.
//! Invariants: Every request has a bounded timeout (agent-level).
//! Invariants: No retries here; failures map to `Permission`, `NotFound`, `UpstreamFailure`, or `Timeout`.
//! Invariants: Write and clear answers are returned as received.
#![allow(clippy::result_large_err)]

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

use crate::core::error::{Error, ErrorKind};
use crate::core::grid::Grid;

use super::ApiResult;
use super::accounts::Account;
use super::backend::{Scope, SheetTarget, SheetsBackend};
use super::oauth;

pub const DEFAULT_ENDPOINT: &str = "https://sheets.googleapis.com/";

#[derive(Clone)]
pub struct GoogleSheetsClient {
    inner: Arc<GoogleSheetsClientInner>,
}

struct GoogleSheetsClientInner {
    base_url: Url,
    agent: ureq::Agent,
}

#[derive(Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<Value>>,
}

#[derive(Serialize)]
struct ValueRangeBody<'a> {
    range: &'a str,
    #[serde(rename = "majorDimension")]
    major_dimension: &'static str,
    values: &'a Grid,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: RemoteError,
}

#[derive(Deserialize)]
struct RemoteError {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    status: Option<String>,
}

impl GoogleSheetsClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> ApiResult<Self> {
        let base_url = normalize_base_url(base_url.into())?;
        let agent = ureq::AgentBuilder::new().timeout(timeout).build();
        Ok(Self {
            inner: Arc::new(GoogleSheetsClientInner { base_url, agent }),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.inner.base_url
    }

    fn values_url(&self, target: &SheetTarget, suffix: &str) -> ApiResult<Url> {
        let range = format!("{}{suffix}", target.qualified_range());
        build_url(
            &self.inner.base_url,
            &["v4", "spreadsheets", &target.document_id, "values", &range],
        )
    }

    fn request(&self, method: &str, url: &Url, account: &Account, scope: Scope) -> ApiResult<ureq::Request> {
        let token = oauth::fetch_access_token(&self.inner.agent, account.key(), scope)?;
        Ok(self
            .inner
            .agent
            .request(method, url.as_str())
            .set("Authorization", &format!("Bearer {token}"))
            .set("Accept", "application/json"))
    }

    fn send(&self, request: ureq::Request, body: Option<String>, target: &SheetTarget) -> ApiResult<ureq::Response> {
        let response = match body {
            Some(body) => request
                .set("Content-Type", "application/json")
                .send_string(&body),
            None => request.call(),
        };
        match response {
            Ok(response) => Ok(response),
            Err(ureq::Error::Status(code, response)) => Err(parse_error_response(code, response, target)),
            Err(ureq::Error::Transport(err)) => Err(transport_error(err, "sheets request failed")),
        }
    }
}

impl SheetsBackend for GoogleSheetsClient {
    fn fetch_range(&self, account: &Account, target: &SheetTarget) -> ApiResult<Grid> {
        let mut url = self.values_url(target, "")?;
        url.query_pairs_mut().append_pair("majorDimension", "ROWS");
        let request = self.request("GET", &url, account, Scope::ReadOnly)?;
        let response = self.send(request, None, target)?;
        let range: ValueRange = read_json_response(response)?;
        tracing::debug!(
            document = %target.document_id,
            range = %target.qualified_range(),
            rows = range.values.len(),
            "fetched range"
        );
        Ok(range
            .values
            .into_iter()
            .map(|row| row.into_iter().map(cell_to_string).collect())
            .collect())
    }

    fn write_range(&self, account: &Account, target: &SheetTarget, grid: &Grid) -> ApiResult<Value> {
        let mut url = self.values_url(target, "")?;
        url.query_pairs_mut()
            .append_pair("valueInputOption", "USER_ENTERED");
        let qualified = target.qualified_range();
        let body = encode_body(&ValueRangeBody {
            range: &qualified,
            major_dimension: "ROWS",
            values: grid,
        })?;
        let request = self.request("PUT", &url, account, Scope::ReadWrite)?;
        let response = self.send(request, Some(body), target)?;
        read_json_response(response)
    }

    fn clear_range(&self, account: &Account, target: &SheetTarget) -> ApiResult<Value> {
        let url = self.values_url(target, ":clear")?;
        let request = self.request("POST", &url, account, Scope::ReadWrite)?;
        let response = self.send(request, Some("{}".to_string()), target)?;
        read_json_response(response)
    }
}

/// Maps a ureq transport failure, keeping timeouts distinct from other failures.
pub(crate) fn transport_error(err: ureq::Transport, context: &str) -> Error {
    let kind = if is_timeout(&err) {
        ErrorKind::Timeout
    } else {
        ErrorKind::UpstreamFailure
    };
    Error::new(kind).with_message(context).with_source(err)
}

fn is_timeout(err: &ureq::Transport) -> bool {
    let mut source = std::error::Error::source(err);
    while let Some(cause) = source {
        if let Some(io_err) = cause.downcast_ref::<std::io::Error>() {
            if matches!(
                io_err.kind(),
                std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock
            ) {
                return true;
            }
        }
        source = cause.source();
    }
    false
}

fn cell_to_string(cell: Value) -> String {
    match cell {
        Value::String(text) => text,
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn encode_body<T: Serialize>(body: &T) -> ApiResult<String> {
    serde_json::to_string(body).map_err(|err| {
        Error::new(ErrorKind::Internal)
            .with_message("failed to encode request json")
            .with_source(err)
    })
}

fn normalize_base_url(raw: String) -> ApiResult<Url> {
    let mut url = Url::parse(&raw).map_err(|err| {
        Error::new(ErrorKind::Usage)
            .with_message("invalid sheets endpoint url")
            .with_source(err)
    })?;
    let scheme = url.scheme();
    if scheme != "http" && scheme != "https" {
        return Err(Error::new(ErrorKind::Usage)
            .with_message("sheets endpoint must use http or https scheme"));
    }
    if url.path() != "/" && !url.path().is_empty() {
        return Err(
            Error::new(ErrorKind::Usage).with_message("sheets endpoint must not include a path")
        );
    }
    url.set_path("/");
    url.set_query(None);
    url.set_fragment(None);
    Ok(url)
}

fn build_url(base_url: &Url, segments: &[&str]) -> ApiResult<Url> {
    let mut url = base_url.clone();
    {
        let mut path = url.path_segments_mut().map_err(|_| {
            Error::new(ErrorKind::Usage).with_message("sheets endpoint cannot be a base")
        })?;
        path.clear();
        for segment in segments {
            path.push(segment);
        }
    }
    Ok(url)
}

fn read_json_response<R>(response: ureq::Response) -> ApiResult<R>
where
    R: serde::de::DeserializeOwned,
{
    serde_json::from_reader(response.into_reader()).map_err(|err| {
        let kind = if err.is_io() {
            ErrorKind::UpstreamFailure
        } else {
            ErrorKind::Internal
        };
        Error::new(kind)
            .with_message("invalid sheets response json")
            .with_source(err)
    })
}

fn parse_error_response(status: u16, response: ureq::Response, target: &SheetTarget) -> Error {
    let body = response.into_string().unwrap_or_default();
    let remote = serde_json::from_str::<ErrorEnvelope>(&body)
        .ok()
        .map(|envelope| envelope.error);
    let message = remote.as_ref().and_then(|remote| remote.message.clone());
    let remote_status = remote.and_then(|remote| remote.status);
    tracing::warn!(
        status,
        remote_status = remote_status.as_deref().unwrap_or(""),
        document = %target.document_id,
        "sheets api error"
    );
    error_from_status(status, message.as_deref())
}

fn error_from_status(status: u16, message: Option<&str>) -> Error {
    let unparsable_range = message.is_some_and(|message| message.contains("Unable to parse range"));
    match status {
        401 | 403 => Error::new(ErrorKind::Permission)
            .with_message("sheet is not shared with service account")
            .with_hint("Share the document with the account's client_email."),
        404 => Error::new(ErrorKind::NotFound).with_message("document not found"),
        400 if unparsable_range => Error::new(ErrorKind::NotFound)
            .with_message(message.unwrap_or("sheet not found").to_string()),
        _ => Error::new(ErrorKind::UpstreamFailure).with_message(match message {
            Some(message) => format!("sheets api error status {status}: {message}"),
            None => format!("sheets api error status {status}"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::{
        DEFAULT_ENDPOINT, GoogleSheetsClient, build_url, cell_to_string, error_from_status,
        normalize_base_url,
    };
    use crate::api::backend::SheetTarget;
    use crate::core::error::ErrorKind;
    use crate::core::range::CellRange;
    use serde_json::json;
    use std::time::Duration;

    #[test]
    fn normalize_base_url_strips_trailing_parts() {
        let url = normalize_base_url("https://sheets.googleapis.com".to_string()).expect("url");
        assert_eq!(url.as_str(), DEFAULT_ENDPOINT);
        let err = normalize_base_url("ftp://example.com".to_string()).expect_err("scheme");
        assert_eq!(err.kind(), ErrorKind::Usage);
        let err = normalize_base_url("http://example.com/v4".to_string()).expect_err("path");
        assert_eq!(err.kind(), ErrorKind::Usage);
    }

    #[test]
    fn values_url_encodes_qualified_range() {
        let client = GoogleSheetsClient::new(DEFAULT_ENDPOINT, Duration::from_secs(5)).expect("client");
        let target = SheetTarget::new("doc-1_x", "My sheet", CellRange::parse("A1:B2").unwrap());
        let url = client.values_url(&target, ":clear").expect("url");
        assert_eq!(
            url.as_str(),
            "https://sheets.googleapis.com/v4/spreadsheets/doc-1_x/values/'My%20sheet'!A1:B2:clear"
        );
    }

    #[test]
    fn build_url_escapes_path_separators() {
        let base = normalize_base_url(DEFAULT_ENDPOINT.to_string()).unwrap();
        let url = build_url(&base, &["v4", "a/b"]).unwrap();
        assert_eq!(url.path(), "/v4/a%2Fb");
    }

    #[test]
    fn status_mapping_matches_error_taxonomy() {
        assert_eq!(error_from_status(403, None).kind(), ErrorKind::Permission);
        assert_eq!(error_from_status(401, None).kind(), ErrorKind::Permission);
        assert_eq!(error_from_status(404, None).kind(), ErrorKind::NotFound);
        assert_eq!(
            error_from_status(400, Some("Unable to parse range: Nope!A1:B2")).kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            error_from_status(400, Some("Invalid values")).kind(),
            ErrorKind::UpstreamFailure
        );
        assert_eq!(error_from_status(429, None).kind(), ErrorKind::UpstreamFailure);
        assert_eq!(error_from_status(503, None).kind(), ErrorKind::UpstreamFailure);
    }

    #[test]
    fn cells_render_as_strings() {
        assert_eq!(cell_to_string(json!("x")), "x");
        assert_eq!(cell_to_string(json!(3)), "3");
        assert_eq!(cell_to_string(json!(true)), "true");
        assert_eq!(cell_to_string(json!(null)), "");
    }
}
