//! Purpose: Provide the HTTP/JSON server translating between sheets and JSON.
//! Exports: `ServeConfig`, `serve`, `router`, `init_tracing`.
//! Role: Axum front end over `SheetService`; backend calls run on the blocking pool.
//! Invariants: Error envelopes are `{"error": {kind, message, hint?, index?}}`; kinds remain stable.
//! Invariants: Account authorization is checked before query validation or backend access.
//! Invariants: Every backend call is bounded by the upstream timeout (504 on expiry).
//! Invariants: Loopback-only unless explicitly allowed.

use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, Path as AxumPath, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use serde_json::{Value, json};
use std::future::IntoFuture;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::time::Duration;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use crate::api::{
    AccountStore, DEFAULT_ACCOUNT, Error, ErrorKind, GoogleSheetsClient, ReadRequest,
    SheetService, WriteRequest, first_param, parse_body, to_http_status,
};

type Params = Vec<(String, String)>;

#[derive(Clone, Debug)]
pub struct ServeConfig {
    pub bind: SocketAddr,
    pub accounts_dir: PathBuf,
    pub sheets_endpoint: String,
    pub allow_non_loopback: bool,
    pub max_body_bytes: u64,
    pub upstream_timeout_ms: u64,
}

#[derive(Clone)]
struct AppState {
    service: SheetService,
    upstream_timeout: Duration,
}

pub async fn serve(config: ServeConfig) -> Result<(), Error> {
    validate_config(&config)?;

    init_tracing();

    let max_body_bytes: usize = config
        .max_body_bytes
        .try_into()
        .map_err(|_| Error::new(ErrorKind::Usage).with_message("--max-body-bytes is too large"))?;
    let upstream_timeout = Duration::from_millis(config.upstream_timeout_ms);

    let accounts = AccountStore::load(&config.accounts_dir)?;
    let backend = GoogleSheetsClient::new(config.sheets_endpoint.clone(), upstream_timeout)?;
    let service = SheetService::new(Arc::new(backend), Arc::new(accounts));
    let app = router(service, upstream_timeout, max_body_bytes);

    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .map_err(|err| {
            Error::new(ErrorKind::Io)
                .with_message("failed to bind server")
                .with_source(err)
        })?;
    tracing::info!(bind = %config.bind, accounts_dir = %config.accounts_dir.display(), "listening");

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
    let server = axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = shutdown_rx.await;
        })
        .into_future();
    tokio::pin!(server);

    tokio::select! {
        result = &mut server => {
            result.map_err(|err| {
                Error::new(ErrorKind::Io)
                    .with_message("server failed")
                    .with_source(err)
            })?;
        }
        _ = shutdown_signal() => {
            tracing::info!("shutting down");
            let _ = shutdown_tx.send(());
            match tokio::time::timeout(Duration::from_secs(10), &mut server).await {
                Ok(result) => result.map_err(|err| {
                    Error::new(ErrorKind::Io)
                        .with_message("server failed")
                        .with_source(err)
                })?,
                Err(_) => {
                    return Err(Error::new(ErrorKind::Io).with_message("server shutdown timed out"));
                }
            }
        }
    };
    Ok(())
}

/// Builds the application router; shared by `serve` and in-process tests.
pub fn router(service: SheetService, upstream_timeout: Duration, max_body_bytes: usize) -> Router {
    let state = Arc::new(AppState {
        service,
        upstream_timeout,
    });
    Router::new()
        .route("/", get(root))
        .route("/healthz", get(healthz))
        .route(
            "/google/sheets/:document/:sheet",
            get(read_sheet).post(write_sheet),
        )
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn is_loopback(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(addr) => addr.is_loopback(),
        IpAddr::V6(addr) => addr.is_loopback(),
    }
}

fn validate_config(config: &ServeConfig) -> Result<(), Error> {
    if !is_loopback(config.bind.ip()) && !config.allow_non_loopback {
        return Err(Error::new(ErrorKind::Usage)
            .with_message("non-loopback bind requires explicit opt-in")
            .with_hint("Re-run with --allow-non-loopback or use a loopback address."));
    }

    if config.max_body_bytes == 0 {
        return Err(Error::new(ErrorKind::Usage)
            .with_message("--max-body-bytes must be greater than zero")
            .with_hint("Use a positive value like 1048576."));
    }

    if config.max_body_bytes > usize::MAX as u64 {
        return Err(Error::new(ErrorKind::Usage)
            .with_message("--max-body-bytes exceeds platform limits")
            .with_hint("Use a smaller value that fits in memory."));
    }

    if config.upstream_timeout_ms == 0 {
        return Err(Error::new(ErrorKind::Usage)
            .with_message("--upstream-timeout-ms must be greater than zero")
            .with_hint("Use a positive value like 30000."));
    }

    Ok(())
}

pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .try_init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };
    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::warn!(error = %err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(unix)]
    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    #[cfg(not(unix))]
    ctrl_c.await;
}

/// Runs the account allowlist check using the `account` query parameter.
fn authorize(state: &AppState, params: &[(String, String)], headers: &HeaderMap) -> Result<(), Error> {
    let account = first_param(params, "account").unwrap_or(DEFAULT_ACCOUNT);
    state
        .service
        .accounts()
        .authorize(account, authorization_header(headers).as_deref())
}

fn authorization_header(headers: &HeaderMap) -> Option<String> {
    headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
}

async fn run_blocking<F>(timeout: Duration, task: F) -> Result<Value, Error>
where
    F: FnOnce() -> Result<Value, Error> + Send + 'static,
{
    match tokio::time::timeout(timeout, tokio::task::spawn_blocking(task)).await {
        Ok(Ok(result)) => result,
        Ok(Err(err)) => Err(Error::new(ErrorKind::Internal)
            .with_message("request task failed")
            .with_source(err)),
        Err(_) => Err(Error::new(ErrorKind::Timeout)
            .with_message("upstream request timed out")
            .with_hint(format!("The sheet service did not answer within {timeout:?}."))),
    }
}

async fn root() -> StatusCode {
    StatusCode::OK
}

async fn healthz() -> Response {
    json_response(json!({ "ok": true }))
}

#[derive(Debug, Serialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    kind: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    hint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    index: Option<usize>,
}

async fn read_sheet(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    AxumPath((document, sheet)): AxumPath<(String, String)>,
    Query(params): Query<Params>,
) -> Response {
    if let Err(err) = authorize(&state, &params, &headers) {
        return error_response(err);
    }
    let request = match ReadRequest::from_query(&document, &sheet, &params) {
        Ok(request) => request,
        Err(err) => return error_response(err),
    };
    let service = state.service.clone();
    let authorization = authorization_header(&headers);
    let result = run_blocking(state.upstream_timeout, move || {
        service.read(&request, authorization.as_deref())
    })
    .await;
    match result {
        Ok(payload) => json_response(payload),
        Err(err) => error_response(err),
    }
}

async fn write_sheet(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    AxumPath((document, sheet)): AxumPath<(String, String)>,
    Query(params): Query<Params>,
    body: Bytes,
) -> Response {
    if let Err(err) = authorize(&state, &params, &headers) {
        return error_response(err);
    }
    let request = match WriteRequest::from_query(&document, &sheet, &params) {
        Ok(request) => request,
        Err(err) => return error_response(err),
    };
    let body = match parse_body(&body) {
        Ok(body) => body,
        Err(err) => return error_response(err),
    };
    let service = state.service.clone();
    let authorization = authorization_header(&headers);
    let result = run_blocking(state.upstream_timeout, move || {
        service.write(&request, authorization.as_deref(), body)
    })
    .await;
    match result {
        Ok(payload) => json_response(payload),
        Err(err) => error_response(err),
    }
}

fn json_response(payload: Value) -> Response {
    Json(payload).into_response()
}

fn error_response(err: Error) -> Response {
    let status = StatusCode::from_u16(to_http_status(err.kind()))
        .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    if status.is_server_error() {
        tracing::error!(kind = ?err.kind(), error = %err, "request failed");
    } else {
        tracing::debug!(kind = ?err.kind(), error = %err, "request rejected");
    }
    let body = ErrorEnvelope {
        error: ErrorBody {
            kind: format!("{:?}", err.kind()),
            message: err.message().unwrap_or("error").to_string(),
            hint: err.hint().map(str::to_string),
            index: err.index(),
        },
    };
    (status, Json(body)).into_response()
}
