use std::sync::Arc;
use std::time::Instant;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::{Json, Router, routing::get};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use crate::census::{Broadband, BroadbandKey, Lookup, Source};
use crate::error::Error;
use crate::parse::Cells;
use crate::search::{SearchOptions, Searcher};
use crate::source::CsvSource;

/// Shared by every request. Searches build their own [`Searcher`], so no
/// match memory ever crosses requests.
pub struct AppState<S: Source> {
    pub csv: Arc<CsvSource>,
    pub broadband: Arc<Lookup<S>>,
}

impl<S: Source> AppState<S> {
    pub fn new(csv: CsvSource, broadband: Lookup<S>) -> Self {
        Self {
            csv: Arc::new(csv),
            broadband: Arc::new(broadband),
        }
    }
}

impl<S: Source> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            csv: Arc::clone(&self.csv),
            broadband: Arc::clone(&self.broadband),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct LoadRequest {
    pub filepath: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SearchRequest {
    pub val: Option<String>,
    #[serde(rename = "colId")]
    pub col_id: Option<String>,
    pub opts: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct BroadbandRequest {
    pub state: Option<String>,
    pub county: Option<String>,
}

#[derive(Debug, Default, Serialize)]
pub struct Reply {
    pub response_type: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filepath: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub row_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ragged_rows: Option<Vec<usize>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub partial: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rows: Option<Vec<usize>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Vec<Cells>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub county: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub broadband_percentage: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retrieved_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Reply {
    pub fn success() -> Self {
        Self { response_type: "success", ..Default::default() }
    }
    pub fn failure(message: impl Into<String>) -> Self {
        Self { response_type: "error", error: Some(message.into()), ..Default::default() }
    }
}

type Response = (StatusCode, Json<Reply>);

fn ok(reply: Reply) -> Response {
    (StatusCode::OK, Json(reply))
}

fn fail(status: StatusCode, message: impl Into<String>) -> Response {
    let message = message.into();
    warn!(%message, code = %status.as_u16(), "request failed");
    (status, Json(Reply::failure(message)))
}

fn status_for(e: &Error) -> StatusCode {
    match e {
        Error::Io(io) if io.kind() == std::io::ErrorKind::NotFound => StatusCode::NOT_FOUND,
        Error::DataSource(_) | Error::ColumnConversion(_) | Error::RowConversion { .. } => {
            StatusCode::BAD_REQUEST
        }
        Error::NotLoaded => StatusCode::CONFLICT,
        Error::Fetch(_) => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn from_error(e: Error) -> Response {
    fail(status_for(&e), e.to_string())
}

fn join_failed(e: tokio::task::JoinError) -> Response {
    warn!(error = %e, "Join error");
    fail(StatusCode::INTERNAL_SERVER_ERROR, "Join error")
}

pub fn router<S>(state: AppState<S>) -> Router
where
    S: Source<Key = BroadbandKey, Value = Broadband> + 'static,
{
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);
    Router::new()
        .route("/loadcsv", get(load_csv::<S>))
        .route("/viewcsv", get(view_csv::<S>))
        .route("/searchcsv", get(search_csv::<S>))
        .route("/broadband", get(broadband::<S>))
        .layer(cors)
        .with_state(state)
}

pub async fn load_csv<S: Source + 'static>(
    State(app): State<AppState<S>>,
    Query(req): Query<LoadRequest>,
) -> Response {
    let Some(filepath) = req.filepath else {
        return fail(StatusCode::BAD_REQUEST, "missing required parameter 'filepath'");
    };
    let csv = Arc::clone(&app.csv);
    let requested = filepath.clone();
    // parsing is blocking file i/o
    let loaded = match tokio::task::spawn_blocking(move || csv.load(&requested)).await {
        Ok(Ok(loaded)) => loaded,
        Ok(Err(e)) => return from_error(e),
        Err(e) => return join_failed(e),
    };
    ok(Reply {
        filepath: Some(filepath),
        row_count: Some(loaded.table.len()),
        ragged_rows: Some(loaded.ragged.iter().map(|r| r.row).collect()),
        partial: Some(loaded.partial),
        ..Reply::success()
    })
}

pub async fn view_csv<S: Source + 'static>(State(app): State<AppState<S>>) -> Response {
    match app.csv.current() {
        Ok(loaded) => ok(Reply {
            row_count: Some(loaded.table.len()),
            data: Some(loaded.table.clone()),
            ..Reply::success()
        }),
        Err(e) => from_error(e),
    }
}

pub async fn search_csv<S: Source + 'static>(
    State(app): State<AppState<S>>,
    Query(req): Query<SearchRequest>,
) -> Response {
    let Some(value) = req.val else {
        return fail(StatusCode::BAD_REQUEST, "missing required parameter 'val'");
    };
    let loaded = match app.csv.current() {
        Ok(loaded) => loaded,
        Err(e) => return from_error(e),
    };
    let options = SearchOptions::from_flags(req.opts.as_deref().unwrap_or(""));
    let column = req.col_id;
    let started = Instant::now();
    let (needle, scope) = (value.clone(), column.clone());
    let found = tokio::task::spawn_blocking(move || {
        let mut searcher = Searcher::new(&loaded.table, options);
        let mut rows = Vec::new();
        match scope.as_deref() {
            Some(column) => {
                while let Some(row) = searcher.try_search_column(&needle, column)? {
                    rows.push(row);
                }
            }
            None => {
                while let Some(row) = searcher.search_any(&needle) {
                    rows.push(row);
                }
            }
        }
        let data: Vec<Cells> = rows.iter().map(|&row| loaded.table[row].clone()).collect();
        Ok::<_, Error>((rows, data))
    })
    .await;
    let (rows, data) = match found {
        Ok(Ok(found)) => found,
        Ok(Err(e)) => return from_error(e),
        Err(e) => return join_failed(e),
    };
    let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
    if rows.is_empty() {
        let message = match column {
            Some(column) => format!("Value '{value}' not found within column '{column}'"),
            None => format!("Value '{value}' not found"),
        };
        return fail(StatusCode::NOT_FOUND, message);
    }
    info!(ms = elapsed_ms, matches = rows.len(), "search complete");
    ok(Reply {
        row_count: Some(rows.len()),
        rows: Some(rows),
        data: Some(data),
        ..Reply::success()
    })
}

pub async fn broadband<S>(
    State(app): State<AppState<S>>,
    Query(req): Query<BroadbandRequest>,
) -> Response
where
    S: Source<Key = BroadbandKey, Value = Broadband> + 'static,
{
    let (Some(state), Some(county)) = (req.state, req.county) else {
        return fail(StatusCode::BAD_REQUEST, "parameters 'state' and 'county' are both required");
    };
    let key = BroadbandKey::new(state, county);
    match app.broadband.get(&key).await {
        Ok(found) => ok(Reply {
            broadband_percentage: Some(found.percentage),
            retrieved_at: Some(found.retrieved_at.to_rfc3339()),
            state: Some(key.state),
            county: Some(key.county),
            ..Reply::success()
        }),
        Err(e) => from_error(e),
    }
}
