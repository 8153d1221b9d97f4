// HTTP request handlers
use crate::application::host_bridge::HostError;
use crate::application::terminal_service::SessionError;
use crate::application::view_registry::RegistryError;
use crate::domain::host::HostMessage;
use crate::domain::sample::ViewKind;
use crate::domain::session::{Command, SerialSession};
use crate::domain::timeseries::TimeSeriesOptions;
use crate::domain::view_state::ViewState;
use crate::infrastructure::chunked_stream::{chunked_json_stream, stream_from_watch};
use crate::infrastructure::http_response::{accepts_brotli, json_response};
use crate::presentation::app_state::AppState;
use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;

/// Maps engine errors onto HTTP status codes.
pub struct ApiError(StatusCode, String);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.0, Json(json!({ "error": self.1 }))).into_response()
    }
}

impl From<RegistryError> for ApiError {
    fn from(e: RegistryError) -> Self {
        let status = match &e {
            RegistryError::NotMounted(_) => StatusCode::NOT_FOUND,
            RegistryError::Channel(_) => StatusCode::BAD_GATEWAY,
            RegistryError::Scheduler(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        ApiError(status, e.to_string())
    }
}

impl From<SessionError> for ApiError {
    fn from(e: SessionError) -> Self {
        let status = match &e {
            SessionError::Rejected(_) => StatusCode::CONFLICT,
            SessionError::Channel(_) => StatusCode::BAD_GATEWAY,
        };
        ApiError(status, e.to_string())
    }
}

impl From<HostError> for ApiError {
    fn from(e: HostError) -> Self {
        match e {
            HostError::Registry(e) => e.into(),
            HostError::Unavailable => {
                ApiError(StatusCode::SERVICE_UNAVAILABLE, HostError::Unavailable.to_string())
            }
        }
    }
}

fn parse_kind(kind: &str) -> Result<ViewKind, ApiError> {
    ViewKind::ALL
        .into_iter()
        .find(|k| k.as_str() == kind)
        .ok_or_else(|| ApiError(StatusCode::NOT_FOUND, format!("unknown view kind {}", kind)))
}

fn encoded(result: Result<Response, StatusCode>) -> Response {
    match result {
        Ok(response) => response,
        Err(status) => status.into_response(),
    }
}

/// Health check endpoint
pub async fn health_check() -> &'static str {
    "ok"
}

/// List mounted views
pub async fn list_views(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.registry.mounted().await)
}

pub async fn mount_view(
    Path(kind): Path<String>,
    State(state): State<Arc<AppState>>,
) -> Result<StatusCode, ApiError> {
    let kind = parse_kind(&kind)?;
    if state.registry.mount(kind).await? {
        Ok(StatusCode::CREATED)
    } else {
        Ok(StatusCode::OK)
    }
}

pub async fn unmount_view(
    Path(kind): Path<String>,
    State(state): State<Arc<AppState>>,
) -> Result<StatusCode, ApiError> {
    let kind = parse_kind(&kind)?;
    state.registry.unmount(kind).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Current snapshot of a mounted view
pub async fn view_snapshot(
    Path(kind): Path<String>,
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
) -> Result<Response, ApiError> {
    let kind = parse_kind(&kind)?;
    let snapshot = state.registry.snapshot(kind).await?;
    Ok(encoded(json_response(&snapshot, accepts_brotli(&headers)).await))
}

/// Stream every published revision of a view (progressive updates)
pub async fn stream_view(
    Path(kind): Path<String>,
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
) -> Result<Response, ApiError> {
    let kind = parse_kind(&kind)?;
    let rx = state.registry.subscribe(kind).await?;
    Ok(stream_from_watch(rx, accepts_brotli(&headers)).into_response())
}

pub async fn reset_views(State(state): State<Arc<AppState>>) -> Result<StatusCode, ApiError> {
    state.registry.reset_plots().await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TerminalSnapshot {
    session: SerialSession,
    view: ViewState,
}

pub async fn terminal_snapshot(
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
) -> Result<Response, ApiError> {
    let terminal = state.registry.terminal().await?;
    let snapshot = TerminalSnapshot {
        session: terminal.session(),
        view: terminal.view(),
    };
    Ok(encoded(json_response(&snapshot, accepts_brotli(&headers)).await))
}

pub async fn terminal_command(
    State(state): State<Arc<AppState>>,
    Json(command): Json<Command>,
) -> Result<impl IntoResponse, ApiError> {
    let terminal = state.registry.terminal().await?;
    let session_state = terminal.execute(command).await?;
    Ok(Json(json!({ "state": session_state })))
}

#[derive(Deserialize)]
pub struct SelectionRequest {
    pub port: Option<String>,
    pub baud: Option<u32>,
}

pub async fn terminal_selection(
    State(state): State<Arc<AppState>>,
    Json(selection): Json<SelectionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let terminal = state.registry.terminal().await?;
    terminal.select(selection.port, selection.baud);
    let session = terminal.session();
    Ok(Json(json!({
        "port": session.selected_port(),
        "baud": session.selected_baud(),
    })))
}

pub async fn terminal_rescan(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, ApiError> {
    let terminal = state.registry.terminal().await?;
    terminal
        .rescan_ports()
        .await
        .map_err(RegistryError::from)?;
    Ok(Json(terminal.view().discovered_ports))
}

pub async fn get_timeseries_options(
    State(state): State<Arc<AppState>>,
) -> Result<Json<TimeSeriesOptions>, ApiError> {
    Ok(Json(state.registry.timeseries_options().await?))
}

pub async fn put_timeseries_options(
    State(state): State<Arc<AppState>>,
    Json(options): Json<TimeSeriesOptions>,
) -> Result<StatusCode, ApiError> {
    state.registry.set_timeseries_options(&options).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn open_file_dialog(State(state): State<Arc<AppState>>) -> Result<StatusCode, ApiError> {
    state.host.handle(HostMessage::OpenFileDialog).await?;
    Ok(StatusCode::ACCEPTED)
}

#[derive(Deserialize)]
pub struct SelectedDirectory {
    pub paths: Vec<PathBuf>,
}

pub async fn selected_directory(
    State(state): State<Arc<AppState>>,
    Json(selection): Json<SelectedDirectory>,
) -> Result<StatusCode, ApiError> {
    state
        .host
        .handle(HostMessage::SelectedDirectory {
            paths: selection.paths,
        })
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn show_adcp_terminal(State(state): State<Arc<AppState>>) -> Result<StatusCode, ApiError> {
    state.host.handle(HostMessage::ShowAdcpTerminal).await?;
    Ok(StatusCode::ACCEPTED)
}

/// Requests for the host shell, streamed to the one attached shell
pub async fn host_events(
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
) -> Result<Response, ApiError> {
    let rx = state.host_events.clone().try_lock_owned().map_err(|_| {
        ApiError(StatusCode::CONFLICT, "a host shell is already attached".to_string())
    })?;
    tracing::info!("host shell attached");

    let stream = async_stream::stream! {
        let mut rx = rx;
        while let Some(message) = rx.recv().await {
            yield message;
        }
    };
    Ok(encoded(chunked_json_stream(stream, accepts_brotli(&headers))))
}
