use std::{collections::BTreeMap, convert::Infallible, sync::Arc};

use axum::{
    Json,
    extract::{Path, Query, State},
    http::{
        HeaderMap, HeaderValue, StatusCode,
        header::{CACHE_CONTROL, CONTENT_TYPE},
    },
    response::{
        IntoResponse, Redirect, Response,
        sse::{Event, KeepAlive, Sse},
    },
};
use serde::{Deserialize, Serialize};
use tokio_stream::{Stream, StreamExt, wrappers::BroadcastStream};
use tracing::{info, warn};

use crate::{
    app_state::AppState,
    camera::{
        aggregate::ConnectionSummary,
        models::{BackendCameraStatus, FileKind, SnapshotTaken},
    },
    controls::{BatchReport, files::FileListing, recording::RecordingToggle},
    core::{
        errors::AppError,
        state::{CameraId, CameraStatus},
    },
};

#[derive(Serialize)]
pub struct HealthResponse {
    status: &'static str,
}

#[derive(Serialize)]
pub struct StatusResponse {
    app_name: String,
    summary: ConnectionSummary,
    label: String,
    cameras: Vec<CameraStatus>,
}

#[derive(Serialize)]
pub struct UrlResponse {
    url: String,
}

#[derive(Deserialize)]
pub struct SnapshotQuery {
    resolution: Option<String>,
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

pub async fn status(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    let summary = state.cameras.summary();
    Json(StatusResponse {
        app_name: state.config.app_name.clone(),
        summary,
        label: format!(
            "{} ({}/{} online)",
            summary.status.label(),
            summary.streaming,
            summary.total
        ),
        cameras: state.cameras.statuses().await,
    })
}

pub async fn events(
    State(state): State<Arc<AppState>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let stream = BroadcastStream::new(state.cameras.events().subscribe()).filter_map(|item| {
        let event = match item {
            Ok(event) => event,
            Err(err) => {
                warn!("event stream subscriber lagged: {err}");
                return None;
            }
        };
        match Event::default().json_data(&event) {
            Ok(sse) => Some(Ok(sse)),
            Err(err) => {
                warn!("failed to encode controller event: {err}");
                None
            }
        }
    });
    Sse::new(stream).keep_alive(KeepAlive::default())
}

pub async fn camera_status(
    State(state): State<Arc<AppState>>,
    Path(camera_id): Path<CameraId>,
) -> Result<Json<CameraStatus>, AppError> {
    Ok(Json(state.cameras.status(camera_id).await?))
}

pub async fn retry(
    State(state): State<Arc<AppState>>,
    Path(camera_id): Path<CameraId>,
) -> Result<Json<CameraStatus>, AppError> {
    info!(camera_id, "manual retry requested from web");
    state.cameras.retry_stream(camera_id).await?;
    Ok(Json(state.cameras.status(camera_id).await?))
}

pub async fn attach(
    State(state): State<Arc<AppState>>,
    Path(camera_id): Path<CameraId>,
) -> Result<Json<CameraStatus>, AppError> {
    state.cameras.attach_camera(camera_id).await?;
    Ok(Json(state.cameras.status(camera_id).await?))
}

pub async fn release(
    State(state): State<Arc<AppState>>,
    Path(camera_id): Path<CameraId>,
) -> Result<Json<CameraStatus>, AppError> {
    state.cameras.release_camera(camera_id).await?;
    state.notify(format!(
        "{} camera {camera_id} released from web",
        state.config.app_name
    ));
    Ok(Json(state.cameras.status(camera_id).await?))
}

pub async fn frame(
    State(state): State<Arc<AppState>>,
    Path(camera_id): Path<CameraId>,
) -> Result<Response, AppError> {
    let Some(frame) = state.cameras.latest_frame(camera_id).await? else {
        return Err(AppError::new(
            StatusCode::CONFLICT,
            format!("camera {camera_id} has no frame cached; it is not streaming"),
        ));
    };

    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("image/jpeg"));
    headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-store"));
    Ok((StatusCode::OK, headers, frame).into_response())
}

pub async fn fullscreen(
    State(state): State<Arc<AppState>>,
    Path(camera_id): Path<CameraId>,
) -> Result<Json<UrlResponse>, AppError> {
    let url = state.cameras.fullscreen_url(camera_id).await?;
    Ok(Json(UrlResponse { url }))
}

pub async fn close_fullscreen(State(state): State<Arc<AppState>>) -> Json<BatchReport> {
    Json(state.cameras.close_fullscreen().await)
}

pub async fn toggle_recording(
    State(state): State<Arc<AppState>>,
    Path(camera_id): Path<CameraId>,
) -> Result<Json<RecordingToggle>, AppError> {
    Ok(Json(state.cameras.toggle_recording(camera_id).await?))
}

pub async fn toggle_all_recording(State(state): State<Arc<AppState>>) -> Json<BatchReport> {
    Json(state.cameras.toggle_all_recording().await)
}

pub async fn snapshot(
    State(state): State<Arc<AppState>>,
    Path(camera_id): Path<CameraId>,
    Query(query): Query<SnapshotQuery>,
) -> Result<Json<SnapshotTaken>, AppError> {
    let resolution = query
        .resolution
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty());
    Ok(Json(
        state.cameras.capture_snapshot(camera_id, resolution).await?,
    ))
}

pub async fn snapshot_all(State(state): State<Arc<AppState>>) -> Json<BatchReport> {
    Json(state.cameras.capture_all_snapshots().await)
}

pub async fn files(
    State(state): State<Arc<AppState>>,
    Path(camera_id): Path<CameraId>,
) -> Result<Json<FileListing>, AppError> {
    Ok(Json(state.cameras.list_files(camera_id).await?))
}

pub async fn download_file(
    State(state): State<Arc<AppState>>,
    Path((camera_id, kind, name)): Path<(CameraId, String, String)>,
) -> Result<Redirect, AppError> {
    let (kind, name) = parse_file_ref(&kind, &name)?;
    let url = state.cameras.download_url(camera_id, kind, name)?;
    Ok(Redirect::temporary(&url))
}

pub async fn delete_file(
    State(state): State<Arc<AppState>>,
    Path((camera_id, kind, name)): Path<(CameraId, String, String)>,
) -> Result<StatusCode, AppError> {
    let (kind, name) = parse_file_ref(&kind, &name)?;
    state.cameras.delete_file(camera_id, kind, name).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn backend_cameras(
    State(state): State<Arc<AppState>>,
) -> Result<Json<BTreeMap<CameraId, BackendCameraStatus>>, AppError> {
    let overview = state.cameras.backend_overview().await.map_err(|err| {
        AppError::new(
            StatusCode::BAD_GATEWAY,
            format!("backend camera status failed: {err:#}"),
        )
    })?;
    Ok(Json(overview))
}

fn parse_file_ref<'a>(kind: &str, name: &'a str) -> Result<(FileKind, &'a str), AppError> {
    let kind = kind
        .parse::<FileKind>()
        .map_err(|err| AppError::new(StatusCode::BAD_REQUEST, err.to_string()))?;
    let name = name.trim();
    if name.is_empty() || name.contains(['/', '\\']) || name.contains("..") {
        return Err(AppError::new(
            StatusCode::BAD_REQUEST,
            format!("invalid file name: {name:?}"),
        ));
    }
    Ok((kind, name))
}
