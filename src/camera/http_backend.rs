use std::{
    collections::BTreeMap,
    sync::atomic::{AtomicU64, Ordering},
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Client, Response, Url};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::core::state::CameraId;

use super::{
    models::{
        ApiResponse, BackendCameraStatus, FileKind, RecordedFile, RecordingStarted,
        RecordingStatus, RecordingStopped, SnapshotTaken, StreamQuality,
    },
    traits::{CameraBackend, PreviewSource},
};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// reqwest client for the CCTV backend's REST API and MJPEG feeds.
#[derive(Debug)]
pub struct HttpBackend {
    client: Client,
    base_url: String,
    base: Url,
    request_timeout: Duration,
    last_cache_buster: AtomicU64,
}

impl HttpBackend {
    pub fn new(base_url: impl Into<String>, request_timeout: Duration) -> Result<Self> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        let base = Url::parse(&base_url)
            .with_context(|| format!("invalid backend url {base_url:?}"))?;
        if base.cannot_be_a_base() {
            bail!("backend url {base_url:?} cannot carry a path");
        }
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .context("failed to build backend http client")?;

        Ok(Self {
            client,
            base_url,
            base,
            request_timeout,
            last_cache_buster: AtomicU64::new(0),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Millisecond timestamp, strictly increasing across calls.
    fn cache_buster(&self) -> u64 {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_millis() as u64)
            .unwrap_or_default();
        let previous = self
            .last_cache_buster
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
                Some(now.max(last + 1))
            })
            .unwrap_or(now);
        now.max(previous + 1)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.url(path);
        let response = self
            .client
            .get(&url)
            .timeout(self.request_timeout)
            .send()
            .await
            .with_context(|| format!("GET {url} failed"))?;
        let response = ensure_success(response).await?;
        response
            .json()
            .await
            .with_context(|| format!("GET {url} returned an unexpected body"))
    }

    async fn post(&self, path: &str, query: &[(&str, &str)]) -> Result<Response> {
        let url = self.url(path);
        let response = self
            .client
            .post(&url)
            .query(query)
            .timeout(self.request_timeout)
            .send()
            .await
            .with_context(|| format!("POST {url} failed"))?;
        ensure_success(response).await
    }

    async fn post_data<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<Option<T>> {
        let response = self.post(path, query).await?;
        let body: ApiResponse<T> = response
            .json()
            .await
            .with_context(|| format!("POST {path} returned an unexpected body"))?;
        if body.success == Some(false) {
            bail!(
                "backend rejected POST {path}: {}",
                body.message.unwrap_or_default()
            );
        }
        Ok(body.data)
    }
}

async fn ensure_success(response: Response) -> Result<Response> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    bail!("backend error status={status} body={body}");
}

struct HttpPreview {
    response: Response,
}

#[async_trait]
impl PreviewSource for HttpPreview {
    async fn next_chunk(&mut self) -> Result<Option<Bytes>> {
        self.response
            .chunk()
            .await
            .context("preview stream read failed")
    }
}

#[async_trait]
impl CameraBackend for HttpBackend {
    async fn recording_status(&self, camera_id: CameraId) -> Result<Option<RecordingStatus>> {
        let url = self.url(&format!("/api/recording/status/{camera_id}"));
        let response = self
            .client
            .get(&url)
            .timeout(self.request_timeout)
            .send()
            .await
            .with_context(|| format!("GET {url} failed"))?;
        let response = ensure_success(response).await?;
        match response.json().await {
            Ok(status) => Ok(Some(status)),
            Err(err) => {
                debug!(camera_id, "recording status body not understood: {err}");
                Ok(None)
            }
        }
    }

    fn preview_url(&self, camera_id: CameraId, quality: StreamQuality) -> String {
        format!(
            "{}/{}/{camera_id}?t={}",
            self.base_url,
            quality.feed_path(),
            self.cache_buster()
        )
    }

    async fn open_preview(
        &self,
        camera_id: CameraId,
        quality: StreamQuality,
    ) -> Result<Box<dyn PreviewSource>> {
        let url = self.preview_url(camera_id, quality);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("failed to open preview {url}"))?;
        let response = ensure_success(response).await?;
        Ok(Box::new(HttpPreview { response }))
    }

    async fn camera_overview(&self) -> Result<BTreeMap<CameraId, BackendCameraStatus>> {
        let raw: BTreeMap<String, BackendCameraStatus> = self.get_json("/api/camera/status").await?;
        let mut overview = BTreeMap::new();
        for (key, status) in raw {
            match key.parse::<CameraId>() {
                Ok(camera_id) => {
                    overview.insert(camera_id, status);
                }
                Err(_) => warn!("ignoring camera status entry with key {key:?}"),
            }
        }
        Ok(overview)
    }

    async fn connect_camera(&self, camera_id: CameraId) -> Result<()> {
        self.post(&format!("/api/camera/{camera_id}/connect"), &[])
            .await?;
        Ok(())
    }

    async fn disconnect_camera(&self, camera_id: CameraId) -> Result<()> {
        self.post(&format!("/api/camera/{camera_id}/disconnect"), &[])
            .await?;
        Ok(())
    }

    async fn normal_mode(&self, camera_id: CameraId) -> Result<()> {
        self.post(&format!("/api/camera/{camera_id}/normal_mode"), &[])
            .await?;
        Ok(())
    }

    async fn start_recording(&self, camera_id: CameraId) -> Result<RecordingStarted> {
        self.post_data(&format!("/api/recording/start/{camera_id}"), &[])
            .await?
            .context("recording start response has no data")
    }

    async fn stop_recording(&self, camera_id: CameraId) -> Result<RecordingStopped> {
        let stopped = self
            .post_data(&format!("/api/recording/stop/{camera_id}"), &[])
            .await?;
        Ok(stopped.unwrap_or_default())
    }

    async fn capture_snapshot(
        &self,
        camera_id: CameraId,
        resolution: Option<&str>,
    ) -> Result<SnapshotTaken> {
        let query: Vec<(&str, &str)> = resolution
            .map(|value| vec![("resolution", value)])
            .unwrap_or_default();
        self.post_data(&format!("/api/snapshot/{camera_id}"), &query)
            .await?
            .context("snapshot response has no data")
    }

    async fn list_files(&self, camera_id: CameraId) -> Result<Vec<RecordedFile>> {
        self.get_json(&format!("/api/files/{camera_id}")).await
    }

    fn file_url(&self, camera_id: CameraId, kind: FileKind, filename: &str) -> String {
        let camera = camera_id.to_string();
        let mut url = self.base.clone();
        // Checked in `new`: the base always accepts path segments.
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().extend([
                "api",
                "files",
                camera.as_str(),
                kind.path_segment(),
                filename,
            ]);
        }
        url.into()
    }

    async fn delete_file(
        &self,
        camera_id: CameraId,
        kind: FileKind,
        filename: &str,
    ) -> Result<()> {
        let url = self.file_url(camera_id, kind, filename);
        let response = self
            .client
            .delete(&url)
            .timeout(self.request_timeout)
            .send()
            .await
            .with_context(|| format!("DELETE {url} failed"))?;
        ensure_success(response).await?;
        Ok(())
    }
}
