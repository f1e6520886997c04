use std::collections::BTreeMap;

use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;

use crate::core::state::CameraId;

use super::models::{
    BackendCameraStatus, FileKind, RecordedFile, RecordingStarted, RecordingStatus,
    RecordingStopped, SnapshotTaken, StreamQuality,
};

/// Body of a live preview, read chunk by chunk. `None` marks the end of the stream.
#[async_trait]
pub trait PreviewSource: Send {
    async fn next_chunk(&mut self) -> Result<Option<Bytes>>;
}

/// The CCTV backend as seen by the controller.
#[async_trait]
pub trait CameraBackend: Send + Sync {
    /// Errors only when the endpoint does not answer with a 2xx. The decoded
    /// body is `None` when it does not carry a recording status.
    async fn recording_status(&self, camera_id: CameraId) -> Result<Option<RecordingStatus>>;

    /// Cache-busted preview URL, unique per call.
    fn preview_url(&self, camera_id: CameraId, quality: StreamQuality) -> String;
    async fn open_preview(
        &self,
        camera_id: CameraId,
        quality: StreamQuality,
    ) -> Result<Box<dyn PreviewSource>>;

    async fn camera_overview(&self) -> Result<BTreeMap<CameraId, BackendCameraStatus>>;
    async fn connect_camera(&self, camera_id: CameraId) -> Result<()>;
    async fn disconnect_camera(&self, camera_id: CameraId) -> Result<()>;
    async fn normal_mode(&self, camera_id: CameraId) -> Result<()>;

    async fn start_recording(&self, camera_id: CameraId) -> Result<RecordingStarted>;
    async fn stop_recording(&self, camera_id: CameraId) -> Result<RecordingStopped>;
    async fn capture_snapshot(
        &self,
        camera_id: CameraId,
        resolution: Option<&str>,
    ) -> Result<SnapshotTaken>;

    async fn list_files(&self, camera_id: CameraId) -> Result<Vec<RecordedFile>>;
    fn file_url(&self, camera_id: CameraId, kind: FileKind, filename: &str) -> String;
    async fn delete_file(&self, camera_id: CameraId, kind: FileKind, filename: &str)
    -> Result<()>;
}
