//! Scriptable backend used by the controller tests.

use std::{
    collections::{BTreeMap, HashMap, VecDeque},
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    time::Duration,
};

use anyhow::{Result, bail};
use async_trait::async_trait;
use bytes::Bytes;

use crate::core::{events::EventBus, state::CameraId};

use super::{
    models::{
        BackendCameraStatus, FileKind, RecordedFile, RecordingStarted, RecordingStatus,
        RecordingStopped, SnapshotTaken, StreamQuality,
    },
    service::{CameraService, ReconnectPolicy},
    traits::{CameraBackend, PreviewSource},
};

#[derive(Debug, Clone, Copy)]
pub enum ProbeReply {
    Up { recording: bool },
    /// 2xx with a body that carries no recording status.
    Answering,
    Down,
    Slow(Duration),
}

#[derive(Debug, Clone, Copy)]
pub enum PreviewPlan {
    /// One frame, then the stream stays open.
    Frame,
    /// One frame, then the stream ends.
    FrameThenEnd,
    /// Headers only, no frame ever arrives.
    Hang,
    /// The feed endpoint answers with an error.
    Refuse,
    /// One frame after the delay, then the stream stays open.
    Delayed(Duration),
}

pub fn fake_frame() -> Bytes {
    Bytes::from_static(&[0xFF, 0xD8, 0x10, 0x20, 0xFF, 0xD9])
}

enum Tail {
    End,
    Hang,
}

struct ScriptedPreview {
    delay: Option<Duration>,
    chunks: VecDeque<Bytes>,
    tail: Tail,
}

#[async_trait]
impl PreviewSource for ScriptedPreview {
    async fn next_chunk(&mut self) -> Result<Option<Bytes>> {
        if let Some(delay) = self.delay.take() {
            tokio::time::sleep(delay).await;
        }
        if let Some(chunk) = self.chunks.pop_front() {
            return Ok(Some(chunk));
        }
        match self.tail {
            Tail::End => Ok(None),
            Tail::Hang => std::future::pending().await,
        }
    }
}

pub struct MockBackend {
    probes: Mutex<HashMap<CameraId, ProbeReply>>,
    previews: Mutex<HashMap<CameraId, PreviewPlan>>,
    preview_opens: Mutex<HashMap<CameraId, usize>>,
    calls: Mutex<Vec<String>>,
    files: Mutex<Vec<RecordedFile>>,
    fail_actions: AtomicBool,
    urls: AtomicU64,
}

impl MockBackend {
    pub fn new() -> Self {
        Self {
            probes: Mutex::new(HashMap::new()),
            previews: Mutex::new(HashMap::new()),
            preview_opens: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            files: Mutex::new(Vec::new()),
            fail_actions: AtomicBool::new(false),
            urls: AtomicU64::new(0),
        }
    }

    pub fn set_probe(&self, camera_id: CameraId, reply: ProbeReply) {
        self.probes
            .lock()
            .expect("probe lock")
            .insert(camera_id, reply);
    }

    pub fn set_preview(&self, camera_id: CameraId, plan: PreviewPlan) {
        self.previews
            .lock()
            .expect("preview lock")
            .insert(camera_id, plan);
    }

    /// Camera answers probes and delivers frames.
    pub fn bring_up(&self, camera_id: CameraId) {
        self.set_probe(camera_id, ProbeReply::Up { recording: false });
        self.set_preview(camera_id, PreviewPlan::Frame);
    }

    pub fn preview_opens(&self, camera_id: CameraId) -> usize {
        self.preview_opens
            .lock()
            .expect("opens lock")
            .get(&camera_id)
            .copied()
            .unwrap_or(0)
    }

    pub fn fail_actions(&self, fail: bool) {
        self.fail_actions.store(fail, Ordering::SeqCst);
    }

    pub fn set_files(&self, files: Vec<RecordedFile>) {
        *self.files.lock().expect("files lock") = files;
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().expect("calls lock").clone()
    }

    fn action(&self, call: String) -> Result<()> {
        self.calls.lock().expect("calls lock").push(call.clone());
        if self.fail_actions.load(Ordering::SeqCst) {
            bail!("backend error status=500 Internal Server Error body={call}");
        }
        Ok(())
    }
}

#[async_trait]
impl CameraBackend for MockBackend {
    async fn recording_status(&self, camera_id: CameraId) -> Result<Option<RecordingStatus>> {
        let reply = self
            .probes
            .lock()
            .expect("probe lock")
            .get(&camera_id)
            .copied()
            .unwrap_or(ProbeReply::Down);
        match reply {
            ProbeReply::Up { recording } => Ok(Some(RecordingStatus {
                is_recording: recording,
                start_time: None,
                duration: None,
            })),
            ProbeReply::Answering => Ok(None),
            ProbeReply::Down => bail!("backend error status=503 Service Unavailable"),
            ProbeReply::Slow(delay) => {
                tokio::time::sleep(delay).await;
                Ok(Some(RecordingStatus {
                    is_recording: false,
                    start_time: None,
                    duration: None,
                }))
            }
        }
    }

    fn preview_url(&self, camera_id: CameraId, quality: StreamQuality) -> String {
        let nonce = self.urls.fetch_add(1, Ordering::SeqCst);
        format!("http://mock/{}/{camera_id}?t={nonce}", quality.feed_path())
    }

    async fn open_preview(
        &self,
        camera_id: CameraId,
        _quality: StreamQuality,
    ) -> Result<Box<dyn PreviewSource>> {
        *self
            .preview_opens
            .lock()
            .expect("opens lock")
            .entry(camera_id)
            .or_default() += 1;
        let plan = self
            .previews
            .lock()
            .expect("preview lock")
            .get(&camera_id)
            .copied()
            .unwrap_or(PreviewPlan::Frame);

        let preview = match plan {
            PreviewPlan::Frame => ScriptedPreview {
                delay: None,
                chunks: VecDeque::from([fake_frame()]),
                tail: Tail::Hang,
            },
            PreviewPlan::FrameThenEnd => ScriptedPreview {
                delay: None,
                chunks: VecDeque::from([fake_frame()]),
                tail: Tail::End,
            },
            PreviewPlan::Hang => ScriptedPreview {
                delay: None,
                chunks: VecDeque::from([Bytes::from_static(b"--frame\r\n")]),
                tail: Tail::Hang,
            },
            PreviewPlan::Refuse => bail!("backend error status=503 camera {camera_id} not available"),
            PreviewPlan::Delayed(delay) => ScriptedPreview {
                delay: Some(delay),
                chunks: VecDeque::from([fake_frame()]),
                tail: Tail::Hang,
            },
        };
        Ok(Box::new(preview))
    }

    async fn camera_overview(&self) -> Result<BTreeMap<CameraId, BackendCameraStatus>> {
        self.action("camera_overview".to_string())?;
        let probes = self.probes.lock().expect("probe lock");
        Ok(probes
            .iter()
            .map(|(camera_id, reply)| {
                let available = matches!(reply, ProbeReply::Up { .. } | ProbeReply::Answering);
                (
                    *camera_id,
                    BackendCameraStatus {
                        available,
                        fps: available.then_some(25.0),
                    },
                )
            })
            .collect())
    }

    async fn connect_camera(&self, camera_id: CameraId) -> Result<()> {
        self.action(format!("connect:{camera_id}"))
    }

    async fn disconnect_camera(&self, camera_id: CameraId) -> Result<()> {
        self.action(format!("disconnect:{camera_id}"))
    }

    async fn normal_mode(&self, camera_id: CameraId) -> Result<()> {
        self.action(format!("normal_mode:{camera_id}"))
    }

    async fn start_recording(&self, camera_id: CameraId) -> Result<RecordingStarted> {
        self.action(format!("start_recording:{camera_id}"))?;
        Ok(RecordingStarted {
            filename: format!("camera{camera_id}_0001.mp4"),
        })
    }

    async fn stop_recording(&self, camera_id: CameraId) -> Result<RecordingStopped> {
        self.action(format!("stop_recording:{camera_id}"))?;
        Ok(RecordingStopped {
            file_count: Some(3),
        })
    }

    async fn capture_snapshot(
        &self,
        camera_id: CameraId,
        resolution: Option<&str>,
    ) -> Result<SnapshotTaken> {
        let resolution = resolution.unwrap_or("default");
        self.action(format!("snapshot:{camera_id}:{resolution}"))?;
        Ok(SnapshotTaken {
            filename: format!("camera{camera_id}_{resolution}.jpg"),
        })
    }

    async fn list_files(&self, camera_id: CameraId) -> Result<Vec<RecordedFile>> {
        self.action(format!("list_files:{camera_id}"))?;
        Ok(self.files.lock().expect("files lock").clone())
    }

    fn file_url(&self, camera_id: CameraId, kind: FileKind, filename: &str) -> String {
        format!(
            "http://mock/api/files/{camera_id}/{}/{filename}",
            kind.path_segment()
        )
    }

    async fn delete_file(
        &self,
        camera_id: CameraId,
        kind: FileKind,
        filename: &str,
    ) -> Result<()> {
        self.action(format!(
            "delete:{camera_id}:{}:{filename}",
            kind.path_segment()
        ))
    }
}

pub fn test_policy() -> ReconnectPolicy {
    ReconnectPolicy {
        max_retries: 5,
        base_delay: Duration::from_millis(1000),
        health_interval: Duration::from_millis(10_000),
        stream_timeout: Duration::from_millis(5000),
        probe_timeout: Duration::from_millis(5000),
        init_stagger: Duration::ZERO,
    }
}

pub fn test_service(backend: Arc<MockBackend>, camera_ids: &[CameraId]) -> CameraService {
    CameraService::new(
        backend,
        camera_ids.iter().copied(),
        test_policy(),
        EventBus::new(),
    )
}

/// Lets spawned tasks run up to their next real suspension point.
pub async fn settle() {
    for _ in 0..64 {
        tokio::task::yield_now().await;
    }
}
