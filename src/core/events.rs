use serde::Serialize;
use tokio::sync::broadcast;

use crate::camera::aggregate::ConnectionSummary;

use super::state::{CameraId, CameraStatus};

const EVENT_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeLevel {
    Info,
    Success,
    Error,
}

/// User-facing message, the toast of a UI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub level: NoticeLevel,
    pub camera_id: Option<CameraId>,
    pub message: String,
}

impl Notice {
    pub fn info(camera_id: Option<CameraId>, message: impl Into<String>) -> Self {
        Self::new(NoticeLevel::Info, camera_id, message)
    }

    pub fn success(camera_id: Option<CameraId>, message: impl Into<String>) -> Self {
        Self::new(NoticeLevel::Success, camera_id, message)
    }

    pub fn error(camera_id: Option<CameraId>, message: impl Into<String>) -> Self {
        Self::new(NoticeLevel::Error, camera_id, message)
    }

    fn new(level: NoticeLevel, camera_id: Option<CameraId>, message: impl Into<String>) -> Self {
        Self {
            level,
            camera_id,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControllerEvent {
    Camera(CameraStatus),
    Connection(ConnectionSummary),
    RetriesExhausted { camera_id: CameraId, attempts: u32 },
    Notice(Notice),
}

/// Fan-out of controller events. Publishing never fails; events sent while
/// nobody listens are dropped.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<ControllerEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ControllerEvent> {
        self.tx.subscribe()
    }

    pub fn publish(&self, event: ControllerEvent) {
        let _ = self.tx.send(event);
    }

    pub fn notice(&self, notice: Notice) {
        self.publish(ControllerEvent::Notice(notice));
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
