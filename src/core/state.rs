use std::time::Duration;

use bytes::Bytes;
use serde::Serialize;
use tokio::{sync::watch, task::AbortHandle};

pub type CameraId = u32;

/// A scheduled reconnect attempt. Dropping it does not cancel the timer, call
/// [`PendingRetry::cancel`].
#[derive(Debug)]
pub struct PendingRetry {
    pub token: u64,
    pub delay: Duration,
    handle: AbortHandle,
}

impl PendingRetry {
    pub fn new(token: u64, delay: Duration, handle: AbortHandle) -> Self {
        Self {
            token,
            delay,
            handle,
        }
    }

    pub fn cancel(self) {
        self.handle.abort();
    }
}

/// Handle on a running preview pump.
#[derive(Debug)]
pub struct PreviewSession {
    cancel_tx: watch::Sender<bool>,
    frames: watch::Receiver<Option<Bytes>>,
}

impl PreviewSession {
    pub fn new(cancel_tx: watch::Sender<bool>, frames: watch::Receiver<Option<Bytes>>) -> Self {
        Self { cancel_tx, frames }
    }

    pub fn latest_frame(&self) -> Option<Bytes> {
        self.frames.borrow().clone()
    }

    pub fn close(self) {
        let _ = self.cancel_tx.send(true);
    }
}

/// Live per-camera record owned by the registry.
#[derive(Debug, Default)]
pub struct CameraState {
    pub available: bool,
    pub streaming: bool,
    pub recording: bool,
    pub last_error: Option<String>,
    pub retry_count: u32,
    pub pending_retry: Option<PendingRetry>,
    /// Bumped by every connect attempt; completions from older generations are dropped.
    pub generation: u64,
    pub connecting: bool,
    /// Terminal notice already produced for the current failure streak.
    pub exhausted: bool,
    /// Released on the backend by the operator; health checks skip it.
    pub held: bool,
    pub preview: Option<PreviewSession>,
    retry_tokens: u64,
}

impl CameraState {
    pub fn begin_attempt(&mut self) -> u64 {
        self.generation += 1;
        self.connecting = true;
        self.generation
    }

    pub fn next_retry_token(&mut self) -> u64 {
        self.retry_tokens += 1;
        self.retry_tokens
    }

    pub fn cancel_pending_retry(&mut self) -> bool {
        match self.pending_retry.take() {
            Some(pending) => {
                pending.cancel();
                true
            }
            None => false,
        }
    }

    pub fn close_preview(&mut self) {
        if let Some(session) = self.preview.take() {
            session.close();
        }
    }

    pub fn record_success(&mut self, session: PreviewSession) {
        self.close_preview();
        self.cancel_pending_retry();
        self.preview = Some(session);
        self.available = true;
        self.streaming = true;
        self.connecting = false;
        self.last_error = None;
        self.retry_count = 0;
        self.exhausted = false;
        self.held = false;
    }

    pub fn record_failure(&mut self, reason: String) {
        self.close_preview();
        self.streaming = false;
        self.connecting = false;
        self.last_error = Some(reason);
        self.retry_count = self.retry_count.saturating_add(1);
    }

    pub fn reset_retries(&mut self) {
        self.cancel_pending_retry();
        self.retry_count = 0;
        self.exhausted = false;
        self.held = false;
    }

    pub fn status(&self, camera_id: CameraId) -> CameraStatus {
        let link = if self.streaming {
            CameraLink::Online
        } else if self.retry_count > 0 {
            CameraLink::Reconnecting
        } else {
            CameraLink::Offline
        };

        CameraStatus {
            camera_id,
            available: self.available,
            streaming: self.streaming,
            recording: self.recording,
            last_error: self.last_error.clone(),
            retry_count: self.retry_count,
            retry_pending: self.pending_retry.is_some(),
            pending_retry_delay_ms: self
                .pending_retry
                .as_ref()
                .map(|pending| pending.delay.as_millis() as u64),
            connecting: self.connecting,
            on_hold: self.held,
            link,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CameraLink {
    Online,
    Reconnecting,
    Offline,
}

/// Serializable snapshot of a [`CameraState`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CameraStatus {
    pub camera_id: CameraId,
    pub available: bool,
    pub streaming: bool,
    pub recording: bool,
    pub last_error: Option<String>,
    pub retry_count: u32,
    pub retry_pending: bool,
    pub pending_retry_delay_ms: Option<u64>,
    pub connecting: bool,
    pub on_hold: bool,
    pub link: CameraLink,
}

/// Partial update of the informational fields. `streaming` and the retry
/// bookkeeping are owned by the connector and the scheduler.
#[derive(Debug, Clone, Default)]
pub struct CameraPatch {
    pub available: Option<bool>,
    pub recording: Option<bool>,
    pub last_error: Option<Option<String>>,
}

impl CameraPatch {
    pub fn available(mut self, available: bool) -> Self {
        self.available = Some(available);
        self
    }

    pub fn recording(mut self, recording: bool) -> Self {
        self.recording = Some(recording);
        self
    }

    pub fn last_error(mut self, last_error: Option<String>) -> Self {
        self.last_error = Some(last_error);
        self
    }

    pub fn apply(self, state: &mut CameraState) {
        if let Some(available) = self.available {
            state.available = available;
        }
        if let Some(recording) = self.recording {
            state.recording = recording;
        }
        if let Some(last_error) = self.last_error {
            state.last_error = last_error;
        }
    }
}
