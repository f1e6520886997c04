use std::collections::BTreeMap;

use bytes::Bytes;
use tokio::sync::{Mutex, watch};

use crate::core::{
    errors::CameraError,
    events::{ControllerEvent, EventBus},
    state::{CameraId, CameraPatch, CameraState, CameraStatus},
};

use super::aggregate::ConnectionSummary;

/// Owns every [`CameraState`]. Each update runs inside one lock scope and
/// publishes the changed snapshot plus the recomputed aggregate.
pub struct CameraRegistry {
    camera_ids: Vec<CameraId>,
    cameras: Mutex<BTreeMap<CameraId, CameraState>>,
    summary: watch::Sender<ConnectionSummary>,
    events: EventBus,
}

impl CameraRegistry {
    pub fn new(camera_ids: impl IntoIterator<Item = CameraId>, events: EventBus) -> Self {
        let cameras: BTreeMap<CameraId, CameraState> = camera_ids
            .into_iter()
            .map(|camera_id| (camera_id, CameraState::default()))
            .collect();
        let camera_ids = cameras.keys().copied().collect();
        let (summary, _) = watch::channel(ConnectionSummary::from_streaming(
            cameras.values().map(|state| state.streaming),
        ));

        Self {
            camera_ids,
            cameras: Mutex::new(cameras),
            summary,
            events,
        }
    }

    pub fn camera_ids(&self) -> &[CameraId] {
        &self.camera_ids
    }

    pub fn contains(&self, camera_id: CameraId) -> bool {
        self.camera_ids.contains(&camera_id)
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub async fn get(&self, camera_id: CameraId) -> Result<CameraStatus, CameraError> {
        let cameras = self.cameras.lock().await;
        cameras
            .get(&camera_id)
            .map(|state| state.status(camera_id))
            .ok_or(CameraError::NotFound(camera_id))
    }

    pub async fn set(
        &self,
        camera_id: CameraId,
        patch: CameraPatch,
    ) -> Result<CameraStatus, CameraError> {
        self.update(camera_id, |state| {
            patch.apply(state);
            state.status(camera_id)
        })
        .await
    }

    pub async fn update<R>(
        &self,
        camera_id: CameraId,
        apply: impl FnOnce(&mut CameraState) -> R,
    ) -> Result<R, CameraError> {
        let mut cameras = self.cameras.lock().await;
        let state = cameras
            .get_mut(&camera_id)
            .ok_or(CameraError::NotFound(camera_id))?;

        let before = state.status(camera_id);
        let result = apply(state);
        let after = state.status(camera_id);
        if before != after {
            self.events.publish(ControllerEvent::Camera(after));
        }

        let summary = ConnectionSummary::from_streaming(cameras.values().map(|s| s.streaming));
        let changed = self.summary.send_if_modified(|current| {
            if *current == summary {
                return false;
            }
            *current = summary;
            true
        });
        if changed {
            self.events.publish(ControllerEvent::Connection(summary));
        }

        Ok(result)
    }

    pub async fn snapshot(&self) -> Vec<CameraStatus> {
        let cameras = self.cameras.lock().await;
        cameras
            .iter()
            .map(|(camera_id, state)| state.status(*camera_id))
            .collect()
    }

    pub fn summary(&self) -> ConnectionSummary {
        *self.summary.borrow()
    }

    pub fn watch_summary(&self) -> watch::Receiver<ConnectionSummary> {
        self.summary.subscribe()
    }

    pub async fn latest_frame(&self, camera_id: CameraId) -> Result<Option<Bytes>, CameraError> {
        let cameras = self.cameras.lock().await;
        let state = cameras
            .get(&camera_id)
            .ok_or(CameraError::NotFound(camera_id))?;
        Ok(state.preview.as_ref().and_then(|session| session.latest_frame()))
    }
}
