use std::collections::BTreeMap;

use anyhow::Result;
use tracing::info;

use crate::{
    camera::{
        models::{BackendCameraStatus, StreamQuality},
        service::CameraService,
    },
    core::{errors::CameraError, events::Notice, state::CameraId},
};

use super::BatchReport;

impl CameraService {
    /// HD preview URL for a streaming camera.
    pub async fn fullscreen_url(&self, camera_id: CameraId) -> Result<String, CameraError> {
        if !self.status(camera_id).await?.streaming {
            return Err(self.not_streaming(camera_id));
        }
        info!(camera_id, "fullscreen preview requested");
        Ok(self.backend().preview_url(camera_id, StreamQuality::Hd))
    }

    /// Puts every camera back into normal preview mode.
    pub async fn close_fullscreen(&self) -> BatchReport {
        let targets = self.camera_ids().to_vec();
        let report = self
            .fan_out("normal mode", targets, |service, camera_id| async move {
                service
                    .backend()
                    .normal_mode(camera_id)
                    .await
                    .map_err(|err| service.action_failed(camera_id, "normal mode", err))
            })
            .await;
        self.events()
            .notice(Notice::info(None, "normal preview mode restored"));
        report
    }

    /// Opens the camera on the backend, then retries it with a fresh budget.
    pub async fn attach_camera(&self, camera_id: CameraId) -> Result<(), CameraError> {
        self.ensure_known(camera_id)?;
        self.backend()
            .connect_camera(camera_id)
            .await
            .map_err(|err| self.action_failed(camera_id, "connect", err))?;
        info!(camera_id, "camera attached on backend");
        self.retry_stream(camera_id).await
    }

    /// Closes the camera on the backend and parks it locally: no preview,
    /// no pending retry, and the health monitor leaves it alone.
    pub async fn release_camera(&self, camera_id: CameraId) -> Result<(), CameraError> {
        self.ensure_known(camera_id)?;
        self.backend()
            .disconnect_camera(camera_id)
            .await
            .map_err(|err| self.action_failed(camera_id, "disconnect", err))?;

        self.registry()
            .update(camera_id, |state| {
                state.cancel_pending_retry();
                state.close_preview();
                // Supersede any attempt still in flight.
                state.generation += 1;
                state.connecting = false;
                state.streaming = false;
                state.held = true;
            })
            .await?;

        info!(camera_id, "camera released on backend");
        self.events().notice(Notice::info(
            Some(camera_id),
            format!("camera {camera_id} released"),
        ));
        Ok(())
    }

    pub async fn backend_overview(&self) -> Result<BTreeMap<CameraId, BackendCameraStatus>> {
        self.backend().camera_overview().await
    }
}
