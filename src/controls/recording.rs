use serde::Serialize;
use tracing::{debug, info};

use crate::{
    camera::{probe::Reachable, service::CameraService},
    core::{
        errors::CameraError,
        events::Notice,
        state::{CameraId, CameraPatch},
    },
};

use super::BatchReport;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum RecordingToggle {
    Started { filename: String },
    Stopped { file_count: Option<u32> },
}

impl CameraService {
    /// Stops the recording if one runs, starts one otherwise.
    pub async fn toggle_recording(
        &self,
        camera_id: CameraId,
    ) -> Result<RecordingToggle, CameraError> {
        let recording = self.status(camera_id).await?.recording;

        let (toggle, message) = if recording {
            let stopped = self
                .backend()
                .stop_recording(camera_id)
                .await
                .map_err(|err| self.action_failed(camera_id, "stop recording", err))?;
            (
                RecordingToggle::Stopped {
                    file_count: stopped.file_count,
                },
                format!("camera {camera_id} recording stopped"),
            )
        } else {
            let started = self
                .backend()
                .start_recording(camera_id)
                .await
                .map_err(|err| self.action_failed(camera_id, "start recording", err))?;
            let message = format!(
                "camera {camera_id} recording started: {}",
                started.filename
            );
            (
                RecordingToggle::Started {
                    filename: started.filename,
                },
                message,
            )
        };

        self.registry()
            .set(camera_id, CameraPatch::default().recording(!recording))
            .await?;
        info!(camera_id, ?toggle, "recording toggled");
        self.events().notice(Notice::success(Some(camera_id), message));
        Ok(toggle)
    }

    /// Stops every recording camera if any records, otherwise starts all
    /// available ones.
    pub async fn toggle_all_recording(&self) -> BatchReport {
        let statuses = self.statuses().await;
        let stop = statuses.iter().any(|status| status.recording);
        let action = if stop { "stop recording" } else { "start recording" };
        let targets = statuses
            .iter()
            .filter(|status| status.available && status.recording == stop)
            .map(|status| status.camera_id)
            .collect();

        self.events()
            .notice(Notice::info(None, format!("{action} on all cameras...")));
        let report = self
            .fan_out(action, targets, |service, camera_id| async move {
                service.toggle_recording(camera_id).await
            })
            .await;

        if report.succeeded > 0 {
            self.events().notice(Notice::success(
                None,
                format!("{action} done on {} cameras", report.succeeded),
            ));
        } else {
            self.events()
                .notice(Notice::error(None, format!("{action} failed")));
        }
        report
    }

    /// Mirrors the backend's recording flag for every camera that answers.
    pub async fn sync_recording_status(&self) {
        for camera_id in self.camera_ids().iter().copied() {
            let probed = self.prober().probe_status(camera_id).await;
            let Some(recording) = probed.as_ref().and_then(Reachable::is_recording) else {
                debug!(camera_id, "recording status unavailable");
                continue;
            };
            let patch = CameraPatch::default().recording(recording);
            if let Err(err) = self.registry().set(camera_id, patch).await {
                debug!(camera_id, "recording sync skipped: {err}");
            }
        }
    }
}
