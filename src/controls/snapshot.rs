use tracing::info;

use crate::{
    camera::{models::SnapshotTaken, service::CameraService},
    core::{errors::CameraError, events::Notice, state::CameraId},
};

use super::BatchReport;

impl CameraService {
    /// Asks the backend to save a still. Only a streaming camera can be captured.
    pub async fn capture_snapshot(
        &self,
        camera_id: CameraId,
        resolution: Option<String>,
    ) -> Result<SnapshotTaken, CameraError> {
        if !self.status(camera_id).await?.streaming {
            return Err(self.not_streaming(camera_id));
        }

        let taken = self
            .backend()
            .capture_snapshot(camera_id, resolution.as_deref())
            .await
            .map_err(|err| self.action_failed(camera_id, "snapshot", err))?;

        info!(camera_id, filename = %taken.filename, "snapshot saved");
        self.events().notice(Notice::success(
            Some(camera_id),
            format!("camera {camera_id} snapshot saved: {}", taken.filename),
        ));
        Ok(taken)
    }

    /// Snapshots every streaming camera at once; idle cameras are skipped.
    pub async fn capture_all_snapshots(&self) -> BatchReport {
        let targets = self
            .statuses()
            .await
            .into_iter()
            .filter(|status| status.streaming)
            .map(|status| status.camera_id)
            .collect();

        self.events()
            .notice(Notice::info(None, "taking snapshots on all cameras..."));
        let report = self
            .fan_out("snapshot", targets, |service, camera_id| async move {
                service.capture_snapshot(camera_id, None).await
            })
            .await;

        if report.succeeded > 0 {
            self.events().notice(Notice::success(
                None,
                format!("snapshots done on {} cameras", report.succeeded),
            ));
        } else {
            self.events().notice(Notice::error(None, "snapshot failed"));
        }
        report
    }
}
