//! Operator actions on top of the connection core. None of them retries on
//! its own; a failure becomes an error notice and leaves camera state as it was.

pub mod files;
pub mod lifecycle;
pub mod recording;
pub mod snapshot;

use serde::Serialize;
use tokio::task::JoinSet;
use tracing::{error, warn};

use crate::{
    camera::service::CameraService,
    core::{
        errors::CameraError,
        events::Notice,
        state::CameraId,
    },
};

/// Outcome of an action fanned out over several cameras.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    pub action: &'static str,
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: Vec<CameraId>,
}

impl CameraService {
    fn action_failed(
        &self,
        camera_id: CameraId,
        action: &'static str,
        err: anyhow::Error,
    ) -> CameraError {
        let err = CameraError::request_failed(camera_id, action, err);
        warn!(camera_id, "{err}");
        self.events()
            .notice(Notice::error(Some(camera_id), format!("camera {camera_id} {action} failed")));
        err
    }

    fn not_streaming(&self, camera_id: CameraId) -> CameraError {
        self.events().notice(Notice::error(
            Some(camera_id),
            format!("camera {camera_id} is not streaming"),
        ));
        CameraError::NotStreaming { camera_id }
    }

    /// Runs `run` for every target concurrently and tallies the results.
    async fn fan_out<F, Fut, T>(&self, action: &'static str, targets: Vec<CameraId>, run: F) -> BatchReport
    where
        F: Fn(CameraService, CameraId) -> Fut,
        Fut: Future<Output = Result<T, CameraError>> + Send + 'static,
        T: Send + 'static,
    {
        let mut tasks = JoinSet::new();
        for camera_id in targets.iter().copied() {
            let task = run(self.clone(), camera_id);
            tasks.spawn(async move { (camera_id, task.await) });
        }

        let mut report = BatchReport {
            action,
            attempted: targets.len(),
            succeeded: 0,
            failed: Vec::new(),
        };
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((_, Ok(_))) => report.succeeded += 1,
                Ok((camera_id, Err(_))) => report.failed.push(camera_id),
                Err(err) => error!("{action} task failed: {err}"),
            }
        }
        report.failed.sort_unstable();
        report
    }
}
