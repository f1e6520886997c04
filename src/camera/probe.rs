use std::{sync::Arc, time::Duration};

use tokio::time::timeout;
use tracing::debug;

use crate::core::state::CameraId;

use super::{models::RecordingStatus, traits::CameraBackend};

/// A camera whose status endpoint answered with a 2xx.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reachable {
    pub status: Option<RecordingStatus>,
}

impl Reachable {
    /// Recording flag, when the body carried one.
    pub fn is_recording(&self) -> Option<bool> {
        self.status.as_ref().map(|status| status.is_recording)
    }
}

/// Best-effort reachability check against the recording status endpoint.
#[derive(Clone)]
pub struct AvailabilityProber {
    backend: Arc<dyn CameraBackend>,
    timeout: Duration,
}

impl AvailabilityProber {
    pub fn new(backend: Arc<dyn CameraBackend>, timeout: Duration) -> Self {
        Self { backend, timeout }
    }

    pub async fn probe(&self, camera_id: CameraId) -> bool {
        self.probe_status(camera_id).await.is_some()
    }

    /// `Some` when the camera answered with a 2xx in time, whatever the body.
    pub async fn probe_status(&self, camera_id: CameraId) -> Option<Reachable> {
        match timeout(self.timeout, self.backend.recording_status(camera_id)).await {
            Ok(Ok(status)) => Some(Reachable { status }),
            Ok(Err(err)) => {
                debug!(camera_id, "availability probe failed: {err:#}");
                None
            }
            Err(_) => {
                debug!(camera_id, timeout = ?self.timeout, "availability probe timed out");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use crate::camera::testing::{MockBackend, ProbeReply};

    use super::AvailabilityProber;

    #[tokio::test(start_paused = true)]
    async fn maps_errors_and_timeouts_to_false() {
        let backend = Arc::new(MockBackend::new());
        let prober = AvailabilityProber::new(backend.clone(), Duration::from_secs(5));

        backend.set_probe(1, ProbeReply::Up { recording: true });
        let reached = prober.probe_status(1).await.expect("camera 1 answers");
        assert_eq!(reached.is_recording(), Some(true));

        backend.set_probe(1, ProbeReply::Answering);
        let reached = prober.probe_status(1).await.expect("any 2xx counts");
        assert_eq!(reached.is_recording(), None);

        backend.set_probe(1, ProbeReply::Down);
        assert!(!prober.probe(1).await);

        backend.set_probe(1, ProbeReply::Slow(Duration::from_secs(30)));
        assert!(!prober.probe(1).await);
    }
}
