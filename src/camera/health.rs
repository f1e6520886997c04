use std::{collections::BTreeMap, time::Duration};

use tokio::{
    task::{JoinHandle, JoinSet},
    time::{Instant, MissedTickBehavior, interval_at},
};
use tracing::{debug, error, info, warn};

use crate::core::{
    errors::CameraError,
    state::{CameraId, CameraPatch, CameraStatus},
};

use super::{probe::Reachable, service::CameraService};

const MIN_HEALTH_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthAction {
    InSync,
    Reconnect,
    MarkFailed,
    /// Drift seen but recovery is already owned by someone else, or needs an operator.
    Deferred,
}

/// Decides what to do with a camera given a fresh probe result.
pub fn reconcile(probed: bool, status: &CameraStatus, max_retries: u32) -> HealthAction {
    if status.connecting || status.on_hold {
        return HealthAction::Deferred;
    }
    match (probed, status.streaming) {
        (true, false) if status.retry_pending || status.retry_count >= max_retries => {
            HealthAction::Deferred
        }
        (true, false) => HealthAction::Reconnect,
        (false, true) => HealthAction::MarkFailed,
        _ => HealthAction::InSync,
    }
}

impl CameraService {
    /// Probes one camera, mirrors `available` and `recording`, then repairs drift.
    pub async fn check_camera_health(
        &self,
        camera_id: CameraId,
    ) -> Result<HealthAction, CameraError> {
        let probed = self.prober.probe_status(camera_id).await;
        let mut patch = CameraPatch::default().available(probed.is_some());
        if let Some(recording) = probed.as_ref().and_then(Reachable::is_recording) {
            patch = patch.recording(recording);
        }
        let status = self.registry.set(camera_id, patch).await?;

        let action = reconcile(probed.is_some(), &status, self.policy.max_retries);
        match action {
            HealthAction::InSync => {}
            HealthAction::Reconnect => {
                info!(camera_id, "camera reachable but not streaming, reconnecting");
                if let Err(err) = self.connect(camera_id).await {
                    debug!(camera_id, "health reconnect failed: {err}");
                }
            }
            HealthAction::MarkFailed => {
                self.mark_failure(camera_id, CameraError::Unavailable(camera_id))
                    .await?;
            }
            HealthAction::Deferred => {
                debug!(camera_id, ?status, "health drift left to pending recovery");
            }
        }
        Ok(action)
    }

    /// One pass over every camera. Checks run as separate tasks so a slow or
    /// failing camera never delays the others.
    pub async fn run_health_cycle(&self) -> BTreeMap<CameraId, HealthAction> {
        let mut checks = JoinSet::new();
        for camera_id in self.camera_ids().iter().copied() {
            let service = self.clone();
            checks.spawn(async move { (camera_id, service.check_camera_health(camera_id).await) });
        }

        let mut actions = BTreeMap::new();
        while let Some(joined) = checks.join_next().await {
            match joined {
                Ok((camera_id, Ok(action))) => {
                    actions.insert(camera_id, action);
                }
                Ok((camera_id, Err(err))) => warn!(camera_id, "health check failed: {err}"),
                Err(err) => error!("health check task failed: {err}"),
            }
        }
        actions
    }
}

pub struct HealthMonitor;

impl HealthMonitor {
    /// Runs a health cycle every `health_interval`, first one after a full interval.
    pub fn spawn(service: CameraService) -> JoinHandle<()> {
        tokio::spawn(async move {
            let configured = service.policy().health_interval;
            let period = configured.max(MIN_HEALTH_INTERVAL);
            if period != configured {
                warn!(?configured, ?period, "health interval too short, clamped");
            }
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            info!(interval_ms = period.as_millis() as u64, "health monitor started");

            loop {
                ticker.tick().await;
                let actions = service.run_health_cycle().await;
                debug!(?actions, "health cycle finished");
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use crate::{
        camera::{
            service::{CameraService, ReconnectPolicy},
            testing::{MockBackend, ProbeReply, settle, test_policy, test_service},
        },
        core::{
            events::EventBus,
            state::{CameraPatch, CameraState, CameraStatus},
        },
    };

    use super::{HealthAction, HealthMonitor, reconcile};

    fn idle() -> CameraStatus {
        CameraState::default().status(1)
    }

    #[test]
    fn reconcile_table() {
        let streaming = CameraStatus {
            streaming: true,
            ..idle()
        };
        assert_eq!(reconcile(true, &streaming, 5), HealthAction::InSync);
        assert_eq!(reconcile(false, &streaming, 5), HealthAction::MarkFailed);
        assert_eq!(reconcile(false, &idle(), 5), HealthAction::InSync);
        assert_eq!(reconcile(true, &idle(), 5), HealthAction::Reconnect);

        let pending = CameraStatus {
            retry_count: 2,
            retry_pending: true,
            ..idle()
        };
        assert_eq!(reconcile(true, &pending, 5), HealthAction::Deferred);

        let exhausted = CameraStatus {
            retry_count: 5,
            ..idle()
        };
        assert_eq!(reconcile(true, &exhausted, 5), HealthAction::Deferred);

        let connecting = CameraStatus {
            connecting: true,
            ..idle()
        };
        assert_eq!(reconcile(true, &connecting, 5), HealthAction::Deferred);

        let held = CameraStatus {
            on_hold: true,
            ..idle()
        };
        assert_eq!(reconcile(true, &held, 5), HealthAction::Deferred);
    }

    #[tokio::test(start_paused = true)]
    async fn reachable_idle_camera_is_connected() {
        let backend = Arc::new(MockBackend::new());
        backend.set_probe(1, ProbeReply::Up { recording: true });
        let service = test_service(backend.clone(), &[1]);

        let action = service.check_camera_health(1).await.expect("camera exists");

        assert_eq!(action, HealthAction::Reconnect);
        let status = service.status(1).await.expect("camera exists");
        assert!(status.available);
        assert!(status.streaming);
        assert!(status.recording);
        assert_eq!(status.retry_count, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn opaque_status_body_still_counts_as_reachable() {
        let backend = Arc::new(MockBackend::new());
        backend.bring_up(1);
        backend.set_probe(1, ProbeReply::Answering);
        let service = test_service(backend.clone(), &[1]);
        service
            .registry()
            .set(1, CameraPatch::default().recording(true))
            .await
            .expect("camera exists");

        let action = service.check_camera_health(1).await.expect("camera exists");

        assert_eq!(action, HealthAction::Reconnect);
        let status = service.status(1).await.expect("camera exists");
        assert!(status.available);
        assert!(status.streaming);
        assert!(status.recording, "unknown body leaves the recording mirror alone");
    }

    #[tokio::test(start_paused = true)]
    async fn streaming_camera_that_stops_answering_is_failed() {
        let backend = Arc::new(MockBackend::new());
        backend.bring_up(1);
        let service = test_service(backend.clone(), &[1]);
        service.connect(1).await.expect("camera connects");

        backend.set_probe(1, ProbeReply::Down);
        let action = service.check_camera_health(1).await.expect("camera exists");
        settle().await;

        assert_eq!(action, HealthAction::MarkFailed);
        let status = service.status(1).await.expect("camera exists");
        assert!(!status.available);
        assert!(!status.streaming);
        assert_eq!(status.retry_count, 1);
        assert_eq!(status.pending_retry_delay_ms, Some(1000));
        assert_eq!(service.latest_frame(1).await.expect("camera exists"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn cycle_checks_every_camera() {
        let backend = Arc::new(MockBackend::new());
        backend.bring_up(1);
        backend.set_probe(2, ProbeReply::Slow(Duration::from_secs(30)));
        let service = test_service(backend.clone(), &[1, 2]);

        let actions = service.run_health_cycle().await;

        assert_eq!(actions.get(&1), Some(&HealthAction::Reconnect));
        assert_eq!(actions.get(&2), Some(&HealthAction::InSync));
        assert!(service.status(1).await.expect("camera 1 exists").streaming);
        assert!(!service.status(2).await.expect("camera 2 exists").available);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_interval_monitor_keeps_running() {
        let backend = Arc::new(MockBackend::new());
        backend.set_probe(1, ProbeReply::Down);
        let policy = ReconnectPolicy {
            health_interval: Duration::ZERO,
            ..test_policy()
        };
        let service = CameraService::new(backend.clone(), [1], policy, EventBus::new());
        let monitor = HealthMonitor::spawn(service.clone());

        tokio::time::sleep(Duration::from_millis(50)).await;
        backend.bring_up(1);
        tokio::time::sleep(Duration::from_millis(100)).await;
        settle().await;

        assert!(!monitor.is_finished());
        assert!(service.status(1).await.expect("camera exists").streaming);
        monitor.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn monitor_converges_after_outage() {
        let backend = Arc::new(MockBackend::new());
        backend.set_probe(1, ProbeReply::Down);
        let service = test_service(backend.clone(), &[1]);
        let monitor = HealthMonitor::spawn(service.clone());

        tokio::time::sleep(Duration::from_secs(15)).await;
        let status = service.status(1).await.expect("camera exists");
        assert!(!status.available);
        assert_eq!(status.retry_count, 0);

        backend.bring_up(1);
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(service.status(1).await.expect("camera exists").streaming);

        backend.set_probe(1, ProbeReply::Down);
        tokio::time::sleep(Duration::from_secs(10)).await;
        let status = service.status(1).await.expect("camera exists");
        assert!(!status.streaming);
        assert_eq!(status.retry_count, 3);

        backend.bring_up(1);
        tokio::time::sleep(Duration::from_secs(5)).await;
        settle().await;
        let status = service.status(1).await.expect("camera exists");
        assert!(status.streaming);
        assert_eq!(status.retry_count, 0);

        monitor.abort();
    }
}
