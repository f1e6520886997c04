use std::{sync::Arc, time::Duration};

use bytes::Bytes;
use tokio::{task::JoinSet, time::sleep};
use tracing::{error, info, warn};

use crate::core::{
    errors::CameraError,
    events::{EventBus, Notice},
    state::{CameraId, CameraStatus},
};

use super::{
    aggregate::ConnectionSummary, probe::AvailabilityProber, registry::CameraRegistry,
    traits::CameraBackend,
};

/// Timing and budget of the connection core.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub health_interval: Duration,
    pub stream_timeout: Duration,
    pub probe_timeout: Duration,
    /// Delay between the start of consecutive cameras at startup.
    pub init_stagger: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            base_delay: Duration::from_millis(1000),
            health_interval: Duration::from_millis(10_000),
            stream_timeout: Duration::from_millis(5000),
            probe_timeout: Duration::from_millis(5000),
            init_stagger: Duration::ZERO,
        }
    }
}

/// Connection controller for every configured camera. Cheap to clone; timers
/// and background tasks hold their own clone.
#[derive(Clone)]
pub struct CameraService {
    pub(super) backend: Arc<dyn CameraBackend>,
    pub(super) registry: Arc<CameraRegistry>,
    pub(super) prober: AvailabilityProber,
    pub(super) policy: ReconnectPolicy,
}

impl CameraService {
    pub fn new(
        backend: Arc<dyn CameraBackend>,
        camera_ids: impl IntoIterator<Item = CameraId>,
        policy: ReconnectPolicy,
        events: EventBus,
    ) -> Self {
        let prober = AvailabilityProber::new(backend.clone(), policy.probe_timeout);
        Self {
            registry: Arc::new(CameraRegistry::new(camera_ids, events)),
            backend,
            prober,
            policy,
        }
    }

    pub fn backend(&self) -> &dyn CameraBackend {
        self.backend.as_ref()
    }

    pub fn registry(&self) -> &CameraRegistry {
        &self.registry
    }

    pub fn events(&self) -> &EventBus {
        self.registry.events()
    }

    pub fn prober(&self) -> &AvailabilityProber {
        &self.prober
    }

    pub fn policy(&self) -> ReconnectPolicy {
        self.policy
    }

    pub fn camera_ids(&self) -> &[CameraId] {
        self.registry.camera_ids()
    }

    pub fn ensure_known(&self, camera_id: CameraId) -> Result<(), CameraError> {
        if self.registry.contains(camera_id) {
            Ok(())
        } else {
            Err(CameraError::NotFound(camera_id))
        }
    }

    pub async fn status(&self, camera_id: CameraId) -> Result<CameraStatus, CameraError> {
        self.registry.get(camera_id).await
    }

    pub async fn statuses(&self) -> Vec<CameraStatus> {
        self.registry.snapshot().await
    }

    pub fn summary(&self) -> ConnectionSummary {
        self.registry.summary()
    }

    pub async fn latest_frame(&self, camera_id: CameraId) -> Result<Option<Bytes>, CameraError> {
        self.registry.latest_frame(camera_id).await
    }

    /// Connects every camera concurrently; one camera's failure or delay never
    /// holds up another. Then mirrors the recording flags. Returns how many came up.
    pub async fn initialize_all(&self) -> usize {
        info!(cameras = ?self.camera_ids(), "initializing cameras");

        let mut tasks = JoinSet::new();
        for (index, camera_id) in self.camera_ids().iter().copied().enumerate() {
            let service = self.clone();
            let stagger = self.policy.init_stagger * index as u32;
            tasks.spawn(async move {
                if !stagger.is_zero() {
                    sleep(stagger).await;
                }
                (camera_id, service.connect(camera_id).await)
            });
        }

        let mut connected = 0;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((camera_id, Ok(()))) => {
                    connected += 1;
                    info!(camera_id, "camera initialized");
                }
                Ok((camera_id, Err(err))) => {
                    warn!(camera_id, "camera initialization failed: {err}");
                }
                Err(err) => error!("camera initialization task failed: {err}"),
            }
        }

        self.sync_recording_status().await;

        let total = self.camera_ids().len();
        info!("camera initialization finished: {connected}/{total} connected");
        if connected > 0 {
            self.events().notice(Notice::success(
                None,
                format!("system ready: {connected}/{total} cameras online"),
            ));
        } else {
            self.events()
                .notice(Notice::error(None, "system started without any camera online"));
        }
        connected
    }
}
