use anyhow::{Result, bail};
use bytes::Bytes;
use tokio::{sync::watch, time::timeout};
use tracing::{debug, info, warn};

use crate::core::{
    errors::CameraError,
    state::{CameraId, CameraState, PreviewSession},
};

use super::{jpeg::FrameScanner, models::StreamQuality, service::CameraService, traits::PreviewSource};

struct OpenedPreview {
    source: Box<dyn PreviewSource>,
    scanner: FrameScanner,
    first_frame: Bytes,
}

impl CameraService {
    /// Probes the camera, opens its preview and waits for the first complete
    /// frame. Failures go through the reconnect path before being returned.
    pub async fn connect(&self, camera_id: CameraId) -> Result<(), CameraError> {
        let generation = self
            .registry
            .update(camera_id, CameraState::begin_attempt)
            .await?;
        debug!(camera_id, generation, "connect attempt started");

        if !self.prober.probe(camera_id).await {
            return self
                .fail_attempt(camera_id, generation, CameraError::Unavailable(camera_id))
                .await;
        }

        let stream_timeout = self.policy.stream_timeout;
        let opened = match timeout(stream_timeout, self.open_first_frame(camera_id)).await {
            Ok(Ok(opened)) => opened,
            Ok(Err(err)) => {
                let err = CameraError::TransportError {
                    camera_id,
                    reason: format!("{err:#}"),
                };
                return self.fail_attempt(camera_id, generation, err).await;
            }
            Err(_) => {
                let err = CameraError::StreamTimeout {
                    camera_id,
                    timeout: stream_timeout,
                };
                return self.fail_attempt(camera_id, generation, err).await;
            }
        };

        self.finish_attempt(camera_id, generation, opened).await
    }

    /// Stops the preview and marks the camera as not streaming. Safe to call
    /// on a camera that is already down.
    pub async fn disconnect(&self, camera_id: CameraId) -> Result<(), CameraError> {
        let was_streaming = self
            .registry
            .update(camera_id, |state| {
                let was_streaming = state.streaming;
                state.close_preview();
                state.streaming = false;
                was_streaming
            })
            .await?;

        if was_streaming {
            info!(camera_id, "camera stream disconnected");
        }
        Ok(())
    }

    async fn open_first_frame(&self, camera_id: CameraId) -> Result<OpenedPreview> {
        let mut source = self
            .backend
            .open_preview(camera_id, StreamQuality::Normal)
            .await?;
        let mut scanner = FrameScanner::new();

        loop {
            let Some(chunk) = source.next_chunk().await? else {
                bail!("preview stream closed before the first frame");
            };
            if let Some(first_frame) = scanner.push(&chunk) {
                return Ok(OpenedPreview {
                    source,
                    scanner,
                    first_frame,
                });
            }
        }
    }

    async fn finish_attempt(
        &self,
        camera_id: CameraId,
        generation: u64,
        opened: OpenedPreview,
    ) -> Result<(), CameraError> {
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let (frame_tx, frame_rx) = watch::channel(Some(opened.first_frame));
        let session = PreviewSession::new(cancel_tx, frame_rx);

        let current = self
            .registry
            .update(camera_id, move |state| {
                if state.generation != generation {
                    return false;
                }
                state.record_success(session);
                true
            })
            .await?;

        if !current {
            debug!(camera_id, generation, "dropping preview of a superseded attempt");
            return Err(CameraError::Superseded { camera_id });
        }

        info!(camera_id, "camera stream connected");
        tokio::spawn(self.clone().pump_preview(
            camera_id,
            generation,
            opened.source,
            opened.scanner,
            frame_tx,
            cancel_rx,
        ));
        Ok(())
    }

    async fn fail_attempt(
        &self,
        camera_id: CameraId,
        generation: u64,
        err: CameraError,
    ) -> Result<(), CameraError> {
        let reason = err.to_string();
        let current = self
            .registry
            .update(camera_id, |state| {
                if state.generation != generation {
                    return false;
                }
                state.record_failure(reason);
                true
            })
            .await?;

        if !current {
            debug!(camera_id, generation, "ignoring failure of a superseded attempt: {err}");
            return Err(CameraError::Superseded { camera_id });
        }

        warn!(camera_id, "camera connect failed: {err}");
        self.schedule_retry(camera_id).await?;
        Err(err)
    }

    /// Keeps reading the preview so the latest frame stays fresh. An
    /// unexpected end of the stream is a transport failure.
    async fn pump_preview(
        self,
        camera_id: CameraId,
        generation: u64,
        mut source: Box<dyn PreviewSource>,
        mut scanner: FrameScanner,
        frame_tx: watch::Sender<Option<Bytes>>,
        mut cancel_rx: watch::Receiver<bool>,
    ) {
        let reason = loop {
            tokio::select! {
                changed = cancel_rx.changed() => {
                    if changed.is_err() || *cancel_rx.borrow() {
                        debug!(camera_id, frames = scanner.frames(), "preview session closed");
                        return;
                    }
                }
                chunk = source.next_chunk() => match chunk {
                    Ok(Some(chunk)) => {
                        if let Some(frame) = scanner.push(&chunk) {
                            frame_tx.send_replace(Some(frame));
                        }
                    }
                    Ok(None) => break "preview stream ended".to_string(),
                    Err(err) => break format!("{err:#}"),
                }
            }
        };

        let err = CameraError::TransportError { camera_id, reason };
        let message = err.to_string();
        let lost = self
            .registry
            .update(camera_id, |state| {
                if state.generation != generation || !state.streaming {
                    return false;
                }
                state.record_failure(message);
                true
            })
            .await;

        match lost {
            Ok(true) => {
                warn!(camera_id, "preview stream lost: {err}");
                if let Err(err) = self.schedule_retry(camera_id).await {
                    warn!(camera_id, "failed to schedule reconnect: {err}");
                }
            }
            Ok(false) => debug!(camera_id, "stale preview session ended: {err}"),
            Err(err) => warn!(camera_id, "preview session for unknown camera: {err}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use crate::{
        camera::testing::{MockBackend, PreviewPlan, ProbeReply, settle, test_service},
        core::errors::CameraError,
    };

    #[tokio::test(start_paused = true)]
    async fn connect_success_marks_streaming() {
        let backend = Arc::new(MockBackend::new());
        backend.bring_up(1);
        let service = test_service(backend.clone(), &[1]);

        service.connect(1).await.expect("camera should connect");

        let status = service.status(1).await.expect("camera exists");
        assert!(status.available);
        assert!(status.streaming);
        assert!(!status.connecting);
        assert_eq!(status.last_error, None);
        assert_eq!(status.retry_count, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn unavailable_camera_fails_before_opening_preview() {
        let backend = Arc::new(MockBackend::new());
        backend.set_probe(1, ProbeReply::Down);
        let service = test_service(backend.clone(), &[1]);

        let err = service.connect(1).await.expect_err("probe is down");

        assert_eq!(err, CameraError::Unavailable(1));
        assert_eq!(backend.preview_opens(1), 0);
        let status = service.status(1).await.expect("camera exists");
        assert!(!status.streaming);
        assert_eq!(status.retry_count, 1);
        assert_eq!(status.pending_retry_delay_ms, Some(1000));
    }

    #[tokio::test(start_paused = true)]
    async fn silent_stream_times_out_and_refused_stream_is_transport_error() {
        let backend = Arc::new(MockBackend::new());
        backend.set_probe(1, ProbeReply::Up { recording: false });
        backend.set_preview(1, PreviewPlan::Hang);
        let service = test_service(backend.clone(), &[1]);

        let err = service.connect(1).await.expect_err("no frame arrives");
        assert_eq!(
            err,
            CameraError::StreamTimeout {
                camera_id: 1,
                timeout: Duration::from_secs(5)
            }
        );

        backend.set_preview(1, PreviewPlan::Refuse);
        let err = service.connect(1).await.expect_err("feed is refused");
        assert!(matches!(err, CameraError::TransportError { camera_id: 1, .. }));
        assert_eq!(service.status(1).await.expect("camera exists").retry_count, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn disconnect_is_idempotent() {
        let backend = Arc::new(MockBackend::new());
        backend.bring_up(1);
        let service = test_service(backend.clone(), &[1]);
        service.connect(1).await.expect("camera should connect");

        service.disconnect(1).await.expect("first disconnect");
        let after_first = service.status(1).await.expect("camera exists");
        assert!(!after_first.streaming);
        assert_eq!(service.latest_frame(1).await.expect("camera exists"), None);

        service.disconnect(1).await.expect("second disconnect");
        assert_eq!(service.status(1).await.expect("camera exists"), after_first);

        assert_eq!(
            service.disconnect(4).await.expect_err("unknown camera"),
            CameraError::NotFound(4)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_preview_enters_failure_path() {
        let backend = Arc::new(MockBackend::new());
        backend.bring_up(1);
        backend.set_preview(1, PreviewPlan::FrameThenEnd);
        let service = test_service(backend.clone(), &[1]);

        service.connect(1).await.expect("first frame arrives");
        settle().await;

        let status = service.status(1).await.expect("camera exists");
        assert!(!status.streaming);
        assert_eq!(status.retry_count, 1);
        assert!(status.retry_pending);
        assert!(
            status
                .last_error
                .as_deref()
                .is_some_and(|reason| reason.contains("preview stream ended"))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn stale_completion_does_not_overwrite_newer_attempt() {
        let backend = Arc::new(MockBackend::new());
        backend.set_probe(1, ProbeReply::Up { recording: false });
        backend.set_preview(1, PreviewPlan::Delayed(Duration::from_secs(3)));
        let service = test_service(backend.clone(), &[1]);

        let slow = tokio::spawn({
            let service = service.clone();
            async move { service.connect(1).await }
        });
        settle().await;
        assert!(service.status(1).await.expect("camera exists").connecting);

        backend.set_preview(1, PreviewPlan::Hang);
        let err = service.retry_stream(1).await.expect_err("newer attempt times out");
        assert!(matches!(err, CameraError::StreamTimeout { .. }));
        let after_newer = service.status(1).await.expect("camera exists");
        assert!(!after_newer.streaming);
        assert_eq!(after_newer.retry_count, 1);

        let stale = slow.await.expect("task joins");
        assert_eq!(stale, Err(CameraError::Superseded { camera_id: 1 }));
        let status = service.status(1).await.expect("camera exists");
        assert!(!status.streaming, "stale success must not resurrect the stream");
        assert_eq!(status.retry_count, 1);
    }
}
