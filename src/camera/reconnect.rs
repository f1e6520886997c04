use std::{future::Future, pin::Pin, time::Duration};

use tokio::time::{Instant, sleep_until};
use tracing::{debug, error, info, warn};

use crate::core::{
    errors::CameraError,
    events::{ControllerEvent, Notice},
    state::{CameraId, CameraState, PendingRetry},
};

use super::service::CameraService;

/// `base * 2^(max(retry_count, 1) - 1)`, saturating.
pub fn backoff_delay(base: Duration, retry_count: u32) -> Duration {
    let exponent = retry_count.max(1) - 1;
    let factor = 1u32.checked_shl(exponent).unwrap_or(u32::MAX);
    base.saturating_mul(factor)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    Scheduled(Duration),
    Exhausted { attempts: u32, first_notice: bool },
}

impl CameraService {
    /// Arms the next automatic reconnect, or gives up once the budget is spent.
    /// Any timer already pending for the camera is cancelled first.
    pub async fn schedule_retry(&self, camera_id: CameraId) -> Result<RetryDecision, CameraError> {
        let base_delay = self.policy.base_delay;
        let max_retries = self.policy.max_retries;
        let service = self.clone();

        let decision = self
            .registry
            .update(camera_id, move |state| {
                state.cancel_pending_retry();
                if state.retry_count >= max_retries {
                    let first_notice = !state.exhausted;
                    state.exhausted = true;
                    return RetryDecision::Exhausted {
                        attempts: state.retry_count,
                        first_notice,
                    };
                }

                let delay = backoff_delay(base_delay, state.retry_count);
                let token = state.next_retry_token();
                let deadline = Instant::now() + delay;
                let handle = tokio::spawn(service.retry_task(camera_id, token, deadline));
                state.pending_retry = Some(PendingRetry::new(token, delay, handle.abort_handle()));
                RetryDecision::Scheduled(delay)
            })
            .await?;

        match decision {
            RetryDecision::Scheduled(delay) => {
                info!(camera_id, delay_ms = delay.as_millis() as u64, "reconnect scheduled");
            }
            RetryDecision::Exhausted {
                attempts,
                first_notice: true,
            } => {
                let err = CameraError::RetryBudgetExhausted {
                    camera_id,
                    attempts,
                };
                error!(camera_id, attempts, "{err}");
                let events = self.events();
                events.publish(ControllerEvent::RetriesExhausted {
                    camera_id,
                    attempts,
                });
                events.notice(Notice::error(
                    Some(camera_id),
                    format!("camera {camera_id} connection failed (retry limit reached)"),
                ));
            }
            RetryDecision::Exhausted { .. } => {
                debug!(camera_id, "retry budget already exhausted");
            }
        }
        Ok(decision)
    }

    // Boxed so the connect -> retry -> connect chain has a nameable, Send type.
    fn retry_task(
        self,
        camera_id: CameraId,
        token: u64,
        deadline: Instant,
    ) -> Pin<Box<dyn Future<Output = ()> + Send>> {
        Box::pin(async move {
            sleep_until(deadline).await;

            // Clear our own slot without aborting: this task is the handle.
            let due = self
                .registry
                .update(camera_id, |state| {
                    let ours = state
                        .pending_retry
                        .as_ref()
                        .is_some_and(|pending| pending.token == token);
                    if ours {
                        state.pending_retry = None;
                    }
                    ours
                })
                .await;
            if !matches!(due, Ok(true)) {
                debug!(camera_id, token, "retry timer no longer current");
                return;
            }

            info!(camera_id, "retrying camera connection");
            match self.connect(camera_id).await {
                Ok(()) => {}
                Err(err) if err.is_recoverable() || matches!(err, CameraError::Superseded { .. }) => {
                    debug!(camera_id, "automatic reconnect failed: {err}");
                }
                Err(err) => warn!(camera_id, "automatic reconnect aborted: {err}"),
            }
        })
    }

    /// Operator-initiated retry: cancels any timer, restores the full retry
    /// budget and connects right away.
    pub async fn retry_stream(&self, camera_id: CameraId) -> Result<(), CameraError> {
        self.registry
            .update(camera_id, CameraState::reset_retries)
            .await?;
        info!(camera_id, "manual retry requested");
        self.events().notice(Notice::info(
            Some(camera_id),
            format!("retrying camera {camera_id}..."),
        ));

        match self.connect(camera_id).await {
            Ok(()) => {
                self.events().notice(Notice::success(
                    Some(camera_id),
                    format!("camera {camera_id} reconnected"),
                ));
                Ok(())
            }
            Err(err @ CameraError::Superseded { .. }) => Err(err),
            Err(err) => {
                self.events().notice(Notice::error(
                    Some(camera_id),
                    format!("camera {camera_id} retry failed: {err}"),
                ));
                Err(err)
            }
        }
    }

    /// Failure path for a camera found dead while marked streaming. Returns
    /// whether anything changed.
    pub async fn mark_failure(
        &self,
        camera_id: CameraId,
        err: CameraError,
    ) -> Result<bool, CameraError> {
        let reason = err.to_string();
        let marked = self
            .registry
            .update(camera_id, |state| {
                if !state.streaming {
                    return false;
                }
                // The running preview belongs to the old generation now.
                state.generation += 1;
                state.record_failure(reason);
                true
            })
            .await?;

        if marked {
            warn!(camera_id, "camera marked failed: {err}");
            self.schedule_retry(camera_id).await?;
        }
        Ok(marked)
    }
}
