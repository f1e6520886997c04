use std::sync::Arc;

use tokio::{sync::broadcast::error::RecvError, task::JoinHandle};
use tracing::{info, warn};

use crate::core::events::{ControllerEvent, EventBus, NoticeLevel};

use super::telegram::TelegramNotifier;

/// Text worth pushing to the operator's phone, if any. Only terminal
/// failures and system-wide errors qualify.
pub fn alert_for(app_name: &str, event: &ControllerEvent) -> Option<String> {
    match event {
        ControllerEvent::RetriesExhausted {
            camera_id,
            attempts,
        } => Some(format!(
            "{app_name}: camera {camera_id} connection failed after {attempts} attempts, manual retry needed"
        )),
        ControllerEvent::Notice(notice)
            if notice.level == NoticeLevel::Error && notice.camera_id.is_none() =>
        {
            Some(format!("{app_name}: {}", notice.message))
        }
        _ => None,
    }
}

/// Logs every notice and forwards alerts to Telegram when configured.
pub fn spawn_relay(
    events: &EventBus,
    app_name: String,
    notifier: Option<Arc<TelegramNotifier>>,
) -> JoinHandle<()> {
    let mut rx = events.subscribe();
    tokio::spawn(async move {
        loop {
            let event = match rx.recv().await {
                Ok(event) => event,
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "notification relay lagged behind");
                    continue;
                }
                Err(RecvError::Closed) => break,
            };

            if let ControllerEvent::Notice(notice) = &event {
                match notice.level {
                    NoticeLevel::Error => warn!(camera_id = ?notice.camera_id, "{}", notice.message),
                    _ => info!(camera_id = ?notice.camera_id, "{}", notice.message),
                }
            }

            let (Some(notifier), Some(message)) = (&notifier, alert_for(&app_name, &event)) else {
                continue;
            };
            let notifier = notifier.clone();
            tokio::spawn(async move {
                if let Err(err) = notifier.send_message(&message).await {
                    warn!("telegram notify failed: {err}");
                }
            });
        }
    })
}
