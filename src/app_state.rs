use std::sync::Arc;

use tracing::warn;

use crate::{camera::service::CameraService, config::AppConfig, notify::telegram::TelegramNotifier};

pub struct AppState {
    pub config: AppConfig,
    pub cameras: CameraService,
    pub notifier: Option<Arc<TelegramNotifier>>,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        cameras: CameraService,
        notifier: Option<TelegramNotifier>,
    ) -> Self {
        Self {
            config,
            cameras,
            notifier: notifier.map(Arc::new),
        }
    }

    /// Fire-and-forget Telegram message; a no-op when Telegram is not configured.
    pub fn notify(&self, message: impl Into<String>) {
        let Some(notifier) = self.notifier.clone() else {
            return;
        };
        let message = message.into();

        tokio::spawn(async move {
            if let Err(err) = notifier.send_message(&message).await {
                warn!("telegram notify failed: {err}");
            }
        });
    }
}
