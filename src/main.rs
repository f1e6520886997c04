mod app_state;
mod camera;
mod config;
mod controls;
mod core;
mod notify;
mod web;

use std::sync::Arc;

use app_state::AppState;
use camera::{health::HealthMonitor, http_backend::HttpBackend, service::CameraService};
use config::AppConfig;
use crate::core::events::EventBus;
use notify::{relay::spawn_relay, telegram::TelegramNotifier};
use tracing::info;
use tracing_appender::rolling;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tokio::fs::create_dir_all("logs").await?;
    let file_appender = rolling::daily("logs", "camwatch.log");
    let (non_blocking, _log_guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::fmt()
        .with_ansi(false)
        .with_writer(non_blocking)
        .with_max_level(tracing::Level::INFO)
        .init();

    let config = AppConfig::from_env()?;
    let backend = Arc::new(HttpBackend::new(
        config.backend_url.clone(),
        config.request_timeout(),
    )?);
    let events = EventBus::new();
    let cameras = CameraService::new(
        backend,
        config.camera_ids.iter().copied(),
        config.reconnect_policy(),
        events.clone(),
    );

    let notifier = TelegramNotifier::from_config(&config);
    let state = Arc::new(AppState::new(config.clone(), cameras.clone(), notifier));
    let _relay = spawn_relay(&events, config.app_name.clone(), state.notifier.clone());

    info!(
        "{} starting: backend={} cameras={:?}",
        config.app_name, config.backend_url, config.camera_ids
    );
    state.notify(format!(
        "{} booted on {} (backend: {})",
        config.app_name, config.bind_addr, config.backend_url
    ));

    {
        let mut summary_rx = cameras.registry().watch_summary();
        tokio::spawn(async move {
            while summary_rx.changed().await.is_ok() {
                let summary = *summary_rx.borrow_and_update();
                info!(
                    "connection status: {} ({}/{} online)",
                    summary.status.label(),
                    summary.streaming,
                    summary.total
                );
            }
        });
    }

    {
        let cameras = cameras.clone();
        tokio::spawn(async move {
            cameras.initialize_all().await;
            HealthMonitor::spawn(cameras);
        });
    }

    let app = web::routes::build_router(state);
    info!("{} listening on {}", config.app_name, config.bind_addr);
    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
