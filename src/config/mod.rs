use std::{env, net::SocketAddr, time::Duration};

use anyhow::{Context, Result, bail};

use crate::{camera::service::ReconnectPolicy, core::state::CameraId};

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub app_name: String,
    pub bind_addr: SocketAddr,
    pub backend_url: String,
    pub camera_ids: Vec<CameraId>,
    pub max_retries: u32,
    pub retry_base_delay_ms: u64,
    pub health_check_interval_ms: u64,
    pub stream_timeout_ms: u64,
    pub probe_timeout_ms: u64,
    pub request_timeout_ms: u64,
    pub init_stagger_ms: u64,
    pub telegram_bot_token: Option<String>,
    pub telegram_chat_id: Option<String>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let app_name = env::var("APP_NAME").unwrap_or_else(|_| "CamWatch".to_owned());
        let bind_addr = env::var("BIND_ADDR")
            .unwrap_or_else(|_| "127.0.0.1:8090".to_owned())
            .parse()
            .context("BIND_ADDR must be host:port")?;

        let backend_url = env::var("BACKEND_URL")
            .unwrap_or_else(|_| "http://127.0.0.1:8000".to_owned())
            .trim()
            .trim_end_matches('/')
            .to_owned();
        if !(backend_url.starts_with("http://") || backend_url.starts_with("https://")) {
            bail!("BACKEND_URL must start with http:// or https://, got {backend_url:?}");
        }

        let camera_ids = parse_camera_ids(&env::var("CAMERA_IDS").unwrap_or_else(|_| "1,2".to_owned()))?;

        let telegram_bot_token = env::var("TELEGRAM_BOT_TOKEN")
            .ok()
            .filter(|value| !value.trim().is_empty());
        let telegram_chat_id = env::var("TELEGRAM_CHAT_ID")
            .ok()
            .filter(|value| !value.trim().is_empty());

        Ok(Self {
            app_name,
            bind_addr,
            backend_url,
            camera_ids,
            max_retries: env_number("MAX_RETRIES", 5),
            retry_base_delay_ms: env_millis("RETRY_BASE_DELAY_MS", 1000),
            health_check_interval_ms: env_millis("HEALTH_CHECK_INTERVAL_MS", 10_000),
            stream_timeout_ms: env_millis("STREAM_TIMEOUT_MS", 5000),
            probe_timeout_ms: env_millis("PROBE_TIMEOUT_MS", 5000),
            request_timeout_ms: env_millis("REQUEST_TIMEOUT_MS", 10_000),
            init_stagger_ms: env_number("INIT_STAGGER_MS", 0),
            telegram_bot_token,
            telegram_chat_id,
        })
    }

    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        ReconnectPolicy {
            max_retries: self.max_retries,
            base_delay: Duration::from_millis(self.retry_base_delay_ms),
            health_interval: Duration::from_millis(self.health_check_interval_ms),
            stream_timeout: Duration::from_millis(self.stream_timeout_ms),
            probe_timeout: Duration::from_millis(self.probe_timeout_ms),
            init_stagger: Duration::from_millis(self.init_stagger_ms),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

fn env_number<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|value| value.trim().parse::<T>().ok())
        .unwrap_or(default)
}

/// Periods and timeouts must be positive; zero falls back like a bad number.
fn env_millis(key: &str, default: u64) -> u64 {
    env::var(key)
        .ok()
        .and_then(|value| value.trim().parse::<u64>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(default)
}

fn parse_camera_ids(raw: &str) -> Result<Vec<CameraId>> {
    let mut ids = Vec::new();
    for part in raw.split(',').map(str::trim).filter(|part| !part.is_empty()) {
        let id = part
            .parse::<CameraId>()
            .with_context(|| format!("invalid camera id in CAMERA_IDS: {part:?}"))?;
        if !ids.contains(&id) {
            ids.push(id);
        }
    }
    if ids.is_empty() {
        bail!("CAMERA_IDS must list at least one camera");
    }
    Ok(ids)
}
