//! Runtime configuration, sourced from the environment with documented
//! defaults (SPEC_FULL.md §6). Mirrors the env-override pattern in
//! `avellaneda/config.rs`, minus the TOML layer — this service's config
//! surface is env-var only.

use std::env;

pub const DEFAULT_WS_URL: &str = "wss://mainnet.zklighter.elliot.ai/stream";

#[derive(Debug, Clone)]
pub struct Settings {
    pub ws_url: String,
    pub ping_interval_secs: f64,
    pub reconnect_base_delay_secs: f64,
    pub reconnect_max_delay_secs: f64,
    pub ui_debounce_seconds: f64,
    pub dashboard_host: String,
    pub dashboard_port: u16,
    pub metadata_path: Option<String>,
    pub log_level: String,
    pub funding_refresh_seconds: f64,
    pub funding_min_assets: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            ws_url: DEFAULT_WS_URL.to_string(),
            ping_interval_secs: 20.0,
            reconnect_base_delay_secs: 0.5,
            reconnect_max_delay_secs: 30.0,
            ui_debounce_seconds: 0.2,
            dashboard_host: "0.0.0.0".to_string(),
            dashboard_port: 8000,
            metadata_path: None,
            log_level: "INFO".to_string(),
            funding_refresh_seconds: 60.0,
            funding_min_assets: 3,
        }
    }
}

impl Settings {
    /// Load settings from the process environment, falling back to the
    /// documented defaults for anything absent or unparsable.
    pub fn from_env() -> Self {
        let mut settings = Self::default();

        if let Ok(value) = env::var("LIGHTER_WS_URL") {
            settings.ws_url = value;
        }
        override_f64("LIGHTER_WS_PING_INTERVAL", &mut settings.ping_interval_secs);
        override_f64(
            "LIGHTER_WS_RECONNECT_BASE",
            &mut settings.reconnect_base_delay_secs,
        );
        override_f64(
            "LIGHTER_WS_RECONNECT_MAX",
            &mut settings.reconnect_max_delay_secs,
        );
        override_f64("LIGHTER_UI_DEBOUNCE", &mut settings.ui_debounce_seconds);
        if let Ok(value) = env::var("LIGHTER_DASHBOARD_HOST") {
            settings.dashboard_host = value;
        }
        override_u16("LIGHTER_DASHBOARD_PORT", &mut settings.dashboard_port);
        if let Ok(value) = env::var("LIGHTER_MARKET_METADATA") {
            settings.metadata_path = Some(value);
        }
        if let Ok(value) = env::var("LIGHTER_LOG_LEVEL") {
            settings.log_level = value;
        }
        override_f64(
            "LIGHTER_FUNDING_REFRESH_SECONDS",
            &mut settings.funding_refresh_seconds,
        );
        override_usize(
            "LIGHTER_FUNDING_MIN_ASSETS",
            &mut settings.funding_min_assets,
        );

        settings
    }

    /// The effective per-market debounce interval, floored at 50ms (§4.4).
    pub fn debounce(&self) -> std::time::Duration {
        std::time::Duration::from_secs_f64(self.ui_debounce_seconds.max(0.05))
    }

    pub fn heartbeat_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs_f64(self.ping_interval_secs + 5.0)
    }

    pub fn ping_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs_f64(self.ping_interval_secs)
    }
}

fn override_f64(key: &str, field: &mut f64) {
    if let Ok(value) = env::var(key) {
        if let Ok(parsed) = value.parse::<f64>() {
            *field = parsed;
        }
    }
}

fn override_u16(key: &str, field: &mut u16) {
    if let Ok(value) = env::var(key) {
        if let Ok(parsed) = value.parse::<u16>() {
            *field = parsed;
        }
    }
}

fn override_usize(key: &str, field: &mut usize) {
    if let Ok(value) = env::var(key) {
        if let Ok(parsed) = value.parse::<usize>() {
            *field = parsed;
        }
    }
}
