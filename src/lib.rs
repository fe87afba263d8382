//! Crate entrypoint wiring together configuration, settings, Cloudflare, and APIs.

pub mod api;
pub mod auth;
pub mod cloudflare;
pub mod config;
pub mod error;
pub mod purge;
pub mod resolver;
pub mod settings;

use cloudflare::CloudflareClient;
use config::AppConfig;
use settings::SettingsStore;

use std::sync::Arc;
use tokio::sync::Mutex;

/// Complete application dependencies shared across handlers.
pub struct AppState {
    pub config: AppConfig,
    pub settings: SettingsStore,
    /// Locked for the whole of a connect or purge so the client's last-call
    /// diagnostics belong to the action reading them.
    pub cloudflare: Mutex<CloudflareClient>,
}

impl AppState {
    pub fn new(config: AppConfig, settings: SettingsStore, cloudflare: CloudflareClient) -> Self {
        Self {
            config,
            settings,
            cloudflare: Mutex::new(cloudflare),
        }
    }
}

/// Arc-wrapped version of `AppState` passed into Axum extensions.
pub type SharedState = Arc<AppState>;
