// Dashboard configuration - file plus ADCP__ environment overrides
use crate::application::data_channel::Endpoint;
use crate::application::retry::RetryPolicy;
use crate::application::terminal_service::TerminalSettings;
use crate::application::view_registry::{RegistrySettings, ViewSettings};
use crate::domain::sample::ViewKind;
use anyhow::{bail, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct DashboardConfig {
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub backend: BackendSettings,
    #[serde(default)]
    pub retry: RetrySettings,
    #[serde(default)]
    pub terminal: TerminalConfig,
    #[serde(default)]
    pub views: Vec<ViewConfig>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerSettings {
    pub bind: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8080".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct BackendSettings {
    pub host: String,
    pub port: u16,
    pub request_timeout_ms: u64,
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 4241,
            request_timeout_ms: 2000,
        }
    }
}

impl BackendSettings {
    pub fn endpoint(&self) -> Endpoint {
        Endpoint::new(self.host.clone(), self.port)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 0,
            base_delay_ms: 100,
            max_delay_ms: 1000,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct TerminalConfig {
    pub update_rate_ms: u64,
    pub log_capacity: usize,
    pub default_baud: u32,
}

impl Default for TerminalConfig {
    fn default() -> Self {
        Self {
            update_rate_ms: 250,
            log_capacity: 500,
            default_baud: 115200,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ViewConfig {
    pub kind: ViewKind,
    #[serde(default = "default_view_rate_ms")]
    pub update_rate_ms: u64,
    /// Backend port override; the host is always the backend host.
    pub port: Option<u16>,
    /// Mount this view at startup.
    #[serde(default = "default_true")]
    pub autostart: bool,
}

fn default_view_rate_ms() -> u64 {
    500
}

fn default_true() -> bool {
    true
}

impl DashboardConfig {
    pub fn registry_settings(&self) -> Result<RegistrySettings> {
        if self.terminal.update_rate_ms == 0 {
            bail!("terminal.update_rate_ms must be greater than zero");
        }

        let mut views = HashMap::new();
        for view in &self.views {
            if view.update_rate_ms == 0 {
                bail!("views.{}: update_rate_ms must be greater than zero", view.kind);
            }
            let endpoint = Endpoint::new(
                self.backend.host.clone(),
                view.port.unwrap_or(self.backend.port),
            );
            let settings = ViewSettings {
                endpoint,
                interval: Duration::from_millis(view.update_rate_ms),
            };
            if views.insert(view.kind, settings).is_some() {
                bail!("view {} is configured more than once", view.kind);
            }
        }

        Ok(RegistrySettings {
            control_endpoint: self.backend.endpoint(),
            default_interval: Duration::from_millis(default_view_rate_ms()),
            views,
            terminal: TerminalSettings {
                interval: Duration::from_millis(self.terminal.update_rate_ms),
                default_baud: self.terminal.default_baud,
                log_capacity: self.terminal.log_capacity,
            },
            retry: RetryPolicy::exponential(
                self.retry.max_attempts,
                Duration::from_millis(self.retry.base_delay_ms),
                Duration::from_millis(self.retry.max_delay_ms),
            ),
        })
    }

    /// Views to mount when the service starts.
    pub fn autostart_views(&self) -> Vec<ViewKind> {
        self.views
            .iter()
            .filter(|view| view.autostart)
            .map(|view| view.kind)
            .collect()
    }
}

fn build(file: &str) -> Result<DashboardConfig> {
    let settings = config::Config::builder()
        .add_source(config::File::with_name(file).required(false))
        .add_source(
            config::Environment::with_prefix("ADCP")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    Ok(settings.try_deserialize()?)
}

pub fn load_dashboard_config() -> Result<DashboardConfig> {
    build("config/dashboard")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn from_toml(raw: &str) -> DashboardConfig {
        config::Config::builder()
            .add_source(config::File::from_str(raw, config::FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap()
    }

    #[test]
    fn test_defaults() {
        let config = from_toml("");
        assert_eq!(config.server.bind, "127.0.0.1:8080");
        assert_eq!(config.backend.endpoint().to_string(), "127.0.0.1:4241");
        assert_eq!(config.backend.request_timeout(), Duration::from_millis(2000));

        let settings = config.registry_settings().unwrap();
        assert_eq!(settings.retry.max_attempts, 0);
        assert_eq!(settings.terminal.log_capacity, 500);
        assert_eq!(settings.terminal.default_baud, 115200);
        assert_eq!(settings.view(ViewKind::Terminal).interval, Duration::from_millis(250));
        assert_eq!(settings.view(ViewKind::Contour).interval, Duration::from_millis(500));
    }

    #[test]
    fn test_view_overrides() {
        let config = from_toml(
            r#"
            [backend]
            host = "192.168.1.20"

            [[views]]
            kind = "contour"
            update_rate_ms = 1000
            port = 4242

            [[views]]
            kind = "ship-track"
            autostart = false
            "#,
        );
        let settings = config.registry_settings().unwrap();

        let contour = settings.view(ViewKind::Contour);
        assert_eq!(contour.endpoint.to_string(), "192.168.1.20:4242");
        assert_eq!(contour.interval, Duration::from_millis(1000));
        assert_eq!(settings.view(ViewKind::ShipTrack).endpoint.port, 4241);
        assert_eq!(config.autostart_views(), vec![ViewKind::Contour]);
    }

    #[test]
    fn test_rejects_zero_rate_and_duplicates() {
        let zero = from_toml("[[views]]\nkind = \"tabular\"\nupdate_rate_ms = 0\n");
        assert!(zero.registry_settings().is_err());

        let twice = from_toml("[[views]]\nkind = \"tabular\"\n\n[[views]]\nkind = \"tabular\"\n");
        assert!(twice.registry_settings().is_err());
    }
}
