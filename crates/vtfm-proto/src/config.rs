use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::platform;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub daemon: DaemonConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub mpv: MpvConfig,
    #[serde(default)]
    pub now_playing: NowPlayingConfig,
    #[serde(default)]
    pub playback: PlaybackConfig,
    #[serde(default)]
    pub catalog: CatalogConfig,
    #[serde(default)]
    pub onboarding: OnboardingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Key-value store holding the selection and the onboarding flag.
    #[serde(default = "default_store_file")]
    pub store_file: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_http_enabled")]
    pub enabled: bool,
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MpvConfig {
    #[serde(default = "default_volume")]
    pub volume: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NowPlayingConfig {
    /// Base URL of the now-playing API; `get_<slug>_track` is appended.
    #[serde(default = "default_now_playing_base")]
    pub base_url: String,
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval_secs: u64,
    #[serde(default = "default_request_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlaybackConfig {
    /// Stop also moves the selection back to the first station.
    #[serde(default)]
    pub reset_station_on_stop: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogConfig {
    /// Optional catalog override.  The built-in catalog is used when absent.
    #[serde(default = "default_catalog_toml")]
    pub catalog_toml: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OnboardingConfig {
    #[serde(default = "default_link_url")]
    pub link_url: String,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            store_file: default_store_file(),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            enabled: default_http_enabled(),
            bind_address: default_bind_address(),
            port: default_port(),
        }
    }
}

impl Default for MpvConfig {
    fn default() -> Self {
        Self {
            volume: default_volume(),
        }
    }
}

impl Default for NowPlayingConfig {
    fn default() -> Self {
        Self {
            base_url: default_now_playing_base(),
            refresh_interval_secs: default_refresh_interval(),
            timeout_secs: default_request_timeout(),
        }
    }
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            catalog_toml: default_catalog_toml(),
        }
    }
}

impl Default for OnboardingConfig {
    fn default() -> Self {
        Self {
            link_url: default_link_url(),
        }
    }
}

fn default_store_file() -> PathBuf {
    platform::data_dir().join("store.json")
}

fn default_http_enabled() -> bool {
    true
}

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8990
}

fn default_volume() -> f32 {
    0.8
}

fn default_now_playing_base() -> String {
    "https://vocaltrance.fm/api/v1/".to_string()
}

fn default_refresh_interval() -> u64 {
    5
}

fn default_request_timeout() -> u64 {
    4
}

fn default_catalog_toml() -> PathBuf {
    platform::config_dir().join("catalog.toml")
}

fn default_link_url() -> String {
    "https://www.youtube.com/channel/UCVy0TfTcM04H5tFlirLVB-A".to_string()
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let config_path = Self::config_path();

        if !config_path.exists() {
            let config = Self::default();
            config.save()?;
            return Ok(config);
        }

        let content = std::fs::read_to_string(&config_path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        let config: Self = toml::from_str(content)?;
        Ok(config)
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let config_path = Self::config_path();
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(&config_path, content)?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        platform::config_dir().join("config.toml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.http.enabled);
        assert_eq!(config.http.port, 8990);
        assert_eq!(config.now_playing.refresh_interval_secs, 5);
        assert!(config.now_playing.base_url.ends_with("/api/v1/"));
        assert!(!config.playback.reset_station_on_stop);
        assert!(config.daemon.store_file.ends_with("vtfm/store.json"));
        assert!(config.catalog.catalog_toml.ends_with("vtfm/catalog.toml"));
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config = Config::from_toml_str(
            r#"
[playback]
reset_station_on_stop = true

[now_playing]
refresh_interval_secs = 10
"#,
        )
        .unwrap();
        assert!(config.playback.reset_station_on_stop);
        assert_eq!(config.now_playing.refresh_interval_secs, 10);
        assert_eq!(config.now_playing.timeout_secs, 4);
        assert_eq!(config.http.bind_address, "127.0.0.1");
    }
}
