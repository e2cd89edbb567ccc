use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use anyhow::{Context, Result, anyhow};

pub const DEFAULT_ENDPOINT: &str = "http://localhost:5000/api/chat";
pub const DEFAULT_WEB_BASE_URL: &str = "http://localhost:5173";

const APP_DIR: &str = "sinhgad";

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct Config {
    /// URL the chat request is POSTed to
    pub endpoint: Option<String>,
    pub request_timeout_secs: Option<u64>,
    /// Base of the web app, used to build links to cited posts
    pub web_base_url: Option<String>,
    pub log_filter: Option<String>,
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load() -> Result<Self> {
        Self::load_from(&Self::get_config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::new());
        }

        let config_content = fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let config: Config = serde_json::from_str(&config_content)
            .with_context(|| format!("parsing {}", path.display()))?;
        Ok(config)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let config_content = serde_json::to_string_pretty(self)?;
        fs::write(path, config_content)?;
        Ok(())
    }

    /// Change the saved endpoint in the file at `path`, keeping every other
    /// field. Fails without writing when the existing file cannot be read.
    pub fn update_endpoint(path: &Path, endpoint: &str) -> Result<Self> {
        let mut config = Self::load_from(path)?;
        config.endpoint = Some(endpoint.to_string());
        config.save_to(path)?;
        Ok(config)
    }

    /// Pick the chat endpoint: explicit override (flag or env), then the
    /// saved value, then the local default.
    pub fn resolve_endpoint(&self, override_url: Option<&str>) -> String {
        override_url
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .or(self.endpoint.as_deref())
            .unwrap_or(DEFAULT_ENDPOINT)
            .to_string()
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }

    pub fn web_base_url(&self) -> String {
        self.web_base_url
            .clone()
            .unwrap_or_else(|| DEFAULT_WEB_BASE_URL.to_string())
    }

    pub fn get_config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow!("Could not determine config directory"))?;

        Ok(config_dir.join(APP_DIR).join("config.json"))
    }

    pub fn log_dir() -> Result<PathBuf> {
        let data_dir = dirs::data_local_dir()
            .or_else(dirs::config_dir)
            .ok_or_else(|| anyhow!("Could not determine data directory"))?;

        Ok(data_dir.join(APP_DIR).join("logs"))
    }
}
