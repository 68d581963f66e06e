//! Harness configuration

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use crate::error::{Error, Result};

/// Default config file looked up by [`HarnessConfig::from_env`]
pub const DEFAULT_CONFIG_FILE: &str = "appcheck.toml";

/// Harness configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    /// Base URL for both API and UI traffic
    pub base_url: String,

    /// Directory holding the authentication cache files
    pub auth_dir: PathBuf,

    /// Browser automation settings
    pub browser: BrowserSettings,

    /// Bounds for every suspension point
    pub timeouts: Timeouts,

    /// Test-category tags excluded from normal runs
    pub exclude_tags: Vec<String>,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000".to_string(),
            auth_dir: PathBuf::from(".auth"),
            browser: BrowserSettings::default(),
            timeouts: Timeouts::default(),
            exclude_tags: vec!["known-bug".to_string()],
        }
    }
}

/// Which Playwright browser to launch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BrowserKind {
    #[default]
    Chromium,
    Firefox,
    Webkit,
}

impl BrowserKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BrowserKind::Chromium => "chromium",
            BrowserKind::Firefox => "firefox",
            BrowserKind::Webkit => "webkit",
        }
    }
}

impl std::str::FromStr for BrowserKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "chromium" | "chrome" => Ok(BrowserKind::Chromium),
            "firefox" => Ok(BrowserKind::Firefox),
            "webkit" | "safari" => Ok(BrowserKind::Webkit),
            other => Err(Error::InvalidConfig(format!("unknown browser: {}", other))),
        }
    }
}

/// Browser settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserSettings {
    pub kind: BrowserKind,
    pub headless: bool,
    pub viewport_width: u32,
    pub viewport_height: u32,

    /// Directory where the `playwright` Node package is installed
    pub driver_dir: PathBuf,
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            kind: BrowserKind::Chromium,
            headless: true,
            viewport_width: 1280,
            viewport_height: 720,
            driver_dir: PathBuf::from("."),
        }
    }
}

/// Timeouts, in milliseconds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Timeouts {
    /// Single DOM action (click, fill, ...)
    pub action_ms: u64,

    /// Retrying expectations on locators and URLs
    pub expect_ms: u64,

    /// Navigations and post-submit redirects
    pub navigation_ms: u64,

    /// Single HTTP request
    pub request_ms: u64,

    /// Whole setup phase of one fixture
    pub fixture_setup_ms: u64,

    /// Single teardown action
    pub teardown_ms: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            action_ms: 5_000,
            expect_ms: 5_000,
            navigation_ms: 15_000,
            request_ms: 10_000,
            fixture_setup_ms: 30_000,
            teardown_ms: 10_000,
        }
    }
}

impl Timeouts {
    pub fn action(&self) -> Duration {
        Duration::from_millis(self.action_ms)
    }

    pub fn expect(&self) -> Duration {
        Duration::from_millis(self.expect_ms)
    }

    pub fn navigation(&self) -> Duration {
        Duration::from_millis(self.navigation_ms)
    }

    pub fn request(&self) -> Duration {
        Duration::from_millis(self.request_ms)
    }

    pub fn fixture_setup(&self) -> Duration {
        Duration::from_millis(self.fixture_setup_ms)
    }

    pub fn teardown(&self) -> Duration {
        Duration::from_millis(self.teardown_ms)
    }
}

impl HarnessConfig {
    /// Load configuration from file, falling back to defaults when absent
    pub fn load(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Self = toml::from_str(&content)?;
            config.validate()?;
            debug!("Loaded harness configuration from {}", path.display());
            Ok(config)
        } else {
            debug!("No configuration at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Load from `$APPCHECK_CONFIG` (or `appcheck.toml`) and apply env overrides
    pub fn from_env() -> Result<Self> {
        let path = std::env::var_os("APPCHECK_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
        Self::load(&path)?.with_env_overrides()
    }

    /// Apply `APPCHECK_*` environment overrides
    pub fn with_env_overrides(mut self) -> Result<Self> {
        if let Ok(url) = std::env::var("APPCHECK_BASE_URL") {
            debug!("APPCHECK_BASE_URL overrides base_url with {}", url);
            self.base_url = url;
        }
        if let Ok(dir) = std::env::var("APPCHECK_AUTH_DIR") {
            self.auth_dir = PathBuf::from(dir);
        }
        if let Ok(headless) = std::env::var("APPCHECK_HEADLESS") {
            self.browser.headless = parse_flag("APPCHECK_HEADLESS", &headless)?;
        }
        if let Ok(include) = std::env::var("APPCHECK_INCLUDE_KNOWN_BUGS") {
            if parse_flag("APPCHECK_INCLUDE_KNOWN_BUGS", &include)? {
                self.exclude_tags.retain(|t| t != "known-bug");
            }
        }
        self.validate()?;
        Ok(self)
    }

    /// Reject values the harness cannot work with
    pub fn validate(&self) -> Result<()> {
        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            return Err(Error::InvalidConfig(format!(
                "base_url must be an http(s) URL, got {}",
                self.base_url
            )));
        }
        if self.timeouts.expect_ms == 0 || self.timeouts.action_ms == 0 {
            return Err(Error::InvalidConfig(
                "action and expect timeouts must be non-zero".to_string(),
            ));
        }
        for tag in &self.exclude_tags {
            tag.parse::<crate::tags::Tag>()?;
        }
        Ok(())
    }

    /// Absolute URL for a path on the application
    pub fn url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    /// File holding the cached API token
    pub fn api_auth_file(&self) -> PathBuf {
        self.auth_dir.join("api-user.json")
    }

    /// File holding the cached browser storage state
    pub fn ui_auth_file(&self) -> PathBuf {
        self.auth_dir.join("user.json")
    }
}

fn parse_flag(name: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(Error::InvalidConfig(format!("{}: not a boolean: {}", name, other))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = HarnessConfig::load(&dir.path().join("nope.toml")).unwrap();
        assert_eq!(config, HarnessConfig::default());
        assert_eq!(config.exclude_tags, vec!["known-bug".to_string()]);
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("appcheck.toml");
        std::fs::write(
            &path,
            r#"
base_url = "http://127.0.0.1:4000"

[browser]
kind = "firefox"

[timeouts]
expect_ms = 250
"#,
        )
        .unwrap();

        let config = HarnessConfig::load(&path).unwrap();
        assert_eq!(config.base_url, "http://127.0.0.1:4000");
        assert_eq!(config.browser.kind, BrowserKind::Firefox);
        assert!(config.browser.headless);
        assert_eq!(config.timeouts.expect(), Duration::from_millis(250));
        assert_eq!(config.timeouts.action_ms, 5_000);
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("appcheck.toml");
        let mut config = HarnessConfig::default();
        config.auth_dir = PathBuf::from("/tmp/auth");
        config.save(&path).unwrap();

        assert_eq!(HarnessConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn test_rejects_non_http_base_url() {
        let config = HarnessConfig {
            base_url: "localhost:3000".to_string(),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_rejects_unknown_excluded_tag() {
        let config = HarnessConfig {
            exclude_tags: vec!["flaky-ish".to_string()],
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(Error::UnknownTag(_))));
    }

    #[test]
    fn test_url_joins_without_double_slash() {
        let config = HarnessConfig {
            base_url: "http://localhost:3000/".to_string(),
            ..Default::default()
        };
        assert_eq!(config.url("/api/users"), "http://localhost:3000/api/users");
        assert_eq!(config.url("login/"), "http://localhost:3000/login/");
    }
}
