use anyhow::{Context, Result};
use directories::UserDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

// ── Top-level config ──────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Data directory - computed from home, not serialized
    #[serde(skip)]
    pub data_dir: PathBuf,
    /// Path to config.toml - computed from data_dir, not serialized
    #[serde(skip)]
    pub config_path: PathBuf,

    #[serde(default)]
    pub endpoints: EndpointsConfig,

    #[serde(default)]
    pub timeouts: TimeoutsConfig,

    #[serde(default)]
    pub sessions: SessionsConfig,

    #[serde(default)]
    pub credentials: CredentialsConfig,
}

// ── Endpoints ─────────────────────────────────────────────────────

/// Remote application endpoints and routing labels.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EndpointsConfig {
    /// Canonical application origin. Also the `Origin` used for SAPISIDHASH.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Build label sent as `bl` on batchexecute calls.
    #[serde(default = "default_build_label")]
    pub build_label: String,
    /// Build label sent as `bl` on streaming query calls.
    #[serde(default = "default_stream_build_label")]
    pub stream_build_label: String,
    /// Locale sent as `hl`.
    #[serde(default = "default_locale")]
    pub locale: String,
}

fn default_base_url() -> String {
    "https://notebooklm.google.com".into()
}

fn default_build_label() -> String {
    "boq_labs-tailwind-frontend_20250129.00_p0".into()
}

fn default_stream_build_label() -> String {
    "boq_assistant-bard-web-server_20250203.16_p0".into()
}

fn default_locale() -> String {
    "en".into()
}

impl Default for EndpointsConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            build_label: default_build_label(),
            stream_build_label: default_stream_build_label(),
            locale: default_locale(),
        }
    }
}

impl EndpointsConfig {
    /// Endpoints rooted at an arbitrary origin (mock servers, staging).
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            ..Self::default()
        }
    }

    pub fn origin(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }

    pub fn referer(&self) -> String {
        format!("{}/", self.origin())
    }

    pub fn batchexecute_url(&self) -> String {
        format!(
            "{}/_/NotebookLmFrontendUi/data/batchexecute",
            self.origin()
        )
    }

    pub fn query_stream_url(&self) -> String {
        format!(
            "{}/_/NotebookLmFrontendUi/data/AssistantStreamService/GenerateFreeFormStreamed",
            self.origin()
        )
    }

    pub fn notebook_url(&self, notebook_id: &str) -> String {
        format!("{}/notebook/{notebook_id}", self.origin())
    }
}

// ── Timeouts ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TimeoutsConfig {
    /// Default deadline for one batchexecute call.
    #[serde(default = "default_rpc_ms")]
    pub rpc_ms: u64,
    /// Deadline for a streaming query.
    #[serde(default = "default_query_ms")]
    pub query_ms: u64,
    /// Deadline for page navigation in a session.
    #[serde(default = "default_navigation_ms")]
    pub navigation_ms: u64,
    /// Validity of an acquired CSRF token.
    #[serde(default = "default_csrf_ttl_secs")]
    pub csrf_ttl_secs: u64,
}

fn default_rpc_ms() -> u64 {
    60_000
}

fn default_query_ms() -> u64 {
    120_000
}

fn default_navigation_ms() -> u64 {
    30_000
}

fn default_csrf_ttl_secs() -> u64 {
    300
}

impl Default for TimeoutsConfig {
    fn default() -> Self {
        Self {
            rpc_ms: default_rpc_ms(),
            query_ms: default_query_ms(),
            navigation_ms: default_navigation_ms(),
            csrf_ttl_secs: default_csrf_ttl_secs(),
        }
    }
}

impl TimeoutsConfig {
    pub fn rpc(&self) -> Duration {
        Duration::from_millis(self.rpc_ms)
    }

    pub fn query(&self) -> Duration {
        Duration::from_millis(self.query_ms)
    }

    pub fn navigation(&self) -> Duration {
        Duration::from_millis(self.navigation_ms)
    }

    pub fn csrf_ttl(&self) -> Duration {
        Duration::from_secs(self.csrf_ttl_secs)
    }
}

// ── Sessions ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionsConfig {
    /// Upper bound on concurrently open browser sessions.
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,
    /// Inactivity after which a session may be evicted.
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
    /// Period of the background idle sweep.
    #[serde(default = "default_cleanup_interval_secs")]
    pub cleanup_interval_secs: u64,
}

fn default_max_sessions() -> usize {
    5
}

fn default_idle_timeout_secs() -> u64 {
    15 * 60
}

fn default_cleanup_interval_secs() -> u64 {
    5 * 60
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self {
            max_sessions: default_max_sessions(),
            idle_timeout_secs: default_idle_timeout_secs(),
            cleanup_interval_secs: default_cleanup_interval_secs(),
        }
    }
}

impl SessionsConfig {
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs.max(1))
    }
}

// ── Credentials ───────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CredentialsConfig {
    /// OS keychain service holding the cookie encryption key.
    #[serde(default = "default_keyring_service")]
    pub keyring_service: String,
    /// OS keychain account holding the cookie encryption key.
    #[serde(default = "default_keyring_account")]
    pub keyring_account: String,
    /// Cookie domains that may be persisted and sent.
    #[serde(default = "default_allowed_cookie_domains")]
    pub allowed_cookie_domains: Vec<String>,
}

fn default_keyring_service() -> String {
    "notebooklm-client".into()
}

fn default_keyring_account() -> String {
    "encryption-key".into()
}

fn default_allowed_cookie_domains() -> Vec<String> {
    vec![
        ".google.com".into(),
        "google.com".into(),
        "notebooklm.google.com".into(),
    ]
}

impl Default for CredentialsConfig {
    fn default() -> Self {
        Self {
            keyring_service: default_keyring_service(),
            keyring_account: default_keyring_account(),
            allowed_cookie_domains: default_allowed_cookie_domains(),
        }
    }
}

// ── Loading ───────────────────────────────────────────────────────

impl Default for Config {
    fn default() -> Self {
        let data_dir = default_data_dir();
        Self {
            config_path: data_dir.join("config.toml"),
            data_dir,
            endpoints: EndpointsConfig::default(),
            timeouts: TimeoutsConfig::default(),
            sessions: SessionsConfig::default(),
            credentials: CredentialsConfig::default(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    UserDirs::new()
        .map(|u| u.home_dir().join(".notebooklm"))
        .unwrap_or_else(|| PathBuf::from(".notebooklm"))
}

impl Config {
    /// Load `config.toml` from the data directory, falling back to defaults.
    ///
    /// `NOTEBOOKLM_DATA_DIR` relocates the data directory. The file is never
    /// created implicitly.
    pub fn load() -> Result<Self> {
        let data_dir = match std::env::var("NOTEBOOKLM_DATA_DIR") {
            Ok(dir) if !dir.trim().is_empty() => PathBuf::from(dir),
            _ => default_data_dir(),
        };
        let mut config = Self::load_from_dir(&data_dir)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load `config.toml` from an explicit directory without env overrides.
    pub fn load_from_dir(data_dir: &Path) -> Result<Self> {
        let config_path = data_dir.join("config.toml");

        let mut config = if config_path.exists() {
            let contents =
                fs::read_to_string(&config_path).context("Failed to read config file")?;
            toml::from_str::<Config>(&contents).context("Failed to parse config file")?
        } else {
            Config::default()
        };

        // Set computed paths that are skipped during serialization
        config.data_dir = data_dir.to_path_buf();
        config.config_path = config_path;
        Ok(config)
    }

    /// Apply environment variable overrides to config
    pub fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var("NOTEBOOKLM_BASE_URL") {
            let url = url.trim();
            if !url.is_empty() {
                self.endpoints.base_url = url.trim_end_matches('/').to_string();
            }
        }

        if let Ok(raw) = std::env::var("NOTEBOOKLM_MAX_SESSIONS") {
            match raw.trim().parse::<usize>() {
                Ok(max) if max > 0 => self.sessions.max_sessions = max,
                _ => tracing::warn!("Ignoring invalid NOTEBOOKLM_MAX_SESSIONS={raw}"),
            }
        }
    }

    /// Encrypted cookie blob location.
    pub fn cookie_file(&self) -> PathBuf {
        self.data_dir.join("cookies.enc")
    }
}
