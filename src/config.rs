use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "http://localhost:49483";
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Settings for talking to the designer service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    pub base_url: String,
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
    pub user_agent: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            user_agent: format!("appctl/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// Optional on-disk overrides, e.g.
///
/// ```json
/// { "base_url": "http://designer.local:49483", "request_timeout": "30s" }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub base_url: Option<String>,
    #[serde(with = "humantime_serde")]
    pub request_timeout: Option<Duration>,
}

impl FileConfig {
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("appctl").join("config.json"))
    }

    /// Read `path`. A missing file is an empty config; a malformed one is an
    /// error.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => {
                return Err(anyhow::Error::new(e)
                    .context(format!("failed to read config {}", path.display())))
            }
        };
        serde_json::from_str(&raw)
            .map_err(|e| anyhow::anyhow!("invalid config {}: {e}", path.display()))
    }

    pub fn load_default() -> anyhow::Result<Self> {
        match Self::default_path() {
            Some(path) => Self::load(&path),
            None => Ok(Self::default()),
        }
    }
}

/// Layer flag values over the file over built-in defaults.
pub fn resolve(
    base_url: Option<String>,
    request_timeout: Option<Duration>,
    file: FileConfig,
) -> ClientConfig {
    let defaults = ClientConfig::default();
    ClientConfig {
        base_url: base_url.or(file.base_url).unwrap_or(defaults.base_url),
        request_timeout: request_timeout
            .or(file.request_timeout)
            .unwrap_or(defaults.request_timeout),
        user_agent: defaults.user_agent,
    }
}
