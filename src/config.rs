//! Conductor SDK configuration management
//!
//! Configuration lives in `~/.conductor/config.yaml` by default (TOML is
//! accepted when the file has a `.toml` extension). A handful of
//! `CONDUCTOR_*` environment variables override file values.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::path::{Component, Path, PathBuf};

pub const CONFIG_ENV_VAR: &str = "CONDUCTOR_CONFIG";
pub const AGENT_TOKEN_ENV_VAR: &str = "CONDUCTOR_AGENT_TOKEN";
pub const BACKEND_URL_ENV_VAR: &str = "CONDUCTOR_BACKEND_URL";
pub const WS_URL_ENV_VAR: &str = "CONDUCTOR_WS_URL";
pub const LOG_LEVEL_ENV_VAR: &str = "CONDUCTOR_LOG_LEVEL";

const LOG_LEVELS: [&str; 5] = ["critical", "debug", "error", "info", "warning"];

/// Main Conductor configuration
#[derive(Clone, Serialize, Deserialize)]
pub struct ConductorConfig {
    /// Token issued by the backend for this agent
    #[serde(default)]
    pub agent_token: String,

    /// Base HTTP(S) endpoint of the Conductor backend
    #[serde(default = "default_backend_url")]
    pub backend_url: String,

    /// Optional override for the backend WebSocket endpoint
    #[serde(default)]
    pub websocket_url: Option<String>,

    /// Log verbosity (debug, info, warning, error, critical)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Local project roots this agent works in
    #[serde(default)]
    pub projects: Vec<ProjectConfig>,

    /// Connection tuning
    #[serde(default)]
    pub connection: ConnectionConfig,
}

fn default_backend_url() -> String {
    "https://api.conductor.local".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ConductorConfig {
    fn default() -> Self {
        Self {
            agent_token: String::new(),
            backend_url: default_backend_url(),
            websocket_url: None,
            log_level: default_log_level(),
            projects: Vec::new(),
            connection: ConnectionConfig::default(),
        }
    }
}

impl fmt::Debug for ConductorConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConductorConfig")
            .field("agent_token", &"<redacted>")
            .field("backend_url", &self.backend_url)
            .field("websocket_url", &self.websocket_url)
            .field("log_level", &self.log_level)
            .field("projects", &self.projects)
            .field("connection", &self.connection)
            .finish()
    }
}

/// Reconnect and heartbeat timing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Fixed delay between connection attempts, in milliseconds
    pub reconnect_delay_ms: u64,

    /// Ping interval on a live connection, in seconds (0 disables pings)
    pub heartbeat_interval_secs: u64,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            reconnect_delay_ms: 3000,
            heartbeat_interval_secs: 20,
        }
    }
}

/// Per-project execution context
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// Project root; `~` is expanded and the path made absolute on load
    pub path: PathBuf,

    /// Human friendly label
    #[serde(default)]
    pub name: Option<String>,

    /// Preferred model for completions
    #[serde(default)]
    pub default_model: Option<String>,

    /// Execution environment hint (conda env, docker image, ...)
    #[serde(default, alias = "environment")]
    pub env: Option<String>,
}

impl ProjectConfig {
    /// Whether `path` is this project root or lies inside it
    pub fn matches(&self, path: &Path) -> bool {
        path.starts_with(&self.path)
    }
}

impl ConductorConfig {
    /// Load from the default locations using the process environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let env: HashMap<String, String> = std::env::vars().collect();
        load_config(path, &env)
    }

    /// Final WebSocket endpoint: the explicit override, else derived from
    /// the backend URL (`wss` for https backends, `ws` otherwise)
    pub fn resolved_websocket_url(&self) -> Result<String> {
        if let Some(url) = self.websocket_url.as_deref() {
            check_scheme(url, &["ws", "wss"])
                .map_err(|_| Error::Config("websocket_url must start with ws:// or wss://".into()))?;
            return Ok(url.to_string());
        }

        let backend = reqwest::Url::parse(&self.backend_url)
            .map_err(|e| Error::Config(format!("Invalid backend_url: {}", e)))?;
        let host = backend
            .host_str()
            .ok_or_else(|| Error::Config("backend_url has no host".to_string()))?;
        let scheme = if backend.scheme() == "https" { "wss" } else { "ws" };
        let authority = match backend.port() {
            Some(port) => format!("{}:{}", host, port),
            None => host.to_string(),
        };
        Ok(format!("{}://{}/ws/agent", scheme, authority))
    }

    /// `tracing` directive equivalent of `log_level`
    pub fn tracing_level(&self) -> &'static str {
        match self.log_level.as_str() {
            "debug" => "debug",
            "warning" => "warn",
            "error" | "critical" => "error",
            _ => "info",
        }
    }

    /// First configured project
    pub fn default_project(&self) -> Option<&ProjectConfig> {
        self.projects.first()
    }

    /// Most specific project containing `path` (defaults to the current
    /// directory)
    pub fn find_project_for_path(&self, path: Option<&Path>) -> Option<&ProjectConfig> {
        if self.projects.is_empty() {
            return None;
        }
        let target = match path {
            Some(path) => normalize_path(path),
            None => normalize_path(&std::env::current_dir().ok()?),
        };

        self.projects
            .iter()
            .filter(|project| project.matches(&target))
            .max_by_key(|project| project.path.components().count())
    }

    /// Like [`find_project_for_path`](Self::find_project_for_path) but fails
    /// when nothing matches
    pub fn require_project(&self, path: Option<&Path>) -> Result<&ProjectConfig> {
        self.find_project_for_path(path).ok_or_else(|| {
            let shown = path
                .map(Path::to_path_buf)
                .or_else(|| std::env::current_dir().ok())
                .unwrap_or_default();
            Error::Config(format!(
                "No project configured for path {}. Update ~/.conductor/config.yaml to include it.",
                shown.display()
            ))
        })
    }

    /// Normalize fields in place and report every invalid value at once
    fn validate(&mut self) -> Result<()> {
        let mut errors = Vec::new();

        self.agent_token = self.agent_token.trim().to_string();
        if self.agent_token.is_empty() {
            errors.push("agent_token: must be provided".to_string());
        }

        self.log_level = self.log_level.trim().to_lowercase();
        if !LOG_LEVELS.contains(&self.log_level.as_str()) {
            errors.push(format!("log_level: must be one of {:?}", LOG_LEVELS));
        }

        if let Err(e) = check_scheme(&self.backend_url, &["http", "https"]) {
            errors.push(format!("backend_url: {}", e));
        }

        if let Some(url) = self.websocket_url.as_deref() {
            if check_scheme(url, &["ws", "wss"]).is_err() {
                errors.push("websocket_url: must start with ws:// or wss://".to_string());
            }
        }

        for (i, project) in self.projects.iter_mut().enumerate() {
            if project.path.as_os_str().is_empty() {
                errors.push(format!("projects.{}.path: cannot be empty", i));
            } else {
                project.path = normalize_path(&project.path);
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(Error::Config(format!(
                "Invalid Conductor configuration:\n- {}",
                errors.join("\n- ")
            )))
        }
    }
}

/// Load, parse, apply environment overrides to, and validate the config.
///
/// The file is `path` if given, else `$CONDUCTOR_CONFIG`, else
/// `~/.conductor/config.yaml`.
pub fn load_config(path: Option<&Path>, env: &HashMap<String, String>) -> Result<ConductorConfig> {
    let config_path = resolve_config_path(path, env);
    if !config_path.exists() {
        return Err(Error::Config(format!(
            "Conductor config file not found at {}",
            config_path.display()
        )));
    }

    let content = std::fs::read_to_string(&config_path)?;
    let mut data = parse_document(&config_path, &content)?;
    apply_env_overrides(&mut data, env);

    let mut config: ConductorConfig = serde_json::from_value(Value::Object(data))
        .map_err(|e| Error::Config(format!("Invalid Conductor configuration:\n- {}", e)))?;
    config.validate()?;

    tracing::debug!(path = %config_path.display(), projects = config.projects.len(), "Loaded configuration");
    Ok(config)
}

fn resolve_config_path(path: Option<&Path>, env: &HashMap<String, String>) -> PathBuf {
    if let Some(path) = path {
        return normalize_path(path);
    }
    if let Some(env_path) = env.get(CONFIG_ENV_VAR).filter(|p| !p.is_empty()) {
        return normalize_path(Path::new(env_path));
    }
    let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
    home.join(".conductor").join("config.yaml")
}

fn parse_document(path: &Path, content: &str) -> Result<Map<String, Value>> {
    if content.trim().is_empty() {
        return Ok(Map::new());
    }

    let is_toml = path
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("toml"))
        .unwrap_or(false);
    let value: Value = if is_toml {
        toml::from_str(content)?
    } else {
        serde_yaml::from_str(content)?
    };

    match value {
        Value::Object(map) => Ok(map),
        Value::Null => Ok(Map::new()),
        _ => Err(Error::Config(format!(
            "Invalid Conductor configuration:\n- Expected mapping at root of {}",
            path.display()
        ))),
    }
}

fn apply_env_overrides(data: &mut Map<String, Value>, env: &HashMap<String, String>) {
    let overrides = [
        ("agent_token", AGENT_TOKEN_ENV_VAR),
        ("backend_url", BACKEND_URL_ENV_VAR),
        ("websocket_url", WS_URL_ENV_VAR),
        ("log_level", LOG_LEVEL_ENV_VAR),
    ];
    for (key, var) in overrides {
        if let Some(value) = env.get(var).filter(|v| !v.is_empty()) {
            data.insert(key.to_string(), Value::String(value.clone()));
        }
    }
}

fn check_scheme(url: &str, allowed: &[&str]) -> std::result::Result<(), String> {
    let parsed = reqwest::Url::parse(url).map_err(|e| format!("invalid URL ({})", e))?;
    if !allowed.contains(&parsed.scheme()) {
        return Err(format!("scheme must be one of {:?}", allowed));
    }
    if parsed.host_str().map_or(true, str::is_empty) {
        return Err("URL has no host".to_string());
    }
    Ok(())
}

/// Expand `~`, anchor relative paths at the current directory and resolve
/// symlinks in the longest prefix that exists
fn normalize_path(path: &Path) -> PathBuf {
    let expanded = match path.strip_prefix("~") {
        Ok(rest) => match dirs::home_dir() {
            Some(home) => home.join(rest),
            None => path.to_path_buf(),
        },
        Err(_) => path.to_path_buf(),
    };
    let absolute = if expanded.is_absolute() {
        expanded
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(&expanded))
            .unwrap_or(expanded)
    };

    let mut lexical = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                lexical.pop();
            }
            other => lexical.push(other.as_os_str()),
        }
    }

    for ancestor in lexical.ancestors() {
        if let Ok(canonical) = ancestor.canonicalize() {
            return match lexical.strip_prefix(ancestor) {
                Ok(rest) if !rest.as_os_str().is_empty() => canonical.join(rest),
                _ => canonical,
            };
        }
    }
    lexical
}

// Helper module for the user's home directory
mod dirs {
    use std::path::PathBuf;

    pub fn home_dir() -> Option<PathBuf> {
        #[cfg(target_os = "windows")]
        {
            std::env::var("USERPROFILE").ok().map(PathBuf::from)
        }
        #[cfg(not(target_os = "windows"))]
        {
            std::env::var("HOME").ok().map(PathBuf::from)
        }
    }
}
