use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use webwrap_core::{CommandProgram, Hooks, Schema, SchemaError, Wrapper, WrapperConfig, source};

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_TIMEOUT_SECS: u64 = 300;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Json,
    Text,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(LogFormat::Json),
            "text" | "pretty" => Ok(LogFormat::Text),
            other => Err(format!("unknown log format '{other}', expected json or text")),
        }
    }
}

/// Listener and transport settings.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Icon served at `/favicon.ico`; requests 404 when unset or unreadable.
    pub favicon: Option<PathBuf>,
    /// Upper bound on one program execution.
    pub execution_timeout: Duration,
    pub log_format: LogFormat,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            favicon: None,
            execution_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            log_format: LogFormat::default(),
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            host: std::env::var("WEBWRAP_HOST").unwrap_or(defaults.host),
            port: std::env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(defaults.port),
            favicon: std::env::var("WEBWRAP_FAVICON").ok().map(PathBuf::from),
            execution_timeout: std::env::var("WEBWRAP_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.execution_timeout),
            log_format: std::env::var("WEBWRAP_LOG_FORMAT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.log_format),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid hooks in {path}: {source}")]
    Hooks {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error(transparent)]
    Schema(#[from] SchemaError),
}

fn read(path: PathBuf) -> Result<String, ConfigError> {
    std::fs::read_to_string(&path).map_err(|source| ConfigError::Read { path, source })
}

/// Form options from `WEBWRAP_*` variables.
pub fn wrapper_config_from_env() -> Result<WrapperConfig, ConfigError> {
    let mut config = WrapperConfig::default();
    if let Ok(name) = std::env::var("WEBWRAP_FORM_NAME") {
        config.form_name = name;
    }
    config.destination_prefix = std::env::var("WEBWRAP_PREFIX").ok().filter(|p| !p.is_empty());
    if let Ok(groups) = std::env::var("WEBWRAP_SKIP_GROUPS") {
        config.skip_groups = groups
            .split(',')
            .map(str::trim)
            .filter(|group| !group.is_empty())
            .map(str::to_string)
            .collect();
    }
    config.use_tables = std::env::var("WEBWRAP_USE_TABLES")
        .map(|v| v == "true" || v == "1")
        .unwrap_or(false);
    if let Ok(path) = std::env::var("WEBWRAP_HOOKS") {
        config.hooks = load_hooks(PathBuf::from(path))?;
    }
    Ok(config)
}

/// Read a flat JSON object of `<dest>.handlers` / `<dest>.split` hooks.
pub fn load_hooks(path: PathBuf) -> Result<Hooks, ConfigError> {
    let text = read(path.clone())?;
    serde_json::from_str::<Hooks>(&text).map_err(|source| ConfigError::Hooks { path, source })
}

/// Parse the JSON schema document at `path`.
pub fn load_schema(path: PathBuf) -> Result<Schema, ConfigError> {
    Ok(source::from_json(&read(path)?)?)
}

/// Wrap the external command named by `WEBWRAP_COMMAND`, described by the
/// JSON schema at `WEBWRAP_SCHEMA`.
pub fn wrapper_from_env() -> Result<Wrapper, ConfigError> {
    let command = std::env::var("WEBWRAP_COMMAND").map_err(|_| ConfigError::Missing("WEBWRAP_COMMAND"))?;
    let schema_path = std::env::var("WEBWRAP_SCHEMA").map_err(|_| ConfigError::Missing("WEBWRAP_SCHEMA"))?;

    let mut words = command.split_whitespace();
    let program = words.next().ok_or(ConfigError::Missing("WEBWRAP_COMMAND"))?;
    let schema = load_schema(PathBuf::from(schema_path))?;
    let program = CommandProgram::new(program, &schema).args(words);

    Ok(Wrapper::new(schema, program, wrapper_config_from_env()?)?)
}
