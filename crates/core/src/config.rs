use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::flows::states::StepPolicy;

pub const DEFAULT_SENDER_SUFFIX_LEN: usize = 9;
const MAX_SENDER_SUFFIX_LEN: usize = 15;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub flow: FlowConfig,
    pub lookup: LookupConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct FlowConfig {
    pub bot_name: String,
    pub step_policy: StepPolicy,
    pub unknown_sender_policy: UnknownSenderPolicy,
    /// Conversations left mid-flow for longer than this fall back to `Idle`.
    pub session_timeout_secs: Option<u64>,
}

#[derive(Clone, Debug)]
pub struct LookupConfig {
    pub sender_suffix_len: usize,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

/// What to do with a message whose sender has no employee record.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnknownSenderPolicy {
    #[default]
    Allow,
    Reject,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub step_policy: Option<StepPolicy>,
    pub unknown_sender_policy: Option<UnknownSenderPolicy>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://echelon.db?mode=rwc".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            flow: FlowConfig {
                bot_name: "Echelon Bot".to_string(),
                step_policy: StepPolicy::Lenient,
                unknown_sender_policy: UnknownSenderPolicy::Allow,
                session_timeout_secs: None,
            },
            lookup: LookupConfig { sender_suffix_len: DEFAULT_SENDER_SUFFIX_LEN },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl std::str::FromStr for UnknownSenderPolicy {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "allow" => Ok(Self::Allow),
            "reject" => Ok(Self::Reject),
            other => Err(ConfigError::Validation(format!(
                "unsupported unknown sender policy `{other}` (expected allow|reject)"
            ))),
        }
    }
}

pub fn parse_step_policy(value: &str) -> Result<StepPolicy, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "lenient" => Ok(StepPolicy::Lenient),
        "strict" => Ok(StepPolicy::Strict),
        other => Err(ConfigError::Validation(format!(
            "unsupported step policy `{other}` (expected lenient|strict)"
        ))),
    }
}

impl FlowConfig {
    pub fn session_timeout(&self) -> Option<chrono::Duration> {
        self.session_timeout_secs
            .and_then(|secs| i64::try_from(secs).ok())
            .map(chrono::Duration::seconds)
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("echelon.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(database) = patch.database {
            if let Some(url) = database.url {
                self.database.url = url;
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
            }
        }

        if let Some(flow) = patch.flow {
            if let Some(bot_name) = flow.bot_name {
                self.flow.bot_name = bot_name;
            }
            if let Some(step_policy) = flow.step_policy {
                self.flow.step_policy = step_policy;
            }
            if let Some(unknown_sender_policy) = flow.unknown_sender_policy {
                self.flow.unknown_sender_policy = unknown_sender_policy;
            }
            if let Some(session_timeout_secs) = flow.session_timeout_secs {
                self.flow.session_timeout_secs = Some(session_timeout_secs);
            }
        }

        if let Some(lookup) = patch.lookup {
            if let Some(sender_suffix_len) = lookup.sender_suffix_len {
                self.lookup.sender_suffix_len = sender_suffix_len;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("ECHELON_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("ECHELON_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = parse_u32("ECHELON_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("ECHELON_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("ECHELON_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("ECHELON_FLOW_BOT_NAME") {
            self.flow.bot_name = value;
        }
        if let Some(value) = read_env("ECHELON_FLOW_STEP_POLICY") {
            self.flow.step_policy = parse_step_policy(&value)?;
        }
        if let Some(value) = read_env("ECHELON_FLOW_UNKNOWN_SENDER_POLICY") {
            self.flow.unknown_sender_policy = value.parse()?;
        }
        if let Some(value) = read_env("ECHELON_FLOW_SESSION_TIMEOUT_SECS") {
            self.flow.session_timeout_secs =
                Some(parse_u64("ECHELON_FLOW_SESSION_TIMEOUT_SECS", &value)?);
        }

        if let Some(value) = read_env("ECHELON_LOOKUP_SENDER_SUFFIX_LEN") {
            self.lookup.sender_suffix_len =
                parse_usize("ECHELON_LOOKUP_SENDER_SUFFIX_LEN", &value)?;
        }

        let log_level = read_env("ECHELON_LOGGING_LEVEL").or_else(|| read_env("ECHELON_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("ECHELON_LOGGING_FORMAT").or_else(|| read_env("ECHELON_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(step_policy) = overrides.step_policy {
            self.flow.step_policy = step_policy;
        }
        if let Some(unknown_sender_policy) = overrides.unknown_sender_policy {
            self.flow.unknown_sender_policy = unknown_sender_policy;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_flow(&self.flow)?;
        validate_lookup(&self.lookup)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("echelon.toml"), PathBuf::from("config/echelon.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_database(database: &DatabaseConfig) -> Result<(), ConfigError> {
    let url = database.url.trim();
    let sqlite_url =
        url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
    if !sqlite_url {
        return Err(ConfigError::Validation(
            "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                .to_string(),
        ));
    }

    if database.max_connections == 0 {
        return Err(ConfigError::Validation(
            "database.max_connections must be greater than zero".to_string(),
        ));
    }

    if database.timeout_secs == 0 || database.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "database.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_flow(flow: &FlowConfig) -> Result<(), ConfigError> {
    if flow.bot_name.trim().is_empty() {
        return Err(ConfigError::Validation("flow.bot_name must not be empty".to_string()));
    }

    if flow.session_timeout_secs == Some(0) {
        return Err(ConfigError::Validation(
            "flow.session_timeout_secs must be greater than zero when set".to_string(),
        ));
    }

    Ok(())
}

fn validate_lookup(lookup: &LookupConfig) -> Result<(), ConfigError> {
    if lookup.sender_suffix_len == 0 || lookup.sender_suffix_len > MAX_SENDER_SUFFIX_LEN {
        return Err(ConfigError::Validation(format!(
            "lookup.sender_suffix_len must be in range 1..={MAX_SENDER_SUFFIX_LEN}"
        )));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_usize(key: &str, value: &str) -> Result<usize, ConfigError> {
    value.parse::<usize>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    flow: Option<FlowPatch>,
    lookup: Option<LookupPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct FlowPatch {
    bot_name: Option<String>,
    step_policy: Option<StepPolicy>,
    unknown_sender_policy: Option<UnknownSenderPolicy>,
    session_timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LookupPatch {
    sender_suffix_len: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
