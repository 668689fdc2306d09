use crate::error::StartupError;
use crate::store::RetentionPolicy;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use url::Url;

const DEFAULT_STORAGE_FILE: &str = "leads_store.json";
const MIN_RETENTION_DAYS: u32 = 1;
const MIN_STORED_ITEMS: usize = 100;

#[derive(Debug, Clone)]
pub struct Config {
    pub bot_token: String,
    pub admin_username: Option<String>,
    pub admin_chat_id: Option<i64>,
    pub webapp_url: Option<Url>,
    pub public_base_url: Option<Url>,
    pub listen_host: String,
    pub listen_port: u16,
    pub verify_init_data: bool,
    pub cors_origin: String,
    pub strict_admin_check: bool,
    pub storage_retention_days: u32,
    pub max_stored_items: usize,
    pub storage_path: PathBuf,
    pub request_timeout_seconds: u64,
}

/// File layer; every key is optional so the environment can fill the gaps.
#[derive(Debug, Default, Deserialize)]
struct RawConfig {
    bot_token: Option<String>,
    admin_username: Option<String>,
    admin_chat_id: Option<i64>,
    webapp_url: Option<String>,
    public_base_url: Option<String>,
    listen_host: Option<String>,
    listen_port: Option<u16>,
    verify_init_data: Option<bool>,
    cors_origin: Option<String>,
    strict_admin_check: Option<bool>,
    storage_retention_days: Option<u32>,
    max_stored_items: Option<usize>,
    storage_path: Option<PathBuf>,
    request_timeout_seconds: Option<u64>,
}

impl RawConfig {
    /// Non-empty environment values win over the file.
    fn apply_env(&mut self, env: &dyn Fn(&str) -> Option<String>) {
        if let Some(v) = env("BOT_TOKEN") {
            self.bot_token = Some(v);
        }
        if let Some(v) = env("ADMIN_USERNAME") {
            self.admin_username = Some(v);
        }
        if let Some(v) = env("ADMIN_CHAT_ID") {
            self.admin_chat_id = parse_env("ADMIN_CHAT_ID", &v).or(self.admin_chat_id);
        }
        if let Some(v) = env("WEBAPP_URL") {
            self.webapp_url = Some(v);
        }
        if let Some(v) = env("PUBLIC_BASE_URL") {
            self.public_base_url = Some(v);
        }
        if let Some(v) = env("LISTEN_HOST") {
            self.listen_host = Some(v);
        }
        if let Some(v) = env("LISTEN_PORT") {
            self.listen_port = parse_env("LISTEN_PORT", &v).or(self.listen_port);
        }
        if let Some(v) = env("PORT") {
            self.listen_port = parse_env("PORT", &v).or(self.listen_port);
        }
        if let Some(v) = env("VERIFY_INIT_DATA") {
            self.verify_init_data = Some(parse_bool(&v));
        }
        if let Some(v) = env("CORS_ORIGIN") {
            self.cors_origin = Some(v);
        }
        if let Some(v) = env("STRICT_ADMIN_CHECK") {
            self.strict_admin_check = Some(parse_bool(&v));
        }
        if let Some(v) = env("STORAGE_RETENTION_DAYS") {
            self.storage_retention_days = parse_env("STORAGE_RETENTION_DAYS", &v).or(self.storage_retention_days);
        }
        if let Some(v) = env("MAX_STORED_ITEMS") {
            self.max_stored_items = parse_env("MAX_STORED_ITEMS", &v).or(self.max_stored_items);
        }
        if let Some(v) = env("STORAGE_PATH") {
            self.storage_path = Some(PathBuf::from(v));
        }
        if let Some(v) = env("REQUEST_TIMEOUT_SECONDS") {
            self.request_timeout_seconds = parse_env("REQUEST_TIMEOUT_SECONDS", &v).or(self.request_timeout_seconds);
        }
    }
}

fn parse_env<T: FromStr>(key: &str, value: &str) -> Option<T> {
    match value.trim().parse() {
        Ok(parsed) => Some(parsed),
        Err(_) => {
            tracing::warn!(key, value, "Ignoring unparsable environment value");
            None
        }
    }
}

fn parse_bool(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_url(key: &str, value: Option<String>) -> Result<Option<Url>, StartupError> {
    non_empty(value)
        .map(|raw| {
            Url::parse(&raw)
                .map_err(|e| StartupError::ConfigInvalid(format!("{key} is not a valid URL: {e}")))
        })
        .transpose()
}

impl Config {
    pub fn load(config_path: Option<&Path>) -> anyhow::Result<Self> {
        let path = match config_path {
            Some(path) => path.to_path_buf(),
            None => config_file_path()?,
        };
        let env = |key: &str| std::env::var(key).ok().filter(|v| !v.trim().is_empty());
        Self::load_from_path(&path, &env)
    }

    /// A missing file is fine; the environment alone may carry the settings.
    pub fn load_from_path(
        config_path: &Path,
        env: &dyn Fn(&str) -> Option<String>,
    ) -> anyhow::Result<Self> {
        let mut raw = if config_path.exists() {
            let contents = std::fs::read_to_string(config_path).map_err(|e| {
                StartupError::ConfigInvalid(format!(
                    "Cannot read config at {}: {}",
                    config_path.display(),
                    e
                ))
            })?;
            toml::from_str(&contents).map_err(|e| {
                StartupError::ConfigInvalid(format!(
                    "Invalid TOML in {}: {}",
                    config_path.display(),
                    e
                ))
            })?
        } else {
            RawConfig::default()
        };
        raw.apply_env(env);

        let base_dir = config_path.parent().unwrap_or_else(|| Path::new("."));
        let config = Self::from_raw(raw, base_dir)?;
        config.validate()?;
        Ok(config)
    }

    fn from_raw(raw: RawConfig, base_dir: &Path) -> Result<Self, StartupError> {
        let storage_path = raw
            .storage_path
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_STORAGE_FILE));
        let storage_path = if storage_path.is_absolute() {
            storage_path
        } else {
            base_dir.join(storage_path)
        };

        Ok(Self {
            bot_token: non_empty(raw.bot_token).unwrap_or_default(),
            admin_username: non_empty(raw.admin_username)
                .map(|u| u.trim_start_matches('@').to_string())
                .filter(|u| !u.is_empty()),
            admin_chat_id: raw.admin_chat_id,
            webapp_url: parse_url("webapp_url", raw.webapp_url)?,
            public_base_url: parse_url("public_base_url", raw.public_base_url)?,
            listen_host: non_empty(raw.listen_host).unwrap_or_else(|| "0.0.0.0".to_string()),
            listen_port: raw.listen_port.unwrap_or(8080),
            verify_init_data: raw.verify_init_data.unwrap_or(false),
            cors_origin: non_empty(raw.cors_origin).unwrap_or_else(|| "*".to_string()),
            strict_admin_check: raw.strict_admin_check.unwrap_or(true),
            storage_retention_days: raw
                .storage_retention_days
                .unwrap_or(30)
                .max(MIN_RETENTION_DAYS),
            max_stored_items: raw.max_stored_items.unwrap_or(3000).max(MIN_STORED_ITEMS),
            storage_path,
            request_timeout_seconds: raw.request_timeout_seconds.unwrap_or(10),
        })
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.bot_token.is_empty() {
            anyhow::bail!("bot_token is required (env BOT_TOKEN or config file)");
        }
        if self.request_timeout_seconds == 0 || self.request_timeout_seconds > 60 {
            anyhow::bail!("request_timeout_seconds must be between 1 and 60");
        }
        Ok(())
    }

    pub fn retention(&self) -> RetentionPolicy {
        RetentionPolicy {
            retention_days: self.storage_retention_days,
            max_items: self.max_stored_items,
        }
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.listen_host, self.listen_port)
    }
}

fn config_file_path() -> anyhow::Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| StartupError::ConfigInvalid("Cannot determine home directory".to_string()))?;
    Ok(home.join(".config").join("lead-relay").join("config.toml"))
}
