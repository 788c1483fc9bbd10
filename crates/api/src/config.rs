use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_BIND: &str = "0.0.0.0:8080";
const DEFAULT_RATE_LIMIT_WINDOW_SECONDS: u64 = 60;
const DEFAULT_RATE_LIMIT_MAX: usize = 120;
const DEFAULT_MAX_BODY_BYTES: usize = 8 * 1024 * 1024;

/// Runtime settings for the HTTP service, read once at startup.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub bind: String,
    /// Required on state writes when set; reads and questions stay open.
    pub api_key: Option<String>,
    pub database_url: Option<String>,
    /// Planning state loaded into the store before serving.
    pub state_file: Option<PathBuf>,
    /// Empty means any origin.
    pub allowed_origins: Vec<String>,
    pub rate_limit_window: Duration,
    pub rate_limit_max: usize,
    /// Key the rate limit on `x-forwarded-for` instead of the peer address.
    /// Only safe behind a proxy that overwrites the header.
    pub trust_forwarded_for: bool,
    pub max_body_bytes: usize,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind: DEFAULT_BIND.to_string(),
            api_key: None,
            database_url: None,
            state_file: None,
            allowed_origins: Vec::new(),
            rate_limit_window: Duration::from_secs(DEFAULT_RATE_LIMIT_WINDOW_SECONDS),
            rate_limit_max: DEFAULT_RATE_LIMIT_MAX,
            trust_forwarded_for: false,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }
}

impl ApiConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            bind: env_string("CRISIS_BIND").unwrap_or(defaults.bind),
            api_key: env_string("CRISIS_API_KEY"),
            database_url: env_string("CRISIS_DATABASE_URL"),
            state_file: env_string("CRISIS_STATE_FILE").map(PathBuf::from),
            allowed_origins: env_string("CRISIS_ALLOWED_ORIGINS")
                .map(|value| parse_origins(&value))
                .unwrap_or(defaults.allowed_origins),
            rate_limit_window: env_parse::<u64>("CRISIS_RATE_LIMIT_WINDOW_SECONDS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.rate_limit_window),
            rate_limit_max: env_parse("CRISIS_RATE_LIMIT_MAX").unwrap_or(defaults.rate_limit_max),
            trust_forwarded_for: env_string("CRISIS_TRUST_FORWARDED_FOR")
                .map(|value| parse_flag(&value))
                .unwrap_or(defaults.trust_forwarded_for),
            max_body_bytes: env_parse("CRISIS_MAX_BODY_BYTES").unwrap_or(defaults.max_body_bytes),
        }
    }
}

pub fn parse_origins(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|origin| origin.trim().trim_end_matches('/').to_string())
        .filter(|origin| !origin.is_empty() && origin != "*")
        .collect()
}

pub fn parse_flag(value: &str) -> bool {
    matches!(
        value.to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

fn env_string(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    env_string(key).and_then(|value| value.parse::<T>().ok())
}
