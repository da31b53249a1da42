use std::env;
use std::path::PathBuf;

const APP_DIR: &str = "courtside";
const DEFAULT_HOST: &str = "tennisapi1.p.rapidapi.com";
const DEFAULT_RETRIES: u32 = 3;
const DEFAULT_BACKOFF_MS: u64 = 500;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub api_key: Option<String>,
    pub api_host: String,
    pub db_path: PathBuf,
    pub model_dir: PathBuf,
    pub retries: u32,
    pub backoff_ms: u64,
}

impl AppConfig {
    /// Reads the process environment. Call after the dotenv files are loaded.
    pub fn from_env() -> Self {
        let api_key = env_string("RAPIDAPI_KEY");
        let api_host = env_string("RAPIDAPI_HOST").unwrap_or_else(|| DEFAULT_HOST.to_string());
        let base = app_cache_dir().unwrap_or_else(|| PathBuf::from(".").join(APP_DIR));
        let db_path = env_string("COURTSIDE_DB")
            .map(PathBuf::from)
            .unwrap_or_else(|| base.join("predictions.sqlite"));
        let model_dir = env_string("COURTSIDE_MODEL_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| base.join("models"));
        let retries = env_string("API_RETRIES")
            .and_then(|v| v.parse::<u32>().ok())
            .unwrap_or(DEFAULT_RETRIES)
            .clamp(0, 8);
        let backoff_ms = env_string("API_BACKOFF_MS")
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(DEFAULT_BACKOFF_MS);

        Self {
            api_key,
            api_host,
            db_path,
            model_dir,
            retries,
            backoff_ms,
        }
    }

    pub fn base_url(&self) -> String {
        format!("https://{}", self.api_host.trim_end_matches('/'))
    }
}

/// `$XDG_CACHE_HOME/courtside`, falling back to `~/.cache/courtside`.
pub fn app_cache_dir() -> Option<PathBuf> {
    if let Some(base) = env_string("XDG_CACHE_HOME") {
        return Some(PathBuf::from(base).join(APP_DIR));
    }
    let home = env_string("HOME")?;
    Some(PathBuf::from(home).join(".cache").join(APP_DIR))
}

fn env_string(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}
