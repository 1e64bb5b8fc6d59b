// src/config.rs
use serde::Deserialize;

#[derive(Clone, Debug, Deserialize)]
pub struct Config {
    #[serde(default = "default_database_path")]
    pub database_path: String,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Shared secret for `/admin/*`. Empty disables the admin surface.
    #[serde(default)]
    pub admin_secret_token: String,
    /// Bearer secret for `/cron`. Empty disables the sweep endpoint.
    #[serde(default)]
    pub cron_secret: String,
    #[serde(default = "default_webapp_url")]
    pub webapp_url: String,
    pub telegram_bot_token: Option<String>,
    pub telegram_channel_id: Option<String>,
    pub channel_invite_link: Option<String>,
    #[serde(default = "default_telegram_api_url")]
    pub telegram_api_url: String,
    #[serde(default = "default_content_cache_ttl_secs")]
    pub content_cache_ttl_secs: u64,
}

fn default_database_path() -> String {
    "data/bookflix.db".to_string()
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_webapp_url() -> String {
    "https://your-app.vercel.app".to_string()
}

fn default_telegram_api_url() -> String {
    "https://api.telegram.org".to_string()
}

fn default_content_cache_ttl_secs() -> u64 {
    300
}

impl Config {
    pub fn from_env() -> Result<Self, envy::Error> {
        envy::from_env()
    }

    /// Builds a config from explicit key/value pairs, using the same defaults as `from_env`.
    #[cfg(test)]
    pub fn from_pairs<I>(pairs: I) -> Result<Self, envy::Error>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        envy::from_iter(pairs)
    }
}
