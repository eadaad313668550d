use crate::provider::ProviderKind;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::PathBuf;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub auth: AuthConfig,
    pub database: DatabaseConfig,
    pub whatsapp: WhatsAppConfig,
    pub twilio: TwilioConfig,
    pub freshchat: FreshchatConfig,
    pub media: MediaConfig,
    pub queue: QueueConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8093,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub token: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: Option<String>,
    pub sqlite_path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            sqlite_path: "~/.courier/state.sqlite".to_string(),
        }
    }
}

/// Tenant-level sending identity and the process-wide mute switch.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WhatsAppConfig {
    pub sender_number: Option<String>,
    pub provider: Option<String>,
    pub mute: bool,
    /// Externally reachable base URL, used for status callbacks and
    /// signed media links handed to providers.
    pub public_url: String,
}

impl Default for WhatsAppConfig {
    fn default() -> Self {
        Self {
            sender_number: None,
            provider: Some("Twilio".to_string()),
            mute: false,
            public_url: "http://127.0.0.1:8093".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TwilioConfig {
    pub enabled: bool,
    pub account_sid: Option<String>,
    pub auth_token: Option<String>,
    pub api_base: String,
}

impl Default for TwilioConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            account_sid: None,
            auth_token: None,
            api_base: "https://api.twilio.com".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FreshchatConfig {
    pub enabled: bool,
    pub api_key: Option<String>,
    pub api_endpoint: String,
    pub channel_id: Option<String>,
    pub namespace: Option<String>,
}

impl Default for FreshchatConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_key: None,
            api_endpoint: "https://api.freshchat.com".to_string(),
            channel_id: None,
            namespace: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaConfig {
    pub storage_dir: String,
    pub signing_secret: Option<String>,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            storage_dir: "~/.courier/media".to_string(),
            signing_secret: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    pub dispatch_interval_seconds: u64,
    pub dispatch_batch: i64,
    pub reconcile_batch: i64,
    pub media_batch: i64,
    pub retention_days: i64,
    pub request_timeout_seconds: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            dispatch_interval_seconds: 5,
            dispatch_batch: 500,
            reconcile_batch: 100,
            media_batch: 100,
            retention_days: 7,
            request_timeout_seconds: 30,
        }
    }
}

impl Config {
    pub fn default_provider(&self) -> Option<ProviderKind> {
        self.whatsapp
            .provider
            .as_deref()
            .and_then(ProviderKind::parse)
    }

    /// A provider is usable only when a sender number exists and the
    /// backend's own settings are enabled.
    pub fn provider_enabled(&self, provider: ProviderKind) -> bool {
        if self.whatsapp.sender_number.is_none() {
            return false;
        }
        match provider {
            ProviderKind::Twilio => self.twilio.enabled,
            ProviderKind::Freshchat => self.freshchat.enabled,
        }
    }

    /// The global mute switch. Checked at the start of every dispatch,
    /// reconciliation, and download entry point, never cached.
    pub fn messages_muted(&self, provider: Option<ProviderKind>) -> bool {
        let provider = provider.or_else(|| self.default_provider());
        let enabled = provider.map(|p| self.provider_enabled(p)).unwrap_or(false);
        !enabled || self.whatsapp.mute
    }
}

pub fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    PathBuf::from(path)
}

pub fn resolve_config_path() -> PathBuf {
    env::var("COURIER_CONFIG")
        .ok()
        .map(PathBuf::from)
        .unwrap_or_else(|| expand_tilde("~/.courier/courier.json"))
}

pub fn load_config() -> Config {
    let config_path = resolve_config_path();

    let mut cfg = Config::default();

    if config_path.exists() {
        if let Ok(raw) = fs::read_to_string(&config_path) {
            if let Ok(file_cfg) = serde_json::from_str::<Config>(&raw) {
                cfg = file_cfg;
            }
        }
    }

    // Override from environment
    if let Ok(token) = env::var("COURIER_TOKEN") {
        if !token.trim().is_empty() {
            cfg.auth.token = Some(token);
        }
    }

    if let Ok(url) = env::var("COURIER_DATABASE_URL") {
        if !url.trim().is_empty() {
            cfg.database.url = Some(url);
        }
    }

    if let Ok(path) = env::var("COURIER_SQLITE_PATH") {
        if !path.trim().is_empty() {
            cfg.database.sqlite_path = path;
        }
    }

    if let Ok(number) = env::var("COURIER_WHATSAPP_NUMBER") {
        if !number.trim().is_empty() {
            cfg.whatsapp.sender_number = Some(number);
        }
    }

    if let Ok(provider) = env::var("COURIER_WHATSAPP_PROVIDER") {
        if !provider.trim().is_empty() {
            cfg.whatsapp.provider = Some(provider);
        }
    }

    if let Ok(mute) = env::var("COURIER_MUTE_WHATSAPP") {
        cfg.whatsapp.mute = matches!(mute.trim(), "1" | "true" | "yes");
    }

    if let Ok(url) = env::var("COURIER_PUBLIC_URL") {
        if !url.trim().is_empty() {
            cfg.whatsapp.public_url = url;
        }
    }

    if let Ok(sid) = env::var("COURIER_TWILIO_ACCOUNT_SID") {
        if !sid.trim().is_empty() {
            cfg.twilio.account_sid = Some(sid);
            cfg.twilio.enabled = true;
        }
    }

    if let Ok(token) = env::var("COURIER_TWILIO_AUTH_TOKEN") {
        if !token.trim().is_empty() {
            cfg.twilio.auth_token = Some(token);
        }
    }

    if let Ok(key) = env::var("COURIER_FRESHCHAT_API_KEY") {
        if !key.trim().is_empty() {
            cfg.freshchat.api_key = Some(key);
            cfg.freshchat.enabled = true;
        }
    }

    if let Ok(secret) = env::var("COURIER_MEDIA_SIGNING_SECRET") {
        if !secret.trim().is_empty() {
            cfg.media.signing_secret = Some(secret);
        }
    }

    cfg
}

pub fn resolve_database_url(cfg: &Config) -> String {
    if let Some(url) = cfg.database.url.as_ref() {
        return url.to_string();
    }

    let path = expand_tilde(&cfg.database.sqlite_path);
    if let Some(parent) = path.parent() {
        let _ = fs::create_dir_all(parent);
    }
    format!("sqlite://{}", path.to_string_lossy())
}
