pub mod freshchat;
pub mod twilio;

use crate::config::Config;
use crate::db::MessageRecord;
use crate::types::DeliveryStatus;
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use freshchat::FreshchatProvider;
pub use twilio::TwilioProvider;

/// Closed set of messaging backends. Selection is a lookup on this
/// enum, so an unknown provider never reaches a network call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProviderKind {
    Twilio,
    Freshchat,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Twilio => "Twilio",
            ProviderKind::Freshchat => "Freshchat",
        }
    }

    pub fn parse(value: &str) -> Option<ProviderKind> {
        match value {
            "Twilio" => Some(ProviderKind::Twilio),
            "Freshchat" => Some(ProviderKind::Freshchat),
            _ => None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("provider request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("provider rejected request: {status} {body}")]
    Api { status: u16, body: String },
    #[error("provider response malformed: {0}")]
    Malformed(String),
    #[error("{0} is not configured")]
    Unconfigured(&'static str),
}

#[derive(Debug, Clone)]
pub struct SendOutcome {
    pub provider_id: String,
    pub status: DeliveryStatus,
    pub date_sent: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct StatusOutcome {
    pub status: Option<DeliveryStatus>,
    pub error: Option<String>,
}

/// Uniform interface to a messaging backend. Implementations perform a
/// single network call per operation and never retry internally; retry
/// policy belongs to the dispatcher.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    async fn send(&self, message: &MessageRecord) -> Result<SendOutcome, ProviderError>;
    async fn fetch_status(&self, provider_id: &str) -> Result<StatusOutcome, ProviderError>;
    async fn download_media(&self, media_url: &str) -> Result<Bytes, ProviderError>;
}

pub struct ProviderSet {
    twilio: TwilioProvider,
    freshchat: FreshchatProvider,
}

impl ProviderSet {
    pub fn from_config(config: &Config, http: reqwest::Client) -> Self {
        Self {
            twilio: TwilioProvider::new(
                http.clone(),
                config.twilio.clone(),
                config.whatsapp.public_url.clone(),
            ),
            freshchat: FreshchatProvider::new(http, config.freshchat.clone()),
        }
    }

    pub fn adapter(&self, kind: ProviderKind) -> &dyn ProviderAdapter {
        match kind {
            ProviderKind::Twilio => &self.twilio,
            ProviderKind::Freshchat => &self.freshchat,
        }
    }
}
