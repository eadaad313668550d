use serde::{Deserialize, Serialize};

/// Failed attempts allowed before a record goes terminal.
pub const MAX_RETRIES: i32 = 3;

pub const WHATSAPP_PREFIX: &str = "whatsapp:";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Sent,
    Received,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Sent => "Sent",
            Direction::Received => "Received",
        }
    }

    pub fn parse(value: &str) -> Option<Direction> {
        match value {
            "Sent" => Some(Direction::Sent),
            "Received" => Some(Direction::Received),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeliveryStatus {
    NotSent,
    Sending,
    Queued,
    Sent,
    Delivered,
    Read,
    Failed,
    Error,
    Expired,
    Received,
}

impl DeliveryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryStatus::NotSent => "Not Sent",
            DeliveryStatus::Sending => "Sending",
            DeliveryStatus::Queued => "Queued",
            DeliveryStatus::Sent => "Sent",
            DeliveryStatus::Delivered => "Delivered",
            DeliveryStatus::Read => "Read",
            DeliveryStatus::Failed => "Failed",
            DeliveryStatus::Error => "Error",
            DeliveryStatus::Expired => "Expired",
            DeliveryStatus::Received => "Received",
        }
    }

    pub fn parse(value: &str) -> Option<DeliveryStatus> {
        match value {
            "Not Sent" => Some(DeliveryStatus::NotSent),
            "Sending" => Some(DeliveryStatus::Sending),
            "Queued" => Some(DeliveryStatus::Queued),
            "Sent" => Some(DeliveryStatus::Sent),
            "Delivered" => Some(DeliveryStatus::Delivered),
            "Read" => Some(DeliveryStatus::Read),
            "Failed" => Some(DeliveryStatus::Failed),
            "Error" => Some(DeliveryStatus::Error),
            "Expired" => Some(DeliveryStatus::Expired),
            "Received" => Some(DeliveryStatus::Received),
            _ => None,
        }
    }

    /// Maps the lowercase wire statuses providers report back to the
    /// delivery states of the outbound machine.
    pub fn from_provider(value: &str) -> Option<DeliveryStatus> {
        match value.to_lowercase().as_str() {
            "accepted" | "queued" => Some(DeliveryStatus::Queued),
            "sending" => Some(DeliveryStatus::Sending),
            "sent" => Some(DeliveryStatus::Sent),
            "delivered" => Some(DeliveryStatus::Delivered),
            "read" => Some(DeliveryStatus::Read),
            "failed" | "undelivered" | "canceled" => Some(DeliveryStatus::Failed),
            "received" => Some(DeliveryStatus::Received),
            _ => None,
        }
    }

    /// Terminal states are sticky: reconciliation and callbacks never
    /// move a record out of them.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DeliveryStatus::Delivered
                | DeliveryStatus::Read
                | DeliveryStatus::Failed
                | DeliveryStatus::Error
                | DeliveryStatus::Expired
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MediaStatus {
    ToDownload,
    Downloading,
    Attached,
    Error,
}

impl MediaStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaStatus::ToDownload => "To Download",
            MediaStatus::Downloading => "Downloading",
            MediaStatus::Attached => "Attached",
            MediaStatus::Error => "Error",
        }
    }

    pub fn parse(value: &str) -> Option<MediaStatus> {
        match value {
            "To Download" => Some(MediaStatus::ToDownload),
            "Downloading" => Some(MediaStatus::Downloading),
            "Attached" => Some(MediaStatus::Attached),
            "Error" => Some(MediaStatus::Error),
            _ => None,
        }
    }
}

/// Structured attachment reference carried on a message. At most one of
/// the resolved forms is authoritative: a stored file wins over a remote
/// media URL, which wins over an on-demand print artifact.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentRef {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_id: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub print_artifact: bool,
}

impl AttachmentRef {
    pub fn from_media(media_url: impl Into<String>, mime_type: Option<String>) -> Self {
        AttachmentRef {
            media_url: Some(media_url.into()),
            mime_type,
            ..AttachmentRef::default()
        }
    }

    pub fn from_file(file_id: impl Into<String>) -> Self {
        AttachmentRef {
            file_id: Some(file_id.into()),
            ..AttachmentRef::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.media_url.is_none() && self.file_id.is_none() && !self.print_artifact
    }
}

/// Disposition after a failed attempt: requeue with an incremented
/// counter, or go terminal once the budget is spent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDisposition {
    Retry(i32),
    Terminal,
}

pub fn retry_disposition(retry: i32) -> RetryDisposition {
    if retry < MAX_RETRIES {
        RetryDisposition::Retry(retry + 1)
    } else {
        RetryDisposition::Terminal
    }
}

pub fn whatsapp_address(number: &str) -> String {
    if number.starts_with(WHATSAPP_PREFIX) {
        number.to_string()
    } else {
        format!("{}{}", WHATSAPP_PREFIX, number)
    }
}

pub fn strip_whatsapp_prefix(address: &str) -> &str {
    address.strip_prefix(WHATSAPP_PREFIX).unwrap_or(address)
}

/// Normalized inbound message event, independent of which provider's
/// webhook shape it arrived in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundEvent {
    pub from: String,
    pub to: String,
    pub body: Option<String>,
    pub provider_message_id: Option<String>,
    pub profile_name: Option<String>,
    pub replied_provider_id: Option<String>,
    pub replied_sender: Option<String>,
    pub media_url: Option<String>,
    pub media_content_type: Option<String>,
}

/// Response contract of the inbound webhook.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReplyOutcome {
    pub reply_message: Option<String>,
    pub disable_default_reply: bool,
}
