use crate::config::TwilioConfig;
use crate::db::MessageRecord;
use crate::provider::{ProviderAdapter, ProviderError, SendOutcome, StatusOutcome};
use crate::types::{DeliveryStatus, InboundEvent};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;

pub struct TwilioProvider {
    http: Client,
    config: TwilioConfig,
    public_url: String,
}

/// Inbound message webhook payload, as Twilio posts it
/// (application/x-www-form-urlencoded, PascalCase field names).
#[derive(Debug, Clone, Deserialize)]
pub struct TwilioInboundForm {
    #[serde(rename = "MessageSid")]
    pub message_sid: Option<String>,
    #[serde(rename = "From")]
    pub from: String,
    #[serde(rename = "To")]
    pub to: String,
    #[serde(rename = "Body")]
    pub body: Option<String>,
    #[serde(rename = "ProfileName")]
    pub profile_name: Option<String>,
    #[serde(rename = "OriginalRepliedMessageSid")]
    pub original_replied_message_sid: Option<String>,
    #[serde(rename = "OriginalRepliedMessageSender")]
    pub original_replied_message_sender: Option<String>,
    #[serde(rename = "MediaUrl0")]
    pub media_url0: Option<String>,
    #[serde(rename = "MediaContentType0")]
    pub media_content_type0: Option<String>,
}

/// Status callback payload: the exact triple identifies the record.
#[derive(Debug, Clone, Deserialize)]
pub struct TwilioStatusCallbackForm {
    #[serde(rename = "MessageSid")]
    pub message_sid: String,
    #[serde(rename = "From")]
    pub from: String,
    #[serde(rename = "To")]
    pub to: String,
    #[serde(rename = "MessageStatus")]
    pub message_status: String,
}

pub fn normalize_twilio_inbound(form: TwilioInboundForm) -> InboundEvent {
    InboundEvent {
        from: form.from,
        to: form.to,
        body: form.body,
        provider_message_id: form.message_sid,
        profile_name: form.profile_name,
        replied_provider_id: form.original_replied_message_sid,
        replied_sender: form.original_replied_message_sender,
        media_url: form.media_url0,
        media_content_type: form.media_content_type0,
    }
}

impl TwilioProvider {
    pub fn new(http: Client, config: TwilioConfig, public_url: String) -> Self {
        Self {
            http,
            config,
            public_url,
        }
    }

    fn credentials(&self) -> Result<(&str, &str), ProviderError> {
        let sid = self
            .config
            .account_sid
            .as_deref()
            .ok_or(ProviderError::Unconfigured("twilio account sid"))?;
        let token = self
            .config
            .auth_token
            .as_deref()
            .ok_or(ProviderError::Unconfigured("twilio auth token"))?;
        Ok((sid, token))
    }

    fn status_callback_url(&self) -> String {
        format!(
            "{}/v1/whatsapp/status-callback",
            self.public_url.trim_end_matches('/')
        )
    }

    /// Form body of the Messages API call. Either a content SID plus
    /// its variables or a free-text body, never both.
    pub fn message_form(&self, message: &MessageRecord) -> Vec<(String, String)> {
        let mut form = vec![
            ("From".to_string(), message.from_addr.clone()),
            ("To".to_string(), message.to_addr.clone()),
            ("StatusCallback".to_string(), self.status_callback_url()),
        ];

        if let Some(sid) = message.template_sid.as_deref() {
            form.push(("ContentSid".to_string(), sid.to_string()));
            if let Some(variables) = message.content_variables.as_ref() {
                form.push(("ContentVariables".to_string(), variables.to_string()));
            }
        } else if let Some(body) = message.body.as_deref() {
            form.push(("Body".to_string(), body.to_string()));
        }

        if let Some(url) = message.media_url.as_deref() {
            form.push(("MediaUrl".to_string(), url.to_string()));
        }

        form
    }
}

fn parse_rfc2822(value: &Value, key: &str) -> Option<DateTime<Utc>> {
    value
        .get(key)
        .and_then(|v| v.as_str())
        .and_then(|s| DateTime::parse_from_rfc2822(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

#[async_trait]
impl ProviderAdapter for TwilioProvider {
    async fn send(&self, message: &MessageRecord) -> Result<SendOutcome, ProviderError> {
        let (sid, token) = self.credentials()?;
        let url = format!(
            "{}/2010-04-01/Accounts/{}/Messages.json",
            self.config.api_base.trim_end_matches('/'),
            sid
        );

        let form = self.message_form(message);
        let resp = self
            .http
            .post(&url)
            .basic_auth(sid, Some(token))
            .form(&form)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ProviderError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let value: Value = resp.json().await?;
        let provider_id = value
            .get("sid")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ProviderError::Malformed("missing message sid".to_string()))?
            .to_string();
        let delivery = value
            .get("status")
            .and_then(|v| v.as_str())
            .and_then(DeliveryStatus::from_provider)
            .unwrap_or(DeliveryStatus::Queued);
        let date_sent =
            parse_rfc2822(&value, "date_sent").or_else(|| parse_rfc2822(&value, "date_created"));

        Ok(SendOutcome {
            provider_id,
            status: delivery,
            date_sent: date_sent.or_else(|| Some(Utc::now())),
            error: None,
        })
    }

    async fn fetch_status(&self, provider_id: &str) -> Result<StatusOutcome, ProviderError> {
        let (sid, token) = self.credentials()?;
        let url = format!(
            "{}/2010-04-01/Accounts/{}/Messages/{}.json",
            self.config.api_base.trim_end_matches('/'),
            sid,
            provider_id
        );

        let resp = self.http.get(&url).basic_auth(sid, Some(token)).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ProviderError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let value: Value = resp.json().await?;
        Ok(StatusOutcome {
            status: value
                .get("status")
                .and_then(|v| v.as_str())
                .and_then(DeliveryStatus::from_provider),
            error: value
                .get("error_message")
                .and_then(|v| v.as_str())
                .map(|s| s.to_string()),
        })
    }

    async fn download_media(&self, media_url: &str) -> Result<Bytes, ProviderError> {
        let (sid, token) = self.credentials()?;
        let resp = self
            .http
            .get(media_url)
            .basic_auth(sid, Some(token))
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ProviderError::Api {
                status: status.as_u16(),
                body,
            });
        }
        Ok(resp.bytes().await?)
    }
}
