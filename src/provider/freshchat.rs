use crate::config::FreshchatConfig;
use crate::db::MessageRecord;
use crate::provider::{ProviderAdapter, ProviderError, SendOutcome, StatusOutcome};
use crate::types::{strip_whatsapp_prefix, DeliveryStatus};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use reqwest::Client;
use serde_json::{json, Value};

pub struct FreshchatProvider {
    http: Client,
    config: FreshchatConfig,
}

impl FreshchatProvider {
    pub fn new(http: Client, config: FreshchatConfig) -> Self {
        Self { http, config }
    }

    fn api_key(&self) -> Result<&str, ProviderError> {
        self.config
            .api_key
            .as_deref()
            .ok_or(ProviderError::Unconfigured("freshchat api key"))
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.config.api_endpoint.trim_end_matches('/'), path)
    }

    /// Freshchat only transports template messages; variables are
    /// positional and follow the stored parameter order.
    pub fn message_payload(&self, message: &MessageRecord) -> Result<Value, ProviderError> {
        let template_sid = message.template_sid.as_deref().ok_or_else(|| {
            ProviderError::Malformed("freshchat only sends template messages".to_string())
        })?;

        let mut message_template = json!({
            "storage": "conversation",
            "template_name": template_sid,
            "namespace": self.config.namespace,
            "language": {
                "policy": "deterministic",
                "code": "en_US",
            },
        });

        let mut rich_template_data = serde_json::Map::new();

        if let Some(media_url) = message.media_url.as_deref() {
            rich_template_data.insert(
                "header".to_string(),
                json!({
                    "type": "document",
                    "media_url": media_url,
                }),
            );
        }

        if let Some(Value::Object(variables)) = message.content_variables.as_ref() {
            let params: Vec<Value> = variables.values().map(|v| json!({ "data": v })).collect();
            rich_template_data.insert("body".to_string(), json!({ "params": params }));
        }

        if !rich_template_data.is_empty() {
            message_template["rich_template_data"] = Value::Object(rich_template_data);
        }

        Ok(json!({
            "channel_id": self.config.channel_id,
            "from": { "phone_number": strip_whatsapp_prefix(&message.from_addr) },
            "to": [{ "phone_number": strip_whatsapp_prefix(&message.to_addr) }],
            "provider": "whatsapp",
            "data": {
                "message_type": "template",
                "message_template": message_template,
            },
        }))
    }
}

/// Freshchat reports coarse progress states; the in-flight ones all map
/// to Queued so the reconciler keeps polling them.
pub fn map_freshchat_status(value: &str) -> Option<DeliveryStatus> {
    match value {
        "IN_PROGRESS" | "ACCEPTED" => Some(DeliveryStatus::Queued),
        other => DeliveryStatus::from_provider(other),
    }
}

#[async_trait]
impl ProviderAdapter for FreshchatProvider {
    async fn send(&self, message: &MessageRecord) -> Result<SendOutcome, ProviderError> {
        let api_key = self.api_key()?;
        let payload = self.message_payload(message)?;

        let resp = self
            .http
            .post(self.endpoint("/v2/outbound-messages/whatsapp"))
            .bearer_auth(api_key)
            .json(&payload)
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
            .get("request_id")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ProviderError::Malformed("missing request_id".to_string()))?
            .to_string();

        Ok(SendOutcome {
            provider_id,
            status: DeliveryStatus::Queued,
            date_sent: Some(Utc::now()),
            error: None,
        })
    }

    async fn fetch_status(&self, provider_id: &str) -> Result<StatusOutcome, ProviderError> {
        let api_key = self.api_key()?;

        let resp = self
            .http
            .get(self.endpoint("/v2/outbound-messages"))
            .bearer_auth(api_key)
            .query(&[("request_id", provider_id)])
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
        let message_data = value
            .get("outbound_messages")
            .and_then(|v| v.as_array())
            .and_then(|arr| arr.first());

        let Some(message_data) = message_data else {
            return Ok(StatusOutcome::default());
        };

        let mapped = message_data
            .get("status")
            .and_then(|v| v.as_str())
            .and_then(map_freshchat_status);

        let error = if mapped == Some(DeliveryStatus::Failed) {
            message_data
                .get("failure_reason")
                .and_then(|v| v.as_str())
                .map(|s| s.to_string())
        } else {
            None
        };

        Ok(StatusOutcome {
            status: mapped,
            error,
        })
    }

    async fn download_media(&self, media_url: &str) -> Result<Bytes, ProviderError> {
        let api_key = self.api_key()?;
        let resp = self.http.get(media_url).bearer_auth(api_key).send().await?;
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
