use crate::db::{self, MessageRecord};
use crate::media::signed_media_url;
use crate::provider::ProviderKind;
use crate::template;
use crate::types::{
    retry_disposition, whatsapp_address, AttachmentRef, DeliveryStatus, Direction, RetryDisposition,
};
use crate::{audit, AppState};
use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

/// Upstream validation hook run after a record is claimed and before
/// the provider call. Deployments plug notification-trigger checks in
/// here; the default allows everything.
#[async_trait]
pub trait SendGate: Send + Sync {
    async fn before_send(&self, message: &MessageRecord) -> Result<()>;
}

pub struct AllowAllSends;

#[async_trait]
impl SendGate for AllowAllSends {
    async fn before_send(&self, _message: &MessageRecord) -> Result<()> {
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SendRequest {
    pub receivers: Vec<String>,
    pub message: Option<String>,
    pub template: Option<String>,
    /// Context the template parameters are rendered against.
    pub context: Option<serde_json::Value>,
    /// Pre-rendered variables; skips template parameter rendering.
    pub content_variables: Option<serde_json::Map<String, serde_json::Value>>,
    pub reply_handler: Option<String>,
    pub provider: Option<String>,
    pub reference_doctype: Option<String>,
    pub reference_name: Option<String>,
    pub party: Option<String>,
    pub attachment: Option<AttachmentRef>,
    #[serde(default)]
    pub priority: i64,
    #[serde(default)]
    pub automated: bool,
    /// Leave the records to the periodic sweep instead of dispatching.
    #[serde(default)]
    pub delayed: bool,
    /// Dispatch synchronously and propagate failures to the caller.
    #[serde(default)]
    pub now: bool,
}

/// Validates and stores one `Not Sent` record per receiver, then hands
/// them to the dispatcher. Configuration problems surface here as
/// immediate errors and never consume the retry budget.
pub async fn queue_messages(state: &AppState, request: SendRequest) -> Result<Vec<String>> {
    let provider = match request.provider.as_deref() {
        Some(name) => {
            ProviderKind::parse(name).ok_or_else(|| anyhow::anyhow!("unknown provider: {name}"))?
        }
        None => state
            .config
            .default_provider()
            .ok_or_else(|| anyhow::anyhow!("please configure a WhatsApp provider"))?,
    };

    if state.config.messages_muted(Some(provider)) {
        bail!("whatsapp messages are muted");
    }

    let Some(sender) = state.config.whatsapp.sender_number.clone() else {
        bail!("please configure a WhatsApp sender number");
    };

    if request.receivers.is_empty() {
        bail!("receiver list is empty");
    }

    if request.message.is_some() == request.template.is_some() {
        bail!("exactly one of message body and template must be given");
    }

    let template = match request.template.as_deref() {
        Some(name) => Some(
            db::get_template(&state.pool, state.db_kind, name)
                .await?
                .ok_or_else(|| anyhow::anyhow!("unknown template: {name}"))?,
        ),
        None => None,
    };

    let reply_handler = request
        .reply_handler
        .clone()
        .or_else(|| template.as_ref().and_then(|t| t.reply_handler.clone()));

    let content_variables = match (&request.content_variables, &template) {
        (Some(given), _) => given.clone(),
        (None, Some(template)) => {
            let context = request.context.clone().unwrap_or(serde_json::json!({}));
            template::render_content_variables(template, &context)?
        }
        (None, None) => serde_json::Map::new(),
    };

    let rendered_body = match &template {
        Some(template) => Some(template::render_body(template, &content_variables)?),
        None => None,
    };

    let communication = audit::create_outgoing_communication(
        &state.pool,
        state.db_kind,
        &request.receivers,
        request.message.as_deref().or(rendered_body.as_deref()),
        request.reference_doctype.as_deref(),
        request.reference_name.as_deref(),
        request.automated,
        request.attachment.is_some(),
    )
    .await?;

    let now = Utc::now();
    let mut ids = Vec::with_capacity(request.receivers.len());

    for receiver in &request.receivers {
        let id = db::new_message_id();

        // Media variable handling: an explicit value rides along as the
        // media URL; otherwise a signed link to this record is minted.
        let mut media_url = None;
        let mut variables = content_variables.clone();
        if let Some(media_variable) = template.as_ref().and_then(|t| t.media_variable.as_deref()) {
            if let Some(value) = variables.get(media_variable).cloned() {
                media_url = value.as_str().map(|s| s.to_string());
                if provider != ProviderKind::Twilio {
                    variables.remove(media_variable);
                }
            } else if let Some(secret) = state.config.media.signing_secret.as_deref() {
                let url = signed_media_url(&state.config.whatsapp.public_url, secret, &id);
                if provider == ProviderKind::Twilio {
                    variables.insert(
                        media_variable.to_string(),
                        serde_json::Value::String(url.clone()),
                    );
                }
                media_url = Some(url);
            }
        } else if request.attachment.is_some() {
            if let Some(secret) = state.config.media.signing_secret.as_deref() {
                media_url = Some(signed_media_url(
                    &state.config.whatsapp.public_url,
                    secret,
                    &id,
                ));
            }
        }

        let record = MessageRecord {
            id: id.clone(),
            provider_id: None,
            direction: Direction::Sent,
            from_addr: whatsapp_address(&sender),
            to_addr: whatsapp_address(receiver),
            body: request.message.clone(),
            template: template.as_ref().map(|t| t.name.clone()),
            template_sid: template.as_ref().and_then(|t| t.template_sid.clone()),
            content_variables: if variables.is_empty() {
                None
            } else {
                Some(serde_json::Value::Object(variables))
            },
            media_url,
            attachment: request.attachment.clone(),
            status: DeliveryStatus::NotSent,
            incoming_media_status: None,
            retry: 0,
            provider,
            reply_handler: reply_handler.clone(),
            reply_handler_expired: false,
            context_message: None,
            reference_doctype: request.reference_doctype.clone(),
            reference_name: request.reference_name.clone(),
            party: request.party.clone(),
            communication: communication.clone(),
            profile_name: None,
            priority: request.priority,
            error: None,
            date_sent: None,
            created_at: now,
            updated_at: now,
        };
        db::insert_message(&state.pool, state.db_kind, &record).await?;
        ids.push(id);
    }

    if !request.delayed {
        for id in &ids {
            if request.now {
                dispatch_message(state, id, true).await?;
            } else {
                let state = state.clone();
                let id = id.clone();
                tokio::spawn(async move {
                    if let Err(err) = dispatch_message(&state, &id, false).await {
                        error!(message_id = %id, "dispatch task failed: {err:?}");
                    }
                });
            }
        }
    }

    Ok(ids)
}

/// Single dispatch attempt for one queued outbound record. Safe under
/// concurrent invocation: only the caller that wins the claim proceeds.
pub async fn dispatch_message(state: &AppState, id: &str, now: bool) -> Result<()> {
    let Some(message) = db::get_message(&state.pool, state.db_kind, id).await? else {
        return Ok(());
    };

    if state.config.messages_muted(Some(message.provider)) {
        debug!(message_id = %id, "whatsapp messages are muted, skipping dispatch");
        return Ok(());
    }

    if message.status != DeliveryStatus::NotSent || message.direction != Direction::Sent {
        return Ok(());
    }

    if !db::claim_dispatch(&state.pool, state.db_kind, id).await? {
        return Ok(());
    }

    audit::notify_delivery_status(
        &state.pool,
        state.db_kind,
        message.communication.as_deref(),
        DeliveryStatus::Sending,
    )
    .await?;

    let attempt = async {
        state.send_gate.before_send(&message).await?;
        let adapter = state.providers.adapter(message.provider);
        Ok::<_, anyhow::Error>(adapter.send(&message).await?)
    };

    match attempt.await {
        Ok(outcome) => {
            db::mark_sent(
                &state.pool,
                state.db_kind,
                id,
                &outcome.provider_id,
                outcome.status,
                outcome.date_sent,
                outcome.error.as_deref(),
            )
            .await?;
            audit::notify_delivery_status(
                &state.pool,
                state.db_kind,
                message.communication.as_deref(),
                outcome.status,
            )
            .await?;
            info!(
                message_id = %id,
                provider_id = %outcome.provider_id,
                status = outcome.status.as_str(),
                "message dispatched"
            );
            Ok(())
        }
        Err(err) => {
            let text = err.to_string();
            let failed_status = match retry_disposition(message.retry) {
                RetryDisposition::Retry(next) => {
                    db::release_for_retry(&state.pool, state.db_kind, id, next, &text).await?;
                    DeliveryStatus::NotSent
                }
                RetryDisposition::Terminal => {
                    db::mark_dispatch_error(&state.pool, state.db_kind, id, &text).await?;
                    DeliveryStatus::Error
                }
            };
            audit::notify_delivery_status(
                &state.pool,
                state.db_kind,
                message.communication.as_deref(),
                failed_status,
            )
            .await?;

            if now {
                Err(err)
            } else {
                error!(
                    message_id = %id,
                    reference_doctype = message.reference_doctype.as_deref().unwrap_or(""),
                    reference_name = message.reference_name.as_deref().unwrap_or(""),
                    "failed to send message: {text}"
                );
                Ok(())
            }
        }
    }
}

/// Every-tick sweep over the outbound queue: highest priority first,
/// oldest first, bounded page.
pub async fn flush_outgoing_queue(state: &AppState) {
    if state.config.messages_muted(None) {
        debug!("whatsapp messages are muted, skipping outgoing sweep");
        return;
    }

    let batch =
        match db::queued_outgoing(&state.pool, state.db_kind, state.config.queue.dispatch_batch)
            .await
        {
            Ok(batch) => batch,
            Err(err) => {
                error!("failed to scan outgoing queue: {err:?}");
                return;
            }
        };

    for id in batch {
        // Per-record isolation: one failure never aborts the sweep.
        if let Err(err) = dispatch_message(state, &id, false).await {
            error!(message_id = %id, "dispatch failed: {err:?}");
        }
    }
}

/// Daily sweep: queued outbound records older than the retention window
/// are expired and leave automatic processing for good.
pub async fn expire_stale_queue(state: &AppState) -> Result<u64> {
    let cutoff = Utc::now() - Duration::days(state.config.queue.retention_days);
    let expired = db::expire_stale(&state.pool, state.db_kind, cutoff).await?;
    if expired > 0 {
        info!(expired, "expired stale queued messages");
    }
    Ok(expired)
}
