use crate::db::{self, MessageRecord, ReplyHandlerRecord};
use crate::media;
use crate::types::{AttachmentRef, DeliveryStatus, Direction, InboundEvent, MediaStatus, ReplyOutcome};
use crate::{audit, AppState};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{error, info};

pub const SYSTEM_USER: &str = "System";

/// Execution identity of the current operation. Reply handlers run
/// elevated; the guard restores the previous identity no matter how the
/// handler exits.
pub struct ExecutionIdentity {
    current: Mutex<String>,
}

impl ExecutionIdentity {
    pub fn new(user: impl Into<String>) -> Self {
        Self {
            current: Mutex::new(user.into()),
        }
    }

    pub fn current(&self) -> String {
        self.current.lock().expect("identity lock poisoned").clone()
    }

    pub fn elevate(self: &Arc<Self>, user: &str) -> IdentityGuard {
        let previous = {
            let mut current = self.current.lock().expect("identity lock poisoned");
            std::mem::replace(&mut *current, user.to_string())
        };
        IdentityGuard {
            identity: Arc::clone(self),
            previous,
        }
    }
}

pub struct IdentityGuard {
    identity: Arc<ExecutionIdentity>,
    previous: String,
}

impl Drop for IdentityGuard {
    fn drop(&mut self) {
        if let Ok(mut current) = self.identity.current.lock() {
            *current = std::mem::take(&mut self.previous);
        }
    }
}

/// One implementation per configured reply policy, resolved by name.
/// Returning Some(text) makes that text the synchronous webhook reply.
#[async_trait]
pub trait ReplyHandler: Send + Sync {
    async fn handle_incoming_message(
        &self,
        state: &AppState,
        incoming: &MessageRecord,
        context: &MessageRecord,
    ) -> Result<Option<String>>;
}

#[derive(Default)]
pub struct ReplyRegistry {
    handlers: HashMap<String, Arc<dyn ReplyHandler>>,
}

impl ReplyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: impl Into<String>, handler: Arc<dyn ReplyHandler>) {
        self.handlers.insert(name.into(), handler);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ReplyHandler>> {
        self.handlers.get(name).cloned()
    }
}

/// Whether an indirect reply still falls inside the handler's window.
/// A window of zero or less means the conversation never times out.
pub fn indirect_window_open(
    date_sent: Option<DateTime<Utc>>,
    window_seconds: i64,
    now: DateTime<Utc>,
) -> bool {
    if window_seconds <= 0 {
        return true;
    }
    match date_sent {
        Some(sent) => (now - sent).num_seconds() <= window_seconds,
        None => false,
    }
}

/// Correlates an inbound event to the outbound message it replies to.
///
/// An explicit reply-to id is authoritative: if it does not resolve,
/// the event is dropped rather than guessed at via the indirect search.
pub async fn resolve_context(
    state: &AppState,
    event: &InboundEvent,
) -> Result<Option<MessageRecord>> {
    if let Some(replied_sid) = event.replied_provider_id.as_deref() {
        let sender = event.replied_sender.as_deref().unwrap_or(&event.to);
        let Some(id) =
            db::get_replied_to_message(&state.pool, state.db_kind, replied_sid, sender).await?
        else {
            return Ok(None);
        };
        return db::get_message(&state.pool, state.db_kind, &id).await;
    }

    let Some(candidate) =
        db::last_indirect_reply_candidate(&state.pool, state.db_kind, &event.from, &event.to)
            .await?
    else {
        return Ok(None);
    };

    if candidate.reply_handler_expired {
        return Ok(None);
    }

    if !indirect_window_open(candidate.date_sent, candidate.window_seconds, Utc::now()) {
        return Ok(None);
    }

    db::get_message(&state.pool, state.db_kind, &candidate.id).await
}

/// Entry point for the inbound message webhook. Events with no context
/// are dropped by design; nothing is stored and no reply is produced.
pub async fn route_incoming(state: &AppState, event: InboundEvent) -> Result<ReplyOutcome> {
    let mut out = ReplyOutcome::default();

    let Some(context) = resolve_context(state, &event).await? else {
        return Ok(out);
    };

    let handler = match context.reply_handler.as_deref() {
        Some(name) => db::get_reply_handler(&state.pool, state.db_kind, name).await?,
        None => None,
    };

    let attachment = event
        .media_url
        .as_ref()
        .map(|url| AttachmentRef::from_media(url.clone(), event.media_content_type.clone()));
    let incoming_media_status = attachment.as_ref().map(|_| MediaStatus::ToDownload);

    let communication = audit::create_incoming_communication(
        &state.pool,
        state.db_kind,
        &event.from,
        &event.to,
        event.body.as_deref(),
        context.reference_doctype.as_deref(),
        context.reference_name.as_deref(),
        event.profile_name.as_deref(),
        context.communication.as_deref(),
        attachment.is_some(),
    )
    .await?;

    let now = Utc::now();
    let mut incoming = MessageRecord {
        id: db::new_message_id(),
        provider_id: event.provider_message_id.clone(),
        direction: Direction::Received,
        from_addr: event.from.clone(),
        to_addr: event.to.clone(),
        body: event.body.clone(),
        template: None,
        template_sid: None,
        content_variables: None,
        media_url: None,
        attachment,
        status: DeliveryStatus::Received,
        incoming_media_status,
        retry: 0,
        provider: context.provider,
        reply_handler: handler.as_ref().map(|h| h.name.clone()),
        reply_handler_expired: false,
        context_message: Some(context.id.clone()),
        reference_doctype: context.reference_doctype.clone(),
        reference_name: context.reference_name.clone(),
        party: context.party.clone(),
        communication,
        profile_name: event.profile_name.clone(),
        priority: 0,
        error: None,
        date_sent: Some(now),
        created_at: now,
        updated_at: now,
    };
    db::insert_message(&state.pool, state.db_kind, &incoming).await?;
    info!(
        message_id = %incoming.id,
        context_message = %context.id,
        "inbound message correlated"
    );

    if incoming.incoming_media_status == Some(MediaStatus::ToDownload) {
        let download_first = handler
            .as_ref()
            .map(|h| h.download_media_before_handling)
            .unwrap_or(false);
        if download_first {
            media::download_incoming_media(state, &incoming.id, false).await?;
            if let Some(refreshed) =
                db::get_message(&state.pool, state.db_kind, &incoming.id).await?
            {
                incoming = refreshed;
            }
        } else {
            let state = state.clone();
            let id = incoming.id.clone();
            tokio::spawn(async move {
                if let Err(err) = media::download_incoming_media(&state, &id, false).await {
                    error!(message_id = %id, "incoming media download failed: {err:?}");
                }
            });
        }
    }

    if let Some(handler) = handler {
        if !context.reply_handler_expired {
            out.disable_default_reply = true;
            out.reply_message = run_reply_handler(state, &handler, &incoming, &context).await;
        }
    }

    Ok(out)
}

/// Runs the matched policy under the elevated identity. Failures are
/// captured and replaced with the policy's fallback text; they never
/// reach the webhook caller.
async fn run_reply_handler(
    state: &AppState,
    handler: &ReplyHandlerRecord,
    incoming: &MessageRecord,
    context: &MessageRecord,
) -> Option<String> {
    let _guard = state.identity.elevate(SYSTEM_USER);

    let result = match state.replies.get(&handler.handler) {
        Some(implementation) => {
            implementation
                .handle_incoming_message(state, incoming, context)
                .await
        }
        None => Err(anyhow::anyhow!(
            "no reply handler registered for '{}'",
            handler.handler
        )),
    };

    match result {
        Ok(reply) => reply,
        Err(err) => {
            error!(
                handler = %handler.name,
                message_id = %incoming.id,
                reference_doctype = incoming.reference_doctype.as_deref().unwrap_or(""),
                reference_name = incoming.reference_name.as_deref().unwrap_or(""),
                "error handling message reply: {err:?}"
            );
            handler.error_reply_message.clone()
        }
    }
}
