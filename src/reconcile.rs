use crate::db;
use crate::provider::twilio::TwilioStatusCallbackForm;
use crate::types::DeliveryStatus;
use crate::{audit, AppState};
use anyhow::Result;
use tracing::{debug, error, info};

/// Applies a pushed status callback. The record is identified by the
/// exact (provider id, from, to) triple; unknown triples are ignored
/// and terminal states stay sticky.
pub async fn apply_status_callback(state: &AppState, form: &TwilioStatusCallbackForm) -> Result<()> {
    let Some(message) = db::find_by_provider_triple(
        &state.pool,
        state.db_kind,
        &form.message_sid,
        &form.from,
        &form.to,
    )
    .await?
    else {
        return Ok(());
    };

    let Some(pushed) = DeliveryStatus::from_provider(&form.message_status) else {
        return Ok(());
    };

    if pushed == message.status || message.status.is_terminal() {
        return Ok(());
    }

    db::set_status(&state.pool, state.db_kind, &message.id, pushed, None).await?;
    audit::notify_delivery_status(
        &state.pool,
        state.db_kind,
        message.communication.as_deref(),
        pushed,
    )
    .await?;
    Ok(())
}

/// Hourly sweep: re-query provider-side status for outbound messages
/// whose terminal state was never pushed back via callback. Newest
/// first, bounded, one record's failure never fails the batch.
pub async fn reconcile_pending_statuses(state: &AppState, limit: i64) {
    if state.config.messages_muted(None) {
        debug!("whatsapp messages are muted, skipping reconciliation");
        return;
    }

    let batch = match db::pending_reconciliation(&state.pool, state.db_kind, limit).await {
        Ok(batch) => batch,
        Err(err) => {
            error!("failed to scan reconciliation queue: {err:?}");
            return;
        }
    };

    for id in batch {
        if let Err(err) = reconcile_message_status(state, &id).await {
            error!(message_id = %id, "status reconciliation failed: {err:?}");
        }
    }
}

/// Polls the provider for one message and persists the status only if
/// it changed. Terminal states are never regressed; re-running on an
/// unchanged record is a no-op.
pub async fn reconcile_message_status(state: &AppState, id: &str) -> Result<()> {
    let Some(message) = db::get_message(&state.pool, state.db_kind, id).await? else {
        return Ok(());
    };

    if state.config.messages_muted(Some(message.provider)) {
        debug!(message_id = %id, "whatsapp messages are muted, skipping reconciliation");
        return Ok(());
    }

    let Some(provider_id) = message.provider_id.as_deref() else {
        return Ok(());
    };

    if !matches!(
        message.status,
        DeliveryStatus::Sent | DeliveryStatus::Queued
    ) {
        return Ok(());
    }

    let adapter = state.providers.adapter(message.provider);
    let outcome = adapter.fetch_status(provider_id).await?;

    let Some(polled) = outcome.status else {
        return Ok(());
    };

    if polled == message.status || message.status.is_terminal() {
        return Ok(());
    }

    db::set_status(
        &state.pool,
        state.db_kind,
        id,
        polled,
        outcome.error.as_deref(),
    )
    .await?;
    audit::notify_delivery_status(
        &state.pool,
        state.db_kind,
        message.communication.as_deref(),
        polled,
    )
    .await?;

    info!(
        message_id = %id,
        from = message.status.as_str(),
        to = polled.as_str(),
        "delivery status reconciled"
    );
    Ok(())
}
