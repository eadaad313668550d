//! Communication-log collaborator. The lifecycle engine only notifies
//! this module; nothing here feeds back into dispatch decisions.

use crate::db::{self, CommunicationRecord, DbKind};
use crate::types::{strip_whatsapp_prefix, DeliveryStatus, Direction};
use anyhow::Result;
use chrono::Utc;
use sqlx::AnyPool;

/// Creates the audit row for an outbound batch. Returns None when the
/// message is not tied to a business object, matching the contract that
/// unreferenced sends leave no audit trail.
pub async fn create_outgoing_communication(
    pool: &AnyPool,
    kind: DbKind,
    receivers: &[String],
    content: Option<&str>,
    reference_doctype: Option<&str>,
    reference_name: Option<&str>,
    automated: bool,
    has_attachment: bool,
) -> Result<Option<String>> {
    let (Some(reference_doctype), Some(reference_name)) = (reference_doctype, reference_name)
    else {
        return Ok(None);
    };

    let record = CommunicationRecord {
        id: db::new_message_id(),
        communication_type: if automated {
            "Automated Message".to_string()
        } else {
            "Communication".to_string()
        },
        subject: "WhatsApp Message Sent".to_string(),
        content: content.map(|s| s.to_string()),
        sent_received: Direction::Sent,
        reference_doctype: Some(reference_doctype.to_string()),
        reference_name: Some(reference_name.to_string()),
        phone_no: if receivers.len() == 1 {
            receivers.first().map(|r| strip_whatsapp_prefix(r).to_string())
        } else {
            None
        },
        sender_name: None,
        in_reply_to: None,
        delivery_status: None,
        has_attachment,
        created_at: Utc::now(),
    };
    db::insert_communication(pool, kind, &record).await?;
    Ok(Some(record.id))
}

pub async fn create_incoming_communication(
    pool: &AnyPool,
    kind: DbKind,
    from_addr: &str,
    to_addr: &str,
    content: Option<&str>,
    reference_doctype: Option<&str>,
    reference_name: Option<&str>,
    profile_name: Option<&str>,
    in_reply_to: Option<&str>,
    has_attachment: bool,
) -> Result<Option<String>> {
    let (Some(reference_doctype), Some(reference_name)) = (reference_doctype, reference_name)
    else {
        return Ok(None);
    };

    let from_number = strip_whatsapp_prefix(from_addr);
    let sender_name = match profile_name {
        Some(profile) => format!("{} ({})", profile, from_number),
        None => from_number.to_string(),
    };

    let record = CommunicationRecord {
        id: db::new_message_id(),
        communication_type: "Communication".to_string(),
        subject: "WhatsApp Message Received".to_string(),
        content: content.map(|s| s.to_string()),
        sent_received: Direction::Received,
        reference_doctype: Some(reference_doctype.to_string()),
        reference_name: Some(reference_name.to_string()),
        phone_no: Some(from_number.to_string()),
        sender_name: Some(sender_name),
        in_reply_to: in_reply_to.map(|s| s.to_string()),
        delivery_status: None,
        has_attachment,
        created_at: Utc::now(),
    };
    db::insert_communication(pool, kind, &record).await?;
    Ok(Some(record.id))
}

/// Propagates a delivery-state change to the linked audit row, if any.
pub async fn notify_delivery_status(
    pool: &AnyPool,
    kind: DbKind,
    communication: Option<&str>,
    status: DeliveryStatus,
) -> Result<()> {
    if let Some(id) = communication {
        db::set_communication_delivery_status(pool, kind, id, status.as_str()).await?;
    }
    Ok(())
}
