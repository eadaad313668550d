use crate::provider::ProviderKind;
use crate::types::{AttachmentRef, DeliveryStatus, Direction, MediaStatus};
use anyhow::Result;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{AnyPool, Row};
use std::borrow::Cow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DbKind {
    Sqlite,
    Postgres,
}

pub fn db_kind_from_url(url: &str) -> DbKind {
    let lower = url.to_lowercase();
    if lower.starts_with("postgres://") || lower.starts_with("postgresql://") {
        DbKind::Postgres
    } else {
        DbKind::Sqlite
    }
}

pub fn rewrite_sql<'a>(sql: &'a str, kind: DbKind) -> Cow<'a, str> {
    match kind {
        DbKind::Sqlite => Cow::Borrowed(sql),
        DbKind::Postgres => {
            let mut out = String::with_capacity(sql.len() + 8);
            let mut idx = 1;
            for ch in sql.chars() {
                if ch == '?' {
                    out.push('$');
                    out.push_str(&idx.to_string());
                    idx += 1;
                } else {
                    out.push(ch);
                }
            }
            Cow::Owned(out)
        }
    }
}

fn i64_to_datetime(ts: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(ts, 0)
        .single()
        .unwrap_or_else(|| Utc.timestamp_opt(0, 0).single().unwrap_or_else(Utc::now))
}

fn datetime_to_i64(dt: DateTime<Utc>) -> i64 {
    dt.timestamp()
}

/// One row per unit of outbound or inbound content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageRecord {
    pub id: String,
    pub provider_id: Option<String>,
    pub direction: Direction,
    pub from_addr: String,
    pub to_addr: String,
    pub body: Option<String>,
    pub template: Option<String>,
    pub template_sid: Option<String>,
    pub content_variables: Option<serde_json::Value>,
    pub media_url: Option<String>,
    pub attachment: Option<AttachmentRef>,
    pub status: DeliveryStatus,
    pub incoming_media_status: Option<MediaStatus>,
    pub retry: i32,
    pub provider: ProviderKind,
    pub reply_handler: Option<String>,
    pub reply_handler_expired: bool,
    pub context_message: Option<String>,
    pub reference_doctype: Option<String>,
    pub reference_name: Option<String>,
    pub party: Option<String>,
    pub communication: Option<String>,
    pub profile_name: Option<String>,
    pub priority: i64,
    pub error: Option<String>,
    pub date_sent: Option<DateTime<Utc>>,
    #[serde(skip)]
    pub created_at: DateTime<Utc>,
    #[serde(skip)]
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplyHandlerRecord {
    pub name: String,
    pub handler: String,
    pub allow_indirect_reply: bool,
    pub indirect_reply_window_seconds: i64,
    pub download_media_before_handling: bool,
    pub error_reply_message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateParameter {
    pub variable: String,
    pub value: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateRecord {
    pub name: String,
    pub template_sid: Option<String>,
    pub body: String,
    pub parameters: Vec<TemplateParameter>,
    pub media_variable: Option<String>,
    pub reply_handler: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileRecord {
    pub id: String,
    pub filename: String,
    pub mime_type: Option<String>,
    pub attached_to: String,
    pub size: i64,
    #[serde(skip)]
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommunicationRecord {
    pub id: String,
    pub communication_type: String,
    pub subject: String,
    pub content: Option<String>,
    pub sent_received: Direction,
    pub reference_doctype: Option<String>,
    pub reference_name: Option<String>,
    pub phone_no: Option<String>,
    pub sender_name: Option<String>,
    pub in_reply_to: Option<String>,
    pub delivery_status: Option<String>,
    pub has_attachment: bool,
    #[serde(skip)]
    pub created_at: DateTime<Utc>,
}

/// Candidate row for indirect reply correlation, joined with its
/// handler's window configuration.
#[derive(Debug, Clone)]
pub struct IndirectCandidate {
    pub id: String,
    pub date_sent: Option<DateTime<Utc>>,
    pub reply_handler: String,
    pub reply_handler_expired: bool,
    pub window_seconds: i64,
}

pub async fn init_db(pool: &AnyPool, kind: DbKind) -> Result<()> {
    let stmts = vec![
        r#"CREATE TABLE IF NOT EXISTS messages (
            id TEXT PRIMARY KEY,
            provider_id TEXT,
            direction TEXT NOT NULL,
            from_addr TEXT NOT NULL,
            to_addr TEXT NOT NULL,
            body TEXT,
            template TEXT,
            template_sid TEXT,
            content_variables TEXT,
            media_url TEXT,
            attachment TEXT,
            status TEXT NOT NULL,
            incoming_media_status TEXT,
            retry INTEGER NOT NULL DEFAULT 0,
            provider TEXT NOT NULL,
            reply_handler TEXT,
            reply_handler_expired INTEGER NOT NULL DEFAULT 0,
            context_message TEXT,
            reference_doctype TEXT,
            reference_name TEXT,
            party TEXT,
            communication TEXT,
            profile_name TEXT,
            priority INTEGER NOT NULL DEFAULT 0,
            error TEXT,
            date_sent INTEGER,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        )"#,
        r#"CREATE INDEX IF NOT EXISTS idx_messages_flush ON messages(status, priority, created_at)"#,
        r#"CREATE INDEX IF NOT EXISTS idx_messages_media ON messages(incoming_media_status, priority, created_at)"#,
        r#"CREATE INDEX IF NOT EXISTS idx_messages_indirect ON messages(to_addr, status, date_sent)"#,
        r#"CREATE INDEX IF NOT EXISTS idx_messages_provider_id ON messages(provider_id)"#,
        r#"CREATE TABLE IF NOT EXISTS reply_handlers (
            name TEXT PRIMARY KEY,
            handler TEXT NOT NULL,
            allow_indirect_reply INTEGER NOT NULL DEFAULT 0,
            indirect_reply_window_seconds INTEGER NOT NULL DEFAULT 0,
            download_media_before_handling INTEGER NOT NULL DEFAULT 0,
            error_reply_message TEXT
        )"#,
        r#"CREATE TABLE IF NOT EXISTS templates (
            name TEXT PRIMARY KEY,
            template_sid TEXT,
            body TEXT NOT NULL,
            parameters TEXT NOT NULL,
            media_variable TEXT,
            reply_handler TEXT
        )"#,
        r#"CREATE TABLE IF NOT EXISTS communications (
            id TEXT PRIMARY KEY,
            communication_type TEXT NOT NULL,
            subject TEXT NOT NULL,
            content TEXT,
            sent_received TEXT NOT NULL,
            reference_doctype TEXT,
            reference_name TEXT,
            phone_no TEXT,
            sender_name TEXT,
            in_reply_to TEXT,
            delivery_status TEXT,
            has_attachment INTEGER NOT NULL DEFAULT 0,
            created_at INTEGER NOT NULL
        )"#,
        r#"CREATE TABLE IF NOT EXISTS files (
            id TEXT PRIMARY KEY,
            filename TEXT NOT NULL,
            mime_type TEXT,
            attached_to TEXT NOT NULL,
            size INTEGER NOT NULL,
            created_at INTEGER NOT NULL
        )"#,
    ];

    for stmt in stmts {
        let sql = rewrite_sql(stmt, kind);
        sqlx::query(sql.as_ref()).execute(pool).await?;
    }

    Ok(())
}

const MESSAGE_COLUMNS: &str = "id, provider_id, direction, from_addr, to_addr, body, template, template_sid, \
     content_variables, media_url, attachment, status, incoming_media_status, retry, provider, \
     reply_handler, reply_handler_expired, context_message, reference_doctype, reference_name, \
     party, communication, profile_name, priority, error, date_sent, created_at, updated_at";

fn map_message_row(row: &sqlx::any::AnyRow) -> Result<MessageRecord> {
    let direction: String = row.try_get("direction")?;
    let status: String = row.try_get("status")?;
    let provider: String = row.try_get("provider")?;
    let incoming_media_status: Option<String> = row.try_get("incoming_media_status")?;
    let content_variables: Option<String> = row.try_get("content_variables")?;
    let attachment: Option<String> = row.try_get("attachment")?;
    let date_sent: Option<i64> = row.try_get("date_sent")?;
    let created_at: i64 = row.try_get("created_at")?;
    let updated_at: i64 = row.try_get("updated_at")?;

    Ok(MessageRecord {
        id: row.try_get("id")?,
        provider_id: row.try_get("provider_id")?,
        direction: Direction::parse(&direction)
            .ok_or_else(|| anyhow::anyhow!("unknown direction: {direction}"))?,
        from_addr: row.try_get("from_addr")?,
        to_addr: row.try_get("to_addr")?,
        body: row.try_get("body")?,
        template: row.try_get("template")?,
        template_sid: row.try_get("template_sid")?,
        content_variables: content_variables.and_then(|v| serde_json::from_str(&v).ok()),
        media_url: row.try_get("media_url")?,
        attachment: attachment.and_then(|v| serde_json::from_str(&v).ok()),
        status: DeliveryStatus::parse(&status)
            .ok_or_else(|| anyhow::anyhow!("unknown status: {status}"))?,
        incoming_media_status: incoming_media_status.as_deref().and_then(MediaStatus::parse),
        retry: row.try_get::<i64, _>("retry")? as i32,
        provider: ProviderKind::parse(&provider)
            .ok_or_else(|| anyhow::anyhow!("unknown provider: {provider}"))?,
        reply_handler: row.try_get("reply_handler")?,
        reply_handler_expired: row.try_get::<i64, _>("reply_handler_expired")? != 0,
        context_message: row.try_get("context_message")?,
        reference_doctype: row.try_get("reference_doctype")?,
        reference_name: row.try_get("reference_name")?,
        party: row.try_get("party")?,
        communication: row.try_get("communication")?,
        profile_name: row.try_get("profile_name")?,
        priority: row.try_get("priority")?,
        error: row.try_get("error")?,
        date_sent: date_sent.map(i64_to_datetime),
        created_at: i64_to_datetime(created_at),
        updated_at: i64_to_datetime(updated_at),
    })
}

pub async fn insert_message(pool: &AnyPool, kind: DbKind, record: &MessageRecord) -> Result<()> {
    let sql = rewrite_sql(
        r#"INSERT INTO messages (
            id, provider_id, direction, from_addr, to_addr, body, template, template_sid,
            content_variables, media_url, attachment, status, incoming_media_status, retry, provider,
            reply_handler, reply_handler_expired, context_message, reference_doctype, reference_name,
            party, communication, profile_name, priority, error, date_sent, created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        kind,
    );
    sqlx::query(sql.as_ref())
        .bind(&record.id)
        .bind(record.provider_id.as_deref())
        .bind(record.direction.as_str())
        .bind(&record.from_addr)
        .bind(&record.to_addr)
        .bind(record.body.as_deref())
        .bind(record.template.as_deref())
        .bind(record.template_sid.as_deref())
        .bind(record.content_variables.as_ref().map(|v| v.to_string()))
        .bind(record.media_url.as_deref())
        .bind(
            record
                .attachment
                .as_ref()
                .map(|v| serde_json::to_string(v).unwrap_or_default()),
        )
        .bind(record.status.as_str())
        .bind(record.incoming_media_status.map(|v| v.as_str()))
        .bind(record.retry as i64)
        .bind(record.provider.as_str())
        .bind(record.reply_handler.as_deref())
        .bind(record.reply_handler_expired as i64)
        .bind(record.context_message.as_deref())
        .bind(record.reference_doctype.as_deref())
        .bind(record.reference_name.as_deref())
        .bind(record.party.as_deref())
        .bind(record.communication.as_deref())
        .bind(record.profile_name.as_deref())
        .bind(record.priority)
        .bind(record.error.as_deref())
        .bind(record.date_sent.map(datetime_to_i64))
        .bind(datetime_to_i64(record.created_at))
        .bind(datetime_to_i64(record.updated_at))
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn get_message(pool: &AnyPool, kind: DbKind, id: &str) -> Result<Option<MessageRecord>> {
    let base_sql = format!("SELECT {} FROM messages WHERE id = ?", MESSAGE_COLUMNS);
    let sql = rewrite_sql(&base_sql, kind);
    let row = sqlx::query(sql.as_ref()).bind(id).fetch_optional(pool).await?;
    row.map(|r| map_message_row(&r)).transpose()
}

/// Exclusive acquisition of a queued outbound record. The check-and-set
/// on the current status is what makes concurrent dispatch attempts
/// safe: the loser sees zero affected rows and must exit.
pub async fn claim_dispatch(pool: &AnyPool, kind: DbKind, id: &str) -> Result<bool> {
    let sql = rewrite_sql(
        "UPDATE messages SET status = 'Sending', updated_at = ? \
         WHERE id = ? AND status = 'Not Sent' AND direction = 'Sent'",
        kind,
    );
    let result = sqlx::query(sql.as_ref())
        .bind(datetime_to_i64(Utc::now()))
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() == 1)
}

pub async fn mark_sent(
    pool: &AnyPool,
    kind: DbKind,
    id: &str,
    provider_id: &str,
    status: DeliveryStatus,
    date_sent: Option<DateTime<Utc>>,
    error: Option<&str>,
) -> Result<()> {
    let sql = rewrite_sql(
        "UPDATE messages SET provider_id = ?, status = ?, date_sent = ?, error = ?, updated_at = ? \
         WHERE id = ?",
        kind,
    );
    sqlx::query(sql.as_ref())
        .bind(provider_id)
        .bind(status.as_str())
        .bind(date_sent.map(datetime_to_i64))
        .bind(error)
        .bind(datetime_to_i64(Utc::now()))
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn release_for_retry(
    pool: &AnyPool,
    kind: DbKind,
    id: &str,
    retry: i32,
    error: &str,
) -> Result<()> {
    let sql = rewrite_sql(
        "UPDATE messages SET status = 'Not Sent', retry = ?, error = ?, updated_at = ? WHERE id = ?",
        kind,
    );
    sqlx::query(sql.as_ref())
        .bind(retry as i64)
        .bind(error)
        .bind(datetime_to_i64(Utc::now()))
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn mark_dispatch_error(pool: &AnyPool, kind: DbKind, id: &str, error: &str) -> Result<()> {
    let sql = rewrite_sql(
        "UPDATE messages SET status = 'Error', error = ?, updated_at = ? WHERE id = ?",
        kind,
    );
    sqlx::query(sql.as_ref())
        .bind(error)
        .bind(datetime_to_i64(Utc::now()))
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn set_status(
    pool: &AnyPool,
    kind: DbKind,
    id: &str,
    status: DeliveryStatus,
    error: Option<&str>,
) -> Result<()> {
    let sql = rewrite_sql(
        "UPDATE messages SET status = ?, error = ?, updated_at = ? WHERE id = ?",
        kind,
    );
    sqlx::query(sql.as_ref())
        .bind(status.as_str())
        .bind(error)
        .bind(datetime_to_i64(Utc::now()))
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn set_reply_handler_expired(
    pool: &AnyPool,
    kind: DbKind,
    id: &str,
    expired: bool,
) -> Result<()> {
    let sql = rewrite_sql(
        "UPDATE messages SET reply_handler_expired = ?, updated_at = ? WHERE id = ?",
        kind,
    );
    sqlx::query(sql.as_ref())
        .bind(expired as i64)
        .bind(datetime_to_i64(Utc::now()))
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Status-callback lookup: the exact (provider id, from, to) triple.
pub async fn find_by_provider_triple(
    pool: &AnyPool,
    kind: DbKind,
    provider_id: &str,
    from_addr: &str,
    to_addr: &str,
) -> Result<Option<MessageRecord>> {
    let base_sql = format!(
        "SELECT {} FROM messages WHERE provider_id = ? AND from_addr = ? AND to_addr = ? LIMIT 1",
        MESSAGE_COLUMNS
    );
    let sql = rewrite_sql(&base_sql, kind);
    let row = sqlx::query(sql.as_ref())
        .bind(provider_id)
        .bind(from_addr)
        .bind(to_addr)
        .fetch_optional(pool)
        .await?;
    row.map(|r| map_message_row(&r)).transpose()
}

pub async fn queued_outgoing(pool: &AnyPool, kind: DbKind, limit: i64) -> Result<Vec<String>> {
    let sql = rewrite_sql(
        "SELECT id FROM messages \
         WHERE status = 'Not Sent' AND direction = 'Sent' \
         ORDER BY priority DESC, created_at ASC LIMIT ?",
        kind,
    );
    let rows = sqlx::query(sql.as_ref()).bind(limit).fetch_all(pool).await?;
    let mut result = Vec::new();
    for row in rows {
        result.push(row.try_get("id")?);
    }
    Ok(result)
}

pub async fn pending_reconciliation(pool: &AnyPool, kind: DbKind, limit: i64) -> Result<Vec<String>> {
    let sql = rewrite_sql(
        "SELECT id FROM messages \
         WHERE status IN ('Sent', 'Queued') AND direction = 'Sent' AND provider_id IS NOT NULL \
         ORDER BY created_at DESC LIMIT ?",
        kind,
    );
    let rows = sqlx::query(sql.as_ref()).bind(limit).fetch_all(pool).await?;
    let mut result = Vec::new();
    for row in rows {
        result.push(row.try_get("id")?);
    }
    Ok(result)
}

pub async fn queued_incoming_media(pool: &AnyPool, kind: DbKind, limit: i64) -> Result<Vec<String>> {
    let sql = rewrite_sql(
        "SELECT id FROM messages \
         WHERE incoming_media_status = 'To Download' AND direction = 'Received' \
         ORDER BY priority DESC, created_at ASC LIMIT ?",
        kind,
    );
    let rows = sqlx::query(sql.as_ref()).bind(limit).fetch_all(pool).await?;
    let mut result = Vec::new();
    for row in rows {
        result.push(row.try_get("id")?);
    }
    Ok(result)
}

/// Check-and-set claim mirroring `claim_dispatch`, for the media queue.
pub async fn claim_media_download(pool: &AnyPool, kind: DbKind, id: &str) -> Result<bool> {
    let sql = rewrite_sql(
        "UPDATE messages SET incoming_media_status = 'Downloading', updated_at = ? \
         WHERE id = ? AND incoming_media_status = 'To Download' AND direction = 'Received'",
        kind,
    );
    let result = sqlx::query(sql.as_ref())
        .bind(datetime_to_i64(Utc::now()))
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() == 1)
}

pub async fn mark_media_attached(
    pool: &AnyPool,
    kind: DbKind,
    id: &str,
    attachment: &AttachmentRef,
) -> Result<()> {
    let sql = rewrite_sql(
        "UPDATE messages SET incoming_media_status = 'Attached', attachment = ?, error = NULL, \
         updated_at = ? WHERE id = ?",
        kind,
    );
    sqlx::query(sql.as_ref())
        .bind(serde_json::to_string(attachment)?)
        .bind(datetime_to_i64(Utc::now()))
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn release_media_for_retry(
    pool: &AnyPool,
    kind: DbKind,
    id: &str,
    retry: i32,
    error: &str,
) -> Result<()> {
    let sql = rewrite_sql(
        "UPDATE messages SET incoming_media_status = 'To Download', retry = ?, error = ?, \
         updated_at = ? WHERE id = ?",
        kind,
    );
    sqlx::query(sql.as_ref())
        .bind(retry as i64)
        .bind(error)
        .bind(datetime_to_i64(Utc::now()))
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn mark_media_error(pool: &AnyPool, kind: DbKind, id: &str, error: &str) -> Result<()> {
    let sql = rewrite_sql(
        "UPDATE messages SET incoming_media_status = 'Error', error = ?, updated_at = ? WHERE id = ?",
        kind,
    );
    sqlx::query(sql.as_ref())
        .bind(error)
        .bind(datetime_to_i64(Utc::now()))
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn set_media_status(
    pool: &AnyPool,
    kind: DbKind,
    id: &str,
    status: Option<MediaStatus>,
) -> Result<()> {
    let sql = rewrite_sql(
        "UPDATE messages SET incoming_media_status = ?, updated_at = ? WHERE id = ?",
        kind,
    );
    sqlx::query(sql.as_ref())
        .bind(status.map(|v| v.as_str()))
        .bind(datetime_to_i64(Utc::now()))
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

/// The daily sweep: queued outbound records untouched for longer than
/// the retention window are marked Expired and leave the queue.
pub async fn expire_stale(pool: &AnyPool, kind: DbKind, cutoff: DateTime<Utc>) -> Result<u64> {
    let sql = rewrite_sql(
        "UPDATE messages SET status = 'Expired', updated_at = ? \
         WHERE status = 'Not Sent' AND direction = 'Sent' AND updated_at < ?",
        kind,
    );
    let result = sqlx::query(sql.as_ref())
        .bind(datetime_to_i64(Utc::now()))
        .bind(datetime_to_i64(cutoff))
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

/// Explicit reply correlation: outbound record matching the quoted
/// provider id and its sender.
pub async fn get_replied_to_message(
    pool: &AnyPool,
    kind: DbKind,
    provider_id: &str,
    sender: &str,
) -> Result<Option<String>> {
    let sql = rewrite_sql(
        "SELECT id FROM messages \
         WHERE provider_id = ? AND from_addr = ? AND direction = 'Sent' LIMIT 1",
        kind,
    );
    let row = sqlx::query(sql.as_ref())
        .bind(provider_id)
        .bind(sender)
        .fetch_optional(pool)
        .await?;
    Ok(row.map(|r| r.try_get("id")).transpose()?)
}

/// Indirect reply correlation: the most recent delivered outbound
/// message on the reversed endpoint pair whose handler allows indirect
/// replies. Window math is applied by the caller.
pub async fn last_indirect_reply_candidate(
    pool: &AnyPool,
    kind: DbKind,
    to_addr: &str,
    from_addr: &str,
) -> Result<Option<IndirectCandidate>> {
    let sql = rewrite_sql(
        "SELECT m.id, m.date_sent, m.reply_handler, m.reply_handler_expired, \
                h.indirect_reply_window_seconds \
         FROM messages m \
         INNER JOIN reply_handlers h ON h.name = m.reply_handler \
         WHERE m.to_addr = ? AND m.from_addr = ? \
           AND m.direction = 'Sent' \
           AND m.status IN ('Delivered', 'Read') \
           AND m.date_sent IS NOT NULL \
           AND h.allow_indirect_reply = 1 \
         ORDER BY m.date_sent DESC LIMIT 1",
        kind,
    );
    let row = sqlx::query(sql.as_ref())
        .bind(to_addr)
        .bind(from_addr)
        .fetch_optional(pool)
        .await?;

    if let Some(row) = row {
        let date_sent: Option<i64> = row.try_get("date_sent")?;
        return Ok(Some(IndirectCandidate {
            id: row.try_get("id")?,
            date_sent: date_sent.map(i64_to_datetime),
            reply_handler: row.try_get("reply_handler")?,
            reply_handler_expired: row.try_get::<i64, _>("reply_handler_expired")? != 0,
            window_seconds: row.try_get("indirect_reply_window_seconds")?,
        }));
    }
    Ok(None)
}

pub async fn upsert_reply_handler(
    pool: &AnyPool,
    kind: DbKind,
    record: &ReplyHandlerRecord,
) -> Result<()> {
    let sql = rewrite_sql(
        r#"INSERT INTO reply_handlers (
            name, handler, allow_indirect_reply, indirect_reply_window_seconds,
            download_media_before_handling, error_reply_message
        ) VALUES (?, ?, ?, ?, ?, ?)
        ON CONFLICT(name) DO UPDATE SET
            handler=excluded.handler,
            allow_indirect_reply=excluded.allow_indirect_reply,
            indirect_reply_window_seconds=excluded.indirect_reply_window_seconds,
            download_media_before_handling=excluded.download_media_before_handling,
            error_reply_message=excluded.error_reply_message"#,
        kind,
    );
    sqlx::query(sql.as_ref())
        .bind(&record.name)
        .bind(&record.handler)
        .bind(record.allow_indirect_reply as i64)
        .bind(record.indirect_reply_window_seconds)
        .bind(record.download_media_before_handling as i64)
        .bind(record.error_reply_message.as_deref())
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn get_reply_handler(
    pool: &AnyPool,
    kind: DbKind,
    name: &str,
) -> Result<Option<ReplyHandlerRecord>> {
    let sql = rewrite_sql(
        "SELECT name, handler, allow_indirect_reply, indirect_reply_window_seconds, \
         download_media_before_handling, error_reply_message \
         FROM reply_handlers WHERE name = ?",
        kind,
    );
    let row = sqlx::query(sql.as_ref()).bind(name).fetch_optional(pool).await?;

    if let Some(row) = row {
        return Ok(Some(ReplyHandlerRecord {
            name: row.try_get("name")?,
            handler: row.try_get("handler")?,
            allow_indirect_reply: row.try_get::<i64, _>("allow_indirect_reply")? != 0,
            indirect_reply_window_seconds: row.try_get("indirect_reply_window_seconds")?,
            download_media_before_handling: row
                .try_get::<i64, _>("download_media_before_handling")?
                != 0,
            error_reply_message: row.try_get("error_reply_message")?,
        }));
    }
    Ok(None)
}

pub async fn upsert_template(pool: &AnyPool, kind: DbKind, record: &TemplateRecord) -> Result<()> {
    let sql = rewrite_sql(
        r#"INSERT INTO templates (name, template_sid, body, parameters, media_variable, reply_handler)
        VALUES (?, ?, ?, ?, ?, ?)
        ON CONFLICT(name) DO UPDATE SET
            template_sid=excluded.template_sid,
            body=excluded.body,
            parameters=excluded.parameters,
            media_variable=excluded.media_variable,
            reply_handler=excluded.reply_handler"#,
        kind,
    );
    sqlx::query(sql.as_ref())
        .bind(&record.name)
        .bind(record.template_sid.as_deref())
        .bind(&record.body)
        .bind(serde_json::to_string(&record.parameters)?)
        .bind(record.media_variable.as_deref())
        .bind(record.reply_handler.as_deref())
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn get_template(pool: &AnyPool, kind: DbKind, name: &str) -> Result<Option<TemplateRecord>> {
    let sql = rewrite_sql(
        "SELECT name, template_sid, body, parameters, media_variable, reply_handler \
         FROM templates WHERE name = ?",
        kind,
    );
    let row = sqlx::query(sql.as_ref()).bind(name).fetch_optional(pool).await?;

    if let Some(row) = row {
        let parameters: String = row.try_get("parameters")?;
        return Ok(Some(TemplateRecord {
            name: row.try_get("name")?,
            template_sid: row.try_get("template_sid")?,
            body: row.try_get("body")?,
            parameters: serde_json::from_str(&parameters).unwrap_or_default(),
            media_variable: row.try_get("media_variable")?,
            reply_handler: row.try_get("reply_handler")?,
        }));
    }
    Ok(None)
}

pub async fn insert_file(pool: &AnyPool, kind: DbKind, record: &FileRecord) -> Result<()> {
    let sql = rewrite_sql(
        "INSERT INTO files (id, filename, mime_type, attached_to, size, created_at) \
         VALUES (?, ?, ?, ?, ?, ?)",
        kind,
    );
    sqlx::query(sql.as_ref())
        .bind(&record.id)
        .bind(&record.filename)
        .bind(record.mime_type.as_deref())
        .bind(&record.attached_to)
        .bind(record.size)
        .bind(datetime_to_i64(record.created_at))
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn get_file(pool: &AnyPool, kind: DbKind, id: &str) -> Result<Option<FileRecord>> {
    let sql = rewrite_sql(
        "SELECT id, filename, mime_type, attached_to, size, created_at FROM files WHERE id = ?",
        kind,
    );
    let row = sqlx::query(sql.as_ref()).bind(id).fetch_optional(pool).await?;

    if let Some(row) = row {
        let created_at: i64 = row.try_get("created_at")?;
        return Ok(Some(FileRecord {
            id: row.try_get("id")?,
            filename: row.try_get("filename")?,
            mime_type: row.try_get("mime_type")?,
            attached_to: row.try_get("attached_to")?,
            size: row.try_get("size")?,
            created_at: i64_to_datetime(created_at),
        }));
    }
    Ok(None)
}

pub async fn insert_communication(
    pool: &AnyPool,
    kind: DbKind,
    record: &CommunicationRecord,
) -> Result<()> {
    let sql = rewrite_sql(
        r#"INSERT INTO communications (
            id, communication_type, subject, content, sent_received, reference_doctype,
            reference_name, phone_no, sender_name, in_reply_to, delivery_status, has_attachment,
            created_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        kind,
    );
    sqlx::query(sql.as_ref())
        .bind(&record.id)
        .bind(&record.communication_type)
        .bind(&record.subject)
        .bind(record.content.as_deref())
        .bind(record.sent_received.as_str())
        .bind(record.reference_doctype.as_deref())
        .bind(record.reference_name.as_deref())
        .bind(record.phone_no.as_deref())
        .bind(record.sender_name.as_deref())
        .bind(record.in_reply_to.as_deref())
        .bind(record.delivery_status.as_deref())
        .bind(record.has_attachment as i64)
        .bind(datetime_to_i64(record.created_at))
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn set_communication_delivery_status(
    pool: &AnyPool,
    kind: DbKind,
    id: &str,
    delivery_status: &str,
) -> Result<()> {
    let sql = rewrite_sql(
        "UPDATE communications SET delivery_status = ? WHERE id = ?",
        kind,
    );
    sqlx::query(sql.as_ref())
        .bind(delivery_status)
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn get_communication(
    pool: &AnyPool,
    kind: DbKind,
    id: &str,
) -> Result<Option<CommunicationRecord>> {
    let sql = rewrite_sql(
        "SELECT id, communication_type, subject, content, sent_received, reference_doctype, \
         reference_name, phone_no, sender_name, in_reply_to, delivery_status, has_attachment, \
         created_at FROM communications WHERE id = ?",
        kind,
    );
    let row = sqlx::query(sql.as_ref()).bind(id).fetch_optional(pool).await?;

    if let Some(row) = row {
        let sent_received: String = row.try_get("sent_received")?;
        let created_at: i64 = row.try_get("created_at")?;
        return Ok(Some(CommunicationRecord {
            id: row.try_get("id")?,
            communication_type: row.try_get("communication_type")?,
            subject: row.try_get("subject")?,
            content: row.try_get("content")?,
            sent_received: Direction::parse(&sent_received)
                .ok_or_else(|| anyhow::anyhow!("unknown direction: {sent_received}"))?,
            reference_doctype: row.try_get("reference_doctype")?,
            reference_name: row.try_get("reference_name")?,
            phone_no: row.try_get("phone_no")?,
            sender_name: row.try_get("sender_name")?,
            in_reply_to: row.try_get("in_reply_to")?,
            delivery_status: row.try_get("delivery_status")?,
            has_attachment: row.try_get::<i64, _>("has_attachment")? != 0,
            created_at: i64_to_datetime(created_at),
        }));
    }
    Ok(None)
}

pub async fn message_counts(pool: &AnyPool, kind: DbKind) -> Result<(i64, i64)> {
    let sql = rewrite_sql(
        "SELECT COUNT(1) AS n FROM messages WHERE direction = ?",
        kind,
    );
    let sent: i64 = sqlx::query(sql.as_ref())
        .bind(Direction::Sent.as_str())
        .fetch_one(pool)
        .await?
        .try_get("n")?;
    let received: i64 = sqlx::query(sql.as_ref())
        .bind(Direction::Received.as_str())
        .fetch_one(pool)
        .await?
        .try_get("n")?;
    Ok((sent, received))
}

pub fn new_message_id() -> String {
    Uuid::new_v4().to_string()
}
