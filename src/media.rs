use crate::config::{expand_tilde, Config};
use crate::db::{self, FileRecord, MessageRecord};
use crate::types::{retry_disposition, AttachmentRef, Direction, MediaStatus, RetryDisposition};
use crate::AppState;
use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use hmac::{Hmac, Mac};
use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use sha2::Sha256;
use std::path::PathBuf;
use tracing::{debug, error};

type HmacSha256 = Hmac<Sha256>;

/// Seam for on-demand artifacts (e.g. rendered print documents). The
/// engine never generates these itself; a deployment injects a renderer
/// and the default declines.
#[async_trait]
pub trait PrintRenderer: Send + Sync {
    async fn render(&self, message: &MessageRecord) -> Result<Option<(String, Vec<u8>)>>;
}

pub struct NoPrintRenderer;

#[async_trait]
impl PrintRenderer for NoPrintRenderer {
    async fn render(&self, _message: &MessageRecord) -> Result<Option<(String, Vec<u8>)>> {
        Ok(None)
    }
}

pub fn extension_for_mime(mime_type: &str) -> Option<&'static str> {
    match mime_type {
        "image/jpeg" => Some("jpg"),
        "image/png" => Some("png"),
        "image/gif" => Some("gif"),
        "image/webp" => Some("webp"),
        "audio/ogg" => Some("ogg"),
        "audio/mpeg" => Some("mp3"),
        "audio/amr" => Some("amr"),
        "video/mp4" => Some("mp4"),
        "video/3gpp" => Some("3gp"),
        "application/pdf" => Some("pdf"),
        "text/plain" => Some("txt"),
        "text/vcard" => Some("vcf"),
        _ => None,
    }
}

pub fn mime_for_filename(filename: &str) -> &'static str {
    match filename.rsplit('.').next() {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("ogg") => "audio/ogg",
        Some("mp3") => "audio/mpeg",
        Some("amr") => "audio/amr",
        Some("mp4") => "video/mp4",
        Some("3gp") => "video/3gpp",
        Some("pdf") => "application/pdf",
        Some("txt") => "text/plain",
        Some("vcf") => "text/vcard",
        _ => "application/octet-stream",
    }
}

/// Derives a stored filename from the media identifier (last URL path
/// segment) and a MIME-derived extension.
pub fn media_filename(media_url: &str, mime_type: Option<&str>) -> String {
    let path = media_url
        .split(['?', '#'])
        .next()
        .unwrap_or(media_url)
        .trim_end_matches('/');
    let basename = path.rsplit('/').next().unwrap_or("media");
    let basename = if basename.is_empty() { "media" } else { basename };

    match mime_type.and_then(extension_for_mime) {
        Some(ext) if !basename.ends_with(&format!(".{ext}")) => format!("{basename}.{ext}"),
        _ => basename.to_string(),
    }
}

pub fn sign_media_id(secret: &str, message_id: &str) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("hmac accepts any key size");
    mac.update(message_id.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

pub fn verify_media_signature(secret: &str, message_id: &str, signature: &str) -> bool {
    let Ok(expected) = hex::decode(signature) else {
        return false;
    };
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("hmac accepts any key size");
    mac.update(message_id.as_bytes());
    mac.verify_slice(&expected).is_ok()
}

/// Externally reachable URL for a message's attachment, signed so the
/// media endpoint can verify the request without a session.
pub fn signed_media_url(public_url: &str, secret: &str, message_id: &str) -> String {
    let encoded = utf8_percent_encode(message_id, NON_ALPHANUMERIC);
    format!(
        "{}/v1/media/{}?sig={}",
        public_url.trim_end_matches('/'),
        encoded,
        sign_media_id(secret, message_id)
    )
}

pub fn storage_path(config: &Config, file: &FileRecord) -> PathBuf {
    expand_tilde(&config.media.storage_dir).join(format!("{}-{}", file.id, file.filename))
}

/// Persists attachment bytes on disk and records them in the file
/// table, linked to the audit row when one exists.
pub async fn store_file(
    state: &AppState,
    filename: &str,
    mime_type: Option<&str>,
    attached_to: &str,
    content: &[u8],
) -> Result<FileRecord> {
    let record = FileRecord {
        id: db::new_message_id(),
        filename: filename.to_string(),
        mime_type: mime_type.map(|s| s.to_string()),
        attached_to: attached_to.to_string(),
        size: content.len() as i64,
        created_at: Utc::now(),
    };

    let path = storage_path(&state.config, &record);
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(&path, content).await?;

    db::insert_file(&state.pool, state.db_kind, &record).await?;
    Ok(record)
}

pub async fn read_file_bytes(state: &AppState, file: &FileRecord) -> Result<Vec<u8>> {
    Ok(tokio::fs::read(storage_path(&state.config, file)).await?)
}

/// Hourly sweep over inbound messages still waiting on their media.
pub async fn flush_incoming_media_queue(state: &AppState) {
    if state.config.messages_muted(None) {
        debug!("whatsapp messages are muted, skipping media sweep");
        return;
    }

    let batch = match db::queued_incoming_media(&state.pool, state.db_kind, state.config.queue.media_batch)
        .await
    {
        Ok(batch) => batch,
        Err(err) => {
            error!("failed to scan incoming media queue: {err:?}");
            return;
        }
    };

    for id in batch {
        // A failure on one record never aborts its siblings.
        if let Err(err) = download_incoming_media(state, &id, false).await {
            error!(message_id = %id, "incoming media download failed: {err:?}");
        }
    }
}

/// Downloads the media referenced by one inbound message and persists
/// it as a durable attachment. With `now` the failure propagates to the
/// caller; otherwise it is logged and absorbed by the retry budget.
pub async fn download_incoming_media(state: &AppState, id: &str, now: bool) -> Result<()> {
    let Some(message) = db::get_message(&state.pool, state.db_kind, id).await? else {
        return Ok(());
    };

    if state.config.messages_muted(Some(message.provider)) {
        debug!(message_id = %id, "whatsapp messages are muted, skipping download");
        return Ok(());
    }

    if message.direction != Direction::Received
        || message.incoming_media_status != Some(MediaStatus::ToDownload)
    {
        return Ok(());
    }

    let attachment = message.attachment.clone().unwrap_or_default();

    // Already-stored files and URL-less attachments short-circuit
    // without a network call.
    if attachment.file_id.is_some() {
        db::set_media_status(&state.pool, state.db_kind, id, Some(MediaStatus::Attached)).await?;
        return Ok(());
    }
    let Some(media_url) = attachment.media_url.clone() else {
        db::set_media_status(&state.pool, state.db_kind, id, None).await?;
        return Ok(());
    };

    if !db::claim_media_download(&state.pool, state.db_kind, id).await? {
        return Ok(());
    }

    match fetch_and_store(state, &message, &media_url, &attachment).await {
        Ok(file_id) => {
            let mut updated = attachment;
            updated.file_id = Some(file_id);
            db::mark_media_attached(&state.pool, state.db_kind, id, &updated).await?;
            Ok(())
        }
        Err(err) => {
            let text = err.to_string();
            match retry_disposition(message.retry) {
                RetryDisposition::Retry(next) => {
                    db::release_media_for_retry(&state.pool, state.db_kind, id, next, &text).await?;
                }
                RetryDisposition::Terminal => {
                    db::mark_media_error(&state.pool, state.db_kind, id, &text).await?;
                }
            }

            if now {
                Err(err)
            } else {
                error!(
                    message_id = %id,
                    reference_doctype = message.reference_doctype.as_deref().unwrap_or(""),
                    reference_name = message.reference_name.as_deref().unwrap_or(""),
                    "failed to download incoming media: {text}"
                );
                Ok(())
            }
        }
    }
}

async fn fetch_and_store(
    state: &AppState,
    message: &MessageRecord,
    media_url: &str,
    attachment: &AttachmentRef,
) -> Result<String> {
    let adapter = state.providers.adapter(message.provider);
    let content = adapter.download_media(media_url).await?;

    let filename = media_filename(media_url, attachment.mime_type.as_deref());
    let attached_to = message
        .communication
        .as_deref()
        .unwrap_or(message.id.as_str());

    let file = store_file(
        state,
        &filename,
        attachment.mime_type.as_deref(),
        attached_to,
        &content,
    )
    .await?;
    Ok(file.id)
}

/// Resolves the servable attachment of an outbound record for the
/// secure media endpoint: stored file bytes, or an on-demand print
/// artifact from the injected renderer.
pub async fn resolve_outbound_attachment(
    state: &AppState,
    message: &MessageRecord,
) -> Result<Option<(String, String, Vec<u8>)>> {
    let Some(attachment) = message.attachment.as_ref() else {
        return Ok(None);
    };

    if let Some(file_id) = attachment.file_id.as_deref() {
        let Some(file) = db::get_file(&state.pool, state.db_kind, file_id).await? else {
            return Ok(None);
        };
        let bytes = read_file_bytes(state, &file).await?;
        let mime = file
            .mime_type
            .clone()
            .unwrap_or_else(|| mime_for_filename(&file.filename).to_string());
        return Ok(Some((file.filename, mime, bytes)));
    }

    if attachment.print_artifact {
        if let Some((filename, bytes)) = state.print_renderer.render(message).await? {
            let mime = mime_for_filename(&filename).to_string();
            return Ok(Some((filename, mime, bytes)));
        }
    }

    Ok(None)
}
