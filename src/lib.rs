pub mod audit;
pub mod config;
pub mod db;
pub mod dispatch;
pub mod media;
pub mod provider;
pub mod reconcile;
pub mod reply;
pub mod scheduler;
pub mod template;
pub mod types;

pub use config::Config;

use self::config::{load_config, resolve_database_url};
use self::db::DbKind;
use self::dispatch::{AllowAllSends, SendGate, SendRequest};
use self::media::{NoPrintRenderer, PrintRenderer};
use self::provider::twilio::{
    normalize_twilio_inbound, TwilioInboundForm, TwilioStatusCallbackForm,
};
use self::provider::ProviderSet;
use self::reply::{ExecutionIdentity, ReplyRegistry};
use self::types::Direction;

use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    middleware,
    response::IntoResponse,
    routing::{get, post},
    Form, Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::AnyPool;
use std::sync::Arc;
use std::time::Duration;
use tracing::error;

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub pool: AnyPool,
    pub http: reqwest::Client,
    pub db_kind: DbKind,
    pub providers: Arc<ProviderSet>,
    pub replies: Arc<ReplyRegistry>,
    pub identity: Arc<ExecutionIdentity>,
    pub send_gate: Arc<dyn SendGate>,
    pub print_renderer: Arc<dyn PrintRenderer>,
}

#[derive(Debug, Serialize)]
pub struct SendMessageResponse {
    pub message_ids: Vec<String>,
    pub status: String,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub sent_messages: i64,
    pub received_messages: i64,
}

#[derive(Debug, Deserialize)]
pub struct MediaQuery {
    pub sig: Option<String>,
}

pub async fn create_app() -> anyhow::Result<(AppState, Router)> {
    create_app_with(load_config(), ReplyRegistry::new()).await
}

/// Builds the state and router for an explicit configuration and reply
/// registry. Deployments register their reply-policy implementations
/// here before the router starts taking webhooks.
pub async fn create_app_with(
    config: Config,
    replies: ReplyRegistry,
) -> anyhow::Result<(AppState, Router)> {
    sqlx::any::install_default_drivers();

    let db_url = resolve_database_url(&config);
    let db_kind = db::db_kind_from_url(&db_url);
    let pool = AnyPool::connect(&db_url).await?;
    db::init_db(&pool, db_kind).await?;

    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.queue.request_timeout_seconds))
        .build()?;

    let providers = Arc::new(ProviderSet::from_config(&config, http.clone()));

    let state = AppState {
        config,
        pool,
        http,
        db_kind,
        providers,
        replies: Arc::new(replies),
        identity: Arc::new(ExecutionIdentity::new("Guest")),
        send_gate: Arc::new(AllowAllSends),
        print_renderer: Arc::new(NoPrintRenderer),
    };

    let authed_routes = Router::new()
        .route("/v1/messages/send", post(send_message))
        .layer(middleware::from_fn_with_state(state.clone(), require_auth));

    let public_routes = Router::new()
        .route("/v1/health", get(health))
        .route("/v1/status", get(status))
        .route("/v1/whatsapp/status-callback", post(status_callback))
        .route("/v1/whatsapp/inbound", post(whatsapp_inbound))
        .route("/v1/media/:message_id", get(serve_media));

    let app = Router::new()
        .merge(authed_routes)
        .merge(public_routes)
        .with_state(state.clone());

    Ok((state, app))
}

async fn require_auth(
    State(state): State<AppState>,
    headers: HeaderMap,
    req: axum::http::Request<axum::body::Body>,
    next: middleware::Next,
) -> impl IntoResponse {
    if let Some(token) = state.config.auth.token.as_ref() {
        let header = headers.get("X-Courier-Token").and_then(|v| v.to_str().ok());
        if header != Some(token.as_str()) {
            return StatusCode::UNAUTHORIZED.into_response();
        }
    }
    next.run(req).await
}

async fn health() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

async fn status(State(state): State<AppState>) -> impl IntoResponse {
    let (sent_messages, received_messages) = db::message_counts(&state.pool, state.db_kind)
        .await
        .unwrap_or((0, 0));
    Json(StatusResponse {
        sent_messages,
        received_messages,
    })
}

async fn send_message(
    State(state): State<AppState>,
    Json(request): Json<SendRequest>,
) -> impl IntoResponse {
    match dispatch::queue_messages(&state, request).await {
        Ok(message_ids) => Json(SendMessageResponse {
            message_ids,
            status: "queued".to_string(),
        })
        .into_response(),
        Err(err) => {
            error!("send_message error: {err:?}");
            (
                StatusCode::BAD_REQUEST,
                Json(json!({"error": err.to_string()})),
            )
                .into_response()
        }
    }
}

/// Provider status callback. Idempotent: unknown ids are ignored and
/// the response is 200 either way, so the provider stops retrying.
async fn status_callback(
    State(state): State<AppState>,
    Form(form): Form<TwilioStatusCallbackForm>,
) -> impl IntoResponse {
    if let Err(err) = reconcile::apply_status_callback(&state, &form).await {
        error!(provider_id = %form.message_sid, "status callback failed: {err:?}");
    }
    Json(json!({"status": "ok"}))
}

async fn whatsapp_inbound(
    State(state): State<AppState>,
    Form(form): Form<TwilioInboundForm>,
) -> impl IntoResponse {
    let event = normalize_twilio_inbound(form);
    match reply::route_incoming(&state, event).await {
        Ok(outcome) => Json(outcome).into_response(),
        Err(err) => {
            error!("inbound webhook error: {err:?}");
            (
                StatusCode::BAD_REQUEST,
                Json(json!({"error": err.to_string()})),
            )
                .into_response()
        }
    }
}

/// Signed media retrieval. Serves the resolved attachment of an
/// outbound record; anything else is not found.
async fn serve_media(
    State(state): State<AppState>,
    Path(message_id): Path<String>,
    Query(query): Query<MediaQuery>,
) -> impl IntoResponse {
    let Some(secret) = state.config.media.signing_secret.as_deref() else {
        return StatusCode::NOT_FOUND.into_response();
    };
    let Some(signature) = query.sig.as_deref() else {
        return StatusCode::FORBIDDEN.into_response();
    };
    if !media::verify_media_signature(secret, &message_id, signature) {
        return StatusCode::FORBIDDEN.into_response();
    }

    let message = match db::get_message(&state.pool, state.db_kind, &message_id).await {
        Ok(Some(message)) => message,
        Ok(None) => return StatusCode::NOT_FOUND.into_response(),
        Err(err) => {
            error!(message_id = %message_id, "media lookup failed: {err:?}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    if message.direction != Direction::Sent {
        return StatusCode::NOT_FOUND.into_response();
    }

    match media::resolve_outbound_attachment(&state, &message).await {
        Ok(Some((filename, mime, bytes))) => (
            [
                (header::CONTENT_TYPE, mime),
                (
                    header::CONTENT_DISPOSITION,
                    format!("attachment; filename=\"{filename}\""),
                ),
            ],
            bytes,
        )
            .into_response(),
        Ok(None) => StatusCode::NOT_FOUND.into_response(),
        Err(err) => {
            error!(message_id = %message_id, "media resolution failed: {err:?}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
