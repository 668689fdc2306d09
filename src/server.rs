//! HTTP surface: `GET /health`, `POST /webapp`, `POST /telegram`.

use crate::config::Config;
use crate::error::{StartupError, SubmissionError};
use crate::identity::AdminIdentity;
use crate::models::{RelayResponse, Update, WebAppSubmission};
use crate::relay::{Relay, RelaySettings};
use crate::store::{JsonFileStore, RequestStore};
use crate::telegram::client::{Messenger, TelegramMessenger};
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderValue, Method, StatusCode, header};
use axum::response::Json;
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{AllowOrigin, CorsLayer};

type JsonReply = (StatusCode, Json<RelayResponse>);

pub fn build_router(relay: Arc<Relay>, cors_origin: &str) -> Router {
    Router::new()
        .route("/health", get(health).fallback(not_found))
        .route("/webapp", post(handle_webapp).fallback(not_found))
        .route("/telegram", post(handle_telegram).fallback(not_found))
        .fallback(not_found)
        .layer(cors_layer(cors_origin))
        .with_state(relay)
}

fn cors_layer(origin: &str) -> CorsLayer {
    let allow_origin = if origin == "*" {
        AllowOrigin::any()
    } else {
        match HeaderValue::from_str(origin) {
            Ok(value) => AllowOrigin::exact(value),
            Err(_) => {
                tracing::warn!(origin, "Invalid CORS origin, allowing any");
                AllowOrigin::any()
            }
        }
    };
    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE])
}

/// Empty bodies read as `{}`.
fn parse_body(body: &[u8]) -> Result<serde_json::Value, JsonReply> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(serde_json::json!({}));
    }
    serde_json::from_slice(body).map_err(|e| {
        tracing::debug!("Rejected invalid JSON body: {e}");
        (
            StatusCode::BAD_REQUEST,
            Json(RelayResponse::rejected("invalid json")),
        )
    })
}

async fn health() -> Json<RelayResponse> {
    Json(RelayResponse::ok())
}

async fn not_found() -> JsonReply {
    (
        StatusCode::NOT_FOUND,
        Json(RelayResponse::rejected("not found")),
    )
}

async fn handle_webapp(State(relay): State<Arc<Relay>>, body: Bytes) -> JsonReply {
    let value = match parse_body(&body) {
        Ok(value) => value,
        Err(reply) => return reply,
    };
    let submission: WebAppSubmission = match serde_json::from_value(value) {
        Ok(submission) => submission,
        Err(e) => {
            tracing::debug!("Malformed submission body: {e}");
            WebAppSubmission::default()
        }
    };

    match relay.handle_submission(submission).await {
        Ok(()) => (StatusCode::OK, Json(RelayResponse::ok())),
        Err(e) => {
            if let SubmissionError::Delivery(ref cause) = e {
                tracing::error!("Submission delivery failed: {cause}");
            }
            (StatusCode::BAD_REQUEST, Json(RelayResponse::rejected(e)))
        }
    }
}

/// Always `{ok:true}` for well-formed JSON so the Bot API does not redeliver;
/// processing failures are only logged.
async fn handle_telegram(State(relay): State<Arc<Relay>>, body: Bytes) -> JsonReply {
    let value = match parse_body(&body) {
        Ok(value) => value,
        Err(reply) => return reply,
    };
    match serde_json::from_value::<Update>(value) {
        Ok(update) => {
            if let Err(e) = relay.handle_update(update).await {
                tracing::error!("Update handling failed: {e}");
            }
        }
        Err(e) => tracing::debug!("Ignoring unrecognized update: {e}"),
    }
    (StatusCode::OK, Json(RelayResponse::ok()))
}

pub async fn run_server(config: Config) -> anyhow::Result<()> {
    let bot = TelegramMessenger::build_bot(
        &config.bot_token,
        Duration::from_secs(config.request_timeout_seconds),
    )?;
    let messenger: Arc<dyn Messenger> = Arc::new(TelegramMessenger::new(bot));
    let store: Arc<dyn RequestStore> =
        Arc::new(JsonFileStore::new(&config.storage_path, config.retention()));
    let relay = Arc::new(Relay::new(
        messenger,
        store,
        AdminIdentity::from_config(&config),
        RelaySettings::from(&config),
    ));

    let app = build_router(relay, &config.cors_origin);
    let addr = config.listen_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|source| StartupError::Bind {
            addr: addr.clone(),
            source,
        })?;

    let cancel_token = CancellationToken::new();
    spawn_signal_handler(cancel_token.clone());

    tracing::info!(
        storage = %config.storage_path.display(),
        verify_init_data = config.verify_init_data,
        "Server running on http://{addr}"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { cancel_token.cancelled().await })
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

fn spawn_signal_handler(cancel_token: CancellationToken) {
    tokio::spawn(async move {
        let ctrl_c = tokio::signal::ctrl_c();
        #[cfg(unix)]
        {
            let mut sigterm =
                match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                    Ok(signal) => signal,
                    Err(e) => {
                        tracing::error!("Failed to register SIGTERM handler: {e}");
                        return;
                    }
                };
            tokio::select! {
                result = ctrl_c => {
                    if let Err(e) = result {
                        tracing::error!("Failed to listen for SIGINT: {e}");
                        return;
                    }
                    tracing::info!("Received SIGINT, shutting down...");
                }
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM, shutting down...");
                }
            }
        }
        #[cfg(not(unix))]
        {
            if let Err(e) = ctrl_c.await {
                tracing::error!("Failed to listen for Ctrl+C: {e}");
                return;
            }
            tracing::info!("Received Ctrl+C, shutting down...");
        }
        cancel_token.cancel();
    });
}
