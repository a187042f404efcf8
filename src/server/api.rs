use crate::assistant::{ ChatOutcome, ChatService };
use crate::models::api::{ ChatQuery, ChatReply, HealthStatus };
use crate::ratelimit::identifier_from_headers;
use std::error::Error;
use std::net::SocketAddr;
use std::sync::Arc;
use axum::{
    body::{ Body, Bytes },
    routing::{ get, post },
    Router,
    extract::{ State, Query },
    response::{ IntoResponse, Response },
    http::{ header::CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue, StatusCode },
    Json,
};
use futures::StreamExt;
use tower_http::cors::{Any, CorsLayer};
use log::{ info, error };
use uuid::Uuid;

const REQUEST_ID_HEADER: &str = "x-request-id";

#[derive(Clone)]
pub struct AppState {
    pub chat: Arc<ChatService>,
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/chat", post(chat_handler))
        .route("/health", get(health_handler))
        .layer(cors)
        .with_state(state)
}

pub struct TlsPaths {
    pub cert_path: String,
    pub key_path: String,
}

pub async fn start_http_server(
    addr: SocketAddr,
    app: Router,
    tls: Option<TlsPaths>,
) -> Result<(), Box<dyn Error + Send + Sync>> {
    if let Some(tls) = tls {
        // Both ring and aws-lc are linked, so rustls needs an explicit provider.
        let _ = rustls::crypto::ring::default_provider().install_default();
        let tls_config = axum_server::tls_rustls::RustlsConfig::from_pem_file(
            &tls.cert_path,
            &tls.key_path
        ).await?;

        info!("HTTPS server listening on: https://{}", addr);
        axum_server::bind_rustls(addr, tls_config)
            .serve(app.into_make_service())
            .await?;
    } else {
        let listener = tokio::net::TcpListener::bind(addr).await.map_err(|e| {
            error!("Failed to bind HTTP server to {}: {}. Try a different port.", addr, e);
            e
        })?;
        info!("HTTP server listening on: http://{}", addr);
        axum::serve(listener, app.into_make_service())
            .with_graceful_shutdown(shutdown_signal())
            .await?;
    }

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received, draining connections");
}

async fn chat_handler(
    State(state): State<AppState>,
    Query(query): Query<ChatQuery>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let request_id = Uuid::new_v4().to_string();
    let identifier = identifier_from_headers(&headers);

    let mut response = match state.chat.handle(&request_id, &identifier, &body, query.stream).await {
        Ok(ChatOutcome::Reply(text)) => {
            info!("[{}] Responded with {} bytes", request_id, text.len());
            (StatusCode::OK, Json(ChatReply { response: text })).into_response()
        }
        Ok(ChatOutcome::Stream(chunks)) => {
            let rid = request_id.clone();
            let chunks = chunks.map(move |chunk| {
                if let Err(e) = &chunk {
                    error!("[{}] Stream aborted mid-response: {}", rid, e);
                }
                chunk
            });
            (
                StatusCode::OK,
                [(CONTENT_TYPE, "text/plain; charset=utf-8")],
                Body::from_stream(chunks),
            ).into_response()
        }
        Err(e) => e.into_response(),
    };

    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(HeaderName::from_static(REQUEST_ID_HEADER), value);
    }
    response
}

async fn health_handler() -> impl IntoResponse {
    Json(HealthStatus { status: "ok".into() })
}
