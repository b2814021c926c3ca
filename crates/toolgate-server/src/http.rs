// crates/toolgate-server/src/http.rs
// ============================================================================
// Module: HTTP Surface
// Description: Axum routes for discovery, invocation, subscription, heartbeat.
// Purpose: Expose the gateway service to agents over HTTP and SSE.
// Dependencies: axum, tokio-stream, toolgate-contract, toolgate-core
// ============================================================================

//! ## Overview
//! Four routes make up the agent-facing surface: `GET /v1/tools` returns
//! the caller's visible tool list, `POST /v1/tools/call` invokes a tool,
//! `GET /v1/subscribe` opens the SSE catalog channel (one `connection`
//! event, a `catalog` snapshot, then `catalog` updates), and
//! `POST /v1/connections/{id}/heartbeat` refreshes a subscription.
//! Authentication failures map to 401, authorization failures to 403;
//! tool-level failures ride inside the structured invocation result.
//! Invariants:
//! - The bearer credential is read from the `Authorization` header only.
//! - Every response to an invocation carries the server correlation header.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::convert::Infallible;
use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::Path;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::response::Response;
use axum::response::sse::Event;
use axum::response::sse::KeepAlive;
use axum::response::sse::Sse;
use axum::routing::get;
use axum::routing::post;
use serde::Serialize;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use toolgate_contract::CatalogMessage;
use toolgate_contract::ErrorCode;
use toolgate_contract::InvocationError;
use toolgate_contract::InvocationRequest;
use toolgate_contract::InvocationResult;
use toolgate_contract::ToolManifestEntry;
use toolgate_core::ConnectionId;

use crate::correlation::SERVER_CORRELATION_HEADER;
use crate::service::GatewayError;
use crate::service::GatewayService;

// ============================================================================
// SECTION: Router
// ============================================================================

/// Builds the agent-facing router over a gateway service.
#[must_use]
pub fn router(service: Arc<GatewayService>) -> Router {
    Router::new()
        .route("/healthz", get(health))
        .route("/v1/tools", get(list_tools))
        .route("/v1/tools/call", post(invoke_tool))
        .route("/v1/subscribe", get(subscribe))
        .route("/v1/connections/{connection_id}/heartbeat", post(heartbeat))
        .with_state(service)
}

/// Serves the router until the cancellation token fires.
///
/// # Errors
///
/// Returns the underlying I/O error when binding or serving fails.
pub async fn serve(
    service: Arc<GatewayService>,
    bind: std::net::SocketAddr,
    cancel: CancellationToken,
) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind).await?;
    tracing::info!(%bind, "gateway listening");
    axum::serve(listener, router(service))
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await
}

// ============================================================================
// SECTION: Handlers
// ============================================================================

/// Tool list response body.
#[derive(Debug, Serialize)]
struct ToolListBody {
    /// Tools visible to the caller.
    tools: Vec<ToolManifestEntry>,
}

/// Liveness probe.
async fn health() -> StatusCode {
    StatusCode::NO_CONTENT
}

/// Returns the caller's visible tool list.
async fn list_tools(
    State(service): State<Arc<GatewayService>>,
    headers: HeaderMap,
) -> Response {
    let Some(bearer) = bearer_credential(&headers) else {
        return denied_response(StatusCode::UNAUTHORIZED, "missing bearer credential");
    };
    match service.discover(bearer).await {
        Ok(context) => (StatusCode::OK, Json(ToolListBody {
            tools: context.tools,
        }))
            .into_response(),
        Err(err) => gateway_error_response(&err),
    }
}

/// Invokes one tool.
async fn invoke_tool(
    State(service): State<Arc<GatewayService>>,
    headers: HeaderMap,
    Json(request): Json<InvocationRequest>,
) -> Response {
    let Some(bearer) = bearer_credential(&headers) else {
        return denied_response(StatusCode::UNAUTHORIZED, "missing bearer credential");
    };
    let cancel = CancellationToken::new();
    let result = service.invoke(bearer, &request, &cancel).await;
    let status = match result.error.as_ref().map(|error| error.code) {
        Some(ErrorCode::Unauthorized) => StatusCode::UNAUTHORIZED,
        Some(ErrorCode::Forbidden) => StatusCode::FORBIDDEN,
        _ => StatusCode::OK,
    };
    let correlation = service.issue_correlation_id();
    let mut response = (status, Json(result)).into_response();
    if let Ok(value) = correlation.parse() {
        response.headers_mut().insert(SERVER_CORRELATION_HEADER, value);
    }
    response
}

/// Connection handle pushed as the first SSE event.
#[derive(Debug, Serialize)]
struct ConnectionHandle {
    /// Connection identifier for heartbeats.
    connection_id: ConnectionId,
}

/// Opens the SSE catalog subscription channel.
async fn subscribe(
    State(service): State<Arc<GatewayService>>,
    headers: HeaderMap,
) -> Response {
    let Some(bearer) = bearer_credential(&headers) else {
        return denied_response(StatusCode::UNAUTHORIZED, "missing bearer credential");
    };
    let connection_id = ConnectionId::new(service.issue_correlation_id());
    match service.subscribe(bearer, &connection_id).await {
        Ok((context, receiver)) => {
            let handle_event = sse_event("connection", &ConnectionHandle {
                connection_id,
            });
            let snapshot_event = sse_event("catalog", &CatalogMessage::Snapshot {
                tools: context.tools,
            });
            let updates = ReceiverStream::new(receiver)
                .map(|message| sse_event("catalog", &message))
                .map(Ok::<Event, Infallible>);
            let stream = tokio_stream::once(Ok(handle_event))
                .chain(tokio_stream::once(Ok(snapshot_event)))
                .chain(updates);
            Sse::new(stream).keep_alive(KeepAlive::default()).into_response()
        }
        Err(err) => gateway_error_response(&err),
    }
}

/// Refreshes a subscription heartbeat.
async fn heartbeat(
    State(service): State<Arc<GatewayService>>,
    Path(connection_id): Path<String>,
) -> StatusCode {
    if service.heartbeat(&ConnectionId::new(connection_id)) {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::NOT_FOUND
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Extracts the bearer credential from the authorization header.
fn bearer_credential(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(axum::http::header::AUTHORIZATION)?.to_str().ok()?;
    let token = value.strip_prefix("Bearer ").or_else(|| value.strip_prefix("bearer "))?;
    let token = token.trim();
    if token.is_empty() { None } else { Some(token) }
}

/// Builds an SSE event from a serializable payload.
fn sse_event<T: Serialize>(kind: &str, payload: &T) -> Event {
    match Event::default().event(kind).json_data(payload) {
        Ok(event) => event,
        Err(err) => Event::default().event("error").data(err.to_string()),
    }
}

/// Maps gateway errors onto authentication and authorization statuses.
fn gateway_error_response(err: &GatewayError) -> Response {
    match err {
        GatewayError::Unauthorized(inner) => {
            denied_response(StatusCode::UNAUTHORIZED, &inner.to_string())
        }
        GatewayError::Forbidden(message) => denied_response(StatusCode::FORBIDDEN, message),
    }
}

/// Builds a structured denial response body.
fn denied_response(status: StatusCode, message: &str) -> Response {
    let code = if status == StatusCode::UNAUTHORIZED {
        ErrorCode::Unauthorized
    } else {
        ErrorCode::Forbidden
    };
    (status, Json(InvocationResult::error(InvocationError::new(code, message)))).into_response()
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(
        clippy::unwrap_used,
        clippy::expect_used,
        reason = "Test-only panic-based assertions are permitted."
    )]

    use super::*;

    #[test]
    fn bearer_extraction_requires_the_scheme() {
        let mut headers = HeaderMap::new();
        assert!(bearer_credential(&headers).is_none());
        headers.insert(axum::http::header::AUTHORIZATION, "Basic abc".parse().unwrap());
        assert!(bearer_credential(&headers).is_none());
        headers.insert(axum::http::header::AUTHORIZATION, "Bearer  token-1 ".parse().unwrap());
        assert_eq!(bearer_credential(&headers), Some("token-1"));
        headers.insert(axum::http::header::AUTHORIZATION, "Bearer ".parse().unwrap());
        assert!(bearer_credential(&headers).is_none());
    }
}
