use std::{net::SocketAddr, sync::Arc};

use axum::{
    extract::{rejection::PathRejection, Path, Query, RawQuery, State, WebSocketUpgrade},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use server_api::{get_return, list_notifications, ApiContext, ReturnsComponent};
use shared::{
    domain::{ReturnId, UserId},
    error::{ApiError, ErrorCode},
    protocol::{NotificationEntry, ReturnRow, ReturnsPage, ReviewResponse},
};
use storage::Storage;
use tracing::{error, info, warn};

mod app_state;
mod config;

use app_state::AppState;
use config::{load_settings, prepare_database_url};

/// Header carrying the authenticated operator id, set by the session layer
/// in front of this service.
const REVIEWER_HEADER: &str = "x-user-id";

type HttpError = (StatusCode, Json<ApiError>);

#[derive(Debug, Deserialize)]
struct NotificationsQuery {
    limit: Option<u32>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    let settings = load_settings();
    let database_url = prepare_database_url(&settings.database_url)?;
    let storage = Storage::new(&database_url).await.map_err(|error| {
        error!(
            %database_url,
            %error,
            "failed to open SQLite database; verify parent directory exists and permissions are correct"
        );
        error
    })?;
    let api = ApiContext {
        storage,
        per_page: settings.page_size,
    };

    let state = AppState::new(api, settings.notification_buffer);
    let app = build_router(Arc::new(state));

    let addr: SocketAddr = settings.server_bind.parse()?;
    info!(%addr, "server listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/returns", get(http_list_returns))
        .route("/returns/:return_id", get(http_get_return))
        .route("/returns/:return_id/review", post(http_mark_reviewed))
        .route("/notifications", get(http_list_notifications))
        .route("/notifications/ws", get(ws_handler))
        .with_state(state)
}

async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.api.storage.health_check().await {
        Ok(()) => (StatusCode::OK, "ok"),
        Err(error) => {
            warn!(%error, "health check failed");
            (StatusCode::SERVICE_UNAVAILABLE, "unavailable")
        }
    }
}

async fn http_list_returns(
    State(state): State<Arc<AppState>>,
    RawQuery(query): RawQuery,
) -> Result<Json<ReturnsPage>, HttpError> {
    let component = ReturnsComponent::mount(
        state.api.clone(),
        state.sink(),
        query.as_deref().unwrap_or_default(),
    );
    let page = component.render().await.map_err(http_error)?;
    Ok(Json(page))
}

async fn http_get_return(
    State(state): State<Arc<AppState>>,
    return_id: Result<Path<i64>, PathRejection>,
) -> Result<Json<ReturnRow>, HttpError> {
    let return_id = return_id_from_path(return_id).map_err(http_error)?;
    let row = get_return(&state.api, return_id)
        .await
        .map_err(http_error)?;
    Ok(Json(row))
}

/// Marks a return reviewed and re-renders the listing for the view carried
/// in the query string.
async fn http_mark_reviewed(
    State(state): State<Arc<AppState>>,
    return_id: Result<Path<i64>, PathRejection>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
) -> Result<Json<ReviewResponse>, HttpError> {
    let return_id = return_id_from_path(return_id).map_err(http_error)?;
    let reviewer = reviewer_from_headers(&headers).map_err(http_error)?;
    let component = ReturnsComponent::mount(
        state.api.clone(),
        state.sink(),
        query.as_deref().unwrap_or_default(),
    );

    let receipt = component
        .mark_reviewed(return_id, reviewer)
        .await
        .map_err(http_error)?;
    let view = component.render().await.map_err(http_error)?;

    Ok(Json(ReviewResponse {
        record: receipt.record,
        toast: receipt.toast,
        view,
    }))
}

async fn http_list_notifications(
    State(state): State<Arc<AppState>>,
    Query(q): Query<NotificationsQuery>,
) -> Result<Json<Vec<NotificationEntry>>, HttpError> {
    let limit = q.limit.unwrap_or(50).clamp(1, 100);
    let entries = list_notifications(&state.api, limit)
        .await
        .map_err(http_error)?;
    Ok(Json(entries))
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| ws_connection(state, socket))
}

async fn ws_connection(state: Arc<AppState>, socket: axum::extract::ws::WebSocket) {
    use axum::extract::ws::Message;
    use futures::{SinkExt, StreamExt};

    let (mut sender, mut receiver) = socket.split();
    let mut toasts_rx = state.notifications.subscribe();

    let send_task = tokio::spawn(async move {
        while let Ok(toast) = toasts_rx.recv().await {
            let text = match serde_json::to_string(&toast) {
                Ok(v) => v,
                Err(_) => continue,
            };
            if sender.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    while let Some(Ok(_msg)) = receiver.next().await {}

    send_task.abort();
}

fn return_id_from_path(path: Result<Path<i64>, PathRejection>) -> Result<ReturnId, ApiError> {
    path.map(|Path(id)| ReturnId(id)).map_err(|rejection| {
        ApiError::new(
            ErrorCode::Validation,
            format!("invalid return id: {}", rejection.body_text()),
        )
    })
}

fn reviewer_from_headers(headers: &HeaderMap) -> Result<UserId, ApiError> {
    headers
        .get(REVIEWER_HEADER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<i64>().ok())
        .map(UserId)
        .ok_or_else(|| ApiError::new(ErrorCode::Unauthorized, "missing reviewer identity"))
}

fn http_error(err: ApiError) -> HttpError {
    let status = match err.code {
        ErrorCode::Unauthorized => StatusCode::UNAUTHORIZED,
        ErrorCode::Forbidden => StatusCode::FORBIDDEN,
        ErrorCode::NotFound => StatusCode::NOT_FOUND,
        ErrorCode::Validation => StatusCode::BAD_REQUEST,
        ErrorCode::Conflict => StatusCode::CONFLICT,
        ErrorCode::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(err))
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
