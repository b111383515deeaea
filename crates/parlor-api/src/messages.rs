use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;

use parlor_core::coordinator::DEFAULT_HISTORY_LIMIT;
use parlor_types::api::{Claims, MessageRecord, SendMessageRequest, SendMessageResponse};
use parlor_types::models::RoomId;

use crate::auth::AppState;
use crate::error::ApiError;
use crate::middleware::caller;

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    #[serde(default = "default_limit")]
    pub limit: u32,
}

fn default_limit() -> u32 {
    DEFAULT_HISTORY_LIMIT
}

/// Returns the most recent messages in chronological order.
pub async fn get_messages(
    State(state): State<AppState>,
    Path(room_id): Path<RoomId>,
    Query(query): Query<HistoryQuery>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Vec<MessageRecord>>, ApiError> {
    let records = state
        .coordinator
        .fetch_history(&caller(&claims), room_id, query.limit)
        .await?;
    Ok(Json(records))
}

pub async fn send_message(
    State(state): State<AppState>,
    Path(room_id): Path<RoomId>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<SendMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let message_id = state
        .coordinator
        .send_message(&caller(&claims), room_id, &req.body)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(SendMessageResponse { message_id }),
    ))
}
