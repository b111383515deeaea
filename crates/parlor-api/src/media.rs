use axum::{
    Extension, Json,
    body::Bytes,
    extract::{Path, Query, State},
    http::{StatusCode, header},
    response::IntoResponse,
};
use serde::Deserialize;

use parlor_types::api::{Claims, UploadResponse};
use parlor_types::models::{MessageId, RoomId};

use crate::auth::AppState;
use crate::error::ApiError;
use crate::middleware::caller;

#[derive(Debug, Deserialize)]
pub struct UploadQuery {
    pub filename: String,
}

/// Accepts a raw request body and files it in the room under the uploader's
/// name. The original filename travels as a query parameter so the body stays
/// untouched bytes.
pub async fn upload_media(
    State(state): State<AppState>,
    Path(room_id): Path<RoomId>,
    Query(query): Query<UploadQuery>,
    Extension(claims): Extension<Claims>,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let (message_id, kind) = state
        .coordinator
        .upload_media(&caller(&claims), room_id, &query.filename, body.to_vec())
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(UploadResponse { message_id, kind }),
    ))
}

pub async fn download_media(
    State(state): State<AppState>,
    Path(message_id): Path<MessageId>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let media = state
        .coordinator
        .fetch_media(&caller(&claims), message_id)
        .await?;
    Ok(([(header::CONTENT_TYPE, media.content_type)], media.data))
}
