use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};

use parlor_types::api::{Claims, CreateRoomRequest, JoinRoomRequest};
use parlor_types::models::{Room, RoomId};

use crate::auth::AppState;
use crate::error::ApiError;
use crate::middleware::caller;

pub async fn list_rooms(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Vec<Room>>, ApiError> {
    let rooms = state.coordinator.list_rooms(&caller(&claims)).await?;
    Ok(Json(rooms))
}

pub async fn create_room(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateRoomRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let room = state
        .coordinator
        .create_room(&caller(&claims), &req.name)
        .await?;
    Ok((StatusCode::CREATED, Json(room)))
}

pub async fn join_room(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<JoinRoomRequest>,
) -> Result<Json<Room>, ApiError> {
    let room = state
        .coordinator
        .join_room(&caller(&claims), &req.code)
        .await?;
    Ok(Json(room))
}

pub async fn leave_room(
    State(state): State<AppState>,
    Path(room_id): Path<RoomId>,
    Extension(claims): Extension<Claims>,
) -> Result<StatusCode, ApiError> {
    state
        .coordinator
        .leave_room(&caller(&claims), room_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn delete_room(
    State(state): State<AppState>,
    Path(room_id): Path<RoomId>,
    Extension(claims): Extension<Claims>,
) -> Result<StatusCode, ApiError> {
    state
        .coordinator
        .delete_room(&caller(&claims), room_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
