// ============================
// tunepool-backend/src/routes.rs
// ============================
//! HTTP routes for rooms.
//!
//! The calling user is taken from the `x-user-id` header, set by the authenticating
//! proxy in front of this service.
use std::sync::Arc;

use axum::{
    extract::{FromRequestParts, Path, State},
    http::{request::Parts, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use tunepool_common::{CreatedRoom, NewRoom, ProcessingTrigger, RoomId, RoomResult, UserId};

use crate::error::AppError;
use crate::room::Room;
use crate::service::RoomView;
use crate::AppState;

pub const USER_HEADER: &str = "x-user-id";

/// The authenticated caller
#[derive(Debug, Clone)]
pub struct CurrentUser(pub UserId);

impl<S: Send + Sync> FromRequestParts<S> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(USER_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|user| !user.is_empty())
            .map(|user| CurrentUser(user.to_string()))
            .ok_or_else(|| AppError::Unauthorized(format!("missing {USER_HEADER} header")))
    }
}

/// Create the room router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/rooms", get(list_rooms).post(create_room))
        .route("/rooms/{room_id}", get(get_room).delete(delete_room))
        .route("/rooms/{room_id}/users", post(join_room))
        .route("/rooms/{room_id}/lock", post(lock_room))
        .route("/rooms/{room_id}/process", post(process_room))
        .route("/rooms/{room_id}/result", get(room_result))
        .with_state(state)
}

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

async fn list_rooms(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<Vec<Room>>, AppError> {
    Ok(Json(state.rooms.list_rooms_for_user(&user).await?))
}

async fn create_room(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Json(request): Json<NewRoom>,
) -> Result<impl IntoResponse, AppError> {
    let room = state.rooms.create_room(&request.room_name, &user).await?;
    Ok((StatusCode::CREATED, Json(CreatedRoom { room_id: room.id })))
}

async fn get_room(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Path(room_id): Path<RoomId>,
) -> Result<Json<RoomView>, AppError> {
    Ok(Json(state.rooms.get_room_for_user(&room_id, &user).await?))
}

async fn delete_room(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Path(room_id): Path<RoomId>,
) -> Result<StatusCode, AppError> {
    state.rooms.delete_room(&room_id, &user).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn join_room(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Path(room_id): Path<RoomId>,
) -> Result<StatusCode, AppError> {
    state.rooms.add_user(&room_id, &user).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn lock_room(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Path(room_id): Path<RoomId>,
) -> Result<StatusCode, AppError> {
    state.rooms.lock_room(&room_id, &user).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Starts processing in the background and answers right away
async fn process_room(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Path(room_id): Path<RoomId>,
) -> Result<impl IntoResponse, AppError> {
    let start = state.rooms.start_processing(&room_id, &user).await?;
    let status = match start.trigger {
        ProcessingTrigger::Started => StatusCode::ACCEPTED,
        ProcessingTrigger::AlreadyRunning | ProcessingTrigger::AlreadyProcessed => StatusCode::OK,
    };
    Ok((status, Json(json!({ "status": start.trigger }))))
}

async fn room_result(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Path(room_id): Path<RoomId>,
) -> Result<Json<RoomResult>, AppError> {
    Ok(Json(state.rooms.get_result(&room_id, &user).await?))
}
