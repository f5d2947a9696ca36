use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{get, post},
};
use axum_valid::Valid;

use crate::{
    dto::session::{PlayerResponse, RegisterPlayerRequest},
    error::AppError,
    services::player_service,
    state::SharedState,
};

/// Player directory routes.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/users/register", post(register))
        .route("/users/{player_id}", get(get_player))
}

/// Register a player so they can join sessions.
#[utoipa::path(
    post,
    path = "/users/register",
    tag = "players",
    request_body = RegisterPlayerRequest,
    responses(
        (status = 200, description = "Player registered", body = PlayerResponse),
        (status = 409, description = "Player already registered")
    )
)]
pub async fn register(
    State(state): State<SharedState>,
    Valid(Json(payload)): Valid<Json<RegisterPlayerRequest>>,
) -> Result<Json<PlayerResponse>, AppError> {
    let player = player_service::register(&state, payload).await?;
    Ok(Json(player))
}

#[utoipa::path(
    get,
    path = "/users/{player_id}",
    tag = "players",
    params(("player_id" = i64, Path, description = "External player id")),
    responses(
        (status = 200, description = "Player", body = PlayerResponse),
        (status = 404, description = "Player not registered")
    )
)]
pub async fn get_player(
    State(state): State<SharedState>,
    Path(player_id): Path<i64>,
) -> Result<Json<PlayerResponse>, AppError> {
    let player = player_service::get_player(&state, player_id).await?;
    Ok(Json(player))
}
