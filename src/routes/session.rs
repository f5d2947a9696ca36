use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{get, post},
};
use axum_valid::Valid;

use crate::{
    dto::session::{
        ActionResponse, AvailableCardsResponse, BingoCallRequest, JoinRequest,
        RandomCardResponse, SessionView,
    },
    error::AppError,
    services::{reconciliation, session_service},
    state::{SharedState, card::Card, messages::ReconcileReport, state_machine::EndReason},
};

/// Routes for playing, watching and operating sessions.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/games/cards", get(list_cards))
        .route("/games/join", post(join))
        .route("/games/session/{code}", get(get_session))
        .route(
            "/games/session/{code}/user/{player_id}",
            get(get_session_for_player),
        )
        .route("/games/active", get(active_session))
        .route("/games/next", get(next_game))
        .route("/games/status", get(detailed_status))
        .route("/games/bingo", post(call_bingo))
        .route("/games/start-calling/{code}", post(start_calling))
        .route("/games/end/{code}", post(end_session))
        .route("/games/restart", post(restart))
        .route("/games/check-winner/{code}", post(check_for_winner))
        .route("/games/reconcile/{code}", post(reconcile))
        .route("/games/available-cards/{code}", get(available_cards))
        .route(
            "/games/random-available-card/{code}",
            get(random_available_card),
        )
}

/// Every card of the batch players pick from.
#[utoipa::path(
    get,
    path = "/games/cards",
    tag = "session",
    responses((status = 200, description = "Card batch", body = [Card]))
)]
pub async fn list_cards(State(state): State<SharedState>) -> Json<Vec<Card>> {
    Json(session_service::cards(&state))
}

/// Join the active session, optionally reserving a card.
#[utoipa::path(
    post,
    path = "/games/join",
    tag = "session",
    request_body = JoinRequest,
    responses(
        (status = 200, description = "Joined", body = SessionView),
        (status = 404, description = "Player not registered"),
        (status = 409, description = "Card taken, game running or join window closing")
    )
)]
pub async fn join(
    State(state): State<SharedState>,
    Valid(Json(payload)): Valid<Json<JoinRequest>>,
) -> Result<Json<SessionView>, AppError> {
    let view = session_service::join(&state, payload).await?;
    Ok(Json(view))
}

#[utoipa::path(
    get,
    path = "/games/session/{code}",
    tag = "session",
    params(("code" = String, Path, description = "Session code")),
    responses(
        (status = 200, description = "Session", body = SessionView),
        (status = 404, description = "Unknown session")
    )
)]
pub async fn get_session(
    State(state): State<SharedState>,
    Path(code): Path<String>,
) -> Result<Json<SessionView>, AppError> {
    let view = session_service::get_session(&state, &code).await?;
    Ok(Json(view))
}

/// Session as seen by one player.
#[utoipa::path(
    get,
    path = "/games/session/{code}/user/{player_id}",
    tag = "session",
    params(
        ("code" = String, Path, description = "Session code"),
        ("player_id" = i64, Path, description = "External player id")
    ),
    responses(
        (status = 200, description = "Session", body = SessionView),
        (status = 404, description = "Unknown session")
    )
)]
pub async fn get_session_for_player(
    State(state): State<SharedState>,
    Path((code, player_id)): Path<(String, i64)>,
) -> Result<Json<SessionView>, AppError> {
    let view = session_service::get_session_for_player(&state, &code, player_id).await?;
    Ok(Json(view))
}

#[utoipa::path(
    get,
    path = "/games/active",
    tag = "session",
    responses((status = 200, description = "Active session", body = SessionView))
)]
pub async fn active_session(State(state): State<SharedState>) -> Json<SessionView> {
    Json(session_service::get_active_session(&state).await)
}

/// Active session with guidance for players arriving mid-game.
#[utoipa::path(
    get,
    path = "/games/next",
    tag = "session",
    responses((status = 200, description = "Next game information", body = SessionView))
)]
pub async fn next_game(State(state): State<SharedState>) -> Json<SessionView> {
    Json(session_service::get_next_game_info(&state).await)
}

#[utoipa::path(
    get,
    path = "/games/status",
    tag = "session",
    responses((status = 200, description = "Detailed status", body = SessionView))
)]
pub async fn detailed_status(State(state): State<SharedState>) -> Json<SessionView> {
    Json(session_service::get_detailed_status(&state).await)
}

/// Claim a win in the active session.
#[utoipa::path(
    post,
    path = "/games/bingo",
    tag = "session",
    request_body = BingoCallRequest,
    responses(
        (status = 200, description = "Claim verified", body = SessionView),
        (status = 400, description = "Claim rejected"),
        (status = 409, description = "Claims not accepted")
    )
)]
pub async fn call_bingo(
    State(state): State<SharedState>,
    Valid(Json(payload)): Valid<Json<BingoCallRequest>>,
) -> Result<Json<SessionView>, AppError> {
    let view = session_service::call_bingo(&state, payload.player_id).await?;
    Ok(Json(view))
}

/// Start drawing numbers for a session in the game room.
#[utoipa::path(
    post,
    path = "/games/start-calling/{code}",
    tag = "admin",
    params(("code" = String, Path, description = "Session code")),
    responses((status = 200, description = "Caller running", body = ActionResponse))
)]
pub async fn start_calling(
    State(state): State<SharedState>,
    Path(code): Path<String>,
) -> Result<Json<ActionResponse>, AppError> {
    let message = if session_service::start_calling(&state, &code).await? {
        format!("number calling started for {code}")
    } else {
        format!("number calling already running for {code}")
    };
    Ok(Json(ActionResponse { message }))
}

/// End a session and open the next round.
#[utoipa::path(
    post,
    path = "/games/end/{code}",
    tag = "admin",
    params(("code" = String, Path, description = "Session code")),
    responses(
        (status = 200, description = "Session ended", body = ActionResponse),
        (status = 404, description = "Unknown session")
    )
)]
pub async fn end_session(
    State(state): State<SharedState>,
    Path(code): Path<String>,
) -> Result<Json<ActionResponse>, AppError> {
    let message = if session_service::end_session(&state, &code, EndReason::Manual).await? {
        format!("session {code} ended")
    } else {
        format!("session {code} had already ended")
    };
    Ok(Json(ActionResponse { message }))
}

#[utoipa::path(
    post,
    path = "/games/restart",
    tag = "admin",
    responses((status = 200, description = "Fresh session", body = SessionView))
)]
pub async fn restart(State(state): State<SharedState>) -> Result<Json<SessionView>, AppError> {
    let view = session_service::restart(&state).await?;
    Ok(Json(view))
}

/// Scan every card of a session for a completed line.
#[utoipa::path(
    post,
    path = "/games/check-winner/{code}",
    tag = "admin",
    params(("code" = String, Path, description = "Session code")),
    responses((status = 200, description = "Session after the scan", body = SessionView))
)]
pub async fn check_for_winner(
    State(state): State<SharedState>,
    Path(code): Path<String>,
) -> Result<Json<SessionView>, AppError> {
    let view = session_service::check_for_winner(&state, &code).await?;
    Ok(Json(view))
}

/// Audit a session's players and card reservations against the store.
#[utoipa::path(
    post,
    path = "/games/reconcile/{code}",
    tag = "admin",
    params(("code" = String, Path, description = "Session code")),
    responses(
        (status = 200, description = "Repairs applied", body = ReconcileReport),
        (status = 404, description = "Session not tracked")
    )
)]
pub async fn reconcile(
    State(state): State<SharedState>,
    Path(code): Path<String>,
) -> Result<Json<ReconcileReport>, AppError> {
    let report = reconciliation::reconcile_session(&state, &code).await?;
    Ok(Json(report))
}

#[utoipa::path(
    get,
    path = "/games/available-cards/{code}",
    tag = "session",
    params(("code" = String, Path, description = "Session code")),
    responses((status = 200, description = "Free and taken card codes", body = AvailableCardsResponse))
)]
pub async fn available_cards(
    State(state): State<SharedState>,
    Path(code): Path<String>,
) -> Result<Json<AvailableCardsResponse>, AppError> {
    let cards = session_service::available_cards(&state, &code).await?;
    Ok(Json(cards))
}

#[utoipa::path(
    get,
    path = "/games/random-available-card/{code}",
    tag = "session",
    params(("code" = String, Path, description = "Session code")),
    responses((status = 200, description = "A free card, if any", body = RandomCardResponse))
)]
pub async fn random_available_card(
    State(state): State<SharedState>,
    Path(code): Path<String>,
) -> Result<Json<RandomCardResponse>, AppError> {
    let card = session_service::random_available_card(&state, &code).await?;
    Ok(Json(card))
}
