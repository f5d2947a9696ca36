use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI specification for the bingo backend.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::players::register,
        crate::routes::players::get_player,
        crate::routes::session::list_cards,
        crate::routes::session::join,
        crate::routes::session::get_session,
        crate::routes::session::get_session_for_player,
        crate::routes::session::active_session,
        crate::routes::session::next_game,
        crate::routes::session::detailed_status,
        crate::routes::session::call_bingo,
        crate::routes::session::start_calling,
        crate::routes::session::end_session,
        crate::routes::session::restart,
        crate::routes::session::check_for_winner,
        crate::routes::session::reconcile,
        crate::routes::session::available_cards,
        crate::routes::session::random_available_card,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::session::SessionView,
            crate::dto::session::PlayerInfo,
            crate::dto::session::JoinRequest,
            crate::dto::session::BingoCallRequest,
            crate::dto::session::RegisterPlayerRequest,
            crate::dto::session::PlayerResponse,
            crate::dto::session::AvailableCardsResponse,
            crate::dto::session::RandomCardResponse,
            crate::dto::session::ActionResponse,
            crate::state::messages::ReconcileReport,
            crate::state::card::Card,
            crate::state::card::CardGrid,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "players", description = "Player registration"),
        (name = "session", description = "Joining, watching and claiming in sessions"),
        (name = "admin", description = "Operator controls for running sessions"),
    )
)]
pub struct ApiDoc;
