use tracing::info;

use crate::{
    dao::models::PlayerRecord,
    dto::session::{PlayerResponse, RegisterPlayerRequest},
    error::ServiceError,
    state::SharedState,
};

/// Add a player to the directory; external ids are unique.
pub async fn register(
    state: &SharedState,
    request: RegisterPlayerRequest,
) -> Result<PlayerResponse, ServiceError> {
    let record = PlayerRecord::from(request);
    let player_id = record.player_id;
    if !state.directory().register(record.clone()).await? {
        return Err(ServiceError::PlayerAlreadyRegistered(player_id));
    }
    info!(player_id, "player registered");
    Ok(record.into())
}

/// Registered player by external id.
pub async fn get_player(state: &SharedState, player_id: i64) -> Result<PlayerResponse, ServiceError> {
    state
        .directory()
        .find_by_external_id(player_id)
        .await?
        .map(PlayerResponse::from)
        .ok_or(ServiceError::PlayerNotRegistered(player_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::AppConfig, state::AppState};

    fn request(player_id: i64) -> RegisterPlayerRequest {
        RegisterPlayerRequest {
            player_id,
            first_name: Some("Abebe".into()),
            last_name: Some("Bikila".into()),
            user_name: None,
        }
    }

    #[tokio::test]
    async fn register_then_lookup() {
        let config = AppConfig {
            card_batch_size: 5,
            ..AppConfig::default()
        };
        let (state, _store) = AppState::in_memory(config).unwrap();

        let created = register(&state, request(42)).await.unwrap();
        assert_eq!(created.player_id, 42);

        let found = get_player(&state, 42).await.unwrap();
        assert_eq!(found.first_name.as_deref(), Some("Abebe"));
        assert_eq!(found.registered_at, created.registered_at);

        assert!(matches!(
            register(&state, request(42)).await,
            Err(ServiceError::PlayerAlreadyRegistered(42))
        ));
        assert!(matches!(
            get_player(&state, 7).await,
            Err(ServiceError::PlayerNotRegistered(7))
        ));
    }
}
