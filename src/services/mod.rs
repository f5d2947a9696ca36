/// Card batch generation.
pub mod cards;
/// Per-session countdown timer.
pub mod countdown;
/// OpenAPI documentation generation.
pub mod documentation;
/// Health check service.
pub mod health_service;
/// Per-session number-call timer.
pub mod number_caller;
/// Player registration and lookup.
pub mod player_service;
/// Periodic audit of sessions against the store.
pub mod reconciliation;
/// Public session operations composing the registry, actors and timers.
pub mod session_service;
/// Win verification for a card against the called numbers.
pub mod verifier;
