//! Bus topic names.

/// Topic every gateway subscribes to and every chat service publishes to.
pub const BROADCAST: &str = "broadcast";

/// Request topic for a game's chat service.
#[must_use]
pub fn game_request(game_id: &str) -> String {
    format!("game:request:{game_id}")
}
