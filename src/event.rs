//! Typed server events delivered through the event feed.
//!
//! The server tags events with small numeric codes. Those are decoded into a
//! closed [`EventKind`] variant type with an explicit [`EventKind::Unknown`]
//! arm, so a newer server can introduce event types without ever stalling the
//! client: unknown codes decode successfully and are skipped at dispatch time.
//!
//! Events are consume-only on this side of the wire, so only `Deserialize` is
//! implemented; tests fabricate raw JSON instead.

use serde::de::Error as _;
use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};

use crate::error::TupeloError;
use crate::protocol::{Card, Player};

/// Numeric wire codes for event types.
const CARD_PLAYED: i64 = 1;
const MESSAGE: i64 = 2;
const TRICK_PLAYED: i64 = 3;
const TURN: i64 = 4;
const STATE_CHANGED: i64 = 5;

/// One server-emitted game event.
///
/// Immutable once enqueued; consumed exactly once, in arrival order, by the
/// drain loop. The optional `game_state` delta is merged into the snapshot
/// *before* the event is dispatched, so handlers read post-merge state.
#[derive(Debug, Clone, PartialEq)]
pub struct GameEvent {
    pub kind: EventKind,
    /// Partial game status delta attached to the event, if any.
    pub game_state: Option<Map<String, Value>>,
}

/// Event payload, keyed by the server's numeric type code.
#[derive(Debug, Clone, PartialEq)]
pub enum EventKind {
    /// A player put a card on the table.
    CardPlayed { player: Player, card: Card },
    /// A chat/table message.
    Message { sender: String, message: String },
    /// A full trick was resolved; `player` is the trick winner if reported.
    TrickPlayed { player: Option<Player> },
    /// It is the local player's turn to act.
    Turn,
    /// The game status changed (start, voting resolved, game over).
    StateChanged,
    /// Unrecognized event code; logged and skipped by the drain loop.
    Unknown { kind: i64 },
}

impl EventKind {
    /// Short name for logging.
    pub fn name(&self) -> &'static str {
        match self {
            EventKind::CardPlayed { .. } => "card_played",
            EventKind::Message { .. } => "message",
            EventKind::TrickPlayed { .. } => "trick_played",
            EventKind::Turn => "turn",
            EventKind::StateChanged => "state_changed",
            EventKind::Unknown { .. } => "unknown",
        }
    }
}

/// Loosely-typed mirror of the wire shape; field presence depends on `type`.
#[derive(Deserialize)]
struct RawEvent {
    #[serde(rename = "type")]
    kind: i64,
    #[serde(default)]
    player: Option<Player>,
    #[serde(default)]
    card: Option<Card>,
    #[serde(default)]
    sender: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    game_state: Option<Map<String, Value>>,
}

impl<'de> Deserialize<'de> for GameEvent {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = RawEvent::deserialize(deserializer)?;
        let kind = match raw.kind {
            CARD_PLAYED => EventKind::CardPlayed {
                player: raw
                    .player
                    .ok_or_else(|| D::Error::custom("card_played event without player"))?,
                card: raw
                    .card
                    .ok_or_else(|| D::Error::custom("card_played event without card"))?,
            },
            MESSAGE => EventKind::Message {
                sender: raw
                    .sender
                    .ok_or_else(|| D::Error::custom("message event without sender"))?,
                message: raw
                    .message
                    .ok_or_else(|| D::Error::custom("message event without message"))?,
            },
            TRICK_PLAYED => EventKind::TrickPlayed { player: raw.player },
            TURN => EventKind::Turn,
            STATE_CHANGED => EventKind::StateChanged,
            other => EventKind::Unknown { kind: other },
        };
        Ok(GameEvent {
            kind,
            game_state: raw.game_state,
        })
    }
}

impl GameEvent {
    /// Decode a single event from a raw poll-response element.
    ///
    /// # Errors
    ///
    /// Returns [`TupeloError::MalformedEvent`] when the element is not an
    /// event object or a known event type is missing required fields. Unknown
    /// *type codes* are not an error (see [`EventKind::Unknown`]).
    pub fn from_value(value: &Value) -> Result<Self, TupeloError> {
        serde_json::from_value(value.clone())
            .map_err(|e| TupeloError::MalformedEvent(e.to_string()))
    }
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::protocol::{PlayerId, Suit};
    use serde_json::json;

    fn player_json(id: u128, name: &str) -> Value {
        json!({ "id": PlayerId::from_u128(id), "player_name": name })
    }

    #[test]
    fn decodes_card_played() {
        let event = GameEvent::from_value(&json!({
            "type": 1,
            "player": player_json(3, "Pate"),
            "card": { "suit": 2, "value": 13 },
            "game_state": { "status": 2 },
        }))
        .unwrap();

        match event.kind {
            EventKind::CardPlayed { player, card } => {
                assert_eq!(player.player_name, "Pate");
                assert_eq!(card, Card::new(Suit::Clubs, 13));
            }
            other => panic!("expected CardPlayed, got {other:?}"),
        }
        assert_eq!(event.game_state.unwrap().get("status"), Some(&json!(2)));
    }

    #[test]
    fn decodes_message() {
        let event = GameEvent::from_value(&json!({
            "type": 2,
            "sender": "Ilkka",
            "message": "hyvä kortti",
        }))
        .unwrap();
        assert_eq!(
            event.kind,
            EventKind::Message {
                sender: "Ilkka".into(),
                message: "hyvä kortti".into()
            }
        );
        assert!(event.game_state.is_none());
    }

    #[test]
    fn decodes_trick_played_with_and_without_winner() {
        let event = GameEvent::from_value(&json!({
            "type": 3,
            "player": player_json(1, "Ville"),
            "game_state": { "tricks": [1, 0] },
        }))
        .unwrap();
        assert!(matches!(event.kind, EventKind::TrickPlayed { player: Some(_) }));

        let event = GameEvent::from_value(&json!({ "type": 3 })).unwrap();
        assert_eq!(event.kind, EventKind::TrickPlayed { player: None });
    }

    #[test]
    fn decodes_turn_and_state_changed() {
        let event = GameEvent::from_value(&json!({ "type": 4 })).unwrap();
        assert_eq!(event.kind, EventKind::Turn);

        let event = GameEvent::from_value(&json!({
            "type": 5,
            "game_state": { "status": 1 },
        }))
        .unwrap();
        assert_eq!(event.kind, EventKind::StateChanged);
    }

    #[test]
    fn unknown_type_code_is_not_an_error() {
        let event = GameEvent::from_value(&json!({ "type": 99 })).unwrap();
        assert_eq!(event.kind, EventKind::Unknown { kind: 99 });
    }

    #[test]
    fn missing_required_fields_fail_decode() {
        // card_played without a card payload.
        let result = GameEvent::from_value(&json!({
            "type": 1,
            "player": player_json(2, "Teppo"),
        }));
        assert!(matches!(result, Err(TupeloError::MalformedEvent(_))));

        // Not an object at all.
        assert!(GameEvent::from_value(&json!(42)).is_err());
    }

    #[test]
    fn kind_names_for_logging() {
        assert_eq!(EventKind::Turn.name(), "turn");
        assert_eq!(EventKind::Unknown { kind: 9 }.name(), "unknown");
    }
}
