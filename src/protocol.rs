//! Wire value types for the Tupelo JSON API.
//!
//! Every type here matches the JSON the server produces. The server encodes
//! suits, game phases and game modes as small integers, so those enums
//! round-trip through `u8` rather than strings.
//!
//! The [`GameSnapshot`] is deliberately *not* a fixed struct: the server sends
//! partial status objects whose key set grows over time, and the client must
//! merge them per key without dropping anything it already knows.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

// ── Type aliases ────────────────────────────────────────────────────

/// Unique identifier for players.
pub type PlayerId = Uuid;

/// Unique identifier for games.
pub type GameId = Uuid;

// ── Cards ───────────────────────────────────────────────────────────

/// Card suit. Wire values match the server's numeric encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Suit {
    Spades = 0,
    Diamonds = 1,
    Clubs = 2,
    Hearts = 3,
}

impl Suit {
    /// Unicode symbol for the suit.
    pub fn symbol(self) -> char {
        match self {
            Suit::Spades => '\u{2660}',
            Suit::Diamonds => '\u{2666}',
            Suit::Clubs => '\u{2663}',
            Suit::Hearts => '\u{2665}',
        }
    }
}

impl TryFrom<u8> for Suit {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Suit::Spades),
            1 => Ok(Suit::Diamonds),
            2 => Ok(Suit::Clubs),
            3 => Ok(Suit::Hearts),
            other => Err(format!("invalid suit value: {other}")),
        }
    }
}

impl From<Suit> for u8 {
    fn from(suit: Suit) -> Self {
        suit as u8
    }
}

/// A single playing card.
///
/// `value` is 2–10 for pip cards, 11 = jack, 12 = queen, 13 = king and
/// 1 or 14 = ace (the server uses both encodings for aces).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Card {
    pub suit: Suit,
    pub value: u8,
}

impl Card {
    pub fn new(suit: Suit, value: u8) -> Self {
        Self { suit, value }
    }

    fn value_char(self) -> String {
        match self.value {
            11 => "J".to_string(),
            12 => "Q".to_string(),
            13 => "K".to_string(),
            1 | 14 => "A".to_string(),
            v => v.to_string(),
        }
    }
}

impl fmt::Display for Card {
    /// Short form, e.g. `A♠` or `10♥`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.value_char(), self.suit.symbol())
    }
}

// ── Game phase and mode ─────────────────────────────────────────────

/// Lifecycle phase of a game as reported in the `status` snapshot field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum GamePhase {
    Stopped = 0,
    Voting = 1,
    Ongoing = 2,
}

impl TryFrom<u8> for GamePhase {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(GamePhase::Stopped),
            1 => Ok(GamePhase::Voting),
            2 => Ok(GamePhase::Ongoing),
            other => Err(format!("invalid game phase: {other}")),
        }
    }
}

impl From<GamePhase> for u8 {
    fn from(phase: GamePhase) -> Self {
        phase as u8
    }
}

/// Game mode chosen during the voting phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum GameMode {
    Nolo = 0,
    Rami = 1,
}

impl TryFrom<u8> for GameMode {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(GameMode::Nolo),
            1 => Ok(GameMode::Rami),
            other => Err(format!("invalid game mode: {other}")),
        }
    }
}

impl From<GameMode> for u8 {
    fn from(mode: GameMode) -> Self {
        mode as u8
    }
}

// ── Players ─────────────────────────────────────────────────────────

/// A player as the server reports it in listings, seat info and events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Player {
    pub id: PlayerId,
    pub player_name: String,
    /// Game the player is currently in, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub game_id: Option<GameId>,
}

impl fmt::Display for Player {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.player_name, self.id)
    }
}

// ── Game snapshot ───────────────────────────────────────────────────

/// The client's mirror of the last known authoritative game status.
///
/// The server pushes *partial* status objects: each delta only mentions the
/// keys it changes. [`GameSnapshot::merge`] overwrites mentioned keys and
/// leaves everything else untouched (last writer wins per key). The drain
/// loop's strict in-order, single-flight processing is what makes this safe —
/// there is no versioning or conflict detection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GameSnapshot(Map<String, Value>);

impl GameSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge a partial status delta: every key present in `delta` replaces
    /// the corresponding key here; absent keys are untouched.
    pub fn merge(&mut self, delta: &Map<String, Value>) {
        for (key, value) in delta {
            self.0.insert(key.clone(), value.clone());
        }
    }

    /// Raw access to a snapshot field.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Forget everything (used when leaving a game).
    pub fn clear(&mut self) {
        self.0.clear();
    }

    /// Current game phase, if the server has reported one.
    pub fn phase(&self) -> Option<GamePhase> {
        let raw = self.0.get("status")?.as_u64()?;
        GamePhase::try_from(u8::try_from(raw).ok()?).ok()
    }

    /// Game mode, once voting has decided one.
    pub fn mode(&self) -> Option<GameMode> {
        let raw = self.0.get("mode")?.as_u64()?;
        GameMode::try_from(u8::try_from(raw).ok()?).ok()
    }

    /// Tricks taken per team.
    pub fn tricks(&self) -> Option<[u64; 2]> {
        let arr = self.0.get("tricks")?.as_array()?;
        Some([arr.first()?.as_u64()?, arr.get(1)?.as_u64()?])
    }

    /// Final score per team; absent until the game ends.
    pub fn score(&self) -> Option<[i64; 2]> {
        let arr = self.0.get("score")?.as_array()?;
        Some([arr.first()?.as_i64()?, arr.get(1)?.as_i64()?])
    }

    /// Whose turn it is, as last reported.
    pub fn turn_player(&self) -> Option<PlayerId> {
        serde_json::from_value(self.0.get("turn_id")?.clone()).ok()
    }
}

// ── Response payloads ───────────────────────────────────────────────

/// Response to the `hello` endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HelloResponse {
    pub version: String,
    /// Present when the supplied session key still maps to a live session.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub player: Option<Player>,
}

/// Response to `player/register`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterResponse {
    pub id: PlayerId,
    /// Opaque session key; presented on every authenticated request.
    pub akey: String,
}

/// One joinable game in the lobby listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameListing {
    pub id: GameId,
    pub players: Vec<Player>,
}

/// Response to `game/get_state`: a status delta and/or a full hand.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StateResponse {
    /// Partial status object, merged into the snapshot like an event delta.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub game_state: Option<Map<String, Value>>,
    /// Replaces the hand wholesale; order is positional and must be kept.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hand: Option<Vec<Card>>,
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use serde_json::json;

    fn obj(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            other => panic!("expected object, got {other}"),
        }
    }

    #[test]
    fn merge_keeps_unmentioned_keys() {
        let mut snapshot = GameSnapshot::new();
        snapshot.merge(&obj(json!({ "a": 1 })));
        snapshot.merge(&obj(json!({ "b": 2 })));
        assert_eq!(snapshot.get("a"), Some(&json!(1)));
        assert_eq!(snapshot.get("b"), Some(&json!(2)));

        snapshot.merge(&obj(json!({ "a": 3 })));
        assert_eq!(snapshot.get("a"), Some(&json!(3)));
        assert_eq!(snapshot.get("b"), Some(&json!(2)));
    }

    #[test]
    fn snapshot_typed_accessors() {
        let mut snapshot = GameSnapshot::new();
        snapshot.merge(&obj(json!({
            "status": 2,
            "mode": 0,
            "tricks": [3, 1],
        })));
        assert_eq!(snapshot.phase(), Some(GamePhase::Ongoing));
        assert_eq!(snapshot.mode(), Some(GameMode::Nolo));
        assert_eq!(snapshot.tricks(), Some([3, 1]));
        assert_eq!(snapshot.score(), None);

        let turn = PlayerId::from_u128(7);
        snapshot.merge(&obj(json!({ "turn_id": turn, "score": [12, 0] })));
        assert_eq!(snapshot.turn_player(), Some(turn));
        assert_eq!(snapshot.score(), Some([12, 0]));
    }

    #[test]
    fn snapshot_tolerates_garbage_fields() {
        let mut snapshot = GameSnapshot::new();
        snapshot.merge(&obj(json!({ "status": 99, "tricks": "nope" })));
        assert_eq!(snapshot.phase(), None);
        assert_eq!(snapshot.tricks(), None);
        // The raw value is still retained.
        assert_eq!(snapshot.get("status"), Some(&json!(99)));
    }

    #[test]
    fn suit_round_trips_through_numbers() {
        let card: Card = serde_json::from_value(json!({ "suit": 3, "value": 14 })).unwrap();
        assert_eq!(card.suit, Suit::Hearts);
        assert_eq!(serde_json::to_value(card).unwrap(), json!({ "suit": 3, "value": 14 }));
    }

    #[test]
    fn invalid_suit_is_a_decode_error() {
        let result: Result<Card, _> = serde_json::from_value(json!({ "suit": 7, "value": 2 }));
        assert!(result.is_err());
    }

    #[test]
    fn card_display_short_form() {
        assert_eq!(Card::new(Suit::Spades, 14).to_string(), "A\u{2660}");
        assert_eq!(Card::new(Suit::Spades, 1).to_string(), "A\u{2660}");
        assert_eq!(Card::new(Suit::Hearts, 10).to_string(), "10\u{2665}");
        assert_eq!(Card::new(Suit::Clubs, 12).to_string(), "Q\u{2663}");
    }

    #[test]
    fn state_response_parses_partial_payloads() {
        let state: StateResponse = serde_json::from_value(json!({
            "game_state": { "status": 1 },
        }))
        .unwrap();
        assert!(state.hand.is_none());
        assert_eq!(state.game_state.unwrap().get("status"), Some(&json!(1)));

        let state: StateResponse = serde_json::from_value(json!({
            "hand": [{ "suit": 0, "value": 2 }],
        }))
        .unwrap();
        assert_eq!(state.hand.unwrap(), vec![Card::new(Suit::Spades, 2)]);
    }
}
