//! Shared test helpers: a scripted mock transport and JSON builders.

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::mpsc;

use tupelo_client::transport::{endpoints, Transport};
use tupelo_client::{GameId, Player, PlayerId, Result, TupeloError, UiEvent};

/// Install a test log subscriber so `RUST_LOG=debug cargo test` shows client
/// traces. Safe to call from every test; only the first call wins.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Scripted request/response transport.
///
/// Responses are consumed per endpoint in FIFO order; once a script runs dry
/// (or was never set), the endpoint answers with a benign default so pollers
/// keep ticking without each test having to script every cycle.
pub struct MockTransport {
    responses: Mutex<HashMap<String, VecDeque<Result<Value>>>>,
    calls: Arc<Mutex<Vec<(String, Value)>>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            responses: Mutex::new(HashMap::new()),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Queue one response for `endpoint`.
    #[must_use]
    pub fn script(self, endpoint: &str, result: Result<Value>) -> Self {
        self.responses
            .lock()
            .unwrap()
            .entry(endpoint.to_string())
            .or_default()
            .push_back(result);
        self
    }

    /// Queue a rule-rejection response for `endpoint`.
    #[must_use]
    pub fn reject(self, endpoint: &str, message: &str) -> Self {
        self.script(endpoint, Err(TupeloError::Rejected(message.to_string())))
    }

    /// Handle on the recorded `(endpoint, params)` calls.
    pub fn calls(&self) -> Arc<Mutex<Vec<(String, Value)>>> {
        Arc::clone(&self.calls)
    }

    fn default_response(endpoint: &str) -> Result<Value> {
        match endpoint {
            endpoints::HELLO => Ok(json!({ "version": "test-server" })),
            endpoints::GET_EVENTS => Ok(json!([])),
            endpoints::GAME_LIST => Ok(json!([])),
            endpoints::PLAYER_LIST => Ok(json!([])),
            endpoints::GAME_GET_INFO => Ok(json!([])),
            endpoints::GAME_GET_STATE => Ok(json!({})),
            _ => Ok(Value::Null),
        }
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn request(&self, endpoint: &str, params: Value) -> Result<Value> {
        self.calls
            .lock()
            .unwrap()
            .push((endpoint.to_string(), params));
        if let Some(result) = self
            .responses
            .lock()
            .unwrap()
            .get_mut(endpoint)
            .and_then(VecDeque::pop_front)
        {
            return result;
        }
        Self::default_response(endpoint)
    }
}

// ── JSON builders ───────────────────────────────────────────────────

pub fn player_id(n: u128) -> PlayerId {
    PlayerId::from_u128(n)
}

pub fn game_id(n: u128) -> GameId {
    GameId::from_u128(n)
}

pub fn player(n: u128, name: &str) -> Player {
    Player {
        id: player_id(n),
        player_name: name.to_string(),
        game_id: None,
    }
}

pub fn player_json(n: u128, name: &str) -> Value {
    json!({ "id": player_id(n), "player_name": name })
}

pub fn register_ok(n: u128, akey: &str) -> Result<Value> {
    Ok(json!({ "id": player_id(n), "akey": akey }))
}

/// A full four-seat roster as `game/get_info` reports it, with the local
/// player (`me`) seated at absolute position `my_seat`.
pub fn roster(me: u128, my_seat: usize) -> Value {
    let mut seats = vec![
        player_json(101, "north"),
        player_json(102, "east"),
        player_json(103, "south"),
        player_json(104, "west"),
    ];
    if let Some(slot) = seats.get_mut(my_seat) {
        *slot = player_json(me, "me");
    }
    json!(seats)
}

pub fn card_played_event(player_n: u128, name: &str, suit: u8, value: u8) -> Value {
    json!({
        "type": 1,
        "player": player_json(player_n, name),
        "card": { "suit": suit, "value": value },
    })
}

pub fn message_event(sender: &str, message: &str) -> Value {
    json!({ "type": 2, "sender": sender, "message": message })
}

pub fn trick_played_event(winner_n: u128, winner: &str) -> Value {
    json!({
        "type": 3,
        "player": player_json(winner_n, winner),
        "game_state": { "tricks": [1, 0] },
    })
}

pub fn turn_event() -> Value {
    json!({ "type": 4 })
}

pub fn state_changed_event(status: u8) -> Value {
    json!({ "type": 5, "game_state": { "status": status } })
}

// ── Receiver helpers ────────────────────────────────────────────────

/// Receive UI events until one matches `want`, returning it. Panics if the
/// channel closes first.
pub async fn recv_until<F>(rx: &mut mpsc::Receiver<UiEvent>, mut want: F) -> UiEvent
where
    F: FnMut(&UiEvent) -> bool,
{
    loop {
        let event = rx.recv().await.expect("ui channel closed while waiting");
        if want(&event) {
            return event;
        }
    }
}

/// Drain every event currently buffered on the channel.
pub fn drain_now(rx: &mut mpsc::Receiver<UiEvent>) -> Vec<UiEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}
