//! Client lifecycle state and session data.
//!
//! The client moves through four phases: `Anonymous` (no session) →
//! `Registered` (lobby) → `GamePending` (joined, waiting for the game to
//! start) → `InGame`. Leaving a game returns to `Registered`; quitting
//! forces `Anonymous` from any phase. Transitions happen only on successful
//! command results or on server `StateChanged` events — never on polling
//! failures.
//!
//! The phase gates which pollers run: the lobby refresher while `Registered`
//! or `GamePending`, the event feed from `GamePending` on (events must flow
//! before the game starts, because the start itself arrives as an event).

use serde::{Deserialize, Serialize};

use crate::protocol::{Player, PlayerId};

/// Number of seats at a Tupelo table.
pub const SEAT_COUNT: usize = 4;

/// Client lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppPhase {
    Anonymous,
    Registered,
    GamePending,
    InGame,
}

impl AppPhase {
    /// Compact encoding for the shared atomic mirror.
    pub(crate) fn as_u8(self) -> u8 {
        match self {
            AppPhase::Anonymous => 0,
            AppPhase::Registered => 1,
            AppPhase::GamePending => 2,
            AppPhase::InGame => 3,
        }
    }

    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            1 => AppPhase::Registered,
            2 => AppPhase::GamePending,
            3 => AppPhase::InGame,
            _ => AppPhase::Anonymous,
        }
    }

    /// Whether the lobby list refresher should run in this phase.
    pub fn wants_lobby_polling(self) -> bool {
        matches!(self, AppPhase::Registered | AppPhase::GamePending)
    }

    /// Whether the in-game event feed should run in this phase.
    pub fn wants_event_polling(self) -> bool {
        matches!(self, AppPhase::GamePending | AppPhase::InGame)
    }
}

/// The registered identity of this client.
///
/// Created on successful registration, destroyed on quit. The `akey` must be
/// presented on every authenticated request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub id: PlayerId,
    pub akey: String,
    pub name: String,
}

/// Rotate the server's seating order so the local player sits at seat 0.
///
/// The server reports players in absolute table order; the view wants them
/// relative to "me" (0 = self, 2 = partner, 1/3 = opponents). Players beyond
/// [`SEAT_COUNT`] are ignored; missing seats stay empty. If the local player
/// is not in the list (spectating a malformed roster), absolute order is
/// kept.
pub fn assign_seats(players: &[Player], my_id: PlayerId) -> [Option<Player>; SEAT_COUNT] {
    let my_index = players.iter().position(|p| p.id == my_id).unwrap_or(0);
    let mut seats: [Option<Player>; SEAT_COUNT] = Default::default();
    for (i, player) in players.iter().take(SEAT_COUNT).enumerate() {
        let seat = (SEAT_COUNT + i - my_index) % SEAT_COUNT;
        if let Some(slot) = seats.get_mut(seat) {
            *slot = Some(player.clone());
        }
    }
    seats
}

// ── Tests ───────────────────────────────────────────────────────────
