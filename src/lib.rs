//! Async client library for the Tupelo four-player trick-taking card game.
//!
//! The server is poll-only: there is no push channel, so all progress arrives
//! through recurring `get_events` fetches. This crate turns that feed into an
//! ordered, presentation-paced stream of [`UiEvent`]s:
//!
//! - a [`client::TupeloClient`] handle queues user commands (register, join,
//!   play a card, chat, …) to a background client loop;
//! - the loop polls the server, buffers events in a strict FIFO
//!   [`queue::DrainQueue`] and processes them one at a time, pausing for card
//!   reveals and freezing on finished tricks until acknowledged;
//! - each event's partial game-state delta is merged into a
//!   [`protocol::GameSnapshot`] before dispatch, so consumers always observe
//!   post-merge state.
//!
//! The wire carrier is pluggable via the [`transport::Transport`] trait; the
//! client itself never opens a socket.
//!
//! # Quick start
//!
//! ```rust,ignore
//! use tupelo_client::{TupeloClient, TupeloConfig, UiEvent};
//!
//! let (client, mut ui) = TupeloClient::start(my_transport, TupeloConfig::new());
//! client.register("Alice")?;
//! client.create_game()?;
//! client.start_game_with_bots()?;
//!
//! while let Some(event) = ui.recv().await {
//!     match event {
//!         UiEvent::TurnStarted => client.play_card(0)?,
//!         UiEvent::TrickFinished { .. } => client.clear_table()?,
//!         UiEvent::Closed { .. } => break,
//!         _ => {}
//!     }
//! }
//! ```

pub mod client;
pub mod error;
pub mod event;
pub mod poller;
pub mod protocol;
pub mod queue;
pub mod state;
pub mod store;
pub mod transport;

pub use client::{PollPurpose, TupeloClient, TupeloConfig, UiEvent};
pub use error::{Result, TupeloError};
pub use event::{EventKind, GameEvent};
pub use protocol::{Card, GameId, GameMode, GamePhase, GameSnapshot, Player, PlayerId, Suit};
pub use state::AppPhase;
pub use store::{MemorySessionStore, SessionStore};
pub use transport::Transport;
