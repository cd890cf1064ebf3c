//! Transport abstraction for the Tupelo JSON API.
//!
//! The [`Transport`] trait models the server as a plain request/response
//! collaborator: one endpoint path plus a JSON parameter object in, one JSON
//! payload out. The reference server speaks HTTP with query-string
//! parameters, but nothing in the client depends on that — any carrier that
//! can answer a request with a JSON document works.
//!
//! Connection setup is intentionally NOT part of this trait. Construct a
//! configured transport externally, then pass it to `TupeloClient::start`.
//!
//! # Error contract
//!
//! Implementations must distinguish the server's two failure classes:
//!
//! - a *rule rejection* (the reference server answers HTTP 403 with a JSON
//!   body carrying a human-readable `message`) maps to
//!   [`TupeloError::Rejected`] — the client surfaces it to the user and
//!   considers the request handled;
//! - everything else (connection refused, timeouts, 5xx, garbled bodies)
//!   maps to [`TupeloError::Transport`] — logged, never user-visible.
//!
//! # Implementing a Transport
//!
//! ```rust,no_run
//! use async_trait::async_trait;
//! use serde_json::Value;
//! use tupelo_client::error::TupeloError;
//! use tupelo_client::transport::Transport;
//!
//! struct MyHttpTransport { /* ... */ }
//!
//! #[async_trait]
//! impl Transport for MyHttpTransport {
//!     async fn request(&self, endpoint: &str, params: Value) -> Result<Value, TupeloError> {
//!         // GET <base>/ajax/<endpoint> with `params` as the query string,
//!         // mapping a 403 JSON body to TupeloError::Rejected.
//!         todo!()
//!     }
//! }
//! ```

use async_trait::async_trait;
use serde_json::Value;

use crate::error::TupeloError;

/// Endpoint paths of the Tupelo JSON API, relative to the API prefix.
pub mod endpoints {
    pub const HELLO: &str = "hello";
    pub const PLAYER_REGISTER: &str = "player/register";
    pub const PLAYER_LIST: &str = "player/list";
    pub const PLAYER_QUIT: &str = "player/quit";
    pub const GAME_LIST: &str = "game/list";
    pub const GAME_CREATE: &str = "game/create";
    pub const GAME_ENTER: &str = "game/enter";
    pub const GAME_LEAVE: &str = "game/leave";
    pub const GAME_START: &str = "game/start";
    pub const GAME_START_WITH_BOTS: &str = "game/start_with_bots";
    pub const GAME_GET_INFO: &str = "game/get_info";
    pub const GAME_GET_STATE: &str = "game/get_state";
    pub const GAME_PLAY_CARD: &str = "game/play_card";
    pub const GAME_SEND_MESSAGE: &str = "game/send_message";
    pub const GET_EVENTS: &str = "get_events";
}

/// A request/response channel to a Tupelo server.
///
/// Takes `&self` because the client shares one transport between the command
/// dispatcher, the pollers and out-of-band state fetches; implementations
/// must be safe to call concurrently.
///
/// # Object Safety
///
/// This trait is object-safe; the client stores it as `Arc<dyn Transport>`.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Issue one request and await its JSON payload.
    ///
    /// `params` is always a JSON object (possibly empty); the `akey` session
    /// key is included by the caller whenever the endpoint requires it.
    ///
    /// # Errors
    ///
    /// [`TupeloError::Rejected`] for the server's rule-violation class,
    /// [`TupeloError::Transport`] for any other failure.
    async fn request(&self, endpoint: &str, params: Value) -> Result<Value, TupeloError>;
}
