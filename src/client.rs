//! Async client for the Tupelo card game server.
//!
//! [`TupeloClient`] is a thin handle that queues commands to a background
//! client loop task over an unbounded MPSC channel. Presentation-facing
//! output is emitted on a bounded channel ([`tokio::sync::mpsc::Receiver<UiEvent>`])
//! returned from [`TupeloClient::start`].
//!
//! The loop owns everything mutable: the session, the game-state snapshot and
//! hand, the event [`DrainQueue`] and both [`Poller`]s. All of it runs on one
//! task, so mutual exclusion is structural — no locks around game state.
//!
//! # Example
//!
//! ```rust,ignore
//! let transport = MyHttpTransport::new("https://example.net/ajax");
//! let (client, mut ui) = TupeloClient::start(transport, TupeloConfig::new());
//!
//! client.register("Alice")?;
//!
//! while let Some(event) = ui.recv().await {
//!     match event {
//!         UiEvent::CardRevealed { player, card } => { /* … */ }
//!         UiEvent::TrickFinished { .. } => client.clear_table()?,
//!         UiEvent::Closed { .. } => break,
//!         _ => {}
//!     }
//! }
//! ```

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Map, Value};
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::time::Instant;
use tracing::{debug, error, warn};

use crate::error::{Result, TupeloError};
use crate::event::{EventKind, GameEvent};
use crate::poller::{PollResult, Poller};
use crate::protocol::{
    Card, GameId, GameListing, GamePhase, GameSnapshot, HelloResponse, Player, PlayerId,
    RegisterResponse, StateResponse,
};
use crate::queue::{DrainQueue, Wake};
use crate::state::{assign_seats, AppPhase, Session, SEAT_COUNT};
use crate::store::SessionStore;
use crate::transport::{endpoints, Transport};

/// Default capacity of the bounded UI event channel.
const DEFAULT_UI_CHANNEL_CAPACITY: usize = 256;

/// Default timeout for the graceful shutdown.
const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1);

/// Default lobby list refresh interval.
const DEFAULT_LOBBY_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Default event feed poll interval.
const DEFAULT_EVENT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Default reveal delay for a played card.
const DEFAULT_REVEAL_DELAY: Duration = Duration::from_millis(500);

/// Default fallback deadline for clearing a finished trick off the table.
const DEFAULT_TABLE_CLEAR_TIMEOUT: Duration = Duration::from_secs(5);

// ── Configuration ───────────────────────────────────────────────────

/// Configuration for a [`TupeloClient`].
///
/// All fields have sensible defaults matching the reference web client.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use tupelo_client::client::TupeloConfig;
///
/// let config = TupeloConfig::new()
///     .with_event_poll_interval(Duration::from_secs(1))
///     .with_ui_channel_capacity(512);
/// ```
#[derive(Clone)]
pub struct TupeloConfig {
    /// Lobby (game + player list) refresh interval. Defaults to **5 s**.
    pub lobby_poll_interval: Duration,
    /// Event feed poll interval. Defaults to **2 s**.
    pub event_poll_interval: Duration,
    /// How long a played card is shown before the next event is processed.
    /// Defaults to **500 ms**.
    pub reveal_delay: Duration,
    /// Fallback deadline for clearing the table after a trick when the user
    /// does not acknowledge it. Defaults to **5 s**.
    pub table_clear_timeout: Duration,
    /// Capacity of the bounded UI event channel.
    ///
    /// When the consumer cannot keep up, events are dropped (with a warning
    /// logged) to avoid blocking the client loop. The final `Closed` event is
    /// always delivered regardless of capacity.
    ///
    /// Defaults to **256**. Values below 1 are clamped to 1.
    pub ui_channel_capacity: usize,
    /// Timeout for the graceful shutdown. Defaults to **1 second**.
    pub shutdown_timeout: Duration,
    /// Durable storage for the session key, enabling session resume across
    /// restarts. Defaults to none (no resume).
    pub session_store: Option<Arc<dyn SessionStore>>,
}

impl TupeloConfig {
    /// Create a configuration with default values.
    pub fn new() -> Self {
        Self {
            lobby_poll_interval: DEFAULT_LOBBY_POLL_INTERVAL,
            event_poll_interval: DEFAULT_EVENT_POLL_INTERVAL,
            reveal_delay: DEFAULT_REVEAL_DELAY,
            table_clear_timeout: DEFAULT_TABLE_CLEAR_TIMEOUT,
            ui_channel_capacity: DEFAULT_UI_CHANNEL_CAPACITY,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
            session_store: None,
        }
    }

    #[must_use]
    pub fn with_lobby_poll_interval(mut self, interval: Duration) -> Self {
        self.lobby_poll_interval = interval;
        self
    }

    #[must_use]
    pub fn with_event_poll_interval(mut self, interval: Duration) -> Self {
        self.event_poll_interval = interval;
        self
    }

    #[must_use]
    pub fn with_reveal_delay(mut self, delay: Duration) -> Self {
        self.reveal_delay = delay;
        self
    }

    #[must_use]
    pub fn with_table_clear_timeout(mut self, timeout: Duration) -> Self {
        self.table_clear_timeout = timeout;
        self
    }

    /// Set the capacity of the bounded UI event channel.
    ///
    /// Defaults to **256**. Values below 1 are clamped to 1.
    #[must_use]
    pub fn with_ui_channel_capacity(mut self, capacity: usize) -> Self {
        self.ui_channel_capacity = capacity.max(1);
        self
    }

    #[must_use]
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Attach a [`SessionStore`] for session resume.
    #[must_use]
    pub fn with_session_store(mut self, store: Arc<dyn SessionStore>) -> Self {
        self.session_store = Some(store);
        self
    }
}

impl Default for TupeloConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for TupeloConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TupeloConfig")
            .field("lobby_poll_interval", &self.lobby_poll_interval)
            .field("event_poll_interval", &self.event_poll_interval)
            .field("reveal_delay", &self.reveal_delay)
            .field("table_clear_timeout", &self.table_clear_timeout)
            .field("ui_channel_capacity", &self.ui_channel_capacity)
            .field("shutdown_timeout", &self.shutdown_timeout)
            .field("session_store", &self.session_store.is_some())
            .finish()
    }
}

// ── UI events ───────────────────────────────────────────────────────

/// Which recurring fetch a [`UiEvent::PollerStopped`] refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollPurpose {
    /// The lobby game/player list refresher.
    Lobby,
    /// The in-game event feed.
    Events,
}

/// Presentation-facing output of the client loop.
///
/// The consumer renders these; none of them require a reply. Pacing between
/// game events is handled inside the client (see [`DrainQueue`]), so events
/// arrive here already spaced out for presentation — with the one exception
/// of [`UiEvent::TrickFinished`], which the consumer may acknowledge early
/// via [`TupeloClient::clear_table`].
#[derive(Debug, Clone)]
pub enum UiEvent {
    /// A previous session was resumed from the stored session key.
    SessionRestored { player: Player },
    /// Registration succeeded.
    Registered { player_id: PlayerId },
    /// The client lifecycle phase changed; show/hide UI regions accordingly.
    PhaseChanged { phase: AppPhase },
    /// Fresh lobby game listing.
    LobbyGames { games: Vec<GameListing> },
    /// Fresh lobby player listing.
    LobbyPlayers { players: Vec<Player> },
    /// Joined (or created) a game.
    GameJoined { game_id: GameId },
    /// Seat order for the current game, rotated so the local player is
    /// seat 0 (2 = partner, 1/3 = opponents).
    SeatsAssigned { seats: [Option<Player>; SEAT_COUNT] },
    /// A player put a card on the table; show it.
    CardRevealed { player: Player, card: Card },
    /// A chat/table message.
    ChatMessage { sender: String, message: String },
    /// A trick was resolved. The table stays as-is until the consumer calls
    /// [`TupeloClient::clear_table`] or the fallback timeout fires.
    TrickFinished { winner: Option<Player> },
    /// Voting resolved and play begins; the vote cards are on the table
    /// under the same clear-table rules as a finished trick.
    VotingEnded { mode: Option<crate::protocol::GameMode> },
    /// Take the cards off the table.
    TableCleared,
    /// It is the local player's turn.
    TurnStarted,
    /// The hand was replaced by a state fetch.
    HandUpdated { hand: Vec<Card> },
    /// The game status snapshot changed.
    SnapshotUpdated { snapshot: GameSnapshot },
    /// The server rejected a command for rule/session reasons; show the
    /// message to the user.
    Rejected { message: String },
    /// Left the current game.
    GameLeft,
    /// A poller hit a transport error and disabled itself.
    PollerStopped { purpose: PollPurpose, reason: String },
    /// The session ended (quit); back to square one.
    SessionEnded,
    /// The client loop has exited. Always the last event.
    Closed { reason: Option<String> },
}

// ── Commands ────────────────────────────────────────────────────────

/// User intents queued from the handle to the client loop.
#[derive(Debug)]
enum Command {
    Register { name: String },
    CreateGame,
    JoinGame { game_id: GameId },
    StartGame { with_bots: bool },
    LeaveGame,
    PlayCard { index: usize },
    SendChat { message: String },
    ClearTable,
    Quit,
}

// ── Shared state ────────────────────────────────────────────────────

/// State mirrored out of the client loop for the handle's accessors.
struct SharedState {
    running: AtomicBool,
    phase: AtomicU8,
    my_turn: AtomicBool,
    game_id: Mutex<Option<GameId>>,
    player_name: Mutex<Option<String>>,
}

impl SharedState {
    fn new() -> Self {
        Self {
            running: AtomicBool::new(true),
            phase: AtomicU8::new(AppPhase::Anonymous.as_u8()),
            my_turn: AtomicBool::new(false),
            game_id: Mutex::new(None),
            player_name: Mutex::new(None),
        }
    }
}

// ── Client handle ───────────────────────────────────────────────────

/// Handle to a running Tupelo client.
///
/// Created via [`TupeloClient::start`]. All command methods serialize the
/// intent and queue it to the client loop; they return once queued (no
/// round-trip await). Results surface as [`UiEvent`]s.
pub struct TupeloClient {
    cmd_tx: mpsc::UnboundedSender<Command>,
    shared: Arc<SharedState>,
    task: Option<tokio::task::JoinHandle<()>>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    shutdown_timeout: Duration,
}

impl TupeloClient {
    /// Start the client loop and return a handle plus the UI event receiver.
    ///
    /// The loop immediately issues a `hello` request; if the configured
    /// [`SessionStore`] holds a session key the server still recognizes, the
    /// session (and game membership) is restored before anything else.
    #[must_use = "the UI event receiver must be consumed"]
    pub fn start(
        transport: impl Transport,
        config: TupeloConfig,
    ) -> (Self, mpsc::Receiver<UiEvent>) {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<Command>();
        // Clamp capacity to at least 1 (tokio panics on 0).
        let capacity = config.ui_channel_capacity.max(1);
        let (ui_tx, ui_rx) = mpsc::channel::<UiEvent>(capacity);
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        let shared = Arc::new(SharedState::new());
        let shutdown_timeout = config.shutdown_timeout;

        let client_loop = ClientLoop::new(Arc::new(transport), config, Arc::clone(&shared), ui_tx);
        let task = tokio::spawn(ClientLoop::run(client_loop, cmd_rx, shutdown_rx));

        let client = Self {
            cmd_tx,
            shared,
            task: Some(task),
            shutdown_tx: Some(shutdown_tx),
            shutdown_timeout,
        };

        (client, ui_rx)
    }

    // ── Command methods ─────────────────────────────────────────────

    /// Register with the server under `name`.
    ///
    /// # Errors
    ///
    /// Returns [`TupeloError::ClientClosed`] if the client loop has exited.
    pub fn register(&self, name: impl Into<String>) -> Result<()> {
        self.send(Command::Register { name: name.into() })
    }

    /// Create a new game and join it.
    ///
    /// # Errors
    ///
    /// Returns [`TupeloError::ClientClosed`] if the client loop has exited.
    pub fn create_game(&self) -> Result<()> {
        self.send(Command::CreateGame)
    }

    /// Join an existing game from the lobby listing.
    ///
    /// # Errors
    ///
    /// Returns [`TupeloError::ClientClosed`] if the client loop has exited.
    pub fn join_game(&self, game_id: GameId) -> Result<()> {
        self.send(Command::JoinGame { game_id })
    }

    /// Start the current game.
    ///
    /// # Errors
    ///
    /// Returns [`TupeloError::ClientClosed`] if the client loop has exited.
    pub fn start_game(&self) -> Result<()> {
        self.send(Command::StartGame { with_bots: false })
    }

    /// Start the current game, filling empty seats with bots.
    ///
    /// # Errors
    ///
    /// Returns [`TupeloError::ClientClosed`] if the client loop has exited.
    pub fn start_game_with_bots(&self) -> Result<()> {
        self.send(Command::StartGame { with_bots: true })
    }

    /// Leave the current game, returning to the lobby.
    ///
    /// # Errors
    ///
    /// Returns [`TupeloError::ClientClosed`] if the client loop has exited.
    pub fn leave_game(&self) -> Result<()> {
        self.send(Command::LeaveGame)
    }

    /// Play the card at `index` in the current hand.
    ///
    /// The hand order is positional and stable between state fetches, so the
    /// index seen by the presentation layer is the index to submit. Ignored
    /// unless it is the local player's turn; the turn flag is cleared as soon
    /// as the request is submitted, so a double click cannot play twice.
    ///
    /// # Errors
    ///
    /// Returns [`TupeloError::ClientClosed`] if the client loop has exited.
    pub fn play_card(&self, index: usize) -> Result<()> {
        self.send(Command::PlayCard { index })
    }

    /// Send a chat message to the table.
    ///
    /// # Errors
    ///
    /// Returns [`TupeloError::ClientClosed`] if the client loop has exited.
    pub fn send_chat(&self, message: impl Into<String>) -> Result<()> {
        self.send(Command::SendChat {
            message: message.into(),
        })
    }

    /// Acknowledge a finished trick, clearing the table early.
    ///
    /// Idempotent: acknowledging when nothing is pending is a no-op, and the
    /// fallback timeout is cancelled when this wins the race.
    ///
    /// # Errors
    ///
    /// Returns [`TupeloError::ClientClosed`] if the client loop has exited.
    pub fn clear_table(&self) -> Result<()> {
        self.send(Command::ClearTable)
    }

    /// Quit: leave any game, end the session and forget the stored key.
    ///
    /// # Errors
    ///
    /// Returns [`TupeloError::ClientClosed`] if the client loop has exited.
    pub fn quit(&self) -> Result<()> {
        self.send(Command::Quit)
    }

    /// Shut down the client loop, stopping all pollers and pending timers.
    ///
    /// After this returns the UI receiver yields [`UiEvent::Closed`] and then
    /// `None`.
    pub async fn shutdown(&mut self) {
        debug!("TupeloClient: shutdown requested");

        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }

        // Await the loop with a timeout. If it doesn't exit in time, abort it
        // so the task cannot detach and run indefinitely.
        if let Some(mut task) = self.task.take() {
            match tokio::time::timeout(self.shutdown_timeout, &mut task).await {
                Ok(Ok(())) => {}
                Ok(Err(join_err)) => {
                    warn!("client loop terminated with join error: {join_err}");
                }
                Err(_) => {
                    warn!("client loop did not exit within timeout; aborting task");
                    task.abort();
                    if let Err(join_err) = task.await {
                        debug!("client loop aborted: {join_err}");
                    }
                }
            }
        }

        self.shared.running.store(false, Ordering::Release);
    }

    // ── State accessors ─────────────────────────────────────────────

    /// Returns `true` while the client loop is running.
    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
    }

    /// Current lifecycle phase.
    pub fn phase(&self) -> AppPhase {
        AppPhase::from_u8(self.shared.phase.load(Ordering::Acquire))
    }

    /// Whether it is currently the local player's turn.
    pub fn is_my_turn(&self) -> bool {
        self.shared.my_turn.load(Ordering::Acquire)
    }

    /// The current game, if the client is in one.
    pub async fn current_game_id(&self) -> Option<GameId> {
        *self.shared.game_id.lock().await
    }

    /// The registered display name, if any.
    pub async fn player_name(&self) -> Option<String> {
        self.shared.player_name.lock().await.clone()
    }

    // ── Internal helpers ────────────────────────────────────────────

    fn send(&self, cmd: Command) -> Result<()> {
        if !self.shared.running.load(Ordering::Acquire) {
            return Err(TupeloError::ClientClosed);
        }
        self.cmd_tx.send(cmd).map_err(|_| TupeloError::ClientClosed)
    }
}

impl fmt::Debug for TupeloClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TupeloClient")
            .field("running", &self.is_running())
            .field("phase", &self.phase())
            .field("my_turn", &self.is_my_turn())
            .finish()
    }
}

impl Drop for TupeloClient {
    fn drop(&mut self) {
        // `Drop` is synchronous, so a graceful shutdown cannot be awaited
        // here. Aborting drops the loop future, which in turn drops both
        // pollers (their `Drop` aborts the polling tasks).
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

// ── Client loop ─────────────────────────────────────────────────────

/// Out-of-band fetch results (seat info, full game state).
#[derive(Debug)]
enum Fetch {
    Seats(Result<Vec<Player>>),
    State(Result<StateResponse>),
}

/// The background task that owns all mutable client state.
struct ClientLoop {
    transport: Arc<dyn Transport>,
    config: TupeloConfig,
    shared: Arc<SharedState>,
    ui_tx: mpsc::Sender<UiEvent>,

    lobby_tx: mpsc::UnboundedSender<PollResult<(Vec<GameListing>, Vec<Player>)>>,
    events_tx: mpsc::UnboundedSender<PollResult<Vec<Value>>>,
    fetch_tx: mpsc::UnboundedSender<Fetch>,

    queue: DrainQueue,
    session: Option<Session>,
    game_id: Option<GameId>,
    snapshot: GameSnapshot,
    hand: Vec<Card>,
    my_turn: bool,
    phase: AppPhase,
    seats: [Option<Player>; SEAT_COUNT],
    /// A trick (or revealed vote) is on the table waiting to be cleared.
    awaiting_clear: bool,

    lobby_poller: Option<Poller>,
    event_poller: Option<Poller>,
}

type LobbyRx = mpsc::UnboundedReceiver<PollResult<(Vec<GameListing>, Vec<Player>)>>;
type EventsRx = mpsc::UnboundedReceiver<PollResult<Vec<Value>>>;

impl ClientLoop {
    fn new(
        transport: Arc<dyn Transport>,
        config: TupeloConfig,
        shared: Arc<SharedState>,
        ui_tx: mpsc::Sender<UiEvent>,
    ) -> (Self, LobbyRx, EventsRx, mpsc::UnboundedReceiver<Fetch>) {
        let (lobby_tx, lobby_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (fetch_tx, fetch_rx) = mpsc::unbounded_channel();
        let client_loop = Self {
            transport,
            config,
            shared,
            ui_tx,
            lobby_tx,
            events_tx,
            fetch_tx,
            queue: DrainQueue::new(),
            session: None,
            game_id: None,
            snapshot: GameSnapshot::new(),
            hand: Vec::new(),
            my_turn: false,
            phase: AppPhase::Anonymous,
            seats: Default::default(),
            awaiting_clear: false,
            lobby_poller: None,
            event_poller: None,
        };
        (client_loop, lobby_rx, events_rx, fetch_rx)
    }

    async fn run(
        client_loop: (Self, LobbyRx, EventsRx, mpsc::UnboundedReceiver<Fetch>),
        mut cmd_rx: mpsc::UnboundedReceiver<Command>,
        mut shutdown_rx: oneshot::Receiver<()>,
    ) {
        let (mut this, mut lobby_rx, mut events_rx, mut fetch_rx) = client_loop;
        debug!("client loop started");

        this.hello().await;

        loop {
            let wake = this.queue.next_wake();
            tokio::select! {
                cmd = cmd_rx.recv() => {
                    match cmd {
                        Some(cmd) => this.dispatch_command(cmd).await,
                        // Handle dropped.
                        None => {
                            debug!("command channel closed, stopping client loop");
                            break;
                        }
                    }
                }

                _ = &mut shutdown_rx => {
                    debug!("shutdown signal received");
                    break;
                }

                Some(result) = lobby_rx.recv() => this.on_lobby_poll(result),

                Some(result) = events_rx.recv() => this.on_event_poll(result),

                Some(fetch) = fetch_rx.recv() => this.on_fetch(fetch),

                _ = drain_wake(wake), if wake.is_some() => this.drain_step(),
            }
        }

        // Tear down timers before announcing the exit.
        if let Some(mut poller) = this.lobby_poller.take() {
            poller.disable();
        }
        if let Some(mut poller) = this.event_poller.take() {
            poller.disable();
        }
        this.shared.running.store(false, Ordering::Release);

        // `Closed` is always the last event on the channel and must never be
        // silently dropped, hence the blocking send.
        let closed = UiEvent::Closed {
            reason: Some("client shut down".into()),
        };
        if this.ui_tx.send(closed).await.is_err() {
            debug!("ui channel closed, receiver dropped");
        }
        debug!("client loop exited");
    }

    // ── Startup ─────────────────────────────────────────────────────

    /// Greet the server; resume the stored session if it is still live.
    async fn hello(&mut self) {
        let stored = self
            .config
            .session_store
            .as_ref()
            .and_then(|store| store.load());

        let mut params = Map::new();
        if let Some(akey) = &stored {
            params.insert("akey".into(), json!(akey));
        }

        match self.transport.request(endpoints::HELLO, Value::Object(params)).await {
            Ok(payload) => match serde_json::from_value::<HelloResponse>(payload) {
                Ok(hello) => {
                    debug!("server version: {}", hello.version);
                    if let (Some(player), Some(akey)) = (hello.player, stored) {
                        self.restore_session(player, akey).await;
                    }
                }
                Err(e) => warn!("malformed hello response: {e}"),
            },
            Err(e) => warn!("hello failed: {e}"),
        }
    }

    async fn restore_session(&mut self, player: Player, akey: String) {
        debug!("resuming session for {player}");
        let game_id = player.game_id;
        self.set_session(Some(Session {
            id: player.id,
            akey,
            name: player.player_name.clone(),
        }))
        .await;
        self.emit(UiEvent::SessionRestored { player });
        self.set_phase(AppPhase::Registered);

        if let Some(game_id) = game_id {
            self.set_game_id(Some(game_id)).await;
            self.emit(UiEvent::GameJoined { game_id });
            self.set_phase(AppPhase::GamePending);
        }
    }

    // ── Command dispatch ────────────────────────────────────────────

    async fn dispatch_command(&mut self, cmd: Command) {
        debug!("dispatching {cmd:?}");
        match cmd {
            Command::Register { name } => self.do_register(name).await,
            Command::CreateGame => self.do_enter_game(endpoints::GAME_CREATE, None).await,
            Command::JoinGame { game_id } => {
                self.do_enter_game(endpoints::GAME_ENTER, Some(game_id)).await
            }
            Command::StartGame { with_bots } => self.do_start_game(with_bots).await,
            Command::LeaveGame => self.do_leave_game().await,
            Command::PlayCard { index } => self.do_play_card(index).await,
            Command::SendChat { message } => self.do_send_chat(message).await,
            Command::ClearTable => {
                if self.queue.acknowledge() {
                    self.table_cleared();
                } else {
                    debug!("clear_table: nothing pending");
                }
            }
            Command::Quit => self.do_quit().await,
        }
    }

    async fn do_register(&mut self, name: String) {
        if self.session.is_some() {
            self.emit(UiEvent::Rejected {
                message: "already registered".into(),
            });
            return;
        }
        let params = json!({ "player": { "player_name": name } });
        match self.transport.request(endpoints::PLAYER_REGISTER, params).await {
            Ok(payload) => match serde_json::from_value::<RegisterResponse>(payload) {
                Ok(registered) => {
                    if let Some(store) = &self.config.session_store {
                        store.save(&registered.akey);
                    }
                    self.set_session(Some(Session {
                        id: registered.id,
                        akey: registered.akey,
                        name,
                    }))
                    .await;
                    self.emit(UiEvent::Registered {
                        player_id: registered.id,
                    });
                    self.set_phase(AppPhase::Registered);
                }
                Err(e) => error!("malformed register response: {e}"),
            },
            Err(e) => self.command_failed("register", e),
        }
    }

    /// Shared result handling for `game/create` and `game/enter` — both
    /// answer with the id of the game we are now a member of.
    async fn do_enter_game(&mut self, endpoint: &str, game_id: Option<GameId>) {
        let Some(session) = &self.session else {
            self.emit(UiEvent::Rejected {
                message: "register first".into(),
            });
            return;
        };
        if self.game_id.is_some() {
            self.emit(UiEvent::Rejected {
                message: "already in a game".into(),
            });
            return;
        }

        let mut params = Map::new();
        params.insert("akey".into(), json!(session.akey));
        if let Some(game_id) = game_id {
            params.insert("game_id".into(), json!(game_id));
        }

        match self.transport.request(endpoint, Value::Object(params)).await {
            Ok(payload) => match serde_json::from_value::<GameId>(payload) {
                Ok(game_id) => {
                    self.set_game_id(Some(game_id)).await;
                    self.emit(UiEvent::GameJoined { game_id });
                    self.set_phase(AppPhase::GamePending);
                }
                Err(e) => error!("malformed game id in {endpoint} response: {e}"),
            },
            Err(e) => self.command_failed(endpoint, e),
        }
    }

    async fn do_start_game(&mut self, with_bots: bool) {
        let Some(params) = self.game_params() else {
            self.emit(UiEvent::Rejected {
                message: "not in a game".into(),
            });
            return;
        };
        let endpoint = if with_bots {
            endpoints::GAME_START_WITH_BOTS
        } else {
            endpoints::GAME_START
        };
        match self.transport.request(endpoint, params).await {
            Ok(_) => self.enter_game(),
            Err(e) => self.command_failed(endpoint, e),
        }
    }

    async fn do_leave_game(&mut self) {
        let Some(params) = self.game_params() else {
            debug!("leave_game: not in a game");
            return;
        };
        match self.transport.request(endpoints::GAME_LEAVE, params).await {
            Ok(_) => self.left_game().await,
            // A rejection here means the server no longer considers us a
            // member; surface the message but drop our membership anyway.
            Err(TupeloError::Rejected(message)) => {
                self.emit(UiEvent::Rejected { message });
                self.left_game().await;
            }
            Err(e) => error!("leave_game failed: {e}"),
        }
    }

    async fn do_play_card(&mut self, index: usize) {
        if !self.my_turn {
            // Optimistic lock: a second click before the response (or a click
            // out of turn) never submits a second play.
            debug!("play_card ignored: not my turn");
            return;
        }
        let Some(card) = self.hand.get(index).copied() else {
            self.emit(UiEvent::Rejected {
                message: format!("no card at position {index}"),
            });
            return;
        };
        let Some(mut params) = self.game_params_map() else {
            debug!("play_card: not in a game");
            return;
        };
        params.insert("card".into(), json!(card));

        self.set_my_turn(false);
        match self
            .transport
            .request(endpoints::GAME_PLAY_CARD, Value::Object(params))
            .await
        {
            Ok(_) => self.spawn_state_fetch(),
            Err(TupeloError::Rejected(message)) => {
                // Illegal play: the turn is still ours.
                self.set_my_turn(true);
                self.emit(UiEvent::Rejected { message });
            }
            Err(e) => {
                self.set_my_turn(true);
                error!("play_card failed: {e}");
            }
        }
    }

    async fn do_send_chat(&mut self, message: String) {
        let Some(mut params) = self.game_params_map() else {
            debug!("send_chat: not in a game");
            return;
        };
        params.insert("message".into(), json!(message));
        match self
            .transport
            .request(endpoints::GAME_SEND_MESSAGE, Value::Object(params))
            .await
        {
            // The message comes back to everyone through the event feed.
            Ok(_) => {}
            Err(e) => self.command_failed("send_chat", e),
        }
    }

    async fn do_quit(&mut self) {
        let Some(session) = &self.session else {
            debug!("quit: no session");
            return;
        };
        let params = json!({ "akey": session.akey });
        match self.transport.request(endpoints::PLAYER_QUIT, params).await {
            Ok(_) => self.quit_local().await,
            // The server already lost the session; finish quitting locally.
            Err(TupeloError::Rejected(message)) => {
                self.emit(UiEvent::Rejected { message });
                self.quit_local().await;
            }
            Err(e) => error!("quit failed: {e}"),
        }
    }

    /// Generic failure handling for commands without special cases:
    /// rejections reach the user, transport failures only the log.
    fn command_failed(&mut self, what: &str, err: TupeloError) {
        match err {
            TupeloError::Rejected(message) => {
                debug!("{what} rejected: {message}");
                self.emit(UiEvent::Rejected { message });
            }
            other => error!("{what} failed: {other}"),
        }
    }

    // ── Poll and fetch results ──────────────────────────────────────

    fn on_lobby_poll(&mut self, result: PollResult<(Vec<GameListing>, Vec<Player>)>) {
        match result {
            PollResult::Fetched((games, players)) => {
                if !self.phase.wants_lobby_polling() {
                    // A batch fetched just before the poller was disabled.
                    debug!("dropping stale lobby batch");
                    return;
                }
                self.emit(UiEvent::LobbyGames { games });
                self.emit(UiEvent::LobbyPlayers { players });
            }
            PollResult::Stopped(e) => {
                warn!("lobby poller stopped: {e}");
                self.lobby_poller = None;
                self.emit(UiEvent::PollerStopped {
                    purpose: PollPurpose::Lobby,
                    reason: e.to_string(),
                });
            }
        }
    }

    fn on_event_poll(&mut self, result: PollResult<Vec<Value>>) {
        match result {
            PollResult::Fetched(raw_events) => {
                if !self.phase.wants_event_polling() {
                    // A batch fetched just before the poller was disabled.
                    debug!("dropping stale event batch of {}", raw_events.len());
                    return;
                }
                let mut batch = Vec::with_capacity(raw_events.len());
                for raw in &raw_events {
                    match GameEvent::from_value(raw) {
                        Ok(event) => batch.push(event),
                        Err(e) => warn!("skipping malformed event: {e}"),
                    }
                }
                if !batch.is_empty() {
                    debug!("queueing {} events", batch.len());
                    self.queue.enqueue_batch(batch);
                }
            }
            PollResult::Stopped(e) => {
                warn!("event poller stopped: {e}");
                self.event_poller = None;
                self.emit(UiEvent::PollerStopped {
                    purpose: PollPurpose::Events,
                    reason: e.to_string(),
                });
            }
        }
    }

    fn on_fetch(&mut self, fetch: Fetch) {
        match fetch {
            Fetch::Seats(Ok(players)) => {
                let my_id = match &self.session {
                    Some(session) => session.id,
                    None => return,
                };
                self.seats = assign_seats(&players, my_id);
                self.emit(UiEvent::SeatsAssigned {
                    seats: self.seats.clone(),
                });
            }
            Fetch::State(Ok(state)) => {
                if let Some(delta) = &state.game_state {
                    self.merge_snapshot(delta);
                }
                if let Some(hand) = state.hand {
                    self.hand = hand.clone();
                    self.emit(UiEvent::HandUpdated { hand });
                }
            }
            Fetch::Seats(Err(e)) => self.command_failed("get_info", e),
            Fetch::State(Err(e)) => self.command_failed("get_state", e),
        }
    }

    // ── Drain loop ──────────────────────────────────────────────────

    /// One single-flight drain step: expire pacing, pop the head event,
    /// merge its delta, dispatch by kind.
    fn drain_step(&mut self) {
        let now = Instant::now();
        if self.queue.expire_pacing(now) {
            // The ack fallback fired before the user clicked.
            self.table_cleared();
        }
        let Some(event) = self.queue.pop_ready() else {
            return;
        };
        debug!("processing {} event", event.kind.name());

        // Merge before dispatch: handlers read the post-merge snapshot.
        let prev_phase = self.snapshot.phase();
        if let Some(delta) = &event.game_state {
            self.merge_snapshot(delta);
        }

        match event.kind {
            EventKind::CardPlayed { player, card } => {
                let seated = self.seats.iter().flatten().any(|p| p.id == player.id);
                if !seated {
                    // The player may have left already; never stall the queue
                    // over a card we cannot place.
                    debug!("card from unseated player {player}, skipping");
                    return;
                }
                self.emit(UiEvent::CardRevealed { player, card });
                self.queue.defer(now + self.config.reveal_delay);
            }
            EventKind::Message { sender, message } => {
                self.emit(UiEvent::ChatMessage { sender, message });
            }
            EventKind::TrickPlayed { player } => {
                self.emit(UiEvent::TrickFinished { winner: player });
                self.freeze_table(now);
            }
            EventKind::Turn => {
                self.set_my_turn(true);
                self.emit(UiEvent::TurnStarted);
                // Refresh hand and status out of band; the queue keeps
                // draining while the fetch is in flight.
                self.spawn_state_fetch();
            }
            EventKind::StateChanged => match self.snapshot.phase() {
                Some(GamePhase::Voting) if prev_phase != Some(GamePhase::Voting) => {
                    // The game (re)started: same entry sequence as a
                    // successful manual start.
                    debug!("state changed to voting: entering game");
                    self.enter_game();
                }
                Some(GamePhase::Ongoing) if prev_phase != Some(GamePhase::Ongoing) => {
                    // Voting resolved; the vote cards are face up on the
                    // table and stay there until cleared.
                    self.emit(UiEvent::VotingEnded {
                        mode: self.snapshot.mode(),
                    });
                    self.freeze_table(now);
                }
                _ => {}
            },
            EventKind::Unknown { kind } => {
                warn!("unknown event type {kind}, skipping");
            }
        }
    }

    /// Freeze the drain until the user clears the table or the fallback
    /// deadline fires, whichever comes first.
    fn freeze_table(&mut self, now: Instant) {
        self.queue.freeze(now + self.config.table_clear_timeout);
        self.awaiting_clear = true;
    }

    fn table_cleared(&mut self) {
        if self.awaiting_clear {
            self.awaiting_clear = false;
            self.emit(UiEvent::TableCleared);
        }
    }

    fn merge_snapshot(&mut self, delta: &Map<String, Value>) {
        self.snapshot.merge(delta);
        self.emit(UiEvent::SnapshotUpdated {
            snapshot: self.snapshot.clone(),
        });
    }

    // ── Phase transitions ───────────────────────────────────────────

    fn set_phase(&mut self, phase: AppPhase) {
        if self.phase == phase {
            return;
        }
        debug!("phase: {:?} -> {:?}", self.phase, phase);
        self.phase = phase;
        self.shared.phase.store(phase.as_u8(), Ordering::Release);
        self.emit(UiEvent::PhaseChanged { phase });

        match phase {
            AppPhase::Anonymous => {
                if let Some(mut poller) = self.lobby_poller.take() {
                    poller.disable();
                }
                if let Some(mut poller) = self.event_poller.take() {
                    poller.disable();
                }
            }
            AppPhase::Registered => self.ensure_lobby_poller(),
            AppPhase::GamePending => {
                // Keep the lobby fresh while waiting; events must flow
                // already, because the start arrives as a StateChanged.
                self.ensure_lobby_poller();
                self.ensure_event_poller();
            }
            AppPhase::InGame => {
                if let Some(mut poller) = self.lobby_poller.take() {
                    poller.disable();
                }
                self.ensure_event_poller();
            }
        }
    }

    /// The full game-entry sequence, shared by a successful manual start and
    /// a StateChanged event reporting the voting phase.
    fn enter_game(&mut self) {
        if self.game_id.is_none() {
            warn!("enter_game without membership, ignoring");
            return;
        }
        self.set_phase(AppPhase::InGame);
        self.ensure_event_poller();
        self.spawn_seat_fetch();
        self.spawn_state_fetch();
    }

    /// Drop all game-local state and return to the lobby.
    async fn left_game(&mut self) {
        if let Some(mut poller) = self.event_poller.take() {
            poller.disable();
        }
        self.queue.reset();
        self.awaiting_clear = false;
        self.set_game_id(None).await;
        self.snapshot.clear();
        self.hand.clear();
        self.set_my_turn(false);
        self.seats = Default::default();
        self.emit(UiEvent::GameLeft);
        self.set_phase(AppPhase::Registered);
    }

    async fn quit_local(&mut self) {
        if self.game_id.is_some() {
            self.left_game().await;
        }
        if let Some(store) = &self.config.session_store {
            store.clear();
        }
        self.set_session(None).await;
        self.emit(UiEvent::SessionEnded);
        self.set_phase(AppPhase::Anonymous);
    }

    // ── Pollers and fetches ─────────────────────────────────────────

    fn ensure_lobby_poller(&mut self) {
        if self.lobby_poller.as_ref().is_some_and(Poller::is_active) {
            return;
        }
        let Some(session) = &self.session else {
            return;
        };
        let transport = Arc::clone(&self.transport);
        let akey = session.akey.clone();
        let fetch = move || {
            let transport = Arc::clone(&transport);
            let akey = akey.clone();
            async move {
                let games = transport.request(endpoints::GAME_LIST, json!({})).await?;
                let games: Vec<GameListing> = serde_json::from_value(games)?;
                let players = transport
                    .request(endpoints::PLAYER_LIST, json!({ "akey": akey }))
                    .await?;
                let players: Vec<Player> = serde_json::from_value(players)?;
                Ok((games, players))
            }
        };
        debug!("starting lobby poller");
        self.lobby_poller = Some(Poller::start(
            self.config.lobby_poll_interval,
            fetch,
            self.lobby_tx.clone(),
        ));
    }

    fn ensure_event_poller(&mut self) {
        if self.event_poller.as_ref().is_some_and(Poller::is_active) {
            return;
        }
        let Some(session) = &self.session else {
            return;
        };
        let transport = Arc::clone(&self.transport);
        let akey = session.akey.clone();
        let fetch = move || {
            let transport = Arc::clone(&transport);
            let akey = akey.clone();
            async move {
                let payload = transport
                    .request(endpoints::GET_EVENTS, json!({ "akey": akey }))
                    .await?;
                let batch: Vec<Value> = serde_json::from_value(payload)?;
                Ok(batch)
            }
        };
        debug!("starting event poller");
        self.event_poller = Some(Poller::start(
            self.config.event_poll_interval,
            fetch,
            self.events_tx.clone(),
        ));
    }

    /// Fetch the seating order for the current game, out of band.
    fn spawn_seat_fetch(&self) {
        let Some(game_id) = self.game_id else {
            return;
        };
        let transport = Arc::clone(&self.transport);
        let tx = self.fetch_tx.clone();
        tokio::spawn(async move {
            let result = transport
                .request(endpoints::GAME_GET_INFO, json!({ "game_id": game_id }))
                .await
                .and_then(|payload| {
                    serde_json::from_value::<Vec<Player>>(payload).map_err(TupeloError::from)
                });
            let _ = tx.send(Fetch::Seats(result));
        });
    }

    /// Fetch the full game state (status delta + hand), out of band.
    fn spawn_state_fetch(&self) {
        let Some(params) = self.game_params_map() else {
            return;
        };
        let transport = Arc::clone(&self.transport);
        let tx = self.fetch_tx.clone();
        tokio::spawn(async move {
            let result = transport
                .request(endpoints::GAME_GET_STATE, Value::Object(params))
                .await
                .and_then(|payload| {
                    serde_json::from_value::<StateResponse>(payload).map_err(TupeloError::from)
                });
            let _ = tx.send(Fetch::State(result));
        });
    }

    // ── Small helpers ───────────────────────────────────────────────

    /// Base parameters for an authenticated in-game request.
    fn game_params_map(&self) -> Option<Map<String, Value>> {
        let session = self.session.as_ref()?;
        let game_id = self.game_id?;
        let mut params = Map::new();
        params.insert("akey".into(), json!(session.akey));
        params.insert("game_id".into(), json!(game_id));
        Some(params)
    }

    fn game_params(&self) -> Option<Value> {
        self.game_params_map().map(Value::Object)
    }

    fn set_my_turn(&mut self, my_turn: bool) {
        self.my_turn = my_turn;
        self.shared.my_turn.store(my_turn, Ordering::Release);
    }

    async fn set_game_id(&mut self, game_id: Option<GameId>) {
        self.game_id = game_id;
        *self.shared.game_id.lock().await = game_id;
    }

    async fn set_session(&mut self, session: Option<Session>) {
        *self.shared.player_name.lock().await = session.as_ref().map(|s| s.name.clone());
        self.session = session;
    }

    /// Emit a UI event. If the channel is full, log and drop the event to
    /// avoid blocking the loop.
    fn emit(&self, event: UiEvent) {
        match self.ui_tx.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(dropped)) => {
                warn!(
                    "ui channel full, dropping event: {:?}",
                    std::mem::discriminant(&dropped)
                );
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!("ui channel closed, receiver dropped");
            }
        }
    }
}

/// Future the drain branch of the select loop awaits.
async fn drain_wake(wake: Option<Wake>) {
    match wake {
        Some(Wake::Now) => {}
        Some(Wake::At(instant)) => tokio::time::sleep_until(instant).await,
        None => std::future::pending().await,
    }
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
    use async_trait::async_trait;
    use std::collections::{HashMap, VecDeque};
    use std::sync::Mutex as StdMutex;

    /// Scripted request/response transport. Unscripted endpoints answer with
    /// benign defaults (empty listings, empty event batches).
    struct ScriptedTransport {
        responses: StdMutex<HashMap<String, VecDeque<Result<Value>>>>,
        calls: Arc<StdMutex<Vec<(String, Value)>>>,
    }

    impl ScriptedTransport {
        fn new() -> (Self, Arc<StdMutex<Vec<(String, Value)>>>) {
            let calls = Arc::new(StdMutex::new(Vec::new()));
            (
                Self {
                    responses: StdMutex::new(HashMap::new()),
                    calls: Arc::clone(&calls),
                },
                calls,
            )
        }

        fn script(self, endpoint: &str, result: Result<Value>) -> Self {
            self.responses
                .lock()
                .unwrap()
                .entry(endpoint.to_string())
                .or_default()
                .push_back(result);
            self
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
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
            match endpoint {
                endpoints::HELLO => Ok(json!({ "version": "test" })),
                endpoints::GET_EVENTS => Ok(json!([])),
                endpoints::GAME_LIST => Ok(json!([])),
                endpoints::PLAYER_LIST => Ok(json!([])),
                endpoints::GAME_GET_INFO => Ok(json!([])),
                endpoints::GAME_GET_STATE => Ok(json!({})),
                _ => Ok(Value::Null),
            }
        }
    }

    fn register_ok() -> Result<Value> {
        Ok(json!({ "id": PlayerId::from_u128(1), "akey": "key-1" }))
    }

    async fn recv_until<F>(rx: &mut mpsc::Receiver<UiEvent>, mut want: F) -> UiEvent
    where
        F: FnMut(&UiEvent) -> bool,
    {
        loop {
            let event = rx.recv().await.expect("ui channel closed early");
            if want(&event) {
                return event;
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn lobby_batch_in_flight_at_quit_is_dropped() {
        let (transport, _calls) = ScriptedTransport::new();
        let (ui_tx, mut ui_rx) = mpsc::channel(16);
        let shared = Arc::new(SharedState::new());
        let (mut client_loop, _lobby_rx, _events_rx, _fetch_rx) =
            ClientLoop::new(Arc::new(transport), TupeloConfig::new(), shared, ui_tx);

        // A listing delivered while in the lobby reaches the UI.
        client_loop.phase = AppPhase::Registered;
        client_loop.on_lobby_poll(PollResult::Fetched((Vec::new(), Vec::new())));
        assert!(matches!(ui_rx.try_recv(), Ok(UiEvent::LobbyGames { .. })));
        assert!(matches!(ui_rx.try_recv(), Ok(UiEvent::LobbyPlayers { .. })));

        // One already in the channel when the session ended does not.
        client_loop.phase = AppPhase::Anonymous;
        client_loop.on_lobby_poll(PollResult::Fetched((Vec::new(), Vec::new())));
        assert!(ui_rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn config_defaults() {
        let config = TupeloConfig::new();
        assert_eq!(config.lobby_poll_interval, Duration::from_secs(5));
        assert_eq!(config.event_poll_interval, Duration::from_secs(2));
        assert_eq!(config.reveal_delay, Duration::from_millis(500));
        assert_eq!(config.table_clear_timeout, Duration::from_secs(5));
        assert_eq!(config.ui_channel_capacity, 256);
        assert_eq!(config.shutdown_timeout, Duration::from_secs(1));
        assert!(config.session_store.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn ui_channel_capacity_is_clamped_to_one() {
        let config = TupeloConfig::new().with_ui_channel_capacity(0);
        assert_eq!(config.ui_channel_capacity, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn register_transitions_to_registered() {
        let (transport, calls) = ScriptedTransport::new();
        let transport = transport.script(endpoints::PLAYER_REGISTER, register_ok());

        let (mut client, mut ui) = TupeloClient::start(transport, TupeloConfig::new());
        client.register("Alice").unwrap();

        let event = recv_until(&mut ui, |e| matches!(e, UiEvent::Registered { .. })).await;
        if let UiEvent::Registered { player_id } = event {
            assert_eq!(player_id, PlayerId::from_u128(1));
        }
        let event = recv_until(&mut ui, |e| matches!(e, UiEvent::PhaseChanged { .. })).await;
        assert!(matches!(
            event,
            UiEvent::PhaseChanged {
                phase: AppPhase::Registered
            }
        ));
        assert_eq!(client.phase(), AppPhase::Registered);
        assert_eq!(client.player_name().await.as_deref(), Some("Alice"));

        // The lobby poller fetched at least once.
        let _ = recv_until(&mut ui, |e| matches!(e, UiEvent::LobbyGames { .. })).await;
        {
            let calls = calls.lock().unwrap();
            assert!(calls.iter().any(|(ep, _)| ep == endpoints::GAME_LIST));
        }

        client.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn register_rejection_is_surfaced() {
        let (transport, _calls) = ScriptedTransport::new();
        let transport = transport.script(
            endpoints::PLAYER_REGISTER,
            Err(TupeloError::Rejected("name taken".into())),
        );

        let (mut client, mut ui) = TupeloClient::start(transport, TupeloConfig::new());
        client.register("Alice").unwrap();

        let event = recv_until(&mut ui, |e| matches!(e, UiEvent::Rejected { .. })).await;
        if let UiEvent::Rejected { message } = event {
            assert_eq!(message, "name taken");
        }
        assert_eq!(client.phase(), AppPhase::Anonymous);

        client.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn create_game_without_session_is_rejected_locally() {
        let (transport, calls) = ScriptedTransport::new();
        let (mut client, mut ui) = TupeloClient::start(transport, TupeloConfig::new());

        client.create_game().unwrap();
        let event = recv_until(&mut ui, |e| matches!(e, UiEvent::Rejected { .. })).await;
        if let UiEvent::Rejected { message } = event {
            assert_eq!(message, "register first");
        }
        {
            let calls = calls.lock().unwrap();
            assert!(!calls.iter().any(|(ep, _)| ep == endpoints::GAME_CREATE));
        }

        client.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn closed_is_last_event_after_shutdown() {
        let (transport, _calls) = ScriptedTransport::new();
        let (mut client, mut ui) = TupeloClient::start(transport, TupeloConfig::new());

        client.shutdown().await;
        assert!(!client.is_running());

        let mut saw_closed = false;
        while let Some(event) = ui.recv().await {
            saw_closed = matches!(event, UiEvent::Closed { .. });
        }
        assert!(saw_closed, "Closed must be the final event");
    }

    #[tokio::test(start_paused = true)]
    async fn commands_fail_after_shutdown() {
        let (transport, _calls) = ScriptedTransport::new();
        let (mut client, mut ui) = TupeloClient::start(transport, TupeloConfig::new());

        client.shutdown().await;
        while ui.try_recv().is_ok() {}

        let result = client.register("late");
        assert!(matches!(result, Err(TupeloError::ClientClosed)));
    }

    #[tokio::test(start_paused = true)]
    async fn double_shutdown_does_not_panic() {
        let (transport, _calls) = ScriptedTransport::new();
        let (mut client, _ui) = TupeloClient::start(transport, TupeloConfig::new());
        client.shutdown().await;
        client.shutdown().await; // no-op
    }

    #[tokio::test(start_paused = true)]
    async fn drop_without_explicit_shutdown() {
        let (transport, _calls) = ScriptedTransport::new();
        let (client, mut ui) = TupeloClient::start(transport, TupeloConfig::new());

        drop(client);

        // The loop is aborted; the channel closes without hanging. The final
        // Closed event may or may not make it out depending on abort timing.
        while let Some(_event) = ui.recv().await {}
    }

    #[tokio::test(start_paused = true)]
    async fn debug_impl_for_client() {
        let (transport, _calls) = ScriptedTransport::new();
        let (mut client, _ui) = TupeloClient::start(transport, TupeloConfig::new());

        let debug_str = format!("{client:?}");
        assert!(debug_str.contains("TupeloClient"));
        assert!(debug_str.contains("running"));

        client.shutdown().await;
    }
}
