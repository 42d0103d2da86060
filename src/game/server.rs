//! The game event loop: every mutation of players, rooms and the queue
//! happens on this single task
//!
//! Connection handlers, fallback timers and bot simulators all talk to
//! the loop through one command channel. Each command runs to completion
//! before the next, which is what makes "pair the queued player" vs.
//! "fallback timer fired" a single atomic decision: whichever command is
//! processed first removes the queue entry, and the loser observes it
//! gone and does nothing.

use std::time::Duration;

use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::game::bot;
use crate::game::gateway::BroadcastGateway;
use crate::game::player::{Player, PlayerRegistry};
use crate::game::queue::MatchmakingQueue;
use crate::game::room::{RoomError, RoomStatus, RoomStore};
use crate::game::texts::pick_random_passage;
use crate::store::StatsStore;
use crate::ws::protocol::{ClientMsg, PlayerInfo, ServerMsg};

/// How long a queued player waits before being matched against a bot
pub const MATCH_FALLBACK_WAIT: Duration = Duration::from_secs(5);

/// How often a bot simulator reports progress
pub const BOT_TICK_INTERVAL: Duration = Duration::from_millis(500);

/// Timing knobs, injectable so tests can shrink the windows
#[derive(Debug, Clone)]
pub struct GameTimings {
    pub match_fallback_wait: Duration,
    pub bot_tick_interval: Duration,
}

impl Default for GameTimings {
    fn default() -> Self {
        Self {
            match_fallback_wait: MATCH_FALLBACK_WAIT,
            bot_tick_interval: BOT_TICK_INTERVAL,
        }
    }
}

/// Commands processed by the event loop
#[derive(Debug)]
pub enum Command {
    /// A WebSocket connection opened; register its outbound sender
    Connect {
        conn_id: Uuid,
        sender: mpsc::UnboundedSender<ServerMsg>,
    },

    /// The transport closed; run the full cleanup sequence
    Disconnect { conn_id: Uuid },

    /// A parsed client message
    Inbound { conn_id: Uuid, msg: ClientMsg },

    /// A matchmaking fallback timer fired
    QueueTimeout { conn_id: Uuid },

    /// A bot simulator tick; `percent` is on the [0, 100] scale and is
    /// normalized here before storage
    BotProgress {
        room_id: String,
        bot_id: Uuid,
        wpm: f32,
        percent: f32,
    },

    /// Gauges for the health endpoint
    Stats { reply: oneshot::Sender<GameStats> },
}

/// Point-in-time gauges reported by the loop
#[derive(Debug, Clone, Default, Serialize)]
pub struct GameStats {
    pub connected_players: usize,
    pub active_rooms: usize,
    pub racing_rooms: usize,
    pub queue_size: usize,
}

/// Cheap-to-clone handle for sending commands into the loop
#[derive(Clone)]
pub struct GameHandle {
    tx: mpsc::UnboundedSender<Command>,
}

impl GameHandle {
    /// Spawn the event loop task and return its handle.
    pub fn spawn(stats: StatsStore, timings: GameTimings) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let server = GameServer {
            registry: PlayerRegistry::new(),
            rooms: RoomStore::new(),
            queue: MatchmakingQueue::new(),
            gateway: BroadcastGateway::new(),
            stats,
            timings,
            cmd_tx: tx.clone(),
            cmd_rx: rx,
        };
        tokio::spawn(server.run());
        Self { tx }
    }

    pub fn connect(&self, conn_id: Uuid, sender: mpsc::UnboundedSender<ServerMsg>) {
        let _ = self.tx.send(Command::Connect { conn_id, sender });
    }

    pub fn disconnect(&self, conn_id: Uuid) {
        let _ = self.tx.send(Command::Disconnect { conn_id });
    }

    pub fn inbound(&self, conn_id: Uuid, msg: ClientMsg) {
        let _ = self.tx.send(Command::Inbound { conn_id, msg });
    }

    pub async fn stats(&self) -> GameStats {
        let (reply, rx) = oneshot::channel();
        if self.tx.send(Command::Stats { reply }).is_err() {
            return GameStats::default();
        }
        rx.await.unwrap_or_default()
    }
}

/// State owned by the loop task. Nothing outside this struct mutates
/// the registry, room store or queue.
struct GameServer {
    registry: PlayerRegistry,
    rooms: RoomStore,
    queue: MatchmakingQueue,
    gateway: BroadcastGateway,
    stats: StatsStore,
    timings: GameTimings,
    /// Cloned into fallback timers and bot simulators
    cmd_tx: mpsc::UnboundedSender<Command>,
    cmd_rx: mpsc::UnboundedReceiver<Command>,
}

impl GameServer {
    async fn run(mut self) {
        info!("game event loop started");
        while let Some(cmd) = self.cmd_rx.recv().await {
            self.handle(cmd);
        }
        info!("game event loop stopped");
    }

    fn handle(&mut self, cmd: Command) {
        match cmd {
            Command::Connect { conn_id, sender } => {
                self.gateway.register(conn_id, sender);
                debug!(%conn_id, "connection registered");
            }
            Command::Disconnect { conn_id } => self.handle_disconnect(conn_id),
            Command::Inbound { conn_id, msg } => self.handle_inbound(conn_id, msg),
            Command::QueueTimeout { conn_id } => self.handle_queue_timeout(conn_id),
            Command::BotProgress {
                room_id,
                bot_id,
                wpm,
                percent,
            } => self.handle_bot_progress(&room_id, bot_id, wpm, percent),
            Command::Stats { reply } => {
                let _ = reply.send(GameStats {
                    connected_players: self.gateway.connected(),
                    active_rooms: self.rooms.len(),
                    racing_rooms: self.rooms.racing_count(),
                    queue_size: self.queue.len(),
                });
            }
        }
    }

    fn handle_inbound(&mut self, conn_id: Uuid, msg: ClientMsg) {
        match msg {
            ClientMsg::JoinQueue { username } => self.handle_join_queue(conn_id, username),
            ClientMsg::CreateRoom { username } => self.handle_create_room(conn_id, username),
            ClientMsg::JoinRoom { room_id, username } => {
                self.handle_join_room(conn_id, &room_id, username)
            }
            ClientMsg::StartGame { room_id } => self.handle_start_game(conn_id, &room_id),
            ClientMsg::UpdateProgress { wpm, progress } => {
                self.handle_update_progress(conn_id, wpm, progress)
            }
        }
    }

    // ------------------------------------------------------------------
    // Matchmaking
    // ------------------------------------------------------------------

    fn handle_join_queue(&mut self, conn_id: Uuid, username: String) {
        if self.queue.contains(&conn_id) {
            debug!(%conn_id, "already queued, ignoring join_queue");
            return;
        }

        let username = self.ensure_player(conn_id, username);
        self.leave_current_room(conn_id);
        self.spawn_upsert_user(username);

        // FIFO: the longest-waiting entry pairs first. Popping the entry
        // cancels its fallback timer.
        if let Some(opponent_id) = self.queue.pop_front() {
            self.start_quick_match(opponent_id, conn_id);
            return;
        }

        let timer = {
            let tx = self.cmd_tx.clone();
            let wait = self.timings.match_fallback_wait;
            tokio::spawn(async move {
                tokio::time::sleep(wait).await;
                let _ = tx.send(Command::QueueTimeout { conn_id });
            })
        };
        self.queue.push(conn_id, timer);
        info!(%conn_id, queue_size = self.queue.len(), "queued for matchmaking");
    }

    /// Pair two humans. The earlier-waiting player hosts; the race
    /// starts immediately, skipping the waiting phase.
    fn start_quick_match(&mut self, host_id: Uuid, joiner_id: Uuid) {
        let text = pick_random_passage();
        let room_id = {
            let room = self.rooms.create(host_id, text.clone(), RoomStatus::Racing);
            room.members.push(joiner_id);
            room.id.clone()
        };

        for id in [host_id, joiner_id] {
            if let Some(player) = self.registry.get_mut(&id) {
                player.reset_for_race(room_id.clone());
            }
        }

        let players = self.room_players(&room_id);
        if let Some(room) = self.rooms.get(&room_id) {
            self.gateway.send_to_room(
                room,
                ServerMsg::MatchFound {
                    match_id: room_id.clone(),
                    text,
                    players,
                },
            );
        }
        info!(room_id = %room_id, %host_id, %joiner_id, "quick match formed");
    }

    /// Fallback timer fired. If the entry is already gone the player was
    /// paired in the meantime and this is a no-op.
    fn handle_queue_timeout(&mut self, conn_id: Uuid) {
        if !self.queue.remove(&conn_id) {
            debug!(%conn_id, "fallback timer lost the race to a pairing, ignoring");
            return;
        }
        if !self.registry.contains(&conn_id) {
            return;
        }

        let text = pick_random_passage();
        let bot_id = Uuid::new_v4();
        let bot_name = format!("Bot_{}", &bot_id.to_string()[..4]);

        let room_id = {
            let room = self.rooms.create(conn_id, text.clone(), RoomStatus::Racing);
            room.members.push(bot_id);
            room.id.clone()
        };

        if let Some(player) = self.registry.get_mut(&conn_id) {
            player.reset_for_race(room_id.clone());
        }
        self.registry
            .insert(Player::new_bot(bot_id, bot_name, room_id.clone()));

        let players = self.room_players(&room_id);
        self.gateway.send_to(
            &conn_id,
            ServerMsg::MatchFound {
                match_id: room_id.clone(),
                text: text.clone(),
                players,
            },
        );

        let wpm = bot::sample_bot_wpm();
        let task = bot::spawn_simulator(
            room_id.clone(),
            bot_id,
            wpm,
            text.chars().count(),
            self.timings.bot_tick_interval,
            self.cmd_tx.clone(),
        );
        if let Some(room) = self.rooms.get_mut(&room_id) {
            room.bot_task = Some(task);
        }

        info!(room_id = %room_id, %conn_id, bot_wpm = wpm, "bot fallback match formed");
    }

    // ------------------------------------------------------------------
    // Rooms
    // ------------------------------------------------------------------

    fn handle_create_room(&mut self, conn_id: Uuid, username: String) {
        let username = self.ensure_player(conn_id, username);
        self.queue.remove(&conn_id);
        self.leave_current_room(conn_id);
        self.spawn_upsert_user(username.clone());

        let text = pick_random_passage();
        let room_id = self
            .rooms
            .create(conn_id, text, RoomStatus::Waiting)
            .id
            .clone();
        if let Some(player) = self.registry.get_mut(&conn_id) {
            player.reset_for_race(room_id.clone());
        }

        self.gateway.send_to(
            &conn_id,
            ServerMsg::RoomCreated {
                room_id: room_id.clone(),
            },
        );
        self.broadcast_room_update(&room_id);
        info!(room_id = %room_id, %conn_id, %username, "room created");
    }

    fn handle_join_room(&mut self, conn_id: Uuid, room_id: &str, username: String) {
        // Validate before touching the player's current membership, so a
        // failed join leaves them where they were.
        let status = self.rooms.get(room_id).map(|r| r.status);
        let err = match status {
            None => Some(RoomError::NotFound),
            Some(RoomStatus::Waiting) => None,
            Some(_) => Some(RoomError::NotJoinable),
        };
        if let Some(err) = err {
            debug!(room_id, %conn_id, error = %err, "join rejected");
            self.gateway.send_to(
                &conn_id,
                ServerMsg::RoomError {
                    message: err.to_string(),
                },
            );
            return;
        }

        let username = self.ensure_player(conn_id, username);
        self.queue.remove(&conn_id);

        let current = self
            .registry
            .get(&conn_id)
            .and_then(|p| p.room_id.clone());
        if current.as_deref() != Some(room_id) {
            self.leave_current_room(conn_id);
        }
        self.spawn_upsert_user(username.clone());

        if let Err(err) = self.rooms.join(room_id, conn_id) {
            self.gateway.send_to(
                &conn_id,
                ServerMsg::RoomError {
                    message: err.to_string(),
                },
            );
            return;
        }
        if let Some(player) = self.registry.get_mut(&conn_id) {
            player.reset_for_race(room_id.to_string());
        }

        let players = self.room_players(room_id);
        self.gateway.send_to(
            &conn_id,
            ServerMsg::RoomJoined {
                room_id: room_id.to_string(),
                players: players.clone(),
            },
        );
        if let Some(room) = self.rooms.get(room_id) {
            self.gateway
                .send_to_room(room, ServerMsg::RoomUpdate { players });
        }
        info!(room_id, %conn_id, %username, "player joined room");
    }

    /// Host-only capability check; everything else degrades silently.
    fn handle_start_game(&mut self, conn_id: Uuid, room_id: &str) {
        let Some(room) = self.rooms.get_mut(room_id) else {
            debug!(room_id, "start_game for unknown room, ignoring");
            return;
        };
        if !room.is_host(&conn_id) {
            debug!(room_id, %conn_id, "start_game from non-host, ignoring");
            return;
        }
        if !room.start() {
            debug!(room_id, "start_game on non-waiting room, ignoring");
            return;
        }

        let msg = ServerMsg::GameStarted {
            match_id: room.id.clone(),
            text: room.text.clone(),
        };
        self.gateway.send_to_room(room, msg);
        info!(room_id, "race started by host");
    }

    // ------------------------------------------------------------------
    // Progress
    // ------------------------------------------------------------------

    fn handle_update_progress(&mut self, conn_id: Uuid, wpm: f32, progress: f32) {
        let Some(player) = self.registry.get_mut(&conn_id) else {
            debug!(%conn_id, "progress from unregistered connection, ignoring");
            return;
        };
        let Some(room_id) = player.room_id.clone() else {
            return;
        };

        let just_finished = player.apply_progress(wpm, progress);
        let update = ServerMsg::OpponentProgress {
            player_id: conn_id,
            username: player.username.clone(),
            wpm: player.wpm,
            progress: player.progress,
        };
        let username = player.username.clone();
        let final_wpm = player.wpm;

        // Broadcast is unconditional, not just on finish, and never
        // waits on the stats store.
        if let Some(room) = self.rooms.get(&room_id) {
            self.gateway.send_to_room_except(room, &conn_id, update);
        }

        if just_finished {
            self.spawn_record_completion(username, final_wpm);
            self.finish_room_if_done(&room_id);
        }
    }

    /// A bot tick. Rooms can be deleted out-of-band (human disconnects),
    /// so liveness is re-checked on every tick.
    fn handle_bot_progress(&mut self, room_id: &str, bot_id: Uuid, wpm: f32, percent: f32) {
        match self.rooms.get(room_id) {
            Some(room) if room.status == RoomStatus::Racing => {}
            _ => return,
        }

        // Normalize the simulator's percent scale to the canonical [0, 1].
        let progress = (percent / 100.0).clamp(0.0, 1.0);
        let Some(bot) = self.registry.get_mut(&bot_id) else {
            return;
        };
        let just_finished = bot.apply_progress(wpm, progress);
        let update = ServerMsg::OpponentProgress {
            player_id: bot_id,
            username: bot.username.clone(),
            wpm: bot.wpm,
            progress: bot.progress,
        };

        if let Some(room) = self.rooms.get(room_id) {
            self.gateway.send_to_room_except(room, &bot_id, update);
        }
        if just_finished {
            self.finish_room_if_done(room_id);
        }
    }

    /// Racing -> Finished once every member has crossed the line.
    fn finish_room_if_done(&mut self, room_id: &str) {
        let all_finished = match self.rooms.get(room_id) {
            Some(room) if room.status == RoomStatus::Racing => room
                .members
                .iter()
                .all(|m| self.registry.get(m).is_some_and(|p| p.is_finished)),
            _ => return,
        };
        if !all_finished {
            return;
        }
        if let Some(room) = self.rooms.get_mut(room_id) {
            room.finish();
            room.abort_bot_task();
            info!(room_id, "race finished");
        }
    }

    // ------------------------------------------------------------------
    // Departure and disconnect
    // ------------------------------------------------------------------

    /// The full cleanup sequence, processed as one atomic step: dequeue,
    /// leave the room, drop the outbound sender, and remove the registry
    /// entry last so in-flight timer commands never see a dangling state.
    fn handle_disconnect(&mut self, conn_id: Uuid) {
        self.queue.remove(&conn_id);
        self.leave_current_room(conn_id);
        self.gateway.unregister(&conn_id);
        if self.registry.remove(&conn_id).is_some() {
            info!(%conn_id, "player disconnected");
        }
    }

    /// Remove the player from their current room, deleting the room when
    /// no human member remains (a bot alone does not keep a room alive).
    fn leave_current_room(&mut self, conn_id: Uuid) {
        let Some(room_id) = self.registry.get(&conn_id).and_then(|p| p.room_id.clone()) else {
            return;
        };
        if let Some(player) = self.registry.get_mut(&conn_id) {
            player.room_id = None;
        }

        let remaining = {
            let Some(room) = self.rooms.get_mut(&room_id) else {
                return;
            };
            room.members.retain(|m| *m != conn_id);
            room.members.clone()
        };

        let humans_left = remaining
            .iter()
            .any(|m| self.registry.get(m).is_some_and(|p| !p.is_bot));

        if !humans_left {
            self.rooms.remove(&room_id);
            for member in remaining {
                self.registry.remove(&member);
            }
            info!(room_id = %room_id, "room deleted");
        } else {
            self.broadcast_room_update(&room_id);
        }
    }

    // ------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------

    /// Make sure a registry record exists; blank usernames become a
    /// generated guest label. Returns the effective username.
    fn ensure_player(&mut self, conn_id: Uuid, username: String) -> String {
        let trimmed = username.trim();
        let name = if trimmed.is_empty() {
            format!("Guest_{}", &conn_id.to_string()[..8])
        } else {
            trimmed.to_string()
        };

        match self.registry.get_mut(&conn_id) {
            Some(player) => player.username = name.clone(),
            None => self.registry.insert(Player::new(conn_id, name.clone())),
        }
        name
    }

    fn room_players(&self, room_id: &str) -> Vec<PlayerInfo> {
        self.rooms
            .get(room_id)
            .map(|room| {
                room.members
                    .iter()
                    .filter_map(|m| self.registry.get(m))
                    .map(Player::info)
                    .collect()
            })
            .unwrap_or_default()
    }

    fn broadcast_room_update(&self, room_id: &str) {
        let players = self.room_players(room_id);
        if let Some(room) = self.rooms.get(room_id) {
            self.gateway
                .send_to_room(room, ServerMsg::RoomUpdate { players });
        }
    }

    fn spawn_upsert_user(&self, username: String) {
        if !self.stats.is_enabled() {
            return;
        }
        let stats = self.stats.clone();
        tokio::spawn(async move {
            if let Err(e) = stats.upsert_user(&username).await {
                warn!(%username, error = %e, "stats upsert failed");
            }
        });
    }

    fn spawn_record_completion(&self, username: String, wpm: f32) {
        if !self.stats.is_enabled() {
            return;
        }
        let stats = self.stats.clone();
        tokio::spawn(async move {
            if let Err(e) = stats.record_race_completion(&username, wpm).await {
                warn!(%username, error = %e, "stats completion update failed");
            }
        });
    }
}
