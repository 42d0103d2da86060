//! End-to-end tests for the match orchestration core, driving the game
//! event loop through its handle with fake connections.
//!
//! Timer-dependent scenarios run under tokio's paused clock, so the
//! matchmaking fallback window and the bot's whole race elapse in
//! virtual time.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::timeout;
use uuid::Uuid;

use type_race_server::game::{GameHandle, GameTimings};
use type_race_server::store::StatsStore;
use type_race_server::ws::protocol::{ClientMsg, PlayerInfo, ServerMsg};

fn spawn_game() -> GameHandle {
    GameHandle::spawn(StatsStore::disabled(), GameTimings::default())
}

struct TestClient {
    conn_id: Uuid,
    rx: mpsc::UnboundedReceiver<ServerMsg>,
}

fn connect(game: &GameHandle) -> TestClient {
    let conn_id = Uuid::new_v4();
    let (tx, rx) = mpsc::unbounded_channel();
    game.connect(conn_id, tx);
    TestClient { conn_id, rx }
}

impl TestClient {
    async fn recv(&mut self) -> ServerMsg {
        timeout(Duration::from_secs(60), self.rx.recv())
            .await
            .expect("timed out waiting for server message")
            .expect("outbound channel closed")
    }

    fn try_recv(&mut self) -> Option<ServerMsg> {
        self.rx.try_recv().ok()
    }
}

/// Waits until every command sent so far has been processed: the stats
/// request goes through the same channel, so its reply is a barrier.
async fn settle(game: &GameHandle) {
    let _ = game.stats().await;
}

fn usernames(players: &[PlayerInfo]) -> Vec<&str> {
    players.iter().map(|p| p.username.as_str()).collect()
}

// ===========================================================================
// Rooms
// ===========================================================================

#[tokio::test]
async fn create_join_and_host_gated_start() {
    let game = spawn_game();
    let mut alice = connect(&game);
    let mut bob = connect(&game);

    game.inbound(
        alice.conn_id,
        ClientMsg::CreateRoom {
            username: "Alice".to_string(),
        },
    );

    let room_id = match alice.recv().await {
        ServerMsg::RoomCreated { room_id } => room_id,
        other => panic!("expected room_created, got {other:?}"),
    };
    match alice.recv().await {
        ServerMsg::RoomUpdate { players } => assert_eq!(usernames(&players), ["Alice"]),
        other => panic!("expected room_update, got {other:?}"),
    }

    game.inbound(
        bob.conn_id,
        ClientMsg::JoinRoom {
            room_id: room_id.clone(),
            username: "Bob".to_string(),
        },
    );

    match bob.recv().await {
        ServerMsg::RoomJoined {
            room_id: joined,
            players,
        } => {
            assert_eq!(joined, room_id);
            assert_eq!(usernames(&players), ["Alice", "Bob"]);
        }
        other => panic!("expected room_joined, got {other:?}"),
    }
    // Both room members receive the membership update.
    assert!(matches!(alice.recv().await, ServerMsg::RoomUpdate { .. }));
    assert!(matches!(bob.recv().await, ServerMsg::RoomUpdate { .. }));

    // Non-host start is silently ignored: no game_started, no error.
    game.inbound(
        bob.conn_id,
        ClientMsg::StartGame {
            room_id: room_id.clone(),
        },
    );
    settle(&game).await;
    assert!(alice.try_recv().is_none());
    assert!(bob.try_recv().is_none());

    // Host start reaches the whole room with the stored text.
    game.inbound(
        alice.conn_id,
        ClientMsg::StartGame {
            room_id: room_id.clone(),
        },
    );
    let (id_a, text_a) = match alice.recv().await {
        ServerMsg::GameStarted { match_id, text } => (match_id, text),
        other => panic!("expected game_started, got {other:?}"),
    };
    let (id_b, text_b) = match bob.recv().await {
        ServerMsg::GameStarted { match_id, text } => (match_id, text),
        other => panic!("expected game_started, got {other:?}"),
    };
    assert_eq!(id_a, room_id);
    assert_eq!(id_b, room_id);
    assert_eq!(text_a, text_b);
    assert!(!text_a.is_empty());
}

#[tokio::test]
async fn join_unknown_room_reports_error() {
    let game = spawn_game();
    let mut carol = connect(&game);

    game.inbound(
        carol.conn_id,
        ClientMsg::JoinRoom {
            room_id: "NOSUCH".to_string(),
            username: "Carol".to_string(),
        },
    );

    match carol.recv().await {
        ServerMsg::RoomError { message } => assert_eq!(message, "Room not found"),
        other => panic!("expected room_error, got {other:?}"),
    }
}

#[tokio::test]
async fn racing_room_rejects_joins() {
    let game = spawn_game();
    let mut alice = connect(&game);
    let mut carol = connect(&game);

    game.inbound(
        alice.conn_id,
        ClientMsg::CreateRoom {
            username: "Alice".to_string(),
        },
    );
    let room_id = match alice.recv().await {
        ServerMsg::RoomCreated { room_id } => room_id,
        other => panic!("expected room_created, got {other:?}"),
    };
    game.inbound(
        alice.conn_id,
        ClientMsg::StartGame {
            room_id: room_id.clone(),
        },
    );

    game.inbound(
        carol.conn_id,
        ClientMsg::JoinRoom {
            room_id,
            username: "Carol".to_string(),
        },
    );
    match carol.recv().await {
        ServerMsg::RoomError { message } => {
            assert_eq!(message, "Race already in progress");
        }
        other => panic!("expected room_error, got {other:?}"),
    }
}

// ===========================================================================
// Progress broadcast
// ===========================================================================

#[tokio::test]
async fn progress_broadcast_excludes_sender_and_is_unconditional() {
    let game = spawn_game();
    let mut alice = connect(&game);
    let mut bob = connect(&game);

    game.inbound(
        alice.conn_id,
        ClientMsg::CreateRoom {
            username: "Alice".to_string(),
        },
    );
    let room_id = match alice.recv().await {
        ServerMsg::RoomCreated { room_id } => room_id,
        other => panic!("expected room_created, got {other:?}"),
    };
    game.inbound(
        bob.conn_id,
        ClientMsg::JoinRoom {
            room_id: room_id.clone(),
            username: "Bob".to_string(),
        },
    );
    game.inbound(alice.conn_id, ClientMsg::StartGame { room_id });
    settle(&game).await;
    while alice.try_recv().is_some() {}
    while bob.try_recv().is_some() {}

    game.inbound(
        bob.conn_id,
        ClientMsg::UpdateProgress {
            wpm: 42.0,
            progress: 0.3,
        },
    );
    match alice.recv().await {
        ServerMsg::OpponentProgress {
            player_id,
            username,
            wpm,
            progress,
        } => {
            assert_eq!(player_id, bob.conn_id);
            assert_eq!(username, "Bob");
            assert_eq!(wpm, 42.0);
            assert_eq!(progress, 0.3);
        }
        other => panic!("expected opponent_progress, got {other:?}"),
    }
    // The sender never hears their own report.
    settle(&game).await;
    assert!(bob.try_recv().is_none());

    // Repeated reports at the finish line keep broadcasting.
    for _ in 0..2 {
        game.inbound(
            bob.conn_id,
            ClientMsg::UpdateProgress {
                wpm: 42.0,
                progress: 1.0,
            },
        );
        match alice.recv().await {
            ServerMsg::OpponentProgress { progress, .. } => assert_eq!(progress, 1.0),
            other => panic!("expected opponent_progress, got {other:?}"),
        }
    }
}

// ===========================================================================
// Matchmaking
// ===========================================================================

#[tokio::test(start_paused = true)]
async fn queue_pairs_fifo_before_any_fallback() {
    let game = spawn_game();
    let mut p1 = connect(&game);
    let mut p2 = connect(&game);

    game.inbound(
        p1.conn_id,
        ClientMsg::JoinQueue {
            username: "P1".to_string(),
        },
    );
    game.inbound(
        p2.conn_id,
        ClientMsg::JoinQueue {
            username: "P2".to_string(),
        },
    );

    let (id1, names1) = match p1.recv().await {
        ServerMsg::MatchFound {
            match_id, players, ..
        } => (match_id, players),
        other => panic!("expected match_found, got {other:?}"),
    };
    let (id2, names2) = match p2.recv().await {
        ServerMsg::MatchFound {
            match_id, players, ..
        } => (match_id, players),
        other => panic!("expected match_found, got {other:?}"),
    };

    assert_eq!(id1, id2);
    // The longest-waiting player is listed (and hosts) first.
    assert_eq!(usernames(&names1), ["P1", "P2"]);
    assert_eq!(usernames(&names2), ["P1", "P2"]);
}

#[tokio::test(start_paused = true)]
async fn paired_entry_never_spawns_a_bot() {
    let game = spawn_game();
    let mut p1 = connect(&game);
    let mut p2 = connect(&game);

    game.inbound(
        p1.conn_id,
        ClientMsg::JoinQueue {
            username: "P1".to_string(),
        },
    );
    game.inbound(
        p2.conn_id,
        ClientMsg::JoinQueue {
            username: "P2".to_string(),
        },
    );
    assert!(matches!(p1.recv().await, ServerMsg::MatchFound { .. }));
    assert!(matches!(p2.recv().await, ServerMsg::MatchFound { .. }));

    // Sleep far past the fallback window; the cancelled timers must not
    // produce a second match for either player.
    tokio::time::sleep(Duration::from_secs(30)).await;
    settle(&game).await;
    assert!(p1.try_recv().is_none());
    assert!(p2.try_recv().is_none());
}

#[tokio::test(start_paused = true)]
async fn duplicate_join_queue_is_ignored() {
    let game = spawn_game();
    let mut solo = connect(&game);

    for _ in 0..2 {
        game.inbound(
            solo.conn_id,
            ClientMsg::JoinQueue {
                username: "Solo".to_string(),
            },
        );
    }

    // Exactly one fallback match forms.
    assert!(matches!(solo.recv().await, ServerMsg::MatchFound { .. }));
    let mut extra_matches = 0;
    tokio::time::sleep(Duration::from_secs(30)).await;
    settle(&game).await;
    while let Some(msg) = solo.try_recv() {
        if matches!(msg, ServerMsg::MatchFound { .. }) {
            extra_matches += 1;
        }
    }
    assert_eq!(extra_matches, 0);
}

#[tokio::test(start_paused = true)]
async fn solo_queue_falls_back_to_a_bot_race() {
    let game = spawn_game();
    let mut solo = connect(&game);

    game.inbound(
        solo.conn_id,
        ClientMsg::JoinQueue {
            username: "Solo".to_string(),
        },
    );

    let players = match solo.recv().await {
        ServerMsg::MatchFound { players, .. } => players,
        other => panic!("expected match_found, got {other:?}"),
    };
    assert_eq!(players.len(), 2);
    assert_eq!(players[0].username, "Solo");
    assert!(players[1].username.starts_with("Bot_"));
    let bot_id = players[1].id;

    // Bot progress strictly increases on the [0, 1] scale until 100%.
    let mut last = 0.0_f32;
    loop {
        match solo.recv().await {
            ServerMsg::OpponentProgress {
                player_id,
                progress,
                ..
            } => {
                assert_eq!(player_id, bot_id);
                assert!(
                    progress > last,
                    "bot progress must strictly increase ({progress} after {last})"
                );
                assert!(progress <= 1.0);
                last = progress;
                if progress >= 1.0 {
                    break;
                }
            }
            other => panic!("expected opponent_progress, got {other:?}"),
        }
    }

    // After 100% the simulator stops; no further events for this room.
    tokio::time::sleep(Duration::from_secs(10)).await;
    settle(&game).await;
    assert!(solo.try_recv().is_none());
}

// ===========================================================================
// Disconnect cleanup
// ===========================================================================

#[tokio::test]
async fn disconnect_shrinks_then_deletes_the_room() {
    let game = spawn_game();
    let mut alice = connect(&game);
    let mut bob = connect(&game);
    let mut carol = connect(&game);

    game.inbound(
        alice.conn_id,
        ClientMsg::CreateRoom {
            username: "Alice".to_string(),
        },
    );
    let room_id = match alice.recv().await {
        ServerMsg::RoomCreated { room_id } => room_id,
        other => panic!("expected room_created, got {other:?}"),
    };
    game.inbound(
        bob.conn_id,
        ClientMsg::JoinRoom {
            room_id: room_id.clone(),
            username: "Bob".to_string(),
        },
    );
    game.inbound(
        alice.conn_id,
        ClientMsg::StartGame {
            room_id: room_id.clone(),
        },
    );
    settle(&game).await;
    while alice.try_recv().is_some() {}
    while bob.try_recv().is_some() {}

    // First disconnect: the survivor sees the shrunken member list.
    game.disconnect(alice.conn_id);
    match bob.recv().await {
        ServerMsg::RoomUpdate { players } => assert_eq!(usernames(&players), ["Bob"]),
        other => panic!("expected room_update, got {other:?}"),
    }

    // The room still exists (still racing, so a join is rejected as
    // in-progress rather than not-found).
    game.inbound(
        carol.conn_id,
        ClientMsg::JoinRoom {
            room_id: room_id.clone(),
            username: "Carol".to_string(),
        },
    );
    match carol.recv().await {
        ServerMsg::RoomError { message } => assert_eq!(message, "Race already in progress"),
        other => panic!("expected room_error, got {other:?}"),
    }

    // Last member leaves: the room is gone.
    game.disconnect(bob.conn_id);
    game.inbound(
        carol.conn_id,
        ClientMsg::JoinRoom {
            room_id,
            username: "Carol".to_string(),
        },
    );
    match carol.recv().await {
        ServerMsg::RoomError { message } => assert_eq!(message, "Room not found"),
        other => panic!("expected room_error, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn human_disconnect_tears_down_the_bot_room() {
    let game = spawn_game();
    let mut solo = connect(&game);

    game.inbound(
        solo.conn_id,
        ClientMsg::JoinQueue {
            username: "Solo".to_string(),
        },
    );
    assert!(matches!(solo.recv().await, ServerMsg::MatchFound { .. }));

    let stats = game.stats().await;
    assert_eq!(stats.active_rooms, 1);

    // A bot alone must not keep the room alive.
    game.disconnect(solo.conn_id);
    let stats = game.stats().await;
    assert_eq!(stats.active_rooms, 0);
    assert_eq!(stats.connected_players, 0);
}

#[tokio::test(start_paused = true)]
async fn queue_gauge_tracks_waiting_players() {
    let game = spawn_game();
    let waiting = connect(&game);

    game.inbound(
        waiting.conn_id,
        ClientMsg::JoinQueue {
            username: "Waiting".to_string(),
        },
    );
    let stats = game.stats().await;
    assert_eq!(stats.queue_size, 1);

    game.disconnect(waiting.conn_id);
    let stats = game.stats().await;
    assert_eq!(stats.queue_size, 0);
}
