//! Synthetic opponent: a timer-driven task that fabricates progress

use std::time::Duration;

use rand::Rng;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::debug;
use uuid::Uuid;

use super::server::Command;

/// Typing speed range a bot is sampled from, once at creation
pub const BOT_WPM_MIN: f32 = 35.0;
pub const BOT_WPM_MAX: f32 = 60.0;

/// Standard characters-per-word heuristic for WPM math
pub const CHARS_PER_WORD: f32 = 5.0;

pub fn sample_bot_wpm() -> f32 {
    rand::thread_rng().gen_range(BOT_WPM_MIN..=BOT_WPM_MAX)
}

/// Spawn the simulator loop for a bot-populated room.
///
/// Each tick converts elapsed wall-clock time at the bot's fixed WPM
/// into a percentage of the passage (chars / 5 words), clamped to 100,
/// and reports it as a `BotProgress` command. The scale here is
/// [0, 100]; the event loop normalizes to the canonical [0, 1] before
/// storing or broadcasting.
///
/// The task exits on its own once it reports 100%. The room aborts the
/// returned handle when it is destroyed first, and the event loop drops
/// any tick that arrives for a room that is gone or no longer racing.
pub fn spawn_simulator(
    room_id: String,
    bot_id: Uuid,
    wpm: f32,
    passage_chars: usize,
    tick: Duration,
    cmd_tx: mpsc::UnboundedSender<Command>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let passage_words = (passage_chars as f32 / CHARS_PER_WORD).max(1.0);
        let started = tokio::time::Instant::now();

        let mut ticker = interval(tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // The first interval tick completes immediately; skip it so the
        // first report carries nonzero progress.
        ticker.tick().await;

        loop {
            ticker.tick().await;

            let minutes = started.elapsed().as_secs_f32() / 60.0;
            let percent = (wpm * minutes / passage_words * 100.0).min(100.0);

            let sent = cmd_tx.send(Command::BotProgress {
                room_id: room_id.clone(),
                bot_id,
                wpm,
                percent,
            });
            if sent.is_err() {
                // Event loop is gone; nothing left to report to.
                break;
            }

            if percent >= 100.0 {
                debug!(room_id = %room_id, "bot finished its passage");
                break;
            }
        }
    })
}
