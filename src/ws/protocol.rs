//! WebSocket protocol message definitions
//! These are the wire types for client-server communication
//!
//! The `type` tag is snake_case; payload fields are camelCase, matching
//! the web client's existing wire format.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Messages sent from client to server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMsg {
    /// Enter the matchmaking queue
    JoinQueue { username: String },

    /// Create a private room and become its host
    CreateRoom { username: String },

    /// Join an existing room by id
    #[serde(rename_all = "camelCase")]
    JoinRoom { room_id: String, username: String },

    /// Start the race (host only; silently ignored for everyone else)
    #[serde(rename_all = "camelCase")]
    StartGame { room_id: String },

    /// Report typing progress for the current race
    UpdateProgress {
        /// Words per minute
        wpm: f32,
        /// Fraction of the passage completed, in [0, 1]
        progress: f32,
    },
}

/// Messages sent from server to client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMsg {
    /// Matchmaking produced a race; sent to both matched parties
    #[serde(rename_all = "camelCase")]
    MatchFound {
        match_id: String,
        text: String,
        players: Vec<PlayerInfo>,
    },

    /// Room created; sent to the creator
    #[serde(rename_all = "camelCase")]
    RoomCreated { room_id: String },

    /// Confirmation of a room join; sent to the joiner
    #[serde(rename_all = "camelCase")]
    RoomJoined {
        room_id: String,
        players: Vec<PlayerInfo>,
    },

    /// Current member list; sent to the whole room
    RoomUpdate { players: Vec<PlayerInfo> },

    /// The race has started; sent to the whole room
    #[serde(rename_all = "camelCase")]
    GameStarted { match_id: String, text: String },

    /// Another member's progress changed; sent to the room minus the sender
    #[serde(rename_all = "camelCase")]
    OpponentProgress {
        player_id: Uuid,
        username: String,
        wpm: f32,
        progress: f32,
    },

    /// A room operation failed; sent to the requester only
    RoomError { message: String },
}

/// Player entry in lobby/room payloads
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerInfo {
    pub id: Uuid,
    pub username: String,
    pub wpm: f32,
    pub progress: f32,
    pub is_finished: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_msg_uses_snake_case_tag_and_camel_case_fields() {
        let msg: ClientMsg =
            serde_json::from_str(r#"{"type":"join_room","roomId":"AB12CD","username":"alice"}"#)
                .unwrap();
        match msg {
            ClientMsg::JoinRoom { room_id, username } => {
                assert_eq!(room_id, "AB12CD");
                assert_eq!(username, "alice");
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn server_msg_serializes_camel_case_payload() {
        let msg = ServerMsg::GameStarted {
            match_id: "XYZ789".to_string(),
            text: "hello".to_string(),
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains(r#""type":"game_started""#));
        assert!(json.contains(r#""matchId":"XYZ789""#));
    }

    #[test]
    fn player_info_is_finished_is_camel_case() {
        let info = PlayerInfo {
            id: Uuid::new_v4(),
            username: "bob".to_string(),
            wpm: 42.0,
            progress: 0.5,
            is_finished: false,
        };
        let json = serde_json::to_string(&info).unwrap();
        assert!(json.contains(r#""isFinished":false"#));
    }
}
