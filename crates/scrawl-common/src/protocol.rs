use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::net::TcpStream;
use tokio_util::codec::{Framed, LengthDelimitedCodec};
use uuid::Uuid;

use crate::game::GameStateView;
use crate::member::MemberInfo;

// -- Framing --

pub type Transport = Framed<TcpStream, LengthDelimitedCodec>;

pub fn framed_transport(stream: TcpStream) -> Transport {
    // full-canvas snapshots ride in a single frame, so the cap is generous
    LengthDelimitedCodec::builder()
        .max_frame_length(4 * 1024 * 1024)
        .new_framed(stream)
}

// -- Shared payload types --

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoomMode {
    Professional,
    Fun,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DrawSegment {
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
    pub color: String,
    pub line_width: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatKind {
    User,
    System,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoundEndReason {
    Time,
    Guess,
}

// -- Client -> Server Events --

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ClientEvent {
    // Handshake
    Hello {
        user_name: String,
        version: String,
    },

    // Room membership. Mode and host flag carry the room registry's
    // verdict; the session trusts a caller that already passed it.
    JoinRoom {
        room_code: String,
        mode: RoomMode,
        is_host: bool,
    },
    LeaveRoom,

    // Drawing
    Draw(DrawSegment),
    CanvasStateUpdate {
        snapshot: String,
    },
    ClearCanvas,
    Undo {
        snapshot: Option<String>,
    },

    // Presence
    CursorMove {
        x: f32,
        y: f32,
    },
    CursorLeave,

    // Host controls
    SetLock {
        locked: bool,
    },
    StartGame,
    EndGame,

    // Chat (doubles as the guess channel in fun mode)
    Chat {
        message: String,
    },

    // Connection
    Ping,
    Disconnect,
}

// -- Server -> Client Events --

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ServerEvent {
    // Handshake
    Welcome {
        id: Uuid,
        color: String,
        server_version: String,
    },
    HandshakeError {
        reason: String,
    },

    // Membership
    UsersInRoom {
        users: Vec<MemberInfo>,
    },
    MemberJoined {
        user: MemberInfo,
    },
    MemberLeft {
        id: Uuid,
        user_name: String,
        color: String,
    },

    // Drawing
    Draw(DrawSegment),
    CanvasState {
        snapshot: Option<String>,
    },
    ClearCanvas,

    // Presence
    CursorMove {
        id: Uuid,
        user_name: String,
        color: String,
        x: f32,
        y: f32,
    },
    CursorLeave {
        id: Uuid,
    },

    // Lock
    LockChanged {
        locked: bool,
    },

    // Chat
    ChatMessage {
        id: Uuid,
        user_name: String,
        message: String,
        timestamp: i64,
        #[serde(rename = "type")]
        kind: ChatKind,
    },

    // Game
    GameState(GameStateView),
    TimerUpdate {
        time_left: u32,
    },
    CorrectGuess {
        user_name: String,
        word: String,
        points: u32,
    },
    RoundEnd {
        word: String,
        reason: RoundEndReason,
    },
    GameEnded,
    GameError {
        message: String,
    },

    // Connection
    Pong,
}

// -- Serialization helpers --

pub fn serialize_message<T: Serialize>(msg: &T) -> Result<Bytes, serde_json::Error> {
    let json = serde_json::to_vec(msg)?;
    Ok(Bytes::from(json))
}

pub fn deserialize_message<T: for<'de> Deserialize<'de>>(
    data: &[u8],
) -> Result<T, serde_json::Error> {
    serde_json::from_slice(data)
}

// -- Transport helpers --

pub async fn send_message<T: Serialize>(
    transport: &mut Transport,
    msg: &T,
) -> anyhow::Result<()> {
    let bytes = serialize_message(msg).map_err(|e| anyhow::anyhow!("serialize error: {}", e))?;
    transport
        .send(bytes.into())
        .await
        .map_err(|e| anyhow::anyhow!("send error: {}", e))
}

pub async fn recv_message<T: for<'de> Deserialize<'de>>(
    transport: &mut Transport,
) -> anyhow::Result<Option<T>> {
    match transport.next().await {
        Some(Ok(frame)) => {
            let msg = deserialize_message(&frame)
                .map_err(|e| anyhow::anyhow!("deserialize error: {}", e))?;
            Ok(Some(msg))
        }
        Some(Err(e)) => Err(anyhow::anyhow!("recv error: {}", e)),
        None => Ok(None),
    }
}
