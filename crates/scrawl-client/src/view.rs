use std::collections::HashMap;

use chrono::Utc;
use uuid::Uuid;

use scrawl_common::game::GameStateView;
use scrawl_common::member::MemberInfo;
use scrawl_common::protocol::{ChatKind, ServerEvent};

#[derive(Debug, Clone)]
pub struct ChatEntry {
    pub user_name: String,
    pub message: String,
    pub timestamp: i64,
    pub kind: ChatKind,
}

#[derive(Debug, Clone)]
pub struct CursorMark {
    pub user_name: String,
    pub color: String,
    pub x: f32,
    pub y: f32,
}

/// Local mirror of the room as the server narrates it. Drawing segments
/// are render-only and pass through untouched; the snapshot in
/// `canvas-state` carries canonical surface state.
#[derive(Debug, Default)]
pub struct RoomView {
    pub my_id: Option<Uuid>,
    pub my_color: Option<String>,
    pub users: Vec<MemberInfo>,
    pub canvas: Option<String>,
    pub locked: bool,
    pub chat: Vec<ChatEntry>,
    pub cursors: HashMap<Uuid, CursorMark>,
    pub game: Option<GameStateView>,
}

impl RoomView {
    pub fn apply(&mut self, event: &ServerEvent) {
        match event {
            ServerEvent::Welcome { id, color, .. } => {
                self.my_id = Some(*id);
                self.my_color = Some(color.clone());
            }
            ServerEvent::HandshakeError { .. } => {}

            ServerEvent::UsersInRoom { users } => {
                self.users = users.clone();
            }
            ServerEvent::MemberJoined { user } => {
                self.users.push(user.clone());
                self.system(format!("{} joined", user.user_name));
            }
            ServerEvent::MemberLeft { id, user_name, .. } => {
                self.users.retain(|u| u.id != *id);
                self.cursors.remove(id);
                self.system(format!("{} left", user_name));
            }

            ServerEvent::Draw(_) => {}
            ServerEvent::CanvasState { snapshot } => {
                self.canvas = snapshot.clone();
            }
            ServerEvent::ClearCanvas => {
                self.canvas = None;
            }

            ServerEvent::CursorMove {
                id,
                user_name,
                color,
                x,
                y,
            } => {
                self.cursors.insert(
                    *id,
                    CursorMark {
                        user_name: user_name.clone(),
                        color: color.clone(),
                        x: *x,
                        y: *y,
                    },
                );
            }
            ServerEvent::CursorLeave { id } => {
                self.cursors.remove(id);
            }

            ServerEvent::LockChanged { locked } => {
                self.locked = *locked;
            }

            ServerEvent::ChatMessage {
                user_name,
                message,
                timestamp,
                kind,
                ..
            } => {
                self.chat.push(ChatEntry {
                    user_name: user_name.clone(),
                    message: message.clone(),
                    timestamp: *timestamp,
                    kind: *kind,
                });
            }

            ServerEvent::GameState(view) => {
                self.game = Some(view.clone());
            }
            ServerEvent::TimerUpdate { time_left } => {
                if let Some(game) = &mut self.game {
                    game.time_left = *time_left;
                }
            }
            ServerEvent::CorrectGuess {
                user_name,
                word,
                points,
            } => {
                self.system(format!("{} guessed '{}' (+{} points)", user_name, word, points));
            }
            ServerEvent::RoundEnd { word, .. } => {
                self.system(format!("Round over, the word was '{}'", word));
            }
            ServerEvent::GameEnded => {
                self.game = None;
                self.system("Game ended".into());
            }
            ServerEvent::GameError { message } => {
                self.system(message.clone());
            }

            ServerEvent::Pong => {}
        }
    }

    /// Chat fans out to the other members only, so the sender records
    /// their own line locally.
    pub fn push_own_chat(&mut self, user_name: &str, message: &str) {
        self.chat.push(ChatEntry {
            user_name: user_name.to_string(),
            message: message.to_string(),
            timestamp: Utc::now().timestamp_millis(),
            kind: ChatKind::User,
        });
    }

    fn system(&mut self, message: String) {
        self.chat.push(ChatEntry {
            user_name: String::new(),
            message,
            timestamp: Utc::now().timestamp_millis(),
            kind: ChatKind::System,
        });
    }

    /// Compact status line for logging.
    pub fn describe(&self) -> String {
        let mut parts = vec![format!("{} members", self.users.len())];
        if self.locked {
            parts.push("locked".into());
        }
        if self.canvas.is_some() {
            parts.push("canvas set".into());
        }
        if let Some(game) = &self.game {
            parts.push(format!("round {} ({}s left)", game.round, game.time_left));
        }
        let user_lines = self.chat.iter().filter(|c| c.kind == ChatKind::User).count();
        if let Some(entry) = self.chat.last() {
            parts.push(format!(
                "{} chat lines, last '{}' at {}",
                user_lines, entry.message, entry.timestamp
            ));
        }
        if !self.cursors.is_empty() {
            let marks: Vec<String> = self
                .cursors
                .values()
                .map(|c| format!("{} {} ({:.0},{:.0})", c.user_name, c.color, c.x, c.y))
                .collect();
            parts.push(format!("cursors: {}", marks.join(", ")));
        }
        parts.join(", ")
    }
}
