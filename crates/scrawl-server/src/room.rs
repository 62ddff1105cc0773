use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::SeedableRng;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use uuid::Uuid;

use scrawl_common::game::{GameError, GameRound, MIN_PLAYERS};
use scrawl_common::member::MemberInfo;
use scrawl_common::protocol::{
    ChatKind, DrawSegment, RoomMode, RoundEndReason, ServerEvent,
};

use crate::relay;

const AUTO_ADVANCE_DELAY: Duration = Duration::from_secs(3);

pub struct RoomMember {
    pub info: MemberInfo,
    pub is_host: bool,
    pub joined_at: DateTime<Utc>,
    pub tx: mpsc::Sender<ServerEvent>,
}

/// Everything a connection supplies to enter a room. The host flag is
/// whatever the room registry issued at creation; the session trusts it.
#[derive(Clone)]
pub struct JoinRequest {
    pub id: Uuid,
    pub user_name: String,
    pub color: String,
    pub is_host: bool,
    pub tx: mpsc::Sender<ServerEvent>,
}

struct RoundTimer {
    task: JoinHandle<()>,
    gen: u64,
}

struct RoomInner {
    code: String,
    mode: RoomMode,
    /// Join order is load-bearing: drawer rotation walks this list.
    members: Vec<RoomMember>,
    canvas: Option<String>,
    locked: bool,
    game: Option<GameRound>,
    timer: Option<RoundTimer>,
    timer_gen: u64,
    retired: bool,
}

/// Handle to one room's serialized state. Clones share the session; every
/// mutation and broadcast goes through the inner mutex, so events for one
/// room apply strictly one at a time while other rooms stay concurrent.
#[derive(Clone)]
pub struct RoomSession {
    inner: Arc<Mutex<RoomInner>>,
}

impl RoomSession {
    pub fn new(code: String, mode: RoomMode) -> Self {
        Self {
            inner: Arc::new(Mutex::new(RoomInner {
                code,
                mode,
                members: Vec::new(),
                canvas: None,
                locked: false,
                game: None,
                timer: None,
                timer_gen: 0,
                retired: false,
            })),
        }
    }

    pub(crate) fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Add a member and push the room's current state to them: roster,
    /// canvas snapshot, lock flag, and (if a game exists) a view with the
    /// word redacted unless they are the drawer. Existing members get a
    /// `member-joined`. Returns false if this session was already removed
    /// from the directory; the caller should retry against a fresh one.
    pub async fn join(&self, req: JoinRequest) -> bool {
        let mut guard = self.inner.lock().await;
        let inner = &mut *guard;
        if inner.retired {
            return false;
        }
        if inner.members.iter().any(|m| m.info.id == req.id) {
            return true;
        }

        let member = RoomMember {
            info: MemberInfo {
                id: req.id,
                user_name: req.user_name,
                color: req.color,
            },
            is_host: req.is_host,
            joined_at: Utc::now(),
            tx: req.tx,
        };

        let roster: Vec<MemberInfo> = inner
            .members
            .iter()
            .map(|m| m.info.clone())
            .chain(std::iter::once(member.info.clone()))
            .collect();
        relay::send_to(&member, ServerEvent::UsersInRoom { users: roster });
        relay::send_to(
            &member,
            ServerEvent::CanvasState {
                snapshot: inner.canvas.clone(),
            },
        );
        relay::send_to(
            &member,
            ServerEvent::LockChanged {
                locked: inner.locked,
            },
        );
        if let Some(game) = &inner.game {
            relay::send_to(&member, ServerEvent::GameState(game.view_for(member.info.id)));
        }

        relay::fan_out(
            inner.members.iter(),
            None,
            &ServerEvent::MemberJoined {
                user: member.info.clone(),
            },
        );

        tracing::info!("'{}' joined room {}", member.info.user_name, inner.code);
        inner.members.push(member);
        true
    }

    /// Remove a member, telling the others. A second leave (or a leave by
    /// a non-member) is a no-op. Returns true once the room is empty, at
    /// which point any running timer is already cancelled and the caller
    /// should ask the directory to drop the session.
    pub async fn leave(&self, member_id: Uuid) -> bool {
        let mut guard = self.inner.lock().await;
        let inner = &mut *guard;
        let Some(pos) = inner.members.iter().position(|m| m.info.id == member_id) else {
            return inner.members.is_empty();
        };
        let member = inner.members.remove(pos);
        tracing::info!(
            "'{}' left room {} after {}s",
            member.info.user_name,
            inner.code,
            (Utc::now() - member.joined_at).num_seconds()
        );
        relay::fan_out(
            inner.members.iter(),
            None,
            &ServerEvent::MemberLeft {
                id: member.info.id,
                user_name: member.info.user_name,
                color: member.info.color,
            },
        );
        if inner.members.is_empty() {
            cancel_timer(inner);
            return true;
        }
        false
    }

    /// Relay a segment to everyone else. Permission is enforced client
    /// side too, so a failed check here is a defensive drop, not an error.
    pub async fn relay_draw(&self, sender_id: Uuid, segment: DrawSegment) {
        let guard = self.inner.lock().await;
        if !can_draw(&guard, sender_id) {
            tracing::debug!("room {}: dropping draw from {}", guard.code, sender_id);
            return;
        }
        relay::fan_out(guard.members.iter(), Some(sender_id), &ServerEvent::Draw(segment));
    }

    /// Replace the stored snapshot, last write wins. No broadcast: peers
    /// already rendered the segments; the snapshot serves late joiners
    /// and undo alignment.
    pub async fn update_snapshot(&self, sender_id: Uuid, snapshot: String) {
        let mut guard = self.inner.lock().await;
        if !can_draw(&guard, sender_id) {
            return;
        }
        guard.canvas = Some(snapshot);
    }

    /// Undo lands on a canonical state that everyone, sender included,
    /// re-renders from: either a prior snapshot or an empty surface.
    pub async fn apply_undo(&self, sender_id: Uuid, snapshot: Option<String>) {
        let mut guard = self.inner.lock().await;
        if !can_draw(&guard, sender_id) {
            return;
        }
        match snapshot {
            None => {
                guard.canvas = None;
                relay::fan_out(guard.members.iter(), None, &ServerEvent::ClearCanvas);
            }
            Some(snapshot) => {
                guard.canvas = Some(snapshot.clone());
                relay::fan_out(
                    guard.members.iter(),
                    None,
                    &ServerEvent::CanvasState {
                        snapshot: Some(snapshot),
                    },
                );
            }
        }
    }

    pub async fn clear_canvas(&self, sender_id: Uuid) {
        let mut guard = self.inner.lock().await;
        if !can_draw(&guard, sender_id) {
            return;
        }
        guard.canvas = None;
        relay::fan_out(guard.members.iter(), Some(sender_id), &ServerEvent::ClearCanvas);
    }

    /// Cursors are informational, so there is no permission check; the
    /// event is annotated with the sender's identity and color.
    pub async fn relay_cursor(&self, sender_id: Uuid, x: f32, y: f32) {
        let guard = self.inner.lock().await;
        let Some(sender) = guard.members.iter().find(|m| m.info.id == sender_id) else {
            return;
        };
        let event = ServerEvent::CursorMove {
            id: sender_id,
            user_name: sender.info.user_name.clone(),
            color: sender.info.color.clone(),
            x,
            y,
        };
        relay::fan_out(guard.members.iter(), Some(sender_id), &event);
    }

    pub async fn cursor_leave(&self, sender_id: Uuid) {
        let guard = self.inner.lock().await;
        relay::fan_out(
            guard.members.iter(),
            Some(sender_id),
            &ServerEvent::CursorLeave { id: sender_id },
        );
    }

    /// Host-only. Everyone hears about the change, the sender included,
    /// so their UI stays in step.
    pub async fn set_lock(&self, sender_id: Uuid, locked: bool) {
        let mut guard = self.inner.lock().await;
        if !is_host(&guard, sender_id) {
            tracing::debug!("room {}: ignoring lock change from {}", guard.code, sender_id);
            return;
        }
        guard.locked = locked;
        relay::fan_out(guard.members.iter(), None, &ServerEvent::LockChanged { locked });
    }

    /// Chat doubles as the guess channel: in fun mode with a running
    /// round, a non-drawer line matching the word scores instead of being
    /// relayed. Everything else is ordinary chat to the other members.
    pub async fn chat(&self, sender_id: Uuid, message: String) {
        let mut guard = self.inner.lock().await;
        let inner = &mut *guard;
        let Some(sender) = inner.members.iter().find(|m| m.info.id == sender_id) else {
            return;
        };
        let user_name = sender.info.user_name.clone();

        let matched = match inner.mode {
            RoomMode::Fun => inner.game.as_mut().and_then(|g| {
                g.guess(sender_id, &message)
                    .map(|points| (g.word.clone(), g.round, points))
            }),
            RoomMode::Professional => None,
        };

        if let Some((word, round, points)) = matched {
            cancel_timer(inner);
            tracing::info!(
                "room {}: '{}' guessed '{}' for {} points",
                inner.code,
                user_name,
                word,
                points
            );
            relay::fan_out(
                inner.members.iter(),
                None,
                &ServerEvent::CorrectGuess {
                    user_name,
                    word: word.clone(),
                    points,
                },
            );
            relay::fan_out(
                inner.members.iter(),
                None,
                &ServerEvent::RoundEnd {
                    word,
                    reason: RoundEndReason::Guess,
                },
            );
            if let Some(game) = &inner.game {
                for m in &inner.members {
                    relay::send_to(m, ServerEvent::GameState(game.view_for(m.info.id)));
                }
            }
            if inner.members.len() >= MIN_PLAYERS {
                let session = self.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(AUTO_ADVANCE_DELAY).await;
                    session.advance_round(round).await;
                });
            }
            return;
        }

        let event = ServerEvent::ChatMessage {
            id: sender_id,
            user_name,
            message,
            timestamp: Utc::now().timestamp_millis(),
            kind: ChatKind::User,
        };
        relay::fan_out(inner.members.iter(), Some(sender_id), &event);
    }

    /// Host-only. Failures are answered with a `game-error` to the
    /// requester; the room is otherwise untouched.
    pub async fn start_game(&self, requester_id: Uuid) {
        let mut guard = self.inner.lock().await;
        let inner = &mut *guard;
        let result = if !is_host(inner, requester_id) {
            Err(GameError::NotHost)
        } else if inner.mode != RoomMode::Fun {
            Err(GameError::WrongMode)
        } else if matches!(&inner.game, Some(g) if g.started) {
            Err(GameError::RoundInProgress)
        } else {
            self.start_round(inner)
        };
        if let Err(e) = result {
            report_game_error(inner, requester_id, &e);
        }
    }

    /// Host-only. Stops the timer, discards the round and its scores, and
    /// tells everyone the game is over.
    pub async fn end_game(&self, requester_id: Uuid) {
        let mut guard = self.inner.lock().await;
        let inner = &mut *guard;
        let result = if !is_host(inner, requester_id) {
            Err(GameError::NotHost)
        } else if inner.game.is_none() {
            Err(GameError::NoActiveGame)
        } else {
            Ok(())
        };
        match result {
            Ok(()) => {
                cancel_timer(inner);
                inner.game = None;
                relay::fan_out(inner.members.iter(), None, &ServerEvent::GameEnded);
                tracing::info!("room {}: game ended", inner.code);
            }
            Err(e) => report_game_error(inner, requester_id, &e),
        }
    }

    /// Called by the directory while it holds the map lock. Retiring
    /// marks the session dead so a stale handle cannot resurrect it.
    pub(crate) async fn retire_if_empty(&self) -> bool {
        let mut guard = self.inner.lock().await;
        let inner = &mut *guard;
        if !inner.members.is_empty() {
            return false;
        }
        cancel_timer(inner);
        inner.retired = true;
        true
    }

    fn start_round(&self, inner: &mut RoomInner) -> Result<(), GameError> {
        let ids: Vec<Uuid> = inner.members.iter().map(|m| m.info.id).collect();
        let mut rng = rand::rngs::StdRng::from_entropy();
        let round = GameRound::start(inner.game.as_ref(), &ids, &mut rng)?;

        // every round opens on a blank surface
        inner.canvas = None;
        relay::fan_out(inner.members.iter(), None, &ServerEvent::ClearCanvas);

        for m in &inner.members {
            relay::send_to(m, ServerEvent::GameState(round.view_for(m.info.id)));
        }
        let drawer_name = inner
            .members
            .iter()
            .find(|m| m.info.id == round.drawer)
            .map(|m| m.info.user_name.as_str())
            .unwrap_or("?");
        tracing::info!(
            "room {}: round {} started, '{}' draws",
            inner.code,
            round.round,
            drawer_name
        );

        inner.game = Some(round);
        self.spawn_timer(inner);
        Ok(())
    }

    fn spawn_timer(&self, inner: &mut RoomInner) {
        cancel_timer(inner);
        inner.timer_gen += 1;
        let gen = inner.timer_gen;
        let session = self.clone();
        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(1));
            interval.tick().await; // the first tick completes immediately
            loop {
                interval.tick().await;
                if !session.timer_tick(gen).await {
                    break;
                }
            }
        });
        inner.timer = Some(RoundTimer { task, gen });
    }

    /// One second of round time. Returns false once the timer should stop,
    /// including when this tick raced a cancellation and must be discarded.
    async fn timer_tick(&self, gen: u64) -> bool {
        let mut guard = self.inner.lock().await;
        let inner = &mut *guard;
        if inner.timer.as_ref().map(|t| t.gen) != Some(gen) {
            return false;
        }
        let Some(game) = inner.game.as_mut().filter(|g| g.started) else {
            return false;
        };
        let tick = game.tick();
        relay::fan_out(
            inner.members.iter(),
            None,
            &ServerEvent::TimerUpdate {
                time_left: tick.time_left,
            },
        );
        if !tick.expired {
            return true;
        }
        let word = game.word.clone();
        tracing::info!("room {}: time is up, the word was '{}'", inner.code, word);
        relay::fan_out(
            inner.members.iter(),
            None,
            &ServerEvent::RoundEnd {
                word,
                reason: RoundEndReason::Time,
            },
        );
        if let Some(game) = &inner.game {
            for m in &inner.members {
                relay::send_to(m, ServerEvent::GameState(game.view_for(m.info.id)));
            }
        }
        inner.timer = None;
        false
    }

    /// Scheduled continuation after a correct guess. A manual start or a
    /// game end inside the 3 s window changes or clears the round, so the
    /// stale advance is discarded by the round-number check.
    async fn advance_round(&self, after_round: u32) {
        let mut guard = self.inner.lock().await;
        let inner = &mut *guard;
        let due = matches!(&inner.game, Some(g) if !g.started && g.round == after_round)
            && inner.members.len() >= MIN_PLAYERS;
        if !due {
            return;
        }
        if let Err(e) = self.start_round(inner) {
            tracing::debug!("room {}: auto-advance skipped: {}", inner.code, e);
        }
    }
}

fn can_draw(inner: &RoomInner, id: Uuid) -> bool {
    match inner.mode {
        RoomMode::Professional => !inner.locked || is_host(inner, id),
        RoomMode::Fun => inner
            .game
            .as_ref()
            .map(|g| g.started && g.drawer == id)
            .unwrap_or(false),
    }
}

fn is_host(inner: &RoomInner, id: Uuid) -> bool {
    inner.members.iter().any(|m| m.info.id == id && m.is_host)
}

fn report_game_error(inner: &RoomInner, requester_id: Uuid, error: &GameError) {
    if let Some(requester) = inner.members.iter().find(|m| m.info.id == requester_id) {
        relay::send_to(
            requester,
            ServerEvent::GameError {
                message: error.to_string(),
            },
        );
    }
}

/// Idempotent: a second cancellation finds the slot already empty, and a
/// tick that already fired fails the generation check in `timer_tick`.
fn cancel_timer(inner: &mut RoomInner) {
    if let Some(timer) = inner.timer.take() {
        timer.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scrawl_common::game::ROUND_SECONDS;

    fn test_member(name: &str, is_host: bool) -> (JoinRequest, mpsc::Receiver<ServerEvent>) {
        let (tx, rx) = mpsc::channel(512);
        let req = JoinRequest {
            id: Uuid::new_v4(),
            user_name: name.to_string(),
            color: "#292524".to_string(),
            is_host,
            tx,
        };
        (req, rx)
    }

    fn drain(rx: &mut mpsc::Receiver<ServerEvent>) -> Vec<ServerEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    /// Let spawned timer/advance tasks run to their next await point.
    async fn settle() {
        for _ in 0..100 {
            tokio::task::yield_now().await;
        }
    }

    async fn fun_room_with_two() -> (
        RoomSession,
        Uuid,
        mpsc::Receiver<ServerEvent>,
        Uuid,
        mpsc::Receiver<ServerEvent>,
    ) {
        let room = RoomSession::new("ABCD".into(), RoomMode::Fun);
        let (alice, mut alice_rx) = test_member("Alice", true);
        let (bob, mut bob_rx) = test_member("Bob", false);
        let (alice_id, bob_id) = (alice.id, bob.id);
        room.join(alice).await;
        room.join(bob).await;
        drain(&mut alice_rx);
        drain(&mut bob_rx);
        (room, alice_id, alice_rx, bob_id, bob_rx)
    }

    fn game_states(events: &[ServerEvent]) -> Vec<scrawl_common::game::GameStateView> {
        events
            .iter()
            .filter_map(|e| match e {
                ServerEvent::GameState(view) => Some(view.clone()),
                _ => None,
            })
            .collect()
    }

    fn timer_updates(events: &[ServerEvent]) -> Vec<u32> {
        events
            .iter()
            .filter_map(|e| match e {
                ServerEvent::TimerUpdate { time_left } => Some(*time_left),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_join_pushes_room_state_to_joiner() {
        let room = RoomSession::new("ABCD".into(), RoomMode::Professional);
        let (alice, mut alice_rx) = test_member("Alice", true);
        room.join(alice).await;

        let events = drain(&mut alice_rx);
        assert!(matches!(
            &events[0],
            ServerEvent::UsersInRoom { users } if users.len() == 1 && users[0].user_name == "Alice"
        ));
        assert!(matches!(&events[1], ServerEvent::CanvasState { snapshot: None }));
        assert!(matches!(&events[2], ServerEvent::LockChanged { locked: false }));
        assert_eq!(events.len(), 3);
    }

    #[tokio::test]
    async fn test_join_notifies_existing_members() {
        let room = RoomSession::new("ABCD".into(), RoomMode::Professional);
        let (alice, mut alice_rx) = test_member("Alice", true);
        let (bob, mut bob_rx) = test_member("Bob", false);
        room.join(alice).await;
        drain(&mut alice_rx);

        room.join(bob).await;
        let alice_events = drain(&mut alice_rx);
        assert!(matches!(
            &alice_events[..],
            [ServerEvent::MemberJoined { user }] if user.user_name == "Bob"
        ));

        let bob_events = drain(&mut bob_rx);
        assert!(matches!(
            &bob_events[0],
            ServerEvent::UsersInRoom { users } if users.len() == 2
        ));
    }

    #[tokio::test]
    async fn test_late_joiner_receives_stored_snapshot() {
        let room = RoomSession::new("ABCD".into(), RoomMode::Professional);
        let (alice, _alice_rx) = test_member("Alice", true);
        let alice_id = alice.id;
        room.join(alice).await;
        room.update_snapshot(alice_id, "snap-1".into()).await;

        let (bob, mut bob_rx) = test_member("Bob", false);
        room.join(bob).await;
        let events = drain(&mut bob_rx);
        assert!(events.iter().any(|e| matches!(
            e,
            ServerEvent::CanvasState { snapshot: Some(s) } if s == "snap-1"
        )));
    }

    #[tokio::test]
    async fn test_draw_without_permission_is_never_observed() {
        // fun mode with no running round means nobody may draw
        let (room, alice_id, mut alice_rx, _bob_id, mut bob_rx) = fun_room_with_two().await;
        room.relay_draw(
            alice_id,
            DrawSegment {
                x0: 0.0,
                y0: 0.0,
                x1: 1.0,
                y1: 1.0,
                color: "#292524".into(),
                line_width: 3.0,
            },
        )
        .await;
        assert!(drain(&mut bob_rx).is_empty());
        assert!(drain(&mut alice_rx).is_empty());
    }

    #[tokio::test]
    async fn test_lock_policy_in_professional_mode() {
        let room = RoomSession::new("ABCD".into(), RoomMode::Professional);
        let (alice, mut alice_rx) = test_member("Alice", true);
        let (bob, mut bob_rx) = test_member("Bob", false);
        let (alice_id, bob_id) = (alice.id, bob.id);
        room.join(alice).await;
        room.join(bob).await;
        drain(&mut alice_rx);
        drain(&mut bob_rx);

        let segment = DrawSegment {
            x0: 0.0,
            y0: 0.0,
            x1: 5.0,
            y1: 5.0,
            color: "#EA580C".into(),
            line_width: 2.0,
        };

        // unlocked: anyone draws
        room.relay_draw(bob_id, segment.clone()).await;
        assert!(matches!(&drain(&mut alice_rx)[..], [ServerEvent::Draw(_)]));

        // locked: only the host draws
        room.set_lock(alice_id, true).await;
        assert!(matches!(&drain(&mut alice_rx)[..], [ServerEvent::LockChanged { locked: true }]));
        assert!(matches!(&drain(&mut bob_rx)[..], [ServerEvent::LockChanged { locked: true }]));

        room.relay_draw(bob_id, segment.clone()).await;
        assert!(drain(&mut alice_rx).is_empty());

        room.relay_draw(alice_id, segment).await;
        assert!(matches!(&drain(&mut bob_rx)[..], [ServerEvent::Draw(_)]));
    }

    #[tokio::test]
    async fn test_non_host_lock_change_is_dropped() {
        let room = RoomSession::new("ABCD".into(), RoomMode::Professional);
        let (alice, mut alice_rx) = test_member("Alice", true);
        let (bob, mut bob_rx) = test_member("Bob", false);
        let bob_id = bob.id;
        room.join(alice).await;
        room.join(bob).await;
        drain(&mut alice_rx);
        drain(&mut bob_rx);

        room.set_lock(bob_id, true).await;
        assert!(drain(&mut alice_rx).is_empty());
        assert!(drain(&mut bob_rx).is_empty());
    }

    #[tokio::test]
    async fn test_undo_to_empty_clears_everyone_and_late_joiners() {
        let room = RoomSession::new("ABCD".into(), RoomMode::Professional);
        let (alice, mut alice_rx) = test_member("Alice", true);
        let (bob, mut bob_rx) = test_member("Bob", false);
        let alice_id = alice.id;
        room.join(alice).await;
        room.join(bob).await;
        room.update_snapshot(alice_id, "snap-1".into()).await;
        drain(&mut alice_rx);
        drain(&mut bob_rx);

        room.apply_undo(alice_id, None).await;

        // the sender re-renders from the canonical (empty) state too
        assert!(matches!(&drain(&mut alice_rx)[..], [ServerEvent::ClearCanvas]));
        assert!(matches!(&drain(&mut bob_rx)[..], [ServerEvent::ClearCanvas]));

        let (carol, mut carol_rx) = test_member("Carol", false);
        room.join(carol).await;
        let events = drain(&mut carol_rx);
        assert!(events
            .iter()
            .any(|e| matches!(e, ServerEvent::CanvasState { snapshot: None })));
    }

    #[tokio::test]
    async fn test_undo_to_snapshot_is_canonical_for_everyone() {
        let room = RoomSession::new("ABCD".into(), RoomMode::Professional);
        let (alice, mut alice_rx) = test_member("Alice", true);
        let alice_id = alice.id;
        room.join(alice).await;
        drain(&mut alice_rx);

        room.apply_undo(alice_id, Some("snap-2".into())).await;
        assert!(matches!(
            &drain(&mut alice_rx)[..],
            [ServerEvent::CanvasState { snapshot: Some(s) }] if s == "snap-2"
        ));
    }

    #[tokio::test]
    async fn test_leave_is_idempotent() {
        let room = RoomSession::new("ABCD".into(), RoomMode::Professional);
        let (alice, mut alice_rx) = test_member("Alice", true);
        let (bob, _bob_rx) = test_member("Bob", false);
        let (alice_id, bob_id) = (alice.id, bob.id);
        room.join(alice).await;
        room.join(bob).await;
        drain(&mut alice_rx);

        assert!(!room.leave(bob_id).await);
        assert!(matches!(
            &drain(&mut alice_rx)[..],
            [ServerEvent::MemberLeft { user_name, .. }] if user_name == "Bob"
        ));

        // leaving twice changes nothing
        assert!(!room.leave(bob_id).await);
        assert!(drain(&mut alice_rx).is_empty());

        assert!(room.leave(alice_id).await);
    }

    #[tokio::test]
    async fn test_cursor_relay_annotates_sender() {
        let room = RoomSession::new("ABCD".into(), RoomMode::Professional);
        let (alice, mut alice_rx) = test_member("Alice", true);
        let (bob, mut bob_rx) = test_member("Bob", false);
        let alice_id = alice.id;
        room.join(alice).await;
        room.join(bob).await;
        drain(&mut alice_rx);
        drain(&mut bob_rx);

        room.relay_cursor(alice_id, 12.0, 34.0).await;
        assert!(drain(&mut alice_rx).is_empty());
        assert!(matches!(
            &drain(&mut bob_rx)[..],
            [ServerEvent::CursorMove { user_name, x, y, .. }]
                if user_name == "Alice" && *x == 12.0 && *y == 34.0
        ));
    }

    #[tokio::test]
    async fn test_chat_relays_to_others_only() {
        let room = RoomSession::new("ABCD".into(), RoomMode::Professional);
        let (alice, mut alice_rx) = test_member("Alice", true);
        let (bob, mut bob_rx) = test_member("Bob", false);
        let alice_id = alice.id;
        room.join(alice).await;
        room.join(bob).await;
        drain(&mut alice_rx);
        drain(&mut bob_rx);

        room.chat(alice_id, "hello there".into()).await;
        assert!(drain(&mut alice_rx).is_empty());
        assert!(matches!(
            &drain(&mut bob_rx)[..],
            [ServerEvent::ChatMessage { user_name, message, kind: ChatKind::User, .. }]
                if user_name == "Alice" && message == "hello there"
        ));
    }

    #[tokio::test]
    async fn test_start_game_requires_host_and_two_players() {
        let (room, _alice_id, mut alice_rx, bob_id, mut bob_rx) = fun_room_with_two().await;

        room.start_game(bob_id).await;
        assert!(matches!(&drain(&mut bob_rx)[..], [ServerEvent::GameError { .. }]));
        assert!(drain(&mut alice_rx).is_empty());

        let solo = RoomSession::new("WXYZ".into(), RoomMode::Fun);
        let (carol, mut carol_rx) = test_member("Carol", true);
        let carol_id = carol.id;
        solo.join(carol).await;
        drain(&mut carol_rx);

        solo.start_game(carol_id).await;
        assert!(matches!(
            &drain(&mut carol_rx)[..],
            [ServerEvent::GameError { message }] if message.contains("2 players")
        ));
    }

    #[tokio::test]
    async fn test_start_game_rejected_in_professional_mode() {
        let room = RoomSession::new("ABCD".into(), RoomMode::Professional);
        let (alice, mut alice_rx) = test_member("Alice", true);
        let (bob, _bob_rx) = test_member("Bob", false);
        let alice_id = alice.id;
        room.join(alice).await;
        room.join(bob).await;
        drain(&mut alice_rx);

        room.start_game(alice_id).await;
        assert!(matches!(&drain(&mut alice_rx)[..], [ServerEvent::GameError { .. }]));
    }

    #[tokio::test(start_paused = true)]
    async fn test_round_start_redacts_word_for_guessers() {
        let (room, alice_id, mut alice_rx, bob_id, mut bob_rx) = fun_room_with_two().await;

        room.start_game(alice_id).await;

        let alice_events = drain(&mut alice_rx);
        assert!(matches!(&alice_events[0], ServerEvent::ClearCanvas));
        let alice_views = game_states(&alice_events);
        assert_eq!(alice_views.len(), 1);
        assert_eq!(alice_views[0].drawer, alice_id);
        assert!(alice_views[0].word.is_some());
        assert!(alice_views[0].started);
        assert_eq!(alice_views[0].round, 1);
        assert_eq!(alice_views[0].scores[&bob_id], 0);

        let bob_views = game_states(&drain(&mut bob_rx));
        assert_eq!(bob_views.len(), 1);
        assert!(bob_views[0].word.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_joiner_during_round_gets_redacted_view() {
        let (room, alice_id, _alice_rx, _bob_id, _bob_rx) = fun_room_with_two().await;
        room.start_game(alice_id).await;

        let (carol, mut carol_rx) = test_member("Carol", false);
        room.join(carol).await;
        let views = game_states(&drain(&mut carol_rx));
        assert_eq!(views.len(), 1);
        assert!(views[0].word.is_none());
        assert!(views[0].started);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_runs_a_full_round() {
        let (room, alice_id, _alice_rx, _bob_id, mut bob_rx) = fun_room_with_two().await;
        room.start_game(alice_id).await;
        drain(&mut bob_rx);

        tokio::time::advance(Duration::from_secs(u64::from(ROUND_SECONDS) + 1)).await;
        settle().await;

        let events = drain(&mut bob_rx);
        let updates = timer_updates(&events);
        let expected: Vec<u32> = (0..ROUND_SECONDS).rev().collect();
        assert_eq!(updates, expected);

        let round_ends: Vec<_> = events
            .iter()
            .filter(|e| matches!(e, ServerEvent::RoundEnd { .. }))
            .collect();
        assert_eq!(round_ends.len(), 1);
        assert!(matches!(
            round_ends[0],
            ServerEvent::RoundEnd { reason: RoundEndReason::Time, .. }
        ));

        // word revealed to everyone once time is up
        let views = game_states(&events);
        assert_eq!(views.len(), 1);
        assert!(views[0].word.is_some());
        assert!(!views[0].started);

        // and the timer is fully stopped
        tokio::time::advance(Duration::from_secs(10)).await;
        settle().await;
        assert!(timer_updates(&drain(&mut bob_rx)).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_end_game_stops_the_timer() {
        let (room, alice_id, _alice_rx, _bob_id, mut bob_rx) = fun_room_with_two().await;
        room.start_game(alice_id).await;

        tokio::time::advance(Duration::from_secs(5)).await;
        settle().await;
        drain(&mut bob_rx);

        room.end_game(alice_id).await;
        assert!(matches!(&drain(&mut bob_rx)[..], [ServerEvent::GameEnded]));

        tokio::time::advance(Duration::from_secs(30)).await;
        settle().await;
        assert!(timer_updates(&drain(&mut bob_rx)).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_room_teardown_cancels_the_timer() {
        let (room, alice_id, mut alice_rx, bob_id, mut bob_rx) = fun_room_with_two().await;
        room.start_game(alice_id).await;

        assert!(!room.leave(bob_id).await);
        assert!(room.leave(alice_id).await);
        drain(&mut alice_rx);
        drain(&mut bob_rx);

        tokio::time::advance(Duration::from_secs(30)).await;
        settle().await;
        assert!(timer_updates(&drain(&mut alice_rx)).is_empty());
        assert!(timer_updates(&drain(&mut bob_rx)).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_correct_guess_scores_and_auto_advances() {
        let (room, alice_id, mut alice_rx, bob_id, mut bob_rx) = fun_room_with_two().await;
        room.start_game(alice_id).await;

        let word = game_states(&drain(&mut alice_rx))[0]
            .word
            .clone()
            .expect("drawer sees the word");

        // 20 ticks leave 40 seconds on the clock
        tokio::time::advance(Duration::from_secs(20)).await;
        settle().await;
        drain(&mut alice_rx);
        drain(&mut bob_rx);

        room.chat(bob_id, word.to_uppercase()).await;

        let bob_events = drain(&mut bob_rx);
        assert!(bob_events.iter().any(|e| matches!(
            e,
            ServerEvent::CorrectGuess { user_name, points: 20, word: w }
                if user_name == "Bob" && *w == word
        )));
        assert!(bob_events.iter().any(|e| matches!(
            e,
            ServerEvent::RoundEnd { reason: RoundEndReason::Guess, .. }
        )));
        let views = game_states(&bob_events);
        assert_eq!(views.len(), 1);
        assert_eq!(views[0].word.as_deref(), Some(word.as_str()));
        assert!(!views[0].started);
        assert_eq!(views[0].scores[&bob_id], 20);

        // timer is stopped while the next round is pending
        tokio::time::advance(Duration::from_secs(1)).await;
        settle().await;
        assert!(timer_updates(&drain(&mut bob_rx)).is_empty());

        // auto-advance: the guesser becomes the next drawer
        tokio::time::advance(Duration::from_secs(2)).await;
        settle().await;
        let views = game_states(&drain(&mut bob_rx));
        assert_eq!(views.len(), 1);
        assert_eq!(views[0].round, 2);
        assert_eq!(views[0].drawer, bob_id);
        assert!(views[0].word.is_some());
        assert!(views[0].started);
    }

    #[tokio::test(start_paused = true)]
    async fn test_manual_start_preempts_auto_advance() {
        let (room, alice_id, mut alice_rx, bob_id, mut bob_rx) = fun_room_with_two().await;
        room.start_game(alice_id).await;
        let word = game_states(&drain(&mut alice_rx))[0].word.clone().unwrap();

        room.chat(bob_id, word).await;
        drain(&mut alice_rx);
        drain(&mut bob_rx);

        // the host starts the next round before the scheduled advance
        room.start_game(alice_id).await;
        let views = game_states(&drain(&mut bob_rx));
        assert_eq!(views.len(), 1);
        assert_eq!(views[0].round, 2);

        tokio::time::advance(Duration::from_secs(4)).await;
        settle().await;
        let views = game_states(&drain(&mut bob_rx));
        assert!(views.iter().all(|v| v.round == 2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wrong_guess_is_relayed_as_chat() {
        let (room, alice_id, mut alice_rx, bob_id, _bob_rx) = fun_room_with_two().await;
        room.start_game(alice_id).await;
        drain(&mut alice_rx);

        room.chat(bob_id, "definitely-wrong".into()).await;
        assert!(matches!(
            &drain(&mut alice_rx)[..],
            [ServerEvent::ChatMessage { message, .. }] if message == "definitely-wrong"
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_drawer_may_draw_only_while_round_runs() {
        let (room, alice_id, _alice_rx, _bob_id, mut bob_rx) = fun_room_with_two().await;
        room.start_game(alice_id).await;
        drain(&mut bob_rx);

        let segment = DrawSegment {
            x0: 0.0,
            y0: 0.0,
            x1: 1.0,
            y1: 1.0,
            color: "#292524".into(),
            line_width: 3.0,
        };
        room.relay_draw(alice_id, segment.clone()).await;
        assert!(matches!(&drain(&mut bob_rx)[..], [ServerEvent::Draw(_)]));

        room.end_game(alice_id).await;
        drain(&mut bob_rx);
        room.relay_draw(alice_id, segment).await;
        assert!(drain(&mut bob_rx).is_empty());
    }
}
