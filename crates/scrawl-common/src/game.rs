use std::collections::HashMap;

use rand::Rng;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::words;

pub const ROUND_SECONDS: u32 = 60;
pub const MIN_PLAYERS: usize = 2;
const GUESS_POINTS_FLOOR: u32 = 10;

// -- Round State Machine --

/// One timed guessing round plus the scores carried across rounds.
///
/// The struct is pure state: the owning room session drives it from its
/// 1-second timer and chat events, and decides what to broadcast from the
/// returned outcomes. `started` distinguishes a running round from one
/// that has ended but whose scores and word are still on display.
#[derive(Debug, Clone)]
pub struct GameRound {
    pub word: String,
    pub drawer: Uuid,
    pub round: u32,
    pub scores: HashMap<Uuid, u32>,
    pub time_left: u32,
    pub started: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct Tick {
    pub time_left: u32,
    pub expired: bool,
}

impl GameRound {
    /// Begin the next round: rotate the drawer through `members` (join
    /// order, starting after the previous drawer), pick a fresh word, and
    /// carry scores forward from `prev`.
    pub fn start(
        prev: Option<&GameRound>,
        members: &[Uuid],
        rng: &mut impl Rng,
    ) -> Result<GameRound, GameError> {
        if members.len() < MIN_PLAYERS {
            return Err(GameError::NotEnoughPlayers);
        }
        let mut scores = prev.map(|p| p.scores.clone()).unwrap_or_default();
        for id in members {
            scores.entry(*id).or_insert(0);
        }
        Ok(GameRound {
            word: words::pick(rng).to_string(),
            drawer: next_drawer(members, prev.map(|p| p.drawer)),
            round: prev.map(|p| p.round).unwrap_or(0) + 1,
            scores,
            time_left: ROUND_SECONDS,
            started: true,
        })
    }

    /// One second of round time. The final tick reports `time_left` 0 and
    /// `expired`, and leaves the round ended.
    pub fn tick(&mut self) -> Tick {
        self.time_left = self.time_left.saturating_sub(1);
        let expired = self.time_left == 0;
        if expired {
            self.started = false;
        }
        Tick {
            time_left: self.time_left,
            expired,
        }
    }

    /// Evaluate a chat line as a guess. Returns the points awarded on a
    /// match; `None` means the line is ordinary chat. The drawer cannot
    /// guess, and nothing matches once the round has ended.
    pub fn guess(&mut self, sender: Uuid, text: &str) -> Option<u32> {
        if !self.started || sender == self.drawer {
            return None;
        }
        if !text.trim().eq_ignore_ascii_case(&self.word) {
            return None;
        }
        let points = (self.time_left / 2).max(GUESS_POINTS_FLOOR);
        *self.scores.entry(sender).or_insert(0) += points;
        self.started = false;
        Some(points)
    }

    /// The word is secret while the round runs: only the drawer sees it.
    /// Once the round ends it is revealed to everyone.
    pub fn view_for(&self, recipient: Uuid) -> GameStateView {
        let reveal = !self.started || recipient == self.drawer;
        GameStateView {
            word: reveal.then(|| self.word.clone()),
            drawer: self.drawer,
            round: self.round,
            scores: self.scores.clone(),
            time_left: self.time_left,
            started: self.started,
        }
    }
}

fn next_drawer(members: &[Uuid], prev: Option<Uuid>) -> Uuid {
    match prev.and_then(|p| members.iter().position(|&id| id == p)) {
        Some(i) => members[(i + 1) % members.len()],
        None => members[0],
    }
}

// -- Per-recipient snapshot (sent over the network) --

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameStateView {
    pub word: Option<String>,
    pub drawer: Uuid,
    pub round: u32,
    pub scores: HashMap<Uuid, u32>,
    pub time_left: u32,
    pub started: bool,
}

// -- Errors --

#[derive(Debug, Clone, thiserror::Error)]
pub enum GameError {
    #[error("only the host can control the game")]
    NotHost,
    #[error("need at least 2 players to start a round")]
    NotEnoughPlayers,
    #[error("a round is already in progress")]
    RoundInProgress,
    #[error("no game in progress")]
    NoActiveGame,
    #[error("game rounds are only available in fun rooms")]
    WrongMode,
}
