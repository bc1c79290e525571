//! Sides and game results.

use std::fmt;

use serde::{Deserialize, Serialize};

/// One side of a chess game.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    White,
    Black,
}

impl Side {
    pub fn opposite(self) -> Side {
        match self {
            Side::White => Side::Black,
            Side::Black => Side::White,
        }
    }

    /// Index usable for two-element per-side arrays.
    pub fn index(self) -> usize {
        match self {
            Side::White => 0,
            Side::Black => 1,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::White => write!(f, "White"),
            Side::Black => write!(f, "Black"),
        }
    }
}

/// How a game ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResultKind {
    /// Win or draw by the rules of chess.
    Normal,
    /// Decided by the arbiter (draw rule, resign rule, tablebase, length).
    Adjudication,
    /// A player resigned.
    Resignation,
    /// A player ran out of time.
    Timeout,
    /// A player's process terminated or its pipe broke.
    Disconnection,
    /// A player stopped responding without disconnecting.
    StalledConnection,
    /// A player tried to make an illegal move.
    IllegalMove,
    /// A player made an invalid result claim or another protocol error.
    ResultError,
    /// No result; the game is running or was aborted.
    NoResult,
}

/// The outcome of a single game.
///
/// A `GameResult` with kind [`ResultKind::NoResult`] is the null result: the
/// game has not been decided. A decided result without a winner is a draw.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameResult {
    pub winner: Option<Side>,
    pub kind: ResultKind,
    pub description: String,
}

impl GameResult {
    pub fn null() -> GameResult {
        GameResult {
            winner: None,
            kind: ResultKind::NoResult,
            description: String::new(),
        }
    }

    pub fn win(winner: Side, kind: ResultKind, description: impl Into<String>) -> GameResult {
        GameResult {
            winner: Some(winner),
            kind,
            description: description.into(),
        }
    }

    pub fn draw(kind: ResultKind, description: impl Into<String>) -> GameResult {
        GameResult {
            winner: None,
            kind,
            description: description.into(),
        }
    }

    pub fn is_none(&self) -> bool {
        self.kind == ResultKind::NoResult
    }

    pub fn is_draw(&self) -> bool {
        self.winner.is_none() && !self.is_none()
    }

    pub fn loser(&self) -> Option<Side> {
        self.winner.map(Side::opposite)
    }

    /// True for result kinds caused by a misbehaving player.
    pub fn is_faulty(&self) -> bool {
        matches!(
            self.kind,
            ResultKind::NoResult
                | ResultKind::ResultError
                | ResultKind::Disconnection
                | ResultKind::StalledConnection
        )
    }

    /// The PGN result token: `1-0`, `0-1`, `1/2-1/2` or `*`.
    pub fn score_string(&self) -> &'static str {
        match self.winner {
            Some(Side::White) => "1-0",
            Some(Side::Black) => "0-1",
            None if self.is_none() => "*",
            None => "1/2-1/2",
        }
    }

    /// Short, human-readable termination text for reports and PGN tags.
    pub fn termination(&self) -> String {
        if !self.description.is_empty() {
            return self.description.clone();
        }
        match self.kind {
            ResultKind::Normal if self.winner.is_some() => "checkmate".into(),
            ResultKind::Normal => "draw".into(),
            ResultKind::Adjudication => "adjudication".into(),
            ResultKind::Resignation => "resignation".into(),
            ResultKind::Timeout => "time forfeit".into(),
            ResultKind::Disconnection => "disconnection".into(),
            ResultKind::StalledConnection => "stalled connection".into(),
            ResultKind::IllegalMove => "illegal move".into(),
            ResultKind::ResultError => "result error".into(),
            ResultKind::NoResult => "unterminated".into(),
        }
    }
}

impl fmt::Display for GameResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {{{}}}", self.score_string(), self.termination())
    }
}
