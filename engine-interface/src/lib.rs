//! Contracts between the tournament arbiter and the components it drives.
//!
//! The arbiter schedules and referees games; it does not implement chess
//! rules, engine wire protocols or opening-book formats itself. Those live
//! behind the traits defined here:
//!
//! - [`Board`]: position state, move legality and rule-based result
//!   detection for a chess variant.
//! - [`ChessPlayer`]: one side of a game, usually an adapter around an
//!   engine subprocess speaking UCI or Winboard. Players report moves,
//!   evaluations and result claims as [`PlayerEvent`]s.
//! - [`PlayerBuilder`]: a factory producing fresh player instances, so that
//!   engine processes can be restarted or pooled across games.
//! - [`OpeningBook`] / [`OpeningSuite`]: forced-opening sources.
//!
//! The shared data model ([`Side`], [`GameResult`], [`MoveEvaluation`],
//! [`TimeControl`], [`PgnGame`]) also lives in this crate so that adapters
//! and the arbiter agree on it without depending on each other.

pub mod board;
pub mod book;
pub mod eval;
pub mod pgn;
pub mod player;
pub mod time_control;
pub mod types;

pub use board::{Board, BoardFactory};
pub use book::{Opening, OpeningBook, OpeningSuite};
pub use eval::MoveEvaluation;
pub use pgn::{PgnGame, PgnMode, PgnMove};
pub use player::{ChessPlayer, PlayerBuilder, PlayerEvent, Poll, RestartMode};
pub use time_control::TimeControl;
pub use types::{GameResult, ResultKind, Side};

pub use anyhow;
