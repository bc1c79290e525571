//! The player capability set: one side of a game.
//!
//! A player is usually an adapter around an engine subprocess. Adapters pump
//! the engine's output on their own reader thread and hand parsed events to
//! the game driver through [`ChessPlayer::poll`]; the driver never blocks on
//! raw pipes.

use std::time::Duration;

use anyhow::Result;

use crate::eval::MoveEvaluation;
use crate::time_control::TimeControl;
use crate::types::{GameResult, Side};

/// Restart policy for an engine process between games.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum RestartMode {
    /// Restart if the engine asks for it or died; reuse otherwise.
    #[default]
    Auto,
    /// Fresh process for every game.
    Always,
    /// Never restart; a dead engine forfeits.
    Never,
}

/// Events a player can report to the game driver.
#[derive(Clone, Debug)]
pub enum PlayerEvent {
    /// The player finished initializing and can accept a game.
    Ready,
    /// The player made a move, with the evaluation it reported for it.
    MoveMade { mv: String, eval: MoveEvaluation },
    /// The player claims the game ended (protocol result, resignation,
    /// or its process going away).
    ResultClaim(GameResult),
}

/// Outcome of polling a player for its next event.
#[derive(Debug)]
pub enum Poll {
    Event(PlayerEvent),
    /// No event within the given timeout.
    Timeout,
    /// The player's process is gone.
    Disconnected,
}

/// One side of a chess game.
pub trait ChessPlayer: Send {
    fn name(&self) -> String;

    /// Configured rating, 0 if unknown.
    fn rating(&self) -> i32 {
        0
    }

    fn is_human(&self) -> bool {
        false
    }

    /// Whether result claims from this player must be verified against the
    /// game state before being accepted.
    fn claims_validated(&self) -> bool {
        true
    }

    /// Prepares the player for a new game on `side` from `fen`.
    /// A [`PlayerEvent::Ready`] event follows once the player is set up.
    fn new_game(&mut self, side: Side, fen: &str, tc: &TimeControl) -> Result<()>;

    /// Asks the player to think and produce a move under the given clock.
    fn go(&mut self, tc: &TimeControl) -> Result<()>;

    /// Forwards the opponent's move.
    fn make_move(&mut self, mv: &str) -> Result<()>;

    /// Plays a forced move on the player's own turn (opening book).
    fn make_book_move(&mut self, mv: &str) -> Result<()>;

    fn start_pondering(&mut self) {}

    fn clear_ponder_state(&mut self) {}

    /// Waits up to `timeout` for the player's next event.
    fn poll(&mut self, timeout: Duration) -> Poll;

    /// Tells the player the game is over.
    fn end_game(&mut self, result: &GameResult);

    /// Forcibly terminates the player's process.
    fn kill(&mut self);

    /// False once the underlying process has exited.
    fn is_alive(&self) -> bool {
        true
    }
}

/// Factory producing fresh [`ChessPlayer`] instances.
///
/// The game manager pools idle players and reuses them for later games with
/// the same builder, honoring [`PlayerBuilder::restart_mode`].
pub trait PlayerBuilder: Send + Sync {
    fn name(&self) -> String;

    fn build(&self) -> Result<Box<dyn ChessPlayer>>;

    fn restart_mode(&self) -> RestartMode {
        RestartMode::Auto
    }

    fn rating(&self) -> i32 {
        0
    }

    /// Strikes carried over from a resumed tournament.
    fn strikes(&self) -> u32 {
        0
    }

    /// Encounter score carried over from a resumed knockout match.
    fn resume_score(&self) -> u32 {
        0
    }
}
