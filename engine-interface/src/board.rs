//! The board capability set consumed by the arbiter.

use crate::types::{GameResult, Side};

/// Position state and rules for one chess variant.
///
/// Moves are exchanged as coordinate-notation strings (the form engines
/// speak); implementations convert to SAN only for display. The arbiter
/// never inspects move contents beyond equality.
pub trait Board: Send {
    fn variant(&self) -> &str;

    /// The starting position of the variant. Random variants return a fresh
    /// random start each call.
    fn default_fen(&self) -> String;

    /// Sets up the position; returns false and leaves the board unchanged on
    /// an invalid FEN.
    fn set_fen(&mut self, fen: &str) -> bool;

    fn fen(&self) -> String;

    fn side_to_move(&self) -> Side;

    /// The side to move in the starting position of the current game.
    fn starting_side(&self) -> Side {
        Side::White
    }

    /// Half-moves played since the starting position.
    fn ply_count(&self) -> u32;

    /// Half-moves since the last irreversible move (capture or pawn move).
    fn reversible_move_count(&self) -> u32;

    fn is_legal_move(&self, mv: &str) -> bool;

    /// Plays a move. Callers must check legality first.
    fn make_move(&mut self, mv: &str);

    fn undo_move(&mut self);

    /// Result by the rules of the game; the null result while in progress.
    fn result(&self) -> GameResult;

    /// Probes the configured endgame tablebase for the current position.
    fn tablebase_result(&self) -> GameResult {
        GameResult::null()
    }

    /// Hash key of the current position, used for opening-book lookups.
    fn key(&self) -> u64;

    /// True if playing `mv` would repeat an earlier position.
    fn is_repetition(&self, _mv: &str) -> bool {
        false
    }

    /// Standard algebraic rendering of a legal move in the current position.
    fn san_move(&self, mv: &str) -> String {
        mv.to_string()
    }

    /// SAN rendering of a whole principal variation.
    fn san_pv(&self, pv: &str) -> String {
        pv.to_string()
    }

    /// True for variants with randomized starting positions (e.g. FRC),
    /// whose start FEN must be recorded explicitly.
    fn is_random_variant(&self) -> bool {
        false
    }
}

/// Creates boards by variant name.
pub trait BoardFactory: Send + Sync {
    /// Returns `None` for unsupported variants.
    fn create(&self, variant: &str) -> Option<Box<dyn Board>>;
}
