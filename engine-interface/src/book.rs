//! Opening books and opening suites.

/// A read-only opening book, shared between players and games.
pub trait OpeningBook: Send + Sync {
    /// A book move for the position with the given hash key, or `None` when
    /// the book is out of moves here.
    fn lookup(&self, key: u64) -> Option<String>;
}

/// A forced opening: an optional starting position plus a move prefix.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Opening {
    pub fen: Option<String>,
    pub moves: Vec<String>,
}

/// A feed of starting openings (EPD or PGN file, sequential or shuffled).
pub trait OpeningSuite: Send {
    /// The next opening, truncated to `max_plies` moves. `None` when the
    /// suite is exhausted and does not wrap around.
    fn next_opening(&mut self, max_plies: usize) -> Option<Opening>;
}
