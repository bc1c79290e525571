//! Move evaluations reported by engines.

/// Search information attached to a single move.
///
/// Engines fill in whatever their protocol reports; missing values stay at
/// their defaults. Evaluations with `depth <= 0` are treated as forced moves
/// (book or human) by the adjudicator.
#[derive(Clone, Debug, PartialEq)]
pub struct MoveEvaluation {
    pub depth: i32,
    pub selective_depth: i32,
    /// Score in centipawns from the mover's point of view.
    pub score: i32,
    /// Principal variation, space-separated moves.
    pub pv: String,
    /// Expected reply, if the engine reported one.
    pub ponder_move: String,
    pub nodes: u64,
    pub nps: u64,
    /// Hash table usage in permille.
    pub hash_usage: i32,
    /// Ponder hit rate in permille.
    pub ponder_hit_rate: i32,
    pub tb_hits: u64,
    /// Time spent on the move in milliseconds.
    pub time_ms: u64,
    pub is_book: bool,
}

impl MoveEvaluation {
    /// Sentinel for "no score reported".
    pub const NULL_SCORE: i32 = i32::MIN;

    pub fn book() -> MoveEvaluation {
        MoveEvaluation {
            is_book: true,
            ..MoveEvaluation::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        !self.is_book && self.depth == 0 && self.nodes == 0 && self.score == Self::NULL_SCORE
    }
}

impl Default for MoveEvaluation {
    fn default() -> MoveEvaluation {
        MoveEvaluation {
            depth: 0,
            selective_depth: 0,
            score: Self::NULL_SCORE,
            pv: String::new(),
            ponder_move: String::new(),
            nodes: 0,
            nps: 0,
            hash_usage: 0,
            ponder_hit_rate: 0,
            tb_hits: 0,
            time_ms: 0,
            is_book: false,
        }
    }
}
