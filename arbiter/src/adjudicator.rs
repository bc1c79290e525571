//! Early-result adjudication from streamed move evaluations.

#[cfg(not(test))]
use engine_interface::{Board, GameResult, MoveEvaluation, ResultKind};
#[cfg(test)]
use engine_interface::{Board, GameResult, MoveEvaluation, ResultKind, Side};

/// Decides whether a game should end early based on the evaluations both
/// engines report after each move.
///
/// All rules are disabled by default. The caller feeds every move through
/// [`GameAdjudicator::add_eval`] with the board in the position *after* the
/// move; [`GameAdjudicator::result`] returns the first rule that fired.
#[derive(Clone, Debug)]
pub struct GameAdjudicator {
    draw_move_num: u32,
    draw_move_count: u32,
    draw_score: i32,
    draw_score_count: u32,
    resign_move_count: u32,
    resign_score: i32,
    resign_score_count: [u32; 2],
    resign_winner_score_count: [u32; 2],
    max_game_length: u32,
    tb_enabled: bool,
    tcec_rules: bool,
    result: GameResult,
}

impl Default for GameAdjudicator {
    fn default() -> GameAdjudicator {
        GameAdjudicator {
            draw_move_num: 0,
            draw_move_count: 0,
            draw_score: 0,
            draw_score_count: 0,
            resign_move_count: 0,
            resign_score: 0,
            resign_score_count: [0; 2],
            resign_winner_score_count: [0; 2],
            max_game_length: 0,
            tb_enabled: false,
            tcec_rules: false,
            result: GameResult::null(),
        }
    }
}

impl GameAdjudicator {
    pub fn new() -> GameAdjudicator {
        GameAdjudicator::default()
    }

    /// Adjudicate a draw when both players report a score within `score`
    /// centipawns of zero for `move_count` consecutive moves each, once at
    /// least `move_number` full moves have been played.
    pub fn set_draw_threshold(&mut self, move_number: u32, move_count: u32, score: i32) {
        self.draw_move_num = move_number;
        self.draw_move_count = move_count;
        self.draw_score = score;
        self.draw_score_count = 0;
    }

    /// Adjudicate a loss for a player reporting a score of `score` or below
    /// for `move_count` consecutive of its own moves.
    pub fn set_resign_threshold(&mut self, move_count: u32, score: i32) {
        self.resign_move_count = move_count;
        self.resign_score = score;
        self.resign_score_count = [0; 2];
        self.resign_winner_score_count = [0; 2];
    }

    /// Adjudicate a draw once `move_count` full moves have been played.
    pub fn set_maximum_game_length(&mut self, move_count: u32) {
        self.max_game_length = move_count;
    }

    /// Adjudicate as soon as the position is found in the tablebases.
    pub fn set_tablebase_adjudication(&mut self, enable: bool) {
        self.tb_enabled = enable;
    }

    /// TCEC variants of the draw and resign rules: the draw counter freezes
    /// over irreversible moves, and resigning requires both players to agree
    /// (loser at or below the threshold, winner at or above its negation).
    pub fn set_tcec_adjudication(&mut self, enable: bool) {
        self.tcec_rules = enable;
    }

    /// Feeds the evaluation of the move that led to `board`'s position.
    pub fn add_eval(&mut self, board: &dyn Board, eval: &MoveEvaluation) {
        let side = board.side_to_move().opposite();

        if self.tb_enabled {
            self.result = board.tablebase_result();
            if !self.result.is_none() {
                return;
            }
        }

        // Moves forced by the user (opening book, human) carry no search
        // information; they reset the mover's counters.
        if eval.depth <= 0 {
            self.draw_score_count = 0;
            self.resign_score_count[side.index()] = 0;
            return;
        }

        if self.draw_move_num > 0 {
            if self.tcec_rules && board.reversible_move_count() == 0 {
                // counter freezes; the driver resets it separately
            } else {
                if eval.score.abs() <= self.draw_score {
                    self.draw_score_count += 1;
                } else {
                    self.draw_score_count = 0;
                }

                if board.ply_count() / 2 >= self.draw_move_num
                    && self.draw_score_count >= self.draw_move_count * 2
                {
                    self.result = GameResult::draw(ResultKind::Adjudication, "TCEC draw rule");
                    return;
                }
            }
        }

        if self.resign_move_count > 0 {
            if self.tcec_rules {
                let s = side.index();
                let o = side.opposite().index();
                if eval.score <= self.resign_score {
                    self.resign_score_count[s] += 1;
                    self.resign_winner_score_count[s] = 0;
                } else if eval.score >= -self.resign_score {
                    self.resign_winner_score_count[s] += 1;
                    self.resign_score_count[s] = 0;
                } else {
                    self.resign_score_count[s] = 0;
                    self.resign_winner_score_count[s] = 0;
                }

                if self.resign_score_count[s] >= self.resign_move_count
                    && self.resign_winner_score_count[o] >= self.resign_move_count
                {
                    self.result =
                        GameResult::win(side.opposite(), ResultKind::Adjudication, "TCEC win rule");
                } else if self.resign_winner_score_count[s] >= self.resign_move_count
                    && self.resign_score_count[o] >= self.resign_move_count
                {
                    self.result = GameResult::win(side, ResultKind::Adjudication, "TCEC win rule");
                }
            } else {
                let count = &mut self.resign_score_count[side.index()];
                if eval.score <= self.resign_score {
                    *count += 1;
                } else {
                    *count = 0;
                }

                if *count >= self.resign_move_count {
                    self.result = GameResult::win(
                        side.opposite(),
                        ResultKind::Adjudication,
                        "TCEC resign rule",
                    );
                }
            }
        }

        if self.max_game_length > 0 && board.ply_count() >= 2 * self.max_game_length {
            self.result = GameResult::draw(ResultKind::Adjudication, "TCEC max moves rule");
        }
    }

    /// Resets the draw counter; called by the driver on irreversible moves.
    pub fn reset_draw_move_count(&mut self) {
        self.draw_score_count = 0;
    }

    /// The adjudicated result, or the null result while undecided. A fired
    /// rule sticks.
    pub fn result(&self) -> GameResult {
        self.result.clone()
    }

    /// Plies left until the draw rule would fire given the current sample.
    /// Negative if the minimum move number has not been reached; -1000 when
    /// the rule is disabled.
    pub fn draw_clock(&self, board: &dyn Board, eval: &MoveEvaluation) -> i32 {
        if self.draw_move_num == 0 {
            return -1000;
        }

        let draw_move_limit = (self.draw_move_count * 2) as i32;
        let mut count = self.draw_score_count as i32;

        if self.tcec_rules && board.reversible_move_count() == 0 {
            count = 0;
        } else if eval.score.abs() <= self.draw_score && board.reversible_move_count() != 0 {
            count += 1;
        } else {
            count = 0;
        }

        count = if count >= draw_move_limit {
            0
        } else {
            draw_move_limit - count
        };

        if board.ply_count() / 2 < self.draw_move_num {
            count = -count - 1;
        }

        count
    }

    /// Plies left until the resign rule would fire against either side,
    /// mirroring [`GameAdjudicator::draw_clock`].
    pub fn resign_clock(&self, board: &dyn Board, eval: &MoveEvaluation) -> i32 {
        if self.resign_move_count == 0 {
            return -1000;
        }

        let side = board.side_to_move().opposite();
        let limit = self.resign_move_count as i32;
        let mut count = self.resign_score_count[side.index()] as i32;

        if self.tcec_rules {
            let mut winner_count = self.resign_winner_score_count[side.index()] as i32;
            if eval.score <= self.resign_score {
                count += 1;
                winner_count = 0;
            } else if eval.score >= -self.resign_score {
                winner_count += 1;
                count = 0;
            } else {
                count = 0;
                winner_count = 0;
            }

            count = if count >= limit { 0 } else { limit - count };
            winner_count = if winner_count >= limit {
                0
            } else {
                limit - winner_count
            };

            let o = side.opposite().index();
            if (self.resign_winner_score_count[o] as i32) < limit {
                count = -count - 1;
            }
            if (self.resign_score_count[o] as i32) < limit {
                winner_count = -winner_count - 1;
            }

            if (count < 0 && winner_count > count) || (winner_count >= 0 && winner_count < count) {
                count = winner_count;
            }
        } else {
            if eval.score <= self.resign_score {
                count += 1;
            } else {
                count = 0;
            }
            count = if count >= limit { 0 } else { limit - count };
        }

        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use engine_interface::Board;

    // Board stub exposing only what the adjudicator reads.
    struct EvalBoard {
        ply: u32,
        reversible: u32,
        stm: Side,
        tb: GameResult,
    }

    impl EvalBoard {
        fn new() -> EvalBoard {
            EvalBoard {
                ply: 0,
                reversible: 1,
                stm: Side::White,
                tb: GameResult::null(),
            }
        }

        // advance as if the opposite of `stm` just moved
        fn step(&mut self) {
            self.ply += 1;
            self.reversible += 1;
            self.stm = self.stm.opposite();
        }
    }

    impl Board for EvalBoard {
        fn variant(&self) -> &str {
            "standard"
        }
        fn default_fen(&self) -> String {
            String::new()
        }
        fn set_fen(&mut self, _fen: &str) -> bool {
            true
        }
        fn fen(&self) -> String {
            String::new()
        }
        fn side_to_move(&self) -> Side {
            self.stm
        }
        fn ply_count(&self) -> u32 {
            self.ply
        }
        fn reversible_move_count(&self) -> u32 {
            self.reversible
        }
        fn is_legal_move(&self, _mv: &str) -> bool {
            true
        }
        fn make_move(&mut self, _mv: &str) {}
        fn undo_move(&mut self) {}
        fn result(&self) -> GameResult {
            GameResult::null()
        }
        fn tablebase_result(&self) -> GameResult {
            self.tb.clone()
        }
        fn key(&self) -> u64 {
            0
        }
    }

    fn eval(score: i32) -> MoveEvaluation {
        MoveEvaluation {
            depth: 12,
            score,
            ..MoveEvaluation::default()
        }
    }

    #[test]
    fn draw_rule_fires_after_balanced_window() {
        let mut adj = GameAdjudicator::new();
        adj.set_draw_threshold(40, 8, 10);

        let mut board = EvalBoard::new();
        board.ply = 80; // past move 40

        for i in 0..16 {
            board.step();
            adj.add_eval(&board, &eval(5));
            if i < 15 {
                assert!(adj.result().is_none(), "fired early at ply {}", i);
            }
        }
        let result = adj.result();
        assert!(result.is_draw());
        assert_eq!(result.kind, ResultKind::Adjudication);
    }

    #[test]
    fn draw_counter_resets_on_large_score() {
        let mut adj = GameAdjudicator::new();
        adj.set_draw_threshold(40, 8, 10);

        let mut board = EvalBoard::new();
        board.ply = 80;

        for _ in 0..15 {
            board.step();
            adj.add_eval(&board, &eval(5));
        }
        board.step();
        adj.add_eval(&board, &eval(11)); // resets the window
        for _ in 0..15 {
            board.step();
            adj.add_eval(&board, &eval(0));
        }
        assert!(adj.result().is_none());
        board.step();
        adj.add_eval(&board, &eval(0));
        assert!(adj.result().is_draw());
    }

    #[test]
    fn draw_rule_waits_for_move_number() {
        let mut adj = GameAdjudicator::new();
        adj.set_draw_threshold(40, 2, 10);

        let mut board = EvalBoard::new();
        board.ply = 10;
        for _ in 0..8 {
            board.step();
            adj.add_eval(&board, &eval(0));
        }
        assert!(adj.result().is_none());
    }

    #[test]
    fn plain_resign_rule() {
        let mut adj = GameAdjudicator::new();
        adj.set_resign_threshold(4, -500);

        // white to move at each sample start; after step() the mover is white
        let mut board = EvalBoard::new();
        board.stm = Side::White;

        // feed eight alternating plies; white's four samples are losing
        for i in 0..8 {
            board.step();
            let mover_is_white = board.stm == Side::Black;
            let score = if mover_is_white { -600 } else { 200 };
            adj.add_eval(&board, &eval(score));
            if i < 6 {
                assert!(adj.result().is_none());
            }
        }
        let result = adj.result();
        assert_eq!(result.winner, Some(Side::Black));
        assert_eq!(result.kind, ResultKind::Adjudication);
    }

    #[test]
    fn tcec_resign_needs_both_sides() {
        let mut adj = GameAdjudicator::new();
        adj.set_resign_threshold(2, -500);
        adj.set_tcec_adjudication(true);

        let mut board = EvalBoard::new();

        // white keeps reporting a lost score but black is unconvinced
        for _ in 0..4 {
            board.step(); // white moved
            adj.add_eval(&board, &eval(-600));
            board.step(); // black moved
            adj.add_eval(&board, &eval(100)); // below -resign_score
        }
        assert!(adj.result().is_none());

        // once black agrees it is winning, the rule fires
        for _ in 0..2 {
            board.step();
            adj.add_eval(&board, &eval(-600));
            board.step();
            adj.add_eval(&board, &eval(700));
        }
        let result = adj.result();
        assert_eq!(result.winner, Some(Side::Black));
    }

    #[test]
    fn forced_moves_reset_counters() {
        let mut adj = GameAdjudicator::new();
        adj.set_resign_threshold(2, -500);

        let mut board = EvalBoard::new();
        board.step();
        adj.add_eval(&board, &eval(-600));
        board.step();
        adj.add_eval(&board, &eval(0));

        // book move by white (depth 0)
        board.step();
        adj.add_eval(
            &board,
            &MoveEvaluation {
                depth: 0,
                score: -600,
                ..MoveEvaluation::default()
            },
        );
        board.step();
        adj.add_eval(&board, &eval(0));

        board.step();
        adj.add_eval(&board, &eval(-600));
        assert!(adj.result().is_none(), "counter must restart after a book move");
    }

    #[test]
    fn max_length_rule() {
        let mut adj = GameAdjudicator::new();
        adj.set_maximum_game_length(100);

        let mut board = EvalBoard::new();
        board.ply = 199;
        board.step();
        adj.add_eval(&board, &eval(250));
        let result = adj.result();
        assert!(result.is_draw());
    }

    #[test]
    fn tablebase_result_wins() {
        let mut adj = GameAdjudicator::new();
        adj.set_tablebase_adjudication(true);

        let mut board = EvalBoard::new();
        board.tb = GameResult::win(Side::White, ResultKind::Adjudication, "TB");
        board.step();
        adj.add_eval(&board, &eval(0));
        assert_eq!(adj.result().winner, Some(Side::White));
    }

    #[test]
    fn clocks_report_plies_to_fire() {
        let mut adj = GameAdjudicator::new();
        adj.set_draw_threshold(1, 3, 10);

        let mut board = EvalBoard::new();
        board.ply = 10;
        // rule needs 6 consecutive plies; first sample pending
        assert_eq!(adj.draw_clock(&board, &eval(0)), 5);
        board.step();
        adj.add_eval(&board, &eval(0));
        assert_eq!(adj.draw_clock(&board, &eval(0)), 4);

        // below the move number the clock is negative
        let mut early = EvalBoard::new();
        early.ply = 0;
        let mut adj2 = GameAdjudicator::new();
        adj2.set_draw_threshold(40, 3, 10);
        assert!(adj2.draw_clock(&early, &eval(0)) < 0);

        assert_eq!(GameAdjudicator::new().resign_clock(&board, &eval(0)), -1000);
    }
}
