//! The per-game driver.
//!
//! A `ChessGame` owns the board, the PGN record, the clocks and the
//! adjudicator for one game and runs it to completion on its worker thread:
//! forced opening prefix first, then alternating engine turns with a
//! deadline derived from the time control. Engine events (moves, result
//! claims, disconnections) arrive through [`ChessPlayer::poll`]; control
//! from other threads (stop, kill, pause) goes through the shared
//! [`GameControl`] handle.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use engine_interface::{
    Board, ChessPlayer, GameResult, MoveEvaluation, OpeningBook, PgnGame, PlayerEvent, Poll,
    ResultKind, Side, TimeControl,
};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tracing::{info, warn};

use crate::adjudicator::GameAdjudicator;
use crate::output::LiveOutput;

const READY_TIMEOUT: Duration = Duration::from_secs(30);
const POLL_SLICE: Duration = Duration::from_millis(25);

/// Cross-thread control handle for a running game.
pub struct GameControl {
    stop: AtomicBool,
    kill: AtomicBool,
    paused: Mutex<bool>,
    resume: Condvar,
}

impl GameControl {
    fn new() -> Arc<GameControl> {
        Arc::new(GameControl {
            stop: AtomicBool::new(false),
            kill: AtomicBool::new(false),
            paused: Mutex::new(false),
            resume: Condvar::new(),
        })
    }

    /// Asks the game to finalize with its current state. Idempotent.
    pub fn stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
        self.resume.notify_all();
    }

    /// Stop, and terminate both engine processes first.
    pub fn kill(&self) {
        self.kill.store(true, Ordering::SeqCst);
        self.stop();
    }

    pub fn is_stopping(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    pub fn is_killing(&self) -> bool {
        self.kill.load(Ordering::SeqCst)
    }

    /// Defers the next turn until [`GameControl::resume`].
    pub fn pause(&self) {
        *self.paused.lock().unwrap() = true;
    }

    pub fn resume(&self) {
        let mut paused = self.paused.lock().unwrap();
        if *paused {
            *paused = false;
            self.resume.notify_all();
        }
    }

    // block at the turn boundary while paused
    fn wait_if_paused(&self) {
        let mut paused = self.paused.lock().unwrap();
        while *paused && !self.is_stopping() {
            let (guard, _) = self
                .resume
                .wait_timeout(paused, Duration::from_millis(100))
                .unwrap();
            paused = guard;
        }
    }
}

/// Everything the controller needs to record a finished game.
pub struct GameOutcome {
    pub result: GameResult,
    pub pgn: PgnGame,
    pub white_name: String,
    pub black_name: String,
    pub final_fen: String,
    pub ply_count: usize,
    /// SAN moves, for opening classification.
    pub moves_san: Vec<String>,
    pub start_time: String,
    pub duration: Duration,
    /// Last reported score of each side, from its own point of view,
    /// formatted like the PGN eval comments.
    pub white_eval: String,
    pub black_eval: String,
}

/// One game from setup to final result.
pub struct ChessGame {
    board: Box<dyn Board>,
    pgn: PgnGame,
    tc: [TimeControl; 2],
    books: [Option<Arc<dyn OpeningBook>>; 2],
    book_depth: [usize; 2],
    adjudicator: GameAdjudicator,
    starting_fen: Option<String>,
    /// Forced opening prefix before the game; the full move list once it
    /// runs.
    moves: Vec<String>,
    moves_san: Vec<String>,
    scores: BTreeMap<usize, i32>,
    side_eval: [String; 2],
    result: GameResult,
    start_delay: Duration,
    in_progress: bool,
    control: Arc<GameControl>,
    live: Option<Arc<LiveOutput>>,
}

impl ChessGame {
    pub fn new(board: Box<dyn Board>) -> ChessGame {
        ChessGame {
            board,
            pgn: PgnGame::new(),
            tc: [TimeControl::infinite(), TimeControl::infinite()],
            books: [None, None],
            book_depth: [0, 0],
            adjudicator: GameAdjudicator::new(),
            starting_fen: None,
            moves: Vec::new(),
            moves_san: Vec::new(),
            scores: BTreeMap::new(),
            side_eval: [String::new(), String::new()],
            result: GameResult::null(),
            start_delay: Duration::ZERO,
            in_progress: false,
            control: GameControl::new(),
            live: None,
        }
    }

    pub fn control(&self) -> Arc<GameControl> {
        Arc::clone(&self.control)
    }

    pub fn pgn_mut(&mut self) -> &mut PgnGame {
        &mut self.pgn
    }

    /// Legal only before the game starts; rejects FENs the board refuses.
    pub fn set_starting_fen(&mut self, fen: &str) -> anyhow::Result<()> {
        debug_assert!(!self.in_progress);
        if !self.board.set_fen(fen) {
            anyhow::bail!("invalid FEN string: {fen}");
        }
        self.starting_fen = Some(self.board.fen());
        Ok(())
    }

    pub fn starting_fen(&self) -> Option<&str> {
        self.starting_fen.as_deref()
    }

    pub fn set_time_control(&mut self, tc: TimeControl, side: Side) {
        self.tc[side.index()] = tc;
    }

    /// Forces an opening prefix. Pre-start only.
    pub fn set_moves(&mut self, moves: Vec<String>) {
        debug_assert!(!self.in_progress);
        self.scores.clear();
        self.moves = moves;
    }

    pub fn moves(&self) -> &[String] {
        &self.moves
    }

    pub fn set_opening_book(
        &mut self,
        book: Option<Arc<dyn OpeningBook>>,
        side: Side,
        depth: usize,
    ) {
        debug_assert!(!self.in_progress);
        self.books[side.index()] = book;
        self.book_depth[side.index()] = depth;
    }

    pub fn set_adjudicator(&mut self, adjudicator: GameAdjudicator) {
        self.adjudicator = adjudicator;
    }

    pub fn set_start_delay(&mut self, delay: Duration) {
        self.start_delay = delay;
    }

    pub fn set_live_output(&mut self, live: Option<Arc<LiveOutput>>) {
        self.live = live;
    }

    fn reset_board(&mut self) -> bool {
        let fen = match &self.starting_fen {
            Some(fen) => fen.clone(),
            None => {
                let fen = self.board.default_fen();
                if self.board.is_random_variant() {
                    self.starting_fen = Some(fen.clone());
                }
                fen
            }
        };

        if !self.board.set_fen(&fen) {
            warn!(fen = %fen, "invalid FEN string");
            self.starting_fen = None;
            return false;
        }
        true
    }

    /// A book move for `side` in the current position, if any.
    fn book_move(&self, side: Side) -> Option<String> {
        let book = self.books[side.index()].as_ref()?;
        if self.moves.len() >= self.book_depth[side.index()] * 2 {
            return None;
        }
        let mv = book.lookup(self.board.key())?;
        if !self.board.is_legal_move(&mv) {
            warn!(side = %side, mv = %mv, "illegal opening book move");
            return None;
        }
        if self.board.is_repetition(&mv) {
            return None;
        }
        Some(mv)
    }

    /// Extends the forced prefix by walking the opening books from the
    /// starting position. Requires both sides to have a book.
    pub fn generate_opening(&mut self) {
        if self.books[0].is_none() || self.books[1].is_none() {
            return;
        }
        if !self.reset_board() {
            return;
        }

        // replay the moves already in the opening
        for mv in &self.moves {
            debug_assert!(self.board.is_legal_move(mv));
            self.board.make_move(mv);
            if !self.board.result().is_none() {
                return;
            }
        }

        loop {
            let Some(mv) = self.book_move(self.board.side_to_move()) else {
                break;
            };
            self.board.make_move(&mv);
            if !self.board.result().is_none() {
                break;
            }
            self.moves.push(mv);
        }
    }

    // score text as engines report it: pawns with two decimals, M/-M for
    // mate-distance scores, clamped to +/-999.99 out of range
    fn score_text(score: i32) -> String {
        let abs = score.abs();
        if abs > 9900 {
            let mate = 1000 - abs % 1000;
            if mate < 100 {
                return if score < 0 {
                    format!("-M{mate}")
                } else {
                    format!("M{mate}")
                };
            }
        }
        if abs > 99_999 {
            return if score < 0 {
                "-999.99".to_string()
            } else {
                "999.99".to_string()
            };
        }
        format!("{:.2}", f64::from(score) / 100.0)
    }

    /// The PGN comment attached to a move, in the position *before* the
    /// move is played.
    fn eval_string(&self, eval: &MoveEvaluation) -> String {
        if eval.is_book {
            return "book".to_string();
        }
        if eval.is_empty() {
            return String::new();
        }

        let side = self.board.side_to_move();
        let s_score = if eval.depth > 0 {
            Self::score_text(eval.score)
        } else {
            "0.00".to_string()
        };

        let mut str = String::new();
        str += "d=";
        str += &if eval.depth > 0 { eval.depth.to_string() } else { "1".to_string() };
        str += ", sd=";
        str += &if eval.selective_depth > 0 {
            eval.selective_depth.to_string()
        } else {
            "1".to_string()
        };
        if !eval.ponder_move.is_empty() {
            str += ", pd=";
            str += &eval.ponder_move;
        }
        str += &format!(", mt={}", eval.time_ms);
        str += &format!(", tl={}", self.tc[side.index()].time_left_ms());
        str += &format!(", s={}", eval.nps);
        str += &format!(", n={}", eval.nodes);
        str += &format!(", pv={}", self.board.san_pv(&eval.pv));
        str += &format!(", tb={}", eval.tb_hits);
        str += &format!(", h={:.1}", f64::from(eval.hash_usage) / 10.0);
        str += &format!(", ph={:.1}", f64::from(eval.ponder_hit_rate) / 10.0);

        // moves left on the fifty-move clock
        let r50 = ((100.0 - f64::from(self.board.reversible_move_count())) / 2.0 + 0.5).floor();
        str += &format!(", R50={}", r50 as i64);

        // score from white's point of view
        str += ", wv=";
        if side == Side::Black && s_score != "0.00" {
            if let Some(stripped) = s_score.strip_prefix('-') {
                str += stripped;
            } else {
                str += "-";
                str += &s_score;
            }
        } else {
            str += &s_score;
        }

        str += &format!(", fn={}", self.board.fen());
        str
    }

    fn update_live(&self) {
        if let Some(live) = &self.live {
            live.write(&self.pgn);
        }
    }

    fn set_result(&mut self, result: GameResult) {
        if self.result.is_none() {
            self.result = result;
        }
    }

    /// Validates, records and plays `mv` for the side to move, runs result
    /// detection and adjudication, and forwards the move to `waiter`.
    fn process_move(
        &mut self,
        mv: &str,
        eval: &MoveEvaluation,
        waiter: &mut Box<dyn ChessPlayer>,
        mover_name: &str,
    ) {
        if !self.board.is_legal_move(mv) {
            let side = self.board.side_to_move();
            warn!(player = mover_name, mv = %mv, "illegal move");
            self.set_result(GameResult::win(
                side.opposite(),
                ResultKind::IllegalMove,
                format!("{mover_name} makes an illegal move: {mv}"),
            ));
            return;
        }

        let side = self.board.side_to_move();
        if eval.score != MoveEvaluation::NULL_SCORE {
            self.scores.insert(self.moves.len(), eval.score);
        }
        if eval.depth > 0 {
            self.side_eval[side.index()] = Self::score_text(eval.score);
        }
        let comment = self.eval_string(eval);
        let san = self.board.san_move(mv);

        self.pgn.add_move(san.clone(), comment);
        self.moves.push(mv.to_string());
        self.moves_san.push(san);
        self.board.make_move(mv);

        let mut result = self.board.result();
        if result.is_none() {
            if self.board.reversible_move_count() == 0 {
                self.adjudicator.reset_draw_move_count();
            }
            self.adjudicator.add_eval(self.board.as_ref(), eval);
            result = self.adjudicator.result();
        }

        if result.is_none() {
            if let Err(e) = waiter.make_move(mv) {
                warn!(player = waiter.name(), error = %e, "failed to forward move");
                self.set_result(GameResult::win(
                    side,
                    ResultKind::Disconnection,
                    format!("{} disconnects", waiter.name()),
                ));
            }
        } else {
            self.set_result(result);
        }

        self.update_live();
    }

    fn handle_result_claim(&mut self, claimer: Side, claimer_name: &str, trusted: bool, claim: GameResult) {
        if claim.kind == ResultKind::Disconnection {
            self.set_result(GameResult::win(
                claimer.opposite(),
                ResultKind::Disconnection,
                format!("{claimer_name} disconnects"),
            ));
        } else if !self.in_progress && claim.winner.is_none() {
            warn!(player = claimer_name, claim = %claim, "unexpected result claim");
        } else if !trusted && claim.loser() != Some(claimer) {
            // an unvalidated claim may only concede
            warn!(player = claimer_name, claim = %claim, "forfeit by invalid result claim");
            self.set_result(GameResult::win(
                claimer.opposite(),
                ResultKind::Adjudication,
                "Invalid result claim",
            ));
        } else {
            self.set_result(claim);
        }
    }

    fn initialize_pgn(&mut self, white: &dyn ChessPlayer, black: &dyn ChessPlayer) {
        self.pgn.white = white.name();
        self.pgn.black = black.name();
        self.pgn.variant = self.board.variant().to_string();
        self.pgn.starting_fen = self.starting_fen.clone();
        self.pgn.starting_side = Some(self.board.starting_side());
        let now = OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc());
        if let Ok(fmt) = time::format_description::parse("[year].[month].[day]") {
            if let Ok(date) = now.format(&fmt) {
                self.pgn.date = date;
            }
        }
        if white.rating() > 0 {
            self.pgn.set_tag("WhiteElo", white.rating().to_string());
        }
        if black.rating() > 0 {
            self.pgn.set_tag("BlackElo", black.rating().to_string());
        }
        if self.tc[0] == self.tc[1] {
            self.pgn.set_tag("TimeControl", self.tc[0].to_string());
        } else {
            self.pgn.set_tag("WhiteTimeControl", self.tc[0].to_string());
            self.pgn.set_tag("BlackTimeControl", self.tc[1].to_string());
        }
    }

    // wait until both players report Ready (or one drops)
    fn sync_players(&mut self, players: &mut [Box<dyn ChessPlayer>; 2]) -> bool {
        for i in [Side::White, Side::Black] {
            let deadline = Instant::now() + READY_TIMEOUT;
            loop {
                if self.control.is_stopping() {
                    return false;
                }
                match players[i.index()].poll(POLL_SLICE) {
                    Poll::Event(PlayerEvent::Ready) => break,
                    Poll::Event(PlayerEvent::ResultClaim(claim)) => {
                        let name = players[i.index()].name();
                        let trusted = !players[i.index()].claims_validated();
                        self.handle_result_claim(i, &name, trusted, claim);
                        if !self.result.is_none() {
                            return false;
                        }
                    }
                    Poll::Event(_) => {}
                    Poll::Disconnected => {
                        let name = players[i.index()].name();
                        self.set_result(GameResult::win(
                            i.opposite(),
                            ResultKind::Disconnection,
                            format!("{name} disconnects"),
                        ));
                        return false;
                    }
                    Poll::Timeout => {
                        if Instant::now() >= deadline {
                            let name = players[i.index()].name();
                            self.set_result(GameResult::win(
                                i.opposite(),
                                ResultKind::StalledConnection,
                                format!("{name} stalls before the game"),
                            ));
                            return false;
                        }
                    }
                }
            }
        }
        true
    }

    /// Runs the game to completion. Returns the outcome and the players,
    /// which the manager may pool for reuse.
    pub fn run(
        mut self,
        white: Box<dyn ChessPlayer>,
        black: Box<dyn ChessPlayer>,
        notify_started: impl FnOnce(),
    ) -> (GameOutcome, [Box<dyn ChessPlayer>; 2]) {
        let mut players = [white, black];

        // optional pre-game delay, responsive to stop requests
        let mut delay = self.start_delay;
        while delay > Duration::ZERO && !self.control.is_stopping() {
            let slice = delay.min(Duration::from_millis(50));
            std::thread::sleep(slice);
            delay -= slice;
        }

        let start_wall = OffsetDateTime::now_utc();
        let start = Instant::now();
        let started = self.setup(&mut players);
        if started {
            notify_started();
            self.play(&mut players);
        }
        self.finish(start_wall, start, players)
    }

    fn setup(&mut self, players: &mut [Box<dyn ChessPlayer>; 2]) -> bool {
        if !self.reset_board() {
            self.set_result(GameResult::draw(ResultKind::NoResult, "invalid starting position"));
            return false;
        }
        let fen = self
            .starting_fen
            .clone()
            .unwrap_or_else(|| self.board.fen());

        for side in [Side::White, Side::Black] {
            self.tc[side.index()].start_game();
            let tc = self.tc[side.index()].clone();
            if let Err(e) = players[side.index()].new_game(side, &fen, &tc) {
                let name = players[side.index()].name();
                warn!(player = name, error = %e, "failed to start a new game");
                self.set_result(GameResult::win(
                    side.opposite(),
                    ResultKind::Disconnection,
                    format!("{name} disconnects"),
                ));
                return false;
            }
        }

        if !self.sync_players(players) {
            return false;
        }

        let (white, black) = players.split_at_mut(1);
        self.initialize_pgn(white[0].as_ref(), black[0].as_ref());
        self.in_progress = true;

        // play the forced opening moves first
        let prefix = self.moves.clone();
        self.moves.clear();
        for mv in prefix {
            if !self.board.is_legal_move(&mv) {
                warn!(mv = %mv, "illegal forced opening move");
                break;
            }
            let side = self.board.side_to_move();
            let san = self.board.san_move(&mv);
            self.pgn.add_move(san.clone(), "book");
            self.moves_san.push(san);

            let (mover, waiter) = (side.index(), side.opposite().index());
            let _ = players[mover].make_book_move(&mv);
            let _ = players[waiter].make_move(&mv);
            self.board.make_move(&mv);
            self.moves.push(mv);
            self.update_live();

            let result = self.board.result();
            if !result.is_none() {
                warn!("every move was played from the book");
                self.set_result(result);
                return false;
            }
        }
        true
    }

    fn play(&mut self, players: &mut [Box<dyn ChessPlayer>; 2]) {
        while self.result.is_none() {
            if self.control.is_stopping() {
                break;
            }
            self.control.wait_if_paused();
            if self.control.is_stopping() {
                break;
            }

            let side = self.board.side_to_move();
            let mover = side.index();
            let waiter = side.opposite().index();

            // book path: the move is forced, no thinking happens
            if let Some(mv) = self.book_move(side) {
                players[waiter].clear_ponder_state();
                if players[mover].make_book_move(&mv).is_err() {
                    let name = players[mover].name();
                    self.set_result(GameResult::win(
                        side.opposite(),
                        ResultKind::Disconnection,
                        format!("{name} disconnects"),
                    ));
                    break;
                }
                let eval = MoveEvaluation::book();
                let (a, b) = players.split_at_mut(1);
                let mover_name = if mover == 0 { a[0].name() } else { b[0].name() };
                let waiter_ref = if mover == 0 { &mut b[0] } else { &mut a[0] };
                self.process_move(&mv, &eval, waiter_ref, &mover_name);
                continue;
            }

            if players[mover].go(&self.tc[mover]).is_err() {
                let name = players[mover].name();
                self.set_result(GameResult::win(
                    side.opposite(),
                    ResultKind::Disconnection,
                    format!("{name} disconnects"),
                ));
                break;
            }
            players[waiter].start_pondering();

            let deadline = self.tc[mover].move_deadline();
            let turn_start = Instant::now();

            'turn: loop {
                if self.control.is_stopping() {
                    break 'turn;
                }

                // drain the waiter without blocking; it may claim a result
                // or disconnect while the mover thinks
                match players[waiter].poll(Duration::ZERO) {
                    Poll::Event(PlayerEvent::MoveMade { .. }) => {
                        warn!(
                            player = players[waiter].name(),
                            "tried to make a move on the opponent's turn"
                        );
                    }
                    Poll::Event(PlayerEvent::ResultClaim(claim)) => {
                        let name = players[waiter].name();
                        let trusted = !players[waiter].claims_validated();
                        self.handle_result_claim(side.opposite(), &name, trusted, claim);
                    }
                    Poll::Disconnected => {
                        let name = players[waiter].name();
                        self.set_result(GameResult::win(
                            side,
                            ResultKind::Disconnection,
                            format!("{name} disconnects"),
                        ));
                    }
                    _ => {}
                }
                if !self.result.is_none() {
                    break 'turn;
                }

                let slice = match deadline {
                    Some(d) => {
                        let elapsed = turn_start.elapsed();
                        if elapsed >= d {
                            let name = players[mover].name();
                            self.set_result(GameResult::win(
                                side.opposite(),
                                ResultKind::Timeout,
                                format!("{name} loses on time"),
                            ));
                            break 'turn;
                        }
                        POLL_SLICE.min(d - elapsed)
                    }
                    None => POLL_SLICE,
                };

                match players[mover].poll(slice) {
                    Poll::Event(PlayerEvent::MoveMade { mv, eval }) => {
                        let elapsed = turn_start.elapsed();
                        if !self.tc[mover].on_move_made(elapsed) {
                            let name = players[mover].name();
                            self.set_result(GameResult::win(
                                side.opposite(),
                                ResultKind::Timeout,
                                format!("{name} loses on time"),
                            ));
                            break 'turn;
                        }
                        let (a, b) = players.split_at_mut(1);
                        let (mover_ref, waiter_ref) =
                            if mover == 0 { (&a[0], &mut b[0]) } else { (&b[0], &mut a[0]) };
                        let name = mover_ref.name();
                        self.process_move(&mv, &eval, waiter_ref, &name);
                        break 'turn;
                    }
                    Poll::Event(PlayerEvent::ResultClaim(claim)) => {
                        let name = players[mover].name();
                        let trusted = !players[mover].claims_validated();
                        self.handle_result_claim(side, &name, trusted, claim);
                        if !self.result.is_none() {
                            break 'turn;
                        }
                    }
                    Poll::Event(PlayerEvent::Ready) => {}
                    Poll::Disconnected => {
                        let name = players[mover].name();
                        self.set_result(GameResult::win(
                            side.opposite(),
                            ResultKind::Disconnection,
                            format!("{name} disconnects"),
                        ));
                        break 'turn;
                    }
                    Poll::Timeout => {}
                }
            }
        }
    }

    fn finish(
        mut self,
        start_wall: OffsetDateTime,
        start: Instant,
        mut players: [Box<dyn ChessPlayer>; 2],
    ) -> (GameOutcome, [Box<dyn ChessPlayer>; 2]) {
        if self.control.is_killing() {
            for player in players.iter_mut() {
                player.kill();
            }
        }

        let plies = self.pgn.moves().len();
        self.pgn.set_result(&self.result);
        self.pgn.set_tag("PlyCount", plies.to_string());
        self.pgn.set_tag("TerminationDetails", self.result.termination());
        let duration = start.elapsed();
        self.pgn.set_tag("GameDuration", format_duration(duration));

        for player in players.iter_mut() {
            player.end_game(&self.result);
        }
        self.update_live();

        info!(result = %self.result, plies, "game over");

        let outcome = GameOutcome {
            result: self.result.clone(),
            white_name: players[0].name(),
            black_name: players[1].name(),
            final_fen: self.board.fen(),
            ply_count: plies,
            moves_san: self.moves_san.clone(),
            start_time: start_wall.format(&Rfc3339).unwrap_or_default(),
            duration,
            white_eval: self.side_eval[0].clone(),
            black_eval: self.side_eval[1].clone(),
            pgn: self.pgn,
        };
        (outcome, players)
    }
}

pub fn format_duration(duration: Duration) -> String {
    let total = duration.as_secs();
    format!("{:02}:{:02}:{:02}", total / 3600, (total / 60) % 60, total % 60)
}
