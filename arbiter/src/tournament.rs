//! The tournament controller.
//!
//! Owns the roster, the pairing schedule and the game manager, and runs the
//! outer loop on the calling thread: ask the schedule for the next pair,
//! hand the game to the manager, fold finished results into scores, SPRT
//! and artifacts, repeat. Game threads communicate back over a channel, so
//! pairing decisions and score updates never need locks.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use engine_interface::{
    BoardFactory, OpeningBook, OpeningSuite, PlayerBuilder, ResultKind, Side, TimeControl,
};
use tracing::{info, warn};

use crate::eco;
use crate::elo::Elo;
use crate::game::{format_duration, ChessGame, GameControl, GameOutcome};
use crate::manager::{GameManager, GameRequest, ReuseMode, StartMode, TournamentEvent};
use crate::output::{
    Crosstable, CrosstablePlayer, EngineSettingsDoc, EpdWriter, LiveOutput, PgnWriter,
    TournamentFile,
};
use crate::pair::{PairId, PlayerIndex};
use crate::schedule::{self, PairingSchedule, ScheduleContext, TournamentPlayer};
use crate::settings::{ScheduleKind, TournamentSettings};
use crate::sprt::{GameOutcome as SprtOutcome, Sprt, SprtResult};

struct GameData {
    white: PlayerIndex,
    black: PlayerIndex,
    control: Arc<GameControl>,
}

/// A complete tournament. Configure, add players, then [`Tournament::run`].
pub struct Tournament {
    settings: TournamentSettings,
    board_factory: Arc<dyn BoardFactory>,
    schedule: Box<dyn PairingSchedule>,
    ctx: ScheduleContext,
    manager: GameManager,
    rx: Receiver<TournamentEvent>,
    sprt: Option<Sprt>,
    opening_suite: Option<Box<dyn OpeningSuite>>,

    // opening caches
    cycle_openings: Vec<(Vec<String>, Option<String>)>,
    start_fen: Option<String>,
    opening_moves: Vec<String>,
    repetition_counter: usize,

    next_game_number: usize,
    finished_game_count: usize,
    resume_game_number: usize,
    current_pair: Option<PairId>,
    game_data: HashMap<usize, GameData>,
    stopping: bool,
    finished: bool,
    error: Option<String>,

    tournament_file_path: Option<PathBuf>,
    file: TournamentFile,
    pgn_writer: PgnWriter,
    epd_writer: EpdWriter,
    live: Option<Arc<LiveOutput>>,
    reload_hook: Option<Box<dyn FnMut() + Send>>,
}

impl Tournament {
    pub fn new(
        settings: TournamentSettings,
        board_factory: Arc<dyn BoardFactory>,
    ) -> Result<Tournament> {
        if board_factory.create(&settings.variant).is_none() {
            bail!("unsupported variant: {}", settings.variant);
        }
        if settings.kind == ScheduleKind::Swiss && settings.concurrency > 1 {
            bail!("Swiss pairing requires finished results between rounds; concurrency must be 1");
        }

        let schedule = schedule::create(settings.kind);
        let mut ctx = ScheduleContext::new(
            settings.games_per_encounter,
            if schedule.can_set_round_multiplier() {
                settings.round_multiplier
            } else {
                1
            },
        );
        ctx.seed_count = settings.seed_count;
        ctx.berger_schedule = settings.berger_schedule;
        ctx.swap_sides = settings.swap_sides;
        ctx.strikes_limit = settings.strikes;

        let (tx, rx) = mpsc::channel();
        let manager = GameManager::new(settings.concurrency, tx);

        let sprt = settings
            .sprt
            .map(|s| Sprt::new(s.elo0, s.elo1, s.alpha, s.beta));

        let live = settings.live_pgn_output.clone().map(|base| {
            Arc::new(LiveOutput::new(
                base,
                settings.live_pgn_out_mode.into(),
                true,
                true,
            ))
        });

        let pgn_writer = PgnWriter::new(
            settings.pgn_output.clone(),
            settings.pgn_out_mode.into(),
            true,
        );
        let epd_writer = EpdWriter::new(settings.epd_output.clone());
        let file = TournamentFile::new(settings.clone());

        Ok(Tournament {
            settings,
            board_factory,
            schedule,
            ctx,
            manager,
            rx,
            sprt,
            opening_suite: None,
            cycle_openings: Vec::new(),
            start_fen: None,
            opening_moves: Vec::new(),
            repetition_counter: 0,
            next_game_number: 0,
            finished_game_count: 0,
            resume_game_number: 0,
            current_pair: None,
            game_data: HashMap::new(),
            stopping: false,
            finished: false,
            error: None,
            tournament_file_path: None,
            file,
            pgn_writer,
            epd_writer,
            live,
            reload_hook: None,
        })
    }

    pub fn add_player(
        &mut self,
        builder: Arc<dyn PlayerBuilder>,
        time_control: TimeControl,
        book: Option<Arc<dyn OpeningBook>>,
        book_depth: usize,
    ) {
        self.ctx
            .players
            .push(TournamentPlayer::new(builder, time_control, book, book_depth));
    }

    pub fn set_opening_suite(&mut self, suite: Box<dyn OpeningSuite>) {
        self.opening_suite = Some(suite);
    }

    pub fn set_tournament_file(&mut self, path: PathBuf) {
        self.tournament_file_path = Some(path);
    }

    /// Engine configurations persisted into the tournament file, so a
    /// resumed run can rebuild the same engines.
    pub fn set_engine_settings(&mut self, engine_settings: EngineSettingsDoc) {
        self.file.engine_settings = engine_settings;
    }

    /// Called before every game; reloads engine configurations.
    pub fn set_engine_reload_hook(&mut self, hook: Box<dyn FnMut() + Send>) {
        self.reload_hook = Some(hook);
    }

    /// Prepares resumption from a persisted tournament file: recorded games
    /// are replayed through the schedule instead of being played again.
    pub fn resume(&mut self, file: TournamentFile) {
        self.resume_game_number = file.finished_game_count();
        for (i, entry) in file.match_progress.iter().enumerate() {
            if entry.result != "*" && !entry.result.is_empty() {
                self.schedule.add_resume_result(i, &entry.result);
            }
        }
        self.file.match_progress = file.match_progress;
        self.file.strikes = file.strikes;
        info!(games = self.resume_game_number, "resuming tournament");
    }

    pub fn finished_game_count(&self) -> usize {
        self.finished_game_count
    }

    pub fn final_game_count(&self) -> usize {
        self.ctx.final_game_count
    }

    pub fn player_score(&self, index: usize) -> i64 {
        self.ctx.players[index].score()
    }

    pub fn player_name(&self, index: usize) -> &str {
        self.ctx.players[index].name()
    }

    pub fn sprt_status(&self) -> Option<SprtResult> {
        self.sprt.as_ref().map(|s| s.status().result)
    }

    /// Runs the tournament to completion and returns the final ranking
    /// report.
    pub fn run(&mut self) -> Result<String> {
        self.start()?;

        while !self.finished {
            match self.rx.recv_timeout(Duration::from_millis(100)) {
                Ok(event) => self.handle_event(event)?,
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }
            self.check_completion()?;
        }

        if let Some(error) = self.error.take() {
            bail!("{error}");
        }
        Ok(self.results())
    }

    fn start(&mut self) -> Result<()> {
        if self.ctx.player_count() < 2 {
            bail!("a tournament needs at least two players");
        }

        self.ctx.set_current_round(1);
        self.schedule.initialize(&mut self.ctx)?;
        self.ctx.final_game_count = self.schedule.games_per_cycle(&self.ctx)
            * self.ctx.games_per_encounter
            * self.ctx.round_multiplier;

        if self.schedule.uses_berger(&self.ctx) {
            self.cycle_openings = vec![(Vec::new(), None); self.schedule.games_per_cycle(&self.ctx)];
        }

        // advance the schedule past already-played games
        for _ in 0..self.resume_game_number {
            let Some(pair) = self.schedule.next_pair(&mut self.ctx, self.next_game_number)? else {
                break;
            };
            let same = self
                .current_pair
                .map(|c| {
                    self.ctx
                        .pairs
                        .get(c)
                        .has_same_players(self.ctx.pairs.get(pair))
                })
                .unwrap_or(false);
            if !same && self.ctx.player_count() > 2 {
                self.start_fen = None;
                self.opening_moves.clear();
            }
            self.skip_game(pair, false)?;
        }

        self.fill()?;
        self.check_completion()
    }

    fn fill(&mut self) -> Result<()> {
        while !self.stopping && self.manager.has_capacity() {
            if !self.start_next_game()? {
                break;
            }
        }
        Ok(())
    }

    /// Launches (or skips) the next scheduled game. False when the schedule
    /// has no more pairs.
    fn start_next_game(&mut self) -> Result<bool> {
        if self.stopping {
            return Ok(false);
        }
        // operator stop sentinel, polled between games
        if self.settings.stop_sentinel.exists() {
            warn!(
                sentinel = %self.settings.stop_sentinel.display(),
                game = self.finished_game_count + 1,
                "stop sentinel found; stopping before the next game"
            );
            self.stop();
            return Ok(false);
        }

        loop {
            let Some(pair) = self.schedule.next_pair(&mut self.ctx, self.next_game_number)? else {
                return Ok(false);
            };
            if !self.ctx.pairs.get(pair).is_valid() {
                return Ok(false);
            }

            let needs_book_reset = self.schedule.reset_book(&self.ctx, pair);
            let same_players = self
                .current_pair
                .map(|c| {
                    self.ctx
                        .pairs
                        .get(c)
                        .has_same_players(self.ctx.pairs.get(pair))
                })
                .unwrap_or(false);
            if needs_book_reset || (!same_players && self.ctx.player_count() > 2) {
                self.start_fen = None;
                self.opening_moves.clear();
            }

            if self.ctx.strikes_limit > 0 {
                let white = self.ctx.pairs.get(pair).first_player();
                let black = self.ctx.pairs.get(pair).second_player();
                let struck = |p: PlayerIndex| {
                    self.ctx.player(p).total_strikes() >= self.ctx.strikes_limit
                };
                if struck(white) || struck(black) {
                    warn!(game = self.next_game_number + 1, "skipping game: player disqualified");
                    self.skip_game(pair, true)?;
                    continue;
                }
            }

            self.start_game(pair)?;
            return Ok(true);
        }
    }

    // shared opening setup for started and skipped games; keeps the suite
    // and repetition caches in the same state either way
    fn prepare_opening(&mut self, game: &mut ChessGame) -> Result<()> {
        let uses_berger = self.schedule.uses_berger(&self.ctx);
        let repetitions = self.settings.opening_repetitions.max(1);
        if uses_berger {
            let games_per_cycle = self.schedule.games_per_cycle(&self.ctx);
            let slot = self.next_game_number % games_per_cycle;
            let repeat = (self.next_game_number / games_per_cycle) % repetitions != 0;
            if repeat {
                let (moves, fen) = self.cycle_openings[slot].clone();
                if let Some(fen) = fen {
                    game.set_starting_fen(&fen)?;
                }
                game.set_moves(moves);
                game.generate_opening();
            } else {
                if let Some(suite) = self.opening_suite.as_mut() {
                    if let Some(opening) = suite.next_opening(self.settings.opening_depth) {
                        if let Some(fen) = &opening.fen {
                            game.set_starting_fen(fen)?;
                        }
                        game.set_moves(opening.moves);
                    }
                }
                game.generate_opening();
                self.cycle_openings[slot] =
                    (game.moves().to_vec(), game.starting_fen().map(str::to_string));
            }
        } else {
            if self.start_fen.is_some() || !self.opening_moves.is_empty() {
                if let Some(fen) = self.start_fen.clone() {
                    game.set_starting_fen(&fen)?;
                }
                game.set_moves(self.opening_moves.clone());
                self.start_fen = None;
                self.opening_moves.clear();
                self.repetition_counter += 1;
            } else {
                self.repetition_counter = 1;
                if let Some(suite) = self.opening_suite.as_mut() {
                    if let Some(opening) = suite.next_opening(self.settings.opening_depth) {
                        if let Some(fen) = &opening.fen {
                            game.set_starting_fen(fen)?;
                        }
                        game.set_moves(opening.moves);
                    }
                }
            }
            game.generate_opening();
            if self.repetition_counter < repetitions {
                self.start_fen = game.starting_fen().map(str::to_string);
                self.opening_moves = game.moves().to_vec();
            }
        }
        Ok(())
    }

    // Berger schedules normalize pair orientation to the cycle parity
    // instead of swapping between games.
    fn apply_side_swaps(&mut self, pair: PairId, before_game: bool) {
        let uses_berger = self.schedule.uses_berger(&self.ctx);
        if !self.ctx.swap_sides {
            return;
        }
        if before_game && uses_berger {
            let games_per_cycle = self.schedule.games_per_cycle(&self.ctx).max(1);
            let cycle_parity = (self.next_game_number / games_per_cycle) % 2;
            let original = usize::from(self.ctx.pairs.get(pair).has_original_order());
            if cycle_parity == original {
                self.ctx.pairs.get_mut(pair).swap_players();
            }
        }
        if !before_game && !uses_berger {
            self.ctx.pairs.get_mut(pair).swap_players();
        }
    }

    fn start_game(&mut self, pair: PairId) -> Result<()> {
        if let Some(hook) = self.reload_hook.as_mut() {
            hook();
        }

        self.current_pair = Some(pair);
        self.ctx.pairs.get_mut(pair).add_started_game();
        self.apply_side_swaps(pair, true);

        let white = self.ctx.pairs.get(pair).first_player();
        let black = self.ctx.pairs.get(pair).second_player();

        let board = self
            .board_factory
            .create(&self.settings.variant)
            .expect("variant was validated at construction");
        let mut game = ChessGame::new(board);

        let mut wtc = self.ctx.player(white).time_control().clone();
        let mut btc = self.ctx.player(black).time_control().clone();
        self.schedule.adjust_time_controls(
            &self.ctx,
            pair,
            &self.settings.tc_ladder,
            &mut wtc,
            &mut btc,
        );
        game.set_time_control(wtc, Side::White);
        game.set_time_control(btc, Side::Black);

        game.set_opening_book(
            self.ctx.player(white).book().cloned(),
            Side::White,
            self.ctx.player(white).book_depth(),
        );
        game.set_opening_book(
            self.ctx.player(black).book().cloned(),
            Side::Black,
            self.ctx.player(black).book_depth(),
        );
        game.set_live_output(self.live.clone());

        self.prepare_opening(&mut game)?;

        let number = self.next_game_number + 1;
        let games_per_round = self.schedule.games_per_round(&self.ctx);
        let game_in_round = if games_per_round > 0 {
            self.next_game_number % games_per_round + 1
        } else {
            number
        };
        let pgn = game.pgn_mut();
        pgn.event = self.settings.name.clone();
        pgn.site = self.settings.site.clone();
        pgn.round = format!("{}.{}", self.ctx.current_round(), game_in_round);

        game.set_start_delay(self.settings.start_delay());
        game.set_adjudicator(self.settings.build_adjudicator());

        self.game_data.insert(
            number,
            GameData {
                white,
                black,
                control: game.control(),
            },
        );
        self.next_game_number += 1;
        // some formats extend beyond the planned count
        if self.next_game_number > self.ctx.final_game_count {
            self.ctx.final_game_count = self.next_game_number;
        }

        self.ctx.players[white as usize].on_game_started();
        self.ctx.players[black as usize].on_game_started();

        // make sure the next game of the pair starts with reversed colors
        self.apply_side_swaps(pair, false);

        let white_builder = Arc::clone(self.ctx.player(white).builder());
        let black_builder = Arc::clone(self.ctx.player(black).builder());
        info!(
            game = number,
            white = self.ctx.player(white).name(),
            black = self.ctx.player(black).name(),
            "starting game"
        );
        self.manager.new_game(GameRequest {
            number,
            game,
            white: white_builder,
            black: black_builder,
            mode: StartMode::Enqueue,
            reuse: ReuseMode::ReusePlayers,
        });
        Ok(())
    }

    /// Advances all per-game bookkeeping without playing the game.
    fn skip_game(&mut self, pair: PairId, record: bool) -> Result<()> {
        self.current_pair = Some(pair);
        self.ctx.pairs.get_mut(pair).add_started_game();
        self.apply_side_swaps(pair, true);

        let white = self.ctx.pairs.get(pair).first_player();
        let black = self.ctx.pairs.get(pair).second_player();

        let board = self
            .board_factory
            .create(&self.settings.variant)
            .expect("variant was validated at construction");
        let mut game = ChessGame::new(board);
        game.set_opening_book(
            self.ctx.player(white).book().cloned(),
            Side::White,
            self.ctx.player(white).book_depth(),
        );
        game.set_opening_book(
            self.ctx.player(black).book().cloned(),
            Side::Black,
            self.ctx.player(black).book_depth(),
        );
        self.prepare_opening(&mut game)?;

        let number = self.next_game_number + 1;
        self.next_game_number += 1;
        self.finished_game_count += 1;
        if self.next_game_number > self.ctx.final_game_count {
            self.ctx.final_game_count = self.next_game_number;
        }
        self.pgn_writer.skip();

        if record && self.file.match_progress.len() < number {
            self.file.match_progress.resize_with(number, Default::default);
            let entry = &mut self.file.match_progress[number - 1];
            entry.index = number;
            entry.white = self.ctx.player(white).name().to_string();
            entry.black = self.ctx.player(black).name().to_string();
            entry.termination_details = "Canceled".to_string();
            self.save_tournament_file();
        }

        self.apply_side_swaps(pair, false);
        Ok(())
    }

    fn handle_event(&mut self, event: TournamentEvent) -> Result<()> {
        match event {
            TournamentEvent::GameStarted { number } => {
                self.on_game_started(number);
                Ok(())
            }
            TournamentEvent::GameFinished {
                number,
                outcome,
                players,
            } => self.on_game_finished(number, *outcome, players),
            TournamentEvent::GameStartFailed { number, error } => {
                warn!(game = number, error = %error, "game failed to start");
                self.game_data.remove(&number);
                self.error = Some(error);
                self.stop();
                Ok(())
            }
        }
    }

    fn on_game_started(&mut self, number: usize) {
        let Some(data) = self.game_data.get(&number) else {
            return;
        };
        if self.file.match_progress.len() < number {
            self.file
                .match_progress
                .resize_with(number, Default::default);
        }
        let entry = &mut self.file.match_progress[number - 1];
        entry.index = number;
        entry.white = self.ctx.player(data.white).name().to_string();
        entry.black = self.ctx.player(data.black).name().to_string();
        entry.result = "*".to_string();
        self.save_tournament_file();
    }

    fn on_game_finished(
        &mut self,
        number: usize,
        outcome: GameOutcome,
        players: Vec<(String, Box<dyn engine_interface::ChessPlayer>)>,
    ) -> Result<()> {
        self.finished_game_count += 1;
        let Some(data) = self.game_data.remove(&number) else {
            bail!("finished game {number} was never started");
        };
        let (white, black) = (data.white, data.black);

        self.ctx.players[white as usize].set_name(outcome.white_name.clone());
        self.ctx.players[black as usize].set_name(outcome.black_name.clone());

        // score accumulation, with the disconnection penalty
        let mut sprt_outcome = None;
        match outcome.result.winner {
            Some(Side::White) => {
                self.schedule.add_score(&mut self.ctx, white, 2);
                let penalty = matches!(
                    outcome.result.kind,
                    ResultKind::Disconnection | ResultKind::StalledConnection
                );
                self.schedule
                    .add_score(&mut self.ctx, black, if penalty { -1 } else { 0 });
                sprt_outcome = Some(if white == 0 {
                    SprtOutcome::Win
                } else {
                    SprtOutcome::Loss
                });
            }
            Some(Side::Black) => {
                self.schedule.add_score(&mut self.ctx, black, 2);
                let penalty = matches!(
                    outcome.result.kind,
                    ResultKind::Disconnection | ResultKind::StalledConnection
                );
                self.schedule
                    .add_score(&mut self.ctx, white, if penalty { -1 } else { 0 });
                sprt_outcome = Some(if black == 0 {
                    SprtOutcome::Win
                } else {
                    SprtOutcome::Loss
                });
            }
            None if outcome.result.is_draw() => {
                self.schedule.add_score(&mut self.ctx, white, 1);
                self.schedule.add_score(&mut self.ctx, black, 1);
                sprt_outcome = Some(SprtOutcome::Draw);
            }
            None => {}
        }

        // crashes and strikes
        let crashed = matches!(
            outcome.result.kind,
            ResultKind::Disconnection | ResultKind::StalledConnection
        );
        if crashed {
            if let Some(loser) = outcome.result.loser() {
                let offender = if loser == Side::White { white } else { black };
                self.ctx.players[offender as usize].add_crash();
                let name = self.ctx.player(offender).name().to_string();
                let strikes = self.ctx.player(offender).total_strikes();
                self.file.strikes.insert(name, strikes);
            }
            if !self.settings.recover {
                self.stop();
            }
        }

        self.epd_writer.write(&outcome.final_fen);
        if let Err(e) = self.pgn_writer.add(
            number,
            outcome.pgn.clone(),
            outcome.result.is_faulty(),
            self.stopping,
        ) {
            warn!(error = %e, "could not write PGN game {number}");
        }

        self.record_progress(number, &outcome);
        info!(
            game = number,
            result = %outcome.result,
            finished = self.finished_game_count,
            of = self.ctx.final_game_count,
            "game finished"
        );

        if self.settings.rating_interval > 0
            && self.finished_game_count % self.settings.rating_interval == 0
        {
            info!("\n{}", self.results());
        }

        if let (Some(sprt), Some(result)) = (self.sprt.as_mut(), sprt_outcome) {
            sprt.add_result(result);
            let status = sprt.status();
            if status.result != SprtResult::Continue {
                info!(llr = status.llr, "SPRT decision reached; stopping");
                self.stop();
            }
        }

        self.manager.on_game_finished(players);
        self.fill()?;
        Ok(())
    }

    fn record_progress(&mut self, number: usize, outcome: &GameOutcome) {
        if self.file.match_progress.len() < number {
            self.file
                .match_progress
                .resize_with(number, Default::default);
        }
        let eco_entry = eco::catalog().classify(&outcome.moves_san);
        let entry = &mut self.file.match_progress[number - 1];
        entry.index = number;
        entry.white = outcome.white_name.clone();
        entry.black = outcome.black_name.clone();
        entry.result = outcome.result.score_string().to_string();
        entry.termination_details = outcome.result.termination();
        entry.game_duration = format_duration(outcome.duration);
        entry.start_time = outcome.start_time.clone();
        entry.final_fen = outcome.final_fen.clone();
        entry.ply_count = outcome.ply_count;
        entry.white_eval = outcome.white_eval.clone();
        entry.black_eval = outcome.black_eval.clone();
        if let Some(eco_entry) = eco_entry {
            entry.eco = eco_entry.code.clone();
            entry.opening = eco_entry.opening.clone();
            entry.variation = eco_entry.variation.clone();
        }
        self.save_tournament_file();
        self.write_artifacts();
    }

    fn save_tournament_file(&mut self) {
        let Some(path) = &self.tournament_file_path else {
            return;
        };
        if let Err(e) = self.file.save(path) {
            warn!(error = %e, "could not write the tournament file");
        }
    }

    fn write_artifacts(&mut self) {
        let Some(path) = self.tournament_file_path.clone() else {
            return;
        };

        let players: Vec<CrosstablePlayer> = self
            .ctx
            .players
            .iter()
            .map(|p| CrosstablePlayer {
                name: p.name().to_string(),
                rating: p.builder().rating(),
                crashes: p.crashes(),
                builder_strikes: p.builder().strikes(),
            })
            .collect();

        let crosstable = Crosstable::build(
            &players,
            &self.file.match_progress,
            self.ctx.strikes_limit,
            self.settings.elo_k_factor,
        );
        if let Err(e) = crosstable.write(&path) {
            warn!(error = %e, "could not write the crosstable");
        }

        let disqualified = players
            .iter()
            .map(|p| {
                (
                    p.name.clone(),
                    self.ctx.strikes_limit > 0
                        && p.crashes + p.builder_strikes >= self.ctx.strikes_limit,
                )
            })
            .collect();
        let pairings = self.schedule.pairings(&self.ctx);
        if let Err(e) = crate::output::write_schedule(
            &path,
            &pairings,
            &self.file.match_progress,
            &disqualified,
            true,
            true,
        ) {
            warn!(error = %e, "could not write the schedule");
        }
    }

    fn check_completion(&mut self) -> Result<()> {
        if self.finished {
            return Ok(());
        }
        let all_done = self
            .schedule
            .all_games_finished(&self.ctx, self.finished_game_count);
        if (all_done || self.stopping)
            && self.manager.active_games() == 0
            && self.game_data.is_empty()
        {
            self.manager.cleanup();
            self.save_tournament_file();
            self.write_artifacts();
            self.finished = true;
        }
        Ok(())
    }

    /// Stops cleanly: no new games are launched, running games are asked to
    /// finalize with their current state. Idempotent.
    pub fn stop(&mut self) {
        if self.stopping {
            return;
        }
        self.stopping = true;
        for data in self.game_data.values() {
            data.control.stop();
        }
    }

    /// The plain-text ranking report.
    pub fn results(&self) -> String {
        let mut ret = String::new();

        if self.ctx.player_count() == 2 {
            let player = &self.ctx.players[0];
            let elo = Elo::new(
                u64::from(player.wins()),
                u64::from(player.losses()),
                u64::from(player.draws()),
            );
            ret += &format!(
                "Elo difference: {:.2} +/- {:.2}",
                elo.diff(),
                elo.error_margin()
            );
        } else {
            struct RankingRow {
                name: String,
                games: u64,
                score: f64,
                draws: f64,
                error_margin: f64,
                elo_diff: f64,
            }

            let mut rows: Vec<(f64, RankingRow)> = Vec::new();
            for (i, player) in self.ctx.players.iter().enumerate() {
                let elo = Elo::new(
                    u64::from(player.wins()),
                    u64::from(player.losses()),
                    u64::from(player.draws()),
                );
                let row = RankingRow {
                    name: player.name().to_string(),
                    games: elo.games(),
                    score: elo.point_ratio(),
                    draws: elo.draw_ratio(),
                    error_margin: elo.error_margin(),
                    elo_diff: elo.diff(),
                };
                // gauntlet player first, then by score, then the idle
                let key = if i == 0 && self.schedule.has_gauntlet_ratings_order() {
                    -1.0
                } else if row.games > 0 {
                    1.0 - row.score
                } else {
                    2.0
                };
                rows.push((key, row));
            }
            rows.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));

            ret += &format!(
                "{:>4} {:<25} {:>7} {:>7} {:>7} {:>7} {:>7}",
                "Rank", "Name", "Elo", "+/-", "Games", "Score", "Draws"
            );
            let mut rank = if self.schedule.has_gauntlet_ratings_order() {
                -1i32
            } else {
                0
            };
            for (_, row) in &rows {
                rank += 1;
                ret += &format!(
                    "\n{:>4} {:<25} {:>7.0} {:>7.0} {:>7} {:>6.1}% {:>6.1}%",
                    rank,
                    row.name,
                    row.elo_diff,
                    row.error_margin,
                    row.games,
                    row.score * 100.0,
                    row.draws * 100.0
                );
            }
        }

        if let Some(sprt) = &self.sprt {
            let status = sprt.status();
            if status.llr != 0.0 || status.l_bound != 0.0 || status.u_bound != 0.0 {
                let mut line = format!(
                    "SPRT: llr {:.3}, lbound {:.3}, ubound {:.3}",
                    status.llr, status.l_bound, status.u_bound
                );
                match status.result {
                    SprtResult::AcceptH0 => line += " - H0 was accepted",
                    SprtResult::AcceptH1 => line += " - H1 was accepted",
                    SprtResult::Continue => {}
                }
                ret += "\n";
                ret += &line;
            }
        }

        ret
    }
}
