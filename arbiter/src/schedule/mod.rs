//! Pairing schedules.
//!
//! A schedule decides, for each game number, which two players meet and with
//! which colors. The controller owns the roster and pair arena in a
//! [`ScheduleContext`] and hands it to the active schedule; schedules keep
//! only their format-specific state (rotation tables, encounter history,
//! brackets).
//!
//! Provided schedules:
//! - [`RoundRobinSchedule`]: everyone meets everyone, naive rotation or
//!   Berger table.
//! - [`SwissSchedule`]: score-ordered pairing with encounter history and
//!   color balancing, pairability checked by blossom matching.
//! - [`KnockoutSchedule`]: seeded single-elimination bracket with tie-break
//!   extensions.
//! - [`GauntletSchedule`]: designated players meet each other entrant in
//!   turn.

use std::sync::Arc;

use anyhow::Result;
use engine_interface::{OpeningBook, PlayerBuilder, TimeControl};

use crate::pair::{PairArena, PairId, PlayerIndex};
use crate::settings::{ScheduleKind, TcLadderRung};

mod gauntlet;
mod knockout;
mod round_robin;
mod swiss;

pub use gauntlet::GauntletSchedule;
pub use knockout::KnockoutSchedule;
pub use round_robin::RoundRobinSchedule;
pub use swiss::SwissSchedule;

/// One entrant and its cumulative record.
pub struct TournamentPlayer {
    builder: Arc<dyn PlayerBuilder>,
    name: String,
    book: Option<Arc<dyn OpeningBook>>,
    book_depth: usize,
    time_control: TimeControl,
    wins: u32,
    losses: u32,
    draws: u32,
    crashes: u32,
    games_started: u32,
    games_finished: u32,
    score: i64,
}

impl TournamentPlayer {
    pub fn new(
        builder: Arc<dyn PlayerBuilder>,
        time_control: TimeControl,
        book: Option<Arc<dyn OpeningBook>>,
        book_depth: usize,
    ) -> TournamentPlayer {
        TournamentPlayer {
            name: builder.name(),
            builder,
            book,
            book_depth,
            time_control,
            wins: 0,
            losses: 0,
            draws: 0,
            crashes: 0,
            games_started: 0,
            games_finished: 0,
            score: 0,
        }
    }

    pub fn builder(&self) -> &Arc<dyn PlayerBuilder> {
        &self.builder
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Replaces the configured name with the one the engine reported.
    pub fn set_name(&mut self, name: impl Into<String>) {
        let name = name.into();
        if !name.is_empty() {
            self.name = name;
        }
    }

    pub fn book(&self) -> Option<&Arc<dyn OpeningBook>> {
        self.book.as_ref()
    }

    pub fn book_depth(&self) -> usize {
        self.book_depth
    }

    pub fn time_control(&self) -> &TimeControl {
        &self.time_control
    }

    pub fn wins(&self) -> u32 {
        self.wins
    }

    pub fn losses(&self) -> u32 {
        self.losses
    }

    pub fn draws(&self) -> u32 {
        self.draws
    }

    pub fn crashes(&self) -> u32 {
        self.crashes
    }

    pub fn add_crash(&mut self) {
        self.crashes += 1;
    }

    /// Crashes this run plus strikes carried in by the builder.
    pub fn total_strikes(&self) -> u32 {
        self.crashes + self.builder.strikes()
    }

    pub fn games_started(&self) -> u32 {
        self.games_started
    }

    pub fn games_finished(&self) -> u32 {
        self.games_finished
    }

    pub fn on_game_started(&mut self) {
        self.games_started += 1;
    }

    pub fn score(&self) -> i64 {
        self.score
    }

    /// Credits `score` points (2 win / 1 draw / 0 loss / -1 penalty) and the
    /// per-outcome counter.
    pub fn add_score(&mut self, score: i32) {
        self.score += score as i64;
        match score {
            2 => self.wins += 1,
            1 => self.draws += 1,
            s if s <= 0 => self.losses += 1,
            _ => {}
        }
        self.games_finished += 1;
    }
}

/// Roster, pair arena and shared counters handed to the active schedule.
pub struct ScheduleContext {
    pub players: Vec<TournamentPlayer>,
    pub pairs: PairArena,
    pub games_per_encounter: usize,
    pub round_multiplier: usize,
    pub seed_count: usize,
    pub berger_schedule: bool,
    pub swap_sides: bool,
    /// Strike count that disqualifies a player; 0 disables strikes.
    pub strikes_limit: u32,
    pub final_game_count: usize,
    current_round: usize,
}

impl ScheduleContext {
    pub fn new(games_per_encounter: usize, round_multiplier: usize) -> ScheduleContext {
        ScheduleContext {
            players: Vec::new(),
            pairs: PairArena::new(),
            games_per_encounter: games_per_encounter.max(1),
            round_multiplier: round_multiplier.max(1),
            seed_count: 0,
            berger_schedule: false,
            swap_sides: true,
            strikes_limit: 0,
            final_game_count: 0,
            current_round: 1,
        }
    }

    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    pub fn player(&self, index: PlayerIndex) -> &TournamentPlayer {
        &self.players[index as usize]
    }

    pub fn current_round(&self) -> usize {
        self.current_round
    }

    pub fn set_current_round(&mut self, round: usize) {
        debug_assert!(round >= 1);
        self.current_round = round;
    }

    pub fn pair(&mut self, player1: PlayerIndex, player2: PlayerIndex) -> PairId {
        self.pairs.pair(player1, player2)
    }

    pub fn add_score(&mut self, player: PlayerIndex, score: i32) {
        if player >= 0 {
            self.players[player as usize].add_score(score);
        }
    }
}

/// A tournament format.
///
/// `next_pair` may mutate pair orientations in the arena so that the
/// returned pair's first player takes white.
pub trait PairingSchedule: Send {
    fn kind(&self) -> ScheduleKind;

    fn initialize(&mut self, ctx: &mut ScheduleContext) -> Result<()>;

    /// Games in one full cycle of the format (color swaps excluded).
    fn games_per_cycle(&self, ctx: &ScheduleContext) -> usize;

    /// Games per round, used for round numbering in reports; 0 when rounds
    /// have no fixed size.
    fn games_per_round(&self, ctx: &ScheduleContext) -> usize;

    /// The pair for game `game_number`, or `None` when the schedule is
    /// exhausted.
    fn next_pair(&mut self, ctx: &mut ScheduleContext, game_number: usize)
        -> Result<Option<PairId>>;

    /// Feeds a result recorded in a resumed tournament file. The schedule
    /// replays it when the corresponding game number is requested.
    fn add_resume_result(&mut self, _game_number: usize, _result: &str) {}

    /// Credits points to a player. Formats that track per-encounter scores
    /// (knockout) hook in here.
    fn add_score(&mut self, ctx: &mut ScheduleContext, player: PlayerIndex, score: i32) {
        ctx.add_score(player, score);
    }

    /// The full planned pairing list (names), for schedule artifacts. Pairs
    /// not yet decided are empty.
    fn pairings(&self, _ctx: &ScheduleContext) -> Vec<(String, String)> {
        Vec::new()
    }

    /// Adjusts the per-game time controls; knockout shortens them as an
    /// encounter drags on.
    fn adjust_time_controls(
        &self,
        _ctx: &ScheduleContext,
        _pair: PairId,
        _ladder: &[TcLadderRung],
        _white: &mut TimeControl,
        _black: &mut TimeControl,
    ) {
    }

    /// True when the forced-opening state should be cleared before this
    /// pair's next game.
    fn reset_book(&self, _ctx: &ScheduleContext, _pair: PairId) -> bool {
        false
    }

    /// Whether every scheduled game has finished. Formats with open-ended
    /// extensions override this.
    fn all_games_finished(&self, ctx: &ScheduleContext, finished_games: usize) -> bool {
        finished_games >= ctx.final_game_count
    }

    fn can_set_round_multiplier(&self) -> bool {
        true
    }

    /// True when the round-robin Berger color-swap bookkeeping applies.
    fn uses_berger(&self, _ctx: &ScheduleContext) -> bool {
        false
    }

    /// Gauntlet reports pin the gauntlet player to the top of the ranking.
    fn has_gauntlet_ratings_order(&self) -> bool {
        false
    }
}

/// Instantiates the schedule for a kind.
pub fn create(kind: ScheduleKind) -> Box<dyn PairingSchedule> {
    match kind {
        ScheduleKind::RoundRobin => Box::new(RoundRobinSchedule::new()),
        ScheduleKind::Swiss => Box::new(SwissSchedule::new()),
        ScheduleKind::Knockout => Box::new(KnockoutSchedule::new()),
        ScheduleKind::Gauntlet => Box::new(GauntletSchedule::new()),
    }
}
