//! Tournament and engine configuration.
//!
//! `TournamentSettings` is both the runtime configuration and the
//! `tournamentSettings` document persisted in the tournament file, so its
//! serde names follow the file format.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::adjudicator::GameAdjudicator;

/// Which pairing schedule runs the tournament.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScheduleKind {
    #[serde(rename = "round-robin")]
    RoundRobin,
    #[serde(rename = "swiss-tcec")]
    Swiss,
    #[serde(rename = "knockout")]
    Knockout,
    #[serde(rename = "gauntlet")]
    Gauntlet,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PgnOutMode {
    Verbose,
    Minimal,
}

impl From<PgnOutMode> for engine_interface::PgnMode {
    fn from(mode: PgnOutMode) -> engine_interface::PgnMode {
        match mode {
            PgnOutMode::Verbose => engine_interface::PgnMode::Verbose,
            PgnOutMode::Minimal => engine_interface::PgnMode::Minimal,
        }
    }
}

/// Draw adjudication thresholds (`-draw movenumber=.. movecount=.. score=..`).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DrawAdjudication {
    #[serde(rename = "movenumber")]
    pub move_number: u32,
    #[serde(rename = "movecount")]
    pub move_count: u32,
    pub score: i32,
}

/// Resign adjudication thresholds (`-resign movecount=.. score=..`).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResignAdjudication {
    #[serde(rename = "movecount")]
    pub move_count: u32,
    pub score: i32,
}

/// SPRT parameters (`-sprt elo0=.. elo1=.. alpha=.. beta=..`).
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SprtSettings {
    pub elo0: f64,
    pub elo1: f64,
    pub alpha: f64,
    pub beta: f64,
}

/// One rung of the knockout time-control ladder: once the combined score of
/// an encounter reaches `score`, both clocks are replaced by
/// `time_ms` + `increment_ms`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TcLadderRung {
    pub score: u32,
    #[serde(rename = "timeMs")]
    pub time_ms: u64,
    #[serde(rename = "incrementMs")]
    pub increment_ms: u64,
}

/// The classic TCEC superfinal ladder.
pub fn default_tc_ladder() -> Vec<TcLadderRung> {
    vec![
        TcLadderRung { score: 128, time_ms: 60_000, increment_ms: 1_000 },
        TcLadderRung { score: 112, time_ms: 120_000, increment_ms: 1_000 },
        TcLadderRung { score: 96, time_ms: 240_000, increment_ms: 2_000 },
        TcLadderRung { score: 80, time_ms: 480_000, increment_ms: 3_000 },
        TcLadderRung { score: 64, time_ms: 960_000, increment_ms: 4_000 },
    ]
}

/// Tournament-wide configuration, persisted as `tournamentSettings`.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct TournamentSettings {
    #[serde(rename = "type")]
    pub kind: ScheduleKind,
    pub name: String,
    pub site: String,
    pub variant: String,
    pub concurrency: usize,
    #[serde(rename = "gamesPerEncounter")]
    pub games_per_encounter: usize,
    #[serde(rename = "roundMultiplier")]
    pub round_multiplier: usize,
    #[serde(rename = "openingRepetitions")]
    pub opening_repetitions: usize,
    pub openings: Option<String>,
    pub bookmode: Option<String>,
    #[serde(rename = "drawAdjudication")]
    pub draw_adjudication: Option<DrawAdjudication>,
    #[serde(rename = "resignAdjudication")]
    pub resign_adjudication: Option<ResignAdjudication>,
    #[serde(rename = "tcecAdjudication")]
    pub tcec_adjudication: bool,
    #[serde(rename = "maxMoves")]
    pub max_moves: u32,
    pub tb: Option<PathBuf>,
    #[serde(rename = "tbPieces")]
    pub tb_pieces: u32,
    #[serde(rename = "tbIgnore50")]
    pub tb_ignore_50: bool,
    pub sprt: Option<SprtSettings>,
    #[serde(rename = "ratingInterval")]
    pub rating_interval: usize,
    #[serde(rename = "pgnOutput")]
    pub pgn_output: Option<PathBuf>,
    #[serde(rename = "pgnOutMode")]
    pub pgn_out_mode: PgnOutMode,
    #[serde(rename = "livePgnOutput")]
    pub live_pgn_output: Option<PathBuf>,
    #[serde(rename = "livePgnOutMode")]
    pub live_pgn_out_mode: PgnOutMode,
    #[serde(rename = "epdOutput")]
    pub epd_output: Option<PathBuf>,
    #[serde(rename = "pgnCleanupEnabled")]
    pub pgn_cleanup_enabled: bool,
    #[serde(rename = "swapSides")]
    pub swap_sides: bool,
    #[serde(rename = "bergerSchedule")]
    pub berger_schedule: bool,
    #[serde(rename = "eventDate")]
    pub event_date: String,
    pub srand: u64,
    #[serde(rename = "startDelay")]
    pub start_delay_ms: u64,
    #[serde(rename = "eloKfactor")]
    pub elo_k_factor: f64,
    /// Strike count that disqualifies a player; 0 disables strikes.
    pub strikes: u32,
    #[serde(rename = "seedCount")]
    pub seed_count: usize,
    #[serde(rename = "openingDepth")]
    pub opening_depth: usize,
    /// Keep playing after a crash (strike) instead of stopping.
    pub recover: bool,
    #[serde(rename = "tcLadder")]
    pub tc_ladder: Vec<TcLadderRung>,
    /// Operator stop sentinel, polled between games.
    #[serde(rename = "stopSentinel")]
    pub stop_sentinel: PathBuf,
}

impl Default for TournamentSettings {
    fn default() -> TournamentSettings {
        TournamentSettings {
            kind: ScheduleKind::RoundRobin,
            name: String::new(),
            site: String::new(),
            variant: "standard".to_string(),
            concurrency: 1,
            games_per_encounter: 1,
            round_multiplier: 1,
            opening_repetitions: 1,
            openings: None,
            bookmode: None,
            draw_adjudication: None,
            resign_adjudication: None,
            tcec_adjudication: false,
            max_moves: 0,
            tb: None,
            tb_pieces: 6,
            tb_ignore_50: false,
            sprt: None,
            rating_interval: 0,
            pgn_output: None,
            pgn_out_mode: PgnOutMode::Verbose,
            live_pgn_output: None,
            live_pgn_out_mode: PgnOutMode::Verbose,
            epd_output: None,
            pgn_cleanup_enabled: true,
            swap_sides: true,
            berger_schedule: false,
            event_date: String::new(),
            srand: 0,
            start_delay_ms: 0,
            elo_k_factor: 8.0,
            strikes: 0,
            seed_count: 0,
            opening_depth: 1024,
            recover: false,
            tc_ladder: default_tc_ladder(),
            stop_sentinel: PathBuf::from("failed.txt"),
        }
    }
}

impl TournamentSettings {
    pub fn new(kind: ScheduleKind) -> TournamentSettings {
        TournamentSettings {
            kind,
            ..TournamentSettings::default()
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_site(mut self, site: impl Into<String>) -> Self {
        self.site = site.into();
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_games_per_encounter(mut self, games: usize) -> Self {
        self.games_per_encounter = games.max(1);
        self
    }

    pub fn with_round_multiplier(mut self, factor: usize) -> Self {
        self.round_multiplier = factor.max(1);
        self
    }

    pub fn with_swap_sides(mut self, enabled: bool) -> Self {
        self.swap_sides = enabled;
        self
    }

    pub fn with_berger_schedule(mut self, enabled: bool) -> Self {
        self.berger_schedule = enabled;
        self
    }

    pub fn with_sprt(mut self, sprt: SprtSettings) -> Self {
        self.sprt = Some(sprt);
        self
    }

    pub fn with_strikes(mut self, strikes: u32) -> Self {
        self.strikes = strikes;
        self
    }

    pub fn with_seed_count(mut self, seeds: usize) -> Self {
        self.seed_count = seeds;
        self
    }

    pub fn with_srand(mut self, seed: u64) -> Self {
        self.srand = seed;
        self
    }

    pub fn start_delay(&self) -> Duration {
        Duration::from_millis(self.start_delay_ms)
    }

    /// A fresh adjudicator configured from these settings.
    pub fn build_adjudicator(&self) -> GameAdjudicator {
        let mut adjudicator = GameAdjudicator::new();
        if let Some(draw) = &self.draw_adjudication {
            adjudicator.set_draw_threshold(draw.move_number, draw.move_count, draw.score);
        }
        if let Some(resign) = &self.resign_adjudication {
            adjudicator.set_resign_threshold(resign.move_count, resign.score);
        }
        if self.max_moves > 0 {
            adjudicator.set_maximum_game_length(self.max_moves);
        }
        adjudicator.set_tablebase_adjudication(self.tb.is_some());
        adjudicator.set_tcec_adjudication(self.tcec_adjudication);
        adjudicator
    }
}

/// Static configuration of one engine, mirroring the `-engine` option set.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfiguration {
    pub name: String,
    #[serde(rename = "cmd")]
    pub command: String,
    #[serde(rename = "dir")]
    pub working_dir: Option<PathBuf>,
    #[serde(rename = "args")]
    pub arguments: Vec<String>,
    #[serde(rename = "proto")]
    pub protocol: String,
    #[serde(rename = "initStrings")]
    pub init_strings: Vec<String>,
    pub restart: RestartPolicy,
    /// Result claims from this engine are trusted without verification.
    #[serde(rename = "trust")]
    pub claims_trusted: bool,
    pub ponder: bool,
    pub rating: i32,
    pub options: BTreeMap<String, String>,
    #[serde(rename = "stderrFile")]
    pub stderr_file: Option<PathBuf>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RestartPolicy {
    #[default]
    Auto,
    On,
    Off,
}
