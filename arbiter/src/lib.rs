//! Automated chess-engine tournament core.
//!
//! The arbiter runs engine-vs-engine tournaments: it schedules pairings
//! (round-robin, Swiss, knockout, gauntlet), drives each game through the
//! engine adapters, adjudicates early results, aggregates standings with
//! Elo estimates and SPRT early stopping, and persists everything to a
//! resumable tournament file plus PGN/EPD/crosstable/schedule artifacts.
//!
//! Chess itself is someone else's job: boards, engine protocols and opening
//! books come in through the traits of the `engine-interface` crate.
//!
//! # Overview
//!
//! ```no_run
//! use std::sync::Arc;
//! use arbiter::engine_interface::{BoardFactory, PlayerBuilder, TimeControl};
//! use arbiter::settings::{ScheduleKind, TournamentSettings};
//! use arbiter::tournament::Tournament;
//! # fn factory() -> Arc<dyn BoardFactory> { unimplemented!() }
//! # fn engines() -> Vec<Arc<dyn PlayerBuilder>> { unimplemented!() }
//!
//! let settings = TournamentSettings::new(ScheduleKind::RoundRobin)
//!     .with_name("nightly gauntlet")
//!     .with_games_per_encounter(2);
//! let mut tournament = Tournament::new(settings, factory()).unwrap();
//! for engine in engines() {
//!     tournament.add_player(engine, TimeControl::infinite(), None, 0);
//! }
//! let report = tournament.run().unwrap();
//! println!("{report}");
//! ```

pub mod adjudicator;
pub mod eco;
pub mod elo;
pub mod game;
pub mod logging;
pub mod manager;
pub mod matching;
pub mod output;
pub mod pair;
pub mod schedule;
pub mod settings;
pub mod sprt;
pub mod tournament;

pub use engine_interface;
