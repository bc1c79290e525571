//! Time controls and in-game clock state.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// A time control plus the mutable clock state of one player during a game.
///
/// Exactly one of the limit families applies: infinite, fixed time per move,
/// moves/time + increment, node limit or depth limit. Node and depth limits
/// are forwarded to the engine; the clock is only enforced for the timed
/// families. `expiry_margin_ms` is the extra slack allowed past zero before
/// a flag fall is called.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TimeControl {
    infinite: bool,
    time_per_tc_ms: u64,
    moves_per_tc: u32,
    increment_ms: u64,
    time_per_move_ms: u64,
    node_limit: u64,
    depth_limit: u32,
    expiry_margin_ms: u64,
    // clock state, mutated during a game
    time_left_ms: i64,
    moves_left: u32,
}

impl TimeControl {
    pub fn infinite() -> TimeControl {
        TimeControl {
            infinite: true,
            ..TimeControl::default()
        }
    }

    /// `moves` moves in `time`, with `increment` added per move. `moves == 0`
    /// means the whole game must fit in `time`.
    pub fn tournament(moves: u32, time: Duration, increment: Duration) -> TimeControl {
        TimeControl {
            time_per_tc_ms: time.as_millis() as u64,
            moves_per_tc: moves,
            increment_ms: increment.as_millis() as u64,
            ..TimeControl::default()
        }
    }

    pub fn fixed_time_per_move(time: Duration) -> TimeControl {
        TimeControl {
            time_per_move_ms: time.as_millis() as u64,
            ..TimeControl::default()
        }
    }

    pub fn node_limit(nodes: u64) -> TimeControl {
        TimeControl {
            node_limit: nodes,
            ..TimeControl::default()
        }
    }

    pub fn depth_limit(depth: u32) -> TimeControl {
        TimeControl {
            depth_limit: depth,
            ..TimeControl::default()
        }
    }

    pub fn with_expiry_margin(mut self, margin: Duration) -> TimeControl {
        self.expiry_margin_ms = margin.as_millis() as u64;
        self
    }

    pub fn is_valid(&self) -> bool {
        self.infinite
            || self.time_per_tc_ms > 0
            || self.time_per_move_ms > 0
            || self.node_limit > 0
            || self.depth_limit > 0
    }

    pub fn is_infinite(&self) -> bool {
        self.infinite
    }

    pub fn time_per_tc_ms(&self) -> u64 {
        self.time_per_tc_ms
    }

    pub fn moves_per_tc(&self) -> u32 {
        self.moves_per_tc
    }

    pub fn increment_ms(&self) -> u64 {
        self.increment_ms
    }

    pub fn time_per_move_ms(&self) -> u64 {
        self.time_per_move_ms
    }

    pub fn node_limit_value(&self) -> u64 {
        self.node_limit
    }

    pub fn depth_limit_value(&self) -> u32 {
        self.depth_limit
    }

    pub fn expiry_margin_ms(&self) -> u64 {
        self.expiry_margin_ms
    }

    /// Replaces the base thinking time; used by schedules that shorten the
    /// control as an encounter drags on.
    pub fn set_time_per_tc(&mut self, time: Duration) {
        self.time_per_tc_ms = time.as_millis() as u64;
    }

    pub fn set_increment(&mut self, increment: Duration) {
        self.increment_ms = increment.as_millis() as u64;
    }

    /// Resets the clock for a new game.
    pub fn start_game(&mut self) {
        if self.time_per_move_ms > 0 {
            self.time_left_ms = self.time_per_move_ms as i64;
        } else {
            self.time_left_ms = self.time_per_tc_ms as i64;
        }
        self.moves_left = self.moves_per_tc;
    }

    /// Milliseconds left on the clock (may be negative before the flag falls
    /// thanks to the expiry margin).
    pub fn time_left_ms(&self) -> i64 {
        self.time_left_ms
    }

    pub fn moves_left(&self) -> u32 {
        self.moves_left
    }

    /// The wall-clock budget for the next move, including the expiry margin,
    /// or `None` when the control does not bound thinking time.
    pub fn move_deadline(&self) -> Option<Duration> {
        if self.infinite || (self.time_per_tc_ms == 0 && self.time_per_move_ms == 0) {
            return None;
        }
        let budget = if self.time_per_move_ms > 0 {
            self.time_per_move_ms as i64
        } else {
            self.time_left_ms
        };
        let total = budget + self.expiry_margin_ms as i64;
        Some(Duration::from_millis(total.max(0) as u64))
    }

    /// Charges `elapsed` for the move just played and applies increment and
    /// period refills. Returns false on a flag fall.
    pub fn on_move_made(&mut self, elapsed: Duration) -> bool {
        if self.infinite || (self.time_per_tc_ms == 0 && self.time_per_move_ms == 0) {
            return true;
        }
        if self.time_per_move_ms > 0 {
            let left = self.time_per_move_ms as i64 - elapsed.as_millis() as i64;
            self.time_left_ms = self.time_per_move_ms as i64;
            return left >= -(self.expiry_margin_ms as i64);
        }

        self.time_left_ms -= elapsed.as_millis() as i64;
        if self.time_left_ms < -(self.expiry_margin_ms as i64) {
            return false;
        }
        self.time_left_ms += self.increment_ms as i64;
        if self.moves_per_tc > 0 {
            self.moves_left = self.moves_left.saturating_sub(1);
            if self.moves_left == 0 {
                self.moves_left = self.moves_per_tc;
                self.time_left_ms += self.time_per_tc_ms as i64;
            }
        }
        true
    }
}

impl Default for TimeControl {
    fn default() -> TimeControl {
        TimeControl {
            infinite: false,
            time_per_tc_ms: 0,
            moves_per_tc: 0,
            increment_ms: 0,
            time_per_move_ms: 0,
            node_limit: 0,
            depth_limit: 0,
            expiry_margin_ms: 0,
            time_left_ms: 0,
            moves_left: 0,
        }
    }
}

impl fmt::Display for TimeControl {
    /// PGN-style notation: `inf`, `40/3600+5`, `3600+5`, `st=10`,
    /// `nodes=100000` or `depth=12`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.infinite {
            return write!(f, "inf");
        }
        if self.time_per_move_ms > 0 {
            return write!(f, "st={}", self.time_per_move_ms as f64 / 1000.0);
        }
        if self.time_per_tc_ms > 0 {
            if self.moves_per_tc > 0 {
                write!(f, "{}/", self.moves_per_tc)?;
            }
            write!(f, "{}", self.time_per_tc_ms as f64 / 1000.0)?;
            if self.increment_ms > 0 {
                write!(f, "+{}", self.increment_ms as f64 / 1000.0)?;
            }
            return Ok(());
        }
        if self.node_limit > 0 {
            return write!(f, "nodes={}", self.node_limit);
        }
        if self.depth_limit > 0 {
            return write!(f, "depth={}", self.depth_limit);
        }
        write!(f, "?")
    }
}
