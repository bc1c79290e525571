//! Round-robin pairing, naive rotation or Berger table.

use anyhow::Result;

use crate::pair::{PairId, PlayerIndex};
use crate::settings::ScheduleKind;

use super::{PairingSchedule, ScheduleContext};

/// Every player meets every other player `round_multiplier` times.
///
/// Two pairing variants:
/// - naive rotation (default): players are split into a top and a bottom
///   half, paired by index; after each round the first of the bottom half
///   moves to position 1 of the top half and the last of the top half drops
///   to the end of the bottom half. Colors alternate within an encounter
///   when side swapping is on.
/// - Berger table: one seat is pinned as the pivot, the other seats rotate
///   by half the (padded) player count each round, and the pivot's insertion
///   side alternates so white/black counts stay balanced. Colors swap
///   between cycles instead of between games.
pub struct RoundRobinSchedule {
    pair_number: usize,
    top_half: Vec<PlayerIndex>,
    bottom_half: Vec<PlayerIndex>,
    berger_table: Vec<PlayerIndex>,
    berger_ptr: usize,
    current: Option<PairId>,
}

impl RoundRobinSchedule {
    pub fn new() -> RoundRobinSchedule {
        RoundRobinSchedule {
            pair_number: 0,
            top_half: Vec::new(),
            bottom_half: Vec::new(),
            berger_table: Vec::new(),
            berger_ptr: 0,
            current: None,
        }
    }

    fn padded_count(ctx: &ScheduleContext) -> usize {
        ctx.player_count() + ctx.player_count() % 2
    }

    // Seats 0..count-1 interleaved: [0, count-1, 1, count-2, ...], so that
    // round 1 pairs (0, count-1), (1, count-2), ...
    fn initial_berger_table(count: usize) -> Vec<PlayerIndex> {
        let mut table = vec![0 as PlayerIndex; count];
        for i in 0..count / 2 {
            table[i * 2] = i as PlayerIndex;
        }
        for i in (count / 2..count).rev() {
            table[(count - i) * 2 - 1] = i as PlayerIndex;
        }
        table
    }

    // Rotate the non-pivot seats by count/2 and re-insert the pivot on the
    // side given by the round parity.
    fn rotate_berger_table(table: &mut Vec<PlayerIndex>, count: usize, new_round: usize) {
        let pivot = (count - 1) as PlayerIndex;
        for seat in table.iter_mut() {
            if *seat != pivot {
                *seat = (*seat + (count / 2) as PlayerIndex) % pivot;
            }
        }
        let rounds_per_cycle = count - 1;
        let pos = table.iter().position(|&s| s == pivot).unwrap();
        let pivot = table.remove(pos);
        let insert_at = if ((new_round - 1) % rounds_per_cycle) % 2 == 1 {
            0
        } else {
            1
        };
        table.insert(insert_at, pivot);
    }

    fn rotate_halves(top: &mut Vec<PlayerIndex>, bottom: &mut Vec<PlayerIndex>) {
        top.insert(1, bottom.remove(0));
        bottom.push(top.pop().unwrap());
    }

    fn next_pair_berger(&mut self, ctx: &mut ScheduleContext) -> Option<PairId> {
        let count = Self::padded_count(ctx);
        loop {
            if self.berger_ptr >= self.berger_table.len() {
                let new_round = ctx.current_round() + 1;
                ctx.set_current_round(new_round);
                Self::rotate_berger_table(&mut self.berger_table, count, new_round);
                self.berger_ptr = 0;
            }
            let white = self.berger_table[self.berger_ptr];
            let black = self.berger_table[self.berger_ptr + 1];
            self.berger_ptr += 2;

            // seats beyond the real player count are the padding BYE
            if (white as usize) < ctx.player_count() && (black as usize) < ctx.player_count() {
                return Some(ctx.pair(white, black));
            }
        }
    }

    fn next_pair_naive(&mut self, ctx: &mut ScheduleContext) -> Option<PairId> {
        loop {
            if self.pair_number >= self.top_half.len() {
                self.pair_number = 0;
                ctx.set_current_round(ctx.current_round() + 1);
                Self::rotate_halves(&mut self.top_half, &mut self.bottom_half);
            }
            let white = self.top_half[self.pair_number];
            let black = self.bottom_half[self.pair_number];
            self.pair_number += 1;

            if (white as usize) < ctx.player_count() && (black as usize) < ctx.player_count() {
                return Some(ctx.pair(white, black));
            }
        }
    }
}

impl PairingSchedule for RoundRobinSchedule {
    fn kind(&self) -> ScheduleKind {
        ScheduleKind::RoundRobin
    }

    fn initialize(&mut self, ctx: &mut ScheduleContext) -> Result<()> {
        let count = Self::padded_count(ctx);
        self.pair_number = 0;
        self.top_half = (0..(count / 2) as PlayerIndex).collect();
        self.bottom_half = ((count / 2) as PlayerIndex..count as PlayerIndex).rev().collect();
        self.berger_table = Self::initial_berger_table(count);
        self.berger_ptr = 0;
        self.current = None;
        Ok(())
    }

    fn games_per_cycle(&self, ctx: &ScheduleContext) -> usize {
        let n = ctx.player_count();
        n * (n - 1) / 2
    }

    fn games_per_round(&self, ctx: &ScheduleContext) -> usize {
        let count = Self::padded_count(ctx);
        if ctx.berger_schedule {
            count / 2
        } else {
            let total_rounds = ctx.round_multiplier * (count - 1);
            if total_rounds == 0 {
                0
            } else {
                ctx.final_game_count / total_rounds
            }
        }
    }

    fn next_pair(
        &mut self,
        ctx: &mut ScheduleContext,
        game_number: usize,
    ) -> Result<Option<PairId>> {
        if game_number >= ctx.final_game_count {
            return Ok(None);
        }
        if game_number % ctx.games_per_encounter != 0 {
            return Ok(self.current);
        }

        self.current = if ctx.berger_schedule {
            self.next_pair_berger(ctx)
        } else {
            self.next_pair_naive(ctx)
        };
        Ok(self.current)
    }

    fn pairings(&self, ctx: &ScheduleContext) -> Vec<(String, String)> {
        // replay the schedule from scratch with local rotation state
        let count = Self::padded_count(ctx);
        let n = ctx.player_count();
        let games_per_cycle = self.games_per_cycle(ctx);
        let final_games = ctx.final_game_count;
        let mut list = Vec::with_capacity(final_games);

        if ctx.berger_schedule {
            let mut table = Self::initial_berger_table(count);
            let mut ptr = 0usize;
            let mut round = 1usize;
            while list.len() < final_games {
                if ptr >= table.len() {
                    round += 1;
                    Self::rotate_berger_table(&mut table, count, round);
                    ptr = 0;
                }
                let mut white = table[ptr];
                let mut black = table[ptr + 1];
                ptr += 2;
                if (white as usize) >= n || (black as usize) >= n {
                    continue;
                }
                if games_per_cycle > 0 && ctx.swap_sides && (list.len() / games_per_cycle) % 2 == 1
                {
                    std::mem::swap(&mut white, &mut black);
                }
                list.push((
                    ctx.player(white).name().to_string(),
                    ctx.player(black).name().to_string(),
                ));
            }
        } else {
            let mut top: Vec<PlayerIndex> = (0..(count / 2) as PlayerIndex).collect();
            let mut bottom: Vec<PlayerIndex> =
                ((count / 2) as PlayerIndex..count as PlayerIndex).rev().collect();
            let mut pair_number = 0usize;
            'outer: while list.len() < final_games {
                if pair_number >= top.len() {
                    pair_number = 0;
                    Self::rotate_halves(&mut top, &mut bottom);
                }
                let white = top[pair_number];
                let black = bottom[pair_number];
                pair_number += 1;
                if (white as usize) >= n || (black as usize) >= n {
                    continue;
                }
                for encounter in 0..ctx.games_per_encounter {
                    let swapped = ctx.swap_sides && encounter % 2 == 1;
                    let (w, b) = if swapped { (black, white) } else { (white, black) };
                    list.push((
                        ctx.player(w).name().to_string(),
                        ctx.player(b).name().to_string(),
                    ));
                    if list.len() >= final_games {
                        break 'outer;
                    }
                }
            }
        }
        list
    }

    fn uses_berger(&self, ctx: &ScheduleContext) -> bool {
        ctx.berger_schedule
    }
}
