//! Seeded single-elimination bracket.

use anyhow::Result;
use engine_interface::TimeControl;
use std::time::Duration;

use crate::pair::{PairId, PlayerIndex, BYE};
use crate::settings::{ScheduleKind, TcLadderRung};

use super::{PairingSchedule, ScheduleContext};

/// Single-elimination knockout.
///
/// Seed N is placed by [`player_seed`]: odd ranks go to the left
/// sub-bracket, even ranks to the right, so the top seeds can only meet in
/// the late rounds. BYEs fill the bracket up to a power of two and land on
/// the bottom ranks, pairing them with the top seeds. Encounters are
/// best-of-`games_per_encounter`, extended two games at a time until one
/// side leads by the required margin; a disqualifying strike count
/// short-circuits the match.
pub struct KnockoutSchedule {
    rounds: Vec<Vec<PairId>>,
}

/// The bracket slot of `rank` (1-based) in a bracket of `bracket_size`.
pub fn player_seed(rank: usize, bracket_size: usize) -> usize {
    if rank <= 1 {
        return 0;
    }
    // Even ranks go into the right half, odd ranks into the left; recursing
    // with the halved rank keeps siblings apart all the way down.
    if rank % 2 == 0 {
        bracket_size / 2 + player_seed(rank / 2, bracket_size / 2)
    } else {
        player_seed(rank / 2 + 1, bracket_size / 2)
    }
}

impl KnockoutSchedule {
    pub fn new() -> KnockoutSchedule {
        KnockoutSchedule { rounds: Vec::new() }
    }

    fn bracket_size(player_count: usize) -> usize {
        let mut x = 1;
        while x < player_count {
            x *= 2;
        }
        x
    }

    fn encounter_scores(&self, ctx: &ScheduleContext, pair: PairId) -> (u32, u32) {
        let pair = ctx.pairs.get(pair);
        let mut first = pair.first_score();
        let mut second = pair.second_score();
        if pair.first_player() >= 0 {
            first += ctx.player(pair.first_player()).builder().resume_score();
        }
        if pair.second_player() >= 0 {
            second += ctx.player(pair.second_player()).builder().resume_score();
        }
        (first, second)
    }

    /// A disqualifying strike count ends the match immediately.
    fn strike_stopped(&self, ctx: &ScheduleContext, pair: PairId) -> bool {
        if ctx.strikes_limit == 0 {
            return false;
        }
        let pair = ctx.pairs.get(pair);
        [pair.first_player(), pair.second_player()]
            .iter()
            .any(|&p| p >= 0 && ctx.player(p).total_strikes() >= ctx.strikes_limit)
    }

    fn needs_more_games(&self, ctx: &ScheduleContext, pair_id: PairId) -> bool {
        let pair = ctx.pairs.get(pair_id);
        // second player is a BYE
        if !pair.is_valid() {
            return false;
        }
        if self.strike_stopped(ctx, pair_id) {
            return false;
        }

        let (first_score, second_score) = self.encounter_scores(ctx, pair_id);
        let lead_score = first_score.max(second_score);

        // nobody has a majority of the scheduled points yet
        if lead_score as usize <= ctx.games_per_encounter {
            return true;
        }

        // extension: the lead must be 2 points when the played score is a
        // multiple of four, 3 otherwise
        let min_diff = if (first_score + second_score) % 4 == 0 {
            2
        } else {
            3
        };
        let diff = first_score.abs_diff(second_score);
        diff < min_diff
    }

    /// Winner of a decided pair; ties fall back to the lower strike count.
    fn pair_winner(&self, ctx: &ScheduleContext, pair_id: PairId) -> PlayerIndex {
        let pair = ctx.pairs.get(pair_id);
        let leader = pair.leader();
        if leader != BYE {
            return leader;
        }

        let first = pair.first_player();
        let second = pair.second_player();
        if ctx.player(first).total_strikes() > ctx.player(second).total_strikes() {
            second
        } else {
            first
        }
    }

    fn last_round_winners(&self, ctx: &ScheduleContext) -> Vec<PlayerIndex> {
        self.rounds
            .last()
            .map(|round| round.iter().map(|&p| self.pair_winner(ctx, p)).collect())
            .unwrap_or_default()
    }

    fn games_in_progress(&self, ctx: &ScheduleContext) -> bool {
        self.rounds
            .last()
            .map(|round| {
                round
                    .iter()
                    .any(|&p| ctx.pairs.get(p).games_in_progress() > 0)
            })
            .unwrap_or(false)
    }
}

impl PairingSchedule for KnockoutSchedule {
    fn kind(&self) -> ScheduleKind {
        ScheduleKind::Knockout
    }

    fn initialize(&mut self, ctx: &mut ScheduleContext) -> Result<()> {
        let n = ctx.player_count();
        let x = Self::bracket_size(n);

        // place everyone (and the BYE fillers) at their seed slot
        let mut slots = vec![BYE; x];
        for rank in 1..=x {
            let player = if rank <= n {
                (rank - 1) as PlayerIndex
            } else {
                BYE
            };
            slots[player_seed(rank, x)] = player;
        }

        // pair mirrored slots
        let mut pairs = Vec::with_capacity(x / 2);
        for j in 0..x / 2 {
            pairs.push(ctx.pair(slots[j], slots[x - j - 1]));
        }

        self.rounds.clear();
        self.rounds.push(pairs);
        Ok(())
    }

    fn games_per_cycle(&self, ctx: &ScheduleContext) -> usize {
        let x = Self::bracket_size(ctx.player_count());
        let mut round = x / 2;
        let mut total = round - (x - ctx.player_count());
        while round >= 2 {
            round /= 2;
            total += round;
        }
        total
    }

    fn games_per_round(&self, _ctx: &ScheduleContext) -> usize {
        0
    }

    fn next_pair(
        &mut self,
        ctx: &mut ScheduleContext,
        _game_number: usize,
    ) -> Result<Option<PairId>> {
        if let Some(last) = self.rounds.last() {
            let last = last.clone();
            for pair in last {
                if self.needs_more_games(ctx, pair) {
                    return Ok(Some(pair));
                }
            }
        }

        let winners = self.last_round_winners(ctx);
        if winners.len() <= 1 || self.games_in_progress(ctx) {
            return Ok(None);
        }

        let mut next_round = Vec::with_capacity(winners.len() / 2);
        for chunk in winners.chunks(2) {
            next_round.push(ctx.pair(chunk[0], chunk[1]));
        }
        self.rounds.push(next_round.clone());
        ctx.set_current_round(ctx.current_round() + 1);

        for pair in next_round {
            if ctx.pairs.get(pair).is_valid() {
                return Ok(Some(pair));
            }
        }
        Ok(None)
    }

    fn add_score(&mut self, ctx: &mut ScheduleContext, player: PlayerIndex, score: i32) {
        if score > 0 {
            if let Some(round) = self.rounds.last() {
                for &pair_id in round {
                    let pair = ctx.pairs.get_mut(pair_id);
                    if pair.first_player() == player {
                        pair.add_first_score(score as u32);
                        break;
                    }
                    if pair.second_player() == player {
                        pair.add_second_score(score as u32);
                        break;
                    }
                }
            }
        }
        ctx.add_score(player, score);
    }

    fn adjust_time_controls(
        &self,
        ctx: &ScheduleContext,
        pair: PairId,
        ladder: &[TcLadderRung],
        white: &mut TimeControl,
        black: &mut TimeControl,
    ) {
        let (first, second) = self.encounter_scores(ctx, pair);
        let combined = first + second;
        // rungs are ordered highest threshold first
        for rung in ladder {
            if combined >= rung.score {
                for tc in [&mut *white, &mut *black] {
                    tc.set_time_per_tc(Duration::from_millis(rung.time_ms));
                    tc.set_increment(Duration::from_millis(rung.increment_ms));
                }
                break;
            }
        }
    }

    fn reset_book(&self, ctx: &ScheduleContext, pair: PairId) -> bool {
        let pair = ctx.pairs.get(pair);
        if !pair.is_valid() {
            return false;
        }
        pair.first_score() == pair.second_score() && pair.first_score() == 0
    }

    fn all_games_finished(&self, ctx: &ScheduleContext, _finished_games: usize) -> bool {
        let Some(last) = self.rounds.last() else {
            return true;
        };
        if last.iter().any(|&p| self.needs_more_games(ctx, p)) {
            return false;
        }
        self.last_round_winners(ctx).len() <= 1
    }

    fn can_set_round_multiplier(&self) -> bool {
        false
    }
}
