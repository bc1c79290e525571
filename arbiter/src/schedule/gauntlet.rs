//! Gauntlet pairing: designated players meet every other entrant in turn.

use anyhow::{bail, Result};

use crate::pair::{PairId, PlayerIndex};
use crate::settings::ScheduleKind;

use super::{PairingSchedule, ScheduleContext};

/// The first `seed_count.max(1)` players are the gauntlet players; each of
/// them meets every remaining entrant once per cycle. Colors alternate
/// between games of an encounter via the controller's side swapping.
pub struct GauntletSchedule {
    pair_number: usize,
    current: Option<PairId>,
}

impl GauntletSchedule {
    pub fn new() -> GauntletSchedule {
        GauntletSchedule {
            pair_number: 0,
            current: None,
        }
    }

    fn gauntlet_players(ctx: &ScheduleContext) -> usize {
        ctx.seed_count.clamp(1, ctx.player_count().saturating_sub(1))
    }
}

impl PairingSchedule for GauntletSchedule {
    fn kind(&self) -> ScheduleKind {
        ScheduleKind::Gauntlet
    }

    fn initialize(&mut self, ctx: &mut ScheduleContext) -> Result<()> {
        if ctx.player_count() < 2 {
            bail!("a gauntlet needs at least two players");
        }
        self.pair_number = 0;
        self.current = None;
        Ok(())
    }

    fn games_per_cycle(&self, ctx: &ScheduleContext) -> usize {
        let seeds = Self::gauntlet_players(ctx);
        seeds * (ctx.player_count() - seeds)
    }

    fn games_per_round(&self, ctx: &ScheduleContext) -> usize {
        (ctx.player_count() - Self::gauntlet_players(ctx)) * ctx.games_per_encounter
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

        let seeds = Self::gauntlet_players(ctx);
        let opponents = ctx.player_count() - seeds;
        let pairs_per_cycle = seeds * opponents;

        if self.pair_number > 0 && self.pair_number % opponents == 0 {
            ctx.set_current_round(ctx.current_round() + 1);
        }

        let index = self.pair_number % pairs_per_cycle;
        let gauntlet = (index / opponents) as PlayerIndex;
        let opponent = (seeds + index % opponents) as PlayerIndex;
        self.pair_number += 1;

        self.current = Some(ctx.pair(gauntlet, opponent));
        Ok(self.current)
    }

    fn pairings(&self, ctx: &ScheduleContext) -> Vec<(String, String)> {
        let seeds = Self::gauntlet_players(ctx);
        let opponents = ctx.player_count() - seeds;
        let pairs_per_cycle = seeds * opponents;
        let mut list = Vec::with_capacity(ctx.final_game_count);

        'outer: loop {
            for index in 0..pairs_per_cycle {
                let gauntlet = (index / opponents) as PlayerIndex;
                let opponent = (seeds + index % opponents) as PlayerIndex;
                for encounter in 0..ctx.games_per_encounter {
                    if list.len() >= ctx.final_game_count {
                        break 'outer;
                    }
                    let swapped = ctx.swap_sides && encounter % 2 == 1;
                    let (w, b) = if swapped {
                        (opponent, gauntlet)
                    } else {
                        (gauntlet, opponent)
                    };
                    list.push((
                        ctx.player(w).name().to_string(),
                        ctx.player(b).name().to_string(),
                    ));
                }
            }
        }
        list
    }

    fn has_gauntlet_ratings_order(&self) -> bool {
        true
    }
}
