//! Sequential Probability Ratio Test over game outcomes.
//!
//! Tests H0 "the first engine is `elo0` stronger" against H1 "`elo1`
//! stronger" with error rates `alpha`/`beta`, so a match can stop as soon
//! as the evidence is conclusive. Win/draw/loss probabilities for a rating
//! difference come from the BayesElo model, with the draw rating estimated
//! from the observed results.

/// Outcome of a single game from the tested engine's point of view.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GameOutcome {
    Win,
    Loss,
    Draw,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SprtResult {
    AcceptH0,
    AcceptH1,
    Continue,
}

#[derive(Clone, Copy, Debug)]
pub struct SprtStatus {
    pub result: SprtResult,
    pub llr: f64,
    pub l_bound: f64,
    pub u_bound: f64,
}

/// The test state: hypotheses plus the running w/l/d tally.
#[derive(Clone, Debug)]
pub struct Sprt {
    elo0: f64,
    elo1: f64,
    alpha: f64,
    beta: f64,
    wins: u64,
    losses: u64,
    draws: u64,
}

#[derive(Clone, Copy)]
struct BayesElo {
    bayes_elo: f64,
    draw_elo: f64,
}

#[derive(Clone, Copy)]
struct Probability {
    p_win: f64,
    p_loss: f64,
    p_draw: f64,
}

impl Probability {
    fn from_results(wins: u64, losses: u64, draws: u64) -> Probability {
        let count = (wins + losses + draws) as f64;
        let p_win = wins as f64 / count;
        let p_loss = losses as f64 / count;
        Probability {
            p_win,
            p_loss,
            p_draw: 1.0 - p_win - p_loss,
        }
    }

    fn from_bayes_elo(b: BayesElo) -> Probability {
        let p_win = 1.0 / (1.0 + 10f64.powf((b.draw_elo - b.bayes_elo) / 400.0));
        let p_loss = 1.0 / (1.0 + 10f64.powf((b.draw_elo + b.bayes_elo) / 400.0));
        Probability {
            p_win,
            p_loss,
            p_draw: 1.0 - p_win - p_loss,
        }
    }
}

impl BayesElo {
    fn from_probability(p: Probability) -> BayesElo {
        BayesElo {
            bayes_elo: 200.0 * (p.p_win / p.p_loss * (1.0 - p.p_loss) / (1.0 - p.p_win)).log10(),
            draw_elo: 200.0
                * ((1.0 - p.p_loss) / p.p_loss * (1.0 - p.p_win) / p.p_win).log10(),
        }
    }

    /// Conversion factor between the logistic Elo scale and the BayesElo
    /// scale at this draw rating.
    fn scale(&self) -> f64 {
        let x = 10f64.powf(-self.draw_elo / 400.0);
        4.0 * x / ((1.0 + x) * (1.0 + x))
    }
}

impl Sprt {
    pub fn new(elo0: f64, elo1: f64, alpha: f64, beta: f64) -> Sprt {
        Sprt {
            elo0,
            elo1,
            alpha,
            beta,
            wins: 0,
            losses: 0,
            draws: 0,
        }
    }

    pub fn add_result(&mut self, outcome: GameOutcome) {
        match outcome {
            GameOutcome::Win => self.wins += 1,
            GameOutcome::Loss => self.losses += 1,
            GameOutcome::Draw => self.draws += 1,
        }
    }

    pub fn status(&self) -> SprtStatus {
        let l_bound = (self.beta / (1.0 - self.alpha)).ln();
        let u_bound = ((1.0 - self.beta) / self.alpha).ln();
        let mut status = SprtStatus {
            result: SprtResult::Continue,
            llr: 0.0,
            l_bound,
            u_bound,
        };

        if self.wins == 0 || self.losses == 0 {
            return status;
        }

        // Estimate the draw rating from the observed results; without any
        // draws the model degenerates to the plain logistic win/loss test.
        let draw_elo = if self.draws > 0 {
            BayesElo::from_probability(Probability::from_results(
                self.wins,
                self.losses,
                self.draws,
            ))
            .draw_elo
        } else {
            0.0
        };
        let scale = BayesElo {
            bayes_elo: 0.0,
            draw_elo,
        }
        .scale();

        let b0 = BayesElo {
            bayes_elo: self.elo0 / scale,
            draw_elo,
        };
        let b1 = BayesElo {
            bayes_elo: self.elo1 / scale,
            draw_elo,
        };
        let p0 = Probability::from_bayes_elo(b0);
        let p1 = Probability::from_bayes_elo(b1);

        let w_llr = self.wins as f64 * (p1.p_win / p0.p_win).ln();
        let l_llr = self.losses as f64 * (p1.p_loss / p0.p_loss).ln();
        let d_llr = if self.draws > 0 {
            self.draws as f64 * (p1.p_draw / p0.p_draw).ln()
        } else {
            0.0
        };

        status.llr = w_llr + l_llr + d_llr;
        if status.llr > u_bound {
            status.result = SprtResult::AcceptH1;
        } else if status.llr < l_bound {
            status.result = SprtResult::AcceptH0;
        }
        status
    }
}
