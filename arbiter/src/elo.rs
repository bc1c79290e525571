//! Rating-difference estimation from a win/loss/draw record.

/// Elo difference estimate with a 95% confidence margin.
#[derive(Clone, Copy, Debug)]
pub struct Elo {
    wins: u64,
    losses: u64,
    draws: u64,
    mu: f64,
    stdev: f64,
}

impl Elo {
    pub fn new(wins: u64, losses: u64, draws: u64) -> Elo {
        let n = (wins + losses + draws) as f64;
        if n <= 0.0 {
            return Elo {
                wins,
                losses,
                draws,
                mu: 0.5,
                stdev: 0.0,
            };
        }
        let w = wins as f64 / n;
        let l = losses as f64 / n;
        let d = draws as f64 / n;
        let mu = w + d / 2.0;

        let dev_w = w * (1.0 - mu).powi(2);
        let dev_l = l * (0.0 - mu).powi(2);
        let dev_d = d * (0.5 - mu).powi(2);
        let stdev = (dev_w + dev_l + dev_d).sqrt() / n.sqrt();

        Elo {
            wins,
            losses,
            draws,
            mu,
            stdev,
        }
    }

    pub fn games(&self) -> u64 {
        self.wins + self.losses + self.draws
    }

    /// Score rate: (wins + draws/2) / games.
    pub fn point_ratio(&self) -> f64 {
        self.mu
    }

    pub fn draw_ratio(&self) -> f64 {
        let n = self.games();
        if n == 0 {
            0.0
        } else {
            self.draws as f64 / n as f64
        }
    }

    /// Rating difference via the inverse logistic curve.
    pub fn diff(&self) -> f64 {
        Self::diff_from_score(self.mu)
    }

    /// 95% confidence interval half-width around [`Elo::diff`].
    pub fn error_margin(&self) -> f64 {
        let mu_min = self.mu + phi_inv(0.025) * self.stdev;
        let mu_max = self.mu + phi_inv(0.975) * self.stdev;
        (Self::diff_from_score(mu_max) - Self::diff_from_score(mu_min)) / 2.0
    }

    fn diff_from_score(p: f64) -> f64 {
        let p = p.clamp(1e-9, 1.0 - 1e-9);
        -400.0 * (1.0 / p - 1.0).log10()
    }
}

/// Inverse of the standard normal CDF.
fn phi_inv(p: f64) -> f64 {
    std::f64::consts::SQRT_2 * erf_inv(2.0 * p - 1.0)
}

// Winitzki's approximation, accurate to ~2e-3 which is plenty for a
// confidence margin readout.
fn erf_inv(x: f64) -> f64 {
    use std::f64::consts::PI;

    let a = 8.0 * (PI - 3.0) / (3.0 * PI * (4.0 - PI));
    let y = (1.0 - x * x).ln();
    let z = 2.0 / (PI * a) + y / 2.0;

    let ret = ((z * z - y / a).sqrt() - z).sqrt();
    if x < 0.0 {
        -ret
    } else {
        ret
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn even_score_is_zero_diff() {
        let elo = Elo::new(10, 10, 10);
        assert!(elo.diff().abs() < 1e-9);
        assert!((elo.point_ratio() - 0.5).abs() < 1e-9);
        assert!((elo.draw_ratio() - 1.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn known_score_rates() {
        // 75% score is about +191 Elo
        let elo = Elo::new(75, 25, 0);
        assert!((elo.diff() - 190.85).abs() < 0.1, "diff = {}", elo.diff());

        // more games shrink the margin
        let small = Elo::new(15, 5, 0);
        let large = Elo::new(150, 50, 0);
        assert!(large.error_margin() < small.error_margin());
        assert!(small.error_margin() > 0.0);
    }

    #[test]
    fn no_games_is_harmless() {
        let elo = Elo::new(0, 0, 0);
        assert_eq!(elo.diff(), 0.0);
        assert_eq!(elo.games(), 0);
    }

    #[test]
    fn phi_inv_symmetry() {
        assert!(phi_inv(0.5).abs() < 1e-9);
        assert!((phi_inv(0.975) - 1.96).abs() < 0.01);
        assert!((phi_inv(0.025) + 1.96).abs() < 0.01);
    }
}
