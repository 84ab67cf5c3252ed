//! Step-scoped performance.

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};

/// Performance of the trades recorded in the current step.
///
/// - `sharpe`: mean / population std-dev of per-trade P&L, not annualized;
///   0 with fewer than 2 trades or zero variance.
/// - `win_rate`: fraction of trades with P&L > 0; 0 with no trades.
/// - `max_drawdown`: largest drop of cumulative P&L from its running peak, as
///   a fraction of that peak; 0 while the peak is not positive.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StepPerformance {
    /// Number of trades
    pub trades: usize,
    /// Sum of P&L
    pub total_pnl: Decimal,
    /// Sharpe-like ratio
    pub sharpe: f64,
    /// Fraction of winning trades
    pub win_rate: f64,
    /// Maximum drawdown fraction
    pub max_drawdown: f64,
}

impl StepPerformance {
    /// Computes performance from per-trade P&L in arrival order.
    #[must_use]
    pub fn from_pnls(pnls: &[Decimal]) -> Self {
        let mut stats = StepStats::default();
        for pnl in pnls {
            stats.push(*pnl);
        }
        stats.performance()
    }
}

/// Running statistics for the current step.
///
/// Updated per trade in constant time and space, so a strategy that sits at
/// the top step indefinitely keeps a fixed-size state. Mean and variance use
/// Welford's update; drawdown tracks cumulative P&L against its running peak.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepStats {
    trades: u64,
    wins: u64,
    total_pnl: Decimal,
    mean: Decimal,
    m2: Decimal,
    peak: Decimal,
    worst_drawdown: Decimal,
}

impl StepStats {
    /// Folds one trade in.
    pub fn push(&mut self, pnl: Decimal) {
        self.trades += 1;
        if pnl > Decimal::ZERO {
            self.wins += 1;
        }

        let delta = pnl - self.mean;
        self.mean += delta / Decimal::from(self.trades);
        self.m2 += delta * (pnl - self.mean);

        self.total_pnl += pnl;
        if self.total_pnl > self.peak {
            self.peak = self.total_pnl;
        }
        if self.peak > Decimal::ZERO {
            let drawdown = (self.peak - self.total_pnl) / self.peak;
            if drawdown > self.worst_drawdown {
                self.worst_drawdown = drawdown;
            }
        }
    }

    /// Trades folded in since the last reset.
    #[must_use]
    pub fn trades(&self) -> u64 {
        self.trades
    }

    /// Snapshot of the step's performance.
    #[must_use]
    pub fn performance(&self) -> StepPerformance {
        if self.trades == 0 {
            return StepPerformance::default();
        }
        #[allow(clippy::cast_precision_loss)]
        let win_rate = self.wins as f64 / self.trades as f64;
        StepPerformance {
            trades: usize::try_from(self.trades).unwrap_or(usize::MAX),
            total_pnl: self.total_pnl,
            sharpe: self.sharpe(),
            win_rate,
            max_drawdown: self.worst_drawdown.to_f64().unwrap_or(0.0),
        }
    }

    fn sharpe(&self) -> f64 {
        if self.trades < 2 {
            return 0.0;
        }
        let variance = self.m2 / Decimal::from(self.trades);
        if variance <= Decimal::ZERO {
            return 0.0;
        }
        let std_dev = variance.to_f64().unwrap_or(0.0).sqrt();
        if std_dev <= 0.0 || !std_dev.is_finite() {
            return 0.0;
        }
        self.mean.to_f64().unwrap_or(0.0) / std_dev
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_empty_step() {
        let perf = StepPerformance::from_pnls(&[]);
        assert_eq!(perf, StepPerformance::default());
        assert!(perf.sharpe.abs() < f64::EPSILON);
    }

    #[test]
    fn test_constant_pnl_has_zero_sharpe() {
        let perf = StepPerformance::from_pnls(&[dec!(100); 20]);
        assert!(perf.sharpe.abs() < f64::EPSILON);
        assert!((perf.win_rate - 1.0).abs() < f64::EPSILON);
        assert!(perf.max_drawdown.abs() < f64::EPSILON);
        assert_eq!(perf.total_pnl, dec!(2000));
    }

    #[test]
    fn test_alternating_pnl() {
        let pnls: Vec<_> = (0..20)
            .map(|i| if i % 2 == 0 { dec!(150) } else { dec!(-50) })
            .collect();
        let perf = StepPerformance::from_pnls(&pnls);
        assert!((perf.win_rate - 0.5).abs() < f64::EPSILON);
        assert!((perf.sharpe - 0.5).abs() < 1e-12);
        assert!((perf.max_drawdown - 1.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_single_trade_has_zero_sharpe() {
        let perf = StepPerformance::from_pnls(&[dec!(-10)]);
        assert!(perf.sharpe.abs() < f64::EPSILON);
        assert!(perf.win_rate.abs() < f64::EPSILON);
    }

    #[test]
    fn test_drawdown_ignored_below_positive_peak() {
        let perf = StepPerformance::from_pnls(&[dec!(-10), dec!(-20), dec!(5)]);
        assert!(perf.max_drawdown.abs() < f64::EPSILON);
    }

    #[test]
    fn test_drawdown_from_running_peak() {
        let perf = StepPerformance::from_pnls(&[dec!(100), dec!(-40), dec!(60), dec!(-90)]);
        // Peak 120, trough 30.
        assert!((perf.max_drawdown - 0.75).abs() < 1e-9);
    }

    #[test]
    fn test_running_stats_match_batch() {
        let pnls = [dec!(12.5), dec!(-3), dec!(7.25), dec!(-20), dec!(4), dec!(0), dec!(9)];
        let mut stats = StepStats::default();
        for pnl in pnls {
            stats.push(pnl);
        }
        let running = stats.performance();

        let n = Decimal::from(pnls.len());
        let mean = pnls.iter().sum::<Decimal>() / n;
        let variance = pnls.iter().map(|p| (*p - mean) * (*p - mean)).sum::<Decimal>() / n;
        let expected = mean.to_f64().unwrap() / variance.to_f64().unwrap().sqrt();

        assert_eq!(running.trades, 7);
        assert_eq!(running.total_pnl, dec!(9.75));
        assert!((running.sharpe - expected).abs() < 1e-9);
        assert!((running.win_rate - 4.0 / 7.0).abs() < 1e-12);
        assert_eq!(stats.trades(), 7);
    }

    #[test]
    fn test_zero_pnl_is_not_a_win() {
        let perf = StepPerformance::from_pnls(&[dec!(0), dec!(10)]);
        assert!((perf.win_rate - 0.5).abs() < f64::EPSILON);
    }
}
