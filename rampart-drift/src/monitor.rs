//! Drift assessment.

use crate::baseline::{BaselineStore, FeatureBaseline, FeatureMap};
use crate::config::DriftConfig;
use parking_lot::Mutex;
use rampart_core::clock::Clock;
use rampart_core::config::Validatable;
use rampart_core::error::ConfigError;
use rampart_core::types::{AlertLevel, Symbol, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

/// One drift evaluation for one symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriftAssessment {
    /// Assessed symbol
    pub symbol: Symbol,
    /// Assessment time
    pub timestamp: Timestamp,
    /// Relative deviation per feature with a defined value
    pub feature_drift: FeatureMap,
    /// Mean of `feature_drift` (0 when no feature was comparable)
    pub distribution_shift: f64,
    /// Relative deviation of the performance metric
    pub performance_drift: f64,
    /// Severity
    pub alert_level: AlertLevel,
    /// True exactly when `alert_level` is red
    pub rollback_recommended: bool,
    /// True if this observation created the symbol's first baseline
    pub baseline_established: bool,
}

impl DriftAssessment {
    /// Larger of the distribution-shift and performance-drift scores.
    #[must_use]
    pub fn max_score(&self) -> f64 {
        self.distribution_shift.max(self.performance_drift)
    }
}

/// Number of assessments per alert level since the monitor started.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertCounts {
    /// Green assessments
    pub green: u64,
    /// Yellow assessments
    pub yellow: u64,
    /// Red assessments
    pub red: u64,
}

impl AlertCounts {
    fn record(&mut self, level: AlertLevel) {
        match level {
            AlertLevel::Green => self.green += 1,
            AlertLevel::Yellow => self.yellow += 1,
            AlertLevel::Red => self.red += 1,
        }
    }

    /// Total assessments.
    #[must_use]
    pub const fn total(&self) -> u64 {
        self.green + self.yellow + self.red
    }
}

/// Maps the two drift scores onto an alert level.
///
/// Red if the larger score exceeds `rollback`, yellow if it exceeds
/// `warning`, green otherwise.
#[must_use]
pub fn classify(distribution_shift: f64, performance_drift: f64, warning: f64, rollback: f64) -> AlertLevel {
    let score = distribution_shift.max(performance_drift);
    if score > rollback {
        AlertLevel::Red
    } else if score > warning {
        AlertLevel::Yellow
    } else {
        AlertLevel::Green
    }
}

/// `|current - baseline| / |baseline|`, or `None` when undefined.
fn relative_deviation(current: f64, baseline: f64) -> Option<f64> {
    if baseline == 0.0 || !baseline.is_finite() || !current.is_finite() {
        return None;
    }
    Some((current - baseline).abs() / baseline.abs())
}

struct MonitorState {
    history: VecDeque<DriftAssessment>,
    counts: AlertCounts,
}

/// Compares observations with the [`BaselineStore`].
///
/// Assessing never modifies an existing baseline. A symbol without one gets
/// its first baseline from the observation being assessed.
pub struct DriftMonitor {
    config: DriftConfig,
    baselines: Arc<BaselineStore>,
    clock: Arc<dyn Clock>,
    state: Mutex<MonitorState>,
}

impl DriftMonitor {
    /// Creates a monitor, validating `config`.
    pub fn new(
        config: DriftConfig,
        baselines: Arc<BaselineStore>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            state: Mutex::new(MonitorState {
                history: VecDeque::with_capacity(config.history_cap.min(1024)),
                counts: AlertCounts::default(),
            }),
            config,
            baselines,
            clock,
        })
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &DriftConfig {
        &self.config
    }

    /// Returns the baseline store.
    #[must_use]
    pub fn baselines(&self) -> &Arc<BaselineStore> {
        &self.baselines
    }

    /// Assesses `features` and `performance` for `symbol`.
    pub fn assess(&self, symbol: &Symbol, features: &FeatureMap, performance: f64) -> DriftAssessment {
        let now = self.clock.now();
        let (baseline, established) = self.baselines.get_or_establish(FeatureBaseline::new(
            symbol.clone(),
            features.clone(),
            performance,
            now,
        ));

        if established {
            info!(symbol = %symbol, features = features.len(), "Baseline established from first observation");
        }

        let feature_drift = self.feature_drift(&baseline, features);
        let distribution_shift = if feature_drift.is_empty() {
            0.0
        } else {
            #[allow(clippy::cast_precision_loss)]
            let n = feature_drift.len() as f64;
            feature_drift.values().sum::<f64>() / n
        };
        let performance_drift =
            relative_deviation(performance, baseline.performance_metric).unwrap_or(0.0);

        let alert_level = classify(
            distribution_shift,
            performance_drift,
            self.config.warning_threshold,
            self.config.rollback_threshold,
        );

        let assessment = DriftAssessment {
            symbol: symbol.clone(),
            timestamp: now,
            feature_drift,
            distribution_shift,
            performance_drift,
            alert_level,
            rollback_recommended: alert_level.is_critical(),
            baseline_established: established,
        };

        debug!(
            symbol = %symbol,
            distribution_shift,
            performance_drift,
            level = %alert_level,
            "Drift assessed"
        );

        self.record(assessment.clone());
        assessment
    }

    fn feature_drift(&self, baseline: &FeatureBaseline, current: &FeatureMap) -> FeatureMap {
        let deviation = |name: &String| {
            let base = baseline.features.get(name)?;
            let now = current.get(name)?;
            relative_deviation(*now, *base).map(|d| (name.clone(), d))
        };

        if self.config.tracked_features.is_empty() {
            baseline.features.keys().filter_map(deviation).collect()
        } else {
            self.config
                .tracked_features
                .iter()
                .filter_map(deviation)
                .collect()
        }
    }

    fn record(&self, assessment: DriftAssessment) {
        let mut state = self.state.lock();
        state.counts.record(assessment.alert_level);
        if state.history.len() >= self.config.history_cap {
            state.history.pop_front();
        }
        state.history.push_back(assessment);
    }

    /// Installs a fresh baseline for `symbol`, replacing the old one wholesale.
    pub fn reset_baseline(&self, symbol: &Symbol, features: FeatureMap, performance: f64) {
        self.baselines.replace(FeatureBaseline::new(
            symbol.clone(),
            features,
            performance,
            self.clock.now(),
        ));
        info!(symbol = %symbol, "Baseline reset");
    }

    /// Returns up to `limit` most recent assessments, oldest first.
    #[must_use]
    pub fn recent(&self, limit: usize) -> Vec<DriftAssessment> {
        let state = self.state.lock();
        let skip = state.history.len().saturating_sub(limit);
        state.history.iter().skip(skip).cloned().collect()
    }

    /// Returns the per-level counts.
    #[must_use]
    pub fn alert_counts(&self) -> AlertCounts {
        self.state.lock().counts
    }
}

impl fmt::Debug for DriftMonitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("DriftMonitor")
            .field("config", &self.config)
            .field("history_len", &state.history.len())
            .field("counts", &state.counts)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rampart_core::clock::ManualClock;

    fn monitor(config: DriftConfig) -> DriftMonitor {
        DriftMonitor::new(
            config,
            BaselineStore::new_shared(),
            ManualClock::new_shared(Timestamp::new_unchecked(1_000)),
        )
        .unwrap()
    }

    fn features(pairs: &[(&str, f64)]) -> FeatureMap {
        pairs.iter().map(|(k, v)| ((*k).to_string(), *v)).collect()
    }

    fn seed(monitor: &DriftMonitor, symbol: &Symbol, pairs: &[(&str, f64)], perf: f64) {
        monitor.reset_baseline(symbol, features(pairs), perf);
    }

    #[test]
    fn test_red_on_26_percent_deviation() {
        let monitor = monitor(DriftConfig::default().with_thresholds(0.15, 0.25));
        let btc = Symbol::new_unchecked("BTC-USDT");
        seed(&monitor, &btc, &[("volatility", 10.0)], 1.0);

        let assessment = monitor.assess(&btc, &features(&[("volatility", 12.6)]), 1.0);

        assert!((assessment.distribution_shift - 0.26).abs() < 1e-9);
        assert_eq!(assessment.alert_level, AlertLevel::Red);
        assert!(assessment.rollback_recommended);
    }

    #[test]
    fn test_yellow_band() {
        let monitor = monitor(DriftConfig::default());
        let eth = Symbol::new_unchecked("ETH-USDT");
        seed(&monitor, &eth, &[("volatility", 10.0)], 1.0);

        let assessment = monitor.assess(&eth, &features(&[("volatility", 11.8)]), 1.0);
        assert_eq!(assessment.alert_level, AlertLevel::Yellow);
        assert!(!assessment.rollback_recommended);
    }

    #[test]
    fn test_threshold_is_exclusive() {
        assert_eq!(classify(0.25, 0.0, 0.15, 0.25), AlertLevel::Yellow);
        assert_eq!(classify(0.15, 0.15, 0.15, 0.25), AlertLevel::Green);
        assert_eq!(classify(0.0, 0.2501, 0.15, 0.25), AlertLevel::Red);
    }

    #[test]
    fn test_feature_drift_is_mean_of_defined_features() {
        let monitor = monitor(DriftConfig::default());
        let sol = Symbol::new_unchecked("SOL-USDT");
        seed(
            &monitor,
            &sol,
            &[("a", 10.0), ("b", 10.0), ("zero", 0.0), ("absent", 4.0)],
            1.0,
        );

        let current = features(&[("a", 11.0), ("b", 13.0), ("zero", 5.0), ("a_new", 99.0)]);
        let assessment = monitor.assess(&sol, &current, 1.0);

        assert_eq!(assessment.feature_drift.len(), 2);
        assert!((assessment.distribution_shift - 0.2).abs() < 1e-9);
        assert_eq!(assessment.alert_level, AlertLevel::Yellow);
    }

    #[test]
    fn test_performance_drift_alone_can_trigger_red() {
        let monitor = monitor(DriftConfig::default());
        let btc = Symbol::new_unchecked("BTC-USDT");
        seed(&monitor, &btc, &[("volatility", 10.0)], 2.0);

        let assessment = monitor.assess(&btc, &features(&[("volatility", 10.0)]), 1.0);
        assert!((assessment.performance_drift - 0.5).abs() < 1e-9);
        assert!(assessment.distribution_shift.abs() < f64::EPSILON);
        assert_eq!(assessment.alert_level, AlertLevel::Red);
    }

    #[test]
    fn test_zero_performance_baseline_is_undefined() {
        let monitor = monitor(DriftConfig::default());
        let btc = Symbol::new_unchecked("BTC-USDT");
        seed(&monitor, &btc, &[("volatility", 10.0)], 0.0);

        let assessment = monitor.assess(&btc, &features(&[("volatility", 10.0)]), 5.0);
        assert!(assessment.performance_drift.abs() < f64::EPSILON);
        assert_eq!(assessment.alert_level, AlertLevel::Green);
    }

    #[test]
    fn test_tracked_features_filter() {
        let monitor = monitor(DriftConfig::default().with_tracked_features(["volatility"]));
        let btc = Symbol::new_unchecked("BTC-USDT");
        seed(&monitor, &btc, &[("volatility", 10.0), ("volume", 10.0)], 1.0);

        let assessment = monitor.assess(
            &btc,
            &features(&[("volatility", 10.0), ("volume", 100.0)]),
            1.0,
        );
        assert_eq!(assessment.alert_level, AlertLevel::Green);
        assert_eq!(assessment.feature_drift.len(), 1);
    }

    #[test]
    fn test_first_observation_establishes_baseline() {
        let monitor = monitor(DriftConfig::default());
        let ada = Symbol::new_unchecked("ADA-USDT");

        let first = monitor.assess(&ada, &features(&[("volatility", 3.0)]), 0.8);
        assert!(first.baseline_established);
        assert_eq!(first.alert_level, AlertLevel::Green);

        let second = monitor.assess(&ada, &features(&[("volatility", 6.0)]), 0.8);
        assert!(!second.baseline_established);
        assert_eq!(second.alert_level, AlertLevel::Red);
    }

    #[test]
    fn test_assess_never_mutates_existing_baseline() {
        let monitor = monitor(DriftConfig::default());
        let btc = Symbol::new_unchecked("BTC-USDT");
        seed(&monitor, &btc, &[("volatility", 10.0)], 1.0);
        let before = monitor.baselines().get(&btc).unwrap();

        monitor.assess(&btc, &features(&[("volatility", 50.0)]), 9.0);
        assert_eq!(monitor.baselines().get(&btc).unwrap(), before);
    }

    #[test]
    fn test_history_is_capped_and_counted() {
        let monitor = monitor(DriftConfig::default().with_history_cap(3));
        let btc = Symbol::new_unchecked("BTC-USDT");
        seed(&monitor, &btc, &[("volatility", 10.0)], 1.0);

        for value in [10.0, 11.8, 13.0, 10.0, 10.1] {
            monitor.assess(&btc, &features(&[("volatility", value)]), 1.0);
        }

        let recent = monitor.recent(10);
        assert_eq!(recent.len(), 3);
        assert_eq!(recent[0].alert_level, AlertLevel::Red);
        assert!((recent[2].feature_drift["volatility"] - 0.01).abs() < 1e-9);
        assert_eq!(
            monitor.alert_counts(),
            AlertCounts {
                green: 3,
                yellow: 1,
                red: 1
            }
        );
        assert_eq!(monitor.alert_counts().total(), 5);
    }

    #[test]
    fn test_red_iff_rollback_recommended() {
        let monitor = monitor(DriftConfig::default());
        let btc = Symbol::new_unchecked("BTC-USDT");
        seed(&monitor, &btc, &[("volatility", 10.0)], 1.0);

        for step in 0..60_i32 {
            let value = 10.0 + f64::from(step) * 0.1;
            let a = monitor.assess(&btc, &features(&[("volatility", value)]), 1.0);
            assert_eq!(a.alert_level == AlertLevel::Red, a.rollback_recommended);
        }
    }

    #[test]
    fn test_invalid_config_fails_fast() {
        let result = DriftMonitor::new(
            DriftConfig::default().with_thresholds(0.5, 0.1),
            BaselineStore::new_shared(),
            ManualClock::new_shared(Timestamp::ZERO),
        );
        assert!(result.is_err());
    }
}
