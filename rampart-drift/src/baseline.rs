//! Last-known-good feature fingerprints.

use parking_lot::RwLock;
use rampart_core::types::{Symbol, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Feature name to scalar value.
pub type FeatureMap = BTreeMap<String, f64>;

/// Snapshot of a symbol's feature statistics and realized performance taken
/// when trust was last established.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureBaseline {
    /// Tracked symbol
    pub symbol: Symbol,
    /// Feature values at capture time
    pub features: FeatureMap,
    /// Performance metric at capture time (e.g. rolling Sharpe)
    pub performance_metric: f64,
    /// Capture time
    pub captured_at: Timestamp,
}

impl FeatureBaseline {
    /// Creates a baseline.
    #[must_use]
    pub fn new(
        symbol: Symbol,
        features: FeatureMap,
        performance_metric: f64,
        captured_at: Timestamp,
    ) -> Self {
        Self {
            symbol,
            features,
            performance_metric,
            captured_at,
        }
    }
}

/// One baseline per tracked symbol.
///
/// Baselines are only ever replaced whole; there is no per-feature update.
/// Reads return clones.
#[derive(Debug, Default)]
pub struct BaselineStore {
    baselines: RwLock<HashMap<Symbol, FeatureBaseline>>,
}

impl BaselineStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty shared store.
    #[must_use]
    pub fn new_shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Returns a copy of the baseline for `symbol`.
    #[must_use]
    pub fn get(&self, symbol: &Symbol) -> Option<FeatureBaseline> {
        self.baselines.read().get(symbol).cloned()
    }

    /// Installs `baseline`, replacing any previous one for the same symbol.
    pub fn replace(&self, baseline: FeatureBaseline) -> Option<FeatureBaseline> {
        self.baselines
            .write()
            .insert(baseline.symbol.clone(), baseline)
    }

    /// Installs `baseline` only if the symbol has none yet.
    ///
    /// Returns the baseline now in effect and whether it was just installed.
    pub fn get_or_establish(&self, baseline: FeatureBaseline) -> (FeatureBaseline, bool) {
        let mut baselines = self.baselines.write();
        if let Some(existing) = baselines.get(&baseline.symbol) {
            return (existing.clone(), false);
        }
        baselines.insert(baseline.symbol.clone(), baseline.clone());
        (baseline, true)
    }

    /// Replaces every baseline in `batch` under a single write lock.
    pub fn replace_all(&self, batch: impl IntoIterator<Item = FeatureBaseline>) {
        let mut baselines = self.baselines.write();
        for baseline in batch {
            baselines.insert(baseline.symbol.clone(), baseline);
        }
    }

    /// Removes the baseline for `symbol`.
    pub fn remove(&self, symbol: &Symbol) -> Option<FeatureBaseline> {
        self.baselines.write().remove(symbol)
    }

    /// Returns the number of symbols with a baseline.
    #[must_use]
    pub fn len(&self) -> usize {
        self.baselines.read().len()
    }

    /// Returns true if no baselines are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.baselines.read().is_empty()
    }

    /// Returns every baseline, ordered by symbol.
    #[must_use]
    pub fn snapshot(&self) -> Vec<FeatureBaseline> {
        let mut all: Vec<_> = self.baselines.read().values().cloned().collect();
        all.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        all
    }

    /// Discards all baselines and installs `snapshot`.
    pub fn restore(&self, snapshot: Vec<FeatureBaseline>) {
        let restored: HashMap<_, _> = snapshot
            .into_iter()
            .map(|b| (b.symbol.clone(), b))
            .collect();
        *self.baselines.write() = restored;
    }
}
