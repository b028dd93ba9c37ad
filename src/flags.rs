// 🚩 Rule Flags - Deterministic red-flag evaluation over tenders
// Seven rule-based flags drive the tender risk score. Each flag carries
// a fixed weight; the table is immutable once constructed and its total
// must come to the documented maximum (95) or construction-time
// validation rejects it. Category statistics (p95 amounts, buyer
// concentration shares) are computed over the scored batch and can be
// rehydrated from persisted values for incremental runs.

use std::collections::HashMap;

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

use crate::anomaly::anomaly_flag;
use crate::records::TenderRecord;

/// Maximum attainable rule weight over the seven flags.
pub const RULE_WEIGHT_TOTAL: f64 = 95.0;
/// Tender windows shorter than this many days are suspicious.
pub const SHORT_WINDOW_DAYS: i64 = 7;
/// Buyer share of a category above which concentration flags.
pub const CONCENTRATION_THRESHOLD: f64 = 0.70;
/// Quantile used for the high-value comparison.
pub const HIGH_VALUE_PERCENTILE: f64 = 0.95;
/// Threshold substituted when a category has no amount statistics, high
/// enough that no real tender clears it.
pub const HIGH_VALUE_SENTINEL: f64 = 1e12;
/// Amounts divisible by this are treated as suspiciously round.
pub const ROUND_AMOUNT_MODULUS: f64 = 100_000.0;

/// Procurement methods considered open competition (compared
/// case-insensitively).
const OPEN_METHODS: [&str; 2] = ["open tender", "open"];

// ============================================================================
// WEIGHTS
// ============================================================================

/// Weight contributed by each rule flag when it fires. Constructed once
/// and validated before any scoring happens.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FlagWeights {
    pub single_bidder: f64,
    pub zero_bidders: f64,
    pub short_window: f64,
    pub non_open: f64,
    pub high_value: f64,
    pub buyer_concentration: f64,
    pub round_amount: f64,
}

impl FlagWeights {
    /// The production weight table.
    pub fn standard() -> Self {
        FlagWeights {
            single_bidder: 25.0,
            zero_bidders: 20.0,
            short_window: 15.0,
            non_open: 10.0,
            high_value: 10.0,
            buyer_concentration: 10.0,
            round_amount: 5.0,
        }
    }

    pub fn total(&self) -> f64 {
        self.single_bidder
            + self.zero_bidders
            + self.short_window
            + self.non_open
            + self.high_value
            + self.buyer_concentration
            + self.round_amount
    }

    /// Weights must be non-negative and total exactly the documented
    /// maximum, otherwise score normalization would silently shift.
    pub fn validate(&self) -> Result<()> {
        let weights = [
            ("single_bidder", self.single_bidder),
            ("zero_bidders", self.zero_bidders),
            ("short_window", self.short_window),
            ("non_open", self.non_open),
            ("high_value", self.high_value),
            ("buyer_concentration", self.buyer_concentration),
            ("round_amount", self.round_amount),
        ];
        for (name, weight) in weights {
            if weight < 0.0 {
                bail!("Rule weight '{}' is negative: {}", name, weight);
            }
        }
        let total = self.total();
        if (total - RULE_WEIGHT_TOTAL).abs() > f64::EPSILON {
            bail!(
                "Rule weights total {} but must total {}",
                total,
                RULE_WEIGHT_TOTAL
            );
        }
        Ok(())
    }
}

impl Default for FlagWeights {
    fn default() -> Self {
        Self::standard()
    }
}

// ============================================================================
// FLAGS
// ============================================================================

/// How the short-window flag treats a zero-day duration. Batch scoring
/// keeps the historical exclusion of zero (missing durations coerce to
/// zero and would otherwise all flag); single-tender scoring treats any
/// sub-week window as short.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ShortWindowMode {
    Batch,
    Submission,
}

impl ShortWindowMode {
    fn fires(&self, duration_days: i64) -> bool {
        match self {
            ShortWindowMode::Batch => {
                duration_days > 0 && duration_days < SHORT_WINDOW_DAYS
            }
            ShortWindowMode::Submission => duration_days < SHORT_WINDOW_DAYS,
        }
    }
}

/// The evaluated flag set for one tender.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenderFlags {
    pub single_bidder: bool,
    pub zero_bidders: bool,
    pub short_window: bool,
    pub non_open: bool,
    pub high_value: bool,
    pub buyer_concentration: bool,
    pub round_amount: bool,
    pub ml_anomaly: bool,
}

impl TenderFlags {
    /// Weighted sum over the seven rule flags. The anomaly flag carries
    /// no rule weight; it enters the score through the blend instead.
    pub fn weighted_sum(&self, weights: &FlagWeights) -> f64 {
        let mut sum = 0.0;
        if self.single_bidder {
            sum += weights.single_bidder;
        }
        if self.zero_bidders {
            sum += weights.zero_bidders;
        }
        if self.short_window {
            sum += weights.short_window;
        }
        if self.non_open {
            sum += weights.non_open;
        }
        if self.high_value {
            sum += weights.high_value;
        }
        if self.buyer_concentration {
            sum += weights.buyer_concentration;
        }
        if self.round_amount {
            sum += weights.round_amount;
        }
        sum
    }

    pub fn rule_flag_count(&self) -> usize {
        [
            self.single_bidder,
            self.zero_bidders,
            self.short_window,
            self.non_open,
            self.high_value,
            self.buyer_concentration,
            self.round_amount,
        ]
        .iter()
        .filter(|&&fired| fired)
        .count()
    }

    pub fn any(&self) -> bool {
        self.rule_flag_count() > 0 || self.ml_anomaly
    }
}

// ============================================================================
// CATEGORY STATISTICS
// ============================================================================

/// Per-category amount percentiles and per-(buyer, category) share of
/// tender counts, computed over a batch.
#[derive(Debug, Clone, Default)]
pub struct CategoryStatistics {
    category_p95: HashMap<String, f64>,
    buyer_category_share: HashMap<(String, String), f64>,
}

impl CategoryStatistics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compute statistics over a tender batch.
    pub fn compute(tenders: &[TenderRecord]) -> Self {
        let mut amounts_by_category: HashMap<&str, Vec<f64>> = HashMap::new();
        let mut category_counts: HashMap<&str, usize> = HashMap::new();
        let mut buyer_category_counts: HashMap<(&str, &str), usize> = HashMap::new();

        for tender in tenders {
            amounts_by_category
                .entry(tender.category.as_str())
                .or_default()
                .push(tender.amount);
            *category_counts.entry(tender.category.as_str()).or_insert(0) += 1;
            *buyer_category_counts
                .entry((tender.buyer_name.as_str(), tender.category.as_str()))
                .or_insert(0) += 1;
        }

        let mut stats = CategoryStatistics::new();
        for (category, mut amounts) in amounts_by_category {
            amounts.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
            stats
                .category_p95
                .insert(category.to_string(), percentile(&amounts, HIGH_VALUE_PERCENTILE));
        }
        for ((buyer, category), count) in buyer_category_counts {
            let total = category_counts.get(category).copied().unwrap_or(0);
            if total > 0 {
                stats.buyer_category_share.insert(
                    (buyer.to_string(), category.to_string()),
                    count as f64 / total as f64,
                );
            }
        }
        stats
    }

    /// 95th-percentile amount for a category, or the sentinel when the
    /// category was never observed.
    pub fn p95_for(&self, category: &str) -> f64 {
        self.category_p95
            .get(category)
            .copied()
            .unwrap_or(HIGH_VALUE_SENTINEL)
    }

    /// Buyer's share of a category's tender count, 0 when unobserved.
    pub fn buyer_share(&self, buyer: &str, category: &str) -> f64 {
        self.buyer_category_share
            .get(&(buyer.to_string(), category.to_string()))
            .copied()
            .unwrap_or(0.0)
    }

    pub fn set_p95(&mut self, category: &str, value: f64) {
        self.category_p95.insert(category.to_string(), value);
    }

    pub fn set_buyer_share(&mut self, buyer: &str, category: &str, share: f64) {
        self.buyer_category_share
            .insert((buyer.to_string(), category.to_string()), share);
    }

    pub fn p95_table(&self) -> &HashMap<String, f64> {
        &self.category_p95
    }

    pub fn share_table(&self) -> &HashMap<(String, String), f64> {
        &self.buyer_category_share
    }

    pub fn is_empty(&self) -> bool {
        self.category_p95.is_empty()
    }
}

/// Linear-interpolation percentile over an ascending-sorted slice.
pub(crate) fn percentile(sorted: &[f64], q: f64) -> f64 {
    match sorted.len() {
        0 => 0.0,
        1 => sorted[0],
        n => {
            let rank = q * (n - 1) as f64;
            let lo = rank.floor() as usize;
            let hi = rank.ceil() as usize;
            if lo == hi {
                sorted[lo]
            } else {
                sorted[lo] + (rank - lo as f64) * (sorted[hi] - sorted[lo])
            }
        }
    }
}

// ============================================================================
// EVALUATOR
// ============================================================================

/// Evaluates the full flag set for tenders against batch statistics.
pub struct FlagEvaluator {
    pub short_window_mode: ShortWindowMode,
    pub concentration_threshold: f64,
}

impl FlagEvaluator {
    pub fn new() -> Self {
        FlagEvaluator {
            short_window_mode: ShortWindowMode::Batch,
            concentration_threshold: CONCENTRATION_THRESHOLD,
        }
    }

    pub fn with_mode(mode: ShortWindowMode) -> Self {
        FlagEvaluator {
            short_window_mode: mode,
            ..Self::new()
        }
    }

    pub fn evaluate(
        &self,
        tender: &TenderRecord,
        stats: &CategoryStatistics,
        anomaly_probability: Option<f64>,
    ) -> TenderFlags {
        let method = tender.procurement_method.trim().to_lowercase();
        let is_open = OPEN_METHODS.iter().any(|m| *m == method);

        TenderFlags {
            single_bidder: tender.bidder_count == 1,
            zero_bidders: tender.bidder_count == 0,
            short_window: self.short_window_mode.fires(tender.duration_days),
            non_open: !is_open,
            high_value: tender.amount > stats.p95_for(&tender.category),
            buyer_concentration: stats.buyer_share(&tender.buyer_name, &tender.category)
                > self.concentration_threshold,
            round_amount: tender.amount % ROUND_AMOUNT_MODULUS == 0.0,
            ml_anomaly: anomaly_flag(anomaly_probability),
        }
    }
}

impl Default for FlagEvaluator {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// TESTS
// ============================================================================
