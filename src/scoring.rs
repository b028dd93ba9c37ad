// 🎯 Tender Scoring - Blended rule + anomaly risk scores
// A tender's score blends the normalized rule weight (scaled to 85) with
// the anomaly probability (scaled to 15). Without a model probability
// the anomaly term is absent and the rule part is NOT rescaled, so a
// rules-only run tops out at 85 rather than stretching to fill the full
// range. Scores clip to [0, 100] and round to 2 decimals.

use serde::{Deserialize, Serialize};

use crate::anomaly::AnomalyScorer;
use crate::flags::{
    CategoryStatistics, FlagEvaluator, FlagWeights, ShortWindowMode, TenderFlags,
    RULE_WEIGHT_TOTAL,
};
use crate::records::TenderRecord;

/// Portion of the score range granted to rule flags.
pub const RULE_SCALE: f64 = 85.0;
/// Portion of the score range granted to the anomaly probability.
pub const ANOMALY_SCALE: f64 = 15.0;

/// Scores at or above this land in the batch review queue.
pub const REVIEW_QUEUE_THRESHOLD: f64 = 15.0;

// ============================================================================
// TIERS
// ============================================================================

/// Risk tier bands: below 30 is Low, 30 up to 60 is Medium, 60 and
/// above is High.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RiskTier {
    #[serde(rename = "LOW")]
    Low,
    #[serde(rename = "MEDIUM")]
    Medium,
    #[serde(rename = "HIGH")]
    High,
}

impl RiskTier {
    pub fn from_score(score: f64) -> Self {
        if score < 30.0 {
            RiskTier::Low
        } else if score < 60.0 {
            RiskTier::Medium
        } else {
            RiskTier::High
        }
    }

    /// Display label used in human-facing listings.
    pub fn label(&self) -> &'static str {
        match self {
            RiskTier::Low => "🟢 Low",
            RiskTier::Medium => "🟡 Medium",
            RiskTier::High => "🔴 High",
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            RiskTier::Low => "LOW",
            RiskTier::Medium => "MEDIUM",
            RiskTier::High => "HIGH",
        }
    }
}

// ============================================================================
// SCORE ARITHMETIC
// ============================================================================

pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Blend a rule weighted sum with an optional anomaly probability.
pub fn blend_score(weighted_sum: f64, anomaly_probability: Option<f64>) -> f64 {
    let rule_part = (weighted_sum / RULE_WEIGHT_TOTAL) * RULE_SCALE;
    let total = match anomaly_probability {
        Some(p) => rule_part + p * ANOMALY_SCALE,
        None => rule_part,
    };
    round2(total.clamp(0.0, 100.0))
}

// ============================================================================
// EXPLANATIONS
// ============================================================================

/// Human-readable reasons for a tender's flags, joined with "; ".
pub fn explain_flags(flags: &TenderFlags, tender: &TenderRecord) -> String {
    let mut reasons: Vec<String> = Vec::new();
    if flags.single_bidder {
        reasons.push("Only 1 bidder submitted (possible bid-rigging)".to_string());
    }
    if flags.zero_bidders {
        reasons.push("No bidders recorded (may be pre-awarded)".to_string());
    }
    if flags.short_window {
        reasons.push(format!(
            "Very short tender window ({} days)",
            tender.duration_days
        ));
    }
    if flags.non_open {
        reasons.push(format!(
            "Non-open procurement method: {}",
            tender.procurement_method
        ));
    }
    if flags.high_value {
        reasons.push("Contract value above 95th percentile for this category".to_string());
    }
    if flags.buyer_concentration {
        reasons.push("This buyer dominates >70% of contracts in this category".to_string());
    }
    if flags.round_amount {
        reasons.push("Contract amount is suspiciously round (possible fixed pricing)".to_string());
    }
    if flags.ml_anomaly {
        reasons.push("ML model flagged this as a statistical outlier".to_string());
    }
    if reasons.is_empty() {
        "No specific flags triggered".to_string()
    } else {
        reasons.join("; ")
    }
}

// ============================================================================
// SCORED TENDER
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct ScoredTender {
    pub tender: TenderRecord,
    pub flags: TenderFlags,
    pub anomaly_probability: Option<f64>,
    pub weighted_sum: f64,
    pub risk_score: f64,
    pub tier: RiskTier,
    pub explanation: String,
}

impl ScoredTender {
    pub fn needs_review(&self) -> bool {
        self.risk_score >= REVIEW_QUEUE_THRESHOLD
    }
}

/// One line of a score breakdown: where the points came from.
#[derive(Debug, Clone, Serialize)]
pub struct ScoreComponent {
    pub label: String,
    pub points: f64,
}

/// Itemized decomposition of a tender's score for the explain surface.
#[derive(Debug, Clone, Serialize)]
pub struct ScoreBreakdown {
    pub components: Vec<ScoreComponent>,
    pub weighted_sum: f64,
    pub rule_part: f64,
    pub anomaly_part: Option<f64>,
    pub final_score: f64,
}

// ============================================================================
// SCORER
// ============================================================================

pub struct TenderScorer {
    pub weights: FlagWeights,
    pub evaluator: FlagEvaluator,
}

impl TenderScorer {
    /// Build a scorer with the standard weight table. Weight validation
    /// runs here so a bad table never reaches scoring.
    pub fn new() -> anyhow::Result<Self> {
        Self::with_weights(FlagWeights::standard(), ShortWindowMode::Batch)
    }

    pub fn with_weights(weights: FlagWeights, mode: ShortWindowMode) -> anyhow::Result<Self> {
        weights.validate()?;
        Ok(TenderScorer {
            weights,
            evaluator: FlagEvaluator::with_mode(mode),
        })
    }

    /// Score a single tender against precomputed statistics.
    pub fn score(
        &self,
        tender: &TenderRecord,
        stats: &CategoryStatistics,
        anomaly_probability: Option<f64>,
    ) -> ScoredTender {
        let flags = self.evaluator.evaluate(tender, stats, anomaly_probability);
        let weighted_sum = flags.weighted_sum(&self.weights);
        let risk_score = blend_score(weighted_sum, anomaly_probability);
        ScoredTender {
            explanation: explain_flags(&flags, tender),
            tier: RiskTier::from_score(risk_score),
            tender: tender.clone(),
            flags,
            anomaly_probability,
            weighted_sum,
            risk_score,
        }
    }

    /// Score a whole batch: statistics come from the batch itself,
    /// anomaly probabilities from the given scorer.
    pub fn score_batch(
        &self,
        tenders: &[TenderRecord],
        anomaly: &dyn AnomalyScorer,
    ) -> Vec<ScoredTender> {
        let stats = CategoryStatistics::compute(tenders);
        tenders
            .iter()
            .map(|tender| self.score(tender, &stats, anomaly.probability(tender)))
            .collect()
    }

    /// Itemize one scored tender for display.
    pub fn breakdown(&self, scored: &ScoredTender) -> ScoreBreakdown {
        let mut components = Vec::new();
        let flags = &scored.flags;
        let pairs = [
            ("Single bidder", flags.single_bidder, self.weights.single_bidder),
            ("Zero bidders", flags.zero_bidders, self.weights.zero_bidders),
            ("Short tender window", flags.short_window, self.weights.short_window),
            ("Non-open method", flags.non_open, self.weights.non_open),
            ("High value for category", flags.high_value, self.weights.high_value),
            (
                "Buyer concentration",
                flags.buyer_concentration,
                self.weights.buyer_concentration,
            ),
            ("Round amount", flags.round_amount, self.weights.round_amount),
        ];
        for (label, fired, weight) in pairs {
            if fired {
                components.push(ScoreComponent {
                    label: label.to_string(),
                    points: weight,
                });
            }
        }

        let rule_part = (scored.weighted_sum / RULE_WEIGHT_TOTAL) * RULE_SCALE;
        ScoreBreakdown {
            components,
            weighted_sum: scored.weighted_sum,
            rule_part: round2(rule_part),
            anomaly_part: scored.anomaly_probability.map(|p| round2(p * ANOMALY_SCALE)),
            final_score: scored.risk_score,
        }
    }
}

// ============================================================================
// BATCH SUMMARY
// ============================================================================

/// Tier and flag tallies over a scored batch.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ScoringSummary {
    pub total: usize,
    pub high: usize,
    pub medium: usize,
    pub low: usize,
    pub single_bidder: usize,
    pub zero_bidders: usize,
    pub non_open: usize,
    pub ml_flagged: usize,
    pub review_queue: usize,
}

impl ScoringSummary {
    pub fn from_scored(scored: &[ScoredTender]) -> Self {
        let mut summary = ScoringSummary {
            total: scored.len(),
            ..Default::default()
        };
        for item in scored {
            match item.tier {
                RiskTier::High => summary.high += 1,
                RiskTier::Medium => summary.medium += 1,
                RiskTier::Low => summary.low += 1,
            }
            if item.flags.single_bidder {
                summary.single_bidder += 1;
            }
            if item.flags.zero_bidders {
                summary.zero_bidders += 1;
            }
            if item.flags.non_open {
                summary.non_open += 1;
            }
            if item.flags.ml_anomaly {
                summary.ml_flagged += 1;
            }
            if item.needs_review() {
                summary.review_queue += 1;
            }
        }
        summary
    }

    pub fn summary(&self) -> String {
        format!(
            "📊 Scored {} tenders: {} 🔴 high, {} 🟡 medium, {} 🟢 low ({} queued for review)",
            self.total, self.high, self.medium, self.low, self.review_queue
        )
    }
}

// ============================================================================
// TESTS
// ============================================================================
