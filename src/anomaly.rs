// 🧪 Anomaly Signal - Optional statistical outlier probabilities
// The blended tender score accepts an anomaly probability in [0, 1] from
// an external outlier model. Scoring never trains that model; it only
// consumes probabilities through the `AnomalyScorer` seam. When no model
// output is available the probability is absent, not zero, and the blend
// degrades accordingly.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::records::{coerce_f64, TenderRecord};

/// Probability at or above which a tender carries the anomaly flag.
pub const ANOMALY_FLAG_THRESHOLD: f64 = 0.5;

// ============================================================================
// SCORER SEAM
// ============================================================================

/// Source of anomaly probabilities, keyed by tender.
pub trait AnomalyScorer {
    /// Probability in [0, 1] that this tender is a statistical outlier,
    /// or None when the model has no score for it.
    fn probability(&self, tender: &TenderRecord) -> Option<f64>;
}

/// Scorer used when no model output is wired in.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoAnomalyModel;

impl AnomalyScorer for NoAnomalyModel {
    fn probability(&self, _tender: &TenderRecord) -> Option<f64> {
        None
    }
}

/// Precomputed probabilities loaded from a scores file, looked up by
/// ocid.
#[derive(Debug, Clone, Default)]
pub struct StoredAnomalyScores {
    by_ocid: HashMap<String, f64>,
}

#[derive(Debug, Deserialize)]
struct RawScoreRow {
    #[serde(rename = "ocid", default)]
    ocid: String,
    #[serde(rename = "anomaly_score", default)]
    anomaly_score: String,
}

impl StoredAnomalyScores {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load ocid → probability rows from a CSV with columns
    /// `ocid,anomaly_score`. A missing file yields an empty table.
    pub fn from_csv(path: &Path) -> Result<Self> {
        let mut scores = StoredAnomalyScores::new();
        if !path.exists() {
            println!(
                "⚠️  Anomaly scores file not found at {}, scoring without model input",
                path.display()
            );
            return Ok(scores);
        }

        let mut reader = csv::Reader::from_path(path)
            .with_context(|| format!("Failed to open anomaly scores file: {}", path.display()))?;
        for row in reader.deserialize::<RawScoreRow>() {
            let Ok(raw) = row else { continue };
            if raw.ocid.is_empty() {
                continue;
            }
            scores.insert(&raw.ocid, coerce_f64(&raw.anomaly_score));
        }
        Ok(scores)
    }

    /// Probabilities are clamped into [0, 1] on the way in.
    pub fn insert(&mut self, ocid: &str, probability: f64) {
        self.by_ocid
            .insert(ocid.to_string(), probability.clamp(0.0, 1.0));
    }

    pub fn len(&self) -> usize {
        self.by_ocid.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_ocid.is_empty()
    }
}

impl AnomalyScorer for StoredAnomalyScores {
    fn probability(&self, tender: &TenderRecord) -> Option<f64> {
        self.by_ocid.get(&tender.ocid).copied()
    }
}

// ============================================================================
// FEATURE EXTRACTION
// ============================================================================

/// Numeric features exported per tender for external outlier modelling.
#[derive(Debug, Clone, Serialize)]
pub struct TenderFeatures {
    pub ocid: String,
    pub log_amount: f64,
    pub bidder_count: f64,
    pub duration_days: f64,
    /// Amount relative to the buyer's mean tender amount.
    pub amount_vs_buyer_avg: f64,
}

/// Build the feature matrix for a tender set. The relative-amount
/// feature uses each buyer's mean amount with a +1 guard so buyers whose
/// tenders are all zero-valued stay finite.
pub fn extract_features(tenders: &[TenderRecord]) -> Vec<TenderFeatures> {
    let mut buyer_totals: HashMap<&str, (f64, usize)> = HashMap::new();
    for tender in tenders {
        let entry = buyer_totals.entry(tender.buyer_name.as_str()).or_insert((0.0, 0));
        entry.0 += tender.amount;
        entry.1 += 1;
    }

    tenders
        .iter()
        .map(|tender| {
            let buyer_avg = buyer_totals
                .get(tender.buyer_name.as_str())
                .map(|(total, count)| total / *count as f64)
                .unwrap_or(0.0);
            TenderFeatures {
                ocid: tender.ocid.clone(),
                log_amount: tender.amount.ln_1p(),
                bidder_count: tender.bidder_count as f64,
                duration_days: tender.duration_days as f64,
                amount_vs_buyer_avg: tender.amount / (buyer_avg + 1.0),
            }
        })
        .collect()
}

/// Whether a probability crosses the anomaly flag line.
pub fn anomaly_flag(probability: Option<f64>) -> bool {
    matches!(probability, Some(p) if p >= ANOMALY_FLAG_THRESHOLD)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_tender(ocid: &str, buyer: &str, amount: f64) -> TenderRecord {
        TenderRecord {
            ocid: ocid.to_string(),
            tender_id: ocid.to_string(),
            title: "Test tender".to_string(),
            buyer_name: buyer.to_string(),
            category: "Road Works".to_string(),
            procurement_method: "Open Tender".to_string(),
            amount,
            bidder_count: 3,
            duration_days: 21,
            date_published: None,
        }
    }

    #[test]
    fn test_no_model_yields_absent_probability() {
        let tender = create_test_tender("ocds-1", "PWD", 1000000.0);
        let scorer = NoAnomalyModel;
        assert_eq!(scorer.probability(&tender), None);
        assert!(!anomaly_flag(scorer.probability(&tender)));
    }

    #[test]
    fn test_stored_scores_lookup_and_clamp() {
        let mut scores = StoredAnomalyScores::new();
        scores.insert("ocds-1", 0.82);
        scores.insert("ocds-2", 1.7);
        scores.insert("ocds-3", -0.4);

        let hit = create_test_tender("ocds-1", "PWD", 1000000.0);
        let clamped_high = create_test_tender("ocds-2", "PWD", 1000000.0);
        let clamped_low = create_test_tender("ocds-3", "PWD", 1000000.0);
        let miss = create_test_tender("ocds-9", "PWD", 1000000.0);

        assert_eq!(scores.probability(&hit), Some(0.82));
        assert_eq!(scores.probability(&clamped_high), Some(1.0));
        assert_eq!(scores.probability(&clamped_low), Some(0.0));
        assert_eq!(scores.probability(&miss), None);
    }

    #[test]
    fn test_anomaly_flag_threshold() {
        assert!(anomaly_flag(Some(0.5)));
        assert!(anomaly_flag(Some(0.93)));
        assert!(!anomaly_flag(Some(0.49)));
        assert!(!anomaly_flag(None));
    }

    #[test]
    fn test_feature_extraction_uses_buyer_average() {
        let tenders = vec![
            create_test_tender("ocds-1", "PWD", 1000000.0),
            create_test_tender("ocds-2", "PWD", 3000000.0),
            create_test_tender("ocds-3", "Jal Board", 500000.0),
        ];

        let features = extract_features(&tenders);
        assert_eq!(features.len(), 3);

        // PWD average is 2,000,000; ratio uses the +1 guard.
        let expected = 1000000.0 / 2000001.0;
        assert!((features[0].amount_vs_buyer_avg - expected).abs() < 1e-9);
        assert!((features[0].log_amount - 1000001.0_f64.ln()).abs() < 1e-9);

        // Single-tender buyer: amount equals its own average.
        let expected_solo = 500000.0 / 500001.0;
        assert!((features[2].amount_vs_buyer_avg - expected_solo).abs() < 1e-9);

        println!("✅ Feature extraction test passed");
    }

    #[test]
    fn test_missing_scores_file_yields_empty_table() {
        let scores = StoredAnomalyScores::from_csv(Path::new("/nonexistent/scores.csv")).unwrap();
        assert!(scores.is_empty());
    }
}
