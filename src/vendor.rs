// 💼 Vendor Profiles - Four-dimension composite vendor risk
// The terminal aggregate: every registry company (and every procurement
// buyer without a registry match) gets a profile combining four
// sub-scores. Bid pattern looks at the entity's tenders as a buyer,
// shell risk comes from the registry scorer, political exposure from
// resolved bond flows, and financial risk from capital structure. The
// dimension weights total exactly 100, so four perfect sub-scores meet
// the 100 ceiling rather than overflowing it.

use std::collections::{BTreeMap, HashMap, HashSet};

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

use crate::resolve::{BondFlow, MatchRecord};
use crate::scoring::{round2, RiskTier, ScoredTender};
use crate::shell::ShellProfile;

/// Composite at or above this routes the vendor to a human reviewer.
pub const VENDOR_REVIEW_THRESHOLD: f64 = 25.0;
/// Maximum attainable dimension weight.
pub const DIMENSION_WEIGHT_TOTAL: f64 = 100.0;
/// Raw-name truncation used for buyer-only profile ids.
const BUYER_PROFILE_ID_MAX_LEN: usize = 60;

// ============================================================================
// DIMENSION WEIGHTS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DimensionWeights {
    pub bid_pattern: f64,
    pub shell_risk: f64,
    pub political: f64,
    pub financials: f64,
}

impl DimensionWeights {
    pub fn standard() -> Self {
        DimensionWeights {
            bid_pattern: 30.0,
            shell_risk: 25.0,
            political: 25.0,
            financials: 20.0,
        }
    }

    pub fn total(&self) -> f64 {
        self.bid_pattern + self.shell_risk + self.political + self.financials
    }

    pub fn validate(&self) -> Result<()> {
        let weights = [
            ("bid_pattern", self.bid_pattern),
            ("shell_risk", self.shell_risk),
            ("political", self.political),
            ("financials", self.financials),
        ];
        for (name, weight) in weights {
            if weight < 0.0 {
                bail!("Dimension weight '{}' is negative: {}", name, weight);
            }
        }
        let total = self.total();
        if (total - DIMENSION_WEIGHT_TOTAL).abs() > f64::EPSILON {
            bail!(
                "Dimension weights total {} but must total {}",
                total,
                DIMENSION_WEIGHT_TOTAL
            );
        }
        Ok(())
    }
}

impl Default for DimensionWeights {
    fn default() -> Self {
        Self::standard()
    }
}

// ============================================================================
// BID PATTERN DIMENSION
// ============================================================================

/// Per-buyer aggregates over scored tenders, plus the bid pattern score
/// derived from them.
#[derive(Debug, Clone, Serialize)]
pub struct BuyerBidStats {
    pub buyer_name: String,
    pub total_tenders: usize,
    pub single_bidder_count: usize,
    pub zero_bidder_count: usize,
    pub short_window_count: usize,
    pub non_open_count: usize,
    pub high_value_count: usize,
    pub buyer_concentration_count: usize,
    pub round_amount_count: usize,
    pub ml_anomaly_count: usize,
    pub avg_risk_score: f64,
    pub max_risk_score: f64,
    pub total_amount: f64,
    pub avg_amount: f64,
    pub single_bid_pct: f64,
    pub short_window_pct: f64,
    pub high_value_pct: f64,
    pub anomaly_pct: f64,
    pub bid_pattern_score: f64,
}

/// Aggregate scored tenders per buyer and compute bid pattern scores.
/// Output is sorted by buyer name.
pub fn compute_buyer_stats(scored: &[ScoredTender]) -> Vec<BuyerBidStats> {
    #[derive(Default)]
    struct Acc {
        total: usize,
        single: usize,
        zero: usize,
        short: usize,
        non_open: usize,
        high_value: usize,
        concentration: usize,
        round: usize,
        ml: usize,
        risk_sum: f64,
        risk_max: f64,
        amount_sum: f64,
    }

    let mut by_buyer: BTreeMap<&str, Acc> = BTreeMap::new();
    for item in scored {
        let acc = by_buyer.entry(item.tender.buyer_name.as_str()).or_default();
        acc.total += 1;
        acc.single += item.flags.single_bidder as usize;
        acc.zero += item.flags.zero_bidders as usize;
        acc.short += item.flags.short_window as usize;
        acc.non_open += item.flags.non_open as usize;
        acc.high_value += item.flags.high_value as usize;
        acc.concentration += item.flags.buyer_concentration as usize;
        acc.round += item.flags.round_amount as usize;
        acc.ml += item.flags.ml_anomaly as usize;
        acc.risk_sum += item.risk_score;
        acc.risk_max = acc.risk_max.max(item.risk_score);
        acc.amount_sum += item.tender.amount;
    }

    by_buyer
        .into_iter()
        .map(|(buyer, acc)| {
            let n = acc.total as f64;
            let single_bid_pct = acc.single as f64 / n;
            let short_window_pct = acc.short as f64 / n;
            let high_value_pct = acc.high_value as f64 / n;
            let anomaly_pct = acc.ml as f64 / n;
            let avg_risk_score = acc.risk_sum / n;
            let bid_pattern_score = round2(
                (single_bid_pct * 35.0
                    + short_window_pct * 15.0
                    + high_value_pct * 15.0
                    + anomaly_pct * 15.0
                    + (avg_risk_score / 100.0) * 20.0)
                    .clamp(0.0, 100.0),
            );
            BuyerBidStats {
                buyer_name: buyer.to_string(),
                total_tenders: acc.total,
                single_bidder_count: acc.single,
                zero_bidder_count: acc.zero,
                short_window_count: acc.short,
                non_open_count: acc.non_open,
                high_value_count: acc.high_value,
                buyer_concentration_count: acc.concentration,
                round_amount_count: acc.round,
                ml_anomaly_count: acc.ml,
                avg_risk_score,
                max_risk_score: acc.risk_max,
                total_amount: acc.amount_sum,
                avg_amount: acc.amount_sum / n,
                single_bid_pct,
                short_window_pct,
                high_value_pct,
                anomaly_pct,
                bid_pattern_score,
            }
        })
        .collect()
}

// ============================================================================
// POLITICAL DIMENSION
// ============================================================================

/// Per-purchaser political exposure aggregates.
#[derive(Debug, Clone, Serialize)]
pub struct PurchaserPoliticalStats {
    pub purchaser_name: String,
    pub parties_funded: usize,
    pub total_bond_value: f64,
    pub total_bonds: i64,
    pub party_list: Vec<String>,
    pub value_score: f64,
    pub diversity_score: f64,
    pub political_score: f64,
}

/// Political exposure carried onto a matched company profile.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoliticalInfo {
    pub political_score: f64,
    pub parties_funded: usize,
    pub total_bond_value: i64,
    pub purchaser_name: String,
}

/// One evidence edge attached to a vendor profile.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum VendorConnection {
    #[serde(rename = "electoral_bond")]
    ElectoralBond {
        source: String,
        target: String,
        value: i64,
        label: String,
    },
    #[serde(rename = "shared_address")]
    SharedAddress { cluster_size: usize, label: String },
}

impl VendorConnection {
    fn purchaser(&self) -> Option<&str> {
        match self {
            VendorConnection::ElectoralBond { source, .. } => Some(source),
            VendorConnection::SharedAddress { .. } => None,
        }
    }
}

/// Indian-currency label: crores at or above 1 Cr, lakhs below.
fn bond_value_label(value: f64) -> String {
    if value >= 1e7 {
        format!("₹{:.1}Cr", value / 1e7)
    } else {
        format!("₹{:.1}L", value / 1e5)
    }
}

#[derive(Debug, Clone, Default)]
pub struct PoliticalAnalysis {
    pub purchaser_stats: Vec<PurchaserPoliticalStats>,
    pub connections: Vec<VendorConnection>,
    pub by_cin: HashMap<String, PoliticalInfo>,
}

/// Score purchasers by donation value and recipient diversity, then map
/// the scores onto registry companies through the purchaser match table
/// (a company matched by several purchasers keeps the highest score).
pub fn compute_political_scores(
    bond_flows: &[BondFlow],
    purchaser_matches: &[MatchRecord],
) -> PoliticalAnalysis {
    if bond_flows.is_empty() {
        return PoliticalAnalysis::default();
    }

    struct Acc {
        parties: Vec<String>,
        total_value: f64,
        total_bonds: i64,
    }

    let mut by_purchaser: BTreeMap<&str, Acc> = BTreeMap::new();
    for flow in bond_flows {
        let acc = by_purchaser
            .entry(flow.purchaser_name.as_str())
            .or_insert(Acc {
                parties: Vec::new(),
                total_value: 0.0,
                total_bonds: 0,
            });
        if !acc.parties.contains(&flow.party_name) {
            acc.parties.push(flow.party_name.clone());
        }
        acc.total_value += flow.total_value;
        acc.total_bonds += flow.total_bonds;
    }

    let max_value = by_purchaser
        .values()
        .map(|a| a.total_value)
        .fold(0.0_f64, f64::max);
    let max_parties = by_purchaser
        .values()
        .map(|a| a.parties.len())
        .max()
        .unwrap_or(0);

    let purchaser_stats: Vec<PurchaserPoliticalStats> = by_purchaser
        .into_iter()
        .map(|(purchaser, acc)| {
            let value_score = if max_value > 0.0 {
                (acc.total_value / max_value) * 60.0
            } else {
                0.0
            };
            let diversity_score = if max_parties > 0 {
                (acc.parties.len() as f64 / max_parties as f64) * 40.0
            } else {
                0.0
            };
            PurchaserPoliticalStats {
                purchaser_name: purchaser.to_string(),
                parties_funded: acc.parties.len(),
                total_bond_value: acc.total_value,
                total_bonds: acc.total_bonds,
                party_list: acc.parties,
                value_score,
                diversity_score,
                political_score: round2((value_score + diversity_score).clamp(0.0, 100.0)),
            }
        })
        .collect();

    let connections: Vec<VendorConnection> = bond_flows
        .iter()
        .map(|flow| VendorConnection::ElectoralBond {
            source: flow.purchaser_name.clone(),
            target: flow.party_name.clone(),
            value: flow.total_value as i64,
            label: bond_value_label(flow.total_value),
        })
        .collect();

    let stats_by_name: HashMap<&str, &PurchaserPoliticalStats> = purchaser_stats
        .iter()
        .map(|s| (s.purchaser_name.as_str(), s))
        .collect();

    let mut by_cin: HashMap<String, PoliticalInfo> = HashMap::new();
    for record in purchaser_matches {
        let Some(stats) = stats_by_name.get(record.source_name.as_str()) else {
            continue;
        };
        let replace = match by_cin.get(&record.matched_entity_id) {
            Some(existing) => stats.political_score > existing.political_score,
            None => true,
        };
        if replace {
            by_cin.insert(
                record.matched_entity_id.clone(),
                PoliticalInfo {
                    political_score: stats.political_score,
                    parties_funded: stats.parties_funded,
                    total_bond_value: stats.total_bond_value as i64,
                    purchaser_name: stats.purchaser_name.clone(),
                },
            );
        }
    }

    PoliticalAnalysis {
        purchaser_stats,
        connections,
        by_cin,
    }
}

// ============================================================================
// FINANCIALS DIMENSION
// ============================================================================

/// Financial risk from capital structure: thin capitalization, inflated
/// authorized/paid ratio, inactive status, and young age.
pub fn financials_score(profile: &ShellProfile) -> f64 {
    let capital_risk = ((1.0 - profile.capital_percentile_rank) * 30.0).clamp(0.0, 30.0);
    let ratio_risk = if profile.indicators.high_auth_paid_ratio {
        25.0
    } else {
        0.0
    };
    let status_risk = if profile.indicators.inactive { 25.0 } else { 0.0 };
    let age_risk = if profile.indicators.young_company {
        20.0
    } else {
        0.0
    };
    round2((capital_risk + ratio_risk + status_risk + age_risk).clamp(0.0, 100.0))
}

// ============================================================================
// PROFILES
// ============================================================================

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct SubScores {
    pub bid_pattern: f64,
    pub shell_risk: f64,
    pub political: f64,
    pub financials: f64,
}

/// Buyer-side tender aggregates carried onto a profile.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BidStatsView {
    pub total_tenders: usize,
    pub single_bid_pct: f64,
    pub avg_risk_score: f64,
    pub total_amount: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct VendorProfile {
    pub entity_id: String,
    pub cin: Option<String>,
    pub company_name: String,
    pub company_status: String,
    pub state: String,
    pub composite_risk_score: f64,
    pub risk_tier: RiskTier,
    pub sub_scores: SubScores,
    pub bid_stats: Option<BidStatsView>,
    pub political_info: Option<PoliticalInfo>,
    pub shell_explanation: String,
    pub connections: Vec<VendorConnection>,
    pub requires_human_review: bool,
}

/// Everything the vendor aggregation pass produces.
#[derive(Debug, Clone, Default)]
pub struct VendorAssessment {
    pub profiles: Vec<VendorProfile>,
    pub buyer_stats: Vec<BuyerBidStats>,
    pub purchaser_stats: Vec<PurchaserPoliticalStats>,
    pub political_connections: Vec<VendorConnection>,
}

impl VendorAssessment {
    pub fn tier_counts(&self) -> (usize, usize, usize) {
        let mut high = 0;
        let mut medium = 0;
        let mut low = 0;
        for profile in &self.profiles {
            match profile.risk_tier {
                RiskTier::High => high += 1,
                RiskTier::Medium => medium += 1,
                RiskTier::Low => low += 1,
            }
        }
        (high, medium, low)
    }

    pub fn summary(&self) -> String {
        let (high, medium, low) = self.tier_counts();
        let political = self
            .profiles
            .iter()
            .filter(|p| p.sub_scores.political > 0.0)
            .count();
        let with_bids = self
            .profiles
            .iter()
            .filter(|p| p.sub_scores.bid_pattern > 0.0)
            .count();
        format!(
            "💼 {} vendor profiles: {} 🔴 HIGH, {} 🟡 MEDIUM, {} 🟢 LOW ({} politically connected, {} with bid data)",
            self.profiles.len(),
            high,
            medium,
            low,
            political,
            with_bids
        )
    }
}

// ============================================================================
// SCORER
// ============================================================================

pub struct VendorScorer {
    pub weights: DimensionWeights,
}

impl VendorScorer {
    pub fn new() -> Result<Self> {
        Self::with_weights(DimensionWeights::standard())
    }

    pub fn with_weights(weights: DimensionWeights) -> Result<Self> {
        weights.validate()?;
        Ok(VendorScorer { weights })
    }

    /// Weighted composite over the four sub-scores, capped at 100.
    pub fn composite(&self, sub: &SubScores) -> f64 {
        let combined = sub.bid_pattern * self.weights.bid_pattern / 100.0
            + sub.shell_risk * self.weights.shell_risk / 100.0
            + sub.political * self.weights.political / 100.0
            + sub.financials * self.weights.financials / 100.0;
        round2(combined.min(100.0))
    }

    /// Build a profile for every registry company and a degraded,
    /// bid-pattern-only profile for every unmatched procurement buyer.
    pub fn build_profiles(
        &self,
        shell_profiles: &[ShellProfile],
        scored_tenders: &[ScoredTender],
        bond_flows: &[BondFlow],
        purchaser_matches: &[MatchRecord],
        buyer_matches: &[MatchRecord],
    ) -> VendorAssessment {
        let buyer_stats = compute_buyer_stats(scored_tenders);
        let stats_by_name: HashMap<&str, &BuyerBidStats> = buyer_stats
            .iter()
            .map(|s| (s.buyer_name.as_str(), s))
            .collect();

        let political = compute_political_scores(bond_flows, purchaser_matches);

        // First match row per CIN decides which buyer's tenders feed the
        // company's bid dimension.
        let mut buyer_for_cin: HashMap<&str, &str> = HashMap::new();
        for record in buyer_matches {
            buyer_for_cin
                .entry(record.matched_entity_id.as_str())
                .or_insert(record.source_name.as_str());
        }
        let matched_buyers: HashSet<&str> = buyer_matches
            .iter()
            .map(|r| r.source_name.as_str())
            .collect();

        let mut profiles = Vec::with_capacity(shell_profiles.len());
        for shell in shell_profiles {
            profiles.push(self.company_profile(
                shell,
                &stats_by_name,
                &buyer_for_cin,
                &political,
            ));
        }

        for stats in &buyer_stats {
            if matched_buyers.contains(stats.buyer_name.as_str()) {
                continue;
            }
            profiles.push(self.buyer_only_profile(stats));
        }

        VendorAssessment {
            profiles,
            buyer_stats,
            purchaser_stats: political.purchaser_stats,
            political_connections: political.connections,
        }
    }

    fn company_profile(
        &self,
        shell: &ShellProfile,
        stats_by_name: &HashMap<&str, &BuyerBidStats>,
        buyer_for_cin: &HashMap<&str, &str>,
        political: &PoliticalAnalysis,
    ) -> VendorProfile {
        let mut bid_score = 0.0;
        let mut bid_stats = None;
        if let Some(buyer_name) = buyer_for_cin.get(shell.cin.as_str()) {
            if let Some(stats) = stats_by_name.get(buyer_name) {
                bid_score = stats.bid_pattern_score;
                bid_stats = Some(BidStatsView {
                    total_tenders: stats.total_tenders,
                    single_bid_pct: (stats.single_bid_pct * 1000.0).round() / 1000.0,
                    avg_risk_score: round2(stats.avg_risk_score),
                    total_amount: stats.total_amount,
                });
            }
        }

        let political_info = political.by_cin.get(shell.cin.as_str()).cloned();
        let political_score = political_info
            .as_ref()
            .map(|info| info.political_score)
            .unwrap_or(0.0);

        let sub_scores = SubScores {
            bid_pattern: round2(bid_score),
            shell_risk: round2(shell.shell_risk_score),
            political: round2(political_score),
            financials: financials_score(shell),
        };
        let composite = self.composite(&sub_scores);

        let mut connections = Vec::new();
        if let Some(info) = &political_info {
            for conn in &political.connections {
                if conn.purchaser() == Some(info.purchaser_name.as_str()) {
                    connections.push(conn.clone());
                }
            }
        }
        if shell.indicators.cluster_size >= 2 {
            connections.push(VendorConnection::SharedAddress {
                cluster_size: shell.indicators.cluster_size,
                label: format!(
                    "Shares address with {} companies",
                    shell.indicators.cluster_size - 1
                ),
            });
        }

        VendorProfile {
            entity_id: shell.cin.clone(),
            cin: Some(shell.cin.clone()),
            company_name: shell.name.clone(),
            company_status: shell.status.clone(),
            state: shell.state_code.clone(),
            composite_risk_score: composite,
            risk_tier: RiskTier::from_score(composite),
            sub_scores,
            bid_stats,
            political_info,
            shell_explanation: shell.explanation.clone(),
            connections,
            requires_human_review: composite >= VENDOR_REVIEW_THRESHOLD,
        }
    }

    /// Government buyers with no registry match score on the bid
    /// dimension alone; the tier reflects the bid score itself so a
    /// dirty buyer is not diluted by three zero dimensions.
    fn buyer_only_profile(&self, stats: &BuyerBidStats) -> VendorProfile {
        let bid_score = stats.bid_pattern_score;
        let entity_id: String = format!(
            "BUYER_{}",
            stats
                .buyer_name
                .chars()
                .take(BUYER_PROFILE_ID_MAX_LEN)
                .collect::<String>()
        );

        VendorProfile {
            entity_id,
            cin: None,
            company_name: stats.buyer_name.clone(),
            company_status: "Government Entity".to_string(),
            state: String::new(),
            composite_risk_score: round2(bid_score * self.weights.bid_pattern / 100.0),
            risk_tier: RiskTier::from_score(bid_score),
            sub_scores: SubScores {
                bid_pattern: round2(bid_score),
                shell_risk: 0.0,
                political: 0.0,
                financials: 0.0,
            },
            bid_stats: Some(BidStatsView {
                total_tenders: stats.total_tenders,
                single_bid_pct: (stats.single_bid_pct * 1000.0).round() / 1000.0,
                avg_risk_score: round2(stats.avg_risk_score),
                total_amount: stats.total_amount,
            }),
            political_info: None,
            shell_explanation: String::new(),
            connections: Vec::new(),
            requires_human_review: bid_score >= VENDOR_REVIEW_THRESHOLD,
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flags::TenderFlags;
    use crate::records::TenderRecord;
    use crate::shell::ShellIndicators;

    fn create_scored_tender(
        ocid: &str,
        buyer: &str,
        amount: f64,
        flags: TenderFlags,
        risk_score: f64,
    ) -> ScoredTender {
        ScoredTender {
            tender: TenderRecord {
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
            },
            flags,
            anomaly_probability: None,
            weighted_sum: 0.0,
            risk_score,
            tier: RiskTier::from_score(risk_score),
            explanation: String::new(),
        }
    }

    fn create_test_shell_profile(
        cin: &str,
        score: f64,
        cluster_size: usize,
        capital_rank: f64,
    ) -> ShellProfile {
        ShellProfile {
            cin: cin.to_string(),
            name: format!("Company {}", cin),
            status: "Active".to_string(),
            class: "Private".to_string(),
            paidup_capital: 100000.0,
            authorized_capital: 100000.0,
            state_code: "DL".to_string(),
            age_days: 5000,
            capital_percentile_rank: capital_rank,
            indicators: ShellIndicators {
                cluster_size,
                address_cluster: cluster_size >= 3,
                ..Default::default()
            },
            shell_risk_score: score,
            explanation: "No strong shell indicators".to_string(),
            review_status: "Auto-Cleared".to_string(),
        }
    }

    fn create_flow(purchaser: &str, party: &str, value: f64, bonds: i64) -> BondFlow {
        BondFlow {
            purchaser_name: purchaser.to_string(),
            party_name: party.to_string(),
            total_bonds: bonds,
            total_value: value,
            first_date: None,
            last_date: None,
        }
    }

    fn create_match(source: &str, cin: &str, kind: crate::resolve::MatchKind) -> MatchRecord {
        MatchRecord {
            source_name: source.to_string(),
            matched_entity_id: cin.to_string(),
            matched_name: format!("Company {}", cin),
            match_score: 1.0,
            match_type: kind,
        }
    }

    #[test]
    fn test_dimension_weights_validate() {
        assert!(DimensionWeights::standard().validate().is_ok());

        let mut tampered = DimensionWeights::standard();
        tampered.political = 30.0;
        assert!(tampered.validate().is_err());
    }

    #[test]
    fn test_buyer_stats_formula() {
        let single = TenderFlags {
            single_bidder: true,
            ..Default::default()
        };
        let short = TenderFlags {
            short_window: true,
            ..Default::default()
        };
        let high = TenderFlags {
            high_value: true,
            ..Default::default()
        };
        let scored = vec![
            create_scored_tender("o1", "PWD", 100.0, single, 50.0),
            create_scored_tender("o2", "PWD", 200.0, single, 30.0),
            create_scored_tender("o3", "PWD", 300.0, short, 10.0),
            create_scored_tender("o4", "PWD", 400.0, high, 10.0),
        ];

        let stats = compute_buyer_stats(&scored);
        assert_eq!(stats.len(), 1);
        let pwd = &stats[0];

        assert_eq!(pwd.total_tenders, 4);
        assert_eq!(pwd.single_bidder_count, 2);
        assert_eq!(pwd.single_bid_pct, 0.5);
        assert_eq!(pwd.avg_risk_score, 25.0);
        assert_eq!(pwd.max_risk_score, 50.0);
        assert_eq!(pwd.total_amount, 1000.0);

        // 0.5×35 + 0.25×15 + 0.25×15 + 0 + 0.25×20 = 30.0
        assert_eq!(pwd.bid_pattern_score, 30.0);

        println!("✅ Bid pattern formula test passed");
    }

    #[test]
    fn test_political_scores_relative_to_maxima() {
        let flows = vec![
            create_flow("Big Donor", "Party A", 20000000.0, 2),
            create_flow("Big Donor", "Party B", 0.0, 0),
            create_flow("Small Donor", "Party A", 10000000.0, 1),
        ];
        let analysis = compute_political_scores(&flows, &[]);

        assert_eq!(analysis.purchaser_stats.len(), 2);
        let big = analysis
            .purchaser_stats
            .iter()
            .find(|s| s.purchaser_name == "Big Donor")
            .unwrap();
        let small = analysis
            .purchaser_stats
            .iter()
            .find(|s| s.purchaser_name == "Small Donor")
            .unwrap();

        // Big Donor holds both maxima: 60 + 40.
        assert_eq!(big.political_score, 100.0);
        assert_eq!(big.parties_funded, 2);
        // Small Donor: half the value, half the diversity.
        assert_eq!(small.political_score, 50.0);
    }

    #[test]
    fn test_political_zero_value_guard() {
        let flows = vec![create_flow("Donor", "Party A", 0.0, 1)];
        let analysis = compute_political_scores(&flows, &[]);
        // No positive value anywhere: only diversity contributes.
        assert_eq!(analysis.purchaser_stats[0].political_score, 40.0);
    }

    #[test]
    fn test_connection_labels() {
        assert_eq!(bond_value_label(10000000.0), "₹1.0Cr");
        assert_eq!(bond_value_label(25000000.0), "₹2.5Cr");
        assert_eq!(bond_value_label(500000.0), "₹5.0L");
    }

    #[test]
    fn test_political_by_cin_keeps_highest_score() {
        let flows = vec![
            create_flow("Alpha Trading", "Party A", 20000000.0, 2),
            create_flow("Alpha Trading", "Party B", 20000000.0, 2),
            create_flow("Beta Trading", "Party A", 10000000.0, 1),
        ];
        let matches = vec![
            create_match("Beta Trading", "CIN001", crate::resolve::MatchKind::BondPurchaserToCompany),
            create_match("Alpha Trading", "CIN001", crate::resolve::MatchKind::BondPurchaserToCompany),
        ];
        let analysis = compute_political_scores(&flows, &matches);

        let info = analysis.by_cin.get("CIN001").unwrap();
        assert_eq!(info.purchaser_name, "Alpha Trading");
        assert_eq!(info.political_score, 100.0);
        assert_eq!(info.total_bond_value, 40000000);
    }

    #[test]
    fn test_financials_score() {
        let mut profile = create_test_shell_profile("CIN001", 0.0, 1, 0.25);
        profile.indicators.high_auth_paid_ratio = true;
        profile.indicators.inactive = true;
        profile.indicators.young_company = true;

        // (1−0.25)×30 + 25 + 25 + 20 = 92.5
        assert_eq!(financials_score(&profile), 92.5);

        let clean = create_test_shell_profile("CIN002", 0.0, 1, 1.0);
        assert_eq!(financials_score(&clean), 0.0);
    }

    #[test]
    fn test_composite_weighting_and_cap() {
        let scorer = VendorScorer::new().unwrap();

        let sub = SubScores {
            bid_pattern: 80.0,
            shell_risk: 60.0,
            political: 0.0,
            financials: 40.0,
        };
        // 24 + 15 + 0 + 8 = 47
        let composite = scorer.composite(&sub);
        assert_eq!(composite, 47.0);
        assert_eq!(RiskTier::from_score(composite), RiskTier::Medium);
        assert!(composite >= VENDOR_REVIEW_THRESHOLD);

        let maxed = SubScores {
            bid_pattern: 100.0,
            shell_risk: 100.0,
            political: 100.0,
            financials: 100.0,
        };
        assert_eq!(scorer.composite(&maxed), 100.0);

        println!("✅ Composite weighting test passed");
    }

    #[test]
    fn test_company_profile_assembly() {
        let mut shell = create_test_shell_profile("CIN001", 40.0, 3, 0.1);
        shell.indicators.high_auth_paid_ratio = true;

        let flags = TenderFlags {
            single_bidder: true,
            ..Default::default()
        };
        let scored = vec![
            create_scored_tender("o1", "Apex Infra", 1000000.0, flags, 40.0),
            create_scored_tender("o2", "Apex Infra", 1000000.0, TenderFlags::default(), 0.0),
        ];
        let flows = vec![create_flow("Apex Infra Pvt Ltd", "Party A", 50000000.0, 5)];
        let p2c = vec![create_match(
            "Apex Infra Pvt Ltd",
            "CIN001",
            crate::resolve::MatchKind::BondPurchaserToCompany,
        )];
        let b2c = vec![create_match(
            "Apex Infra",
            "CIN001",
            crate::resolve::MatchKind::ProcurementBuyerToCompany,
        )];

        let scorer = VendorScorer::new().unwrap();
        let assessment = scorer.build_profiles(&[shell], &scored, &flows, &p2c, &b2c);

        // The matched buyer produces no separate buyer-only profile.
        assert_eq!(assessment.profiles.len(), 1);
        let profile = &assessment.profiles[0];

        assert_eq!(profile.entity_id, "CIN001");
        assert_eq!(profile.cin.as_deref(), Some("CIN001"));
        assert!(profile.bid_stats.is_some());
        assert_eq!(profile.bid_stats.as_ref().unwrap().total_tenders, 2);
        assert!(profile.political_info.is_some());
        assert_eq!(profile.sub_scores.political, 100.0);
        assert_eq!(profile.sub_scores.shell_risk, 40.0);

        // One electoral edge plus the shared-address edge.
        assert_eq!(profile.connections.len(), 2);
        assert!(profile
            .connections
            .iter()
            .any(|c| matches!(c, VendorConnection::SharedAddress { cluster_size: 3, .. })));
        assert!(profile.composite_risk_score <= 100.0);
        assert!(profile.requires_human_review);
    }

    #[test]
    fn test_unmatched_buyer_gets_degraded_profile() {
        let flags = TenderFlags {
            single_bidder: true,
            short_window: true,
            ..Default::default()
        };
        let scored = vec![create_scored_tender(
            "o1",
            "Irrigation Department Zone IV",
            2000000.0,
            flags,
            70.0,
        )];

        let scorer = VendorScorer::new().unwrap();
        let assessment = scorer.build_profiles(&[], &scored, &[], &[], &[]);

        assert_eq!(assessment.profiles.len(), 1);
        let profile = &assessment.profiles[0];

        assert_eq!(profile.entity_id, "BUYER_Irrigation Department Zone IV");
        assert_eq!(profile.cin, None);
        assert_eq!(profile.company_status, "Government Entity");
        assert_eq!(profile.sub_scores.shell_risk, 0.0);
        assert_eq!(profile.sub_scores.political, 0.0);
        assert_eq!(profile.sub_scores.financials, 0.0);

        // 1×35 + 1×15 + 0 + 0 + 0.7×20 = 64 → HIGH from the bid score,
        // while the composite itself is only the weighted slice.
        assert_eq!(profile.sub_scores.bid_pattern, 64.0);
        assert_eq!(profile.composite_risk_score, 19.2);
        assert_eq!(profile.risk_tier, RiskTier::High);
        assert!(profile.requires_human_review);
    }

    #[test]
    fn test_connection_serialization_shape() {
        let conn = VendorConnection::ElectoralBond {
            source: "Apex Infra".to_string(),
            target: "Party A".to_string(),
            value: 10000000,
            label: "₹1.0Cr".to_string(),
        };
        let json = serde_json::to_value(&conn).unwrap();
        assert_eq!(json["type"], "electoral_bond");
        assert_eq!(json["value"], 10000000);

        let shared = VendorConnection::SharedAddress {
            cluster_size: 3,
            label: "Shares address with 2 companies".to_string(),
        };
        let json = serde_json::to_value(&shared).unwrap();
        assert_eq!(json["type"], "shared_address");
        assert_eq!(json["cluster_size"], 3);
    }

    #[test]
    fn test_long_buyer_name_truncated_in_id() {
        let long_name = "Superintending Engineer Public Health Engineering Department Circle Office North";
        let flags = TenderFlags::default();
        let scored = vec![create_scored_tender("o1", long_name, 100.0, flags, 0.0)];

        let scorer = VendorScorer::new().unwrap();
        let assessment = scorer.build_profiles(&[], &scored, &[], &[], &[]);
        let profile = &assessment.profiles[0];

        assert_eq!(profile.entity_id.len(), "BUYER_".len() + 60);
        assert!(profile.entity_id.starts_with("BUYER_Superintending"));
    }
}
