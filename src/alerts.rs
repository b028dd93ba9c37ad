// 🚨 Risk Alerts - Entity-level alerts from scored outputs
// Pure builders: scored tenders, shell profiles, and bond flows go in,
// alert rows with per-rule explanations come out. Persistence lives in
// the db module. Alert levels use their own cutoffs (HIGH at 50,
// MEDIUM at 25) rather than the tender tier bands, so the alert queue
// surfaces earlier than the dashboard tiers escalate.

use serde::Serialize;
use serde_json::json;
use sha2::{Digest, Sha256};

use crate::resolve::{BondFlow, EntityType};
use crate::scoring::{RiskTier, ScoredTender};
use crate::shell::ShellProfile;

/// Tenders at or above this risk score raise an alert.
pub const TENDER_ALERT_THRESHOLD: f64 = 20.0;
/// Companies at or above this shell score raise an alert.
pub const SHELL_ALERT_THRESHOLD: f64 = 25.0;
/// Bond purchasers below this many crore are skipped entirely.
pub const BOND_ALERT_MIN_CRORE: f64 = 1.0;

const RUPEES_PER_CRORE: f64 = 1e7;

fn round4(value: f64) -> f64 {
    (value * 10000.0).round() / 10000.0
}

/// Alert level from a 0..100 score: HIGH at 50, MEDIUM at 25.
fn alert_level(score: f64) -> RiskTier {
    if score >= 50.0 {
        RiskTier::High
    } else if score >= 25.0 {
        RiskTier::Medium
    } else {
        RiskTier::Low
    }
}

// ============================================================================
// ALERT TYPES
// ============================================================================

/// One rule-level explanation attached to an alert.
#[derive(Debug, Clone, Serialize)]
pub struct AlertExplanation {
    pub rule_code: &'static str,
    pub reason: String,
    pub metrics: serde_json::Value,
}

/// An entity-level alert with a normalized 0..1 score.
#[derive(Debug, Clone, Serialize)]
pub struct RiskAlert {
    pub entity_type: EntityType,
    pub entity_name: String,
    pub risk_score: f64,
    pub level: RiskTier,
    pub explanations: Vec<AlertExplanation>,
}

impl RiskAlert {
    /// Stable content hash used as the idempotency key when persisting.
    pub fn content_hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.entity_type.as_str().as_bytes());
        hasher.update(b"|");
        hasher.update(self.entity_name.trim().to_uppercase().as_bytes());
        hasher.update(b"|");
        hasher.update(format!("{:.4}", self.risk_score).as_bytes());
        hasher.update(b"|");
        hasher.update(self.level.code().as_bytes());
        format!("{:x}", hasher.finalize())
    }
}

/// Purchaser → party relationship edge derived from a bond flow.
#[derive(Debug, Clone, Serialize)]
pub struct RelationshipEdge {
    pub source_type: EntityType,
    pub source_name: String,
    pub target_type: EntityType,
    pub target_name: String,
    pub edge_type: &'static str,
    pub weight: f64,
    pub evidence: String,
}

#[derive(Debug, Clone, Default)]
pub struct AlertBundle {
    pub tender_alerts: Vec<RiskAlert>,
    pub shell_alerts: Vec<RiskAlert>,
    pub bond_alerts: Vec<RiskAlert>,
    pub edges: Vec<RelationshipEdge>,
}

impl AlertBundle {
    pub fn total_alerts(&self) -> usize {
        self.tender_alerts.len() + self.shell_alerts.len() + self.bond_alerts.len()
    }

    /// All alerts in persistence order: tender, shell, bond.
    pub fn all_alerts(&self) -> impl Iterator<Item = &RiskAlert> {
        self.tender_alerts
            .iter()
            .chain(self.shell_alerts.iter())
            .chain(self.bond_alerts.iter())
    }

    pub fn summary(&self) -> String {
        format!(
            "🚨 {} alerts ({} tender, {} shell company, {} bond purchaser), {} relationship edges",
            self.total_alerts(),
            self.tender_alerts.len(),
            self.shell_alerts.len(),
            self.bond_alerts.len(),
            self.edges.len()
        )
    }
}

// ============================================================================
// ENGINE
// ============================================================================

pub struct AlertEngine {
    pub tender_threshold: f64,
    pub shell_threshold: f64,
    pub bond_min_crore: f64,
}

impl AlertEngine {
    pub fn new() -> Self {
        AlertEngine {
            tender_threshold: TENDER_ALERT_THRESHOLD,
            shell_threshold: SHELL_ALERT_THRESHOLD,
            bond_min_crore: BOND_ALERT_MIN_CRORE,
        }
    }

    pub fn build_all(
        &self,
        scored: &[ScoredTender],
        profiles: &[ShellProfile],
        flows: &[BondFlow],
    ) -> AlertBundle {
        let (bond_alerts, edges) = self.build_bond_alerts(flows);
        AlertBundle {
            tender_alerts: self.build_tender_alerts(scored),
            shell_alerts: self.build_shell_alerts(profiles),
            bond_alerts,
            edges,
        }
    }

    /// One alert per flagged tender, attributed to the buyer. Every
    /// fired flag becomes an explanation row; a tender that crossed the
    /// threshold without any single flag gets a COMPOSITE row.
    pub fn build_tender_alerts(&self, scored: &[ScoredTender]) -> Vec<RiskAlert> {
        let mut alerts = Vec::new();
        for item in scored {
            if item.risk_score < self.tender_threshold {
                continue;
            }
            let tender = &item.tender;
            let tid = tender.tender_id.as_str();
            let mut explanations = Vec::new();

            if item.flags.single_bidder {
                explanations.push(AlertExplanation {
                    rule_code: "SINGLE_BIDDER",
                    reason: format!("Tender {}: only 1 bidder submitted", tid),
                    metrics: json!({ "num_tenderers": tender.bidder_count }),
                });
            }
            if item.flags.zero_bidders {
                explanations.push(AlertExplanation {
                    rule_code: "ZERO_BIDDERS",
                    reason: format!("Tender {}: zero bidders recorded", tid),
                    metrics: json!({ "num_tenderers": 0 }),
                });
            }
            if item.flags.short_window {
                explanations.push(AlertExplanation {
                    rule_code: "SHORT_WINDOW",
                    reason: format!(
                        "Tender {}: tender window of {} days",
                        tid, tender.duration_days
                    ),
                    metrics: json!({ "duration_days": tender.duration_days }),
                });
            }
            if item.flags.non_open {
                explanations.push(AlertExplanation {
                    rule_code: "NON_OPEN_TENDER",
                    reason: format!(
                        "Tender {}: non-open method ({})",
                        tid, tender.procurement_method
                    ),
                    metrics: json!({ "method": tender.procurement_method }),
                });
            }
            if item.flags.high_value {
                explanations.push(AlertExplanation {
                    rule_code: "HIGH_VALUE",
                    reason: format!("Tender {}: value above 95th percentile", tid),
                    metrics: json!({ "amount": tender.amount }),
                });
            }
            if item.flags.buyer_concentration {
                explanations.push(AlertExplanation {
                    rule_code: "BUYER_CONCENTRATION",
                    reason: format!("Tender {}: buyer dominates >70% of category", tid),
                    metrics: json!({ "buyer_name": tender.buyer_name }),
                });
            }
            if item.flags.round_amount {
                explanations.push(AlertExplanation {
                    rule_code: "ROUND_AMOUNT",
                    reason: format!("Tender {}: suspiciously round amount", tid),
                    metrics: json!({ "amount": tender.amount }),
                });
            }
            if item.flags.ml_anomaly {
                explanations.push(AlertExplanation {
                    rule_code: "ML_ANOMALY",
                    reason: format!("Tender {}: flagged as statistical outlier", tid),
                    metrics: json!({
                        "anomaly_score": item.anomaly_probability.unwrap_or(0.0)
                    }),
                });
            }
            if explanations.is_empty() {
                explanations.push(AlertExplanation {
                    rule_code: "COMPOSITE",
                    reason: format!("Tender {}: composite risk {:.1}/100", tid, item.risk_score),
                    metrics: json!({ "risk_score": item.risk_score }),
                });
            }

            alerts.push(RiskAlert {
                entity_type: EntityType::ProcurementBuyer,
                entity_name: tender.buyer_name.trim().to_string(),
                risk_score: round4(item.risk_score / 100.0),
                level: alert_level(item.risk_score),
                explanations,
            });
        }
        alerts
    }

    pub fn build_shell_alerts(&self, profiles: &[ShellProfile]) -> Vec<RiskAlert> {
        let mut alerts = Vec::new();
        for profile in profiles {
            if profile.shell_risk_score < self.shell_threshold {
                continue;
            }
            let name = profile.name.as_str();
            let mut explanations = Vec::new();

            if profile.indicators.address_cluster {
                explanations.push(AlertExplanation {
                    rule_code: "ADDRESS_CLUSTER",
                    reason: format!(
                        "{} (CIN: {}): shares address with {} others",
                        name,
                        profile.cin,
                        profile.indicators.cluster_size.saturating_sub(1)
                    ),
                    metrics: json!({ "cluster_size": profile.indicators.cluster_size }),
                });
            }
            if profile.indicators.low_capital {
                explanations.push(AlertExplanation {
                    rule_code: "LOW_CAPITAL",
                    reason: format!("{}: paid-up capital in lowest quartile", name),
                    metrics: json!({ "paidup_capital": profile.paidup_capital }),
                });
            }
            if profile.indicators.young_company {
                explanations.push(AlertExplanation {
                    rule_code: "YOUNG_COMPANY",
                    reason: format!("{}: incorporated {} days ago", name, profile.age_days),
                    metrics: json!({ "age_days": profile.age_days }),
                });
            }
            if profile.indicators.inactive {
                explanations.push(AlertExplanation {
                    rule_code: "INACTIVE",
                    reason: format!("{}: status {}", name, profile.status),
                    metrics: json!({ "status": profile.status }),
                });
            }
            if profile.indicators.high_auth_paid_ratio {
                explanations.push(AlertExplanation {
                    rule_code: "HIGH_AUTH_PAID_RATIO",
                    reason: format!(
                        "{}: auth/paid capital ratio {:.1}x",
                        name, profile.indicators.auth_paid_ratio
                    ),
                    metrics: json!({
                        "authorized_capital": profile.authorized_capital,
                        "paidup_capital": profile.paidup_capital,
                    }),
                });
            }
            if profile.indicators.opc {
                explanations.push(AlertExplanation {
                    rule_code: "ONE_PERSON_COMPANY",
                    reason: format!("{}: One Person Company", name),
                    metrics: json!({ "company_class": profile.class }),
                });
            }
            if explanations.is_empty() {
                explanations.push(AlertExplanation {
                    rule_code: "SHELL_COMPOSITE",
                    reason: format!(
                        "{}: shell risk {:.1}/100",
                        name, profile.shell_risk_score
                    ),
                    metrics: json!({ "shell_risk_score": profile.shell_risk_score }),
                });
            }

            alerts.push(RiskAlert {
                entity_type: EntityType::Company,
                entity_name: profile.name.trim().to_string(),
                risk_score: round4(profile.shell_risk_score / 100.0),
                level: alert_level(profile.shell_risk_score),
                explanations,
            });
        }
        alerts
    }

    /// Aggregate flows per purchaser, alert on totals of a crore or
    /// more, and emit one relationship edge per flow row. Alerts come
    /// out largest donor first.
    pub fn build_bond_alerts(
        &self,
        flows: &[BondFlow],
    ) -> (Vec<RiskAlert>, Vec<RelationshipEdge>) {
        use std::collections::BTreeMap;

        struct Acc {
            total_value: f64,
            total_bonds: i64,
            parties: Vec<String>,
        }

        let mut by_purchaser: BTreeMap<&str, Acc> = BTreeMap::new();
        for flow in flows {
            let acc = by_purchaser
                .entry(flow.purchaser_name.as_str())
                .or_insert(Acc {
                    total_value: 0.0,
                    total_bonds: 0,
                    parties: Vec::new(),
                });
            acc.total_value += flow.total_value;
            acc.total_bonds += flow.total_bonds;
            if !acc.parties.contains(&flow.party_name) {
                acc.parties.push(flow.party_name.clone());
            }
        }

        let mut aggregated: Vec<(&str, Acc)> = by_purchaser.into_iter().collect();
        aggregated.sort_by(|a, b| {
            b.1.total_value
                .partial_cmp(&a.1.total_value)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let mut alerts = Vec::new();
        for (name, acc) in &aggregated {
            let value_cr = acc.total_value / RUPEES_PER_CRORE;
            if value_cr < self.bond_min_crore {
                continue;
            }
            let risk_score = (value_cr / 1000.0).min(1.0);
            let level = if value_cr >= 50.0 {
                RiskTier::High
            } else if value_cr >= 10.0 {
                RiskTier::Medium
            } else {
                RiskTier::Low
            };
            let shown: Vec<&str> = acc.parties.iter().take(5).map(String::as_str).collect();

            alerts.push(RiskAlert {
                entity_type: EntityType::BondPurchaser,
                entity_name: name.trim().to_string(),
                risk_score: round4(risk_score),
                level,
                explanations: vec![AlertExplanation {
                    rule_code: "ELECTORAL_BOND",
                    reason: format!(
                        "{}: {} bonds worth ₹{:.1}Cr to {} parties: {}",
                        name,
                        acc.total_bonds,
                        value_cr,
                        acc.parties.len(),
                        shown.join(", ")
                    ),
                    metrics: json!({
                        "total_value": acc.total_value,
                        "total_bonds": acc.total_bonds,
                        "parties": acc.parties,
                    }),
                }],
            });
        }

        let edges = flows
            .iter()
            .map(|flow| RelationshipEdge {
                source_type: EntityType::BondPurchaser,
                source_name: flow.purchaser_name.clone(),
                target_type: EntityType::PoliticalParty,
                target_name: flow.party_name.clone(),
                edge_type: "ELECTORAL_BOND_FLOW",
                weight: round4(flow.total_value),
                evidence: format!("Bond: {} → {}", flow.purchaser_name, flow.party_name),
            })
            .collect();

        (alerts, edges)
    }
}

impl Default for AlertEngine {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// TESTS
// ============================================================================
