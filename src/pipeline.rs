// 🏭 Risk Pipeline - End-to-end batch orchestration
// One deterministic pass: load → resolve → graph → score → aggregate →
// alert → persist → export. Configuration is injected, including the
// reference date used for company-age checks, so two runs over the same
// inputs produce identical outputs.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde_json::Value;

use crate::alerts::AlertEngine;
use crate::anomaly::{AnomalyScorer, NoAnomalyModel, StoredAnomalyScores};
use crate::db;
use crate::graph::AddressGraphBuilder;
use crate::ingest;
use crate::matcher::{EntityMatcher, DEFAULT_MATCH_THRESHOLD, DEFAULT_TOP_K};
use crate::resolve::EntityResolver;
use crate::scoring::{ScoredTender, ScoringSummary, TenderScorer};
use crate::shell::{ShellScorer, ShellSummary};
use crate::vendor::{VendorProfile, VendorScorer};

// ============================================================================
// CONFIGURATION
// ============================================================================

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub data_dir: PathBuf,
    pub db_path: PathBuf,
    pub output_dir: PathBuf,
    pub match_threshold: f64,
    pub top_k: usize,
    /// Reference date for company-age checks.
    pub today: NaiveDate,
    /// Optional precomputed anomaly probabilities (ocid, anomaly_score).
    pub anomaly_scores_path: Option<PathBuf>,
}

impl PipelineConfig {
    pub fn new(data_dir: impl Into<PathBuf>, output_dir: impl Into<PathBuf>, today: NaiveDate) -> Self {
        let data_dir = data_dir.into();
        let output_dir = output_dir.into();
        PipelineConfig {
            db_path: output_dir.join("vendor_risk.db"),
            anomaly_scores_path: Some(data_dir.join("anomaly_scores.csv")),
            data_dir,
            output_dir,
            match_threshold: DEFAULT_MATCH_THRESHOLD,
            top_k: DEFAULT_TOP_K,
            today,
        }
    }

    pub fn tenders_path(&self) -> PathBuf {
        self.data_dir.join("tenders.csv")
    }

    pub fn companies_path(&self) -> PathBuf {
        self.data_dir.join("companies.csv")
    }

    pub fn bond_purchases_path(&self) -> PathBuf {
        self.data_dir.join("bond_purchases.csv")
    }

    pub fn bond_redemptions_path(&self) -> PathBuf {
        self.data_dir.join("bond_redemptions.csv")
    }
}

// ============================================================================
// RUN REPORT
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct RunReport {
    pub tenders: usize,
    pub companies: usize,
    pub bond_purchases: usize,
    pub bond_redemptions: usize,
    pub purchaser_matches: usize,
    pub buyer_matches: usize,
    pub bond_flows: usize,
    pub address_clusters: usize,
    pub scored_tenders: usize,
    pub shell_profiles: usize,
    pub vendor_profiles: usize,
    pub alerts: usize,
    pub edges: usize,
    pub tender_review_queue: usize,
    pub vendor_review_queue: usize,
}

impl RunReport {
    pub fn summary(&self) -> String {
        format!(
            "Run complete: {} tenders scored, {} companies profiled, {} vendor profiles, \
             {} alerts, {} tenders and {} vendors queued for review",
            self.scored_tenders,
            self.shell_profiles,
            self.vendor_profiles,
            self.alerts,
            self.tender_review_queue,
            self.vendor_review_queue
        )
    }
}

// ============================================================================
// PIPELINE
// ============================================================================

pub struct RiskPipeline {
    pub config: PipelineConfig,
}

impl RiskPipeline {
    pub fn new(config: PipelineConfig) -> Self {
        RiskPipeline { config }
    }

    pub fn run(&self) -> Result<RunReport> {
        let config = &self.config;
        let mut report = RunReport::default();

        println!("{}", "═".repeat(60));
        println!("  Vendor Risk Engine - full pipeline run");
        println!("  Reference date: {}", config.today);
        println!("{}", "═".repeat(60));

        // 1. Load source data
        println!("\n📂 [1/8] Loading source data...");
        let tenders = ingest::load_tenders(&config.tenders_path())?;
        let companies = ingest::load_companies(&config.companies_path())?;
        let purchases = ingest::load_bond_purchases(&config.bond_purchases_path())?;
        let redemptions = ingest::load_bond_redemptions(&config.bond_redemptions_path())?;
        report.tenders = tenders.len();
        report.companies = companies.len();
        report.bond_purchases = purchases.len();
        report.bond_redemptions = redemptions.len();
        println!(
            "✓ {} tenders, {} companies, {} bond purchases, {} redemptions",
            tenders.len(),
            companies.len(),
            purchases.len(),
            redemptions.len()
        );

        // 2. Cross-domain entity resolution
        println!("\n🔗 [2/8] Resolving entities...");
        let resolver = EntityResolver::with_matcher(EntityMatcher {
            threshold: config.match_threshold,
            top_k: config.top_k,
        });
        let resolution = resolver.resolve(&companies, &tenders, &purchases, &redemptions);
        report.purchaser_matches = resolution.purchaser_matches.len();
        report.buyer_matches = resolution.buyer_matches.len();
        report.bond_flows = resolution.bond_flows.len();
        println!("✓ {}", resolution.summary());

        // 3. Shared-address graph
        println!("\n🕸️  [3/8] Building address graph...");
        let graph = AddressGraphBuilder::new().build(
            &companies
                .iter()
                .map(|c| (c.cin.clone(), c.address.clone()))
                .collect::<Vec<_>>(),
        );
        report.address_clusters = graph.clusters.len();
        println!("✓ {}", graph.summary());

        // 4. Tender flags and blended risk scores
        println!("\n📊 [4/8] Scoring tenders...");
        let anomaly: Box<dyn AnomalyScorer> = match &config.anomaly_scores_path {
            Some(path) => Box::new(StoredAnomalyScores::from_csv(path)?),
            None => Box::new(NoAnomalyModel),
        };
        let scorer = TenderScorer::new()?;
        let scored = scorer.score_batch(&tenders, anomaly.as_ref());
        report.scored_tenders = scored.len();
        report.tender_review_queue = scored.iter().filter(|s| s.needs_review()).count();
        println!("{}", ScoringSummary::from_scored(&scored).summary());

        // 5. Shell-company risk
        println!("\n🏢 [5/8] Scoring shell risk...");
        let shell_scorer = ShellScorer::new(config.today)?;
        let shells = shell_scorer.score_companies(&companies, &graph);
        report.shell_profiles = shells.len();
        println!("{}", ShellSummary::from_profiles(&shells).summary());

        // 6. Composite vendor profiles
        println!("\n💼 [6/8] Building vendor profiles...");
        let vendor_scorer = VendorScorer::new()?;
        let assessment = vendor_scorer.build_profiles(
            &shells,
            &scored,
            &resolution.bond_flows,
            &resolution.purchaser_matches,
            &resolution.buyer_matches,
        );
        report.vendor_profiles = assessment.profiles.len();
        report.vendor_review_queue = assessment
            .profiles
            .iter()
            .filter(|p| p.requires_human_review)
            .count();
        println!("{}", assessment.summary());

        // 7. Alerts
        println!("\n🚨 [7/8] Generating alerts...");
        let bundle = AlertEngine::new().build_all(&scored, &shells, &resolution.bond_flows);
        report.alerts = bundle.total_alerts();
        report.edges = bundle.edges.len();
        println!("{}", bundle.summary());

        // 8. Persist and export
        println!("\n💾 [8/8] Persisting and exporting...");
        fs::create_dir_all(&config.output_dir).with_context(|| {
            format!("Failed to create output dir {}", config.output_dir.display())
        })?;
        let conn = db::open_database(&config.db_path)?;

        let entities = db::insert_entities(&conn, &resolution.registry)?;
        println!(
            "✓ Entities: {} inserted, {} already present",
            entities.inserted, entities.skipped
        );
        db::replace_matches(&conn, &resolution.purchaser_matches, &resolution.buyer_matches)?;
        db::replace_bond_flows(&conn, &resolution.bond_flows)?;
        db::replace_tender_scores(&conn, &scored)?;
        db::replace_company_risk(&conn, &shells)?;
        db::replace_vendor_profiles(&conn, &assessment.profiles)?;
        db::replace_category_stats(&conn, &tenders)?;
        let generated_at = format!("{}T00:00:00Z", config.today);
        let alerts = db::replace_alerts(&conn, &bundle, &generated_at)?;
        println!(
            "✓ Alerts: {} inserted, {} duplicates skipped",
            alerts.inserted, alerts.skipped
        );

        let mut run = db::RunRecord::new(&config.today.to_string());
        run.tenders = report.tenders;
        run.companies = report.companies;
        run.purchaser_matches = report.purchaser_matches;
        run.buyer_matches = report.buyer_matches;
        run.bond_flows = report.bond_flows;
        run.vendor_profiles = report.vendor_profiles;
        run.alerts = report.alerts;
        run.edges = report.edges;
        db::record_run(&conn, &run)?;

        write_vendor_profiles_json(
            &config.output_dir.join("vendor_profiles.json"),
            &assessment.profiles,
        )?;
        write_vendor_summary_csv(
            &config.output_dir.join("vendor_summary.csv"),
            &assessment.profiles,
        )?;
        write_tender_scores_csv(&config.output_dir.join("tender_scores.csv"), &scored)?;
        println!("✓ Artifacts written to {}", config.output_dir.display());

        println!("\n{}", "═".repeat(60));
        println!("  {}", report.summary());
        println!("{}", "═".repeat(60));

        Ok(report)
    }
}

// ============================================================================
// EXPORTS
// ============================================================================

/// Profiles as a JSON object keyed by entity id.
pub fn write_vendor_profiles_json(path: &Path, profiles: &[VendorProfile]) -> Result<()> {
    let mut map = serde_json::Map::new();
    for profile in profiles {
        map.insert(profile.entity_id.clone(), serde_json::to_value(profile)?);
    }
    let json = serde_json::to_string_pretty(&Value::Object(map))?;
    fs::write(path, json)
        .with_context(|| format!("Failed to write profiles to {}", path.display()))?;
    Ok(())
}

/// One flat row per profile, highest composite first.
pub fn write_vendor_summary_csv(path: &Path, profiles: &[VendorProfile]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    writer.write_record([
        "entity_id",
        "company_name",
        "cin",
        "composite_risk_score",
        "risk_tier",
        "bid_pattern_score",
        "shell_risk_score",
        "political_score",
        "financials_score",
        "num_connections",
        "requires_human_review",
    ])?;

    let mut ordered: Vec<&VendorProfile> = profiles.iter().collect();
    ordered.sort_by(|a, b| {
        b.composite_risk_score
            .partial_cmp(&a.composite_risk_score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    for profile in ordered {
        let record = [
            profile.entity_id.clone(),
            profile.company_name.clone(),
            profile.cin.clone().unwrap_or_default(),
            profile.composite_risk_score.to_string(),
            profile.risk_tier.code().to_string(),
            profile.sub_scores.bid_pattern.to_string(),
            profile.sub_scores.shell_risk.to_string(),
            profile.sub_scores.political.to_string(),
            profile.sub_scores.financials.to_string(),
            profile.connections.len().to_string(),
            profile.requires_human_review.to_string(),
        ];
        writer.write_record(&record)?;
    }
    writer.flush()?;
    Ok(())
}

/// Scored tenders, highest risk first, with the OCDS-flavored headers
/// downstream dashboards expect.
pub fn write_tender_scores_csv(path: &Path, scored: &[ScoredTender]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    writer.write_record([
        "ocid",
        "tender/id",
        "tender/title",
        "buyer/name",
        "tenderclassification/description",
        "tender/procurementMethod",
        "amount",
        "num_tenderers",
        "duration_days",
        "flag_single_bidder",
        "flag_zero_bidders",
        "flag_short_window",
        "flag_non_open",
        "flag_high_value",
        "flag_buyer_concentration",
        "flag_round_amount",
        "ml_anomaly_flag",
        "anomaly_score",
        "risk_score",
        "risk_tier",
        "risk_explanation",
    ])?;

    let mut ordered: Vec<&ScoredTender> = scored.iter().collect();
    ordered.sort_by(|a, b| {
        b.risk_score
            .partial_cmp(&a.risk_score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    fn flag(value: bool) -> String {
        let bit = if value { "1" } else { "0" };
        bit.to_string()
    }

    for item in ordered {
        let tender = &item.tender;
        let record = [
            tender.ocid.clone(),
            tender.tender_id.clone(),
            tender.title.clone(),
            tender.buyer_name.clone(),
            tender.category.clone(),
            tender.procurement_method.clone(),
            tender.amount.to_string(),
            tender.bidder_count.to_string(),
            tender.duration_days.to_string(),
            flag(item.flags.single_bidder),
            flag(item.flags.zero_bidders),
            flag(item.flags.short_window),
            flag(item.flags.non_open),
            flag(item.flags.high_value),
            flag(item.flags.buyer_concentration),
            flag(item.flags.round_amount),
            flag(item.flags.ml_anomaly),
            item.anomaly_probability
                .map(|p| p.to_string())
                .unwrap_or_default(),
            item.risk_score.to_string(),
            item.tier.label().to_string(),
            item.explanation.clone(),
        ];
        writer.write_record(&record)?;
    }
    writer.flush()?;
    Ok(())
}

// ============================================================================
// TESTS
// ============================================================================
