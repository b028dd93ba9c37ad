// 🏭 Vendor Risk Engine - CLI
// Subcommands: run (full batch pipeline), score (ad-hoc tender),
// explain (stored score breakdown), alerts (top stored alerts).

use std::env;
use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use rusqlite::Connection;

use vendor_risk::db;
use vendor_risk::flags::RULE_WEIGHT_TOTAL;
use vendor_risk::matcher::{EntityIndex, EntityMatcher};
use vendor_risk::records::TenderRecord;
use vendor_risk::{PipelineConfig, RiskPipeline, TenderScorer};

fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();

    match args.get(1).map(String::as_str) {
        Some("run") => run_pipeline(&args[2..]),
        Some("score") => score_tender(&args[2..]),
        Some("explain") => explain_tender(&args[2..]),
        Some("alerts") => list_alerts(&args[2..]),
        _ => {
            print_usage();
            Ok(())
        }
    }
}

fn print_usage() {
    println!("🏭 Vendor Risk Engine");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("Usage:");
    println!("  vendor-risk run [data_dir] [output_dir]");
    println!("      Full pipeline: ingest, resolve, score, alert, persist, export");
    println!("  vendor-risk score <buyer> <category> <amount> <bidders> <duration_days> <method>");
    println!("      Score one hypothetical tender against stored category statistics");
    println!("  vendor-risk explain <ocid>");
    println!("      Itemized score breakdown for a stored tender");
    println!("  vendor-risk alerts [limit]");
    println!("      Top stored risk alerts (default 20)");
    println!();
    println!("Environment:");
    println!("  VENDOR_RISK_TODAY  reference date as YYYY-MM-DD (default: current date)");
    println!("  VENDOR_RISK_DB     database path for score/explain/alerts");
}

/// Reference date for age and recency checks. The library never reads
/// the wall clock; the current date enters only here.
fn reference_date() -> Result<NaiveDate> {
    match env::var("VENDOR_RISK_TODAY") {
        Ok(raw) => NaiveDate::parse_from_str(&raw, "%Y-%m-%d")
            .with_context(|| format!("VENDOR_RISK_TODAY is not a valid date: {}", raw)),
        Err(_) => Ok(Utc::now().date_naive()),
    }
}

fn database_path() -> PathBuf {
    env::var("VENDOR_RISK_DB")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("outputs/vendor_risk.db"))
}

/// Open the stored database for query commands.
fn open_store() -> Result<Connection> {
    let db_path = database_path();
    if !db_path.exists() {
        eprintln!("❌ Database not found: {}", db_path.display());
        eprintln!("   Run: vendor-risk run");
        eprintln!("   to build it first.");
        std::process::exit(1);
    }
    db::open_database(&db_path)
}

fn run_pipeline(args: &[String]) -> Result<()> {
    let data_dir = args.first().map(String::as_str).unwrap_or("data");
    let output_dir = args.get(1).map(String::as_str).unwrap_or("outputs");

    let config = PipelineConfig::new(data_dir, output_dir, reference_date()?);
    let report = RiskPipeline::new(config).run()?;
    println!("\n✅ {}", report.summary());
    Ok(())
}

fn score_tender(args: &[String]) -> Result<()> {
    if args.len() < 6 {
        eprintln!(
            "❌ Usage: vendor-risk score <buyer> <category> <amount> <bidders> <duration_days> <method>"
        );
        std::process::exit(1);
    }
    let amount: f64 = args[2]
        .parse()
        .with_context(|| format!("invalid amount: {}", args[2]))?;
    let bidders: i64 = args[3]
        .parse()
        .with_context(|| format!("invalid bidder count: {}", args[3]))?;
    let duration: i64 = args[4]
        .parse()
        .with_context(|| format!("invalid duration: {}", args[4]))?;

    println!("🎯 Ad-hoc Tender Scoring");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let conn = open_store()?;
    let stats = db::load_category_statistics(&conn)?;
    if stats.is_empty() {
        println!("⚠️  No stored category statistics; value and concentration flags use defaults");
    }

    let tender = TenderRecord {
        ocid: String::new(),
        tender_id: String::new(),
        title: String::new(),
        buyer_name: args[0].clone(),
        category: args[1].clone(),
        procurement_method: args[5].clone(),
        amount,
        bidder_count: bidders,
        duration_days: duration,
        date_published: None,
    };

    // No anomaly model output here, so the rule part alone caps at 85
    let scorer = TenderScorer::new()?;
    let scored = scorer.score(&tender, &stats, None);
    print_breakdown(&scorer, &scored);

    // Registry lookup runs at the strict threshold
    let companies = db::company_entities(&conn)?;
    if !companies.is_empty() {
        let index = EntityIndex::build(companies);
        let matches = EntityMatcher::strict().find_matches(&tender.buyer_name, &index);
        match matches.first() {
            Some(best) => println!(
                "\n🔗 Registry match: {} (CIN {}), similarity {:.2}",
                best.raw_name, best.entity_id, best.score
            ),
            None => println!("\n🔗 No registry company matches this buyer at strict threshold"),
        }
    }

    Ok(())
}

fn explain_tender(args: &[String]) -> Result<()> {
    let ocid = match args.first() {
        Some(ocid) => ocid,
        None => {
            eprintln!("❌ Usage: vendor-risk explain <ocid>");
            std::process::exit(1);
        }
    };

    println!("🔍 Score Breakdown: {}", ocid);
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let conn = open_store()?;
    let scored = match db::load_tender_score(&conn, ocid)? {
        Some(scored) => scored,
        None => {
            eprintln!("❌ No stored score for tender: {}", ocid);
            eprintln!("   Run: vendor-risk run");
            std::process::exit(1);
        }
    };

    println!("\n📄 {}", scored.tender.title);
    println!("   Buyer:    {}", scored.tender.buyer_name);
    println!("   Category: {}", scored.tender.category);
    println!(
        "   ₹{:.0}, {} bidder(s), {} day window, method: {}",
        scored.tender.amount,
        scored.tender.bidder_count,
        scored.tender.duration_days,
        scored.tender.procurement_method
    );

    let scorer = TenderScorer::new()?;
    print_breakdown(&scorer, &scored);
    if scored.needs_review() {
        println!("\n📋 Queued for human review");
    }
    Ok(())
}

fn print_breakdown(scorer: &TenderScorer, scored: &vendor_risk::ScoredTender) {
    let breakdown = scorer.breakdown(scored);

    println!("\n📊 Rule flags:");
    if breakdown.components.is_empty() {
        println!("   (none triggered)");
    }
    for component in &breakdown.components {
        println!("   +{:>4.1}  {}", component.points, component.label);
    }
    println!(
        "\n   Weighted sum: {:.1} / {:.0}",
        breakdown.weighted_sum, RULE_WEIGHT_TOTAL
    );
    println!("   Rule part:    {:.2} (of 85)", breakdown.rule_part);
    match breakdown.anomaly_part {
        Some(part) => println!("   Anomaly part: {:.2} (of 15)", part),
        None => println!("   Anomaly part: none (no model output; score capped at 85)"),
    }
    println!(
        "\n   Risk score: {:.2} → {}",
        scored.risk_score,
        scored.tier.label()
    );
    println!("   {}", scored.explanation);
}

fn list_alerts(args: &[String]) -> Result<()> {
    let limit: usize = match args.first() {
        Some(raw) => raw
            .parse()
            .with_context(|| format!("invalid limit: {}", raw))?,
        None => 20,
    };

    println!("🚨 Top Risk Alerts");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let conn = open_store()?;
    let alerts = db::top_alerts(&conn, limit)?;
    if alerts.is_empty() {
        println!("\n(no stored alerts)");
        return Ok(());
    }

    for (i, alert) in alerts.iter().enumerate() {
        println!(
            "\n{:>3}. [{}] {:.4}  {} · {}",
            i + 1,
            alert.risk_level,
            alert.risk_score,
            alert.entity_type,
            alert.entity_name
        );
        if let Some(reason) = alert.reasons.first() {
            println!("     {}", reason);
        }
    }
    Ok(())
}
