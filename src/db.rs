// 🗄️ Record Store - SQLite persistence for scores, profiles, and alerts
// Free functions over a rusqlite Connection. Writes are idempotent:
// natural-key collisions (entity type + normalized name, ocid, CIN,
// alert content hash) are skipped and counted, never raised. Score and
// profile tables are wholesale-replaced on each run so the store always
// reflects exactly one pipeline pass.

use anyhow::{Context, Result};
use rusqlite::{params, Connection};
use std::collections::BTreeMap;
use std::path::Path;

use crate::alerts::AlertBundle;
use crate::flags::{percentile, CategoryStatistics, TenderFlags};
use crate::records::TenderRecord;
use crate::resolve::{BondFlow, EntityRecord, EntityType, MatchRecord};
use crate::scoring::{RiskTier, ScoredTender};
use crate::shell::ShellProfile;
use crate::vendor::VendorProfile;

/// Insert counters: rows written vs rows skipped as duplicates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InsertOutcome {
    pub inserted: usize,
    pub skipped: usize,
}

impl InsertOutcome {
    fn record(&mut self, result: rusqlite::Result<usize>) -> Result<()> {
        match result {
            Ok(_) => self.inserted += 1,
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                self.skipped += 1;
            }
            Err(e) => return Err(e.into()),
        }
        Ok(())
    }
}

pub fn open_database(path: &Path) -> Result<Connection> {
    let conn = Connection::open(path)
        .with_context(|| format!("Failed to open database at {}", path.display()))?;
    setup_database(&conn)?;
    Ok(conn)
}

pub fn setup_database(conn: &Connection) -> Result<()> {
    // WAL for crash recovery
    conn.pragma_update(None, "journal_mode", "WAL")?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS entity (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            entity_id TEXT,
            entity_type TEXT NOT NULL,
            canonical_name TEXT NOT NULL,
            normalized_name TEXT NOT NULL,
            source TEXT,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
            UNIQUE(entity_type, normalized_name)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS entity_match (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            source_name TEXT NOT NULL,
            matched_entity_id TEXT NOT NULL,
            matched_name TEXT,
            match_score REAL NOT NULL,
            match_type TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS tender_score (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            ocid TEXT UNIQUE NOT NULL,
            tender_id TEXT,
            title TEXT,
            buyer_name TEXT,
            category TEXT,
            procurement_method TEXT,
            amount REAL NOT NULL,
            bidder_count INTEGER NOT NULL,
            duration_days INTEGER NOT NULL,
            date_published TEXT,
            flag_single_bidder INTEGER NOT NULL,
            flag_zero_bidders INTEGER NOT NULL,
            flag_short_window INTEGER NOT NULL,
            flag_non_open INTEGER NOT NULL,
            flag_high_value INTEGER NOT NULL,
            flag_buyer_concentration INTEGER NOT NULL,
            flag_round_amount INTEGER NOT NULL,
            ml_anomaly_flag INTEGER NOT NULL,
            anomaly_score REAL,
            weighted_sum REAL NOT NULL,
            risk_score REAL NOT NULL,
            risk_tier TEXT NOT NULL,
            risk_explanation TEXT
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS company_risk (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            cin TEXT UNIQUE NOT NULL,
            company_name TEXT NOT NULL,
            company_status TEXT,
            company_class TEXT,
            paidup_capital REAL,
            authorized_capital REAL,
            state_code TEXT,
            age_days INTEGER,
            capital_percentile_rank REAL,
            address_cluster INTEGER NOT NULL,
            cluster_size INTEGER NOT NULL,
            low_capital INTEGER NOT NULL,
            young_company INTEGER NOT NULL,
            inactive INTEGER NOT NULL,
            high_auth_paid_ratio INTEGER NOT NULL,
            opc INTEGER NOT NULL,
            auth_paid_ratio REAL,
            centrality REAL,
            centrality_score REAL,
            shell_risk_score REAL NOT NULL,
            explanation TEXT,
            review_status TEXT
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS vendor_profile (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            entity_id TEXT UNIQUE NOT NULL,
            cin TEXT,
            company_name TEXT NOT NULL,
            company_status TEXT,
            state TEXT,
            composite_risk_score REAL NOT NULL,
            risk_tier TEXT NOT NULL,
            bid_pattern_score REAL NOT NULL,
            shell_risk_score REAL NOT NULL,
            political_score REAL NOT NULL,
            financials_score REAL NOT NULL,
            num_connections INTEGER NOT NULL,
            requires_human_review INTEGER NOT NULL,
            profile_json TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS bond_flow (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            purchaser_name TEXT NOT NULL,
            party_name TEXT NOT NULL,
            total_bonds INTEGER NOT NULL,
            total_value REAL NOT NULL,
            first_date TEXT,
            last_date TEXT,
            UNIQUE(purchaser_name, party_name)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS risk_alert (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            content_hash TEXT UNIQUE NOT NULL,
            entity_row INTEGER NOT NULL,
            risk_score REAL NOT NULL,
            risk_level TEXT NOT NULL,
            generated_at TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS risk_explanation (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            alert_id INTEGER NOT NULL,
            rule_code TEXT NOT NULL,
            reason TEXT NOT NULL,
            metrics TEXT
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS relationship_edge (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            src_entity_row INTEGER NOT NULL,
            dst_entity_row INTEGER NOT NULL,
            edge_type TEXT NOT NULL,
            weight REAL NOT NULL,
            evidence TEXT
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS category_amounts (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            category TEXT UNIQUE NOT NULL,
            amounts TEXT NOT NULL,
            tender_count INTEGER NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS buyer_category_counts (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            buyer_name TEXT NOT NULL,
            category TEXT NOT NULL,
            tender_count INTEGER NOT NULL,
            UNIQUE(buyer_name, category)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS pipeline_run (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            run_id TEXT UNIQUE NOT NULL,
            reference_date TEXT NOT NULL,
            tenders INTEGER NOT NULL,
            companies INTEGER NOT NULL,
            purchaser_matches INTEGER NOT NULL,
            buyer_matches INTEGER NOT NULL,
            bond_flows INTEGER NOT NULL,
            vendor_profiles INTEGER NOT NULL,
            alerts INTEGER NOT NULL,
            edges INTEGER NOT NULL,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_tender_score_risk ON tender_score(risk_score)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_company_risk_score ON company_risk(shell_risk_score)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_alert_score ON risk_alert(risk_score)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_match_entity ON entity_match(matched_entity_id)",
        [],
    )?;

    Ok(())
}

// ============================================================================
// ENTITIES
// ============================================================================

pub fn insert_entities(conn: &Connection, entities: &[EntityRecord]) -> Result<InsertOutcome> {
    let mut outcome = InsertOutcome::default();
    for entity in entities {
        let canonical = entity.entity_name.trim();
        let result = conn.execute(
            "INSERT INTO entity (entity_id, entity_type, canonical_name, normalized_name, source)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                entity.entity_id,
                entity.entity_type.as_str(),
                canonical,
                canonical.to_uppercase(),
                entity.source,
            ],
        );
        outcome.record(result)?;
    }
    Ok(outcome)
}

/// Row id for (type, name), inserting the entity if it is new.
fn ensure_entity(conn: &Connection, entity_type: EntityType, name: &str) -> Result<i64> {
    let canonical = name.trim();
    let normalized = canonical.to_uppercase();
    let result = conn.execute(
        "INSERT INTO entity (entity_type, canonical_name, normalized_name, source)
         VALUES (?1, ?2, ?3, ?4)",
        params![entity_type.as_str(), canonical, normalized, entity_type.source()],
    );
    match result {
        Ok(_) => {}
        Err(rusqlite::Error::SqliteFailure(err, _))
            if err.code == rusqlite::ErrorCode::ConstraintViolation => {}
        Err(e) => return Err(e.into()),
    }
    let id = conn.query_row(
        "SELECT id FROM entity WHERE entity_type = ?1 AND normalized_name = ?2",
        params![entity_type.as_str(), normalized],
        |row| row.get(0),
    )?;
    Ok(id)
}

// ============================================================================
// MATCHES AND FLOWS
// ============================================================================

pub fn replace_matches(
    conn: &Connection,
    purchaser_matches: &[MatchRecord],
    buyer_matches: &[MatchRecord],
) -> Result<usize> {
    conn.execute("DELETE FROM entity_match", [])?;
    let mut written = 0;
    for record in purchaser_matches.iter().chain(buyer_matches.iter()) {
        conn.execute(
            "INSERT INTO entity_match (source_name, matched_entity_id, matched_name, match_score, match_type)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                record.source_name,
                record.matched_entity_id,
                record.matched_name,
                record.match_score,
                record.match_type.as_str(),
            ],
        )?;
        written += 1;
    }
    Ok(written)
}

pub fn replace_bond_flows(conn: &Connection, flows: &[BondFlow]) -> Result<InsertOutcome> {
    conn.execute("DELETE FROM bond_flow", [])?;
    let mut outcome = InsertOutcome::default();
    for flow in flows {
        let result = conn.execute(
            "INSERT INTO bond_flow (purchaser_name, party_name, total_bonds, total_value, first_date, last_date)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                flow.purchaser_name,
                flow.party_name,
                flow.total_bonds,
                flow.total_value,
                flow.first_date.map(|d| d.to_string()),
                flow.last_date.map(|d| d.to_string()),
            ],
        );
        outcome.record(result)?;
    }
    Ok(outcome)
}

// ============================================================================
// SCORES AND PROFILES
// ============================================================================

pub fn replace_tender_scores(conn: &Connection, scored: &[ScoredTender]) -> Result<InsertOutcome> {
    conn.execute("DELETE FROM tender_score", [])?;
    let mut outcome = InsertOutcome::default();
    for item in scored {
        let tender = &item.tender;
        let result = conn.execute(
            "INSERT INTO tender_score (
                ocid, tender_id, title, buyer_name, category, procurement_method,
                amount, bidder_count, duration_days, date_published,
                flag_single_bidder, flag_zero_bidders, flag_short_window, flag_non_open,
                flag_high_value, flag_buyer_concentration, flag_round_amount, ml_anomaly_flag,
                anomaly_score, weighted_sum, risk_score, risk_tier, risk_explanation
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23)",
            params![
                tender.ocid,
                tender.tender_id,
                tender.title,
                tender.buyer_name,
                tender.category,
                tender.procurement_method,
                tender.amount,
                tender.bidder_count,
                tender.duration_days,
                tender.date_published.map(|d| d.to_string()),
                item.flags.single_bidder as i64,
                item.flags.zero_bidders as i64,
                item.flags.short_window as i64,
                item.flags.non_open as i64,
                item.flags.high_value as i64,
                item.flags.buyer_concentration as i64,
                item.flags.round_amount as i64,
                item.flags.ml_anomaly as i64,
                item.anomaly_probability,
                item.weighted_sum,
                item.risk_score,
                item.tier.code(),
                item.explanation,
            ],
        );
        outcome.record(result)?;
    }
    Ok(outcome)
}

pub fn replace_company_risk(conn: &Connection, profiles: &[ShellProfile]) -> Result<InsertOutcome> {
    conn.execute("DELETE FROM company_risk", [])?;
    let mut outcome = InsertOutcome::default();
    for profile in profiles {
        let ind = &profile.indicators;
        let result = conn.execute(
            "INSERT INTO company_risk (
                cin, company_name, company_status, company_class,
                paidup_capital, authorized_capital, state_code, age_days,
                capital_percentile_rank, address_cluster, cluster_size,
                low_capital, young_company, inactive, high_auth_paid_ratio, opc,
                auth_paid_ratio, centrality, centrality_score,
                shell_risk_score, explanation, review_status
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22)",
            params![
                profile.cin,
                profile.name,
                profile.status,
                profile.class,
                profile.paidup_capital,
                profile.authorized_capital,
                profile.state_code,
                profile.age_days,
                profile.capital_percentile_rank,
                ind.address_cluster as i64,
                ind.cluster_size as i64,
                ind.low_capital as i64,
                ind.young_company as i64,
                ind.inactive as i64,
                ind.high_auth_paid_ratio as i64,
                ind.opc as i64,
                ind.auth_paid_ratio,
                ind.centrality,
                ind.centrality_score,
                profile.shell_risk_score,
                profile.explanation,
                profile.review_status,
            ],
        );
        outcome.record(result)?;
    }
    Ok(outcome)
}

pub fn replace_vendor_profiles(
    conn: &Connection,
    profiles: &[VendorProfile],
) -> Result<InsertOutcome> {
    conn.execute("DELETE FROM vendor_profile", [])?;
    let mut outcome = InsertOutcome::default();
    for profile in profiles {
        let profile_json = serde_json::to_string(profile)
            .with_context(|| format!("Failed to serialize profile {}", profile.entity_id))?;
        let result = conn.execute(
            "INSERT INTO vendor_profile (
                entity_id, cin, company_name, company_status, state,
                composite_risk_score, risk_tier,
                bid_pattern_score, shell_risk_score, political_score, financials_score,
                num_connections, requires_human_review, profile_json
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
            params![
                profile.entity_id,
                profile.cin,
                profile.company_name,
                profile.company_status,
                profile.state,
                profile.composite_risk_score,
                profile.risk_tier.code(),
                profile.sub_scores.bid_pattern,
                profile.sub_scores.shell_risk,
                profile.sub_scores.political,
                profile.sub_scores.financials,
                profile.connections.len() as i64,
                profile.requires_human_review as i64,
                profile_json,
            ],
        );
        outcome.record(result)?;
    }
    Ok(outcome)
}

// ============================================================================
// ALERTS
// ============================================================================

pub fn replace_alerts(
    conn: &Connection,
    bundle: &AlertBundle,
    generated_at: &str,
) -> Result<InsertOutcome> {
    conn.execute("DELETE FROM risk_explanation", [])?;
    conn.execute("DELETE FROM risk_alert", [])?;
    conn.execute("DELETE FROM relationship_edge", [])?;

    let mut outcome = InsertOutcome::default();
    for alert in bundle.all_alerts() {
        let entity_row = ensure_entity(conn, alert.entity_type, &alert.entity_name)?;
        let result = conn.execute(
            "INSERT INTO risk_alert (content_hash, entity_row, risk_score, risk_level, generated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                alert.content_hash(),
                entity_row,
                alert.risk_score,
                alert.level.code(),
                generated_at,
            ],
        );
        match result {
            Ok(_) => {
                outcome.inserted += 1;
                let alert_id = conn.last_insert_rowid();
                for explanation in &alert.explanations {
                    conn.execute(
                        "INSERT INTO risk_explanation (alert_id, rule_code, reason, metrics)
                         VALUES (?1, ?2, ?3, ?4)",
                        params![
                            alert_id,
                            explanation.rule_code,
                            explanation.reason,
                            serde_json::to_string(&explanation.metrics)?,
                        ],
                    )?;
                }
            }
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                outcome.skipped += 1;
            }
            Err(e) => return Err(e.into()),
        }
    }

    for edge in &bundle.edges {
        let src = ensure_entity(conn, edge.source_type, &edge.source_name)?;
        let dst = ensure_entity(conn, edge.target_type, &edge.target_name)?;
        conn.execute(
            "INSERT INTO relationship_edge (src_entity_row, dst_entity_row, edge_type, weight, evidence)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![src, dst, edge.edge_type, edge.weight, edge.evidence],
        )?;
    }

    Ok(outcome)
}

// ============================================================================
// CATEGORY STATISTICS
// ============================================================================

/// Persist the raw per-category amount lists and buyer counts so ad-hoc
/// scoring can rebuild percentile thresholds without the source CSVs.
pub fn replace_category_stats(conn: &Connection, tenders: &[TenderRecord]) -> Result<usize> {
    conn.execute("DELETE FROM category_amounts", [])?;
    conn.execute("DELETE FROM buyer_category_counts", [])?;

    let mut amounts: BTreeMap<&str, Vec<f64>> = BTreeMap::new();
    let mut buyer_counts: BTreeMap<(&str, &str), i64> = BTreeMap::new();
    for tender in tenders {
        amounts
            .entry(tender.category.as_str())
            .or_default()
            .push(tender.amount);
        *buyer_counts
            .entry((tender.buyer_name.as_str(), tender.category.as_str()))
            .or_default() += 1;
    }

    let mut written = 0;
    for (category, mut values) in amounts {
        values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        conn.execute(
            "INSERT INTO category_amounts (category, amounts, tender_count)
             VALUES (?1, ?2, ?3)",
            params![
                category,
                serde_json::to_string(&values)?,
                values.len() as i64
            ],
        )?;
        written += 1;
    }
    for ((buyer, category), count) in buyer_counts {
        conn.execute(
            "INSERT INTO buyer_category_counts (buyer_name, category, tender_count)
             VALUES (?1, ?2, ?3)",
            params![buyer, category, count],
        )?;
        written += 1;
    }
    Ok(written)
}

/// Rebuild category statistics from stored amounts and counts.
pub fn load_category_statistics(conn: &Connection) -> Result<CategoryStatistics> {
    let mut stats = CategoryStatistics::default();
    let mut totals: BTreeMap<String, f64> = BTreeMap::new();

    let mut stmt = conn.prepare("SELECT category, amounts, tender_count FROM category_amounts")?;
    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, i64>(2)?,
        ))
    })?;
    for row in rows {
        let (category, amounts_json, count) = row?;
        let amounts: Vec<f64> = serde_json::from_str(&amounts_json)
            .with_context(|| format!("Corrupt amounts column for category {}", category))?;
        stats.set_p95(&category, percentile(&amounts, 0.95));
        totals.insert(category, count as f64);
    }

    let mut stmt =
        conn.prepare("SELECT buyer_name, category, tender_count FROM buyer_category_counts")?;
    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, i64>(2)?,
        ))
    })?;
    for row in rows {
        let (buyer, category, count) = row?;
        let total = totals.get(&category).copied().unwrap_or(0.0);
        if total > 0.0 {
            stats.set_buyer_share(&buyer, &category, count as f64 / total);
        }
    }

    Ok(stats)
}

// ============================================================================
// READ-BACK
// ============================================================================

fn scored_tender_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ScoredTender> {
    let date_published: Option<String> = row.get(9)?;
    let risk_score: f64 = row.get(20)?;
    Ok(ScoredTender {
        tender: TenderRecord {
            ocid: row.get(0)?,
            tender_id: row.get(1)?,
            title: row.get(2)?,
            buyer_name: row.get(3)?,
            category: row.get(4)?,
            procurement_method: row.get(5)?,
            amount: row.get(6)?,
            bidder_count: row.get(7)?,
            duration_days: row.get(8)?,
            date_published: date_published.and_then(|s| s.parse().ok()),
        },
        flags: TenderFlags {
            single_bidder: row.get::<_, i64>(10)? != 0,
            zero_bidders: row.get::<_, i64>(11)? != 0,
            short_window: row.get::<_, i64>(12)? != 0,
            non_open: row.get::<_, i64>(13)? != 0,
            high_value: row.get::<_, i64>(14)? != 0,
            buyer_concentration: row.get::<_, i64>(15)? != 0,
            round_amount: row.get::<_, i64>(16)? != 0,
            ml_anomaly: row.get::<_, i64>(17)? != 0,
        },
        anomaly_probability: row.get(18)?,
        weighted_sum: row.get(19)?,
        risk_score,
        tier: RiskTier::from_score(risk_score),
        explanation: row.get::<_, Option<String>>(21)?.unwrap_or_default(),
    })
}

const TENDER_SCORE_COLUMNS: &str = "ocid, tender_id, title, buyer_name, category, \
     procurement_method, amount, bidder_count, duration_days, date_published, \
     flag_single_bidder, flag_zero_bidders, flag_short_window, flag_non_open, \
     flag_high_value, flag_buyer_concentration, flag_round_amount, ml_anomaly_flag, \
     anomaly_score, weighted_sum, risk_score, risk_explanation";

pub fn load_tender_score(conn: &Connection, ocid: &str) -> Result<Option<ScoredTender>> {
    let sql = format!(
        "SELECT {} FROM tender_score WHERE ocid = ?1 OR tender_id = ?1",
        TENDER_SCORE_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query_map(params![ocid], scored_tender_from_row)?;
    match rows.next() {
        Some(row) => Ok(Some(row?)),
        None => Ok(None),
    }
}

/// Tenders at or above the given score, highest first.
pub fn flagged_tenders(conn: &Connection, min_score: f64) -> Result<Vec<ScoredTender>> {
    let sql = format!(
        "SELECT {} FROM tender_score WHERE risk_score >= ?1 ORDER BY risk_score DESC, ocid",
        TENDER_SCORE_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let scored = stmt
        .query_map(params![min_score], scored_tender_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(scored)
}

/// A stored alert joined with its entity and explanations.
#[derive(Debug, Clone)]
pub struct StoredAlert {
    pub entity_type: String,
    pub entity_name: String,
    pub risk_score: f64,
    pub risk_level: String,
    pub generated_at: String,
    pub reasons: Vec<String>,
}

pub fn top_alerts(conn: &Connection, limit: usize) -> Result<Vec<StoredAlert>> {
    let mut stmt = conn.prepare(
        "SELECT a.id, e.entity_type, e.canonical_name, a.risk_score, a.risk_level, a.generated_at
         FROM risk_alert a
         JOIN entity e ON e.id = a.entity_row
         ORDER BY a.risk_score DESC, a.id
         LIMIT ?1",
    )?;
    let rows = stmt
        .query_map(params![limit as i64], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                StoredAlert {
                    entity_type: row.get(1)?,
                    entity_name: row.get(2)?,
                    risk_score: row.get(3)?,
                    risk_level: row.get(4)?,
                    generated_at: row.get(5)?,
                    reasons: Vec::new(),
                },
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut alerts = Vec::with_capacity(rows.len());
    for (alert_id, mut alert) in rows {
        let mut stmt = conn.prepare(
            "SELECT reason FROM risk_explanation WHERE alert_id = ?1 ORDER BY id",
        )?;
        alert.reasons = stmt
            .query_map(params![alert_id], |row| row.get(0))?
            .collect::<Result<Vec<_>, _>>()?;
        alerts.push(alert);
    }
    Ok(alerts)
}

/// Registry companies stored in the entity table, as (CIN, name) pairs
/// in insertion order.
pub fn company_entities(conn: &Connection) -> Result<Vec<(String, String)>> {
    let mut stmt = conn.prepare(
        "SELECT entity_id, canonical_name FROM entity
         WHERE entity_type = 'COMPANY' AND entity_id IS NOT NULL
         ORDER BY id",
    )?;
    let pairs = stmt
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(pairs)
}

pub fn count_rows(conn: &Connection, table: &str) -> Result<i64> {
    let count: i64 = conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| {
        row.get(0)
    })?;
    Ok(count)
}

// ============================================================================
// RUN BOOKKEEPING
// ============================================================================

/// One pipeline run's counters, keyed by a fresh run id.
#[derive(Debug, Clone)]
pub struct RunRecord {
    pub run_id: String,
    pub reference_date: String,
    pub tenders: usize,
    pub companies: usize,
    pub purchaser_matches: usize,
    pub buyer_matches: usize,
    pub bond_flows: usize,
    pub vendor_profiles: usize,
    pub alerts: usize,
    pub edges: usize,
}

impl RunRecord {
    pub fn new(reference_date: &str) -> Self {
        RunRecord {
            run_id: uuid::Uuid::new_v4().to_string(),
            reference_date: reference_date.to_string(),
            tenders: 0,
            companies: 0,
            purchaser_matches: 0,
            buyer_matches: 0,
            bond_flows: 0,
            vendor_profiles: 0,
            alerts: 0,
            edges: 0,
        }
    }
}

pub fn record_run(conn: &Connection, run: &RunRecord) -> Result<()> {
    conn.execute(
        "INSERT INTO pipeline_run (
            run_id, reference_date, tenders, companies, purchaser_matches,
            buyer_matches, bond_flows, vendor_profiles, alerts, edges
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            run.run_id,
            run.reference_date,
            run.tenders as i64,
            run.companies as i64,
            run.purchaser_matches as i64,
            run.buyer_matches as i64,
            run.bond_flows as i64,
            run.vendor_profiles as i64,
            run.alerts as i64,
            run.edges as i64,
        ],
    )?;
    Ok(())
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::AlertEngine;
    use crate::shell::ShellIndicators;

    fn create_test_tender(ocid: &str, buyer: &str, amount: f64) -> TenderRecord {
        TenderRecord {
            ocid: ocid.to_string(),
            tender_id: format!("T-{}", ocid),
            title: "Road resurfacing".to_string(),
            buyer_name: buyer.to_string(),
            category: "Road Works".to_string(),
            procurement_method: "Open Tender".to_string(),
            amount,
            bidder_count: 1,
            duration_days: 5,
            date_published: None,
        }
    }

    fn create_test_scored(ocid: &str, buyer: &str, risk_score: f64) -> ScoredTender {
        ScoredTender {
            tender: create_test_tender(ocid, buyer, 500000.0),
            flags: TenderFlags {
                single_bidder: true,
                short_window: true,
                ..Default::default()
            },
            anomaly_probability: None,
            weighted_sum: 40.0,
            risk_score,
            tier: RiskTier::from_score(risk_score),
            explanation: "Only 1 bidder submitted (possible bid-rigging)".to_string(),
        }
    }

    fn create_test_shell(cin: &str, name: &str, score: f64) -> ShellProfile {
        ShellProfile {
            cin: cin.to_string(),
            name: name.to_string(),
            status: "Active".to_string(),
            class: "Private".to_string(),
            paidup_capital: 100000.0,
            authorized_capital: 500000.0,
            state_code: "DL".to_string(),
            age_days: 4000,
            capital_percentile_rank: 0.5,
            indicators: ShellIndicators::default(),
            shell_risk_score: score,
            explanation: "No strong shell indicators".to_string(),
            review_status: "Auto-Cleared".to_string(),
        }
    }

    #[test]
    fn test_entity_idempotency_insert_twice() {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();

        let entities = vec![
            EntityRecord {
                entity_id: "CIN001".to_string(),
                entity_name: "Apex Infra Pvt Ltd".to_string(),
                entity_type: EntityType::Company,
                source: "companies_registry".to_string(),
            },
            EntityRecord {
                entity_id: "BUYER_pwd".to_string(),
                entity_name: "PWD Delhi".to_string(),
                entity_type: EntityType::ProcurementBuyer,
                source: "procurement_data".to_string(),
            },
        ];

        let first = insert_entities(&conn, &entities).unwrap();
        assert_eq!(first.inserted, 2);
        assert_eq!(first.skipped, 0);

        let second = insert_entities(&conn, &entities).unwrap();
        assert_eq!(second.inserted, 0);
        assert_eq!(second.skipped, 2);

        assert_eq!(count_rows(&conn, "entity").unwrap(), 2);
        println!("✅ Entity idempotency test PASSED");
    }

    #[test]
    fn test_same_name_different_type_coexist() {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();

        let a = ensure_entity(&conn, EntityType::Company, "Apex Infra").unwrap();
        let b = ensure_entity(&conn, EntityType::BondPurchaser, "Apex Infra").unwrap();
        let c = ensure_entity(&conn, EntityType::Company, "  apex infra  ").unwrap();

        assert_ne!(a, b);
        // Case and whitespace collapse into the same normalized row.
        assert_eq!(a, c);
    }

    #[test]
    fn test_tender_scores_replaced_per_run() {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();

        let first = vec![
            create_test_scored("ocds-1", "PWD", 49.21),
            create_test_scored("ocds-2", "PWD", 10.0),
        ];
        let outcome = replace_tender_scores(&conn, &first).unwrap();
        assert_eq!(outcome.inserted, 2);

        let second = vec![create_test_scored("ocds-3", "Health Dept", 20.0)];
        replace_tender_scores(&conn, &second).unwrap();

        // Old run is gone, only the fresh row remains.
        assert_eq!(count_rows(&conn, "tender_score").unwrap(), 1);
        assert!(load_tender_score(&conn, "ocds-1").unwrap().is_none());

        let stored = load_tender_score(&conn, "ocds-3").unwrap().unwrap();
        assert_eq!(stored.tender.buyer_name, "Health Dept");
        assert_eq!(stored.risk_score, 20.0);
        assert!(stored.flags.single_bidder);
        assert!(stored.flags.short_window);
        assert!(!stored.flags.non_open);
    }

    #[test]
    fn test_tender_score_lookup_by_tender_id() {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();

        replace_tender_scores(&conn, &[create_test_scored("ocds-9", "PWD", 30.0)]).unwrap();

        let by_tid = load_tender_score(&conn, "T-ocds-9").unwrap();
        assert!(by_tid.is_some());
    }

    #[test]
    fn test_flagged_tenders_ordering() {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();

        let scored = vec![
            create_test_scored("ocds-1", "PWD", 10.0),
            create_test_scored("ocds-2", "PWD", 60.0),
            create_test_scored("ocds-3", "PWD", 15.0),
        ];
        replace_tender_scores(&conn, &scored).unwrap();

        let flagged = flagged_tenders(&conn, 15.0).unwrap();
        assert_eq!(flagged.len(), 2);
        assert_eq!(flagged[0].tender.ocid, "ocds-2");
        assert_eq!(flagged[1].tender.ocid, "ocds-3");
    }

    #[test]
    fn test_alert_persistence_with_explanations() {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();

        let scored = vec![create_test_scored("ocds-1", "PWD Delhi", 55.0)];
        let shells = vec![create_test_shell("CIN001", "Ghost Trading", 30.0)];
        let flows = vec![BondFlow {
            purchaser_name: "Alpha Trading".to_string(),
            party_name: "Party A".to_string(),
            total_bonds: 10,
            total_value: 150000000.0,
            first_date: None,
            last_date: None,
        }];
        let bundle = AlertEngine::new().build_all(&scored, &shells, &flows);

        let outcome = replace_alerts(&conn, &bundle, "2024-03-31T00:00:00Z").unwrap();
        assert_eq!(outcome.inserted, 3);
        assert_eq!(outcome.skipped, 0);
        assert_eq!(count_rows(&conn, "relationship_edge").unwrap(), 1);
        assert!(count_rows(&conn, "risk_explanation").unwrap() >= 3);

        // Replay replaces rather than duplicating.
        let outcome = replace_alerts(&conn, &bundle, "2024-03-31T00:00:00Z").unwrap();
        assert_eq!(outcome.inserted, 3);
        assert_eq!(count_rows(&conn, "risk_alert").unwrap(), 3);

        let top = top_alerts(&conn, 10).unwrap();
        assert_eq!(top.len(), 3);
        // Bond purchaser alert scores sit far below tender/shell ones.
        assert_eq!(top[0].entity_name, "PWD Delhi");
        assert!(!top[0].reasons.is_empty());

        println!("✅ Alert persistence test PASSED");
    }

    #[test]
    fn test_category_stats_round_trip() {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();

        let tenders = vec![
            create_test_tender("o1", "PWD", 1000000.0),
            create_test_tender("o2", "PWD", 1100000.0),
            create_test_tender("o3", "PWD", 1200000.0),
            create_test_tender("o4", "Health Dept", 1300000.0),
            create_test_tender("o5", "PWD", 5000000.0),
        ];
        replace_category_stats(&conn, &tenders).unwrap();

        let stats = load_category_statistics(&conn).unwrap();
        // Same interpolated p95 as the in-memory computation.
        let expected = CategoryStatistics::compute(&tenders).p95_for("Road Works");
        assert_eq!(stats.p95_for("Road Works"), expected);
        assert!((expected - 4260000.0).abs() < 1e-6);
        assert_eq!(stats.buyer_share("PWD", "Road Works"), 0.8);
        assert_eq!(stats.buyer_share("Health Dept", "Road Works"), 0.2);
    }

    #[test]
    fn test_vendor_profile_persistence() {
        use crate::vendor::{SubScores, VendorProfile};

        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();

        let profile = VendorProfile {
            entity_id: "CIN001".to_string(),
            cin: Some("CIN001".to_string()),
            company_name: "Apex Infra".to_string(),
            company_status: "Active".to_string(),
            state: "DL".to_string(),
            composite_risk_score: 47.0,
            risk_tier: RiskTier::Medium,
            sub_scores: SubScores {
                bid_pattern: 80.0,
                shell_risk: 60.0,
                political: 0.0,
                financials: 40.0,
            },
            bid_stats: None,
            political_info: None,
            shell_explanation: String::new(),
            connections: Vec::new(),
            requires_human_review: true,
        };

        let outcome = replace_vendor_profiles(&conn, &[profile]).unwrap();
        assert_eq!(outcome.inserted, 1);

        let json: String = conn
            .query_row(
                "SELECT profile_json FROM vendor_profile WHERE entity_id = 'CIN001'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed["composite_risk_score"], 47.0);
        assert_eq!(parsed["risk_tier"], "MEDIUM");
    }

    #[test]
    fn test_run_record() {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();

        let mut run = RunRecord::new("2024-03-31");
        run.tenders = 100;
        run.alerts = 12;
        record_run(&conn, &run).unwrap();

        assert_eq!(count_rows(&conn, "pipeline_run").unwrap(), 1);
        let stored_date: String = conn
            .query_row("SELECT reference_date FROM pipeline_run", [], |row| {
                row.get(0)
            })
            .unwrap();
        assert_eq!(stored_date, "2024-03-31");
    }
}
