// 📦 Source Records - Typed rows from the three data domains
// Procurement tenders (OCDS-mapped CSV), corporate registry rows, and the
// electoral bond ledger (purchases + redemptions). Source values arrive
// dirty, so every numeric/date field passes through lenient coercion:
// a bad number becomes 0, a bad date becomes None, and a load never fails
// on field content.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

// ============================================================================
// COERCION HELPERS
// ============================================================================

/// Parse a numeric field, tolerating blanks, commas (Indian digit
/// grouping: "1,00,00,000") and junk. Anything unparseable is 0.
pub fn coerce_f64(raw: &str) -> f64 {
    let cleaned = raw.trim().replace(',', "");
    if cleaned.is_empty() {
        return 0.0;
    }
    cleaned.parse::<f64>().unwrap_or(0.0)
}

/// Integer variant of `coerce_f64`; accepts "3", "3.0" and "" alike.
pub fn coerce_i64(raw: &str) -> i64 {
    coerce_f64(raw) as i64
}

const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%d-%m-%Y",
    "%d/%m/%Y",
    "%d-%b-%Y",
    "%d/%b/%Y",
];

/// Parse a date in any of the formats the sources actually use. ISO
/// timestamps are truncated to their date part. Unparseable → None.
pub fn coerce_date(raw: &str) -> Option<NaiveDate> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    let date_part = match trimmed.find('T') {
        Some(pos) => &trimmed[..pos],
        None => trimmed,
    };
    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(date_part, format) {
            return Some(date);
        }
    }
    None
}

// ============================================================================
// TENDERS
// ============================================================================

/// Raw OCDS-mapped tender row exactly as it appears in the source CSV.
/// All fields are strings; typing happens in `TenderRecord::from`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawTenderRow {
    #[serde(rename = "ocid", default)]
    pub ocid: String,
    #[serde(rename = "tender/id", default)]
    pub tender_id: String,
    #[serde(rename = "tender/title", default)]
    pub title: String,
    #[serde(rename = "buyer/name", default)]
    pub buyer_name: String,
    #[serde(rename = "tenderclassification/description", default)]
    pub category: String,
    #[serde(rename = "tender/procurementMethod", default)]
    pub procurement_method: String,
    #[serde(rename = "tender/value/amount", default)]
    pub amount: String,
    #[serde(rename = "tender/numberOfTenderers", default)]
    pub number_of_tenderers: String,
    #[serde(rename = "tender/tenderPeriod/durationInDays", default)]
    pub duration_days: String,
    #[serde(rename = "tender/datePublished", default)]
    pub date_published: String,
}

/// One procurement tender. Mutated once downstream (flags + score
/// attached), never re-mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenderRecord {
    pub ocid: String,
    pub tender_id: String,
    pub title: String,
    pub buyer_name: String,
    pub category: String,
    pub procurement_method: String,
    pub amount: f64,
    pub bidder_count: i64,
    pub duration_days: i64,
    pub date_published: Option<NaiveDate>,
}

impl From<RawTenderRow> for TenderRecord {
    fn from(raw: RawTenderRow) -> Self {
        TenderRecord {
            amount: coerce_f64(&raw.amount),
            bidder_count: coerce_i64(&raw.number_of_tenderers),
            duration_days: coerce_i64(&raw.duration_days),
            date_published: coerce_date(&raw.date_published),
            ocid: raw.ocid,
            tender_id: raw.tender_id,
            title: raw.title,
            buyer_name: raw.buyer_name,
            category: raw.category,
            procurement_method: raw.procurement_method,
        }
    }
}

// ============================================================================
// COMPANY REGISTRY
// ============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawCompanyRow {
    #[serde(rename = "CIN", default)]
    pub cin: String,
    #[serde(rename = "CompanyName", default)]
    pub name: String,
    #[serde(rename = "CompanyStatus", default)]
    pub status: String,
    #[serde(rename = "CompanyClass", default)]
    pub class: String,
    #[serde(rename = "PaidupCapital", default)]
    pub paidup_capital: String,
    #[serde(rename = "AuthorizedCapital", default)]
    pub authorized_capital: String,
    #[serde(rename = "Registered_Office_Address", default)]
    pub address: String,
    #[serde(rename = "CompanyStateCode", default)]
    pub state_code: String,
    #[serde(rename = "nic_code", default)]
    pub nic_code: String,
    #[serde(rename = "CompanyIndustrialClassification", default)]
    pub industrial_classification: String,
    #[serde(rename = "CompanyRegistrationdate_date", default)]
    pub registration_date: String,
}

/// One registry company. CIN is the natural key across the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompanyRecord {
    pub cin: String,
    pub name: String,
    pub status: String,
    pub class: String,
    pub paidup_capital: f64,
    pub authorized_capital: f64,
    pub address: String,
    pub state_code: String,
    pub nic_code: String,
    pub industrial_classification: String,
    pub registration_date: Option<NaiveDate>,
}

impl From<RawCompanyRow> for CompanyRecord {
    fn from(raw: RawCompanyRow) -> Self {
        CompanyRecord {
            paidup_capital: coerce_f64(&raw.paidup_capital),
            authorized_capital: coerce_f64(&raw.authorized_capital),
            registration_date: coerce_date(&raw.registration_date),
            cin: raw.cin,
            name: raw.name,
            status: raw.status,
            class: raw.class,
            address: raw.address,
            state_code: raw.state_code,
            nic_code: raw.nic_code,
            industrial_classification: raw.industrial_classification,
        }
    }
}

// ============================================================================
// ELECTORAL BOND LEDGER
// ============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawBondPurchaseRow {
    #[serde(rename = "reference_no_urn", default)]
    pub reference_no_urn: String,
    #[serde(rename = "journal_date", default)]
    pub journal_date: String,
    #[serde(rename = "purchase_date", default)]
    pub purchase_date: String,
    #[serde(rename = "expiry_date", default)]
    pub expiry_date: String,
    #[serde(rename = "purchaser_name", default)]
    pub purchaser_name: String,
    #[serde(rename = "prefix", default)]
    pub prefix: String,
    #[serde(rename = "bond_number", default)]
    pub bond_number: String,
    #[serde(rename = "denomination", default)]
    pub denomination: String,
    #[serde(rename = "issue_branch_code", default)]
    pub issue_branch_code: String,
    #[serde(rename = "status", default)]
    pub status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BondPurchase {
    pub reference_no_urn: String,
    pub purchase_date: Option<NaiveDate>,
    pub purchaser_name: String,
    pub prefix: String,
    pub bond_number: i64,
    /// Face value in rupees, commas stripped.
    pub denomination: f64,
    pub issue_branch_code: String,
}

impl From<RawBondPurchaseRow> for BondPurchase {
    fn from(raw: RawBondPurchaseRow) -> Self {
        BondPurchase {
            purchase_date: coerce_date(&raw.purchase_date),
            bond_number: coerce_i64(&raw.bond_number),
            denomination: coerce_f64(&raw.denomination),
            reference_no_urn: raw.reference_no_urn,
            purchaser_name: raw.purchaser_name,
            prefix: raw.prefix,
            issue_branch_code: raw.issue_branch_code,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawBondRedemptionRow {
    #[serde(rename = "encashment_date", default)]
    pub encashment_date: String,
    #[serde(rename = "party_name", default)]
    pub party_name: String,
    #[serde(rename = "account_no", default)]
    pub account_no: String,
    #[serde(rename = "prefix", default)]
    pub prefix: String,
    #[serde(rename = "bond_number", default)]
    pub bond_number: String,
    #[serde(rename = "denomination", default)]
    pub denomination: String,
    #[serde(rename = "pay_branch_code", default)]
    pub pay_branch_code: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BondRedemption {
    pub encashment_date: Option<NaiveDate>,
    pub party_name: String,
    pub prefix: String,
    pub bond_number: i64,
    pub denomination: f64,
    pub pay_branch_code: String,
}

impl From<RawBondRedemptionRow> for BondRedemption {
    fn from(raw: RawBondRedemptionRow) -> Self {
        BondRedemption {
            encashment_date: coerce_date(&raw.encashment_date),
            bond_number: coerce_i64(&raw.bond_number),
            denomination: coerce_f64(&raw.denomination),
            party_name: raw.party_name,
            prefix: raw.prefix,
            pay_branch_code: raw.pay_branch_code,
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
