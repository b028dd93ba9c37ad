// 📥 Ingest - CSV loaders for the three source domains
// Loaders are deliberately forgiving: a missing file yields an empty
// vector with a warning (downstream stages degrade instead of aborting),
// and a structurally broken row is skipped and counted rather than
// failing the whole load. Field-level dirt is handled by the coercion
// layer in `records`.

use std::path::Path;

use anyhow::{Context, Result};

use crate::records::{
    BondPurchase, BondRedemption, CompanyRecord, RawBondPurchaseRow, RawBondRedemptionRow,
    RawCompanyRow, RawTenderRow, TenderRecord,
};

fn open_reader(path: &Path) -> Result<csv::Reader<std::fs::File>> {
    csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("Failed to open CSV file: {}", path.display()))
}

fn load_rows<Raw, Record>(path: &Path, label: &str) -> Result<Vec<Record>>
where
    Raw: for<'de> serde::Deserialize<'de>,
    Record: From<Raw>,
{
    if !path.exists() {
        println!(
            "⚠️  {} file not found at {}, continuing with no rows",
            label,
            path.display()
        );
        return Ok(Vec::new());
    }

    let mut reader = open_reader(path)?;
    let mut records = Vec::new();
    let mut skipped = 0usize;

    for row in reader.deserialize::<Raw>() {
        match row {
            Ok(raw) => records.push(Record::from(raw)),
            Err(_) => skipped += 1,
        }
    }

    if skipped > 0 {
        println!("⚠️  Skipped {} malformed {} rows", skipped, label);
    }

    Ok(records)
}

/// Load OCDS-mapped procurement tenders.
pub fn load_tenders(path: &Path) -> Result<Vec<TenderRecord>> {
    load_rows::<RawTenderRow, TenderRecord>(path, "tender")
}

/// Load the corporate registry extract.
pub fn load_companies(path: &Path) -> Result<Vec<CompanyRecord>> {
    load_rows::<RawCompanyRow, CompanyRecord>(path, "company registry")
}

/// Load the electoral bond purchase ledger.
pub fn load_bond_purchases(path: &Path) -> Result<Vec<BondPurchase>> {
    load_rows::<RawBondPurchaseRow, BondPurchase>(path, "bond purchase")
}

/// Load the electoral bond redemption ledger.
pub fn load_bond_redemptions(path: &Path) -> Result<Vec<BondRedemption>> {
    load_rows::<RawBondRedemptionRow, BondRedemption>(path, "bond redemption")
}
