// 🧱 Normalizing Loader
//
// Seven load phases in strict dependency order:
//   properties → leads → taxes → hoa → valuations → rehab estimates → rehab details
//
// Each phase is one transaction: commit on success, rollback and LoadError
// on the first failing insert. Earlier phases stay committed.
//
// PRECONDITION: exclusive single-writer access to the target schema for the
// whole run. The loader is not idempotent; loading the same document twice
// duplicates every row (reset the schema first for a clean reload).

use crate::coercion::{clean, CleanRecord};
use crate::db::{self, Store};
use crate::embedded::EmbeddedList;
use crate::error::{EtlError, LoadError};
use crate::models::{
    HoaRow, LeadRow, PropertyRow, RehabDetailRow, RehabEntry, RehabEstimateRow, TaxRow,
    ValuationRow, HOA_KEY, REHAB_KEY, VALUATION_KEY,
};
use crate::source::extract_file;
use chrono::{DateTime, Datelike, Local, Utc};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::path::Path;
use tracing::{error, info, info_span, warn};
use uuid::Uuid;

/// Source index → generated property_id
pub type IdMapping = BTreeMap<usize, i64>;

// ============================================================================
// PHASES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadPhase {
    Properties,
    Leads,
    Taxes,
    Hoa,
    Valuations,
    RehabEstimates,
    RehabDetails,
}

impl LoadPhase {
    pub const ALL: [LoadPhase; 7] = [
        LoadPhase::Properties,
        LoadPhase::Leads,
        LoadPhase::Taxes,
        LoadPhase::Hoa,
        LoadPhase::Valuations,
        LoadPhase::RehabEstimates,
        LoadPhase::RehabDetails,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            LoadPhase::Properties => "properties",
            LoadPhase::Leads => "leads",
            LoadPhase::Taxes => "taxes",
            LoadPhase::Hoa => "hoa",
            LoadPhase::Valuations => "valuations",
            LoadPhase::RehabEstimates => "rehab_estimates",
            LoadPhase::RehabDetails => "rehab_details",
        }
    }
}

impl fmt::Display for LoadPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ============================================================================
// REPORT
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_fingerprint: Option<String>,
    pub records: usize,
    pub tax_year: i32,
    /// Embedded fields that held a string not encoding a list
    pub malformed_embedded: usize,
    pub rows: BTreeMap<LoadPhase, usize>,
    pub property_ids: IdMapping,
}

impl LoadReport {
    pub fn rows_for(&self, phase: LoadPhase) -> usize {
        self.rows.get(&phase).copied().unwrap_or(0)
    }

    pub fn summary(&self) -> String {
        let phases: Vec<String> = LoadPhase::ALL
            .iter()
            .map(|phase| format!("{}={}", phase, self.rows_for(*phase)))
            .collect();
        format!(
            "run {}: {} records, {}",
            self.run_id,
            self.records,
            phases.join(", ")
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RehabCounts {
    pub estimates: usize,
    pub details: usize,
}

// ============================================================================
// LOADER
// ============================================================================

pub struct NormalizingLoader<'a> {
    store: &'a mut Store,
    tax_year: i32,
}

impl<'a> NormalizingLoader<'a> {
    /// Tax rows are tagged with the current year
    pub fn new(store: &'a mut Store) -> Self {
        Self::with_tax_year(store, Local::now().year())
    }

    pub fn with_tax_year(store: &'a mut Store, tax_year: i32) -> Self {
        NormalizingLoader { store, tax_year }
    }

    /// Run all seven phases over cleaned records. Stops at the first failure.
    pub fn run(&mut self, records: &[CleanRecord]) -> Result<LoadReport, LoadError> {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let span = info_span!("load", %run_id);
        let _enter = span.enter();

        info!(records = records.len(), tax_year = self.tax_year, "starting load");
        let malformed_embedded = report_malformed(records);

        let mut rows = BTreeMap::new();

        let property_ids = self.load_properties(records)?;
        rows.insert(LoadPhase::Properties, property_ids.len());
        rows.insert(LoadPhase::Leads, self.load_leads(records, &property_ids)?);
        rows.insert(LoadPhase::Taxes, self.load_taxes(records, &property_ids)?);
        rows.insert(LoadPhase::Hoa, self.load_hoa(records, &property_ids)?);
        rows.insert(LoadPhase::Valuations, self.load_valuations(records, &property_ids)?);
        let rehab = self.load_rehab(records, &property_ids)?;
        rows.insert(LoadPhase::RehabEstimates, rehab.estimates);
        rows.insert(LoadPhase::RehabDetails, rehab.details);

        let report = LoadReport {
            run_id,
            started_at,
            finished_at: Utc::now(),
            source_fingerprint: None,
            records: records.len(),
            tax_year: self.tax_year,
            malformed_embedded,
            rows,
            property_ids,
        };
        info!(summary = %report.summary(), "load completed");
        Ok(report)
    }

    /// Insert one property per record and map source index → property_id.
    ///
    /// Each id is read back from its own insert inside the phase transaction,
    /// so the mapping is exact for every inserted record.
    pub fn load_properties(&mut self, records: &[CleanRecord]) -> Result<IdMapping, LoadError> {
        let rows: Vec<PropertyRow> = records.iter().map(PropertyRow::from_record).collect();

        let ids = self.in_phase(LoadPhase::Properties, |conn| db::insert_properties(conn, &rows))?;

        let mapping: IdMapping = records
            .iter()
            .map(CleanRecord::index)
            .zip(ids)
            .collect();

        info!(count = mapping.len(), "loaded properties");
        Ok(mapping)
    }

    pub fn load_leads(
        &mut self,
        records: &[CleanRecord],
        mapping: &IdMapping,
    ) -> Result<usize, LoadError> {
        let rows: Vec<LeadRow> = mapped(records, mapping)
            .map(|(record, property_id)| LeadRow::from_record(record, property_id))
            .collect();

        let count = self.in_phase(LoadPhase::Leads, |conn| db::insert_leads(conn, &rows))?;
        info!(count, "loaded lead records");
        Ok(count)
    }

    pub fn load_taxes(
        &mut self,
        records: &[CleanRecord],
        mapping: &IdMapping,
    ) -> Result<usize, LoadError> {
        let tax_year = self.tax_year;
        let rows: Vec<TaxRow> = mapped(records, mapping)
            .filter_map(|(record, property_id)| TaxRow::from_record(record, property_id, tax_year))
            .collect();

        let count = self.in_phase(LoadPhase::Taxes, |conn| db::insert_taxes(conn, &rows))?;
        info!(count, "loaded tax records");
        Ok(count)
    }

    pub fn load_hoa(
        &mut self,
        records: &[CleanRecord],
        mapping: &IdMapping,
    ) -> Result<usize, LoadError> {
        let rows: Vec<HoaRow> = mapped(records, mapping)
            .flat_map(|(record, property_id)| HoaRow::rows_for(record, property_id))
            .collect();

        let count = self.in_phase(LoadPhase::Hoa, |conn| db::insert_hoa_details(conn, &rows))?;
        info!(count, "loaded HOA detail records");
        Ok(count)
    }

    pub fn load_valuations(
        &mut self,
        records: &[CleanRecord],
        mapping: &IdMapping,
    ) -> Result<usize, LoadError> {
        let rows: Vec<ValuationRow> = mapped(records, mapping)
            .flat_map(|(record, property_id)| ValuationRow::rows_for(record, property_id))
            .collect();

        let count = self.in_phase(LoadPhase::Valuations, |conn| {
            db::insert_valuation_details(conn, &rows)
        })?;
        info!(count, "loaded valuation detail records");
        Ok(count)
    }

    /// Two phases: estimates commit first, then the store is re-queried for
    /// (property_id, sequence_number) → rehab_estimate_id and details are
    /// inserted against that mapping.
    pub fn load_rehab(
        &mut self,
        records: &[CleanRecord],
        mapping: &IdMapping,
    ) -> Result<RehabCounts, LoadError> {
        let entries: Vec<RehabEntry> = mapped(records, mapping)
            .flat_map(|(record, property_id)| RehabEntry::entries_for(record, property_id))
            .collect();
        let estimates: Vec<RehabEstimateRow> = entries.iter().map(|e| e.estimate.clone()).collect();

        let estimate_count = self.in_phase(LoadPhase::RehabEstimates, |conn| {
            db::insert_rehab_estimates(conn, &estimates)
        })?;

        let property_ids: HashSet<i64> = mapping.values().copied().collect();
        let detail_count = self.in_phase(LoadPhase::RehabDetails, |conn| {
            let estimate_ids = db::rehab_estimate_ids(conn, &property_ids)?;
            let details: Vec<RehabDetailRow> = entries
                .iter()
                .filter_map(|entry| {
                    estimate_ids.get(&entry.key()).map(|&rehab_estimate_id| RehabDetailRow {
                        rehab_estimate_id,
                        flags: entry.flags.clone(),
                    })
                })
                .collect();
            db::insert_rehab_details(conn, &details)
        })?;

        info!(
            estimates = estimate_count,
            details = detail_count,
            "loaded rehab estimates and details"
        );
        Ok(RehabCounts {
            estimates: estimate_count,
            details: detail_count,
        })
    }

    /// Run `work` inside one transaction for `phase`.
    fn in_phase<T, F>(&mut self, phase: LoadPhase, work: F) -> Result<T, LoadError>
    where
        F: FnOnce(&Connection) -> rusqlite::Result<T>,
    {
        let span = info_span!("phase", %phase);
        let _enter = span.enter();

        let tx = self
            .store
            .conn_mut()
            .transaction()
            .map_err(|err| LoadError::new(phase, err))?;

        match work(&*tx) {
            Ok(value) => {
                tx.commit().map_err(|err| LoadError::new(phase, err))?;
                Ok(value)
            }
            Err(err) => {
                error!(error = %err, "phase failed, rolling back");
                if let Err(rollback_err) = tx.rollback() {
                    warn!(error = %rollback_err, "rollback failed");
                }
                Err(LoadError::new(phase, err))
            }
        }
    }
}

/// Records with a mapped parent, paired with their property_id.
fn mapped<'r>(
    records: &'r [CleanRecord],
    mapping: &'r IdMapping,
) -> impl Iterator<Item = (&'r CleanRecord, i64)> + 'r {
    records
        .iter()
        .filter_map(move |record| mapping.get(&record.index()).map(|&id| (record, id)))
}

/// Log (and count) embedded fields that will degrade to no child rows.
fn report_malformed(records: &[CleanRecord]) -> usize {
    let mut malformed = 0;
    for record in records {
        for key in [HOA_KEY, VALUATION_KEY, REHAB_KEY] {
            if let EmbeddedList::Malformed(reason) = EmbeddedList::parse(record.raw(key)) {
                warn!(
                    index = record.index(),
                    field = key,
                    %reason,
                    "malformed embedded list dropped"
                );
                malformed += 1;
            }
        }
    }
    malformed
}

// ============================================================================
// PIPELINE ENTRY POINT
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    /// Defaults to the current year
    pub tax_year: Option<i32>,
    /// Drop and recreate the schema before loading
    pub reset_before_load: bool,
}

/// Extract → clean → load one document into `store`.
pub fn run_etl(
    store: &mut Store,
    input: &Path,
    options: &LoadOptions,
) -> Result<LoadReport, EtlError> {
    info!(input = %input.display(), "starting ETL process");

    let document = extract_file(input)?;
    let records = clean(document.records);

    if options.reset_before_load {
        store.reset()?;
    } else {
        store.setup()?;
    }

    let mut loader = match options.tax_year {
        Some(year) => NormalizingLoader::with_tax_year(store, year),
        None => NormalizingLoader::new(store),
    };

    let mut report = loader.run(&records).map_err(|err| {
        error!(phase = %err.phase, error = %err.source, "ETL process failed");
        err
    })?;
    report.source_fingerprint = Some(document.fingerprint);

    info!("ETL process completed successfully");
    Ok(report)
}
