// ✅ Post-Load Validator - read-only checks over the loaded schema
//
// Counts per table, one-to-many fan-out, value ranges, and referential
// integrity. Nothing here writes to the store. Aggregates over no rows are
// reported as RangeStat::NoData instead of a number.

use crate::db::{count_rows, Store, Table};
use crate::error::ValidatorError;
use rusqlite::params;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tracing::{info, warn};

// ============================================================================
// REPORT TYPES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FanOut {
    pub property_id: i64,
    pub child_count: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RangeStat {
    NoData,
    Range { min: f64, max: f64, avg: f64 },
}

impl RangeStat {
    pub fn has_data(&self) -> bool {
        matches!(self, RangeStat::Range { .. })
    }
}

impl fmt::Display for RangeStat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RangeStat::NoData => f.write_str("no data"),
            RangeStat::Range { min, max, avg } => {
                write!(f, "${:.0} - ${:.0} (avg: ${:.0})", min, max, avg)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityReport {
    pub missing_location_count: i64,
    pub price_range: RangeStat,
    pub rehab_range: RangeStat,
}

impl QualityReport {
    pub fn summary(&self) -> String {
        format!(
            "missing city/state: {}, list price: {}, rehab: {}",
            self.missing_location_count, self.price_range, self.rehab_range
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrityCheck {
    pub name: String,
    pub violations: i64,
}

impl IntegrityCheck {
    pub fn passed(&self) -> bool {
        self.violations == 0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub counts: BTreeMap<Table, i64>,
    pub fan_out: BTreeMap<Table, Vec<FanOut>>,
    pub quality: QualityReport,
    pub integrity: Vec<IntegrityCheck>,
}

impl ValidationReport {
    pub fn integrity_ok(&self) -> bool {
        self.integrity.iter().all(IntegrityCheck::passed)
    }

    pub fn summary(&self) -> String {
        let counts: Vec<String> = self
            .counts
            .iter()
            .map(|(table, count)| format!("{}={}", table, count))
            .collect();
        let failed = self.integrity.iter().filter(|c| !c.passed()).count();
        format!(
            "counts: {}; {}; integrity checks failed: {}",
            counts.join(", "),
            self.quality.summary(),
            failed
        )
    }
}

// ============================================================================
// VALIDATOR
// ============================================================================

pub struct PostLoadValidator<'a> {
    store: &'a Store,
}

impl<'a> PostLoadValidator<'a> {
    pub fn new(store: &'a Store) -> Self {
        PostLoadValidator { store }
    }

    pub fn count_per_table(&self) -> Result<BTreeMap<Table, i64>, ValidatorError> {
        let mut counts = BTreeMap::new();
        for table in Table::ALL {
            counts.insert(table, count_rows(self.store.conn(), table)?);
        }
        Ok(counts)
    }

    /// Properties owning more than one row in `table`, by property_id.
    pub fn fan_out_report(&self, table: Table) -> Result<Vec<FanOut>, ValidatorError> {
        if !table.is_property_child() {
            return Err(ValidatorError::NotAChildTable(table.name().to_string()));
        }

        let mut stmt = self.store.conn().prepare(&format!(
            "SELECT property_id, COUNT(*) AS child_count
             FROM {}
             GROUP BY property_id
             HAVING COUNT(*) > 1
             ORDER BY property_id",
            table.name()
        ))?;

        let rows = stmt
            .query_map([], |row| {
                Ok(FanOut {
                    property_id: row.get(0)?,
                    child_count: row.get(1)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(rows)
    }

    pub fn quality_report(&self) -> Result<QualityReport, ValidatorError> {
        let missing_location_count: i64 = self.store.conn().query_row(
            "SELECT COUNT(*) FROM properties WHERE city = '' OR state = ''",
            [],
            |row| row.get(0),
        )?;

        Ok(QualityReport {
            missing_location_count,
            price_range: self.positive_range(Table::ValuationDetails, "list_price")?,
            rehab_range: self.positive_range(Table::RehabEstimates, "underwriting_rehab")?,
        })
    }

    /// min/max/avg over the positive, non-null values of one column
    fn positive_range(&self, table: Table, column: &str) -> Result<RangeStat, ValidatorError> {
        let (count, min, max, avg): (i64, Option<f64>, Option<f64>, Option<f64>) =
            self.store.conn().query_row(
                &format!(
                    "SELECT COUNT({col}), MIN({col}), MAX({col}), AVG({col})
                     FROM {table}
                     WHERE {col} IS NOT NULL AND {col} > 0",
                    col = column,
                    table = table.name()
                ),
                [],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )?;

        Ok(match (count, min, max, avg) {
            (n, Some(min), Some(max), Some(avg)) if n > 0 => RangeStat::Range { min, max, avg },
            _ => RangeStat::NoData,
        })
    }

    /// Referential and sequencing checks; every check should report zero.
    pub fn integrity_report(&self) -> Result<Vec<IntegrityCheck>, ValidatorError> {
        let conn = self.store.conn();
        let mut checks = Vec::new();

        for table in Table::ALL.iter().filter(|t| t.is_property_child()) {
            let orphans: i64 = conn.query_row(
                &format!(
                    "SELECT COUNT(*) FROM {} c
                     LEFT JOIN properties p ON p.property_id = c.property_id
                     WHERE p.property_id IS NULL",
                    table.name()
                ),
                [],
                |row| row.get(0),
            )?;
            checks.push(IntegrityCheck {
                name: format!("{}_without_property", table),
                violations: orphans,
            });
        }

        for table in Table::FAN_OUT {
            let broken: i64 = conn.query_row(
                &format!(
                    "SELECT COUNT(*) FROM (
                        SELECT property_id FROM {}
                        GROUP BY property_id
                        HAVING MIN(sequence_number) <> 1
                            OR MAX(sequence_number) <> COUNT(*)
                            OR COUNT(DISTINCT sequence_number) <> COUNT(*)
                     )",
                    table.name()
                ),
                [],
                |row| row.get(0),
            )?;
            checks.push(IntegrityCheck {
                name: format!("{}_sequence_gaps", table),
                violations: broken,
            });
        }

        let queries = [
            (
                "properties_without_lead",
                "SELECT COUNT(*) FROM properties p
                 WHERE NOT EXISTS (SELECT 1 FROM leads l WHERE l.property_id = p.property_id)",
            ),
            (
                "rehab_details_without_estimate",
                "SELECT COUNT(*) FROM rehab_details d
                 LEFT JOIN rehab_estimates e ON e.rehab_estimate_id = d.rehab_estimate_id
                 WHERE e.rehab_estimate_id IS NULL",
            ),
            (
                "rehab_estimates_without_detail",
                "SELECT COUNT(*) FROM rehab_estimates e
                 WHERE (SELECT COUNT(*) FROM rehab_details d
                        WHERE d.rehab_estimate_id = e.rehab_estimate_id) <> 1",
            ),
        ];
        for (name, sql) in queries {
            let violations: i64 = conn.query_row(sql, params![], |row| row.get(0))?;
            checks.push(IntegrityCheck {
                name: name.to_string(),
                violations,
            });
        }

        Ok(checks)
    }

    /// Run every check and log the results.
    pub fn run_validation(&self) -> Result<ValidationReport, ValidatorError> {
        info!("running post-load validation");

        let counts = self.count_per_table()?;
        for (table, count) in &counts {
            info!(table = %table, count, "record count");
        }

        let mut fan_out = BTreeMap::new();
        for table in Table::FAN_OUT {
            let rows = self.fan_out_report(table)?;
            info!(table = %table, properties = rows.len(), "properties with multiple records");
            for row in rows.iter().take(3) {
                info!(
                    table = %table,
                    property_id = row.property_id,
                    child_count = row.child_count,
                    "fan-out"
                );
            }
            fan_out.insert(table, rows);
        }

        let quality = self.quality_report()?;
        info!(
            missing_location = quality.missing_location_count,
            price_range = %quality.price_range,
            rehab_range = %quality.rehab_range,
            "data quality"
        );

        let integrity = self.integrity_report()?;
        for check in integrity.iter().filter(|c| !c.passed()) {
            warn!(check = %check.name, violations = check.violations, "integrity check failed");
        }

        info!("validation completed");
        Ok(ValidationReport {
            counts,
            fan_out,
            quality,
            integrity,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coercion::clean;
    use crate::loader::NormalizingLoader;
    use crate::source::extract;
    use serde_json::{json, Value};

    fn loaded(value: Value) -> Store {
        let mut store = Store::open_in_memory().unwrap();
        store.setup().unwrap();
        let records = clean(extract(&value.to_string()).unwrap());
        NormalizingLoader::new(&mut store).run(&records).unwrap();
        store
    }

    fn valuations(lengths: &[usize]) -> Value {
        let docs: Vec<Value> = lengths
            .iter()
            .map(|&len| {
                let vals: Vec<Value> = (0..len)
                    .map(|i| json!({"List_Price": 100000 + 1000 * i}))
                    .collect();
                json!({"City": "Austin", "State": "TX", "Valuation": vals})
            })
            .collect();
        Value::Array(docs)
    }

    #[test]
    fn test_fan_out_filters_single_children() {
        let store = loaded(valuations(&[1, 3, 2]));
        let validator = PostLoadValidator::new(&store);

        let rows = validator.fan_out_report(Table::ValuationDetails).unwrap();

        assert_eq!(rows.len(), 2);
        let counts: Vec<i64> = rows.iter().map(|r| r.child_count).collect();
        assert_eq!(counts, vec![3, 2]);
    }

    #[test]
    fn test_fan_out_rejects_non_child_table() {
        let store = loaded(json!([]));
        let validator = PostLoadValidator::new(&store);

        let err = validator.fan_out_report(Table::Properties).unwrap_err();
        assert!(matches!(err, ValidatorError::NotAChildTable(_)));
        assert!(validator.fan_out_report(Table::RehabDetails).is_err());
    }

    #[test]
    fn test_quality_report_no_data_on_empty_store() {
        let store = loaded(json!([]));

        let quality = PostLoadValidator::new(&store).quality_report().unwrap();

        assert_eq!(quality.missing_location_count, 0);
        assert_eq!(quality.price_range, RangeStat::NoData);
        assert_eq!(quality.rehab_range, RangeStat::NoData);
        assert_eq!(quality.price_range.to_string(), "no data");
    }

    #[test]
    fn test_quality_report_no_data_on_all_null_prices() {
        let store = loaded(json!([
            {"City": "Austin", "State": "TX", "Valuation": [{"List_Price": "n/a"}, {"List_Price": 0}]}
        ]));

        let quality = PostLoadValidator::new(&store).quality_report().unwrap();

        assert!(!quality.price_range.has_data());
    }

    #[test]
    fn test_quality_report_ranges_and_missing_location() {
        let store = loaded(json!([
            {"City": "Austin", "State": "TX", "Valuation": [{"List_Price": 200000}, {"List_Price": 400000}],
             "Rehab": [{"Underwriting_Rehab": 10000}]},
            {"City": "", "State": "TX"},
            {"City": "Dallas"}
        ]));

        let quality = PostLoadValidator::new(&store).quality_report().unwrap();

        assert_eq!(quality.missing_location_count, 2);
        assert_eq!(
            quality.price_range,
            RangeStat::Range { min: 200000.0, max: 400000.0, avg: 300000.0 }
        );
        assert_eq!(
            quality.rehab_range,
            RangeStat::Range { min: 10000.0, max: 10000.0, avg: 10000.0 }
        );
    }

    #[test]
    fn test_count_per_table_covers_all_tables() {
        let store = loaded(valuations(&[2, 1]));

        let counts = PostLoadValidator::new(&store).count_per_table().unwrap();

        assert_eq!(counts.len(), Table::ALL.len());
        assert_eq!(counts[&Table::Properties], 2);
        assert_eq!(counts[&Table::Leads], 2);
        assert_eq!(counts[&Table::ValuationDetails], 3);
        assert_eq!(counts[&Table::Taxes], 0);
    }

    #[test]
    fn test_integrity_clean_after_load() {
        let store = loaded(json!([
            {"City": "Austin", "State": "TX",
             "HOA": "[{'HOA': 100}, {'HOA': 200}]",
             "Rehab": "[{'Underwriting_Rehab': 5000, 'Paint': 'Yes'}, {'Paint': 'No'}]"}
        ]));

        let checks = PostLoadValidator::new(&store).integrity_report().unwrap();

        assert!(!checks.is_empty());
        for check in &checks {
            assert!(check.passed(), "check {} failed", check.name);
        }
    }

    #[test]
    fn test_integrity_detects_orphans() {
        let store = loaded(json!([{"City": "Austin", "State": "TX"}]));
        store.conn().pragma_update(None, "foreign_keys", "OFF").unwrap();
        store
            .conn()
            .execute(
                "INSERT INTO hoa_details (property_id, hoa_fee, hoa_flag, sequence_number)
                 VALUES (424242, 10.0, 'Yes', 1)",
                [],
            )
            .unwrap();

        let checks = PostLoadValidator::new(&store).integrity_report().unwrap();
        let orphan_check = checks
            .iter()
            .find(|c| c.name == "hoa_details_without_property")
            .unwrap();

        assert_eq!(orphan_check.violations, 1);
    }

    #[test]
    fn test_run_validation_is_read_only() {
        let store = loaded(valuations(&[1, 3, 2]));
        let validator = PostLoadValidator::new(&store);

        let before = validator.count_per_table().unwrap();
        let report = validator.run_validation().unwrap();
        let after = validator.count_per_table().unwrap();

        assert_eq!(before, after);
        assert_eq!(report.counts, before);
        assert_eq!(report.fan_out[&Table::ValuationDetails].len(), 2);
        assert!(report.fan_out[&Table::HoaDetails].is_empty());
        assert!(report.integrity_ok());
        println!("Report: {}", report.summary());
    }
}
