// 🧹 Cleaning - typed coercion table for the declared numeric fields
//
// Every numeric source key is coerced exactly once, here. Anything that is
// absent, empty or unparseable becomes None (never zero). Fields outside the
// table are left untouched on the underlying SourceRecord.

use crate::source::SourceRecord;
use serde_json::Value;
use std::collections::HashMap;
use tracing::debug;

// ============================================================================
// COERCION TABLE
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetType {
    /// Any finite number
    Float,
    /// Truncated toward zero, like a plain integer cast
    Integer,
    /// Integer that must be strictly positive; 0 and negatives become None
    Year,
}

/// One row of the coercion table: source key → cleaned column → target type.
/// Failure always falls back to None.
#[derive(Debug, Clone, Copy)]
pub struct CoercionRule {
    pub source_key: &'static str,
    pub column: &'static str,
    pub target: TargetType,
}

impl CoercionRule {
    const fn new(source_key: &'static str, column: &'static str, target: TargetType) -> Self {
        CoercionRule {
            source_key,
            column,
            target,
        }
    }
}

pub const NUMERIC_FIELDS: &[CoercionRule] = &[
    CoercionRule::new("Tax_Rate", "tax_rate", TargetType::Float),
    CoercionRule::new("SQFT_Basement", "sqft_basement", TargetType::Integer),
    CoercionRule::new("Year_Built", "year_built", TargetType::Year),
    CoercionRule::new("SQFT_MU", "sqft_mu", TargetType::Integer),
    CoercionRule::new("SQFT_Total", "sqft_total", TargetType::Integer),
    CoercionRule::new("Bed", "bed", TargetType::Integer),
    CoercionRule::new("Bath", "bath", TargetType::Integer),
    CoercionRule::new("Net_Yield", "net_yield", TargetType::Float),
    CoercionRule::new("IRR", "irr", TargetType::Float),
    CoercionRule::new("Neighborhood_Rating", "neighborhood_rating", TargetType::Integer),
    CoercionRule::new("Latitude", "latitude", TargetType::Float),
    CoercionRule::new("Longitude", "longitude", TargetType::Float),
    CoercionRule::new("Taxes", "taxes", TargetType::Float),
    CoercionRule::new("School_Average", "school_average", TargetType::Float),
];

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Numeric {
    Integer(i64),
    Float(f64),
}

impl Numeric {
    pub fn as_f64(&self) -> f64 {
        match self {
            Numeric::Integer(i) => *i as f64,
            Numeric::Float(f) => *f,
        }
    }
}

// ============================================================================
// PRIMITIVE COERCIONS
// ============================================================================

/// Coerce a loosely-typed value to a finite number.
///
/// Numbers pass through, strings are trimmed and parsed, everything else
/// (null, booleans, containers, non-finite values) is None.
pub fn coerce_number(value: Option<&Value>) -> Option<f64> {
    let number = match value? {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                return None;
            }
            trimmed.parse::<f64>().ok()?
        }
        _ => return None,
    };

    number.is_finite().then_some(number)
}

/// Coercion for numeric keys inside embedded records.
///
/// These keys are only read when "truthy": a numeric 0, `false`, `""` and
/// empty containers are indistinguishable from absent and become None.
/// Non-empty strings such as `"0"` are truthy and parse to 0.0.
pub fn coerce_nested_number(value: Option<&Value>) -> Option<f64> {
    let value = value?;
    let truthy = match value {
        Value::Null | Value::Bool(false) => false,
        Value::Number(n) => n.as_f64().map_or(true, |f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
        Value::Bool(true) => true,
    };
    if !truthy {
        return None;
    }
    coerce_number(Some(value))
}

pub fn apply_target(number: f64, target: TargetType) -> Option<Numeric> {
    match target {
        TargetType::Float => Some(Numeric::Float(number)),
        TargetType::Integer => Some(Numeric::Integer(number.trunc() as i64)),
        TargetType::Year => (number > 0.0).then(|| Numeric::Integer(number.trunc() as i64)),
    }
}

// ============================================================================
// CLEAN RECORDS
// ============================================================================

/// A source record with its numeric fields coerced.
#[derive(Debug, Clone)]
pub struct CleanRecord {
    pub source: SourceRecord,
    numbers: HashMap<&'static str, Option<Numeric>>,
}

impl CleanRecord {
    pub fn from_source(source: SourceRecord) -> Self {
        let numbers = NUMERIC_FIELDS
            .iter()
            .map(|rule| {
                let value = coerce_number(source.get(rule.source_key))
                    .and_then(|n| apply_target(n, rule.target));
                (rule.column, value)
            })
            .collect();

        CleanRecord { source, numbers }
    }

    pub fn index(&self) -> usize {
        self.source.index
    }

    pub fn text(&self, key: &str) -> String {
        self.source.text(key)
    }

    pub fn raw(&self, key: &str) -> Option<&Value> {
        self.source.get(key)
    }

    /// Cleaned numeric column. Columns outside the table are always None.
    pub fn numeric(&self, column: &str) -> Option<Numeric> {
        self.numbers.get(column).copied().flatten()
    }

    pub fn float(&self, column: &str) -> Option<f64> {
        self.numeric(column).map(|n| n.as_f64())
    }

    pub fn integer(&self, column: &str) -> Option<i64> {
        match self.numeric(column)? {
            Numeric::Integer(i) => Some(i),
            Numeric::Float(f) => Some(f.trunc() as i64),
        }
    }
}

/// Clean every record, preserving order and source indexes.
pub fn clean(records: Vec<SourceRecord>) -> Vec<CleanRecord> {
    let cleaned: Vec<CleanRecord> = records.into_iter().map(CleanRecord::from_source).collect();
    debug!(records = cleaned.len(), rules = NUMERIC_FIELDS.len(), "data cleaning completed");
    cleaned
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::extract;
    use serde_json::json;

    fn clean_one(json: &str) -> CleanRecord {
        let mut records = clean(extract(json).unwrap());
        records.remove(0)
    }

    #[test]
    fn test_coerce_number_variants() {
        assert_eq!(coerce_number(Some(&json!(12.5))), Some(12.5));
        assert_eq!(coerce_number(Some(&json!(" 1200 "))), Some(1200.0));
        assert_eq!(coerce_number(Some(&json!("1e3"))), Some(1000.0));
        assert_eq!(coerce_number(Some(&json!(0))), Some(0.0));
        assert_eq!(coerce_number(Some(&json!(""))), None);
        assert_eq!(coerce_number(Some(&json!("n/a"))), None);
        assert_eq!(coerce_number(Some(&json!("1,200"))), None);
        assert_eq!(coerce_number(Some(&json!("inf"))), None);
        assert_eq!(coerce_number(Some(&json!(true))), None);
        assert_eq!(coerce_number(Some(&json!([1]))), None);
        assert_eq!(coerce_number(Some(&Value::Null)), None);
        assert_eq!(coerce_number(None), None);
    }

    #[test]
    fn test_nested_zero_is_absent() {
        assert_eq!(coerce_nested_number(Some(&json!(0))), None);
        assert_eq!(coerce_nested_number(Some(&json!(0.0))), None);
        assert_eq!(coerce_nested_number(Some(&json!(""))), None);
        assert_eq!(coerce_nested_number(Some(&json!(false))), None);
        assert_eq!(coerce_nested_number(None), None);
        assert_eq!(coerce_nested_number(Some(&json!(250))), Some(250.0));
    }

    #[test]
    fn test_nested_zero_string_is_kept() {
        assert_eq!(coerce_nested_number(Some(&json!("0"))), Some(0.0));
        assert_eq!(coerce_nested_number(Some(&json!("0.0"))), Some(0.0));
        assert_eq!(coerce_nested_number(Some(&json!(" "))), None);
    }

    #[test]
    fn test_clean_declared_fields_become_none() {
        let record = clean_one(
            r#"[{"Tax_Rate": "abc", "Bed": "", "Latitude": null, "City": "Austin"}]"#,
        );

        for rule in NUMERIC_FIELDS {
            assert_eq!(record.numeric(rule.column), None, "column {}", rule.column);
        }
        assert_eq!(record.text("City"), "Austin");
    }

    #[test]
    fn test_clean_coerces_by_target_type() {
        let record = clean_one(
            r#"[{"Tax_Rate": "1.85", "Bed": 3.7, "Bath": "2", "Year_Built": 1998.0,
                 "Latitude": 30.25, "Taxes": 4200}]"#,
        );

        assert_eq!(record.float("tax_rate"), Some(1.85));
        assert_eq!(record.integer("bed"), Some(3));
        assert_eq!(record.integer("bath"), Some(2));
        assert_eq!(record.integer("year_built"), Some(1998));
        assert_eq!(record.float("latitude"), Some(30.25));
        assert_eq!(record.float("taxes"), Some(4200.0));
    }

    #[test]
    fn test_year_built_zero_is_none() {
        assert_eq!(clean_one(r#"[{"Year_Built": 0}]"#).integer("year_built"), None);
        assert_eq!(clean_one(r#"[{"Year_Built": "-5"}]"#).integer("year_built"), None);
    }

    #[test]
    fn test_top_level_zero_is_kept() {
        let record = clean_one(r#"[{"SQFT_Basement": 0, "Net_Yield": "0"}]"#);

        assert_eq!(record.integer("sqft_basement"), Some(0));
        assert_eq!(record.float("net_yield"), Some(0.0));
    }

    #[test]
    fn test_non_declared_fields_are_not_coerced() {
        let record = clean_one(r#"[{"Zip": "00501", "Market": 12}]"#);

        assert_eq!(record.text("Zip"), "00501");
        assert_eq!(record.text("Market"), "12");
        assert_eq!(record.numeric("zip"), None);
        assert!(NUMERIC_FIELDS.iter().all(|rule| rule.column != "zip"));
    }

    #[test]
    fn test_clean_preserves_order() {
        let records = clean(extract(r#"[{"Bed": 1}, {"Bed": 2}, {"Bed": 3}]"#).unwrap());
        let beds: Vec<_> = records.iter().map(|r| (r.index(), r.integer("bed"))).collect();

        assert_eq!(beds, vec![(0, Some(1)), (1, Some(2)), (2, Some(3))]);
    }
}
