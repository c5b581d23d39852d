// 🏠 Row models - one struct per target table
//
// Field mapping from the listing document to the relational schema.
// Child rows carry their 1-based sequence number within the parent's
// embedded list.

use crate::coercion::{coerce_nested_number, CleanRecord};
use crate::embedded::{parse_embedded_list, EmbeddedRecord};
use crate::source::text_value;
use serde::{Deserialize, Serialize};

/// Source keys holding embedded lists
pub const HOA_KEY: &str = "HOA";
pub const VALUATION_KEY: &str = "Valuation";
pub const REHAB_KEY: &str = "Rehab";

fn nested_text(record: &EmbeddedRecord, key: &str) -> String {
    text_value(record.get(key))
}

fn nested_number(record: &EmbeddedRecord, key: &str) -> Option<f64> {
    coerce_nested_number(record.get(key))
}

/// Embedded records of `key`, numbered from 1 in source order.
pub fn sequenced(record: &CleanRecord, key: &str) -> Vec<(i64, EmbeddedRecord)> {
    parse_embedded_list(record.raw(key))
        .into_iter()
        .zip(1..)
        .map(|(entry, seq)| (seq, entry))
        .collect()
}

// ============================================================================
// PROPERTY
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyRow {
    pub property_title: String,
    pub address: String,
    pub street_address: String,
    pub city: String,
    pub state: String,
    pub zip: String,
    pub property_type: String,
    pub market: String,
    pub year_built: Option<i64>,
    pub flood: String,
    pub highway: String,
    pub train: String,
    pub tax_rate: Option<f64>,
    pub sqft_basement: Option<i64>,
    pub htw: String,
    pub pool: String,
    pub commercial: String,
    pub water: String,
    pub sewage: String,
    pub sqft_mu: Option<i64>,
    pub sqft_total: Option<i64>,
    pub parking: String,
    pub bed: Option<i64>,
    pub bath: Option<i64>,
    pub basement_yes_no: String,
    pub layout: String,
    pub neighborhood_rating: Option<i64>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub subdivision: String,
    pub school_average: Option<f64>,
}

impl PropertyRow {
    pub fn from_record(record: &CleanRecord) -> Self {
        PropertyRow {
            property_title: record.text("Property_Title"),
            address: record.text("Address"),
            street_address: record.text("Street_Address"),
            city: record.text("City"),
            state: record.text("State"),
            zip: record.text("Zip"),
            property_type: record.text("Property_Type"),
            market: record.text("Market"),
            year_built: record.integer("year_built"),
            flood: record.text("Flood"),
            highway: record.text("Highway"),
            train: record.text("Train"),
            tax_rate: record.float("tax_rate"),
            sqft_basement: record.integer("sqft_basement"),
            htw: record.text("HTW"),
            pool: record.text("Pool"),
            commercial: record.text("Commercial"),
            water: record.text("Water"),
            sewage: record.text("Sewage"),
            sqft_mu: record.integer("sqft_mu"),
            sqft_total: record.integer("sqft_total"),
            parking: record.text("Parking"),
            bed: record.integer("bed"),
            bath: record.integer("bath"),
            basement_yes_no: record.text("BasementYesNo"),
            layout: record.text("Layout"),
            neighborhood_rating: record.integer("neighborhood_rating"),
            latitude: record.float("latitude"),
            longitude: record.float("longitude"),
            subdivision: record.text("Subdivision"),
            school_average: record.float("school_average"),
        }
    }
}

// ============================================================================
// LEAD / TAX
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeadRow {
    pub property_id: i64,
    pub reviewed_status: String,
    pub most_recent_status: String,
    pub source: String,
    pub occupancy: String,
    pub net_yield: Option<f64>,
    pub irr: Option<f64>,
    pub selling_reason: String,
    pub seller_retained_broker: String,
    pub final_reviewer: String,
    pub rent_restricted: String,
}

impl LeadRow {
    pub fn from_record(record: &CleanRecord, property_id: i64) -> Self {
        LeadRow {
            property_id,
            reviewed_status: record.text("Reviewed_Status"),
            most_recent_status: record.text("Most_Recent_Status"),
            source: record.text("Source"),
            occupancy: record.text("Occupancy"),
            net_yield: record.float("net_yield"),
            irr: record.float("irr"),
            selling_reason: record.text("Selling_Reason"),
            seller_retained_broker: record.text("Seller_Retained_Broker"),
            final_reviewer: record.text("Final_Reviewer"),
            rent_restricted: record.text("Rent_Restricted"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaxRow {
    pub property_id: i64,
    pub taxes: f64,
    pub tax_year: i32,
}

impl TaxRow {
    /// None when the record carries no tax amount
    pub fn from_record(record: &CleanRecord, property_id: i64, tax_year: i32) -> Option<Self> {
        record.float("taxes").map(|taxes| TaxRow {
            property_id,
            taxes,
            tax_year,
        })
    }
}

// ============================================================================
// EMBEDDED CHILDREN
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HoaRow {
    pub property_id: i64,
    pub hoa_fee: Option<f64>,
    pub hoa_flag: String,
    pub sequence_number: i64,
}

impl HoaRow {
    pub fn rows_for(record: &CleanRecord, property_id: i64) -> Vec<HoaRow> {
        sequenced(record, HOA_KEY)
            .into_iter()
            .map(|(sequence_number, hoa)| HoaRow {
                property_id,
                hoa_fee: nested_number(&hoa, "HOA"),
                hoa_flag: nested_text(&hoa, "HOA_Flag"),
                sequence_number,
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValuationRow {
    pub property_id: i64,
    pub sequence_number: i64,
    pub previous_rent: Option<f64>,
    pub list_price: Option<f64>,
    pub zestimate: Option<f64>,
    pub arv: Option<f64>,
    pub expected_rent: Option<f64>,
    pub rent_zestimate: Option<f64>,
    pub low_fmr: Option<f64>,
    pub high_fmr: Option<f64>,
    pub redfin_value: Option<f64>,
}

impl ValuationRow {
    pub fn rows_for(record: &CleanRecord, property_id: i64) -> Vec<ValuationRow> {
        sequenced(record, VALUATION_KEY)
            .into_iter()
            .map(|(sequence_number, val)| ValuationRow {
                property_id,
                sequence_number,
                previous_rent: nested_number(&val, "Previous_Rent"),
                list_price: nested_number(&val, "List_Price"),
                zestimate: nested_number(&val, "Zestimate"),
                arv: nested_number(&val, "ARV"),
                expected_rent: nested_number(&val, "Expected_Rent"),
                rent_zestimate: nested_number(&val, "Rent_Zestimate"),
                low_fmr: nested_number(&val, "Low_FMR"),
                high_fmr: nested_number(&val, "High_FMR"),
                redfin_value: nested_number(&val, "Redfin_Value"),
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RehabEstimateRow {
    pub property_id: i64,
    pub sequence_number: i64,
    pub underwriting_rehab: Option<f64>,
    pub rehab_calculation: Option<f64>,
}

/// The eleven categorical flags of one rehab entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RehabFlags {
    pub paint: String,
    pub flooring_flag: String,
    pub foundation_flag: String,
    pub roof_flag: String,
    pub hvac_flag: String,
    pub kitchen_flag: String,
    pub bathroom_flag: String,
    pub appliances_flag: String,
    pub windows_flag: String,
    pub landscaping_flag: String,
    pub trashout_flag: String,
}

impl RehabFlags {
    fn from_entry(entry: &EmbeddedRecord) -> Self {
        RehabFlags {
            paint: nested_text(entry, "Paint"),
            flooring_flag: nested_text(entry, "Flooring_Flag"),
            foundation_flag: nested_text(entry, "Foundation_Flag"),
            roof_flag: nested_text(entry, "Roof_Flag"),
            hvac_flag: nested_text(entry, "HVAC_Flag"),
            kitchen_flag: nested_text(entry, "Kitchen_Flag"),
            bathroom_flag: nested_text(entry, "Bathroom_Flag"),
            appliances_flag: nested_text(entry, "Appliances_Flag"),
            windows_flag: nested_text(entry, "Windows_Flag"),
            landscaping_flag: nested_text(entry, "Landscaping_Flag"),
            trashout_flag: nested_text(entry, "Trashout_Flag"),
        }
    }
}

/// A rehab entry before its estimate row has an identifier.
#[derive(Debug, Clone, PartialEq)]
pub struct RehabEntry {
    pub estimate: RehabEstimateRow,
    pub flags: RehabFlags,
}

impl RehabEntry {
    pub fn entries_for(record: &CleanRecord, property_id: i64) -> Vec<RehabEntry> {
        sequenced(record, REHAB_KEY)
            .into_iter()
            .map(|(sequence_number, entry)| RehabEntry {
                estimate: RehabEstimateRow {
                    property_id,
                    sequence_number,
                    underwriting_rehab: nested_number(&entry, "Underwriting_Rehab"),
                    rehab_calculation: nested_number(&entry, "Rehab_Calculation"),
                },
                flags: RehabFlags::from_entry(&entry),
            })
            .collect()
    }

    /// Composite key that pairs a detail with its estimate
    pub fn key(&self) -> (i64, i64) {
        (self.estimate.property_id, self.estimate.sequence_number)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RehabDetailRow {
    pub rehab_estimate_id: i64,
    #[serde(flatten)]
    pub flags: RehabFlags,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coercion::clean;
    use crate::source::extract;

    fn record(json: &str) -> CleanRecord {
        clean(extract(json).unwrap()).remove(0)
    }

    #[test]
    fn test_property_row_mapping() {
        let rec = record(
            r#"[{"Property_Title": "Bungalow", "City": "Austin", "State": "TX", "Zip": 78704,
                 "Year_Built": 0, "Bed": "3", "Latitude": "30.2", "Pool": "Yes"}]"#,
        );
        let row = PropertyRow::from_record(&rec);

        assert_eq!(row.property_title, "Bungalow");
        assert_eq!(row.zip, "78704");
        assert_eq!(row.year_built, None);
        assert_eq!(row.bed, Some(3));
        assert_eq!(row.latitude, Some(30.2));
        assert_eq!(row.pool, "Yes");
        assert_eq!(row.address, "");
        assert_eq!(row.bath, None);
    }

    #[test]
    fn test_tax_row_requires_amount() {
        let with_tax = record(r#"[{"Taxes": "3100.25"}]"#);
        let without_tax = record(r#"[{"Taxes": ""}]"#);

        let tax = TaxRow::from_record(&with_tax, 7, 2026).unwrap();
        assert_eq!(tax.taxes, 3100.25);
        assert_eq!(tax.tax_year, 2026);
        assert!(TaxRow::from_record(&without_tax, 7, 2026).is_none());
    }

    #[test]
    fn test_hoa_rows_sequence_and_zero_fee() {
        let rec = record(
            r#"[{"HOA": "[{'HOA': 150, 'HOA_Flag': 'Yes'}, {'HOA': 0, 'HOA_Flag': 'No'}, {'HOA_Flag': 'Unknown'}]"}]"#,
        );
        let rows = HoaRow::rows_for(&rec, 11);

        assert_eq!(rows.len(), 3);
        assert_eq!(
            rows.iter().map(|r| r.sequence_number).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
        assert_eq!(rows[0].hoa_fee, Some(150.0));
        assert_eq!(rows[1].hoa_fee, None);
        assert_eq!(rows[2].hoa_fee, None);
        assert_eq!(rows[2].hoa_flag, "Unknown");
        assert!(rows.iter().all(|r| r.property_id == 11));
    }

    #[test]
    fn test_valuation_rows_unparseable_values_are_none() {
        let rec = record(
            r#"[{"Valuation": [{"List_Price": "abc", "Zestimate": 310000, "ARV": "400000"}]}]"#,
        );
        let rows = ValuationRow::rows_for(&rec, 1);

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].list_price, None);
        assert_eq!(rows[0].zestimate, Some(310000.0));
        assert_eq!(rows[0].arv, Some(400000.0));
        assert_eq!(rows[0].redfin_value, None);
    }

    #[test]
    fn test_rehab_entries_carry_flags() {
        let rec = record(
            r#"[{"Rehab": "[{'Underwriting_Rehab': 25000, 'Rehab_Calculation': 27500.5, 'Paint': 'Yes', 'Roof_Flag': 'No'}]"}]"#,
        );
        let entries = RehabEntry::entries_for(&rec, 4);

        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].key(), (4, 1));
        assert_eq!(entries[0].estimate.underwriting_rehab, Some(25000.0));
        assert_eq!(entries[0].estimate.rehab_calculation, Some(27500.5));
        assert_eq!(entries[0].flags.paint, "Yes");
        assert_eq!(entries[0].flags.roof_flag, "No");
        assert_eq!(entries[0].flags.trashout_flag, "");
    }

    #[test]
    fn test_malformed_embedded_list_yields_no_rows() {
        let rec = record(r#"[{"HOA": "[{'HOA': 150", "Rehab": {"Paint": "Yes"}}]"#);

        assert!(HoaRow::rows_for(&rec, 1).is_empty());
        assert!(RehabEntry::entries_for(&rec, 1).is_empty());
    }
}
