use crate::error::ValidatorError;
use crate::models::{
    HoaRow, LeadRow, PropertyRow, RehabDetailRow, RehabEstimateRow, TaxRow, ValuationRow,
};
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, info};

// ============================================================================
// TABLES
// ============================================================================

/// Target tables, declared in load (dependency) order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Table {
    Properties,
    Leads,
    Taxes,
    HoaDetails,
    ValuationDetails,
    RehabEstimates,
    RehabDetails,
}

impl Table {
    pub const ALL: [Table; 7] = [
        Table::Properties,
        Table::Leads,
        Table::Taxes,
        Table::HoaDetails,
        Table::ValuationDetails,
        Table::RehabEstimates,
        Table::RehabDetails,
    ];

    /// Tables that may hold many rows per property
    pub const FAN_OUT: [Table; 3] = [
        Table::HoaDetails,
        Table::ValuationDetails,
        Table::RehabEstimates,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Table::Properties => "properties",
            Table::Leads => "leads",
            Table::Taxes => "taxes",
            Table::HoaDetails => "hoa_details",
            Table::ValuationDetails => "valuation_details",
            Table::RehabEstimates => "rehab_estimates",
            Table::RehabDetails => "rehab_details",
        }
    }

    /// Child tables carrying a `property_id` foreign key
    pub fn is_property_child(&self) -> bool {
        !matches!(self, Table::Properties | Table::RehabDetails)
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Table {
    type Err = ValidatorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Table::ALL
            .iter()
            .copied()
            .find(|table| table.name() == s)
            .ok_or_else(|| ValidatorError::UnknownTable(s.to_string()))
    }
}

// ============================================================================
// STORE SESSION
// ============================================================================

/// An open SQLite session shared by the loader and the validator.
#[derive(Debug)]
pub struct Store {
    conn: Connection,
    path: Option<PathBuf>,
}

impl Store {
    /// Open (or create) a database file. WAL is enabled when `wal` is set.
    pub fn open(path: &Path, wal: bool) -> rusqlite::Result<Self> {
        let conn = Connection::open(path)?;
        if wal {
            // Enable WAL mode for crash recovery
            conn.pragma_update(None, "journal_mode", "WAL")?;
        }
        conn.pragma_update(None, "foreign_keys", "ON")?;

        info!(path = %path.display(), wal, "opened store");
        Ok(Store {
            conn,
            path: Some(path.to_path_buf()),
        })
    }

    /// In-memory store (for testing)
    pub fn open_in_memory() -> rusqlite::Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        Ok(Store { conn, path: None })
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    pub fn conn_mut(&mut self) -> &mut Connection {
        &mut self.conn
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn setup(&self) -> rusqlite::Result<()> {
        setup_database(&self.conn)
    }

    pub fn reset(&self) -> rusqlite::Result<()> {
        reset_schema(&self.conn)
    }

    /// Release the connection, surfacing any close error.
    pub fn close(self) -> rusqlite::Result<()> {
        self.conn.close().map_err(|(_, err)| err)
    }
}

// ============================================================================
// SCHEMA
// ============================================================================

pub fn setup_database(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS properties (
            property_id INTEGER PRIMARY KEY AUTOINCREMENT,
            property_title TEXT NOT NULL DEFAULT '',
            address TEXT NOT NULL DEFAULT '',
            street_address TEXT NOT NULL DEFAULT '',
            city TEXT NOT NULL DEFAULT '',
            state TEXT NOT NULL DEFAULT '',
            zip TEXT NOT NULL DEFAULT '',
            property_type TEXT NOT NULL DEFAULT '',
            market TEXT NOT NULL DEFAULT '',
            year_built INTEGER,
            flood TEXT NOT NULL DEFAULT '',
            highway TEXT NOT NULL DEFAULT '',
            train TEXT NOT NULL DEFAULT '',
            tax_rate REAL,
            sqft_basement INTEGER,
            htw TEXT NOT NULL DEFAULT '',
            pool TEXT NOT NULL DEFAULT '',
            commercial TEXT NOT NULL DEFAULT '',
            water TEXT NOT NULL DEFAULT '',
            sewage TEXT NOT NULL DEFAULT '',
            sqft_mu INTEGER,
            sqft_total INTEGER,
            parking TEXT NOT NULL DEFAULT '',
            bed INTEGER,
            bath INTEGER,
            basement_yes_no TEXT NOT NULL DEFAULT '',
            layout TEXT NOT NULL DEFAULT '',
            neighborhood_rating INTEGER,
            latitude REAL,
            longitude REAL,
            subdivision TEXT NOT NULL DEFAULT '',
            school_average REAL,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        );

        CREATE TABLE IF NOT EXISTS leads (
            lead_id INTEGER PRIMARY KEY AUTOINCREMENT,
            property_id INTEGER NOT NULL REFERENCES properties(property_id),
            reviewed_status TEXT NOT NULL DEFAULT '',
            most_recent_status TEXT NOT NULL DEFAULT '',
            source TEXT NOT NULL DEFAULT '',
            occupancy TEXT NOT NULL DEFAULT '',
            net_yield REAL,
            irr REAL,
            selling_reason TEXT NOT NULL DEFAULT '',
            seller_retained_broker TEXT NOT NULL DEFAULT '',
            final_reviewer TEXT NOT NULL DEFAULT '',
            rent_restricted TEXT NOT NULL DEFAULT ''
        );

        CREATE TABLE IF NOT EXISTS taxes (
            tax_id INTEGER PRIMARY KEY AUTOINCREMENT,
            property_id INTEGER NOT NULL REFERENCES properties(property_id),
            taxes REAL NOT NULL,
            tax_year INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS hoa_details (
            hoa_id INTEGER PRIMARY KEY AUTOINCREMENT,
            property_id INTEGER NOT NULL REFERENCES properties(property_id),
            hoa_fee REAL,
            hoa_flag TEXT NOT NULL DEFAULT '',
            sequence_number INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS valuation_details (
            valuation_id INTEGER PRIMARY KEY AUTOINCREMENT,
            property_id INTEGER NOT NULL REFERENCES properties(property_id),
            sequence_number INTEGER NOT NULL,
            previous_rent REAL,
            list_price REAL,
            zestimate REAL,
            arv REAL,
            expected_rent REAL,
            rent_zestimate REAL,
            low_fmr REAL,
            high_fmr REAL,
            redfin_value REAL
        );

        CREATE TABLE IF NOT EXISTS rehab_estimates (
            rehab_estimate_id INTEGER PRIMARY KEY AUTOINCREMENT,
            property_id INTEGER NOT NULL REFERENCES properties(property_id),
            sequence_number INTEGER NOT NULL,
            underwriting_rehab REAL,
            rehab_calculation REAL
        );

        CREATE TABLE IF NOT EXISTS rehab_details (
            detail_id INTEGER PRIMARY KEY AUTOINCREMENT,
            rehab_estimate_id INTEGER NOT NULL REFERENCES rehab_estimates(rehab_estimate_id),
            paint TEXT NOT NULL DEFAULT '',
            flooring_flag TEXT NOT NULL DEFAULT '',
            foundation_flag TEXT NOT NULL DEFAULT '',
            roof_flag TEXT NOT NULL DEFAULT '',
            hvac_flag TEXT NOT NULL DEFAULT '',
            kitchen_flag TEXT NOT NULL DEFAULT '',
            bathroom_flag TEXT NOT NULL DEFAULT '',
            appliances_flag TEXT NOT NULL DEFAULT '',
            windows_flag TEXT NOT NULL DEFAULT '',
            landscaping_flag TEXT NOT NULL DEFAULT '',
            trashout_flag TEXT NOT NULL DEFAULT ''
        );

        CREATE INDEX IF NOT EXISTS idx_leads_property ON leads(property_id);
        CREATE INDEX IF NOT EXISTS idx_taxes_property ON taxes(property_id);
        CREATE INDEX IF NOT EXISTS idx_hoa_property ON hoa_details(property_id, sequence_number);
        CREATE INDEX IF NOT EXISTS idx_valuation_property ON valuation_details(property_id, sequence_number);
        CREATE UNIQUE INDEX IF NOT EXISTS idx_rehab_property_seq ON rehab_estimates(property_id, sequence_number);
        CREATE INDEX IF NOT EXISTS idx_rehab_details_estimate ON rehab_details(rehab_estimate_id);",
    )?;

    debug!("schema ready");
    Ok(())
}

/// Drop every target table (children first) and recreate the schema.
pub fn reset_schema(conn: &Connection) -> rusqlite::Result<()> {
    for table in Table::ALL.iter().rev() {
        conn.execute_batch(&format!("DROP TABLE IF EXISTS {}", table.name()))?;
    }
    info!("schema reset");
    setup_database(conn)
}

// ============================================================================
// INSERTS
// ============================================================================

/// Insert properties, returning each row's generated id in input order.
///
/// Ids are read back per row from the same connection, so they do not depend
/// on how the store orders its identifiers.
pub fn insert_properties(conn: &Connection, rows: &[PropertyRow]) -> rusqlite::Result<Vec<i64>> {
    let mut stmt = conn.prepare_cached(
        "INSERT INTO properties (
            property_title, address, street_address, city, state, zip, property_type, market, year_built,
            flood, highway, train, tax_rate, sqft_basement, htw, pool, commercial, water, sewage,
            sqft_mu, sqft_total, parking, bed, bath, basement_yes_no, layout, neighborhood_rating,
            latitude, longitude, subdivision, school_average
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18,
                  ?19, ?20, ?21, ?22, ?23, ?24, ?25, ?26, ?27, ?28, ?29, ?30, ?31)",
    )?;

    let mut ids = Vec::with_capacity(rows.len());
    for row in rows {
        stmt.execute(params![
            row.property_title,
            row.address,
            row.street_address,
            row.city,
            row.state,
            row.zip,
            row.property_type,
            row.market,
            row.year_built,
            row.flood,
            row.highway,
            row.train,
            row.tax_rate,
            row.sqft_basement,
            row.htw,
            row.pool,
            row.commercial,
            row.water,
            row.sewage,
            row.sqft_mu,
            row.sqft_total,
            row.parking,
            row.bed,
            row.bath,
            row.basement_yes_no,
            row.layout,
            row.neighborhood_rating,
            row.latitude,
            row.longitude,
            row.subdivision,
            row.school_average,
        ])?;
        ids.push(conn.last_insert_rowid());
    }

    Ok(ids)
}

pub fn insert_leads(conn: &Connection, rows: &[LeadRow]) -> rusqlite::Result<usize> {
    let mut stmt = conn.prepare_cached(
        "INSERT INTO leads (property_id, reviewed_status, most_recent_status, source, occupancy,
                            net_yield, irr, selling_reason, seller_retained_broker, final_reviewer,
                            rent_restricted)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
    )?;

    for row in rows {
        stmt.execute(params![
            row.property_id,
            row.reviewed_status,
            row.most_recent_status,
            row.source,
            row.occupancy,
            row.net_yield,
            row.irr,
            row.selling_reason,
            row.seller_retained_broker,
            row.final_reviewer,
            row.rent_restricted,
        ])?;
    }

    Ok(rows.len())
}

pub fn insert_taxes(conn: &Connection, rows: &[TaxRow]) -> rusqlite::Result<usize> {
    let mut stmt = conn
        .prepare_cached("INSERT INTO taxes (property_id, taxes, tax_year) VALUES (?1, ?2, ?3)")?;

    for row in rows {
        stmt.execute(params![row.property_id, row.taxes, row.tax_year])?;
    }

    Ok(rows.len())
}

pub fn insert_hoa_details(conn: &Connection, rows: &[HoaRow]) -> rusqlite::Result<usize> {
    let mut stmt = conn.prepare_cached(
        "INSERT INTO hoa_details (property_id, hoa_fee, hoa_flag, sequence_number)
         VALUES (?1, ?2, ?3, ?4)",
    )?;

    for row in rows {
        stmt.execute(params![
            row.property_id,
            row.hoa_fee,
            row.hoa_flag,
            row.sequence_number
        ])?;
    }

    Ok(rows.len())
}

pub fn insert_valuation_details(
    conn: &Connection,
    rows: &[ValuationRow],
) -> rusqlite::Result<usize> {
    let mut stmt = conn.prepare_cached(
        "INSERT INTO valuation_details (
            property_id, sequence_number, previous_rent, list_price, zestimate, arv,
            expected_rent, rent_zestimate, low_fmr, high_fmr, redfin_value
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
    )?;

    for row in rows {
        stmt.execute(params![
            row.property_id,
            row.sequence_number,
            row.previous_rent,
            row.list_price,
            row.zestimate,
            row.arv,
            row.expected_rent,
            row.rent_zestimate,
            row.low_fmr,
            row.high_fmr,
            row.redfin_value,
        ])?;
    }

    Ok(rows.len())
}

pub fn insert_rehab_estimates(
    conn: &Connection,
    rows: &[RehabEstimateRow],
) -> rusqlite::Result<usize> {
    let mut stmt = conn.prepare_cached(
        "INSERT INTO rehab_estimates (property_id, sequence_number, underwriting_rehab, rehab_calculation)
         VALUES (?1, ?2, ?3, ?4)",
    )?;

    for row in rows {
        stmt.execute(params![
            row.property_id,
            row.sequence_number,
            row.underwriting_rehab,
            row.rehab_calculation
        ])?;
    }

    Ok(rows.len())
}

pub fn insert_rehab_details(conn: &Connection, rows: &[RehabDetailRow]) -> rusqlite::Result<usize> {
    let mut stmt = conn.prepare_cached(
        "INSERT INTO rehab_details (
            rehab_estimate_id, paint, flooring_flag, foundation_flag, roof_flag,
            hvac_flag, kitchen_flag, bathroom_flag, appliances_flag, windows_flag,
            landscaping_flag, trashout_flag
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
    )?;

    for row in rows {
        let flags = &row.flags;
        stmt.execute(params![
            row.rehab_estimate_id,
            flags.paint,
            flags.flooring_flag,
            flags.foundation_flag,
            flags.roof_flag,
            flags.hvac_flag,
            flags.kitchen_flag,
            flags.bathroom_flag,
            flags.appliances_flag,
            flags.windows_flag,
            flags.landscaping_flag,
            flags.trashout_flag,
        ])?;
    }

    Ok(rows.len())
}

// ============================================================================
// READS
// ============================================================================

/// Map (property_id, sequence_number) → rehab_estimate_id for the given properties.
pub fn rehab_estimate_ids(
    conn: &Connection,
    property_ids: &HashSet<i64>,
) -> rusqlite::Result<HashMap<(i64, i64), i64>> {
    let mut stmt = conn.prepare(
        "SELECT rehab_estimate_id, property_id, sequence_number
         FROM rehab_estimates
         ORDER BY rehab_estimate_id",
    )?;

    let rows = stmt.query_map([], |row| {
        Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?, row.get::<_, i64>(2)?))
    })?;

    let mut mapping = HashMap::new();
    for row in rows {
        let (estimate_id, property_id, sequence_number) = row?;
        if property_ids.contains(&property_id) {
            mapping.insert((property_id, sequence_number), estimate_id);
        }
    }

    Ok(mapping)
}

pub fn count_rows(conn: &Connection, table: Table) -> rusqlite::Result<i64> {
    conn.query_row(&format!("SELECT COUNT(*) FROM {}", table.name()), [], |row| row.get(0))
}
