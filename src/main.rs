use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use property_etl::logging::init_logging;
use property_etl::{
    run_etl, EtlConfig, LoadReport, PostLoadValidator, Store, Table, ValidationReport,
};

#[derive(Parser)]
#[command(name = "property-etl", version, about = "Load listing JSON into SQLite and validate it")]
struct Cli {
    /// SQLite database file (overrides [database] path)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// TOML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Extract, clean and load one listing document
    Load(LoadArgs),
    /// Report counts, fan-out, quality and integrity of the loaded tables
    Validate(ValidateArgs),
    /// Load a document, then validate
    Run {
        #[command(flatten)]
        load: LoadArgs,
        #[command(flatten)]
        validate: ValidateArgs,
    },
    /// Drop and recreate every target table
    Reset,
}

#[derive(Args)]
struct LoadArgs {
    /// Listing document (JSON array of objects)
    input: PathBuf,

    /// Tax year stamped on tax rows (defaults to the current year)
    #[arg(long)]
    tax_year: Option<i32>,

    /// Reset the schema before loading
    #[arg(long)]
    reset: bool,
}

#[derive(Args)]
struct ValidateArgs {
    /// Print the validation report as JSON
    #[arg(long)]
    json: bool,

    /// Only print the fan-out report for this child table
    #[arg(long)]
    fan_out: Option<String>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match EtlConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("❌ {}", err);
            return ExitCode::FAILURE;
        }
    };
    let _guard = match init_logging(&config.logging) {
        Ok(guard) => guard,
        Err(err) => {
            eprintln!("❌ {}", err);
            return ExitCode::FAILURE;
        }
    };

    match run(cli, config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(error = %format!("{:#}", err), "run failed");
            eprintln!("❌ {:#}", err);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli, config: EtlConfig) -> Result<()> {
    let db_path = cli.db.unwrap_or_else(|| config.database.path.clone());

    match cli.command {
        Command::Load(args) => {
            let mut store = open_store(&db_path, config.database.wal)?;
            let report = load(&mut store, &args, &config)?;
            print_load_report(&store, &report);
            store.close().context("Failed to close database")?;
        }
        Command::Validate(args) => {
            let store = open_store(&db_path, config.database.wal)?;
            validate(&store, &args)?;
            store.close().context("Failed to close database")?;
        }
        Command::Run { load: load_args, validate: validate_args } => {
            let mut store = open_store(&db_path, config.database.wal)?;
            let report = load(&mut store, &load_args, &config)?;
            print_load_report(&store, &report);
            validate(&store, &validate_args)?;
            store.close().context("Failed to close database")?;
        }
        Command::Reset => {
            let store = open_store(&db_path, config.database.wal)?;
            store.reset().context("Failed to reset schema")?;
            println!("✓ Schema reset: {}", db_path.display());
            store.close().context("Failed to close database")?;
        }
    }

    Ok(())
}

fn open_store(path: &Path, wal: bool) -> Result<Store> {
    Store::open(path, wal).with_context(|| format!("Failed to open database {}", path.display()))
}

fn load(store: &mut Store, args: &LoadArgs, config: &EtlConfig) -> Result<LoadReport> {
    let mut options = config.load_options();
    if args.tax_year.is_some() {
        options.tax_year = args.tax_year;
    }
    options.reset_before_load |= args.reset;

    let report = run_etl(store, &args.input, &options)
        .with_context(|| format!("Failed to load {}", args.input.display()))?;
    Ok(report)
}

fn validate(store: &Store, args: &ValidateArgs) -> Result<()> {
    let validator = PostLoadValidator::new(store);

    if let Some(name) = &args.fan_out {
        let table: Table = name.parse()?;
        let rows = validator.fan_out_report(table)?;
        if args.json {
            println!("{}", serde_json::to_string_pretty(&rows)?);
        } else {
            println!("{}: {} properties with multiple records", table, rows.len());
            for row in rows {
                println!("  Property {}: {} records", row.property_id, row.child_count);
            }
        }
        return Ok(());
    }

    let report = validator.run_validation()?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_validation_report(&report);
    }

    if !report.integrity_ok() {
        anyhow::bail!("integrity checks failed");
    }
    Ok(())
}

fn print_load_report(store: &Store, report: &LoadReport) {
    println!("\n🗄️  Load complete (run {})", report.run_id);
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    if let Some(path) = store.path() {
        println!("✓ Database: {}", path.display());
    }
    println!("✓ Tax year: {}", report.tax_year);
    println!("✓ Source records: {}", report.records);
    for (phase, rows) in &report.rows {
        println!("✓ {:<16} {:>8} rows", phase.name(), rows);
    }
    if report.malformed_embedded > 0 {
        println!("⚠️  Malformed embedded lists dropped: {}", report.malformed_embedded);
    }
}

fn print_validation_report(report: &ValidationReport) {
    println!("\n🔍 Validation");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    println!("=== RECORD COUNTS ===");
    for (table, count) in &report.counts {
        println!("{}: {} records", table, count);
    }

    println!("\n=== MULTIPLE RECORDS PER PROPERTY ===");
    for (table, rows) in &report.fan_out {
        println!("{}: {} properties", table, rows.len());
        for row in rows.iter().take(3) {
            println!("  Property {}: {} records", row.property_id, row.child_count);
        }
    }

    println!("\n=== DATA QUALITY ===");
    println!("Properties missing city/state: {}", report.quality.missing_location_count);
    println!("List Price range: {}", report.quality.price_range);
    println!("Rehab estimates range: {}", report.quality.rehab_range);

    println!("\n=== INTEGRITY ===");
    for check in &report.integrity {
        let mark = if check.passed() { "✓" } else { "❌" };
        println!("{} {}: {}", mark, check.name, check.violations);
    }
}
