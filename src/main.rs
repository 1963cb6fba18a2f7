use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use registry_radar::db::get_recent_audit_entries;
use registry_radar::service::ErrorResponse;
use registry_radar::{open_database, Config, NewCompaniesRequest, RegistryService, ValidatedCompany};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "registry-radar", version, about = "Reconciled list of newly registered companies")]
struct Cli {
    /// TOML config file (defaults are used when omitted)
    #[arg(long, env = "RADAR_CONFIG", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create the SQLite database (cache + audit tables)
    InitDb,

    /// Run one reconciliation and print the result
    Query {
        /// Registration date, YYYY-MM-DD
        #[arg(long)]
        date: String,

        /// Region code, e.g. SP
        #[arg(long)]
        region: String,

        /// API token identifying the caller
        #[arg(long, env = "RADAR_TOKEN", hide_env_values = true)]
        token: Option<String>,

        /// Print companies as CSV instead of the JSON response
        #[arg(long)]
        csv: bool,
    },

    /// Show the most recent audit entries
    Audit {
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
}

/// Flat CSV row (the csv crate cannot serialize flattened structs)
#[derive(Serialize)]
struct CsvRow<'a> {
    tax_id: &'a str,
    legal_name: &'a str,
    trade_name: &'a str,
    registration_date: String,
    region: &'a str,
    source: &'a str,
    confidence: String,
    validation_note: &'a str,
}

impl<'a> From<&'a ValidatedCompany> for CsvRow<'a> {
    fn from(company: &'a ValidatedCompany) -> Self {
        CsvRow {
            tax_id: &company.record.tax_id,
            legal_name: &company.record.legal_name,
            trade_name: company.record.trade_name.as_deref().unwrap_or(""),
            registration_date: company.record.registration_date.format("%Y-%m-%d").to_string(),
            region: &company.record.region,
            source: company.source.as_str(),
            confidence: format!("{:?}", company.confidence).to_lowercase(),
            validation_note: &company.validation_note,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so stdout stays machine-readable
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };

    match cli.command {
        Command::InitDb => {
            open_database(&config.database_path)?;
            println!("✓ Database initialized with WAL mode: {}", config.database_path.display());
        }
        Command::Query { date, region, token, csv } => {
            run_query(&config, NewCompaniesRequest { date, region }, token.as_deref(), csv).await?;
        }
        Command::Audit { limit } => {
            let conn = open_database(&config.database_path)?;
            for entry in get_recent_audit_entries(&conn, limit)? {
                println!("{}", serde_json::to_string(&entry)?);
            }
        }
    }

    Ok(())
}

async fn run_query(config: &Config, request: NewCompaniesRequest, token: Option<&str>, as_csv: bool) -> Result<()> {
    let conn = open_database(&config.database_path)?;
    let service = RegistryService::from_config(config, Arc::new(Mutex::new(conn)))?;

    let response = match service.new_companies(token, &request).await {
        Ok(response) => response,
        Err(e) => {
            println!("{}", serde_json::to_string_pretty(&ErrorResponse::from(&e))?);
            std::process::exit(1);
        }
    };

    if as_csv {
        let mut writer = csv::Writer::from_writer(std::io::stdout());
        for company in &response.companies {
            writer.serialize(CsvRow::from(company)).context("Failed to write CSV row")?;
        }
        writer.flush()?;
    } else {
        println!("{}", serde_json::to_string_pretty(&response)?);
    }

    Ok(())
}
