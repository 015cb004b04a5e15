use clap::{Parser, Subcommand};
use std::sync::Arc;
use tracing::info;

use mpc_scraper::calendar::CalendarSource;
use mpc_scraper::config::Config;
use mpc_scraper::db::SqliteStorage;
use mpc_scraper::fetch::build_http_client;
use mpc_scraper::importer::Importer;
use mpc_scraper::logging;
use mpc_scraper::pipeline::{Pipeline, ScrapeReport};
use mpc_scraper::records::RecordStore;
use mpc_scraper::storage::Storage;

#[derive(Parser)]
#[command(name = "mpc_scraper")]
#[command(about = "Maine Public community calendar scraper and importer")]
#[command(version = "0.1.0")]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(long, default_value = "config.toml")]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Crawl calendar listing pages into the event collection
    Scrape {
        /// Number of pages to scan (defaults to the configured full scan)
        #[arg(long)]
        pages: Option<u32>,
        /// Skip the per-event venue detail fetch
        #[arg(long)]
        no_details: bool,
    },
    /// Scan forward only until previously ingested content is reached
    Update,
    /// Merge the saved event collection into the SQL database
    Import {
        /// Event collection file (defaults to the configured events file)
        #[arg(long)]
        input: Option<String>,
        /// SQLite database path (defaults to the configured database)
        #[arg(long)]
        db: Option<String>,
        /// Insert events even when one with the same name and date exists
        #[arg(long)]
        allow_duplicates: bool,
    },
    /// Run scraper and importer sequentially
    Run {
        /// Number of pages to scan (defaults to the configured full scan)
        #[arg(long)]
        pages: Option<u32>,
        /// Skip the per-event venue detail fetch
        #[arg(long)]
        no_details: bool,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    logging::init_logging();

    let cli = Cli::parse();
    let mut config = Config::load(&cli.config)?;

    match cli.command {
        Commands::Scrape { pages, no_details } => {
            if no_details {
                config.scraper.fetch_details = false;
            }
            println!("🔄 Running scraper...");
            scrape(&config, pages, false).await?;
        }
        Commands::Update => {
            println!("🔄 Running update scrape...");
            scrape(&config, None, true).await?;
        }
        Commands::Import {
            input,
            db,
            allow_duplicates,
        } => {
            println!("📥 Importing events...");
            import(&config, input, db, allow_duplicates).await?;
        }
        Commands::Run { pages, no_details } => {
            if no_details {
                config.scraper.fetch_details = false;
            }
            println!("🚀 Running full pipeline (scrape + import)...");
            scrape(&config, pages, false).await?;
            import(&config, None, None, false).await?;
            println!("✅ Full pipeline completed");
        }
    }

    Ok(())
}

async fn scrape(
    config: &Config,
    pages: Option<u32>,
    update: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let client = build_http_client(&config.scraper)?;
    let source = Arc::new(CalendarSource::new(client, config.scraper.clone()));
    let pipeline = Pipeline::new(source, config);

    let report = if update {
        pipeline.run_update().await?
    } else {
        let pages = pages.unwrap_or(config.scraper.full_scan_pages);
        pipeline.run_scan(pages).await?
    };

    info!(?report, "scrape finished");
    print_scrape_report(&report);
    Ok(())
}

fn print_scrape_report(report: &ScrapeReport) {
    println!("\n📊 Scrape Results:");
    println!("   Pages scanned: {}", report.pages_scanned);
    println!("   Failed pages: {}", report.failed_pages);
    println!("   New records: {}", report.new_records);
    println!("   Duplicates dropped: {}", report.duplicates_dropped);
    println!("   Collection size: {}", report.collection_size);
}

async fn import(
    config: &Config,
    input: Option<String>,
    db: Option<String>,
    allow_duplicates: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let events_file = input.unwrap_or_else(|| config.scraper.events_file.clone());
    let db_path = db.unwrap_or_else(|| config.database.path.clone());

    let records = RecordStore::new(&events_file).load()?;
    println!("✓ Loaded {} events from {}", records.len(), events_file);

    let storage: Arc<dyn Storage> = Arc::new(SqliteStorage::open(&db_path)?);
    let importer = Importer::new(storage, !allow_duplicates);
    let summary = importer.run(&records).await?;

    println!("\n📊 Import Summary:");
    println!("   Total events in file: {}", summary.total);
    println!("   ✓ Imported: {}", summary.inserted);
    println!("   ⏭️  Skipped: {}", summary.skipped);
    println!("   ❌ Errors: {}", summary.errors);
    Ok(())
}
