use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use contacts_core::{ContactQuery, ContactSort};
use contacts_enrich::EnrichConfig;
use contacts_import::{merge_alias_statuses, ImportConfig, ImportReconciler, StatusNormalizer};
use contacts_storage::{CacheStore, ContactStore, MemoryContactStore, PgContactStore};
use tracing::info;

#[derive(Debug, Parser)]
#[command(name = "contacts-cli")]
#[command(about = "Contact directory command-line interface")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Apply database migrations.
    Migrate,
    /// Make sure the default statuses exist.
    Seed,
    /// Import contacts from a CSV file.
    Import {
        file: PathBuf,
        /// Reconcile against an empty in-memory store instead of the database.
        #[arg(long)]
        dry_run: bool,
    },
    /// Fold statuses stored under alias names into their canonical entries.
    NormalizeStatuses,
    /// Show current weather for one or more cities.
    Weather {
        #[arg(required = true)]
        cities: Vec<String>,
    },
    /// List contacts.
    List {
        #[arg(long)]
        search: Option<String>,
        #[arg(long, value_enum, default_value_t = SortArg::LastName)]
        sort: SortArg,
        /// Skip the per-city weather lookup.
        #[arg(long)]
        no_weather: bool,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum SortArg {
    LastName,
    CreatedAt,
}

impl From<SortArg> for ContactSort {
    fn from(value: SortArg) -> Self {
        match value {
            SortArg::LastName => ContactSort::LastName,
            SortArg::CreatedAt => ContactSort::CreatedAt,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = ImportConfig::from_env();

    match cli.command {
        Commands::Migrate => {
            let store = PgContactStore::connect(&config.database_url).await?;
            store.migrate().await?;
            startup(&config, Arc::new(store)).await?;
            println!("migrations applied");
        }
        Commands::Seed => {
            let (_, normalizer) = open_store(&config).await?;
            for status in normalizer.seed_defaults().await? {
                println!("{}\t{}", status.id, status.name);
            }
        }
        Commands::Import { file, dry_run } => {
            let bytes = tokio::fs::read(&file)
                .await
                .with_context(|| format!("reading {}", file.display()))?;
            let (store, normalizer) = if dry_run {
                startup(&config, Arc::new(MemoryContactStore::new())).await?
            } else {
                open_store(&config).await?
            };

            let outcome = ImportReconciler::new(store, normalizer)
                .reconcile(&bytes)
                .await
                .with_context(|| format!("importing {}", file.display()))?;
            info!(run_id = %outcome.run_id, dry_run, "import complete");
            println!("{}", serde_json::to_string_pretty(&outcome)?);
        }
        Commands::NormalizeStatuses => {
            let (store, normalizer) = open_store(&config).await?;
            let report = merge_alias_statuses(store.as_ref(), normalizer.aliases()).await?;
            println!(
                "statuses merged: migrated_contacts={} deleted={:?}",
                report.migrated_contacts, report.deleted_statuses
            );
        }
        Commands::Weather { cities } => {
            let store = PgContactStore::connect(&config.database_url).await?;
            let pass = EnrichConfig::from_env().enrichment_pass(Arc::new(store.cache()))?;
            let board = pass.run(&cities).await;
            println!("{}", serde_json::to_string_pretty(&board)?);
        }
        Commands::List {
            search,
            sort,
            no_weather,
        } => {
            let pg = PgContactStore::connect(&config.database_url).await?;
            let cache: Arc<dyn CacheStore> = Arc::new(pg.cache());
            let (store, _) = startup(&config, Arc::new(pg)).await?;
            let query = ContactQuery {
                search,
                sort: sort.into(),
            };
            let contacts = store.list_contacts(&query).await?;

            let board = if no_weather {
                None
            } else {
                let pass = EnrichConfig::from_env().enrichment_pass(cache)?;
                Some(pass.run(contacts.iter().map(|c| c.city.as_str())).await)
            };

            for contact in &contacts {
                let mut line = format!(
                    "{}\t{}\t{}\t{}\t{}\t{}",
                    contact.id,
                    contact.display_name(),
                    contact.phone,
                    contact.email,
                    contact.city,
                    contact.status.name
                );
                if let Some(board) = &board {
                    match board.weather_for(&contact.city).and_then(|w| w.temperature) {
                        Some(temperature) => line.push_str(&format!("\t{temperature:.1}°C")),
                        None => line.push_str("\t-"),
                    }
                }
                println!("{line}");
            }
        }
    }

    Ok(())
}

async fn open_store(config: &ImportConfig) -> Result<(Arc<dyn ContactStore>, StatusNormalizer)> {
    let store = PgContactStore::connect(&config.database_url).await?;
    startup(config, Arc::new(store)).await
}

/// The one place the default taxonomy is seeded.
async fn startup(
    config: &ImportConfig,
    store: Arc<dyn ContactStore>,
) -> Result<(Arc<dyn ContactStore>, StatusNormalizer)> {
    let aliases = config.load_aliases()?;
    let normalizer = StatusNormalizer::new(Arc::clone(&store), Arc::new(aliases));
    normalizer
        .seed_defaults()
        .await
        .context("seeding default statuses")?;
    Ok((store, normalizer))
}
