//! Inline Popup Blocker CLI
//!
//! Offline harness for the blocking engine: replays JSON page fixtures and
//! inspects or edits the site store.

mod simulate;
mod store;

use std::fs;
use std::time::Instant;

use clap::{Parser, Subcommand};
use log::LevelFilter;

use ipb_core::cache::split_rules;
use ipb_core::dom::PageFixture;
use ipb_core::{EngineConfig, KeyValueStore, MemoryStore};

use crate::store::FileStore;

#[derive(Parser)]
#[command(name = "ipb-cli")]
#[command(about = "Inline Popup Blocker fixture harness and site-store tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the engine against a page fixture
    Scan {
        /// Page fixture (JSON)
        #[arg(short, long)]
        fixture: String,

        /// Configuration table (JSON); defaults apply when omitted
        #[arg(short, long)]
        config: Option<String>,

        /// Site store file; an in-memory store is used when omitted
        #[arg(short, long)]
        store: Option<String>,

        /// Log scheduler decisions and skipped candidates
        #[arg(short, long)]
        verbose: bool,
    },

    /// Print the cached rules for a host
    Cache {
        #[arg(short, long)]
        store: String,

        #[arg(long)]
        host: String,
    },

    /// Disable blocking on a host
    Ignore {
        #[arg(short, long)]
        store: String,

        #[arg(long)]
        host: String,
    },

    /// Re-enable blocking on a host
    Unignore {
        #[arg(short, long)]
        store: String,

        #[arg(long)]
        host: String,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Scan {
            fixture,
            config,
            store,
            verbose,
        } => cmd_scan(&fixture, config.as_deref(), store.as_deref(), verbose).await,
        Commands::Cache { store, host } => cmd_cache(&store, &host).await,
        Commands::Ignore { store, host } => cmd_set_ignored(&store, &host, true).await,
        Commands::Unignore { store, host } => cmd_set_ignored(&store, &host, false).await,
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn init_logging(level: LevelFilter) {
    env_logger::Builder::new()
        .filter_level(level)
        .format_timestamp(None)
        .init();
}

fn load_config(path: Option<&str>) -> Result<EngineConfig, String> {
    let Some(path) = path else {
        return Ok(EngineConfig::default());
    };
    let text = fs::read_to_string(path).map_err(|e| format!("Failed to read '{}': {}", path, e))?;
    EngineConfig::from_json(&text).map_err(|e| format!("Invalid config '{}': {}", path, e))
}

async fn cmd_scan(fixture: &str, config: Option<&str>, store: Option<&str>, verbose: bool) -> Result<(), String> {
    let config = load_config(config)?;
    init_logging(if verbose { LevelFilter::Debug } else { config.log_level() });

    let text = fs::read_to_string(fixture).map_err(|e| format!("Failed to read '{}': {}", fixture, e))?;
    let page: PageFixture = serde_json::from_str(&text).map_err(|e| format!("Invalid fixture '{}': {}", fixture, e))?;

    match store {
        Some(path) => scan_with(&page, config, &FileStore::new(path)).await,
        None => scan_with(&page, config, &MemoryStore::new()).await,
    }
}

async fn scan_with<S: KeyValueStore>(page: &PageFixture, config: EngineConfig, store: &S) -> Result<(), String> {
    let start = Instant::now();
    let report = simulate::run(page, config, store)
        .await
        .map_err(|e| format!("Engine did not start: {}", e))?;

    let Some(report) = report else {
        println!("{} is on the ignore list; nothing to do", page.host);
        return Ok(());
    };

    println!("Scanned '{}' ({} timed mutations)", page.host, page.mutations.len());
    println!("  Rules:      {}", report.rules.len());
    println!("  Blocked:    {}", report.blocked);
    println!("  Cached:     {}", report.cached);
    println!("  Quiet at:   {}ms (virtual)", report.finished_at);
    println!("  Time:       {:.1}ms", start.elapsed().as_secs_f64() * 1000.0);
    println!();

    for rule in &report.rules {
        println!("{rule}");
    }

    let site = simulate::site_for(&page.host);
    if let Some(record) = site.load(store).await.map_err(|e| e.to_string())? {
        println!();
        println!("Site record '{}':", site.cache_key());
        println!("{}", serde_json::to_string_pretty(&record).map_err(|e| e.to_string())?);
    }

    Ok(())
}

async fn cmd_cache(store: &str, host: &str) -> Result<(), String> {
    let store = FileStore::new(store);
    let site = simulate::site_for(host);

    let ignored = site.is_ignored(&store).await.map_err(|e| e.to_string())?;
    println!("Host:     {}", host);
    println!("Ignored:  {}", ignored);

    match site.load(&store).await.map_err(|e| e.to_string())? {
        Some(record) if !record.css_rules.trim().is_empty() => {
            println!("Rules:");
            for rule in split_rules(&record.css_rules) {
                println!("  {rule}");
            }
        }
        _ => println!("Rules:    (none)"),
    }

    Ok(())
}

async fn cmd_set_ignored(store: &str, host: &str, ignored: bool) -> Result<(), String> {
    let store = FileStore::new(store);
    let site = simulate::site_for(host);
    site.set_ignored(&store, ignored)
        .await
        .map_err(|e| e.to_string())?;

    if ignored {
        println!("Blocking disabled on {}", site.hostname());
    } else {
        println!("Blocking enabled on {}", site.hostname());
    }
    Ok(())
}
