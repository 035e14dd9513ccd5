//! # Daily Digest
//!
//! Aggregates three kinds of sources into flat JSON collections and lets a
//! single user browse them with read tracking.
//!
//! ## Features
//!
//! - Social link-aggregator communities, fetched through a JSON, HTML and
//!   Atom fallback chain, ranked by month and by year
//! - A blog's daily reading list of outbound links
//! - RSS news feeds sorted into keyword categories
//! - Deduplicating merge into per-source collections with atomic writes
//! - A persisted read-set and favourites, surviving format changes
//! - A terminal dashboard with optional Markdown and JSON exports
//!
//! ## Usage
//!
//! ```sh
//! daily_digest -d ./data scrape all
//! daily_digest -d ./data dashboard --markdown digest.md
//! daily_digest -d ./data read mark abc123 dsr_3912
//! ```
//!
//! ## Architecture
//!
//! The application follows a pipeline architecture:
//! 1. **Fetching**: Source adapters download listings, pages and feeds
//! 2. **Normalizing**: Raw items become persisted rows with stable ids
//! 3. **Merging**: New rows are appended to the on-disk collections
//! 4. **Presenting**: The dashboard reads the collections and the read-set

use chrono::Local;
use clap::Parser;
use std::error::Error;
use tracing::{debug, error, info, instrument, warn};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod cli;
mod config;
mod dashboard;
mod error;
mod models;
mod normalize;
mod outputs;
mod read_tracker;
mod scrapers;
mod store;
mod utils;

use cli::{Cli, Command, DashboardArgs, MarkerCommand, ScrapeTarget};
use config::{AppConfig, load_config};
use dashboard::Session;
use outputs::{json, markdown};
use read_tracker::{Favorites, ReadTracker};
use scrapers::http::HttpClient;
use store::Store;
use utils::ensure_writable_dir;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_writer(std::io::stderr)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();
    info!("daily_digest starting up");

    // Parse CLI
    let args = Cli::parse();
    debug!(data_dir = %args.data_dir.display(), config = ?args.config, "Parsed CLI arguments");

    let config = load_config(args.config.as_deref())?;

    // Early check: ensure the data dir is writable
    if let Err(e) = ensure_writable_dir(&args.data_dir) {
        error!(
            path = %args.data_dir.display(),
            error = %e,
            "Data directory is not writable (fix perms or choose a different path)"
        );
        return Err(e);
    }
    let store = Store::new(&args.data_dir);

    match args.command {
        Command::Scrape(target) => scrape(target, &config, &store).await?,
        Command::Dashboard(opts) => show_dashboard(&opts, &config, &store)?,
        Command::Read(cmd) => read_command(cmd, &store)?,
        Command::Fav(cmd) => fav_command(cmd, &store)?,
    }

    let elapsed = start_time.elapsed();
    info!(
        ?elapsed,
        secs = elapsed.as_secs(),
        millis = elapsed.subsec_millis(),
        "Execution complete"
    );
    Ok(())
}

/// Run the selected adapters in order: social, news, blog.
#[instrument(level = "info", skip_all)]
async fn scrape(target: ScrapeTarget, config: &AppConfig, store: &Store) -> Result<(), Box<dyn Error>> {
    let http = HttpClient::new(&config.http)?;
    let (social, news, blog) = match target {
        ScrapeTarget::Social(args) => (Some(args), false, false),
        ScrapeTarget::News => (None, true, false),
        ScrapeTarget::Blog => (None, false, true),
        ScrapeTarget::All(args) => (Some(args), true, true),
    };

    if let Some(args) = social {
        let report =
            scrapers::social::run(&http, store, &config.social, args.window.windows(), &args.sources).await?;
        println!("social: {report}");
    }
    if news {
        let report = scrapers::news::run(&http, store, &config.news).await?;
        println!("news: {report}");
    }
    if blog {
        let report = scrapers::blog::run(&http, store, &config.blog).await?;
        println!("blog: {report}");
    }
    Ok(())
}

fn show_dashboard(opts: &DashboardArgs, config: &AppConfig, store: &Store) -> Result<(), Box<dyn Error>> {
    let session = Session::open(store)?;
    let view = opts.view(config.dashboard.row_limit);
    let dash = dashboard::build(dashboard::load_all(store), &session, &view);
    print!("{}", dashboard::render_text(&dash));

    let generated = Local::now().format("%Y-%m-%d %H:%M").to_string();
    if let Some(path) = &opts.markdown {
        markdown::write_report(&dash, path, &generated)?;
    }
    if let Some(path) = &opts.json {
        json::write_snapshot(&dash, &config.news.categories, path)?;
    }
    Ok(())
}

fn read_command(cmd: MarkerCommand, store: &Store) -> Result<(), Box<dyn Error>> {
    let mut read = ReadTracker::load(&store.read_set_path())?;
    match cmd {
        MarkerCommand::Mark { keys } => {
            for key in keys {
                if !read.mark_read(&key)? {
                    warn!(%key, "Already marked as read");
                }
            }
        }
        MarkerCommand::Unmark { keys } => {
            for key in keys {
                if !read.mark_unread(&key)? {
                    warn!(%key, "Was not marked as read");
                }
            }
        }
        MarkerCommand::Clear => {
            let dropped = read.clear_all()?;
            println!("cleared {dropped} read keys");
        }
        MarkerCommand::List => {
            if read.is_empty() {
                info!("Read set is empty");
            }
            for key in read.keys() {
                println!("{key}");
            }
            debug!(count = read.len(), "Listed read keys");
        }
    }
    Ok(())
}

fn fav_command(cmd: MarkerCommand, store: &Store) -> Result<(), Box<dyn Error>> {
    let mut favs = Favorites::load(&store.favorites_path())?;
    match cmd {
        MarkerCommand::Mark { keys } => {
            for key in keys {
                if !favs.add(&key)? {
                    warn!(%key, "Already a favourite");
                }
            }
        }
        MarkerCommand::Unmark { keys } => {
            for key in keys {
                if !favs.remove(&key)? {
                    warn!(%key, "Was not a favourite");
                }
            }
        }
        MarkerCommand::Clear => {
            let dropped = favs.clear_all()?;
            println!("cleared {dropped} favourites");
        }
        MarkerCommand::List => {
            for key in favs.keys() {
                println!("{key}");
            }
        }
    }
    Ok(())
}
