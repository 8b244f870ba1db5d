//! # Awful News Scout
//!
//! Point it at a news site's front page and it writes its own scraper: an
//! LLM infers CSS selectors for the article list, you approve the result,
//! and the routine is saved per domain for the next visit. The extracted
//! headlines become a small embedding knowledge base you can question.
//!
//! ## Usage
//!
//! ```sh
//! LLM_API_KEY=... awful_news_scout run https://www.example-news.com -j ./json
//! awful_news_scout scrapers list
//! ```
//!
//! ## Architecture
//!
//! 1. **Fetching**: plain HTTP or a headless browser render
//! 2. **Inference**: three narrowing model calls from raw HTML to a routine
//! 3. **Approval**: test-run, edit or discard before anything is saved
//! 4. **Extraction**: the saved routine runs without any model call
//! 5. **Q&A**: questions are routed to a whole-corpus summary or to a
//!    similarity search over the embedded articles

use clap::Parser;
use std::error::Error;
use tracing::{debug, error, info, instrument};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod answer;
mod api;
mod cli;
mod config;
mod error;
mod executor;
mod fetch;
mod html;
mod knowledge;
mod models;
mod outputs;
mod pipeline;
mod registry;
mod repl;
mod sanitize;
mod session;
mod utils;

use api::{ChatClient, EmbeddingClient};
use cli::{Cli, Command, ScrapersCommand};
use config::AppConfig;
use error::ProviderError;
use fetch::PageFetcher;
use registry::ScraperRegistry;
use session::Scout;
use utils::ensure_writable_dir;

#[tokio::main]
#[instrument]
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

    let args = Cli::parse();
    debug!(?args.config, "Parsed CLI arguments");

    let config = AppConfig::load(args.config.as_deref())?;
    let registry = ScraperRegistry::new(&config.registry_path);

    match args.command {
        Command::Scrapers(cmd) => manage_scrapers(&registry, cmd)?,
        Command::Run(run) => {
            if let Some(dir) = &run.json_output_dir {
                if let Err(e) = ensure_writable_dir(dir).await {
                    error!(path = %dir, error = %e, "JSON output directory is not writable");
                    return Err(e);
                }
            }

            let api_key = args.api_key.ok_or(ProviderError::MissingApiKey)?;
            let scout = Scout {
                model: ChatClient::new(&config.llm, &api_key)?,
                embedder: EmbeddingClient::new(&config, &api_key)?,
                fetcher: PageFetcher::new(&config.fetch)?,
                registry,
                config,
            };
            info!(
                model = %scout.config.llm.model,
                registry = %scout.registry.path().display(),
                "awful_news_scout starting up"
            );
            repl::run_session(&scout, &run).await?;
        }
    }

    Ok(())
}

fn manage_scrapers(registry: &ScraperRegistry, cmd: ScrapersCommand) -> Result<(), Box<dyn Error>> {
    match cmd {
        ScrapersCommand::List => {
            let scrapers = registry.load();
            if scrapers.is_empty() {
                println!("No saved scrapers in {}", registry.path().display());
            }
            for domain in scrapers.keys() {
                println!("{domain}");
            }
        }
        ScrapersCommand::Show { domain } => match registry.get(&domain) {
            Some(routine) => println!("{routine}"),
            None => return Err(format!("no saved scraper for {domain}").into()),
        },
        ScrapersCommand::Remove { domain } => {
            if registry.remove(&domain)? {
                info!(%domain, "Removed saved scraper");
                println!("Removed scraper for {domain}");
            } else {
                println!("No saved scraper for {domain}");
            }
        }
    }
    Ok(())
}
