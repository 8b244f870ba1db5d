//! Command-line interface definitions for Awful News Scout.
//!
//! Arguments can be given as flags; the API key can also come from the
//! environment.

use crate::fetch::FetchMode;
use clap::{Args, Parser, Subcommand};

/// Command-line arguments for Awful News Scout.
///
/// # Examples
///
/// ```sh
/// # Scrape a front page, prompting for approval of a new routine
/// awful_news_scout run https://www.example-news.com --mode rendered
///
/// # Inspect saved routines
/// awful_news_scout scrapers list
/// awful_news_scout scrapers show www.example-news.com
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Optional path to config.yaml file
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// API key for the LLM and embedding provider
    #[arg(long, env = "LLM_API_KEY", global = true, hide_env_values = true)]
    pub api_key: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Scrape a news site and ask questions about its articles
    Run(RunArgs),

    /// Manage saved scrapers
    #[command(subcommand)]
    Scrapers(ScrapersCommand),
}

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Front page URL (prompted for when omitted)
    pub url: Option<String>,

    /// How to fetch the page
    #[arg(short, long, value_enum, default_value_t = FetchMode::Simple)]
    pub mode: FetchMode,

    /// Ignore any saved scraper and generate a new one
    #[arg(short, long)]
    pub force_regenerate: bool,

    /// Output directory for extracted records and transcripts
    #[arg(short, long)]
    pub json_output_dir: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum ScrapersCommand {
    /// List domains with a saved scraper
    List,
    /// Print the saved scraper for a domain
    Show { domain: String },
    /// Delete the saved scraper for a domain
    Remove { domain: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_run_parsing() {
        let cli = Cli::parse_from([
            "awful_news_scout",
            "run",
            "https://www.varzesh3.com",
            "--mode",
            "rendered",
            "--force-regenerate",
            "--json-output-dir",
            "./json",
        ]);

        let Command::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.url.as_deref(), Some("https://www.varzesh3.com"));
        assert_eq!(args.mode, FetchMode::Rendered);
        assert!(args.force_regenerate);
        assert_eq!(args.json_output_dir.as_deref(), Some("./json"));
    }

    #[test]
    fn test_cli_run_defaults() {
        let cli = Cli::parse_from(["awful_news_scout", "run"]);
        let Command::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert!(args.url.is_none());
        assert_eq!(args.mode, FetchMode::Simple);
        assert!(!args.force_regenerate);
    }

    #[test]
    fn test_cli_short_flags() {
        let cli = Cli::parse_from([
            "awful_news_scout",
            "run",
            "-m",
            "rendered",
            "-j",
            "/tmp/json",
            "-c",
            "/tmp/config.yaml",
        ]);
        assert_eq!(cli.config.as_deref(), Some("/tmp/config.yaml"));
        let Command::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.json_output_dir.as_deref(), Some("/tmp/json"));
    }

    #[test]
    fn test_cli_scrapers_subcommands() {
        let cli = Cli::parse_from(["awful_news_scout", "scrapers", "show", "www.bbc.com"]);
        assert!(matches!(
            cli.command,
            Command::Scrapers(ScrapersCommand::Show { ref domain }) if domain == "www.bbc.com"
        ));

        let cli = Cli::parse_from(["awful_news_scout", "scrapers", "list"]);
        assert!(matches!(cli.command, Command::Scrapers(ScrapersCommand::List)));
    }
}
