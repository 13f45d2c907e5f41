mod crawl;
mod error;
mod extract;
mod fetch;
mod progress;
mod seeds;
mod store;

use std::path::PathBuf;
use std::time::Instant;

use clap::{Parser, Subcommand};

use crawl::StagePlan;
use extract::ScrapeRules;
use fetch::HttpFetcher;
use store::DocumentStore;

#[derive(Parser)]
#[command(name = "plants_scraper", about = "USDA PLANTS profile scraper")]
struct Cli {
    /// Progress state file
    #[arg(long, default_value = "data/progress.json")]
    progress: PathBuf,

    /// Output directory for per-plant JSON documents
    #[arg(long, default_value = "data/json")]
    out_dir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Read the seed CSV and populate the progress file
    Init {
        /// Seed CSV with an AcceptedSymbol column
        #[arg(default_value = "data/names.csv")]
        seeds: PathBuf,
    },
    /// Scrape characteristics pages for pending plants
    Scrape {
        /// Max plants to process (default: all pending)
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },
    /// Scrape general information for plants with characteristics data
    Secondary {
        /// Max plants to process (default: all pending)
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },
    /// Both stages in one pass, each plant finished before the next
    Run {
        /// Max plants to process
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },
    /// Show crawl statistics
    Stats,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();

    let result = match &cli.command {
        Commands::Init { seeds } => {
            let symbols = seeds::load_symbols(seeds)?;
            let mut catalog = progress::load_or_default(&cli.progress)?;
            let inserted = progress::seed(&mut catalog, &symbols);
            progress::save(&cli.progress, &catalog)?;
            println!(
                "Initialized {} with {} new symbols ({} total)",
                cli.progress.display(),
                inserted,
                catalog.len()
            );
            Ok(())
        }
        Commands::Scrape { limit } => run_stages(&cli, StagePlan::Primary, *limit).await,
        Commands::Secondary { limit } => run_stages(&cli, StagePlan::Secondary, *limit).await,
        Commands::Run { limit } => run_stages(&cli, StagePlan::Both, *limit).await,
        Commands::Stats => {
            let catalog = progress::load(&cli.progress)?;
            let s = progress::stats(&catalog);
            println!("Total:          {}", s.total);
            println!("Scraped:        {}", s.done);
            println!("Pending:        {}", s.total - s.done);
            println!("With data:      {}", s.with_data);
            println!("Secondary done: {}", s.secondary_done);
            println!("Secondary left: {}", s.with_data.saturating_sub(s.secondary_done));
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

async fn run_stages(cli: &Cli, plan: StagePlan, limit: Option<usize>) -> anyhow::Result<()> {
    if !cli.progress.exists() {
        println!("No progress file at {}. Run 'init' first.", cli.progress.display());
        return Ok(());
    }
    let mut catalog = progress::load(&cli.progress)?;

    let fetcher = HttpFetcher::new()?;
    let store = DocumentStore::new(&cli.out_dir);
    let rules = ScrapeRules::default();

    let stats = crawl::run_crawl(
        &fetcher,
        &store,
        &rules,
        &mut catalog,
        &cli.progress,
        plan,
        limit,
    )
    .await?;

    if stats.processed == 0 {
        println!("Nothing to do. Run 'init' first or all plants are scraped.");
    } else {
        println!(
            "Done: {} plants processed ({} with data, {} without, {} merged).",
            stats.processed, stats.with_data, stats.no_data, stats.merged
        );
    }
    Ok(())
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
