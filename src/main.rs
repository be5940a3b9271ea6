mod cli;

use anyhow::Result;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use cli::{Cli, Commands};
use subtitle_catalog::config::ScraperConfig;
use subtitle_catalog::Catalog;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("subtitle_catalog=info".parse()?))
        .init();

    let cli = Cli::parse();
    let mut config = ScraperConfig::load(cli.config.as_deref())?;
    if let Commands::Crawl { max_pages: Some(n) } = &cli.command {
        config.max_pages = *n;
    }
    let catalog = Catalog::open(config).await?;

    match cli.command {
        Commands::Crawl { .. } => {
            let cancel = CancellationToken::new();
            let on_signal = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("interrupt received; stopping after the current page");
                    on_signal.cancel();
                }
            });
            let stats = catalog.crawl(cancel).await?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
        Commands::Get { unique_id } => match catalog.get(&unique_id).await? {
            Some(record) => println!("{}", serde_json::to_string_pretty(&record)?),
            None => anyhow::bail!("no record with id {unique_id}"),
        },
        Commands::Search { query, limit } => {
            for record in catalog.search(&query, limit).await? {
                println!("{}", serde_json::to_string(&record)?);
            }
        }
        Commands::Seasons { series_name } => {
            let seasons = catalog.seasons(&series_name).await?;
            if seasons.is_empty() {
                info!(series = %series_name, "no seasons catalogued");
            }
            for r in seasons {
                println!(
                    "{}\tS{}\t{}\t{}",
                    r.unique_id,
                    r.season_number.unwrap_or(1),
                    r.title,
                    r.download_url.as_deref().unwrap_or("-")
                );
            }
        }
        Commands::Aggregate => {
            let touched = catalog.aggregate().await?;
            println!("updated total_seasons on {touched} records");
        }
    }
    Ok(())
}
