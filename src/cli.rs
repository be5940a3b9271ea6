use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Subtitle release catalog: crawl the site and query what was collected
#[derive(Parser)]
#[command(name = "subcat")]
#[command(about = "Crawl subtitle releases into a local catalog and query it", long_about = None)]
pub struct Cli {
    /// TOML configuration file (overrides SUBCAT_CONFIG)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Walk the listing pages and upsert every release found
    Crawl {
        /// Stop after this many listing pages
        #[arg(long)]
        max_pages: Option<usize>,
    },
    /// Print one record as JSON
    Get {
        unique_id: String,
    },
    /// Substring search over titles and series names, one JSON record per line
    Search {
        query: String,
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
    },
    /// List the catalogued seasons of a series
    Seasons {
        series_name: String,
    },
    /// Recompute total season counts for every series
    Aggregate,
}
