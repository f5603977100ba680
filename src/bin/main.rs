use car_recommender::{
    logger, AppConfig, CompletionClient, ListingStore, NewListing, Recommender, SqliteListingStore,
};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "recommender")]
#[command(about = "Rank stored used-car listings against buyer criteria")]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Load scraped listings from a JSON array into the store
    Import {
        /// JSON file holding an array of listings
        file: PathBuf,
    },
    /// Print recommendations for the given criteria
    Recommend {
        /// Criteria as a JSON object, e.g. '{"make": "Honda", "max_price": 20000}'
        #[arg(short, long)]
        criteria: Option<String>,

        /// Number of recommendations to print
        #[arg(short, long, default_value_t = car_recommender::recommender::DEFAULT_LIMIT)]
        limit: usize,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    logger::init_logger(cli.verbose);

    let config = AppConfig::from_env();
    let store = Arc::new(SqliteListingStore::connect(&config.database_path).await?);

    match cli.command {
        Command::Import { file } => {
            let raw = tokio::fs::read_to_string(&file).await?;
            let listings: Vec<NewListing> = serde_json::from_str(&raw)?;
            let total = listings.len();

            let inserted = store.add_listings(listings).await?;
            info!(total, inserted, "Import finished");
            println!("Imported {} new listings ({} already stored)", inserted, total - inserted);
        }
        Command::Recommend { criteria, limit } => {
            let completion = CompletionClient::from_config(&config.llm);
            if !completion.is_available() {
                error!("No LLM provider available; only analyzed listings can be recommended");
            }

            let recommender = Recommender::new(store, Arc::new(completion))
                .with_min_interval(config.analysis_min_interval);

            let recommendations = recommender
                .get_recommendations(criteria.as_deref(), limit)
                .await;

            if recommendations.is_empty() {
                println!("No recommendations found.");
            }

            for (idx, listing) in recommendations.iter().enumerate() {
                println!("{}. {}", idx + 1, listing);
                if let Some(analysis) = &listing.analysis {
                    println!("{}\n", analysis);
                }
            }
        }
    }

    Ok(())
}
