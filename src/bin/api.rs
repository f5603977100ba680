use car_recommender::{
    api::start_server, logger, AppConfig, CompletionClient, Recommender, SqliteListingStore,
};
use std::sync::Arc;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    logger::init_logger(false);

    let config = AppConfig::from_env();

    if !config.web_ui.enabled {
        info!("Web UI disabled (WEB_UI_ENABLED=false), not starting API server");
        return Ok(());
    }

    info!("🚗 Car Recommender - API Server");
    info!("📍 {}:{}", config.web_ui.host, config.web_ui.port);

    let store = SqliteListingStore::connect(&config.database_path).await?;
    info!(path = %config.database_path, "Listing store ready");

    let completion = CompletionClient::from_config(&config.llm);
    if !completion.is_available() {
        warn!("No LLM provider available; new listings will not be analyzed");
    }

    let recommender = Arc::new(
        Recommender::new(Arc::new(store), Arc::new(completion))
            .with_min_interval(config.analysis_min_interval),
    );

    info!("📡 Starting API server...");

    start_server(recommender, &config.web_ui.host, config.web_ui.port).await?;

    Ok(())
}
