use finance_assistant::{
    api::start_server,
    assistant::FinanceAssistant,
    config::{AssistantConfig, DEFAULT_LOG_FILTER},
};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables
    dotenv::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)))
        .init();

    let config = AssistantConfig::from_env()?;

    info!("Finance Assistant - API Server");
    info!("Port: {}", config.port);

    let assistant = Arc::new(FinanceAssistant::from_config(&config)?);

    info!("Assistant initialized");
    info!("Starting API server...");

    start_server(assistant, config.port).await?;

    Ok(())
}
