use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use clap::Parser;
use finance_assistant::{
    assistant::FinanceAssistant,
    config::{AssistantConfig, DEFAULT_LOG_FILTER},
    models::{RenderedSegment, ReplyStatus},
};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Ask the finance assistant a single question
#[derive(Debug, Parser)]
#[command(name = "assistant", version)]
struct Cli {
    /// The question to ask
    #[arg(required = true)]
    query: Vec<String>,

    /// Directory figures are written to
    #[arg(long, default_value = ".")]
    out_dir: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)))
        .init();

    let config = AssistantConfig::from_env()?;
    let assistant = FinanceAssistant::from_config(&config)?;

    let query = cli.query.join(" ");
    let reply = assistant.answer(&query).await;

    for notice in &reply.notices {
        eprintln!("{}", notice);
    }

    let mut figures = 0;
    for segment in &reply.segments {
        match segment {
            RenderedSegment::Markdown { content } => println!("{}\n", content),
            RenderedSegment::Figure { data, .. } => {
                figures += 1;
                let path = cli
                    .out_dir
                    .join(format!("figure-{}-{}.png", reply.query_id, figures));
                std::fs::write(&path, STANDARD.decode(data)?)?;
                info!(path = %path.display(), "Figure written");
                println!("[figure: {}]\n", path.display());
            }
            RenderedSegment::Error { message } => eprintln!("{}", message),
        }
    }

    if reply.status != ReplyStatus::Answered {
        std::process::exit(1);
    }

    Ok(())
}
