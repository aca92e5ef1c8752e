use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use enrichment_skill::completion::CompletionClient;
use enrichment_skill::queue::ServiceBusQueue;
use enrichment_skill::search::IndexPublisher;
use enrichment_skill::worker::{self, GenerationStage, MessageHandler, PublishStage};
use enrichment_skill::{config, logging};
use std::sync::Arc;

#[derive(Parser)]
#[command(
    name = "enrichment-worker",
    about = "Queue consumers that generate enrichment output and merge it into the search index"
)]
struct Cli {
    #[command(subcommand)]
    stage: Stage,
}

#[derive(Subcommand)]
enum Stage {
    /// Consume the request queue, call the generation backend, forward results.
    Generate,
    /// Consume the results queue and merge each result into the search index.
    Publish,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    config::init_config();
    logging::init_tracing();

    let config = config::get_config();
    let queue = Arc::new(
        ServiceBusQueue::from_connection_string(&config.queue.connection_string)
            .context("configuring Service Bus transport")?,
    );

    let (source, handler): (&str, Box<dyn MessageHandler>) = match cli.stage {
        Stage::Generate => {
            let completion = CompletionClient::from_settings(config.completion()?)
                .context("configuring generation backend")?;
            let stage = GenerationStage::new(
                completion,
                queue.clone(),
                config.queue.results_queue.clone(),
            );
            (config.queue.request_queue.as_str(), Box::new(stage) as Box<dyn MessageHandler>)
        }
        Stage::Publish => {
            let publisher = IndexPublisher::from_settings(config.search()?)
                .context("configuring search index client")?;
            (
                config.queue.results_queue.as_str(),
                Box::new(PublishStage::new(publisher)) as Box<dyn MessageHandler>,
            )
        }
    };

    worker::run(&*queue, source, &*handler, shutdown_signal()).await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %error, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
