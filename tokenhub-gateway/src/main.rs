//! # TokenHub Gateway (reference binary)
//!
//! Loads a [`tokenhub_gateway::config::GatewayConfig`], wires its providers
//! and models into a `tokenhub_router::engine::TokenHubRouter`, routes one
//! prompt given on the command line, and prints the chosen model and raw
//! provider response. There is no HTTP server here — transport is out of
//! scope for the engine this binary wires up; this is a worked example of
//! the embedding contract, not a gateway product.
//!
//! ## Usage
//!
//! ```bash
//! tokenhub-gateway --config gateway.toml "What's the capital of France?"
//! ```
//!
//! ## Configuration
//!
//! `gateway.toml` lists `[[providers]]` (id, api_key, optional base_url) and
//! `[[models]]` (id, provider_id, weight, max_context_tokens, prices). See
//! [`tokenhub_gateway::config::GatewayConfig`]. Any field can be overridden
//! with a `TOKENHUB__`-prefixed environment variable.

use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tokenhub_gateway::adapter::OpenAiCompatibleProvider;
use tokenhub_gateway::config::GatewayConfig;
use tokenhub_router::engine::TokenHubRouter;
use tokenhub_router::models::{Message, Policy, Request};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the TOML configuration file listing providers and models.
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Logging level: trace, debug, info, warn, error.
    #[arg(long, default_value = "info")]
    log_level: String,

    /// The prompt to route.
    prompt: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(&args.log_level)
        .init();

    let config = GatewayConfig::load(&args.config)?;
    let router = Arc::new(
        TokenHubRouter::builder()
            .with_config(config.engine.clone())
            .build(),
    );

    for provider in &config.providers {
        let adapter = OpenAiCompatibleProvider::new(
            provider.id.clone(),
            provider.base_url_or_default().to_string(),
            provider.api_key.clone(),
        );
        router.catalog().register_adapter(Arc::new(adapter)).await;
    }
    for model in &config.models {
        router.catalog().register_model(model.clone()).await;
    }

    router.start().await;

    let request = Request {
        messages: vec![Message::user(args.prompt.clone())],
        ..Default::default()
    };
    let result = router
        .route_with_directives("cli-request", &request, &Policy::default(), Duration::from_secs(30))
        .await;

    router.stop().await;

    let outcome = result?;
    tracing::info!(
        model = %outcome.decision.model_id,
        provider = %outcome.decision.provider_id,
        reason = %outcome.decision.reason,
        "routed"
    );
    println!("{}", tokenhub_router::orchestrator::extract_content(&outcome.response));

    Ok(())
}
