//! foundry-bot: on-demand voice channels.
//!
//! Reads platform events as line-delimited JSON (stdin or --events) and
//! drives either the REST API or, with --simulate, an in-process platform.
//! Operator commands:
//!
//!   factory <name>   create a factory channel
//!   remove <name>    remove a factory and every channel it spawned
//!   factories        list factories
//!
//! Set FOUNDRY_LOG_JSON=1 for JSON logs.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use foundry_sdk::client::ResourceClient;
use foundry_sdk::rest::RestClient;
use foundry_sdk::sim::SimPlatform;
use tracing_subscriber::EnvFilter;

use foundry_bot::config::{Args, Backend, Settings};
use foundry_bot::orchestrator::Orchestrator;
use foundry_bot::{bot, source};

#[tokio::main]
async fn main() -> Result<()> {
    let json_logs = std::env::var("FOUNDRY_LOG_JSON").unwrap_or_default() == "1";
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "foundry_bot=info".into());
    if json_logs {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }

    let settings = Settings::resolve(Args::parse()).context("Invalid configuration")?;

    match settings.backend.clone() {
        Backend::Rest { token, api_base } => {
            let mut client = RestClient::new(token);
            if let Some(base) = api_base.as_deref() {
                client = client.with_base(base);
            }
            tracing::info!(api_base = api_base.as_deref().unwrap_or(foundry_sdk::rest::DEFAULT_API_BASE), "Starting foundry-bot");
            serve(Arc::new(client), settings).await
        }
        Backend::Simulated { latency } => {
            tracing::info!(latency_ms = latency.as_millis() as u64, "Starting foundry-bot against simulated platform");
            serve(Arc::new(SimPlatform::new().with_latency(latency)), settings).await
        }
    }
}

async fn serve<C: ResourceClient>(client: Arc<C>, settings: Settings) -> Result<()> {
    let orch = Orchestrator::new(client, settings.orchestrator.clone());
    let events = source::open(settings.events.as_deref()).await?;

    let stats = bot::run(orch.clone(), events).await;
    tracing::info!(
        joins_routed = stats.joins_routed,
        joins_ignored = stats.joins_ignored,
        commands = stats.commands,
        "Event loop finished"
    );
    for f in orch.list_factories() {
        tracing::info!(factory = %f.id, name = %f.name, children = f.children, "Factory at exit");
    }
    Ok(())
}
