//! Operator commands.
//!
//!   factory <name>   create a factory voice channel
//!   remove <name>    remove the first factory whose name starts with <name>,
//!                    deleting every channel it spawned
//!   factories        list factories and their child counts
//!
//! [`start`] parses and enqueues synchronously, then returns a future that
//! renders the one-line reply once the work is done.

use foundry_sdk::client::ResourceClient;
use foundry_sdk::event::CommandInvocation;
use futures::future::{BoxFuture, FutureExt};

use crate::error::OrchestratorError;
use crate::orchestrator::Orchestrator;

pub const USAGE: &str = "Commands: factory <name> | remove <name> | factories";

/// Parsed operator command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperatorCommand {
    CreateFactory { name: String },
    RemoveFactory { name: String },
    ListFactories,
}

impl OperatorCommand {
    /// `Err` carries the reply for a malformed or unknown command.
    pub fn parse(cmd: &CommandInvocation) -> Result<Self, String> {
        let name = || {
            cmd.option("name")
                .map(str::trim)
                .filter(|n| !n.is_empty())
                .map(str::to_string)
        };
        match cmd.name.to_lowercase().as_str() {
            "factory" => name()
                .map(|name| OperatorCommand::CreateFactory { name })
                .ok_or_else(|| "Usage: factory <name>".to_string()),
            "remove" => name()
                .map(|name| OperatorCommand::RemoveFactory { name })
                .ok_or_else(|| "Usage: remove <name> (case sensitive, removes child channels too)".to_string()),
            "factories" | "list" => Ok(OperatorCommand::ListFactories),
            _ => Err(USAGE.to_string()),
        }
    }
}

/// Start executing `cmd`. Queueing happens before this returns.
pub fn start<C: ResourceClient>(
    orch: &Orchestrator<C>,
    cmd: &CommandInvocation,
) -> BoxFuture<'static, String> {
    let parsed = match OperatorCommand::parse(cmd) {
        Ok(parsed) => parsed,
        Err(reply) => return futures::future::ready(reply).boxed(),
    };
    tracing::info!(command = ?parsed, context = %cmd.context, invoker = ?cmd.invoker, "Operator command");

    match parsed {
        OperatorCommand::CreateFactory { name } => match orch.submit_create(cmd.context, &name) {
            Ok(pending) => async move {
                match pending.await {
                    Ok(id) => format!("Factory \"{name}\" created ({id})"),
                    Err(e) => failure_reply(&e),
                }
            }
            .boxed(),
            Err(e) => futures::future::ready(failure_reply(&e)).boxed(),
        },
        OperatorCommand::RemoveFactory { name } => match orch.submit_removal(&name) {
            Ok(pending) => async move {
                match pending.await {
                    Ok(report) if report.is_clean() => format!(
                        "Removed \"{}\" and {} channel(s)",
                        report.name,
                        report.deleted.len().saturating_sub(1)
                    ),
                    Ok(report) => format!(
                        "Removed \"{}\"; {} channel(s) could not be deleted",
                        report.name,
                        report.failures.len()
                    ),
                    Err(e) => failure_reply(&e),
                }
            }
            .boxed(),
            Err(e) => futures::future::ready(failure_reply(&e)).boxed(),
        },
        OperatorCommand::ListFactories => {
            let factories = orch.list_factories();
            let reply = if factories.is_empty() {
                "No factories".to_string()
            } else {
                factories
                    .iter()
                    .map(|f| format!("{} ({} active)", f.name, f.children))
                    .collect::<Vec<_>>()
                    .join(", ")
            };
            futures::future::ready(reply).boxed()
        }
    }
}

fn failure_reply(e: &OrchestratorError) -> String {
    tracing::warn!(error = %e, "Command failed");
    match e {
        OrchestratorError::DuplicateFactory { name } => format!("A factory named \"{name}\" already exists"),
        OrchestratorError::FactoryNotFound { name } => format!("No factory matches \"{name}\""),
        other => format!("Failed: {other}"),
    }
}
