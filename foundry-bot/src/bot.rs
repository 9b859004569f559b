//! Event loop: routes platform events to the orchestrator.
//!
//! Each event is enqueued on its lane before the next one is read, so events
//! for one factory are handled in arrival order. Waiting for the outcome
//! happens on spawned tasks, so a slow factory never holds up the loop.

use foundry_sdk::client::ResourceClient;
use foundry_sdk::event::{Event, JoinEvent};
use tokio::sync::mpsc;
use tokio::task::JoinSet;

use crate::commands;
use crate::orchestrator::{JoinOutcome, Orchestrator, Pending};

/// Counters reported when the loop exits.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RunStats {
    pub joins_routed: usize,
    pub joins_ignored: usize,
    pub commands: usize,
}

/// Consume `events` until the source disconnects, then wait for in-flight
/// work to finish.
pub async fn run<C: ResourceClient>(orch: Orchestrator<C>, mut events: mpsc::Receiver<Event>) -> RunStats {
    let mut stats = RunStats::default();
    let mut in_flight = JoinSet::new();

    loop {
        match events.recv().await {
            Some(Event::Disconnected { reason }) => {
                tracing::info!(%reason, "Event source closed");
                break;
            }
            Some(event) => handle_event(&orch, event, &mut in_flight, &mut stats),
            None => {
                tracing::warn!("Event channel closed, exiting");
                break;
            }
        }
        // reap finished work so the set does not grow unbounded
        while in_flight.try_join_next().is_some() {}
    }

    tracing::info!(pending = in_flight.len(), "Waiting for in-flight work");
    while let Some(done) = in_flight.join_next().await {
        if let Err(e) = done {
            tracing::error!(error = %e, "Event task failed");
        }
    }
    stats
}

fn handle_event<C: ResourceClient>(
    orch: &Orchestrator<C>,
    event: Event,
    in_flight: &mut JoinSet<()>,
    stats: &mut RunStats,
) {
    match event {
        Event::Ready => tracing::info!("Ready"),

        Event::VoiceJoined(join) => match orch.submit_join(join) {
            Some(pending) => {
                stats.joins_routed += 1;
                in_flight.spawn(await_join(join, pending));
            }
            None => {
                stats.joins_ignored += 1;
                tracing::trace!(resource = %join.resource, "Join on non-factory channel");
            }
        },

        Event::VoiceLeft { member, context } => {
            tracing::trace!(%member, %context, "Member left voice");
        }

        Event::Command(cmd) => {
            stats.commands += 1;
            let reply = commands::start(orch, &cmd);
            let context = cmd.context;
            in_flight.spawn(async move {
                let reply = reply.await;
                tracing::info!(%context, %reply, "Command reply");
            });
        }

        Event::Disconnected { .. } => {}
    }
}

async fn await_join(join: JoinEvent, pending: Pending<JoinOutcome>) {
    match pending.await {
        Ok(JoinOutcome::Provisioned(p)) => {
            // the lane only waited for the move to be sent; this waits for the reply
            match p.relocation.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::warn!(member = %join.member, child = %p.child, error = %e, "Member left in factory"),
                Err(e) => tracing::error!(error = %e, "Relocation task failed"),
            }
        }
        Ok(JoinOutcome::NotAFactory) => {
            tracing::trace!(resource = %join.resource, "Join on non-factory channel");
        }
        Ok(JoinOutcome::FactoryGone) => {}
        Err(e) => tracing::error!(
            member = %join.member,
            factory = %join.resource,
            error = %e,
            "Provisioning failed"
        ),
    }
}
