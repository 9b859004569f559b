//! Factory orchestrator: provisioning on join, cascading teardown on removal.
//!
//! Every workflow that touches a factory runs on that factory's lane, so a
//! factory sees at most one provisioning or teardown at a time while other
//! factories proceed in parallel. Factory creation runs on a single catalog
//! lane so name checks cannot race each other.
//!
//! The `submit_*` methods enqueue synchronously and hand back a pending
//! result; the event loop uses them to keep per-factory arrival order. The
//! `async` counterparts enqueue and wait.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::task::{Context, Poll};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, FutureExt};
use foundry_sdk::client::{RemoteError, ResourceClient};
use foundry_sdk::event::JoinEvent;
use foundry_sdk::types::{ContextId, ResourceId, ResourceKind};
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::error::{OrchestratorError, RemoteOp, Result};
use crate::registry::{self, Factory, Registry};
use crate::sequencer::{Sequencer, Ticket};

/// Outcome of queued work, resolved once its lane has run it.
pub type Pending<T> = BoxFuture<'static, Result<T>>;

/// Orchestrator tuning.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Upper bound on any single remote call.
    pub remote_timeout: Duration,
    /// Fetch the factory's current remote name before naming a child.
    pub refresh_names: bool,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            remote_timeout: Duration::from_secs(10),
            refresh_names: true,
        }
    }
}

/// Sequencer lanes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LaneKey {
    Factory(ResourceId),
    Catalog,
}

/// A child created for a join.
#[derive(Debug)]
pub struct Provisioned {
    pub factory: ResourceId,
    pub child: ResourceId,
    pub name: String,
    pub index: usize,
    /// Relocation of the joining member. The move has been sent by the time
    /// the lane moves on; the lane does not wait for the reply, callers may.
    pub relocation: JoinHandle<Result<()>>,
}

#[derive(Debug)]
pub enum JoinOutcome {
    /// The joined resource is not a factory.
    NotAFactory,
    /// The factory was torn down while the event was queued.
    FactoryGone,
    Provisioned(Provisioned),
}

/// What a teardown removed and what it could not.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TeardownReport {
    pub factory: ResourceId,
    pub name: String,
    /// Resources confirmed deleted (or already gone), children first.
    pub deleted: Vec<ResourceId>,
    pub failures: Vec<OrchestratorError>,
}

impl TeardownReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// One row of the factory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FactorySummary {
    pub id: ResourceId,
    pub name: String,
    pub children: usize,
    pub created_at: DateTime<Utc>,
}

impl From<&Factory> for FactorySummary {
    fn from(f: &Factory) -> Self {
        Self {
            id: f.id,
            name: f.name.clone(),
            children: f.children.len(),
            created_at: f.created_at,
        }
    }
}

struct Inner<C> {
    client: Arc<C>,
    registry: Mutex<Registry>,
    lanes: Sequencer<LaneKey>,
    creating: Arc<AtomicUsize>,
    config: OrchestratorConfig,
}

pub struct Orchestrator<C> {
    inner: Arc<Inner<C>>,
}

impl<C> Clone for Orchestrator<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C: ResourceClient> Orchestrator<C> {
    pub fn new(client: Arc<C>, config: OrchestratorConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                client,
                registry: Mutex::new(Registry::new()),
                lanes: Sequencer::new(),
                creating: Arc::new(AtomicUsize::new(0)),
                config,
            }),
        }
    }

    pub fn client(&self) -> &Arc<C> {
        &self.inner.client
    }

    /// Queue provisioning for a join. `None` if the target is not a factory.
    ///
    /// A join on an unknown resource while a factory creation is in flight is
    /// parked behind it on the catalog lane, since it may target the factory
    /// being created.
    pub fn submit_join(&self, event: JoinEvent) -> Option<Pending<JoinOutcome>> {
        if let Some(ticket) = self.enqueue_join(event) {
            return Some(settle(ticket));
        }
        if !self.creation_in_flight() {
            return None;
        }
        let this = self.clone();
        let parked = self
            .inner
            .lanes
            .submit(LaneKey::Catalog, async move { this.enqueue_join(event) });
        Some(parked_join(parked).boxed())
    }

    /// Provision a child for `event` and start relocating the member into it.
    pub async fn handle_join(&self, event: JoinEvent) -> Result<JoinOutcome> {
        match self.submit_join(event) {
            Some(pending) => pending.await,
            None => Ok(JoinOutcome::NotAFactory),
        }
    }

    /// Queue creation of a factory named `name` in `context`.
    pub fn submit_create(&self, context: ContextId, name: &str) -> Result<Pending<ResourceId>> {
        let name = name.trim();
        if name.is_empty() {
            return Err(OrchestratorError::InvalidName(name.to_string()));
        }
        let inner = Arc::clone(&self.inner);
        let name = name.to_string();
        let guard = InFlight::enter(&self.inner.creating);
        Ok(settle(self.inner.lanes.submit(LaneKey::Catalog, async move {
            let _guard = guard;
            inner.create_factory(context, name).await
        })))
    }

    pub async fn create_factory(&self, context: ContextId, name: &str) -> Result<ResourceId> {
        self.submit_create(context, name)?.await
    }

    /// Resolve `name` and queue teardown of the matching factory.
    ///
    /// As with joins, resolution waits for in-flight factory creations
    /// rather than failing while one is pending.
    pub fn submit_removal(&self, name: &str) -> Result<Pending<TeardownReport>> {
        match self.enqueue_removal(name) {
            Ok(ticket) => Ok(settle(ticket)),
            Err(e) if !self.creation_in_flight() => Err(e),
            Err(_) => {
                let this = self.clone();
                let name = name.to_string();
                let parked = self
                    .inner
                    .lanes
                    .submit(LaneKey::Catalog, async move { this.enqueue_removal(&name) });
                Ok(parked_removal(parked).boxed())
            }
        }
    }

    pub async fn remove_factory(&self, name: &str) -> Result<TeardownReport> {
        self.submit_removal(name)?.await
    }

    fn creation_in_flight(&self) -> bool {
        self.inner.creating.load(Ordering::SeqCst) > 0
    }

    fn enqueue_join(&self, event: JoinEvent) -> Option<Ticket<Result<JoinOutcome>>> {
        if !self.inner.registry.lock().contains(event.resource) {
            return None;
        }
        let inner = Arc::clone(&self.inner);
        Some(
            self.inner
                .lanes
                .submit(LaneKey::Factory(event.resource), async move { inner.provision(event).await }),
        )
    }

    fn enqueue_removal(&self, name: &str) -> Result<Ticket<Result<TeardownReport>>> {
        let id = self
            .inner
            .registry
            .lock()
            .find_by_name_prefix(name)
            .ok_or_else(|| OrchestratorError::FactoryNotFound {
                name: name.to_string(),
            })?;
        let inner = Arc::clone(&self.inner);
        let name = name.to_string();
        Ok(self
            .inner
            .lanes
            .submit(LaneKey::Factory(id), async move { inner.teardown(id, name).await }))
    }

    /// Factories in registration order.
    pub fn list_factories(&self) -> Vec<FactorySummary> {
        self.inner
            .registry
            .lock()
            .factories()
            .iter()
            .map(FactorySummary::from)
            .collect()
    }

    pub fn factory(&self, id: ResourceId) -> Option<Factory> {
        self.inner.registry.lock().get(id)
    }

    pub fn children_of(&self, id: ResourceId) -> Result<Vec<ResourceId>> {
        self.inner.registry.lock().children_of(id)
    }

    pub fn find_by_name_prefix(&self, name: &str) -> Option<ResourceId> {
        self.inner.registry.lock().find_by_name_prefix(name)
    }
}

/// Counts a queued factory creation until it finishes or is dropped.
struct InFlight(Arc<AtomicUsize>);

impl InFlight {
    fn enter(count: &Arc<AtomicUsize>) -> Self {
        count.fetch_add(1, Ordering::SeqCst);
        Self(Arc::clone(count))
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

fn settle<T: Send + 'static>(ticket: Ticket<Result<T>>) -> Pending<T> {
    resolve(ticket).boxed()
}

async fn resolve<T>(ticket: Ticket<Result<T>>) -> Result<T> {
    ticket.await?
}

async fn parked_join(parked: Ticket<Option<Ticket<Result<JoinOutcome>>>>) -> Result<JoinOutcome> {
    match parked.await? {
        Some(ticket) => ticket.await?,
        None => Ok(JoinOutcome::NotAFactory),
    }
}

async fn parked_removal(parked: Ticket<Result<Ticket<Result<TeardownReport>>>>) -> Result<TeardownReport> {
    parked.await??.await?
}

/// Run a remote call under the configured bound.
async fn bounded<T>(
    limit: Duration,
    op: RemoteOp,
    call: impl Future<Output = std::result::Result<T, RemoteError>>,
) -> Result<std::result::Result<T, RemoteError>> {
    tokio::time::timeout(limit, call)
        .await
        .map_err(|_| timed_out(op, limit))
}

fn timed_out(op: RemoteOp, limit: Duration) -> OrchestratorError {
    OrchestratorError::RemoteTimeout {
        op,
        after_ms: u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
    }
}

/// Fires `issued` once the wrapped call has been polled, i.e. its request
/// has gone out.
struct Issued<F> {
    call: Pin<Box<F>>,
    issued: Option<oneshot::Sender<()>>,
}

impl<F: Future> Future for Issued<F> {
    type Output = F::Output;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let out = self.call.as_mut().poll(cx);
        if let Some(issued) = self.issued.take() {
            let _ = issued.send(());
        }
        out
    }
}

/// Move the joining member into `child`. `issued` fires once the request is out.
async fn relocate<C: ResourceClient>(
    client: Arc<C>,
    limit: Duration,
    event: JoinEvent,
    child: ResourceId,
    issued: oneshot::Sender<()>,
) -> Result<()> {
    let call = Issued {
        call: Box::pin(client.relocate_member(event.member, event.context, child)),
        issued: Some(issued),
    };
    let moved = bounded(limit, RemoteOp::Relocate, call).await?;
    match moved {
        Ok(()) => {
            tracing::debug!(member = %event.member, %child, "Member relocated");
            Ok(())
        }
        Err(source) => {
            // child stays registered; an empty child is harmless
            tracing::warn!(member = %event.member, %child, error = %source, "Relocation failed");
            Err(OrchestratorError::RemoteMoveFailed { id: child, source })
        }
    }
}

impl<C: ResourceClient> Inner<C> {
    async fn create_factory(&self, context: ContextId, name: String) -> Result<ResourceId> {
        if self
            .registry
            .lock()
            .factories()
            .iter()
            .any(|f| f.name == name)
        {
            return Err(OrchestratorError::DuplicateFactory { name });
        }

        let created = bounded(
            self.config.remote_timeout,
            RemoteOp::Create,
            self.client.create_resource(&name, ResourceKind::Voice, context),
        )
        .await?
        .map_err(|source| OrchestratorError::RemoteCreateFailed {
            name: name.clone(),
            source,
        })?;

        self.registry.lock().register(created.id, &name, context)?;
        tracing::info!(factory = %created.id, %name, %context, "Factory created");
        Ok(created.id)
    }

    async fn provision(&self, event: JoinEvent) -> Result<JoinOutcome> {
        let Some(factory) = self.registry.lock().get(event.resource) else {
            tracing::debug!(factory = %event.resource, "Factory removed before join was handled");
            return Ok(JoinOutcome::FactoryGone);
        };
        let n = factory.children.len();

        let base = if self.config.refresh_names {
            self.current_name(&factory).await
        } else {
            factory.name.clone()
        };
        let name = registry::child_name(&base, n);

        let created = bounded(
            self.config.remote_timeout,
            RemoteOp::Create,
            self.client.create_resource(&name, ResourceKind::Voice, factory.context),
        )
        .await?
        .map_err(|source| {
            tracing::warn!(factory = %factory.id, %name, error = %source, "Child creation rejected");
            OrchestratorError::RemoteCreateFailed {
                name: name.clone(),
                source,
            }
        })?;

        let index = self.registry.lock().append_child(factory.id, created.id)?;
        if index != n {
            // only reachable if the registry is mutated off-lane; the child
            // exists either way, so the member still gets moved
            tracing::error!(factory = %factory.id, child = %created.id, expected = n, actual = index, "Child index skew");
        }
        tracing::info!(
            factory = %factory.id,
            child = %created.id,
            %name,
            member = %event.member,
            "Child provisioned"
        );

        let relocation = self.spawn_relocation(event, created.id).await;
        Ok(JoinOutcome::Provisioned(Provisioned {
            factory: factory.id,
            child: created.id,
            name,
            index,
            relocation,
        }))
    }

    /// Remote name of the factory, picking up renames. Falls back to the
    /// registered name if the lookup fails.
    async fn current_name(&self, factory: &Factory) -> String {
        let fetched = bounded(
            self.config.remote_timeout,
            RemoteOp::Get,
            self.client.get_resource(factory.id),
        )
        .await;
        match fetched {
            Ok(Ok(remote)) if remote.name != factory.name => {
                let renamed = self.registry.lock().rename(factory.id, &remote.name);
                match renamed {
                    Ok(()) => {
                        tracing::info!(factory = %factory.id, old = %factory.name, new = %remote.name, "Factory renamed");
                        remote.name
                    }
                    Err(e) => {
                        tracing::warn!(factory = %factory.id, new = %remote.name, error = %e, "Ignoring rename, keeping cached name");
                        factory.name.clone()
                    }
                }
            }
            Ok(Ok(_)) => factory.name.clone(),
            Ok(Err(e)) => {
                tracing::warn!(factory = %factory.id, error = %e, "Name lookup failed, using cached name");
                factory.name.clone()
            }
            Err(e) => {
                tracing::warn!(factory = %factory.id, error = %e, "Name lookup failed, using cached name");
                factory.name.clone()
            }
        }
    }

    /// Start moving the member into `child` and return once the move has
    /// been sent. The reply is left to the returned handle.
    async fn spawn_relocation(&self, event: JoinEvent, child: ResourceId) -> JoinHandle<Result<()>> {
        let (issued_tx, issued_rx) = oneshot::channel();
        let handle = tokio::spawn(relocate(
            Arc::clone(&self.client),
            self.config.remote_timeout,
            event,
            child,
            issued_tx,
        ));
        // an error means the task ended before polling the call
        let _ = issued_rx.await;
        handle
    }

    async fn teardown(&self, id: ResourceId, requested: String) -> Result<TeardownReport> {
        let (name, children) = {
            let mut registry = self.registry.lock();
            let name = registry.get(id).map(|f| f.name);
            match (name, registry.remove(id)) {
                (Some(name), Ok(children)) => (name, children),
                _ => return Err(OrchestratorError::FactoryNotFound { name: requested }),
            }
        };
        tracing::info!(factory = %id, %name, children = children.len(), "Tearing down factory");

        let results = futures::future::join_all(children.iter().map(|&child| self.delete(child))).await;

        let mut deleted = Vec::with_capacity(children.len() + 1);
        let mut failures = Vec::new();
        for result in results {
            match result {
                Ok(child) => deleted.push(child),
                Err(e) => failures.push(e),
            }
        }
        match self.delete(id).await {
            Ok(factory) => deleted.push(factory),
            Err(e) => failures.push(e),
        }

        if failures.is_empty() {
            tracing::info!(factory = %id, %name, "Factory removed");
        } else {
            tracing::warn!(factory = %id, %name, failed = failures.len(), "Factory removed with failures");
        }
        Ok(TeardownReport {
            factory: id,
            name,
            deleted,
            failures,
        })
    }

    /// Delete one resource. A resource that is already gone counts as deleted.
    async fn delete(&self, id: ResourceId) -> Result<ResourceId> {
        let outcome = bounded(
            self.config.remote_timeout,
            RemoteOp::Delete,
            self.client.delete_resource(id),
        )
        .await
        .inspect_err(|e| tracing::warn!(resource = %id, error = %e, "Delete timed out"))?;
        match outcome {
            Ok(()) => Ok(id),
            Err(RemoteError::NotFound(_)) => {
                tracing::debug!(resource = %id, "Already deleted");
                Ok(id)
            }
            Err(source) => {
                tracing::warn!(resource = %id, error = %source, "Delete failed");
                Err(OrchestratorError::RemoteDeleteFailed { id, source })
            }
        }
    }
}
