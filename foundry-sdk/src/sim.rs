//! In-process platform simulation.
//!
//! Behaves like the remote platform closely enough to drive the bot without a
//! network: resources get fresh snowflakes, members have a current placement,
//! and every call is recorded. Calls can be delayed by a fixed latency, made
//! to fail, or made to hang forever.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::time::Duration;

use parking_lot::Mutex;

use crate::client::{RemoteError, ResourceClient};
use crate::types::{ContextId, MemberId, Resource, ResourceId, ResourceKind};

const FIRST_ID: u64 = 1_000;

/// Which remote operation a fault applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    Create,
    Delete,
    Get,
    Relocate,
    List,
}

/// A call observed by the simulation, in completion order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SimCall {
    Create {
        name: String,
        kind: ResourceKind,
        context: ContextId,
    },
    Delete(ResourceId),
    Get(ResourceId),
    Relocate {
        member: MemberId,
        context: ContextId,
        resource: ResourceId,
    },
    List(ContextId),
}

#[derive(Default)]
struct SimState {
    next_id: u64,
    resources: BTreeMap<ResourceId, Resource>,
    placements: HashMap<MemberId, ResourceId>,
    departed: HashSet<MemberId>,
    calls: Vec<SimCall>,
    queued_faults: HashMap<Op, VecDeque<RemoteError>>,
    failing_deletes: HashSet<ResourceId>,
    stalled_deletes: HashSet<ResourceId>,
    stalled: HashSet<Op>,
}

impl SimState {
    fn take_fault(&mut self, op: Op) -> Option<RemoteError> {
        self.queued_faults.get_mut(&op).and_then(VecDeque::pop_front)
    }

    fn allocate(&mut self) -> ResourceId {
        let id = ResourceId(self.next_id);
        self.next_id += 1;
        id
    }
}

/// Simulated platform.
pub struct SimPlatform {
    latency: Duration,
    state: Mutex<SimState>,
}

impl Default for SimPlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl SimPlatform {
    pub fn new() -> Self {
        Self {
            latency: Duration::ZERO,
            state: Mutex::new(SimState {
                next_id: FIRST_ID,
                ..SimState::default()
            }),
        }
    }

    /// Delay every call by `latency` before it takes effect.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Seed a resource directly, bypassing the call log.
    pub fn insert_resource(&self, name: &str, kind: ResourceKind, context: ContextId) -> Resource {
        let mut state = self.state.lock();
        let resource = Resource {
            id: state.allocate(),
            name: name.to_string(),
            kind,
            context,
        };
        state.resources.insert(resource.id, resource.clone());
        resource
    }

    /// Rename a resource out-of-band, as an operator would in the client UI.
    pub fn rename(&self, id: ResourceId, name: &str) {
        if let Some(r) = self.state.lock().resources.get_mut(&id) {
            r.name = name.to_string();
        }
    }

    /// Place a member in a voice resource, as if they had connected.
    pub fn connect_member(&self, member: MemberId, resource: ResourceId) {
        let mut state = self.state.lock();
        state.departed.remove(&member);
        state.placements.insert(member, resource);
    }

    /// Disconnect a member; relocating them afterwards is rejected until they
    /// connect again. Members the simulation has never seen can be relocated.
    pub fn disconnect_member(&self, member: MemberId) {
        let mut state = self.state.lock();
        state.placements.remove(&member);
        state.departed.insert(member);
    }

    /// The next call of `op` fails with `err`. Faults queue up per operation.
    pub fn fail_next(&self, op: Op, err: RemoteError) {
        self.state
            .lock()
            .queued_faults
            .entry(op)
            .or_default()
            .push_back(err);
    }

    /// Every delete of `id` fails.
    pub fn fail_delete_of(&self, id: ResourceId) {
        self.state.lock().failing_deletes.insert(id);
    }

    /// Deletes of `id` never complete; other deletes are unaffected.
    pub fn stall_delete_of(&self, id: ResourceId) {
        self.state.lock().stalled_deletes.insert(id);
    }

    /// Calls of `op` never complete.
    pub fn stall(&self, op: Op) {
        self.state.lock().stalled.insert(op);
    }

    pub fn unstall(&self, op: Op) {
        self.state.lock().stalled.remove(&op);
    }

    pub fn calls(&self) -> Vec<SimCall> {
        self.state.lock().calls.clone()
    }

    pub fn resource(&self, id: ResourceId) -> Option<Resource> {
        self.state.lock().resources.get(&id).cloned()
    }

    /// Resources of a context, ordered by id (creation order).
    pub fn resources(&self, context: ContextId) -> Vec<Resource> {
        self.state
            .lock()
            .resources
            .values()
            .filter(|r| r.context == context)
            .cloned()
            .collect()
    }

    pub fn find_by_name(&self, name: &str) -> Option<Resource> {
        self.state
            .lock()
            .resources
            .values()
            .find(|r| r.name == name)
            .cloned()
    }

    pub fn placement(&self, member: MemberId) -> Option<ResourceId> {
        self.state.lock().placements.get(&member).copied()
    }

    /// Names passed to successful create calls, in completion order.
    pub fn created_names(&self) -> Vec<String> {
        self.state
            .lock()
            .calls
            .iter()
            .filter_map(|c| match c {
                SimCall::Create { name, .. } => Some(name.clone()),
                _ => None,
            })
            .collect()
    }

    async fn enter(&self, op: Op) -> Result<(), RemoteError> {
        let stalled = self.state.lock().stalled.contains(&op);
        if stalled {
            std::future::pending::<()>().await;
        }
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        match self.state.lock().take_fault(op) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

impl ResourceClient for SimPlatform {
    async fn create_resource(
        &self,
        name: &str,
        kind: ResourceKind,
        context: ContextId,
    ) -> Result<Resource, RemoteError> {
        self.enter(Op::Create).await?;
        let mut state = self.state.lock();
        let resource = Resource {
            id: state.allocate(),
            name: name.to_string(),
            kind,
            context,
        };
        state.resources.insert(resource.id, resource.clone());
        state.calls.push(SimCall::Create {
            name: name.to_string(),
            kind,
            context,
        });
        Ok(resource)
    }

    async fn delete_resource(&self, id: ResourceId) -> Result<(), RemoteError> {
        let stalled = self.state.lock().stalled_deletes.contains(&id);
        if stalled {
            std::future::pending::<()>().await;
        }
        self.enter(Op::Delete).await?;
        let mut state = self.state.lock();
        if state.failing_deletes.contains(&id) {
            return Err(RemoteError::Status {
                status: 403,
                body: "Missing Permissions".to_string(),
            });
        }
        if state.resources.remove(&id).is_none() {
            return Err(RemoteError::NotFound(id.to_string()));
        }
        state.placements.retain(|_, at| *at != id);
        state.calls.push(SimCall::Delete(id));
        Ok(())
    }

    async fn get_resource(&self, id: ResourceId) -> Result<Resource, RemoteError> {
        self.enter(Op::Get).await?;
        let mut state = self.state.lock();
        state.calls.push(SimCall::Get(id));
        state
            .resources
            .get(&id)
            .cloned()
            .ok_or_else(|| RemoteError::NotFound(id.to_string()))
    }

    async fn relocate_member(
        &self,
        member: MemberId,
        context: ContextId,
        resource: ResourceId,
    ) -> Result<(), RemoteError> {
        self.enter(Op::Relocate).await?;
        let mut state = self.state.lock();
        if !state.resources.contains_key(&resource) {
            return Err(RemoteError::NotFound(resource.to_string()));
        }
        if state.departed.contains(&member) {
            return Err(RemoteError::Rejected(format!(
                "member {member} is not connected to voice"
            )));
        }
        state.placements.insert(member, resource);
        state.calls.push(SimCall::Relocate {
            member,
            context,
            resource,
        });
        Ok(())
    }

    async fn list_resources(&self, context: ContextId) -> Result<Vec<Resource>, RemoteError> {
        self.enter(Op::List).await?;
        let mut state = self.state.lock();
        state.calls.push(SimCall::List(context));
        Ok(state
            .resources
            .values()
            .filter(|r| r.context == context)
            .cloned()
            .collect())
    }
}
