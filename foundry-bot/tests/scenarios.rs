//! End-to-end scenarios against the simulated platform.
//!
//! Tests cover:
//! - A single join spawning "<name> 1" and moving the member
//! - Near-simultaneous joins producing distinct, gap-free indices
//! - Cascading removal of a factory and its children
//! - Rejected child creation leaving the registry untouched
//! - Factories on different lanes not waiting on each other

use std::sync::Arc;
use std::time::Duration;

use foundry_bot::error::OrchestratorError;
use foundry_bot::orchestrator::{JoinOutcome, Orchestrator, OrchestratorConfig};
use foundry_sdk::client::RemoteError;
use foundry_sdk::event::JoinEvent;
use foundry_sdk::sim::{Op, SimCall, SimPlatform};
use foundry_sdk::types::{ContextId, MemberId, ResourceId};

const GUILD: ContextId = ContextId(77);

fn make(sim: SimPlatform) -> (Arc<SimPlatform>, Orchestrator<SimPlatform>) {
    let sim = Arc::new(sim);
    let orch = Orchestrator::new(sim.clone(), OrchestratorConfig::default());
    (sim, orch)
}

fn join(member: u64, factory: ResourceId) -> JoinEvent {
    JoinEvent {
        member: MemberId(member),
        context: GUILD,
        resource: factory,
    }
}

fn child_names(sim: &SimPlatform, orch: &Orchestrator<SimPlatform>, factory: ResourceId) -> Vec<String> {
    orch.children_of(factory)
        .unwrap()
        .into_iter()
        .map(|id| sim.resource(id).unwrap().name)
        .collect()
}

#[tokio::test]
async fn join_spawns_first_child_and_relocates() {
    let (sim, orch) = make(SimPlatform::new());
    let gaming = orch.create_factory(GUILD, "Gaming").await.unwrap();
    sim.connect_member(MemberId(1), gaming);

    let JoinOutcome::Provisioned(p) = orch.handle_join(join(1, gaming)).await.unwrap() else {
        panic!("expected a child");
    };
    assert_eq!(p.name, "Gaming 1");
    assert_eq!(p.index, 0);
    p.relocation.await.unwrap().unwrap();

    assert_eq!(child_names(&sim, &orch, gaming), vec!["Gaming 1"]);
    assert_eq!(sim.placement(MemberId(1)), Some(p.child));
    assert!(sim.calls().contains(&SimCall::Relocate {
        member: MemberId(1),
        context: GUILD,
        resource: p.child,
    }));
}

#[tokio::test(start_paused = true)]
async fn simultaneous_joins_get_distinct_names() {
    let (sim, orch) = make(SimPlatform::new().with_latency(Duration::from_millis(30)));
    let gaming = orch.create_factory(GUILD, "Gaming").await.unwrap();

    let (a, b) = tokio::join!(orch.handle_join(join(1, gaming)), orch.handle_join(join(2, gaming)));
    assert!(matches!(a.unwrap(), JoinOutcome::Provisioned(_)));
    assert!(matches!(b.unwrap(), JoinOutcome::Provisioned(_)));

    let mut names = child_names(&sim, &orch, gaming);
    names.sort();
    assert_eq!(names, vec!["Gaming 1", "Gaming 2"]);
}

#[tokio::test(start_paused = true)]
async fn burst_of_joins_yields_contiguous_indices() {
    let (sim, orch) = make(SimPlatform::new().with_latency(Duration::from_millis(5)));
    let gaming = orch.create_factory(GUILD, "Gaming").await.unwrap();

    let k = 12;
    let pending: Vec<_> = (0..k)
        .map(|m| orch.submit_join(join(m, gaming)).expect("factory is registered"))
        .collect();

    let mut indices = Vec::new();
    for t in pending {
        if let JoinOutcome::Provisioned(p) = t.await.unwrap() {
            indices.push(p.index);
        }
    }
    assert_eq!(indices, (0..k as usize).collect::<Vec<_>>());

    let expected: Vec<String> = (1..=k).map(|i| format!("Gaming {i}")).collect();
    assert_eq!(child_names(&sim, &orch, gaming), expected);
    assert_eq!(
        sim.created_names().iter().filter(|n| n.starts_with("Gaming ")).count(),
        k as usize
    );
}

#[tokio::test]
async fn removal_deletes_children_and_factory() {
    let (sim, orch) = make(SimPlatform::new());
    let gaming = orch.create_factory(GUILD, "Gaming").await.unwrap();
    orch.handle_join(join(1, gaming)).await.unwrap();
    orch.handle_join(join(2, gaming)).await.unwrap();
    let children = orch.children_of(gaming).unwrap();
    assert_eq!(child_names(&sim, &orch, gaming), vec!["Gaming 1", "Gaming 2"]);

    let report = orch.remove_factory("Gaming").await.unwrap();
    assert!(report.is_clean());
    assert_eq!(report.name, "Gaming");
    assert_eq!(report.deleted, vec![children[0], children[1], gaming]);

    for id in children.iter().chain([&gaming]) {
        assert!(sim.resource(*id).is_none());
        assert!(sim.calls().contains(&SimCall::Delete(*id)));
    }
    assert_eq!(orch.find_by_name_prefix("Gaming"), None);
    assert!(matches!(
        orch.children_of(gaming),
        Err(OrchestratorError::UnknownFactory(_))
    ));
}

#[tokio::test]
async fn removal_of_unknown_name_changes_nothing() {
    let (sim, orch) = make(SimPlatform::new());
    let gaming = orch.create_factory(GUILD, "Gaming").await.unwrap();
    orch.handle_join(join(1, gaming)).await.unwrap();
    let calls_before = sim.calls().len();

    let err = orch.remove_factory("Music").await.unwrap_err();
    assert!(matches!(err, OrchestratorError::FactoryNotFound { .. }));
    assert_eq!(orch.children_of(gaming).unwrap().len(), 1);
    assert_eq!(sim.calls().len(), calls_before);
}

#[tokio::test]
async fn duplicate_factory_name_is_rejected() {
    let (_sim, orch) = make(SimPlatform::new());
    let gaming = orch.create_factory(GUILD, "Gaming").await.unwrap();
    orch.handle_join(join(1, gaming)).await.unwrap();

    let err = orch.create_factory(GUILD, "Gaming").await.unwrap_err();
    assert!(matches!(err, OrchestratorError::DuplicateFactory { .. }));
    let listed = orch.list_factories();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, gaming);
    assert_eq!(listed[0].children, 1);
}

#[tokio::test]
async fn rejected_child_creation_leaves_registry_and_member_alone() {
    let (sim, orch) = make(SimPlatform::new());
    let gaming = orch.create_factory(GUILD, "Gaming").await.unwrap();
    sim.connect_member(MemberId(1), gaming);
    sim.fail_next(Op::Create, RemoteError::Status {
        status: 400,
        body: "Maximum number of guild channels reached (500)".into(),
    });

    let err = orch.handle_join(join(1, gaming)).await.unwrap_err();
    assert!(matches!(err, OrchestratorError::RemoteCreateFailed { .. }));
    assert!(orch.children_of(gaming).unwrap().is_empty());
    assert_eq!(sim.placement(MemberId(1)), Some(gaming));
    assert!(!sim.calls().iter().any(|c| matches!(c, SimCall::Relocate { .. })));

    // the lane is free again and numbering resumes at 1
    let JoinOutcome::Provisioned(p) = orch.handle_join(join(1, gaming)).await.unwrap() else {
        panic!("expected a child");
    };
    assert_eq!(p.name, "Gaming 1");
}

#[tokio::test(start_paused = true)]
async fn distinct_factories_do_not_wait_on_each_other() {
    let latency = Duration::from_millis(200);
    let (_sim, orch) = make(SimPlatform::new().with_latency(latency));
    let n = 10;

    let mut factories = Vec::new();
    for i in 0..n {
        factories.push(orch.create_factory(GUILD, &format!("Room{i}")).await.unwrap());
    }

    let start = tokio::time::Instant::now();
    let pending: Vec<_> = factories
        .iter()
        .enumerate()
        .map(|(m, f)| orch.submit_join(join(m as u64, *f)).unwrap())
        .collect();
    for t in pending {
        assert!(matches!(t.await.unwrap(), JoinOutcome::Provisioned(_)));
    }
    // name refresh + create per lane, lanes overlapping
    let elapsed = start.elapsed();
    assert!(elapsed >= latency * 2, "{elapsed:?}");
    assert!(elapsed < latency * 4, "{elapsed:?}");
}
