use std::collections::HashMap;

use lattice_core::message::DeliveryOutcome;
use lattice_core::topology::{RingStrategy, TopologyStrategy};
use lattice_core::{
    AgentHandle, CoordinatorConfig, FailureReason, HealthStatus, SwarmCoordinator, TopologyKind,
};

async fn swarm_of(
    kind: TopologyKind,
    ids: &[&str],
) -> (SwarmCoordinator, HashMap<String, AgentHandle>) {
    let swarm = SwarmCoordinator::new(CoordinatorConfig::default(), kind).unwrap();
    let mut handles = HashMap::new();
    for id in ids {
        let handle = swarm.register_agent(id, HashMap::new()).await.unwrap();
        handles.insert(id.to_string(), handle);
    }
    (swarm, handles)
}

#[tokio::test]
async fn mesh_routes_any_pair_in_one_hop() {
    for ids in [vec!["a", "b", "c"], vec!["a", "b", "c", "d"]] {
        let (swarm, _handles) = swarm_of(TopologyKind::Mesh, &ids).await;
        for from in &ids {
            for to in &ids {
                if from == to {
                    continue;
                }
                let result = swarm.send(from, to, b"ping".to_vec()).await;
                assert!(result.is_delivered(), "{from} -> {to} failed");
                assert_eq!(result.hops, 1);
            }
        }
    }
}

#[tokio::test]
async fn hierarchical_hops_stay_logarithmic() {
    let ids: Vec<String> = (0..12).map(|i| format!("agent-{i}")).collect();
    let refs: Vec<&str> = ids.iter().map(String::as_str).collect();
    let (swarm, _handles) = swarm_of(TopologyKind::Hierarchical, &refs).await;

    let bound = 2 * (12f64).log2().ceil() as u32;
    for from in &refs {
        for to in &refs {
            if from == to {
                continue;
            }
            let result = swarm.send(from, to, b"ping".to_vec()).await;
            assert!(result.is_delivered(), "{from} -> {to} failed");
            assert!(
                result.hops <= bound,
                "{from} -> {to} took {} hops, bound {bound}",
                result.hops
            );
        }
    }
}

#[tokio::test]
async fn star_routes_spokes_through_the_hub() {
    // Built incrementally, the founding member "a" relays.
    let (swarm, _handles) = swarm_of(TopologyKind::Star, &["a", "b", "c", "d", "e"]).await;

    // Cross-spoke traffic relays once.
    let result = swarm.send("b", "c", b"ping".to_vec()).await;
    assert!(result.is_delivered());
    assert_eq!(result.hops, 2);

    // Traffic touching the hub is direct.
    let result = swarm.send("b", "a", b"ping".to_vec()).await;
    assert!(result.is_delivered());
    assert_eq!(result.hops, 1);
}

#[tokio::test]
async fn star_hub_loss_is_an_outage_until_redesignation() {
    let (swarm, _handles) = swarm_of(TopologyKind::Star, &["a", "b", "c", "d", "e"]).await;

    // Losing the hub takes down every cross-spoke route.
    swarm.unregister_agent("a").await.unwrap();
    let result = swarm.send("b", "c", b"ping".to_vec()).await;
    assert_eq!(
        result.outcome,
        DeliveryOutcome::Failed(FailureReason::HubUnreachable)
    );

    let info = swarm.get_topology_info().await;
    assert_eq!(info.health.status, HealthStatus::Degraded);

    swarm.designate_hub("c").await.unwrap();
    let result = swarm.send("b", "d", b"ping".to_vec()).await;
    assert!(result.is_delivered());
    assert_eq!(result.hops, 2);
    let info = swarm.get_topology_info().await;
    assert_eq!(info.health.status, HealthStatus::Healthy);
}

#[tokio::test]
async fn ring_removal_leaves_a_closed_smaller_ring() {
    let ids = ["a", "b", "c", "d", "e"];
    let (swarm, _handles) = swarm_of(TopologyKind::Ring, &ids).await;

    swarm.unregister_agent("c").await.unwrap();

    let remaining = ["a", "b", "d", "e"];
    for from in &remaining {
        for to in &remaining {
            if from == to {
                continue;
            }
            let result = swarm.send(from, to, b"ping".to_vec()).await;
            assert!(result.is_delivered(), "{from} -> {to} unreachable");
        }
    }

    // Former neighbors of the removed agent are now linked directly.
    let result = swarm.send("b", "d", b"ping".to_vec()).await;
    assert_eq!(result.hops, 1);
    assert_eq!(
        swarm.get_topology_info().await.health.status,
        HealthStatus::Healthy
    );
}

#[tokio::test]
async fn ring_relations_always_have_two_neighbors() {
    let mut ring = RingStrategy::new();
    let agents: Vec<_> = (0..5)
        .map(|i| agent_fixture(&format!("agent-{i}"), i as u64))
        .collect();
    ring.rebuild(&agents).unwrap();
    ring.on_agent_removed("agent-2");

    let relations = ring.relations();
    assert_eq!(relations.len(), 4);
    for (id, rel) in relations {
        assert!(rel.ring_next.is_some(), "{id} lost its next link");
        assert!(rel.ring_prev.is_some(), "{id} lost its prev link");
    }
}

#[tokio::test]
async fn ring_distance_walks_shorter_direction() {
    let ids = ["a", "b", "c", "d", "e", "f"];
    let (swarm, _handles) = swarm_of(TopologyKind::Ring, &ids).await;

    // Opposite side of a six-ring is three hops either way.
    let result = swarm.send("a", "d", b"ping".to_vec()).await;
    assert_eq!(result.hops, 3);

    // One step backwards beats five steps forward.
    let result = swarm.send("a", "f", b"ping".to_vec()).await;
    assert_eq!(result.hops, 1);
}

fn agent_fixture(id: &str, seq: u64) -> lattice_core::AgentInfo {
    lattice_core::AgentInfo {
        agent_id: id.to_string(),
        role: "worker".to_string(),
        capabilities: Vec::new(),
        metadata: HashMap::new(),
        state: lattice_core::AgentState::Active,
        seq,
        relations: Default::default(),
    }
}
