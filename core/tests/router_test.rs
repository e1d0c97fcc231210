use std::collections::HashMap;

use lattice_core::message::{DeliveryOutcome, Recipients};
use lattice_core::{CoordinatorConfig, FailureReason, SwarmCoordinator, TopologyKind};

#[tokio::test]
async fn unknown_endpoints_fail_fast() {
    let swarm = SwarmCoordinator::new(CoordinatorConfig::default(), TopologyKind::Mesh).unwrap();
    let _a = swarm.register_agent("a", HashMap::new()).await.unwrap();

    let result = swarm.send("a", "ghost", b"x".to_vec()).await;
    assert_eq!(
        result.outcome,
        DeliveryOutcome::Failed(FailureReason::UnknownAgent)
    );
    assert_eq!(result.hops, 0);

    let result = swarm.send("ghost", "a", b"x".to_vec()).await;
    assert_eq!(
        result.outcome,
        DeliveryOutcome::Failed(FailureReason::UnknownAgent)
    );
}

#[tokio::test]
async fn delivered_message_lands_in_the_target_mailbox() {
    let swarm = SwarmCoordinator::new(CoordinatorConfig::default(), TopologyKind::Mesh).unwrap();
    let _a = swarm.register_agent("a", HashMap::new()).await.unwrap();
    let mut b = swarm.register_agent("b", HashMap::new()).await.unwrap();

    let result = swarm.send("a", "b", b"payload".to_vec()).await;
    assert!(result.is_delivered());

    let msg = b.recv().await.unwrap();
    assert_eq!(msg.from, "a");
    assert_eq!(msg.recipients, Recipients::One("b".to_string()));
    assert_eq!(msg.payload, b"payload".to_vec());
    assert_eq!(msg.hops, 1);
    assert_eq!(msg.outcome, DeliveryOutcome::Delivered);
}

#[tokio::test]
async fn self_send_is_direct() {
    let swarm = SwarmCoordinator::new(CoordinatorConfig::default(), TopologyKind::Ring).unwrap();
    let mut a = swarm.register_agent("a", HashMap::new()).await.unwrap();
    let _b = swarm.register_agent("b", HashMap::new()).await.unwrap();
    let _c = swarm.register_agent("c", HashMap::new()).await.unwrap();

    let result = swarm.send("a", "a", b"note-to-self".to_vec()).await;
    assert!(result.is_delivered());
    assert_eq!(result.hops, 0);
    assert!(a.try_recv().is_some());
}

#[tokio::test]
async fn hop_budget_bounds_ring_routes() {
    let config = CoordinatorConfig {
        max_hops: 1,
        ..CoordinatorConfig::default()
    };
    let swarm = SwarmCoordinator::new(config, TopologyKind::Ring).unwrap();
    let mut handles = Vec::new();
    for id in ["a", "b", "c", "d", "e"] {
        handles.push(swarm.register_agent(id, HashMap::new()).await.unwrap());
    }

    // A direct neighbor fits the single-hop budget.
    let result = swarm.send("a", "b", b"x".to_vec()).await;
    assert!(result.is_delivered());
    assert_eq!(result.hops, 1);

    // Two links away exceeds it before any delivery is attempted.
    let result = swarm.send("a", "c", b"x".to_vec()).await;
    assert_eq!(
        result.outcome,
        DeliveryOutcome::Failed(FailureReason::HopBudgetExhausted)
    );
}

#[tokio::test]
async fn dropped_handle_surfaces_as_unreachable() {
    let swarm = SwarmCoordinator::new(CoordinatorConfig::default(), TopologyKind::Mesh).unwrap();
    let _a = swarm.register_agent("a", HashMap::new()).await.unwrap();
    let b = swarm.register_agent("b", HashMap::new()).await.unwrap();
    drop(b);

    let result = swarm.send("a", "b", b"x".to_vec()).await;
    assert_eq!(
        result.outcome,
        DeliveryOutcome::Failed(FailureReason::MailboxClosed)
    );

    // The failed delivery demoted the agent; later sends fail fast.
    let result = swarm.send("a", "b", b"x".to_vec()).await;
    assert_eq!(
        result.outcome,
        DeliveryOutcome::Failed(FailureReason::UnknownAgent)
    );
}

#[tokio::test]
async fn stats_reconcile_with_issued_sends() {
    let swarm = SwarmCoordinator::new(CoordinatorConfig::default(), TopologyKind::Mesh).unwrap();
    let _a = swarm.register_agent("a", HashMap::new()).await.unwrap();
    let _b = swarm.register_agent("b", HashMap::new()).await.unwrap();
    let _c = swarm.register_agent("c", HashMap::new()).await.unwrap();

    assert!(swarm.send("a", "b", b"1".to_vec()).await.is_delivered());
    assert!(swarm.send("b", "c", b"2".to_vec()).await.is_delivered());
    let failed = swarm.send("a", "ghost", b"3".to_vec()).await;
    assert!(!failed.is_delivered());

    let broadcast = swarm.broadcast("a", b"4".to_vec()).await;
    assert_eq!(broadcast.len(), 2);

    let stats = swarm.stats();
    assert_eq!(stats.sent, 5);
    assert_eq!(stats.delivered, 4);
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.broadcasts, 1);
}

#[tokio::test]
async fn monitor_window_aggregates_into_samples() {
    use lattice_core::{DeliveryObserver, DeliveryRecord, PerformanceMonitor};

    let monitor = PerformanceMonitor::new(4);
    for i in 0..6i64 {
        monitor
            .on_delivery(DeliveryRecord {
                topology: TopologyKind::Ring,
                agent_count: 5,
                hops: 2,
                latency_ms: 1.0,
                delivered: i % 2 == 0,
                at_ms: 1_000 + i * 100,
            })
            .await;
    }

    // Capacity four: the two oldest records rolled out of the window.
    let sample = monitor.sample().await.unwrap();
    assert_eq!(sample.topology, TopologyKind::Ring);
    assert_eq!(sample.message_count, 4);
    assert_eq!(sample.window_start_ms, 1_200);
    assert_eq!(sample.window_end_ms, 1_500);
    assert!(sample.throughput_per_sec > 0.0);

    let summary = monitor.summary().await;
    assert_eq!(summary.sampled_messages, 4);
    assert!((summary.failure_rate - 0.5).abs() < f64::EPSILON);
}

#[tokio::test]
async fn perf_summary_tracks_routing_outcomes() {
    let swarm = SwarmCoordinator::new(CoordinatorConfig::default(), TopologyKind::Mesh).unwrap();
    let _a = swarm.register_agent("a", HashMap::new()).await.unwrap();
    let _b = swarm.register_agent("b", HashMap::new()).await.unwrap();

    for _ in 0..4 {
        swarm.send("a", "b", b"x".to_vec()).await;
    }
    swarm.send("a", "ghost", b"x".to_vec()).await;

    let info = swarm.get_topology_info().await;
    assert_eq!(info.perf.sampled_messages, 5);
    assert!((info.perf.failure_rate - 0.2).abs() < f64::EPSILON);
    assert!(info.perf.avg_latency_ms >= 0.0);
}
