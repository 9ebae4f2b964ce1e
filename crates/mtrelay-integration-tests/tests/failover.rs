//! S7: cluster 2 has two targets A and B. With a stubbed outbound that
//! fails for A and succeeds for B, the call that lands on A marks A
//! unhealthy, and the next resolution returns B, with B marked healthy once
//! its exchange succeeds.

use mtrelay_router::{Router, SequenceRandSource};
use mtrelay_types::{Cluster, Config, Target, TargetHealthMap};

fn cluster_2_config() -> Config {
    let mut cluster = Cluster::new(2);
    cluster.targets.push(Target {
        cluster_id: 2,
        host: "a".to_string(),
        port: 1,
        min_connections: 1,
        max_connections: 1,
    });
    cluster.targets.push(Target {
        cluster_id: 2,
        host: "b".to_string(),
        port: 2,
        min_connections: 1,
        max_connections: 1,
    });
    Config {
        default_min_connections: 1,
        default_max_connections: 1,
        timeout_ms: 1000,
        default_cluster_id: 2,
        have_proxy: true,
        targets: cluster.targets.clone(),
        clusters: vec![cluster],
    }
}

/// Simulates the data plane's post-route bookkeeping: a successful exchange
/// marks the target healthy, a failed one marks it unhealthy.
async fn simulate_exchange(health: &TargetHealthMap, target: &Target) -> Result<(), String> {
    if target.host == "a" {
        health.mark_unhealthy(&target.key()).await;
        Err("connection refused".to_string())
    } else {
        health.mark_healthy(&target.key()).await;
        Ok(())
    }
}

#[tokio::test]
async fn failing_target_is_marked_unhealthy_and_traffic_moves_to_survivor() {
    let cfg = cluster_2_config();
    let router = Router::new(&cfg);
    let health = TargetHealthMap::new();

    // Force the first resolution onto "a" (index 0 among the two targets).
    let mut rand = SequenceRandSource::new(vec![0]);
    let first = router
        .choose_proxy_target(2, Some(1), &health, &mut rand)
        .await
        .unwrap();
    assert_eq!(first.target.host, "a");
    assert!(simulate_exchange(&health, &first.target).await.is_err());

    let a_key = Target {
        cluster_id: 2,
        host: "a".to_string(),
        port: 1,
        min_connections: 1,
        max_connections: 1,
    }
    .key();
    let b_key = Target {
        cluster_id: 2,
        host: "b".to_string(),
        port: 2,
        min_connections: 1,
        max_connections: 1,
    }
    .key();

    assert!(!health.is_healthy(&a_key).await);
    assert!(health.is_healthy(&b_key).await, "unseen targets default healthy");

    // The next resolution, even forced to try index 0 first, must skip the
    // now-unhealthy "a" and land on "b" within its retry budget.
    let mut rand = SequenceRandSource::new(vec![0, 1]);
    let second = router
        .choose_proxy_target(2, Some(5), &health, &mut rand)
        .await
        .unwrap();
    assert_eq!(second.target.host, "b");
    assert!(simulate_exchange(&health, &second.target).await.is_ok());

    assert!(!health.is_healthy(&a_key).await);
    assert!(health.is_healthy(&b_key).await);
}
