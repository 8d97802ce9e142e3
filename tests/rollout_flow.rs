//! Integration tests for the full rollout lifecycle
//!
//! These tests tell the story of a release pipeline driving a manifest
//! through upsert, status and delete against an in-memory cluster. The
//! workload controller's side (publishing status, spawning pods) is played by
//! the test itself between steps.

use std::sync::Arc;
use std::time::Duration;

use k8s_openapi::api::apps::v1::{DaemonSet, Deployment};
use k8s_openapi::api::batch::v1::Job;
use serde_json::json;
use tokio_util::sync::CancellationToken;

use rollout_rig::controller::{ControllerConfig, RolloutController};
use rollout_rig::manifest::{self, AnyRollout};
use rollout_rig::resource::{PodPhase, ResourceKind};
use rollout_rig::testing::{Call, InMemoryCluster};
use rollout_rig::Error;

// =============================================================================
// Test Fixtures
// =============================================================================

const SHOP: &str = r#"
apiVersion: v1
kind: ConfigMap
metadata:
  name: shop-settings
  namespace: shop
data:
  CURRENCY: EUR
---
apiVersion: v1
kind: Service
metadata:
  name: shop
  namespace: shop
spec:
  selector:
    app: shop
  ports:
    - port: 80
      targetPort: 8080
---
apiVersion: apps/v1
kind: Deployment
metadata:
  name: shop
  namespace: shop
spec:
  replicas: 2
  selector:
    matchLabels:
      app: shop
  template:
    metadata:
      labels:
        app: shop
    spec:
      containers:
        - name: shop
          image: registry.example.com/shop:1.4.0
"#;

const MIGRATE: &str = r#"{
  "apiVersion": "batch/v1",
  "kind": "Job",
  "metadata": {"name": "migrate", "namespace": "shop"},
  "spec": {
    "completions": 2,
    "template": {
      "metadata": {"labels": {"job": "migrate"}},
      "spec": {"restartPolicy": "Never", "containers": [{"name": "migrate", "image": "registry.example.com/shop-migrate:1.4.0"}]}
    }
  }
}"#;

const AGENT: &str = r#"
apiVersion: apps/v1
kind: DaemonSet
metadata:
  name: log-agent
spec:
  selector:
    matchLabels:
      app: log-agent
  template:
    metadata:
      labels:
        app: log-agent
"#;

fn period() -> Duration {
    Duration::from_millis(200)
}

// =============================================================================
// Manifest Lifecycle
// =============================================================================

/// Story: a release goes out and is torn down again
///
/// The pipeline applies the shop manifest, the deployment controller scales
/// it up, the pipeline waits for the rollout and finally removes everything
/// in reverse order, taking the deployment's pods with it.
#[tokio::test(start_paused = true)]
async fn story_release_lifecycle() {
    let cluster = Arc::new(InMemoryCluster::new());
    let cancel = CancellationToken::new();

    let mut rollouts = manifest::load(SHOP.as_bytes(), cluster.clone()).unwrap();
    assert_eq!(rollouts.len(), 3);
    for rollout in rollouts.iter_mut() {
        rollout.upsert(&cancel).await.unwrap();
    }

    // Before the deployment controller reacts, the rollout is not done.
    let err = rollouts[2].status(&cancel, 2, period()).await.unwrap_err();
    assert!(matches!(err, Error::ConvergenceMismatch { .. }));

    cluster.set_status(
        ResourceKind::Deployment,
        "shop",
        "shop",
        json!({"observedGeneration": 1, "replicas": 2, "updatedReplicas": 2}),
    );
    cluster
        .spawn_pods::<Deployment>("shop", "shop", 2, PodPhase::Running)
        .unwrap();

    for rollout in &rollouts {
        rollout.status(&cancel, 3, period()).await.unwrap();
    }

    for rollout in rollouts.iter().rev() {
        rollout.delete(&cancel, true).await.unwrap();
    }
    assert!(cluster.pods().is_empty());
    assert!(cluster
        .object(ResourceKind::ConfigMap, "shop", "shop-settings")
        .is_none());

    let deletes: Vec<ResourceKind> = cluster
        .calls()
        .into_iter()
        .filter_map(|call| match call {
            Call::Delete(id) => Some(id.kind),
            _ => None,
        })
        .collect();
    assert_eq!(
        deletes,
        vec![
            ResourceKind::Deployment,
            ResourceKind::Service,
            ResourceKind::ConfigMap
        ]
    );
}

/// Story: a new image is pushed over a running deployment
///
/// The second upsert replaces the spec and bumps the generation. Convergence
/// is judged on the replica counters and pod phases alone, so a status whose
/// observedGeneration still lags behind does not hold the rollout back once
/// the counters and pods match.
#[tokio::test(start_paused = true)]
async fn story_update_converges_on_counters() {
    let cluster = Arc::new(InMemoryCluster::new());
    let cancel = CancellationToken::new();

    let mut rollouts = manifest::load(SHOP.as_bytes(), cluster.clone()).unwrap();
    let AnyRollout::Deployment(shop) = &mut rollouts[2] else {
        panic!("third document is the deployment");
    };
    shop.upsert(&cancel).await.unwrap();
    cluster.set_status(
        ResourceKind::Deployment,
        "shop",
        "shop",
        json!({"observedGeneration": 1, "replicas": 2, "updatedReplicas": 1}),
    );
    cluster
        .spawn_pods::<Deployment>("shop", "shop", 2, PodPhase::Running)
        .unwrap();
    let err = shop.status(&cancel, 2, period()).await.unwrap_err();
    assert!(err.to_string().contains("updated: 1"));

    shop.upsert(&cancel).await.unwrap();
    let stored = cluster
        .object(ResourceKind::Deployment, "shop", "shop")
        .unwrap();
    assert_eq!(stored["metadata"]["generation"], 2);

    cluster.set_status(
        ResourceKind::Deployment,
        "shop",
        "shop",
        json!({"observedGeneration": 1, "replicas": 2, "updatedReplicas": 2}),
    );
    shop.status(&cancel, 1, period()).await.unwrap();
}

// =============================================================================
// Workload Kinds
// =============================================================================

/// Story: a migration job counts finished pods as done
#[tokio::test(start_paused = true)]
async fn story_job_converges_on_completions() {
    let cluster = Arc::new(InMemoryCluster::new());
    let cancel = CancellationToken::new();

    let mut migrate = RolloutController::<Job, _>::new(ControllerConfig::from_document(
        MIGRATE,
        cluster.clone(),
    ))
    .unwrap();
    migrate.upsert(&cancel).await.unwrap();
    cluster
        .spawn_pods::<Job>("shop", "migrate", 2, PodPhase::Succeeded)
        .unwrap();

    let err = migrate.status(&cancel, 2, period()).await.unwrap_err();
    assert!(err.to_string().contains("succeeded: 0"));

    cluster.set_status(ResourceKind::Job, "shop", "migrate", json!({"succeeded": 2}));
    migrate.status(&cancel, 1, period()).await.unwrap();
}

/// Story: a daemon set is not done before the scheduler has reported
#[tokio::test(start_paused = true)]
async fn story_daemon_set_waits_for_status() {
    let cluster = Arc::new(InMemoryCluster::new());
    let cancel = CancellationToken::new();

    let mut agent = RolloutController::<DaemonSet, _>::new(ControllerConfig::from_document(
        AGENT,
        cluster.clone(),
    ))
    .unwrap();
    agent.upsert(&cancel).await.unwrap();

    let err = agent.status(&cancel, 1, period()).await.unwrap_err();
    assert!(err.to_string().contains("status not reported yet"));

    cluster.set_status(
        ResourceKind::DaemonSet,
        "default",
        "log-agent",
        json!({
            "observedGeneration": 1,
            "currentNumberScheduled": 3,
            "desiredNumberScheduled": 3,
            "numberMisscheduled": 0,
            "numberReady": 3,
            "updatedNumberScheduled": 3
        }),
    );
    cluster
        .spawn_pods::<DaemonSet>("default", "log-agent", 3, PodPhase::Running)
        .unwrap();
    agent.status(&cancel, 1, period()).await.unwrap();
}

// =============================================================================
// Failure Handling
// =============================================================================

/// Story: an operator interrupts a long wait
#[tokio::test(start_paused = true)]
async fn story_interrupt_cancels_status_wait() {
    let cluster = Arc::new(InMemoryCluster::new());
    let cancel = CancellationToken::new();

    let mut rollouts = manifest::load(SHOP.as_bytes(), cluster.clone()).unwrap();
    rollouts[2].upsert(&cancel).await.unwrap();

    let interrupt = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(5)).await;
        interrupt.cancel();
    });

    let err = rollouts[2].status(&cancel, 0, Duration::ZERO).await.unwrap_err();
    assert!(err.is_cancelled());
}

/// Story: deleting something that was never applied is an error
#[tokio::test]
async fn story_delete_of_unknown_resource_fails() {
    let cluster = Arc::new(InMemoryCluster::new());
    let rollouts = manifest::load(SHOP.as_bytes(), cluster.clone()).unwrap();

    let err = rollouts[0]
        .delete(&CancellationToken::new(), true)
        .await
        .unwrap_err();
    assert!(err.is_not_found());
}
