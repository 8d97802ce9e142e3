//! Per-kind "has this rollout finished?" predicates
//!
//! A rollout is converged when its replica counter has reached the desired
//! count and every owned pod sits in a settled phase. Each check returns the reason it is not
//! converged yet; the caller turns that into a retryable mismatch.

use crate::resource::{ControlledResource, PodSnapshot};

/// How the observed counter is compared against the desired count
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Comparison {
    /// Observed must equal desired (rolling workloads)
    Equal,
    /// Observed must reach desired (run-to-completion workloads)
    AtLeast,
}

/// Desired and observed replica counters of a workload
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReplicaInfo {
    /// How many replicas a finished rollout has
    pub desired: i32,
    /// How many the workload controller reports
    pub observed: i32,
    /// Name of the observed counter, used in mismatch messages
    pub counter: &'static str,
    /// How the two counters are compared
    pub comparison: Comparison,
}

impl ReplicaInfo {
    /// Counters that must match exactly
    pub fn equal(desired: i32, observed: i32, counter: &'static str) -> Self {
        Self {
            desired,
            observed,
            counter,
            comparison: Comparison::Equal,
        }
    }

    /// Counters where the observed count must reach the desired count
    pub fn at_least(desired: i32, observed: i32, counter: &'static str) -> Self {
        Self {
            desired,
            observed,
            counter,
            comparison: Comparison::AtLeast,
        }
    }

    /// Whether the counters describe a finished rollout
    pub fn is_satisfied(&self) -> bool {
        match self.comparison {
            Comparison::Equal => self.observed == self.desired,
            Comparison::AtLeast => self.observed >= self.desired,
        }
    }
}

/// Rollout progress a resource reports through its status
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Replicas {
    /// The kind has no rollout counters; existence is convergence
    Untracked,
    /// The workload controller has not published a status yet
    Unreported,
    /// Replica counters from the status
    Counted(ReplicaInfo),
}

/// Check the status counters of a live resource
pub fn check_replicas(replicas: &Replicas) -> Result<(), String> {
    match replicas {
        Replicas::Untracked => Ok(()),
        Replicas::Unreported => Err("status not reported yet".to_string()),
        Replicas::Counted(info) if info.is_satisfied() => Ok(()),
        Replicas::Counted(info) => Err(format!(
            "expected replicas: {}, {}: {}",
            info.desired, info.counter, info.observed
        )),
    }
}

/// Check that every owned pod is in a phase the kind accepts as settled
pub fn check_pods<K: ControlledResource>(pods: &[PodSnapshot]) -> Result<(), String> {
    match pods.iter().find(|pod| !K::pod_settled(pod.phase)) {
        Some(pod) => Err(format!("pod {} is not running yet: {}", pod.name, pod.phase)),
        None => Ok(()),
    }
}
