//! Transient pod snapshots used for ownership and convergence checks

use std::collections::BTreeMap;
use std::fmt;

use k8s_openapi::api::core::v1::Pod;

use crate::namespace_or_default;

/// Pod lifecycle phase as reported by the control plane
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PodPhase {
    /// Accepted but not all containers are running
    Pending,
    /// Bound to a node with at least one container running
    Running,
    /// All containers terminated successfully
    Succeeded,
    /// All containers terminated, at least one in failure
    Failed,
    /// Phase could not be obtained
    Unknown,
}

impl PodPhase {
    /// Parse a phase string, mapping anything unrecognised to `Unknown`
    pub fn parse(phase: &str) -> Self {
        match phase {
            "Pending" => Self::Pending,
            "Running" => Self::Running,
            "Succeeded" => Self::Succeeded,
            "Failed" => Self::Failed,
            _ => Self::Unknown,
        }
    }
}

impl fmt::Display for PodPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "Pending",
            Self::Running => "Running",
            Self::Succeeded => "Succeeded",
            Self::Failed => "Failed",
            Self::Unknown => "Unknown",
        };
        f.write_str(s)
    }
}

/// The fields of a pod that rollout checks look at
///
/// Snapshots are re-fetched on every check and never cached.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PodSnapshot {
    /// Pod name
    pub name: String,
    /// Pod namespace
    pub namespace: String,
    /// Lifecycle phase
    pub phase: PodPhase,
    /// Labels the pod was listed by
    pub labels: BTreeMap<String, String>,
    /// Annotations, including the ownership reference if present
    pub annotations: BTreeMap<String, String>,
}

impl PodSnapshot {
    /// Create a snapshot with no annotations
    pub fn new(name: impl Into<String>, namespace: impl Into<String>, phase: PodPhase) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            phase,
            labels: BTreeMap::new(),
            annotations: BTreeMap::new(),
        }
    }

    /// Add a label
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    /// Add an annotation
    pub fn with_annotation(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.annotations.insert(key.into(), value.into());
        self
    }
}

impl From<Pod> for PodSnapshot {
    fn from(pod: Pod) -> Self {
        let phase = pod
            .status
            .as_ref()
            .and_then(|s| s.phase.as_deref())
            .map(PodPhase::parse)
            .unwrap_or(PodPhase::Unknown);
        Self {
            name: pod.metadata.name.unwrap_or_default(),
            namespace: namespace_or_default(pod.metadata.namespace.as_deref()).to_string(),
            phase,
            labels: pod.metadata.labels.unwrap_or_default(),
            annotations: pod.metadata.annotations.unwrap_or_default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::PodStatus;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

    #[test]
    fn test_phase_parsing() {
        assert_eq!(PodPhase::parse("Running"), PodPhase::Running);
        assert_eq!(PodPhase::parse("Succeeded"), PodPhase::Succeeded);
        assert_eq!(PodPhase::parse("CrashLoopBackOff"), PodPhase::Unknown);
        assert_eq!(PodPhase::Pending.to_string(), "Pending");
    }

    #[test]
    fn test_snapshot_from_pod() {
        let pod = Pod {
            metadata: ObjectMeta {
                name: Some("web-abc".to_string()),
                namespace: Some("apps".to_string()),
                annotations: Some(BTreeMap::from([(
                    "kubernetes.io/created-by".to_string(),
                    "{}".to_string(),
                )])),
                ..Default::default()
            },
            status: Some(PodStatus {
                phase: Some("Pending".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        };

        let snapshot = PodSnapshot::from(pod);
        assert_eq!(snapshot.name, "web-abc");
        assert_eq!(snapshot.namespace, "apps");
        assert_eq!(snapshot.phase, PodPhase::Pending);
        assert!(snapshot.annotations.contains_key("kubernetes.io/created-by"));
    }

    #[test]
    fn test_snapshot_without_status_is_unknown() {
        let snapshot = PodSnapshot::from(Pod::default());
        assert_eq!(snapshot.phase, PodPhase::Unknown);
        assert_eq!(snapshot.namespace, "default");
    }
}
