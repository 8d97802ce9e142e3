//! Resource kinds, identities and the per-kind capability trait
//!
//! Every supported kind is a typed Kubernetes object implementing
//! [`ControlledResource`]. The trait carries the small set of capabilities the
//! generic rollout controller needs: which API scope the kind lives in, which
//! labels select its pods and which counters report rollout progress.

mod kinds;
mod pod;
mod psp;

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use kube::{Api, Client, Resource};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::convergence::Replicas;
use crate::{namespace_or_default, Error};

pub use pod::{PodPhase, PodSnapshot};
pub use psp::{PodSecurityPolicy, PodSecurityPolicySpec};

/// Orchestration resource kinds this crate knows how to roll out
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ResourceKind {
    /// apps/v1 Deployment
    Deployment,
    /// apps/v1 DaemonSet
    DaemonSet,
    /// v1 ReplicationController
    ReplicationController,
    /// batch/v1 Job
    Job,
    /// v1 ConfigMap
    ConfigMap,
    /// v1 Secret
    Secret,
    /// v1 ServiceAccount
    ServiceAccount,
    /// rbac.authorization.k8s.io/v1 Role
    Role,
    /// rbac.authorization.k8s.io/v1 ClusterRole
    ClusterRole,
    /// rbac.authorization.k8s.io/v1 RoleBinding
    RoleBinding,
    /// rbac.authorization.k8s.io/v1 ClusterRoleBinding
    ClusterRoleBinding,
    /// policy/v1beta1 PodSecurityPolicy
    PodSecurityPolicy,
    /// v1 Service
    Service,
}

impl ResourceKind {
    /// All supported kinds
    pub const ALL: [ResourceKind; 13] = [
        Self::Deployment,
        Self::DaemonSet,
        Self::ReplicationController,
        Self::Job,
        Self::ConfigMap,
        Self::Secret,
        Self::ServiceAccount,
        Self::Role,
        Self::ClusterRole,
        Self::RoleBinding,
        Self::ClusterRoleBinding,
        Self::PodSecurityPolicy,
        Self::Service,
    ];

    /// Kind name as it appears in documents and ownership references
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Deployment => "Deployment",
            Self::DaemonSet => "DaemonSet",
            Self::ReplicationController => "ReplicationController",
            Self::Job => "Job",
            Self::ConfigMap => "ConfigMap",
            Self::Secret => "Secret",
            Self::ServiceAccount => "ServiceAccount",
            Self::Role => "Role",
            Self::ClusterRole => "ClusterRole",
            Self::RoleBinding => "RoleBinding",
            Self::ClusterRoleBinding => "ClusterRoleBinding",
            Self::PodSecurityPolicy => "PodSecurityPolicy",
            Self::Service => "Service",
        }
    }

    /// Whether resources of this kind live inside a namespace
    pub fn is_namespaced(&self) -> bool {
        !matches!(
            self,
            Self::ClusterRole | Self::ClusterRoleBinding | Self::PodSecurityPolicy
        )
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| Error::bad_parameter(format!("unsupported resource kind: {s:?}")))
    }
}

/// Label key/value pairs used to narrow a pod listing
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Selector(BTreeMap<String, String>);

impl Selector {
    /// Build a selector from label pairs
    pub fn new(labels: BTreeMap<String, String>) -> Self {
        Self(labels)
    }

    /// An empty selector matches every pod in the namespace
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The underlying label pairs
    pub fn labels(&self) -> &BTreeMap<String, String> {
        &self.0
    }

    /// Whether a label set carries every pair of this selector
    pub fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        self.0.iter().all(|(key, value)| labels.get(key) == Some(value))
    }
}

impl From<BTreeMap<String, String>> for Selector {
    fn from(labels: BTreeMap<String, String>) -> Self {
        Self(labels)
    }
}

/// Renders in label-selector query syntax: `app=web,tier=frontend`
impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (key, value) in &self.0 {
            if !first {
                f.write_str(",")?;
            }
            write!(f, "{key}={value}")?;
            first = false;
        }
        Ok(())
    }
}

/// Identity of a resource within the cluster
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResourceId {
    /// Resource kind
    pub kind: ResourceKind,
    /// Namespace (ignored for cluster-scoped kinds)
    pub namespace: String,
    /// Resource name
    pub name: String,
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.kind.is_namespaced() {
            write!(f, "{} {}/{}", self.kind, self.namespace, self.name)
        } else {
            write!(f, "{} {}", self.kind, self.name)
        }
    }
}

/// Snapshot of the identity and rollout-relevant fields of one resource
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResourceDescriptor {
    /// Resource kind
    pub kind: ResourceKind,
    /// Namespace, defaulted when absent
    pub namespace: String,
    /// Resource name
    pub name: String,
    /// UID assigned by the control plane; empty before the first create
    pub uid: String,
    /// Labels selecting the pods this resource owns
    pub selector: Selector,
}

impl ResourceDescriptor {
    /// Capture the descriptor of a typed resource
    pub fn of<K: ControlledResource>(resource: &K) -> Self {
        let meta = resource.meta();
        Self {
            kind: K::KIND,
            namespace: namespace_or_default(meta.namespace.as_deref()).to_string(),
            name: meta.name.clone().unwrap_or_default(),
            uid: meta.uid.clone().unwrap_or_default(),
            selector: resource.selector(),
        }
    }

    /// The identity part of the descriptor
    pub fn id(&self) -> ResourceId {
        ResourceId {
            kind: self.kind,
            namespace: self.namespace.clone(),
            name: self.name.clone(),
        }
    }
}

/// Capabilities a kind provides to the generic rollout controller
///
/// Kinds that spawn pods override [`selector`](Self::selector) and
/// [`replicas`](Self::replicas); config and RBAC kinds keep the defaults, which
/// make their rollout complete as soon as the object exists.
pub trait ControlledResource:
    Resource<DynamicType = ()>
    + Clone
    + fmt::Debug
    + Serialize
    + DeserializeOwned
    + Send
    + Sync
    + 'static
{
    /// The kind this type represents
    const KIND: ResourceKind;

    /// Whether the control plane spawns pods on behalf of this kind
    const SPAWNS_PODS: bool = false;

    /// Typed API handle for this kind in the given namespace
    fn api(client: Client, namespace: &str) -> Api<Self>;

    /// Labels selecting this resource's pods
    fn selector(&self) -> Selector {
        Selector::default()
    }

    /// Desired replica count, if the kind carries one
    fn desired_replicas(&self) -> Option<i32> {
        None
    }

    /// Live rollout counters reported in the resource status
    fn replicas(&self) -> Replicas {
        Replicas::Untracked
    }

    /// Whether an owned pod in this phase counts as rolled out
    fn pod_settled(phase: PodPhase) -> bool {
        phase == PodPhase::Running
    }

    /// Identity of this resource, with the namespace defaulted
    fn resource_id(&self) -> ResourceId {
        let meta = self.meta();
        ResourceId {
            kind: Self::KIND,
            namespace: namespace_or_default(meta.namespace.as_deref()).to_string(),
            name: meta.name.clone().unwrap_or_default(),
        }
    }

    /// Drop server-assigned identity so the object can be submitted afresh
    fn clear_identity(&mut self) {
        let meta = self.meta_mut();
        meta.uid = None;
        meta.self_link = None;
        meta.resource_version = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::apps::v1::Deployment;
    use k8s_openapi::api::rbac::v1::ClusterRole;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

    #[test]
    fn test_kind_round_trips_through_name() {
        for kind in ResourceKind::ALL {
            assert_eq!(kind.as_str().parse::<ResourceKind>().unwrap(), kind);
        }
    }

    #[test]
    fn test_unknown_kind_is_bad_parameter() {
        let err = "StatefulSet".parse::<ResourceKind>().unwrap_err();
        assert!(matches!(err, Error::BadParameter { .. }));
        assert!(err.to_string().contains("StatefulSet"));
    }

    #[test]
    fn test_selector_renders_query_syntax() {
        let selector = Selector::new(BTreeMap::from([
            ("tier".to_string(), "frontend".to_string()),
            ("app".to_string(), "web".to_string()),
        ]));
        assert_eq!(selector.to_string(), "app=web,tier=frontend");
        assert_eq!(Selector::default().to_string(), "");
        assert!(Selector::default().is_empty());
    }

    #[test]
    fn test_resource_id_display_depends_on_scope() {
        let namespaced = ResourceId {
            kind: ResourceKind::Deployment,
            namespace: "default".to_string(),
            name: "web".to_string(),
        };
        assert_eq!(namespaced.to_string(), "Deployment default/web");

        let cluster = ResourceId {
            kind: ResourceKind::ClusterRole,
            namespace: "default".to_string(),
            name: "reader".to_string(),
        };
        assert_eq!(cluster.to_string(), "ClusterRole reader");
    }

    #[test]
    fn test_clear_identity_drops_server_fields() {
        let mut deployment = Deployment {
            metadata: ObjectMeta {
                name: Some("web".to_string()),
                uid: Some("uid-1".to_string()),
                self_link: Some("/apis/apps/v1/namespaces/default/deployments/web".to_string()),
                resource_version: Some("42".to_string()),
                ..Default::default()
            },
            ..Default::default()
        };
        deployment.clear_identity();
        assert_eq!(deployment.metadata.uid, None);
        assert_eq!(deployment.metadata.self_link, None);
        assert_eq!(deployment.metadata.resource_version, None);
        assert_eq!(deployment.metadata.name.as_deref(), Some("web"));
    }

    #[test]
    fn test_descriptor_defaults_namespace() {
        let role = ClusterRole {
            metadata: ObjectMeta {
                name: Some("reader".to_string()),
                uid: Some("uid-7".to_string()),
                ..Default::default()
            },
            ..Default::default()
        };
        let descriptor = ResourceDescriptor::of(&role);
        assert_eq!(descriptor.kind, ResourceKind::ClusterRole);
        assert_eq!(descriptor.namespace, "default");
        assert_eq!(descriptor.uid, "uid-7");
        assert!(descriptor.selector.is_empty());
        assert_eq!(role.desired_replicas(), None);
    }
}
