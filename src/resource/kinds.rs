//! [`ControlledResource`] implementations for every supported kind

use k8s_openapi::api::apps::v1::{DaemonSet, Deployment};
use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::api::core::v1::{
    ConfigMap, ReplicationController, Secret, Service, ServiceAccount,
};
use k8s_openapi::api::rbac::v1::{ClusterRole, ClusterRoleBinding, Role, RoleBinding};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use kube::{Api, Client};

use super::{ControlledResource, PodPhase, PodSecurityPolicy, ResourceKind, Selector};
use crate::convergence::{ReplicaInfo, Replicas};

/// Replica count used when a replica-bearing spec leaves it unset
const DEFAULT_REPLICAS: i32 = 1;

fn match_labels(selector: &LabelSelector) -> Selector {
    selector.match_labels.clone().unwrap_or_default().into()
}

impl ControlledResource for Deployment {
    const KIND: ResourceKind = ResourceKind::Deployment;
    const SPAWNS_PODS: bool = true;

    fn api(client: Client, namespace: &str) -> Api<Self> {
        Api::namespaced(client, namespace)
    }

    fn selector(&self) -> Selector {
        self.spec
            .as_ref()
            .map(|spec| match_labels(&spec.selector))
            .unwrap_or_default()
    }

    fn desired_replicas(&self) -> Option<i32> {
        Some(
            self.spec
                .as_ref()
                .and_then(|spec| spec.replicas)
                .unwrap_or(DEFAULT_REPLICAS),
        )
    }

    fn replicas(&self) -> Replicas {
        let desired = self.desired_replicas().unwrap_or(DEFAULT_REPLICAS);
        let updated = self
            .status
            .as_ref()
            .and_then(|s| s.updated_replicas)
            .unwrap_or(0);
        Replicas::Counted(ReplicaInfo::equal(desired, updated, "updated"))
    }
}

impl ControlledResource for DaemonSet {
    const KIND: ResourceKind = ResourceKind::DaemonSet;
    const SPAWNS_PODS: bool = true;

    fn api(client: Client, namespace: &str) -> Api<Self> {
        Api::namespaced(client, namespace)
    }

    fn selector(&self) -> Selector {
        self.spec
            .as_ref()
            .map(|spec| match_labels(&spec.selector))
            .unwrap_or_default()
    }

    // Desired count comes from the scheduler, so it is only known once the
    // daemon set controller has published a status.
    fn replicas(&self) -> Replicas {
        match self.status.as_ref() {
            None => Replicas::Unreported,
            Some(status) => Replicas::Counted(ReplicaInfo::equal(
                status.desired_number_scheduled,
                status.updated_number_scheduled.unwrap_or(0),
                "updated",
            )),
        }
    }
}

impl ControlledResource for ReplicationController {
    const KIND: ResourceKind = ResourceKind::ReplicationController;
    const SPAWNS_PODS: bool = true;

    fn api(client: Client, namespace: &str) -> Api<Self> {
        Api::namespaced(client, namespace)
    }

    fn selector(&self) -> Selector {
        self.spec
            .as_ref()
            .and_then(|spec| spec.selector.clone())
            .unwrap_or_default()
            .into()
    }

    fn desired_replicas(&self) -> Option<i32> {
        Some(
            self.spec
                .as_ref()
                .and_then(|spec| spec.replicas)
                .unwrap_or(DEFAULT_REPLICAS),
        )
    }

    fn replicas(&self) -> Replicas {
        let desired = self.desired_replicas().unwrap_or(DEFAULT_REPLICAS);
        let current = self.status.as_ref().map(|s| s.replicas).unwrap_or(0);
        Replicas::Counted(ReplicaInfo::equal(desired, current, "current"))
    }
}

impl ControlledResource for Job {
    const KIND: ResourceKind = ResourceKind::Job;
    const SPAWNS_PODS: bool = true;

    fn api(client: Client, namespace: &str) -> Api<Self> {
        Api::namespaced(client, namespace)
    }

    // Job documents usually leave the selector to the control plane; fall
    // back to the pod template labels until the live selector is known.
    fn selector(&self) -> Selector {
        let Some(spec) = self.spec.as_ref() else {
            return Selector::default();
        };
        match spec.selector.as_ref() {
            Some(selector) => match_labels(selector),
            None => spec
                .template
                .metadata
                .as_ref()
                .and_then(|meta| meta.labels.clone())
                .unwrap_or_default()
                .into(),
        }
    }

    fn desired_replicas(&self) -> Option<i32> {
        Some(
            self.spec
                .as_ref()
                .and_then(|spec| spec.completions)
                .unwrap_or(DEFAULT_REPLICAS),
        )
    }

    fn replicas(&self) -> Replicas {
        let completions = self.desired_replicas().unwrap_or(DEFAULT_REPLICAS);
        let succeeded = self
            .status
            .as_ref()
            .and_then(|s| s.succeeded)
            .unwrap_or(0);
        Replicas::Counted(ReplicaInfo::at_least(completions, succeeded, "succeeded"))
    }

    fn pod_settled(phase: PodPhase) -> bool {
        matches!(phase, PodPhase::Running | PodPhase::Succeeded)
    }
}

/// Kinds without pods or rollout counters: existence is convergence
macro_rules! impl_untracked {
    ($type:ty, $kind:expr, namespaced) => {
        impl ControlledResource for $type {
            const KIND: ResourceKind = $kind;

            fn api(client: Client, namespace: &str) -> Api<Self> {
                Api::namespaced(client, namespace)
            }
        }
    };
    ($type:ty, $kind:expr, cluster) => {
        impl ControlledResource for $type {
            const KIND: ResourceKind = $kind;

            fn api(client: Client, _namespace: &str) -> Api<Self> {
                Api::all(client)
            }
        }
    };
}

impl_untracked!(ConfigMap, ResourceKind::ConfigMap, namespaced);
impl_untracked!(Secret, ResourceKind::Secret, namespaced);
impl_untracked!(ServiceAccount, ResourceKind::ServiceAccount, namespaced);
impl_untracked!(Service, ResourceKind::Service, namespaced);
impl_untracked!(Role, ResourceKind::Role, namespaced);
impl_untracked!(RoleBinding, ResourceKind::RoleBinding, namespaced);
impl_untracked!(ClusterRole, ResourceKind::ClusterRole, cluster);
impl_untracked!(ClusterRoleBinding, ResourceKind::ClusterRoleBinding, cluster);
impl_untracked!(PodSecurityPolicy, ResourceKind::PodSecurityPolicy, cluster);
