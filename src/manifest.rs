//! Routing mixed-kind manifests to typed controllers
//!
//! A manifest is a stream of documents of any supported kind. Each document's
//! `kind` header picks the typed [`RolloutController`] it is bound to, so a
//! single file can carry a ServiceAccount, its RBAC and the Deployment that
//! uses them.

use std::sync::Arc;
use std::time::Duration;

use k8s_openapi::api::apps::v1::{DaemonSet, Deployment};
use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::api::core::v1::{
    ConfigMap, ReplicationController, Secret, Service, ServiceAccount,
};
use k8s_openapi::api::rbac::v1::{ClusterRole, ClusterRoleBinding, Role, RoleBinding};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::client::{PodApi, ResourceApi};
use crate::controller::{ControllerConfig, RolloutController};
use crate::decode::{decode_documents, from_value, parse_resource_header};
use crate::resource::{ControlledResource, PodSecurityPolicy, ResourceId, ResourceKind};
use crate::Error;

/// Client handle able to serve every supported kind
pub trait ManifestClient:
    ResourceApi<Deployment>
    + ResourceApi<DaemonSet>
    + ResourceApi<ReplicationController>
    + ResourceApi<Job>
    + ResourceApi<ConfigMap>
    + ResourceApi<Secret>
    + ResourceApi<ServiceAccount>
    + ResourceApi<Role>
    + ResourceApi<ClusterRole>
    + ResourceApi<RoleBinding>
    + ResourceApi<ClusterRoleBinding>
    + ResourceApi<PodSecurityPolicy>
    + ResourceApi<Service>
    + PodApi
{
}

impl<T> ManifestClient for T where
    T: ResourceApi<Deployment>
        + ResourceApi<DaemonSet>
        + ResourceApi<ReplicationController>
        + ResourceApi<Job>
        + ResourceApi<ConfigMap>
        + ResourceApi<Secret>
        + ResourceApi<ServiceAccount>
        + ResourceApi<Role>
        + ResourceApi<ClusterRole>
        + ResourceApi<RoleBinding>
        + ResourceApi<ClusterRoleBinding>
        + ResourceApi<PodSecurityPolicy>
        + ResourceApi<Service>
        + PodApi
        + ?Sized
{
}

/// A rollout controller for a document of any supported kind
#[allow(missing_docs)]
pub enum AnyRollout<C: ?Sized> {
    Deployment(RolloutController<Deployment, C>),
    DaemonSet(RolloutController<DaemonSet, C>),
    ReplicationController(RolloutController<ReplicationController, C>),
    Job(RolloutController<Job, C>),
    ConfigMap(RolloutController<ConfigMap, C>),
    Secret(RolloutController<Secret, C>),
    ServiceAccount(RolloutController<ServiceAccount, C>),
    Role(RolloutController<Role, C>),
    ClusterRole(RolloutController<ClusterRole, C>),
    RoleBinding(RolloutController<RoleBinding, C>),
    ClusterRoleBinding(RolloutController<ClusterRoleBinding, C>),
    PodSecurityPolicy(RolloutController<PodSecurityPolicy, C>),
    Service(RolloutController<Service, C>),
}

macro_rules! dispatch {
    ($self:expr, $controller:ident => $body:expr) => {
        match $self {
            AnyRollout::Deployment($controller) => $body,
            AnyRollout::DaemonSet($controller) => $body,
            AnyRollout::ReplicationController($controller) => $body,
            AnyRollout::Job($controller) => $body,
            AnyRollout::ConfigMap($controller) => $body,
            AnyRollout::Secret($controller) => $body,
            AnyRollout::ServiceAccount($controller) => $body,
            AnyRollout::Role($controller) => $body,
            AnyRollout::ClusterRole($controller) => $body,
            AnyRollout::RoleBinding($controller) => $body,
            AnyRollout::ClusterRoleBinding($controller) => $body,
            AnyRollout::PodSecurityPolicy($controller) => $body,
            AnyRollout::Service($controller) => $body,
        }
    };
}

fn typed<K, C>(value: Value, client: Arc<C>) -> Result<RolloutController<K, C>, Error>
where
    K: ControlledResource,
    C: ResourceApi<K> + PodApi + ?Sized,
{
    let resource: K = from_value(value, K::KIND)?;
    RolloutController::new(ControllerConfig::from_resource(resource, client))
}

impl<C: ManifestClient + ?Sized> AnyRollout<C> {
    /// Bind one decoded document to the controller for its kind
    pub fn from_document(value: Value, client: Arc<C>) -> Result<Self, Error> {
        let kind = parse_resource_header(&value)?.resource_kind()?;
        Ok(match kind {
            ResourceKind::Deployment => Self::Deployment(typed(value, client)?),
            ResourceKind::DaemonSet => Self::DaemonSet(typed(value, client)?),
            ResourceKind::ReplicationController => {
                Self::ReplicationController(typed(value, client)?)
            }
            ResourceKind::Job => Self::Job(typed(value, client)?),
            ResourceKind::ConfigMap => Self::ConfigMap(typed(value, client)?),
            ResourceKind::Secret => Self::Secret(typed(value, client)?),
            ResourceKind::ServiceAccount => Self::ServiceAccount(typed(value, client)?),
            ResourceKind::Role => Self::Role(typed(value, client)?),
            ResourceKind::ClusterRole => Self::ClusterRole(typed(value, client)?),
            ResourceKind::RoleBinding => Self::RoleBinding(typed(value, client)?),
            ResourceKind::ClusterRoleBinding => Self::ClusterRoleBinding(typed(value, client)?),
            ResourceKind::PodSecurityPolicy => Self::PodSecurityPolicy(typed(value, client)?),
            ResourceKind::Service => Self::Service(typed(value, client)?),
        })
    }

    /// Identity of the controlled resource
    pub fn id(&self) -> ResourceId {
        dispatch!(self, c => c.id())
    }

    /// See [`RolloutController::upsert`]
    pub async fn upsert(&mut self, cancel: &CancellationToken) -> Result<(), Error> {
        dispatch!(self, c => c.upsert(cancel).await)
    }

    /// See [`RolloutController::status`]
    pub async fn status(
        &self,
        cancel: &CancellationToken,
        attempts: u32,
        period: Duration,
    ) -> Result<(), Error> {
        dispatch!(self, c => c.status(cancel, attempts, period).await)
    }

    /// See [`RolloutController::delete`]
    pub async fn delete(&self, cancel: &CancellationToken, cascade: bool) -> Result<(), Error> {
        dispatch!(self, c => c.delete(cancel, cascade).await)
    }
}

/// Decode a manifest and bind every document to a controller, in file order
///
/// Empty documents are skipped. An unsupported kind anywhere fails the whole
/// manifest before any controller is used.
pub fn load<C: ManifestClient + ?Sized>(
    bytes: &[u8],
    client: Arc<C>,
) -> Result<Vec<AnyRollout<C>>, Error> {
    let rollouts = decode_documents(bytes)?
        .into_iter()
        .map(|value| AnyRollout::from_document(value, client.clone()))
        .collect::<Result<Vec<_>, _>>()?;
    debug!(documents = rollouts.len(), "manifest loaded");
    Ok(rollouts)
}
