//! Upsert / Delete / Status orchestration for one resource instance
//!
//! A [`RolloutController`] is bound to a single resource and a single client
//! handle. It holds the desired state in memory and re-fetches the live state
//! from the cluster on every check; nothing it learns from the cluster is
//! cached between operations.
//!
//! # Example
//!
//! ```ignore
//! let config = ControllerConfig::from_document(bytes, Arc::new(KubeClient::try_default().await?));
//! let mut web = RolloutController::<Deployment, _>::new(config)?;
//! web.upsert(&cancel).await?;
//! web.status(&cancel, 0, Duration::ZERO).await?;
//! ```

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::client::{PodApi, ResourceApi};
use crate::convergence::{check_pods, check_replicas};
use crate::decode::{decode_value, from_value, parse_resource_header};
use crate::ownership::resolve_owned_pods;
use crate::resource::{ControlledResource, ResourceDescriptor, ResourceId};
use crate::retry::{retry, RetrySettings};
use crate::{Error, DEFAULT_NAMESPACE};

/// Inputs for building a [`RolloutController`]
///
/// Either `document` or `resource` must be set; when both are, the
/// pre-parsed `resource` wins. A client handle is always required.
pub struct ControllerConfig<K, C: ?Sized> {
    /// Raw YAML or JSON document describing the resource
    pub document: Option<Vec<u8>>,
    /// Already decoded resource
    pub resource: Option<K>,
    /// Cluster client handle
    pub client: Option<Arc<C>>,
}

impl<K, C: ?Sized> Default for ControllerConfig<K, C> {
    fn default() -> Self {
        Self {
            document: None,
            resource: None,
            client: None,
        }
    }
}

impl<K, C: ?Sized> ControllerConfig<K, C> {
    /// Configuration for a raw document
    pub fn from_document(document: impl Into<Vec<u8>>, client: Arc<C>) -> Self {
        Self {
            document: Some(document.into()),
            resource: None,
            client: Some(client),
        }
    }

    /// Configuration for an already decoded resource
    pub fn from_resource(resource: K, client: Arc<C>) -> Self {
        Self {
            document: None,
            resource: Some(resource),
            client: Some(client),
        }
    }
}

/// Decode a document, rejecting documents of another kind
fn decode_document<K: ControlledResource>(document: &[u8]) -> Result<K, Error> {
    let value = decode_value(document)?;
    if !value.is_null() {
        let header = parse_resource_header(&value)?;
        if !header.kind.is_empty() && header.kind != K::KIND.as_str() {
            return Err(Error::bad_parameter(format!(
                "document describes a {}, expected a {}",
                header.kind,
                K::KIND
            )));
        }
    }
    from_value(value, K::KIND)
}

/// Generic rollout controller for one resource of kind `K`
pub struct RolloutController<K, C: ?Sized> {
    resource: K,
    client: Arc<C>,
}

impl<K, C> RolloutController<K, C>
where
    K: ControlledResource,
    C: ResourceApi<K> + PodApi + ?Sized,
{
    /// Build a controller, failing fast on incomplete configuration
    ///
    /// No remote call is made. Namespaced resources without a namespace are
    /// placed in [`DEFAULT_NAMESPACE`].
    pub fn new(config: ControllerConfig<K, C>) -> Result<Self, Error> {
        let mut resource = match (config.resource, config.document) {
            (Some(resource), _) => resource,
            (None, Some(document)) => decode_document(&document)?,
            (None, None) => {
                return Err(Error::bad_parameter(
                    "either a document or a resource is required",
                ))
            }
        };
        let client = config
            .client
            .ok_or_else(|| Error::bad_parameter("a client handle is required"))?;

        let meta = resource.meta_mut();
        if meta.name.as_deref().unwrap_or_default().is_empty() {
            return Err(Error::bad_parameter(format!(
                "{} is missing metadata.name",
                K::KIND
            )));
        }
        if K::KIND.is_namespaced() && meta.namespace.as_deref().unwrap_or_default().is_empty() {
            meta.namespace = Some(DEFAULT_NAMESPACE.to_string());
        }

        Ok(Self { resource, client })
    }

    /// The desired state held by this controller
    pub fn resource(&self) -> &K {
        &self.resource
    }

    /// Identity of the controlled resource
    pub fn id(&self) -> ResourceId {
        self.resource.resource_id()
    }

    /// Push the desired state: create when absent, full replace when present
    ///
    /// Server-assigned identity is cleared before submission so a reused
    /// descriptor never carries a stale UID or version stamp.
    #[instrument(skip(self, cancel), fields(resource = %self.id()))]
    pub async fn upsert(&mut self, cancel: &CancellationToken) -> Result<(), Error> {
        if cancel.is_cancelled() {
            return Err(Error::cancelled("upsert"));
        }

        self.resource.clear_identity();
        let id = self.id();

        match self.client.get(&id.namespace, &id.name).await? {
            None => {
                info!("resource absent, creating");
                let stored = self.client.create(&id.namespace, &self.resource).await?;
                debug!(uid = ?stored.meta().uid, "created");
            }
            Some(_) => {
                info!("resource present, replacing");
                let stored = self.client.update(&id.namespace, &self.resource).await?;
                debug!(generation = ?stored.meta().generation, "replaced");
            }
        }
        Ok(())
    }

    /// Wait for the live resource to finish rolling out
    ///
    /// Zero `attempts` or a zero `period` select the crate defaults. A missing
    /// resource fails immediately; lagging counters or pods are retried until
    /// the budget is spent, then the last mismatch is returned.
    #[instrument(skip(self, cancel), fields(resource = %self.id()))]
    pub async fn status(
        &self,
        cancel: &CancellationToken,
        attempts: u32,
        period: Duration,
    ) -> Result<(), Error> {
        let settings = RetrySettings::resolve(attempts, period);
        retry(cancel, "status", settings, move || self.check_once()).await?;
        info!("rollout converged");
        Ok(())
    }

    /// Delete the resource and then the pods it owned
    ///
    /// Owned pods are resolved while the resource still exists and are
    /// removed whatever `cascade` says. The first pod deletion failure is
    /// returned; the resource itself is already gone by then.
    #[instrument(skip(self, cancel), fields(resource = %self.id()))]
    pub async fn delete(&self, cancel: &CancellationToken, cascade: bool) -> Result<(), Error> {
        if cancel.is_cancelled() {
            return Err(Error::cancelled("delete"));
        }

        let live = self.fetch_live().await?;
        let owner = ResourceDescriptor::of(&live);
        let pods = if K::SPAWNS_PODS {
            resolve_owned_pods(&owner, self.client.as_ref()).await?
        } else {
            Vec::new()
        };

        self.client.delete(&owner.namespace, &owner.name).await?;
        info!(uid = %owner.uid, pods = pods.len(), "resource deleted");

        if !cascade && !pods.is_empty() {
            warn!(pods = pods.len(), "cascade not requested, owned pods are removed anyway");
        }

        for pod in &pods {
            self.client.delete_pod(&pod.namespace, &pod.name).await?;
            debug!(pod = %pod.name, "owned pod deleted");
        }
        Ok(())
    }

    async fn fetch_live(&self) -> Result<K, Error> {
        let id = self.id();
        self.client
            .get(&id.namespace, &id.name)
            .await?
            .ok_or_else(|| Error::not_found(K::KIND.as_str(), &id.namespace, &id.name))
    }

    /// One convergence check against freshly fetched state
    async fn check_once(&self) -> Result<(), Error> {
        let live = self.fetch_live().await?;
        let id = live.resource_id();

        check_replicas(&live.replicas()).map_err(|reason| Error::mismatch(&id, reason))?;

        if K::SPAWNS_PODS {
            let owner = ResourceDescriptor::of(&live);
            let pods = resolve_owned_pods(&owner, self.client.as_ref()).await?;
            check_pods::<K>(&pods).map_err(|reason| Error::mismatch(&id, reason))?;
        }
        Ok(())
    }
}
