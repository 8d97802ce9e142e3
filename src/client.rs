//! Cluster client seams and the kube-rs implementation
//!
//! The rollout controller only needs a handful of remote operations. They
//! are split into two traits so tests can swap either side for a fake:
//! [`ResourceApi`] for the typed controller resource and [`PodApi`] for the
//! pods it spawns. [`KubeClient`] implements both against a real API server.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Pod;
use kube::api::{Api, DeleteParams, ListParams, PostParams};
use kube::Client;
use tracing::debug;

#[cfg(test)]
use mockall::automock;

use crate::resource::{ControlledResource, PodSnapshot, ResourceId, Selector};
use crate::Error;

/// Typed get/create/update/delete for one resource kind
#[async_trait]
pub trait ResourceApi<K: ControlledResource>: Send + Sync {
    /// Fetch a resource by name, `None` if it does not exist
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<K>, Error>;

    /// Create a resource, returning the stored object
    async fn create(&self, namespace: &str, resource: &K) -> Result<K, Error>;

    /// Replace a resource with the given object (full replace, not a patch)
    async fn update(&self, namespace: &str, resource: &K) -> Result<K, Error>;

    /// Delete a resource by name
    async fn delete(&self, namespace: &str, name: &str) -> Result<(), Error>;
}

/// Pod listing and deletion
#[cfg_attr(test, automock)]
#[async_trait]
pub trait PodApi: Send + Sync {
    /// List pods in a namespace matching a label selector
    ///
    /// An empty selector lists every pod in the namespace.
    async fn list_pods(
        &self,
        namespace: &str,
        selector: &Selector,
    ) -> Result<Vec<PodSnapshot>, Error>;

    /// Delete a pod by name
    async fn delete_pod(&self, namespace: &str, name: &str) -> Result<(), Error>;
}

/// Real Kubernetes client implementation
///
/// Cheap to clone and safe to share across controllers; it never mutates
/// the underlying client configuration.
#[derive(Clone)]
pub struct KubeClient {
    client: Client,
}

impl KubeClient {
    /// Create a new KubeClient wrapping the given kube Client
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Connect using in-cluster config or the local kubeconfig
    pub async fn try_default() -> Result<Self, Error> {
        let client = Client::try_default()
            .await
            .map_err(|e| Error::remote("connect", "cluster", e))?;
        Ok(Self::new(client))
    }
}

fn id_of<K: ControlledResource>(namespace: &str, name: &str) -> ResourceId {
    ResourceId {
        kind: K::KIND,
        namespace: namespace.to_string(),
        name: name.to_string(),
    }
}

fn name_of<K: ControlledResource>(resource: &K) -> Result<String, Error> {
    resource
        .meta()
        .name
        .clone()
        .ok_or_else(|| Error::bad_parameter(format!("{} is missing metadata.name", K::KIND)))
}

#[async_trait]
impl<K: ControlledResource> ResourceApi<K> for KubeClient {
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<K>, Error> {
        let api = K::api(self.client.clone(), namespace);
        match api.get(name).await {
            Ok(resource) => Ok(Some(resource)),
            Err(kube::Error::Api(ae)) if ae.code == 404 => Ok(None),
            Err(e) => Err(Error::remote("get", id_of::<K>(namespace, name), e)),
        }
    }

    async fn create(&self, namespace: &str, resource: &K) -> Result<K, Error> {
        let name = name_of(resource)?;
        let api = K::api(self.client.clone(), namespace);
        api.create(&PostParams::default(), resource)
            .await
            .map_err(|e| Error::remote("create", id_of::<K>(namespace, &name), e))
    }

    async fn update(&self, namespace: &str, resource: &K) -> Result<K, Error> {
        let name = name_of(resource)?;
        let api = K::api(self.client.clone(), namespace);
        api.replace(&name, &PostParams::default(), resource)
            .await
            .map_err(|e| Error::remote("update", id_of::<K>(namespace, &name), e))
    }

    async fn delete(&self, namespace: &str, name: &str) -> Result<(), Error> {
        let api = K::api(self.client.clone(), namespace);
        api.delete(name, &DeleteParams::default())
            .await
            .map_err(|e| Error::remote("delete", id_of::<K>(namespace, name), e))?;
        Ok(())
    }
}

#[async_trait]
impl PodApi for KubeClient {
    async fn list_pods(
        &self,
        namespace: &str,
        selector: &Selector,
    ) -> Result<Vec<PodSnapshot>, Error> {
        let api: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let mut params = ListParams::default();
        if !selector.is_empty() {
            params = params.labels(&selector.to_string());
        }

        let pods = api
            .list(&params)
            .await
            .map_err(|e| Error::remote("list pods", format!("{namespace}/{selector}"), e))?;
        debug!(namespace = %namespace, selector = %selector, count = pods.items.len(), "listed pods");

        Ok(pods.items.into_iter().map(PodSnapshot::from).collect())
    }

    async fn delete_pod(&self, namespace: &str, name: &str) -> Result<(), Error> {
        let api: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        api.delete(name, &DeleteParams::default())
            .await
            .map_err(|e| Error::remote("delete pod", format!("{namespace}/{name}"), e))?;
        Ok(())
    }
}
