//! In-memory cluster for exercising rollouts without an API server
//!
//! [`InMemoryCluster`] implements [`ResourceApi`] for every kind and
//! [`PodApi`], behaving like a minimal API server: it assigns UIDs on create,
//! keeps UID and status across full-replace updates, filters pods by label
//! selector and answers missing objects with 404s. Every remote call is
//! recorded so tests can assert on ordering, and any resource verb can be made
//! to fail for one kind with [`InMemoryCluster::fail`].
//!
//! # Example
//!
//! ```ignore
//! let cluster = Arc::new(InMemoryCluster::new());
//! let mut web = RolloutController::new(ControllerConfig::from_resource(deployment, cluster.clone()))?;
//! web.upsert(&cancel).await?;
//! cluster.spawn_pods::<Deployment>("default", "web", 3, PodPhase::Running);
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use kube::error::ErrorResponse;
use serde_json::{json, Value};

use crate::client::{PodApi, ResourceApi};
use crate::decode::from_value;
use crate::resource::{ControlledResource, PodPhase, PodSnapshot, ResourceId, ResourceKind, Selector};
use crate::{Error, ANNOTATION_CREATED_BY};

/// Resource operations a test can make fail
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Verb {
    /// Fetch by name
    Get,
    /// Create
    Create,
    /// Full replace
    Update,
    /// Delete
    Delete,
}

impl Verb {
    fn as_str(self) -> &'static str {
        match self {
            Self::Get => "get",
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

/// A remote call observed by the in-memory cluster
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Call {
    /// Resource fetched by name
    Get(ResourceId),
    /// Resource created
    Create(ResourceId),
    /// Resource replaced
    Update(ResourceId),
    /// Resource deleted
    Delete(ResourceId),
    /// Pods listed
    ListPods {
        /// Namespace listed
        namespace: String,
        /// Selector in query syntax
        selector: String,
        /// UIDs of the objects stored in that namespace at listing time
        live_uids: Vec<String>,
    },
    /// Pod deleted
    DeletePod {
        /// Pod namespace
        namespace: String,
        /// Pod name
        name: String,
    },
}

type Key = (ResourceKind, String, String);

#[derive(Default)]
struct State {
    objects: BTreeMap<Key, Value>,
    pods: Vec<PodSnapshot>,
    calls: Vec<Call>,
    submitted: Vec<Value>,
    failing_pod_deletes: BTreeSet<String>,
    failing_verbs: BTreeSet<(Verb, ResourceKind)>,
    next_uid: u64,
}

impl State {
    fn injected_failure(&self, verb: Verb, id: &ResourceId) -> Result<(), Error> {
        if !self.failing_verbs.contains(&(verb, id.kind)) {
            return Ok(());
        }
        Err(Error::remote(
            verb.as_str(),
            id,
            api_error(
                500,
                "InternalError",
                format!("etcd timeout during {} of {id}", verb.as_str()),
            ),
        ))
    }
}

/// Minimal API server held in memory
#[derive(Default)]
pub struct InMemoryCluster {
    state: Mutex<State>,
}

fn api_error(code: u16, reason: &str, message: String) -> kube::Error {
    kube::Error::Api(ErrorResponse {
        status: "Failure".to_string(),
        message,
        reason: reason.to_string(),
        code,
    })
}

fn key_of(kind: ResourceKind, namespace: &str, name: &str) -> Key {
    (kind, namespace.to_string(), name.to_string())
}

fn id_of(kind: ResourceKind, namespace: &str, name: &str) -> ResourceId {
    ResourceId {
        kind,
        namespace: namespace.to_string(),
        name: name.to_string(),
    }
}

fn created_by(kind: ResourceKind, namespace: &str, name: &str, uid: &str) -> String {
    json!({
        "kind": "SerializedReference",
        "apiVersion": "v1",
        "reference": {
            "kind": kind.as_str(),
            "namespace": namespace,
            "name": name,
            "uid": uid,
        }
    })
    .to_string()
}

impl InMemoryCluster {
    /// Create an empty cluster
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Every remote call made so far, in order
    pub fn calls(&self) -> Vec<Call> {
        self.state().calls.clone()
    }

    /// Documents exactly as they were submitted to create or update
    pub fn submitted(&self) -> Vec<Value> {
        self.state().submitted.clone()
    }

    /// The stored object, if present
    pub fn object(&self, kind: ResourceKind, namespace: &str, name: &str) -> Option<Value> {
        self.state()
            .objects
            .get(&key_of(kind, namespace, name))
            .cloned()
    }

    /// Replace the status of a stored object
    pub fn set_status(&self, kind: ResourceKind, namespace: &str, name: &str, status: Value) {
        if let Some(object) = self.state().objects.get_mut(&key_of(kind, namespace, name)) {
            object["status"] = status;
        }
    }

    /// Add a pod as-is
    pub fn add_pod(&self, pod: PodSnapshot) {
        self.state().pods.push(pod);
    }

    /// Current pods, in creation order
    pub fn pods(&self) -> Vec<PodSnapshot> {
        self.state().pods.clone()
    }

    /// Spawn pods on behalf of a stored object, the way a workload controller would
    ///
    /// Pods get the object's selector labels and an ownership annotation with
    /// its current UID. Returns the names of the new pods.
    pub fn spawn_pods<K: ControlledResource>(
        &self,
        namespace: &str,
        name: &str,
        count: usize,
        phase: PodPhase,
    ) -> Result<Vec<String>, Error> {
        let object = self
            .object(K::KIND, namespace, name)
            .ok_or_else(|| Error::not_found(K::KIND.as_str(), namespace, name))?;
        let resource: K = from_value(object, K::KIND)?;
        let uid = resource.meta().uid.clone().unwrap_or_default();
        let selector = resource.selector();

        let mut state = self.state();
        let mut names = Vec::with_capacity(count);
        for _ in 0..count {
            state.next_uid += 1;
            let pod_name = format!("{name}-{}", state.next_uid);
            let mut pod = PodSnapshot::new(&pod_name, namespace, phase).with_annotation(
                ANNOTATION_CREATED_BY,
                created_by(K::KIND, namespace, name, &uid),
            );
            pod.labels = selector.labels().clone();
            state.pods.push(pod);
            names.push(pod_name);
        }
        Ok(names)
    }

    /// Move every pod in a namespace to the given phase
    pub fn set_pod_phases(&self, namespace: &str, phase: PodPhase) {
        for pod in self.state().pods.iter_mut().filter(|p| p.namespace == namespace) {
            pod.phase = phase;
        }
    }

    /// Make deleting the named pod fail with a server error
    pub fn fail_pod_delete(&self, name: &str) {
        self.state().failing_pod_deletes.insert(name.to_string());
    }

    /// Make every `verb` call on resources of `kind` fail with a server error
    ///
    /// The call is still recorded, but nothing is stored or removed.
    pub fn fail(&self, verb: Verb, kind: ResourceKind) {
        self.state().failing_verbs.insert((verb, kind));
    }
}

#[async_trait]
impl<K: ControlledResource> ResourceApi<K> for InMemoryCluster {
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<K>, Error> {
        let object = {
            let mut state = self.state();
            let id = id_of(K::KIND, namespace, name);
            state.calls.push(Call::Get(id.clone()));
            state.injected_failure(Verb::Get, &id)?;
            state.objects.get(&key_of(K::KIND, namespace, name)).cloned()
        };
        object.map(|o| from_value(o, K::KIND)).transpose()
    }

    async fn create(&self, namespace: &str, resource: &K) -> Result<K, Error> {
        let name = resource.meta().name.clone().unwrap_or_default();
        let id = id_of(K::KIND, namespace, &name);
        let mut object =
            serde_json::to_value(resource).map_err(|e| Error::decode(e.to_string()))?;

        let stored = {
            let mut state = self.state();
            state.calls.push(Call::Create(id.clone()));
            state.submitted.push(object.clone());
            state.injected_failure(Verb::Create, &id)?;

            let key = key_of(K::KIND, namespace, &name);
            if state.objects.contains_key(&key) {
                return Err(Error::remote(
                    "create",
                    &id,
                    api_error(409, "AlreadyExists", format!("{id} already exists")),
                ));
            }

            state.next_uid += 1;
            object["metadata"]["uid"] = json!(format!("uid-{}", state.next_uid));
            object["metadata"]["resourceVersion"] = json!("1");
            object["metadata"]["generation"] = json!(1);
            if K::KIND.is_namespaced() {
                object["metadata"]["namespace"] = json!(namespace);
            }
            state.objects.insert(key, object.clone());
            object
        };
        from_value(stored, K::KIND)
    }

    async fn update(&self, namespace: &str, resource: &K) -> Result<K, Error> {
        let name = resource.meta().name.clone().unwrap_or_default();
        let id = id_of(K::KIND, namespace, &name);
        let mut object =
            serde_json::to_value(resource).map_err(|e| Error::decode(e.to_string()))?;

        let stored = {
            let mut state = self.state();
            state.calls.push(Call::Update(id.clone()));
            state.submitted.push(object.clone());
            state.injected_failure(Verb::Update, &id)?;

            let key = key_of(K::KIND, namespace, &name);
            let Some(existing) = state.objects.get(&key) else {
                return Err(Error::remote(
                    "update",
                    &id,
                    api_error(404, "NotFound", format!("{id} not found")),
                ));
            };

            let generation = existing["metadata"]["generation"].as_i64().unwrap_or(0) + 1;
            object["metadata"]["uid"] = existing["metadata"]["uid"].clone();
            object["metadata"]["generation"] = json!(generation);
            object["metadata"]["resourceVersion"] = json!(generation.to_string());
            if K::KIND.is_namespaced() {
                object["metadata"]["namespace"] = json!(namespace);
            }
            if let Some(status) = existing.get("status") {
                object["status"] = status.clone();
            }
            state.objects.insert(key, object.clone());
            object
        };
        from_value(stored, K::KIND)
    }

    async fn delete(&self, namespace: &str, name: &str) -> Result<(), Error> {
        let id = id_of(K::KIND, namespace, name);
        let mut state = self.state();
        state.calls.push(Call::Delete(id.clone()));
        state.injected_failure(Verb::Delete, &id)?;
        match state.objects.remove(&key_of(K::KIND, namespace, name)) {
            Some(_) => Ok(()),
            None => Err(Error::remote(
                "delete",
                &id,
                api_error(404, "NotFound", format!("{id} not found")),
            )),
        }
    }
}

#[async_trait]
impl PodApi for InMemoryCluster {
    async fn list_pods(
        &self,
        namespace: &str,
        selector: &Selector,
    ) -> Result<Vec<PodSnapshot>, Error> {
        let mut state = self.state();
        let live_uids = state
            .objects
            .iter()
            .filter(|((_, ns, _), _)| ns == namespace)
            .filter_map(|(_, object)| object["metadata"]["uid"].as_str().map(str::to_string))
            .collect();
        state.calls.push(Call::ListPods {
            namespace: namespace.to_string(),
            selector: selector.to_string(),
            live_uids,
        });

        Ok(state
            .pods
            .iter()
            .filter(|pod| pod.namespace == namespace && selector.matches(&pod.labels))
            .cloned()
            .collect())
    }

    async fn delete_pod(&self, namespace: &str, name: &str) -> Result<(), Error> {
        let mut state = self.state();
        state.calls.push(Call::DeletePod {
            namespace: namespace.to_string(),
            name: name.to_string(),
        });

        let target = format!("{namespace}/{name}");
        if state.failing_pod_deletes.contains(name) {
            return Err(Error::remote(
                "delete pod",
                &target,
                api_error(500, "InternalError", format!("etcd timeout deleting {target}")),
            ));
        }

        let before = state.pods.len();
        state
            .pods
            .retain(|pod| !(pod.namespace == namespace && pod.name == name));
        if state.pods.len() == before {
            return Err(Error::remote(
                "delete pod",
                &target,
                api_error(404, "NotFound", format!("pod {target} not found")),
            ));
        }
        Ok(())
    }
}
