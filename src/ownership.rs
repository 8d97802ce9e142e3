//! Mapping a controller resource to the pods it created
//!
//! Resolution is a two-stage filter: the label selector narrows the pod
//! listing, then the ownership annotation decides. Labels alone are not
//! enough: pods of an earlier instance with the same name (deleted and
//! recreated) share the labels but carry the old UID. An empty selector is
//! passed through unchanged and matches the whole namespace, leaving the UID
//! check to do all the narrowing.

use tracing::{debug, info, warn};

use crate::client::PodApi;
use crate::decode::parse_serialized_reference;
use crate::resource::{PodSnapshot, ResourceDescriptor};
use crate::{Error, ANNOTATION_CREATED_BY};

/// Whether a pod's ownership annotation names `owner` by kind and UID
///
/// Pods without the annotation, or with one that does not parse, are not
/// attributable to any controller.
pub fn is_owned_by(pod: &PodSnapshot, owner: &ResourceDescriptor) -> bool {
    let Some(created_by) = pod.annotations.get(ANNOTATION_CREATED_BY) else {
        debug!(pod = %pod.name, "pod has no ownership annotation");
        return false;
    };

    let reference = match parse_serialized_reference(created_by) {
        Ok(parsed) => parsed.reference,
        Err(e) => {
            warn!(pod = %pod.name, error = %e, "skipping pod with unparseable ownership annotation");
            return false;
        }
    };

    reference.kind.as_deref() == Some(owner.kind.as_str())
        && !owner.uid.is_empty()
        && reference.uid.as_deref() == Some(owner.uid.as_str())
}

/// List the pods created by exactly this resource instance
///
/// Pods are returned in listing order. A failed listing fails the whole
/// resolution; there is no partial result.
pub async fn resolve_owned_pods<P>(
    owner: &ResourceDescriptor,
    pods: &P,
) -> Result<Vec<PodSnapshot>, Error>
where
    P: PodApi + ?Sized,
{
    let candidates = pods.list_pods(&owner.namespace, &owner.selector).await?;
    let total = candidates.len();

    let owned: Vec<PodSnapshot> = candidates
        .into_iter()
        .filter(|pod| is_owned_by(pod, owner))
        .collect();

    info!(
        resource = %owner.id(),
        uid = %owner.uid,
        selector = %owner.selector,
        candidates = total,
        owned = owned.len(),
        "resolved owned pods"
    );
    Ok(owned)
}
