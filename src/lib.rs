//! Rollout Rig - create-or-update, cascading delete and rollout status for Kubernetes resources
//!
//! Rollout Rig takes a desired-state resource document, pushes it to the
//! cluster, tears it down together with the pods it spawned, and waits for a
//! submitted change to finish rolling out.
//!
//! # Architecture
//!
//! One generic [`controller::RolloutController`] drives every supported kind.
//! Kinds plug in through the [`resource::ControlledResource`] capability trait
//! (selector, replica counters, scope). The controller talks to the cluster
//! through the [`client::ResourceApi`] and [`client::PodApi`] seams so the
//! whole algorithm runs against in-memory fakes in tests.
//!
//! # Modules
//!
//! - [`resource`] - Resource kinds, identities and the per-kind capability trait
//! - [`decode`] - YAML-or-JSON document decoding
//! - [`ownership`] - Mapping a controller resource to the pods it created
//! - [`convergence`] - Per-kind "has this rollout finished?" predicates
//! - [`retry`] - Bounded, cancellable fixed-period retry
//! - [`controller`] - Upsert / Delete / Status orchestration
//! - [`manifest`] - Routing mixed-kind manifests to typed controllers
//! - [`client`] - Cluster client seams and the kube-rs implementation
//! - [`telemetry`] - Logging setup
//! - [`testing`] - In-memory cluster for tests and dry runs
//! - [`error`] - Error types

#![deny(missing_docs)]

pub mod client;
pub mod controller;
pub mod convergence;
pub mod decode;
pub mod error;
pub mod manifest;
pub mod ownership;
pub mod resource;
pub mod retry;
pub mod telemetry;
pub mod testing;

use std::time::Duration;

pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

// =============================================================================
// Default Configuration Constants
// =============================================================================

/// Namespace used for namespaced resources that do not name one
pub const DEFAULT_NAMESPACE: &str = "default";

/// Number of status checks performed when the caller passes zero
pub const DEFAULT_RETRY_ATTEMPTS: u32 = 60;

/// Pause between status checks when the caller passes a zero period
pub const DEFAULT_RETRY_PERIOD: Duration = Duration::from_secs(1);

/// Size of the window inspected when sniffing a document's encoding
pub const DEFAULT_BUFFER_SIZE: usize = 4096;

/// Pod annotation under which the control plane records the creating controller
pub const ANNOTATION_CREATED_BY: &str = "kubernetes.io/created-by";

/// Returns the namespace to use for a resource, falling back to [`DEFAULT_NAMESPACE`]
pub fn namespace_or_default(namespace: Option<&str>) -> &str {
    match namespace {
        Some(ns) if !ns.is_empty() => ns,
        _ => DEFAULT_NAMESPACE,
    }
}
