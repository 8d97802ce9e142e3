//! PodSecurityPolicy declared locally
//!
//! `policy/v1beta1` PodSecurityPolicy is no longer shipped by k8s-openapi, so
//! it is declared here with the same wire shape. Rule objects are kept as raw
//! JSON since they are only ever passed through to the API server. Fields not
//! declared below are carried in `extra` so a replace never drops them.

use std::collections::BTreeMap;

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Specification of a PodSecurityPolicy
#[derive(CustomResource, Clone, Debug, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
#[kube(group = "policy", version = "v1beta1", kind = "PodSecurityPolicy")]
#[serde(rename_all = "camelCase")]
pub struct PodSecurityPolicySpec {
    /// Allow privileged containers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub privileged: Option<bool>,
    /// Allow use of the host network namespace
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_network: Option<bool>,
    /// Allow use of the host PID namespace
    #[serde(default, rename = "hostPID", skip_serializing_if = "Option::is_none")]
    pub host_pid: Option<bool>,
    /// Allow use of the host IPC namespace
    #[serde(default, rename = "hostIPC", skip_serializing_if = "Option::is_none")]
    pub host_ipc: Option<bool>,
    /// Allow processes to gain more privileges than their parent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allow_privilege_escalation: Option<bool>,
    /// Require a read-only root filesystem
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read_only_root_filesystem: Option<bool>,
    /// Allowed volume types
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volumes: Option<Vec<String>>,
    /// Run-as-user strategy
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_as_user: Option<Value>,
    /// SELinux context strategy
    #[serde(default, rename = "seLinux", skip_serializing_if = "Option::is_none")]
    pub se_linux: Option<Value>,
    /// Supplemental groups strategy
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supplemental_groups: Option<Value>,
    /// FSGroup strategy
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fs_group: Option<Value>,
    /// Remaining policy fields (capabilities, host ports and paths, ...)
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_shape_matches_policy_api() {
        let policy = PodSecurityPolicy::new(
            "restricted",
            PodSecurityPolicySpec {
                privileged: Some(false),
                se_linux: Some(serde_json::json!({"rule": "RunAsAny"})),
                ..Default::default()
            },
        );
        let value = serde_json::to_value(&policy).unwrap();
        assert_eq!(value["apiVersion"], "policy/v1beta1");
        assert_eq!(value["kind"], "PodSecurityPolicy");
        assert_eq!(value["metadata"]["name"], "restricted");
        assert_eq!(value["spec"]["privileged"], false);
        assert_eq!(value["spec"]["seLinux"]["rule"], "RunAsAny");
    }

    #[test]
    fn test_decoded_policy_keeps_every_field() {
        let spec = serde_json::json!({
            "privileged": false,
            "hostPID": false,
            "hostIPC": true,
            "requiredDropCapabilities": ["ALL"],
            "allowedCapabilities": ["NET_BIND_SERVICE"],
            "allowedHostPaths": [{"pathPrefix": "/var/log", "readOnly": true}],
            "hostPorts": [{"min": 8000, "max": 8080}],
            "runAsGroup": {"rule": "MustRunAs", "ranges": [{"min": 1, "max": 65535}]},
            "seLinux": {"rule": "RunAsAny"},
            "volumes": ["configMap", "secret"]
        });
        let document = serde_json::json!({
            "apiVersion": "policy/v1beta1",
            "kind": "PodSecurityPolicy",
            "metadata": {"name": "restricted"},
            "spec": spec,
        });

        let policy: PodSecurityPolicy = serde_json::from_value(document).unwrap();
        assert_eq!(policy.spec.host_pid, Some(false));
        assert_eq!(policy.spec.host_ipc, Some(true));
        assert!(policy.spec.extra.contains_key("requiredDropCapabilities"));

        let value = serde_json::to_value(&policy).unwrap();
        assert_eq!(value["spec"], spec);
        assert!(value["spec"].get("hostPid").is_none());
    }
}
