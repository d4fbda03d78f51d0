//! Carry platform-assigned state from the current object into the desired one
//!
//! Updates are full replacements, so anything the API server assigned (or
//! anything another actor added) has to be copied forward before submit.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{Service, ServiceSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::Resource;

use crate::{Error, Result};

fn merge_map(
    current: Option<&BTreeMap<String, String>>,
    desired: Option<BTreeMap<String, String>>,
) -> Option<BTreeMap<String, String>> {
    match (current, desired) {
        (None, desired) => desired,
        (Some(current), desired) => {
            let mut merged = current.clone();
            merged.extend(desired.unwrap_or_default());
            Some(merged)
        }
    }
}

/// Copy resourceVersion and keep labels, annotations and finalizers that
/// the desired object does not override.
pub fn migrate_meta(current: &ObjectMeta, desired: &mut ObjectMeta) {
    desired.resource_version = current.resource_version.clone();
    desired.labels = merge_map(current.labels.as_ref(), desired.labels.take());
    desired.annotations = merge_map(current.annotations.as_ref(), desired.annotations.take());

    if let Some(current_finalizers) = &current.finalizers {
        let finalizers = desired.finalizers.get_or_insert_with(Vec::new);
        for finalizer in current_finalizers {
            if !finalizers.contains(finalizer) {
                finalizers.push(finalizer.clone());
            }
        }
    }
}

/// Generic migration for kinds without sticky spec fields
pub fn migrate_object<K: Resource>(current: &K, mut desired: K) -> Result<K> {
    migrate_meta(current.meta(), desired.meta_mut());
    Ok(desired)
}

fn service_type(spec: Option<&ServiceSpec>) -> &str {
    spec.and_then(|s| s.type_.as_deref()).unwrap_or("ClusterIP")
}

fn is_local_policy(spec: &ServiceSpec) -> bool {
    spec.external_traffic_policy.as_deref() == Some("Local")
}

fn migrate_service_spec(cur: &ServiceSpec, spec: &mut ServiceSpec, service_type: &str) {
    if cur.cluster_ip.as_deref().is_some_and(|ip| !ip.is_empty()) {
        spec.cluster_ip = cur.cluster_ip.clone();
        spec.cluster_ips = cur.cluster_ips.clone();
    }

    if matches!(service_type, "NodePort" | "LoadBalancer") {
        for port in spec.ports.iter_mut().flatten() {
            if port.node_port.is_some() {
                continue;
            }
            port.node_port = cur
                .ports
                .iter()
                .flatten()
                .find(|p| p.port == port.port)
                .and_then(|p| p.node_port);
        }
    }

    if is_local_policy(cur) && is_local_policy(spec) && spec.health_check_node_port.is_none() {
        spec.health_check_node_port = cur.health_check_node_port;
    }

    if spec.load_balancer_class.is_none() {
        spec.load_balancer_class = cur.load_balancer_class.clone();
    }
}

/// Service migration; a type change is rejected as immutable
pub fn migrate_service(current: &Service, mut desired: Service) -> Result<Service> {
    let current_type = service_type(current.spec.as_ref());
    let desired_type = service_type(desired.spec.as_ref());
    if current_type != desired_type {
        return Err(Error::immutable_field(
            "Service",
            current.metadata.namespace.clone().unwrap_or_default(),
            current.metadata.name.clone().unwrap_or_default(),
            format!("type {current_type} -> {desired_type}"),
        ));
    }

    migrate_meta(&current.metadata, &mut desired.metadata);

    if let (Some(cur), Some(spec)) = (current.spec.as_ref(), desired.spec.as_mut()) {
        migrate_service_spec(cur, spec, current_type);
    }
    Ok(desired)
}
