//! Labels, selectors and annotations on managed objects
//!
//! Selectors carry `app`, `chi` and the keys of the scope they select.
//! Labels are the selector plus the namespace label and, for Services and
//! ConfigMaps, a role label.

use std::collections::BTreeMap;

use crate::model::{Cluster, HostAddress, Installation, Shard};

/// Prefix shared by every operator label
pub const LABEL_PREFIX: &str = "clickhouse.altinity.com";
/// Marks objects managed by the operator
pub const LABEL_APP: &str = "clickhouse.altinity.com/app";
/// Value of [`LABEL_APP`]
pub const LABEL_APP_VALUE: &str = "chop";
/// Installation name
pub const LABEL_CHI: &str = "clickhouse.altinity.com/chi";
/// Installation namespace
pub const LABEL_NAMESPACE: &str = "clickhouse.altinity.com/namespace";
/// Cluster name
pub const LABEL_CLUSTER: &str = "clickhouse.altinity.com/cluster";
/// Shard name
pub const LABEL_SHARD: &str = "clickhouse.altinity.com/shard";
/// Replica name
pub const LABEL_REPLICA: &str = "clickhouse.altinity.com/replica";
/// ConfigMap role
pub const LABEL_CONFIGMAP: &str = "clickhouse.altinity.com/ConfigMap";
/// Service role
pub const LABEL_SERVICE: &str = "clickhouse.altinity.com/Service";
/// Hash of the desired object, used to skip no-op updates
pub const ANNOTATION_OBJECT_VERSION: &str = "clickhouse.altinity.com/object-version";

/// [`LABEL_CONFIGMAP`] value of the common ConfigMap
pub const CONFIGMAP_COMMON: &str = "ChiCommon";
/// [`LABEL_CONFIGMAP`] value of the users ConfigMap
pub const CONFIGMAP_COMMON_USERS: &str = "ChiCommonUsers";
/// [`LABEL_CONFIGMAP`] value of host ConfigMaps
pub const CONFIGMAP_HOST: &str = "Host";

/// [`LABEL_SERVICE`] value per scope
pub const SERVICE_CHI: &str = "chi";
/// Cluster scope Service
pub const SERVICE_CLUSTER: &str = "cluster";
/// Shard scope Service
pub const SERVICE_SHARD: &str = "shard";
/// Host scope Service
pub const SERVICE_HOST: &str = "host";

type Labels = BTreeMap<String, String>;

fn base(installation_name: &str) -> Labels {
    let mut labels = Labels::new();
    labels.insert(LABEL_APP.to_string(), LABEL_APP_VALUE.to_string());
    labels.insert(LABEL_CHI.to_string(), installation_name.to_string());
    labels
}

/// Selects every pod of the installation
pub fn installation_selector(installation: &Installation) -> Labels {
    base(&installation.name)
}

/// Selects every pod of the cluster
pub fn cluster_selector(cluster: &Cluster) -> Labels {
    let mut labels = base(&cluster.installation_name);
    labels.insert(LABEL_CLUSTER.to_string(), cluster.name.clone());
    labels
}

/// Selects every pod of the shard
pub fn shard_selector(cluster: &Cluster, shard: &Shard) -> Labels {
    let mut labels = cluster_selector(cluster);
    labels.insert(LABEL_SHARD.to_string(), shard.name.clone());
    labels
}

/// Selects the pod of one host
pub fn host_selector(address: &HostAddress) -> Labels {
    let mut labels = base(&address.installation_name);
    labels.insert(LABEL_CLUSTER.to_string(), address.cluster_name.clone());
    labels.insert(LABEL_SHARD.to_string(), address.shard_name.clone());
    labels.insert(LABEL_REPLICA.to_string(), address.replica_name.clone());
    labels
}

fn with_namespace(mut labels: Labels, namespace: &str) -> Labels {
    labels.insert(LABEL_NAMESPACE.to_string(), namespace.to_string());
    labels
}

fn with_role(mut labels: Labels, key: &str, value: &str) -> Labels {
    labels.insert(key.to_string(), value.to_string());
    labels
}

/// Labels of installation-scope objects
pub fn installation_labels(installation: &Installation) -> Labels {
    with_namespace(installation_selector(installation), &installation.namespace)
}

/// Labels of cluster-scope objects
pub fn cluster_labels(cluster: &Cluster) -> Labels {
    with_namespace(cluster_selector(cluster), &cluster.namespace)
}

/// Labels of host-scope objects (StatefulSet and its pods)
pub fn host_labels(address: &HostAddress) -> Labels {
    with_namespace(host_selector(address), &address.namespace)
}

/// Installation Service labels
pub fn installation_service_labels(installation: &Installation) -> Labels {
    with_role(installation_labels(installation), LABEL_SERVICE, SERVICE_CHI)
}

/// Cluster Service labels
pub fn cluster_service_labels(cluster: &Cluster) -> Labels {
    with_role(cluster_labels(cluster), LABEL_SERVICE, SERVICE_CLUSTER)
}

/// Shard Service labels
pub fn shard_service_labels(cluster: &Cluster, shard: &Shard) -> Labels {
    with_role(
        with_namespace(shard_selector(cluster, shard), &cluster.namespace),
        LABEL_SERVICE,
        SERVICE_SHARD,
    )
}

/// Host Service labels
pub fn host_service_labels(address: &HostAddress) -> Labels {
    with_role(host_labels(address), LABEL_SERVICE, SERVICE_HOST)
}

/// Common ConfigMap labels
pub fn common_configmap_labels(installation: &Installation) -> Labels {
    with_role(installation_labels(installation), LABEL_CONFIGMAP, CONFIGMAP_COMMON)
}

/// Users ConfigMap labels
pub fn users_configmap_labels(installation: &Installation) -> Labels {
    with_role(
        installation_labels(installation),
        LABEL_CONFIGMAP,
        CONFIGMAP_COMMON_USERS,
    )
}

/// Host ConfigMap labels
pub fn host_configmap_labels(address: &HostAddress) -> Labels {
    with_role(host_labels(address), LABEL_CONFIGMAP, CONFIGMAP_HOST)
}

/// Label selector string matching every object of an installation
pub fn installation_list_selector(installation_name: &str) -> String {
    format!("{LABEL_APP}={LABEL_APP_VALUE},{LABEL_CHI}={installation_name}")
}

/// Rebuild a host address from the labels of an observed object
pub fn host_address_from_labels(labels: &Labels, namespace: &str) -> Option<HostAddress> {
    let get = |key: &str| labels.get(key).cloned();
    let shard_name = get(LABEL_SHARD)?;
    let replica_name = get(LABEL_REPLICA)?;
    Some(HostAddress {
        namespace: namespace.to_string(),
        installation_name: get(LABEL_CHI)?,
        cluster_name: get(LABEL_CLUSTER)?,
        host_name: format!("{shard_name}-{replica_name}"),
        shard_name,
        replica_name,
        ..Default::default()
    })
}

/// Merge `required` into `existing`; keys already in `existing` win
pub fn merge_preserving(existing: Option<Labels>, required: Labels) -> Labels {
    let mut merged = required;
    if let Some(existing) = existing {
        merged.extend(existing);
    }
    merged
}
