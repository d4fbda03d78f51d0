//! Object names derived from the cluster tree

use crate::model::{Cluster, HostAddress, Installation, Shard};

/// Installation-wide Service
pub fn installation_service(installation: &Installation) -> String {
    format!("clickhouse-{}", installation.name)
}

/// Cluster Service
pub fn cluster_service(cluster: &Cluster) -> String {
    format!("cluster-{}-{}", cluster.installation_name, cluster.name)
}

/// Shard Service
pub fn shard_service(cluster: &Cluster, shard: &Shard) -> String {
    format!(
        "shard-{}-{}-{}",
        cluster.installation_name, cluster.name, shard.name
    )
}

/// StatefulSet of a host
pub fn statefulset(address: &HostAddress) -> String {
    format!(
        "chi-{}-{}-{}-{}",
        address.installation_name, address.cluster_name, address.shard_name, address.replica_name
    )
}

/// Service of a host; same as its StatefulSet
pub fn host_service(address: &HostAddress) -> String {
    statefulset(address)
}

/// Pod hostname of a host's single replica
pub fn pod_hostname(address: &HostAddress) -> String {
    host_service(address)
}

/// Fully qualified DNS name of a host
pub fn host_fqdn(address: &HostAddress) -> String {
    format!(
        "{}.{}.svc.cluster.local",
        host_service(address),
        address.namespace
    )
}

/// Fully qualified DNS name of the installation Service
pub fn installation_fqdn(installation: &Installation) -> String {
    format!(
        "{}.{}.svc.cluster.local",
        installation_service(installation),
        installation.namespace
    )
}

/// ConfigMap with `config.d` files shared by every host
pub fn common_configmap(installation: &Installation) -> String {
    format!("chi-{}-common-configd", installation.name)
}

/// ConfigMap with `users.d` files shared by every host
pub fn users_configmap(installation: &Installation) -> String {
    format!("chi-{}-common-usersd", installation.name)
}

/// ConfigMap with a host's `conf.d` files
pub fn host_configmap(address: &HostAddress) -> String {
    format!(
        "chi-{}-deploy-confd-{}-{}-{}",
        address.installation_name, address.cluster_name, address.shard_name, address.replica_name
    )
}

/// PodDisruptionBudget of a cluster
pub fn pod_disruption_budget(cluster: &Cluster) -> String {
    format!("{}-{}", cluster.installation_name, cluster.name)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn address() -> HostAddress {
        HostAddress {
            namespace: "analytics".to_string(),
            installation_name: "demo".to_string(),
            cluster_name: "events".to_string(),
            shard_name: "1".to_string(),
            shard_index: 1,
            replica_name: "0".to_string(),
            host_name: "1-0".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn host_object_names() {
        let address = address();
        assert_eq!(statefulset(&address), "chi-demo-events-1-0");
        assert_eq!(host_service(&address), "chi-demo-events-1-0");
        assert_eq!(host_configmap(&address), "chi-demo-deploy-confd-events-1-0");
        assert_eq!(host_fqdn(&address), "chi-demo-events-1-0.analytics.svc.cluster.local");
    }

    #[test]
    fn installation_and_cluster_names() {
        let installation = Installation {
            namespace: "analytics".to_string(),
            name: "demo".to_string(),
            ..Default::default()
        };
        let cluster = Cluster::new("analytics", "demo", "events", 0);
        let shard = Shard {
            name: "2".to_string(),
            index: 2,
            ..Default::default()
        };

        assert_eq!(installation_service(&installation), "clickhouse-demo");
        assert_eq!(common_configmap(&installation), "chi-demo-common-configd");
        assert_eq!(users_configmap(&installation), "chi-demo-common-usersd");
        assert_eq!(cluster_service(&cluster), "cluster-demo-events");
        assert_eq!(shard_service(&cluster, &shard), "shard-demo-events-2");
        assert_eq!(pod_disruption_budget(&cluster), "demo-events");
        assert_eq!(
            installation_fqdn(&installation),
            "clickhouse-demo.analytics.svc.cluster.local"
        );
    }
}
