//! Host workload: one StatefulSet per host

use k8s_openapi::api::apps::v1::{StatefulSet, StatefulSetSpec};
use k8s_openapi::api::core::v1::{
    ConfigMapVolumeSource, Container, ContainerPort, HTTPGetAction, HostAlias,
    PersistentVolumeClaim, PodSpec, PodTemplateSpec, Probe, Volume, VolumeMount,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use tracing::{debug, warn};

use crate::crd::VolumeClaimTemplate;
use crate::model::Host;
use crate::{
    Result, DIR_CLICKHOUSE_DATA, DIR_CLICKHOUSE_LOG, DIR_CONFIG_D, DIR_CONF_D, DIR_USERS_D,
    PORT_NAME_HTTP, PORT_NAME_INTERSERVER_HTTP, PORT_NAME_TCP,
};

use super::{labels, names, Creator};

/// Name of the server container
pub const CLICKHOUSE_CONTAINER: &str = "clickhouse";
/// Name of the log sidecar container
pub const CLICKHOUSE_LOG_CONTAINER: &str = "clickhouse-log";

/// Set the port called `name` to `port`, adding it when missing.
///
/// An existing entry keeps its position; its host port is cleared.
pub fn ensure_port_by_name(container: &mut Container, name: &str, port: i32) {
    let ports = container.ports.get_or_insert_with(Vec::new);
    match ports
        .iter_mut()
        .find(|p| p.name.as_deref() == Some(name))
    {
        Some(existing) => {
            existing.container_port = port;
            existing.host_port = None;
        }
        None => ports.push(ContainerPort {
            name: Some(name.to_string()),
            container_port: port,
            protocol: Some("TCP".to_string()),
            ..Default::default()
        }),
    }
}

/// Make the container expose the host's three named ports
pub fn ensure_named_ports(container: &mut Container, host: &Host) {
    ensure_port_by_name(container, PORT_NAME_HTTP, host.http_port);
    ensure_port_by_name(container, PORT_NAME_TCP, host.tcp_port);
    ensure_port_by_name(container, PORT_NAME_INTERSERVER_HTTP, host.interserver_http_port);
}

fn claim_from_template(template: &VolumeClaimTemplate) -> PersistentVolumeClaim {
    let mut metadata = template.metadata.clone().unwrap_or_default();
    metadata.name = Some(template.name.clone());
    metadata.namespace = None;
    PersistentVolumeClaim {
        metadata,
        spec: Some(template.spec.clone()),
        ..Default::default()
    }
}

/// Add a claim template unless one with the same name is already present
pub fn append_volume_claim_template(spec: &mut StatefulSetSpec, template: &VolumeClaimTemplate) {
    let claims = spec.volume_claim_templates.get_or_insert_with(Vec::new);
    if claims
        .iter()
        .any(|c| c.metadata.name.as_deref() == Some(template.name.as_str()))
    {
        return;
    }
    claims.push(claim_from_template(template));
}

/// Mount a claim template at `mount_path` in every container.
///
/// A container is left alone when it already mounts a volume of that name
/// or already has something mounted at `mount_path`. The claim template is
/// added only when at least one container ends up mounting it.
pub fn apply_volume_claim_template(
    spec: &mut StatefulSetSpec,
    template: &VolumeClaimTemplate,
    mount_path: &str,
) {
    let Some(pod) = spec.template.spec.as_mut() else {
        return;
    };
    let mut mounted = false;
    for container in &mut pod.containers {
        let mounts = container.volume_mounts.get_or_insert_with(Vec::new);
        if mounts.iter().any(|m| m.name == template.name) {
            debug!(
                container = %container.name,
                volume = %template.name,
                "volume already mounted"
            );
            mounted = true;
            continue;
        }
        if mounts.iter().any(|m| m.mount_path == mount_path) {
            warn!(
                container = %container.name,
                volume = %template.name,
                path = %mount_path,
                "mount path already in use"
            );
            continue;
        }
        mounts.push(VolumeMount {
            name: template.name.clone(),
            mount_path: mount_path.to_string(),
            ..Default::default()
        });
        mounted = true;
    }

    if mounted {
        append_volume_claim_template(spec, template);
    }
}

fn ping_probe(initial_delay_seconds: i32, period_seconds: i32) -> Probe {
    Probe {
        http_get: Some(HTTPGetAction {
            path: Some("/ping".to_string()),
            port: IntOrString::String(PORT_NAME_HTTP.to_string()),
            ..Default::default()
        }),
        initial_delay_seconds: Some(initial_delay_seconds),
        period_seconds: Some(period_seconds),
        ..Default::default()
    }
}

fn configmap_volume(name: String) -> Volume {
    Volume {
        name: name.clone(),
        config_map: Some(ConfigMapVolumeSource {
            name,
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn mount_everywhere(pod: &mut PodSpec, volume: &str, mount_path: &str) {
    for container in &mut pod.containers {
        let mounts = container.volume_mounts.get_or_insert_with(Vec::new);
        if mounts.iter().any(|m| m.name == volume) {
            continue;
        }
        mounts.push(VolumeMount {
            name: volume.to_string(),
            mount_path: mount_path.to_string(),
            ..Default::default()
        });
    }
}

impl Creator<'_> {
    fn default_pod_spec(&self) -> PodSpec {
        PodSpec {
            containers: vec![Container {
                name: CLICKHOUSE_CONTAINER.to_string(),
                image: Some(self.defaults.image.clone()),
                readiness_probe: Some(ping_probe(10, 3)),
                liveness_probe: Some(Probe {
                    failure_threshold: Some(10),
                    ..ping_probe(60, 3)
                }),
                ..Default::default()
            }],
            ..Default::default()
        }
    }

    fn pod_template(&self, host: &Host) -> PodTemplateSpec {
        let template = host.templates.pod_template.as_ref().and_then(|name| {
            let found = self.installation.templates.pod_template(name);
            if found.is_none() {
                warn!(host = %host.name(), template = %name, "pod template not found");
            }
            found
        });

        let (mut metadata, spec) = match template {
            Some(t) => (t.metadata.clone().unwrap_or_default(), t.spec.clone()),
            None => (ObjectMeta::default(), self.default_pod_spec()),
        };
        metadata.name = None;
        metadata.namespace = None;
        metadata.labels = Some(labels::merge_preserving(
            metadata.labels.take(),
            labels::host_labels(&host.address),
        ));

        PodTemplateSpec {
            metadata: Some(metadata),
            spec: Some(spec),
        }
    }

    fn add_log_sidecar(&self, pod: &mut PodSpec) {
        if pod.containers.iter().any(|c| c.name == CLICKHOUSE_LOG_CONTAINER) {
            return;
        }
        pod.containers.push(Container {
            name: CLICKHOUSE_LOG_CONTAINER.to_string(),
            image: Some(self.defaults.log_image.clone()),
            command: Some(vec![
                "/bin/sh".to_string(),
                "-c".to_string(),
                "--".to_string(),
            ]),
            args: Some(vec!["while true; do sleep 30; done;".to_string()]),
            ..Default::default()
        });
    }

    fn volume_claim_template(&self, name: Option<&String>) -> Option<&VolumeClaimTemplate> {
        let name = name?;
        let template = self.installation.templates.volume_claim_template(name);
        if template.is_none() {
            warn!(
                chi = %self.installation.name,
                template = %name,
                "volume claim template not found"
            );
        }
        template
    }

    /// StatefulSet running one host
    pub fn statefulset(&self, host: &Host) -> Result<StatefulSet> {
        let address = &host.address;
        let installation = self.installation;

        let mut spec = StatefulSetSpec {
            replicas: Some(if installation.stop { 0 } else { 1 }),
            service_name: Some(names::host_service(address)),
            selector: LabelSelector {
                match_labels: Some(labels::host_selector(address)),
                ..Default::default()
            },
            template: self.pod_template(host),
            ..Default::default()
        };

        let log_template =
            self.volume_claim_template(host.templates.log_volume_claim_template.as_ref());
        let data_template =
            self.volume_claim_template(host.templates.data_volume_claim_template.as_ref());

        if let Some(pod) = spec.template.spec.as_mut() {
            if host.templates.log_volume_claim_template.is_some() {
                self.add_log_sidecar(pod);
            }
            for container in &mut pod.containers {
                ensure_named_ports(container, host);
            }

            pod.host_aliases
                .get_or_insert_with(Vec::new)
                .push(HostAlias {
                    ip: "127.0.0.1".to_string(),
                    hostnames: Some(vec![names::pod_hostname(address)]),
                });

            let config_volumes = [
                (names::common_configmap(installation), DIR_CONFIG_D),
                (names::users_configmap(installation), DIR_USERS_D),
                (names::host_configmap(address), DIR_CONF_D),
            ];
            for (configmap, path) in config_volumes {
                mount_everywhere(pod, &configmap, path);
                let volumes = pod.volumes.get_or_insert_with(Vec::new);
                if !volumes.iter().any(|v| v.name == configmap) {
                    volumes.push(configmap_volume(configmap));
                }
            }
        }

        // Mounts naming a claim template rather than a pod volume
        let mounted: Vec<String> = spec
            .template
            .spec
            .iter()
            .flat_map(|pod| {
                let volumes: Vec<&str> = pod
                    .volumes
                    .iter()
                    .flatten()
                    .map(|v| v.name.as_str())
                    .collect();
                pod.containers
                    .iter()
                    .flat_map(|c| c.volume_mounts.iter().flatten())
                    .filter(move |m| !volumes.contains(&m.name.as_str()))
                    .map(|m| m.name.clone())
                    .collect::<Vec<_>>()
            })
            .collect();
        for name in mounted {
            if let Some(template) = installation.templates.volume_claim_template(&name) {
                append_volume_claim_template(&mut spec, template);
            }
        }

        if let Some(template) = data_template {
            apply_volume_claim_template(&mut spec, template, DIR_CLICKHOUSE_DATA);
        }
        if let Some(template) = log_template {
            apply_volume_claim_template(&mut spec, template, DIR_CLICKHOUSE_LOG);
        }

        let statefulset = StatefulSet {
            metadata: ObjectMeta {
                name: Some(names::statefulset(address)),
                namespace: Some(address.namespace.clone()),
                labels: Some(labels::host_labels(address)),
                ..Default::default()
            },
            spec: Some(spec),
            ..Default::default()
        };
        self.finalize(statefulset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DefaultsConfig;
    use crate::crd::{PodTemplate, Templates};
    use crate::generator::ClickHouseFilesGenerator;
    use crate::model::{Cluster, HostId, Installation};
    use k8s_openapi::api::core::v1::PersistentVolumeClaimSpec;

    fn claim(name: &str) -> VolumeClaimTemplate {
        VolumeClaimTemplate {
            name: name.to_string(),
            metadata: None,
            spec: PersistentVolumeClaimSpec {
                access_modes: Some(vec!["ReadWriteOnce".to_string()]),
                ..Default::default()
            },
        }
    }

    fn installation(templates: Templates) -> Installation {
        let mut cluster = Cluster::new("ns", "demo", "main", 0);
        let host = cluster.get_or_create_host(0, 0);
        host.tcp_port = 9000;
        host.http_port = 8123;
        host.interserver_http_port = 9009;
        Installation {
            namespace: "ns".to_string(),
            name: "demo".to_string(),
            templates,
            clusters: vec![cluster],
            ..Default::default()
        }
    }

    fn build(chi: &Installation) -> StatefulSet {
        let defaults = DefaultsConfig::default();
        let creator = Creator::new(chi, &defaults, &ClickHouseFilesGenerator);
        let host = chi.host(HostId::new(0, 0, 0)).unwrap();
        creator.statefulset(host).unwrap()
    }

    fn mounts_of(sts: &StatefulSet, container: &str) -> Vec<(String, String)> {
        let pod = sts.spec.as_ref().unwrap().template.spec.as_ref().unwrap();
        pod.containers
            .iter()
            .find(|c| c.name == container)
            .unwrap()
            .volume_mounts
            .iter()
            .flatten()
            .map(|m| (m.name.clone(), m.mount_path.clone()))
            .collect()
    }

    // ===================================================================
    // Named ports
    // ===================================================================

    #[test]
    fn existing_port_is_overwritten_in_place() {
        let mut container = Container {
            ports: Some(vec![
                ContainerPort {
                    name: Some("metrics".to_string()),
                    container_port: 9363,
                    ..Default::default()
                },
                ContainerPort {
                    name: Some("http".to_string()),
                    container_port: 1,
                    host_port: Some(8123),
                    ..Default::default()
                },
            ]),
            ..Default::default()
        };

        ensure_port_by_name(&mut container, "http", 8124);
        ensure_port_by_name(&mut container, "tcp", 9000);

        let ports = container.ports.unwrap();
        assert_eq!(ports.len(), 3);
        assert_eq!(ports[1].name.as_deref(), Some("http"));
        assert_eq!(ports[1].container_port, 8124);
        assert_eq!(ports[1].host_port, None);
        assert_eq!(ports[2].name.as_deref(), Some("tcp"));
    }

    // ===================================================================
    // Volume claim templates
    // ===================================================================

    #[test]
    fn claim_templates_are_deduplicated_by_name() {
        let mut spec = StatefulSetSpec::default();
        append_volume_claim_template(&mut spec, &claim("data"));
        append_volume_claim_template(&mut spec, &claim("data"));
        append_volume_claim_template(&mut spec, &claim("logs"));
        assert_eq!(spec.volume_claim_templates.unwrap().len(), 2);
    }

    #[test]
    fn mounting_twice_yields_one_mount_and_one_claim() {
        let mut spec = StatefulSetSpec {
            template: PodTemplateSpec {
                spec: Some(PodSpec {
                    containers: vec![Container {
                        name: CLICKHOUSE_CONTAINER.to_string(),
                        ..Default::default()
                    }],
                    ..Default::default()
                }),
                ..Default::default()
            },
            ..Default::default()
        };

        apply_volume_claim_template(&mut spec, &claim("data"), DIR_CLICKHOUSE_DATA);
        apply_volume_claim_template(&mut spec, &claim("data"), DIR_CLICKHOUSE_DATA);

        let pod = spec.template.spec.as_ref().unwrap();
        assert_eq!(pod.containers[0].volume_mounts.as_ref().unwrap().len(), 1);
        assert_eq!(spec.volume_claim_templates.unwrap().len(), 1);
    }

    #[test]
    fn renumbered_host_port_replaces_hand_authored_one() {
        let mut chi = installation(Templates::default());
        chi.clusters[0].host_mut(0, 0).unwrap().tcp_port = 9001;
        let host = chi.host(HostId::new(0, 0, 0)).unwrap();
        let mut container = Container {
            ports: Some(vec![ContainerPort {
                name: Some("tcp".to_string()),
                container_port: 9000,
                ..Default::default()
            }]),
            ..Default::default()
        };

        ensure_named_ports(&mut container, host);

        let ports = container.ports.unwrap();
        let tcp: Vec<_> = ports
            .iter()
            .filter(|p| p.name.as_deref() == Some("tcp"))
            .collect();
        assert_eq!(tcp.len(), 1);
        assert_eq!(tcp[0].container_port, 9001);
        assert_eq!(ports.len(), 3);
    }

    #[test]
    fn occupied_mount_path_is_left_alone() {
        let mut spec = StatefulSetSpec {
            template: PodTemplateSpec {
                spec: Some(PodSpec {
                    containers: vec![
                        Container {
                            name: "a".to_string(),
                            volume_mounts: Some(vec![VolumeMount {
                                name: "scratch".to_string(),
                                mount_path: DIR_CLICKHOUSE_DATA.to_string(),
                                ..Default::default()
                            }]),
                            ..Default::default()
                        },
                        Container {
                            name: "b".to_string(),
                            ..Default::default()
                        },
                    ],
                    ..Default::default()
                }),
                ..Default::default()
            },
            ..Default::default()
        };

        apply_volume_claim_template(&mut spec, &claim("data"), DIR_CLICKHOUSE_DATA);

        let pod = spec.template.spec.unwrap();
        assert_eq!(pod.containers[0].volume_mounts.as_ref().unwrap().len(), 1);
        let b = pod.containers[1].volume_mounts.as_ref().unwrap();
        assert_eq!(b[0].name, "data");
        assert_eq!(spec.volume_claim_templates.unwrap().len(), 1);
    }

    #[test]
    fn claim_is_not_added_when_nothing_can_mount_it() {
        let mut spec = StatefulSetSpec {
            template: PodTemplateSpec {
                spec: Some(PodSpec {
                    containers: vec![Container {
                        name: CLICKHOUSE_CONTAINER.to_string(),
                        volume_mounts: Some(vec![VolumeMount {
                            name: "scratch".to_string(),
                            mount_path: DIR_CLICKHOUSE_DATA.to_string(),
                            ..Default::default()
                        }]),
                        ..Default::default()
                    }],
                    ..Default::default()
                }),
                ..Default::default()
            },
            ..Default::default()
        };

        apply_volume_claim_template(&mut spec, &claim("data"), DIR_CLICKHOUSE_DATA);

        let pod = spec.template.spec.as_ref().unwrap();
        let mounts = pod.containers[0].volume_mounts.as_ref().unwrap();
        assert_eq!(mounts.len(), 1);
        assert_eq!(mounts[0].name, "scratch");
        assert!(spec.volume_claim_templates.unwrap_or_default().is_empty());
    }

    // ===================================================================
    // Full pipeline
    // ===================================================================

    #[test]
    fn every_container_exposes_named_ports() {
        let pod = PodTemplate {
            name: "with-sidecar".to_string(),
            metadata: None,
            spec: PodSpec {
                containers: vec![
                    Container {
                        name: CLICKHOUSE_CONTAINER.to_string(),
                        ..Default::default()
                    },
                    Container {
                        name: "sidecar".to_string(),
                        ..Default::default()
                    },
                ],
                ..Default::default()
            },
        };
        let mut chi = installation(Templates {
            pod_templates: vec![pod],
            ..Default::default()
        });
        chi.clusters[0].host_mut(0, 0).unwrap().templates.pod_template =
            Some("with-sidecar".to_string());

        let sts = build(&chi);

        let pod = sts.spec.as_ref().unwrap().template.spec.as_ref().unwrap();
        for container in &pod.containers {
            let mut names: Vec<_> = container
                .ports
                .iter()
                .flatten()
                .filter_map(|p| p.name.clone())
                .collect();
            names.sort();
            assert_eq!(
                names,
                vec!["http", "interserver-http", "tcp"],
                "container {}",
                container.name
            );
        }
    }

    #[test]
    fn default_workload_mounts_config_directories() {
        let sts = build(&installation(Templates::default()));
        let spec = sts.spec.as_ref().unwrap();

        assert_eq!(sts.metadata.name.as_deref(), Some("chi-demo-main-0-0"));
        assert_eq!(spec.replicas, Some(1));
        assert_eq!(spec.service_name.as_deref(), Some("chi-demo-main-0-0"));

        let mounts = mounts_of(&sts, CLICKHOUSE_CONTAINER);
        assert!(mounts.contains(&(
            "chi-demo-common-configd".to_string(),
            DIR_CONFIG_D.to_string()
        )));
        assert!(mounts.contains(&(
            "chi-demo-common-usersd".to_string(),
            DIR_USERS_D.to_string()
        )));
        assert!(mounts.contains(&(
            "chi-demo-deploy-confd-main-0-0".to_string(),
            DIR_CONF_D.to_string()
        )));

        let pod = spec.template.spec.as_ref().unwrap();
        let alias = &pod.host_aliases.as_ref().unwrap()[0];
        assert_eq!(alias.ip, "127.0.0.1");
        let ports = pod.containers[0].ports.as_ref().unwrap();
        assert_eq!(ports.len(), 3);
        assert!(spec.volume_claim_templates.is_none());
    }

    #[test]
    fn stopped_installation_scales_to_zero() {
        let mut chi = installation(Templates::default());
        chi.stop = true;
        assert_eq!(build(&chi).spec.unwrap().replicas, Some(0));
    }

    #[test]
    fn data_and_log_templates_add_claims_and_sidecar() {
        let mut chi = installation(Templates {
            volume_claim_templates: vec![claim("data"), claim("logs")],
            ..Default::default()
        });
        let templates = &mut chi.clusters[0].host_mut(0, 0).unwrap().templates;
        templates.data_volume_claim_template = Some("data".to_string());
        templates.log_volume_claim_template = Some("logs".to_string());

        let sts = build(&chi);

        let claims = sts.spec.as_ref().unwrap().volume_claim_templates.as_ref().unwrap();
        assert_eq!(claims.len(), 2);
        let server = mounts_of(&sts, CLICKHOUSE_CONTAINER);
        assert!(server.contains(&("data".to_string(), DIR_CLICKHOUSE_DATA.to_string())));
        assert!(server.contains(&("logs".to_string(), DIR_CLICKHOUSE_LOG.to_string())));
        let sidecar = mounts_of(&sts, CLICKHOUSE_LOG_CONTAINER);
        assert!(sidecar.contains(&("logs".to_string(), DIR_CLICKHOUSE_LOG.to_string())));
    }

    #[test]
    fn mounts_referencing_claim_templates_pull_them_in() {
        let pod = PodTemplate {
            name: "custom".to_string(),
            metadata: None,
            spec: PodSpec {
                containers: vec![Container {
                    name: "clickhouse".to_string(),
                    image: Some("clickhouse/clickhouse-server:24.3".to_string()),
                    volume_mounts: Some(vec![VolumeMount {
                        name: "extra".to_string(),
                        mount_path: "/extra".to_string(),
                        ..Default::default()
                    }]),
                    ..Default::default()
                }],
                ..Default::default()
            },
        };
        let mut chi = installation(Templates {
            pod_templates: vec![pod],
            volume_claim_templates: vec![claim("extra"), claim("unused")],
            ..Default::default()
        });
        chi.clusters[0].host_mut(0, 0).unwrap().templates.pod_template =
            Some("custom".to_string());

        let sts = build(&chi);

        let claims = sts.spec.as_ref().unwrap().volume_claim_templates.as_ref().unwrap();
        assert_eq!(claims.len(), 1);
        assert_eq!(claims[0].metadata.name.as_deref(), Some("extra"));
        let pod = sts.spec.as_ref().unwrap().template.spec.as_ref().unwrap();
        assert_eq!(pod.containers.len(), 1);
        assert_eq!(
            pod.containers[0].image.as_deref(),
            Some("clickhouse/clickhouse-server:24.3")
        );
    }
}
