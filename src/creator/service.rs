//! Service objects

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{Service, ServicePort, ServiceSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use tracing::{debug, warn};

use crate::crd::ServiceTemplate;
use crate::model::{Cluster, Host, Shard};
use crate::{
    Error, Result, PORT_NAME_HTTP, PORT_NAME_INTERSERVER_HTTP, PORT_NAME_TCP,
};

use super::{labels, names, Creator};

/// Reject a template with a port outside 1..=65535
pub fn verify_service_ports(template: &ServiceTemplate) -> Result<()> {
    let ports = template.spec.ports.iter().flatten();
    for port in ports {
        if !(1..=65535).contains(&port.port) {
            return Err(Error::validation(
                format!("service template {}", template.name),
                format!("port {} out of range 1-65535", port.port),
            ));
        }
    }
    Ok(())
}

fn tcp_port(name: &str, port: i32, target: IntOrString) -> ServicePort {
    ServicePort {
        name: Some(name.to_string()),
        protocol: Some("TCP".to_string()),
        port,
        target_port: Some(target),
        ..Default::default()
    }
}

/// Instantiate a template: name and namespace are always ours, template
/// labels and selector keys win on collision.
fn service_from_template(
    template: &ServiceTemplate,
    namespace: &str,
    name: String,
    labels: BTreeMap<String, String>,
    selector: BTreeMap<String, String>,
) -> Result<Service> {
    verify_service_ports(template)?;

    let mut metadata = template.metadata.clone();
    metadata.name = Some(name);
    metadata.namespace = Some(namespace.to_string());
    metadata.generate_name = None;
    metadata.labels = Some(labels::merge_preserving(metadata.labels.take(), labels));

    let mut spec = template.spec.clone();
    spec.selector = Some(labels::merge_preserving(spec.selector.take(), selector));

    Ok(Service {
        metadata,
        spec: Some(spec),
        ..Default::default()
    })
}

impl Creator<'_> {
    fn lookup_service_template(&self, name: Option<&String>) -> Option<&ServiceTemplate> {
        let name = name?;
        let template = self.installation.templates.service_template(name);
        if template.is_none() {
            warn!(
                chi = %self.installation.name,
                template = %name,
                "service template not found"
            );
        }
        template
    }

    /// Installation-wide Service; a default LoadBalancer when no template is set
    pub fn installation_service(&self) -> Result<Service> {
        let installation = self.installation;
        let name = names::installation_service(installation);
        let labels = labels::installation_service_labels(installation);
        let selector = labels::installation_selector(installation);

        let service = match self
            .lookup_service_template(installation.defaults.service_template.as_ref())
        {
            Some(template) => {
                service_from_template(template, &installation.namespace, name, labels, selector)?
            }
            None => Service {
                metadata: ObjectMeta {
                    name: Some(name),
                    namespace: Some(installation.namespace.clone()),
                    labels: Some(labels),
                    ..Default::default()
                },
                spec: Some(ServiceSpec {
                    type_: Some("LoadBalancer".to_string()),
                    selector: Some(selector),
                    ports: Some(vec![
                        tcp_port(
                            PORT_NAME_HTTP,
                            self.defaults.http_port,
                            IntOrString::String(PORT_NAME_HTTP.to_string()),
                        ),
                        tcp_port(
                            PORT_NAME_TCP,
                            self.defaults.tcp_port,
                            IntOrString::String(PORT_NAME_TCP.to_string()),
                        ),
                    ]),
                    ..Default::default()
                }),
                ..Default::default()
            },
        };
        self.finalize(service)
    }

    /// Cluster Service; only when the cluster names a template
    pub fn cluster_service(&self, cluster: &Cluster) -> Result<Option<Service>> {
        let Some(template) =
            self.lookup_service_template(cluster.templates.cluster_service_template.as_ref())
        else {
            return Ok(None);
        };
        let service = service_from_template(
            template,
            &cluster.namespace,
            names::cluster_service(cluster),
            labels::cluster_service_labels(cluster),
            labels::cluster_selector(cluster),
        )?;
        self.finalize(service).map(Some)
    }

    /// Shard Service; only when the shard names a template
    pub fn shard_service(&self, cluster: &Cluster, shard: &Shard) -> Result<Option<Service>> {
        let Some(template) =
            self.lookup_service_template(shard.templates.shard_service_template.as_ref())
        else {
            return Ok(None);
        };
        let service = service_from_template(
            template,
            &cluster.namespace,
            names::shard_service(cluster, shard),
            labels::shard_service_labels(cluster, shard),
            labels::shard_selector(cluster, shard),
        )?;
        self.finalize(service).map(Some)
    }

    /// Host Service; a default headless Service when no template is set
    pub fn host_service(&self, host: &Host) -> Result<Service> {
        let address = &host.address;
        let name = names::host_service(address);
        let labels = labels::host_service_labels(address);
        let selector = labels::host_selector(address);
        debug!(host = %host.name(), service = %name, "building host service");

        let service = match self
            .lookup_service_template(host.templates.replica_service_template.as_ref())
        {
            Some(template) => {
                service_from_template(template, host.namespace(), name, labels, selector)?
            }
            None => Service {
                metadata: ObjectMeta {
                    name: Some(name),
                    namespace: Some(host.namespace().to_string()),
                    labels: Some(labels),
                    ..Default::default()
                },
                spec: Some(ServiceSpec {
                    type_: Some("ClusterIP".to_string()),
                    cluster_ip: Some("None".to_string()),
                    publish_not_ready_addresses: Some(true),
                    selector: Some(selector),
                    ports: Some(vec![
                        tcp_port(PORT_NAME_HTTP, host.http_port, IntOrString::Int(host.http_port)),
                        tcp_port(PORT_NAME_TCP, host.tcp_port, IntOrString::Int(host.tcp_port)),
                        tcp_port(
                            PORT_NAME_INTERSERVER_HTTP,
                            host.interserver_http_port,
                            IntOrString::Int(host.interserver_http_port),
                        ),
                    ]),
                    ..Default::default()
                }),
                ..Default::default()
            },
        };
        self.finalize(service)
    }
}
