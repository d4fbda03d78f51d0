//! Configuration ConfigMaps

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::ConfigMap;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

use crate::generator::ConfigGeneratorOptions;
use crate::model::Host;
use crate::Result;

use super::{labels, names, Creator};

fn configmap(
    name: String,
    namespace: &str,
    labels: BTreeMap<String, String>,
    data: BTreeMap<String, String>,
) -> ConfigMap {
    ConfigMap {
        metadata: ObjectMeta {
            name: Some(name),
            namespace: Some(namespace.to_string()),
            labels: Some(labels),
            ..Default::default()
        },
        data: Some(data),
        ..Default::default()
    }
}

impl Creator<'_> {
    /// ConfigMap mounted at `config.d` on every host
    pub fn common_configmap(&self, options: &ConfigGeneratorOptions) -> Result<ConfigMap> {
        let installation = self.installation;
        self.finalize(configmap(
            names::common_configmap(installation),
            &installation.namespace,
            labels::common_configmap_labels(installation),
            self.files.common_files(installation, options),
        ))
    }

    /// ConfigMap mounted at `users.d` on every host
    pub fn users_configmap(&self) -> Result<ConfigMap> {
        let installation = self.installation;
        self.finalize(configmap(
            names::users_configmap(installation),
            &installation.namespace,
            labels::users_configmap_labels(installation),
            self.files.users_files(installation),
        ))
    }

    /// ConfigMap mounted at `conf.d` on one host
    pub fn host_configmap(&self, host: &Host) -> Result<ConfigMap> {
        self.finalize(configmap(
            names::host_configmap(&host.address),
            host.namespace(),
            labels::host_configmap_labels(&host.address),
            self.files.host_files(self.installation, host),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DefaultsConfig;
    use crate::generator::{MockConfigFilesGenerator, RemoteServersGeneratorOptions};
    use crate::model::{Cluster, HostId, Installation};
    use mockall::predicate::always;

    fn installation() -> Installation {
        let mut cluster = Cluster::new("ns", "demo", "main", 0);
        cluster.get_or_create_host(0, 0);
        cluster.get_or_create_host(1, 0);
        Installation {
            namespace: "ns".to_string(),
            name: "demo".to_string(),
            clusters: vec![cluster],
            ..Default::default()
        }
    }

    fn files(name: &str) -> BTreeMap<String, String> {
        [(name.to_string(), "<yandex/>".to_string())].into()
    }

    #[test]
    fn common_configmap_passes_options_to_generator() {
        let chi = installation();
        let excluded = chi.host(HostId::new(0, 1, 0)).unwrap().clone();
        let mut generator = MockConfigFilesGenerator::new();
        let expected = excluded.id;
        generator
            .expect_common_files()
            .withf(move |_, options| {
                options
                    .remote_servers
                    .exclude(&excluded)
            })
            .times(1)
            .returning(|_, _| files("remote.xml"));

        let defaults = DefaultsConfig::default();
        let creator = Creator::new(&chi, &defaults, &generator);
        let options = ConfigGeneratorOptions::with_remote_servers(
            RemoteServersGeneratorOptions::new().exclude_host_ids([expected]),
        );
        let cm = creator.common_configmap(&options).unwrap();

        assert_eq!(cm.metadata.name.as_deref(), Some("chi-demo-common-configd"));
        assert!(cm.data.unwrap().contains_key("remote.xml"));
        let labels = cm.metadata.labels.unwrap();
        assert_eq!(
            labels.get(labels::LABEL_CONFIGMAP).map(String::as_str),
            Some(labels::CONFIGMAP_COMMON)
        );
    }

    #[test]
    fn host_and_users_configmaps_use_their_generators() {
        let chi = installation();
        let mut generator = MockConfigFilesGenerator::new();
        generator
            .expect_users_files()
            .times(1)
            .returning(|_| files("users.xml"));
        generator
            .expect_host_files()
            .with(always(), always())
            .times(1)
            .returning(|_, host| files(&format!("{}.xml", host.name())));

        let defaults = DefaultsConfig::default();
        let creator = Creator::new(&chi, &defaults, &generator);
        let host = chi.host(HostId::new(0, 1, 0)).unwrap();

        let users = creator.users_configmap().unwrap();
        assert_eq!(users.metadata.name.as_deref(), Some("chi-demo-common-usersd"));

        let cm = creator.host_configmap(host).unwrap();
        assert_eq!(
            cm.metadata.name.as_deref(),
            Some("chi-demo-deploy-confd-main-1-0")
        );
        assert!(cm.data.unwrap().contains_key("1-0.xml"));
    }
}
