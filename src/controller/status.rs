//! Installation status writes

use async_trait::async_trait;
use kube::api::{Patch, PatchParams};
use kube::{Api, Client};

#[cfg(test)]
use mockall::automock;

use crate::crd::{ClickHouseInstallation, ClickHouseInstallationStatus};
use crate::{Error, Result, FIELD_MANAGER};

/// Writes the status subresource of an installation
#[cfg_attr(test, automock)]
#[async_trait]
pub trait StatusWriter: Send + Sync {
    /// Replace the installation's status
    async fn patch_status(
        &self,
        namespace: &str,
        name: &str,
        status: &ClickHouseInstallationStatus,
    ) -> Result<()>;
}

/// [`StatusWriter`] using a merge patch
pub struct KubeStatusWriter {
    client: Client,
}

impl KubeStatusWriter {
    /// Writer using `client`
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl StatusWriter for KubeStatusWriter {
    async fn patch_status(
        &self,
        namespace: &str,
        name: &str,
        status: &ClickHouseInstallationStatus,
    ) -> Result<()> {
        let api: Api<ClickHouseInstallation> = Api::namespaced(self.client.clone(), namespace);
        let patch = serde_json::json!({ "status": status });
        api.patch_status(name, &PatchParams::apply(FIELD_MANAGER), &Patch::Merge(&patch))
            .await
            .map_err(|e| {
                Error::platform("ClickHouseInstallation", "patch status", namespace, name, e)
            })?;
        Ok(())
    }
}
