//! Per-cluster PodDisruptionBudget

use k8s_openapi::api::policy::v1::{PodDisruptionBudget, PodDisruptionBudgetSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;

use crate::model::Cluster;
use crate::Result;

use super::{labels, names, Creator};

impl Creator<'_> {
    /// Allow at most one unavailable pod per cluster
    pub fn pod_disruption_budget(&self, cluster: &Cluster) -> Result<PodDisruptionBudget> {
        let pdb = PodDisruptionBudget {
            metadata: ObjectMeta {
                name: Some(names::pod_disruption_budget(cluster)),
                namespace: Some(cluster.namespace.clone()),
                labels: Some(labels::cluster_labels(cluster)),
                ..Default::default()
            },
            spec: Some(PodDisruptionBudgetSpec {
                max_unavailable: Some(IntOrString::Int(1)),
                selector: Some(LabelSelector {
                    match_labels: Some(labels::cluster_selector(cluster)),
                    ..Default::default()
                }),
                ..Default::default()
            }),
            ..Default::default()
        };
        self.finalize(pdb)
    }
}
