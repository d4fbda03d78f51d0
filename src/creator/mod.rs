//! Desired platform objects
//!
//! The [`Creator`] maps nodes of the cluster object model to the Services,
//! ConfigMaps, StatefulSets and PodDisruptionBudgets that should exist for
//! them. It is pure: nothing here talks to the API server.
//!
//! Every object it returns carries an owner reference to the installation
//! and an object-version annotation hashing the rest of the object.

mod configmap;
pub mod labels;
pub mod names;
mod pdb;
mod service;
mod statefulset;

use std::fmt::Write;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::Resource;
use serde::Serialize;

use crate::config::DefaultsConfig;
use crate::generator::ConfigFilesGenerator;
use crate::model::Installation;
use crate::Result;

pub use service::verify_service_ports;
pub use statefulset::{
    append_volume_claim_template, apply_volume_claim_template, ensure_named_ports,
    ensure_port_by_name, CLICKHOUSE_CONTAINER, CLICKHOUSE_LOG_CONTAINER,
};

/// Builds desired objects for one installation
pub struct Creator<'a> {
    installation: &'a Installation,
    defaults: &'a DefaultsConfig,
    files: &'a dyn ConfigFilesGenerator,
}

impl<'a> Creator<'a> {
    /// Create a creator for `installation`
    pub fn new(
        installation: &'a Installation,
        defaults: &'a DefaultsConfig,
        files: &'a dyn ConfigFilesGenerator,
    ) -> Self {
        Self {
            installation,
            defaults,
            files,
        }
    }

    /// Installation this creator builds objects for
    pub fn installation(&self) -> &Installation {
        self.installation
    }

    fn owner_reference(&self) -> Option<OwnerReference> {
        let uid = self.installation.uid.clone()?;
        Some(OwnerReference {
            api_version: "clickhouse.altinity.com/v1".to_string(),
            kind: "ClickHouseInstallation".to_string(),
            name: self.installation.name.clone(),
            uid,
            controller: Some(true),
            block_owner_deletion: Some(true),
        })
    }

    /// Attach owner reference and object version
    fn finalize<K>(&self, mut obj: K) -> Result<K>
    where
        K: Resource + Serialize,
    {
        if let Some(owner) = self.owner_reference() {
            obj.meta_mut().owner_references = Some(vec![owner]);
        }
        stamp_object_version(&mut obj)?;
        Ok(obj)
    }
}

/// SHA-256 of the input, first 16 hex chars
pub fn deterministic_hash(input: &str) -> String {
    use aws_lc_rs::digest;
    let hash = digest::digest(&digest::SHA256, input.as_bytes());
    hash.as_ref()[..8]
        .iter()
        .fold(String::with_capacity(16), |mut s, b| {
            let _ = write!(s, "{:02x}", b);
            s
        })
}

/// Set the object-version annotation to the hash of the object without it
pub fn stamp_object_version<K>(obj: &mut K) -> Result<()>
where
    K: Resource + Serialize,
{
    let meta = obj.meta_mut();
    if let Some(annotations) = meta.annotations.as_mut() {
        annotations.remove(labels::ANNOTATION_OBJECT_VERSION);
        if annotations.is_empty() {
            meta.annotations = None;
        }
    }
    let version = deterministic_hash(&serde_json::to_string(obj)?);
    obj.meta_mut()
        .annotations
        .get_or_insert_with(Default::default)
        .insert(labels::ANNOTATION_OBJECT_VERSION.to_string(), version);
    Ok(())
}

/// Object-version annotation of an object, if any
pub fn object_version<K: Resource>(obj: &K) -> Option<&str> {
    obj.meta()
        .annotations
        .as_ref()?
        .get(labels::ANNOTATION_OBJECT_VERSION)
        .map(String::as_str)
}
