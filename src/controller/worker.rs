//! Reconcile worker: one pass converges one installation
//!
//! A pass observes the workloads that exist, flags hosts, then walks every
//! host reconciling its Service, ConfigMap and StatefulSet in that order.
//! Per-object failures are accumulated and reported once at the end; they
//! never stop later hosts from being attempted.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use k8s_openapi::api::apps::v1::StatefulSet;
use k8s_openapi::api::core::v1::{ConfigMap, ObjectReference, Service};
use kube::runtime::events::EventType;
use kube::{Resource, ResourceExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::clickhouse::ClusterAdmin;
use crate::config::DefaultsConfig;
use crate::creator::{labels, names, object_version, Creator};
use crate::crd::{ClickHouseInstallation, ClickHouseInstallationStatus, InstallationPhase};
use crate::generator::{
    ConfigFilesGenerator, ConfigGeneratorOptions, RemoteServersGeneratorOptions,
};
use crate::model::{Host, HostId, HostReconcileAttributes, Installation, Normalizer};
use crate::{Error, Result};

use super::events::{actions, object_note, reasons, EventPublisher};
use super::migrate::{migrate_object, migrate_service};
use super::objects::{kind_of, ObjectStore, ObjectStores};
use super::status::StatusWriter;

/// What was done to one object
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Plan {
    /// Object-version unchanged
    Skip,
    /// Migrated and replaced in place
    Update,
    /// Deleted and created again
    Recreate,
    /// Did not exist
    Create,
}

impl fmt::Display for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Plan::Skip => "skip",
            Plan::Update => "update",
            Plan::Recreate => "recreate",
            Plan::Create => "create",
        };
        f.write_str(s)
    }
}

/// Outcome of one object in a pass
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ObjectOutcome {
    /// Object kind
    pub kind: String,
    /// Object name
    pub name: String,
    /// What was done
    pub plan: Plan,
}

/// Aggregate result of a pass
#[derive(Debug, Default)]
pub struct PassReport {
    /// Successfully reconciled objects in the order they were handled
    pub outcomes: Vec<ObjectOutcome>,
    /// Every failure of the pass
    pub failures: Vec<Error>,
    /// Hosts with at least one failed object
    pub failed_hosts: BTreeSet<HostId>,
    /// Hosts created in this pass
    pub hosts_added: usize,
    /// Orphan hosts torn down in this pass
    pub hosts_removed: usize,
    /// Stale Services, ConfigMaps and budgets swept in this pass
    pub objects_removed: usize,
}

impl PassReport {
    /// True when nothing failed
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    /// Objects that were created, updated or recreated
    pub fn mutations(&self) -> usize {
        self.outcomes.iter().filter(|o| o.plan != Plan::Skip).count()
    }

    fn record(&mut self, result: Result<ObjectOutcome>) -> bool {
        match result {
            Ok(outcome) => {
                self.outcomes.push(outcome);
                true
            }
            Err(e) => {
                self.failures.push(e);
                false
            }
        }
    }
}

/// Runs reconcile passes
pub struct Worker {
    stores: ObjectStores,
    status: Arc<dyn StatusWriter>,
    events: Arc<dyn EventPublisher>,
    admin: Arc<dyn ClusterAdmin>,
    files: Arc<dyn ConfigFilesGenerator>,
    defaults: DefaultsConfig,
}

/// Orphans sit outside every cluster; their ids never collide with model hosts
fn orphan_id(index: usize) -> HostId {
    HostId::new(usize::MAX, 0, index)
}

fn statefulset_ready(sts: &StatefulSet) -> bool {
    let desired = sts.spec.as_ref().and_then(|s| s.replicas).unwrap_or(1);
    let ready = sts
        .status
        .as_ref()
        .and_then(|s| s.ready_replicas)
        .unwrap_or(0);
    desired > 0 && ready >= desired
}

/// Names of the objects a pass wants to exist, per swept kind
#[derive(Debug, Default)]
struct DesiredNames {
    services: BTreeSet<String>,
    configmaps: BTreeSet<String>,
    pod_disruption_budgets: BTreeSet<String>,
}

impl DesiredNames {
    /// A template lookup that failed still claims its name so a transient
    /// error never deletes a live Service.
    fn collect(creator: &Creator<'_>) -> Self {
        let installation = creator.installation();
        let mut desired = Self::default();
        desired.services.insert(names::installation_service(installation));
        desired.configmaps.insert(names::common_configmap(installation));
        desired.configmaps.insert(names::users_configmap(installation));

        for cluster in &installation.clusters {
            desired
                .pod_disruption_budgets
                .insert(names::pod_disruption_budget(cluster));
            if !matches!(creator.cluster_service(cluster), Ok(None)) {
                desired.services.insert(names::cluster_service(cluster));
            }
            for shard in &cluster.shards {
                if !matches!(creator.shard_service(cluster, shard), Ok(None)) {
                    desired.services.insert(names::shard_service(cluster, shard));
                }
            }
        }
        for host in installation.hosts() {
            desired.services.insert(names::host_service(&host.address));
            desired.configmaps.insert(names::host_configmap(&host.address));
        }
        desired
    }
}

fn owned_by<K: Resource>(obj: &K, uid: Option<&str>) -> bool {
    let Some(uid) = uid else {
        return true;
    };
    obj.meta()
        .owner_references
        .iter()
        .flatten()
        .any(|owner| owner.uid == uid)
}

impl Worker {
    /// Create a worker
    pub fn new(
        stores: ObjectStores,
        status: Arc<dyn StatusWriter>,
        events: Arc<dyn EventPublisher>,
        admin: Arc<dyn ClusterAdmin>,
        files: Arc<dyn ConfigFilesGenerator>,
        defaults: DefaultsConfig,
    ) -> Self {
        Self {
            stores,
            status,
            events,
            admin,
            files,
            defaults,
        }
    }

    async fn write_status(
        &self,
        installation: &Installation,
        status: &ClickHouseInstallationStatus,
    ) {
        if let Err(e) = self
            .status
            .patch_status(&installation.namespace, &installation.name, status)
            .await
        {
            warn!(error = %e, "failed to write status");
        }
    }

    async fn apply_service(
        &self,
        cancel: &CancellationToken,
        chi_ref: &ObjectReference,
        desired: Service,
    ) -> Result<ObjectOutcome> {
        let store = &*self.stores.services;
        self.reconcile_object(cancel, chi_ref, store, desired, migrate_service)
            .await
    }

    async fn apply_configmap(
        &self,
        cancel: &CancellationToken,
        chi_ref: &ObjectReference,
        desired: ConfigMap,
    ) -> Result<ObjectOutcome> {
        let store = &*self.stores.configmaps;
        self.reconcile_object(cancel, chi_ref, store, desired, migrate_object)
            .await
    }

    /// Reconcile one object: skip, update in place, recreate or create
    async fn reconcile_object<K>(
        &self,
        cancel: &CancellationToken,
        chi_ref: &ObjectReference,
        store: &dyn ObjectStore<K>,
        desired: K,
        migrate: fn(&K, K) -> Result<K>,
    ) -> Result<ObjectOutcome>
    where
        K: Resource<DynamicType = ()> + Clone + Send + Sync + 'static,
    {
        let kind = kind_of::<K>();
        let namespace = desired.meta().namespace.clone().unwrap_or_default();
        let name = desired.meta().name.clone().unwrap_or_default();
        let outcome = |plan| ObjectOutcome {
            kind: kind.clone(),
            name: name.clone(),
            plan,
        };

        let plan = match store.get(cancel, &namespace, &name).await {
            Ok(current) => {
                let version = object_version(&desired);
                if version.is_some() && object_version(&current) == version {
                    debug!(%kind, %name, "unchanged");
                    return Ok(outcome(Plan::Skip));
                }
                match migrate(&current, desired.clone()) {
                    Ok(migrated) => match store.update(cancel, &migrated).await {
                        Ok(_) => Plan::Update,
                        Err(e @ Error::Cancelled { .. }) => return Err(e),
                        Err(e) => {
                            warn!(%kind, %name, error = %e, "update failed, recreating");
                            self.events
                                .publish(
                                    chi_ref,
                                    EventType::Warning,
                                    reasons::UPDATE_FAILED,
                                    actions::UPDATE,
                                    Some(e.to_string()),
                                )
                                .await;
                            Plan::Recreate
                        }
                    },
                    Err(e) => {
                        warn!(%kind, %name, error = %e, "cannot update in place, recreating");
                        self.events
                            .publish(
                                chi_ref,
                                EventType::Warning,
                                reasons::UPDATE_FAILED,
                                actions::UPDATE,
                                Some(e.to_string()),
                            )
                            .await;
                        Plan::Recreate
                    }
                }
            }
            Err(e) if e.is_not_found() => Plan::Create,
            Err(e @ Error::Cancelled { .. }) => return Err(e),
            Err(e) => {
                warn!(%kind, %name, error = %e, "lookup failed");
                self.events
                    .publish(
                        chi_ref,
                        EventType::Warning,
                        reasons::GET_FAILED,
                        actions::GET,
                        Some(e.to_string()),
                    )
                    .await;
                return Err(e);
            }
        };

        if plan == Plan::Update {
            self.events
                .publish(
                    chi_ref,
                    EventType::Normal,
                    reasons::UPDATE_COMPLETED,
                    actions::UPDATE,
                    Some(object_note(&kind, &namespace, &name)),
                )
                .await;
            return Ok(outcome(plan));
        }

        if plan == Plan::Recreate {
            if let Err(e) = store.delete(cancel, &namespace, &name).await {
                if !e.is_not_found() {
                    debug!(%kind, %name, error = %e, "stale object not deleted");
                }
            }
        }

        match store.create(cancel, &desired).await {
            Ok(_) => {
                info!(%kind, %name, %plan, "object created");
                self.events
                    .publish(
                        chi_ref,
                        EventType::Normal,
                        reasons::CREATE_COMPLETED,
                        actions::CREATE,
                        Some(object_note(&kind, &namespace, &name)),
                    )
                    .await;
                Ok(outcome(plan))
            }
            Err(e) => {
                warn!(%kind, %name, error = %e, "create failed");
                self.events
                    .publish(
                        chi_ref,
                        EventType::Warning,
                        reasons::CREATE_FAILED,
                        actions::CREATE,
                        Some(e.to_string()),
                    )
                    .await;
                Err(e)
            }
        }
    }

    async fn delete_object<K>(
        &self,
        cancel: &CancellationToken,
        chi_ref: &ObjectReference,
        store: &dyn ObjectStore<K>,
        namespace: &str,
        name: &str,
    ) -> Result<()>
    where
        K: Resource<DynamicType = ()> + Send + Sync + 'static,
    {
        match store.delete(cancel, namespace, name).await {
            Ok(()) => {
                self.events
                    .publish(
                        chi_ref,
                        EventType::Normal,
                        reasons::DELETE_COMPLETED,
                        actions::DELETE,
                        Some(object_note(&kind_of::<K>(), namespace, name)),
                    )
                    .await;
                Ok(())
            }
            Err(e) if e.is_not_found() => Ok(()),
            Err(e) => {
                self.events
                    .publish(
                        chi_ref,
                        EventType::Warning,
                        reasons::DELETE_FAILED,
                        actions::DELETE,
                        Some(e.to_string()),
                    )
                    .await;
                Err(e)
            }
        }
    }

    /// Flag hosts from the workloads that exist; unknown workloads become
    /// orphan hosts flagged `remove`.
    async fn observe(
        &self,
        cancel: &CancellationToken,
        installation: &mut Installation,
    ) -> Result<()> {
        let selector = labels::installation_list_selector(&installation.name);
        let existing = self
            .stores
            .statefulsets
            .list(cancel, &installation.namespace, &selector)
            .await?;

        let mut matched = BTreeSet::new();
        let _ = installation.walk_hosts_mut(|host| {
            let name = names::statefulset(&host.address);
            host.attributes = match existing.iter().find(|s| s.name_any() == name) {
                Some(sts) => {
                    matched.insert(name);
                    let attributes = HostReconcileAttributes::new().set_found();
                    if statefulset_ready(sts) {
                        attributes.set_ready()
                    } else {
                        attributes
                    }
                }
                None => HostReconcileAttributes::new().set_add(),
            };
            Ok(())
        });

        let namespace = installation.namespace.clone();
        for sts in existing.iter().filter(|s| !matched.contains(&s.name_any())) {
            let Some(address) = labels::host_address_from_labels(sts.labels(), &namespace) else {
                warn!(name = %sts.name_any(), "workload without host labels left alone");
                continue;
            };
            let mut host = Host::new(orphan_id(installation.removed.len()), address);
            host.attributes = HostReconcileAttributes::new().set_found().set_remove();
            info!(host = %host.name(), "host scheduled for removal");
            installation.removed.push(host);
        }
        Ok(())
    }

    async fn reconcile_host(
        &self,
        cancel: &CancellationToken,
        chi_ref: &ObjectReference,
        creator: &Creator<'_>,
        host: &Host,
        report: &mut PassReport,
    ) {
        let mut ok = true;

        let service = match creator.host_service(host) {
            Ok(desired) => self.apply_service(cancel, chi_ref, desired).await,
            Err(e) => Err(e),
        };
        ok &= report.record(service);

        let configmap = match creator.host_configmap(host) {
            Ok(desired) => self.apply_configmap(cancel, chi_ref, desired).await,
            Err(e) => Err(e),
        };
        ok &= report.record(configmap);

        let statefulset = match creator.statefulset(host) {
            Ok(desired) => {
                self.reconcile_object(
                    cancel,
                    chi_ref,
                    &*self.stores.statefulsets,
                    desired,
                    migrate_object,
                )
                .await
            }
            Err(e) => Err(e),
        };
        ok &= report.record(statefulset);

        if !ok {
            warn!(host = %host.name(), "host reconciled with failures");
            report.failed_hosts.insert(host.id);
        } else if host.attributes.add {
            report.hosts_added += 1;
        }
    }

    async fn remove_host(
        &self,
        cancel: &CancellationToken,
        chi_ref: &ObjectReference,
        host: &Host,
        report: &mut PassReport,
    ) {
        let ns = host.namespace();
        let address = &host.address;
        let stores = &self.stores;
        let (sts, svc, cm) = (
            names::statefulset(address),
            names::host_service(address),
            names::host_configmap(address),
        );
        let results = [
            self.delete_object(cancel, chi_ref, &*stores.statefulsets, ns, &sts).await,
            self.delete_object(cancel, chi_ref, &*stores.services, ns, &svc).await,
            self.delete_object(cancel, chi_ref, &*stores.configmaps, ns, &cm).await,
        ];
        let mut ok = true;
        for result in results {
            if let Err(e) = result {
                ok = false;
                report.failures.push(e);
            }
        }
        if ok {
            self.admin.forget_host(&names::host_fqdn(address));
            report.hosts_removed += 1;
        } else {
            report.failed_hosts.insert(host.id);
        }
    }

    async fn reconcile_installation_objects(
        &self,
        cancel: &CancellationToken,
        chi_ref: &ObjectReference,
        creator: &Creator<'_>,
        report: &mut PassReport,
    ) {
        let installation = creator.installation();

        let users = match creator.users_configmap() {
            Ok(desired) => self.apply_configmap(cancel, chi_ref, desired).await,
            Err(e) => Err(e),
        };
        report.record(users);

        let service = match creator.installation_service() {
            Ok(desired) => self.apply_service(cancel, chi_ref, desired).await,
            Err(e) => Err(e),
        };
        report.record(service);

        for cluster in &installation.clusters {
            match creator.cluster_service(cluster) {
                Ok(Some(desired)) => {
                    let result = self.apply_service(cancel, chi_ref, desired).await;
                    report.record(result);
                }
                Ok(None) => {}
                Err(e) => report.failures.push(e),
            }

            for shard in &cluster.shards {
                match creator.shard_service(cluster, shard) {
                    Ok(Some(desired)) => {
                        let result = self.apply_service(cancel, chi_ref, desired).await;
                        report.record(result);
                    }
                    Ok(None) => {}
                    Err(e) => report.failures.push(e),
                }
            }

            let pdb = match creator.pod_disruption_budget(cluster) {
                Ok(desired) => {
                    self.reconcile_object(
                        cancel,
                        chi_ref,
                        &*self.stores.pod_disruption_budgets,
                        desired,
                        migrate_object,
                    )
                    .await
                }
                Err(e) => Err(e),
            };
            report.record(pdb);
        }
    }

    /// Delete objects of one kind that carry the installation's labels and
    /// owner but are no longer desired.
    async fn sweep<K>(
        &self,
        cancel: &CancellationToken,
        chi_ref: &ObjectReference,
        store: &dyn ObjectStore<K>,
        installation: &Installation,
        desired: &BTreeSet<String>,
        report: &mut PassReport,
    ) where
        K: Resource<DynamicType = ()> + Send + Sync + 'static,
    {
        let selector = labels::installation_list_selector(&installation.name);
        let existing = match store.list(cancel, &installation.namespace, &selector).await {
            Ok(existing) => existing,
            Err(e) => {
                warn!(kind = %kind_of::<K>(), error = %e, "cannot list objects to sweep");
                report.failures.push(e);
                return;
            }
        };

        for obj in existing {
            let name = obj.name_any();
            if desired.contains(&name) || !owned_by(&obj, installation.uid.as_deref()) {
                continue;
            }
            info!(kind = %kind_of::<K>(), %name, "stale object");
            match self
                .delete_object(cancel, chi_ref, store, &installation.namespace, &name)
                .await
            {
                Ok(()) => report.objects_removed += 1,
                Err(e) => report.failures.push(e),
            }
        }
    }

    async fn sweep_stale_objects(
        &self,
        cancel: &CancellationToken,
        chi_ref: &ObjectReference,
        creator: &Creator<'_>,
        report: &mut PassReport,
    ) {
        let installation = creator.installation();
        let desired = DesiredNames::collect(creator);
        debug!(?desired, "sweeping stale objects");
        self.sweep(
            cancel,
            chi_ref,
            &*self.stores.services,
            installation,
            &desired.services,
            report,
        )
        .await;
        self.sweep(
            cancel,
            chi_ref,
            &*self.stores.configmaps,
            installation,
            &desired.configmaps,
            report,
        )
        .await;
        self.sweep(
            cancel,
            chi_ref,
            &*self.stores.pod_disruption_budgets,
            installation,
            &desired.pod_disruption_budgets,
            report,
        )
        .await;
    }

    async fn reconcile_common_configmap(
        &self,
        cancel: &CancellationToken,
        chi_ref: &ObjectReference,
        creator: &Creator<'_>,
        options: RemoteServersGeneratorOptions,
        report: &mut PassReport,
    ) {
        debug!(%options, "common configmap");
        let options = ConfigGeneratorOptions::with_remote_servers(options);
        let result = match creator.common_configmap(&options) {
            Ok(desired) => self.apply_configmap(cancel, chi_ref, desired).await,
            Err(e) => Err(e),
        };
        report.record(result);
    }

    async fn drop_dns_caches(
        &self,
        cancel: &CancellationToken,
        installation: &Installation,
        report: &PassReport,
    ) {
        for host in installation.hosts() {
            if !host.attributes.ready || report.failed_hosts.contains(&host.id) {
                continue;
            }
            let hostname = names::host_fqdn(&host.address);
            if let Err(e) = self.admin.drop_dns_cache(cancel, &hostname).await {
                warn!(host = %host.name(), error = %e, "failed to drop DNS cache");
            }
        }
    }

    fn final_status(
        &self,
        chi: &ClickHouseInstallation,
        installation: &Installation,
        report: &PassReport,
    ) -> ClickHouseInstallationStatus {
        let phase = if report.is_success() {
            InstallationPhase::Completed
        } else {
            InstallationPhase::Aborted
        };
        let hosts = installation.hosts_count();
        let action = format!("reconcile {phase}").to_lowercase();
        let mut status = ClickHouseInstallationStatus {
            observed_generation: chi.metadata.generation,
            clusters: installation.clusters.len() as u32,
            shards: installation.shards_count() as u32,
            hosts: hosts as u32,
            hosts_completed: hosts.saturating_sub(
                report
                    .failed_hosts
                    .iter()
                    .filter(|id| installation.host(**id).is_some())
                    .count(),
            ) as u32,
            hosts_added: report.hosts_added as u32,
            hosts_removed: report.hosts_removed as u32,
            hosts_with_errors: report.failed_hosts.len() as u32,
            endpoint: Some(names::installation_fqdn(installation)),
            fqdns: installation
                .hosts()
                .map(|h| names::host_fqdn(&h.address))
                .collect(),
            ..ClickHouseInstallationStatus::with_phase(phase)
        }
        .action(action);
        for failure in &report.failures {
            status.push_error(failure.to_string());
        }
        status
    }

    /// Run one pass for `chi`.
    ///
    /// Returns an error only when the installation cannot be normalized or
    /// observed; object failures are collected in the report.
    #[instrument(skip_all, fields(chi = %chi.name_any(), namespace = ?chi.metadata.namespace))]
    pub async fn reconcile(
        &self,
        cancel: &CancellationToken,
        chi: &ClickHouseInstallation,
    ) -> Result<PassReport> {
        let chi_ref = chi.object_ref(&());

        let mut installation = match Normalizer::new(&self.defaults).normalize(chi) {
            Ok(installation) => installation,
            Err(e) => {
                warn!(error = %e, "normalization failed");
                let mut status =
                    ClickHouseInstallationStatus::with_phase(InstallationPhase::Aborted)
                        .action("normalization failed");
                status.observed_generation = chi.metadata.generation;
                status.push_error(e.to_string());
                if let (Some(ns), name) = (chi.namespace(), chi.name_any()) {
                    if let Err(write) = self.status.patch_status(&ns, &name, &status).await {
                        warn!(error = %write, "failed to write status");
                    }
                }
                self.events
                    .publish(
                        &chi_ref,
                        EventType::Warning,
                        reasons::RECONCILE_FAILED,
                        actions::RECONCILE,
                        Some(e.to_string()),
                    )
                    .await;
                return Err(e);
            }
        };

        info!(hosts = installation.hosts_count(), "reconcile started");
        self.write_status(
            &installation,
            &ClickHouseInstallationStatus::with_phase(InstallationPhase::InProgress)
                .action("reconcile started"),
        )
        .await;
        self.events
            .publish(
                &chi_ref,
                EventType::Normal,
                reasons::RECONCILE_STARTED,
                actions::RECONCILE,
                None,
            )
            .await;

        if let Err(e) = self.observe(cancel, &mut installation).await {
            warn!(error = %e, "failed to observe workloads");
            let mut status = ClickHouseInstallationStatus::with_phase(InstallationPhase::Aborted)
                .action("observe failed");
            status.observed_generation = chi.metadata.generation;
            status.push_error(e.to_string());
            self.write_status(&installation, &status).await;
            return Err(e);
        }

        let mut report = PassReport::default();
        let creator = Creator::new(&installation, &self.defaults, &*self.files);

        // New and departing hosts are not peers yet
        let pre = RemoteServersGeneratorOptions::new().exclude_reconcile_attributes(
            HostReconcileAttributes::new().set_add().set_remove(),
        );
        self.reconcile_common_configmap(cancel, &chi_ref, &creator, pre, &mut report)
            .await;

        for host in installation.hosts() {
            self.reconcile_host(cancel, &chi_ref, &creator, host, &mut report)
                .await;
        }

        for host in &installation.removed {
            self.remove_host(cancel, &chi_ref, host, &mut report).await;
        }

        let post = RemoteServersGeneratorOptions::new()
            .exclude_host_ids(report.failed_hosts.iter().copied());
        self.reconcile_common_configmap(cancel, &chi_ref, &creator, post, &mut report)
            .await;
        self.reconcile_installation_objects(cancel, &chi_ref, &creator, &mut report)
            .await;
        self.sweep_stale_objects(cancel, &chi_ref, &creator, &mut report)
            .await;

        if report.hosts_added > 0 || report.hosts_removed > 0 {
            self.drop_dns_caches(cancel, &installation, &report).await;
        }

        let status = self.final_status(chi, &installation, &report);
        self.write_status(&installation, &status).await;
        if report.is_success() {
            info!(mutations = report.mutations(), "reconcile completed");
            self.events
                .publish(
                    &chi_ref,
                    EventType::Normal,
                    reasons::RECONCILE_COMPLETED,
                    actions::RECONCILE,
                    None,
                )
                .await;
        } else {
            warn!(failures = report.failures.len(), "reconcile finished with failures");
            self.events
                .publish(
                    &chi_ref,
                    EventType::Warning,
                    reasons::RECONCILE_FAILED,
                    actions::RECONCILE,
                    Some(format!("{} object(s) failed", report.failures.len())),
                )
                .await;
        }
        Ok(report)
    }
}
