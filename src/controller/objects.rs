//! Platform object access
//!
//! One generic [`ObjectStore`] covers every managed kind. Each call checks
//! the cancellation token before it starts and is bounded by the token and
//! a per-call timeout.

use std::fmt::Debug;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::StatefulSet;
use k8s_openapi::api::core::v1::{ConfigMap, Service};
use k8s_openapi::api::policy::v1::PodDisruptionBudget;
use k8s_openapi::NamespaceResourceScope;
use kube::api::{DeleteParams, ListParams, PostParams};
use kube::{Api, Client, Resource};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::{Error, Result};

/// Get/create/update/delete/list for one kind of namespaced object
#[async_trait]
pub trait ObjectStore<K>: Send + Sync
where
    K: Send + Sync + 'static,
{
    /// Fetch one object; a missing object is [`Error::NotFound`]
    async fn get(&self, cancel: &CancellationToken, namespace: &str, name: &str) -> Result<K>;

    /// Create an object
    async fn create(&self, cancel: &CancellationToken, obj: &K) -> Result<K>;

    /// Replace an object; `obj` must carry the current resourceVersion
    async fn update(&self, cancel: &CancellationToken, obj: &K) -> Result<K>;

    /// Delete an object
    async fn delete(&self, cancel: &CancellationToken, namespace: &str, name: &str) -> Result<()>;

    /// List objects matching a label selector
    async fn list(
        &self,
        cancel: &CancellationToken,
        namespace: &str,
        selector: &str,
    ) -> Result<Vec<K>>;
}

/// Kind name used in errors and logs
pub fn kind_of<K>() -> String
where
    K: Resource<DynamicType = ()>,
{
    K::kind(&()).to_string()
}

/// [`ObjectStore`] backed by the API server
pub struct KubeObjects<K> {
    client: Client,
    timeout: Duration,
    _kind: PhantomData<fn() -> K>,
}

impl<K> KubeObjects<K> {
    /// Store bounding each call by `timeout`
    pub fn new(client: Client, timeout: Duration) -> Self {
        Self {
            client,
            timeout,
            _kind: PhantomData,
        }
    }
}

impl<K> KubeObjects<K>
where
    K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>,
{
    fn api(&self, namespace: &str) -> Api<K> {
        Api::namespaced(self.client.clone(), namespace)
    }

    async fn call<T, F>(
        &self,
        cancel: &CancellationToken,
        operation: &'static str,
        namespace: &str,
        name: &str,
        fut: F,
    ) -> Result<T>
    where
        F: Future<Output = kube::Result<T>> + Send,
    {
        let kind = kind_of::<K>();
        let describe = || format!("{operation} {kind} {namespace}/{name}");
        if cancel.is_cancelled() {
            return Err(Error::cancelled(describe()));
        }
        tokio::select! {
            _ = cancel.cancelled() => Err(Error::cancelled(describe())),
            result = tokio::time::timeout(self.timeout, fut) => match result {
                Ok(result) => {
                    result.map_err(|e| Error::platform(&kind, operation, namespace, name, e))
                }
                Err(_) => Err(Error::cancelled(format!("{} after {:?}", describe(), self.timeout))),
            },
        }
    }
}

fn name_of<K: Resource>(obj: &K) -> (String, String) {
    let meta = obj.meta();
    (
        meta.namespace.clone().unwrap_or_default(),
        meta.name.clone().unwrap_or_default(),
    )
}

#[async_trait]
impl<K> ObjectStore<K> for KubeObjects<K>
where
    K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>
        + Clone
        + Debug
        + DeserializeOwned
        + Serialize
        + Send
        + Sync
        + 'static,
{
    async fn get(&self, cancel: &CancellationToken, namespace: &str, name: &str) -> Result<K> {
        let api = self.api(namespace);
        self.call(cancel, "get", namespace, name, api.get(name)).await
    }

    async fn create(&self, cancel: &CancellationToken, obj: &K) -> Result<K> {
        let (namespace, name) = name_of(obj);
        let api = self.api(&namespace);
        let params = PostParams::default();
        self.call(cancel, "create", &namespace, &name, api.create(&params, obj))
            .await
    }

    async fn update(&self, cancel: &CancellationToken, obj: &K) -> Result<K> {
        let (namespace, name) = name_of(obj);
        let api = self.api(&namespace);
        let params = PostParams::default();
        self.call(
            cancel,
            "update",
            &namespace,
            &name,
            api.replace(&name, &params, obj),
        )
        .await
    }

    async fn delete(&self, cancel: &CancellationToken, namespace: &str, name: &str) -> Result<()> {
        let api = self.api(namespace);
        let params = DeleteParams::background();
        self.call(cancel, "delete", namespace, name, api.delete(name, &params))
            .await
            .map(|_| ())
    }

    async fn list(
        &self,
        cancel: &CancellationToken,
        namespace: &str,
        selector: &str,
    ) -> Result<Vec<K>> {
        let api = self.api(namespace);
        let params = ListParams::default().labels(selector);
        self.call(cancel, "list", namespace, "", api.list(&params))
            .await
            .map(|list| list.items)
    }
}

/// Stores for every kind the worker manages
#[derive(Clone)]
pub struct ObjectStores {
    /// Services
    pub services: Arc<dyn ObjectStore<Service>>,
    /// ConfigMaps
    pub configmaps: Arc<dyn ObjectStore<ConfigMap>>,
    /// StatefulSets
    pub statefulsets: Arc<dyn ObjectStore<StatefulSet>>,
    /// PodDisruptionBudgets
    pub pod_disruption_budgets: Arc<dyn ObjectStore<PodDisruptionBudget>>,
}

impl ObjectStores {
    /// API-server backed stores sharing one client
    pub fn kube(client: Client, call_timeout: Duration) -> Self {
        Self {
            services: Arc::new(KubeObjects::<Service>::new(client.clone(), call_timeout)),
            configmaps: Arc::new(KubeObjects::<ConfigMap>::new(client.clone(), call_timeout)),
            statefulsets: Arc::new(KubeObjects::<StatefulSet>::new(
                client.clone(),
                call_timeout,
            )),
            pod_disruption_budgets: Arc::new(KubeObjects::<PodDisruptionBudget>::new(
                client,
                call_timeout,
            )),
        }
    }
}
