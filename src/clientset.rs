//! Typed clientset over the in-memory tracker
//!
//! Objects are converted to their unstructured form with the scheme on the way
//! in and back again on the way out, so the tracker only ever stores
//! unstructured trees.

use crate::client::{namespace_or_default, FakeClient};
use crate::dynamic::DynamicClient;
use crate::scheme::{KindInfo, Scheme};
use crate::tracker::{ObjectTracker, Patch, GVK};
use crate::unstructured::Unstructured;
use crate::watch::{EventType, StopHandle, WatchEvent, WatchSubscription};
use crate::{Error, Result};
use futures::Stream;
use kube::Resource;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

/// Fake typed clientset
///
/// # Example
///
/// ```rust
/// use k8s_openapi::api::apps::v1::Deployment;
/// use kube_fake_clientset::{Clientset, Scheme};
/// use std::sync::Arc;
///
/// let scheme = Scheme::new();
/// scheme.register::<Deployment>();
/// let clientset = Clientset::new(Arc::new(scheme));
///
/// let mut dp = Deployment::default();
/// dp.metadata.name = Some("my-dp".to_string());
/// let created = clientset.api::<Deployment>("ns-1").create(&dp).unwrap();
/// assert_eq!(created.metadata.resource_version.as_deref(), Some("1"));
/// ```
#[derive(Clone)]
pub struct Clientset {
    client: FakeClient,
}

impl Clientset {
    pub fn new(scheme: Arc<Scheme>) -> Self {
        Self {
            client: FakeClient::new(scheme),
        }
    }

    pub(crate) fn from_client(client: FakeClient) -> Self {
        Self { client }
    }

    /// Operations on `K` objects in `namespace`.
    pub fn api<K>(&self, namespace: &str) -> TypedApi<K>
    where
        K: Resource<DynamicType = ()>,
    {
        TypedApi::new(self.client.clone(), Some(namespace.to_string()))
    }

    /// Operations on `K` objects across all namespaces, or on cluster-scoped kinds.
    pub fn api_all<K>(&self) -> TypedApi<K>
    where
        K: Resource<DynamicType = ()>,
    {
        TypedApi::new(self.client.clone(), None)
    }

    /// A dynamic client sharing this clientset's tracker.
    pub fn dynamic(&self) -> DynamicClient {
        DynamicClient::from_client(self.client.clone())
    }

    pub fn fake_client(&self) -> &FakeClient {
        &self.client
    }

    pub fn tracker(&self) -> &Arc<ObjectTracker> {
        self.client.tracker()
    }

    pub fn scheme(&self) -> &Arc<Scheme> {
        self.client.scheme()
    }
}

pub struct TypedApi<K> {
    client: FakeClient,
    namespace: Option<String>,
    _kind: PhantomData<fn() -> K>,
}

impl<K> Clone for TypedApi<K> {
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
            namespace: self.namespace.clone(),
            _kind: PhantomData,
        }
    }
}

impl<K> TypedApi<K>
where
    K: Resource<DynamicType = ()>,
{
    fn new(client: FakeClient, namespace: Option<String>) -> Self {
        Self {
            client,
            namespace,
            _kind: PhantomData,
        }
    }

    fn kind_info(&self) -> Result<KindInfo> {
        let gvk: GVK = Scheme::gvk_of::<K>();
        self.client
            .scheme()
            .lookup_kind(&gvk)
            .ok_or(Error::KindNotRegistered {
                group: gvk.group,
                version: gvk.version,
                kind: gvk.kind,
            })
    }

    /// Namespace for requests naming an object; empty for cluster-scoped kinds.
    fn request_namespace<'a>(&'a self, info: &KindInfo) -> &'a str {
        if info.namespaced {
            self.namespace.as_deref().unwrap_or("")
        } else {
            ""
        }
    }

    fn list_namespace<'a>(&'a self, info: &KindInfo) -> Option<&'a str> {
        if info.namespaced {
            self.namespace.as_deref()
        } else {
            Some("")
        }
    }

    /// Namespace to store `object` in: the handle's, then the object's, then `default`.
    fn object_namespace(&self, info: &KindInfo, object: &Unstructured) -> String {
        if !info.namespaced {
            return String::new();
        }
        let handle = self.namespace.as_deref().filter(|ns| !ns.is_empty());
        namespace_or_default(handle.or(object.namespace())).to_string()
    }
}

impl<K> TypedApi<K>
where
    K: Resource<DynamicType = ()> + Serialize + DeserializeOwned,
{
    pub fn create(&self, object: &K) -> Result<K> {
        let info = self.kind_info()?;
        let converter = self.client.converter();
        let unstructured = converter.to_unstructured(object)?;

        let namespace = self.object_namespace(&info, &unstructured);

        let created = self
            .client
            .create(&info.gvr(), &info.gvk, &namespace, unstructured)?;
        converter.from_unstructured(&created)
    }

    /// Replace an existing object. A resourceVersion on `object` is checked
    /// against the stored one.
    pub fn update(&self, object: &K) -> Result<K> {
        let info = self.kind_info()?;
        let converter = self.client.converter();
        let unstructured = converter.to_unstructured(object)?;

        let namespace = self.object_namespace(&info, &unstructured);

        let updated = self
            .client
            .update(&info.gvr(), &info.gvk, &namespace, unstructured)?;
        converter.from_unstructured(&updated)
    }

    pub fn get(&self, name: &str) -> Result<K> {
        let info = self.kind_info()?;
        let object = self
            .client
            .get(&info.gvr(), self.request_namespace(&info), name)?;
        self.client.converter().from_unstructured(&object)
    }

    /// Delete an object, returning its last state.
    pub fn delete(&self, name: &str) -> Result<K> {
        let info = self.kind_info()?;
        let object = self
            .client
            .delete(&info.gvr(), self.request_namespace(&info), name)?;
        self.client.converter().from_unstructured(&object)
    }

    /// Patch an object. A patch whose result no longer converts to `K` is
    /// rejected without being stored.
    pub fn patch(&self, name: &str, patch: &Patch) -> Result<K> {
        let info = self.kind_info()?;
        let converter = self.client.converter();
        let object = self.client.patch_validated(
            &info.gvr(),
            &info.gvk,
            self.request_namespace(&info),
            name,
            patch,
            |patched| converter.from_unstructured::<K>(patched).map(drop),
        )?;
        converter.from_unstructured(&object)
    }

    pub fn list(&self, label_selector: &str) -> Result<Vec<K>> {
        let info = self.kind_info()?;
        let converter = self.client.converter();
        self.client
            .list(&info.gvr(), self.list_namespace(&info), label_selector)?
            .iter()
            .map(|object| converter.from_unstructured(object))
            .collect()
    }

    /// Watch `K` objects carrying labels that match `label_selector`.
    pub fn watch(&self, label_selector: &str) -> Result<TypedWatch<K>> {
        let info = self.kind_info()?;
        let inner = self
            .client
            .watch(&info.gvr(), self.list_namespace(&info), label_selector)?;
        Ok(TypedWatch {
            inner,
            scheme: Arc::clone(self.client.scheme()),
            _kind: PhantomData,
        })
    }
}

/// A watch event with its object converted to `K`
#[derive(Debug, Clone)]
pub struct TypedEvent<K> {
    pub event_type: EventType,
    pub object: K,
}

/// Typed view of a [`WatchSubscription`]
#[derive(Debug)]
pub struct TypedWatch<K> {
    inner: WatchSubscription,
    scheme: Arc<Scheme>,
    _kind: PhantomData<fn() -> K>,
}

impl<K> TypedWatch<K>
where
    K: Resource<DynamicType = ()> + DeserializeOwned,
{
    fn convert(scheme: &Scheme, item: Result<WatchEvent>) -> Result<TypedEvent<K>> {
        let event = item?;
        Ok(TypedEvent {
            event_type: event.event_type,
            object: scheme.converter().from_unstructured(&event.object)?,
        })
    }

    pub async fn recv(&mut self) -> Option<Result<TypedEvent<K>>> {
        let item = self.inner.recv().await?;
        Some(Self::convert(&self.scheme, item))
    }

    pub fn recv_blocking(&mut self) -> Option<Result<TypedEvent<K>>> {
        let item = self.inner.recv_blocking()?;
        Some(Self::convert(&self.scheme, item))
    }

    pub fn recv_timeout(&mut self, timeout: Duration) -> Option<Result<TypedEvent<K>>> {
        let item = self.inner.recv_timeout(timeout)?;
        Some(Self::convert(&self.scheme, item))
    }

    pub fn try_recv(&mut self) -> Option<Result<TypedEvent<K>>> {
        let item = self.inner.try_recv()?;
        Some(Self::convert(&self.scheme, item))
    }

    pub fn into_stream(self) -> impl Stream<Item = Result<TypedEvent<K>>> + Send
    where
        K: Send + 'static,
    {
        futures::stream::unfold(self, |mut watch| async move {
            let item = watch.recv().await?;
            Some((item, watch))
        })
    }
}

impl<K> TypedWatch<K> {
    pub fn stop(&self) {
        self.inner.stop();
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.inner.stop_handle()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }

    pub fn missed_events(&self) -> u64 {
        self.inner.missed_events()
    }

    pub fn into_inner(self) -> WatchSubscription {
        self.inner
    }
}
