//! Dynamic client operating directly on unstructured objects

use crate::client::{namespace_or_default, FakeClient};
use crate::client_utils::join_api_version;
use crate::scheme::Scheme;
use crate::tracker::{ObjectTracker, Patch, GVK, GVR};
use crate::unstructured::Unstructured;
use crate::watch::WatchSubscription;
use crate::{Error, Result};
use std::sync::Arc;

/// Fake dynamic client, addressed by group/version/resource
///
/// # Example
///
/// ```rust
/// use kube_fake_clientset::{DynamicClient, Scheme, Unstructured, GVR};
/// use std::sync::Arc;
///
/// let client = DynamicClient::new(Arc::new(Scheme::new()));
/// let apps = client
///     .resource(GVR::new("core.oam.dev", "v1beta1", "applications"))
///     .namespace("ns-1");
///
/// let mut app = Unstructured::new("core.oam.dev/v1beta1", "Application");
/// app.set_name("my-application");
/// apps.create(&app).unwrap();
/// assert_eq!(apps.get("my-application").unwrap().name(), Some("my-application"));
/// ```
#[derive(Clone)]
pub struct DynamicClient {
    client: FakeClient,
}

impl DynamicClient {
    pub fn new(scheme: Arc<Scheme>) -> Self {
        Self {
            client: FakeClient::new(scheme),
        }
    }

    pub(crate) fn from_client(client: FakeClient) -> Self {
        Self { client }
    }

    /// Operations on `gvr`. Cluster-wide until narrowed with [`DynamicResource::namespace`].
    pub fn resource(&self, gvr: GVR) -> DynamicResource {
        DynamicResource {
            client: self.client.clone(),
            gvr,
            namespace: None,
        }
    }

    pub fn fake_client(&self) -> &FakeClient {
        &self.client
    }

    pub fn tracker(&self) -> &Arc<ObjectTracker> {
        self.client.tracker()
    }
}

#[derive(Clone)]
pub struct DynamicResource {
    client: FakeClient,
    gvr: GVR,
    namespace: Option<String>,
}

impl DynamicResource {
    pub fn namespace(&self, namespace: &str) -> DynamicResource {
        DynamicResource {
            client: self.client.clone(),
            gvr: self.gvr.clone(),
            namespace: Some(namespace.to_string()),
        }
    }

    pub fn gvr(&self) -> &GVR {
        &self.gvr
    }

    fn cluster_scoped(&self) -> bool {
        self.client
            .scheme()
            .kind_for_resource(&self.gvr)
            .is_some_and(|info| !info.namespaced)
    }

    /// Namespace for requests naming an object; empty for registered cluster-scoped kinds.
    fn request_namespace(&self) -> &str {
        if self.cluster_scoped() {
            ""
        } else {
            self.namespace.as_deref().unwrap_or("")
        }
    }

    fn list_namespace(&self) -> Option<&str> {
        if self.cluster_scoped() {
            Some("")
        } else {
            self.namespace.as_deref()
        }
    }

    /// Namespace to store `object` in: the handle's, then the object's, then `default`.
    /// Empty for registered cluster-scoped kinds.
    fn object_namespace(&self, object: &Unstructured) -> String {
        if self.cluster_scoped() {
            return String::new();
        }
        let handle = self.namespace.as_deref().filter(|ns| !ns.is_empty());
        namespace_or_default(handle.or(object.namespace())).to_string()
    }

    /// The kind stored under this resource: from the scheme if registered,
    /// otherwise from the object itself.
    fn resolve_kind(&self, object: &Unstructured) -> Result<GVK> {
        let declared = object.gvk()?;
        if declared.group != self.gvr.group || declared.version != self.gvr.version {
            return Err(Error::InvalidRequest(format!(
                "object apiVersion {} does not match resource {}",
                join_api_version(&declared.group, &declared.version),
                join_api_version(&self.gvr.group, &self.gvr.version),
            )));
        }

        match self.client.scheme().kind_for_resource(&self.gvr) {
            Some(info) if info.gvk != declared => Err(Error::InvalidRequest(format!(
                "object kind {} does not match resource {} (kind {})",
                declared.kind, self.gvr.resource, info.gvk.kind
            ))),
            Some(info) => Ok(info.gvk),
            None => Ok(declared),
        }
    }

    pub fn create(&self, object: &Unstructured) -> Result<Unstructured> {
        let gvk = self.resolve_kind(object)?;
        let namespace = self.object_namespace(object);
        self.client
            .create(&self.gvr, &gvk, &namespace, object.clone())
    }

    pub fn update(&self, object: &Unstructured) -> Result<Unstructured> {
        let gvk = self.resolve_kind(object)?;
        let namespace = self.object_namespace(object);
        self.client
            .update(&self.gvr, &gvk, &namespace, object.clone())
    }

    pub fn get(&self, name: &str) -> Result<Unstructured> {
        self.client.get(&self.gvr, self.request_namespace(), name)
    }

    /// Delete an object, returning its last state.
    pub fn delete(&self, name: &str) -> Result<Unstructured> {
        self.client.delete(&self.gvr, self.request_namespace(), name)
    }

    pub fn patch(&self, name: &str, patch: &Patch) -> Result<Unstructured> {
        let gvk = match self.client.scheme().kind_for_resource(&self.gvr) {
            Some(info) => info.gvk,
            None => self.get(name)?.gvk()?,
        };
        self.client
            .patch(&self.gvr, &gvk, self.request_namespace(), name, patch)
    }

    pub fn list(&self, label_selector: &str) -> Result<Vec<Unstructured>> {
        self.client
            .list(&self.gvr, self.list_namespace(), label_selector)
    }

    pub fn watch(&self, label_selector: &str) -> Result<WatchSubscription> {
        self.client
            .watch(&self.gvr, self.list_namespace(), label_selector)
    }
}
