//! Shared backend of the typed and dynamic clientsets

use crate::convert::Converter;
use crate::interceptor;
use crate::label_selector::parse_label_selector;
use crate::scheme::Scheme;
use crate::tracker::{ObjectTracker, Patch, GVK, GVR};
use crate::unstructured::Unstructured;
use crate::watch::WatchSubscription;
use crate::Result;
use std::sync::Arc;
use tracing::trace;

/// Namespace given to namespaced objects that arrive without one.
pub(crate) const DEFAULT_NAMESPACE: &str = "default";

/// `namespace` unless it is missing or empty, else [`DEFAULT_NAMESPACE`].
pub(crate) fn namespace_or_default(namespace: Option<&str>) -> &str {
    namespace.filter(|ns| !ns.is_empty()).unwrap_or(DEFAULT_NAMESPACE)
}

/// Routes unstructured requests through interceptors to the object tracker
///
/// Both façades hold a `FakeClient`; clones share the same tracker, so a typed
/// clientset and a dynamic client built from it see the same objects.
#[derive(Clone)]
pub struct FakeClient {
    pub(crate) tracker: Arc<ObjectTracker>,
    pub(crate) scheme: Arc<Scheme>,
    pub(crate) interceptors: Option<Arc<interceptor::Funcs>>,
}

impl FakeClient {
    pub fn new(scheme: Arc<Scheme>) -> Self {
        Self {
            tracker: Arc::new(ObjectTracker::new()),
            scheme,
            interceptors: None,
        }
    }

    pub fn tracker(&self) -> &Arc<ObjectTracker> {
        &self.tracker
    }

    pub fn scheme(&self) -> &Arc<Scheme> {
        &self.scheme
    }

    pub fn converter(&self) -> Converter<'_> {
        Converter::new(&self.scheme)
    }

    pub fn create(
        &self,
        gvr: &GVR,
        gvk: &GVK,
        namespace: &str,
        object: Unstructured,
    ) -> Result<Unstructured> {
        if let Some(create) = self.interceptors.as_ref().and_then(|f| f.create.as_ref()) {
            let ctx = interceptor::CreateContext {
                client: self,
                gvr,
                object: &object,
                namespace,
            };
            if let Some(result) = create(ctx)? {
                trace!("Create of {:?} answered by interceptor", gvr);
                return Ok(result);
            }
        }
        self.tracker.create(gvr, gvk, object, namespace)
    }

    pub fn get(&self, gvr: &GVR, namespace: &str, name: &str) -> Result<Unstructured> {
        if let Some(get) = self.interceptors.as_ref().and_then(|f| f.get.as_ref()) {
            let ctx = interceptor::GetContext {
                client: self,
                gvr,
                namespace,
                name,
            };
            if let Some(result) = get(ctx)? {
                return Ok(result);
            }
        }
        self.tracker.get(gvr, namespace, name)
    }

    pub fn update(
        &self,
        gvr: &GVR,
        gvk: &GVK,
        namespace: &str,
        object: Unstructured,
    ) -> Result<Unstructured> {
        if let Some(update) = self.interceptors.as_ref().and_then(|f| f.update.as_ref()) {
            let ctx = interceptor::UpdateContext {
                client: self,
                gvr,
                object: &object,
                namespace,
            };
            if let Some(result) = update(ctx)? {
                return Ok(result);
            }
        }
        self.tracker.update(gvr, gvk, object, namespace)
    }

    pub fn patch(
        &self,
        gvr: &GVR,
        gvk: &GVK,
        namespace: &str,
        name: &str,
        patch: &Patch,
    ) -> Result<Unstructured> {
        self.patch_validated(gvr, gvk, namespace, name, patch, |_| Ok(()))
    }

    /// Patch, storing the result only if `validate` accepts it.
    pub(crate) fn patch_validated<F>(
        &self,
        gvr: &GVR,
        gvk: &GVK,
        namespace: &str,
        name: &str,
        patch: &Patch,
        validate: F,
    ) -> Result<Unstructured>
    where
        F: FnOnce(&Unstructured) -> Result<()>,
    {
        if let Some(intercept) = self.interceptors.as_ref().and_then(|f| f.patch.as_ref()) {
            let ctx = interceptor::PatchContext {
                client: self,
                gvr,
                patch,
                namespace,
                name,
            };
            if let Some(result) = intercept(ctx)? {
                return Ok(result);
            }
        }
        self.tracker
            .patch_validated(gvr, gvk, namespace, name, patch, validate)
    }

    pub fn delete(&self, gvr: &GVR, namespace: &str, name: &str) -> Result<Unstructured> {
        if let Some(delete) = self.interceptors.as_ref().and_then(|f| f.delete.as_ref()) {
            let ctx = interceptor::DeleteContext {
                client: self,
                gvr,
                namespace,
                name,
            };
            if let Some(result) = delete(ctx)? {
                return Ok(result);
            }
        }
        self.tracker.delete(gvr, namespace, name)
    }

    pub fn list(
        &self,
        gvr: &GVR,
        namespace: Option<&str>,
        label_selector: &str,
    ) -> Result<Vec<Unstructured>> {
        let selector = parse_label_selector(label_selector)?;
        if let Some(list) = self.interceptors.as_ref().and_then(|f| f.list.as_ref()) {
            let ctx = interceptor::ListContext {
                client: self,
                gvr,
                namespace,
                label_selector,
            };
            if let Some(result) = list(ctx)? {
                return Ok(result);
            }
        }
        Ok(self.tracker.list(gvr, namespace, &selector))
    }

    pub fn watch(
        &self,
        gvr: &GVR,
        namespace: Option<&str>,
        label_selector: &str,
    ) -> Result<WatchSubscription> {
        let selector = parse_label_selector(label_selector)?;
        if let Some(watch) = self.interceptors.as_ref().and_then(|f| f.watch.as_ref()) {
            let ctx = interceptor::WatchContext {
                client: self,
                gvr,
                namespace,
                label_selector,
            };
            if let Some(subscription) = watch(ctx)? {
                return Ok(subscription);
            }
        }
        Ok(self.tracker.watch(gvr, namespace, selector))
    }
}
