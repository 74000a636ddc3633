//! Interceptors for customizing clientset behavior during testing

use crate::client::FakeClient;
use crate::tracker::{Patch, GVR};
use crate::unstructured::Unstructured;
use crate::watch::WatchSubscription;
use crate::Result;
use std::sync::Arc;

/// Interceptor functions for clientset operations
///
/// These play the role of client-go's fake reactors. Each runs before the
/// tracker sees the request and can return `Ok(Some(value))` to answer it
/// directly, `Ok(None)` to fall through to the tracker, or `Err(e)` to inject
/// an error.
///
/// # Example
/// ```
/// use kube_fake_clientset::{interceptor, Error};
///
/// let funcs = interceptor::Funcs::new()
///     .create(|ctx| {
///         if ctx.object.name() == Some("trigger-error") {
///             return Err(Error::Internal("injected error".into()));
///         }
///         Ok(None)
///     })
///     .delete(|_ctx| Ok(None));
/// ```
#[derive(Default)]
pub struct Funcs {
    pub(crate) create: Option<CreateInterceptor>,
    pub(crate) get: Option<GetInterceptor>,
    pub(crate) update: Option<UpdateInterceptor>,
    pub(crate) patch: Option<PatchInterceptor>,
    pub(crate) delete: Option<DeleteInterceptor>,
    pub(crate) list: Option<ListInterceptor>,
    pub(crate) watch: Option<WatchInterceptor>,
}

/// Context passed to Create interceptors
pub struct CreateContext<'a> {
    pub client: &'a FakeClient,
    pub gvr: &'a GVR,
    /// The object being created
    pub object: &'a Unstructured,
    pub namespace: &'a str,
}

pub struct GetContext<'a> {
    pub client: &'a FakeClient,
    pub gvr: &'a GVR,
    pub namespace: &'a str,
    pub name: &'a str,
}

pub struct UpdateContext<'a> {
    pub client: &'a FakeClient,
    pub gvr: &'a GVR,
    /// The replacement object
    pub object: &'a Unstructured,
    pub namespace: &'a str,
}

pub struct PatchContext<'a> {
    pub client: &'a FakeClient,
    pub gvr: &'a GVR,
    pub patch: &'a Patch,
    pub namespace: &'a str,
    pub name: &'a str,
}

pub struct DeleteContext<'a> {
    pub client: &'a FakeClient,
    pub gvr: &'a GVR,
    pub namespace: &'a str,
    pub name: &'a str,
}

pub struct ListContext<'a> {
    pub client: &'a FakeClient,
    pub gvr: &'a GVR,
    pub namespace: Option<&'a str>,
    pub label_selector: &'a str,
}

pub struct WatchContext<'a> {
    pub client: &'a FakeClient,
    pub gvr: &'a GVR,
    pub namespace: Option<&'a str>,
    pub label_selector: &'a str,
}

pub type CreateInterceptor =
    Arc<dyn Fn(CreateContext) -> Result<Option<Unstructured>> + Send + Sync>;
pub type GetInterceptor = Arc<dyn Fn(GetContext) -> Result<Option<Unstructured>> + Send + Sync>;
pub type UpdateInterceptor =
    Arc<dyn Fn(UpdateContext) -> Result<Option<Unstructured>> + Send + Sync>;
pub type PatchInterceptor =
    Arc<dyn Fn(PatchContext) -> Result<Option<Unstructured>> + Send + Sync>;
pub type DeleteInterceptor =
    Arc<dyn Fn(DeleteContext) -> Result<Option<Unstructured>> + Send + Sync>;
pub type ListInterceptor =
    Arc<dyn Fn(ListContext) -> Result<Option<Vec<Unstructured>>> + Send + Sync>;
pub type WatchInterceptor =
    Arc<dyn Fn(WatchContext) -> Result<Option<WatchSubscription>> + Send + Sync>;

impl Funcs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create<F>(mut self, f: F) -> Self
    where
        F: Fn(CreateContext) -> Result<Option<Unstructured>> + Send + Sync + 'static,
    {
        self.create = Some(Arc::new(f));
        self
    }

    pub fn get<F>(mut self, f: F) -> Self
    where
        F: Fn(GetContext) -> Result<Option<Unstructured>> + Send + Sync + 'static,
    {
        self.get = Some(Arc::new(f));
        self
    }

    pub fn update<F>(mut self, f: F) -> Self
    where
        F: Fn(UpdateContext) -> Result<Option<Unstructured>> + Send + Sync + 'static,
    {
        self.update = Some(Arc::new(f));
        self
    }

    pub fn patch<F>(mut self, f: F) -> Self
    where
        F: Fn(PatchContext) -> Result<Option<Unstructured>> + Send + Sync + 'static,
    {
        self.patch = Some(Arc::new(f));
        self
    }

    pub fn delete<F>(mut self, f: F) -> Self
    where
        F: Fn(DeleteContext) -> Result<Option<Unstructured>> + Send + Sync + 'static,
    {
        self.delete = Some(Arc::new(f));
        self
    }

    pub fn list<F>(mut self, f: F) -> Self
    where
        F: Fn(ListContext) -> Result<Option<Vec<Unstructured>>> + Send + Sync + 'static,
    {
        self.list = Some(Arc::new(f));
        self
    }

    /// Add a Watch interceptor. Returning a subscription hands it to the caller
    /// in place of the tracker's own.
    pub fn watch<F>(mut self, f: F) -> Self
    where
        F: Fn(WatchContext) -> Result<Option<WatchSubscription>> + Send + Sync + 'static,
    {
        self.watch = Some(Arc::new(f));
        self
    }
}
