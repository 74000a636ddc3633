//! Type registry mapping kinds to resources and field shapes
//!
//! A `Scheme` is built explicitly for each test and handed to the clientsets by
//! reference, so independent trackers in the same process never share
//! registrations. Like a real cluster, where CRDs must be installed before use,
//! kinds have to be registered before the typed API will convert them.

use crate::shape::FieldShape;
use crate::tracker::{GVK, GVR};
use crate::{Error, Result};
use k8s_openapi::NamespaceResourceScope;
use kube::Resource;
use schemars::gen::SchemaSettings;
use schemars::JsonSchema;
use std::any::TypeId;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::debug;

/// Metadata for a registered kind
#[derive(Debug, Clone)]
pub struct KindInfo {
    pub gvk: GVK,
    /// The plural resource name (e.g., "deployments")
    pub plural: String,
    pub namespaced: bool,
    pub shape: Arc<FieldShape>,
}

impl KindInfo {
    pub fn gvr(&self) -> GVR {
        GVR::new(
            self.gvk.group.clone(),
            self.gvk.version.clone(),
            self.plural.clone(),
        )
    }
}

#[derive(Debug, Default)]
pub struct Scheme {
    kinds: RwLock<HashMap<GVK, KindInfo>>,
}

impl Scheme {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a kind along with the field shape derived from its JSON schema.
    pub fn register<K>(&self) -> &Self
    where
        K: Resource<DynamicType = ()> + JsonSchema,
        K::Scope: 'static,
    {
        let root = SchemaSettings::draft07()
            .into_generator()
            .into_root_schema_for::<K>();
        let shape = FieldShape::from_root_schema(&root);
        self.insert(Self::info_for::<K>(shape))
    }

    /// Register a kind without a schema. Conversion for it relies on serde alone.
    pub fn register_opaque<K>(&self) -> &Self
    where
        K: Resource<DynamicType = ()>,
        K::Scope: 'static,
    {
        self.insert(Self::info_for::<K>(FieldShape::Any))
    }

    /// Register a kind known only by name, for use with the dynamic client.
    pub fn register_kind(&self, info: KindInfo) -> &Self {
        self.insert(info)
    }

    pub fn gvk_of<K: Resource<DynamicType = ()>>() -> GVK {
        GVK::new(K::group(&()), K::version(&()), K::kind(&()))
    }

    pub fn lookup_kind(&self, gvk: &GVK) -> Option<KindInfo> {
        self.read().get(gvk).cloned()
    }

    pub fn kind_for_resource(&self, gvr: &GVR) -> Option<KindInfo> {
        self.read()
            .values()
            .find(|info| {
                info.gvk.group == gvr.group
                    && info.gvk.version == gvr.version
                    && info.plural == gvr.resource
            })
            .cloned()
    }

    pub fn resource_for_kind(&self, gvk: &GVK) -> Option<GVR> {
        self.lookup_kind(gvk).map(|info| info.gvr())
    }

    pub fn shape_of(&self, gvk: &GVK) -> Result<Arc<FieldShape>> {
        self.lookup_kind(gvk)
            .map(|info| info.shape)
            .ok_or_else(|| Error::KindNotRegistered {
                group: gvk.group.clone(),
                version: gvk.version.clone(),
                kind: gvk.kind.clone(),
            })
    }

    pub fn is_registered(&self, gvk: &GVK) -> bool {
        self.read().contains_key(gvk)
    }

    pub fn kinds(&self) -> Vec<GVK> {
        let mut kinds: Vec<GVK> = self.read().keys().cloned().collect();
        kinds.sort_by(|a, b| (&a.group, &a.version, &a.kind).cmp(&(&b.group, &b.version, &b.kind)));
        kinds
    }

    fn info_for<K>(shape: FieldShape) -> KindInfo
    where
        K: Resource<DynamicType = ()>,
        K::Scope: 'static,
    {
        KindInfo {
            gvk: Self::gvk_of::<K>(),
            plural: K::plural(&()).into_owned(),
            namespaced: TypeId::of::<K::Scope>() == TypeId::of::<NamespaceResourceScope>(),
            shape: Arc::new(shape),
        }
    }

    fn insert(&self, info: KindInfo) -> &Self {
        debug!("Registering kind {:?} as {}", info.gvk, info.plural);
        self.kinds
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(info.gvk.clone(), info);
        self
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<GVK, KindInfo>> {
        self.kinds.read().unwrap_or_else(PoisonError::into_inner)
    }
}
