use crate::unstructured::Unstructured;
use crate::watch::{EventBroadcaster, EventType, WatchConfig, WatchEvent, WatchFilter, WatchSubscription};
use crate::{Error, Result};
use kube::core::{Selector, SelectorExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, trace};

#[allow(clippy::upper_case_acronyms)]
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GVR {
    pub group: String,
    pub version: String,
    pub resource: String,
}

impl GVR {
    pub fn new(
        group: impl Into<String>,
        version: impl Into<String>,
        resource: impl Into<String>,
    ) -> Self {
        Self {
            group: group.into(),
            version: version.into(),
            resource: resource.into(),
        }
    }
}

#[allow(clippy::upper_case_acronyms)]
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GVK {
    pub group: String,
    pub version: String,
    pub kind: String,
}

impl GVK {
    pub fn new(
        group: impl Into<String>,
        version: impl Into<String>,
        kind: impl Into<String>,
    ) -> Self {
        Self {
            group: group.into(),
            version: version.into(),
            kind: kind.into(),
        }
    }
}

/// Where an object lives. `namespace` is empty for cluster-scoped objects.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceCoordinate {
    pub gvr: GVR,
    pub namespace: String,
    pub name: String,
}

impl ResourceCoordinate {
    pub fn new(gvr: &GVR, namespace: &str, name: &str) -> Self {
        Self {
            gvr: gvr.clone(),
            namespace: namespace.to_string(),
            name: name.to_string(),
        }
    }

    fn not_found(&self) -> Error {
        Error::NotFound {
            resource: self.gvr.resource.clone(),
            name: self.name.clone(),
            namespace: self.namespace.clone(),
        }
    }

    fn already_exists(&self) -> Error {
        Error::AlreadyExists {
            resource: self.gvr.resource.clone(),
            name: self.name.clone(),
            namespace: self.namespace.clone(),
        }
    }
}

/// A patch accepted by [`ObjectTracker::patch`]
#[derive(Debug, Clone)]
pub enum Patch {
    /// RFC 7386 JSON merge patch
    Merge(Value),
    /// RFC 6902 JSON patch
    Json(json_patch::Patch),
}

#[derive(Debug, Clone)]
struct StoredObject {
    object: Unstructured,
    resource_version: u64,
}

type ObjectsByName = BTreeMap<String, StoredObject>;
type ObjectsByNamespace = BTreeMap<String, ObjectsByName>;
type ObjectStorage = HashMap<GVR, ObjectsByNamespace>;

#[derive(Debug, Default)]
struct Store {
    objects: ObjectStorage,
    /// Last resourceVersion issued per coordinate, kept after deletion so a
    /// recreated object never reuses a version.
    lineage: HashMap<ResourceCoordinate, u64>,
}

impl Store {
    fn get(&self, coord: &ResourceCoordinate) -> Option<&StoredObject> {
        self.objects
            .get(&coord.gvr)?
            .get(&coord.namespace)?
            .get(&coord.name)
    }

    fn insert(&mut self, coord: &ResourceCoordinate, stored: StoredObject) {
        self.lineage.insert(coord.clone(), stored.resource_version);
        self.objects
            .entry(coord.gvr.clone())
            .or_default()
            .entry(coord.namespace.clone())
            .or_default()
            .insert(coord.name.clone(), stored);
    }

    fn remove(&mut self, coord: &ResourceCoordinate) -> Option<StoredObject> {
        let by_namespace = self.objects.get_mut(&coord.gvr)?;
        let by_name = by_namespace.get_mut(&coord.namespace)?;
        let stored = by_name.remove(&coord.name)?;
        if by_name.is_empty() {
            by_namespace.remove(&coord.namespace);
        }
        Some(stored)
    }

    fn next_version(&self, coord: &ResourceCoordinate) -> u64 {
        self.lineage.get(coord).copied().unwrap_or(0) + 1
    }
}

/// In-memory object store that emits a watch event for every mutation
///
/// All mutations take one write lock and fan their event out before releasing
/// it, so concurrent writes to a coordinate serialize and every watch sees
/// events in mutation order. Fan-out only pushes onto bounded queues, so a slow
/// watcher never holds up a writer.
#[derive(Debug)]
pub struct ObjectTracker {
    store: RwLock<Store>,
    broadcaster: EventBroadcaster,
}

impl ObjectTracker {
    pub fn new() -> Self {
        Self::with_watch_config(WatchConfig::default())
    }

    pub fn with_watch_config(config: WatchConfig) -> Self {
        Self {
            store: RwLock::new(Store::default()),
            broadcaster: EventBroadcaster::new(config),
        }
    }

    pub fn broadcaster(&self) -> &EventBroadcaster {
        &self.broadcaster
    }

    /// Insert or replace an object without create/update preconditions.
    ///
    /// Used to seed the tracker. A resourceVersion carried by the object is
    /// kept when it is newer than anything issued for the coordinate.
    pub fn add(
        &self,
        gvr: &GVR,
        gvk: &GVK,
        mut object: Unstructured,
        namespace: &str,
    ) -> Result<Unstructured> {
        trace!("Adding object: {:?} in namespace: {}", gvr, namespace);

        let name = required_name(&object)?;
        let coord = ResourceCoordinate::new(gvr, namespace, &name);
        let provided_rv = object.resource_version()?;

        let mut store = self.write();
        let next = store.next_version(&coord);
        let resource_version = provided_rv.filter(|rv| *rv >= next).unwrap_or(next);
        let previous = store.get(&coord).map(|s| s.object.clone());

        stamp(&mut object, gvk, namespace, resource_version);
        if let Some(previous) = &previous {
            carry_identity(&mut object, previous);
        }
        store.insert(
            &coord,
            StoredObject {
                object: object.clone(),
                resource_version,
            },
        );

        let event_type = if previous.is_some() {
            EventType::Modified
        } else {
            EventType::Added
        };
        let previous_labels = previous.as_ref().map(Unstructured::labels);
        self.broadcaster.broadcast(
            &WatchEvent::new(event_type, object.clone(), coord),
            previous_labels.as_ref(),
        );

        debug!("Added object: {}/{}", namespace, name);
        Ok(object)
    }

    pub fn create(
        &self,
        gvr: &GVR,
        gvk: &GVK,
        mut object: Unstructured,
        namespace: &str,
    ) -> Result<Unstructured> {
        trace!("Creating object: {:?} in namespace: {}", gvr, namespace);

        let name = required_name(&object)?;
        if object.has_resource_version() {
            return Err(Error::InvalidRequest(
                "resourceVersion can not be set for Create requests".to_string(),
            ));
        }
        check_namespace(&object, namespace)?;

        let coord = ResourceCoordinate::new(gvr, namespace, &name);
        let mut store = self.write();
        if store.get(&coord).is_some() {
            return Err(coord.already_exists());
        }

        let resource_version = store.next_version(&coord);
        stamp(&mut object, gvk, namespace, resource_version);
        store.insert(
            &coord,
            StoredObject {
                object: object.clone(),
                resource_version,
            },
        );
        self.broadcaster
            .broadcast(&WatchEvent::new(EventType::Added, object.clone(), coord), None);

        debug!("Created object: {}/{} at version {}", namespace, name, resource_version);
        Ok(object)
    }

    pub fn get(&self, gvr: &GVR, namespace: &str, name: &str) -> Result<Unstructured> {
        trace!("Getting object: {:?} {}/{}", gvr, namespace, name);

        let coord = ResourceCoordinate::new(gvr, namespace, name);
        self.read()
            .get(&coord)
            .map(|stored| stored.object.clone())
            .ok_or_else(|| coord.not_found())
    }

    /// Replace a live object.
    ///
    /// If the object carries a resourceVersion it must match the stored one.
    pub fn update(
        &self,
        gvr: &GVR,
        gvk: &GVK,
        mut object: Unstructured,
        namespace: &str,
    ) -> Result<Unstructured> {
        trace!("Updating object: {:?} in namespace: {}", gvr, namespace);

        let name = required_name(&object)?;
        check_namespace(&object, namespace)?;
        let provided_rv = object.resource_version()?;
        let coord = ResourceCoordinate::new(gvr, namespace, &name);

        let mut store = self.write();
        let existing = store.get(&coord).ok_or_else(|| coord.not_found())?;
        check_precondition(&name, provided_rv, existing.resource_version)?;
        let previous = existing.object.clone();

        self.replace(&mut store, coord, gvk, &mut object, &previous);
        debug!("Updated object: {}/{}", namespace, name);
        Ok(object)
    }

    pub fn patch(&self, gvr: &GVR, gvk: &GVK, namespace: &str, name: &str, patch: &Patch) -> Result<Unstructured> {
        self.patch_validated(gvr, gvk, namespace, name, patch, |_| Ok(()))
    }

    /// Like [`patch`](Self::patch), but the patched object is only stored if
    /// `validate` accepts it.
    pub fn patch_validated<F>(
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
        trace!("Patching object: {:?} {}/{}", gvr, namespace, name);

        let coord = ResourceCoordinate::new(gvr, namespace, name);
        let mut store = self.write();
        let existing = store.get(&coord).ok_or_else(|| coord.not_found())?;
        let previous = existing.object.clone();
        let current_rv = existing.resource_version;

        let mut value = previous.to_value();
        match patch {
            Patch::Merge(merge) => json_patch::merge(&mut value, merge),
            Patch::Json(ops) => json_patch::patch(&mut value, &ops.0)?,
        }
        let mut object = Unstructured::from_value(value)?;

        if object.name() != Some(name) {
            return Err(Error::InvalidRequest(
                "metadata.name can not be changed by a patch".to_string(),
            ));
        }
        check_precondition(name, object.resource_version()?, current_rv)?;
        validate(&object)?;

        self.replace(&mut store, coord, gvk, &mut object, &previous);
        debug!("Patched object: {}/{}", namespace, name);
        Ok(object)
    }

    fn replace(
        &self,
        store: &mut Store,
        coord: ResourceCoordinate,
        gvk: &GVK,
        object: &mut Unstructured,
        previous: &Unstructured,
    ) {
        let resource_version = store.next_version(&coord);
        stamp(object, gvk, &coord.namespace, resource_version);
        carry_identity(object, previous);
        store.insert(
            &coord,
            StoredObject {
                object: object.clone(),
                resource_version,
            },
        );
        self.broadcaster.broadcast(
            &WatchEvent::new(EventType::Modified, object.clone(), coord),
            Some(&previous.labels()),
        );
    }

    /// Remove an object, returning its last live state.
    pub fn delete(&self, gvr: &GVR, namespace: &str, name: &str) -> Result<Unstructured> {
        trace!("Deleting object: {:?} {}/{}", gvr, namespace, name);

        let coord = ResourceCoordinate::new(gvr, namespace, name);
        let mut store = self.write();
        let stored = store.remove(&coord).ok_or_else(|| coord.not_found())?;
        self.broadcaster.broadcast(
            &WatchEvent::new(EventType::Deleted, stored.object.clone(), coord),
            None,
        );

        debug!("Deleted object: {}/{}", namespace, name);
        Ok(stored.object)
    }

    /// Objects of `gvr` matching `selector`, ordered by namespace then name.
    ///
    /// `None` lists across all namespaces. The result is taken under a single
    /// read lock.
    pub fn list(&self, gvr: &GVR, namespace: Option<&str>, selector: &Selector) -> Vec<Unstructured> {
        trace!("Listing objects: {:?} in namespace: {:?}", gvr, namespace);

        let store = self.read();
        let Some(by_namespace) = store.objects.get(gvr) else {
            return Vec::new();
        };

        let namespaces: Vec<&ObjectsByName> = match namespace {
            Some(ns) => by_namespace.get(ns).into_iter().collect(),
            None => by_namespace.values().collect(),
        };

        namespaces
            .into_iter()
            .flat_map(BTreeMap::values)
            .filter(|stored| selector.matches(&stored.object.labels()))
            .map(|stored| stored.object.clone())
            .collect()
    }

    /// Open a watch on `gvr`. Only mutations after this call are delivered.
    pub fn watch(&self, gvr: &GVR, namespace: Option<&str>, selector: Selector) -> WatchSubscription {
        trace!("Watching objects: {:?} in namespace: {:?}", gvr, namespace);
        self.broadcaster
            .subscribe(WatchFilter::new(gvr.clone(), namespace, selector))
    }

    fn read(&self) -> RwLockReadGuard<'_, Store> {
        self.store.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Store> {
        self.store.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for ObjectTracker {
    fn default() -> Self {
        Self::new()
    }
}

fn required_name(object: &Unstructured) -> Result<String> {
    object
        .name()
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .ok_or_else(|| Error::InvalidRequest("Object name is required".to_string()))
}

fn check_namespace(object: &Unstructured, namespace: &str) -> Result<()> {
    match object.namespace() {
        Some(ns) if !ns.is_empty() && !namespace.is_empty() && ns != namespace => {
            Err(Error::InvalidRequest(format!(
                "the namespace of the provided object ({}) does not match the namespace sent on the request ({})",
                ns, namespace
            )))
        }
        _ => Ok(()),
    }
}

fn check_precondition(name: &str, provided: Option<u64>, current: u64) -> Result<()> {
    match provided {
        Some(provided) if provided != current => Err(Error::Conflict {
            name: name.to_string(),
            expected: current.to_string(),
            actual: provided.to_string(),
        }),
        _ => Ok(()),
    }
}

/// Set the tracker-managed fields of a freshly written object.
fn stamp(object: &mut Unstructured, gvk: &GVK, namespace: &str, resource_version: u64) {
    object.set_gvk(gvk);
    if namespace.is_empty() {
        object.clear_namespace();
    } else {
        object.set_namespace(namespace);
    }
    object.set_resource_version(resource_version);
    if object.uid().is_none_or(str::is_empty) {
        object.set_uid(uuid::Uuid::new_v4().to_string());
    }
    if object.creation_timestamp().is_none_or(str::is_empty) {
        object.set_creation_timestamp(
            chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
        );
    }
}

/// uid and creationTimestamp survive updates.
fn carry_identity(object: &mut Unstructured, previous: &Unstructured) {
    if let Some(uid) = previous.uid() {
        object.set_uid(uid);
    }
    if let Some(created) = previous.creation_timestamp() {
        object.set_creation_timestamp(created);
    }
}
