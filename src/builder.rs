//! Builder for constructing fake clientsets with various options

use crate::client::{namespace_or_default, FakeClient};
use crate::client_utils::{guess_resource, join_api_version};
use crate::clientset::Clientset;
use crate::dynamic::DynamicClient;
use crate::interceptor;
use crate::scheme::Scheme;
use crate::tracker::ObjectTracker;
use crate::unstructured::Unstructured;
use crate::watch::{OverflowPolicy, WatchConfig};
use crate::{Error, Result};
use kube::Resource;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// Builder for creating fake clientsets
///
/// Provides a fluent API for:
/// - The scheme used for typed conversion
/// - Initial objects, typed, unstructured or loaded from YAML fixtures
/// - Watch queue capacity and overflow policy
/// - Interceptors
///
/// # Example
///
/// ```rust
/// use k8s_openapi::api::apps::v1::Deployment;
/// use kube_fake_clientset::{ClientsetBuilder, Scheme};
/// use std::sync::Arc;
///
/// let scheme = Scheme::new();
/// scheme.register::<Deployment>();
///
/// let mut dp = Deployment::default();
/// dp.metadata.name = Some("my-dp".to_string());
/// dp.metadata.namespace = Some("ns-1".to_string());
///
/// let clientset = ClientsetBuilder::new()
///     .with_scheme(Arc::new(scheme))
///     .with_object(dp)
///     .with_watch_capacity(16)
///     .build()
///     .unwrap();
///
/// assert!(clientset.api::<Deployment>("ns-1").get("my-dp").is_ok());
/// ```
pub struct ClientsetBuilder {
    scheme: Option<Arc<Scheme>>,
    initial_objects: Vec<Value>,
    watch_config: WatchConfig,
    fixture_dir: Option<PathBuf>,
    interceptors: Option<interceptor::Funcs>,
    deferred_error: Option<Error>,
}

impl ClientsetBuilder {
    pub fn new() -> Self {
        Self {
            scheme: None,
            initial_objects: Vec::new(),
            watch_config: WatchConfig::default(),
            fixture_dir: None,
            interceptors: None,
            deferred_error: None,
        }
    }

    /// Use `scheme` for typed conversion. Defaults to an empty scheme.
    pub fn with_scheme(mut self, scheme: Arc<Scheme>) -> Self {
        self.scheme = Some(scheme);
        self
    }

    /// Seed the tracker with a typed object when the clientset is built.
    ///
    /// Serialization errors are reported by [`build`](Self::build).
    pub fn with_object<K>(mut self, obj: K) -> Self
    where
        K: Resource<DynamicType = ()> + Serialize,
    {
        match serde_json::to_value(&obj) {
            Ok(mut value) => {
                if let Some(map) = value.as_object_mut() {
                    map.insert(
                        "apiVersion".to_string(),
                        Value::String(join_api_version(&K::group(&()), &K::version(&()))),
                    );
                    map.insert("kind".to_string(), Value::String(K::kind(&()).into_owned()));
                }
                self.initial_objects.push(value);
            }
            Err(e) => {
                self.deferred_error.get_or_insert(e.into());
            }
        }
        self
    }

    pub fn with_objects<K>(mut self, objects: Vec<K>) -> Self
    where
        K: Resource<DynamicType = ()> + Serialize,
    {
        for obj in objects {
            self = self.with_object(obj);
        }
        self
    }

    /// Seed the tracker with unstructured objects.
    pub fn with_unstructured(mut self, objects: Vec<Unstructured>) -> Self {
        self.initial_objects
            .extend(objects.into_iter().map(Unstructured::into_value));
        self
    }

    /// Maximum number of undelivered events each watch may hold.
    pub fn with_watch_capacity(mut self, capacity: usize) -> Self {
        self.watch_config.capacity = capacity;
        self
    }

    pub fn with_overflow_policy(mut self, policy: OverflowPolicy) -> Self {
        self.watch_config.overflow = policy;
        self
    }

    pub fn with_watch_config(mut self, config: WatchConfig) -> Self {
        self.watch_config = config;
        self
    }

    /// Configure interceptor functions to customize clientset behavior
    ///
    /// # Example
    ///
    /// ```rust
    /// use k8s_openapi::api::apps::v1::Deployment;
    /// use kube_fake_clientset::{interceptor, ClientsetBuilder, Error, Scheme};
    /// use std::sync::Arc;
    ///
    /// let scheme = Scheme::new();
    /// scheme.register::<Deployment>();
    ///
    /// let clientset = ClientsetBuilder::new()
    ///     .with_scheme(Arc::new(scheme))
    ///     .with_interceptor_funcs(interceptor::Funcs::new().create(|ctx| {
    ///         if ctx.object.name() == Some("trigger-error") {
    ///             return Err(Error::Internal("injected error".into()));
    ///         }
    ///         Ok(None)
    ///     }))
    ///     .build()
    ///     .unwrap();
    ///
    /// let mut dp = Deployment::default();
    /// dp.metadata.name = Some("trigger-error".to_string());
    /// assert!(clientset.api::<Deployment>("default").create(&dp).is_err());
    /// ```
    pub fn with_interceptor_funcs(mut self, interceptors: interceptor::Funcs) -> Self {
        self.interceptors = Some(interceptors);
        self
    }

    /// Base directory for [`load_fixture`](Self::load_fixture) paths.
    pub fn with_fixture_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.fixture_dir = Some(dir.into());
        self
    }

    /// Load objects from a YAML fixture file
    ///
    /// Supports single and multi-document files (separated by `---`). Empty
    /// documents are skipped.
    pub fn load_fixture(mut self, path: impl AsRef<Path>) -> Result<Self> {
        let fixture_path = match &self.fixture_dir {
            Some(dir) => dir.join(path),
            None => path.as_ref().to_path_buf(),
        };

        let content = std::fs::read_to_string(&fixture_path).map_err(|e| {
            Error::Fixture(format!(
                "failed to read fixture file {:?}: {}",
                fixture_path, e
            ))
        })?;

        self.initial_objects
            .extend(parse_fixture(&content).map_err(|e| {
                Error::Fixture(format!("failed to parse YAML in {:?}: {}", fixture_path, e))
            })?);
        Ok(self)
    }

    pub fn load_fixtures<P>(mut self, paths: impl IntoIterator<Item = P>) -> Result<Self>
    where
        P: AsRef<Path>,
    {
        for path in paths {
            self = self.load_fixture(path)?;
        }
        Ok(self)
    }

    /// Build the typed clientset.
    ///
    /// # Errors
    ///
    /// Returns an error if the watch capacity is zero or any initial object
    /// cannot be added.
    pub fn build(self) -> Result<Clientset> {
        if let Some(error) = self.deferred_error {
            return Err(error);
        }
        if self.watch_config.capacity == 0 {
            return Err(Error::InvalidRequest(
                "watch capacity must be at least 1".to_string(),
            ));
        }

        let scheme = self.scheme.unwrap_or_default();
        let tracker = Arc::new(ObjectTracker::with_watch_config(self.watch_config));

        for value in self.initial_objects {
            let object = Unstructured::from_value(value)?;
            let gvk = object.gvk()?;
            let (gvr, namespaced) = match scheme.lookup_kind(&gvk) {
                Some(info) => (info.gvr(), info.namespaced),
                None => (guess_resource(&gvk), true),
            };
            let namespace = if namespaced {
                namespace_or_default(object.namespace()).to_string()
            } else {
                String::new()
            };

            debug!("Seeding {:?} {:?} in {:?}", gvk.kind, object.name(), namespace);
            tracker.add(&gvr, &gvk, object, &namespace)?;
        }

        Ok(Clientset::from_client(FakeClient {
            tracker,
            scheme,
            interceptors: self.interceptors.map(Arc::new),
        }))
    }

    /// Build a dynamic client over the same kind of seeded tracker.
    pub fn build_dynamic(self) -> Result<DynamicClient> {
        self.build().map(|clientset| clientset.dynamic())
    }
}

impl Default for ClientsetBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_fixture(content: &str) -> std::result::Result<Vec<Value>, serde_yaml::Error> {
    let mut objects = Vec::new();
    for document in serde_yaml::Deserializer::from_str(content) {
        let value = Value::deserialize(document)?;
        if !value.is_null() {
            objects.push(value);
        }
    }
    Ok(objects)
}
