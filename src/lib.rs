//! In-memory Kubernetes clientsets for testing controllers and operators.
//!
//! Modelled on client-go's fake clientsets. An [`ObjectTracker`] stores
//! objects in their unstructured form, issues resourceVersions and fans every
//! mutation out to open watches. The typed [`Clientset`] and the
//! [`DynamicClient`] are two views over the same tracker.
//!
//! # Examples
//!
//! ## Typed clientset
//!
//! ```rust
//! use k8s_openapi::api::apps::v1::Deployment;
//! use kube_fake_clientset::{ClientsetBuilder, Scheme};
//! use std::sync::Arc;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let scheme = Scheme::new();
//! scheme.register::<Deployment>();
//! let clientset = ClientsetBuilder::new().with_scheme(Arc::new(scheme)).build()?;
//! let deployments = clientset.api::<Deployment>("ns-1");
//!
//! let mut watch = deployments.watch("dp=1")?;
//!
//! let mut dp = Deployment::default();
//! dp.metadata.name = Some("my-dp".to_string());
//! dp.metadata.labels = Some([("dp".to_string(), "1".to_string())].into());
//! deployments.create(&dp)?;
//!
//! let event = watch.try_recv().unwrap()?;
//! assert_eq!(event.object.metadata.name.as_deref(), Some("my-dp"));
//! # Ok(())
//! # }
//! ```
//!
//! ## Dynamic client
//!
//! ```rust
//! use kube_fake_clientset::{ClientsetBuilder, Unstructured, GVR};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let client = ClientsetBuilder::new().build_dynamic()?;
//! let apps = client
//!     .resource(GVR::new("core.oam.dev", "v1beta1", "applications"))
//!     .namespace("ns-1");
//!
//! let mut app = Unstructured::new("core.oam.dev/v1beta1", "Application");
//! app.set_name("my-app");
//! let created = apps.create(&app)?;
//! assert_eq!(created.resource_version()?, Some(1));
//! # Ok(())
//! # }
//! ```

mod builder;
mod client;
mod client_utils;
mod clientset;
mod convert;
mod dynamic;
mod error;
pub mod interceptor;
pub mod label_selector;
mod scheme;
mod shape;
mod tracker;
mod unstructured;
mod watch;

#[cfg(test)]
mod dynamic_test;
#[cfg(test)]
mod watch_test;

pub use builder::ClientsetBuilder;
pub use client::FakeClient;
pub use clientset::{Clientset, TypedApi, TypedEvent, TypedWatch};
pub use convert::{Converter, Typed};
pub use dynamic::{DynamicClient, DynamicResource};
pub use error::{Error, Result};
pub use scheme::{KindInfo, Scheme};
pub use shape::{FieldShape, IntegerFormat};
pub use tracker::{ObjectTracker, Patch, ResourceCoordinate, GVK, GVR};
pub use unstructured::Unstructured;
pub use watch::{
    EventBroadcaster, EventType, OverflowPolicy, StopHandle, WatchConfig, WatchEvent,
    WatchFilter, WatchSubscription, DEFAULT_WATCH_CAPACITY,
};
