//! Generic attribute-tree form of a Kubernetes object.
//!
//! The tree itself is a [`serde_json::Value`]; [`Unstructured`] wraps the top-level
//! map and offers typed accessors for the fields the tracker manages. Everything
//! else in the tree is carried through untouched.

use crate::client_utils::{join_api_version, split_api_version};
use crate::tracker::GVK;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Unstructured {
    object: Map<String, Value>,
}

impl Unstructured {
    pub fn new(api_version: impl Into<String>, kind: impl Into<String>) -> Self {
        let mut object = Map::new();
        object.insert("apiVersion".to_string(), Value::String(api_version.into()));
        object.insert("kind".to_string(), Value::String(kind.into()));
        Self { object }
    }

    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Object(object) => Ok(Self { object }),
            other => Err(Error::InvalidRequest(format!(
                "expected a JSON object, got {}",
                type_name(&other)
            ))),
        }
    }

    pub fn from_map(object: Map<String, Value>) -> Self {
        Self { object }
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.object)
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.object.clone())
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.object
    }

    pub fn as_map_mut(&mut self) -> &mut Map<String, Value> {
        &mut self.object
    }

    pub fn api_version(&self) -> Option<&str> {
        self.object.get("apiVersion").and_then(Value::as_str)
    }

    pub fn kind(&self) -> Option<&str> {
        self.object.get("kind").and_then(Value::as_str)
    }

    pub fn set_api_version(&mut self, api_version: impl Into<String>) {
        self.object
            .insert("apiVersion".to_string(), Value::String(api_version.into()));
    }

    pub fn set_kind(&mut self, kind: impl Into<String>) {
        self.object
            .insert("kind".to_string(), Value::String(kind.into()));
    }

    pub fn gvk(&self) -> Result<GVK> {
        let api_version = self
            .api_version()
            .filter(|v| !v.is_empty())
            .ok_or_else(|| Error::InvalidRequest("Missing apiVersion".to_string()))?;
        let kind = self
            .kind()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| Error::InvalidRequest("Missing kind".to_string()))?;
        let (group, version) = split_api_version(api_version);
        Ok(GVK::new(group, version, kind))
    }

    pub fn set_gvk(&mut self, gvk: &GVK) {
        self.set_api_version(join_api_version(&gvk.group, &gvk.version));
        self.set_kind(gvk.kind.clone());
    }

    pub fn name(&self) -> Option<&str> {
        self.metadata_str("name")
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.metadata_mut()
            .insert("name".to_string(), Value::String(name.into()));
    }

    pub fn namespace(&self) -> Option<&str> {
        self.metadata_str("namespace")
    }

    pub fn set_namespace(&mut self, namespace: impl Into<String>) {
        self.metadata_mut()
            .insert("namespace".to_string(), Value::String(namespace.into()));
    }

    pub fn clear_namespace(&mut self) {
        self.metadata_mut().remove("namespace");
    }

    /// Labels as a map. Non-string label values are ignored.
    pub fn labels(&self) -> BTreeMap<String, String> {
        self.metadata()
            .and_then(|m| m.get("labels"))
            .and_then(Value::as_object)
            .map(|labels| {
                labels
                    .iter()
                    .filter_map(|(k, v)| v.as_str().map(|v| (k.clone(), v.to_string())))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn set_labels(&mut self, labels: BTreeMap<String, String>) {
        let labels = labels
            .into_iter()
            .map(|(k, v)| (k, Value::String(v)))
            .collect::<Map<_, _>>();
        self.metadata_mut()
            .insert("labels".to_string(), Value::Object(labels));
    }

    /// The parsed `metadata.resourceVersion`. An absent or empty value is `None`.
    pub fn resource_version(&self) -> Result<Option<u64>> {
        match self.metadata_str("resourceVersion") {
            None | Some("") => Ok(None),
            Some(rv) => rv.parse().map(Some).map_err(|_| {
                Error::InvalidRequest(format!("invalid resourceVersion: {:?}", rv))
            }),
        }
    }

    pub fn has_resource_version(&self) -> bool {
        self.metadata_str("resourceVersion")
            .is_some_and(|rv| !rv.is_empty())
    }

    pub fn set_resource_version(&mut self, resource_version: u64) {
        self.metadata_mut().insert(
            "resourceVersion".to_string(),
            Value::String(resource_version.to_string()),
        );
    }

    pub fn clear_resource_version(&mut self) {
        self.metadata_mut().remove("resourceVersion");
    }

    pub fn uid(&self) -> Option<&str> {
        self.metadata_str("uid")
    }

    pub fn set_uid(&mut self, uid: impl Into<String>) {
        self.metadata_mut()
            .insert("uid".to_string(), Value::String(uid.into()));
    }

    pub fn creation_timestamp(&self) -> Option<&str> {
        self.metadata_str("creationTimestamp")
    }

    pub fn set_creation_timestamp(&mut self, timestamp: impl Into<String>) {
        self.metadata_mut().insert(
            "creationTimestamp".to_string(),
            Value::String(timestamp.into()),
        );
    }

    pub fn nested_field(&self, path: &[&str]) -> Option<&Value> {
        let (first, rest) = path.split_first()?;
        let mut current = self.object.get(*first)?;
        for segment in rest {
            current = current.as_object()?.get(*segment)?;
        }
        Some(current)
    }

    pub fn nested_str(&self, path: &[&str]) -> Option<&str> {
        self.nested_field(path).and_then(Value::as_str)
    }

    pub fn nested_i64(&self, path: &[&str]) -> Option<i64> {
        self.nested_field(path).and_then(Value::as_i64)
    }

    /// Set a value at `path`, creating intermediate maps as needed.
    ///
    /// Fails if an intermediate segment exists but is not a map.
    pub fn set_nested_field(&mut self, path: &[&str], value: Value) -> Result<()> {
        let Some((last, parents)) = path.split_last() else {
            return Err(Error::InvalidRequest("empty field path".to_string()));
        };

        let mut current = &mut self.object;
        for (i, segment) in parents.iter().enumerate() {
            let entry = current
                .entry(segment.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            current = match entry {
                Value::Object(map) => map,
                other => {
                    return Err(Error::InvalidRequest(format!(
                        "{} is a {}, not a map",
                        path[..=i].join("."),
                        type_name(other)
                    )))
                }
            };
        }
        current.insert(last.to_string(), value);
        Ok(())
    }

    pub fn remove_nested_field(&mut self, path: &[&str]) -> Option<Value> {
        let (last, parents) = path.split_last()?;
        let mut current = &mut self.object;
        for segment in parents {
            current = current.get_mut(*segment)?.as_object_mut()?;
        }
        current.remove(*last)
    }

    fn metadata(&self) -> Option<&Map<String, Value>> {
        self.object.get("metadata").and_then(Value::as_object)
    }

    fn metadata_str(&self, key: &str) -> Option<&str> {
        self.metadata()?.get(key).and_then(Value::as_str)
    }

    fn metadata_mut(&mut self) -> &mut Map<String, Value> {
        let entry = self
            .object
            .entry("metadata".to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if !entry.is_object() {
            *entry = Value::Object(Map::new());
        }
        match entry {
            Value::Object(map) => map,
            _ => unreachable!("metadata was just replaced with a map"),
        }
    }
}

impl TryFrom<Value> for Unstructured {
    type Error = Error;

    fn try_from(value: Value) -> Result<Self> {
        Self::from_value(value)
    }
}

impl From<Unstructured> for Value {
    fn from(object: Unstructured) -> Self {
        object.into_value()
    }
}

pub(crate) fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_i64() || n.is_u64() => "integer",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
