//! Conversion between typed objects and their unstructured form
//!
//! The scheme supplies the field shape of each kind. Incoming trees are checked
//! against that shape before serde sees them, so a bad value is reported with
//! the path of the field that holds it. Fields the shape does not describe are
//! never an error; [`Typed`] keeps them so they survive a round trip through
//! the typed form.

use crate::scheme::Scheme;
use crate::shape::FieldShape;
use crate::unstructured::{type_name, Unstructured};
use crate::{Error, Result};
use kube::Resource;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use std::fmt;
use std::ops::{Deref, DerefMut};
use tracing::trace;

const ROOT_PATH: &str = "<root>";

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Key(String),
    Index(usize),
}

#[derive(Debug, Default)]
struct FieldPath(Vec<Segment>);

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return f.write_str(ROOT_PATH);
        }
        for (i, segment) in self.0.iter().enumerate() {
            match segment {
                Segment::Key(key) if i == 0 => write!(f, "{}", key)?,
                Segment::Key(key) => write!(f, ".{}", key)?,
                Segment::Index(index) => write!(f, "[{}]", index)?,
            }
        }
        Ok(())
    }
}

/// A typed object together with the fields its type does not model.
#[derive(Debug, Clone, PartialEq)]
pub struct Typed<K> {
    object: K,
    /// Sparse tree of unmodelled fields; `Null` when there are none.
    unknown: Value,
}

impl<K> Typed<K> {
    pub fn new(object: K) -> Self {
        Self {
            object,
            unknown: Value::Null,
        }
    }

    pub fn into_inner(self) -> K {
        self.object
    }

    pub fn unknown_fields(&self) -> &Value {
        &self.unknown
    }

    pub fn has_unknown_fields(&self) -> bool {
        !self.unknown.is_null()
    }
}

impl<K> Deref for Typed<K> {
    type Target = K;

    fn deref(&self) -> &K {
        &self.object
    }
}

impl<K> DerefMut for Typed<K> {
    fn deref_mut(&mut self) -> &mut K {
        &mut self.object
    }
}

/// Converts objects of registered kinds using a [`Scheme`].
#[derive(Debug, Clone, Copy)]
pub struct Converter<'a> {
    scheme: &'a Scheme,
}

impl<'a> Converter<'a> {
    pub fn new(scheme: &'a Scheme) -> Self {
        Self { scheme }
    }

    /// Serialize a typed object and stamp its apiVersion and kind.
    pub fn to_unstructured<K>(&self, object: &K) -> Result<Unstructured>
    where
        K: Resource<DynamicType = ()> + Serialize,
    {
        let gvk = Scheme::gvk_of::<K>();
        // fails for unregistered kinds
        self.scheme.shape_of(&gvk)?;

        let value = serde_json::to_value(object).map_err(|e| Error::Conversion {
            path: ROOT_PATH.to_string(),
            message: e.to_string(),
        })?;
        let mut unstructured = Unstructured::from_value(value)?;
        unstructured.set_gvk(&gvk);

        trace!("Converted {} to unstructured", gvk.kind);
        Ok(unstructured)
    }

    /// Check `unstructured` against the kind's shape and deserialize it.
    pub fn from_unstructured<K>(&self, unstructured: &Unstructured) -> Result<K>
    where
        K: Resource<DynamicType = ()> + DeserializeOwned,
    {
        let gvk = Scheme::gvk_of::<K>();
        let shape = self.scheme.shape_of(&gvk)?;

        let mut value = unstructured.to_value();
        if let Value::Object(map) = &mut value {
            check_type_meta(map, "apiVersion", &crate::client_utils::join_api_version(&gvk.group, &gvk.version))?;
            check_type_meta(map, "kind", &gvk.kind)?;
        }

        check_shape(&shape, &value, &mut FieldPath::default())?;

        let object = serde_json::from_value(value).map_err(|e| Error::Conversion {
            path: ROOT_PATH.to_string(),
            message: e.to_string(),
        })?;
        trace!("Converted unstructured to {}", gvk.kind);
        Ok(object)
    }

    /// Convert to the typed form, keeping unmodelled fields alongside.
    pub fn to_typed<K>(&self, unstructured: &Unstructured) -> Result<Typed<K>>
    where
        K: Resource<DynamicType = ()> + Serialize + DeserializeOwned,
    {
        let object: K = self.from_unstructured(unstructured)?;
        let known = serde_json::to_value(&object)?;
        let unknown = residual(&unstructured.to_value(), &known).unwrap_or(Value::Null);
        Ok(Typed { object, unknown })
    }

    /// Convert back to the unstructured form, restoring unmodelled fields.
    pub fn to_generic<K>(&self, typed: &Typed<K>) -> Result<Unstructured>
    where
        K: Resource<DynamicType = ()> + Serialize,
    {
        let mut value = self.to_unstructured(&typed.object)?.into_value();
        overlay(&mut value, &typed.unknown);
        Unstructured::from_value(value)
    }
}

/// Fill in a missing apiVersion or kind, reject a different one.
fn check_type_meta(map: &mut Map<String, Value>, key: &str, expected: &str) -> Result<()> {
    match map.get(key).and_then(Value::as_str) {
        None | Some("") => {
            map.insert(key.to_string(), Value::String(expected.to_string()));
            Ok(())
        }
        Some(actual) if actual == expected => Ok(()),
        Some(actual) => Err(Error::Conversion {
            path: key.to_string(),
            message: format!("expected {:?}, got {:?}", expected, actual),
        }),
    }
}

fn check_shape(shape: &FieldShape, value: &Value, path: &mut FieldPath) -> Result<()> {
    match (shape, value) {
        (FieldShape::Any, _) | (_, Value::Null) => Ok(()),
        (FieldShape::Bool, Value::Bool(_)) => Ok(()),
        (FieldShape::Number, Value::Number(_)) => Ok(()),
        (FieldShape::String, Value::String(_)) => Ok(()),
        (FieldShape::Integer(format), Value::Number(n)) => {
            if format.contains(n) {
                Ok(())
            } else {
                Err(Error::Conversion {
                    path: path.to_string(),
                    message: format!("{} is not a valid {:?} integer", n, format),
                })
            }
        }
        (FieldShape::Array(items), Value::Array(values)) => {
            for (i, item) in values.iter().enumerate() {
                path.0.push(Segment::Index(i));
                check_shape(items, item, path)?;
                path.0.pop();
            }
            Ok(())
        }
        (FieldShape::Object { .. }, Value::Object(map)) => {
            for (key, field) in map {
                // unknown fields are carried, not checked
                if let Some(field_shape) = shape.field(key) {
                    path.0.push(Segment::Key(key.clone()));
                    check_shape(field_shape, field, path)?;
                    path.0.pop();
                }
            }
            Ok(())
        }
        (expected, actual) => Err(Error::Conversion {
            path: path.to_string(),
            message: format!("expected {}, got {}", expected.describe(), type_name(actual)),
        }),
    }
}

/// The parts of `original` that are missing from `known`, as a sparse tree.
///
/// Arrays of equal length are compared element by element, with `Null`
/// standing in for elements that have nothing extra.
fn residual(original: &Value, known: &Value) -> Option<Value> {
    match (original, known) {
        (Value::Object(original), Value::Object(known)) => {
            let mut extra = Map::new();
            for (key, value) in original {
                match known.get(key) {
                    None if value.is_null() => {}
                    None => {
                        extra.insert(key.clone(), value.clone());
                    }
                    Some(known_value) => {
                        if let Some(nested) = residual(value, known_value) {
                            extra.insert(key.clone(), nested);
                        }
                    }
                }
            }
            (!extra.is_empty()).then_some(Value::Object(extra))
        }
        (Value::Array(original), Value::Array(known)) if original.len() == known.len() => {
            let items: Vec<Value> = original
                .iter()
                .zip(known)
                .map(|(o, k)| residual(o, k).unwrap_or(Value::Null))
                .collect();
            items
                .iter()
                .any(|item| !item.is_null())
                .then_some(Value::Array(items))
        }
        _ => None,
    }
}

fn overlay(base: &mut Value, extra: &Value) {
    match (base, extra) {
        (Value::Object(base), Value::Object(extra)) => {
            for (key, value) in extra {
                match base.get_mut(key) {
                    Some(existing) => overlay(existing, value),
                    None => {
                        base.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        (Value::Array(base), Value::Array(extra)) => {
            for (item, value) in base.iter_mut().zip(extra) {
                if !value.is_null() {
                    overlay(item, value);
                }
            }
        }
        _ => {}
    }
}

impl Scheme {
    pub fn converter(&self) -> Converter<'_> {
        Converter::new(self)
    }
}
