//! Field layout of a registered kind, derived from its JSON schema.

use schemars::schema::{InstanceType, RootSchema, Schema, SchemaObject, SingleOrVec};
use std::collections::BTreeMap;

const DEFINITIONS_PREFIX: &str = "#/definitions/";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntegerFormat {
    Int32,
    Int64,
    Unbounded,
}

impl IntegerFormat {
    fn from_format(format: Option<&str>) -> Self {
        match format {
            Some("int32") => IntegerFormat::Int32,
            Some("int64") => IntegerFormat::Int64,
            _ => IntegerFormat::Unbounded,
        }
    }

    pub fn contains(&self, n: &serde_json::Number) -> bool {
        match self {
            IntegerFormat::Int32 => n.as_i64().is_some_and(|v| i32::try_from(v).is_ok()),
            IntegerFormat::Int64 => n.is_i64(),
            IntegerFormat::Unbounded => n.is_i64() || n.is_u64(),
        }
    }
}

/// The expected layout of a value in a typed object.
///
/// `Any` covers schemas that accept several shapes (int-or-string, raw
/// extensions, `oneOf`) as well as recursive definitions.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldShape {
    Any,
    Bool,
    Integer(IntegerFormat),
    Number,
    String,
    Array(Box<FieldShape>),
    Object {
        fields: BTreeMap<String, FieldShape>,
        /// Shape of values under keys not listed in `fields`, for map-like objects.
        additional: Option<Box<FieldShape>>,
    },
}

impl FieldShape {
    pub fn from_root_schema(root: &RootSchema) -> Self {
        let mut resolver = Resolver {
            root,
            visiting: Vec::new(),
        };
        resolver.shape_of_object(&root.schema)
    }

    /// Look up the shape of a named field of an object shape.
    pub fn field(&self, name: &str) -> Option<&FieldShape> {
        match self {
            FieldShape::Object { fields, additional } => fields
                .get(name)
                .or_else(|| additional.as_deref()),
            _ => None,
        }
    }

    pub fn describe(&self) -> &'static str {
        match self {
            FieldShape::Any => "any",
            FieldShape::Bool => "boolean",
            FieldShape::Integer(_) => "integer",
            FieldShape::Number => "number",
            FieldShape::String => "string",
            FieldShape::Array(_) => "array",
            FieldShape::Object { .. } => "object",
        }
    }
}

fn is_null(schema: &Schema) -> bool {
    match schema {
        Schema::Object(object) => matches!(
            &object.instance_type,
            Some(SingleOrVec::Single(t)) if **t == InstanceType::Null
        ),
        Schema::Bool(_) => false,
    }
}

struct Resolver<'a> {
    root: &'a RootSchema,
    visiting: Vec<&'a str>,
}

impl<'a> Resolver<'a> {
    fn shape_of(&mut self, schema: &'a Schema) -> FieldShape {
        match schema {
            Schema::Bool(_) => FieldShape::Any,
            Schema::Object(object) => self.shape_of_object(object),
        }
    }

    fn shape_of_object(&mut self, object: &'a SchemaObject) -> FieldShape {
        if let Some(reference) = &object.reference {
            return self.resolve(reference);
        }

        if let Some(subschemas) = &object.subschemas {
            // schemars wraps a documented $ref as a single-element allOf,
            // and an optional $ref as anyOf with null
            return match (subschemas.all_of.as_deref(), subschemas.any_of.as_deref()) {
                (Some([only]), None) => self.shape_of(only),
                (None, Some([first, second])) if is_null(second) => self.shape_of(first),
                (None, Some([first, second])) if is_null(first) => self.shape_of(second),
                _ => FieldShape::Any,
            };
        }

        let types: Vec<InstanceType> = match &object.instance_type {
            Some(SingleOrVec::Single(t)) => vec![**t],
            Some(SingleOrVec::Vec(ts)) => ts.clone(),
            None => Vec::new(),
        };
        let types: Vec<InstanceType> = types
            .into_iter()
            .filter(|t| *t != InstanceType::Null)
            .collect();

        match types.as_slice() {
            [InstanceType::Boolean] => FieldShape::Bool,
            [InstanceType::Integer] => {
                FieldShape::Integer(IntegerFormat::from_format(object.format.as_deref()))
            }
            [InstanceType::Number] => FieldShape::Number,
            [InstanceType::String] => FieldShape::String,
            [InstanceType::Array] => {
                let items = match object.array.as_ref().and_then(|a| a.items.as_ref()) {
                    Some(SingleOrVec::Single(items)) => self.shape_of(items),
                    _ => FieldShape::Any,
                };
                FieldShape::Array(Box::new(items))
            }
            [InstanceType::Object] => self.object_shape(object),
            [] if object.object.is_some() => self.object_shape(object),
            _ => FieldShape::Any,
        }
    }

    fn object_shape(&mut self, object: &'a SchemaObject) -> FieldShape {
        let Some(validation) = object.object.as_deref() else {
            return FieldShape::Object {
                fields: BTreeMap::new(),
                additional: Some(Box::new(FieldShape::Any)),
            };
        };

        let fields = validation
            .properties
            .iter()
            .map(|(name, schema)| (name.clone(), self.shape_of(schema)))
            .collect();

        let additional = match validation.additional_properties.as_deref() {
            None | Some(Schema::Bool(false)) => None,
            Some(schema) => Some(Box::new(self.shape_of(schema))),
        };

        FieldShape::Object { fields, additional }
    }

    fn resolve(&mut self, reference: &'a str) -> FieldShape {
        let Some(name) = reference.strip_prefix(DEFINITIONS_PREFIX) else {
            return FieldShape::Any;
        };
        if self.visiting.contains(&name) {
            return FieldShape::Any;
        }
        let Some(schema) = self.root.definitions.get(name) else {
            return FieldShape::Any;
        };

        self.visiting.push(name);
        let shape = self.shape_of(schema);
        self.visiting.pop();
        shape
    }
}
