//! Schema type definitions.
//!
//! A [`Schema`] is an immutable snapshot with two partitions, `actions` and
//! `things`, each a list of [`Class`]es. Snapshots are replaced wholesale by
//! the [`manager::SchemaManager`]; nothing mutates one in place once it is
//! published behind the connector lock.

pub mod manager;

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

/// The two object kinds, one per schema partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectKind {
    Thing,
    Action,
}

impl ObjectKind {
    /// SQL-compatible string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Thing => "thing",
            Self::Action => "action",
        }
    }

    /// Name of the schema partition holding classes of this kind.
    pub fn partition(&self) -> &'static str {
        match self {
            Self::Thing => "things",
            Self::Action => "actions",
        }
    }

    /// Lower-cased response field carrying the object id.
    pub fn id_field(&self) -> &'static str {
        match self {
            Self::Thing => "thingid",
            Self::Action => "actionid",
        }
    }
}

impl std::fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ObjectKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "thing" | "things" => Ok(Self::Thing),
            "action" | "actions" => Ok(Self::Action),
            _ => Err(format!("unknown object kind: {s}")),
        }
    }
}

/// A complete schema snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    #[serde(default)]
    pub actions: SemanticSchema,
    #[serde(default)]
    pub things: SemanticSchema,
}

/// One partition of the schema.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SemanticSchema {
    #[serde(rename = "@context", default)]
    pub context: String,
    #[serde(default)]
    pub classes: Vec<Class>,
}

/// A class definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Class {
    pub class: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub properties: Vec<Property>,
}

/// A property on a class. `data_type` holds either one primitive type name or
/// one or more class names (a cross-reference).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Property {
    pub name: String,
    #[serde(rename = "@dataType")]
    pub data_type: Vec<String>,
    #[serde(default)]
    pub description: String,
}

/// A parsed entry of [`Property::data_type`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataType {
    String,
    Text,
    Int,
    Number,
    Boolean,
    Date,
    /// Cross-reference to an object of the named class.
    Reference(String),
}

impl DataType {
    pub fn parse(name: &str) -> Self {
        match name {
            "string" => Self::String,
            "text" => Self::Text,
            "int" => Self::Int,
            "number" => Self::Number,
            "boolean" => Self::Boolean,
            "date" => Self::Date,
            other => Self::Reference(other.to_string()),
        }
    }

    pub fn is_primitive(&self) -> bool {
        !matches!(self, Self::Reference(_))
    }
}

/// Why a schema (or a class added to it) was rejected.
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("class name must not be empty")]
    EmptyClassName,

    #[error("class '{0}' already exists")]
    DuplicateClass(String),

    #[error("class '{class}' declares property '{property}' more than once")]
    DuplicateProperty { class: String, property: String },

    #[error("property '{property}' of class '{class}' has no data type")]
    MissingDataType { class: String, property: String },

    #[error("property '{property}' of class '{class}' mixes primitive and reference types")]
    MixedDataType { class: String, property: String },

    #[error("property '{property}' of class '{class}' references unknown class '{target}'")]
    UnknownReference {
        class: String,
        property: String,
        target: String,
    },

    #[error("failed to persist schema state: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid schema state file: {0}")]
    Decode(#[from] serde_json::Error),
}

impl Schema {
    pub fn partition(&self, kind: ObjectKind) -> &SemanticSchema {
        match kind {
            ObjectKind::Thing => &self.things,
            ObjectKind::Action => &self.actions,
        }
    }

    pub fn partition_mut(&mut self, kind: ObjectKind) -> &mut SemanticSchema {
        match kind {
            ObjectKind::Thing => &mut self.things,
            ObjectKind::Action => &mut self.actions,
        }
    }

    /// Look up a class in the partition for `kind`.
    pub fn find_class(&self, kind: ObjectKind, name: &str) -> Option<&Class> {
        self.partition(kind).classes.iter().find(|c| c.class == name)
    }

    /// All classes with the kind of the partition they live in.
    pub fn classes(&self) -> impl Iterator<Item = (ObjectKind, &Class)> {
        self.things
            .classes
            .iter()
            .map(|c| (ObjectKind::Thing, c))
            .chain(self.actions.classes.iter().map(|c| (ObjectKind::Action, c)))
    }

    pub fn is_empty(&self) -> bool {
        self.things.classes.is_empty() && self.actions.classes.is_empty()
    }

    /// Hex SHA-256 of the canonical JSON encoding. Peers compare these to
    /// detect schema drift.
    pub fn hash(&self) -> String {
        let bytes = serde_json::to_vec(self).unwrap_or_default();
        hex::encode(Sha256::digest(&bytes))
    }

    /// Check class-name uniqueness across both partitions and that every
    /// property type is a known primitive or resolves to a class.
    pub fn validate(&self) -> Result<(), SchemaError> {
        let mut names = HashSet::new();
        for (_, class) in self.classes() {
            if class.class.trim().is_empty() {
                return Err(SchemaError::EmptyClassName);
            }
            if !names.insert(class.class.as_str()) {
                return Err(SchemaError::DuplicateClass(class.class.clone()));
            }
        }

        for (_, class) in self.classes() {
            let mut seen = HashSet::new();
            for property in &class.properties {
                if !seen.insert(property.name.as_str()) {
                    return Err(SchemaError::DuplicateProperty {
                        class: class.class.clone(),
                        property: property.name.clone(),
                    });
                }
                let types: Vec<DataType> =
                    property.data_type.iter().map(|t| DataType::parse(t)).collect();
                if types.is_empty() {
                    return Err(SchemaError::MissingDataType {
                        class: class.class.clone(),
                        property: property.name.clone(),
                    });
                }
                let primitives = types.iter().filter(|t| t.is_primitive()).count();
                if primitives > 0 && types.len() > 1 {
                    return Err(SchemaError::MixedDataType {
                        class: class.class.clone(),
                        property: property.name.clone(),
                    });
                }
                for t in &types {
                    if let DataType::Reference(target) = t {
                        if !names.contains(target.as_str()) {
                            return Err(SchemaError::UnknownReference {
                                class: class.class.clone(),
                                property: property.name.clone(),
                                target: target.clone(),
                            });
                        }
                    }
                }
            }
        }

        Ok(())
    }
}

impl Class {
    pub fn property(&self, name: &str) -> Option<&Property> {
        self.properties.iter().find(|p| p.name == name)
    }
}
