//! Per-object validation against a schema snapshot.
//!
//! Runs on blocking threads: local cross-references are checked through the
//! connector, which is synchronous.

use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use crate::connector::Connector;
use crate::error::ConnectorError;
use crate::network::Peer;
use crate::schema::{DataType, ObjectKind, Schema};

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("the given class is empty")]
    EmptyClass,

    #[error("the given context is empty")]
    EmptyContext,

    #[error("class '{class}' is not defined in the {kind} schema")]
    UnknownClass { kind: ObjectKind, class: String },

    #[error("class '{class}' has no property '{property}'")]
    UnknownProperty { class: String, property: String },

    #[error("property '{property}' of class '{class}' requires a value of type {expected}")]
    WrongType {
        class: String,
        property: String,
        expected: String,
    },

    #[error("property '{property}' of class '{class}' is not a valid cross-reference: {reason}")]
    InvalidReference {
        class: String,
        property: String,
        reason: String,
    },

    #[error("referenced object {id} does not exist or is not one of {allowed:?}")]
    MissingReference { id: Uuid, allowed: Vec<String> },

    #[error("cross-reference points to unknown peer '{0}'")]
    UnknownPeer(String),

    #[error(transparent)]
    Connector(#[from] ConnectorError),
}

/// Everything a single validation consults. Borrowed for the duration of
/// one item; all of it is fixed for the whole batch.
pub struct ValidationContext<'a> {
    pub schema: &'a Schema,
    pub connector: &'a dyn Connector,
    pub peers: &'a [Peer],
    /// Hostname under which this node refers to itself.
    pub local_host: &'a str,
}

/// Check `properties` for an object of `class` under the given context.
pub fn validate_object(
    ctx: &ValidationContext<'_>,
    kind: ObjectKind,
    class: &str,
    context: &str,
    properties: &serde_json::Map<String, Value>,
) -> Result<(), ValidationError> {
    if class.trim().is_empty() {
        return Err(ValidationError::EmptyClass);
    }
    if context.trim().is_empty() {
        return Err(ValidationError::EmptyContext);
    }

    let definition =
        ctx.schema
            .find_class(kind, class)
            .ok_or_else(|| ValidationError::UnknownClass {
                kind,
                class: class.to_string(),
            })?;

    for (name, value) in properties {
        let property = definition
            .property(name)
            .ok_or_else(|| ValidationError::UnknownProperty {
                class: class.to_string(),
                property: name.clone(),
            })?;
        let types: Vec<DataType> = property.data_type.iter().map(|t| DataType::parse(t)).collect();

        match types.as_slice() {
            [primitive] if primitive.is_primitive() => {
                check_primitive(primitive, value).map_err(|expected| {
                    ValidationError::WrongType {
                        class: class.to_string(),
                        property: name.clone(),
                        expected,
                    }
                })?
            }
            _ => check_reference(ctx, class, name, &property.data_type, value)?,
        }
    }

    Ok(())
}

fn check_primitive(data_type: &DataType, value: &Value) -> Result<(), String> {
    let ok = match data_type {
        DataType::String | DataType::Text => value.is_string(),
        DataType::Int => value.is_i64() || value.is_u64(),
        DataType::Number => value.is_number(),
        DataType::Boolean => value.is_boolean(),
        DataType::Date => value
            .as_str()
            .is_some_and(|s| chrono::DateTime::parse_from_rfc3339(s).is_ok()),
        DataType::Reference(_) => false,
    };
    if ok {
        return Ok(());
    }
    Err(match data_type {
        DataType::String => "string",
        DataType::Text => "text",
        DataType::Int => "int",
        DataType::Number => "number",
        DataType::Boolean => "boolean",
        DataType::Date => "date (RFC 3339)",
        DataType::Reference(_) => "cross-reference",
    }
    .to_string())
}

fn check_reference(
    ctx: &ValidationContext<'_>,
    class: &str,
    property: &str,
    allowed: &[String],
    value: &Value,
) -> Result<(), ValidationError> {
    let invalid = |reason: &str| ValidationError::InvalidReference {
        class: class.to_string(),
        property: property.to_string(),
        reason: reason.to_string(),
    };

    let object = value.as_object().ok_or_else(|| invalid("expected an object"))?;
    let id = object
        .get("$cref")
        .and_then(Value::as_str)
        .ok_or_else(|| invalid("missing '$cref'"))?;
    let id = Uuid::parse_str(id).map_err(|_| invalid("'$cref' is not a UUID"))?;
    let location = object
        .get("locationUrl")
        .and_then(Value::as_str)
        .ok_or_else(|| invalid("missing 'locationUrl'"))?;
    let ref_type = object
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| invalid("missing 'type'"))?;
    let target_kind: ObjectKind = ref_type
        .parse()
        .map_err(|_| invalid("'type' must be 'Thing' or 'Action'"))?;

    if location == "localhost" || location == ctx.local_host {
        let target = ctx.connector.get_object(target_kind, id)?;
        return match target {
            Some(target) if allowed.iter().any(|c| *c == target.class) => Ok(()),
            _ => Err(ValidationError::MissingReference {
                id,
                allowed: allowed.to_vec(),
            }),
        };
    }

    // Remote objects cannot be checked here; the peer has to exist.
    if ctx.peers.iter().any(|p| p.name == location) {
        Ok(())
    } else {
        Err(ValidationError::UnknownPeer(location.to_string()))
    }
}
