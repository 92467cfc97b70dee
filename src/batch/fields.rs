//! Response field selection.

use std::collections::HashSet;

use super::result::ObjectResponse;
use crate::connector::StoredObject;
use crate::schema::ObjectKind;

const ALL: &str = "all";

/// The set of lower-cased field names kept in each item's response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseFields {
    kind: ObjectKind,
    keep: HashSet<String>,
}

impl ResponseFields {
    /// The default set for `kind`: `@class`, `schema`, `creationtimeunix`,
    /// `key` and the kind's id field.
    pub fn all(kind: ObjectKind) -> Self {
        let keep = ["@class", "schema", "creationtimeunix", "key", kind.id_field()]
            .into_iter()
            .map(String::from)
            .collect();
        Self { kind, keep }
    }

    /// No fields (or an `all` entry in any case) keeps the default set;
    /// otherwise exactly the supplied fields, lower-cased.
    pub fn resolve(kind: ObjectKind, requested: Option<&[String]>) -> Self {
        let Some(requested) = requested.filter(|r| !r.is_empty()) else {
            return Self::all(kind);
        };
        if requested.iter().any(|f| f.eq_ignore_ascii_case(ALL)) {
            return Self::all(kind);
        }
        Self {
            kind,
            keep: requested.iter().map(|f| f.to_lowercase()).collect(),
        }
    }

    pub fn keeps(&self, field: &str) -> bool {
        self.keep.contains(field)
    }

    /// Build the response view of `object`. `@context` and
    /// `lastUpdateTimeUnix` are always present.
    pub fn project(&self, object: &StoredObject) -> ObjectResponse {
        let id = self.keeps(self.kind.id_field()).then_some(object.id);
        ObjectResponse {
            context: object.context.clone(),
            class: self.keeps("@class").then(|| object.class.clone()),
            schema: self.keeps("schema").then(|| object.properties.clone()),
            creation_time_unix: self
                .keeps("creationtimeunix")
                .then_some(object.creation_time_unix),
            key: self.keeps("key").then(|| object.key.clone()),
            thing_id: id.filter(|_| self.kind == ObjectKind::Thing),
            action_id: id.filter(|_| self.kind == ObjectKind::Action),
            last_update_time_unix: 0,
        }
    }
}
