use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::value::{PropertyType, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BaseType { Document, Folder, Policy, Relationship }

impl BaseType {
    pub const ALL: [BaseType; 4] = [BaseType::Document, BaseType::Folder, BaseType::Policy, BaseType::Relationship];

    pub fn type_id(&self) -> &'static str {
        match self {
            BaseType::Document => "cmis:document",
            BaseType::Folder => "cmis:folder",
            BaseType::Policy => "cmis:policy",
            BaseType::Relationship => "cmis:relationship",
        }
    }

    pub fn from_type_id(id: &str) -> Option<BaseType> {
        BaseType::ALL.iter().copied().find(|b| b.type_id() == id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentStreamAllowed { Allowed, Required, NotAllowed }

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Cardinality { Single, Multi }

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Updatability {
    ReadOnly,
    ReadWrite,
    /// Writable only on a private working copy
    WhenCheckedOut,
    /// Writable only before the object is first saved
    OnCreate,
}

/// Property data type together with the constraints that apply to it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PropertyKind {
    String { max_length: Option<usize> },
    /// `precision` is in bits, 32 or 64; 32-bit values must fit an f32.
    Decimal { min: Option<f64>, max: Option<f64>, precision: Option<u8> },
    Integer { min: Option<i64>, max: Option<i64> },
    Boolean,
    DateTime,
    Id,
    Uri,
    Html,
}

impl PropertyKind {
    pub fn string() -> Self { PropertyKind::String { max_length: None } }
    pub fn decimal() -> Self { PropertyKind::Decimal { min: None, max: None, precision: None } }
    pub fn integer() -> Self { PropertyKind::Integer { min: None, max: None } }

    pub fn decimal_with_precision(bits: u8) -> Self { PropertyKind::Decimal { min: None, max: None, precision: Some(bits) } }

    pub fn property_type(&self) -> PropertyType {
        match self {
            PropertyKind::String { .. } => PropertyType::String,
            PropertyKind::Decimal { .. } => PropertyType::Decimal,
            PropertyKind::Integer { .. } => PropertyType::Integer,
            PropertyKind::Boolean => PropertyType::Boolean,
            PropertyKind::DateTime => PropertyType::DateTime,
            PropertyKind::Id => PropertyType::Id,
            PropertyKind::Uri => PropertyType::Uri,
            PropertyKind::Html => PropertyType::Html,
        }
    }

    /// Range/length check of a value already known to have the matching type.
    pub fn check_bounds(&self, value: &Value) -> Result<(), String> {
        match (self, value) {
            (PropertyKind::String { max_length: Some(max) }, Value::String(vs)) => {
                if let Some(s) = vs.iter().find(|s| s.chars().count() > *max) {
                    return Err(format!("value '{}' exceeds max length {}", s, max));
                }
            }
            (PropertyKind::Decimal { min, max, precision }, Value::Decimal(vs)) => {
                for v in vs {
                    if *precision == Some(32) && (*v as f32).is_infinite() {
                        return Err(format!("value {} does not fit 32-bit precision", v));
                    }
                    if min.map(|m| *v < m).unwrap_or(false) { return Err(format!("value {} is below minimum {}", v, min.unwrap_or_default())); }
                    if max.map(|m| *v > m).unwrap_or(false) { return Err(format!("value {} is above maximum {}", v, max.unwrap_or_default())); }
                }
            }
            (PropertyKind::Integer { min, max }, Value::Integer(vs)) => {
                for v in vs {
                    if min.map(|m| *v < m).unwrap_or(false) { return Err(format!("value {} is below minimum {}", v, min.unwrap_or_default())); }
                    if max.map(|m| *v > m).unwrap_or(false) { return Err(format!("value {} is above maximum {}", v, max.unwrap_or_default())); }
                }
            }
            _ => {}
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyDefinition {
    pub id: String,
    pub query_name: String,
    pub local_name: String,
    pub display_name: String,
    pub description: String,
    pub kind: PropertyKind,
    pub cardinality: Cardinality,
    pub updatability: Updatability,
    /// Set by the registry for properties coming from a supertype
    pub inherited: bool,
    pub required: bool,
    pub queryable: bool,
    pub orderable: bool,
    pub open_choice: bool,
    pub default_value: Option<Value>,
}

impl PropertyDefinition {
    /// Single-valued, read-write, queryable and orderable definition; query name defaults to the id.
    pub fn new<S: Into<String>>(id: S, kind: PropertyKind) -> Self {
        let id = id.into();
        Self {
            query_name: id.clone(),
            local_name: id.clone(),
            display_name: id.clone(),
            description: String::new(),
            id,
            kind,
            cardinality: Cardinality::Single,
            updatability: Updatability::ReadWrite,
            inherited: false,
            required: false,
            queryable: true,
            orderable: true,
            open_choice: true,
            default_value: None,
        }
    }

    pub fn query_name<S: Into<String>>(mut self, q: S) -> Self { self.query_name = q.into(); self }
    pub fn display_name<S: Into<String>>(mut self, d: S) -> Self { self.display_name = d.into(); self }
    /// Multi-valued properties cannot be ordered on.
    pub fn multi(mut self) -> Self { self.cardinality = Cardinality::Multi; self.orderable = false; self }
    pub fn required(mut self) -> Self { self.required = true; self }
    pub fn updatability(mut self, u: Updatability) -> Self { self.updatability = u; self }
    pub fn read_only(self) -> Self { self.updatability(Updatability::ReadOnly) }
    pub fn not_queryable(mut self) -> Self { self.queryable = false; self.orderable = false; self }
    pub fn not_orderable(mut self) -> Self { self.orderable = false; self }
    pub fn default_value(mut self, v: Value) -> Self { self.default_value = Some(v); self }

    pub fn property_type(&self) -> PropertyType { self.kind.property_type() }
    pub fn is_multi(&self) -> bool { self.cardinality == Cardinality::Multi }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeDefinition {
    pub id: String,
    pub base: BaseType,
    /// Absent only for the four base types
    pub parent_id: Option<String>,
    pub query_name: String,
    pub local_name: String,
    pub display_name: String,
    pub description: String,
    pub creatable: bool,
    pub fileable: bool,
    pub queryable: bool,
    pub fulltext_indexed: bool,
    pub included_in_supertype_query: bool,
    pub controllable_policy: bool,
    pub controllable_acl: bool,
    pub versionable: bool,
    pub content_stream_allowed: ContentStreamAllowed,
    /// Relationship endpoint constraints; empty means any type
    pub allowed_source_types: Vec<String>,
    pub allowed_target_types: Vec<String>,
    pub property_definitions: BTreeMap<String, PropertyDefinition>,
}

impl TypeDefinition {
    /// Subtype of `parent` with flags defaulted for its base type. Declares no properties yet.
    pub fn new<S: Into<String>, P: Into<String>>(id: S, base: BaseType, parent: P) -> Self {
        let mut t = Self::root(base);
        let id = id.into();
        t.query_name = id.clone();
        t.local_name = id.clone();
        t.display_name = id.clone();
        t.id = id;
        t.parent_id = Some(parent.into());
        t.property_definitions.clear();
        t
    }

    pub(crate) fn root(base: BaseType) -> Self {
        let id = base.type_id().to_string();
        Self {
            query_name: id.clone(),
            local_name: id.clone(),
            display_name: id.clone(),
            description: String::new(),
            id,
            base,
            parent_id: None,
            creatable: true,
            fileable: matches!(base, BaseType::Document | BaseType::Folder | BaseType::Policy),
            queryable: true,
            fulltext_indexed: base == BaseType::Document,
            included_in_supertype_query: true,
            controllable_policy: base != BaseType::Relationship,
            controllable_acl: true,
            versionable: base == BaseType::Document,
            content_stream_allowed: if base == BaseType::Document { ContentStreamAllowed::Allowed } else { ContentStreamAllowed::NotAllowed },
            allowed_source_types: Vec::new(),
            allowed_target_types: Vec::new(),
            property_definitions: BTreeMap::new(),
        }
    }

    pub fn with_property(mut self, def: PropertyDefinition) -> Self {
        self.property_definitions.insert(def.id.clone(), def);
        self
    }

    pub fn query_name<S: Into<String>>(mut self, q: S) -> Self { self.query_name = q.into(); self }
    pub fn creatable(mut self, v: bool) -> Self { self.creatable = v; self }
    pub fn queryable(mut self, v: bool) -> Self { self.queryable = v; self }
    pub fn fulltext_indexed(mut self, v: bool) -> Self { self.fulltext_indexed = v; self }
    pub fn versionable(mut self, v: bool) -> Self { self.versionable = v; self }
    pub fn controllable_acl(mut self, v: bool) -> Self { self.controllable_acl = v; self }
    pub fn controllable_policy(mut self, v: bool) -> Self { self.controllable_policy = v; self }
    pub fn included_in_supertype_query(mut self, v: bool) -> Self { self.included_in_supertype_query = v; self }
    pub fn content_stream_allowed(mut self, v: ContentStreamAllowed) -> Self { self.content_stream_allowed = v; self }
    pub fn allowed_source_types(mut self, ids: &[&str]) -> Self { self.allowed_source_types = ids.iter().map(|s| s.to_string()).collect(); self }
    pub fn allowed_target_types(mut self, ids: &[&str]) -> Self { self.allowed_target_types = ids.iter().map(|s| s.to_string()).collect(); self }

    pub fn property(&self, id: &str) -> Option<&PropertyDefinition> { self.property_definitions.get(id) }

    /// Lookup by query name first, then by id.
    pub fn property_by_query_name(&self, name: &str) -> Option<&PropertyDefinition> {
        self.property_definitions.values().find(|p| p.query_name == name)
            .or_else(|| self.property_definitions.get(name))
    }
}

/// Properties every base type carries, keyed by base.
pub(crate) fn base_properties(base: BaseType) -> Vec<PropertyDefinition> {
    use super::props::*;
    let ro = |id: &str, kind: PropertyKind| PropertyDefinition::new(id, kind).read_only();
    let mut v = vec![
        PropertyDefinition::new(NAME, PropertyKind::string()).required(),
        ro(OBJECT_ID, PropertyKind::Id),
        PropertyDefinition::new(OBJECT_TYPE_ID, PropertyKind::Id).updatability(Updatability::OnCreate).required(),
        ro(BASE_TYPE_ID, PropertyKind::Id),
        ro(CREATED_BY, PropertyKind::string()),
        ro(CREATION_DATE, PropertyKind::DateTime),
        ro(LAST_MODIFIED_BY, PropertyKind::string()),
        ro(LAST_MODIFICATION_DATE, PropertyKind::DateTime),
        ro(CHANGE_TOKEN, PropertyKind::string()).not_queryable(),
    ];
    match base {
        BaseType::Document => v.extend([
            ro(IS_LATEST_VERSION, PropertyKind::Boolean),
            ro(IS_MAJOR_VERSION, PropertyKind::Boolean),
            ro(IS_LATEST_MAJOR_VERSION, PropertyKind::Boolean),
            ro(VERSION_LABEL, PropertyKind::string()),
            ro(VERSION_SERIES_ID, PropertyKind::Id),
            ro(IS_VERSION_SERIES_CHECKED_OUT, PropertyKind::Boolean),
            ro(VERSION_SERIES_CHECKED_OUT_BY, PropertyKind::string()),
            ro(VERSION_SERIES_CHECKED_OUT_ID, PropertyKind::Id),
            ro(CHECKIN_COMMENT, PropertyKind::string()),
            ro(CONTENT_STREAM_LENGTH, PropertyKind::integer()),
            ro(CONTENT_STREAM_MIME_TYPE, PropertyKind::string()),
            ro(CONTENT_STREAM_FILE_NAME, PropertyKind::string()),
            ro(CONTENT_STREAM_ID, PropertyKind::Id),
        ]),
        BaseType::Folder => v.extend([
            ro(PARENT_ID, PropertyKind::Id),
            // derived from the hierarchy on read, never indexed
            ro(PATH, PropertyKind::string()).not_queryable(),
        ]),
        BaseType::Relationship => v.extend([
            PropertyDefinition::new(SOURCE_ID, PropertyKind::Id).updatability(Updatability::OnCreate).required(),
            PropertyDefinition::new(TARGET_ID, PropertyKind::Id).updatability(Updatability::OnCreate).required(),
        ]),
        BaseType::Policy => v.push(PropertyDefinition::new(POLICY_TEXT, PropertyKind::string())),
    }
    v
}
