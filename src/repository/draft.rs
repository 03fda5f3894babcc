use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::error::{RepoError, RepoResult};
use crate::types::{props, BaseType, ContentStreamAllowed, TypeDefinition, Updatability};
use crate::value::Value;
use super::entry::ContentStream;
use super::naming::{normalize_nfc, validate_name};

/// Initial versioning state of a new document. Non-versionable types ignore `Major`/`Minor`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VersioningState {
    /// Treated as `Major` for versionable types
    None,
    #[default]
    Major,
    Minor,
    /// Created directly as a private working copy
    CheckedOut,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum ContentChange {
    Keep,
    Set(ContentStream),
    Delete,
}

/// Staged changes to one object. Setters validate against the object's type immediately;
/// nothing reaches the store until [`crate::Repository::save_object`].
#[derive(Debug, Clone)]
pub struct ObjectDraft {
    pub(crate) id: String,
    pub(crate) is_new: bool,
    pub(crate) type_def: TypeDefinition,
    pub(crate) parent: Option<String>,
    pub(crate) properties: BTreeMap<String, Value>,
    pub(crate) changed: BTreeSet<String>,
    pub(crate) content: ContentChange,
    pub(crate) has_content: bool,
    pub(crate) change_token: Option<String>,
    pub(crate) is_pwc: bool,
    pub(crate) versioning: VersioningState,
    pub(crate) endpoints: Option<(String, String)>,
    pub(crate) principal: String,
}

impl ObjectDraft {
    pub(crate) fn for_new(id: String, type_def: TypeDefinition, parent: Option<String>, principal: String) -> Self {
        let mut properties = BTreeMap::new();
        for p in type_def.property_definitions.values() {
            if let Some(v) = &p.default_value { properties.insert(p.id.clone(), v.clone()); }
        }
        properties.insert(props::OBJECT_TYPE_ID.to_string(), Value::id(type_def.id.clone()));
        Self {
            id,
            is_new: true,
            type_def,
            parent,
            properties,
            changed: BTreeSet::new(),
            content: ContentChange::Keep,
            has_content: false,
            change_token: None,
            is_pwc: false,
            versioning: VersioningState::None,
            endpoints: None,
            principal,
        }
    }

    pub fn id(&self) -> &str { &self.id }

    /// True until the draft has been saved once.
    pub fn is_new(&self) -> bool { self.is_new }

    pub fn type_id(&self) -> &str { &self.type_def.id }

    pub fn base(&self) -> BaseType { self.type_def.base }

    pub fn property(&self, id: &str) -> Option<&Value> { self.properties.get(id) }

    pub fn principal(&self) -> &str { &self.principal }

    /// Acting principal recorded as creator or last modifier.
    pub fn set_principal<S: Into<String>>(&mut self, principal: S) { self.principal = principal.into(); }

    pub fn set_name(&mut self, name: &str) -> RepoResult<()> { self.set_property(props::NAME, Value::string(name)) }

    pub fn set_property(&mut self, id: &str, value: Value) -> RepoResult<()> {
        let def = self.type_def.property_by_query_name(id)
            .ok_or_else(|| RepoError::invalid(format!("Property {} is not defined for type {}", id, self.type_def.id)))?;
        if def.property_type() != value.property_type() {
            return Err(RepoError::invalid(format!(
                "Property {} expects {} values, got {}", def.id, def.property_type().as_str(), value.property_type().as_str())));
        }
        if !def.is_multi() && value.len() > 1 {
            return Err(RepoError::invalid(format!("Property {} is single-valued", def.id)));
        }
        match def.updatability {
            Updatability::ReadOnly => return Err(RepoError::constraint(format!("Property {} is read-only", def.id))),
            Updatability::OnCreate if !self.is_new => {
                return Err(RepoError::constraint(format!("Property {} can only be set on create", def.id)));
            }
            Updatability::WhenCheckedOut if !self.is_new && !self.is_pwc => {
                return Err(RepoError::versioning(format!("Property {} can only be updated on a private working copy", def.id)));
            }
            _ => {}
        }
        def.kind.check_bounds(&value).map_err(|m| RepoError::constraint(format!("Property {}: {}", def.id, m)))?;

        let pid = def.id.clone();
        let value = match (pid.as_str(), value) {
            (props::NAME, Value::String(names)) => {
                let names: Vec<String> = names.iter().map(|n| normalize_nfc(n)).collect();
                for n in &names { validate_name(n)?; }
                Value::String(names)
            }
            (props::OBJECT_TYPE_ID, v) => {
                if v.first_str() != Some(self.type_def.id.as_str()) {
                    return Err(RepoError::constraint(format!("Object type of {} cannot be changed", self.id)));
                }
                v
            }
            (_, v) => v,
        };
        self.properties.insert(pid.clone(), value);
        self.changed.insert(pid);
        Ok(())
    }

    pub fn set_content_stream(&mut self, content: ContentStream) -> RepoResult<()> {
        self.check_content_allowed()?;
        self.content = ContentChange::Set(content);
        Ok(())
    }

    pub fn delete_content_stream(&mut self) -> RepoResult<()> {
        self.check_content_allowed()?;
        if self.type_def.content_stream_allowed == ContentStreamAllowed::Required {
            return Err(RepoError::constraint(format!("Content stream is required for type {}", self.type_def.id)));
        }
        self.content = ContentChange::Delete;
        Ok(())
    }

    fn check_content_allowed(&self) -> RepoResult<()> {
        if self.type_def.base != BaseType::Document {
            return Err(RepoError::constraint(format!("Object {} is not a document and cannot hold content", self.id)));
        }
        if self.type_def.content_stream_allowed == ContentStreamAllowed::NotAllowed {
            return Err(RepoError::constraint(format!("Content stream is not allowed for type {}", self.type_def.id)));
        }
        Ok(())
    }

    /// Content the saved object will hold.
    pub(crate) fn will_have_content(&self) -> bool {
        match &self.content {
            ContentChange::Keep => self.has_content,
            ContentChange::Set(_) => true,
            ContentChange::Delete => false,
        }
    }
}
