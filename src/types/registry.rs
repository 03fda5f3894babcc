use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{RepoError, RepoResult};
use super::definition::{base_properties, BaseType, PropertyKind, TypeDefinition};

/// A type with its subtype tree, as returned by [`TypeRegistry::get_type_descendants`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeContainer {
    pub type_def: TypeDefinition,
    pub children: Vec<TypeContainer>,
}

/// Holds every registered type as a resolved snapshot: the effective property set
/// (own plus inherited) is computed once when the type is added.
#[derive(Debug, Clone)]
pub struct TypeRegistry {
    types: HashMap<String, TypeDefinition>,
    // child ids per parent, in registration order
    children: HashMap<String, Vec<String>>,
    by_query_name: HashMap<String, String>,
}

impl Default for TypeRegistry {
    fn default() -> Self { Self::new() }
}

impl TypeRegistry {
    /// Registry seeded with the four base types.
    pub fn new() -> Self {
        let mut reg = Self { types: HashMap::new(), children: HashMap::new(), by_query_name: HashMap::new() };
        for base in BaseType::ALL {
            let mut t = TypeDefinition::root(base);
            for p in base_properties(base) { t.property_definitions.insert(p.id.clone(), p); }
            reg.by_query_name.insert(t.query_name.clone(), t.id.clone());
            reg.children.insert(t.id.clone(), Vec::new());
            reg.types.insert(t.id.clone(), t);
        }
        reg
    }

    pub fn add_type(&mut self, def: TypeDefinition) -> RepoResult<TypeDefinition> {
        if self.types.contains_key(&def.id) {
            return Err(RepoError::invalid(format!("Type {} already exists", def.id)));
        }
        let parent_id = def.parent_id.clone()
            .ok_or_else(|| RepoError::invalid(format!("Unable add root type {}", def.id)))?;
        let parent = self.types.get(&parent_id)
            .ok_or_else(|| RepoError::invalid(format!("Parent type {} does not exist", parent_id)))?;
        if parent.base != def.base {
            return Err(RepoError::invalid(format!(
                "Type {} has base {} but its parent {} has base {}", def.id, def.base.type_id(), parent_id, parent.base.type_id())));
        }
        if let Some(owner) = self.by_query_name.get(&def.query_name) {
            return Err(RepoError::invalid(format!("Query name {} is already used by type {}", def.query_name, owner)));
        }
        for (pid, p) in &def.property_definitions {
            if let PropertyKind::Decimal { precision: Some(bits), .. } = p.kind {
                if bits != 32 && bits != 64 {
                    return Err(RepoError::invalid(format!("Property {} has unsupported decimal precision {}", pid, bits)));
                }
            }
            if parent.property_definitions.contains_key(pid) {
                return Err(RepoError::invalid(format!("Property {} already defined in type {} or its supertypes", pid, parent_id)));
            }
            if parent.property_definitions.values().any(|pp| pp.query_name == p.query_name) {
                return Err(RepoError::invalid(format!("Property query name {} already used by a supertype of {}", p.query_name, def.id)));
            }
        }

        let mut resolved = def;
        for (pid, p) in &parent.property_definitions {
            let mut inherited = p.clone();
            inherited.inherited = true;
            resolved.property_definitions.insert(pid.clone(), inherited);
        }
        for p in resolved.property_definitions.values_mut().filter(|p| !parent.property_definitions.contains_key(&p.id)) {
            p.inherited = false;
        }

        debug!(target: "folio::types", "add_type {} (parent {}, {} effective properties)", resolved.id, parent_id, resolved.property_definitions.len());
        self.children.entry(parent_id).or_default().push(resolved.id.clone());
        self.children.insert(resolved.id.clone(), Vec::new());
        self.by_query_name.insert(resolved.query_name.clone(), resolved.id.clone());
        self.types.insert(resolved.id.clone(), resolved.clone());
        Ok(resolved)
    }

    /// Copy of the type; with `include_properties == false` the property set is empty.
    pub fn get_type(&self, id: &str, include_properties: bool) -> RepoResult<TypeDefinition> {
        let t = self.types.get(id).ok_or_else(|| RepoError::not_found(format!("Type {} does not exist", id)))?;
        Ok(Self::copy_of(t, include_properties))
    }

    /// Direct children of `id`, or the base types when `id` is `None`.
    pub fn get_type_children(&self, id: Option<&str>, include_properties: bool) -> RepoResult<Vec<TypeDefinition>> {
        let ids = self.child_ids(id)?;
        Ok(ids.iter().filter_map(|c| self.types.get(c)).map(|t| Self::copy_of(t, include_properties)).collect())
    }

    /// Subtype trees under `id` (or under every base type), limited to `depth` levels when given.
    pub fn get_type_descendants(&self, id: Option<&str>, depth: Option<usize>, include_properties: bool) -> RepoResult<Vec<TypeContainer>> {
        if depth == Some(0) { return Err(RepoError::invalid("depth must be greater than 0")); }
        let ids = self.child_ids(id)?;
        Ok(ids.iter().filter_map(|c| self.container(c, depth.map(|d| d - 1), include_properties)).collect())
    }

    fn container(&self, id: &str, remaining: Option<usize>, include_properties: bool) -> Option<TypeContainer> {
        let type_def = Self::copy_of(self.types.get(id)?, include_properties);
        let children = match remaining {
            Some(0) => Vec::new(),
            _ => self.children.get(id).map(|cs| cs.iter()
                .filter_map(|c| self.container(c, remaining.map(|r| r - 1), include_properties)).collect()).unwrap_or_default(),
        };
        Some(TypeContainer { type_def, children })
    }

    fn child_ids(&self, id: Option<&str>) -> RepoResult<Vec<String>> {
        match id {
            None => Ok(BaseType::ALL.iter().map(|b| b.type_id().to_string()).collect()),
            Some(id) => self.children.get(id).cloned().ok_or_else(|| RepoError::not_found(format!("Type {} does not exist", id))),
        }
    }

    /// Removes a leaf type. `in_use` answers whether any stored object still references the type.
    pub fn remove_type<F: Fn(&str) -> bool>(&mut self, id: &str, in_use: F) -> RepoResult<()> {
        let t = self.types.get(id).ok_or_else(|| RepoError::not_found(format!("Type {} does not exist", id)))?;
        let Some(parent_id) = t.parent_id.clone() else {
            return Err(RepoError::constraint(format!("Unable remove root type {}", id)));
        };
        if self.children.get(id).map(|c| !c.is_empty()).unwrap_or(false) {
            return Err(RepoError::constraint(format!("Unable remove type {}: it has descendant types", id)));
        }
        if in_use(id) {
            return Err(RepoError::constraint(format!("Unable remove type {}: objects of this type exist", id)));
        }
        let query_name = t.query_name.clone();
        self.types.remove(id);
        self.children.remove(id);
        self.by_query_name.remove(&query_name);
        if let Some(siblings) = self.children.get_mut(&parent_id) { siblings.retain(|c| c != id); }
        debug!(target: "folio::types", "remove_type {}", id);
        Ok(())
    }

    /// Borrowed resolved snapshot.
    pub fn definition(&self, id: &str) -> Option<&TypeDefinition> { self.types.get(id) }

    pub fn by_query_name(&self, query_name: &str) -> Option<&TypeDefinition> {
        self.by_query_name.get(query_name).and_then(|id| self.types.get(id))
    }

    pub fn is_subtype_of(&self, id: &str, ancestor: &str) -> bool {
        let mut cur = Some(id.to_string());
        while let Some(c) = cur {
            if c == ancestor { return true; }
            cur = self.types.get(&c).and_then(|t| t.parent_id.clone());
        }
        false
    }

    /// `id` plus every subtype reachable through types that opt into supertype queries.
    pub fn query_type_ids(&self, id: &str) -> Vec<String> {
        let mut out = vec![id.to_string()];
        let mut stack: Vec<String> = self.children.get(id).cloned().unwrap_or_default();
        stack.reverse();
        while let Some(c) = stack.pop() {
            let Some(t) = self.types.get(&c) else { continue };
            if !t.included_in_supertype_query { continue; }
            out.push(c.clone());
            if let Some(cs) = self.children.get(&c) { stack.extend(cs.iter().rev().cloned()); }
        }
        out
    }

    fn copy_of(t: &TypeDefinition, include_properties: bool) -> TypeDefinition {
        let mut copy = t.clone();
        if !include_properties { copy.property_definitions.clear(); }
        copy
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod registry_tests;
