//! Saving drafts, deletion, moves, multi-filing, policies and ACLs.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{RepoError, RepoResult};
use crate::types::{props, BaseType, ContentStreamAllowed, TypeDefinition, TypeRegistry};
use crate::value::Value;
use super::draft::{ContentChange, ObjectDraft, VersioningState};
use super::entry::{ContentStream, DocumentState, EntryKind, ObjectEntry, StoreState, VersionSeries};
use super::naming::etag_for_bytes;
use super::{Repository, Scope, Tx, ROOT_FOLDER_ID};

/// What `delete_tree` does with non-folder children.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnfileObject {
    /// Unfile from the deleted folders and keep the objects
    Unfile,
    /// Delete objects filed only here, unfile the rest
    DeleteSingleFiled,
    #[default]
    Delete,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeFailure {
    pub object_id: String,
    pub error: RepoError,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeleteTreeOutcome {
    pub failed: Vec<TreeFailure>,
}

impl DeleteTreeOutcome {
    pub fn is_success(&self) -> bool { self.failed.is_empty() }

    pub fn failed_ids(&self) -> Vec<&str> { self.failed.iter().map(|f| f.object_id.as_str()).collect() }
}

/// Access control entry: a principal and its permissions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ace {
    pub principal: String,
    pub permissions: BTreeSet<String>,
}

impl Ace {
    pub fn new<S: Into<String>>(principal: S, permissions: &[&str]) -> Self {
        Self { principal: principal.into(), permissions: permissions.iter().map(|p| p.to_string()).collect() }
    }
}

#[derive(Debug, Clone, Copy)]
struct TreeOptions {
    all_versions: bool,
    unfile: UnfileObject,
    continue_on_failure: bool,
}

pub(crate) fn check_endpoints(types: &TypeRegistry, state: &StoreState, t: &TypeDefinition, source: &str, target: &str) -> RepoResult<()> {
    let allowed = |allowed: &[String], id: &str, end: &str| -> RepoResult<()> {
        let e = state.get(id)?;
        if allowed.is_empty() || allowed.iter().any(|a| types.is_subtype_of(&e.type_id, a)) {
            return Ok(());
        }
        Err(RepoError::constraint(format!("Type {} is not allowed as {} of relationship type {}", e.type_id, end, t.id)))
    };
    allowed(&t.allowed_source_types, source, "source")?;
    allowed(&t.allowed_target_types, target, "target")
}

fn check_required(t: &TypeDefinition, properties: &BTreeMap<String, Value>) -> RepoResult<()> {
    for p in t.property_definitions.values().filter(|p| p.required) {
        match properties.get(&p.id) {
            Some(v) if !v.is_empty() => {}
            _ => return Err(RepoError::invalid(format!("Required property {} is not set", p.id))),
        }
    }
    Ok(())
}

fn content_properties(properties: &mut BTreeMap<String, Value>, content: Option<&ContentStream>) {
    match content {
        Some(c) => {
            properties.insert(props::CONTENT_STREAM_LENGTH.to_string(), Value::integer(c.len() as i64));
            properties.insert(props::CONTENT_STREAM_MIME_TYPE.to_string(), Value::string(c.mime_type.clone()));
            properties.insert(props::CONTENT_STREAM_FILE_NAME.to_string(), Value::String(c.file_name.iter().cloned().collect()));
            properties.insert(props::CONTENT_STREAM_ID.to_string(), Value::id(etag_for_bytes(&c.bytes)));
        }
        None => {
            for p in [props::CONTENT_STREAM_LENGTH, props::CONTENT_STREAM_MIME_TYPE, props::CONTENT_STREAM_FILE_NAME, props::CONTENT_STREAM_ID] {
                properties.remove(p);
            }
        }
    }
}

impl Repository {
    /// Persists a draft: creates the object on first save, applies the staged changes afterwards.
    /// Returns the object id.
    pub fn save_object(&self, draft: ObjectDraft) -> RepoResult<String> {
        let id = draft.id.clone();
        let principal = draft.principal.clone();
        let is_new = draft.is_new;
        self.write(Scope::Objects(vec![id.as_str()]), &principal, |tx| if is_new { tx.insert(draft) } else { tx.update(draft) })?;
        debug!(target: "folio::store", "{} {}", if is_new { "created" } else { "updated" }, id);
        Ok(id)
    }

    /// Deletes one object. A private working copy cancels its check-out; `all_versions`
    /// removes the whole version series of a document.
    pub fn delete_object(&self, id: &str, all_versions: bool) -> RepoResult<()> {
        let principal = self.default_principal().to_string();
        self.write(Scope::All, &principal, |tx| tx.delete(id, all_versions))?;
        debug!(target: "folio::store", "deleted {}", id);
        Ok(())
    }

    /// Deletes a folder and everything below it, children before their folder.
    /// Failures are collected in the outcome; without `continue_on_failure` the walk stops at the first one.
    pub fn delete_tree(&self, folder: &str, all_versions: bool, unfile: UnfileObject, continue_on_failure: bool) -> RepoResult<DeleteTreeOutcome> {
        let principal = self.default_principal().to_string();
        let opts = TreeOptions { all_versions, unfile, continue_on_failure };
        let outcome = self.write(Scope::All, &principal, |tx| {
            if folder == ROOT_FOLDER_ID {
                return Err(RepoError::constraint("Unable delete root folder"));
            }
            tx.state.folder(folder)?;
            let mut failed = Vec::new();
            tx.delete_tree_in(folder, opts, &mut failed);
            Ok(DeleteTreeOutcome { failed })
        })?;
        if !outcome.is_success() {
            warn!(target: "folio::store", "delete_tree {}: {} objects not deleted", folder, outcome.failed.len());
        }
        Ok(outcome)
    }

    /// Moves `id` from `source` into `target`. Returns the moved object.
    pub fn move_object(&self, id: &str, target: &str, source: &str) -> RepoResult<super::ObjectData> {
        let principal = self.default_principal().to_string();
        self.write(Scope::Objects(vec![id]), &principal, |tx| {
            tx.move_object(id, target, source)?;
            Ok(tx.state.snapshot(tx.state.get(id)?))
        })
    }

    pub fn add_object_to_folder(&self, id: &str, folder: &str) -> RepoResult<()> {
        let principal = self.default_principal().to_string();
        self.write(Scope::Objects(vec![id]), &principal, |tx| tx.add_to_folder(id, folder))
    }

    /// Removes one filing, or all of them when `folder` is `None`.
    pub fn remove_object_from_folder(&self, id: &str, folder: Option<&str>) -> RepoResult<()> {
        let principal = self.default_principal().to_string();
        self.write(Scope::Objects(vec![id]), &principal, |tx| {
            if !tx.caps.unfiling {
                return Err(RepoError::constraint("Unfiling is not supported"));
            }
            if tx.state.get(id)?.is_folder() {
                return Err(RepoError::constraint(format!("Folder {} cannot be unfiled", id)));
            }
            tx.unfile_from(id, folder)
        })
    }

    pub fn unfile_object(&self, id: &str) -> RepoResult<()> { self.remove_object_from_folder(id, None) }

    pub fn apply_policy(&self, policy_id: &str, id: &str) -> RepoResult<()> {
        let principal = self.default_principal().to_string();
        self.write(Scope::Objects(vec![id]), &principal, |tx| {
            tx.check_policy_target(policy_id, id)?;
            tx.state.get_mut(id)?.policies.insert(policy_id.to_string());
            Ok(())
        })
    }

    pub fn remove_policy(&self, policy_id: &str, id: &str) -> RepoResult<()> {
        let principal = self.default_principal().to_string();
        self.write(Scope::Objects(vec![id]), &principal, |tx| {
            tx.check_policy_target(policy_id, id)?;
            if !tx.state.get_mut(id)?.policies.remove(policy_id) {
                return Err(RepoError::invalid(format!("Policy {} is not applied to object {}", policy_id, id)));
            }
            Ok(())
        })
    }

    pub fn get_applied_policies(&self, id: &str) -> RepoResult<Vec<super::ObjectData>> {
        self.read(|st| {
            let e = st.get(id)?;
            Ok(e.policies.iter().filter_map(|p| st.objects.get(p)).map(|p| st.snapshot(p)).collect())
        })
    }

    /// Adds then removes permissions; returns the resulting ACL.
    pub fn apply_acl(&self, id: &str, add: &[Ace], remove: &[Ace]) -> RepoResult<Vec<Ace>> {
        let principal = self.default_principal().to_string();
        self.write(Scope::Objects(vec![id]), &principal, |tx| {
            let e = tx.state.get(id)?;
            let t = tx.type_of(e)?;
            if !t.controllable_acl {
                return Err(RepoError::constraint(format!("Type {} is not controllable by ACL", t.id)));
            }
            let e = tx.state.get_mut(id)?;
            for ace in add {
                e.acl.entry(ace.principal.clone()).or_default().extend(ace.permissions.iter().cloned());
            }
            for ace in remove {
                if let Some(perms) = e.acl.get_mut(&ace.principal) {
                    perms.retain(|p| !ace.permissions.contains(p));
                    if perms.is_empty() { e.acl.remove(&ace.principal); }
                }
            }
            Ok(acl_entries(&e.acl))
        })
    }

    pub fn get_acl(&self, id: &str) -> RepoResult<Vec<Ace>> {
        self.read(|st| Ok(acl_entries(&st.get(id)?.acl)))
    }
}

fn acl_entries(acl: &BTreeMap<String, BTreeSet<String>>) -> Vec<Ace> {
    acl.iter().map(|(p, perms)| Ace { principal: p.clone(), permissions: perms.clone() }).collect()
}

impl Tx<'_> {
    fn insert(&mut self, d: ObjectDraft) -> RepoResult<()> {
        let t = self.types.definition(&d.type_def.id)
            .ok_or_else(|| RepoError::not_found(format!("Type {} does not exist", d.type_def.id)))?;
        if self.state.objects.contains_key(&d.id) {
            return Err(RepoError::invalid(format!("Object {} was already saved", d.id)));
        }
        check_required(t, &d.properties)?;
        if t.base == BaseType::Document && t.content_stream_allowed == ContentStreamAllowed::Required && !d.will_have_content() {
            return Err(RepoError::constraint(format!("Content stream is required for type {}", t.id)));
        }
        let name = d.properties.get(props::NAME).and_then(|v| v.first_str()).unwrap_or("").to_string();
        if let Some(p) = &d.parent {
            self.state.folder(p)?;
            self.state.check_name_free(p, &name, &d.id, None)?;
        }

        let mut properties = d.properties;
        properties.insert(props::OBJECT_ID.to_string(), Value::id(d.id.clone()));
        properties.insert(props::BASE_TYPE_ID.to_string(), Value::id(t.base.type_id()));
        properties.insert(props::CREATED_BY.to_string(), Value::string(self.principal));
        properties.insert(props::CREATION_DATE.to_string(), Value::datetime(self.now));

        let kind = match t.base {
            BaseType::Document => {
                let content = match d.content {
                    ContentChange::Set(c) => Some(c),
                    _ => None,
                };
                content_properties(&mut properties, content.as_ref());
                let series_id = Uuid::new_v4().to_string();
                let pwc = t.versionable && d.versioning == VersioningState::CheckedOut;
                let major = !(t.versionable && d.versioning == VersioningState::Minor);
                let label = if pwc { "pwc" } else if major { "1.0" } else { "0.1" };
                properties.insert(props::VERSION_SERIES_ID.to_string(), Value::id(series_id.clone()));
                properties.insert(props::VERSION_LABEL.to_string(), Value::string(label));
                properties.insert(props::IS_LATEST_VERSION.to_string(), Value::boolean(!pwc));
                properties.insert(props::IS_MAJOR_VERSION.to_string(), Value::boolean(major && !pwc));
                properties.insert(props::IS_LATEST_MAJOR_VERSION.to_string(), Value::boolean(major && !pwc));
                let series = if pwc {
                    VersionSeries { versions: Vec::new(), working_copy: Some(d.id.clone()), checked_out_by: Some(self.principal.to_string()) }
                } else {
                    VersionSeries { versions: vec![d.id.clone()], ..VersionSeries::default() }
                };
                self.state.series.insert(series_id.clone(), series);
                EntryKind::Document(DocumentState { content, series_id, is_pwc: pwc })
            }
            BaseType::Folder => {
                let parent = d.parent.clone()
                    .ok_or_else(|| RepoError::invalid("A folder must be created in a parent folder"))?;
                properties.insert(props::PARENT_ID.to_string(), Value::id(parent));
                EntryKind::Folder { children: Vec::new() }
            }
            BaseType::Policy => EntryKind::Policy,
            BaseType::Relationship => {
                let (source, target) = d.endpoints.clone()
                    .ok_or_else(|| RepoError::invalid("Relationship source and target are not set"))?;
                check_endpoints(self.types, self.state, t, &source, &target)?;
                EntryKind::Relationship { source, target }
            }
        };

        let parents: Vec<String> = d.parent.iter().cloned().collect();
        for p in &parents {
            if let Some(children) = self.state.get_mut(p)?.children_mut() { children.push(d.id.clone()); }
        }
        self.state.objects.insert(d.id.clone(), ObjectEntry {
            id: d.id.clone(),
            type_id: t.id.clone(),
            base: t.base,
            properties,
            acl: BTreeMap::new(),
            policies: BTreeSet::new(),
            parents,
            kind,
        });
        self.mark_created(&d.id);
        self.stamp(&d.id)
    }

    fn update(&mut self, d: ObjectDraft) -> RepoResult<()> {
        let e = self.state.get(&d.id)?;
        let t = self.type_of(e)?;
        if e.change_token() != d.change_token.as_deref() {
            return Err(RepoError::update_conflict(format!("Object {} was modified since it was read", d.id)));
        }
        let mut merged = e.properties.clone();
        for pid in &d.changed {
            match d.properties.get(pid) {
                Some(v) => { merged.insert(pid.clone(), v.clone()); }
                None => { merged.remove(pid); }
            }
        }
        check_required(t, &merged)?;
        if d.changed.contains(props::NAME) {
            let name = merged.get(props::NAME).and_then(|v| v.first_str()).unwrap_or("");
            let series = e.series_id();
            for p in &e.parents {
                self.state.check_name_free(p, name, &d.id, series)?;
            }
        }
        let e = self.state.get_mut(&d.id)?;
        e.properties = merged;
        match d.content {
            ContentChange::Keep => {}
            ContentChange::Set(c) => {
                content_properties(&mut e.properties, Some(&c));
                if let Some(doc) = e.document_mut() { doc.content = Some(c); }
            }
            ContentChange::Delete => {
                content_properties(&mut e.properties, None);
                if let Some(doc) = e.document_mut() { doc.content = None; }
            }
        }
        self.stamp(&d.id)
    }

    pub(super) fn delete(&mut self, id: &str, all_versions: bool) -> RepoResult<()> {
        if id == ROOT_FOLDER_ID {
            return Err(RepoError::constraint("Unable delete root folder"));
        }
        let e = self.state.get(id)?;
        match e.base {
            BaseType::Folder if e.children().map(|c| !c.is_empty()).unwrap_or(false) => {
                return Err(RepoError::constraint(format!("Folder {} is not empty", id)));
            }
            BaseType::Policy if self.state.objects.values().any(|o| o.policies.contains(id)) => {
                return Err(RepoError::constraint(format!("Policy {} is applied to at least one object", id)));
            }
            _ => {}
        }
        let Some(doc) = e.document() else {
            self.remove_entry(id);
            return Ok(());
        };
        if doc.is_pwc {
            return self.cancel_check_out(id);
        }
        let series_id = doc.series_id.clone();
        if all_versions {
            let series = self.state.series.remove(&series_id).unwrap_or_default();
            for v in series.working_copy.iter().chain(series.versions.iter()) {
                self.remove_entry(v);
            }
            return Ok(());
        }
        self.delete_version(id, &series_id)
    }

    /// Removes one version; when it was the latest, the previous version takes over its filings.
    fn delete_version(&mut self, id: &str, series_id: &str) -> RepoResult<()> {
        let e = self.state.get(id)?;
        let parents = e.parents.clone();
        let name = e.name().to_string();
        self.remove_entry(id);
        let Some(series) = self.state.series.get_mut(series_id) else { return Ok(()) };
        let was_latest = series.latest() == Some(id);
        series.versions.retain(|v| v != id);
        if series.is_empty() {
            self.state.series.remove(series_id);
            return Ok(());
        }
        let previous = if was_latest { series.versions.last().cloned() } else { None };
        if let Some(prev) = previous {
            let mut refile = Vec::new();
            for p in &parents {
                if self.state.check_name_free(p, &name, &prev, Some(series_id)).is_ok() {
                    refile.push(p.clone());
                } else {
                    warn!(target: "folio::store", "version {} not refiled in {}: name taken", prev, p);
                }
            }
            for p in &refile {
                if let Some(children) = self.state.get_mut(p)?.children_mut() {
                    if !children.contains(&prev) { children.push(prev.clone()); }
                }
            }
            let e = self.state.get_mut(&prev)?;
            e.set(props::IS_LATEST_VERSION, Value::boolean(true));
            for p in refile {
                if !e.parents.contains(&p) { e.parents.push(p); }
            }
            self.touch(&prev);
        }
        self.refresh_latest_major(series_id)
    }

    /// Drops an object from the arena with every relationship attached to it.
    pub(super) fn remove_entry(&mut self, id: &str) {
        let attached: Vec<String> = self.state.objects.values()
            .filter(|o| matches!(&o.kind, EntryKind::Relationship { source, target } if source == id || target == id))
            .map(|o| o.id.clone())
            .filter(|r| r != id)
            .collect();
        for r in attached { self.remove_entry(&r); }
        let Some(e) = self.state.objects.remove(id) else { return };
        for p in &e.parents {
            if let Some(children) = self.state.objects.get_mut(p).and_then(|f| f.children_mut()) {
                children.retain(|c| c != id);
            }
        }
        self.mark_removed(id);
    }

    fn delete_tree_in(&mut self, folder: &str, opts: TreeOptions, failed: &mut Vec<TreeFailure>) -> bool {
        // deleting a latest version refiles its predecessor here, so sweep until nothing new turns up
        let mut seen: BTreeSet<String> = BTreeSet::new();
        loop {
            let pending: Vec<String> = self.state.objects.get(folder)
                .and_then(|f| f.children())
                .map(|c| c.iter().filter(|id| !seen.contains(*id)).cloned().collect())
                .unwrap_or_default();
            if pending.is_empty() { break; }
            for child in pending {
                seen.insert(child.clone());
                // earlier deletions may already have taken it (versions, relationships)
                let Some(is_folder) = self.state.objects.get(&child).map(|c| c.is_folder()) else { continue };
                if is_folder {
                    if !self.delete_tree_in(&child, opts, failed) { return false; }
                    continue;
                }
                if let Err(error) = self.dispose(&child, folder, opts) {
                    failed.push(TreeFailure { object_id: child, error });
                    if !opts.continue_on_failure { return false; }
                }
            }
        }
        match self.delete(folder, false) {
            Ok(()) => true,
            Err(error) => {
                failed.push(TreeFailure { object_id: folder.to_string(), error });
                opts.continue_on_failure
            }
        }
    }

    fn dispose(&mut self, id: &str, folder: &str, opts: TreeOptions) -> RepoResult<()> {
        let multi_filed = self.state.get(id)?.parents.len() > 1;
        match opts.unfile {
            UnfileObject::Delete => self.delete(id, opts.all_versions),
            UnfileObject::DeleteSingleFiled if multi_filed => self.unfile_from(id, Some(folder)),
            UnfileObject::DeleteSingleFiled => self.delete(id, opts.all_versions),
            UnfileObject::Unfile => {
                if !multi_filed && !self.caps.unfiling {
                    return Err(RepoError::constraint("Unfiling is not supported"));
                }
                self.unfile_from(id, Some(folder))
            }
        }
    }

    pub(super) fn unfile_from(&mut self, id: &str, folder: Option<&str>) -> RepoResult<()> {
        let e = self.state.get_mut(id)?;
        let targets: Vec<String> = match folder {
            Some(f) => {
                if !e.parents.iter().any(|p| p == f) {
                    return Err(RepoError::invalid(format!("Object {} is not filed in folder {}", id, f)));
                }
                vec![f.to_string()]
            }
            None => e.parents.clone(),
        };
        e.parents.retain(|p| !targets.contains(p));
        for f in &targets {
            if let Some(children) = self.state.objects.get_mut(f).and_then(|f| f.children_mut()) {
                children.retain(|c| c != id);
            }
        }
        self.touch(id);
        Ok(())
    }

    fn move_object(&mut self, id: &str, target: &str, source: &str) -> RepoResult<()> {
        let e = self.state.get(id)?;
        if !e.parents.iter().any(|p| p == source) {
            return Err(RepoError::invalid(format!("Object {} is not filed in source folder {}", id, source)));
        }
        self.state.folder(target)?;
        if e.is_folder() && self.state.is_within(target, id) {
            return Err(RepoError::constraint(format!("Folder {} cannot be moved below itself", id)));
        }
        if target == source { return Ok(()); }
        let already_filed = e.parents.iter().any(|p| p == target);
        self.state.check_name_free(target, e.name(), id, e.series_id())?;

        if let Some(children) = self.state.get_mut(source)?.children_mut() { children.retain(|c| c != id); }
        if !already_filed {
            if let Some(children) = self.state.get_mut(target)?.children_mut() { children.push(id.to_string()); }
        }
        let e = self.state.get_mut(id)?;
        if already_filed {
            e.parents.retain(|p| p != source);
        } else if let Some(slot) = e.parents.iter_mut().find(|p| p.as_str() == source) {
            *slot = target.to_string();
        }
        if e.is_folder() { e.set(props::PARENT_ID, Value::id(target)); }
        // paths below a moved folder change; their documents only carry @parent ids
        self.stamp(id)
    }

    fn add_to_folder(&mut self, id: &str, folder: &str) -> RepoResult<()> {
        if !self.caps.multifiling {
            return Err(RepoError::constraint("Multi-filing is not supported"));
        }
        let e = self.state.get(id)?;
        if e.is_folder() {
            return Err(RepoError::constraint(format!("Folder {} cannot be multi-filed", id)));
        }
        let t = self.type_of(e)?;
        if !t.fileable {
            return Err(RepoError::constraint(format!("Type {} is not fileable", t.id)));
        }
        self.state.folder(folder)?;
        if e.parents.iter().any(|p| p == folder) { return Ok(()); }
        self.state.check_name_free(folder, e.name(), id, e.series_id())?;
        if let Some(children) = self.state.get_mut(folder)?.children_mut() { children.push(id.to_string()); }
        self.state.get_mut(id)?.parents.push(folder.to_string());
        self.touch(id);
        Ok(())
    }

    fn check_policy_target(&self, policy_id: &str, id: &str) -> RepoResult<()> {
        if self.state.get(policy_id)?.base != BaseType::Policy {
            return Err(RepoError::invalid(format!("Object {} is not a policy", policy_id)));
        }
        let t = self.type_of(self.state.get(id)?)?;
        if !t.controllable_policy {
            return Err(RepoError::constraint(format!("Type {} is not controllable by policies", t.id)));
        }
        Ok(())
    }
}
