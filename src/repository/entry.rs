//! Arena records and the public snapshots handed out to callers.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::error::{RepoError, RepoResult};
use crate::types::{props, BaseType};
use crate::value::Value;
use super::naming::{join_path, split_path};
use super::ROOT_FOLDER_ID;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentStream {
    pub bytes: Vec<u8>,
    pub mime_type: String,
    pub file_name: Option<String>,
}

impl ContentStream {
    pub fn new<B: Into<Vec<u8>>, M: Into<String>>(bytes: B, mime_type: M) -> Self {
        Self { bytes: bytes.into(), mime_type: mime_type.into(), file_name: None }
    }

    pub fn text(s: &str) -> Self { Self::new(s.as_bytes().to_vec(), "text/plain") }

    pub fn with_file_name<S: Into<String>>(mut self, name: S) -> Self { self.file_name = Some(name.into()); self }

    pub fn len(&self) -> usize { self.bytes.len() }

    pub fn is_empty(&self) -> bool { self.bytes.is_empty() }
}

#[derive(Debug, Clone)]
pub(crate) struct DocumentState {
    pub content: Option<ContentStream>,
    pub series_id: String,
    pub is_pwc: bool,
}

#[derive(Debug, Clone)]
pub(crate) enum EntryKind {
    Document(DocumentState),
    Folder { children: Vec<String> },
    Policy,
    Relationship { source: String, target: String },
}

#[derive(Debug, Clone)]
pub(crate) struct ObjectEntry {
    pub id: String,
    pub type_id: String,
    pub base: BaseType,
    pub properties: BTreeMap<String, Value>,
    pub acl: BTreeMap<String, BTreeSet<String>>,
    pub policies: BTreeSet<String>,
    pub parents: Vec<String>,
    pub kind: EntryKind,
}

impl ObjectEntry {
    pub fn name(&self) -> &str {
        self.properties.get(props::NAME).and_then(|v| v.first_str()).unwrap_or("")
    }

    pub fn children(&self) -> Option<&Vec<String>> {
        match &self.kind { EntryKind::Folder { children } => Some(children), _ => None }
    }

    pub fn children_mut(&mut self) -> Option<&mut Vec<String>> {
        match &mut self.kind { EntryKind::Folder { children } => Some(children), _ => None }
    }

    pub fn document(&self) -> Option<&DocumentState> {
        match &self.kind { EntryKind::Document(d) => Some(d), _ => None }
    }

    pub fn document_mut(&mut self) -> Option<&mut DocumentState> {
        match &mut self.kind { EntryKind::Document(d) => Some(d), _ => None }
    }

    pub fn series_id(&self) -> Option<&str> { self.document().map(|d| d.series_id.as_str()) }

    pub fn is_pwc(&self) -> bool { self.document().map(|d| d.is_pwc).unwrap_or(false) }

    pub fn is_folder(&self) -> bool { self.base == BaseType::Folder }

    pub fn change_token(&self) -> Option<&str> {
        self.properties.get(props::CHANGE_TOKEN).and_then(|v| v.first_str())
    }

    pub fn flag(&self, property: &str) -> bool {
        self.properties.get(property).and_then(|v| v.first_bool()).unwrap_or(false)
    }

    pub fn set(&mut self, property: &str, value: Value) { self.properties.insert(property.to_string(), value); }
}

/// Versions of one series, oldest first, plus the working copy when checked out.
#[derive(Debug, Clone, Default)]
pub(crate) struct VersionSeries {
    pub versions: Vec<String>,
    pub working_copy: Option<String>,
    pub checked_out_by: Option<String>,
}

impl VersionSeries {
    pub fn latest(&self) -> Option<&str> { self.versions.last().map(|s| s.as_str()) }

    pub fn is_empty(&self) -> bool { self.versions.is_empty() && self.working_copy.is_none() }
}

/// The object arena: every object and all relational structure between them.
#[derive(Debug, Default)]
pub(crate) struct StoreState {
    pub objects: HashMap<String, ObjectEntry>,
    pub series: HashMap<String, VersionSeries>,
    pub change_seq: u64,
}

impl StoreState {
    pub fn get(&self, id: &str) -> RepoResult<&ObjectEntry> {
        self.objects.get(id).ok_or_else(|| RepoError::not_found(format!("Object {} does not exist", id)))
    }

    pub fn get_mut(&mut self, id: &str) -> RepoResult<&mut ObjectEntry> {
        self.objects.get_mut(id).ok_or_else(|| RepoError::not_found(format!("Object {} does not exist", id)))
    }

    pub fn folder(&self, id: &str) -> RepoResult<&ObjectEntry> {
        let e = self.get(id)?;
        if !e.is_folder() {
            return Err(RepoError::invalid(format!("Object {} is not a folder", id)));
        }
        Ok(e)
    }

    pub fn next_change_token(&mut self) -> String {
        self.change_seq += 1;
        self.change_seq.to_string()
    }

    /// Path through the first parent link; `None` for unfiled objects and relationships.
    pub fn path_of(&self, id: &str) -> Option<String> {
        if id == ROOT_FOLDER_ID { return Some("/".to_string()); }
        let mut segments = Vec::new();
        let mut cur = self.objects.get(id)?;
        // a corrupt parent cycle must not hang readers
        for _ in 0..=self.objects.len() {
            segments.push(cur.name());
            let parent = cur.parents.first()?;
            if parent == ROOT_FOLDER_ID {
                segments.reverse();
                return Some(segments.into_iter().fold("/".to_string(), |acc, s| join_path(&acc, s)));
            }
            cur = self.objects.get(parent)?;
        }
        None
    }

    /// Walks `/`-separated segments from the root. Non-terminal segments only match folders.
    pub fn resolve_path(&self, path: &str) -> RepoResult<&ObjectEntry> {
        let not_found = || RepoError::not_found(format!("Path '{}' not found", path));
        let segments = split_path(path);
        let mut cur = self.get(ROOT_FOLDER_ID)?;
        for (i, seg) in segments.iter().enumerate() {
            let last = i + 1 == segments.len();
            let children = cur.children().ok_or_else(not_found)?;
            cur = children.iter()
                .filter_map(|c| self.objects.get(c))
                .find(|c| c.name() == seg.as_str() && (last || c.is_folder()))
                .ok_or_else(not_found)?;
        }
        Ok(cur)
    }

    /// Object id given either an id or an absolute path.
    pub fn resolve_ref(&self, id_or_path: &str) -> RepoResult<&ObjectEntry> {
        if id_or_path.starts_with('/') { self.resolve_path(id_or_path) } else { self.get(id_or_path) }
    }

    /// Every object below `folder`, depth first, each id once.
    pub fn descendants_of(&self, folder: &str) -> Vec<String> {
        let mut out = Vec::new();
        let mut seen = HashSet::new();
        self.collect_pre_order(folder, &mut seen, &mut out);
        out
    }

    fn collect_pre_order<'s>(&'s self, folder: &str, seen: &mut HashSet<&'s str>, out: &mut Vec<String>) {
        let Some(children) = self.objects.get(folder).and_then(|e| e.children()) else { return };
        for c in children {
            if !seen.insert(c.as_str()) { continue; }
            out.push(c.clone());
            self.collect_pre_order(c, seen, out);
        }
    }

    /// True when `folder` is `ancestor` or lies below it.
    pub fn is_within(&self, folder: &str, ancestor: &str) -> bool {
        let mut cur = Some(folder);
        for _ in 0..=self.objects.len() {
            let Some(c) = cur else { return false };
            if c == ancestor { return true; }
            cur = self.objects.get(c).and_then(|e| e.parents.first()).map(|s| s.as_str());
        }
        false
    }

    /// Fails when `folder` already holds a child called `name`. `exclude` and members of
    /// `series` never collide.
    pub fn check_name_free(&self, folder: &str, name: &str, exclude: &str, series: Option<&str>) -> RepoResult<()> {
        let f = self.get(folder)?;
        let clash = f.children().into_iter().flatten()
            .filter(|c| c.as_str() != exclude)
            .filter_map(|c| self.objects.get(c))
            .any(|c| c.name() == name && (series.is_none() || c.series_id() != series));
        if clash {
            let where_ = self.path_of(folder).unwrap_or_else(|| folder.to_string());
            return Err(RepoError::name_conflict(format!("Object with name {} already exists in folder {}", name, where_)));
        }
        Ok(())
    }

    pub fn is_checked_out(&self, entry: &ObjectEntry) -> bool {
        entry.series_id()
            .and_then(|s| self.series.get(s))
            .map(|s| s.working_copy.is_some())
            .unwrap_or(false)
    }

    /// Stored properties plus the derived ones: folder path and series check-out state.
    pub fn effective_properties(&self, entry: &ObjectEntry) -> BTreeMap<String, Value> {
        let mut p = entry.properties.clone();
        for (k, v) in self.derived_properties(entry) { p.insert(k.to_string(), v); }
        p
    }

    pub fn property_of(&self, entry: &ObjectEntry, property: &str) -> Option<Value> {
        self.derived_properties(entry).into_iter()
            .find(|(k, _)| *k == property)
            .map(|(_, v)| v)
            .or_else(|| entry.properties.get(property).cloned())
    }

    fn derived_properties(&self, entry: &ObjectEntry) -> Vec<(&'static str, Value)> {
        let mut out = Vec::new();
        match entry.base {
            BaseType::Folder => {
                if let Some(p) = self.path_of(&entry.id) { out.push((props::PATH, Value::string(p))); }
            }
            BaseType::Document => {
                let series = entry.series_id().and_then(|s| self.series.get(s));
                let pwc = series.and_then(|s| s.working_copy.clone());
                out.push((props::IS_VERSION_SERIES_CHECKED_OUT, Value::boolean(pwc.is_some())));
                match (pwc, series.and_then(|s| s.checked_out_by.clone())) {
                    (Some(pwc), by) => {
                        out.push((props::VERSION_SERIES_CHECKED_OUT_ID, Value::id(pwc)));
                        out.push((props::VERSION_SERIES_CHECKED_OUT_BY, Value::String(by.into_iter().collect())));
                    }
                    (None, _) => {
                        out.push((props::VERSION_SERIES_CHECKED_OUT_ID, Value::Id(vec![])));
                        out.push((props::VERSION_SERIES_CHECKED_OUT_BY, Value::String(vec![])));
                    }
                }
            }
            _ => {}
        }
        out
    }

    pub fn snapshot(&self, entry: &ObjectEntry) -> ObjectData {
        let (source_id, target_id) = match &entry.kind {
            EntryKind::Relationship { source, target } => (Some(source.clone()), Some(target.clone())),
            _ => (None, None),
        };
        ObjectData {
            id: entry.id.clone(),
            type_id: entry.type_id.clone(),
            base: entry.base,
            properties: self.effective_properties(entry),
            parent_ids: entry.parents.clone(),
            acl: entry.acl.clone(),
            policy_ids: entry.policies.clone(),
            has_content: entry.document().map(|d| d.content.is_some()).unwrap_or(false),
            is_private_working_copy: entry.is_pwc(),
            version_series_id: entry.series_id().map(|s| s.to_string()),
            source_id,
            target_id,
        }
    }

    pub fn type_in_use(&self, type_id: &str) -> bool {
        self.objects.values().any(|e| e.type_id == type_id)
    }
}

/// Caller-owned copy of a stored object. Mutating it never affects the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectData {
    pub id: String,
    pub type_id: String,
    pub base: BaseType,
    pub properties: BTreeMap<String, Value>,
    pub parent_ids: Vec<String>,
    pub acl: BTreeMap<String, BTreeSet<String>>,
    pub policy_ids: BTreeSet<String>,
    pub has_content: bool,
    pub is_private_working_copy: bool,
    pub version_series_id: Option<String>,
    pub source_id: Option<String>,
    pub target_id: Option<String>,
}

impl ObjectData {
    pub fn property(&self, id: &str) -> Option<&Value> { self.properties.get(id) }

    pub fn name(&self) -> &str { self.str_property(props::NAME).unwrap_or("") }

    /// Folder path; `None` for every other base type.
    pub fn path(&self) -> Option<&str> { self.str_property(props::PATH) }

    pub fn change_token(&self) -> Option<&str> { self.str_property(props::CHANGE_TOKEN) }

    pub fn version_label(&self) -> Option<&str> { self.str_property(props::VERSION_LABEL) }

    pub fn is_latest_version(&self) -> bool {
        self.properties.get(props::IS_LATEST_VERSION).and_then(|v| v.first_bool()).unwrap_or(false)
    }

    fn str_property(&self, id: &str) -> Option<&str> { self.properties.get(id).and_then(|v| v.first_str()) }
}
