//! Object store.
//!
//! All objects and the relational structure between them (children, parents, version series,
//! applied policies, relationships) live in one arena behind a single `RwLock`, so every
//! compound mutation is applied inside one write critical section. A striped lock table keeps
//! mutations of the same object ordered across the store update and the index update that
//! follows it.
//!
//! Lock order: object stripes, then the type registry, then the arena, then the index.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::config::{Capabilities, RepositoryConfig};
use crate::error::{RepoError, RepoResult};
use crate::exec::{self, ObjectResolver, PropertyFilter, QueryOptions, QueryResults};
use crate::index::{ContentReaderRegistry, IndexDocument, IndexFailure, IndexSource, IndexSynchronizer, InMemoryIndex, SearchIndex};
use crate::types::{props, BaseType, TypeContainer, TypeDefinition, TypeRegistry, Updatability};
use crate::value::Value;

mod actions;
mod draft;
mod entry;
mod locks;
mod mutate;
mod naming;
mod navigation;
mod versioning;

pub use actions::AllowableActions;
pub use draft::{ObjectDraft, VersioningState};
pub use entry::{ContentStream, ObjectData};
pub use mutate::{Ace, DeleteTreeOutcome, TreeFailure, UnfileObject};
pub use navigation::{ChildrenPage, ObjectContainer, RelationshipDirection};

use draft::ContentChange;
use entry::{EntryKind, ObjectEntry, StoreState};
use locks::LockTable;

/// Fixed id of the root folder.
pub const ROOT_FOLDER_ID: &str = "abcdef12-3456-7890-0987-654321fedcba";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepositoryInfo {
    pub repository_id: String,
    pub repository_name: String,
    pub description: String,
    pub root_folder_id: String,
    pub product_name: String,
    pub product_version: String,
    pub capabilities: Capabilities,
}

pub(crate) enum IndexOp {
    Created(String, IndexDocument),
    Updated(String, IndexDocument),
    Removed(String),
}

/// Objects whose stripes a mutation holds.
pub(crate) enum Scope<'s> {
    Objects(Vec<&'s str>),
    All,
}

/// One write critical section over the arena. Records which objects changed so their
/// index documents can be derived before the arena lock is released.
pub(crate) struct Tx<'a> {
    pub state: &'a mut StoreState,
    pub types: &'a TypeRegistry,
    pub caps: &'a Capabilities,
    pub principal: &'a str,
    pub now: DateTime<Utc>,
    touched: Vec<String>,
    created: HashSet<String>,
    removed: Vec<String>,
}

impl<'a> Tx<'a> {
    fn new(state: &'a mut StoreState, types: &'a TypeRegistry, caps: &'a Capabilities, principal: &'a str) -> Self {
        Self { state, types, caps, principal, now: Utc::now(), touched: Vec::new(), created: HashSet::new(), removed: Vec::new() }
    }

    pub fn touch(&mut self, id: &str) {
        if !self.touched.iter().any(|t| t == id) { self.touched.push(id.to_string()); }
    }

    pub fn mark_created(&mut self, id: &str) {
        self.created.insert(id.to_string());
        self.touch(id);
    }

    pub fn mark_removed(&mut self, id: &str) { self.removed.push(id.to_string()); }

    /// Bumps the change token and the last-modification stamp.
    pub fn stamp(&mut self, id: &str) -> RepoResult<()> {
        let token = self.state.next_change_token();
        let e = self.state.get_mut(id)?;
        e.set(props::LAST_MODIFIED_BY, Value::string(self.principal));
        e.set(props::LAST_MODIFICATION_DATE, Value::datetime(self.now));
        e.set(props::CHANGE_TOKEN, Value::string(token));
        self.touch(id);
        Ok(())
    }

    pub fn type_of(&self, entry: &ObjectEntry) -> RepoResult<&'a TypeDefinition> {
        let types: &'a TypeRegistry = self.types;
        types.definition(&entry.type_id)
            .ok_or_else(|| RepoError::not_found(format!("Type {} does not exist", entry.type_id)))
    }

    fn into_ops(self, sync: &IndexSynchronizer) -> Vec<IndexOp> {
        if !sync.enabled() { return Vec::new(); }
        let mut ops = Vec::new();
        for id in &self.removed {
            if !self.state.objects.contains_key(id) { ops.push(IndexOp::Removed(id.clone())); }
        }
        for id in &self.touched {
            let Some(e) = self.state.objects.get(id) else { continue };
            let doc = index_document(sync, self.state, self.types, e);
            ops.push(if self.created.contains(id) { IndexOp::Created(id.clone(), doc) } else { IndexOp::Updated(id.clone(), doc) });
        }
        ops
    }
}

fn index_document(sync: &IndexSynchronizer, state: &StoreState, types: &TypeRegistry, entry: &ObjectEntry) -> IndexDocument {
    let mut properties = state.effective_properties(entry);
    // paths change with every ancestor rename, so they are never indexed
    properties.remove(props::PATH);
    let content = entry.document()
        .and_then(|d| d.content.as_ref())
        .map(|c| (c.mime_type.as_str(), c.bytes.as_slice()));
    sync.document(&IndexSource {
        properties: &properties,
        parents: &entry.parents,
        is_root: entry.id == ROOT_FOLDER_ID,
        content,
        fulltext_indexed: types.definition(&entry.type_id).map(|t| t.fulltext_indexed).unwrap_or(false),
    })
}

pub(crate) fn new_object_id() -> String { Uuid::new_v4().to_string() }

pub struct Repository {
    config: RepositoryConfig,
    types: RwLock<TypeRegistry>,
    state: RwLock<StoreState>,
    locks: LockTable,
    sync: IndexSynchronizer,
}

impl Default for Repository {
    fn default() -> Self { Self::new(RepositoryConfig::default()) }
}

impl Repository {
    /// Repository backed by the in-memory index and the default content readers.
    pub fn new(config: RepositoryConfig) -> Self {
        let index = Arc::new(InMemoryIndex::new(config.index.supports_wildcards));
        Self::with_index(config, index, ContentReaderRegistry::with_defaults())
    }

    pub fn with_index(config: RepositoryConfig, index: Arc<dyn SearchIndex>, readers: ContentReaderRegistry) -> Self {
        let sync = IndexSynchronizer::new(index, readers, config.index.clone());
        let repo = Self {
            locks: LockTable::new(config.lock_stripes),
            types: RwLock::new(TypeRegistry::new()),
            state: RwLock::new(StoreState::default()),
            sync,
            config,
        };
        repo.create_root();
        info!(target: "folio::store", "repository {} ready (root {})", repo.config.repository_id, ROOT_FOLDER_ID);
        repo
    }

    fn create_root(&self) {
        let principal = self.config.default_principal.clone();
        let seeded = self.write(Scope::Objects(vec![ROOT_FOLDER_ID]), &principal, |tx| {
            let mut p = BTreeMap::new();
            p.insert(props::NAME.to_string(), Value::string(""));
            p.insert(props::OBJECT_ID.to_string(), Value::id(ROOT_FOLDER_ID));
            p.insert(props::OBJECT_TYPE_ID.to_string(), Value::id(BaseType::Folder.type_id()));
            p.insert(props::BASE_TYPE_ID.to_string(), Value::id(BaseType::Folder.type_id()));
            p.insert(props::CREATED_BY.to_string(), Value::string(tx.principal));
            p.insert(props::CREATION_DATE.to_string(), Value::datetime(tx.now));
            tx.state.objects.insert(ROOT_FOLDER_ID.to_string(), ObjectEntry {
                id: ROOT_FOLDER_ID.to_string(),
                type_id: BaseType::Folder.type_id().to_string(),
                base: BaseType::Folder,
                properties: p,
                acl: BTreeMap::new(),
                policies: BTreeSet::new(),
                parents: Vec::new(),
                kind: EntryKind::Folder { children: Vec::new() },
            });
            tx.mark_created(ROOT_FOLDER_ID);
            tx.stamp(ROOT_FOLDER_ID)
        });
        if let Err(e) = seeded {
            error!(target: "folio::store", "seeding root folder failed: {}", e);
        }
    }

    pub fn config(&self) -> &RepositoryConfig { &self.config }

    pub fn get_repository_info(&self) -> RepositoryInfo {
        RepositoryInfo {
            repository_id: self.config.repository_id.clone(),
            repository_name: self.config.repository_name.clone(),
            description: self.config.description.clone(),
            root_folder_id: ROOT_FOLDER_ID.to_string(),
            product_name: env!("CARGO_PKG_NAME").to_string(),
            product_version: env!("CARGO_PKG_VERSION").to_string(),
            capabilities: self.config.capabilities.clone(),
        }
    }

    /// Runs `f` inside one write critical section, then pushes the resulting index updates
    /// while the object stripes are still held. Index updates are applied even when `f`
    /// fails part way, since partial work such as an aborted tree deletion stays applied.
    pub(crate) fn write<T, F>(&self, scope: Scope<'_>, principal: &str, f: F) -> RepoResult<T>
    where
        F: FnOnce(&mut Tx<'_>) -> RepoResult<T>,
    {
        let _stripes = match &scope {
            Scope::Objects(ids) => self.locks.lock(ids.iter()),
            Scope::All => self.locks.lock_all(),
        };
        let (out, ops) = {
            let types = self.types.read();
            let mut state = self.state.write();
            let mut tx = Tx::new(&mut state, &types, &self.config.capabilities, principal);
            let out = f(&mut tx);
            (out, tx.into_ops(&self.sync))
        };
        for op in ops {
            match op {
                IndexOp::Created(id, doc) => self.sync.created(&id, doc),
                IndexOp::Updated(id, doc) => self.sync.updated(&id, doc),
                IndexOp::Removed(id) => self.sync.removed(&id),
            }
        }
        out
    }

    pub(crate) fn read<T, F>(&self, f: F) -> RepoResult<T>
    where
        F: FnOnce(&StoreState) -> RepoResult<T>,
    {
        f(&self.state.read())
    }

    fn default_principal(&self) -> &str { &self.config.default_principal }

    // ---- types ----

    pub fn add_type(&self, def: TypeDefinition) -> RepoResult<TypeDefinition> {
        self.types.write().add_type(def)
    }

    pub fn get_type(&self, id: &str, include_properties: bool) -> RepoResult<TypeDefinition> {
        self.types.read().get_type(id, include_properties)
    }

    pub fn get_type_children(&self, id: Option<&str>, include_properties: bool) -> RepoResult<Vec<TypeDefinition>> {
        self.types.read().get_type_children(id, include_properties)
    }

    pub fn get_type_descendants(&self, id: Option<&str>, depth: Option<usize>, include_properties: bool) -> RepoResult<Vec<TypeContainer>> {
        self.types.read().get_type_descendants(id, depth, include_properties)
    }

    /// Fails while any stored object still uses the type.
    pub fn remove_type(&self, id: &str) -> RepoResult<()> {
        let mut types = self.types.write();
        let state = self.state.read();
        types.remove_type(id, |t| state.type_in_use(t))
    }

    // ---- factories ----

    fn creatable_type(&self, type_id: &str, base: BaseType) -> RepoResult<TypeDefinition> {
        let types = self.types.read();
        let t = types.definition(type_id)
            .ok_or_else(|| RepoError::not_found(format!("Type {} does not exist", type_id)))?;
        if t.base != base {
            return Err(RepoError::invalid(format!("Type {} is not a {} type", type_id, base.type_id())));
        }
        if !t.creatable {
            return Err(RepoError::constraint(format!("Type {} is not creatable", type_id)));
        }
        Ok(t.clone())
    }

    fn filing_parent(&self, parent: Option<&str>, t: &TypeDefinition) -> RepoResult<Option<String>> {
        match parent {
            Some(p) => {
                if !t.fileable {
                    return Err(RepoError::constraint(format!("Type {} is not fileable", t.id)));
                }
                self.read(|st| {
                    let f = st.resolve_ref(p)?;
                    if !f.is_folder() {
                        return Err(RepoError::invalid(format!("Object {} is not a folder", p)));
                    }
                    Ok(Some(f.id.clone()))
                })
            }
            None => {
                if t.fileable && !self.config.capabilities.unfiling {
                    return Err(RepoError::constraint("Unfiling is not supported; a parent folder is required"));
                }
                Ok(None)
            }
        }
    }

    /// Draft of a new document. `parent` may be an id or an absolute path; `None` creates it unfiled.
    pub fn create_document(&self, parent: Option<&str>, type_id: &str, versioning: VersioningState) -> RepoResult<ObjectDraft> {
        let t = self.creatable_type(type_id, BaseType::Document)?;
        if versioning == VersioningState::CheckedOut && !t.versionable {
            return Err(RepoError::constraint(format!("Type {} is not versionable", type_id)));
        }
        let parent = self.filing_parent(parent, &t)?;
        let mut d = ObjectDraft::for_new(new_object_id(), t, parent, self.default_principal().to_string());
        d.versioning = versioning;
        Ok(d)
    }

    /// Draft of a copy of `source` in a new version series: same type, the source's writable
    /// properties and its content stream. The name is copied too, so saving into the source's
    /// folder needs a rename first.
    pub fn create_document_from_source(&self, source: &str, parent: Option<&str>, versioning: VersioningState) -> RepoResult<ObjectDraft> {
        let (type_id, properties, content) = self.read(|st| {
            let e = st.get(source)?;
            let doc = e.document()
                .ok_or_else(|| RepoError::constraint(format!("Object {} is not a document", source)))?;
            Ok((e.type_id.clone(), e.properties.clone(), doc.content.clone()))
        })?;
        let mut d = self.create_document(parent, &type_id, versioning)?;
        for (pid, v) in properties {
            let writable = d.type_def.property(&pid).map(|p| p.updatability != Updatability::ReadOnly).unwrap_or(false);
            if writable && pid != props::OBJECT_TYPE_ID {
                d.properties.insert(pid.clone(), v);
                d.changed.insert(pid);
            }
        }
        if let Some(c) = content {
            d.content = ContentChange::Set(c);
        }
        debug!(target: "folio::store", "copy draft {} from {}", d.id, source);
        Ok(d)
    }

    pub fn create_folder(&self, parent: &str, type_id: &str) -> RepoResult<ObjectDraft> {
        let t = self.creatable_type(type_id, BaseType::Folder)?;
        let parent = self.filing_parent(Some(parent), &t)?;
        Ok(ObjectDraft::for_new(new_object_id(), t, parent, self.default_principal().to_string()))
    }

    pub fn create_policy(&self, parent: Option<&str>, type_id: &str) -> RepoResult<ObjectDraft> {
        let t = self.creatable_type(type_id, BaseType::Policy)?;
        let parent = self.filing_parent(parent, &t)?;
        Ok(ObjectDraft::for_new(new_object_id(), t, parent, self.default_principal().to_string()))
    }

    pub fn create_relationship(&self, source: &str, target: &str, type_id: &str) -> RepoResult<ObjectDraft> {
        let t = self.creatable_type(type_id, BaseType::Relationship)?;
        {
            let types = self.types.read();
            let state = self.state.read();
            mutate::check_endpoints(&types, &state, &t, source, target)?;
        }
        let mut d = ObjectDraft::for_new(new_object_id(), t, None, self.default_principal().to_string());
        d.properties.insert(props::SOURCE_ID.to_string(), Value::id(source));
        d.properties.insert(props::TARGET_ID.to_string(), Value::id(target));
        d.endpoints = Some((source.to_string(), target.to_string()));
        Ok(d)
    }

    /// Draft of an existing object, carrying its current change token.
    pub fn edit_object(&self, id: &str) -> RepoResult<ObjectDraft> {
        let types = self.types.read();
        let state = self.state.read();
        let e = state.get(id)?;
        let t = types.definition(&e.type_id)
            .ok_or_else(|| RepoError::not_found(format!("Type {} does not exist", e.type_id)))?;
        let mut d = ObjectDraft::for_new(e.id.clone(), t.clone(), e.parents.first().cloned(), self.default_principal().to_string());
        d.is_new = false;
        d.properties = e.properties.clone();
        d.change_token = e.change_token().map(|s| s.to_string());
        d.is_pwc = e.is_pwc();
        d.has_content = e.document().map(|doc| doc.content.is_some()).unwrap_or(false);
        if let EntryKind::Relationship { source, target } = &e.kind {
            d.endpoints = Some((source.clone(), target.clone()));
        }
        Ok(d)
    }

    // ---- reads ----

    pub fn get_object(&self, id: &str) -> RepoResult<ObjectData> {
        self.read(|st| Ok(st.snapshot(st.get(id)?)))
    }

    /// Snapshot restricted to the properties `filter` selects.
    pub fn get_object_filtered(&self, id: &str, filter: &PropertyFilter) -> RepoResult<ObjectData> {
        let types = self.types.read();
        let mut data = self.get_object(id)?;
        if let Some(t) = types.definition(&data.type_id) {
            data.properties.retain(|pid, _| t.property(pid).map(|def| filter.allows(def)).unwrap_or_else(|| filter.allows_id(pid)));
        }
        Ok(data)
    }

    pub fn get_object_by_path(&self, path: &str) -> RepoResult<ObjectData> {
        self.read(|st| Ok(st.snapshot(st.resolve_path(path)?)))
    }

    /// Path through the first parent; `None` for unfiled objects and relationships.
    pub fn get_object_path(&self, id: &str) -> RepoResult<Option<String>> {
        self.read(|st| {
            st.get(id)?;
            Ok(st.path_of(id))
        })
    }

    pub fn get_content_stream(&self, id: &str) -> RepoResult<ContentStream> {
        self.read(|st| {
            let e = st.get(id)?;
            let doc = e.document()
                .ok_or_else(|| RepoError::constraint(format!("Object {} is not a document", id)))?;
            doc.content.clone()
                .ok_or_else(|| RepoError::not_found(format!("Document {} has no content stream", id)))
        })
    }

    pub fn calculate_allowable_actions(&self, id: &str) -> RepoResult<AllowableActions> {
        let types = self.types.read();
        let state = self.state.read();
        let e = state.get(id)?;
        let t = types.definition(&e.type_id)
            .ok_or_else(|| RepoError::not_found(format!("Type {} does not exist", e.type_id)))?;
        let st = actions::ActionState {
            has_content: e.document().map(|d| d.content.is_some()).unwrap_or(false),
            series_checked_out: state.is_checked_out(e),
        };
        Ok(actions::calculate(&self.config.capabilities, t, st))
    }

    // ---- query ----

    pub fn query(&self, statement: &str) -> RepoResult<QueryResults<'_>> {
        self.query_with(statement, &QueryOptions::default())
    }

    pub fn query_with(&self, statement: &str, options: &QueryOptions) -> RepoResult<QueryResults<'_>> {
        if options.search_all_versions && !self.config.capabilities.all_versions_searchable {
            return Err(RepoError::invalid("searching all versions is not supported by this repository"));
        }
        let types = self.types.read();
        let query = crate::query::parse(statement, &types)?;
        exec::execute(&query, &types, self.sync.index(), self, options)
    }

    // ---- index ----

    pub fn search_index(&self) -> &dyn SearchIndex { self.sync.index() }

    /// Index failures recorded since the last repair, oldest first.
    pub fn index_failures(&self) -> Vec<IndexFailure> { self.sync.failures() }

    /// Resubmits every stored object and retries retractions that failed before.
    /// Returns the number of objects submitted.
    pub fn reindex_all(&self) -> usize {
        let _all = self.locks.lock_all();
        let failed_removals: Vec<String> = self.sync.failures().into_iter()
            .filter(|f| f.operation == "removed")
            .map(|f| f.object_id)
            .collect();
        self.sync.clear_failures();
        let (docs, stale) = {
            let types = self.types.read();
            let state = self.state.read();
            let docs: Vec<(String, IndexDocument)> = state.objects.values()
                .map(|e| (e.id.clone(), index_document(&self.sync, &state, &types, e)))
                .collect();
            let stale: Vec<String> = failed_removals.into_iter().filter(|id| !state.objects.contains_key(id)).collect();
            (docs, stale)
        };
        for id in &stale { self.sync.removed(id); }
        let n = docs.len();
        for (id, doc) in docs { self.sync.updated(&id, doc); }
        info!(target: "folio::index", "reindexed {} objects, retried {} removals", n, stale.len());
        n
    }
}

impl ObjectResolver for Repository {
    fn path_of(&self, id: &str) -> Option<String> { self.state.read().path_of(id) }

    fn resolve_folder(&self, id_or_path: &str) -> RepoResult<String> {
        self.read(|st| {
            let e = st.resolve_ref(id_or_path)?;
            if !e.is_folder() {
                return Err(RepoError::invalid(format!("Object {} is not a folder", id_or_path)));
            }
            Ok(e.id.clone())
        })
    }

    fn resolve_object(&self, id_or_path: &str) -> RepoResult<String> {
        self.read(|st| Ok(st.resolve_ref(id_or_path)?.id.clone()))
    }

    fn descendant_ids(&self, folder: &str) -> RepoResult<BTreeSet<String>> {
        let id = self.resolve_folder(folder)?;
        let ids = self.state.read().descendants_of(&id);
        debug!(target: "folio::store", "{} descendants under {}", ids.len(), id);
        Ok(ids.into_iter().collect())
    }

    fn property_value(&self, id: &str, property: &str) -> Option<Value> {
        let state = self.state.read();
        let e = state.objects.get(id)?;
        state.property_of(e, property)
    }

    fn properties(&self, id: &str) -> Option<BTreeMap<String, Value>> {
        let state = self.state.read();
        state.objects.get(id).map(|e| state.effective_properties(e))
    }
}
