use serde::{Deserialize, Serialize};

use crate::error::{RepoError, RepoResult};
use super::entry::{EntryKind, ObjectData, StoreState};
use super::{Repository, ROOT_FOLDER_ID};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChildrenPage {
    pub objects: Vec<ObjectData>,
    pub has_more_items: bool,
    /// Children in the folder before paging
    pub num_items: usize,
}

/// An object in a folder listing together with the listing of its own children.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectContainer {
    pub object: ObjectData,
    pub children: Vec<ObjectContainer>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipDirection {
    #[default]
    Source,
    Target,
    Either,
}

fn containers(st: &StoreState, folder: &str, depth: Option<usize>, folders_only: bool) -> Vec<ObjectContainer> {
    let Some(children) = st.objects.get(folder).and_then(|f| f.children()) else { return Vec::new() };
    children.iter()
        .filter_map(|c| st.objects.get(c))
        .filter(|c| !folders_only || c.is_folder())
        .map(|c| {
            let below = match depth {
                Some(1) => Vec::new(),
                _ if c.is_folder() => containers(st, &c.id, depth.map(|d| d - 1), folders_only),
                _ => Vec::new(),
            };
            ObjectContainer { object: st.snapshot(c), children: below }
        })
        .collect()
}

impl Repository {
    /// Direct children in insertion order.
    pub fn get_children(&self, folder: &str, skip: usize, max_items: Option<usize>) -> RepoResult<ChildrenPage> {
        self.read(|st| {
            let f = st.folder(folder)?;
            let children = f.children().map(|c| c.as_slice()).unwrap_or_default();
            let num_items = children.len();
            let take = max_items.unwrap_or(usize::MAX);
            let objects: Vec<ObjectData> = children.iter()
                .skip(skip)
                .take(take)
                .filter_map(|c| st.objects.get(c))
                .map(|c| st.snapshot(c))
                .collect();
            let has_more_items = skip.saturating_add(objects.len()) < num_items;
            Ok(ChildrenPage { objects, has_more_items, num_items })
        })
    }

    /// Every object below `folder`. `depth` of `None` means unlimited.
    pub fn get_descendants(&self, folder: &str, depth: Option<usize>) -> RepoResult<Vec<ObjectContainer>> {
        if !self.config.capabilities.get_descendants {
            return Err(RepoError::constraint("getDescendants is not supported"));
        }
        self.tree(folder, depth, false)
    }

    /// Like [`Repository::get_descendants`] but folders only.
    pub fn get_folder_tree(&self, folder: &str, depth: Option<usize>) -> RepoResult<Vec<ObjectContainer>> {
        if !self.config.capabilities.get_folder_tree {
            return Err(RepoError::constraint("getFolderTree is not supported"));
        }
        self.tree(folder, depth, true)
    }

    fn tree(&self, folder: &str, depth: Option<usize>, folders_only: bool) -> RepoResult<Vec<ObjectContainer>> {
        if depth == Some(0) {
            return Err(RepoError::invalid("depth must be at least 1"));
        }
        self.read(|st| {
            let f = st.folder(folder)?;
            Ok(containers(st, &f.id, depth, folders_only))
        })
    }

    pub fn get_folder_parent(&self, folder: &str) -> RepoResult<ObjectData> {
        self.read(|st| {
            let f = st.folder(folder)?;
            if f.id == ROOT_FOLDER_ID {
                return Err(RepoError::invalid("Root folder has no parent"));
            }
            let parent = f.parents.first()
                .ok_or_else(|| RepoError::not_found(format!("Folder {} has no parent", folder)))?;
            Ok(st.snapshot(st.get(parent)?))
        })
    }

    /// Folders the object is filed in; empty for unfiled objects.
    pub fn get_object_parents(&self, id: &str) -> RepoResult<Vec<ObjectData>> {
        self.read(|st| {
            let e = st.get(id)?;
            if matches!(e.kind, EntryKind::Relationship { .. }) {
                return Err(RepoError::constraint(format!("Object {} is not fileable", id)));
            }
            Ok(e.parents.iter().filter_map(|p| st.objects.get(p)).map(|p| st.snapshot(p)).collect())
        })
    }

    /// Relationships attached to `id`, optionally restricted to a relationship type and its subtypes.
    pub fn get_object_relationships(&self, id: &str, direction: RelationshipDirection, type_id: Option<&str>) -> RepoResult<Vec<ObjectData>> {
        let types = self.types.read();
        if let Some(t) = type_id {
            types.definition(t).ok_or_else(|| RepoError::not_found(format!("Type {} does not exist", t)))?;
        }
        let st = self.state.read();
        st.get(id)?;
        let mut out: Vec<ObjectData> = st.objects.values()
            .filter(|o| match &o.kind {
                EntryKind::Relationship { source, target } => match direction {
                    RelationshipDirection::Source => source == id,
                    RelationshipDirection::Target => target == id,
                    RelationshipDirection::Either => source == id || target == id,
                },
                _ => false,
            })
            .filter(|o| type_id.map(|t| types.is_subtype_of(&o.type_id, t)).unwrap_or(true))
            .map(|o| st.snapshot(o))
            .collect();
        out.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(out)
    }
}
