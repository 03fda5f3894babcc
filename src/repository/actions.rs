use serde::{Deserialize, Serialize};

use crate::config::{Capabilities, RenditionCapability};
use crate::types::{BaseType, ContentStreamAllowed, TypeDefinition};

/// Operations a caller may attempt on one object.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllowableActions {
    pub can_get_properties: bool,
    pub can_update_properties: bool,
    pub can_delete_object: bool,
    pub can_apply_acl: bool,
    pub can_get_acl: bool,
    pub can_apply_policy: bool,
    pub can_get_applied_policies: bool,
    pub can_remove_policy: bool,
    pub can_get_object_parents: bool,
    pub can_move_object: bool,
    pub can_add_object_to_folder: bool,
    pub can_remove_object_from_folder: bool,
    pub can_get_descendants: bool,
    pub can_get_folder_tree: bool,
    pub can_create_document: bool,
    pub can_create_folder: bool,
    pub can_delete_tree: bool,
    pub can_get_children: bool,
    pub can_get_folder_parent: bool,
    pub can_get_content_stream: bool,
    pub can_set_content_stream: bool,
    pub can_delete_content_stream: bool,
    pub can_get_all_versions: bool,
    pub can_get_renditions: bool,
    pub can_check_in: bool,
    pub can_cancel_check_out: bool,
    pub can_check_out: bool,
    pub can_get_object_relationships: bool,
    pub can_create_relationship: bool,
}

/// Object state the action matrix depends on.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct ActionState {
    pub has_content: bool,
    pub series_checked_out: bool,
}

pub(crate) fn calculate(caps: &Capabilities, t: &TypeDefinition, st: ActionState) -> AllowableActions {
    let folder = t.base == BaseType::Folder;
    let document = t.base == BaseType::Document;
    let checked_out = document && t.versionable && st.series_checked_out;
    AllowableActions {
        can_get_properties: true,
        can_update_properties: true,
        can_delete_object: true,
        can_apply_acl: t.controllable_acl,
        can_get_acl: t.controllable_acl,
        can_apply_policy: t.controllable_policy,
        can_get_applied_policies: t.controllable_policy,
        can_remove_policy: t.controllable_policy,
        can_get_object_parents: t.fileable,
        can_move_object: t.fileable,
        can_add_object_to_folder: caps.multifiling && t.fileable && !folder,
        can_remove_object_from_folder: caps.unfiling && t.fileable && !folder,
        can_get_descendants: caps.get_descendants && folder,
        can_get_folder_tree: caps.get_folder_tree && folder,
        can_create_document: folder,
        can_create_folder: folder,
        can_delete_tree: folder,
        can_get_children: folder,
        can_get_folder_parent: folder,
        can_get_content_stream: document && st.has_content,
        can_set_content_stream: document && t.content_stream_allowed != ContentStreamAllowed::NotAllowed,
        can_delete_content_stream: document && t.content_stream_allowed != ContentStreamAllowed::Required,
        can_get_all_versions: document,
        can_get_renditions: caps.renditions == RenditionCapability::Read,
        can_check_in: checked_out,
        can_cancel_check_out: checked_out,
        can_check_out: !checked_out,
        can_get_object_relationships: t.base != BaseType::Relationship,
        can_create_relationship: t.base != BaseType::Relationship,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn root(base: BaseType) -> TypeDefinition { TypeDefinition::root(base) }

    #[test]
    fn folder_matrix() {
        let a = calculate(&Capabilities::default(), &root(BaseType::Folder), ActionState::default());
        assert!(a.can_get_children && a.can_create_document && a.can_delete_tree && a.can_get_folder_tree);
        assert!(!a.can_add_object_to_folder);
        assert!(!a.can_remove_object_from_folder);
        assert!(!a.can_get_content_stream);
        assert!(a.can_check_out);
    }

    #[test]
    fn document_matrix_follows_state() {
        let caps = Capabilities { multifiling: false, ..Capabilities::default() };
        let t = root(BaseType::Document);
        let a = calculate(&caps, &t, ActionState { has_content: true, series_checked_out: true });
        assert!(a.can_get_content_stream);
        assert!(a.can_check_in && a.can_cancel_check_out && !a.can_check_out);
        assert!(!a.can_add_object_to_folder);
        assert!(a.can_remove_object_from_folder);
        assert!(!a.can_get_children);
        assert!(!a.can_get_renditions);

        let plain = t.clone().versionable(false);
        let a = calculate(&caps, &plain, ActionState { has_content: false, series_checked_out: true });
        assert!(!a.can_check_in && a.can_check_out);
        assert!(!a.can_get_content_stream);
    }

    #[test]
    fn relationship_matrix() {
        let caps = Capabilities { renditions: RenditionCapability::Read, ..Capabilities::default() };
        let a = calculate(&caps, &root(BaseType::Relationship), ActionState::default());
        assert!(!a.can_get_object_relationships && !a.can_create_relationship);
        assert!(!a.can_apply_policy && !a.can_move_object);
        assert!(a.can_get_renditions);
    }
}
