use super::*;
use crate::types::{props, PropertyDefinition, PropertyKind};
use crate::value::Value;

fn article() -> TypeDefinition {
    TypeDefinition::new("test:article", BaseType::Document, "cmis:document")
        .with_property(PropertyDefinition::new("test:author", PropertyKind::string()))
        .with_property(PropertyDefinition::new("test:pages", PropertyKind::integer()))
}

#[test]
fn base_types_are_seeded() {
    let reg = TypeRegistry::new();
    let roots = reg.get_type_children(None, false).unwrap();
    let ids: Vec<&str> = roots.iter().map(|t| t.id.as_str()).collect();
    assert_eq!(ids, vec!["cmis:document", "cmis:folder", "cmis:policy", "cmis:relationship"]);
    assert!(roots.iter().all(|t| t.property_definitions.is_empty()));
    let folder = reg.get_type("cmis:folder", true).unwrap();
    assert!(folder.property(props::PARENT_ID).is_some());
    assert!(folder.parent_id.is_none());
}

#[test]
fn effective_properties_union_supertype_chain() {
    let mut reg = TypeRegistry::new();
    reg.add_type(article()).unwrap();
    let sub = TypeDefinition::new("test:review", BaseType::Document, "test:article")
        .with_property(PropertyDefinition::new("test:rating", PropertyKind::integer()));
    reg.add_type(sub).unwrap();

    let t = reg.get_type("test:review", true).unwrap();
    let doc = reg.get_type("cmis:document", true).unwrap();
    assert_eq!(t.property_definitions.len(), doc.property_definitions.len() + 3);
    assert!(t.property("test:author").unwrap().inherited);
    assert!(t.property(props::NAME).unwrap().inherited);
    assert!(!t.property("test:rating").unwrap().inherited);
}

#[test]
fn add_type_rejections() {
    let mut reg = TypeRegistry::new();
    reg.add_type(article()).unwrap();

    let dup = reg.add_type(article()).unwrap_err();
    assert_eq!(dup.code_str(), "invalid_argument");

    let mut orphan = TypeDefinition::new("test:orphan", BaseType::Document, "cmis:document");
    orphan.parent_id = None;
    assert!(reg.add_type(orphan).unwrap_err().message().contains("Unable add root type"));

    let missing = TypeDefinition::new("test:x", BaseType::Document, "test:nope");
    assert_eq!(reg.add_type(missing).unwrap_err().code_str(), "invalid_argument");

    let clash = TypeDefinition::new("test:y", BaseType::Document, "test:article")
        .with_property(PropertyDefinition::new("test:author", PropertyKind::string()));
    assert!(reg.add_type(clash).unwrap_err().message().contains("already defined"));

    let wrong_base = TypeDefinition::new("test:z", BaseType::Folder, "test:article");
    assert_eq!(reg.add_type(wrong_base).unwrap_err().code_str(), "invalid_argument");

    // failed registrations leave no trace
    assert_eq!(reg.get_type_children(Some("test:article"), false).unwrap().len(), 0);
}

#[test]
fn returned_definitions_are_copies() {
    let mut reg = TypeRegistry::new();
    reg.add_type(article()).unwrap();
    let mut copy = reg.get_type("test:article", true).unwrap();
    copy.property_definitions.clear();
    copy.display_name = "changed".into();
    let again = reg.get_type("test:article", true).unwrap();
    assert!(again.property("test:author").is_some());
    assert_eq!(again.display_name, "test:article");
    assert!(reg.get_type("test:article", false).unwrap().property_definitions.is_empty());
}

#[test]
fn remove_type_rules() {
    let mut reg = TypeRegistry::new();
    reg.add_type(article()).unwrap();
    reg.add_type(TypeDefinition::new("test:review", BaseType::Document, "test:article")).unwrap();

    assert_eq!(reg.remove_type("nope", |_| false).unwrap_err().code_str(), "not_found");
    assert_eq!(reg.remove_type("cmis:document", |_| false).unwrap_err().code_str(), "constraint_violation");
    assert_eq!(reg.remove_type("test:article", |_| false).unwrap_err().code_str(), "constraint_violation");
    assert_eq!(reg.remove_type("test:review", |_| true).unwrap_err().code_str(), "constraint_violation");

    reg.remove_type("test:review", |_| false).unwrap();
    assert!(reg.get_type_children(Some("test:article"), false).unwrap().is_empty());
    reg.remove_type("test:article", |_| false).unwrap();
    assert_eq!(reg.get_type("test:article", false).unwrap_err().code_str(), "not_found");
    // id and query name are free again
    reg.add_type(article()).unwrap();
}

#[test]
fn descendants_respect_depth() {
    let mut reg = TypeRegistry::new();
    reg.add_type(article()).unwrap();
    reg.add_type(TypeDefinition::new("test:review", BaseType::Document, "test:article")).unwrap();

    let one = reg.get_type_descendants(Some("cmis:document"), Some(1), false).unwrap();
    assert_eq!(one.len(), 1);
    assert!(one[0].children.is_empty());
    let all = reg.get_type_descendants(Some("cmis:document"), None, false).unwrap();
    assert_eq!(all[0].children[0].type_def.id, "test:review");
    assert!(reg.get_type_descendants(None, Some(0), false).is_err());
    assert_eq!(reg.get_type_descendants(None, Some(1), false).unwrap().len(), 4);
}

#[test]
fn query_type_ids_skip_excluded_subtrees() {
    let mut reg = TypeRegistry::new();
    reg.add_type(article()).unwrap();
    reg.add_type(TypeDefinition::new("test:hidden", BaseType::Document, "test:article").included_in_supertype_query(false)).unwrap();
    reg.add_type(TypeDefinition::new("test:under_hidden", BaseType::Document, "test:hidden")).unwrap();
    reg.add_type(TypeDefinition::new("test:review", BaseType::Document, "test:article")).unwrap();

    assert_eq!(reg.query_type_ids("test:article"), vec!["test:article".to_string(), "test:review".to_string()]);
    assert!(reg.is_subtype_of("test:under_hidden", "cmis:document"));
    assert!(!reg.is_subtype_of("cmis:folder", "cmis:document"));
}

#[test]
fn decimal_precision_is_validated_and_enforced() {
    let mut reg = TypeRegistry::new();
    let odd = TypeDefinition::new("test:odd", BaseType::Document, "cmis:document")
        .with_property(PropertyDefinition::new("test:ratio", PropertyKind::decimal_with_precision(16)));
    assert_eq!(reg.add_type(odd).unwrap_err().code_str(), "invalid_argument");

    let narrow = PropertyKind::decimal_with_precision(32);
    assert!(narrow.check_bounds(&Value::decimal(0.1)).is_ok());
    assert!(narrow.check_bounds(&Value::decimal(3.0e38)).is_ok());
    assert!(narrow.check_bounds(&Value::decimal(1.0e39)).is_err());
    assert!(PropertyKind::decimal_with_precision(64).check_bounds(&Value::decimal(1.0e39)).is_ok());
}
