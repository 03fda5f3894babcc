use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use chrono::{TimeZone, Utc};
use proptest::prelude::*;

use folio::config::RepositoryConfig;
use folio::repository::{UnfileObject, VersioningState};
use folio::types::{BaseType, PropertyDefinition, PropertyKind, TypeDefinition};
use folio::value::Value;
use folio::{Repository, ROOT_FOLDER_ID};

fn folder(repo: &Repository, parent: &str, name: &str) -> String {
    let mut f = repo.create_folder(parent, "cmis:folder").expect("folder draft");
    f.set_name(name).expect("name");
    repo.save_object(f).expect("save folder")
}

fn document(repo: &Repository, parent: &str, name: &str) -> String {
    let mut d = repo.create_document(Some(parent), "cmis:document", VersioningState::Major).expect("document draft");
    d.set_name(name).expect("name");
    repo.save_object(d).expect("save document")
}

#[test]
fn delete_tree_removes_folder_and_contents() {
    let repo = Repository::default();
    let top = folder(&repo, ROOT_FOLDER_ID, "top");
    let sub = folder(&repo, &top, "sub");
    let d1 = document(&repo, &top, "one");
    let d2 = document(&repo, &sub, "two");

    let outcome = repo.delete_tree(&top, true, UnfileObject::Delete, true).expect("delete tree");
    assert!(outcome.is_success());
    for id in [&top, &sub, &d1, &d2] {
        assert_eq!(repo.get_object(id).unwrap_err().code_str(), "not_found");
    }
    assert!(repo.get_children(ROOT_FOLDER_ID, 0, None).expect("children").objects.is_empty());
    assert_eq!(repo.query("SELECT * FROM cmis:document").expect("query").count(), 0);

    let err = repo.delete_tree(ROOT_FOLDER_ID, true, UnfileObject::Delete, true).unwrap_err();
    assert_eq!(err.code_str(), "constraint_violation");
    assert_eq!(repo.delete_tree("missing", true, UnfileObject::Delete, true).unwrap_err().code_str(), "not_found");
}

#[test]
fn moved_objects_are_visible_at_the_new_path() {
    let repo = Repository::default();
    let a = folder(&repo, ROOT_FOLDER_ID, "a");
    let b = folder(&repo, ROOT_FOLDER_ID, "b");
    let d = document(&repo, &a, "report");

    let moved = repo.move_object(&d, &b, &a).expect("move");
    assert_eq!(moved.parent_ids, vec![b.clone()]);
    assert_eq!(repo.get_object_by_path("/b/report").expect("new path").id, d);
    assert_eq!(repo.get_object_by_path("/a/report").unwrap_err().code_str(), "not_found");

    let in_b: Vec<String> = repo.query(&format!("SELECT * FROM cmis:document WHERE IN_FOLDER('{}')", b))
        .expect("query")
        .map(|r| r.object_id)
        .collect();
    assert_eq!(in_b, vec![d.clone()]);
    assert_eq!(repo.query(&format!("SELECT * FROM cmis:document WHERE IN_FOLDER('{}')", a)).expect("query").count(), 0);

    // folders cannot be moved below themselves
    let inner = folder(&repo, &a, "inner");
    assert_eq!(repo.move_object(&a, &inner, ROOT_FOLDER_ID).unwrap_err().code_str(), "constraint_violation");
}

#[test]
fn readers_never_see_a_half_applied_move() {
    let repo = Arc::new(Repository::default());
    let a = folder(&repo, ROOT_FOLDER_ID, "a");
    let b = folder(&repo, ROOT_FOLDER_ID, "b");
    let d = document(&repo, &a, "report");
    let done = Arc::new(AtomicBool::new(false));

    let mover = {
        let (repo, done, a, b, d) = (repo.clone(), done.clone(), a.clone(), b.clone(), d.clone());
        thread::spawn(move || -> anyhow::Result<()> {
            for _ in 0..500 {
                repo.move_object(&d, &b, &a)?;
                repo.move_object(&d, &a, &b)?;
            }
            done.store(true, Ordering::SeqCst);
            Ok(())
        })
    };

    let mut reads = 0usize;
    while !done.load(Ordering::SeqCst) || reads == 0 {
        let parents = repo.get_object_parents(&d).expect("parents");
        assert_eq!(parents.len(), 1);
        assert!(parents[0].id == a || parents[0].id == b);
        let o = repo.get_object(&d).expect("object");
        assert_eq!(o.parent_ids.len(), 1);
        let path = repo.get_object_path(&d).expect("path").expect("filed");
        assert!(path == "/a/report" || path == "/b/report", "unexpected path {}", path);
        reads += 1;
    }
    mover.join().expect("mover thread").expect("moves");
    assert_eq!(repo.get_object_parents(&d).expect("parents")[0].id, a);
}

#[test]
fn remove_type_races_object_creation_cleanly() -> anyhow::Result<()> {
    let repo = Arc::new(Repository::default());
    repo.add_type(TypeDefinition::new("test:memo", BaseType::Document, "cmis:document"))?;

    let writer = {
        let repo = repo.clone();
        thread::spawn(move || -> (Vec<String>, Option<&'static str>) {
            let mut saved = Vec::new();
            for i in 0..500 {
                let attempt = repo.create_document(Some(ROOT_FOLDER_ID), "test:memo", VersioningState::Major)
                    .and_then(|mut d| { d.set_name(&format!("memo-{}", i))?; repo.save_object(d) });
                match attempt {
                    Ok(id) => {
                        if let Err(e) = repo.delete_object(&id, true) { return (saved, Some(e.code_str())); }
                        saved.push(id);
                    }
                    Err(e) => return (saved, Some(e.code_str())),
                }
            }
            (saved, None)
        })
    };

    loop {
        match repo.remove_type("test:memo") {
            Ok(()) => break,
            Err(e) => {
                assert_eq!(e.code_str(), "constraint_violation");
                thread::yield_now();
            }
        }
    }
    let (saved, stopped_by) = writer.join().expect("writer thread");
    if let Some(code) = stopped_by {
        assert_eq!(code, "not_found");
    }
    assert_eq!(repo.get_type("test:memo", false).unwrap_err().code_str(), "not_found");
    for id in &saved {
        assert_eq!(repo.get_object(id).unwrap_err().code_str(), "not_found");
    }
    assert_eq!(repo.query("SELECT * FROM cmis:document")?.count(), 0);
    Ok(())
}

#[test]
fn typed_values_survive_save_and_get() {
    let repo = Repository::default();
    repo.add_type(
        TypeDefinition::new("test:record", BaseType::Document, "cmis:document")
            .with_property(PropertyDefinition::new("test:tags", PropertyKind::string()).multi())
            .with_property(PropertyDefinition::new("test:ratio", PropertyKind::decimal()))
            .with_property(PropertyDefinition::new("test:count", PropertyKind::integer()))
            .with_property(PropertyDefinition::new("test:flag", PropertyKind::Boolean))
            .with_property(PropertyDefinition::new("test:when", PropertyKind::DateTime)),
    ).expect("add type");
    let when = Utc.with_ymd_and_hms(1969, 7, 20, 20, 17, 40).single().expect("valid date");
    let tags = Value::String(vec!["lunar".into(), "eva".into(), "lunar".into()]);

    let mut d = repo.create_document(Some(ROOT_FOLDER_ID), "test:record", VersioningState::Major).expect("draft");
    d.set_name("record").expect("name");
    d.set_property("test:tags", tags.clone()).expect("tags");
    d.set_property("test:ratio", Value::decimal(0.25)).expect("ratio");
    d.set_property("test:count", Value::integer(-7)).expect("count");
    d.set_property("test:flag", Value::boolean(true)).expect("flag");
    d.set_property("test:when", Value::datetime(when)).expect("when");
    let id = repo.save_object(d).expect("save");

    let o = repo.get_object(&id).expect("get");
    assert_eq!(o.property("test:tags"), Some(&tags));
    assert_eq!(o.property("test:ratio"), Some(&Value::decimal(0.25)));
    assert_eq!(o.property("test:count"), Some(&Value::integer(-7)));
    assert_eq!(o.property("test:flag"), Some(&Value::boolean(true)));
    assert_eq!(o.property("test:when"), Some(&Value::datetime(when)));

    let mut d = repo.create_document(Some(ROOT_FOLDER_ID), "test:record", VersioningState::Major).expect("draft");
    assert_eq!(d.set_property("test:count", Value::string("seven")).unwrap_err().code_str(), "invalid_argument");
    assert_eq!(d.set_property("test:count", Value::Integer(vec![1, 2])).unwrap_err().code_str(), "invalid_argument");
}

#[test]
fn types_can_be_added_and_removed() -> anyhow::Result<()> {
    let repo = Repository::default();
    repo.add_type(TypeDefinition::new("test:memo", BaseType::Document, "cmis:document"))?;
    assert_eq!(repo.add_type(TypeDefinition::new("test:memo", BaseType::Document, "cmis:document")).unwrap_err().code_str(), "invalid_argument");
    let children: Vec<String> = repo.get_type_children(Some("cmis:document"), false)?
        .into_iter().map(|t| t.id).collect();
    assert_eq!(children, vec!["test:memo".to_string()]);

    let mut d = repo.create_document(Some(ROOT_FOLDER_ID), "test:memo", VersioningState::Major)?;
    d.set_name("memo")?;
    let id = repo.save_object(d)?;
    assert_eq!(repo.remove_type("test:memo").unwrap_err().code_str(), "constraint_violation");

    repo.delete_object(&id, true)?;
    repo.remove_type("test:memo")?;
    assert_eq!(repo.get_type("test:memo", false).unwrap_err().code_str(), "not_found");
    assert_eq!(repo.remove_type("cmis:folder").unwrap_err().code_str(), "constraint_violation");
    Ok(())
}

#[test]
fn config_file_drives_capabilities() -> anyhow::Result<()> {
    let mut f = tempfile::NamedTempFile::new()?;
    write!(f, r#"{{"repository_id":"archive","capabilities":{{"unfiling":false}}}}"#)?;
    let cfg = RepositoryConfig::load_or_default(Some(f.path()))?;
    assert_eq!(cfg.repository_id, "archive");

    let repo = Repository::new(cfg);
    assert_eq!(repo.get_repository_info().repository_id, "archive");
    let err = repo.create_document(None, "cmis:document", VersioningState::Major).unwrap_err();
    assert_eq!(err.code_str(), "constraint_violation");
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn path_lookup_inverts_get_path(names in prop::collection::vec("[A-Za-z0-9 ._-]{1,12}", 1..5)) {
        let repo = Repository::default();
        let mut parent = ROOT_FOLDER_ID.to_string();
        for n in &names {
            parent = folder(&repo, &parent, n);
        }
        let path = repo.get_object_path(&parent).expect("path").expect("filed");
        prop_assert_eq!(path.clone(), format!("/{}", names.join("/")));
        prop_assert_eq!(repo.get_object_by_path(&path).expect("lookup").id, parent);
    }
}
