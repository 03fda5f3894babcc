use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use folio::config::RepositoryConfig;
use folio::index::{ContentReaderRegistry, IndexDocument, IndexRow, InMemoryIndex, NativeQuery, SearchIndex};
use folio::repository::{ContentStream, VersioningState};
use folio::{RepoError, RepoResult, Repository, ROOT_FOLDER_ID};

/// Wraps the in-memory index and rejects writes while `down` is set.
#[derive(Default)]
struct FlakyIndex {
    inner: InMemoryIndex,
    down: AtomicBool,
}

impl FlakyIndex {
    fn check(&self) -> RepoResult<()> {
        if self.down.load(Ordering::SeqCst) { Err(RepoError::storage("index offline")) } else { Ok(()) }
    }
}

impl SearchIndex for FlakyIndex {
    fn index(&self, id: &str, document: IndexDocument) -> RepoResult<()> {
        self.check()?;
        self.inner.index(id, document)
    }

    fn retract(&self, id: &str) -> RepoResult<()> {
        self.check()?;
        self.inner.retract(id)
    }

    fn search(&self, query: &NativeQuery) -> RepoResult<Vec<IndexRow>> { self.inner.search(query) }
}

fn flaky_repo() -> (Repository, Arc<FlakyIndex>) {
    let index = Arc::new(FlakyIndex::default());
    let repo = Repository::with_index(RepositoryConfig::default(), index.clone(), ContentReaderRegistry::with_defaults());
    (repo, index)
}

fn save_text(repo: &Repository, name: &str, text: &str) -> String {
    let mut d = repo.create_document(Some(ROOT_FOLDER_ID), "cmis:document", VersioningState::Major).expect("draft");
    d.set_name(name).expect("name");
    d.set_content_stream(ContentStream::text(text)).expect("content");
    repo.save_object(d).expect("save")
}

fn contains(repo: &Repository, word: &str) -> usize {
    repo.query(&format!("SELECT * FROM cmis:document WHERE CONTAINS('{}')", word)).expect("query").count()
}

#[test]
fn store_mutations_survive_index_outage() {
    let (repo, index) = flaky_repo();
    save_text(&repo, "before", "telemetry nominal");

    index.down.store(true, Ordering::SeqCst);
    let id = save_text(&repo, "during", "splashdown confirmed");
    // the object is stored even though the index rejected it
    assert_eq!(repo.get_object(&id).expect("stored").name(), "during");
    assert_eq!(contains(&repo, "splashdown"), 0);

    let failures = repo.index_failures();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].object_id, id);
    assert_eq!(failures[0].operation, "created");
    assert!(failures[0].message.contains("index offline"));

    index.down.store(false, Ordering::SeqCst);
    let submitted = repo.reindex_all();
    assert_eq!(submitted, 3);
    assert!(repo.index_failures().is_empty());
    assert_eq!(contains(&repo, "splashdown"), 1);
    assert_eq!(contains(&repo, "telemetry"), 1);
}

#[test]
fn failed_retractions_are_retried() {
    let (repo, index) = flaky_repo();
    let id = save_text(&repo, "stale", "lunar module");

    index.down.store(true, Ordering::SeqCst);
    repo.delete_object(&id, true).expect("delete");
    assert_eq!(repo.get_object(&id).unwrap_err().code_str(), "not_found");
    assert_eq!(repo.index_failures().iter().filter(|f| f.operation == "removed").count(), 1);

    index.down.store(false, Ordering::SeqCst);
    repo.reindex_all();
    assert!(repo.index_failures().is_empty());
    assert!(!index.inner.contains(&id));
    assert_eq!(contains(&repo, "lunar"), 0);
}
