use notegraph_core::db::open_db;
use notegraph_core::repo::{AtomicStore, LinkGraphStore, NoteStore, TagMembershipStore, TagRegistry};
use notegraph_core::{
    IndexCoordinator, IndexStatus, NewNote, NoteServiceError, NotePatch, RepoError,
    SqliteIndexStore,
};
use rusqlite::Connection;

#[test]
fn failed_reconcile_keeps_note_write_and_rolls_back_derived_rows() {
    let mut index = IndexCoordinator::new(SqliteIndexStore::open_in_memory().unwrap());
    let note = index
        .create_note(NewNote::new("Plain", ""))
        .unwrap()
        .value;

    index
        .store()
        .connection()
        .execute_batch("DROP TABLE links;")
        .unwrap();

    let saved = index
        .update_note(note.id, NotePatch::content("#fresh [[Plain]]"))
        .unwrap();
    let failure = match &saved.index {
        IndexStatus::Failed(failure) => failure,
        other => panic!("expected indexing failure, got {other:?}"),
    };
    assert_eq!(failure.note_id, note.id);
    assert!(matches!(failure.source, RepoError::Db(_)));

    let stored = index.get_note(note.id).unwrap().unwrap();
    assert_eq!(stored.content, "#fresh [[Plain]]");
    assert!(index.store().note_tags(note.id).unwrap().is_empty());
    assert!(index.store().find_tag_by_name("fresh").unwrap().is_none());
    assert!(index.store().connection().is_autocommit());
}

#[test]
fn failed_delete_cleanup_leaves_note_live_and_indexed() {
    let mut index = IndexCoordinator::new(SqliteIndexStore::open_in_memory().unwrap());
    let target = index.create_note(NewNote::new("Target", "")).unwrap().value;
    let note = index
        .create_note(NewNote::new("Source", "#keep [[Target]]"))
        .unwrap()
        .value;

    index
        .store()
        .connection()
        .execute_batch(
            "CREATE TRIGGER block_tag_cleanup BEFORE DELETE ON note_tags
             BEGIN SELECT RAISE(ABORT, 'tag cleanup blocked'); END;",
        )
        .unwrap();

    let err = index.delete_note(note.id).unwrap_err();
    assert!(matches!(err, NoteServiceError::Repo(RepoError::Db(_))));
    assert!(index.store().connection().is_autocommit());
    assert!(index.get_note(note.id).unwrap().is_some());
    assert_eq!(index.store().note_tags(note.id).unwrap().len(), 1);
    assert_eq!(index.store().outgoing_targets(note.id).unwrap(), vec![target.id]);

    index
        .store()
        .connection()
        .execute_batch("DROP TRIGGER block_tag_cleanup;")
        .unwrap();

    let deleted = index.delete_note(note.id).unwrap();
    assert!(deleted.value);
    assert!(matches!(
        deleted.index,
        IndexStatus::Cleared {
            memberships: 1,
            edges: 1
        }
    ));
    let usages = index.tags().get_all().unwrap();
    assert_eq!(usages.len(), 1);
    assert_eq!(usages[0].note_count, 0);
    assert!(index.store().all_edges().unwrap().is_empty());
}

#[test]
fn nested_unit_failure_rolls_back_to_savepoint() {
    let mut store = SqliteIndexStore::open_in_memory().unwrap();

    store
        .atomic(|store| {
            store.get_or_create_tag("kept")?;
            let inner: Result<(), RepoError> = store.atomic(|store| {
                store.get_or_create_tag("dropped")?;
                Err(RepoError::InvalidData("inner".to_string()))
            });
            assert!(inner.is_err());
            Ok(())
        })
        .unwrap();

    assert!(store.find_tag_by_name("kept").unwrap().is_some());
    assert!(store.find_tag_by_name("dropped").unwrap().is_none());
    assert!(store.connection().is_autocommit());
}

#[test]
fn index_survives_reopen_and_clock_continues() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("notegraph.db");

    let (target_id, source_id, last_created) = {
        let mut index = IndexCoordinator::new(SqliteIndexStore::open(&path).unwrap());
        let target = index.create_note(NewNote::new("Target", "#kept")).unwrap().value;
        let source = index
            .create_note(NewNote::new("Source", "[[Target]]"))
            .unwrap()
            .value;
        (target.id, source.id, source.created_at)
    };

    let mut index = IndexCoordinator::new(SqliteIndexStore::open(&path).unwrap());
    let backlinks = index.queries().get_backlinks(target_id).unwrap();
    assert_eq!(backlinks.len(), 1);
    assert_eq!(backlinks[0].id, source_id);
    assert_eq!(index.queries().get_note_tags(target_id).unwrap()[0].name, "kept");

    let later = index.create_note(NewNote::new("Later", "")).unwrap().value;
    assert!(later.created_at > last_created);

    assert_eq!(index.reindex_all().unwrap(), 2);
    assert_eq!(index.store().all_edges().unwrap().len(), 1);
}

#[test]
fn store_rejects_unmigrated_connection() {
    let conn = Connection::open_in_memory().unwrap();
    let err = SqliteIndexStore::try_new(conn)
        .err()
        .expect("schema check must fail");
    assert!(matches!(err, RepoError::InvalidData(_)));
}

#[test]
fn store_wraps_existing_migrated_connection() {
    let dir = tempfile::tempdir().unwrap();
    let conn = open_db(dir.path().join("wrapped.db")).unwrap();
    let mut store = SqliteIndexStore::try_new(conn).unwrap();

    let note = store.insert_note(&NewNote::new("Wrapped", "")).unwrap();
    assert_eq!(store.find_notes_by_title("Wrapped").unwrap(), vec![note.id]);

    let conn = store.into_connection();
    let count: i64 = conn
        .query_row("SELECT COUNT(*) FROM notes;", [], |row| row.get(0))
        .unwrap();
    assert_eq!(count, 1);
}
