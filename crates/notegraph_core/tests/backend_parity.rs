//! Random edit sequences must leave both backends in the same derived state.

use notegraph_core::repo::{LinkGraphStore, TagMembershipStore, TagRegistry};
use notegraph_core::{
    IndexCoordinator, IndexStore, MemoryIndexStore, NewNote, NoteId, NotePatch,
    NoteServiceError, SqliteIndexStore,
};
use proptest::prelude::*;
use std::collections::BTreeSet;

const TITLES: [&str; 4] = ["Alpha", "Beta", "Gamma", "Delta"];
const TOKENS: [&str; 11] = [
    "#work",
    "#Work",
    "#idea",
    "#x-1",
    "[[Alpha]]",
    "[[Beta|b]]",
    "[[Gamma]]",
    "[[ Delta ]]",
    "[[Nowhere]]",
    "plain",
    "\n",
];

#[derive(Debug, Clone)]
enum Op {
    Create { title: usize, content: Vec<usize> },
    Edit { note: usize, content: Vec<usize> },
    Rename { note: usize, title: usize },
    Delete { note: usize },
    Restore { note: usize },
    Reindex,
}

/// Derived state keyed by creation order, so ids from different backends
/// compare equal.
#[derive(Debug, PartialEq, Eq)]
struct Snapshot {
    live: Vec<usize>,
    edges: BTreeSet<(usize, usize)>,
    memberships: BTreeSet<(usize, String)>,
    usages: Vec<(String, usize)>,
}

fn content_strategy() -> impl Strategy<Value = Vec<usize>> {
    prop::collection::vec(0..TOKENS.len(), 0..6)
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => (0..TITLES.len(), content_strategy())
            .prop_map(|(title, content)| Op::Create { title, content }),
        3 => (any::<usize>(), content_strategy())
            .prop_map(|(note, content)| Op::Edit { note, content }),
        1 => (any::<usize>(), 0..TITLES.len()).prop_map(|(note, title)| Op::Rename { note, title }),
        1 => any::<usize>().prop_map(|note| Op::Delete { note }),
        1 => any::<usize>().prop_map(|note| Op::Restore { note }),
        1 => Just(Op::Reindex),
    ]
}

fn render(tokens: &[usize]) -> String {
    tokens
        .iter()
        .map(|token| TOKENS[*token])
        .collect::<Vec<_>>()
        .join(" ")
}

fn pick(ids: &[NoteId], seed: usize) -> Option<NoteId> {
    if ids.is_empty() {
        None
    } else {
        Some(ids[seed % ids.len()])
    }
}

fn run<S: IndexStore>(store: S, ops: &[Op]) -> Snapshot {
    let mut index = IndexCoordinator::new(store);
    let mut ids: Vec<NoteId> = Vec::new();

    for op in ops {
        match op {
            Op::Create { title, content } => {
                let saved = index
                    .create_note(NewNote::new(TITLES[*title], render(content)))
                    .unwrap();
                assert!(saved.index.failure().is_none());
                ids.push(saved.value.id);
            }
            Op::Edit { note, content } => {
                if let Some(id) = pick(&ids, *note) {
                    match index.update_note(id, NotePatch::content(render(content))) {
                        Ok(saved) => assert!(saved.index.failure().is_none()),
                        Err(NoteServiceError::NoteNotFound(_)) => {}
                        Err(other) => panic!("unexpected error: {other}"),
                    }
                }
            }
            Op::Rename { note, title } => {
                if let Some(id) = pick(&ids, *note) {
                    match index.update_note(id, NotePatch::title(TITLES[*title])) {
                        Ok(_) | Err(NoteServiceError::NoteNotFound(_)) => {}
                        Err(other) => panic!("unexpected error: {other}"),
                    }
                }
            }
            Op::Delete { note } => {
                if let Some(id) = pick(&ids, *note) {
                    index.delete_note(id).unwrap();
                }
            }
            Op::Restore { note } => {
                if let Some(id) = pick(&ids, *note) {
                    index.restore_note(id).unwrap();
                }
            }
            Op::Reindex => {
                index.reindex_all().unwrap();
            }
        }
    }

    let position = |id: NoteId| {
        ids.iter()
            .position(|known| *known == id)
            .expect("every stored id was created by this run")
    };

    let mut live: Vec<usize> = index
        .list_notes(None)
        .unwrap()
        .into_iter()
        .map(|note| position(note.id))
        .collect();
    live.sort_unstable();

    let store = index.store();
    let edges = store
        .all_edges()
        .unwrap()
        .into_iter()
        .map(|edge| (position(edge.source_id), position(edge.target_id)))
        .collect();
    let memberships = ids
        .iter()
        .enumerate()
        .flat_map(|(pos, id)| {
            store
                .note_tags(*id)
                .unwrap()
                .into_iter()
                .map(move |tag| (pos, tag.name))
        })
        .collect();
    let usages = index
        .store()
        .list_tags()
        .unwrap()
        .into_iter()
        .map(|usage| (usage.tag.name, usage.note_count))
        .collect();

    Snapshot {
        live,
        edges,
        memberships,
        usages,
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn sqlite_and_memory_backends_agree(ops in prop::collection::vec(op_strategy(), 1..40)) {
        let sqlite = run(SqliteIndexStore::open_in_memory().unwrap(), &ops);
        let memory = run(MemoryIndexStore::new(), &ops);
        prop_assert_eq!(sqlite, memory);
    }
}
