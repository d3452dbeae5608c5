//! Merge-base discovery over the synchro commit DAG.
//!
//! This is Git's "paint down to common" walk. Both endpoints are painted
//! (ours/theirs) and the newest commit is repeatedly popped from a priority
//! queue, handing its paint to its parents. A commit reached by both paints
//! is a merge base; its ancestors are then painted stale so that they are not
//! reported as well. The walk ends once every queued commit is stale.
//!
//! Queue order is descending `commit_date`; commits with equal dates pop in
//! ascending id order so that results never depend on insertion order.

use std::cmp::Ordering;
use std::collections::hash_map::Entry;
use std::collections::{BinaryHeap, HashMap};
use synchro_types::{Commit, ObjectId};

use crate::store::ContentStore;

/// Paint carried by a visited commit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Paint {
    ours: bool,
    theirs: bool,
    stale: bool,
}

impl Paint {
    fn both(&self) -> bool {
        self.ours && self.theirs
    }

    /// Whether `self` already carries everything in `other`.
    fn covers(&self, other: Paint) -> bool {
        (self.ours || !other.ours) && (self.theirs || !other.theirs) && (self.stale || !other.stale)
    }

    fn add(&mut self, other: Paint) {
        self.ours |= other.ours;
        self.theirs |= other.theirs;
        self.stale |= other.stale;
    }
}

/// A commit visited by the walk.
#[derive(Debug)]
struct Node {
    commit_date: i64,
    parents: Vec<ObjectId>,
    paint: Paint,
    result: bool,
}

impl Node {
    fn new(commit: Commit) -> Self {
        Self {
            commit_date: commit.commit_date,
            parents: commit.parents,
            paint: Paint::default(),
            result: false,
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
struct Queued {
    commit_date: i64,
    id: ObjectId,
}

impl Ord for Queued {
    fn cmp(&self, other: &Self) -> Ordering {
        // Max-heap: newest first, then smallest id.
        self.commit_date
            .cmp(&other.commit_date)
            .then_with(|| other.id.cmp(&self.id))
    }
}

impl PartialOrd for Queued {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Find the merge bases of `ours` and `theirs`.
///
/// `lookup` returns `None` for commits that are not available. Unavailable
/// endpoints yield an empty result; unavailable parents are skipped.
///
/// Results are ordered by descending `commit_date`, ties by ascending id.
pub fn merge_bases<F>(ours: ObjectId, theirs: ObjectId, mut lookup: F) -> Vec<ObjectId>
where
    F: FnMut(&ObjectId) -> Option<Commit>,
{
    let (Some(our_commit), Some(their_commit)) = (lookup(&ours), lookup(&theirs)) else {
        return Vec::new();
    };

    let mut arena: HashMap<ObjectId, Node> = HashMap::new();
    let mut queue = BinaryHeap::new();

    arena.insert(ours, Node::new(our_commit));
    arena.entry(theirs).or_insert_with(|| Node::new(their_commit));
    for (id, paint) in [
        (
            ours,
            Paint {
                ours: true,
                ..Paint::default()
            },
        ),
        (
            theirs,
            Paint {
                theirs: true,
                ..Paint::default()
            },
        ),
    ] {
        if let Some(node) = arena.get_mut(&id) {
            node.paint.add(paint);
            queue.push(Queued {
                commit_date: node.commit_date,
                id,
            });
        }
    }

    let mut results: Vec<(i64, ObjectId)> = Vec::new();

    while queue
        .iter()
        .any(|q| arena.get(&q.id).map(|n| !n.paint.stale).unwrap_or(false))
    {
        let Some(Queued { id, .. }) = queue.pop() else {
            break;
        };
        let Some(node) = arena.get_mut(&id) else {
            continue;
        };

        let mut flags = node.paint;
        if flags.both() && !flags.stale {
            if !node.result {
                node.result = true;
                results.push((node.commit_date, id));
            }
            node.paint.stale = true;
            flags.stale = true;
        }

        let parents = node.parents.clone();
        for parent in parents {
            let parent_node = match arena.entry(parent) {
                Entry::Occupied(entry) => entry.into_mut(),
                Entry::Vacant(entry) => match lookup(&parent) {
                    Some(commit) => entry.insert(Node::new(commit)),
                    None => continue,
                },
            };
            if parent_node.paint.covers(flags) {
                continue;
            }
            parent_node.paint.add(flags);
            queue.push(Queued {
                commit_date: parent_node.commit_date,
                id: parent,
            });
        }
    }

    results.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(&b.1)));
    results.into_iter().map(|(_, id)| id).collect()
}

/// [`merge_bases`] with commits looked up in a content store.
///
/// Store errors count as "not available".
pub fn merge_bases_in<S: ContentStore + ?Sized>(
    store: &S,
    ours: ObjectId,
    theirs: ObjectId,
) -> Vec<ObjectId> {
    merge_bases(ours, theirs, |id| store.find_commit(id).ok().flatten())
}
