//! End-to-end replication scenarios between in-memory peers.

use synchro_core::{
    load_leaves, merge_bases_in, ApplyOptions, ContentStore, DiffApplier, MemoryContentStore,
    MemoryOwnerDirectory, MemoryRepoStore, MergeStatus, RepoStore, SynchroDriver, SynchroMerge,
    SynchroOptions, TreeDiff,
};
use synchro_types::{sorted_dedup, LiveRepo, ObjectId, RepoKey, RepoLeaf, MASTER, NULL_SHA1};

fn id(s: &str) -> ObjectId {
    ObjectId::digest("commit", s.as_bytes())
}

fn key(name: &str) -> RepoKey {
    RepoKey::new("alice", name)
}

fn live(name: &str, master: &str) -> LiveRepo {
    LiveRepo::from_leaf(
        &RepoLeaf::new(key(name)).with_ref(MASTER, id(master)),
        "u-alice",
    )
}

struct Peer {
    content: MemoryContentStore,
    repos: MemoryRepoStore,
    owners: MemoryOwnerDirectory,
}

impl Peer {
    fn new() -> Self {
        Self {
            content: MemoryContentStore::new(),
            repos: MemoryRepoStore::new(),
            owners: MemoryOwnerDirectory::new().with_user("alice", "u-alice"),
        }
    }

    fn driver(&self) -> SynchroDriver<'_, MemoryContentStore, MemoryRepoStore, MemoryOwnerDirectory> {
        SynchroDriver::new(
            &self.content,
            &self.repos,
            &self.owners,
            SynchroOptions::default(),
        )
    }

    fn snapshot(&self) -> ObjectId {
        self.driver().snapshot("master").unwrap().commit_id
    }

    /// Start from another peer's history: fetch, point the branch at it and
    /// replay it onto the empty live collection.
    fn clone_from(other: &Peer) -> Self {
        let peer = Self::new();
        let tip = peer
            .driver()
            .fetch(&other.content, "origin", "master")
            .unwrap()
            .commit_id;
        peer.content.set_ref("branches/master", tip);
        peer.applier().apply_snapshot_diff(None, tip).unwrap();
        peer
    }

    fn applier(&self) -> DiffApplier<'_, MemoryRepoStore, MemoryOwnerDirectory, TreeDiff<'_, MemoryContentStore>> {
        DiffApplier::new(
            &self.content,
            &self.repos,
            &self.owners,
            ApplyOptions::default(),
        )
    }

    fn pull(&self, other: &Peer) -> SynchroMerge {
        self.driver()
            .fetch(&other.content, "origin", "master")
            .unwrap();
        self.driver().merge_synchro("master", "origin").unwrap()
    }

    fn repo(&self, name: &str) -> Option<LiveRepo> {
        self.repos.find(&key(name)).unwrap()
    }

    fn head(&self) -> ObjectId {
        self.content.get_ref("branches/master").unwrap().unwrap()
    }
}

#[test]
fn independent_adds_of_the_same_repo_conflict() {
    let a = Peer::new();
    a.repos.put(live("photos", "c1"));
    a.snapshot();

    let b = Peer::new();
    b.repos.put(live("photos", "c2"));
    b.snapshot();

    let merged = a.pull(&b);
    assert_eq!(merged.status, MergeStatus::MergeUnrelated);

    let repo = a.repo("photos").unwrap();
    assert_eq!(repo.ref_of(MASTER), Some(id("c1")));
    assert_eq!(repo.conflicts_of(MASTER), &[id("c2")]);

    let leaves = load_leaves(&a.content, Some(a.head())).unwrap();
    assert_eq!(
        leaves[&key("photos")].conflicts[MASTER],
        sorted_dedup([id("c1"), id("c2")])
    );

    // The live collection already matches the merged snapshot.
    assert!(!a.driver().snapshot("master").unwrap().created);
}

#[test]
fn add_c1_then_add_c2_onto_empty_collection() {
    let one = Peer::new();
    one.repos.put(live("photos", "c1"));
    let with_c1 = one.snapshot();

    let two = Peer::new();
    two.repos.put(live("photos", "c2"));
    let with_c2 = two.snapshot();
    one.driver().fetch(&two.content, "two", "master").unwrap();

    let target = Peer::new();
    let applier = DiffApplier::new(
        &one.content,
        &target.repos,
        &target.owners,
        ApplyOptions::default(),
    );
    applier.apply_snapshot_diff(None, with_c1).unwrap();
    applier.apply_snapshot_diff(None, with_c2).unwrap();

    let repo = target.repo("photos").unwrap();
    assert_eq!(repo.ref_of(MASTER), Some(id("c1")));
    assert_eq!(repo.conflicts_of(MASTER), &[id("c2")]);
}

#[test]
fn fast_forward_replays_upstream_changes() {
    let a = Peer::new();
    a.repos.put(live("photos", "c1"));
    a.snapshot();

    let b = Peer::clone_from(&a);
    assert_eq!(b.repo("photos").unwrap().ref_of(MASTER), Some(id("c1")));

    a.repos.put(live("photos", "c2"));
    a.repos.put(live("music", "m1"));
    let a2 = a.snapshot();

    let before = b.head();
    let merged = b.pull(&a);
    assert_eq!(merged.status, MergeStatus::FastForward);
    assert_eq!(merged.commit_id, a2);
    assert_eq!(merged.previous, before);
    assert_eq!(b.head(), a2);
    assert_eq!(b.repo("photos").unwrap().ref_of(MASTER), Some(id("c2")));
    assert_eq!(b.repo("music").unwrap().ref_of(MASTER), Some(id("m1")));
    assert_eq!(merge_bases_in(&b.content, before, a2), vec![before]);

    let again = b.pull(&a);
    assert_eq!(again.status, MergeStatus::UpToDate);
}

#[test]
fn replaying_an_applied_diff_changes_nothing() {
    let a = Peer::new();
    a.repos.put(live("keep", "k1"));
    a.repos.put(live("edit", "e1"));
    a.repos.put(live("gone", "g1"));
    let from = a.snapshot();
    a.repos.put(live("edit", "e2"));
    a.repos.delete(&key("gone"));
    a.repos.put(live("new", "n1"));
    let to = a.snapshot();

    let b = Peer::new();
    let applier = DiffApplier::new(&a.content, &b.repos, &b.owners, ApplyOptions::default());
    applier.apply_snapshot_diff(None, from).unwrap();
    applier.apply_snapshot_diff(Some(from), to).unwrap();
    let once = b.repos.to_state();

    applier.apply_snapshot_diff(Some(from), to).unwrap();
    assert_eq!(b.repos.to_state(), once);
    assert_eq!(b.repos.len(), 3);
    assert_eq!(b.repos.deleted_repos().len(), 1);
}

#[test]
fn delete_vs_modify_keeps_null_alternative() {
    let a = Peer::new();
    a.repos.put(live("photos", "c0"));
    a.snapshot();
    let b = Peer::clone_from(&a);

    a.repos.delete(&key("photos"));
    a.snapshot();
    b.repos.put(live("photos", "c1"));
    b.snapshot();

    let merged = a.pull(&b);
    assert_eq!(merged.status, MergeStatus::Merge);

    let leaves = load_leaves(&a.content, Some(a.head())).unwrap();
    let leaf = &leaves[&key("photos")];
    assert_eq!(leaf.alternatives(MASTER), sorted_dedup([NULL_SHA1, id("c1")]));

    let repo = a.repo("photos").unwrap();
    assert!(repo.to_leaf().alternatives(MASTER).contains(&NULL_SHA1));
}

#[test]
fn concurrent_updates_union_and_collapse() {
    let a = Peer::new();
    a.repos.put(live("photos", "c0"));
    a.snapshot();
    let b = Peer::clone_from(&a);
    let c = Peer::clone_from(&a);

    a.repos.put(live("photos", "c1"));
    a.snapshot();
    b.repos.put(live("photos", "c2"));
    b.snapshot();
    c.repos.put(live("photos", "c2"));
    c.repos.put(live("extra", "x1"));
    c.snapshot();

    a.pull(&b);
    let merged = a.pull(&c);
    assert_eq!(merged.status, MergeStatus::Merge);

    let leaves = load_leaves(&a.content, Some(a.head())).unwrap();
    assert_eq!(
        leaves[&key("photos")].conflicts[MASTER],
        sorted_dedup([id("c1"), id("c2")])
    );

    let d = Peer::clone_from(&b);
    let e = Peer::clone_from(&b);
    d.repos.put(live("photos", "c3"));
    d.snapshot();
    e.repos.put(live("photos", "c3"));
    e.snapshot();
    d.pull(&e);
    let leaves = load_leaves(&d.content, Some(d.head())).unwrap();
    assert_eq!(leaves[&key("photos")].refs[MASTER], id("c3"));
    assert!(leaves[&key("photos")].conflicts.is_empty());
}

#[test]
fn criss_cross_merges_through_one_virtual_base() {
    let a = Peer::new();
    a.repos.put(live("photos", "c0"));
    a.snapshot();
    let b = Peer::clone_from(&a);

    a.repos.put(live("photos", "c1"));
    let a1 = a.snapshot();
    b.repos.put(live("music", "m1"));
    let b1 = b.snapshot();

    a.driver().fetch(&b.content, "origin", "master").unwrap();
    b.driver().fetch(&a.content, "origin", "master").unwrap();
    assert_eq!(
        a.driver().merge_synchro("master", "origin").unwrap().status,
        MergeStatus::Merge
    );
    assert_eq!(
        b.driver().merge_synchro("master", "origin").unwrap().status,
        MergeStatus::Merge
    );

    a.repos.put(live("photos", "c2"));
    let a2 = a.snapshot();
    b.repos.put(live("video", "v1"));
    let b2 = b.snapshot();

    a.driver().fetch(&b.content, "origin", "master").unwrap();
    let bases = merge_bases_in(&a.content, a2, b2);
    assert_eq!(bases.len(), 2);
    assert!(bases.contains(&a1) && bases.contains(&b1));
    let dates: Vec<i64> = bases
        .iter()
        .map(|id| a.content.get_commit(id).unwrap().commit_date)
        .collect();
    assert!(dates.windows(2).all(|w| w[0] >= w[1]));

    let merged = a.driver().merge_synchro("master", "origin").unwrap();
    assert_eq!(merged.status, MergeStatus::Merge);
    assert_eq!(merged.virtual_bases.len(), 1);

    assert_eq!(a.repo("photos").unwrap().ref_of(MASTER), Some(id("c2")));
    assert_eq!(a.repo("music").unwrap().ref_of(MASTER), Some(id("m1")));
    assert_eq!(a.repo("video").unwrap().ref_of(MASTER), Some(id("v1")));
    assert!(a.repo("photos").unwrap().conflicts.is_empty());
}

#[test]
fn delete_of_diverged_repo_is_not_an_error() {
    let a = Peer::new();
    a.repos.put(live("photos", "c0"));
    a.snapshot();
    let b = Peer::clone_from(&a);

    a.repos.delete(&key("photos"));
    a.snapshot();
    // Local edit that never made it into a snapshot.
    b.repos.put(live("photos", "local"));

    let merged = b.pull(&a);
    assert_eq!(merged.status, MergeStatus::FastForward);

    let repo = b.repo("photos").unwrap();
    assert_eq!(repo.ref_of(MASTER), Some(id("local")));
    assert!(b.repos.deleted_repos().is_empty());
}
