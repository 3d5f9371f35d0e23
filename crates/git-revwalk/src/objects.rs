//! Reachability walk over the object store, used by pack generation and
//! fetch/clone negotiation.

use std::collections::{HashSet, VecDeque};

use git_hash::ObjectId;
use git_object::{FileMode, Object};
use git_odb::ObjectDatabase;

use crate::RevWalkError;

/// Every object reachable from `wants` that is not reachable from any
/// `have`, in dependency order (blobs and subtrees before the trees that
/// contain them, trees before the commits that reference them).
///
/// The commit-level marking pass intentionally does not descend into
/// trees/blobs — only once the kept-commit set is final does the tree/blob
/// closure run, keeping the uninteresting side of the walk cheap even when
/// `haves` carries a long history.
pub fn collect_reachable(
    odb: &ObjectDatabase,
    wants: &[ObjectId],
    haves: &[ObjectId],
) -> Result<Vec<ObjectId>, RevWalkError> {
    let uninteresting = mark_uninteresting(odb, haves)?;
    let kept_commits = collect_kept_commits(odb, wants, &uninteresting)?;

    let mut seen: HashSet<ObjectId> = HashSet::new();
    let mut result = Vec::new();

    for commit_oid in &kept_commits {
        let commit = match odb.read(commit_oid)? {
            Some(Object::Commit(c)) => c,
            _ => continue,
        };
        collect_tree_closure(odb, &commit.tree, &uninteresting, &mut seen, &mut result)?;
        if seen.insert(*commit_oid) {
            result.push(*commit_oid);
        }
    }

    Ok(result)
}

/// BFS on commit parents from `haves`, marking every reached commit
/// uninteresting. Does not descend into trees/blobs.
fn mark_uninteresting(
    odb: &ObjectDatabase,
    haves: &[ObjectId],
) -> Result<HashSet<ObjectId>, RevWalkError> {
    let mut marked: HashSet<ObjectId> = haves.iter().copied().collect();
    let mut queue: VecDeque<ObjectId> = haves.iter().copied().collect();

    while let Some(oid) = queue.pop_front() {
        let commit = match odb.read(&oid)? {
            Some(Object::Commit(c)) => c,
            _ => continue,
        };
        for parent in &commit.parents {
            if marked.insert(*parent) {
                queue.push_back(*parent);
            }
        }
    }

    Ok(marked)
}

/// BFS from `wants` collecting commits until hitting an uninteresting
/// ancestor.
fn collect_kept_commits(
    odb: &ObjectDatabase,
    wants: &[ObjectId],
    uninteresting: &HashSet<ObjectId>,
) -> Result<Vec<ObjectId>, RevWalkError> {
    let mut kept = Vec::new();
    let mut visited: HashSet<ObjectId> = wants.iter().copied().collect();
    let mut queue: VecDeque<ObjectId> = wants.iter().copied().collect();

    while let Some(oid) = queue.pop_front() {
        if uninteresting.contains(&oid) {
            continue;
        }
        let commit = match odb.read(&oid)? {
            Some(Object::Commit(c)) => c,
            _ => continue,
        };
        kept.push(oid);
        for parent in &commit.parents {
            if uninteresting.contains(parent) {
                continue;
            }
            if visited.insert(*parent) {
                queue.push_back(*parent);
            }
        }
    }

    Ok(kept)
}

/// Post-order walk of a tree's closure: children are emitted before the
/// tree that references them. Gitlink entries (submodule commits) are not
/// objects in this store and are skipped.
fn collect_tree_closure(
    odb: &ObjectDatabase,
    tree_oid: &ObjectId,
    uninteresting: &HashSet<ObjectId>,
    seen: &mut HashSet<ObjectId>,
    result: &mut Vec<ObjectId>,
) -> Result<(), RevWalkError> {
    if uninteresting.contains(tree_oid) || seen.contains(tree_oid) {
        return Ok(());
    }

    let tree = match odb.read(tree_oid)? {
        Some(Object::Tree(t)) => t,
        _ => return Ok(()),
    };

    for entry in &tree.entries {
        if entry.mode == FileMode::Gitlink {
            continue;
        }
        if uninteresting.contains(&entry.oid) || seen.contains(&entry.oid) {
            continue;
        }
        if entry.mode == FileMode::Tree {
            collect_tree_closure(odb, &entry.oid, uninteresting, seen, result)?;
        } else {
            seen.insert(entry.oid);
            result.push(entry.oid);
        }
    }

    seen.insert(*tree_oid);
    result.push(*tree_oid);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use git_object::ObjectType;
    use git_utils::date::{GitDate, Signature};

    fn sig(time: i64) -> Signature {
        Signature {
            name: b"A".as_slice().into(),
            email: b"a@example.com".as_slice().into(),
            date: GitDate { timestamp: time, tz_offset: 0 },
        }
    }

    fn write_commit(odb: &ObjectDatabase, tree: ObjectId, parents: Vec<ObjectId>, time: i64) -> ObjectId {
        let commit = git_object::Commit {
            tree,
            parents,
            author: sig(time),
            committer: sig(time),
            encoding: None,
            gpgsig: None,
            extra_headers: Vec::new(),
            message: b"m".as_slice().into(),
        };
        odb.write_raw(ObjectType::Commit, &commit.serialize_content()).unwrap()
    }

    #[test]
    fn excludes_objects_reachable_from_haves() {
        let dir = tempfile::tempdir().unwrap();
        let odb = ObjectDatabase::open(dir.path()).unwrap();

        let blob1 = odb.write_raw(ObjectType::Blob, b"one").unwrap();
        let tree1 = git_object::Tree {
            entries: vec![git_object::TreeEntry {
                mode: FileMode::Regular,
                name: b"a.txt".as_slice().into(),
                oid: blob1,
            }],
        };
        let tree1_oid = odb.write_raw(ObjectType::Tree, &tree1.serialize_content()).unwrap();
        let c1 = write_commit(&odb, tree1_oid, vec![], 1);

        let blob2 = odb.write_raw(ObjectType::Blob, b"two").unwrap();
        let tree2 = git_object::Tree {
            entries: vec![
                git_object::TreeEntry { mode: FileMode::Regular, name: b"a.txt".as_slice().into(), oid: blob1 },
                git_object::TreeEntry { mode: FileMode::Regular, name: b"b.txt".as_slice().into(), oid: blob2 },
            ],
        };
        let tree2_oid = odb.write_raw(ObjectType::Tree, &tree2.serialize_content()).unwrap();
        let c2 = write_commit(&odb, tree2_oid, vec![c1], 2);

        let reachable = collect_reachable(&odb, &[c2], &[c1]).unwrap();

        assert!(reachable.contains(&c2));
        assert!(reachable.contains(&tree2_oid));
        assert!(reachable.contains(&blob2));
        assert!(!reachable.contains(&c1));
        assert!(!reachable.contains(&tree1_oid));
        assert!(!reachable.contains(&blob1));
    }
}
