//! Generic object-graph reachability, used to compute the set of objects
//! a gc pass must keep.
//!
//! This walks the same commit/tree/blob graph as the ancestry module's
//! reachability walk, generalized to accept roots of any object type
//! (tags and trees and blobs pinned directly by the staging index, not
//! just commits reachable from refs).

use std::collections::{HashSet, VecDeque};

use git_hash::ObjectId;
use git_object::{FileMode, Object};
use git_odb::ObjectDatabase;

use crate::GcError;

/// Every object reachable from `roots`: commit parents and trees, tag
/// targets, tree entries. Roots are always included in the result, even
/// ones with no outgoing edges (a dangling blob pinned by the index).
pub fn mark_reachable(
    odb: &ObjectDatabase,
    roots: &[ObjectId],
) -> Result<HashSet<ObjectId>, GcError> {
    let mut seen: HashSet<ObjectId> = HashSet::new();
    let mut queue: VecDeque<ObjectId> = VecDeque::new();

    for root in roots {
        if seen.insert(*root) {
            queue.push_back(*root);
        }
    }

    while let Some(oid) = queue.pop_front() {
        let Some(obj) = odb.read(&oid)? else {
            continue;
        };

        match obj {
            Object::Commit(c) => {
                if seen.insert(c.tree) {
                    queue.push_back(c.tree);
                }
                for parent in &c.parents {
                    if seen.insert(*parent) {
                        queue.push_back(*parent);
                    }
                }
            }
            Object::Tag(t) => {
                if seen.insert(t.target) {
                    queue.push_back(t.target);
                }
            }
            Object::Tree(t) => {
                for entry in &t.entries {
                    if entry.mode == FileMode::Gitlink {
                        continue;
                    }
                    if seen.insert(entry.oid) {
                        queue.push_back(entry.oid);
                    }
                }
            }
            Object::Blob(_) => {}
        }
    }

    Ok(seen)
}

#[cfg(test)]
mod tests {
    use super::*;
    use git_object::{Commit, FileMode as Mode, Tree, TreeEntry};
    use git_object::ObjectType;
    use git_utils::date::{GitDate, Signature};

    fn sig() -> Signature {
        Signature {
            name: b"A".as_slice().into(),
            email: b"a@example.com".as_slice().into(),
            date: GitDate { timestamp: 1, tz_offset: 0 },
        }
    }

    #[test]
    fn walks_commit_tree_and_parents() {
        let dir = tempfile::tempdir().unwrap();
        let odb = ObjectDatabase::open(dir.path()).unwrap();

        let blob = odb.write_raw(ObjectType::Blob, b"content").unwrap();
        let tree = Tree {
            entries: vec![TreeEntry {
                mode: Mode::Regular,
                name: b"a.txt".as_slice().into(),
                oid: blob,
            }],
        };
        let tree_oid = odb.write_raw(ObjectType::Tree, &tree.serialize_content()).unwrap();

        let root_commit = Commit {
            tree: tree_oid,
            parents: vec![],
            author: sig(),
            committer: sig(),
            encoding: None,
            gpgsig: None,
            extra_headers: Vec::new(),
            message: b"root".as_slice().into(),
        };
        let root_oid = odb
            .write_raw(ObjectType::Commit, &root_commit.serialize_content())
            .unwrap();

        let child_commit = Commit {
            tree: tree_oid,
            parents: vec![root_oid],
            author: sig(),
            committer: sig(),
            encoding: None,
            gpgsig: None,
            extra_headers: Vec::new(),
            message: b"child".as_slice().into(),
        };
        let child_oid = odb
            .write_raw(ObjectType::Commit, &child_commit.serialize_content())
            .unwrap();

        let reachable = mark_reachable(&odb, &[child_oid]).unwrap();
        assert!(reachable.contains(&child_oid));
        assert!(reachable.contains(&root_oid));
        assert!(reachable.contains(&tree_oid));
        assert!(reachable.contains(&blob));
    }

    #[test]
    fn dangling_blob_root_has_no_edges() {
        let dir = tempfile::tempdir().unwrap();
        let odb = ObjectDatabase::open(dir.path()).unwrap();
        let blob = odb.write_raw(ObjectType::Blob, b"staged only").unwrap();

        let reachable = mark_reachable(&odb, &[blob]).unwrap();
        assert_eq!(reachable.len(), 1);
        assert!(reachable.contains(&blob));
    }

    #[test]
    fn unrelated_object_not_marked() {
        let dir = tempfile::tempdir().unwrap();
        let odb = ObjectDatabase::open(dir.path()).unwrap();
        let kept = odb.write_raw(ObjectType::Blob, b"kept").unwrap();
        let other = odb.write_raw(ObjectType::Blob, b"not kept").unwrap();

        let reachable = mark_reachable(&odb, &[kept]).unwrap();
        assert!(reachable.contains(&kept));
        assert!(!reachable.contains(&other));
    }
}
