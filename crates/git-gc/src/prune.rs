//! `prune`: delete loose objects reachable from nothing.

use git_hash::ObjectId;
use git_index::Index;
use git_odb::ObjectDatabase;
use git_ref::{FilesRefStore, RefStore};

use crate::reachability::mark_reachable;
use crate::GcError;

/// Collect every object id that must survive a prune: every ref target
/// (loose and packed, symbolic refs resolved to their underlying
/// direct ref), every non-null old/new id in every ref's reflog, and
/// every blob referenced by the staging index (plus any up-to-date
/// subtree ids cached in the index's cache-tree extension).
pub fn collect_roots(
    refs: &FilesRefStore,
    index: Option<&Index>,
) -> Result<Vec<ObjectId>, GcError> {
    let mut roots = Vec::new();

    for reference in refs.iter(None)? {
        let reference = reference?;
        if let Some(oid) = reference.target_oid() {
            roots.push(oid);
        }
        for entry in refs.reflog(reference.name())? {
            if !entry.old_oid.is_null() {
                roots.push(entry.old_oid);
            }
            if !entry.new_oid.is_null() {
                roots.push(entry.new_oid);
            }
        }
    }

    if let Some(index) = index {
        for entry in index.iter() {
            roots.push(entry.oid);
        }
        if let Some(cache_tree) = index.cache_tree() {
            collect_cache_tree_oids(&cache_tree.root, &mut roots);
        }
    }

    Ok(roots)
}

fn collect_cache_tree_oids(
    node: &git_index::extensions::tree::CacheTreeNode,
    roots: &mut Vec<ObjectId>,
) {
    if let Some(oid) = node.oid {
        roots.push(oid);
    }
    for child in &node.children {
        collect_cache_tree_oids(child, roots);
    }
}

/// Delete every loose object not reachable from `roots`. Objects that
/// already live in a finalized pack are left alone; removing those
/// requires a repack that excludes them (a full gc pass runs `compact`
/// first so deleted loose objects are never duplicated into a pack).
/// Returns the ids that were pruned.
pub fn prune(odb: &ObjectDatabase, roots: &[ObjectId]) -> Result<Vec<ObjectId>, GcError> {
    let reachable = mark_reachable(odb, roots)?;
    let loose = git_loose::LooseObjectStore::open(odb.objects_dir(), odb.hash_algo());

    let mut pruned = Vec::new();
    for oid in loose.iter()? {
        let oid = oid?;
        if !reachable.contains(&oid) {
            odb.delete(&oid)?;
            pruned.push(oid);
        }
    }

    Ok(pruned)
}
