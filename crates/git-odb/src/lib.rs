//! Unified object database for git.
//!
//! Provides a single interface to read and write objects across loose storage,
//! packfiles, and alternate object databases. This is the primary abstraction
//! that all higher-level git operations use to access objects.

pub mod alternates;
pub mod backend;
pub mod prefix;
mod search;

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, RwLock};

use git_hash::{HashAlgorithm, ObjectId};
use git_loose::LooseObjectStore;
use git_object::{Object, ObjectType};
use git_object::cache::ObjectCache;
use git_pack::pack::PackFile;

pub use backend::OdbBackend;
pub use error::OdbError;

mod error {
    use std::path::PathBuf;

    use git_hash::ObjectId;

    #[derive(Debug, thiserror::Error)]
    pub enum OdbError {
        #[error("object not found: {0}")]
        NotFound(ObjectId),

        #[error("ambiguous object name: {prefix} matches {count} objects")]
        Ambiguous { prefix: String, count: usize },

        #[error("corrupt object {oid}: {reason}")]
        Corrupt { oid: ObjectId, reason: String },

        #[error("alternates error: {0}")]
        Alternates(String),

        #[error("circular alternates chain detected at {0}")]
        CircularAlternates(PathBuf),

        #[error(transparent)]
        Loose(#[from] git_loose::LooseError),

        #[error(transparent)]
        Pack(#[from] git_pack::PackError),

        #[error(transparent)]
        Hash(#[from] git_hash::HashError),

        #[error(transparent)]
        Io(#[from] std::io::Error),
    }
}

/// In-memory write buffer for objects awaiting pack finalization.
///
/// Disabled by default (writes go straight to loose, matching plain git's
/// behavior outside of a receive-pack/fast-import session). Call
/// [`ObjectDatabase::enable_pending_pack`] to turn it on.
struct PendingPack {
    enabled: bool,
    max_objects: usize,
    max_bytes: usize,
    objects: Vec<(ObjectType, Vec<u8>)>,
    seen: std::collections::HashSet<ObjectId>,
    bytes: usize,
}

/// Default object-count threshold before the pending pack auto-flushes.
const DEFAULT_PENDING_MAX_OBJECTS: usize = 1024;
/// Default byte-total threshold before the pending pack auto-flushes.
const DEFAULT_PENDING_MAX_BYTES: usize = 32 * 1024 * 1024;

impl PendingPack {
    fn new() -> Self {
        Self {
            enabled: false,
            max_objects: DEFAULT_PENDING_MAX_OBJECTS,
            max_bytes: DEFAULT_PENDING_MAX_BYTES,
            objects: Vec::new(),
            seen: std::collections::HashSet::new(),
            bytes: 0,
        }
    }
}

/// Lightweight object info (header only, no content).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectInfo {
    pub obj_type: ObjectType,
    pub size: usize,
}

/// Unified object database providing access across all storage backends.
pub struct ObjectDatabase {
    /// Loose object store.
    loose: LooseObjectStore,
    /// Pack files (protected by RwLock for refresh).
    packs: RwLock<Vec<PackFile>>,
    /// Alternate object databases.
    alternates: Vec<ObjectDatabase>,
    /// Object cache.
    cache: Mutex<ObjectCache>,
    /// Buffered writes awaiting pack finalization.
    pending: Mutex<PendingPack>,
    /// Monotonic counter for unique temp-pack names across concurrent flushes.
    flush_counter: AtomicU64,
    /// Path to the objects directory.
    objects_dir: PathBuf,
    /// Hash algorithm in use.
    hash_algo: HashAlgorithm,
}

impl ObjectDatabase {
    /// Open the object database at the given objects directory.
    pub fn open(objects_dir: impl AsRef<Path>) -> Result<Self, OdbError> {
        Self::open_with_algo(objects_dir, HashAlgorithm::Sha1)
    }

    /// Open the object database with a specific hash algorithm.
    pub fn open_with_algo(
        objects_dir: impl AsRef<Path>,
        hash_algo: HashAlgorithm,
    ) -> Result<Self, OdbError> {
        let objects_dir = objects_dir.as_ref().to_path_buf();
        let loose = LooseObjectStore::open(&objects_dir, hash_algo);
        let packs = Self::discover_packs(&objects_dir)?;
        let alternates = alternates::load_alternates(&objects_dir, hash_algo)?;

        Ok(Self {
            loose,
            packs: RwLock::new(packs),
            alternates,
            cache: Mutex::new(ObjectCache::new(1024)),
            pending: Mutex::new(PendingPack::new()),
            flush_counter: AtomicU64::new(0),
            objects_dir,
            hash_algo,
        })
    }

    /// Read an object by OID (searches loose -> packs -> alternates).
    pub fn read(&self, oid: &ObjectId) -> Result<Option<Object>, OdbError> {
        search::find_object(self, oid)
    }

    /// Read an object with caching.
    pub fn read_cached(&self, oid: &ObjectId) -> Result<Option<Object>, OdbError> {
        // Check cache first
        {
            let mut cache = self.cache.lock().unwrap();
            if let Some(obj) = cache.get(oid) {
                return Ok(Some(obj.clone()));
            }
        }

        // Read from storage
        let obj = self.read(oid)?;

        // Insert into cache
        if let Some(ref obj) = obj {
            let mut cache = self.cache.lock().unwrap();
            cache.insert(*oid, obj.clone());
        }

        Ok(obj)
    }

    /// Read just the header (type + size) without full content.
    pub fn read_header(&self, oid: &ObjectId) -> Result<Option<ObjectInfo>, OdbError> {
        search::find_header(self, oid)
    }

    /// Check if an object exists (fast, no decompression for packed objects).
    pub fn contains(&self, oid: &ObjectId) -> bool {
        if self.pending.lock().unwrap().seen.contains(oid) {
            return true;
        }
        search::object_exists(self, oid)
    }

    /// Look up an object buffered in the pending pack, if any.
    pub(crate) fn read_pending(&self, oid: &ObjectId) -> Option<(ObjectType, Vec<u8>)> {
        let pending = self.pending.lock().unwrap();
        if !pending.seen.contains(oid) {
            return None;
        }
        pending
            .objects
            .iter()
            .find(|(obj_type, content)| {
                hash_content(self.hash_algo, *obj_type, content)
                    .map(|id| id == *oid)
                    .unwrap_or(false)
            })
            .map(|(obj_type, content)| (*obj_type, content.clone()))
    }

    /// Write a new object.
    ///
    /// Goes to the pending pack if [`enable_pending_pack`](Self::enable_pending_pack)
    /// has been called, otherwise straight to the loose store.
    pub fn write(&self, obj: &Object) -> Result<ObjectId, OdbError> {
        self.write_raw(obj.object_type(), &obj.serialize_content())
    }

    /// Write raw content with a known type.
    ///
    /// Idempotent: writing content that already exists anywhere in the
    /// database (pending, loose, packs, or alternates) is a no-op that
    /// returns the existing id.
    pub fn write_raw(&self, obj_type: ObjectType, content: &[u8]) -> Result<ObjectId, OdbError> {
        let enabled = self.pending.lock().unwrap().enabled;
        if !enabled {
            return Ok(self.loose.write_raw(obj_type, content)?);
        }

        let oid = hash_content(self.hash_algo, obj_type, content)?;
        if self.contains(&oid) {
            return Ok(oid);
        }

        let should_flush = {
            let mut pending = self.pending.lock().unwrap();
            if pending.seen.insert(oid) {
                pending.bytes += content.len();
                pending.objects.push((obj_type, content.to_vec()));
            }
            pending.objects.len() >= pending.max_objects || pending.bytes >= pending.max_bytes
        };

        if should_flush {
            self.flush()?;
        }

        Ok(oid)
    }

    /// Turn on the pending-pack write buffer with the given thresholds.
    ///
    /// While enabled, `write`/`write_raw` accumulate objects in memory and
    /// finalize them into a new pack once either threshold is crossed, or
    /// when [`flush`](Self::flush) is called explicitly.
    pub fn enable_pending_pack(&self, max_objects: usize, max_bytes: usize) {
        let mut pending = self.pending.lock().unwrap();
        pending.enabled = true;
        pending.max_objects = max_objects;
        pending.max_bytes = max_bytes;
    }

    /// Finalize any buffered pending-pack objects into a new
    /// `pack-<checksum>.pack` + `.idx` pair and reset the buffer.
    ///
    /// No-op if nothing is pending.
    pub fn flush(&self) -> Result<(), OdbError> {
        let objects = {
            let mut pending = self.pending.lock().unwrap();
            if pending.objects.is_empty() {
                return Ok(());
            }
            pending.seen.clear();
            pending.bytes = 0;
            std::mem::take(&mut pending.objects)
        };

        let pack_dir = self.objects_dir.join("pack");
        std::fs::create_dir_all(&pack_dir)?;

        let tmp_name = format!(
            "tmp-pending-{}-{}",
            std::process::id(),
            self.flush_counter.fetch_add(1, Ordering::Relaxed)
        );
        let (tmp_pack, tmp_idx, checksum) =
            git_pack::write::create_pack(&pack_dir, &tmp_name, &objects)?;

        let final_pack = pack_dir.join(format!("pack-{checksum}.pack"));
        let final_idx = pack_dir.join(format!("pack-{checksum}.idx"));
        std::fs::rename(&tmp_pack, &final_pack)?;
        std::fs::rename(&tmp_idx, &final_idx)?;

        self.refresh()
    }

    /// Remove an object from loose storage and the pending buffer.
    ///
    /// An object that has already been finalized into a pack is untouched;
    /// removing it there requires a repack that excludes it (see the gc
    /// module's `prune`). Returns whether the object was found and removed
    /// from loose storage or the pending buffer.
    pub fn delete(&self, oid: &ObjectId) -> Result<bool, OdbError> {
        let removed_pending = {
            let mut pending = self.pending.lock().unwrap();
            if pending.seen.remove(oid) {
                if let Some(pos) = pending.objects.iter().position(|(obj_type, content)| {
                    hash_content(self.hash_algo, *obj_type, content)
                        .map(|id| id == *oid)
                        .unwrap_or(false)
                }) {
                    let (_, content) = pending.objects.remove(pos);
                    pending.bytes = pending.bytes.saturating_sub(content.len());
                }
                true
            } else {
                false
            }
        };

        self.cache.lock().unwrap().remove(oid);

        let removed_loose = self.loose.delete(oid)?;

        Ok(removed_pending || removed_loose)
    }

    /// Resolve an OID prefix to a full OID.
    /// Returns error if prefix is ambiguous.
    pub fn resolve_prefix(&self, prefix: &str) -> Result<ObjectId, OdbError> {
        prefix::resolve_prefix(self, prefix)
    }

    /// Refresh the list of pack files (call after gc/repack).
    pub fn refresh(&self) -> Result<(), OdbError> {
        let new_packs = Self::discover_packs(&self.objects_dir)?;
        let mut packs = self.packs.write().unwrap();
        *packs = new_packs;
        Ok(())
    }

    /// Iterate over all known object OIDs (for fsck/gc).
    pub fn iter_all_oids(
        &self,
    ) -> Result<Box<dyn Iterator<Item = Result<ObjectId, OdbError>> + '_>, OdbError> {
        let loose_iter = self.loose.iter()?.map(|r| r.map_err(OdbError::from));

        let packs = self.packs.read().unwrap();
        let mut pack_oids: Vec<Result<ObjectId, OdbError>> = Vec::new();
        for pack in packs.iter() {
            for (oid, _offset) in pack.index().iter() {
                pack_oids.push(Ok(oid));
            }
        }

        let alt_oids: Vec<Result<ObjectId, OdbError>> = self
            .alternates
            .iter()
            .flat_map(|alt| match alt.iter_all_oids() {
                Ok(iter) => iter.collect::<Vec<_>>(),
                Err(e) => vec![Err(e)],
            })
            .collect();

        Ok(Box::new(
            loose_iter
                .chain(pack_oids)
                .chain(alt_oids),
        ))
    }

    /// Get the path to the objects directory.
    pub fn objects_dir(&self) -> &Path {
        &self.objects_dir
    }

    /// Get the hash algorithm in use.
    pub fn hash_algo(&self) -> HashAlgorithm {
        self.hash_algo
    }

    /// Discover pack files in the objects/pack directory.
    fn discover_packs(objects_dir: &Path) -> Result<Vec<PackFile>, OdbError> {
        let pack_dir = objects_dir.join("pack");
        if !pack_dir.is_dir() {
            return Ok(Vec::new());
        }

        let mut packs = Vec::new();
        let mut entries: Vec<_> = std::fs::read_dir(&pack_dir)?
            .filter_map(|e| e.ok())
            .collect();

        // Sort by modification time (newest first) to match C git behavior
        entries.sort_by(|a, b| {
            let a_time = a.metadata().and_then(|m| m.modified()).ok();
            let b_time = b.metadata().and_then(|m| m.modified()).ok();
            b_time.cmp(&a_time)
        });

        for entry in entries {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "pack") {
                match PackFile::open(&path) {
                    Ok(pack) => packs.push(pack),
                    Err(_) => {
                        // Skip corrupt packs (fall back to other sources)
                        continue;
                    }
                }
            }
        }

        Ok(packs)
    }
}

fn hash_content(
    algo: HashAlgorithm,
    obj_type: ObjectType,
    content: &[u8],
) -> Result<ObjectId, OdbError> {
    Ok(git_hash::hasher::Hasher::hash_object(
        algo,
        std::str::from_utf8(obj_type.as_bytes()).unwrap(),
        content,
    )?)
}
