//! Ancestry walk over the object store.
//!
//! Streams commits reachable from a set of starting points in topological
//! order: a commit is emitted only after every commit that has it as a
//! parent (within the walked set) has already been emitted. Ties are broken
//! by committer timestamp, newest first, then by id ascending.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, HashSet, VecDeque};

use git_hash::ObjectId;
use git_object::{Commit, Object};
use git_odb::ObjectDatabase;

use crate::RevWalkError;

/// Options for an ancestry walk.
#[derive(Debug, Clone, Copy, Default)]
pub struct WalkOptions {
    /// Follow only the first parent of each commit.
    pub first_parent_only: bool,
    /// Stop after emitting this many commits.
    pub limit: Option<usize>,
}

/// Sort order for [`RevWalk`]. Topological is the only order the ancestry
/// walk guarantees; it is kept as an enum so callers can name their intent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortOrder {
    #[default]
    Topological,
}

struct ReadyEntry {
    oid: ObjectId,
    commit_time: i64,
}

impl PartialEq for ReadyEntry {
    fn eq(&self, other: &Self) -> bool {
        self.oid == other.oid
    }
}

impl Eq for ReadyEntry {}

impl PartialOrd for ReadyEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ReadyEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap: newest commit_time pops first, ties
        // broken by the smaller id popping first.
        self.commit_time
            .cmp(&other.commit_time)
            .then_with(|| other.oid.cmp(&self.oid))
    }
}

/// Streams commit ids reachable from a set of starting commits, in
/// topological order.
pub struct RevWalk<'a> {
    odb: &'a ObjectDatabase,
    options: WalkOptions,
    starts: Vec<ObjectId>,
    indegree: HashMap<ObjectId, u32>,
    parents: HashMap<ObjectId, Vec<ObjectId>>,
    commit_time: HashMap<ObjectId, i64>,
    ready: BinaryHeap<ReadyEntry>,
    prepared: bool,
    emitted: usize,
}

impl<'a> RevWalk<'a> {
    /// Create a walker over the given object store.
    pub fn new(odb: &'a ObjectDatabase) -> Self {
        Self {
            odb,
            options: WalkOptions::default(),
            starts: Vec::new(),
            indegree: HashMap::new(),
            parents: HashMap::new(),
            commit_time: HashMap::new(),
            ready: BinaryHeap::new(),
            prepared: false,
            emitted: 0,
        }
    }

    /// Set walk options. Must be called before the first call to `next()`.
    pub fn set_options(&mut self, options: WalkOptions) {
        self.options = options;
    }

    /// Add a starting commit.
    pub fn push(&mut self, oid: ObjectId) {
        self.starts.push(oid);
    }

    fn read_commit(&self, oid: &ObjectId) -> Result<Commit, RevWalkError> {
        let obj = self
            .odb
            .read(oid)?
            .ok_or(RevWalkError::CommitNotFound(*oid))?;
        match obj {
            Object::Commit(c) => Ok(c),
            _ => Err(RevWalkError::NotACommit(*oid)),
        }
    }

    /// Collect every commit reachable from `starts` and compute in-degrees
    /// (number of already-discovered children pointing at each commit).
    fn prepare(&mut self) -> Result<(), RevWalkError> {
        if self.prepared {
            return Ok(());
        }
        self.prepared = true;

        let mut queue: VecDeque<ObjectId> = VecDeque::new();
        let mut visited: HashSet<ObjectId> = HashSet::new();

        for start in std::mem::take(&mut self.starts) {
            if visited.insert(start) {
                queue.push_back(start);
            }
        }

        while let Some(oid) = queue.pop_front() {
            let commit = self.read_commit(&oid)?;
            self.commit_time.insert(oid, commit.committer.date.timestamp);
            self.indegree.entry(oid).or_insert(0);

            let parents: Vec<ObjectId> = if self.options.first_parent_only {
                commit.parents.first().copied().into_iter().collect()
            } else {
                commit.parents.clone()
            };

            for parent in &parents {
                *self.indegree.entry(*parent).or_insert(0) += 1;
                if visited.insert(*parent) {
                    queue.push_back(*parent);
                }
            }

            self.parents.insert(oid, parents);
        }

        for (oid, degree) in &self.indegree {
            if *degree == 0 {
                self.ready.push(ReadyEntry {
                    oid: *oid,
                    commit_time: self.commit_time.get(oid).copied().unwrap_or(0),
                });
            }
        }

        Ok(())
    }
}

impl Iterator for RevWalk<'_> {
    type Item = Result<ObjectId, RevWalkError>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(limit) = self.options.limit {
            if self.emitted >= limit {
                return None;
            }
        }

        if let Err(e) = self.prepare() {
            return Some(Err(e));
        }

        let entry = self.ready.pop()?;
        let oid = entry.oid;

        if let Some(parents) = self.parents.get(&oid).cloned() {
            for parent in parents {
                if let Some(degree) = self.indegree.get_mut(&parent) {
                    *degree = degree.saturating_sub(1);
                    if *degree == 0 {
                        let commit_time = self.commit_time.get(&parent).copied().unwrap_or(0);
                        self.ready.push(ReadyEntry { oid: parent, commit_time });
                    }
                }
            }
        }

        self.emitted += 1;
        Some(Ok(oid))
    }
}
