//! `deltify`: replace full objects with delta-encoded variants of
//! themselves when the delta is clearly smaller, guarding against
//! unbounded chains and base cycles.

use std::collections::HashMap;

use git_hash::ObjectId;
use git_odb::ObjectDatabase;
use git_pack::delta::compute::compute_delta;
use git_pack::MAX_DELTA_CHAIN_DEPTH;

use crate::GcError;

/// A proposed (target, base) pairing to try as a delta.
#[derive(Debug, Clone, Copy)]
pub struct DeltaCandidate {
    pub target: ObjectId,
    pub base: ObjectId,
}

/// A candidate that was accepted: the encoded delta bytes against `base`.
pub struct AcceptedDelta {
    pub target: ObjectId,
    pub base: ObjectId,
    pub delta: Vec<u8>,
}

/// Try each candidate in order, accepting it only if the resulting delta
/// is under half the size of the target's full content, the chain rooted
/// at `base` is shorter than [`MAX_DELTA_CHAIN_DEPTH`], and basing
/// `target` on `base` would not create a cycle through `chain_bases`.
///
/// `chain_bases` records the destination pack's delta assignments made so
/// far (target -> base) and is updated in place as candidates are
/// accepted, so later candidates in the same call see earlier acceptances.
pub fn deltify(
    odb: &ObjectDatabase,
    candidates: &[DeltaCandidate],
    chain_bases: &mut HashMap<ObjectId, ObjectId>,
) -> Result<Vec<AcceptedDelta>, GcError> {
    let mut accepted = Vec::new();

    for candidate in candidates {
        if candidate.target == candidate.base {
            continue;
        }
        if creates_cycle(chain_bases, candidate.base, candidate.target) {
            continue;
        }
        if chain_depth(chain_bases, candidate.base) + 1 >= MAX_DELTA_CHAIN_DEPTH {
            continue;
        }

        let Some(target_obj) = odb.read(&candidate.target)? else {
            continue;
        };
        let Some(base_obj) = odb.read(&candidate.base)? else {
            continue;
        };

        let target_content = target_obj.serialize_content();
        let base_content = base_obj.serialize_content();

        let delta = compute_delta(&base_content, &target_content);
        if delta.len() * 2 >= target_content.len() {
            continue;
        }

        chain_bases.insert(candidate.target, candidate.base);
        accepted.push(AcceptedDelta {
            target: candidate.target,
            base: candidate.base,
            delta,
        });
    }

    Ok(accepted)
}

/// Would assigning `target`'s base to `base` close a cycle, i.e. does
/// walking `base`'s existing chain ever lead back to `target`?
fn creates_cycle(
    chain_bases: &HashMap<ObjectId, ObjectId>,
    base: ObjectId,
    target: ObjectId,
) -> bool {
    let mut current = base;
    let mut steps = 0;
    while steps < MAX_DELTA_CHAIN_DEPTH {
        if current == target {
            return true;
        }
        match chain_bases.get(&current) {
            Some(&next) => current = next,
            None => return false,
        }
        steps += 1;
    }
    true
}

/// Length of the delta chain already rooted at `base`.
fn chain_depth(chain_bases: &HashMap<ObjectId, ObjectId>, base: ObjectId) -> usize {
    let mut current = base;
    let mut depth = 0;
    while depth < MAX_DELTA_CHAIN_DEPTH {
        match chain_bases.get(&current) {
            Some(&next) => {
                current = next;
                depth += 1;
            }
            None => break,
        }
    }
    depth
}

#[cfg(test)]
mod tests {
    use super::*;
    use git_object::ObjectType;

    #[test]
    fn accepts_a_clearly_smaller_delta() {
        let dir = tempfile::tempdir().unwrap();
        let odb = ObjectDatabase::open(dir.path()).unwrap();

        let base_content = b"a".repeat(200);
        let base = odb.write_raw(ObjectType::Blob, &base_content).unwrap();
        let target = odb.write_raw(ObjectType::Blob, &base_content).unwrap();

        let mut chain_bases = HashMap::new();
        let accepted = deltify(
            &odb,
            &[DeltaCandidate { target, base }],
            &mut chain_bases,
        )
        .unwrap();

        assert_eq!(accepted.len(), 1);
        assert_eq!(chain_bases.get(&target), Some(&base));
    }

    #[test]
    fn rejects_delta_that_is_not_smaller() {
        let dir = tempfile::tempdir().unwrap();
        let odb = ObjectDatabase::open(dir.path()).unwrap();

        let base = odb.write_raw(ObjectType::Blob, b"abc").unwrap();
        let target = odb.write_raw(ObjectType::Blob, b"xyz").unwrap();

        let mut chain_bases = HashMap::new();
        let accepted = deltify(
            &odb,
            &[DeltaCandidate { target, base }],
            &mut chain_bases,
        )
        .unwrap();

        assert!(accepted.is_empty());
        assert!(!chain_bases.contains_key(&target));
    }

    #[test]
    fn rejects_candidate_that_would_create_a_cycle() {
        let dir = tempfile::tempdir().unwrap();
        let odb = ObjectDatabase::open(dir.path()).unwrap();

        let a = odb.write_raw(ObjectType::Blob, &b"a".repeat(200)).unwrap();
        let b = odb.write_raw(ObjectType::Blob, &b"a".repeat(199)).unwrap();

        let mut chain_bases = HashMap::new();
        chain_bases.insert(b, a); // b is already based on a

        // proposing a based on b would close a -> b -> a
        let accepted = deltify(
            &odb,
            &[DeltaCandidate { target: a, base: b }],
            &mut chain_bases,
        )
        .unwrap();

        assert!(accepted.is_empty());
    }

    #[test]
    fn rejects_candidate_beyond_chain_depth_cap() {
        let dir = tempfile::tempdir().unwrap();
        let odb = ObjectDatabase::open(dir.path()).unwrap();

        let base = odb.write_raw(ObjectType::Blob, &b"a".repeat(200)).unwrap();
        let target = odb.write_raw(ObjectType::Blob, &b"a".repeat(199)).unwrap();

        // Build a fake chain of length MAX_DELTA_CHAIN_DEPTH rooted at base.
        let mut chain_bases = HashMap::new();
        let mut prev = base;
        for i in 0..MAX_DELTA_CHAIN_DEPTH {
            let mut bytes = [0u8; 20];
            bytes[0..8].copy_from_slice(&(i as u64).to_be_bytes());
            let node = ObjectId::from_bytes(&bytes, git_hash::HashAlgorithm::Sha1).unwrap();
            chain_bases.insert(node, prev);
            prev = node;
        }

        let accepted = deltify(
            &odb,
            &[DeltaCandidate { target, base: prev }],
            &mut chain_bases,
        )
        .unwrap();

        assert!(accepted.is_empty());
    }
}
