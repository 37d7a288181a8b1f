//! Fork table
//!
//! Holds one immutable `ConsensusState` per retained block, the parent and
//! child links between them, and the canonical height index.
//!
//! ```text
//!             ┌── b3 ── b4        (alternative tip)
//!   root ── b1 ── b2
//!             └── c3 ── c4 ── c5  (canonical tip)
//! ```
//!
//! Everything reachable from the oldest retained canonical block (the root)
//! is kept; pruning moves the root forward and drops whatever is no longer
//! reachable from it.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::Arc;

use shared_types::Hash;

use crate::error::{ConsensusError, ConsensusResult};
use crate::state::ConsensusState;

/// A change of canonical tip that abandons blocks.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Reorg {
    pub old_tip: Hash,
    pub new_tip: Hash,
    /// Height of the last block both chains share
    pub common_height: u64,
    /// Canonical blocks abandoned
    pub depth: u64,
}

#[derive(Debug)]
pub struct ForkTable {
    states: HashMap<Hash, Arc<ConsensusState>>,
    parents: HashMap<Hash, Hash>,
    children: HashMap<Hash, Vec<Hash>>,
    canonical_tip: Hash,
    canonical: BTreeMap<u64, Hash>,
}

impl ForkTable {
    pub fn new(genesis: ConsensusState) -> Self {
        let hash = genesis.hash();
        let mut canonical = BTreeMap::new();
        canonical.insert(genesis.height(), hash);
        let mut states = HashMap::new();
        states.insert(hash, Arc::new(genesis));
        Self {
            states,
            parents: HashMap::new(),
            children: HashMap::new(),
            canonical_tip: hash,
            canonical,
        }
    }

    pub fn get(&self, hash: &Hash) -> Option<&Arc<ConsensusState>> {
        self.states.get(hash)
    }

    pub fn contains(&self, hash: &Hash) -> bool {
        self.states.contains_key(hash)
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub fn canonical_tip(&self) -> Hash {
        self.canonical_tip
    }

    pub fn canonical_state(&self) -> ConsensusResult<&Arc<ConsensusState>> {
        self.states.get(&self.canonical_tip).ok_or_else(|| {
            ConsensusError::Internal("canonical tip missing from fork table".to_string())
        })
    }

    pub fn canonical_hash_at(&self, height: u64) -> Option<Hash> {
        self.canonical.get(&height).copied()
    }

    pub fn is_canonical(&self, hash: &Hash) -> bool {
        self.states
            .get(hash)
            .is_some_and(|state| self.canonical.get(&state.height()) == Some(hash))
    }

    /// States without children.
    pub fn tips(&self) -> Vec<Arc<ConsensusState>> {
        self.states
            .iter()
            .filter(|(hash, _)| self.children.get(*hash).map_or(true, Vec::is_empty))
            .map(|(_, state)| Arc::clone(state))
            .collect()
    }

    /// Hashes of retained states whose chain contains `block_hash` at `height`.
    pub fn states_containing(&self, height: u64, block_hash: &Hash) -> Vec<Hash> {
        self.states
            .iter()
            .filter(|(_, state)| state.contains_block(height, block_hash))
            .map(|(hash, _)| *hash)
            .collect()
    }

    pub fn insert(&mut self, state: Arc<ConsensusState>, parent: Hash) -> ConsensusResult<()> {
        let hash = state.hash();
        if self.states.contains_key(&hash) {
            return Err(ConsensusError::AlreadyKnown { hash });
        }
        if !self.states.contains_key(&parent) {
            return Err(ConsensusError::UnknownParent {
                height: state.height(),
                parent,
            });
        }
        self.states.insert(hash, state);
        self.parents.insert(hash, parent);
        self.children.entry(parent).or_default().push(hash);
        Ok(())
    }

    /// Swap in an updated state for an existing block.
    pub fn replace(&mut self, state: Arc<ConsensusState>) -> ConsensusResult<()> {
        let hash = state.hash();
        match self.states.get_mut(&hash) {
            Some(slot) => {
                *slot = state;
                Ok(())
            }
            None => Err(ConsensusError::UnknownFork { tip: hash }),
        }
    }

    /// Height of the first block that differs from the canonical chain on a
    /// branch built on `parent`.
    pub fn divergence_height(&self, parent: &Hash) -> ConsensusResult<u64> {
        let mut cursor = *parent;
        loop {
            let state = self.states.get(&cursor).ok_or(ConsensusError::UnknownFork { tip: cursor })?;
            if self.canonical.get(&state.height()) == Some(&cursor) {
                return Ok(state.height() + 1);
            }
            cursor = *self.parents.get(&cursor).ok_or_else(|| {
                ConsensusError::Internal("retained branch is detached from the canonical chain".to_string())
            })?;
        }
    }

    /// Make `tip` canonical. Returns the reorg if canonical blocks were
    /// abandoned.
    pub fn set_canonical(&mut self, tip: Hash) -> ConsensusResult<Option<Reorg>> {
        if tip == self.canonical_tip {
            return Ok(None);
        }
        let old_tip = self.canonical_tip;
        let old_height = self.canonical_state()?.height();

        let mut branch = Vec::new();
        let mut cursor = tip;
        let common_height = loop {
            let state = self.states.get(&cursor).ok_or(ConsensusError::UnknownFork { tip: cursor })?;
            let height = state.height();
            if self.canonical.get(&height) == Some(&cursor) {
                break height;
            }
            branch.push((height, cursor));
            cursor = *self.parents.get(&cursor).ok_or_else(|| {
                ConsensusError::Internal("retained branch is detached from the canonical chain".to_string())
            })?;
        };

        self.canonical.retain(|height, _| *height <= common_height);
        self.canonical.extend(branch);
        self.canonical_tip = tip;

        if old_height > common_height {
            Ok(Some(Reorg {
                old_tip,
                new_tip: tip,
                common_height,
                depth: old_height - common_height,
            }))
        } else {
            Ok(None)
        }
    }

    /// Drop `tip`, its descendants, and ancestors no other branch needs.
    pub fn discard(&mut self, tip: &Hash) -> ConsensusResult<Vec<Hash>> {
        if !self.states.contains_key(tip) {
            return Err(ConsensusError::UnknownFork { tip: *tip });
        }
        if self.is_canonical(tip) {
            return Err(ConsensusError::CannotDiscardCanonical { tip: *tip });
        }

        let mut removed = self.subtree(tip);
        let mut cursor = self.parents.get(tip).copied();
        while let Some(parent) = cursor {
            let only_child = self.children.get(&parent).map_or(0, Vec::len) <= 1;
            if !only_child || self.is_canonical(&parent) {
                break;
            }
            removed.push(parent);
            cursor = self.parents.get(&parent).copied();
        }

        for hash in &removed {
            self.remove(hash);
        }
        Ok(removed)
    }

    /// Drop every state below `min_height` and every branch that no longer
    /// connects to the canonical chain at or above it.
    pub fn prune_below(&mut self, min_height: u64) -> usize {
        let Some(root) = self
            .canonical
            .range(min_height..)
            .next()
            .map(|(_, hash)| *hash)
        else {
            return 0;
        };

        let keep: HashSet<Hash> = self.subtree(&root).into_iter().collect();
        let doomed: Vec<Hash> = self
            .states
            .keys()
            .filter(|hash| !keep.contains(*hash))
            .copied()
            .collect();
        for hash in &doomed {
            self.remove(hash);
        }
        self.parents.remove(&root);
        self.canonical.retain(|height, _| *height >= min_height);
        doomed.len()
    }

    fn subtree(&self, start: &Hash) -> Vec<Hash> {
        let mut out = Vec::new();
        let mut queue = VecDeque::from([*start]);
        while let Some(hash) = queue.pop_front() {
            out.push(hash);
            if let Some(children) = self.children.get(&hash) {
                queue.extend(children.iter().copied());
            }
        }
        out
    }

    fn remove(&mut self, hash: &Hash) {
        self.states.remove(hash);
        self.children.remove(hash);
        if let Some(parent) = self.parents.remove(hash) {
            if let Some(siblings) = self.children.get_mut(&parent) {
                siblings.retain(|child| child != hash);
            }
        }
    }
}
