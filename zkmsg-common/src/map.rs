//! Sparse Poseidon Merkle map keyed by [`MapKey`].
//!
//! The tree has one level per key bit. Leaves hold the slot scalar and an
//! internal node is `Poseidon(left, right)`. Only nodes that differ from the
//! empty subtree of their height are stored; everything else is read from
//! [`EMPTY_ROOTS`].

use std::collections::{BTreeMap, HashMap};

use halo2curves_axiom::bn256::Fr;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use zkmsg_circuit::gadgets::{
    merkle::{key_bits, native_path_root, EMPTY_ROOTS, MAP_DEPTH},
    poseidon::native_hash,
};

use crate::{fr_from_bytes, fr_to_bytes, identity::MapKey};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MapError {
    #[error("witness has {actual} siblings, expected {expected}")]
    PathLength { expected: usize, actual: usize },
    #[error("stored key is not a canonical scalar")]
    InvalidKey,
}

type NodeIndex = [u8; 32];

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(from = "MapSnapshot", into = "MapSnapshot")]
pub struct AuthenticatedMap {
    leaves: BTreeMap<NodeIndex, Fr>,
    nodes: HashMap<(usize, NodeIndex), Fr>,
}

impl AuthenticatedMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn root(&self) -> Fr {
        self.node(MAP_DEPTH, &[0u8; 32])
    }

    pub fn empty_root() -> Fr {
        EMPTY_ROOTS[MAP_DEPTH]
    }

    /// Value at `key`; unwritten keys read as zero.
    pub fn get(&self, key: &MapKey) -> Fr {
        self.leaves
            .get(&fr_to_bytes(key.as_fr()))
            .copied()
            .unwrap_or_else(Fr::zero)
    }

    /// Writes `value` at `key` without any lifecycle checks.
    pub fn set(&mut self, key: &MapKey, value: Fr) {
        let mut index = fr_to_bytes(key.as_fr());
        if value == Fr::zero() {
            self.leaves.remove(&index);
        } else {
            self.leaves.insert(index, value);
        }

        let mut node = value;
        for height in 0..MAP_DEPTH {
            let is_right = bit(&index, height);
            let sibling = self.node(height, &flip(&index, height));
            node = if is_right {
                native_hash(&[sibling, node])
            } else {
                native_hash(&[node, sibling])
            };
            clear(&mut index, height);
            self.store(height + 1, index, node);
        }
    }

    pub fn witness(&self, key: &MapKey) -> MapWitness {
        let index = fr_to_bytes(key.as_fr());
        let mut cursor = index;
        let siblings = (0..MAP_DEPTH)
            .map(|height| {
                let sibling = self.node(height, &flip(&cursor, height));
                clear(&mut cursor, height);
                sibling
            })
            .collect();
        MapWitness { key: *key, siblings }
    }

    pub fn len(&self) -> usize {
        self.leaves.len()
    }

    pub fn is_empty(&self) -> bool {
        self.leaves.is_empty()
    }

    /// Written entries in key-byte order.
    pub fn iter(&self) -> impl Iterator<Item = Result<(MapKey, Fr), MapError>> + '_ {
        self.leaves.iter().map(|(index, value)| {
            fr_from_bytes(index)
                .map(|key| (MapKey(key), *value))
                .map_err(|_| MapError::InvalidKey)
        })
    }

    fn node(&self, height: usize, index: &NodeIndex) -> Fr {
        let stored = if height == 0 {
            self.leaves.get(index)
        } else {
            self.nodes.get(&(height, *index))
        };
        stored.copied().unwrap_or(EMPTY_ROOTS[height])
    }

    fn store(&mut self, height: usize, index: NodeIndex, value: Fr) {
        if value == EMPTY_ROOTS[height] {
            self.nodes.remove(&(height, index));
        } else {
            self.nodes.insert((height, index), value);
        }
    }
}

fn bit(index: &NodeIndex, height: usize) -> bool {
    (index[height / 8] >> (height % 8)) & 1 == 1
}

fn flip(index: &NodeIndex, height: usize) -> NodeIndex {
    let mut flipped = *index;
    flipped[height / 8] ^= 1 << (height % 8);
    flipped
}

fn clear(index: &mut NodeIndex, height: usize) {
    index[height / 8] &= !(1 << (height % 8));
}

/// Sibling path for one key, leaf level first.
///
/// The same path answers two questions: does the key hold a given value under
/// a given root, and what would the root be if the key held another value.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MapWitness {
    pub key: MapKey,
    #[serde(with = "crate::serde_fr::vec")]
    pub siblings: Vec<Fr>,
}

impl MapWitness {
    /// Recomputes the root assuming `key` holds `value`.
    pub fn compute_root_and_key(&self, value: Fr) -> Result<(Fr, MapKey), MapError> {
        if self.siblings.len() != MAP_DEPTH {
            return Err(MapError::PathLength {
                expected: MAP_DEPTH,
                actual: self.siblings.len(),
            });
        }
        let bits = key_bits(self.key.as_fr());
        Ok((native_path_root(value, &bits, &self.siblings), self.key))
    }

    pub fn compute_new_root(&self, value: Fr) -> Result<Fr, MapError> {
        self.compute_root_and_key(value).map(|(root, _)| root)
    }

    /// True iff `key` holds `value` in the map committed to by `root`.
    pub fn verify_against(&self, root: &Fr, value: Fr) -> bool {
        matches!(self.compute_root_and_key(value), Ok((computed, _)) if computed == *root)
    }
}

#[derive(Serialize, Deserialize)]
struct MapSnapshot {
    entries: Vec<SnapshotEntry>,
}

#[derive(Serialize, Deserialize)]
struct SnapshotEntry {
    #[serde(with = "crate::serde_fr")]
    key: Fr,
    #[serde(with = "crate::serde_fr")]
    value: Fr,
}

impl From<MapSnapshot> for AuthenticatedMap {
    fn from(snapshot: MapSnapshot) -> Self {
        let mut map = AuthenticatedMap::new();
        for entry in snapshot.entries {
            map.set(&MapKey(entry.key), entry.value);
        }
        map
    }
}

impl From<AuthenticatedMap> for MapSnapshot {
    fn from(map: AuthenticatedMap) -> Self {
        let entries = map
            .iter()
            .filter_map(Result::ok)
            .map(|(key, value)| SnapshotEntry { key: key.0, value })
            .collect();
        MapSnapshot { entries }
    }
}
