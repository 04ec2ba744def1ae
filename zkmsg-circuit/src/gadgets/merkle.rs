// zkmsg/zkmsg-circuit/src/gadgets/merkle.rs
// Numan Thabit 2025

use halo2_base::{
    gates::{flex_gate::GateChip, GateInstructions},
    AssignedValue, Context,
};
use halo2curves_axiom::{bn256::Fr, ff::PrimeField};
use once_cell::sync::Lazy;

use super::poseidon::{native_hash, Hasher};

/// Depth of the sparse map: one level per bit of a scalar key.
pub const MAP_DEPTH: usize = Fr::NUM_BITS as usize;

/// `EMPTY_ROOTS[i]` is the root of an all-unset subtree of height `i`.
/// `EMPTY_ROOTS[MAP_DEPTH]` is the commitment of the empty map.
pub static EMPTY_ROOTS: Lazy<Vec<Fr>> = Lazy::new(|| {
    let mut roots = Vec::with_capacity(MAP_DEPTH + 1);
    roots.push(Fr::zero());
    for level in 0..MAP_DEPTH {
        let below = roots[level];
        roots.push(native_hash(&[below, below]));
    }
    roots
});

pub fn empty_root() -> Fr {
    EMPTY_ROOTS[MAP_DEPTH]
}

/// Little-endian bits of `key`, truncated to `MAP_DEPTH`. Bit `i` set means the
/// path node at level `i` is a right child.
pub fn key_bits(key: &Fr) -> Vec<bool> {
    let repr = key.to_repr();
    repr.as_ref()
        .iter()
        .flat_map(|byte| (0..8).map(move |i| (byte >> i) & 1 == 1))
        .take(MAP_DEPTH)
        .collect()
}

/// Folds `leaf` up the path described by `bits` and `siblings` (leaf level first).
pub fn native_path_root(leaf: Fr, bits: &[bool], siblings: &[Fr]) -> Fr {
    bits.iter()
        .zip(siblings.iter())
        .fold(leaf, |node, (is_right, sibling)| {
            if *is_right {
                native_hash(&[*sibling, node])
            } else {
                native_hash(&[node, *sibling])
            }
        })
}

/// In-circuit counterpart of [`native_path_root`]. `bits` must already be
/// constrained to be boolean.
pub fn path_root(
    ctx: &mut Context<Fr>,
    gate: &GateChip<Fr>,
    hasher: &Hasher,
    leaf: AssignedValue<Fr>,
    bits: &[AssignedValue<Fr>],
    siblings: &[AssignedValue<Fr>],
) -> AssignedValue<Fr> {
    let mut node = leaf;
    for (bit, sibling) in bits.iter().zip(siblings.iter()) {
        let left = gate.select(ctx, *sibling, node, *bit);
        let right = gate.select(ctx, node, *sibling, *bit);
        node = hasher.hash_fix_len_array(ctx, gate, &[left, right]);
    }
    node
}
