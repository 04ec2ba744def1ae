// zkmsg/zkmsg-circuit/src/gadgets/bits.rs
// Numan Thabit 2025

use halo2_base::{
    gates::{flex_gate::GateChip, GateInstructions},
    AssignedValue, Context,
};
use halo2curves_axiom::{bn256::Fr, ff::PrimeField};
use once_cell::sync::Lazy;

/// Number of bits in a canonical scalar decomposition.
pub const SCALAR_BITS: usize = Fr::NUM_BITS as usize;

/// Little-endian bits of the scalar field modulus `p`.
static MODULUS_BITS: Lazy<Vec<bool>> = Lazy::new(|| {
    // p - 1 is even, so p differs from it only in bit 0.
    let repr = (-Fr::one()).to_repr();
    let mut bits: Vec<bool> = repr
        .as_ref()
        .iter()
        .flat_map(|byte| (0..8).map(move |i| (byte >> i) & 1 == 1))
        .take(SCALAR_BITS)
        .collect();
    bits[0] = true;
    bits
});

/// Little-endian bit decomposition of `value` whose integer is below `p`.
///
/// `num_to_bits` alone only checks the recomposition modulo `p`, so any value
/// below `2^254 - p` also decomposes as `value + p`.
pub fn canonical_bits(
    ctx: &mut Context<Fr>,
    gate: &GateChip<Fr>,
    value: AssignedValue<Fr>,
) -> Vec<AssignedValue<Fr>> {
    let bits = gate.num_to_bits(ctx, value, SCALAR_BITS);
    assert_below_modulus(ctx, gate, &bits);
    bits
}

/// Constrains boolean little-endian `bits` to encode an integer below `p`.
pub fn assert_below_modulus(
    ctx: &mut Context<Fr>,
    gate: &GateChip<Fr>,
    bits: &[AssignedValue<Fr>],
) {
    assert_eq!(bits.len(), SCALAR_BITS, "expected a full scalar decomposition");

    let mut less = ctx.load_zero();
    let mut equal = ctx.load_constant(Fr::one());
    for (bit, modulus_bit) in bits.iter().zip(MODULUS_BITS.iter()).rev() {
        let not_bit = gate.not(ctx, *bit);
        if *modulus_bit {
            let drops_below = gate.and(ctx, equal, not_bit);
            less = gate.or(ctx, less, drops_below);
            equal = gate.and(ctx, equal, *bit);
        } else {
            equal = gate.and(ctx, equal, not_bit);
        }
    }
    gate.assert_is_const(ctx, &less, &Fr::one());
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use crate::gadgets::merkle::key_bits;

    fn decomposition_satisfied(value: Fr, bits: &[bool], bounded: bool) -> bool {
        let mut builder = builder();
        let gate = GateChip::<Fr>::default();
        let ctx = builder.main(0);
        let cell = ctx.load_witness(value);
        let cells = assign_bits(ctx, &gate, cell, bits);
        if bounded {
            assert_below_modulus(ctx, &gate, &cells);
        }
        satisfied(builder)
    }

    #[test]
    fn modulus_is_odd_and_full_width() {
        assert!(MODULUS_BITS[0]);
        assert!(MODULUS_BITS[SCALAR_BITS - 1]);
        assert_eq!(MODULUS_BITS.len(), SCALAR_BITS);
    }

    #[test]
    fn canonical_decomposition_passes() {
        for value in [Fr::zero(), Fr::from(0x1234_5678u64), -Fr::one()] {
            assert!(decomposition_satisfied(value, &key_bits(&value), true));
        }
    }

    #[test]
    fn aliased_decomposition_needs_the_bound() {
        let value = Fr::from(42u64);
        let aliased = aliased_bits(&value);
        assert_ne!(aliased, key_bits(&value));
        assert!(decomposition_satisfied(value, &aliased, false));
        assert!(!decomposition_satisfied(value, &aliased, true));
    }

    #[test]
    fn canonical_bits_match_native_key_bits() {
        let mut builder = builder();
        let gate = GateChip::<Fr>::default();
        let ctx = builder.main(0);
        let value = Fr::from(0xdead_beefu64);
        let cell = ctx.load_witness(value);
        let bits: Vec<bool> = canonical_bits(ctx, &gate, cell)
            .iter()
            .map(|bit| *bit.value() == Fr::one())
            .collect();
        assert_eq!(bits, key_bits(&value));
        assert!(satisfied(builder));
    }
}
