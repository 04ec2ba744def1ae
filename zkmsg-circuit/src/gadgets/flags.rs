// zkmsg/zkmsg-circuit/src/gadgets/flags.rs
// Numan Thabit 2025

use halo2_base::{
    gates::{flex_gate::GateChip, GateInstructions},
    AssignedValue, Context,
    QuantumCell::Constant,
};
use halo2curves_axiom::bn256::Fr;

use super::bits::canonical_bits;
use crate::FLAG_BITS;

/// Returns a boolean cell that is one iff `payload` carries a flag set obeying
/// the three flag rules and a non-zero data field.
///
/// Flag `f1` is bit 5 of the payload, `f6` is bit 0.
pub fn payload_is_valid(
    ctx: &mut Context<Fr>,
    gate: &GateChip<Fr>,
    payload: AssignedValue<Fr>,
) -> AssignedValue<Fr> {
    let bits = canonical_bits(ctx, gate, payload);
    flags_are_valid(ctx, gate, payload, &bits)
}

/// Evaluates the flag rules over an existing little-endian decomposition of
/// `payload`.
fn flags_are_valid(
    ctx: &mut Context<Fr>,
    gate: &GateChip<Fr>,
    payload: AssignedValue<Fr>,
    bits: &[AssignedValue<Fr>],
) -> AssignedValue<Fr> {
    let flag = |n: usize| bits[FLAG_BITS - n];
    let (f1, f2, f3, f4, f5, f6) = (flag(1), flag(2), flag(3), flag(4), flag(5), flag(6));

    // f1 => no other flag
    let f2_or_f3 = gate.or(ctx, f2, f3);
    let f4_or_f5 = gate.or(ctx, f4, f5);
    let f5_or_f6 = gate.or(ctx, f5, f6);
    let low = gate.or(ctx, f4_or_f5, f6);
    let others = gate.or(ctx, f2_or_f3, low);
    let not_f1 = gate.not(ctx, f1);
    let no_others = gate.not(ctx, others);
    let rule1 = gate.or(ctx, not_f1, no_others);

    // f2 => f3
    let not_f2 = gate.not(ctx, f2);
    let rule2 = gate.or(ctx, not_f2, f3);

    // f4 => !f5 && !f6
    let not_f4 = gate.not(ctx, f4);
    let neither = gate.not(ctx, f5_or_f6);
    let rule3 = gate.or(ctx, not_f4, neither);

    let flags_value = gate.inner_product(
        ctx,
        bits[..FLAG_BITS].iter().copied(),
        (0..FLAG_BITS).map(|i| Constant(Fr::from(1u64 << i))),
    );
    let data_is_zero = gate.is_equal(ctx, payload, flags_value);
    let data_nonzero = gate.not(ctx, data_is_zero);

    let rules = gate.and(ctx, rule1, rule2);
    let rules = gate.and(ctx, rules, rule3);
    gate.and(ctx, rules, data_nonzero)
}
