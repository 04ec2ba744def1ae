// zkmsg/zkmsg-circuit/src/gadgets/poseidon.rs
// Numan Thabit 2025

use halo2_base::{
    gates::flex_gate::GateChip,
    poseidon::hasher::{spec::OptimizedPoseidonSpec, PoseidonHasher},
    AssignedValue, Context,
};
use halo2curves_axiom::{
    bn256::Fr,
    ff::{Field, PrimeField},
};
use once_cell::sync::Lazy;

pub const POSEIDON_T: usize = 6;
pub const POSEIDON_RATE: usize = 5;
pub const POSEIDON_FULL_ROUNDS: usize = 8;
pub const POSEIDON_PARTIAL_ROUNDS: usize = 57;

pub type Hasher = PoseidonHasher<Fr, POSEIDON_T, POSEIDON_RATE>;

/// Hasher with round constants already loaded into `ctx`; reuse it for every
/// hash in a circuit instead of reloading constants per call.
pub fn hasher(ctx: &mut Context<Fr>, gate: &GateChip<Fr>) -> Hasher {
    let mut hasher = Hasher::new(poseidon_spec());
    hasher.initialize_consts(ctx, gate);
    hasher
}

pub fn hash_elements(
    ctx: &mut Context<Fr>,
    gate: &GateChip<Fr>,
    inputs: &[AssignedValue<Fr>],
) -> AssignedValue<Fr> {
    hasher(ctx, gate).hash_fix_len_array(ctx, gate, inputs)
}

fn poseidon_spec() -> OptimizedPoseidonSpec<Fr, POSEIDON_T, POSEIDON_RATE> {
    OptimizedPoseidonSpec::new::<POSEIDON_FULL_ROUNDS, POSEIDON_PARTIAL_ROUNDS, 0>()
}

// Native evaluation of the same sponge. Must stay bit-exact with
// `PoseidonHasher::hash_fix_len_array` so that roots computed off-circuit
// match the ones the circuit exposes.

static POSEIDON_SPEC: Lazy<OptimizedPoseidonSpec<Fr, POSEIDON_T, POSEIDON_RATE>> =
    Lazy::new(poseidon_spec);

pub fn native_hash(inputs: &[Fr]) -> Fr {
    let spec = &*POSEIDON_SPEC;
    let mut state = [Fr::zero(); POSEIDON_T];
    state[0] = Fr::from_u128(1u128 << 64);

    for chunk in inputs.chunks(POSEIDON_RATE) {
        permute(&mut state, chunk, spec);
    }

    if inputs.len() % POSEIDON_RATE == 0 {
        permute(&mut state, &[], spec);
    }

    state[1]
}

fn permute(
    state: &mut [Fr; POSEIDON_T],
    inputs: &[Fr],
    spec: &OptimizedPoseidonSpec<Fr, POSEIDON_T, POSEIDON_RATE>,
) {
    let r_f = spec.r_f() / 2;
    let constants = spec.constants();
    let matrices = spec.mds_matrices();
    let start = constants.start();

    absorb(state, inputs, &start[0]);

    for coeffs in start.iter().skip(1).take(r_f - 1) {
        sbox_full(state, coeffs);
        apply_mds(state, matrices.mds().as_ref());
    }

    if let Some(last) = start.last() {
        sbox_full(state, last);
    }
    apply_mds(state, matrices.pre_sparse_mds().as_ref());

    for (constant, sparse) in constants
        .partial()
        .iter()
        .zip(matrices.sparse_matrices().iter())
    {
        state[0] = state[0].pow_vartime([5]) + constant;
        apply_sparse_mds(state, sparse.row(), sparse.col_hat());
    }

    for coeffs in constants.end().iter() {
        sbox_full(state, coeffs);
        apply_mds(state, matrices.mds().as_ref());
    }

    sbox_full(state, &[Fr::zero(); POSEIDON_T]);
    apply_mds(state, matrices.mds().as_ref());
}

/// Adds the chunk and the first round constants; the slot right after the
/// chunk receives the padding one.
fn absorb(state: &mut [Fr; POSEIDON_T], inputs: &[Fr], pre_constants: &[Fr; POSEIDON_T]) {
    debug_assert!(inputs.len() < POSEIDON_T);

    state[0] += pre_constants[0];
    for (idx, input) in inputs.iter().enumerate() {
        state[idx + 1] += *input + pre_constants[idx + 1];
    }

    let padding = inputs.len() + 1;
    for idx in padding..POSEIDON_T {
        state[idx] += pre_constants[idx];
        if idx == padding {
            state[idx] += Fr::one();
        }
    }
}

fn sbox_full(state: &mut [Fr; POSEIDON_T], constants: &[Fr; POSEIDON_T]) {
    for (value, constant) in state.iter_mut().zip(constants.iter()) {
        *value = value.pow_vartime([5]) + constant;
    }
}

fn apply_mds(state: &mut [Fr; POSEIDON_T], matrix: &[[Fr; POSEIDON_T]; POSEIDON_T]) {
    let current = *state;
    for (slot, row) in state.iter_mut().zip(matrix.iter()) {
        *slot = row
            .iter()
            .zip(current.iter())
            .fold(Fr::zero(), |acc, (coeff, value)| acc + *coeff * *value);
    }
}

fn apply_sparse_mds(
    state: &mut [Fr; POSEIDON_T],
    row: &[Fr; POSEIDON_T],
    col_hat: &[Fr; POSEIDON_RATE],
) {
    let current = *state;
    state[0] = row
        .iter()
        .zip(current.iter())
        .fold(Fr::zero(), |acc, (coeff, value)| acc + *coeff * *value);

    for (i, coeff) in col_hat.iter().enumerate() {
        state[i + 1] = current[0] * *coeff + current[i + 1];
    }
}
