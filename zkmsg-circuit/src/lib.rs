// zkmsg/zkmsg-circuit/src/lib.rs
// Numan Thabit 2025

//! Circuit for a single slot transition of the message map.
//!
//! Public inputs (one instance column each):
//! - `old_root`: map commitment before the transition
//! - `new_root`: map commitment after the transition
//! - `key`: slot being written
//! - `prior_value`: slot value certified under `old_root`
//! - `new_value`: slot value certified under `new_root`
//!
//! Private witness: the sibling path of `key`.
//!
//! Constraints:
//! 1. Both roots are recomputed from the same path, so every other slot is untouched.
//! 2. The value pair is either a registration (unset to eligible) or a deposit
//!    (eligible to a payload passing the flag rules with non-zero data).

pub mod gadgets;

use halo2_base::{
    gates::{
        circuit::builder::BaseCircuitBuilder,
        circuit::{BaseCircuitParams, BaseConfig, CircuitBuilderStage},
        flex_gate::GateChip,
        GateInstructions,
    },
    AssignedValue,
    QuantumCell::Constant,
};
use halo2_proofs_axiom::{
    circuit::{Layouter, SimpleFloorPlanner},
    plonk::{Circuit, ConstraintSystem, Error},
};
use halo2curves_axiom::{bn256::Fr, ff::PrimeField};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use thiserror::Error as ThisError;

use crate::gadgets::{
    bits::canonical_bits,
    flags::payload_is_valid,
    merkle::{key_bits, native_path_root, path_root, EMPTY_ROOTS, MAP_DEPTH},
    poseidon,
};

pub const DEFAULT_K: usize = 19;
pub const NUM_INSTANCE_COLUMNS: usize = 5;
const MINIMUM_ROWS: usize = 20;

/// Width of the flag field in the low bits of a payload.
pub const FLAG_BITS: usize = 6;
/// Width of the data field above the flags.
pub const DATA_BITS: usize = Fr::NUM_BITS as usize - FLAG_BITS;
/// Slot value marking an admitted participant: flags `0b110110`, zero data.
pub const ELIGIBLE_SENTINEL: u64 = 0b110110;

/// Layout is input independent, so it is sized once from the sample witness.
static CIRCUIT_PARAMS: Lazy<BaseCircuitParams> = Lazy::new(|| {
    let mut builder = BaseCircuitBuilder::<Fr>::from_stage(CircuitBuilderStage::Mock)
        .use_k(DEFAULT_K)
        .use_instance_columns(NUM_INSTANCE_COLUMNS);
    build_constraints(&mut builder, &SAMPLE_INPUT).expect("sample input is consistent");
    builder.calculate_params(Some(MINIMUM_ROWS))
});

pub fn default_params() -> BaseCircuitParams {
    CIRCUIT_PARAMS.clone()
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionPublicInputs {
    pub old_root: Fr,
    pub new_root: Fr,
    pub key: Fr,
    pub prior_value: Fr,
    pub new_value: Fr,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TransitionCircuitInput {
    pub public: TransitionPublicInputs,
    /// Sibling hashes of `public.key`, leaf level first.
    pub siblings: Vec<Fr>,
}

impl TransitionCircuitInput {
    /// Builds an input whose roots are derived from `siblings`.
    pub fn from_path(key: Fr, siblings: Vec<Fr>, prior_value: Fr, new_value: Fr) -> Self {
        let bits = key_bits(&key);
        let old_root = native_path_root(prior_value, &bits, &siblings);
        let new_root = native_path_root(new_value, &bits, &siblings);
        Self {
            public: TransitionPublicInputs {
                old_root,
                new_root,
                key,
                prior_value,
                new_value,
            },
            siblings,
        }
    }
}

#[derive(Clone, Debug)]
pub struct TransitionCircuit {
    pub input: Option<TransitionCircuitInput>,
    params: BaseCircuitParams,
}

impl Default for TransitionCircuit {
    fn default() -> Self {
        Self {
            input: None,
            params: default_params(),
        }
    }
}

impl TransitionCircuit {
    pub fn new(input: Option<TransitionCircuitInput>) -> Self {
        Self {
            input,
            params: default_params(),
        }
    }
}

pub fn public_instances(public: &TransitionPublicInputs) -> Vec<Vec<Fr>> {
    vec![
        vec![public.old_root],
        vec![public.new_root],
        vec![public.key],
        vec![public.prior_value],
        vec![public.new_value],
    ]
}

impl Circuit<Fr> for TransitionCircuit {
    type Config = BaseConfig<Fr>;
    type FloorPlanner = SimpleFloorPlanner;
    type Params = BaseCircuitParams;

    fn params(&self) -> Self::Params {
        self.params.clone()
    }

    fn without_witnesses(&self) -> Self {
        Self {
            input: None,
            params: self.params.clone(),
        }
    }

    fn configure_with_params(
        meta: &mut ConstraintSystem<Fr>,
        params: Self::Params,
    ) -> Self::Config {
        BaseConfig::configure(meta, params)
    }

    fn configure(_: &mut ConstraintSystem<Fr>) -> Self::Config {
        unreachable!("TransitionCircuit must be configured with explicit parameters")
    }

    fn synthesize(&self, config: Self::Config, layouter: impl Layouter<Fr>) -> Result<(), Error> {
        let stage = if self.input.is_some() {
            CircuitBuilderStage::Mock
        } else {
            CircuitBuilderStage::Keygen
        };

        let input = self.input.as_ref().unwrap_or(&SAMPLE_INPUT);

        let mut builder = BaseCircuitBuilder::<Fr>::from_stage(stage)
            .use_params(self.params.clone())
            .use_instance_columns(self.params.num_instance_columns);

        build_constraints(&mut builder, input).map_err(|_| Error::Synthesis)?;
        <BaseCircuitBuilder<Fr> as Circuit<Fr>>::synthesize(&builder, config, layouter)
    }
}

/// Registration of the zero key into the empty map.
static SAMPLE_INPUT: Lazy<TransitionCircuitInput> = Lazy::new(|| {
    TransitionCircuitInput::from_path(
        Fr::zero(),
        EMPTY_ROOTS[..MAP_DEPTH].to_vec(),
        Fr::zero(),
        Fr::from(ELIGIBLE_SENTINEL),
    )
});

fn build_constraints(
    builder: &mut BaseCircuitBuilder<Fr>,
    input: &TransitionCircuitInput,
) -> Result<(), CircuitError> {
    if input.siblings.len() != MAP_DEPTH {
        return Err(CircuitError::PathLength {
            expected: MAP_DEPTH,
            actual: input.siblings.len(),
        });
    }

    let gate = GateChip::<Fr>::default();
    let public = &input.public;
    let ctx = builder.main(0);

    let key = ctx.load_witness(public.key);
    let prior_value = ctx.load_witness(public.prior_value);
    let new_value = ctx.load_witness(public.new_value);
    let siblings = ctx.assign_witnesses(input.siblings.iter().copied());

    let bits = canonical_bits(ctx, &gate, key);

    let hasher = poseidon::hasher(ctx, &gate);
    let old_root = path_root(ctx, &gate, &hasher, prior_value, &bits, &siblings);
    let new_root = path_root(ctx, &gate, &hasher, new_value, &bits, &siblings);

    let eligible = Constant(Fr::from(ELIGIBLE_SENTINEL));
    let prior_unset = gate.is_zero(ctx, prior_value);
    let new_eligible = gate.is_equal(ctx, new_value, eligible);
    let prior_eligible = gate.is_equal(ctx, prior_value, eligible);
    let payload_ok = payload_is_valid(ctx, &gate, new_value);

    let registers = gate.and(ctx, prior_unset, new_eligible);
    let deposits = gate.and(ctx, prior_eligible, payload_ok);
    let allowed = gate.or(ctx, registers, deposits);
    gate.assert_is_const(ctx, &allowed, &Fr::one());

    expose_public_inputs(builder, [old_root, new_root, key, prior_value, new_value]);
    Ok(())
}

fn expose_public_inputs(
    builder: &mut BaseCircuitBuilder<Fr>,
    values: [AssignedValue<Fr>; NUM_INSTANCE_COLUMNS],
) {
    for (idx, value) in values.into_iter().enumerate() {
        builder.assigned_instances[idx].push(value);
    }
}

#[derive(Debug, ThisError)]
pub enum CircuitError {
    #[error("sibling path has {actual} entries, expected {expected}")]
    PathLength { expected: usize, actual: usize },
}
