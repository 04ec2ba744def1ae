use halo2_proofs_axiom::dev::MockProver;
use halo2curves_axiom::bn256::Fr;
use rand::{rngs::StdRng, Rng, SeedableRng};
use zkmsg_circuit::{
    gadgets::merkle::{EMPTY_ROOTS, MAP_DEPTH},
    public_instances, TransitionCircuit, TransitionCircuitInput, DEFAULT_K, ELIGIBLE_SENTINEL,
};

const DEADBEEF_PAYLOAD: u64 = (0xdead_beef << 6) | 0b100000;

#[test]
fn test_register_into_empty_map() {
    let input = TransitionCircuitInput::from_path(
        Fr::from(0x1234_5678u64),
        empty_path(),
        Fr::zero(),
        Fr::from(ELIGIBLE_SENTINEL),
    );
    run_mock_prover(input).assert_satisfied();
}

#[test]
fn test_deposit_over_populated_path() {
    let input = TransitionCircuitInput::from_path(
        Fr::from(42u64),
        populated_path(7),
        Fr::from(ELIGIBLE_SENTINEL),
        Fr::from(DEADBEEF_PAYLOAD),
    );
    run_mock_prover(input).assert_satisfied();
}

#[test]
fn test_invalid_flags_fail() {
    let input = TransitionCircuitInput::from_path(
        Fr::from(42u64),
        populated_path(8),
        Fr::from(ELIGIBLE_SENTINEL),
        Fr::from((1u64 << 6) | 0b100001),
    );
    assert!(run_mock_prover(input).verify().is_err());
}

#[test]
fn test_zero_data_fails() {
    let input = TransitionCircuitInput::from_path(
        Fr::from(42u64),
        empty_path(),
        Fr::from(ELIGIBLE_SENTINEL),
        Fr::from(0b100000u64),
    );
    assert!(run_mock_prover(input).verify().is_err());
}

#[test]
fn test_unset_to_payload_skip_fails() {
    let input = TransitionCircuitInput::from_path(
        Fr::from(42u64),
        empty_path(),
        Fr::zero(),
        Fr::from(DEADBEEF_PAYLOAD),
    );
    assert!(run_mock_prover(input).verify().is_err());
}

#[test]
fn test_re_registration_fails() {
    let input = TransitionCircuitInput::from_path(
        Fr::from(42u64),
        empty_path(),
        Fr::from(ELIGIBLE_SENTINEL),
        Fr::from(ELIGIBLE_SENTINEL),
    );
    assert!(run_mock_prover(input).verify().is_err());
}

#[test]
fn test_wrong_old_root_fails() {
    let mut input = TransitionCircuitInput::from_path(
        Fr::from(42u64),
        populated_path(9),
        Fr::zero(),
        Fr::from(ELIGIBLE_SENTINEL),
    );
    input.public.old_root += Fr::one();
    assert!(run_mock_prover(input).verify().is_err());
}

#[test]
fn test_short_path_is_rejected_at_synthesis() {
    let mut input = TransitionCircuitInput::from_path(
        Fr::from(42u64),
        empty_path(),
        Fr::zero(),
        Fr::from(ELIGIBLE_SENTINEL),
    );
    input.siblings.pop();
    let instances = public_instances(&input.public);
    let circuit = TransitionCircuit::new(Some(input));
    assert!(MockProver::run(DEFAULT_K as u32, &circuit, instances).is_err());
}

fn run_mock_prover(input: TransitionCircuitInput) -> MockProver<Fr> {
    let instances = public_instances(&input.public);
    let circuit = TransitionCircuit::new(Some(input));
    MockProver::run(DEFAULT_K as u32, &circuit, instances).expect("mock prover run")
}

fn empty_path() -> Vec<Fr> {
    EMPTY_ROOTS[..MAP_DEPTH].to_vec()
}

fn populated_path(seed: u64) -> Vec<Fr> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut path = empty_path();
    for sibling in path.iter_mut().take(8) {
        *sibling = Fr::from(rng.gen::<u64>());
    }
    path
}
