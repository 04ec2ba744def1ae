use halo2curves_axiom::bn256::Fr;
use secp256k1::{PublicKey, Secp256k1, SecretKey};
use zkmsg_common::{key_of, AuthenticatedMap, Flags, Identity, Payload, PayloadCodec, SlotValue};
use zkmsg_state::{
    DigestProofSystem, ErrorCategory, MirrorError, OffChainMirror, Transition, TransitionError,
    TransitionProof, TransitionProver, Verifier, VerifierEvent, VerifierRecord, MAX_ELIGIBLE,
};

fn identity(seed: u8) -> Identity {
    let secp = Secp256k1::new();
    let mut bytes = [0u8; 32];
    bytes[31] = seed;
    bytes[0] = 0x42;
    let secret = SecretKey::from_slice(&bytes).expect("valid secret key");
    Identity::from(&PublicKey::from_secret_key(&secp, &secret))
}

fn deadbeef() -> Payload {
    PayloadCodec::construct(Fr::from(0xdead_beefu64), Flags::from_bits(0b100000).unwrap()).unwrap()
}

struct Harness {
    admin: Identity,
    verifier: Verifier<DigestProofSystem>,
    mirror: OffChainMirror,
}

impl Harness {
    fn new() -> Self {
        let admin = identity(1);
        Self {
            admin,
            verifier: Verifier::deploy(admin, DigestProofSystem),
            mirror: OffChainMirror::new(admin),
        }
    }

    /// Builds the witness from the mirror without touching it, submits, and
    /// resyncs the mirror from the verifier transcript on success.
    fn submit(&mut self, sender: &Identity, transition: Transition) -> Result<Fr, TransitionError> {
        let proof = prove(self.verifier.root(), &transition);
        let result = self.verifier.submit(sender, &transition, &proof);
        if result.is_ok() {
            self.mirror
                .sync_from(self.verifier.transcript())
                .expect("mirror follows transcript");
        }
        result
    }

    fn register(&mut self, sender: &Identity, address: &Identity) -> Result<Fr, TransitionError> {
        let witness = self.mirror.witness(address);
        self.submit(sender, Transition::Register { witness })
    }

    fn deposit(&mut self, sender: &Identity, payload: Payload) -> Result<Fr, TransitionError> {
        let witness = self.mirror.witness(sender);
        self.submit(sender, Transition::DepositMessage { witness, payload })
    }

    fn snapshot(&self) -> VerifierRecord {
        self.verifier.record().clone()
    }
}

fn prove(root: Fr, transition: &Transition) -> TransitionProof {
    transition
        .statement(&root)
        .map(|statement| {
            DigestProofSystem
                .prove(&statement, transition.witness())
                .expect("digest proof")
        })
        .unwrap_or_default()
}

#[test]
fn deploy_starts_from_empty_map() {
    let harness = Harness::new();
    assert_eq!(harness.verifier.root(), AuthenticatedMap::empty_root());
    assert_eq!(harness.verifier.eligible_count(), 0);
    assert_eq!(harness.verifier.admin(), &harness.admin);
}

#[test]
fn admin_registers_participant() {
    let mut h = Harness::new();
    let user = identity(2);
    let admin = h.admin;

    let root = h.register(&admin, &user).unwrap();

    assert_eq!(h.verifier.eligible_count(), 1);
    assert_eq!(root, h.mirror.root());
    assert!(h.mirror.is_eligible(&user));
    h.mirror.assert_synced(&h.verifier.root()).unwrap();
}

#[test]
fn registered_participant_deposits_once() {
    let mut h = Harness::new();
    let user = identity(2);
    let admin = h.admin;
    h.register(&admin, &user).unwrap();

    h.deposit(&user, deadbeef()).unwrap();

    assert!(h.mirror.is_deposited(&user));
    assert_eq!(h.mirror.get(&user), SlotValue::Committed(deadbeef()));
    assert_eq!(h.verifier.eligible_count(), 1);
    assert_eq!(
        h.verifier.events(),
        &[VerifierEvent::MessageDeposited {
            key: key_of(&user),
            payload: deadbeef(),
        }]
    );

    let before = h.snapshot();
    let second = PayloadCodec::construct(Fr::from(77u64), Flags::default()).unwrap();
    let err = h.deposit(&user, second).unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Precondition);
    assert_eq!(h.snapshot(), before);
    assert_eq!(h.verifier.events().len(), 1);
}

#[test]
fn unregistered_sender_cannot_deposit() {
    let mut h = Harness::new();
    let stranger = identity(9);
    let before = h.snapshot();

    let err = h.deposit(&stranger, deadbeef()).unwrap_err();

    assert_eq!(
        err,
        TransitionError::StalePrecondition {
            expected: zkmsg_common::SlotKind::Eligible
        }
    );
    assert_eq!(h.snapshot(), before);
    assert!(h.verifier.events().is_empty());
}

#[test]
fn non_admin_cannot_register() {
    let mut h = Harness::new();
    let before = h.snapshot();
    let err = h.register(&identity(2), &identity(3)).unwrap_err();
    assert_eq!(err, TransitionError::NotAdmin);
    assert_eq!(err.category(), ErrorCategory::Authorization);
    assert_eq!(h.snapshot(), before);
}

#[test]
fn double_registration_is_rejected() {
    let mut h = Harness::new();
    let user = identity(2);
    let admin = h.admin;
    h.register(&admin, &user).unwrap();
    let before = h.snapshot();

    let err = h.register(&admin, &user).unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Precondition);
    assert_eq!(h.snapshot(), before);
    assert_eq!(h.verifier.eligible_count(), 1);
}

#[test]
fn registration_after_deposit_is_rejected() {
    let mut h = Harness::new();
    let user = identity(2);
    let admin = h.admin;
    h.register(&admin, &user).unwrap();
    h.deposit(&user, deadbeef()).unwrap();

    let before = h.snapshot();
    assert!(h.register(&admin, &user).is_err());
    assert_eq!(h.snapshot(), before);
}

#[test]
fn capacity_stops_the_hundred_and_first_registration() {
    let admin = identity(1);
    let map = AuthenticatedMap::new();
    let mut verifier = Verifier::from_record(
        VerifierRecord {
            admin,
            root: map.root(),
            eligible_count: MAX_ELIGIBLE - 1,
        },
        DigestProofSystem,
    );

    let last = Transition::Register {
        witness: map.witness(&key_of(&identity(2))),
    };
    let proof = prove(verifier.root(), &last);
    verifier.submit(&admin, &last, &proof).unwrap();
    assert_eq!(verifier.eligible_count(), MAX_ELIGIBLE);

    let mut mirror = OffChainMirror::new(admin);
    mirror.sync_from(verifier.transcript()).unwrap();
    let before = verifier.record().clone();
    let overflow = Transition::Register {
        witness: mirror.witness(&identity(3)),
    };
    let proof = prove(verifier.root(), &overflow);
    let err = verifier.submit(&admin, &overflow, &proof).unwrap_err();
    assert_eq!(err, TransitionError::CapacityReached { limit: 100 });
    assert_eq!(err.category(), ErrorCategory::Capacity);
    assert_eq!(verifier.record(), &before);
}

#[test]
fn deposit_with_someone_elses_witness_is_rejected() {
    let mut h = Harness::new();
    let admin = h.admin;
    let alice = identity(2);
    let mallory = identity(3);
    h.register(&admin, &alice).unwrap();
    let before = h.snapshot();

    let witness = h.mirror.witness(&alice);
    let err = h
        .submit(
            &mallory,
            Transition::DepositMessage {
                witness,
                payload: deadbeef(),
            },
        )
        .unwrap_err();
    assert_eq!(err, TransitionError::KeyOwnerMismatch);
    assert_eq!(h.snapshot(), before);
}

#[test]
fn invalid_payloads_are_rejected_atomically() {
    let mut h = Harness::new();
    let admin = h.admin;
    let user = identity(2);
    h.register(&admin, &user).unwrap();
    let before = h.snapshot();

    for raw in [
        (1u64 << 6) | 0b100001,
        (1u64 << 6) | 0b010000,
        (1u64 << 6) | 0b000101,
        0b100000,
    ] {
        let err = h.deposit(&user, Payload::from_fr(Fr::from(raw))).unwrap_err();
        assert_eq!(err.category(), ErrorCategory::PayloadFormat);
        assert_eq!(h.snapshot(), before);
    }
    assert!(h.mirror.is_eligible(&user));
}

#[test]
fn stale_witness_loses_the_race() {
    let mut h = Harness::new();
    let admin = h.admin;
    let first = identity(2);
    let second = identity(3);

    let stale = h.mirror.witness(&second);
    h.register(&admin, &first).unwrap();
    let before = h.snapshot();

    let err = h
        .submit(&admin, Transition::Register { witness: stale })
        .unwrap_err();
    assert!(matches!(err, TransitionError::StalePrecondition { .. }));
    assert_eq!(h.snapshot(), before);

    // Refreshing the witness from the synced mirror succeeds.
    h.register(&admin, &second).unwrap();
    assert_eq!(h.verifier.eligible_count(), 2);
}

#[test]
fn forged_mirror_state_does_not_fool_the_verifier() {
    let mut h = Harness::new();
    let user = identity(2);

    // Force the mirror to claim eligibility without a registration.
    h.mirror
        .map_mut()
        .set(&key_of(&user), SlotValue::Eligible.to_fr());
    assert!(h.mirror.is_eligible(&user));
    assert!(h.mirror.assert_synced(&h.verifier.root()).is_err());

    let before = h.snapshot();
    let err = h.deposit(&user, deadbeef()).unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Precondition);
    assert_eq!(h.snapshot(), before);
}

#[test]
fn proof_for_another_statement_is_rejected() {
    let mut h = Harness::new();
    let admin = h.admin;
    let user = identity(2);
    let witness = h.mirror.witness(&user);
    let before = h.snapshot();

    let err = h
        .verifier
        .register(&admin, &witness, &TransitionProof::new(vec![0u8; 32]))
        .unwrap_err();
    assert_eq!(err, TransitionError::ProofRejected);
    assert_eq!(h.snapshot(), before);
}

#[test]
fn registering_one_key_keeps_other_slots() {
    let mut h = Harness::new();
    let admin = h.admin;
    let users: Vec<Identity> = (2..6).map(identity).collect();
    for user in &users[..3] {
        h.register(&admin, user).unwrap();
    }
    h.deposit(&users[0], deadbeef()).unwrap();
    h.register(&admin, &users[3]).unwrap();

    let root = h.verifier.root();
    let map = h.mirror.map();
    assert!(map
        .witness(&key_of(&users[0]))
        .verify_against(&root, *deadbeef().as_fr()));
    for user in &users[1..] {
        assert!(map
            .witness(&key_of(user))
            .verify_against(&root, SlotValue::Eligible.to_fr()));
    }
}

#[test]
fn mirror_rebuilds_from_transcript() {
    let mut h = Harness::new();
    let admin = h.admin;
    let user = identity(2);
    h.register(&admin, &user).unwrap();
    h.deposit(&user, deadbeef()).unwrap();

    let rebuilt = OffChainMirror::rebuild(admin, h.verifier.transcript()).unwrap();
    assert_eq!(rebuilt.root(), h.verifier.root());
    assert_eq!(rebuilt.eligible_count(), 1);
    assert_eq!(rebuilt.cursor(), 2);
    assert!(rebuilt.is_deposited(&user));
}

#[test]
fn transcript_gap_is_reported() {
    let mut h = Harness::new();
    let admin = h.admin;
    h.register(&admin, &identity(2)).unwrap();
    h.register(&admin, &identity(3)).unwrap();

    let mut mirror = OffChainMirror::new(admin);
    let err = mirror.sync_from(&h.verifier.transcript()[1..]).unwrap_err();
    assert_eq!(err, MirrorError::TranscriptGap { expected: 0, found: 1 });
    assert_eq!(err.category(), ErrorCategory::Sync);
}

#[test]
fn mirror_refuses_a_restarted_transcript() {
    let mut h = Harness::new();
    let admin = h.admin;
    h.register(&admin, &identity(2)).unwrap();
    let mirror_root = h.mirror.root();

    let mut verifier = Verifier::from_record(h.verifier.record().clone(), DigestProofSystem);
    let transition = Transition::Register {
        witness: h.mirror.witness(&identity(3)),
    };
    let proof = prove(verifier.root(), &transition);
    verifier.submit(&admin, &transition, &proof).unwrap();
    assert_eq!(verifier.transcript()[0].seq, 0);

    let err = h.mirror.sync_from(verifier.transcript()).unwrap_err();
    assert!(matches!(err, MirrorError::TranscriptDiverged { seq: 0, .. }));
    assert_eq!(err.category(), ErrorCategory::Sync);
    assert_eq!(h.mirror.root(), mirror_root);
    assert_eq!(h.mirror.cursor(), 1);
}

#[test]
fn verifier_snapshot_resumes_sequence() {
    let mut h = Harness::new();
    let admin = h.admin;
    h.register(&admin, &identity(2)).unwrap();

    let snapshot = h.verifier.snapshot();
    let json = serde_json::to_string(&snapshot).unwrap();
    let mut resumed = Verifier::restore(serde_json::from_str(&json).unwrap(), DigestProofSystem);
    assert_eq!(resumed.record(), h.verifier.record());

    let transition = Transition::Register {
        witness: h.mirror.witness(&identity(3)),
    };
    let proof = prove(resumed.root(), &transition);
    resumed.submit(&admin, &transition, &proof).unwrap();
    assert_eq!(resumed.transcript().last().map(|entry| entry.seq), Some(1));
}
