//! The verifier transition relation as a pure function.
//!
//! `apply` checks every guard against the current record and the submitted
//! witness before producing a new record. The caller commits the result only
//! on `Ok`, so a refused transition leaves the record exactly as it was.

use halo2curves_axiom::bn256::Fr;
use serde::{Deserialize, Serialize};
use zkmsg_common::{
    key_of, Identity, MapKey, MapWitness, Payload, PayloadCodec, SlotKind, SlotValue,
};

use crate::{
    error::TransitionError,
    proof::{ProofChecker, TransitionProof, TransitionStatement},
};

/// Upper bound on successful registrations.
pub const MAX_ELIGIBLE: u8 = 100;

/// Everything the verifier stores.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifierRecord {
    pub admin: Identity,
    #[serde(with = "zkmsg_common::serde_fr")]
    pub root: Fr,
    pub eligible_count: u8,
}

impl VerifierRecord {
    /// Record of a freshly deployed verifier: empty map, no registrations.
    pub fn genesis(admin: Identity) -> Self {
        Self {
            admin,
            root: zkmsg_common::AuthenticatedMap::empty_root(),
            eligible_count: 0,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Transition {
    Register { witness: MapWitness },
    DepositMessage { witness: MapWitness, payload: Payload },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionKind {
    Register,
    DepositMessage,
}

impl Transition {
    pub fn kind(&self) -> TransitionKind {
        match self {
            Self::Register { .. } => TransitionKind::Register,
            Self::DepositMessage { .. } => TransitionKind::DepositMessage,
        }
    }

    pub fn witness(&self) -> &MapWitness {
        match self {
            Self::Register { witness } | Self::DepositMessage { witness, .. } => witness,
        }
    }

    /// Statement this transition would prove against `root`, or the guard
    /// failure that makes it unprovable.
    pub fn statement(&self, root: &Fr) -> Result<TransitionStatement, TransitionError> {
        let (prior, next) = match self {
            Self::Register { .. } => (SlotValue::Unset, SlotValue::Eligible),
            Self::DepositMessage { payload, .. } => {
                (SlotValue::Eligible, SlotValue::Committed(*payload))
            }
        };
        let witness = self.witness();
        if !witness.verify_against(root, prior.to_fr()) {
            return Err(TransitionError::StalePrecondition {
                expected: prior.kind(),
            });
        }
        Ok(TransitionStatement {
            old_root: *root,
            new_root: witness.compute_new_root(next.to_fr())?,
            key: witness.key,
            prior_value: prior.to_fr(),
            new_value: next.to_fr(),
        })
    }
}

/// Outcome of an accepted transition.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Applied {
    pub record: VerifierRecord,
    pub kind: TransitionKind,
    pub key: MapKey,
    pub value: SlotValue,
}

pub fn apply<C: ProofChecker + ?Sized>(
    record: &VerifierRecord,
    sender: &Identity,
    transition: &Transition,
    proof: &TransitionProof,
    checker: &C,
) -> Result<Applied, TransitionError> {
    match transition {
        Transition::Register { .. } => {
            if *sender != record.admin {
                return Err(TransitionError::NotAdmin);
            }
            if record.eligible_count >= MAX_ELIGIBLE {
                return Err(TransitionError::CapacityReached {
                    limit: MAX_ELIGIBLE,
                });
            }
        }
        Transition::DepositMessage { witness, payload } => {
            if witness.key != key_of(sender) {
                return Err(TransitionError::KeyOwnerMismatch);
            }
            if !witness.verify_against(&record.root, SlotValue::Eligible.to_fr()) {
                return Err(TransitionError::StalePrecondition {
                    expected: SlotKind::Eligible,
                });
            }
            PayloadCodec::validate(payload)?;
        }
    }

    let statement = transition.statement(&record.root)?;
    if !checker.check(proof, &statement) {
        return Err(TransitionError::ProofRejected);
    }

    let mut next = record.clone();
    next.root = statement.new_root;
    if transition.kind() == TransitionKind::Register {
        next.eligible_count += 1;
    }

    Ok(Applied {
        record: next,
        kind: transition.kind(),
        key: statement.key,
        value: SlotValue::from_fr(statement.new_value),
    })
}
