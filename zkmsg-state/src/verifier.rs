//! Authoritative verifier.
//!
//! Holds only the admin, the map root and the registration counter. Every
//! entry point re-derives its preconditions from the submitted witness and
//! the stored root; nothing the mirror says is trusted.

use halo2curves_axiom::bn256::Fr;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use zkmsg_common::{Identity, MapKey, MapWitness, Payload};

use crate::{
    error::TransitionError,
    proof::{ProofChecker, TransitionProof},
    transition::{apply, Transition, TransitionKind, VerifierRecord},
};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum VerifierEvent {
    MessageDeposited { key: MapKey, payload: Payload },
}

/// One accepted transition, in commit order. Replaying the transcript from
/// genesis reproduces the verifier root.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommittedTransition {
    pub seq: u64,
    pub kind: TransitionKind,
    pub key: MapKey,
    #[serde(with = "zkmsg_common::serde_fr")]
    pub value: Fr,
    #[serde(with = "zkmsg_common::serde_fr")]
    pub root_after: Fr,
}

/// Persisted form of a verifier, without its proof checker.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifierSnapshot {
    pub record: VerifierRecord,
    #[serde(default)]
    pub events: Vec<VerifierEvent>,
    #[serde(default)]
    pub transcript: Vec<CommittedTransition>,
}

pub struct Verifier<C> {
    record: VerifierRecord,
    checker: C,
    events: Vec<VerifierEvent>,
    transcript: Vec<CommittedTransition>,
}

impl<C: ProofChecker> Verifier<C> {
    /// Deploys a verifier administered by `admin` over the empty map.
    pub fn deploy(admin: Identity, checker: C) -> Self {
        Self::from_record(VerifierRecord::genesis(admin), checker)
    }

    /// Resumes from a stored record. The transcript starts empty.
    pub fn from_record(record: VerifierRecord, checker: C) -> Self {
        Self {
            record,
            checker,
            events: Vec::new(),
            transcript: Vec::new(),
        }
    }

    pub fn restore(snapshot: VerifierSnapshot, checker: C) -> Self {
        Self {
            record: snapshot.record,
            checker,
            events: snapshot.events,
            transcript: snapshot.transcript,
        }
    }

    pub fn snapshot(&self) -> VerifierSnapshot {
        VerifierSnapshot {
            record: self.record.clone(),
            events: self.events.clone(),
            transcript: self.transcript.clone(),
        }
    }

    pub fn register(
        &mut self,
        sender: &Identity,
        witness: &MapWitness,
        proof: &TransitionProof,
    ) -> Result<Fr, TransitionError> {
        let transition = Transition::Register {
            witness: witness.clone(),
        };
        self.submit(sender, &transition, proof)
    }

    pub fn deposit_message(
        &mut self,
        sender: &Identity,
        witness: &MapWitness,
        payload: Payload,
        proof: &TransitionProof,
    ) -> Result<Fr, TransitionError> {
        let transition = Transition::DepositMessage {
            witness: witness.clone(),
            payload,
        };
        self.submit(sender, &transition, proof)
    }

    /// Applies `transition` and returns the new root.
    pub fn submit(
        &mut self,
        sender: &Identity,
        transition: &Transition,
        proof: &TransitionProof,
    ) -> Result<Fr, TransitionError> {
        let applied = match apply(&self.record, sender, transition, proof, &self.checker) {
            Ok(applied) => applied,
            Err(err) => {
                warn!(kind = ?transition.kind(), key = %transition.witness().key, error = %err, "transition rejected");
                return Err(err);
            }
        };

        self.record = applied.record;
        let seq = self.transcript.last().map_or(0, |last| last.seq + 1);
        self.transcript.push(CommittedTransition {
            seq,
            kind: applied.kind,
            key: applied.key,
            value: applied.value.to_fr(),
            root_after: self.record.root,
        });
        if let Transition::DepositMessage { payload, .. } = transition {
            self.events.push(VerifierEvent::MessageDeposited {
                key: applied.key,
                payload: *payload,
            });
        }

        info!(
            seq,
            kind = ?applied.kind,
            key = %applied.key,
            eligible_count = self.record.eligible_count,
            "transition committed"
        );
        Ok(self.record.root)
    }

    pub fn record(&self) -> &VerifierRecord {
        &self.record
    }

    pub fn root(&self) -> Fr {
        self.record.root
    }

    pub fn admin(&self) -> &Identity {
        &self.record.admin
    }

    pub fn eligible_count(&self) -> u8 {
        self.record.eligible_count
    }

    pub fn events(&self) -> &[VerifierEvent] {
        &self.events
    }

    pub fn transcript(&self) -> &[CommittedTransition] {
        &self.transcript
    }
}
