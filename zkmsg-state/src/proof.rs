//! Proof capability seams.
//!
//! The verifier only ever asks "does this proof attest this statement". How
//! proofs are produced is up to the [`TransitionProver`] implementation; the
//! Halo2 backend lives in `zkmsg-prover`.

use anyhow::Result;
use halo2curves_axiom::bn256::Fr;
use serde::{Deserialize, Serialize};
use zkmsg_circuit::{TransitionCircuitInput, TransitionPublicInputs};
use zkmsg_common::{fr_to_bytes, MapKey, MapWitness};

/// Public side of one slot transition.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionStatement {
    #[serde(with = "zkmsg_common::serde_fr")]
    pub old_root: Fr,
    #[serde(with = "zkmsg_common::serde_fr")]
    pub new_root: Fr,
    pub key: MapKey,
    #[serde(with = "zkmsg_common::serde_fr")]
    pub prior_value: Fr,
    #[serde(with = "zkmsg_common::serde_fr")]
    pub new_value: Fr,
}

impl TransitionStatement {
    pub fn public_inputs(&self) -> TransitionPublicInputs {
        TransitionPublicInputs {
            old_root: self.old_root,
            new_root: self.new_root,
            key: self.key.0,
            prior_value: self.prior_value,
            new_value: self.new_value,
        }
    }

    pub fn circuit_input(&self, witness: &MapWitness) -> TransitionCircuitInput {
        TransitionCircuitInput {
            public: self.public_inputs(),
            siblings: witness.siblings.clone(),
        }
    }

    pub fn digest(&self) -> [u8; 32] {
        let mut hasher = blake3::Hasher::new();
        for value in [
            &self.old_root,
            &self.new_root,
            &self.key.0,
            &self.prior_value,
            &self.new_value,
        ] {
            hasher.update(&fr_to_bytes(value));
        }
        *hasher.finalize().as_bytes()
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionProof {
    #[serde(with = "hex_vec")]
    pub bytes: Vec<u8>,
}

impl TransitionProof {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }
}

pub trait ProofChecker {
    fn check(&self, proof: &TransitionProof, statement: &TransitionStatement) -> bool;
}

pub trait TransitionProver {
    fn prove(&self, statement: &TransitionStatement, witness: &MapWitness) -> Result<TransitionProof>;
}

impl<T: ProofChecker + ?Sized> ProofChecker for &T {
    fn check(&self, proof: &TransitionProof, statement: &TransitionStatement) -> bool {
        (**self).check(proof, statement)
    }
}

/// Test double: a "proof" is the blake3 digest of its statement. It binds a
/// proof to one statement but hides nothing and proves nothing.
#[derive(Clone, Copy, Debug, Default)]
pub struct DigestProofSystem;

impl ProofChecker for DigestProofSystem {
    fn check(&self, proof: &TransitionProof, statement: &TransitionStatement) -> bool {
        proof.bytes == statement.digest()
    }
}

impl TransitionProver for DigestProofSystem {
    fn prove(&self, statement: &TransitionStatement, _witness: &MapWitness) -> Result<TransitionProof> {
        Ok(TransitionProof::new(statement.digest().to_vec()))
    }
}

mod hex_vec {
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format!("0x{}", hex::encode(bytes)))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = String::deserialize(deserializer)?;
        hex::decode(value.strip_prefix("0x").unwrap_or(&value)).map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn statement(new_value: u64) -> TransitionStatement {
        TransitionStatement {
            old_root: Fr::from(1u64),
            new_root: Fr::from(2u64),
            key: MapKey(Fr::from(3u64)),
            prior_value: Fr::zero(),
            new_value: Fr::from(new_value),
        }
    }

    #[test]
    fn digest_proofs_bind_to_their_statement() {
        let witness = MapWitness {
            key: MapKey(Fr::from(3u64)),
            siblings: vec![],
        };
        let proof = DigestProofSystem.prove(&statement(54), &witness).unwrap();
        assert!(DigestProofSystem.check(&proof, &statement(54)));
        assert!(!DigestProofSystem.check(&proof, &statement(55)));
        assert!(!DigestProofSystem.check(&TransitionProof::default(), &statement(54)));
    }

    #[test]
    fn proof_json_uses_hex() {
        let proof = TransitionProof::new(vec![0xde, 0xad]);
        let json = serde_json::to_string(&proof).unwrap();
        assert_eq!(json, r#"{"bytes":"0xdead"}"#);
        assert_eq!(serde_json::from_str::<TransitionProof>(&json).unwrap(), proof);
    }
}
