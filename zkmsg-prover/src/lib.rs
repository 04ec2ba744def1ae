// zkmsg/zkmsg-prover/src/lib.rs
// Numan Thabit 2025

use anyhow::{Context, Result};
use halo2_proofs_axiom::{
    plonk::{self, create_proof, keygen_pk, keygen_vk, verify_proof},
    poly::kzg::{
        commitment::{KZGCommitmentScheme, ParamsKZG},
        multiopen::{ProverGWC, VerifierGWC},
        strategy::SingleStrategy,
    },
    transcript::{
        Blake2bRead, Blake2bWrite, Challenge255, TranscriptReadBuffer, TranscriptWriterBuffer,
    },
};
use halo2curves_axiom::bn256::{Bn256, Fr, G1Affine};
use rand::rngs::OsRng;
use tracing::{debug, info};

use zkmsg_circuit::{public_instances, TransitionCircuit, TransitionCircuitInput};
use zkmsg_common::{MapWitness, ProverArtifacts};
use zkmsg_state::{ProofChecker, TransitionProof, TransitionProver, TransitionStatement};

pub struct ProverParams {
    pub params: ParamsKZG<Bn256>,
    pub vk: plonk::VerifyingKey<G1Affine>,
    pub pk: plonk::ProvingKey<G1Affine>,
}

/// Runs a fresh (insecure, local) KZG setup and derives both keys for the
/// transition circuit.
pub fn setup(k: u32) -> Result<ProverParams> {
    let mut rng = OsRng;
    info!(k, "running KZG setup");
    let params = ParamsKZG::<Bn256>::setup(k, &mut rng);
    let empty_circuit = TransitionCircuit::default();
    let vk = keygen_vk(&params, &empty_circuit).context("verifying key generation failed")?;
    let pk =
        keygen_pk(&params, vk.clone(), &empty_circuit).context("proving key generation failed")?;
    Ok(ProverParams { params, vk, pk })
}

pub fn prove(
    params: &ParamsKZG<Bn256>,
    pk: &plonk::ProvingKey<G1Affine>,
    input: TransitionCircuitInput,
) -> Result<Vec<u8>> {
    let instance_columns = public_instances(&input.public);
    let instance_refs: Vec<&[Fr]> = instance_columns.iter().map(|col| col.as_slice()).collect();

    let circuit = TransitionCircuit::new(Some(input));

    let mut transcript = Blake2bWrite::<_, G1Affine, Challenge255<_>>::init(vec![]);
    create_proof::<KZGCommitmentScheme<Bn256>, ProverGWC<'_, Bn256>, _, _, _, _>(
        params,
        pk,
        &[circuit],
        &[instance_refs.as_slice()],
        OsRng,
        &mut transcript,
    )
    .context("proof generation failed")?;
    Ok(transcript.finalize())
}

pub fn verify(
    params: &ParamsKZG<Bn256>,
    vk: &plonk::VerifyingKey<G1Affine>,
    proof_bytes: &[u8],
    instances: &[Vec<Fr>],
) -> bool {
    let mut transcript = Blake2bRead::<_, G1Affine, Challenge255<_>>::init(proof_bytes);

    let instance_columns: Vec<&[Fr]> = instances.iter().map(|col| col.as_slice()).collect();
    let prepared_instances = vec![instance_columns.as_slice()];

    verify_proof::<KZGCommitmentScheme<Bn256>, VerifierGWC<'_, Bn256>, _, _, _>(
        params,
        vk,
        SingleStrategy::new(params),
        &prepared_instances,
        &mut transcript,
    )
    .is_ok()
}

/// Halo2 implementation of the verifier's proof capability.
pub struct Halo2ProofSystem {
    params: ParamsKZG<Bn256>,
    vk: plonk::VerifyingKey<G1Affine>,
    pk: plonk::ProvingKey<G1Affine>,
}

impl Halo2ProofSystem {
    pub fn new(setup: ProverParams) -> Self {
        Self {
            params: setup.params,
            vk: setup.vk,
            pk: setup.pk,
        }
    }

    pub fn from_artifacts(artifacts: ProverArtifacts) -> Self {
        Self {
            params: artifacts.params,
            vk: artifacts.vk,
            pk: artifacts.pk,
        }
    }

    pub fn verifying_key(&self) -> &plonk::VerifyingKey<G1Affine> {
        &self.vk
    }
}

impl TransitionProver for Halo2ProofSystem {
    fn prove(&self, statement: &TransitionStatement, witness: &MapWitness) -> Result<TransitionProof> {
        debug!(key = %statement.key, "proving slot transition");
        let bytes = prove(&self.params, &self.pk, statement.circuit_input(witness))?;
        Ok(TransitionProof::new(bytes))
    }
}

impl ProofChecker for Halo2ProofSystem {
    fn check(&self, proof: &TransitionProof, statement: &TransitionStatement) -> bool {
        let instances = public_instances(&statement.public_inputs());
        verify(&self.params, &self.vk, &proof.bytes, &instances)
    }
}
