pub mod codec;
pub mod identity;
pub mod map;
pub mod slot;

use std::{
    fs,
    io::Cursor,
    path::{Path, PathBuf},
};

use anyhow::{anyhow, ensure, Context, Result};
use halo2_proofs_axiom::{
    plonk::{self, Circuit},
    poly::{commitment::Params, kzg::commitment::ParamsKZG},
    SerdeFormat,
};
use halo2curves_axiom::{
    bn256::{Bn256, Fr, G1Affine},
    ff::PrimeField,
};
use serde::{Deserialize, Serialize};
use zkmsg_circuit::TransitionCircuit;

pub use codec::{Flags, Payload, PayloadCodec, PayloadFormatError};
pub use identity::{key_of, Identity, MapKey};
pub use map::{AuthenticatedMap, MapWitness};
pub use slot::{SlotKind, SlotValue};

pub const CIRCUIT_VERSION: u32 = 1;
pub const MANIFEST_VERSION: u32 = 1;
pub const MANIFEST_FILE: &str = "manifest.json";

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ArtifactFile {
    pub path: String,
    pub blake3: String,
    pub size: u64,
}

impl ArtifactFile {
    pub fn from_bytes(path: impl Into<String>, bytes: &[u8]) -> Self {
        Self {
            path: path.into(),
            blake3: hash_bytes_hex(bytes),
            size: bytes.len() as u64,
        }
    }

    fn resolve_path(&self, base_dir: &Path) -> PathBuf {
        base_dir.join(&self.path)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ArtifactManifest {
    pub manifest_version: u32,
    pub circuit_version: u32,
    pub k: u32,
    pub created_at_unix: u64,
    pub params: ArtifactFile,
    pub vk: ArtifactFile,
    pub pk: ArtifactFile,
}

#[derive(Clone, Debug)]
pub struct VerifierArtifacts {
    pub manifest: ArtifactManifest,
    pub params: ParamsKZG<Bn256>,
    pub vk: plonk::VerifyingKey<G1Affine>,
}

#[derive(Clone, Debug)]
pub struct ProverArtifacts {
    pub manifest: ArtifactManifest,
    pub params: ParamsKZG<Bn256>,
    pub vk: plonk::VerifyingKey<G1Affine>,
    pub pk: plonk::ProvingKey<G1Affine>,
}

pub fn serialize_params(params: &ParamsKZG<Bn256>) -> Result<Vec<u8>> {
    let mut buf = vec![];
    params
        .write(&mut buf)
        .context("failed to serialize KZG params")?;
    Ok(buf)
}

pub fn deserialize_params(bytes: &[u8]) -> Result<ParamsKZG<Bn256>> {
    let mut reader = Cursor::new(bytes);
    ParamsKZG::<Bn256>::read(&mut reader).context("failed to deserialize KZG params")
}

pub fn serialize_verifying_key(vk: &plonk::VerifyingKey<G1Affine>) -> Result<Vec<u8>> {
    let mut buf = vec![];
    vk.write(&mut buf, SerdeFormat::Processed)
        .context("failed to serialize verifying key")?;
    Ok(buf)
}

pub fn deserialize_verifying_key(bytes: &[u8]) -> Result<plonk::VerifyingKey<G1Affine>> {
    let params = TransitionCircuit::default().params();
    let mut reader = Cursor::new(bytes);
    plonk::VerifyingKey::read::<_, TransitionCircuit>(&mut reader, SerdeFormat::Processed, params)
        .context("failed to deserialize verifying key")
}

pub fn serialize_proving_key(pk: &plonk::ProvingKey<G1Affine>) -> Result<Vec<u8>> {
    let mut buf = vec![];
    pk.write(&mut buf, SerdeFormat::Processed)
        .context("failed to serialize proving key")?;
    Ok(buf)
}

pub fn deserialize_proving_key(bytes: &[u8]) -> Result<plonk::ProvingKey<G1Affine>> {
    let params = TransitionCircuit::default().params();
    let mut reader = Cursor::new(bytes);
    plonk::ProvingKey::read::<_, TransitionCircuit>(&mut reader, SerdeFormat::Processed, params)
        .context("failed to deserialize proving key")
}

pub fn write_manifest(path: impl AsRef<Path>, manifest: &ArtifactManifest) -> Result<()> {
    let json = serde_json::to_vec_pretty(manifest).context("failed to serialize manifest")?;
    fs::write(path.as_ref(), json).context("failed to write manifest")
}

pub fn read_manifest(path: impl AsRef<Path>) -> Result<ArtifactManifest> {
    let bytes = fs::read(path.as_ref()).context("failed to read manifest file")?;
    serde_json::from_slice(&bytes).context("failed to parse manifest json")
}

pub fn load_verifier_artifacts(path: impl AsRef<Path>) -> Result<VerifierArtifacts> {
    let manifest_path = path.as_ref();
    let manifest = read_manifest(manifest_path)?;
    ensure_manifest_compat(&manifest)?;
    let base_dir = manifest_dir(manifest_path);

    let params_bytes = read_artifact_file(&base_dir, &manifest.params, "params")?;
    let vk_bytes = read_artifact_file(&base_dir, &manifest.vk, "verifying key")?;

    Ok(VerifierArtifacts {
        params: deserialize_params(&params_bytes)?,
        vk: deserialize_verifying_key(&vk_bytes)?,
        manifest,
    })
}

pub fn load_prover_artifacts(path: impl AsRef<Path>) -> Result<ProverArtifacts> {
    let manifest_path = path.as_ref();
    let manifest = read_manifest(manifest_path)?;
    ensure_manifest_compat(&manifest)?;
    let base_dir = manifest_dir(manifest_path);

    let params_bytes = read_artifact_file(&base_dir, &manifest.params, "params")?;
    let vk_bytes = read_artifact_file(&base_dir, &manifest.vk, "verifying key")?;
    let pk_bytes = read_artifact_file(&base_dir, &manifest.pk, "proving key")?;

    Ok(ProverArtifacts {
        params: deserialize_params(&params_bytes)?,
        vk: deserialize_verifying_key(&vk_bytes)?,
        pk: deserialize_proving_key(&pk_bytes)?,
        manifest,
    })
}

pub fn hash_bytes_hex(bytes: &[u8]) -> String {
    blake3::hash(bytes).to_hex().to_string()
}

pub fn fr_from_bytes(bytes: &[u8; 32]) -> Result<Fr> {
    Fr::from_bytes(bytes)
        .into_option()
        .ok_or_else(|| anyhow!("invalid bn256 scalar encoding"))
}

pub fn fr_to_bytes(fr: &Fr) -> [u8; 32] {
    let repr = fr.to_repr();
    let mut bytes = [0u8; 32];
    bytes.copy_from_slice(repr.as_ref());
    bytes
}

pub fn reduce_be_bytes_to_fr(bytes: &[u8; 32]) -> Fr {
    let mut acc = Fr::zero();
    let base = Fr::from(256);
    for byte in bytes.iter() {
        acc = acc * base + Fr::from(*byte as u64);
    }
    acc
}

/// `0x`-prefixed hex of the little-endian scalar encoding.
pub fn fr_to_hex(fr: &Fr) -> String {
    format!("0x{}", hex::encode(fr_to_bytes(fr)))
}

pub fn fr_from_hex(value: &str) -> Result<Fr> {
    let hex_str = value.strip_prefix("0x").unwrap_or(value);
    ensure!(
        hex_str.len() == 64,
        "expected 64 hex chars, got {}",
        hex_str.len()
    );
    let mut bytes = [0u8; 32];
    hex::decode_to_slice(hex_str, &mut bytes).context("invalid hex scalar")?;
    fr_from_bytes(&bytes)
}

/// Serde adapter for `Fr` as `0x`-prefixed little-endian hex.
pub mod serde_fr {
    use halo2curves_axiom::bn256::Fr;
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(fr: &Fr, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&super::fr_to_hex(fr))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Fr, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = String::deserialize(deserializer)?;
        super::fr_from_hex(&value).map_err(de::Error::custom)
    }

    pub mod vec {
        use halo2curves_axiom::bn256::Fr;
        use serde::{de, ser::SerializeSeq, Deserialize, Deserializer, Serializer};

        pub fn serialize<S>(values: &[Fr], serializer: S) -> Result<S::Ok, S::Error>
        where
            S: Serializer,
        {
            let mut seq = serializer.serialize_seq(Some(values.len()))?;
            for value in values {
                seq.serialize_element(&super::super::fr_to_hex(value))?;
            }
            seq.end()
        }

        pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<Fr>, D::Error>
        where
            D: Deserializer<'de>,
        {
            Vec::<String>::deserialize(deserializer)?
                .iter()
                .map(|value| super::super::fr_from_hex(value).map_err(de::Error::custom))
                .collect()
        }
    }
}

fn read_artifact_file(base_dir: &Path, entry: &ArtifactFile, label: &str) -> Result<Vec<u8>> {
    let path = entry.resolve_path(base_dir);
    let bytes = fs::read(&path)
        .with_context(|| format!("failed to read {} at {}", label, path.display()))?;
    ensure!(
        bytes.len() as u64 == entry.size,
        "{} size mismatch, manifest recorded {} bytes but found {}",
        label,
        entry.size,
        bytes.len(),
    );
    let actual = hash_bytes_hex(&bytes);
    ensure!(
        actual == entry.blake3,
        "{} hash mismatch, expected {} but computed {}",
        label,
        entry.blake3,
        actual
    );
    Ok(bytes)
}

fn manifest_dir(path: &Path) -> PathBuf {
    path.parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."))
}

fn ensure_manifest_compat(manifest: &ArtifactManifest) -> Result<()> {
    ensure!(
        manifest.manifest_version == MANIFEST_VERSION,
        "unsupported manifest version {}, expected {}",
        manifest.manifest_version,
        MANIFEST_VERSION
    );
    ensure!(
        manifest.circuit_version == CIRCUIT_VERSION,
        "circuit version mismatch: manifest {} vs crate {}",
        manifest.circuit_version,
        CIRCUIT_VERSION
    );
    Ok(())
}
