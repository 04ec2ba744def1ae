//! Participant identities and the map keys derived from them.

use std::fmt;

use anyhow::{Context, Result};
use halo2curves_axiom::bn256::Fr;
use serde::{Deserialize, Serialize};
use zkmsg_circuit::gadgets::poseidon::native_hash;

use crate::{fr_to_hex, reduce_be_bytes_to_fr};

/// Affine secp256k1 public key, big-endian coordinates.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identity {
    #[serde(with = "hex_bytes")]
    pub x: [u8; 32],
    #[serde(with = "hex_bytes")]
    pub y: [u8; 32],
}

impl Identity {
    pub fn new(x: [u8; 32], y: [u8; 32]) -> Self {
        Self { x, y }
    }

    /// Parses a SEC1 encoded key, compressed or not.
    pub fn from_sec1(bytes: &[u8]) -> Result<Self> {
        let key = secp256k1::PublicKey::from_slice(bytes).context("invalid secp256k1 public key")?;
        Ok(Self::from(&key))
    }

    pub fn key(&self) -> MapKey {
        key_of(self)
    }
}

impl From<&secp256k1::PublicKey> for Identity {
    fn from(key: &secp256k1::PublicKey) -> Self {
        let uncompressed = key.serialize_uncompressed();
        let mut x = [0u8; 32];
        let mut y = [0u8; 32];
        x.copy_from_slice(&uncompressed[1..33]);
        y.copy_from_slice(&uncompressed[33..65]);
        Self { x, y }
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Identity(0x{}..)", hex::encode(&self.x[..6]))
    }
}

/// Slot index in the authenticated map: a one-way digest of an [`Identity`].
#[derive(Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MapKey(#[serde(with = "crate::serde_fr")] pub Fr);

impl MapKey {
    pub fn as_fr(&self) -> &Fr {
        &self.0
    }
}

impl fmt::Debug for MapKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MapKey({})", fr_to_hex(&self.0))
    }
}

impl fmt::Display for MapKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&fr_to_hex(&self.0))
    }
}

/// `Poseidon(x, y)` over the coordinates reduced into the scalar field.
pub fn key_of(identity: &Identity) -> MapKey {
    let x = reduce_be_bytes_to_fr(&identity.x);
    let y = reduce_be_bytes_to_fr(&identity.y);
    MapKey(native_hash(&[x, y]))
}

mod hex_bytes {
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &[u8; 32], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format!("0x{}", hex::encode(bytes)))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<[u8; 32], D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = String::deserialize(deserializer)?;
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(value.strip_prefix("0x").unwrap_or(&value), &mut bytes)
            .map_err(de::Error::custom)?;
        Ok(bytes)
    }
}
