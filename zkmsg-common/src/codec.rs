//! Bit-packed message payloads.
//!
//! A payload is a single scalar `(data << 6) | flags`. The six low bits are
//! flags `f1` (bit 5) through `f6` (bit 0) and must satisfy:
//! - rule 1: `f1` excludes every other flag
//! - rule 2: `f2` requires `f3`
//! - rule 3: `f4` excludes `f5` and `f6`
//!
//! The remaining high bits carry the data, which must be non-zero.

use std::fmt;

use halo2curves_axiom::{bn256::Fr, ff::PrimeField};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use zkmsg_circuit::{gadgets::poseidon::native_hash, DATA_BITS, FLAG_BITS};

use crate::{fr_to_bytes, fr_to_hex};

const FLAG_MASK: u8 = (1 << FLAG_BITS) - 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PayloadFormatError {
    #[error("rule 1 violated: f1 must be the only flag set (flags {0:#08b})")]
    ExclusiveFlag(u8),
    #[error("rule 2 violated: f2 requires f3 (flags {0:#08b})")]
    MissingCompanion(u8),
    #[error("rule 3 violated: f4 excludes f5 and f6 (flags {0:#08b})")]
    ConflictingFlags(u8),
    #[error("payload data is zero")]
    ZeroData,
    #[error("data does not fit in {DATA_BITS} bits")]
    DataOverflow,
    #[error("flags value {0:#x} does not fit in {FLAG_BITS} bits")]
    FlagWidth(u8),
    #[error("packed payload is not a canonical scalar")]
    NonCanonical,
}

/// Six message flags, `f1` in the most significant position.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Flags(u8);

impl Flags {
    pub const F1: u8 = 0b100000;
    pub const F2: u8 = 0b010000;
    pub const F3: u8 = 0b001000;
    pub const F4: u8 = 0b000100;
    pub const F5: u8 = 0b000010;
    pub const F6: u8 = 0b000001;

    /// Accepts any 6-bit pattern; rule checks happen in [`Flags::check`].
    pub fn from_bits(bits: u8) -> Result<Self, PayloadFormatError> {
        if bits & !FLAG_MASK != 0 {
            return Err(PayloadFormatError::FlagWidth(bits));
        }
        Ok(Self(bits))
    }

    /// Builds flags from `[f1, f2, f3, f4, f5, f6]`.
    pub fn from_array(flags: [bool; FLAG_BITS]) -> Self {
        Self(
            flags
                .iter()
                .fold(0u8, |acc, flag| (acc << 1) | u8::from(*flag)),
        )
    }

    pub fn bits(self) -> u8 {
        self.0
    }

    pub fn f1(self) -> bool {
        self.0 & Self::F1 != 0
    }

    pub fn f2(self) -> bool {
        self.0 & Self::F2 != 0
    }

    pub fn f3(self) -> bool {
        self.0 & Self::F3 != 0
    }

    pub fn f4(self) -> bool {
        self.0 & Self::F4 != 0
    }

    pub fn f5(self) -> bool {
        self.0 & Self::F5 != 0
    }

    pub fn f6(self) -> bool {
        self.0 & Self::F6 != 0
    }

    pub fn check(self) -> Result<(), PayloadFormatError> {
        if self.f1() && self.0 != Self::F1 {
            return Err(PayloadFormatError::ExclusiveFlag(self.0));
        }
        if self.f2() && !self.f3() {
            return Err(PayloadFormatError::MissingCompanion(self.0));
        }
        if self.f4() && (self.f5() || self.f6()) {
            return Err(PayloadFormatError::ConflictingFlags(self.0));
        }
        Ok(())
    }
}

impl TryFrom<u8> for Flags {
    type Error = PayloadFormatError;

    fn try_from(bits: u8) -> Result<Self, Self::Error> {
        Self::from_bits(bits)
    }
}

impl From<Flags> for u8 {
    fn from(flags: Flags) -> Self {
        flags.0
    }
}

impl fmt::Debug for Flags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Flags({:#08b})", self.0)
    }
}

/// A packed message scalar. Holding a `Payload` does not imply it is valid;
/// run [`PayloadCodec::validate`] before accepting one.
#[derive(Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payload(#[serde(with = "crate::serde_fr")] Fr);

impl Payload {
    pub fn from_fr(value: Fr) -> Self {
        Self(value)
    }

    pub fn as_fr(&self) -> &Fr {
        &self.0
    }

    pub fn flags(&self) -> Flags {
        PayloadCodec::decode(self).1
    }

    pub fn data(&self) -> Fr {
        PayloadCodec::decode(self).0
    }
}

impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Payload({})", fr_to_hex(&self.0))
    }
}

/// Pure encode/decode/validate over [`Payload`].
pub struct PayloadCodec;

impl PayloadCodec {
    pub fn validate(payload: &Payload) -> Result<(), PayloadFormatError> {
        let (data, flags) = Self::decode(payload);
        flags.check()?;
        if data == Fr::zero() {
            return Err(PayloadFormatError::ZeroData);
        }
        Ok(())
    }

    /// Packs `data` above `flags`. `data` must fit in the data field and the
    /// packed bits must still be a canonical scalar.
    pub fn construct(data: Fr, flags: Flags) -> Result<Payload, PayloadFormatError> {
        flags.check()?;
        let data_bytes = fr_to_bytes(&data);
        if data_bytes[31] != 0 {
            return Err(PayloadFormatError::DataOverflow);
        }

        let mut packed = [0u8; 32];
        let mut carry = 0u8;
        for (out, byte) in packed.iter_mut().zip(data_bytes.iter()) {
            *out = (byte << FLAG_BITS) | carry;
            carry = byte >> (8 - FLAG_BITS);
        }
        packed[0] |= flags.bits();

        let mut repr = <Fr as PrimeField>::Repr::default();
        repr.as_mut().copy_from_slice(&packed);
        Fr::from_repr(repr)
            .into_option()
            .map(Payload)
            .ok_or(PayloadFormatError::NonCanonical)
    }

    /// Hides `data` behind its hash, truncated to fit the data field.
    pub fn construct_obscured(data: Fr, flags: Flags) -> Result<Payload, PayloadFormatError> {
        let digest = native_hash(&[data]);
        Self::construct(shift_right(&digest, FLAG_BITS), flags)
    }

    pub fn decode(payload: &Payload) -> (Fr, Flags) {
        let bytes = fr_to_bytes(&payload.0);
        let flags = Flags(bytes[0] & FLAG_MASK);
        (shift_right(&payload.0, FLAG_BITS), flags)
    }
}

fn shift_right(value: &Fr, bits: usize) -> Fr {
    debug_assert!((1..8).contains(&bits));
    let bytes = fr_to_bytes(value);
    let mut shifted = [0u8; 32];
    for i in 0..32 {
        let high = bytes.get(i + 1).copied().unwrap_or(0);
        shifted[i] = (bytes[i] >> bits) | (high << (8 - bits));
    }
    let mut repr = <Fr as PrimeField>::Repr::default();
    repr.as_mut().copy_from_slice(&shifted);
    // A right shift of a canonical scalar stays below the modulus.
    Fr::from_repr(repr).unwrap_or(Fr::zero())
}
