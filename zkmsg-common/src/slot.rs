//! Per-key lifecycle: `Unset`, then `Eligible`, then `Committed`.

use halo2curves_axiom::bn256::Fr;
use serde::{Deserialize, Serialize};
use zkmsg_circuit::ELIGIBLE_SENTINEL;

use crate::codec::Payload;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "payload", rename_all = "snake_case")]
pub enum SlotValue {
    Unset,
    Eligible,
    Committed(Payload),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotKind {
    Unset,
    Eligible,
    Committed,
}

impl SlotValue {
    pub fn eligible_scalar() -> Fr {
        Fr::from(ELIGIBLE_SENTINEL)
    }

    /// Leaf scalar stored in the map.
    pub fn to_fr(&self) -> Fr {
        match self {
            Self::Unset => Fr::zero(),
            Self::Eligible => Self::eligible_scalar(),
            Self::Committed(payload) => *payload.as_fr(),
        }
    }

    /// Any scalar other than the two sentinels reads back as committed.
    pub fn from_fr(value: Fr) -> Self {
        if value == Fr::zero() {
            Self::Unset
        } else if value == Self::eligible_scalar() {
            Self::Eligible
        } else {
            Self::Committed(Payload::from_fr(value))
        }
    }

    pub fn kind(&self) -> SlotKind {
        match self {
            Self::Unset => SlotKind::Unset,
            Self::Eligible => SlotKind::Eligible,
            Self::Committed(_) => SlotKind::Committed,
        }
    }
}

impl std::fmt::Display for SlotKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unset => f.write_str("unset"),
            Self::Eligible => f.write_str("eligible"),
            Self::Committed => f.write_str("committed"),
        }
    }
}
