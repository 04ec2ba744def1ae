//! Error types for verifier transitions and the off-chain mirror.

use halo2curves_axiom::bn256::Fr;
use thiserror::Error;
use zkmsg_common::{map::MapError, PayloadFormatError, SlotKind};

/// Why the verifier refused a transition. A refused transition never touches
/// the verifier record.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransitionError {
    /// Sender is not the administrator.
    #[error("authorization error: sender is not the admin")]
    NotAdmin,

    /// Witness key is not derived from the sender.
    #[error("authorization error: witness key does not belong to the sender")]
    KeyOwnerMismatch,

    /// Witness does not certify the required prior value under the current root.
    #[error("precondition error: witness does not certify a {expected} slot under the current root")]
    StalePrecondition { expected: SlotKind },

    #[error("capacity error: eligible limit of {limit} reached")]
    CapacityReached { limit: u8 },

    #[error("payload format error: {0}")]
    Payload(#[from] PayloadFormatError),

    #[error("proof error: transition proof rejected")]
    ProofRejected,

    #[error("witness error: {0}")]
    Witness(#[from] MapError),
}

impl TransitionError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::NotAdmin | Self::KeyOwnerMismatch => ErrorCategory::Authorization,
            Self::StalePrecondition { .. } | Self::Witness(_) => ErrorCategory::Precondition,
            Self::CapacityReached { .. } => ErrorCategory::Capacity,
            Self::Payload(_) => ErrorCategory::PayloadFormat,
            Self::ProofRejected => ErrorCategory::Proof,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Authorization,
    Precondition,
    Capacity,
    PayloadFormat,
    Proof,
    Sync,
}

/// Advisory-side failures. The mirror applies the verifier guards locally so
/// callers learn early, but only the verifier decides.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MirrorError {
    #[error("authorization error: caller is not the admin")]
    NotAdmin,

    #[error("capacity error: eligible limit of {limit} reached")]
    CapacityReached { limit: u8 },

    #[error("precondition error: slot is {actual}, expected {expected}")]
    UnexpectedSlot { expected: SlotKind, actual: SlotKind },

    #[error("payload format error: {0}")]
    Payload(#[from] PayloadFormatError),

    #[error("sync error: local root {local:?} differs from authoritative root {authoritative:?}")]
    Sync { local: Fr, authoritative: Fr },

    #[error("sync error: transcript resumes at {found}, mirror expects {expected}")]
    TranscriptGap { expected: u64, found: u64 },

    /// An already replayed entry now commits a different root, as when the
    /// verifier restarted its transcript.
    #[error("sync error: transcript entry {seq} commits {authoritative:?}, mirror replayed {local:?}")]
    TranscriptDiverged { seq: u64, local: Fr, authoritative: Fr },
}

impl MirrorError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::NotAdmin => ErrorCategory::Authorization,
            Self::CapacityReached { .. } => ErrorCategory::Capacity,
            Self::UnexpectedSlot { .. } => ErrorCategory::Precondition,
            Self::Payload(_) => ErrorCategory::PayloadFormat,
            Self::Sync { .. } | Self::TranscriptGap { .. } | Self::TranscriptDiverged { .. } => {
                ErrorCategory::Sync
            }
        }
    }
}
