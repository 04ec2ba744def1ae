//! Admission-gated message deposits.
//!
//! An administrator admits up to [`MAX_ELIGIBLE`] participants; each admitted
//! participant may deposit exactly one message payload. The only
//! authoritative state is a [`VerifierRecord`]:
//!
//! ```text
//! VerifierRecord = {
//!     admin:          Identity  - deployer, immutable
//!     root:           Fr        - commitment of the sparse key -> slot map
//!     eligible_count: u8        - successful registrations, at most 100
//! }
//! ```
//!
//! Each key moves through `Unset -> Eligible -> Committed(payload)` and never
//! back. The [`OffChainMirror`] keeps the full map to build witnesses; the
//! [`Verifier`] checks those witnesses against its own root.

pub mod error;
pub mod mirror;
pub mod proof;
pub mod transition;
pub mod verifier;

pub use error::{ErrorCategory, MirrorError, TransitionError};
pub use mirror::OffChainMirror;
pub use proof::{
    DigestProofSystem, ProofChecker, TransitionProof, TransitionProver, TransitionStatement,
};
pub use transition::{apply, Transition, TransitionKind, VerifierRecord, MAX_ELIGIBLE};
pub use verifier::{CommittedTransition, Verifier, VerifierEvent, VerifierSnapshot};
