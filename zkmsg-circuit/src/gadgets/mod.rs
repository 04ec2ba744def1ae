// zkmsg/zkmsg-circuit/src/gadgets/mod.rs
// Numan Thabit 2025

pub mod bits;
pub mod flags;
pub mod merkle;
pub mod poseidon;
