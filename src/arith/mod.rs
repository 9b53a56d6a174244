// Arithmetic Unit — integer, packed decimal, and floating point
// primitives. Every primitive returns its numeric result plus a condition
// code, and an `Option<Fault>` the caller compares against the live program
// mask to decide whether to actually trap.

pub mod decimal;
pub mod float;
pub mod integer;

pub use decimal::Packed;
