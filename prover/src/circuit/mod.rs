//! R1CS gadgets and the pour circuit.

pub mod gadgets;
pub mod pour;

pub use pour::PourCircuit;
