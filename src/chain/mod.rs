// Blockchain engine: validation, balance accounting, chain selection,
// mempool, and mining.

pub mod balances;
pub mod engine;
pub mod mempool;

pub use engine::{CommittedBlock, Engine};
