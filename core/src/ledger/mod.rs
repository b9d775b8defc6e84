//! Consensus: the validator that guards the store, its error vocabulary and
//! the shielded pool state it keeps beside the store.

pub mod error;
pub mod shielded_state;
pub mod validator;

pub use error::{LedgerError, ValidationError};
pub use shielded_state::ShieldedState;
pub use validator::{ConsensusValidator, parse_transaction};
