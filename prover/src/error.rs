use ark_relations::r1cs::SynthesisError;
use ark_serialize::SerializationError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProofError {
    /// The private inputs do not satisfy the pour relation.
    #[error("malformed pour witness: {0}")]
    MalformedWitness(&'static str),
    #[error("constraint synthesis failed: {0}")]
    Synthesis(SynthesisError),
    #[error("malformed proof bytes: {0}")]
    MalformedProof(SerializationError),
    #[error("invalid key material: {0}")]
    Keys(SerializationError),
    #[error("pour proof rejected")]
    Rejected,
    #[error("pour needs exactly 2 outputs, got {0}")]
    OutputCount(usize),
    #[error("proving cancelled")]
    Cancelled,
    #[error("proving service unavailable")]
    Unavailable,
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<SynthesisError> for ProofError {
    fn from(err: SynthesisError) -> Self {
        Self::Synthesis(err)
    }
}
