use thiserror::Error;

#[derive(Error, Debug)]
pub enum CompileError {
    #[error("Description Error: {0}")]
    DescriptionError(#[from] serde_json::Error),

    #[error("Definition Error: {reason}")]
    DefinitionError { reason: String },

    #[error("Resolution Error: {reason}")]
    ResolutionError { reason: String },

    #[error("Type Error: {reason}")]
    TypeError { reason: String },

    #[error("Structural Error: {reason}")]
    StructuralError { reason: String },
}
