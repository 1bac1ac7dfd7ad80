use rewind_core::{Block, BlockError, ContractError, Direction, SolveError, StateError, Variable};
use thiserror::Error;

/// Errors returned by tape operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    #[error(transparent)]
    Contract(#[from] ContractError),

    #[error(transparent)]
    State(#[from] StateError),

    /// The variable is neither produced by an equation nor stored.
    #[error("`{0}` is not known to the tape")]
    UnknownVariable(Variable),

    /// No version of the name has been allocated.
    #[error("no version of `{0}` has been allocated")]
    UnknownName(String),

    /// A block cannot differentiate in the requested direction.
    #[error("block `{block}` does not implement the {direction} derivative")]
    NotImplemented { block: String, direction: Direction },

    /// A linear solve inside a block failed.
    #[error("linear solve in block `{block}` failed")]
    Solve {
        block: String,
        #[source]
        source: SolveError,
    },

    /// An observer aborted a sweep at the given equation index.
    #[error("sweep aborted by observer at equation {0}")]
    Aborted(usize),
}

impl Error {
    /// Attaches the block's identity to an error it returned.
    pub(crate) fn from_block<B: Block + ?Sized>(block: &B, err: BlockError) -> Self {
        match err {
            BlockError::Contract(err) => Self::Contract(err),
            BlockError::NotImplemented(direction) => Self::NotImplemented {
                block: block.name().to_owned(),
                direction,
            },
            BlockError::Solve(source) => Self::Solve {
                block: block.name().to_owned(),
                source,
            },
        }
    }
}
