use thiserror::Error;

use crate::types::NodeId;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("Group not found: {0}")]
    NotFound(NodeId),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Allocation failure: {0}")]
    AllocationFailure(String),
}

pub type Result<T> = std::result::Result<T, Error>;
