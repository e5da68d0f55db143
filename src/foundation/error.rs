//! IR Foundation Error Types

use thiserror::Error;

/// Errors raised by foundation-level IR mutations
#[derive(Error, Debug)]
pub enum IrError {
    /// A module with this name already exists in the context
    #[error("Module already exists: {0}")]
    ModuleExists(String),

    /// The 11-bit base-id space of the type registry is full
    #[error("Type registry exhausted: no base ids left")]
    TypeSpaceExhausted,

    /// A type id did not resolve to a registered compound type
    #[error("Unknown compound type id: {0:#06x}")]
    UnknownType(u16),

    /// A placeholder passed to complete_type was never reserved
    #[error("Type id {0:#06x} was not reserved")]
    NotReserved(u16),
}

/// Result type for foundation operations
pub type IrResult<T> = Result<T, IrError>;
