// error.rs - Error types for the execution bridge
//
// Only conditions that are fatal to the guest process surface as errors.
// Everything else (unhandled halt reasons, raised exceptions) is reported
// through the halt flags and the log.

use thiserror::Error;

/// Conditions that abort the current execution attempt of a core.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Jit32Error {
    /// The guest issued an SVC with no entry in the table.
    #[error("Unimplemented SVC 0x{swi:X}")]
    UnimplementedSvc { swi: u32 },

    /// The engine asked for instruction-level interpretation.
    #[error("Interpreter fallback requested at PC 0x{pc:08X} ({num_instructions} instructions)")]
    InterpreterFallback { pc: u32, num_instructions: usize },
}

/// Failures while allocating a guest memory window
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MemoryError {
    #[error("guest memory window must not be empty")]
    Empty,

    #[error("guest memory window of {size} bytes exceeds the host address space")]
    TooLarge { size: usize },

    #[error("failed to allocate {size} bytes of guest memory")]
    AllocationFailed { size: usize },
}
