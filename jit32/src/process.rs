// process.rs - Guest process contract
//
// The part of the guest process a core needs: its memory window, and a way
// to terminate it when the core hits a fatal condition.

use crate::memory::GuestMemory;

/// Why a core asked for its process to be terminated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KillReason {
    /// An SVC without a table entry (a missing host feature)
    UnimplementedSvc { swi: u32 },
    /// The engine requested interpretation, which the bridge does not support
    InterpreterFallback { pc: u32 },
}

/// Shared process and device state handed to every core and SVC handler.
pub trait GuestProcess: Send + Sync {
    fn memory(&self) -> &GuestMemory;

    /// Terminate every thread of the process. Must not block on the calling
    /// core, which is still inside its run loop.
    fn kill(&self, reason: KillReason);
}
