// jit32 - Execution bridge between a 32-bit ARM translation engine and the
// emulated kernel
//
// One `Jit32` drives one guest core. It owns the engine, hands it the
// callback set for memory access and supervisor calls, and interprets the
// halt the engine returns.
//
// # Architecture
//
// 1. **Register context** (`context.rs`): saved A32 thread state and the
//    verbatim copy to/from the engine's live registers
// 2. **Guest memory** (`memory.rs`): flat host window, width-typed loads and
//    stores with an aligned fast path and an unaligned fallback
// 3. **Halt signal** (`halt.rs`): halt reasons, the engine-native bitmask,
//    and the atomic signal other threads use to preempt a core
// 4. **SVC dispatch** (`svc.rs`): immutable SVC table, 32 <-> 64-bit
//    register window marshalling
// 5. **Execution driver** (`jit32.rs`): run loop and engine callbacks
//
// The engine (`engine.rs`) and the guest process (`process.rs`) are
// external collaborators, seen only through traits. `elf.rs` loads a guest
// image into a memory window and prepares the first thread's context.
//
// # Halt protocol
//
// The engine returns when any halt bit is set and reports the bits it saw.
// The driver clears exactly those bits, dispatches the captured SVC number
// when the SVC bit was among them, and returns the flags to the owner.

pub mod context;
pub mod elf;
pub mod engine;
pub mod error;
pub mod halt;
pub mod jit32;
pub mod memory;
pub mod process;
pub mod svc;

#[cfg(test)]
mod testing;

pub use context::RegisterContext;
pub use engine::{EngineCallbacks, EngineConfig, GuestException, TranslationEngine};
pub use error::{Jit32Error, MemoryError};
pub use halt::{HaltFlags, HaltReason, HaltSignal};
pub use jit32::Jit32;
pub use memory::GuestMemory;
pub use process::{GuestProcess, KillReason};
pub use svc::{SvcContext, SvcDescriptor, SvcTable};
