// engine.rs - Translation engine contract
//
// The binary translator is an external component. The bridge sees it
// through two traits: `TranslationEngine`, which the bridge drives, and
// `EngineCallbacks`, which the engine calls while guest code executes.

use crate::context::{EXT_REG_COUNT, GPR_COUNT};
use crate::halt::{HaltFlags, HaltSignal};

/// Engine construction parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    /// Value reported by the guest's processor ID register
    pub processor_id: u32,
    /// Whether the engine should account guest cycles. The bridge has no
    /// tick source, so it always disables this.
    pub enable_cycle_counting: bool,
}

/// Exceptions the engine reports through `EngineCallbacks::exception_raised`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GuestException {
    UndefinedInstruction,
    UnpredictableInstruction,
    DecodeError,
    SendEvent,
    SendEventLocal,
    WaitForInterrupt,
    WaitForEvent,
    Yield,
    Breakpoint,
    PreloadData,
    PreloadDataWithIntentToWrite,
    PreloadInstruction,
    NoExecuteFault,
}

/// Hooks the engine invokes while running guest code.
pub trait EngineCallbacks {
    fn memory_read_8(&mut self, vaddr: u32) -> u8;
    fn memory_read_16(&mut self, vaddr: u32) -> u16;
    fn memory_read_32(&mut self, vaddr: u32) -> u32;
    fn memory_read_64(&mut self, vaddr: u32) -> u64;

    fn memory_write_8(&mut self, vaddr: u32, value: u8);
    fn memory_write_16(&mut self, vaddr: u32, value: u16);
    fn memory_write_32(&mut self, vaddr: u32, value: u32);
    fn memory_write_64(&mut self, vaddr: u32, value: u64);

    /// The guest executed `svc #swi`. The engine must stop at the next
    /// halt check with the SVC bit set.
    fn call_svc(&mut self, swi: u32);

    /// The engine cannot translate `num_instructions` starting at `pc`.
    fn interpreter_fallback(&mut self, pc: u32, num_instructions: usize);

    fn exception_raised(&mut self, pc: u32, exception: GuestException);
}

/// A 32-bit ARM translation engine owning one core's live register state.
pub trait TranslationEngine {
    fn new(config: &EngineConfig) -> Self
    where
        Self: Sized;

    /// Execute guest code until `halt` has bits set, and return those bits.
    ///
    /// The engine reports the reasons but never clears them. It may also
    /// return early with an empty mask when an internal step budget runs
    /// out.
    fn run(&mut self, callbacks: &mut dyn EngineCallbacks, halt: &HaltSignal) -> HaltFlags;

    fn regs(&self) -> &[u32; GPR_COUNT];
    fn regs_mut(&mut self) -> &mut [u32; GPR_COUNT];

    fn ext_regs(&self) -> &[u32; EXT_REG_COUNT];
    fn ext_regs_mut(&mut self) -> &mut [u32; EXT_REG_COUNT];

    fn cpsr(&self) -> u32;
    fn set_cpsr(&mut self, value: u32);

    fn fpscr(&self) -> u32;
    fn set_fpscr(&mut self, value: u32);
}
