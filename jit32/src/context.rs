// context.rs - A32 register context
//
// Snapshot of one guest thread's architectural state, and the copy to and
// from the engine's live register store. Both sides are 32 bits wide, so
// the copy is verbatim.

use crate::engine::TranslationEngine;

/// Number of general-purpose registers (r0-r15)
pub const GPR_COUNT: usize = 16;
/// Number of 32-bit extended (VFP/NEON) register slots
pub const EXT_REG_COUNT: usize = 64;

pub const SP_INDEX: usize = 13;
pub const LR_INDEX: usize = 14;
pub const PC_INDEX: usize = 15;

/// Saved state of a 32-bit guest thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterContext {
    pub gpr: [u32; GPR_COUNT],
    pub fpr: [u32; EXT_REG_COUNT],
    pub cpsr: u32,
    pub fpscr: u32,
}

impl Default for RegisterContext {
    fn default() -> Self {
        Self {
            gpr: [0; GPR_COUNT],
            fpr: [0; EXT_REG_COUNT],
            cpsr: 0,
            fpscr: 0,
        }
    }
}

impl RegisterContext {
    pub fn pc(&self) -> u32 {
        self.gpr[PC_INDEX]
    }

    pub fn set_pc(&mut self, pc: u32) {
        self.gpr[PC_INDEX] = pc;
    }

    pub fn sp(&self) -> u32 {
        self.gpr[SP_INDEX]
    }

    pub fn set_sp(&mut self, sp: u32) {
        self.gpr[SP_INDEX] = sp;
    }

    pub fn lr(&self) -> u32 {
        self.gpr[LR_INDEX]
    }

    /// Copy the engine's live state into this snapshot.
    pub fn capture<E: TranslationEngine>(&mut self, engine: &E) {
        self.gpr = *engine.regs();
        self.fpr = *engine.ext_regs();
        self.cpsr = engine.cpsr();
        self.fpscr = engine.fpscr();
    }

    /// Overwrite the engine's live state with this snapshot.
    pub fn apply<E: TranslationEngine>(&self, engine: &mut E) {
        *engine.regs_mut() = self.gpr;
        *engine.ext_regs_mut() = self.fpr;
        engine.set_cpsr(self.cpsr);
        engine.set_fpscr(self.fpscr);
    }
}
