// testing.rs - Test doubles for the engine and the guest process
//
// `ScriptedEngine` stands in for a real translator: each queued action is
// one "instruction" that touches registers, memory or the callbacks.
// Between actions it checks the halt signal the way a real engine checks at
// block boundaries.

use crate::context::{EXT_REG_COUNT, GPR_COUNT};
use crate::engine::{EngineCallbacks, EngineConfig, TranslationEngine};
use crate::halt::{HaltFlags, HaltSignal};
use crate::memory::GuestMemory;
use crate::process::{GuestProcess, KillReason};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, OnceLock};

/// Live register state of the scripted engine.
pub struct EngineRegs {
    pub gpr: [u32; GPR_COUNT],
    pub ext: [u32; EXT_REG_COUNT],
    pub cpsr: u32,
    pub fpscr: u32,
}

pub type Action = Box<dyn FnMut(&mut EngineRegs, &mut dyn EngineCallbacks, &HaltSignal) + Send>;

pub struct ScriptedEngine {
    pub config: EngineConfig,
    pub regs: EngineRegs,
    script: VecDeque<Action>,
    /// Number of actions executed over the engine's lifetime.
    pub executed: usize,
}

impl ScriptedEngine {
    pub fn push<F>(&mut self, action: F)
    where
        F: FnMut(&mut EngineRegs, &mut dyn EngineCallbacks, &HaltSignal) + Send + 'static,
    {
        self.script.push_back(Box::new(action));
    }

    pub fn remaining(&self) -> usize {
        self.script.len()
    }
}

impl TranslationEngine for ScriptedEngine {
    fn new(config: &EngineConfig) -> Self {
        Self {
            config: *config,
            regs: EngineRegs {
                gpr: [0; GPR_COUNT],
                ext: [0; EXT_REG_COUNT],
                cpsr: 0,
                fpscr: 0,
            },
            script: VecDeque::new(),
            executed: 0,
        }
    }

    fn run(&mut self, callbacks: &mut dyn EngineCallbacks, halt: &HaltSignal) -> HaltFlags {
        loop {
            let pending = halt.pending();
            if !pending.is_empty() {
                return pending;
            }
            // Out of script: behave like an exhausted step budget.
            let Some(mut action) = self.script.pop_front() else {
                return pending;
            };
            action(&mut self.regs, callbacks, halt);
            self.executed += 1;
        }
    }

    fn regs(&self) -> &[u32; GPR_COUNT] {
        &self.regs.gpr
    }

    fn regs_mut(&mut self) -> &mut [u32; GPR_COUNT] {
        &mut self.regs.gpr
    }

    fn ext_regs(&self) -> &[u32; EXT_REG_COUNT] {
        &self.regs.ext
    }

    fn ext_regs_mut(&mut self) -> &mut [u32; EXT_REG_COUNT] {
        &mut self.regs.ext
    }

    fn cpsr(&self) -> u32 {
        self.regs.cpsr
    }

    fn set_cpsr(&mut self, value: u32) {
        self.regs.cpsr = value;
    }

    fn fpscr(&self) -> u32 {
        self.regs.fpscr
    }

    fn set_fpscr(&mut self, value: u32) {
        self.regs.fpscr = value;
    }
}

/// Guest process with a small window that records kill requests.
pub struct TestProcess {
    memory: GuestMemory,
    pub kills: Mutex<Vec<KillReason>>,
    /// Halt signal of the core running in this process, for handlers that
    /// stop their own core.
    pub halt: OnceLock<Arc<HaltSignal>>,
}

impl TestProcess {
    pub fn new(memory_size: usize) -> Self {
        Self {
            memory: GuestMemory::new(memory_size).unwrap(),
            kills: Mutex::new(Vec::new()),
            halt: OnceLock::new(),
        }
    }

    pub fn kills(&self) -> Vec<KillReason> {
        self.kills.lock().unwrap().clone()
    }
}

impl GuestProcess for TestProcess {
    fn memory(&self) -> &GuestMemory {
        &self.memory
    }

    fn kill(&self, reason: KillReason) {
        self.kills.lock().unwrap().push(reason);
    }
}
