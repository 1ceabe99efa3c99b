// jit32.rs - Execution driver for one 32-bit guest core
//
// Owns the translation engine of a single core, hands it the callback set
// on every run, and routes the halt it comes back with. SVCs are the only
// halt reason acted on here; everything else is returned to the owner.

use crate::context::{RegisterContext, PC_INDEX, SP_INDEX};
use crate::engine::{EngineCallbacks, EngineConfig, GuestException, TranslationEngine};
use crate::error::Jit32Error;
use crate::halt::{HaltFlags, HaltReason, HaltSignal};
use crate::process::{GuestProcess, KillReason};
use crate::svc::{self, SvcTable};
use std::sync::Arc;
use tracing::{error, trace, warn};

/// The callback half of a core, borrowed by the engine while it runs.
struct CoreCallbacks<S> {
    state: Arc<S>,
    halt: Arc<HaltSignal>,
    /// SVC number captured by the last `call_svc`
    last_swi: u32,
    /// Set when the engine requested an interpreter fallback during a run
    fallback: Option<Jit32Error>,
}

impl<S: GuestProcess> EngineCallbacks for CoreCallbacks<S> {
    #[inline]
    fn memory_read_8(&mut self, vaddr: u32) -> u8 {
        self.state.memory().read(vaddr)
    }

    #[inline]
    fn memory_read_16(&mut self, vaddr: u32) -> u16 {
        self.state.memory().read(vaddr)
    }

    #[inline]
    fn memory_read_32(&mut self, vaddr: u32) -> u32 {
        self.state.memory().read(vaddr)
    }

    #[inline]
    fn memory_read_64(&mut self, vaddr: u32) -> u64 {
        self.state.memory().read(vaddr)
    }

    #[inline]
    fn memory_write_8(&mut self, vaddr: u32, value: u8) {
        self.state.memory().write(vaddr, value)
    }

    #[inline]
    fn memory_write_16(&mut self, vaddr: u32, value: u16) {
        self.state.memory().write(vaddr, value)
    }

    #[inline]
    fn memory_write_32(&mut self, vaddr: u32, value: u32) {
        self.state.memory().write(vaddr, value)
    }

    #[inline]
    fn memory_write_64(&mut self, vaddr: u32, value: u64) {
        self.state.memory().write(vaddr, value)
    }

    fn call_svc(&mut self, swi: u32) {
        self.last_swi = swi;
        self.halt.request(HaltReason::Svc);
    }

    fn interpreter_fallback(&mut self, pc: u32, num_instructions: usize) {
        // Never expected in practice; no interpreter backs the engine.
        error!(
            pc = format_args!("0x{pc:08X}"),
            num_instructions, "interpreter fallback requested, killing process"
        );
        self.state.kill(KillReason::InterpreterFallback { pc });
        self.fallback = Some(Jit32Error::InterpreterFallback {
            pc,
            num_instructions,
        });
        self.halt.request(HaltReason::Preempted);
    }

    fn exception_raised(&mut self, pc: u32, exception: GuestException) {
        // TODO: forward undefined-instruction and breakpoint exceptions to
        // the kernel's guest exception handling once it exists.
        warn!(pc = format_args!("0x{pc:08X}"), ?exception, "guest exception ignored");
    }
}

/// One 32-bit guest core backed by a translation engine `E`, running in
/// guest process `S`.
pub struct Jit32<E, S> {
    core_id: u32,
    state: Arc<S>,
    svc_table: Arc<SvcTable<S>>,
    halt: Arc<HaltSignal>,
    engine: E,
    callbacks: CoreCallbacks<S>,
}

impl<E: TranslationEngine, S: GuestProcess> Jit32<E, S> {
    pub fn new(state: Arc<S>, svc_table: Arc<SvcTable<S>>, core_id: u32) -> Self {
        let halt = Arc::new(HaltSignal::new());
        let callbacks = CoreCallbacks {
            state: Arc::clone(&state),
            halt: Arc::clone(&halt),
            last_swi: 0,
            fallback: None,
        };

        Self {
            core_id,
            state,
            svc_table,
            halt,
            engine: Self::make_engine(core_id),
            callbacks,
        }
    }

    fn make_engine(core_id: u32) -> E {
        let config = EngineConfig {
            processor_id: core_id,
            enable_cycle_counting: false,
        };
        E::new(&config)
    }

    pub fn core_id(&self) -> u32 {
        self.core_id
    }

    pub fn state(&self) -> &Arc<S> {
        &self.state
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut E {
        &mut self.engine
    }

    /// Run guest code until the engine halts, then handle the halt.
    ///
    /// Returns the halt flags the engine stopped with, which have already
    /// been cleared from the signal. An SVC is dispatched before returning;
    /// any other reason is only logged. Errors are fatal to the guest
    /// process, which has been killed by the time they are returned.
    pub fn run(&mut self) -> Result<HaltFlags, Jit32Error> {
        let flags = self.engine.run(&mut self.callbacks, &self.halt);
        self.halt.clear_flags(flags);

        if let Some(err) = self.callbacks.fallback.take() {
            return Err(err);
        }

        if flags.contains(HaltReason::Svc) {
            let swi = self.callbacks.last_swi;
            if let Err(err) = self.svc_handler(swi) {
                error!(core = self.core_id, "{err}");
                self.state.kill(KillReason::UnimplementedSvc { swi });
                return Err(err);
            }
        }

        let unhandled = flags.without(HaltReason::Svc);
        if !unhandled.is_empty() {
            error!(core = self.core_id, "JIT halted: {unhandled}");
        }

        Ok(flags)
    }

    fn svc_handler(&mut self, swi: u32) -> Result<(), Jit32Error> {
        svc::dispatch(
            self.svc_table.as_ref(),
            self.state.as_ref(),
            self.engine.regs_mut(),
            swi,
        )
    }

    /// Ask the engine to stop. Use `halt_handle` to do this from another
    /// thread while `run` is executing.
    pub fn halt_execution(&self, reason: HaltReason) {
        self.halt.request(reason);
    }

    pub fn clear_halt(&self, reason: HaltReason) {
        self.halt.clear(reason);
    }

    pub fn pending_halt(&self) -> HaltFlags {
        self.halt.pending()
    }

    /// Shared handle to this core's halt signal.
    pub fn halt_handle(&self) -> Arc<HaltSignal> {
        Arc::clone(&self.halt)
    }

    pub fn save_context(&self, context: &mut RegisterContext) {
        context.capture(&self.engine);
        trace!(core = self.core_id, pc = format_args!("0x{:08X}", context.pc()), "saved context");
    }

    pub fn restore_context(&mut self, context: &RegisterContext) {
        context.apply(&mut self.engine);
        trace!(core = self.core_id, pc = format_args!("0x{:08X}", context.pc()), "restored context");
    }

    pub fn set_thread_pointer(&mut self, _thread_ptr: u32) {
        // TODO: implement coprocessor 15 (TPIDRURO)
    }

    pub fn set_tls_pointer(&mut self, _tls_ptr: u32) {
        // TODO: implement coprocessor 15 (TPIDRURW)
    }

    pub fn pc(&self) -> u32 {
        self.register(PC_INDEX)
    }

    pub fn set_pc(&mut self, pc: u32) {
        self.set_register(PC_INDEX, pc)
    }

    pub fn sp(&self) -> u32 {
        self.register(SP_INDEX)
    }

    pub fn set_sp(&mut self, sp: u32) {
        self.set_register(SP_INDEX, sp)
    }

    /// Read general-purpose register `index` (0-15) of the live state.
    pub fn register(&self, index: usize) -> u32 {
        self.engine.regs()[index]
    }

    pub fn set_register(&mut self, index: usize, value: u32) {
        self.engine.regs_mut()[index] = value;
    }
}
