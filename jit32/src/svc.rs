// svc.rs - Supervisor call table and dispatch
//
// SVC handlers are written against a 64-bit register window shared with
// 64-bit guests. A 32-bit core widens its registers into that window before
// the call and narrows them back afterwards.

use crate::context::GPR_COUNT;
use crate::error::Jit32Error;
use std::fmt;
use tracing::trace;

/// Argument and return registers of one SVC invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SvcContext {
    pub regs: [u64; GPR_COUNT],
}

impl SvcContext {
    /// Zero-extend each guest register into its 64-bit slot.
    pub fn from_guest(regs: &[u32; GPR_COUNT]) -> Self {
        Self {
            regs: regs.map(u64::from),
        }
    }

    /// Truncate each slot back into the guest register file.
    pub fn apply_to(&self, regs: &mut [u32; GPR_COUNT]) {
        for (guest, &slot) in regs.iter_mut().zip(self.regs.iter()) {
            *guest = slot as u32;
        }
    }
}

/// Host implementation of one SVC
pub type SvcFunction<S> = fn(&S, &mut SvcContext);

pub struct SvcDescriptor<S> {
    pub name: &'static str,
    pub function: SvcFunction<S>,
}

impl<S> Clone for SvcDescriptor<S> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<S> Copy for SvcDescriptor<S> {}

impl<S> fmt::Debug for SvcDescriptor<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SvcDescriptor").field("name", &self.name).finish()
    }
}

/// SVC number to handler mapping, immutable once built.
pub struct SvcTable<S> {
    entries: Box<[Option<SvcDescriptor<S>>]>,
}

impl<S> SvcTable<S> {
    pub fn builder() -> SvcTableBuilder<S> {
        SvcTableBuilder::new()
    }

    /// Look up `swi`. Numbers past the end of the table and empty slots are
    /// both unimplemented.
    pub fn get(&self, swi: u32) -> Option<&SvcDescriptor<S>> {
        self.entries.get(swi as usize)?.as_ref()
    }

    /// Number of slots, implemented or not
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Implemented SVCs in number order
    pub fn iter(&self) -> impl Iterator<Item = (u32, &SvcDescriptor<S>)> {
        self.entries
            .iter()
            .enumerate()
            .filter_map(|(swi, entry)| entry.as_ref().map(|svc| (swi as u32, svc)))
    }
}

impl<S> fmt::Debug for SvcTable<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.iter().map(|(swi, svc)| (swi, svc.name)))
            .finish()
    }
}

pub struct SvcTableBuilder<S> {
    entries: Vec<Option<SvcDescriptor<S>>>,
}

impl<S> SvcTableBuilder<S> {
    pub fn new() -> Self {
        Self { entries: Vec::new() }
    }

    /// Reserve slots up to `len` so the table covers the full SVC range
    /// even when the last numbers are unimplemented.
    pub fn with_len(mut self, len: usize) -> Self {
        if self.entries.len() < len {
            self.entries.resize_with(len, || None);
        }
        self
    }

    /// Register `function` as SVC `swi`, replacing any earlier entry.
    pub fn with(mut self, swi: u32, name: &'static str, function: SvcFunction<S>) -> Self {
        let index = swi as usize;
        if self.entries.len() <= index {
            self.entries.resize_with(index + 1, || None);
        }
        self.entries[index] = Some(SvcDescriptor { name, function });
        self
    }

    pub fn build(self) -> SvcTable<S> {
        SvcTable {
            entries: self.entries.into_boxed_slice(),
        }
    }
}

impl<S> Default for SvcTableBuilder<S> {
    fn default() -> Self {
        Self::new()
    }
}

/// Run SVC `swi` against the guest register file `regs`.
pub fn dispatch<S>(
    table: &SvcTable<S>,
    state: &S,
    regs: &mut [u32; GPR_COUNT],
    swi: u32,
) -> Result<(), Jit32Error> {
    let Some(svc) = table.get(swi) else {
        return Err(Jit32Error::UnimplementedSvc { swi });
    };

    let _span = tracing::trace_span!("svc", name = svc.name, swi).entered();
    trace!("{}", svc.name);

    let mut ctx = SvcContext::from_guest(regs);
    (svc.function)(state, &mut ctx);
    ctx.apply_to(regs);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Minimal state: counts handler invocations.
    #[derive(Default)]
    struct Counter {
        calls: AtomicU32,
    }

    fn add(state: &Counter, ctx: &mut SvcContext) {
        state.calls.fetch_add(1, Ordering::Relaxed);
        ctx.regs[0] += ctx.regs[1];
    }

    fn set_high_bits(_: &Counter, ctx: &mut SvcContext) {
        ctx.regs[0] = 0xFFFF_FFFF_0000_0001;
        ctx.regs[15] = 0x1_0000_0000;
    }

    fn check_zero_extended(_: &Counter, ctx: &mut SvcContext) {
        // Guest values with the sign bit set must not be sign-extended.
        ctx.regs[1] = ctx.regs[0] >> 32;
    }

    fn table() -> SvcTable<Counter> {
        SvcTable::builder()
            .with(0x01, "Add", add)
            .with(0x03, "Truncate", set_high_bits)
            .with(0x06, "HighWord", check_zero_extended)
            .with_len(0x80)
            .build()
    }

    #[test]
    fn test_add_scenario() {
        let table = table();
        let state = Counter::default();
        let mut regs = [0u32; GPR_COUNT];
        for (i, reg) in regs.iter_mut().enumerate() {
            *reg = 100 + i as u32;
        }
        regs[0] = 5;
        regs[1] = 7;
        let before = regs;

        dispatch(&table, &state, &mut regs, 0x01).unwrap();

        assert_eq!(regs[0], 12);
        assert_eq!(&regs[1..], &before[1..]);
        assert_eq!(state.calls.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_results_truncated_to_32_bits() {
        let table = table();
        let mut regs = [0u32; GPR_COUNT];
        dispatch(&table, &Counter::default(), &mut regs, 0x03).unwrap();
        assert_eq!(regs[0], 1);
        assert_eq!(regs[15], 0);
    }

    #[test]
    fn test_arguments_zero_extended() {
        let table = table();
        let mut regs = [0u32; GPR_COUNT];
        regs[0] = 0x8000_0000;
        dispatch(&table, &Counter::default(), &mut regs, 0x06).unwrap();
        assert_eq!(regs[1], 0);
        assert_eq!(regs[0], 0x8000_0000);
    }

    #[test]
    fn test_empty_slot_is_unimplemented() {
        let table = table();
        let mut regs = [0u32; GPR_COUNT];
        assert_eq!(
            dispatch(&table, &Counter::default(), &mut regs, 0x02),
            Err(Jit32Error::UnimplementedSvc { swi: 0x02 })
        );
    }

    #[test]
    fn test_table_shape() {
        let table = table();
        assert_eq!(table.len(), 0x80);
        assert_eq!(
            table.iter().map(|(swi, svc)| (swi, svc.name)).collect::<Vec<_>>(),
            vec![(0x01, "Add"), (0x03, "Truncate"), (0x06, "HighWord")]
        );
        assert!(table.get(0x7F).is_none());
    }

    #[test]
    fn test_later_registration_replaces() {
        let table: SvcTable<Counter> = SvcTable::builder()
            .with(0x01, "First", add)
            .with(0x01, "Second", add)
            .build();
        assert_eq!(table.get(0x01).map(|svc| svc.name), Some("Second"));
    }

    proptest! {
        #[test]
        fn prop_out_of_range_is_unimplemented(swi in 0x80u32..) {
            let table = table();
            let state = Counter::default();
            let mut regs = [0x5555_5555u32; GPR_COUNT];

            let result = dispatch(&table, &state, &mut regs, swi);

            prop_assert_eq!(result, Err(Jit32Error::UnimplementedSvc { swi }));
            prop_assert_eq!(regs, [0x5555_5555u32; GPR_COUNT]);
            prop_assert_eq!(state.calls.load(Ordering::Relaxed), 0);
        }

        #[test]
        fn prop_widen_narrow_is_identity(regs in prop::array::uniform16(any::<u32>())) {
            let ctx = SvcContext::from_guest(&regs);
            prop_assert!(ctx.regs.iter().all(|&slot| slot >> 32 == 0));
            let mut back = [0u32; GPR_COUNT];
            ctx.apply_to(&mut back);
            prop_assert_eq!(back, regs);
        }
    }
}
