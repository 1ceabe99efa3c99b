// halt.rs - Halt reasons and the halt signal
//
// The engine runs until one or more halt bits are set, then returns the
// bits it saw. Bits are set with `request` (from the execution path itself
// or from another thread) and removed with `clear`; both are single atomic
// read-modify-write operations on one word.

use std::fmt;
use std::ops::BitOr;
use std::sync::atomic::{AtomicU32, Ordering};

/// Why the engine stopped executing guest code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum HaltReason {
    /// Single step completed
    Step = 0,
    CacheInvalidation = 1,
    /// Unrecoverable memory fault
    MemoryAbort = 2,
    /// The guest executed an SVC; the number is held by the core
    Svc = 3,
    /// Pause requested from outside the core (preemption, interrupt)
    Preempted = 4,
    /// Breakpoint or watchpoint hit
    Breakpoint = 5,
}

/// Engine-native bit of every halt reason, indexed by the reason's
/// discriminant. This is the only place the mapping is written down.
const HALT_REASON_BITS: [(HaltReason, u32); 6] = [
    (HaltReason::Step, 0x0000_0001),
    (HaltReason::CacheInvalidation, 0x0000_0002),
    (HaltReason::MemoryAbort, 0x0000_0004),
    (HaltReason::Svc, 0x0100_0000),
    (HaltReason::Preempted, 0x0200_0000),
    (HaltReason::Breakpoint, 0x0400_0000),
];

/// Every bit that maps to a named reason.
const KNOWN_BITS: u32 = {
    let mut bits = 0;
    let mut i = 0;
    while i < HALT_REASON_BITS.len() {
        bits |= HALT_REASON_BITS[i].1;
        i += 1;
    }
    bits
};

impl HaltReason {
    pub const ALL: [HaltReason; 6] = [
        HaltReason::Step,
        HaltReason::CacheInvalidation,
        HaltReason::MemoryAbort,
        HaltReason::Svc,
        HaltReason::Preempted,
        HaltReason::Breakpoint,
    ];

    /// Engine-native bit for this reason
    pub const fn bit(self) -> u32 {
        HALT_REASON_BITS[self as usize].1
    }

    /// Reason for a single engine-native bit, if it has a name.
    pub fn from_bit(bit: u32) -> Option<HaltReason> {
        HALT_REASON_BITS
            .iter()
            .find(|&&(_, b)| b == bit)
            .map(|&(reason, _)| reason)
    }

    pub fn name(self) -> &'static str {
        match self {
            HaltReason::Step => "Step",
            HaltReason::CacheInvalidation => "CacheInvalidation",
            HaltReason::MemoryAbort => "MemoryAbort",
            HaltReason::Svc => "Svc",
            HaltReason::Preempted => "Preempted",
            HaltReason::Breakpoint => "Breakpoint",
        }
    }
}

impl fmt::Display for HaltReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The engine-native halt bitmask.
///
/// Several reasons can be pending at once. Bits without a named reason are
/// preserved as-is so that no engine-defined reason is lost in conversion.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct HaltFlags(u32);

impl HaltFlags {
    pub const NONE: HaltFlags = HaltFlags(0);

    pub const fn from_bits(bits: u32) -> Self {
        HaltFlags(bits)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub const fn contains(self, reason: HaltReason) -> bool {
        self.0 & reason.bit() != 0
    }

    pub const fn with(self, reason: HaltReason) -> Self {
        HaltFlags(self.0 | reason.bit())
    }

    pub const fn without(self, reason: HaltReason) -> Self {
        HaltFlags(self.0 & !reason.bit())
    }

    /// Named reasons present in the mask, in table order.
    pub fn reasons(self) -> impl Iterator<Item = HaltReason> {
        HaltReason::ALL.into_iter().filter(move |&r| self.contains(r))
    }

    /// Bits set in the mask that have no named reason.
    pub const fn unknown_bits(self) -> u32 {
        self.0 & !KNOWN_BITS
    }

    /// The reason, when exactly one named bit and nothing else is set.
    pub fn single(self) -> Option<HaltReason> {
        if self.0.count_ones() == 1 {
            HaltReason::from_bit(self.0)
        } else {
            None
        }
    }
}

impl From<HaltReason> for HaltFlags {
    fn from(reason: HaltReason) -> Self {
        HaltFlags(reason.bit())
    }
}

impl BitOr for HaltFlags {
    type Output = HaltFlags;

    fn bitor(self, rhs: HaltFlags) -> HaltFlags {
        HaltFlags(self.0 | rhs.0)
    }
}

impl BitOr<HaltReason> for HaltFlags {
    type Output = HaltFlags;

    fn bitor(self, rhs: HaltReason) -> HaltFlags {
        self.with(rhs)
    }
}

impl BitOr for HaltReason {
    type Output = HaltFlags;

    fn bitor(self, rhs: HaltReason) -> HaltFlags {
        HaltFlags::from(self).with(rhs)
    }
}

impl fmt::Display for HaltFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("None");
        }

        let mut first = true;
        for reason in self.reasons() {
            if !first {
                f.write_str(" | ")?;
            }
            f.write_str(reason.name())?;
            first = false;
        }

        let unknown = self.unknown_bits();
        if unknown != 0 {
            if !first {
                f.write_str(" | ")?;
            }
            write!(f, "0x{unknown:08X}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for HaltFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HaltFlags({self})")
    }
}

/// Pending halt bits shared between a core and whoever may stop it.
///
/// `Running` is the empty mask; any set bit means the engine must return at
/// its next check. There is no terminal state.
#[derive(Debug, Default)]
pub struct HaltSignal {
    bits: AtomicU32,
}

impl HaltSignal {
    pub const fn new() -> Self {
        Self {
            bits: AtomicU32::new(0),
        }
    }

    /// Set the bit for `reason`, returning the mask as it was before.
    pub fn request(&self, reason: HaltReason) -> HaltFlags {
        self.request_flags(reason.into())
    }

    pub fn request_flags(&self, flags: HaltFlags) -> HaltFlags {
        HaltFlags(self.bits.fetch_or(flags.bits(), Ordering::AcqRel))
    }

    /// Remove exactly the bit for `reason`; other pending bits stay.
    pub fn clear(&self, reason: HaltReason) -> HaltFlags {
        self.clear_flags(reason.into())
    }

    pub fn clear_flags(&self, flags: HaltFlags) -> HaltFlags {
        HaltFlags(self.bits.fetch_and(!flags.bits(), Ordering::AcqRel))
    }

    pub fn pending(&self) -> HaltFlags {
        HaltFlags(self.bits.load(Ordering::Acquire))
    }

    pub fn is_halted(&self) -> bool {
        !self.pending().is_empty()
    }
}
