// memory.rs - Guest memory window
//
// The guest's 32-bit address space is represented by one flat host
// allocation: guest address 0 is the window base. The engine's memory
// callbacks land here, so the load/store paths are kept small enough to
// inline into them.
//
// Every access is a relaxed atomic operation, so cores of one process may
// touch the same bytes concurrently. Naturally aligned accesses compile to
// plain loads and stores on the common hosts.

use crate::error::MemoryError;
use std::alloc::{self, Layout};
use std::fmt;
use std::mem::size_of;
use std::ptr::NonNull;
use std::slice;
use std::sync::atomic::{AtomicU16, AtomicU32, AtomicU64, AtomicU8, Ordering};

/// Alignment of the window base. Must cover the widest access (64-bit).
const WINDOW_ALIGN: usize = 4096;

mod sealed {
    use std::sync::atomic::AtomicU8;

    pub trait Sealed: Sized {
        /// Load element `index` of the window viewed as an array of `Self`.
        ///
        /// # Safety
        /// `base` must be aligned for `Self` and element `index` must lie
        /// inside the window.
        unsafe fn load_aligned(base: *const AtomicU8, index: usize) -> Self;

        /// # Safety
        /// Same as `load_aligned`.
        unsafe fn store_aligned(base: *const AtomicU8, index: usize, value: Self);

        /// Assemble a value from `size_of::<Self>()` cells, host byte order.
        fn load_cells(cells: &[AtomicU8]) -> Self;

        fn store_cells(cells: &[AtomicU8], value: Self);
    }
}

/// An integer width the guest can load or store (8, 16, 32 or 64 bits).
pub trait AccessWidth: Copy + sealed::Sealed {
    /// Number of bits needed to encode the byte size minus one,
    /// i.e. log2 of the width in bytes.
    const SHIFT: u32;
    /// Low address bits that must be clear for a naturally aligned access.
    const ALIGN_MASK: u32 = (1 << Self::SHIFT) - 1;
}

macro_rules! impl_access_width {
    ($($ty:ty => $atomic:ty),*) => {
        $(
            impl sealed::Sealed for $ty {
                #[inline(always)]
                unsafe fn load_aligned(base: *const AtomicU8, index: usize) -> Self {
                    (*base.cast::<$atomic>().add(index)).load(Ordering::Relaxed)
                }

                #[inline(always)]
                unsafe fn store_aligned(base: *const AtomicU8, index: usize, value: Self) {
                    (*base.cast::<$atomic>().add(index)).store(value, Ordering::Relaxed)
                }

                #[inline(always)]
                fn load_cells(cells: &[AtomicU8]) -> Self {
                    let mut raw = [0u8; size_of::<$ty>()];
                    for (byte, cell) in raw.iter_mut().zip(cells) {
                        *byte = cell.load(Ordering::Relaxed);
                    }
                    <$ty>::from_ne_bytes(raw)
                }

                #[inline(always)]
                fn store_cells(cells: &[AtomicU8], value: Self) {
                    for (cell, byte) in cells.iter().zip(value.to_ne_bytes()) {
                        cell.store(byte, Ordering::Relaxed);
                    }
                }
            }

            impl AccessWidth for $ty {
                const SHIFT: u32 = size_of::<$ty>().trailing_zeros();
            }
        )*
    };
}

impl_access_width!(u8 => AtomicU8, u16 => AtomicU16, u32 => AtomicU32, u64 => AtomicU64);

/// Host memory backing a guest address space.
///
/// The window is owned by the guest process and shared by every core that
/// executes in it. Accesses are not validated against guest mappings; the
/// only check is that the access stays inside the host allocation, and
/// violating that panics. Accesses from different cores are atomic per
/// naturally aligned element and unordered with respect to each other.
pub struct GuestMemory {
    base: NonNull<u8>,
    layout: Layout,
}

// SAFETY: the allocation is exclusively owned by this value and lives until
// drop. All reads and writes go through atomic cells, so concurrent access
// from several threads is free of data races.
unsafe impl Send for GuestMemory {}
unsafe impl Sync for GuestMemory {}

impl GuestMemory {
    /// Allocate a zero-filled window of `len` bytes.
    pub fn new(len: usize) -> Result<Self, MemoryError> {
        if len == 0 {
            return Err(MemoryError::Empty);
        }

        let layout = Layout::from_size_align(len, WINDOW_ALIGN)
            .map_err(|_| MemoryError::TooLarge { size: len })?;

        // SAFETY: layout has a non-zero size.
        let ptr = unsafe { alloc::alloc_zeroed(layout) };
        let base = NonNull::new(ptr).ok_or(MemoryError::AllocationFailed { size: len })?;

        Ok(Self { base, layout })
    }

    /// Window length in bytes
    pub fn len(&self) -> usize {
        self.layout.size()
    }

    pub fn is_empty(&self) -> bool {
        self.layout.size() == 0
    }

    /// Host address of guest address 0. Accesses made through it bypass the
    /// atomic cells and must not race with running cores.
    pub fn as_ptr(&self) -> *mut u8 {
        self.base.as_ptr()
    }

    /// The whole window as atomic byte cells.
    #[inline(always)]
    fn cells(&self) -> &[AtomicU8] {
        // SAFETY: the allocation is `len` initialized bytes, and AtomicU8
        // has the size and alignment of u8.
        unsafe { slice::from_raw_parts(self.base.as_ptr().cast::<AtomicU8>(), self.len()) }
    }

    /// Cells `vaddr..vaddr + size`, panicking when they leave the window.
    #[inline(always)]
    #[track_caller]
    fn range(&self, vaddr: u32, size: usize) -> &[AtomicU8] {
        let end = vaddr as u64 + size as u64;
        assert!(
            end <= self.len() as u64,
            "guest access 0x{vaddr:08X}+{size} outside the {}-byte memory window",
            self.len()
        );
        &self.cells()[vaddr as usize..end as usize]
    }

    /// Load a value of width `T` at `vaddr`.
    ///
    /// Naturally aligned addresses index the window as an array of `T`;
    /// anything else falls back to a byte-wise copy.
    #[inline(always)]
    #[track_caller]
    pub fn read<T: AccessWidth>(&self, vaddr: u32) -> T {
        let cells = self.range(vaddr, size_of::<T>());

        if vaddr & T::ALIGN_MASK == 0 {
            // SAFETY: in bounds (checked above); the base is aligned to
            // WINDOW_ALIGN and the index is a whole number of elements, so
            // the element pointer is aligned for T.
            unsafe { T::load_aligned(self.cells().as_ptr(), (vaddr >> T::SHIFT) as usize) }
        } else {
            T::load_cells(cells)
        }
    }

    /// Store `value` of width `T` at `vaddr`.
    #[inline(always)]
    #[track_caller]
    pub fn write<T: AccessWidth>(&self, vaddr: u32, value: T) {
        let cells = self.range(vaddr, size_of::<T>());

        if vaddr & T::ALIGN_MASK == 0 {
            // SAFETY: see `read`.
            unsafe { T::store_aligned(self.cells().as_ptr(), (vaddr >> T::SHIFT) as usize, value) }
        } else {
            T::store_cells(cells, value)
        }
    }

    pub fn read_8(&self, vaddr: u32) -> u8 {
        self.read(vaddr)
    }

    pub fn read_16(&self, vaddr: u32) -> u16 {
        self.read(vaddr)
    }

    pub fn read_32(&self, vaddr: u32) -> u32 {
        self.read(vaddr)
    }

    pub fn read_64(&self, vaddr: u32) -> u64 {
        self.read(vaddr)
    }

    pub fn write_8(&self, vaddr: u32, value: u8) {
        self.write(vaddr, value)
    }

    pub fn write_16(&self, vaddr: u32, value: u16) {
        self.write(vaddr, value)
    }

    pub fn write_32(&self, vaddr: u32, value: u32) {
        self.write(vaddr, value)
    }

    pub fn write_64(&self, vaddr: u32, value: u64) {
        self.write(vaddr, value)
    }

    /// Copy `buf.len()` bytes starting at `vaddr` out of the window.
    #[track_caller]
    pub fn read_bytes(&self, vaddr: u32, buf: &mut [u8]) {
        let len = buf.len();
        for (byte, cell) in buf.iter_mut().zip(self.range(vaddr, len)) {
            *byte = cell.load(Ordering::Relaxed);
        }
    }

    /// Copy `data` into the window starting at `vaddr`.
    #[track_caller]
    pub fn write_bytes(&self, vaddr: u32, data: &[u8]) {
        for (cell, &byte) in self.range(vaddr, data.len()).iter().zip(data) {
            cell.store(byte, Ordering::Relaxed);
        }
    }

    /// Set `len` bytes starting at `vaddr` to `value`.
    #[track_caller]
    pub fn fill_bytes(&self, vaddr: u32, len: usize, value: u8) {
        for cell in self.range(vaddr, len) {
            cell.store(value, Ordering::Relaxed);
        }
    }
}

impl Drop for GuestMemory {
    fn drop(&mut self) {
        // SAFETY: allocated in `new` with this exact layout.
        unsafe { alloc::dealloc(self.base.as_ptr(), self.layout) }
    }
}

impl fmt::Debug for GuestMemory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GuestMemory")
            .field("base", &self.base)
            .field("len", &self.len())
            .finish()
    }
}
