//! Heap allocator
//!
//! A single arena carved into blocks that exactly tile it. Each block starts
//! with a header word: bit 31 is the allocated flag, the low bits hold the
//! block size in words, header included. Free blocks are found by a linear
//! first-fit walk; freeing coalesces eagerly with both neighbours so no two
//! free blocks are ever adjacent.
//!
//! The raw [`Heap`] reports exhaustion as `None`. [`LockedHeap`] is the
//! [`GlobalAlloc`] front end used on the target; there exhaustion is fatal
//! because there is no other memory source.

use core::alloc::{GlobalAlloc, Layout};
use core::mem::size_of;
use core::ptr::{self, NonNull};

use crate::critical::critical_section;
use crate::core::cs_cell::CsCell;
use crate::error::{fatal, OsError, OsResult};

/// Size of one heap word in bytes
pub const WORD: usize = size_of::<u32>();

const ALLOCATED: u32 = 0x8000_0000;
const SIZE_MASK: u32 = !ALLOCATED;

/// Pattern written over freed payloads
pub const POISON: u32 = 0xFEEE_FEEE;

/// One block as seen by [`Heap::blocks`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockInfo {
    /// Offset of the header from the arena start, in words
    pub offset: usize,
    /// Block size in words, header included
    pub size: usize,
    pub allocated: bool,
}

/// First-fit arena allocator with in-place headers
pub struct Heap {
    start: *mut u32,
    words: usize,
}

// SAFETY: the arena is only touched through `&mut Heap`
unsafe impl Send for Heap {}

impl Heap {
    /// Create a heap with no arena. Every allocation fails until `init`.
    pub const fn empty() -> Self {
        Heap {
            start: ptr::null_mut(),
            words: 0,
        }
    }

    /// Take ownership of `[start, start + size)` as the arena.
    ///
    /// The whole arena becomes one free block.
    ///
    /// # Safety
    /// The region must be valid for reads and writes, unused by anything
    /// else, and must outlive every allocation made from this heap.
    pub unsafe fn init(&mut self, start: *mut u8, size: usize) -> OsResult<()> {
        if start.is_null() || (start as usize) % WORD != 0 || size % WORD != 0 {
            return Err(OsError::HeapMisaligned);
        }

        let words = (size / WORD).min(SIZE_MASK as usize);
        if words < 2 {
            return Err(OsError::HeapTooSmall);
        }

        self.start = start as *mut u32;
        self.words = words;
        self.set_header(0, words as u32);

        crate::debug!("heap: {} words at {=usize:#x}", words, start as usize);
        Ok(())
    }

    /// Build a heap over a static word array
    pub fn from_slice(arena: &'static mut [u32]) -> OsResult<Self> {
        let mut heap = Heap::empty();
        let size = arena.len() * WORD;
        unsafe { heap.init(arena.as_mut_ptr() as *mut u8, size)? };
        Ok(heap)
    }

    #[inline(always)]
    fn header(&self, idx: usize) -> u32 {
        unsafe { self.start.add(idx).read() }
    }

    #[inline(always)]
    fn set_header(&mut self, idx: usize, value: u32) {
        unsafe { self.start.add(idx).write(value) }
    }

    /// Allocate `size` bytes of zeroed, word-aligned memory.
    ///
    /// Returns `None` for a zero-sized request or when no free block is
    /// large enough.
    pub fn alloc(&mut self, size: usize) -> Option<NonNull<u8>> {
        if size == 0 || self.words == 0 {
            return None;
        }

        let need = size.div_ceil(WORD) + 1;
        let mut idx = 0;

        while idx < self.words {
            let header = self.header(idx);
            let block = (header & SIZE_MASK) as usize;
            if block == 0 {
                return None;
            }

            if header & ALLOCATED == 0 && block >= need {
                let taken = if block - need > 1 {
                    self.set_header(idx + need, (block - need) as u32);
                    need
                } else {
                    block
                };
                self.set_header(idx, taken as u32 | ALLOCATED);

                let payload = unsafe { self.start.add(idx + 1) };
                unsafe { ptr::write_bytes(payload, 0, taken - 1) };
                return NonNull::new(payload as *mut u8);
            }

            idx += block;
        }

        None
    }

    /// Release an allocation.
    ///
    /// Pointers outside the arena, pointers that are not the payload of a
    /// block, and blocks that are already free are ignored and `false` is
    /// returned. The heap is never modified in that case.
    pub fn free(&mut self, ptr: *mut u8) -> bool {
        if self.words == 0 {
            return false;
        }

        let base = self.start as usize;
        let addr = ptr as usize;
        if addr <= base || addr >= base + self.words * WORD || (addr - base) % WORD != 0 {
            return false;
        }
        let target = (addr - base) / WORD - 1;

        // Locate the block and its predecessor in one pass from the start
        let mut idx = 0;
        let mut prev_free = None;
        while idx < target {
            let header = self.header(idx);
            let block = (header & SIZE_MASK) as usize;
            if block == 0 {
                return false;
            }
            prev_free = if header & ALLOCATED == 0 { Some(idx) } else { None };
            idx += block;
        }
        if idx != target {
            return false;
        }

        let header = self.header(target);
        if header & ALLOCATED == 0 {
            return false;
        }

        let mut size = (header & SIZE_MASK) as usize;
        for i in 1..size {
            self.set_header(target + i, POISON);
        }

        let next = target + size;
        if next < self.words {
            let next_header = self.header(next);
            if next_header & ALLOCATED == 0 {
                size += (next_header & SIZE_MASK) as usize;
            }
        }

        match prev_free {
            Some(prev) => {
                let merged = size + (self.header(prev) & SIZE_MASK) as usize;
                self.set_header(prev, merged as u32);
            }
            None => self.set_header(target, size as u32),
        }

        true
    }

    /// Arena size in words
    #[inline]
    pub fn capacity_words(&self) -> usize {
        self.words
    }

    /// Whether `ptr` lies inside the arena
    #[inline]
    pub fn contains(&self, ptr: *const u8) -> bool {
        let base = self.start as usize;
        let addr = ptr as usize;
        self.words > 0 && addr >= base && addr < base + self.words * WORD
    }

    /// Walk the block list from the arena start
    pub fn blocks(&self) -> Blocks<'_> {
        Blocks { heap: self, idx: 0 }
    }

    /// Words held by free blocks, headers included
    pub fn free_words(&self) -> usize {
        self.blocks().filter(|b| !b.allocated).map(|b| b.size).sum()
    }

    /// Words held by allocated blocks, headers included
    pub fn used_words(&self) -> usize {
        self.blocks().filter(|b| b.allocated).map(|b| b.size).sum()
    }
}

/// Iterator over the blocks of a [`Heap`]
pub struct Blocks<'a> {
    heap: &'a Heap,
    idx: usize,
}

impl Iterator for Blocks<'_> {
    type Item = BlockInfo;

    fn next(&mut self) -> Option<BlockInfo> {
        if self.idx >= self.heap.words {
            return None;
        }
        let header = self.heap.header(self.idx);
        let size = (header & SIZE_MASK) as usize;
        if size == 0 {
            self.idx = self.heap.words;
            return None;
        }
        let info = BlockInfo {
            offset: self.idx,
            size,
            allocated: header & ALLOCATED != 0,
        };
        self.idx += size;
        Some(info)
    }
}

/// Interrupt-safe global allocator over a [`Heap`]
pub struct LockedHeap {
    heap: CsCell<Heap>,
}

impl LockedHeap {
    pub const fn empty() -> Self {
        LockedHeap {
            heap: CsCell::new(Heap::empty()),
        }
    }

    /// # Safety
    /// See [`Heap::init`].
    pub unsafe fn init(&self, start: *mut u8, size: usize) -> OsResult<()> {
        critical_section(|cs| unsafe { self.heap.get(cs).init(start, size) })
    }

    /// Run `f` against the heap inside a critical section
    pub fn with<R>(&self, f: impl FnOnce(&mut Heap) -> R) -> R {
        critical_section(|cs| f(self.heap.get(cs)))
    }

    pub fn free_words(&self) -> usize {
        self.with(|heap| heap.free_words())
    }

    pub fn used_words(&self) -> usize {
        self.with(|heap| heap.used_words())
    }

    /// Allocate honouring `layout`, or `None` when the arena is exhausted.
    ///
    /// Alignments above one word over-allocate; the distance back to the
    /// block payload is stored in the word just below the returned pointer.
    pub fn try_alloc(&self, layout: Layout) -> Option<NonNull<u8>> {
        let align = layout.align();
        if align <= WORD {
            return self.with(|heap| heap.alloc(layout.size()));
        }

        let raw = self.with(|heap| heap.alloc(layout.size() + align))?;
        let base = raw.as_ptr() as usize;
        let aligned = (base + WORD + align - 1) & !(align - 1);
        let offset = (aligned - base) as u32;
        unsafe {
            let aligned_ptr = raw.as_ptr().add(aligned - base);
            (aligned_ptr.sub(WORD) as *mut u32).write(offset);
            NonNull::new(aligned_ptr)
        }
    }

    /// Release memory obtained from [`try_alloc`](Self::try_alloc) with the
    /// same layout.
    ///
    /// # Safety
    /// `ptr` must come from `try_alloc(layout)` on this heap.
    pub unsafe fn release(&self, ptr: *mut u8, layout: Layout) {
        let raw = if layout.align() <= WORD {
            ptr
        } else {
            let offset = unsafe { (ptr.sub(WORD) as *const u32).read() } as usize;
            unsafe { ptr.sub(offset) }
        };
        self.with(|heap| heap.free(raw));
    }
}

unsafe impl GlobalAlloc for LockedHeap {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        match self.try_alloc(layout) {
            Some(ptr) => ptr.as_ptr(),
            None => {
                crate::error!("heap: exhausted serving {} bytes", layout.size());
                fatal(OsError::HeapExhausted)
            }
        }
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        unsafe { self.release(ptr, layout) }
    }
}
