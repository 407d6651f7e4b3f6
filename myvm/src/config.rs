//! Compile-time constants describing the simulated address space.
//!
//! These mirror the `#define`s in the reference implementation's
//! `my_vm.h` exactly; nothing here is configurable at runtime because the
//! original never made it configurable either.

/// Width, in bits, of a virtual address.
pub const ADDRESS_SPACE_BITS: u32 = 32;

/// Page size in bytes. 4 KiB, matching `PGSIZE` in the reference header.
pub const PGSIZE: usize = 4096;

/// Total addressable virtual space: `2^ADDRESS_SPACE_BITS` bytes.
pub const MAX_MEMSIZE: u64 = 4 * 1024 * 1024 * 1024;

/// Size of the simulated physical memory arena, in bytes.
pub const MEMSIZE: usize = 1024 * 1024 * 1024;

/// Number of entries in the direct-mapped TLB.
pub const TLB_ENTRIES: usize = 512;

/// Bits consumed by the in-page offset. `log2(PGSIZE)`.
pub const OFFSET_BITS: u32 = PGSIZE.trailing_zeros();

/// Bits left over for directory + table indices once the offset is removed.
const INDEX_BITS: u32 = ADDRESS_SPACE_BITS - OFFSET_BITS;

/// Bits of virtual address consumed by the page-table index (inner level).
///
/// The reference implementation splits the remaining bits evenly between
/// directory and table, rounding the table's share down.
pub const PAGE_TABLE_BITS: u32 = INDEX_BITS / 2;

/// Bits of virtual address consumed by the page-directory index (outer level).
pub const PAGE_DIR_BITS: u32 = INDEX_BITS - PAGE_TABLE_BITS;

/// Number of entries in a page directory.
pub const PD_ENTRIES: usize = 1 << PAGE_DIR_BITS;

/// Number of entries in a single page table.
pub const PT_ENTRIES: usize = 1 << PAGE_TABLE_BITS;

/// Number of physical frames backing the simulated arena.
pub const NUM_PHYSICAL_FRAMES: usize = MEMSIZE / PGSIZE;

/// Number of virtual pages in the full 32-bit address space.
pub const NUM_VIRTUAL_PAGES: usize = (MAX_MEMSIZE as usize) / PGSIZE;

static_assertions::const_assert_eq!(PAGE_DIR_BITS + PAGE_TABLE_BITS + OFFSET_BITS, ADDRESS_SPACE_BITS);
static_assertions::const_assert!(PT_ENTRIES * 4 == PGSIZE);
