//! `myvm` simulates a two-level-paged virtual memory system over a flat
//! physical arena, the way the course assignment it's modeled on does: a
//! process-wide allocator (`t_malloc`/`t_free`), a page-granular translator
//! backed by a direct-mapped TLB, and a byte-addressable `put_value`/
//! `get_value` API for reading and writing through the simulated mapping.
//!
//! Every data-path operation takes the same single lock the reference
//! implementation does (`general_lock`): there is one [`Vm`] handle, built
//! with [`Vm::new`], and every call goes through its [`Mutex`].

pub mod addr;
pub mod config;
pub mod error;
pub mod pagetable;
pub mod tlb;

use std::sync::Mutex;

pub use addr::{FrameIndex, VirtAddr};
pub use error::{Error, Result};
use pagetable::{Pde, Pte};
use tlb::Tlb;

use bitset::Bitset;
use config::{NUM_PHYSICAL_FRAMES, NUM_VIRTUAL_PAGES, PGSIZE};

/// Reserved physical frame 0 and virtual page 0.
///
/// Frame 0 holds the page directory itself (one `Pde` per directory slot,
/// `PD_ENTRIES * 4 == PGSIZE` bytes exactly — see the `const_assert!` in
/// `config`), matching this workspace's physical-arena data model: the
/// directory is just another occupant of the frame arena rather than a
/// separate heap allocation outside it, unlike the reference
/// implementation's `page_directory`, which `malloc`s independently of
/// `physical_memory`. Virtual page 0 is reserved so address 0 is never
/// mistaken for a valid mapping, matching `set_physical_mem`'s bootstrap.
const RESERVED_SLOT: usize = 0;
const DIRECTORY_FRAME: FrameIndex = FrameIndex(0);

struct VmInner {
    arena: Vec<u8>,
    physical_bitmap: Bitset,
    virtual_bitmap: Bitset,
    tlb: Tlb,
}

impl VmInner {
    fn new() -> Self {
        let mut physical_bitmap = Bitset::new(NUM_PHYSICAL_FRAMES);
        let mut virtual_bitmap = Bitset::new(NUM_VIRTUAL_PAGES);
        physical_bitmap.set(RESERVED_SLOT);
        virtual_bitmap.set(RESERVED_SLOT);
        Self {
            arena: vec![0u8; config::MEMSIZE],
            physical_bitmap,
            virtual_bitmap,
            tlb: Tlb::new(),
        }
    }

    fn frame_slice(&self, frame: FrameIndex) -> &[u8] {
        let start = frame.byte_offset();
        &self.arena[start..start + PGSIZE]
    }

    fn frame_slice_mut(&mut self, frame: FrameIndex) -> &mut [u8] {
        let start = frame.byte_offset();
        &mut self.arena[start..start + PGSIZE]
    }

    fn read_entry(&self, frame: FrameIndex, index: usize) -> u32 {
        let bytes = self.frame_slice(frame);
        let off = index * 4;
        u32::from_le_bytes(bytes[off..off + 4].try_into().unwrap())
    }

    fn write_entry(&mut self, frame: FrameIndex, index: usize, bits: u32) {
        let off = index * 4;
        self.frame_slice_mut(frame)[off..off + 4].copy_from_slice(&bits.to_le_bytes());
    }

    fn read_pde(&self, index: usize) -> Pde {
        Pde::from_bits(self.read_entry(DIRECTORY_FRAME, index))
    }

    fn write_pde(&mut self, index: usize, pde: Pde) {
        self.write_entry(DIRECTORY_FRAME, index, pde.to_bits());
    }

    fn read_pte(&self, frame: FrameIndex, index: usize) -> Pte {
        Pte::from_bits(self.read_entry(frame, index))
    }

    fn write_pte(&mut self, frame: FrameIndex, index: usize, pte: Pte) {
        self.write_entry(frame, index, pte.to_bits());
    }

    fn alloc_physical_frame(&mut self) -> Option<FrameIndex> {
        let idx = self.physical_bitmap.first_free()?;
        self.physical_bitmap.set(idx);
        Some(FrameIndex(idx))
    }

    fn free_physical_frame(&mut self, frame: FrameIndex) {
        self.physical_bitmap.clear(frame.0);
    }

    fn zero_frame(&mut self, frame: FrameIndex) {
        self.frame_slice_mut(frame).fill(0);
    }

    /// Resolves `va` to a physical byte offset, consulting the TLB first
    /// and walking the directory/table on a miss. Installs the resulting
    /// translation into the TLB before returning.
    fn translate(&mut self, va: VirtAddr) -> Option<usize> {
        let tag = va.tlb_tag();
        if let Some(frame) = self.tlb.lookup(tag) {
            return Some(frame.byte_offset() + va.offset());
        }
        let pde = self.read_pde(va.dir_index());
        let pt_frame = pde.frame_index()?;
        let pte = self.read_pte(pt_frame, va.table_index());
        let frame = pte.frame_index()?;
        self.tlb.insert(tag, frame);
        Some(frame.byte_offset() + va.offset())
    }

    /// Establishes a mapping for `va`, allocating its page table lazily.
    ///
    /// Invalidates any stale TLB entry for `va` before the new mapping is
    /// installed, and refuses to silently replace an existing mapping: the
    /// reference implementation's `page_map` no-ops when the target PTE is
    /// already allocated, which this crate treats as a caller error rather
    /// than repeat.
    fn page_map(&mut self, va: VirtAddr) -> Result<()> {
        if !va.is_page_aligned() {
            return Err(Error::Unaligned);
        }
        let dir_idx = va.dir_index();
        let pt_frame = match self.read_pde(dir_idx).frame_index() {
            Some(f) => f,
            None => {
                let f = self.alloc_physical_frame().ok_or(Error::OutOfPhysicalSpace)?;
                self.zero_frame(f);
                let mut pde = Pde::empty();
                pde.set_frame(f);
                self.write_pde(dir_idx, pde);
                f
            }
        };
        let table_idx = va.table_index();
        if self.read_pte(pt_frame, table_idx).allocated() {
            return Err(Error::AlreadyMapped);
        }
        let data_frame = self.alloc_physical_frame().ok_or(Error::OutOfPhysicalSpace)?;
        let mut pte = Pte::empty();
        pte.set_frame(data_frame);
        self.tlb.invalidate(va.tlb_tag());
        self.write_pte(pt_frame, table_idx, pte);
        self.virtual_bitmap.set(va.page_number());
        Ok(())
    }

    /// Finds a run of `num_pages` contiguous free virtual pages above page
    /// zero. The reference implementation's byte-stride version of this
    /// scan has an off-by-one in how many bytes it examines for small
    /// requests; this resolves that ambiguity the way the design notes
    /// suggest: a single-page request (`num_pages == 1`) returns the first
    /// free page directly, and a multi-page request scans for a run.
    fn get_next_avail(&self, num_pages: usize) -> Option<usize> {
        if num_pages == 0 {
            return None;
        }
        if num_pages == 1 {
            for page in (RESERVED_SLOT + 1)..NUM_VIRTUAL_PAGES {
                if !self.virtual_bitmap.get(page) {
                    return Some(page);
                }
            }
            return None;
        }
        let mut run_start = None;
        let mut run_len = 0usize;
        for page in (RESERVED_SLOT + 1)..NUM_VIRTUAL_PAGES {
            if self.virtual_bitmap.get(page) {
                run_len = 0;
                run_start = None;
                continue;
            }
            if run_len == 0 {
                run_start = Some(page);
            }
            run_len += 1;
            if run_len == num_pages {
                return run_start;
            }
        }
        None
    }
}

/// A handle to a virtual-memory arena. Every operation takes the same
/// process-wide lock, matching the reference implementation's single
/// `general_lock`; the declared-but-never-acquired `map_lock`/`table_lock`
/// in that implementation have no behavior worth reproducing.
pub struct Vm {
    inner: Mutex<VmInner>,
}

impl Default for Vm {
    fn default() -> Self {
        Self::new()
    }
}

impl Vm {
    pub fn new() -> Self {
        log::info!(
            "myvm: {} MiB arena, {} virtual pages, {}-entry TLB",
            config::MEMSIZE / (1024 * 1024),
            NUM_VIRTUAL_PAGES,
            config::TLB_ENTRIES
        );
        Self {
            inner: Mutex::new(VmInner::new()),
        }
    }

    /// Number of pages a request of `num_bytes` needs.
    ///
    /// This is `num_bytes / PGSIZE + 1`, always rounding up by one extra
    /// page even when `num_bytes` is an exact multiple of `PGSIZE`. That
    /// divergence from `div_ceil` is a preserved bug from the reference
    /// implementation (per explicit instruction to keep `t_malloc`/
    /// `t_free`'s sizing the way it always was), not a design choice made
    /// here — `t_free` must use the identical formula or it frees fewer
    /// pages than `t_malloc` handed out.
    pub fn page_count_for(num_bytes: usize) -> usize {
        num_bytes / PGSIZE + 1
    }

    /// Exposed for tests/introspection; walks the page table the same way
    /// `put_value`/`get_value` do internally.
    pub fn translate(&self, va: VirtAddr) -> Option<usize> {
        self.inner.lock().unwrap().translate(va)
    }

    pub fn t_malloc(&self, num_bytes: usize) -> Result<VirtAddr> {
        let mut inner = self.inner.lock().unwrap();
        let num_pages = Self::page_count_for(num_bytes);
        let start_page = inner
            .get_next_avail(num_pages)
            .ok_or(Error::OutOfVirtualSpace(num_pages))?;
        for i in 0..num_pages {
            inner.page_map(VirtAddr::from_page(start_page + i))?;
        }
        log::debug!("t_malloc: {num_bytes} bytes -> {num_pages} pages starting at page {start_page}");
        Ok(VirtAddr::from_page(start_page))
    }

    /// Releases `size` bytes starting at `va`, which must be the address
    /// returned by a matching `t_malloc`. Clears both the virtual and
    /// physical bitmaps and invalidates the affected TLB slots, but does
    /// not reclaim the page table frames themselves, matching the
    /// reference implementation.
    pub fn t_free(&self, va: VirtAddr, size: usize) -> Result<()> {
        if !va.is_page_aligned() {
            return Err(Error::Unaligned);
        }
        let mut inner = self.inner.lock().unwrap();
        let num_pages = Self::page_count_for(size);
        for i in 0..num_pages {
            let page_va = va.checked_add(i * PGSIZE).ok_or(Error::TranslationFault)?;
            let pt_frame = inner
                .read_pde(page_va.dir_index())
                .frame_index()
                .ok_or(Error::TranslationFault)?;
            let table_idx = page_va.table_index();
            let frame = inner
                .read_pte(pt_frame, table_idx)
                .frame_index()
                .ok_or(Error::TranslationFault)?;
            inner.tlb.invalidate(page_va.tlb_tag());
            inner.write_pte(pt_frame, table_idx, Pte::empty());
            inner.free_physical_frame(frame);
            inner.virtual_bitmap.clear(page_va.page_number());
        }
        log::debug!("t_free: {size} bytes -> {num_pages} pages starting at {:?}", va);
        Ok(())
    }

    pub fn put_value(&self, va: VirtAddr, data: &[u8]) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        let mut remaining = data.len();
        let mut src_pos = 0usize;
        let mut cur = va;
        while remaining > 0 {
            let phys = inner.translate(cur).ok_or(Error::TranslationFault)?;
            let chunk = remaining.min(PGSIZE - cur.offset());
            inner.arena[phys..phys + chunk].copy_from_slice(&data[src_pos..src_pos + chunk]);
            remaining -= chunk;
            src_pos += chunk;
            cur = VirtAddr(cur.0 + chunk);
        }
        Ok(())
    }

    /// Reads `buf.len()` bytes starting at `va`. Unlike the reference
    /// implementation's `get_value`, which silently stops at the first
    /// unmapped page, this surfaces the same `TranslationFault` error
    /// `put_value` would for the same condition.
    pub fn get_value(&self, va: VirtAddr, buf: &mut [u8]) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        let mut remaining = buf.len();
        let mut dst_pos = 0usize;
        let mut cur = va;
        while remaining > 0 {
            let phys = inner.translate(cur).ok_or(Error::TranslationFault)?;
            let chunk = remaining.min(PGSIZE - cur.offset());
            buf[dst_pos..dst_pos + chunk].copy_from_slice(&inner.arena[phys..phys + chunk]);
            remaining -= chunk;
            dst_pos += chunk;
            cur = VirtAddr(cur.0 + chunk);
        }
        Ok(())
    }

    /// `size x size` integer matrix multiply `c = a * b`, entirely through
    /// `get_value`/`put_value`, the way the reference implementation's
    /// benchmark does it: no bulk copy, just one word at a time.
    pub fn mat_mult(&self, a: VirtAddr, b: VirtAddr, size: usize, c: VirtAddr) -> Result<()> {
        const ELEM: usize = std::mem::size_of::<i32>();
        for row in 0..size {
            for col in 0..size {
                let mut acc: i32 = 0;
                for k in 0..size {
                    let mut x = [0u8; ELEM];
                    let mut y = [0u8; ELEM];
                    self.get_value(VirtAddr(a.0 + (row * size + k) * ELEM), &mut x)?;
                    self.get_value(VirtAddr(b.0 + (k * size + col) * ELEM), &mut y)?;
                    acc = acc.wrapping_add(i32::from_le_bytes(x).wrapping_mul(i32::from_le_bytes(y)));
                }
                self.put_value(VirtAddr(c.0 + (row * size + col) * ELEM), &acc.to_le_bytes())?;
            }
        }
        Ok(())
    }

    /// Fraction of TLB lookups that have missed since this `Vm` was
    /// created, the equivalent of the reference implementation's
    /// `print_TLB_missrate`.
    pub fn tlb_miss_rate(&self) -> f64 {
        self.inner.lock().unwrap().tlb.miss_rate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vm() -> Vm {
        let _ = env_logger::builder().is_test(true).try_init();
        Vm::new()
    }

    #[test]
    fn malloc_then_put_get_round_trip() {
        let vm = vm();
        let addr = vm.t_malloc(64).unwrap();
        vm.put_value(addr, b"hello world").unwrap();
        let mut buf = [0u8; 11];
        vm.get_value(addr, &mut buf).unwrap();
        assert_eq!(&buf, b"hello world");
    }

    #[test]
    fn page_count_for_always_rounds_up_by_one() {
        assert_eq!(Vm::page_count_for(0), 1);
        assert_eq!(Vm::page_count_for(config::PGSIZE), 2);
        assert_eq!(Vm::page_count_for(config::PGSIZE - 1), 1);
    }

    #[test]
    fn put_value_crosses_page_boundary() {
        let vm = vm();
        let addr = vm.t_malloc(config::PGSIZE * 3).unwrap();
        let near_boundary = VirtAddr(addr.0 + config::PGSIZE - 2);
        let data = [1u8, 2, 3, 4, 5];
        vm.put_value(near_boundary, &data).unwrap();
        let mut buf = [0u8; 5];
        vm.get_value(near_boundary, &mut buf).unwrap();
        assert_eq!(buf, data);
    }

    /// Round-trips `put_value`/`get_value` for a batch of random offsets and
    /// random-length buffers inside one multi-page allocation, the way the
    /// round-trip property (spec.md §8) is stated: arbitrary page boundaries,
    /// not just the one hand-picked in `put_value_crosses_page_boundary`.
    #[test]
    fn put_get_round_trip_at_random_offsets_and_lengths() {
        use rand::Rng;

        let vm = vm();
        let span = config::PGSIZE * 4;
        let addr = vm.t_malloc(span).unwrap();
        let mut rng = rand::thread_rng();

        for _ in 0..50 {
            let len = rng.gen_range(1..=config::PGSIZE * 2);
            let max_offset = span - len;
            let offset = rng.gen_range(0..=max_offset);
            let src: Vec<u8> = (0..len).map(|_| rng.gen()).collect();
            let at = VirtAddr(addr.0 + offset);
            vm.put_value(at, &src).unwrap();
            let mut dst = vec![0u8; len];
            vm.get_value(at, &mut dst).unwrap();
            assert_eq!(dst, src, "mismatch at offset {offset}, len {len}");
        }
    }

    #[test]
    fn free_then_reuse_prefers_lowest_free_page() {
        let vm = vm();
        let first = vm.t_malloc(config::PGSIZE).unwrap();
        let second = vm.t_malloc(config::PGSIZE).unwrap();
        assert!(second.0 > first.0);
        vm.t_free(first, config::PGSIZE).unwrap();
        let third = vm.t_malloc(config::PGSIZE).unwrap();
        assert_eq!(third, first);
    }

    #[test]
    fn get_value_on_unmapped_address_is_an_error() {
        let vm = vm();
        let mut buf = [0u8; 4];
        let far = VirtAddr::from_page(12345);
        assert!(matches!(vm.get_value(far, &mut buf), Err(Error::TranslationFault)));
    }

    #[test]
    fn multi_page_malloc_returns_a_contiguous_run() {
        let vm = vm();
        let base = vm.t_malloc(config::PGSIZE * 3).unwrap();
        for i in 0..3 {
            let page_va = VirtAddr(base.0 + i * config::PGSIZE);
            assert!(vm.translate(page_va).is_some(), "page {i} of the run should be mapped");
        }
    }

    #[test]
    fn remapping_an_allocated_page_is_rejected() {
        let vm = vm();
        let addr = vm.t_malloc(config::PGSIZE).unwrap();
        let mut inner = vm.inner.lock().unwrap();
        assert!(matches!(inner.page_map(addr), Err(Error::AlreadyMapped)));
    }

    #[test]
    fn mat_mult_computes_expected_product() {
        let vm = vm();
        let n = 2usize;
        let elem = std::mem::size_of::<i32>();
        let a = vm.t_malloc(n * n * elem).unwrap();
        let b = vm.t_malloc(n * n * elem).unwrap();
        let c = vm.t_malloc(n * n * elem).unwrap();
        for (addr, vals) in [(a, [1, 2, 3, 4]), (b, [5, 6, 7, 8])] {
            for (i, v) in vals.iter().enumerate() {
                vm.put_value(VirtAddr(addr.0 + i * elem), &v.to_le_bytes()).unwrap();
            }
        }
        vm.mat_mult(a, b, n, c).unwrap();
        let expect = [19i32, 22, 43, 50];
        for (i, e) in expect.iter().enumerate() {
            let mut buf = [0u8; 4];
            vm.get_value(VirtAddr(c.0 + i * elem), &mut buf).unwrap();
            assert_eq!(i32::from_le_bytes(buf), *e);
        }
    }
}
